use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::TryRecvError;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Wrap};

use crate::progress::{BatchPhase, BatchProgress, CancelToken, ProgressEvent, ProgressSink};

const EVENTS_MAX: usize = 8;

#[derive(Debug, Default)]
struct ViewState {
    progress: BatchProgress,
    elapsed: Duration,
    events: VecDeque<String>,
    cancelling: bool,
}

struct TuiProgress {
    state: Arc<Mutex<ViewState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            let changed = state.progress.message != event.progress.message
                || state.progress.phase != event.progress.phase;
            if changed && !event.progress.message.is_empty() {
                push_event(&mut state.events, event.progress.message.clone());
            }
            state.progress = event.progress;
            state.elapsed = event.elapsed;
        }
    }
}

/// Full-screen progress view for one batch. The batch runs on a worker
/// thread; `q`, `Esc` or `Ctrl-C` request cancellation and the view stays
/// up until the worker has finalized.
pub struct Tui {
    state: Arc<Mutex<ViewState>>,
}

impl Default for Tui {
    fn default() -> Self {
        Self::new()
    }
}

impl Tui {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ViewState::default())),
        }
    }

    pub fn run_batch<F, R>(&mut self, cancel: CancelToken, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> R + Send + 'static,
        R: Send + 'static,
    {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let (tx, rx) = std::sync::mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let mut tick = 0usize;
        let result = loop {
            if let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_ui(frame, &state, tick))
                    .into_diagnostic()?;
            }

            match rx.try_recv() {
                Ok(result) => break Some(result),
                Err(TryRecvError::Disconnected) => break None,
                Err(TryRecvError::Empty) => {}
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    let interrupt = key.kind == KeyEventKind::Press
                        && (matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                            || (key.code == KeyCode::Char('c')
                                && key.modifiers.contains(KeyModifiers::CONTROL)));
                    if interrupt {
                        cancel.cancel();
                        if let Ok(mut state) = self.state.lock() {
                            state.cancelling = true;
                            push_event(&mut state.events, "cancel requested".to_string());
                        }
                    }
                }
            }

            tick = tick.wrapping_add(1);
        };

        disable_raw_mode().into_diagnostic()?;
        let mut stdout = io::stdout();
        stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
        handle.join().ok();
        result.ok_or_else(|| miette::Report::msg("batch worker stopped unexpectedly"))
    }
}

fn draw_ui(frame: &mut ratatui::Frame, state: &ViewState, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Length(3),
            Constraint::Length(6),
            Constraint::Min(3),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(state, tick), chunks[0]);

    let progress = &state.progress;
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Progress"))
        .gauge_style(Style::default().fg(Color::Cyan))
        .percent(u16::from(progress.percent))
        .label(format!(
            "{}/{} objects  {}%",
            progress.completed, progress.total, progress.percent
        ));
    frame.render_widget(gauge, chunks[1]);

    frame.render_widget(draw_status(state), chunks[2]);

    let events = state
        .events
        .iter()
        .rev()
        .map(|event| Line::from(format!("- {event}")))
        .collect::<Vec<_>>();
    let events = Paragraph::new(events)
        .block(Block::default().borders(Borders::TOP).title("Recent events"))
        .wrap(Wrap { trim: true });
    frame.render_widget(events, chunks[3]);
}

fn draw_header(state: &ViewState, tick: usize) -> Paragraph<'static> {
    let hb = if tick % 2 == 0 { "*" } else { " " };
    let hint = if state.cancelling {
        "cancelling, finishing current object..."
    } else {
        "q / Esc: cancel"
    };
    Paragraph::new(Line::from(vec![
        Span::styled(
            "DICOM-CART",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("   "),
        Span::styled(hint, Style::default().fg(Color::Yellow)),
        Span::raw("   "),
        Span::styled(hb, Style::default().fg(Color::Green)),
    ]))
    .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_status(state: &ViewState) -> Paragraph<'static> {
    let progress = &state.progress;
    let phase_color = match progress.phase {
        BatchPhase::Idle => Color::Green,
        BatchPhase::Finalizing => Color::Yellow,
        _ => Color::Cyan,
    };
    let current = progress
        .current_series
        .as_ref()
        .map(|uid| uid.to_string())
        .unwrap_or_else(|| "--".to_string());
    Paragraph::new(vec![
        Line::from(vec![
            Span::styled("Phase: ", Style::default().fg(Color::Gray)),
            Span::styled(progress.phase.label(), Style::default().fg(phase_color)),
        ]),
        Line::from(vec![
            Span::styled("Status: ", Style::default().fg(Color::Gray)),
            Span::raw(progress.message.clone()),
        ]),
        Line::from(vec![
            Span::styled("Series: ", Style::default().fg(Color::Gray)),
            Span::raw(current),
        ]),
        Line::from(vec![
            Span::styled("Elapsed: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{:.1}s", state.elapsed.as_secs_f64())),
        ]),
    ])
    .wrap(Wrap { trim: true })
}

fn push_event(buffer: &mut VecDeque<String>, item: String) {
    buffer.push_back(item);
    while buffer.len() > EVENTS_MAX {
        buffer.pop_front();
    }
}
