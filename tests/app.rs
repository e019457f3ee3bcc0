mod common;

use std::cell::RefCell;

use assert_matches::assert_matches;

use dicom_cart::app::{App, BatchOutcome, BatchReport, SeriesStatus, SkipReason};
use dicom_cart::location::DEFAULT_STORE_DOMAIN;
use dicom_cart::output::JsonOutput;
use dicom_cart::progress::{BatchPhase, CancelToken, ProgressEvent, ProgressSink};
use dicom_cart::session::Session;

use common::{MockStore, RecordingSink, cart_item, files_under, temp_store};

const FOUR: &[&str] = &["aaa/1.dcm", "aaa/2.dcm", "aaa/sub/3.dcm", "aaa/sub/4.dcm"];

fn completed(outcome: BatchOutcome) -> BatchReport {
    match outcome {
        BatchOutcome::Completed(report) => report,
        other => panic!("expected a completed batch, got {other:?}"),
    }
}

#[test]
fn empty_cart_is_a_noop() {
    let (_temp, store) = temp_store();
    let root = store.download_root().to_path_buf();
    let app = App::new(store, MockStore::new(), DEFAULT_STORE_DOMAIN);
    let mut session = Session::new();
    let sink = RecordingSink::default();

    let outcome = app.start_batch(&mut session, &CancelToken::new(), &sink);

    assert_matches!(
        outcome,
        BatchOutcome::Skipped {
            reason: SkipReason::EmptyCart
        }
    );
    assert!(session.progress().snapshot().is_idle());
    assert!(sink.events.lock().unwrap().is_empty());
    assert!(!root.as_std_path().exists());
}

#[test]
fn failed_listing_does_not_abort_batch() {
    let (_temp, store) = temp_store();
    let root = store.download_root().to_path_buf();
    let client = MockStore::new().with_series("idc-open-data", "aaa/", FOUR, 3);
    let app = App::new(store, client, DEFAULT_STORE_DOMAIN);
    let mut session = Session::new();
    session.add(cart_item("1.1", "nlst", "s3://idc-open-data/aaa/*"));
    session.add(cart_item("1.2", "nlst", "s3://idc-open-data/missing/*"));

    let report = completed(app.start_batch(&mut session, &CancelToken::new(), &JsonOutput));

    assert_eq!(session.cart_count(), 0);
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.history()[0].item.series_uid.as_str(), "1.1");
    assert!(session.progress().snapshot().is_idle());

    assert_eq!(report.total_objects, 4);
    assert_eq!(report.completed_objects, 4);
    assert_matches!(report.series[0].status, SeriesStatus::Completed { downloaded: 4, .. });
    assert_matches!(report.series[1].status, SeriesStatus::Failed { .. });

    assert_eq!(
        files_under(root.as_std_path()),
        vec![
            "nlst/1.1/1.dcm",
            "nlst/1.1/2.dcm",
            "nlst/1.1/sub/3.dcm",
            "nlst/1.1/sub/4.dcm"
        ]
    );
    let body = std::fs::read_to_string(root.join("nlst/1.1/sub/3.dcm").as_std_path()).unwrap();
    assert_eq!(body, "aaa/sub/3.dcm");
}

#[test]
fn second_run_transfers_nothing_and_still_records_history() {
    let (_temp, store) = temp_store();
    let client = MockStore::new().with_series("idc-open-data", "aaa/", FOUR, 2);
    let app = App::new(store, client, DEFAULT_STORE_DOMAIN);
    let item = cart_item("1.1", "nlst", "s3://idc-open-data/aaa/*");
    let mut session = Session::new();

    session.add(item.clone());
    let first = completed(app.start_batch(&mut session, &CancelToken::new(), &JsonOutput));
    assert_eq!(app.client().download_count(), 4);
    assert_eq!(first.downloaded_bytes, FOUR.iter().map(|key| key.len() as u64).sum::<u64>());

    session.add(item);
    let sink = RecordingSink::default();
    let second = completed(app.start_batch(&mut session, &CancelToken::new(), &sink));

    assert_eq!(app.client().download_count(), 4);
    assert_eq!(second.downloaded_bytes, 0);
    assert_matches!(
        second.series[0].status,
        SeriesStatus::Completed {
            downloaded: 0,
            skipped: 4,
            ..
        }
    );
    assert_eq!(second.completed_objects, second.total_objects);
    assert_eq!(session.history().len(), 2);
    assert!(
        sink.events
            .lock()
            .unwrap()
            .iter()
            .any(|event| event.progress.percent == 100)
    );
}

#[test]
fn history_puts_latest_completed_series_first() {
    let (_temp, store) = temp_store();
    let client = MockStore::new()
        .with_series("b", "a/", &["a/1"], 10)
        .with_series("b", "b/", &["b/1"], 10)
        .with_series("b", "c/", &["c/1"], 10);
    let app = App::new(store, client, DEFAULT_STORE_DOMAIN);
    let mut session = Session::new();
    for (uid, prefix) in [("1.a", "a/"), ("1.b", "b/"), ("1.c", "c/")] {
        session.add(cart_item(uid, "col", &format!("s3://b/{prefix}")));
    }

    app.start_batch(&mut session, &CancelToken::new(), &JsonOutput);

    let order = session
        .history()
        .iter()
        .map(|record| record.item.series_uid.as_str())
        .collect::<Vec<_>>();
    assert_eq!(order, vec!["1.c", "1.b", "1.a"]);
}

#[test]
fn object_failure_aborts_only_its_series() {
    let (_temp, store) = temp_store();
    let client = MockStore::new()
        .with_series("b", "x/", &["x/1", "x/2", "x/3"], 10)
        .with_series("b", "y/", &["y/1"], 10)
        .failing_object("b", "x/2");
    let app = App::new(store, client, DEFAULT_STORE_DOMAIN);
    let mut session = Session::new();
    session.add(cart_item("1.x", "col", "s3://b/x/"));
    session.add(cart_item("1.y", "col", "s3://b/y/"));

    let report = completed(app.start_batch(&mut session, &CancelToken::new(), &JsonOutput));

    assert_eq!(
        *app.client().downloads.lock().unwrap(),
        vec!["mock://b/x/1", "mock://b/x/2", "mock://b/y/1"]
    );
    assert_matches!(&report.series[0].status, SeriesStatus::Failed { error } if error.contains("500"));
    assert_matches!(report.series[1].status, SeriesStatus::Completed { .. });
    assert_eq!(report.total_objects, 4);
    assert_eq!(report.completed_objects, 2);
    assert_eq!(session.cart_count(), 0);
    assert_eq!(session.history().len(), 1);
}

#[test]
fn checkpoints_are_ordered_and_monotonic() {
    let (_temp, store) = temp_store();
    let client = MockStore::new().with_series("b", "s/", &["s/1", "s/2", "s/3"], 1);
    let app = App::new(store, client, DEFAULT_STORE_DOMAIN);
    let mut session = Session::new();
    session.add(cart_item("1.1", "col", "s3://b/s/"));
    let sink = RecordingSink::default();

    app.start_batch(&mut session, &CancelToken::new(), &sink);

    let events = sink.events.lock().unwrap();
    let mut phases = events
        .iter()
        .map(|event| event.progress.phase)
        .collect::<Vec<_>>();
    phases.dedup();
    assert_eq!(
        phases,
        vec![
            BatchPhase::Preparing,
            BatchPhase::Listing,
            BatchPhase::Downloading,
            BatchPhase::Finalizing,
            BatchPhase::Idle
        ]
    );

    let percents = events
        .iter()
        .filter(|event| event.progress.phase == BatchPhase::Downloading)
        .map(|event| event.progress.percent)
        .collect::<Vec<_>>();
    assert!(percents.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(percents.contains(&33));
    assert!(percents.contains(&66));
    assert_eq!(percents.last(), Some(&100));

    let last = events.last().unwrap();
    assert!(last.progress.is_idle());
    assert!(
        events
            .iter()
            .filter(|event| event.progress.phase == BatchPhase::Downloading)
            .all(|event| event.progress.in_progress)
    );
}

#[test]
fn total_falls_back_to_cart_size_when_nothing_lists() {
    let (_temp, store) = temp_store();
    let app = App::new(store, MockStore::new(), DEFAULT_STORE_DOMAIN);
    let mut session = Session::new();
    session.add(cart_item("1.1", "col", "s3://b/none/"));
    session.add(cart_item("1.2", "col", "not a location"));
    let sink = RecordingSink::default();

    let report = completed(app.start_batch(&mut session, &CancelToken::new(), &sink));

    assert_eq!(report.total_objects, 2);
    assert_eq!(report.completed_objects, 0);
    assert_eq!(report.completed_series(), 0);
    assert!(session.history().is_empty());
    assert_eq!(session.cart_count(), 0);
    assert!(
        sink.events
            .lock()
            .unwrap()
            .iter()
            .all(|event| event.progress.percent == 0)
    );
}

struct CancelAfterFirstObject {
    cancel: CancelToken,
}

impl ProgressSink for CancelAfterFirstObject {
    fn event(&self, event: ProgressEvent) {
        if event.progress.completed >= 1 {
            self.cancel.cancel();
        }
    }
}

#[test]
fn cancellation_stops_new_fetches_and_keeps_unfinished_items() {
    let (_temp, store) = temp_store();
    let client = MockStore::new()
        .with_series("b", "p/", &["p/1"], 10)
        .with_series("b", "q/", &["q/1", "q/2"], 10)
        .with_series("b", "r/", &["r/1"], 10);
    let app = App::new(store, client, DEFAULT_STORE_DOMAIN);
    let mut session = Session::new();
    session.add(cart_item("1.p", "col", "s3://b/p/"));
    session.add(cart_item("1.q", "col", "s3://b/q/"));
    session.add(cart_item("1.r", "col", "s3://b/r/"));
    let cancel = CancelToken::new();
    let sink = CancelAfterFirstObject {
        cancel: cancel.clone(),
    };

    let report = completed(app.start_batch(&mut session, &cancel, &sink));

    assert!(report.cancelled);
    assert_eq!(app.client().download_count(), 1);
    assert_matches!(report.series[0].status, SeriesStatus::Completed { .. });
    assert_matches!(report.series[1].status, SeriesStatus::NotStarted);
    assert_matches!(report.series[2].status, SeriesStatus::NotStarted);
    assert_eq!(session.history().len(), 1);
    let queued = session
        .cart()
        .iter()
        .map(|item| item.series_uid.as_str())
        .collect::<Vec<_>>();
    assert_eq!(queued, vec!["1.q", "1.r"]);
    assert!(session.progress().snapshot().is_idle());
}

struct Reentrant<'a> {
    app: &'a App<MockStore>,
    other: RefCell<Session>,
    outcome: RefCell<Option<BatchOutcome>>,
}

impl ProgressSink for Reentrant<'_> {
    fn event(&self, _event: ProgressEvent) {
        if self.outcome.borrow().is_some() {
            return;
        }
        let outcome =
            self.app
                .start_batch(&mut self.other.borrow_mut(), &CancelToken::new(), &JsonOutput);
        self.outcome.replace(Some(outcome));
    }
}

#[test]
fn concurrent_start_on_shared_progress_is_rejected() {
    let (_temp, store) = temp_store();
    let client = MockStore::new().with_series("b", "s/", &["s/1"], 10);
    let app = App::new(store, client, DEFAULT_STORE_DOMAIN);
    let mut session = Session::new();
    session.add(cart_item("1.1", "col", "s3://b/s/"));
    let sink = Reentrant {
        app: &app,
        other: RefCell::new(session.clone()),
        outcome: RefCell::new(None),
    };

    let report = completed(app.start_batch(&mut session, &CancelToken::new(), &sink));

    assert_matches!(
        sink.outcome.borrow().as_ref(),
        Some(BatchOutcome::Skipped {
            reason: SkipReason::AlreadyRunning
        })
    );
    assert_eq!(report.completed_series(), 1);
    assert_eq!(app.client().download_count(), 1);
    assert_eq!(sink.other.borrow().cart_count(), 1);
}

#[test]
fn cart_edits_saved_during_a_batch_survive() {
    let (_temp, store) = temp_store();
    let path = store.session_path();
    let mut seeded = Session::new();
    seeded.add(cart_item("1.1", "col", "s3://b/s/"));
    seeded.save(&path).unwrap();

    let client = MockStore::new().with_series("b", "s/", &["s/1"], 10);
    let app = App::new(store, client, DEFAULT_STORE_DOMAIN);
    let mut running = Session::load(&path).unwrap();
    let before = running.clone();

    let mut other = Session::load(&path).unwrap();
    other.add(cart_item("9.9", "col", "s3://b/t/"));
    other.save(&path).unwrap();

    app.start_batch(&mut running, &CancelToken::new(), &JsonOutput);
    let mut latest = Session::load(&path).unwrap();
    latest.merge_batch(&before, &running);
    latest.save(&path).unwrap();

    let reloaded = Session::load(&path).unwrap();
    let cart = reloaded
        .cart()
        .iter()
        .map(|item| item.series_uid.as_str())
        .collect::<Vec<_>>();
    assert_eq!(cart, vec!["9.9"]);
    assert_eq!(reloaded.history().len(), 1);
    assert_eq!(reloaded.history()[0].item.series_uid.as_str(), "1.1");
}
