use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use dicom_cart::app::{App, BatchOutcome, SeriesStatus, SkipReason};
use dicom_cart::catalog::{Catalog, CatalogFile, DEFAULT_SEARCH_LIMIT, FilterKind, SeriesFilter};
use dicom_cart::config::{ConfigLoader, ResolvedConfig};
use dicom_cart::domain::{CartItem, SeriesUid, Source};
use dicom_cart::error::CartError;
use dicom_cart::output::{CartSummary, JsonOutput, LogProgress, OutputMode};
use dicom_cart::progress::CancelToken;
use dicom_cart::s3::StoreHttpClient;
use dicom_cart::session::Session;
use dicom_cart::store::Store;
use dicom_cart::tui::Tui;

#[derive(Parser)]
#[command(name = "dicom-cart")]
#[command(about = "Queue public imaging series (IDC) and retrieve them from object storage")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Search a catalog export")]
    Search(SearchArgs),
    #[command(about = "List distinct values of a catalog column")]
    Facets(FacetArgs),
    #[command(about = "Add series from a catalog export to the cart")]
    Add(AddArgs),
    #[command(about = "Remove a series from the cart")]
    Remove(RemoveArgs),
    #[command(about = "Empty the cart")]
    Clear,
    #[command(about = "Show cart contents")]
    Cart,
    #[command(about = "Show completed retrievals, newest first")]
    History,
    #[command(about = "Download every series in the cart")]
    Fetch,
}

#[derive(Args)]
struct CatalogArgs {
    #[arg(long)]
    catalog: PathBuf,
}

#[derive(Args)]
struct SearchArgs {
    #[command(flatten)]
    catalog: CatalogArgs,

    #[arg(long)]
    collection: Option<String>,

    #[arg(long)]
    modality: Option<String>,

    #[arg(long)]
    body_part: Option<String>,

    #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
    limit: usize,
}

#[derive(Args)]
struct FacetArgs {
    #[command(flatten)]
    catalog: CatalogArgs,

    #[arg(value_enum)]
    kind: FilterKind,

    #[arg(long)]
    collection: Option<String>,
}

#[derive(Args)]
struct AddArgs {
    #[command(flatten)]
    catalog: CatalogArgs,

    #[arg(required = true)]
    series: Vec<String>,

    #[arg(long, value_enum, default_value_t = Source::Idc)]
    source: Source,
}

#[derive(Args)]
struct RemoveArgs {
    series: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<CartError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CartError) -> u8 {
    match error {
        CartError::SeriesNotFound(_)
        | CartError::ConfigRead(_)
        | CartError::ConfigParse(_)
        | CartError::CatalogRead(_) => 2,
        CartError::ListingHttp(_)
        | CartError::ListingStatus { .. }
        | CartError::TransferHttp(_)
        | CartError::TransferStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let store = Store::new(&config);

    match cli.command {
        Commands::Search(args) => run_search(args),
        Commands::Facets(args) => {
            let catalog = CatalogFile::open(&args.catalog.catalog)?;
            let values = catalog.facet_values(args.kind, args.collection.as_deref())?;
            JsonOutput::print_values(&values).into_diagnostic()
        }
        Commands::Add(args) => run_add(args, &store),
        Commands::Remove(args) => {
            let series: SeriesUid = args.series.parse()?;
            let mut session = Session::load(&store.session_path())?;
            if !session.remove(&series) {
                tracing::warn!(series = %series, "series not in cart");
            }
            session.save(&store.session_path())?;
            print_cart(&session)
        }
        Commands::Clear => {
            let mut session = Session::load(&store.session_path())?;
            session.clear();
            session.save(&store.session_path())?;
            print_cart(&session)
        }
        Commands::Cart => print_cart(&Session::load(&store.session_path())?),
        Commands::History => {
            let session = Session::load(&store.session_path())?;
            JsonOutput::print_history(session.history()).into_diagnostic()
        }
        Commands::Fetch => run_fetch(config, store, output_mode),
    }
}

fn run_search(args: SearchArgs) -> miette::Result<()> {
    let catalog = CatalogFile::open(&args.catalog.catalog)?;
    let mut filter = SeriesFilter::default();
    for (kind, value) in [
        (FilterKind::Collection, args.collection),
        (FilterKind::Modality, args.modality),
        (FilterKind::BodyPart, args.body_part),
    ] {
        if let Some(value) = value {
            filter.set(kind, &value);
        }
    }
    let records = catalog.search(&filter, args.limit)?;
    JsonOutput::print_series(&records).into_diagnostic()
}

fn run_add(args: AddArgs, store: &Store) -> miette::Result<()> {
    let catalog = CatalogFile::open(&args.catalog.catalog)?;
    let mut session = Session::load(&store.session_path())?;
    for series in &args.series {
        let record = catalog.find(series.trim())?;
        let item = CartItem::from_record(&record, args.source, chrono::Utc::now())?;
        if !session.add(item) {
            tracing::info!(series = %series, "already in cart");
        }
    }
    session.save(&store.session_path())?;
    print_cart(&session)
}

fn run_fetch(config: ResolvedConfig, store: Store, output_mode: OutputMode) -> miette::Result<()> {
    let session_path = store.session_path();
    let mut session = Session::load(&session_path)?;
    let before = session.clone();
    let client = StoreHttpClient::new(&config.store)?;
    let app = App::new(store, client, config.store.domain.clone());
    let cancel = CancelToken::new();

    let (session, outcome) = match output_mode {
        OutputMode::Interactive => {
            let mut tui = Tui::new();
            let worker_cancel = cancel.clone();
            tui.run_batch(cancel, move |sink| {
                let outcome = app.start_batch(&mut session, &worker_cancel, sink);
                (session, outcome)
            })?
        }
        OutputMode::NonInteractive => {
            let outcome = app.start_batch(&mut session, &cancel, &LogProgress::default());
            (session, outcome)
        }
    };
    // Other invocations may have edited the cart while the batch ran.
    let mut latest = Session::load(&session_path)?;
    latest.merge_batch(&before, &session);
    latest.save(&session_path)?;

    match (&outcome, output_mode) {
        (_, OutputMode::NonInteractive) => JsonOutput::print_batch(&outcome).into_diagnostic(),
        (BatchOutcome::Skipped { reason }, OutputMode::Interactive) => {
            match reason {
                SkipReason::EmptyCart => println!("Cart is empty, nothing to download."),
                SkipReason::AlreadyRunning => println!("A download is already running."),
            }
            Ok(())
        }
        (BatchOutcome::Completed(report), OutputMode::Interactive) => {
            for series in &report.series {
                match &series.status {
                    SeriesStatus::Completed {
                        path,
                        downloaded,
                        skipped,
                        ..
                    } => println!(
                        "ok       {}  {downloaded} downloaded, {skipped} present  {path}",
                        series.series_uid
                    ),
                    SeriesStatus::Failed { error } => {
                        println!("failed   {}  {error}", series.series_uid)
                    }
                    SeriesStatus::NotStarted => println!("queued   {}", series.series_uid),
                }
            }
            println!(
                "{}/{} series, {} objects, {} bytes{}",
                report.completed_series(),
                report.series.len(),
                report.completed_objects,
                report.downloaded_bytes,
                if report.cancelled { " (cancelled)" } else { "" }
            );
            Ok(())
        }
    }
}

fn print_cart(session: &Session) -> miette::Result<()> {
    JsonOutput::print_cart(&CartSummary {
        count: session.cart_count(),
        total_size_mb: session.total_size_mb(),
        items: session.cart(),
    })
    .into_diagnostic()
}
