use clap::Parser;
use coursemart::application::{Collaborators, CoreServices, StoreSet};
use coursemart::config::AppConfig;
use coursemart::infrastructure::collaborators::{
    Fixture, InMemoryCourseCatalog, InMemoryPaymentGateway, InMemoryUserDirectory, LoggingNotifier,
};
use coursemart::interfaces::api::ApiRouter;
use coursemart::interfaces::csv::payments_writer::PaymentsWriter;
use coursemart::interfaces::jsonl::script_reader::ScriptReader;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input requests as JSONL, one API call per line
    script: PathBuf,

    /// JSON fixture seeding the catalog and user directory fakes
    #[arg(long)]
    fixture: PathBuf,

    /// Optional JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Write every payment row as CSV to this file after the script runs
    #[arg(long)]
    export_payments: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path).into_diagnostic()?,
        None => AppConfig::default(),
    };

    let stores = match &cli.db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => StoreSet::rocksdb(path).into_diagnostic()?,
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            return Err(miette::miette!(
                "this build has no persistent storage; rebuild with --features storage-rocksdb"
            ));
        }
        None => StoreSet::in_memory(),
    };

    // Collaborator fakes, seeded from the fixture.
    let fixture_raw = std::fs::read_to_string(&cli.fixture).into_diagnostic()?;
    let fixture: Fixture = serde_json::from_str(&fixture_raw).into_diagnostic()?;
    let catalog = Arc::new(InMemoryCourseCatalog::new());
    catalog.seed(fixture.courses).await;
    let users = Arc::new(InMemoryUserDirectory::new());
    users.seed(fixture.users).await;
    let gateway = Arc::new(InMemoryPaymentGateway::new(config.server_secret.clone()));

    let collaborators = Collaborators {
        catalog,
        users: users.clone(),
        gateway: gateway.clone(),
        notifier: Arc::new(LoggingNotifier),
    };
    let services = CoreServices::new(config, stores, collaborators);
    let ledger = Arc::clone(&services.ledger);
    let router = ApiRouter::new(services, users).with_sandbox_gateway(gateway);

    // Stream the script; one JSON response per request line.
    let file = File::open(&cli.script).into_diagnostic()?;
    let reader = ScriptReader::new(file);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for request in reader.requests() {
        match request {
            Ok(request) => {
                let response = router.handle(request).await;
                let line = serde_json::to_string(&response).into_diagnostic()?;
                writeln!(out, "{line}").into_diagnostic()?;
            }
            Err(e) => {
                eprintln!("Error reading request: {e}");
            }
        }
    }

    if let Some(path) = &cli.export_payments {
        let payments = ledger.export_payments().await.into_diagnostic()?;
        let sink = File::create(path).into_diagnostic()?;
        let mut writer = PaymentsWriter::new(sink);
        writer.write_payments(payments).into_diagnostic()?;
    }

    Ok(())
}
