use crate::server;
use camp_registry::config::AppConfig;
use camp_registry::error::AppError;
use camp_registry::registration::legacy::import_file;
use camp_registry::registration::store;
use camp_registry::telemetry;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Camp Registry",
    about = "Run the sports camp registration service and its maintenance tasks",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Copy applications from a JSON export into the configured store
    ImportLegacy(ImportArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct ImportArgs {
    /// JSON array of application records, e.g. `data/applications.json`
    #[arg(default_value = "data/applications.json")]
    pub(crate) path: PathBuf,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::ImportLegacy(args) => run_import(args).await,
    }
}

async fn run_import(args: ImportArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let store = store::from_config(&config.storage.provider)?;
    store.init().await?;

    let report = import_file(store.as_ref(), &args.path).await?;
    println!(
        "Imported {} of {} applications from {} ({} already present)",
        report.inserted,
        report.read,
        args.path.display(),
        report.skipped
    );
    Ok(())
}
