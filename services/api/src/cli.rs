use crate::admin::{
    run_count, run_create, run_discard, run_freeze, run_import, run_list, CountArgs, CreateArgs,
    ImportArgs, BatchArgs, StoreArgs,
};
use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use edu_program::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Program Shortlisting Service",
    about = "Shortlist applicants by block and run the shortlisting HTTP service",
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
    /// Load jurisdictions, criteria and applicants from CSV exports
    Import(ImportArgs),
    /// Create, inspect and freeze shortlist batches
    Shortlist {
        #[command(subcommand)]
        command: ShortlistCommand,
    },
    /// Run an end-to-end shortlisting walkthrough on synthetic data
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum ShortlistCommand {
    /// Create a batch and select its applicants
    Create(CreateArgs),
    /// Count shortlisted applicants for blocks and a year
    Count(CountArgs),
    /// Freeze a batch so its blocks can be shortlisted again
    Freeze(BatchArgs),
    /// Delete an active batch and its selections
    Discard(BatchArgs),
    /// List every batch with its blocks
    List(StoreArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Override APP_DATABASE_PATH
    #[arg(long)]
    pub(crate) database: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Import(args) => run_import(args),
        Command::Shortlist { command } => match command {
            ShortlistCommand::Create(args) => run_create(args),
            ShortlistCommand::Count(args) => run_count(args),
            ShortlistCommand::Freeze(args) => run_freeze(args),
            ShortlistCommand::Discard(args) => run_discard(args),
            ShortlistCommand::List(args) => run_list(args),
        },
        Command::Demo(args) => run_demo(args),
    }
}
