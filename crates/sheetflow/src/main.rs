//! Sheetflow CLI
//!
//! Usage:
//!   sheetflow discover --config tap.json --table orders
//!   sheetflow sample --config tap.json --table orders
//!   sheetflow crawl --config tap.json
//!   sheetflow sync --config tap.json --state state.json > records.jsonl

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sheetflow_logging::LogConfig;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "sheetflow")]
#[command(author, version, about = "Discover and extract rows from spreadsheet-like files", long_about = None)]
struct Cli {
    /// Enable debug logging on stderr
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the files a table would read, oldest first
    Discover {
        /// Config file (JSON, or TOML by extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Only this table (default: every selected table)
        #[arg(short, long)]
        table: Option<String>,

        /// Only files modified after this timestamp (default: the table's start_date)
        #[arg(long)]
        since: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Sample rows from a table's files
    Sample {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(short, long)]
        table: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate table specs for every crawl source in the config
    Crawl {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Emit RECORD and STATE messages for tables as JSON lines on stdout
    Sync {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(short, long)]
        table: Option<String>,

        /// Bookmarks from a previous run
        #[arg(long)]
        state: Option<PathBuf>,
    },
}

fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Discover {
            config,
            table,
            since,
            json,
        } => cli::discover::run(cli::discover::DiscoverArgs {
            config,
            table,
            since,
            json,
        }),
        Commands::Sample {
            config,
            table,
            json,
        } => cli::sample::run(cli::sample::SampleArgs {
            config,
            table,
            json,
        }),
        Commands::Crawl { config } => cli::crawl::run(cli::crawl::CrawlArgs { config }),
        Commands::Sync {
            config,
            table,
            state,
        } => cli::sync::run(cli::sync::SyncArgs {
            config,
            table,
            state,
        }),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match sheetflow_logging::init_logging(LogConfig {
        app_name: "sheetflow",
        verbose: cli.verbose,
    }) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: logging disabled: {err:#}");
            None
        }
    };

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}
