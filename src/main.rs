use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use fundcache::cli::fetch::FetchArgs;
use fundcache::core::log::init_logging;
use fundcache::output::OutputFormat;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Print the price series of a fund, filling the local cache as needed
    Fetch {
        /// Fund code, e.g. AFT
        symbol: String,
        /// First day, YYYY-MM-DD
        #[arg(long)]
        start: String,
        /// Last day, YYYY-MM-DD; defaults to today
        #[arg(long)]
        end: Option<String>,
        /// Target currency; defaults to the configured currency
        #[arg(long)]
        currency: Option<String>,
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => fundcache::cli::setup::setup(),
        Some(Commands::Fetch {
            symbol,
            start,
            end,
            currency,
            format,
        }) => {
            let args = FetchArgs {
                symbol,
                start,
                end,
                currency,
                format,
            };
            fundcache::run_command(fundcache::AppCommand::Fetch(args), cli.config_path.as_deref())
                .await
        }
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %format!("{e:#}"), "Application failed");
    }
    result
}
