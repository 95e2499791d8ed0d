use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crawler_stats::commands;
use crawler_stats::config::{resolve_data_root, AggregateArgs, WindowArgs};
use crawler_stats::crawl::CancelFlag;
use crawler_stats::logging;
use crawler_stats::renderer::DEFAULT_SORT_METRIC;

#[derive(Parser)]
#[command(name = "crawler-stats", version)]
#[command(
    about = "Aggregate crawler execution statistics over a calendar window",
    long_about = None
)]
struct Cli {
    /// Directory for the local store and logs
    /// (defaults to $CRAWLER_STATS_DATA_DIR or .crawler-stats)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate every crawler's executions in a window and store the report
    Aggregate(AggregateArgs),
    /// Print the window and report key for a period
    Window(WindowArgs),
    /// Render a stored report JSON file
    Render {
        /// Path to the report JSON (a `*_data` record)
        #[arg(long)]
        report: PathBuf,

        /// Render formats (comma-separated: html,md)
        #[arg(long, value_delimiter = ',', default_value = "html")]
        formats: Vec<String>,

        /// Output directory (defaults to current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Metric the crawler sections are ordered by
        #[arg(long, default_value = DEFAULT_SORT_METRIC)]
        sort_metric: String,
    },
    /// List the records in the local SQLite store
    Reports {
        /// Print the body of this record instead of the listing
        #[arg(long)]
        key: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_root = cli.data_dir.unwrap_or_else(resolve_data_root);

    match cli.command {
        Commands::Aggregate(args) => {
            logging::init_logging(&data_root, "aggregate")?;
            let output = tokio::runtime::Runtime::new()
                .context("Failed to create Tokio runtime")?
                .block_on(async {
                    let cancel = CancelFlag::new();
                    let on_interrupt = cancel.clone();
                    tokio::spawn(async move {
                        if tokio::signal::ctrl_c().await.is_ok() {
                            eprintln!("Interrupted, stopping after the current page...");
                            on_interrupt.cancel();
                        }
                    });
                    commands::aggregate::run(&args, &data_root, &cancel).await
                })?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Window(args) => {
            commands::window::run(&args)?;
        }
        Commands::Render {
            report,
            formats,
            output,
            sort_metric,
        } => {
            logging::init_logging(&data_root, "render")?;
            tokio::runtime::Runtime::new()
                .context("Failed to create Tokio runtime")?
                .block_on(commands::render::run(&report, &formats, output, &sort_metric))?;
        }
        Commands::Reports { key } => {
            commands::reports::run(&data_root, key.as_deref())?;
        }
    }

    Ok(())
}
