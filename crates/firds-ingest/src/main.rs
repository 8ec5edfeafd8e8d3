//! FIRDS Ingest - DLTINS ingestion tool

use anyhow::{Context, Result};
use clap::Parser;
use firds_common::logging::{init_logging, LogConfig, LogLevel};
use firds_common::Table;
use firds_ingest::annotate::annotate;
use firds_ingest::config::{PipelineConfig, DEFAULT_LINK_INDEX};
use firds_ingest::extract::{collect_table, extract};
use firds_ingest::index::{select_link_from_file, TARGET_FILE_TYPE};
use firds_ingest::pipeline;
use firds_ingest::store::{Destination, TableStore};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "firds-ingest")]
#[command(author, version, about = "FIRDS DLTINS ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Run the whole pipeline: index, archive, extract, annotate, store
    Run {
        /// FIRDS file index URL
        #[arg(long, env = "FIRDS_INDEX_URL")]
        index_url: Option<String>,

        /// Zero-based position of the DLTINS link to ingest
        #[arg(long, env = "FIRDS_LINK_INDEX")]
        link_index: Option<usize>,

        /// Directory for downloads and extracted files
        #[arg(long, env = "FIRDS_WORK_DIR")]
        work_dir: Option<PathBuf>,

        /// Destination type: local, s3 or blob
        #[arg(short, long, env = "FIRDS_DESTINATION")]
        destination: Option<String>,

        /// Output path (bucket/key for object stores)
        #[arg(short, long, env = "FIRDS_DESTINATION_PATH")]
        path: Option<String>,

        /// Show download progress bars
        #[arg(long)]
        progress: bool,
    },

    /// Print a download link from a saved index file
    SelectLink {
        /// Index XML file
        #[arg(short, long)]
        input: PathBuf,

        /// File type to select
        #[arg(long, default_value = TARGET_FILE_TYPE)]
        file_type: String,

        /// Zero-based link position
        #[arg(long, default_value_t = DEFAULT_LINK_INDEX)]
        index: usize,
    },

    /// Extract instrument records from a DLTINS document to CSV
    Convert {
        /// DLTINS XML document
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Add a_count and contains_a columns to an extracted CSV
    Annotate {
        /// Input CSV file
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV file (defaults to overwriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Persist a CSV table to local disk, S3 or blob storage
    Store {
        /// Input CSV file
        #[arg(short, long)]
        input: PathBuf,

        /// Destination type: local, s3 or blob
        #[arg(short, long)]
        destination: String,

        /// Output path (bucket/key for object stores)
        #[arg(short, long)]
        path: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("firds-ingest")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Run {
            index_url,
            link_index,
            work_dir,
            destination,
            path,
            progress,
        } => {
            let mut config = PipelineConfig::from_env()?;
            if let Some(url) = index_url {
                config.index_url = url;
            }
            if let Some(index) = link_index {
                config.link_index = index;
            }
            if let Some(dir) = work_dir {
                config.work_dir = dir;
            }
            if let Some(kind) = destination {
                config.destination = kind.parse()?;
            }
            if let Some(path) = path {
                config.destination_path = path;
            }
            config.fetch.show_progress = progress;

            let report = pipeline::run(config, TableStore::from_env()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        },
        Command::SelectLink {
            input,
            file_type,
            index,
        } => {
            let url = select_link_from_file(&input, &file_type, index)?;
            println!("{}", url);
        },
        Command::Convert { input, output } => {
            let mut records = extract(&input)?;
            let table = collect_table(records.by_ref())?;

            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            table.write_csv_file(&output)?;

            info!(
                records = table.len(),
                skipped = records.skipped(),
                output = %output.display(),
                "Converted document"
            );
        },
        Command::Annotate { input, output } => {
            let mut table = Table::read_csv(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            annotate(&mut table)?;

            let output = output.unwrap_or(input);
            table.write_csv_file(&output)?;
            info!(rows = table.len(), output = %output.display(), "Annotated table");
        },
        Command::Store {
            input,
            destination,
            path,
        } => {
            let destination: Destination = destination.parse()?;
            let table = Table::read_csv(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;

            let location = TableStore::from_env().store(&table, destination, &path).await?;
            println!("{}", location);
        },
    }

    Ok(())
}
