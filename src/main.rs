use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use dataforge::config::Config;
use dataforge::db::SqliteStorage;
use dataforge::logging;
use dataforge::pipeline::ingest::{column_info, file_info, ingest_file, read_rows_from_path};
use dataforge::pipeline::{process, RuleSet};
use dataforge::server;
use dataforge::storage::Storage;

const PREVIEW_ROWS: usize = 5;

#[derive(Parser)]
#[command(name = "dataforge")]
#[command(about = "CSV ingestion and query service")]
#[command(version = "0.1.0")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest and process a CSV file
    Ingest {
        /// Path to the CSV file
        file: PathBuf,
        /// Validate and print the first rows without saving
        #[arg(long, short)]
        preview: bool,
        /// Print per-column information
        #[arg(long, short)]
        verbose: bool,
    },
    /// Start the HTTP API server
    Serve {
        /// Host address (overrides config file)
        #[arg(long)]
        host: Option<String>,
        /// Port number (overrides config file)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Show processing statistics
    Status,
    /// List recent ingest jobs
    Jobs,
    /// Initialize the database
    InitDb,
}

fn open_storage(config: &Config) -> anyhow::Result<Arc<dyn Storage>> {
    let storage = SqliteStorage::open(&config.database.path)?;
    Ok(Arc::new(storage))
}

async fn run_ingest(
    config: &Config,
    rules: &RuleSet,
    file: &PathBuf,
    preview: bool,
    verbose: bool,
) -> anyhow::Result<()> {
    if !file.exists() {
        println!("❌ File not found: {}", file.display());
        std::process::exit(1);
    }

    println!("📂 Loading: {}", file.display());
    let (headers, rows) = read_rows_from_path(file)?;
    let info = file_info(file, &headers, &rows)?;
    println!(
        "✅ Loaded {} rows, {} columns ({} bytes)",
        info.row_count, info.column_count, info.size_bytes
    );

    if verbose {
        println!("\nColumn info:");
        for column in column_info(&headers, &rows) {
            println!(
                "   • {}: {} empty, samples: {:?}",
                column.name, column.empty_count, column.sample_values
            );
        }
    }

    if preview {
        println!("\n🔍 Preview (first {PREVIEW_ROWS} rows, not saved):");
        for row in rows.iter().take(PREVIEW_ROWS) {
            match process(row, rules) {
                Ok(record) => {
                    let columns: Vec<String> = record
                        .iter()
                        .map(|(name, value)| format!("{name}={value:?}"))
                        .collect();
                    println!("   row {}: ✓ {}", row.index(), columns.join(", "));
                }
                Err(errors) => {
                    let messages: Vec<&str> =
                        errors.iter().map(|e| e.message.as_str()).collect();
                    println!("   row {}: ✗ {}", row.index(), messages.join("; "));
                }
            }
        }
        return Ok(());
    }

    println!("\n💾 Saving to database...");
    let storage = open_storage(config)?;
    let report = ingest_file(file, rules, storage).await?;

    println!("✅ Valid: {}", report.valid_rows);
    println!("⚠️  Invalid: {}", report.invalid_rows);
    if !report.errors.is_empty() {
        println!("\n⚠️  Validation errors:");
        for error in &report.errors {
            println!(
                "   - row {} column '{}': {}",
                error.row, error.column, error.message
            );
        }
    }
    if let Some(job_id) = report.job_id {
        println!(
            "\n✅ Saved {} records (Job ID: {})",
            report.total_rows, job_id
        );
    }

    Ok(())
}

async fn run_status(config: &Config) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let stats = storage.stats().await?;

    println!("📊 DataForge status");
    println!("   Total records:   {}", stats.total_records);
    println!("   Valid records:   {}", stats.valid_records);
    println!("   Invalid records: {}", stats.invalid_records);
    println!("   Ingest jobs:     {}", stats.total_jobs);
    println!("   Completed jobs:  {}", stats.completed_jobs);
    println!("   Failed jobs:     {}", stats.failed_jobs);
    Ok(())
}

async fn run_jobs(config: &Config) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let jobs = storage.list_jobs(10).await?;

    if jobs.is_empty() {
        println!("No jobs found");
        return Ok(());
    }

    println!("📋 Recent ingest jobs:");
    for job in jobs {
        let id = job
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "   {} {} [{}] rows={} valid={} invalid={}",
            id,
            job.filename,
            job.status.as_str(),
            job.total_rows,
            job.valid_rows,
            job.invalid_rows
        );
        if let Some(message) = &job.error_message {
            println!("      error: {message}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    logging::init_logging();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            println!("❌ {e}");
            std::process::exit(1);
        }
    };

    // Compile the rule set up front: a bad rule aborts before any row is
    // processed.
    let rules = match RuleSet::compile(&config.rules) {
        Ok(rules) => rules,
        Err(e) => {
            error!("Invalid rule configuration: {}", e);
            println!("❌ {e}");
            std::process::exit(1);
        }
    };
    info!("Compiled {} validation rules", rules.len());

    match cli.command {
        Commands::Ingest {
            file,
            preview,
            verbose,
        } => {
            run_ingest(&config, &rules, &file, preview, verbose).await?;
        }
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let storage = open_storage(&config)?;

            if let Err(e) = server::start_server(storage, Arc::new(rules), &host, port).await {
                error!("Server failed: {}", e);
                println!("❌ Server failed: {e}");
                std::process::exit(1);
            }
        }
        Commands::Status => {
            run_status(&config).await?;
        }
        Commands::Jobs => {
            run_jobs(&config).await?;
        }
        Commands::InitDb => {
            println!("🔧 Initializing database at {}", config.database.path);
            open_storage(&config)?;
            println!("✅ Database initialized");
        }
    }
    Ok(())
}
