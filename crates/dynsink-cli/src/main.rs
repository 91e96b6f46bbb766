//! dynsink CLI - load change records into schema-following tables.

mod input;

use clap::{Parser, Subcommand};
use dynsink::error::EXIT_PARTIAL_WRITE;
use dynsink::{Config, MemoryCatalog, SchemaSyncWriter, SinkError, TableExistence, TableId};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "dynsink")]
#[command(about = "Write change records into tables that evolve with them")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a JSON-lines record file into a table
    Write {
        /// Target table as NAMESPACE.TABLE
        #[arg(long)]
        table: String,

        /// JSON-lines file with one record per line
        #[arg(long)]
        input: PathBuf,

        /// Write into an in-memory catalog and print the statements instead
        #[arg(long)]
        memory: bool,
    },

    /// Report whether a table exists
    CheckTable {
        /// Table as NAMESPACE.TABLE
        #[arg(long)]
        table: String,
    },

    /// Test the target database connection
    HealthCheck,
}

#[derive(Debug, Serialize)]
struct HealthCheckResult {
    target_type: String,
    connected: bool,
    latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct CheckTableResult {
    table: String,
    existence: TableExistence,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, SinkError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(SinkError::Config)?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Write {
            table,
            input,
            memory,
        } => {
            // Fail on a malformed table before reading input or connecting
            TableId::parse(&table)?;

            let content = std::fs::read_to_string(&input)?;
            let records = input::parse_records(&content)
                .map_err(|e| SinkError::Config(format!("{:#}", e)))?;
            info!("Read {} records from {:?}", records.len(), input);

            let catalog = memory.then(MemoryCatalog::new);
            let writer = match &catalog {
                Some(catalog) => {
                    SchemaSyncWriter::new(Arc::new(catalog.clone()), config.writer.clone())
                }
                None => SchemaSyncWriter::from_config(&config).await?,
            };

            let report = writer.write(&table, &records).await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                if let Some(catalog) = &catalog {
                    println!("Statements:");
                    for sql in catalog.sql_log() {
                        println!("  {};", sql);
                    }
                    println!();
                }
                println!("Write completed for {}", report.table);
                println!("  Table created: {}", if report.created { "yes" } else { "no" });
                if !report.columns_added.is_empty() {
                    println!("  Columns added: {}", report.columns_added.join(", "));
                }
                println!(
                    "  Records: {} inserted, {} failed",
                    report.inserted_count(),
                    report.failed_count()
                );
                println!("  Duration: {}ms", report.duration_ms());
                for issue in &report.schema_issues {
                    println!("  Schema issue on {}: {}", issue.column, issue.message);
                }
                for failure in report.failures() {
                    println!(
                        "  Record {} ({}/{}@{}) failed: {:?}",
                        failure.index,
                        failure.topic,
                        failure.partition,
                        failure.offset,
                        failure.status
                    );
                }
                if let Some(ref err) = report.error {
                    println!("  Batch error: {}", err);
                }
            }

            if !report.is_success() {
                return Ok(ExitCode::from(EXIT_PARTIAL_WRITE));
            }
        }

        Commands::CheckTable { table } => {
            let writer = SchemaSyncWriter::from_config(&config).await?;
            let existence = writer.probe(&table).await?;

            if cli.output_json {
                let result = CheckTableResult { table, existence };
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}: {}", table, existence);
            }
        }

        Commands::HealthCheck => {
            let start = Instant::now();
            let outcome = match dynsink::drivers::connect(&config.target).await {
                Ok(provider) => provider.connect().await.map(|_| ()),
                Err(e) => Err(e),
            };
            let result = HealthCheckResult {
                target_type: config.target.r#type.clone(),
                connected: outcome.is_ok(),
                latency_ms: start.elapsed().as_millis() as u64,
                error: outcome.as_ref().err().map(|e| e.to_string()),
            };

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Target ({}): {} ({}ms)",
                    result.target_type,
                    if result.connected { "OK" } else { "FAILED" },
                    result.latency_ms
                );
                if let Some(ref err) = result.error {
                    println!("    Error: {}", err);
                }
            }

            outcome?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("Invalid log format '{}'. Valid values: text, json", other)),
    }

    Ok(())
}
