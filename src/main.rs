//! Command-line interface for certgen
//!
//! # Usage Examples
//!
//! ## Generation
//! ```bash
//! # Advised sizing for this host
//! certgen generate --num-clients 1000000 --num-certificates 2000000
//!
//! # Explicit sizing, custom locations
//! certgen generate \
//!   --num-clients 10000 --num-certificates 20000 \
//!   --batch-size 5000 --num-workers 4 --write-buffer-size 20000 \
//!   --db-path /tmp/certs.db --output-dir /tmp/report
//!
//! # Clients and certificates straight to CSV, no database
//! certgen dump --num-clients 1000 --num-certificates 2000
//! ```
//!
//! ## Queries
//! ```bash
//! certgen active --page 1 --page-size 100 --client-id 7
//! certgen assignments --skip 0 --limit 50 --active-only
//! ```
//!
//! Every sizing and path option also reads its environment variable
//! (`NUM_CLIENTS`, `NUM_CERTIFICATES`, `BATCH_SIZE`, `NUM_WORKERS`,
//! `BUFFER_SIZE`, `DB_PATH`, `OUTPUT_DIR`).

use anyhow::Context;
use certgen::export::dump_generated_entities;
use certgen::{GenerationRequest, PathOpts, SizingOpts};
use certgen_advisor::{advise, HostResources};
use certgen_generator::RecordGenerator;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "certgen")]
#[command(about = "Synthetic client/certificate data generator with buffered SQLite ingestion")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate clients, certificates and assignments into the store and
    /// write the active-certificate report
    Generate {
        #[command(flatten)]
        sizing: SizingOpts,

        #[command(flatten)]
        paths: PathOpts,

        /// Seconds between progress log lines
        #[arg(long, default_value = "5")]
        progress_interval: u64,
    },

    /// Print the sizing the advisor picks for this host
    Advise {
        #[arg(long, default_value = "1000", env = "NUM_CLIENTS")]
        num_clients: u64,

        #[arg(long, default_value = "2000", env = "NUM_CERTIFICATES")]
        num_certificates: u64,
    },

    /// List active certificates, one page at a time
    Active {
        /// Page number, starting at 1
        #[arg(long, default_value = "1")]
        page: u64,

        #[arg(long, default_value = "100")]
        page_size: u64,

        /// Only this client's certificates
        #[arg(long)]
        client_id: Option<i64>,

        #[command(flatten)]
        paths: PathOpts,
    },

    /// List assignments with their active status
    Assignments {
        #[arg(long, default_value = "0")]
        skip: u64,

        #[arg(long, default_value = "100")]
        limit: u64,

        /// Only this client's assignments
        #[arg(long)]
        client_id: Option<i64>,

        /// Skip expired assignments
        #[arg(long)]
        active_only: bool,

        #[command(flatten)]
        paths: PathOpts,
    },

    /// Write generated clients and certificates to CSV without a store
    Dump {
        #[command(flatten)]
        sizing: SizingOpts,

        /// Directory for clients.csv and certificates.csv
        #[arg(long, default_value = "output", env = "OUTPUT_DIR")]
        output_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            sizing,
            paths,
            progress_interval,
        } => run_generate(&sizing, &paths, progress_interval).await?,
        Commands::Advise {
            num_clients,
            num_certificates,
        } => {
            let host = HostResources::detect();
            print_json(&advise(num_clients, num_certificates, &host))?;
        }
        Commands::Active {
            page,
            page_size,
            client_id,
            paths,
        } => {
            let page = paths
                .service()
                .list_active_certificates(page, page_size, client_id)?;
            print_json(&page)?;
        }
        Commands::Assignments {
            skip,
            limit,
            client_id,
            active_only,
            paths,
        } => {
            let page = paths
                .service()
                .list_assignments(skip, limit, client_id, active_only)?;
            print_json(&page)?;
        }
        Commands::Dump { sizing, output_dir } => {
            let generator = RecordGenerator::new(
                sizing.num_clients,
                sizing.num_certificates,
                sizing.batch_size,
                sizing.num_workers,
            )?;
            let report = tokio::task::spawn_blocking(move || {
                dump_generated_entities(&generator, &output_dir)
            })
            .await
            .context("Dump task panicked")??;
            info!(
                "Wrote {} and {}",
                report.clients.path.display(),
                report.certificates.path.display()
            );
        }
    }

    Ok(())
}

async fn run_generate(
    sizing: &SizingOpts,
    paths: &PathOpts,
    progress_interval: u64,
) -> anyhow::Result<()> {
    let service = paths.service();
    let accepted = service.start_generation(GenerationRequest::from(sizing))?;
    info!(
        "{} (estimated data size {:.3} GB)",
        accepted.message, accepted.estimated_data_size_gb
    );

    let status = service.status_handle();
    let reporter = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(progress_interval.max(1)));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let snapshot = status.snapshot();
            if !snapshot.is_running {
                break;
            }
            info!(
                "{}: {}/{} (eta {:.0}s)",
                snapshot.current_stage,
                snapshot.progress,
                snapshot.total,
                snapshot.estimated_time_remaining.unwrap_or(0.0)
            );
        }
    });

    let result = service.wait_for_generation().await;
    reporter.abort();
    let final_status = result.context("Generation did not complete")?;

    print_json(&final_status)?;
    let report = service.download_active_certificates_report()?;
    info!("Active certificates report: {}", report.display());
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}
