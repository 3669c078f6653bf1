use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use jobsift_core::Platform;
use jobsift_export::{ExportPipeline, PlatformExportSummary, PlatformRegistry};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "jobsift")]
#[command(about = "ATS job snapshot export, diff, and consolidation pipeline")]
struct Cli {
    /// Data root holding the per-platform directories.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Export snapshots for one platform, or every enabled platform.
    Export {
        #[arg(long)]
        platform: Option<Platform>,
    },
    /// Merge per-platform snapshots and diffs into the root corpus.
    Gather,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let pipeline = ExportPipeline::new(&cli.root);
    let registry = PlatformRegistry::load(&cli.root)?;

    match cli.command.unwrap_or(Commands::Export { platform: None }) {
        Commands::Export {
            platform: Some(platform),
        } => {
            let summary = pipeline.export_platform(&registry.entry_for(platform))?;
            print_export_summary(&summary);
        }
        Commands::Export { platform: None } => {
            for summary in pipeline.export_all(&registry)? {
                print_export_summary(&summary);
            }
            gather(&pipeline)?;
        }
        Commands::Gather => {
            gather(&pipeline)?;
        }
    }

    Ok(())
}

fn print_export_summary(summary: &PlatformExportSummary) {
    println!(
        "[{}] Processed {} total jobs from {} companies",
        summary.platform, summary.jobs, summary.companies
    );
    if let Some(diff_path) = &summary.diff_path {
        if let Some(name) = diff_path.file_name() {
            println!("[{}] Created diff file: {}", summary.platform, name.to_string_lossy());
        }
    }
}

fn gather(pipeline: &ExportPipeline) -> Result<()> {
    match pipeline.consolidate()? {
        Some(summary) => {
            println!(
                "Consolidated {} snapshots into {} unique jobs ({} duplicates dropped)",
                summary.snapshot_files, summary.unique_rows, summary.duplicates_dropped
            );
            if let Some(diff_path) = &summary.diff_path {
                if let Some(name) = diff_path.file_name() {
                    println!(
                        "Merged {} diff files ({} rows) into {}",
                        summary.diff_files,
                        summary.diff_rows,
                        name.to_string_lossy()
                    );
                }
            }
        }
        None => println!("No platform snapshots found; nothing to consolidate."),
    }
    Ok(())
}
