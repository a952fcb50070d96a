//! bundlecheck: ingest a diagnostic bundle and run the rule catalog over it
//!
//! Usage:
//!   bundlecheck ingest collectinfo.tgz --db facts.db
//!   bundlecheck verify --db facts.db
//!   bundlecheck evaluate --db facts.db --json

use anyhow::{Context, Result};
use bundlecheck_core::{ClusterCheckConfig, FactStore};
use bundlecheck_ingest::Pipeline;
use bundlecheck_rules::{catalog, run_catalog, IntegrityReport, RuleStatus};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "bundlecheck")]
#[command(about = "Normalize diagnostic bundles into a fact store and evaluate health rules")]
struct Args {
    /// YAML or JSON file with archive markers and rule thresholds
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild the fact store from one bundle
    Ingest {
        archive: PathBuf,

        #[arg(long, default_value = "bundle_facts.db")]
        db: PathBuf,
    },

    /// Run every rule and fail if any of them broke against the schema
    Verify {
        #[arg(long, default_value = "bundle_facts.db")]
        db: PathBuf,
    },

    /// Print every verdict
    Evaluate {
        #[arg(long, default_value = "bundle_facts.db")]
        db: PathBuf,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn load_config(path: Option<&Path>) -> Result<ClusterCheckConfig> {
    match path {
        Some(p) => ClusterCheckConfig::load(p)
            .with_context(|| format!("Failed to load config {}", p.display())),
        None => Ok(ClusterCheckConfig::default()),
    }
}

fn evaluate_store(db: &Path, config: &ClusterCheckConfig) -> Result<IntegrityReport> {
    let store = FactStore::open_read_only(db)
        .with_context(|| format!("Failed to open fact store {}", db.display()))?;
    Ok(run_catalog(&catalog(&config.rules), &store))
}

fn ingest(archive: &Path, db: &Path, config: &ClusterCheckConfig) -> Result<()> {
    let store = FactStore::create(db)
        .with_context(|| format!("Failed to create fact store {}", db.display()))?;
    let summary = Pipeline::new(config.archive.clone())
        .ingest_archive(archive, &store)
        .with_context(|| format!("Failed to ingest {}", archive.display()))?;
    tracing::info!(db = %db.display(), run_id = %summary.run_id, "Fact store rebuilt");

    println!("Run:              {}", summary.run_id);
    if let Some(entry) = &summary.telemetry_entry {
        println!("Telemetry entry:  {}", entry);
    }
    println!("Nodes:            {}", summary.nodes);
    println!("Extractor runs:   {}", summary.extractor_runs);
    println!("Static config:    {} rows", summary.static_config_rows);
    if summary.is_complete() {
        println!("✓ All extractors succeeded");
    } else {
        println!("⚠ {} extractor failure(s):", summary.failures.len());
        for f in &summary.failures {
            println!("  {} on {}", f.extractor, f.node_id);
        }
    }
    Ok(())
}

fn print_report(report: &IntegrityReport) {
    for outcome in &report.outcomes {
        let v = &outcome.verdict;
        println!("[{:<12}] {:<4} {}", v.status.as_str(), v.id, v.name);
        println!("               {}", v.message);
    }
    println!();
    println!("─── SUMMARY ───");
    for status in [
        RuleStatus::Pass,
        RuleStatus::Warning,
        RuleStatus::Critical,
        RuleStatus::DataMissing,
    ] {
        println!("{:<14}{}", status.as_str(), report.count(status));
    }
    println!("{:<14}{}", "SCHEMA FAIL", report.schema_failures);
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bundlecheck=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Ingest { archive, db } => ingest(&archive, &db, &config),
        Command::Verify { db } => {
            let report = evaluate_store(&db, &config)?;
            for v in report.failures() {
                eprintln!("✗ {} {}: {}", v.id, v.name, v.message);
            }
            if report.is_sound() {
                println!("✓ {} rules ran cleanly against {}", report.outcomes.len(), db.display());
                Ok(())
            } else {
                eprintln!("✗ {} rule(s) failed against the fact store schema", report.schema_failures);
                std::process::exit(1);
            }
        }
        Command::Evaluate { db, json } => {
            let report = evaluate_store(&db, &config)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialize report")?
                );
            } else {
                print_report(&report);
            }
            Ok(())
        }
    }
}
