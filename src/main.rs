mod config;
mod error;
mod history;
mod ingest;
mod linker;
mod metrics;
mod normalize;
mod report;
mod types;

use std::path::Path;

use chrono::Local;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, HISTORY_DIR, LISTINGS_FILE, PARCELS_FILE, REPORT_FILE, SALES_FILE};
use crate::error::{AppError, Result};
use crate::history::HistoryStore;
use crate::ingest::IngestStats;
use crate::metrics::MetricEngine;
use crate::types::{CommitOutcome, HealthSummary, RunReport};

fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg) {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

fn run(cfg: Config) -> Result<()> {
    let report_date = cfg
        .report_date
        .unwrap_or_else(|| Local::now().date_naive());
    let data_dir = Path::new(&cfg.data_dir);
    info!(
        report_date = %report_date,
        data_dir = %data_dir.display(),
        "market pulse run starting"
    );

    let mut store = HistoryStore::open(
        data_dir.join(HISTORY_DIR),
        cfg.history_retention,
        cfg.integrity_min_ratio,
    )?;

    // Listings are the subject of every metric — nothing to do without them.
    let (listings, listing_stats) = ingest::load_listings(&data_dir.join(LISTINGS_FILE))?;

    // County data is optional: a missing file degrades the run to the
    // listing-only metrics instead of failing it.
    let (parcels, parcel_stats, parcels_present) =
        load_optional(&data_dir.join(PARCELS_FILE), ingest::load_parcels)?;
    let (sales, sale_stats, sales_present) =
        load_optional(&data_dir.join(SALES_FILE), ingest::load_sales)?;

    let (matched, link_stats) = linker::link(listings, &parcels, &sales);

    // Compute against the pre-commit snapshot — committing first would make
    // Price Cut Velocity compare the run against itself.
    let engine = MetricEngine::new(report_date);
    let (results, metric_stats) = engine.compute(&matched, store.latest());

    let candidate = engine.snapshot(&matched);
    store.stage(candidate);
    let commit = match store.commit() {
        Ok(rows) => CommitOutcome::Committed { rows },
        Err(AppError::Integrity {
            candidate_rows,
            previous_rows,
        }) => {
            error!(
                candidate_rows,
                previous_rows, "integrity gate rejected the snapshot; previous state kept"
            );
            CommitOutcome::Rejected {
                candidate_rows,
                previous_rows,
            }
        }
        Err(e) => return Err(e),
    };

    let health = HealthSummary {
        total_listings: link_stats.total_listings,
        matched_listings: link_stats.matched,
        ambiguous_collisions: link_stats.ambiguous_keys,
        malformed_rows: listing_stats.malformed + parcel_stats.malformed + sale_stats.malformed,
        invalid_metric_inputs: metric_stats.invalid_inputs,
        parcels_present,
        sales_present,
    };

    let run_report = RunReport {
        report_date,
        results,
        health,
        commit,
    };

    // The report goes out even when the commit was rejected — only the
    // persisted-state transition is blocked on integrity failure.
    println!("{}", report::render_text(&run_report));
    let bundle_path = data_dir.join(REPORT_FILE);
    std::fs::write(&bundle_path, report::render_json(&run_report)?)?;
    info!(path = %bundle_path.display(), "report bundle written");

    if let CommitOutcome::Rejected {
        candidate_rows,
        previous_rows,
    } = run_report.commit
    {
        return Err(AppError::Integrity {
            candidate_rows,
            previous_rows,
        });
    }

    info!(
        snapshots_retained = store.snapshot_count(),
        "market pulse run complete"
    );
    Ok(())
}

/// Shared degraded-mode path for the two county inputs: a missing file means
/// "source absent", not an error.
fn load_optional<T>(
    path: &Path,
    loader: fn(&Path) -> Result<(Vec<T>, IngestStats)>,
) -> Result<(Vec<T>, IngestStats, bool)> {
    if !path.exists() {
        warn!(path = %path.display(), "county input missing — degraded run");
        return Ok((Vec::new(), IngestStats::default(), false));
    }
    let (records, stats) = loader(path)?;
    Ok((records, stats, true))
}
