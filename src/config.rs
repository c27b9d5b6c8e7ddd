use chrono::NaiveDate;

use crate::error::{AppError, Result};

/// Committed snapshots retained before the oldest is pruned.
pub const DEFAULT_HISTORY_RETENTION: usize = 3;

/// A candidate snapshot smaller than this fraction of the previous one fails
/// the commit gate. Policy parameter, overridable via INTEGRITY_MIN_RATIO.
pub const DEFAULT_INTEGRITY_MIN_RATIO: f64 = 0.5;

/// Deed type admissible for sale-based metrics. Everything else (quit-claim,
/// tax deed, ...) is a non-market transfer.
pub const QUALIFYING_DEED_TYPE: &str = "WD";

/// Parcel rows outside this city never reach the linker.
pub const PARCEL_CITY: &str = "SARASOTA";

/// Input file names inside `data_dir`, as produced by the ingestion collaborator.
pub const LISTINGS_FILE: &str = "latest_listings.csv";
pub const PARCELS_FILE: &str = "county_parcels.csv";
pub const SALES_FILE: &str = "county_sales.csv";

/// Subdirectory of `data_dir` holding dated history snapshots.
pub const HISTORY_DIR: &str = "history";

/// JSON report bundle written for the delivery collaborator.
pub const REPORT_FILE: &str = "report.json";

/// Flag thresholds for the five signal rules.
pub mod thresholds {
    /// Price Cut Velocity: price delta must drop below this (dollars).
    pub const PRICE_CUT_MIN_DELTA: f64 = -10_000.0;
    /// Price Cut Velocity: days on market strictly below this.
    pub const PRICE_CUT_MAX_DOM: i64 = 14;

    /// Stale Hunter: days on market strictly above this, with zero price changes.
    pub const STALE_MIN_DOM: i64 = 90;

    /// Cash-Flow Screen: monthly rent / list price at or above this ratio.
    /// The classic 1% rule is unrealistic here — 0.8% is the screen.
    pub const CASH_FLOW_MIN_RATIO: f64 = 0.008;

    /// Short-Hold Flip: hold period in whole months, inclusive both ends.
    pub const FLIP_MIN_HOLD_MONTHS: i64 = 4;
    pub const FLIP_MAX_HOLD_MONTHS: i64 = 12;

    /// Appraisal Gap: strictly above → Overpriced, strictly below → Underpriced.
    pub const GAP_OVERPRICED_MIN: f64 = 0.20;
    pub const GAP_UNDERPRICED_MAX: f64 = -0.05;
}

/// Rent-proxy tiers in $/sqft by living area. Lower bound inclusive, upper
/// exclusive: exactly 1000 sqft and exactly 1800 sqft both price at MID_RATE.
pub mod rent_tiers {
    pub const SMALL_MAX_SQFT: f64 = 1000.0;
    pub const MID_MAX_SQFT: f64 = 1800.0;

    pub const SMALL_RATE: f64 = 2.00;
    pub const MID_RATE: f64 = 1.65;
    pub const LARGE_RATE: f64 = 1.35;
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory of materialized input CSVs and the history store (DATA_DIR).
    pub data_dir: String,
    pub log_level: String,
    /// Report date override in ISO form (REPORT_DATE) — defaults to today.
    /// Pin this to make a run reproducible.
    pub report_date: Option<NaiveDate>,
    /// Rolling snapshot count (HISTORY_RETENTION).
    pub history_retention: usize,
    /// Integrity gate threshold (INTEGRITY_MIN_RATIO).
    pub integrity_min_ratio: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let report_date = match std::env::var("REPORT_DATE") {
            Ok(s) => Some(NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|_| {
                AppError::Config(format!("REPORT_DATE must be YYYY-MM-DD, got {s:?}"))
            })?),
            Err(_) => None,
        };

        Ok(Self {
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            report_date,
            history_retention: std::env::var("HISTORY_RETENTION")
                .unwrap_or_else(|_| DEFAULT_HISTORY_RETENTION.to_string())
                .parse::<usize>()
                .unwrap_or(DEFAULT_HISTORY_RETENTION),
            integrity_min_ratio: std::env::var("INTEGRITY_MIN_RATIO")
                .unwrap_or_else(|_| DEFAULT_INTEGRITY_MIN_RATIO.to_string())
                .parse::<f64>()
                .unwrap_or(DEFAULT_INTEGRITY_MIN_RATIO),
        })
    }
}
