use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::QUALIFYING_DEED_TYPE;

// ---------------------------------------------------------------------------
// Source records
// ---------------------------------------------------------------------------

/// One active MLS listing, as handed over by the ingestion collaborator.
/// Immutable once inside the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingRecord {
    pub id: String,
    pub address: String,
    pub list_price: f64,
    pub days_on_market: i64,
    pub price_change_count: i64,
    /// Reported monthly rent estimate, if the source carries one.
    pub estimated_rent: Option<f64>,
    /// Living area in sqft.
    pub sqft: Option<f64>,
}

/// One county appraiser parcel. The address arrives as structured fields
/// (street number / name / suffix) and is synthesized before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcelRecord {
    pub account: String,
    pub street_number: String,
    pub street_name: String,
    pub street_suffix: String,
    pub sqft: Option<f64>,
    pub bedrooms: Option<i64>,
    pub bathrooms: Option<f64>,
    pub year_built: Option<i64>,
    /// County appraiser's market value (JUST).
    pub appraised_value: f64,
    pub assessed_value: f64,
}

impl ParcelRecord {
    /// Raw county-side address string; fed through the same normalization
    /// table as listing addresses so the two join paths cannot diverge.
    pub fn raw_address(&self) -> String {
        format!(
            "{} {} {}",
            self.street_number, self.street_name, self.street_suffix
        )
    }
}

/// One recorded sale transaction, many-to-one with a parcel via account id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleRecord {
    pub account: String,
    pub sale_date: NaiveDate,
    pub sale_price: f64,
    pub deed_type: String,
    pub grantor: Option<String>,
}

impl SaleRecord {
    /// Only warranty deeds count as arm's-length market transfers.
    pub fn is_qualifying(&self) -> bool {
        self.deed_type == QUALIFYING_DEED_TYPE
    }
}

// ---------------------------------------------------------------------------
// Linked records
// ---------------------------------------------------------------------------

/// A listing joined 0-or-1 to a county parcel. Unmatched listings still flow
/// through the listing-only metrics; county-dependent metrics skip them.
#[derive(Debug, Clone)]
pub struct MatchedRecord {
    pub listing: ListingRecord,
    pub parcel: Option<ParcelRecord>,
    /// Qualifying (warranty-deed) sales for the matched parcel, most recent first.
    pub sales: Vec<SaleRecord>,
}

impl MatchedRecord {
    /// Most recent qualifying sale, if any.
    pub fn latest_sale(&self) -> Option<&SaleRecord> {
        self.sales.first()
    }
}

// ---------------------------------------------------------------------------
// Metric flags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    PriceCutVelocity,
    StaleHunter,
    CashFlowScreen,
    FlipDetector,
    AppraisalGap,
}

impl Metric {
    /// Declaration order — drives result grouping and report sections.
    pub const ALL: [Metric; 5] = [
        Metric::PriceCutVelocity,
        Metric::StaleHunter,
        Metric::CashFlowScreen,
        Metric::FlipDetector,
        Metric::AppraisalGap,
    ];
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Metric::PriceCutVelocity => "price_cut_velocity",
            Metric::StaleHunter => "stale_hunter",
            Metric::CashFlowScreen => "cash_flow_screen",
            Metric::FlipDetector => "flip_detector",
            Metric::AppraisalGap => "appraisal_gap",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapDirection {
    Overpriced,
    Underpriced,
}

impl std::fmt::Display for GapDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GapDirection::Overpriced => write!(f, "overpriced"),
            GapDirection::Underpriced => write!(f, "underpriced"),
        }
    }
}

/// Why a property was flagged, with the values that justified it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "metric", rename_all = "snake_case")]
pub enum MetricFlag {
    PriceCutVelocity {
        /// Current list price minus the previous snapshot's list price.
        delta: f64,
        days_on_market: i64,
    },
    StaleHunter {
        days_on_market: i64,
    },
    CashFlowScreen {
        monthly_rent: f64,
        ratio: f64,
    },
    FlipDetector {
        sale_date: NaiveDate,
        sale_price: f64,
        hold_months: i64,
    },
    AppraisalGap {
        gap: f64,
        direction: GapDirection,
        appraised_value: f64,
    },
}

impl MetricFlag {
    pub fn metric(&self) -> Metric {
        match self {
            MetricFlag::PriceCutVelocity { .. } => Metric::PriceCutVelocity,
            MetricFlag::StaleHunter { .. } => Metric::StaleHunter,
            MetricFlag::CashFlowScreen { .. } => Metric::CashFlowScreen,
            MetricFlag::FlipDetector { .. } => Metric::FlipDetector,
            MetricFlag::AppraisalGap { .. } => Metric::AppraisalGap,
        }
    }
}

/// One flagged property under one metric. Ephemeral — rebuilt every run.
#[derive(Debug, Clone, Serialize)]
pub struct MetricResult {
    pub listing_id: String,
    #[serde(flatten)]
    pub flag: MetricFlag,
}

// ---------------------------------------------------------------------------
// History snapshots
// ---------------------------------------------------------------------------

/// Per-listing state as observed on a run date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub list_price: f64,
    pub days_on_market: i64,
    pub price_change_count: i64,
}

/// Immutable dated projection of every listing seen in a run, keyed by
/// listing id. BTreeMap keeps the serialized form stable across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub run_date: NaiveDate,
    pub entries: BTreeMap<String, SnapshotEntry>,
}

impl HistorySnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, listing_id: &str) -> Option<&SnapshotEntry> {
        self.entries.get(listing_id)
    }
}

// ---------------------------------------------------------------------------
// Run outcome
// ---------------------------------------------------------------------------

/// Counters surfaced to the health-reporting collaborator. The core counts;
/// it does not interpret.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct HealthSummary {
    pub total_listings: usize,
    pub matched_listings: usize,
    pub ambiguous_collisions: usize,
    pub malformed_rows: usize,
    pub invalid_metric_inputs: usize,
    /// Distinguishes "no match" from "no data source".
    pub parcels_present: bool,
    pub sales_present: bool,
}

/// Snapshot-commit result, propagated by ordinary control flow rather than a
/// shared flag.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommitOutcome {
    Committed {
        rows: usize,
    },
    Rejected {
        candidate_rows: usize,
        previous_rows: usize,
    },
}

/// Everything a delivery collaborator needs from one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub report_date: NaiveDate,
    pub results: Vec<MetricResult>,
    pub health: HealthSummary,
    pub commit: CommitOutcome,
}
