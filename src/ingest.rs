//! Typed loaders for the materialized CSV inputs.
//!
//! The ingestion collaborators fetch and write the files; parsing their rows
//! into records is core work. A row missing a required field or failing a
//! numeric parse is counted malformed and skipped — never fatal to the run.

use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::PARCEL_CITY;
use crate::error::Result;
use crate::types::{ListingRecord, ParcelRecord, SaleRecord};

/// Per-source row accounting, folded into the health summary.
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestStats {
    pub rows_read: usize,
    pub loaded: usize,
    pub malformed: usize,
    /// Rows excluded by the source contract (wrong city, non-market deed).
    pub filtered: usize,
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// MLS listing row. Aliases absorb the two header dialects the scraper
/// emits (`property_url`/`property_id`, `days_on_mls`/`days_on_market`).
#[derive(Debug, Deserialize)]
struct ListingRow {
    #[serde(alias = "property_url")]
    property_id: String,
    #[serde(alias = "street")]
    address: String,
    list_price: f64,
    #[serde(alias = "days_on_mls")]
    days_on_market: i64,
    price_change_count: i64,
    #[serde(default)]
    estimated_rent: Option<f64>,
    #[serde(default)]
    sqft: Option<f64>,
}

pub fn load_listings(path: &Path) -> Result<(Vec<ListingRecord>, IngestStats)> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut records = Vec::new();
    let mut stats = IngestStats::default();

    for row in reader.deserialize::<ListingRow>() {
        stats.rows_read += 1;
        match row {
            Ok(row) if row.property_id.trim().is_empty() => {
                stats.malformed += 1;
                debug!("listing row without identifier skipped");
            }
            Ok(row) => {
                records.push(ListingRecord {
                    id: row.property_id,
                    address: row.address,
                    list_price: row.list_price,
                    days_on_market: row.days_on_market,
                    price_change_count: row.price_change_count,
                    estimated_rent: row.estimated_rent,
                    sqft: row.sqft,
                });
                stats.loaded += 1;
            }
            Err(e) => {
                stats.malformed += 1;
                debug!("malformed listing row skipped: {e}");
            }
        }
    }

    info!(
        loaded = stats.loaded,
        malformed = stats.malformed,
        path = %path.display(),
        "listings loaded"
    );
    Ok((records, stats))
}

// ---------------------------------------------------------------------------
// County parcels
// ---------------------------------------------------------------------------

/// SCPA parcel row, upper-case headers as shipped in the county export.
#[derive(Debug, Deserialize)]
struct ParcelRow {
    #[serde(rename = "ACCOUNT")]
    account: String,
    #[serde(rename = "LOCN")]
    street_number: String,
    #[serde(rename = "LOCS")]
    street_name: String,
    #[serde(rename = "LOCD")]
    street_suffix: String,
    #[serde(rename = "LOCCITY")]
    city: String,
    #[serde(rename = "LIVING", default)]
    sqft: Option<f64>,
    #[serde(rename = "BEDR", default)]
    bedrooms: Option<i64>,
    #[serde(rename = "BATH", default)]
    bathrooms: Option<f64>,
    #[serde(rename = "YRBL", default)]
    year_built: Option<i64>,
    #[serde(rename = "JUST")]
    appraised_value: f64,
    #[serde(rename = "ASSD")]
    assessed_value: f64,
}

pub fn load_parcels(path: &Path) -> Result<(Vec<ParcelRecord>, IngestStats)> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut records = Vec::new();
    let mut stats = IngestStats::default();

    for row in reader.deserialize::<ParcelRow>() {
        stats.rows_read += 1;
        match row {
            Ok(row) if row.account.trim().is_empty() => {
                stats.malformed += 1;
            }
            Ok(row) if row.city != PARCEL_CITY => {
                stats.filtered += 1;
            }
            Ok(row) => {
                records.push(ParcelRecord {
                    account: row.account,
                    street_number: row.street_number,
                    street_name: row.street_name,
                    street_suffix: row.street_suffix,
                    sqft: row.sqft,
                    bedrooms: row.bedrooms,
                    bathrooms: row.bathrooms,
                    year_built: row.year_built,
                    appraised_value: row.appraised_value,
                    assessed_value: row.assessed_value,
                });
                stats.loaded += 1;
            }
            Err(e) => {
                stats.malformed += 1;
                debug!("malformed parcel row skipped: {e}");
            }
        }
    }

    info!(
        loaded = stats.loaded,
        filtered = stats.filtered,
        malformed = stats.malformed,
        path = %path.display(),
        "parcels loaded"
    );
    Ok((records, stats))
}

// ---------------------------------------------------------------------------
// County sales
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SaleRow {
    #[serde(rename = "Account")]
    account: String,
    #[serde(rename = "SaleDate")]
    sale_date: String,
    #[serde(rename = "SalePrice")]
    sale_price: f64,
    #[serde(rename = "DeedType")]
    deed_type: String,
    #[serde(rename = "Grantor", default)]
    grantor: Option<String>,
}

pub fn load_sales(path: &Path) -> Result<(Vec<SaleRecord>, IngestStats)> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut records = Vec::new();
    let mut stats = IngestStats::default();

    for row in reader.deserialize::<SaleRow>() {
        stats.rows_read += 1;
        match row {
            Ok(row) => {
                let Some(sale_date) = parse_sale_date(&row.sale_date) else {
                    stats.malformed += 1;
                    debug!(raw = %row.sale_date, "unparsable sale date, row skipped");
                    continue;
                };
                let record = SaleRecord {
                    account: row.account,
                    sale_date,
                    sale_price: row.sale_price,
                    deed_type: row.deed_type,
                    grantor: row.grantor,
                };
                if !record.is_qualifying() {
                    stats.filtered += 1;
                    continue;
                }
                records.push(record);
                stats.loaded += 1;
            }
            Err(e) => {
                stats.malformed += 1;
                debug!("malformed sale row skipped: {e}");
            }
        }
    }

    info!(
        loaded = stats.loaded,
        filtered = stats.filtered,
        malformed = stats.malformed,
        path = %path.display(),
        "sales loaded"
    );
    Ok((records, stats))
}

/// Sale dates arrive as ISO (`2025-11-15`) or US (`11/15/2025`) depending on
/// the export vintage.
fn parse_sale_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
        .ok()
}
