use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::{debug, info};

use crate::normalize::normalize;
use crate::types::{ListingRecord, MatchedRecord, ParcelRecord, SaleRecord};

/// Linkage counters, surfaced to the health summary. Ambiguous keys are
/// normalized addresses claimed by two or more distinct parcel accounts.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkStats {
    pub total_listings: usize,
    pub matched: usize,
    pub ambiguous_keys: usize,
    pub empty_listing_keys: usize,
}

/// Join listings to parcels over normalized address keys, then attach each
/// matched parcel's qualifying sales (most recent first).
///
/// A key claimed by more than one parcel account is excluded outright: an
/// incorrect match corrupts the financial metrics downstream, a missed one
/// only costs recall. Unmatched listings still flow forward for the metrics
/// that do not need county data.
pub fn link(
    listings: Vec<ListingRecord>,
    parcels: &[ParcelRecord],
    sales: &[SaleRecord],
) -> (Vec<MatchedRecord>, LinkStats) {
    let mut stats = LinkStats {
        total_listings: listings.len(),
        ..LinkStats::default()
    };

    // Normalized key → parcel. None marks a key poisoned by a collision
    // between distinct accounts; the same account appearing twice is not one.
    let mut by_key: HashMap<String, Option<&ParcelRecord>> = HashMap::new();
    for parcel in parcels {
        let key = normalize(&parcel.raw_address());
        if key.is_empty() {
            continue;
        }
        match by_key.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(Some(parcel));
            }
            Entry::Occupied(mut slot) => {
                let collision = match slot.get() {
                    Some(existing) => existing.account != parcel.account,
                    None => false,
                };
                if collision {
                    debug!(
                        key = %slot.key(),
                        "ambiguous address key, excluding all parcels behind it"
                    );
                    slot.insert(None);
                }
            }
        }
    }
    stats.ambiguous_keys = by_key.values().filter(|slot| slot.is_none()).count();

    // Account → qualifying sales, sale date descending.
    let mut sales_by_account: HashMap<&str, Vec<&SaleRecord>> = HashMap::new();
    for sale in sales.iter().filter(|s| s.is_qualifying()) {
        sales_by_account.entry(&sale.account).or_default().push(sale);
    }
    for account_sales in sales_by_account.values_mut() {
        account_sales.sort_by(|a, b| b.sale_date.cmp(&a.sale_date));
    }

    let mut matched = Vec::with_capacity(listings.len());
    for listing in listings {
        let key = normalize(&listing.address);
        let parcel = if key.is_empty() {
            stats.empty_listing_keys += 1;
            None
        } else {
            by_key.get(&key).copied().flatten()
        };

        let parcel_sales = parcel
            .map(|p| {
                sales_by_account
                    .get(p.account.as_str())
                    .map(|s| s.iter().map(|&sale| sale.clone()).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default();

        if parcel.is_some() {
            stats.matched += 1;
        }
        matched.push(MatchedRecord {
            listing,
            parcel: parcel.cloned(),
            sales: parcel_sales,
        });
    }

    info!(
        total = stats.total_listings,
        matched = stats.matched,
        ambiguous = stats.ambiguous_keys,
        empty_keys = stats.empty_listing_keys,
        "record linkage complete"
    );

    (matched, stats)
}
