use chrono::{Datelike, NaiveDate};
use tracing::info;

use crate::config::thresholds::*;
use crate::metrics::rent::estimate_rent;
use crate::types::{
    GapDirection, HistorySnapshot, MatchedRecord, Metric, MetricFlag, MetricResult, SnapshotEntry,
};

/// Counters for properties excluded from a single metric because of invalid
/// numeric input (non-positive list price or appraised value). Exclusion is
/// per metric — the property still runs through the other rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricStats {
    pub invalid_inputs: usize,
}

/// Evaluates the five signal rules against the linked record set and the
/// previous run's snapshot. Pure given its inputs and the report date.
pub struct MetricEngine {
    report_date: NaiveDate,
}

impl MetricEngine {
    pub fn new(report_date: NaiveDate) -> Self {
        Self { report_date }
    }

    /// Run every rule over every property. Results are grouped by metric in
    /// declaration order and sorted by listing id within each metric, so a
    /// fixed input always produces an identical, diffable result list.
    pub fn compute(
        &self,
        matched: &[MatchedRecord],
        previous: Option<&HistorySnapshot>,
    ) -> (Vec<MetricResult>, MetricStats) {
        let mut ordered: Vec<&MatchedRecord> = matched.iter().collect();
        ordered.sort_by(|a, b| a.listing.id.cmp(&b.listing.id));

        let mut results = Vec::new();
        let mut stats = MetricStats::default();

        for metric in Metric::ALL {
            let before = results.len();
            for &record in &ordered {
                let flag = match metric {
                    Metric::PriceCutVelocity => self.price_cut_velocity(record, previous),
                    Metric::StaleHunter => self.stale_hunter(record),
                    Metric::CashFlowScreen => self.cash_flow_screen(record, &mut stats),
                    Metric::FlipDetector => self.flip_detector(record),
                    Metric::AppraisalGap => self.appraisal_gap(record, &mut stats),
                };
                if let Some(flag) = flag {
                    results.push(MetricResult {
                        listing_id: record.listing.id.clone(),
                        flag,
                    });
                }
            }
            info!(metric = %metric, flagged = results.len() - before, "rule evaluated");
        }

        (results, stats)
    }

    /// Project the current run into the next history snapshot. Never consults
    /// the previous snapshot.
    pub fn snapshot(&self, matched: &[MatchedRecord]) -> HistorySnapshot {
        let entries = matched
            .iter()
            .map(|record| {
                (
                    record.listing.id.clone(),
                    SnapshotEntry {
                        list_price: record.listing.list_price,
                        days_on_market: record.listing.days_on_market,
                        price_change_count: record.listing.price_change_count,
                    },
                )
            })
            .collect();
        HistorySnapshot {
            run_date: self.report_date,
            entries,
        }
    }

    /// Significant price drop early in the listing period — panic selling.
    /// Skipped entirely on first sighting (id absent from the previous
    /// snapshot), never a false flag.
    fn price_cut_velocity(
        &self,
        record: &MatchedRecord,
        previous: Option<&HistorySnapshot>,
    ) -> Option<MetricFlag> {
        let listing = &record.listing;
        let prior = previous?.get(&listing.id)?;
        let delta = listing.list_price - prior.list_price;
        (delta < PRICE_CUT_MIN_DELTA && listing.days_on_market < PRICE_CUT_MAX_DOM).then_some(
            MetricFlag::PriceCutVelocity {
                delta,
                days_on_market: listing.days_on_market,
            },
        )
    }

    /// Sat for 90+ days without a single price change — stubborn seller.
    fn stale_hunter(&self, record: &MatchedRecord) -> Option<MetricFlag> {
        let listing = &record.listing;
        (listing.days_on_market > STALE_MIN_DOM && listing.price_change_count == 0).then_some(
            MetricFlag::StaleHunter {
                days_on_market: listing.days_on_market,
            },
        )
    }

    /// The 0.8% rule: monthly rent over list price. Uses the reported rent
    /// estimate when present and positive, else the sqft tier proxy.
    fn cash_flow_screen(
        &self,
        record: &MatchedRecord,
        stats: &mut MetricStats,
    ) -> Option<MetricFlag> {
        let listing = &record.listing;
        if listing.list_price <= 0.0 {
            stats.invalid_inputs += 1;
            return None;
        }
        let monthly_rent = match listing.estimated_rent {
            Some(rent) if rent > 0.0 => rent,
            _ => estimate_rent(listing.sqft.unwrap_or(0.0)),
        };
        let ratio = monthly_rent / listing.list_price;
        (ratio >= CASH_FLOW_MIN_RATIO).then_some(MetricFlag::CashFlowScreen {
            monthly_rent,
            ratio,
        })
    }

    /// Re-listed 4–12 whole months after a warranty-deed purchase — probable
    /// flip. Properties with no qualifying sale are silently excluded.
    fn flip_detector(&self, record: &MatchedRecord) -> Option<MetricFlag> {
        let sale = record.latest_sale()?;
        let hold_months = months_between(sale.sale_date, self.report_date);
        (FLIP_MIN_HOLD_MONTHS..=FLIP_MAX_HOLD_MONTHS)
            .contains(&hold_months)
            .then_some(MetricFlag::FlipDetector {
                sale_date: sale.sale_date,
                sale_price: sale.sale_price,
                hold_months,
            })
    }

    /// List price against the county appraised (JUST) value. The two flags
    /// cannot overlap: the thresholds leave a gap between them.
    fn appraisal_gap(&self, record: &MatchedRecord, stats: &mut MetricStats) -> Option<MetricFlag> {
        let parcel = record.parcel.as_ref()?;
        let listing = &record.listing;
        if parcel.appraised_value <= 0.0 || listing.list_price <= 0.0 {
            stats.invalid_inputs += 1;
            return None;
        }
        let gap = (listing.list_price - parcel.appraised_value) / parcel.appraised_value;
        let direction = if gap > GAP_OVERPRICED_MIN {
            GapDirection::Overpriced
        } else if gap < GAP_UNDERPRICED_MAX {
            GapDirection::Underpriced
        } else {
            return None;
        };
        Some(MetricFlag::AppraisalGap {
            gap,
            direction,
            appraised_value: parcel.appraised_value,
        })
    }
}

/// Whole calendar months from `from` to `to`. The partial month does not
/// count until the day-of-month is reached.
fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    let mut months = (to.year() as i64 - from.year() as i64) * 12
        + (to.month() as i64 - from.month() as i64);
    if to.day() < from.day() {
        months -= 1;
    }
    months
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ListingRecord, ParcelRecord, SaleRecord};
    use std::collections::BTreeMap;

    fn report_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 1).unwrap()
    }

    fn listing(id: &str, list_price: f64, dom: i64, price_changes: i64) -> ListingRecord {
        ListingRecord {
            id: id.to_string(),
            address: format!("{id} Test St"),
            list_price,
            days_on_market: dom,
            price_change_count: price_changes,
            estimated_rent: None,
            sqft: None,
        }
    }

    fn unmatched(listing: ListingRecord) -> MatchedRecord {
        MatchedRecord {
            listing,
            parcel: None,
            sales: Vec::new(),
        }
    }

    fn with_parcel(listing: ListingRecord, appraised: f64) -> MatchedRecord {
        MatchedRecord {
            listing,
            parcel: Some(ParcelRecord {
                account: "A1".to_string(),
                street_number: "123".to_string(),
                street_name: "MAIN".to_string(),
                street_suffix: "ST".to_string(),
                sqft: Some(1500.0),
                bedrooms: Some(3),
                bathrooms: Some(2.0),
                year_built: Some(1985),
                appraised_value: appraised,
                assessed_value: appraised * 0.9,
            }),
            sales: Vec::new(),
        }
    }

    fn with_sale(mut record: MatchedRecord, sale_date: NaiveDate) -> MatchedRecord {
        record.sales.insert(
            0,
            SaleRecord {
                account: "A1".to_string(),
                sale_date,
                sale_price: 220_000.0,
                deed_type: "WD".to_string(),
                grantor: None,
            },
        );
        record
    }

    fn previous_with(id: &str, list_price: f64) -> HistorySnapshot {
        let mut entries = BTreeMap::new();
        entries.insert(
            id.to_string(),
            SnapshotEntry {
                list_price,
                days_on_market: 5,
                price_change_count: 0,
            },
        );
        HistorySnapshot {
            run_date: NaiveDate::from_ymd_opt(2026, 7, 31).unwrap(),
            entries,
        }
    }

    fn flags_for<'a>(results: &'a [MetricResult], metric: Metric) -> Vec<&'a MetricResult> {
        results.iter().filter(|r| r.flag.metric() == metric).collect()
    }

    #[test]
    fn price_cut_fires_on_big_early_drop() {
        let engine = MetricEngine::new(report_date());
        let matched = vec![unmatched(listing("L1", 300_000.0, 10, 0))];
        let previous = previous_with("L1", 315_000.0);

        let (results, _) = engine.compute(&matched, Some(&previous));
        let flags = flags_for(&results, Metric::PriceCutVelocity);
        assert_eq!(flags.len(), 1);
        match &flags[0].flag {
            MetricFlag::PriceCutVelocity { delta, days_on_market } => {
                assert_eq!(*delta, -15_000.0);
                assert_eq!(*days_on_market, 10);
            }
            other => panic!("unexpected flag {other:?}"),
        }
    }

    #[test]
    fn price_cut_ignores_small_drop() {
        let engine = MetricEngine::new(report_date());
        let matched = vec![unmatched(listing("L1", 308_000.0, 10, 0))];
        let previous = previous_with("L1", 315_000.0);

        let (results, _) = engine.compute(&matched, Some(&previous));
        assert!(flags_for(&results, Metric::PriceCutVelocity).is_empty());
    }

    #[test]
    fn price_cut_skips_first_sighting() {
        let engine = MetricEngine::new(report_date());
        let matched = vec![unmatched(listing("L9", 200_000.0, 3, 0))];
        let previous = previous_with("L1", 315_000.0);

        let (results, _) = engine.compute(&matched, Some(&previous));
        assert!(flags_for(&results, Metric::PriceCutVelocity).is_empty());

        let (results, _) = engine.compute(&matched, None);
        assert!(flags_for(&results, Metric::PriceCutVelocity).is_empty());
    }

    #[test]
    fn stale_hunter_requires_no_price_changes() {
        let engine = MetricEngine::new(report_date());
        let matched = vec![
            unmatched(listing("L1", 300_000.0, 91, 0)),
            unmatched(listing("L2", 300_000.0, 91, 1)),
            unmatched(listing("L3", 300_000.0, 90, 0)),
        ];

        let (results, _) = engine.compute(&matched, None);
        let flags = flags_for(&results, Metric::StaleHunter);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].listing_id, "L1");
    }

    #[test]
    fn cash_flow_prefers_reported_rent() {
        let engine = MetricEngine::new(report_date());
        let mut l = listing("L1", 300_000.0, 10, 0);
        l.estimated_rent = Some(2500.0);
        l.sqft = Some(900.0);

        let (results, _) = engine.compute(&[unmatched(l)], None);
        let flags = flags_for(&results, Metric::CashFlowScreen);
        assert_eq!(flags.len(), 1);
        match &flags[0].flag {
            MetricFlag::CashFlowScreen { monthly_rent, ratio } => {
                assert_eq!(*monthly_rent, 2500.0);
                assert!(*ratio >= 0.008);
            }
            other => panic!("unexpected flag {other:?}"),
        }
    }

    #[test]
    fn cash_flow_falls_back_to_tier_proxy() {
        let engine = MetricEngine::new(report_date());
        // 1000 sqft → mid tier → $1650/mo; 1650 / 200000 = 0.00825.
        let mut l = listing("L1", 200_000.0, 10, 0);
        l.sqft = Some(1000.0);

        let (results, _) = engine.compute(&[unmatched(l)], None);
        let flags = flags_for(&results, Metric::CashFlowScreen);
        assert_eq!(flags.len(), 1);
        match &flags[0].flag {
            MetricFlag::CashFlowScreen { monthly_rent, .. } => {
                assert_eq!(*monthly_rent, 1650.0);
            }
            other => panic!("unexpected flag {other:?}"),
        }
    }

    #[test]
    fn cash_flow_zero_price_is_invalid_not_a_crash() {
        let engine = MetricEngine::new(report_date());
        let mut l = listing("L1", 0.0, 95, 0);
        l.sqft = Some(1200.0);

        let (results, stats) = engine.compute(&[unmatched(l)], None);
        assert!(flags_for(&results, Metric::CashFlowScreen).is_empty());
        assert_eq!(stats.invalid_inputs, 1);
        // The same property still runs through the other rules.
        assert_eq!(flags_for(&results, Metric::StaleHunter).len(), 1);
    }

    #[test]
    fn flip_detector_inclusive_hold_window() {
        let engine = MetricEngine::new(report_date());
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        let cases = [
            (date(2026, 5, 1), false), // 3 months
            (date(2026, 4, 1), true),  // exactly 4
            (date(2025, 8, 1), true),  // exactly 12
            (date(2025, 7, 1), false), // 13 months
        ];

        for (sale_date, should_flag) in cases {
            let record = with_sale(
                with_parcel(listing("L1", 300_000.0, 10, 0), 250_000.0),
                sale_date,
            );
            let (results, _) = engine.compute(&[record], None);
            let flagged = !flags_for(&results, Metric::FlipDetector).is_empty();
            assert_eq!(flagged, should_flag, "sale_date {sale_date}");
        }
    }

    #[test]
    fn flip_detector_silent_without_qualifying_sale() {
        let engine = MetricEngine::new(report_date());
        let record = with_parcel(listing("L1", 300_000.0, 10, 0), 250_000.0);

        let (results, stats) = engine.compute(&[record], None);
        assert!(flags_for(&results, Metric::FlipDetector).is_empty());
        assert_eq!(stats.invalid_inputs, 0);
    }

    #[test]
    fn appraisal_gap_boundary_is_exclusive() {
        let engine = MetricEngine::new(report_date());
        // gap = (300000 - 250000) / 250000 = 0.20 exactly — no flag.
        let record = with_parcel(listing("L1", 300_000.0, 10, 0), 250_000.0);
        let (results, _) = engine.compute(&[record], None);
        assert!(flags_for(&results, Metric::AppraisalGap).is_empty());

        // gap = (300000 - 240000) / 240000 = 0.25 — Overpriced.
        let record = with_parcel(listing("L1", 300_000.0, 10, 0), 240_000.0);
        let (results, _) = engine.compute(&[record], None);
        let flags = flags_for(&results, Metric::AppraisalGap);
        assert_eq!(flags.len(), 1);
        match &flags[0].flag {
            MetricFlag::AppraisalGap { direction, gap, .. } => {
                assert_eq!(*direction, GapDirection::Overpriced);
                assert!((gap - 0.25).abs() < 1e-9);
            }
            other => panic!("unexpected flag {other:?}"),
        }
    }

    #[test]
    fn appraisal_gap_flags_underpriced() {
        let engine = MetricEngine::new(report_date());
        // gap = (230000 - 250000) / 250000 = -0.08 — Underpriced.
        let record = with_parcel(listing("L1", 230_000.0, 10, 0), 250_000.0);
        let (results, _) = engine.compute(&[record], None);
        match &flags_for(&results, Metric::AppraisalGap)[0].flag {
            MetricFlag::AppraisalGap { direction, .. } => {
                assert_eq!(*direction, GapDirection::Underpriced);
            }
            other => panic!("unexpected flag {other:?}"),
        }
    }

    #[test]
    fn gap_directions_are_mutually_exclusive() {
        let engine = MetricEngine::new(report_date());
        let prices = [100_000.0, 230_000.0, 237_500.0, 250_000.0, 300_000.0, 400_000.0];
        let matched: Vec<MatchedRecord> = prices
            .iter()
            .enumerate()
            .map(|(i, &p)| with_parcel(listing(&format!("L{i}"), p, 10, 0), 250_000.0))
            .collect();

        let (results, _) = engine.compute(&matched, None);
        let gap_flags = flags_for(&results, Metric::AppraisalGap);
        let mut seen = std::collections::HashSet::new();
        for flag in &gap_flags {
            assert!(
                seen.insert(flag.listing_id.clone()),
                "{} flagged twice under appraisal gap",
                flag.listing_id
            );
        }
    }

    #[test]
    fn nonpositive_appraisal_counts_invalid() {
        let engine = MetricEngine::new(report_date());
        let record = with_parcel(listing("L1", 300_000.0, 10, 0), 0.0);

        let (results, stats) = engine.compute(&[record], None);
        assert!(flags_for(&results, Metric::AppraisalGap).is_empty());
        assert_eq!(stats.invalid_inputs, 1);
    }

    #[test]
    fn results_are_metric_grouped_and_id_sorted() {
        let engine = MetricEngine::new(report_date());
        // Deliberately unsorted ids; both fire StaleHunter, one also fires
        // AppraisalGap.
        let matched = vec![
            unmatched(listing("L2", 300_000.0, 120, 0)),
            with_parcel(listing("L1", 400_000.0, 100, 0), 250_000.0),
        ];

        let (results, _) = engine.compute(&matched, None);
        let order: Vec<(Metric, &str)> = results
            .iter()
            .map(|r| (r.flag.metric(), r.listing_id.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (Metric::StaleHunter, "L1"),
                (Metric::StaleHunter, "L2"),
                (Metric::AppraisalGap, "L1"),
            ]
        );
    }

    #[test]
    fn snapshot_projects_current_run_state() {
        let engine = MetricEngine::new(report_date());
        let matched = vec![
            unmatched(listing("L2", 310_000.0, 45, 2)),
            unmatched(listing("L1", 300_000.0, 10, 0)),
        ];

        let snap = engine.snapshot(&matched);
        assert_eq!(snap.run_date, report_date());
        assert_eq!(snap.len(), 2);
        let entry = snap.get("L2").unwrap();
        assert_eq!(entry.list_price, 310_000.0);
        assert_eq!(entry.days_on_market, 45);
        assert_eq!(entry.price_change_count, 2);
    }

    #[test]
    fn months_between_counts_whole_months() {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        assert_eq!(months_between(date(2026, 4, 1), date(2026, 8, 1)), 4);
        assert_eq!(months_between(date(2026, 4, 15), date(2026, 8, 1)), 3);
        assert_eq!(months_between(date(2025, 8, 1), date(2026, 8, 1)), 12);
        assert_eq!(months_between(date(2026, 8, 1), date(2026, 8, 1)), 0);
    }
}
