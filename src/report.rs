//! Renders the run bundle for the delivery collaborator.
//!
//! Plain text for the console path, JSON for anything downstream that wants
//! structure. No HTML and no templating here — rendering an email is the
//! collaborator's job, this is the data contract.

use std::fmt::Write;

use crate::error::Result;
use crate::types::{CommitOutcome, Metric, MetricFlag, RunReport};

pub fn render_json(report: &RunReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn render_text(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "MARKET PULSE — {}", report.report_date);
    let _ = writeln!(out, "{}", "=".repeat(60));

    for metric in Metric::ALL {
        let section: Vec<_> = report
            .results
            .iter()
            .filter(|r| r.flag.metric() == metric)
            .collect();

        let _ = writeln!(out, "\n[{metric}] {} flagged", section.len());
        for result in section {
            let _ = writeln!(out, "  {}  {}", result.listing_id, describe(&result.flag));
        }
    }

    let health = &report.health;
    let _ = writeln!(out, "\n{}", "-".repeat(60));
    let _ = writeln!(
        out,
        "listings: {} total, {} matched, {} ambiguous keys",
        health.total_listings, health.matched_listings, health.ambiguous_collisions
    );
    let _ = writeln!(
        out,
        "rows: {} malformed, {} invalid metric inputs",
        health.malformed_rows, health.invalid_metric_inputs
    );
    let _ = writeln!(
        out,
        "county data: parcels {}, sales {}",
        presence(health.parcels_present),
        presence(health.sales_present)
    );
    let _ = match report.commit {
        CommitOutcome::Committed { rows } => {
            writeln!(out, "snapshot: committed ({rows} rows)")
        }
        CommitOutcome::Rejected {
            candidate_rows,
            previous_rows,
        } => writeln!(
            out,
            "snapshot: REJECTED — candidate {candidate_rows} rows vs previous {previous_rows}"
        ),
    };

    out
}

fn presence(present: bool) -> &'static str {
    if present {
        "present"
    } else {
        "MISSING"
    }
}

fn describe(flag: &MetricFlag) -> String {
    match flag {
        MetricFlag::PriceCutVelocity {
            delta,
            days_on_market,
        } => format!("delta=${delta:.0} dom={days_on_market}"),
        MetricFlag::StaleHunter { days_on_market } => format!("dom={days_on_market}"),
        MetricFlag::CashFlowScreen {
            monthly_rent,
            ratio,
        } => format!("rent=${monthly_rent:.0}/mo ratio={ratio:.4}"),
        MetricFlag::FlipDetector {
            sale_date,
            sale_price,
            hold_months,
        } => format!("bought {sale_date} for ${sale_price:.0}, held {hold_months}mo"),
        MetricFlag::AppraisalGap {
            gap,
            direction,
            appraised_value,
        } => format!("{direction} gap={:+.1}% just=${appraised_value:.0}", gap * 100.0),
    }
}
