//! Operator-facing text attached to a plan.

use chrono::{DateTime, Duration, Timelike, Utc};
use itertools::Itertools;

use crate::domain::{Cohort, CohortAllocation, Segment, SituationSummary, Strategy};

const SHORT_NOTICE_HOURS: i64 = 4;
const PEAK_WINDOW_HOURS: std::ops::RangeInclusive<u32> = 17..=20;

pub fn message_template(cohort: &Cohort, target_mw: f64) -> String {
    match cohort.segment {
        Segment::ResidentialEv => format!(
            "Help balance the grid! Delay EV charging for 2 hours and earn rewards. Target: {target_mw:.1} MW reduction."
        ),
        Segment::ResidentialSolar => format!(
            "Grid needs your help! Export stored energy during peak hours. Target: {target_mw:.1} MW support."
        ),
        Segment::CommercialHvac => format!(
            "Demand Response Event: Adjust HVAC setpoints by {}°F. Target: {target_mw:.1} MW reduction.",
            cohort.comfort_limit_f
        ),
        Segment::Industrial => format!(
            "Load reduction requested: {target_mw:.1} MW needed. Shift non-critical operations to earn incentives."
        ),
        Segment::ResidentialStandard | Segment::CommercialLighting => format!(
            "Demand response event: {target_mw:.1} MW reduction requested. Participate to earn rewards."
        ),
    }
}

pub struct ConstraintContext<'a> {
    pub now: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub notice_overrides: &'a [String],
    pub shortfall_mw: f64,
}

pub fn constraints_applied(ctx: &ConstraintContext<'_>) -> Vec<String> {
    let mut notes = Vec::new();

    if ctx.window_start - ctx.now < Duration::hours(SHORT_NOTICE_HOURS) {
        notes.push("Short notice period".to_string());
    }
    if PEAK_WINDOW_HOURS.contains(&ctx.window_start.hour()) {
        notes.push("Peak hour window".to_string());
    }
    if !ctx.notice_overrides.is_empty() {
        notes.push(format!(
            "Notice requirement overridden for: {}",
            ctx.notice_overrides.iter().join(", ")
        ));
    }
    if ctx.shortfall_mw > 0.0 {
        notes.push(format!("Capacity shortfall of {:.1} MW", ctx.shortfall_mw));
    }
    notes.push("Customer comfort limits enforced".to_string());
    notes.push("Max weekly events checked".to_string());

    notes
}

pub fn explanation(
    strategy: Strategy,
    allocations: &[CohortAllocation],
    situation: &SituationSummary,
    confidence: f64,
) -> String {
    let predicted_mw: f64 = allocations.iter().map(|a| a.predicted_mw).sum();
    let accounts: u64 = allocations.iter().map(|a| u64::from(a.num_accounts)).sum();

    let mut lines = vec![
        format!("Strategy: {}", strategy.title()),
        format!("System stress level: {}", situation.stress_level),
        format!(
            "Targeting {predicted_mw:.1} MW reduction across {} accounts",
            group_thousands(accounts)
        ),
    ];
    if situation.window_overlaps_peak {
        lines.push("Window overlaps with forecasted peak demand".to_string());
    }
    lines.push(format!("Confidence level: {:.1}%", confidence * 100.0));

    match strategy {
        Strategy::CostMinimize => lines.push(format!(
            "Current price: ${:.2}/MWh - targeting high-cost periods",
            situation.price_per_mwh
        )),
        Strategy::Reliability => lines.push(format!(
            "Reserve margin: {:.0} MW - enhancing grid stability",
            situation.reserves_mw
        )),
        Strategy::Emergency => lines.push("EMERGENCY MODE - Maximum reduction requested".to_string()),
        Strategy::Balanced => {}
    }

    lines.join("\n")
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let head = digits.len() % 3;
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (i + 3 - head) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
