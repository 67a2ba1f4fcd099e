use std::collections::BTreeMap;

use crate::models::{ClassTotals, MonthSummary, Session};

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// Per-class and grand totals for a month's rows.
///
/// Totals are kept in stored units; `display_scale` only feeds the
/// `display_*` fields. Non-finite hours or fees count as zero.
pub fn summarize<'a, I>(year: i32, month: u32, sessions: I, display_scale: f64) -> MonthSummary
where
    I: IntoIterator<Item = &'a Session>,
{
    let mut groups: BTreeMap<(String, String), ClassTotals> = BTreeMap::new();
    for session in sessions {
        let totals = groups
            .entry((session.class_name.clone(), session.class_id.clone()))
            .or_insert_with(|| ClassTotals {
                class_id: session.class_id.clone(),
                class_name: session.class_name.clone(),
                session_count: 0,
                total_hours: 0.0,
                total_fee: 0.0,
                display_total_fee: 0.0,
            });
        totals.session_count += 1;
        totals.total_hours += finite_or_zero(session.actual_duration_hours);
        totals.total_fee += finite_or_zero(session.fee);
    }

    let mut classes: Vec<ClassTotals> = groups.into_values().collect();
    for totals in &mut classes {
        totals.display_total_fee = totals.total_fee * display_scale;
    }
    let total_hours = classes.iter().map(|c| c.total_hours).sum();
    let total_fee: f64 = classes.iter().map(|c| c.total_fee).sum();

    MonthSummary {
        year,
        month,
        classes,
        total_hours,
        total_fee,
        display_scale,
        display_total_fee: total_fee * display_scale,
    }
}
