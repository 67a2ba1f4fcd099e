//! Expansion of weekly recurrences into dated sessions.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use uuid::Uuid;

use crate::error::{ScheduleError, ScheduleResult};
use crate::models::{ClassDefinition, ScheduleRule, Session, SessionStatus};

/// A weekday occurrence with an optional inclusive date window.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurrenceRule {
    pub weekday: Weekday,
    pub duration_hours: f64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub note: String,
}

impl RecurrenceRule {
    pub fn within_window(&self, date: NaiveDate) -> bool {
        self.start_date.is_none_or(|start| date >= start)
            && self.end_date.is_none_or(|end| date <= end)
    }

    /// Non-positive durations never produce a session.
    pub fn covers(&self, date: NaiveDate) -> bool {
        date.weekday() == self.weekday
            && self.duration_hours.is_finite()
            && self.duration_hours > 0.0
            && self.within_window(date)
    }
}

fn later(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn earlier(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Rules for one class, in evaluation order: the class's own weekly slots
/// first, then its free-standing rules by weekday and id. Free-standing rules
/// are clipped to the class window.
pub fn recurrence_rules(class: &ClassDefinition, extra: &[ScheduleRule]) -> Vec<RecurrenceRule> {
    let mut rules: Vec<RecurrenceRule> = class
        .schedule
        .iter()
        .map(|slot| RecurrenceRule {
            weekday: slot.weekday,
            duration_hours: slot.duration_hours,
            start_date: class.start_date,
            end_date: class.end_date,
            note: String::new(),
        })
        .collect();

    let mut own: Vec<&ScheduleRule> = extra
        .iter()
        .filter(|rule| rule.class_id == class.class_id)
        .collect();
    own.sort_by(|a, b| {
        a.weekday
            .num_days_from_monday()
            .cmp(&b.weekday.num_days_from_monday())
            .then_with(|| a.rule_id.cmp(&b.rule_id))
    });

    rules.extend(own.into_iter().map(|rule| RecurrenceRule {
        weekday: rule.weekday,
        duration_hours: rule.duration_hours,
        start_date: later(class.start_date, rule.start_date),
        end_date: earlier(class.end_date, rule.end_date),
        note: rule.note.clone(),
    }));
    rules
}

pub fn month_dates(year: i32, month: u32) -> ScheduleResult<Vec<NaiveDate>> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ScheduleError::validation(format!("invalid month {year}-{month}")))?;
    Ok(first
        .iter_days()
        .take_while(|date| date.month() == month)
        .collect())
}

pub fn in_month(date: NaiveDate, year: i32, month: u32) -> bool {
    date.year() == year && date.month() == month
}

pub fn planned_session(
    class: &ClassDefinition,
    date: NaiveDate,
    duration_hours: f64,
    rate: f64,
    note: &str,
    now: DateTime<Utc>,
) -> Session {
    Session {
        session_id: Uuid::new_v4().to_string(),
        class_id: class.class_id.clone(),
        class_name: class.class_name.clone(),
        session_date: date,
        weekday: date.weekday(),
        slot_date: date,
        planned_duration_hours: duration_hours,
        actual_duration_hours: duration_hours,
        rate,
        fee: duration_hours * rate,
        status: SessionStatus::Planned,
        note: note.to_string(),
        created_at_utc: now,
        updated_at_utc: now,
    }
}

/// New sessions for `class` in the given month that the ledger lacks.
///
/// A date is taken when the ledger already holds a session of this class
/// on it, or one generated for it and since moved. Taken dates are skipped
/// without touching the existing row. When several rules match a date the
/// first in `rules` wins.
pub fn generate_sessions(
    class: &ClassDefinition,
    rules: &[RecurrenceRule],
    rate: f64,
    year: i32,
    month: u32,
    ledger: &[Session],
    now: DateTime<Utc>,
) -> ScheduleResult<Vec<Session>> {
    let mut taken: HashSet<NaiveDate> = ledger
        .iter()
        .filter(|s| s.class_id == class.class_id)
        .flat_map(|s| [s.session_date, s.slot_date])
        .collect();

    let mut generated = Vec::new();
    for date in month_dates(year, month)? {
        let Some(rule) = rules.iter().find(|rule| rule.covers(date)) else {
            continue;
        };
        if !taken.insert(date) {
            continue;
        }
        generated.push(planned_session(
            class,
            date,
            rule.duration_hours,
            rate,
            &rule.note,
            now,
        ));
    }
    Ok(generated)
}
