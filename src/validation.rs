use std::collections::HashSet;

use chrono::NaiveDate;

use crate::error::{ScheduleError, ScheduleResult};
use crate::models::{ClassInput, RuleInput, SessionEdit};
use crate::rate::parse_rate;

pub fn validate_month(year: i32, month: u32) -> ScheduleResult<()> {
    if !(1..=12).contains(&month) {
        return Err(ScheduleError::validation("month must be between 1 and 12"));
    }
    if !(1970..=9999).contains(&year) {
        return Err(ScheduleError::validation("year must be between 1970 and 9999"));
    }
    Ok(())
}

fn validate_window(start: Option<NaiveDate>, end: Option<NaiveDate>) -> ScheduleResult<()> {
    if let (Some(start), Some(end)) = (start, end)
        && end < start
    {
        return Err(ScheduleError::validation(format!(
            "end date {end} is before start date {start}"
        )));
    }
    Ok(())
}

fn validate_duration(hours: f64) -> ScheduleResult<()> {
    if !hours.is_finite() || hours <= 0.0 {
        return Err(ScheduleError::validation(format!(
            "duration must be a positive number of hours, got {hours}"
        )));
    }
    Ok(())
}

/// Checks a class form and returns the resolved numeric rate.
pub fn validate_class_input(input: &ClassInput) -> ScheduleResult<f64> {
    if input.class_name.trim().is_empty() {
        return Err(ScheduleError::validation("class name is required"));
    }

    let rate = parse_rate(&input.rate)?;
    if rate < 0.0 {
        return Err(ScheduleError::validation("rate must not be negative"));
    }

    validate_window(input.start_date, input.end_date)?;

    let mut seen = HashSet::new();
    for slot in &input.schedule {
        if !seen.insert(slot.weekday) {
            return Err(ScheduleError::validation(format!(
                "{} appears more than once in the schedule",
                slot.weekday
            )));
        }
        validate_duration(slot.duration_hours)?;
    }

    Ok(rate)
}

pub fn validate_rule_input(input: &RuleInput) -> ScheduleResult<()> {
    validate_duration(input.duration_hours)?;
    validate_window(input.start_date, input.end_date)
}

/// Zero hours is allowed so a cancelled session can carry no fee.
pub fn validate_edit(edit: &SessionEdit) -> ScheduleResult<()> {
    if !edit.actual_duration_hours.is_finite() || edit.actual_duration_hours < 0.0 {
        return Err(ScheduleError::validation(format!(
            "session {}: actual duration must be zero or more",
            edit.session_id
        )));
    }
    if !edit.rate.is_finite() || edit.rate < 0.0 {
        return Err(ScheduleError::validation(format!(
            "session {}: rate must be zero or more",
            edit.session_id
        )));
    }
    Ok(())
}
