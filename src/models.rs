use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::rate::{RateError, parse_rate};

/// One weekday of a class's weekly schedule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ScheduleSlot {
    #[schema(value_type = String, example = "Sat")]
    pub weekday: Weekday,
    #[schema(example = 2.0)]
    pub duration_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ClassDefinition {
    #[schema(example = "MCT001")]
    pub class_id: String,
    #[schema(example = "Stella")]
    pub class_name: String,
    /// Rate expression as entered, e.g. `"450"` or `"900/2"`.
    #[schema(example = "450")]
    pub rate: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub schedule: Vec<ScheduleSlot>,
    pub active: bool,
    pub note: String,
    pub created_at_utc: DateTime<Utc>,
}

impl ClassDefinition {
    pub fn rate_value(&self) -> Result<f64, RateError> {
        parse_rate(&self.rate)
    }
}

/// Body of class create/edit requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ClassInput {
    pub class_name: String,
    pub rate: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub schedule: Vec<ScheduleSlot>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub note: String,
}

fn default_active() -> bool {
    true
}

/// Free-standing weekly rule attached to a class. Unlike the class's own
/// schedule, several rules may share a weekday, each with its own window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ScheduleRule {
    pub rule_id: String,
    pub class_id: String,
    #[schema(value_type = String, example = "Wed")]
    pub weekday: Weekday,
    pub duration_hours: f64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub note: String,
    pub updated_at_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct RuleInput {
    #[schema(value_type = String, example = "Wed")]
    pub weekday: Weekday,
    pub duration_hours: f64,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Planned,
    Done,
    Cancel,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Planned => "planned",
            SessionStatus::Done => "done",
            SessionStatus::Cancel => "cancel",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "planned" => Ok(SessionStatus::Planned),
            "done" => Ok(SessionStatus::Done),
            "cancel" | "cancelled" | "canceled" => Ok(SessionStatus::Cancel),
            other => Err(format!("unknown session status '{other}'")),
        }
    }
}

/// One dated occurrence of a class.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Session {
    pub session_id: String,
    pub class_id: String,
    pub class_name: String,
    pub session_date: NaiveDate,
    #[schema(value_type = String, example = "Sat")]
    pub weekday: Weekday,
    /// Date the session was generated for. Stays put when the session is moved.
    pub slot_date: NaiveDate,
    pub planned_duration_hours: f64,
    pub actual_duration_hours: f64,
    pub rate: f64,
    pub fee: f64,
    pub status: SessionStatus,
    pub note: String,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
}

/// User edits for one row of the month view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct SessionEdit {
    pub session_id: String,
    pub session_date: NaiveDate,
    pub actual_duration_hours: f64,
    pub rate: f64,
    pub status: SessionStatus,
    #[serde(default)]
    pub note: String,
}

impl From<&Session> for SessionEdit {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id.clone(),
            session_date: session.session_date,
            actual_duration_hours: session.actual_duration_hours,
            rate: session.rate,
            status: session.status,
            note: session.note.clone(),
        }
    }
}

/// The edited month view sent back on save. `class_id` narrows the view to
/// one class; the batch must cover exactly the rows of that view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct SaveSessionsRequest {
    #[serde(default)]
    pub class_id: Option<String>,
    pub rows: Vec<SessionEdit>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ClassTotals {
    pub class_id: String,
    pub class_name: String,
    pub session_count: usize,
    pub total_hours: f64,
    pub total_fee: f64,
    pub display_total_fee: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct MonthSummary {
    pub year: i32,
    pub month: u32,
    pub classes: Vec<ClassTotals>,
    pub total_hours: f64,
    pub total_fee: f64,
    /// Multiplier from stored fee units to display units.
    pub display_scale: f64,
    pub display_total_fee: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct MonthView {
    pub year: i32,
    pub month: u32,
    pub sessions: Vec<Session>,
    pub summary: MonthSummary,
}
