//! Typed access to the Classes, ScheduleRules and Sessions tables.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use regex::Regex;
use tracing::{info, warn};

use crate::error::{ScheduleError, ScheduleResult};
use crate::models::{ClassDefinition, ScheduleRule, ScheduleSlot, Session, SessionStatus};
use crate::schedule::in_month;
use crate::store::{Row, TableStore, column_index};

pub const CLASSES_TABLE: &str = "Classes";
pub const CLASSES_HEADER: &[&str] = &[
    "class_id",
    "class_name",
    "rate",
    "start_date",
    "end_date",
    "week_day",
    "duration_hours",
    "active",
    "note",
    "created_at_utc",
];

pub const RULES_TABLE: &str = "ScheduleRules";
pub const RULES_HEADER: &[&str] = &[
    "rule_id",
    "class_id",
    "weekday",
    "duration_hours",
    "start_date",
    "end_date",
    "note",
    "updated_at_utc",
];

pub const SESSIONS_TABLE: &str = "Sessions";
pub const SESSIONS_HEADER: &[&str] = &[
    "session_id",
    "class_id",
    "class_name",
    "session_date",
    "weekday",
    "slot_date",
    "planned_duration_hours",
    "actual_duration_hours",
    "rate",
    "fee",
    "status",
    "note",
    "created_at_utc",
    "updated_at_utc",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Next id after the highest numeric suffix among `existing`, e.g.
/// `MCT001`, `MCT002`. Ids with another prefix or a non-numeric tail are
/// ignored.
pub fn next_class_id<'a>(
    existing: impl IntoIterator<Item = &'a str>,
    prefix: &str,
    width: usize,
) -> String {
    let pattern = format!(r"^{}(\d+)$", regex::escape(prefix));
    let max = Regex::new(&pattern).ok().and_then(|re| {
        existing
            .into_iter()
            .filter_map(|id| {
                re.captures(id.trim())
                    .and_then(|caps| caps[1].parse::<u64>().ok())
            })
            .max()
    });
    let next = max.map_or(1, |n| n + 1);
    format!("{prefix}{next:0width$}")
}

/// Cell reader for one stored row. Errors name the table, the 1-based sheet
/// row (header is row 1) and the column.
struct Cells<'a> {
    table: &'static str,
    header: &'static [&'static str],
    row: &'a Row,
    line: usize,
}

impl<'a> Cells<'a> {
    fn new(table: &'static str, header: &'static [&'static str], row: &'a Row, idx: usize) -> Self {
        Self {
            table,
            header,
            row,
            line: idx + 2,
        }
    }

    fn malformed(&self, column: &'static str, message: impl Into<String>) -> ScheduleError {
        ScheduleError::MalformedRow {
            table: self.table,
            row: self.line,
            column,
            message: message.into(),
        }
    }

    fn text(&self, column: &'static str) -> ScheduleResult<&'a str> {
        let idx = column_index(self.table, self.header, column)?;
        self.row
            .get(idx)
            .map(|s| s.as_str())
            .ok_or_else(|| self.malformed(column, "missing cell"))
    }

    fn required(&self, column: &'static str) -> ScheduleResult<&'a str> {
        let value = self.text(column)?.trim();
        if value.is_empty() {
            return Err(self.malformed(column, "value is required"));
        }
        Ok(value)
    }

    fn date(&self, column: &'static str) -> ScheduleResult<NaiveDate> {
        let raw = self.required(column)?;
        NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map_err(|e| self.malformed(column, format!("'{raw}': {e}")))
    }

    /// Blank or unreadable bounds are treated as absent.
    fn bound(&self, column: &'static str) -> ScheduleResult<Option<NaiveDate>> {
        let raw = self.text(column)?.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        match NaiveDate::parse_from_str(raw, DATE_FORMAT) {
            Ok(date) => Ok(Some(date)),
            Err(_) => {
                warn!(table = self.table, row = self.line, column, value = raw, "Ignoring unreadable date bound");
                Ok(None)
            }
        }
    }

    /// Blank or unreadable amounts read as zero so one bad cell cannot take
    /// the whole ledger down.
    fn amount(&self, column: &'static str) -> ScheduleResult<f64> {
        let raw = self.text(column)?.trim();
        if raw.is_empty() {
            return Ok(0.0);
        }
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => {
                warn!(table = self.table, row = self.line, column, value = raw, "Reading unusable amount as zero");
                Ok(0.0)
            }
        }
    }

    fn timestamp(&self, column: &'static str) -> ScheduleResult<DateTime<Utc>> {
        let raw = self.required(column)?;
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| self.malformed(column, format!("'{raw}': {e}")))
    }

    fn weekday(&self, column: &'static str) -> ScheduleResult<Weekday> {
        let raw = self.required(column)?;
        Weekday::from_str(raw).map_err(|_| self.malformed(column, format!("'{raw}' is not a weekday")))
    }
}

fn format_bound(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn class_to_row(class: &ClassDefinition) -> ScheduleResult<Row> {
    let days: Vec<String> = class.schedule.iter().map(|s| s.weekday.to_string()).collect();
    let hours: Vec<f64> = class.schedule.iter().map(|s| s.duration_hours).collect();
    let days = serde_json::to_string(&days).map_err(crate::store::StoreError::from)?;
    let hours = serde_json::to_string(&hours).map_err(crate::store::StoreError::from)?;
    Ok(vec![
        class.class_id.clone(),
        class.class_name.clone(),
        class.rate.clone(),
        format_bound(class.start_date),
        format_bound(class.end_date),
        days,
        hours,
        class.active.to_string(),
        class.note.clone(),
        class.created_at_utc.to_rfc3339(),
    ])
}

pub fn class_from_row(row: &Row, idx: usize) -> ScheduleResult<ClassDefinition> {
    let cells = Cells::new(CLASSES_TABLE, CLASSES_HEADER, row, idx);

    let days_raw = cells.text("week_day")?.trim();
    let hours_raw = cells.text("duration_hours")?.trim();
    let days: Vec<String> = if days_raw.is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(days_raw).map_err(|e| cells.malformed("week_day", e.to_string()))?
    };
    let hours: Vec<f64> = if hours_raw.is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(hours_raw)
            .map_err(|e| cells.malformed("duration_hours", e.to_string()))?
    };
    if days.len() != hours.len() {
        return Err(cells.malformed(
            "duration_hours",
            format!("{} weekdays but {} durations", days.len(), hours.len()),
        ));
    }
    let schedule = days
        .iter()
        .zip(hours)
        .map(|(day, duration_hours)| {
            Weekday::from_str(day)
                .map(|weekday| ScheduleSlot {
                    weekday,
                    duration_hours,
                })
                .map_err(|_| cells.malformed("week_day", format!("'{day}' is not a weekday")))
        })
        .collect::<ScheduleResult<Vec<_>>>()?;

    let active = match cells.text("active")?.trim().to_ascii_lowercase().as_str() {
        "" | "true" | "1" | "yes" => true,
        "false" | "0" | "no" => false,
        other => return Err(cells.malformed("active", format!("'{other}' is not a boolean"))),
    };

    Ok(ClassDefinition {
        class_id: cells.required("class_id")?.to_string(),
        class_name: cells.required("class_name")?.to_string(),
        rate: cells.text("rate")?.trim().to_string(),
        start_date: cells.bound("start_date")?,
        end_date: cells.bound("end_date")?,
        schedule,
        active,
        note: cells.text("note")?.to_string(),
        created_at_utc: cells.timestamp("created_at_utc")?,
    })
}

pub fn rule_to_row(rule: &ScheduleRule) -> Row {
    vec![
        rule.rule_id.clone(),
        rule.class_id.clone(),
        rule.weekday.to_string(),
        rule.duration_hours.to_string(),
        format_bound(rule.start_date),
        format_bound(rule.end_date),
        rule.note.clone(),
        rule.updated_at_utc.to_rfc3339(),
    ]
}

pub fn rule_from_row(row: &Row, idx: usize) -> ScheduleResult<ScheduleRule> {
    let cells = Cells::new(RULES_TABLE, RULES_HEADER, row, idx);
    Ok(ScheduleRule {
        rule_id: cells.required("rule_id")?.to_string(),
        class_id: cells.required("class_id")?.to_string(),
        weekday: cells.weekday("weekday")?,
        duration_hours: cells.amount("duration_hours")?,
        start_date: cells.bound("start_date")?,
        end_date: cells.bound("end_date")?,
        note: cells.text("note")?.to_string(),
        updated_at_utc: cells.timestamp("updated_at_utc")?,
    })
}

pub fn session_to_row(session: &Session) -> Row {
    vec![
        session.session_id.clone(),
        session.class_id.clone(),
        session.class_name.clone(),
        format_date(session.session_date),
        session.weekday.to_string(),
        format_date(session.slot_date),
        session.planned_duration_hours.to_string(),
        session.actual_duration_hours.to_string(),
        session.rate.to_string(),
        session.fee.to_string(),
        session.status.to_string(),
        session.note.clone(),
        session.created_at_utc.to_rfc3339(),
        session.updated_at_utc.to_rfc3339(),
    ]
}

/// The stored weekday is ignored; it is always derived from the date.
pub fn session_from_row(row: &Row, idx: usize) -> ScheduleResult<Session> {
    let cells = Cells::new(SESSIONS_TABLE, SESSIONS_HEADER, row, idx);
    let session_date = cells.date("session_date")?;
    let slot_date = if cells.text("slot_date")?.trim().is_empty() {
        session_date
    } else {
        cells.date("slot_date")?
    };
    let status_raw = cells.text("status")?.trim();
    let status = if status_raw.is_empty() {
        SessionStatus::Planned
    } else {
        status_raw
            .parse()
            .map_err(|e: String| cells.malformed("status", e))?
    };

    Ok(Session {
        session_id: cells.required("session_id")?.to_string(),
        class_id: cells.required("class_id")?.to_string(),
        class_name: cells.text("class_name")?.to_string(),
        session_date,
        weekday: session_date.weekday(),
        slot_date,
        planned_duration_hours: cells.amount("planned_duration_hours")?,
        actual_duration_hours: cells.amount("actual_duration_hours")?,
        rate: cells.amount("rate")?,
        fee: cells.amount("fee")?,
        status,
        note: cells.text("note")?.to_string(),
        created_at_utc: cells.timestamp("created_at_utc")?,
        updated_at_utc: cells.timestamp("updated_at_utc")?,
    })
}

/// Store-backed repository. Every call goes to the store; caching is the
/// caller's business.
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn TableStore>,
}

impl Repository {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    pub fn ping(&self) -> ScheduleResult<()> {
        Ok(self.store.ping()?)
    }

    pub fn load_classes(&self) -> ScheduleResult<Vec<ClassDefinition>> {
        self.store
            .read_all(CLASSES_TABLE, CLASSES_HEADER)?
            .iter()
            .enumerate()
            .map(|(idx, row)| class_from_row(row, idx))
            .collect()
    }

    pub fn next_class_id(&self, prefix: &str, width: usize) -> ScheduleResult<String> {
        let rows = self.store.read_all(CLASSES_TABLE, CLASSES_HEADER)?;
        let key = column_index(CLASSES_TABLE, CLASSES_HEADER, "class_id")?;
        Ok(next_class_id(
            rows.iter().filter_map(|row| row.get(key).map(|s| s.as_str())),
            prefix,
            width,
        ))
    }

    pub fn append_class(&self, class: &ClassDefinition) -> ScheduleResult<()> {
        let row = class_to_row(class)?;
        self.store
            .append_rows(CLASSES_TABLE, CLASSES_HEADER, &[row])?;
        info!(class_id = %class.class_id, class_name = %class.class_name, "Class created");
        Ok(())
    }

    pub fn upsert_class(&self, class: &ClassDefinition) -> ScheduleResult<()> {
        let row = class_to_row(class)?;
        self.store
            .upsert_by_key(CLASSES_TABLE, CLASSES_HEADER, "class_id", row)?;
        info!(class_id = %class.class_id, "Class saved");
        Ok(())
    }

    pub fn delete_class(&self, class_id: &str) -> ScheduleResult<bool> {
        let key = column_index(CLASSES_TABLE, CLASSES_HEADER, "class_id")?;
        let removed = self.store.delete_where(CLASSES_TABLE, CLASSES_HEADER, &|row: &Row| {
            row.get(key).is_some_and(|id| id == class_id)
        })?;
        Ok(removed > 0)
    }

    pub fn load_rules(&self) -> ScheduleResult<Vec<ScheduleRule>> {
        self.store
            .read_all(RULES_TABLE, RULES_HEADER)?
            .iter()
            .enumerate()
            .map(|(idx, row)| rule_from_row(row, idx))
            .collect()
    }

    pub fn upsert_rule(&self, rule: &ScheduleRule) -> ScheduleResult<()> {
        self.store
            .upsert_by_key(RULES_TABLE, RULES_HEADER, "rule_id", rule_to_row(rule))?;
        info!(rule_id = %rule.rule_id, class_id = %rule.class_id, "Schedule rule saved");
        Ok(())
    }

    pub fn delete_rule(&self, class_id: &str, rule_id: &str) -> ScheduleResult<bool> {
        let id_col = column_index(RULES_TABLE, RULES_HEADER, "rule_id")?;
        let class_col = column_index(RULES_TABLE, RULES_HEADER, "class_id")?;
        let removed = self.store.delete_where(RULES_TABLE, RULES_HEADER, &|row: &Row| {
            row.get(id_col).is_some_and(|id| id == rule_id)
                && row.get(class_col).is_some_and(|id| id == class_id)
        })?;
        Ok(removed > 0)
    }

    pub fn delete_rules_for_class(&self, class_id: &str) -> ScheduleResult<usize> {
        let class_col = column_index(RULES_TABLE, RULES_HEADER, "class_id")?;
        Ok(self.store.delete_where(RULES_TABLE, RULES_HEADER, &|row: &Row| {
            row.get(class_col).is_some_and(|id| id == class_id)
        })?)
    }

    pub fn load_sessions(&self) -> ScheduleResult<Vec<Session>> {
        self.store
            .read_all(SESSIONS_TABLE, SESSIONS_HEADER)?
            .iter()
            .enumerate()
            .map(|(idx, row)| session_from_row(row, idx))
            .collect()
    }

    pub fn append_sessions(&self, sessions: &[Session]) -> ScheduleResult<()> {
        let rows: Vec<Row> = sessions.iter().map(session_to_row).collect();
        self.store
            .append_rows(SESSIONS_TABLE, SESSIONS_HEADER, &rows)?;
        if !rows.is_empty() {
            info!(count = rows.len(), "Sessions appended");
        }
        Ok(())
    }

    /// Rewrite the whole Sessions table. Last writer wins.
    pub fn overwrite_sessions(&self, sessions: &[Session]) -> ScheduleResult<()> {
        let rows: Vec<Row> = sessions.iter().map(session_to_row).collect();
        self.store
            .overwrite(SESSIONS_TABLE, SESSIONS_HEADER, &rows)?;
        info!(count = rows.len(), "Sessions table rewritten");
        Ok(())
    }

    /// Delete a class's sessions dated or slotted in the month.
    pub fn delete_month_sessions(&self, class_id: &str, year: i32, month: u32) -> ScheduleResult<usize> {
        let class_col = column_index(SESSIONS_TABLE, SESSIONS_HEADER, "class_id")?;
        let date_col = column_index(SESSIONS_TABLE, SESSIONS_HEADER, "session_date")?;
        let slot_col = column_index(SESSIONS_TABLE, SESSIONS_HEADER, "slot_date")?;
        let dated_in_month = |cell: Option<&String>| {
            cell.and_then(|raw| NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok())
                .is_some_and(|date| in_month(date, year, month))
        };
        let removed = self.store.delete_where(SESSIONS_TABLE, SESSIONS_HEADER, &|row: &Row| {
            row.get(class_col).is_some_and(|id| id == class_id)
                && (dated_in_month(row.get(date_col)) || dated_in_month(row.get(slot_col)))
        })?;
        info!(class_id, year, month, removed, "Month sessions reset");
        Ok(removed)
    }
}
