//! The session ledger: regeneration appends, saves reconcile edits.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::debug;

use crate::error::{ScheduleError, ScheduleResult};
use crate::models::{ClassDefinition, Session, SessionEdit};
use crate::schedule::{RecurrenceRule, generate_sessions, in_month};
use crate::validation::validate_edit;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionLedger {
    sessions: Vec<Session>,
}

impl SessionLedger {
    pub fn new(sessions: Vec<Session>) -> Self {
        Self { sessions }
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn into_sessions(self) -> Vec<Session> {
        self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.session_id == session_id)
    }

    /// Rows dated in the month, optionally for one class, ordered by class
    /// name then date.
    pub fn month_view(&self, year: i32, month: u32, class_id: Option<&str>) -> Vec<&Session> {
        let mut view: Vec<&Session> = self
            .sessions
            .iter()
            .filter(|s| in_month(s.session_date, year, month))
            .filter(|s| class_id.is_none_or(|id| s.class_id == id))
            .collect();
        view.sort_by(|a, b| {
            a.class_name
                .cmp(&b.class_name)
                .then_with(|| a.class_id.cmp(&b.class_id))
                .then_with(|| a.session_date.cmp(&b.session_date))
        });
        view
    }

    /// Expand `class` for the month and append whatever is missing.
    /// Returns only the appended rows.
    pub fn generate_missing(
        &mut self,
        class: &ClassDefinition,
        rules: &[RecurrenceRule],
        rate: f64,
        year: i32,
        month: u32,
        now: DateTime<Utc>,
    ) -> ScheduleResult<Vec<Session>> {
        let fresh = generate_sessions(class, rules, rate, year, month, &self.sessions, now)?;
        debug!(
            class_id = %class.class_id,
            year,
            month,
            generated = fresh.len(),
            "Generated sessions"
        );
        self.sessions.extend(fresh.iter().cloned());
        Ok(fresh)
    }

    /// Merge an edited month view into the ledger.
    ///
    /// The batch must cover exactly the rows of the view it was rendered
    /// from. Everything is checked before anything is touched, so a
    /// rejected batch leaves the ledger as it was. Fee and weekday are
    /// recomputed for every edited row; `updated_at_utc` only moves when a
    /// field actually changed. Returns the ids of the changed rows.
    pub fn apply_edits(
        &mut self,
        year: i32,
        month: u32,
        class_id: Option<&str>,
        edits: &[SessionEdit],
        now: DateTime<Utc>,
    ) -> ScheduleResult<Vec<String>> {
        let view_ids: HashSet<&str> = self
            .month_view(year, month, class_id)
            .into_iter()
            .map(|s| s.session_id.as_str())
            .collect();
        if view_ids.len() != edits.len() {
            return Err(ScheduleError::RowCountMismatch {
                expected: view_ids.len(),
                actual: edits.len(),
            });
        }

        let mut seen = HashSet::new();
        for edit in edits {
            if !seen.insert(edit.session_id.as_str()) {
                return Err(ScheduleError::validation(format!(
                    "session {} appears more than once in the batch",
                    edit.session_id
                )));
            }
        }

        let unknown: Vec<String> = edits
            .iter()
            .filter(|edit| self.get(&edit.session_id).is_none())
            .map(|edit| edit.session_id.clone())
            .collect();
        if !unknown.is_empty() {
            return Err(ScheduleError::UnknownSessionId(unknown));
        }

        if let Some(stray) = edits
            .iter()
            .find(|edit| !view_ids.contains(edit.session_id.as_str()))
        {
            return Err(ScheduleError::validation(format!(
                "session {} is not part of the edited view",
                stray.session_id
            )));
        }

        for edit in edits {
            validate_edit(edit)?;
        }
        self.check_unique_dates(edits)?;

        let by_id: HashMap<&str, &SessionEdit> =
            edits.iter().map(|e| (e.session_id.as_str(), e)).collect();
        let mut changed = Vec::new();
        for session in &mut self.sessions {
            let Some(edit) = by_id.get(session.session_id.as_str()) else {
                continue;
            };
            if apply_edit(session, edit, now) {
                changed.push(session.session_id.clone());
            }
        }
        Ok(changed)
    }

    fn check_unique_dates(&self, edits: &[SessionEdit]) -> ScheduleResult<()> {
        let moved: HashMap<&str, NaiveDate> = edits
            .iter()
            .map(|e| (e.session_id.as_str(), e.session_date))
            .collect();
        let mut occupied: HashMap<(&str, NaiveDate), usize> = HashMap::new();
        for session in &self.sessions {
            let date = moved
                .get(session.session_id.as_str())
                .copied()
                .unwrap_or(session.session_date);
            *occupied.entry((session.class_id.as_str(), date)).or_default() += 1;
        }
        // Only a moved row can create a collision; duplicates already in the
        // ledger are left alone.
        for session in &self.sessions {
            let Some(&date) = moved.get(session.session_id.as_str()) else {
                continue;
            };
            if date == session.session_date {
                continue;
            }
            if occupied
                .get(&(session.class_id.as_str(), date))
                .is_some_and(|&count| count > 1)
            {
                return Err(ScheduleError::validation(format!(
                    "{} already has a session on {date}",
                    session.class_name
                )));
            }
        }
        Ok(())
    }

    /// Drop the class's rows dated or slotted in the month.
    pub fn remove_month(&mut self, class_id: &str, year: i32, month: u32) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|s| !belongs_to_month(s, class_id, year, month));
        before - self.sessions.len()
    }
}

pub fn belongs_to_month(session: &Session, class_id: &str, year: i32, month: u32) -> bool {
    session.class_id == class_id
        && (in_month(session.session_date, year, month) || in_month(session.slot_date, year, month))
}

fn apply_edit(session: &mut Session, edit: &SessionEdit, now: DateTime<Utc>) -> bool {
    let changed = session.session_date != edit.session_date
        || session.actual_duration_hours != edit.actual_duration_hours
        || session.rate != edit.rate
        || session.status != edit.status
        || session.note != edit.note;

    session.session_date = edit.session_date;
    session.actual_duration_hours = edit.actual_duration_hours;
    session.rate = edit.rate;
    session.status = edit.status;
    session.note = edit.note.clone();
    session.weekday = session.session_date.weekday();
    session.fee = session.actual_duration_hours * session.rate;
    if changed {
        session.updated_at_utc = now;
    }
    changed
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Weekday};

    use super::*;
    use crate::models::{ScheduleSlot, SessionStatus};
    use crate::schedule::recurrence_rules;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap()
    }

    fn class(id: &str, name: &str, weekday: Weekday) -> ClassDefinition {
        ClassDefinition {
            class_id: id.into(),
            class_name: name.into(),
            rate: "450".into(),
            start_date: None,
            end_date: None,
            schedule: vec![ScheduleSlot {
                weekday,
                duration_hours: 2.0,
            }],
            active: true,
            note: String::new(),
            created_at_utc: t0(),
        }
    }

    fn seeded() -> SessionLedger {
        let mut ledger = SessionLedger::default();
        for c in [
            class("MCT001", "Stella", Weekday::Sat),
            class("MCT002", "Arthur", Weekday::Tue),
        ] {
            let rules = recurrence_rules(&c, &[]);
            ledger.generate_missing(&c, &rules, 450.0, 2026, 1, t0()).unwrap();
        }
        ledger
    }

    fn view_edits(ledger: &SessionLedger, class_id: Option<&str>) -> Vec<SessionEdit> {
        ledger
            .month_view(2026, 1, class_id)
            .into_iter()
            .map(SessionEdit::from)
            .collect()
    }

    #[test]
    fn test_month_view_ordering() {
        let ledger = seeded();
        let view = ledger.month_view(2026, 1, None);
        assert_eq!(view.len(), 9);
        assert_eq!(view[0].class_name, "Arthur");
        assert!(view.windows(2).all(|w| {
            (w[0].class_name.as_str(), w[0].session_date)
                <= (w[1].class_name.as_str(), w[1].session_date)
        }));
        assert_eq!(ledger.month_view(2026, 1, Some("MCT001")).len(), 5);
        assert!(ledger.month_view(2026, 2, None).is_empty());
    }

    #[test]
    fn test_rate_edit_touches_only_that_row() {
        let mut ledger = seeded();
        let before = ledger.clone();
        let mut edits = view_edits(&ledger, None);
        let target = edits[3].session_id.clone();
        edits[3].rate = 500.0;

        let later = t0() + Duration::hours(2);
        let changed = ledger.apply_edits(2026, 1, None, &edits, later).unwrap();
        assert_eq!(changed, vec![target.clone()]);

        for (old, new) in before.sessions().iter().zip(ledger.sessions()) {
            if new.session_id == target {
                assert_eq!(new.rate, 500.0);
                assert_eq!(new.fee, 1000.0);
                assert_eq!(new.updated_at_utc, later);
                assert_eq!(new.created_at_utc, old.created_at_utc);
            } else {
                assert_eq!(old, new);
            }
        }
    }

    #[test]
    fn test_duration_edit_recomputes_fee_and_noop_save_keeps_timestamp() {
        let mut ledger = seeded();
        let mut edits = view_edits(&ledger, Some("MCT001"));
        let id = edits[0].session_id.clone();
        assert_eq!(ledger.get(&id).unwrap().fee, 900.0);
        edits[0].actual_duration_hours = 1.5;

        let first_save = t0() + Duration::minutes(5);
        ledger
            .apply_edits(2026, 1, Some("MCT001"), &edits, first_save)
            .unwrap();
        let edited = ledger.get(&id).unwrap().clone();
        assert_eq!(edited.fee, 675.0);
        assert_eq!(edited.planned_duration_hours, 2.0);
        assert_eq!(edited.updated_at_utc, first_save);

        let again = view_edits(&ledger, Some("MCT001"));
        let changed = ledger
            .apply_edits(2026, 1, Some("MCT001"), &again, first_save + Duration::hours(1))
            .unwrap();
        assert!(changed.is_empty());
        assert_eq!(ledger.get(&id).unwrap(), &edited);
    }

    #[test]
    fn test_date_edit_recomputes_weekday() {
        let mut ledger = seeded();
        let mut edits = view_edits(&ledger, Some("MCT001"));
        let id = edits[0].session_id.clone();
        edits[0].session_date = ymd(2026, 1, 4);

        ledger
            .apply_edits(2026, 1, Some("MCT001"), &edits, t0())
            .unwrap();
        let moved = ledger.get(&id).unwrap();
        assert_eq!(moved.weekday, Weekday::Sun);
        assert_eq!(moved.slot_date, ymd(2026, 1, 3));
    }

    #[test]
    fn test_date_collision_rejected() {
        let mut ledger = seeded();
        let before = ledger.clone();
        let mut edits = view_edits(&ledger, Some("MCT001"));
        edits[0].session_date = edits[1].session_date;

        let err = ledger
            .apply_edits(2026, 1, Some("MCT001"), &edits, t0())
            .unwrap_err();
        assert!(matches!(err, ScheduleError::Validation(_)));
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_existing_duplicate_does_not_block_other_saves() {
        let mut sessions = seeded().into_sessions();
        let mut twin = sessions[0].clone();
        twin.session_id = "twin-a".into();
        twin.session_date = ymd(2026, 2, 7);
        twin.slot_date = twin.session_date;
        let mut other_twin = twin.clone();
        other_twin.session_id = "twin-b".into();
        sessions.extend([twin, other_twin]);
        let mut ledger = SessionLedger::new(sessions);

        let mut edits = view_edits(&ledger, Some("MCT002"));
        edits[0].rate = 500.0;
        let changed = ledger
            .apply_edits(2026, 1, Some("MCT002"), &edits, t0())
            .unwrap();
        assert_eq!(changed, vec![edits[0].session_id.clone()]);

        let untouched: Vec<SessionEdit> = ledger
            .month_view(2026, 2, Some("MCT001"))
            .into_iter()
            .map(SessionEdit::from)
            .collect();
        assert_eq!(untouched.len(), 2);
        assert!(
            ledger
                .apply_edits(2026, 2, Some("MCT001"), &untouched, t0())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_row_count_mismatch() {
        let mut ledger = seeded();
        let mut edits = view_edits(&ledger, None);
        edits.pop();
        let err = ledger.apply_edits(2026, 1, None, &edits, t0()).unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::RowCountMismatch {
                expected: 9,
                actual: 8
            }
        ));
    }

    #[test]
    fn test_unknown_ids_reject_whole_batch() {
        let mut ledger = seeded();
        let before = ledger.clone();
        let mut edits = view_edits(&ledger, Some("MCT002"));
        edits[0].rate = 1.0;
        edits[1].session_id = "ghost-1".into();
        edits[2].session_id = "ghost-2".into();

        let err = ledger
            .apply_edits(2026, 1, Some("MCT002"), &edits, t0())
            .unwrap_err();
        match err {
            ScheduleError::UnknownSessionId(ids) => assert_eq!(ids, vec!["ghost-1", "ghost-2"]),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_edit_outside_view_rejected() {
        let mut ledger = seeded();
        let mut edits = view_edits(&ledger, Some("MCT002"));
        let foreign = ledger.month_view(2026, 1, Some("MCT001"))[0].session_id.clone();
        edits[0].session_id = foreign;
        assert!(matches!(
            ledger.apply_edits(2026, 1, Some("MCT002"), &edits, t0()),
            Err(ScheduleError::Validation(_))
        ));
    }

    #[test]
    fn test_status_and_note_edit() {
        let mut ledger = seeded();
        let mut edits = view_edits(&ledger, Some("MCT002"));
        edits[0].status = SessionStatus::Cancel;
        edits[0].actual_duration_hours = 0.0;
        edits[0].note = "sick".into();
        let id = edits[0].session_id.clone();

        ledger
            .apply_edits(2026, 1, Some("MCT002"), &edits, t0())
            .unwrap();
        let session = ledger.get(&id).unwrap();
        assert_eq!(session.status, SessionStatus::Cancel);
        assert_eq!(session.fee, 0.0);
        assert_eq!(session.note, "sick");
    }

    #[test]
    fn test_remove_month() {
        let mut ledger = seeded();
        assert_eq!(ledger.remove_month("MCT001", 2026, 1), 5);
        assert_eq!(ledger.len(), 4);
        assert_eq!(ledger.remove_month("MCT001", 2026, 1), 0);
    }
}
