//! One user interaction's view of the store.
//!
//! A `Workspace` lives for a single request. Tables read through it are
//! cached until the workspace itself writes, at which point the cache is
//! dropped. Nothing is shared between workspaces, so one request never
//! serves another's stale copy. Concurrent writers are not coordinated:
//! the last full-table write wins.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ScheduleError, ScheduleResult};
use crate::ledger::SessionLedger;
use crate::models::{
    ClassDefinition, ClassInput, MonthSummary, MonthView, RuleInput, SaveSessionsRequest,
    ScheduleRule, Session,
};
use crate::repository::Repository;
use crate::schedule::recurrence_rules;
use crate::summary::summarize;
use crate::validation::{validate_class_input, validate_month, validate_rule_input};

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleOptions {
    pub class_id_prefix: String,
    pub class_id_width: usize,
    pub fee_display_scale: f64,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            class_id_prefix: "MCT".to_string(),
            class_id_width: 3,
            fee_display_scale: 1.0,
        }
    }
}

pub struct Workspace<'a> {
    repo: &'a Repository,
    options: ScheduleOptions,
    classes: Option<Vec<ClassDefinition>>,
    rules: Option<Vec<ScheduleRule>>,
    sessions: Option<Vec<Session>>,
}

impl<'a> Workspace<'a> {
    pub fn new(repo: &'a Repository, options: ScheduleOptions) -> Self {
        Self {
            repo,
            options,
            classes: None,
            rules: None,
            sessions: None,
        }
    }

    pub fn invalidate(&mut self) {
        self.classes = None;
        self.rules = None;
        self.sessions = None;
    }

    pub fn classes(&mut self) -> ScheduleResult<&[ClassDefinition]> {
        if self.classes.is_none() {
            self.classes = Some(self.repo.load_classes()?);
        } else {
            debug!("Classes served from workspace cache");
        }
        Ok(self.classes.as_deref().unwrap_or_default())
    }

    pub fn rules(&mut self) -> ScheduleResult<&[ScheduleRule]> {
        if self.rules.is_none() {
            self.rules = Some(self.repo.load_rules()?);
        }
        Ok(self.rules.as_deref().unwrap_or_default())
    }

    pub fn sessions(&mut self) -> ScheduleResult<&[Session]> {
        if self.sessions.is_none() {
            self.sessions = Some(self.repo.load_sessions()?);
        }
        Ok(self.sessions.as_deref().unwrap_or_default())
    }

    fn find_class(&mut self, class_id: &str) -> ScheduleResult<ClassDefinition> {
        self.classes()?
            .iter()
            .find(|c| c.class_id == class_id)
            .cloned()
            .ok_or_else(|| ScheduleError::ClassNotFound(class_id.to_string()))
    }

    pub fn list_classes(&mut self, active_only: bool) -> ScheduleResult<Vec<ClassDefinition>> {
        let mut classes: Vec<ClassDefinition> = self
            .classes()?
            .iter()
            .filter(|c| !active_only || c.active)
            .cloned()
            .collect();
        classes.sort_by(|a, b| {
            a.class_name
                .cmp(&b.class_name)
                .then_with(|| a.class_id.cmp(&b.class_id))
        });
        Ok(classes)
    }

    pub fn create_class(
        &mut self,
        input: ClassInput,
        now: DateTime<Utc>,
    ) -> ScheduleResult<ClassDefinition> {
        validate_class_input(&input)?;
        let class_id = self
            .repo
            .next_class_id(&self.options.class_id_prefix, self.options.class_id_width)?;
        let class = ClassDefinition {
            class_id,
            class_name: input.class_name.trim().to_string(),
            rate: input.rate.trim().to_string(),
            start_date: input.start_date,
            end_date: input.end_date,
            schedule: input.schedule,
            active: input.active,
            note: input.note,
            created_at_utc: now,
        };
        self.repo.append_class(&class)?;
        self.invalidate();
        Ok(class)
    }

    /// Existing sessions keep their denormalized name and rate.
    pub fn update_class(
        &mut self,
        class_id: &str,
        input: ClassInput,
    ) -> ScheduleResult<ClassDefinition> {
        let existing = self.find_class(class_id)?;
        validate_class_input(&input)?;
        let class = ClassDefinition {
            class_id: existing.class_id,
            class_name: input.class_name.trim().to_string(),
            rate: input.rate.trim().to_string(),
            start_date: input.start_date,
            end_date: input.end_date,
            schedule: input.schedule,
            active: input.active,
            note: input.note,
            created_at_utc: existing.created_at_utc,
        };
        self.repo.upsert_class(&class)?;
        self.invalidate();
        Ok(class)
    }

    /// Removes the class and its rules. Its sessions stay as history.
    pub fn delete_class(&mut self, class_id: &str) -> ScheduleResult<()> {
        self.find_class(class_id)?;
        let rules = self.repo.delete_rules_for_class(class_id)?;
        self.repo.delete_class(class_id)?;
        self.invalidate();
        info!(class_id, rules, "Class deleted");
        Ok(())
    }

    pub fn class_rules(&mut self, class_id: &str) -> ScheduleResult<Vec<ScheduleRule>> {
        self.find_class(class_id)?;
        let mut rules: Vec<ScheduleRule> = self
            .rules()?
            .iter()
            .filter(|r| r.class_id == class_id)
            .cloned()
            .collect();
        rules.sort_by(|a, b| {
            a.weekday
                .num_days_from_monday()
                .cmp(&b.weekday.num_days_from_monday())
                .then_with(|| a.rule_id.cmp(&b.rule_id))
        });
        Ok(rules)
    }

    pub fn add_rule(
        &mut self,
        class_id: &str,
        input: RuleInput,
        now: DateTime<Utc>,
    ) -> ScheduleResult<ScheduleRule> {
        self.find_class(class_id)?;
        validate_rule_input(&input)?;
        let rule = ScheduleRule {
            rule_id: Uuid::new_v4().to_string(),
            class_id: class_id.to_string(),
            weekday: input.weekday,
            duration_hours: input.duration_hours,
            start_date: input.start_date,
            end_date: input.end_date,
            note: input.note,
            updated_at_utc: now,
        };
        self.repo.upsert_rule(&rule)?;
        self.invalidate();
        Ok(rule)
    }

    pub fn delete_rule(&mut self, class_id: &str, rule_id: &str) -> ScheduleResult<()> {
        self.find_class(class_id)?;
        if !self.repo.delete_rule(class_id, rule_id)? {
            return Err(ScheduleError::RuleNotFound(rule_id.to_string()));
        }
        self.invalidate();
        Ok(())
    }

    /// Generate whatever sessions the month lacks for every active class,
    /// persist them, and return the (optionally class-scoped) month view.
    pub fn prepare_month(
        &mut self,
        year: i32,
        month: u32,
        class_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> ScheduleResult<MonthView> {
        validate_month(year, month)?;
        if let Some(id) = class_id {
            self.find_class(id)?;
        }

        let classes: Vec<ClassDefinition> =
            self.classes()?.iter().filter(|c| c.active).cloned().collect();
        let extra_rules = self.rules()?.to_vec();
        let mut ledger = SessionLedger::new(self.sessions()?.to_vec());

        let mut fresh = Vec::new();
        for class in &classes {
            let rate = match class.rate_value() {
                Ok(rate) => rate,
                Err(err) => {
                    warn!(class_id = %class.class_id, rate = %class.rate, error = %err, "Skipping class with unusable rate");
                    continue;
                }
            };
            let rules = recurrence_rules(class, &extra_rules);
            fresh.extend(ledger.generate_missing(class, &rules, rate, year, month, now)?);
        }

        if !fresh.is_empty() {
            self.repo.append_sessions(&fresh)?;
            self.invalidate();
        }
        self.month_view(year, month, class_id)
    }

    /// Read-only month view of what the ledger currently holds.
    pub fn month_view(
        &mut self,
        year: i32,
        month: u32,
        class_id: Option<&str>,
    ) -> ScheduleResult<MonthView> {
        validate_month(year, month)?;
        let scale = self.options.fee_display_scale;
        let ledger = SessionLedger::new(self.sessions()?.to_vec());
        let sessions: Vec<Session> = ledger
            .month_view(year, month, class_id)
            .into_iter()
            .cloned()
            .collect();
        let summary = summarize(year, month, &sessions, scale);
        Ok(MonthView {
            year,
            month,
            sessions,
            summary,
        })
    }

    pub fn month_summary(
        &mut self,
        year: i32,
        month: u32,
        now: DateTime<Utc>,
    ) -> ScheduleResult<MonthSummary> {
        Ok(self.prepare_month(year, month, None, now)?.summary)
    }

    /// Reconcile an edited month view and rewrite the ledger. A batch with
    /// no effective change writes nothing.
    pub fn save_month(
        &mut self,
        year: i32,
        month: u32,
        request: &SaveSessionsRequest,
        now: DateTime<Utc>,
    ) -> ScheduleResult<MonthView> {
        validate_month(year, month)?;
        let class_id = request.class_id.as_deref();
        if let Some(id) = class_id {
            self.find_class(id)?;
        }

        let mut ledger = SessionLedger::new(self.sessions()?.to_vec());
        let changed = ledger.apply_edits(year, month, class_id, &request.rows, now)?;
        if changed.is_empty() {
            debug!(year, month, "Save without changes");
        } else {
            self.repo.overwrite_sessions(ledger.sessions())?;
            self.invalidate();
            info!(year, month, changed = changed.len(), "Session edits saved");
        }
        self.month_view(year, month, class_id)
    }

    /// Throw away the class's rows for the month and regenerate the base
    /// schedule.
    pub fn reset_month(
        &mut self,
        year: i32,
        month: u32,
        class_id: &str,
        now: DateTime<Utc>,
    ) -> ScheduleResult<MonthView> {
        validate_month(year, month)?;
        self.find_class(class_id)?;
        self.repo.delete_month_sessions(class_id, year, month)?;
        self.invalidate();
        self.prepare_month(year, month, Some(class_id), now)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate, TimeZone, Weekday};

    use super::*;
    use crate::models::{ScheduleSlot, SessionEdit, SessionStatus};
    use crate::store::MemoryStore;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap()
    }

    fn stella_input() -> ClassInput {
        ClassInput {
            class_name: "Stella".into(),
            rate: "450".into(),
            start_date: NaiveDate::from_ymd_opt(2025, 12, 27),
            end_date: None,
            schedule: vec![ScheduleSlot {
                weekday: Weekday::Sat,
                duration_hours: 2.0,
            }],
            active: true,
            note: String::new(),
        }
    }

    fn setup() -> (Arc<MemoryStore>, Repository) {
        let store = Arc::new(MemoryStore::new());
        let repo = Repository::new(store.clone());
        (store, repo)
    }

    #[test]
    fn test_create_class_assigns_sequential_ids() {
        let (_, repo) = setup();
        let mut ws = Workspace::new(&repo, ScheduleOptions::default());
        let first = ws.create_class(stella_input(), t0()).unwrap();
        let mut second_input = stella_input();
        second_input.class_name = "Arthur".into();
        let second = ws.create_class(second_input, t0()).unwrap();

        assert_eq!(first.class_id, "MCT001");
        assert_eq!(second.class_id, "MCT002");
        let names: Vec<_> = ws
            .list_classes(false)
            .unwrap()
            .into_iter()
            .map(|c| c.class_name)
            .collect();
        assert_eq!(names, vec!["Arthur", "Stella"]);
    }

    #[test]
    fn test_invalid_class_writes_nothing() {
        let (_, repo) = setup();
        let mut ws = Workspace::new(&repo, ScheduleOptions::default());
        let mut input = stella_input();
        input.rate = "450/0".into();
        assert!(matches!(
            ws.create_class(input, t0()),
            Err(ScheduleError::InvalidExpression(_))
        ));
        assert!(repo.load_classes().unwrap().is_empty());
    }

    #[test]
    fn test_prepare_month_is_idempotent() {
        let (_, repo) = setup();
        let mut ws = Workspace::new(&repo, ScheduleOptions::default());
        ws.create_class(stella_input(), t0()).unwrap();

        let view = ws.prepare_month(2026, 1, None, t0()).unwrap();
        assert_eq!(view.sessions.len(), 5);
        assert_eq!(view.summary.total_fee, 4500.0);
        assert_eq!(view.summary.total_hours, 10.0);

        let mut fresh_ws = Workspace::new(&repo, ScheduleOptions::default());
        let again = fresh_ws.prepare_month(2026, 1, None, t0()).unwrap();
        assert_eq!(again.sessions, view.sessions);
        assert_eq!(repo.load_sessions().unwrap().len(), 5);
    }

    #[test]
    fn test_inactive_classes_are_not_generated() {
        let (_, repo) = setup();
        let mut ws = Workspace::new(&repo, ScheduleOptions::default());
        let mut input = stella_input();
        input.active = false;
        ws.create_class(input, t0()).unwrap();
        assert!(ws.prepare_month(2026, 1, None, t0()).unwrap().sessions.is_empty());
        assert!(ws.list_classes(true).unwrap().is_empty());
    }

    #[test]
    fn test_save_month_then_regenerate_keeps_edits() {
        let (_, repo) = setup();
        let mut ws = Workspace::new(&repo, ScheduleOptions::default());
        let class = ws.create_class(stella_input(), t0()).unwrap();
        let view = ws.prepare_month(2026, 1, None, t0()).unwrap();

        let mut rows: Vec<SessionEdit> = view.sessions.iter().map(SessionEdit::from).collect();
        rows[0].actual_duration_hours = 1.5;
        rows[1].status = SessionStatus::Done;
        let request = SaveSessionsRequest {
            class_id: Some(class.class_id.clone()),
            rows,
        };
        let saved_at = t0() + Duration::days(3);
        let saved = ws.save_month(2026, 1, &request, saved_at).unwrap();
        assert_eq!(saved.sessions[0].fee, 675.0);
        assert_eq!(saved.sessions[0].updated_at_utc, saved_at);
        assert_eq!(saved.summary.total_fee, 4275.0);

        let after = ws.prepare_month(2026, 1, None, saved_at).unwrap();
        assert_eq!(after.sessions, saved.sessions);
    }

    #[test]
    fn test_class_rename_does_not_touch_sessions() {
        let (_, repo) = setup();
        let mut ws = Workspace::new(&repo, ScheduleOptions::default());
        let class = ws.create_class(stella_input(), t0()).unwrap();
        ws.prepare_month(2026, 1, None, t0()).unwrap();

        let mut input = stella_input();
        input.class_name = "Stella (online)".into();
        input.rate = "500".into();
        let updated = ws.update_class(&class.class_id, input).unwrap();
        assert_eq!(updated.created_at_utc, class.created_at_utc);

        let sessions = ws.prepare_month(2026, 1, None, t0()).unwrap().sessions;
        assert!(sessions.iter().all(|s| s.class_name == "Stella" && s.rate == 450.0));
        let february = ws.prepare_month(2026, 2, None, t0()).unwrap().sessions;
        assert!(february.iter().all(|s| s.class_name == "Stella (online)" && s.rate == 500.0));
    }

    #[test]
    fn test_reset_month_regenerates_base() {
        let (_, repo) = setup();
        let mut ws = Workspace::new(&repo, ScheduleOptions::default());
        let class = ws.create_class(stella_input(), t0()).unwrap();
        let view = ws.prepare_month(2026, 1, None, t0()).unwrap();

        let mut rows: Vec<SessionEdit> = view.sessions.iter().map(SessionEdit::from).collect();
        rows[0].rate = 1.0;
        let request = SaveSessionsRequest {
            class_id: None,
            rows,
        };
        ws.save_month(2026, 1, &request, t0()).unwrap();

        let reset = ws.reset_month(2026, 1, &class.class_id, t0()).unwrap();
        assert_eq!(reset.sessions.len(), 5);
        assert!(reset.sessions.iter().all(|s| s.fee == 900.0));
        assert!(
            reset
                .sessions
                .iter()
                .all(|s| view.sessions.iter().all(|old| old.session_id != s.session_id))
        );
    }

    #[test]
    fn test_rules_feed_generation() {
        let (_, repo) = setup();
        let mut ws = Workspace::new(&repo, ScheduleOptions::default());
        let class = ws.create_class(stella_input(), t0()).unwrap();
        ws.add_rule(
            &class.class_id,
            RuleInput {
                weekday: Weekday::Wed,
                duration_hours: 1.0,
                start_date: None,
                end_date: None,
                note: "homework clinic".into(),
            },
            t0(),
        )
        .unwrap();

        let view = ws.prepare_month(2026, 1, None, t0()).unwrap();
        assert_eq!(view.sessions.len(), 9);
        assert_eq!(ws.class_rules(&class.class_id).unwrap().len(), 1);

        ws.delete_class(&class.class_id).unwrap();
        assert!(repo.load_rules().unwrap().is_empty());
        assert_eq!(repo.load_sessions().unwrap().len(), 9);
    }

    #[test]
    fn test_delete_unknown_rule() {
        let (_, repo) = setup();
        let mut ws = Workspace::new(&repo, ScheduleOptions::default());
        let class = ws.create_class(stella_input(), t0()).unwrap();
        assert!(matches!(
            ws.delete_rule(&class.class_id, "nope"),
            Err(ScheduleError::RuleNotFound(_))
        ));
        assert!(matches!(
            ws.class_rules("MCT999"),
            Err(ScheduleError::ClassNotFound(_))
        ));
    }

    #[test]
    fn test_cache_is_dropped_after_own_write() {
        let (_, repo) = setup();
        let mut ws = Workspace::new(&repo, ScheduleOptions::default());
        assert!(ws.classes().unwrap().is_empty());
        ws.create_class(stella_input(), t0()).unwrap();
        assert_eq!(ws.classes().unwrap().len(), 1);
    }

    #[test]
    fn test_unusable_fee_cell_counts_as_zero() {
        use crate::repository::{SESSIONS_HEADER, SESSIONS_TABLE};
        use crate::store::{TableStore, column_index};

        let (store, repo) = setup();
        let mut ws = Workspace::new(&repo, ScheduleOptions::default());
        ws.create_class(stella_input(), t0()).unwrap();
        ws.prepare_month(2026, 1, None, t0()).unwrap();

        let fee_col = column_index(SESSIONS_TABLE, SESSIONS_HEADER, "fee").unwrap();
        let mut rows = store.read_all(SESSIONS_TABLE, SESSIONS_HEADER).unwrap();
        rows[0][fee_col] = "n/a".into();
        store.overwrite(SESSIONS_TABLE, SESSIONS_HEADER, &rows).unwrap();

        let mut ws = Workspace::new(&repo, ScheduleOptions::default());
        let summary = ws.month_summary(2026, 1, t0()).unwrap();
        assert_eq!(summary.total_fee, 3600.0);
        assert_eq!(summary.total_hours, 10.0);
        assert_eq!(ws.prepare_month(2026, 3, None, t0()).unwrap().sessions.len(), 4);
    }

    #[test]
    fn test_store_outage_surfaces() {
        let (store, repo) = setup();
        let mut ws = Workspace::new(&repo, ScheduleOptions::default());
        store.set_available(false);
        assert!(matches!(
            ws.prepare_month(2026, 1, None, t0()),
            Err(ScheduleError::BackendUnavailable(_))
        ));
    }
}
