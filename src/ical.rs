use icalendar::{Calendar, Component, Event, EventLike};

use crate::models::{Session, SessionStatus};

#[derive(Clone, Default)]
pub struct ICalExporter;

impl ICalExporter {
    pub fn new() -> Self {
        Self
    }

    /// All-day events for the given sessions. Cancelled sessions are left out.
    pub fn generate(&self, sessions: &[Session]) -> Vec<u8> {
        let active: Vec<&Session> = sessions
            .iter()
            .filter(|s| s.status != SessionStatus::Cancel)
            .collect();
        if active.is_empty() {
            return Vec::new();
        }

        let mut calendar = Calendar::new();
        calendar.name("Teaching Schedule");

        for session in active {
            let mut event = Event::new();
            event.summary(&format!(
                "{} ({}h)",
                session.class_name, session.actual_duration_hours
            ));
            event.all_day(session.session_date);
            let mut description = format!(
                "Status: {}\nHours: {}\nRate: {}\nFee: {}",
                session.status, session.actual_duration_hours, session.rate, session.fee
            );
            if !session.note.is_empty() {
                description.push_str(&format!("\nNote: {}", session.note));
            }
            event.description(&description);
            event.uid(&format!("{}@tutor-schedule", session.session_id));
            calendar.push(event);
        }

        calendar.to_string().into_bytes()
    }
}
