//! Async calendar bridge.
//!
//! `CalendarBridge` exposes the calendar service to the application layer.
//! Each call parses its string arguments, then runs the matching store
//! operation on the blocking pool and hands back its result or error.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::instrument;

use crate::dates;
use crate::error::CalendarError;
use crate::store::{CalendarStore, DateRange};
use crate::types::{
    Calendar, CalendarDetails, EntityType, Event, PermissionResult, Reminder, SaveEventResult,
};

/// Async facade over a `CalendarStore`.
///
/// Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct CalendarBridge {
    store: Arc<Mutex<Box<dyn CalendarStore>>>,
}

impl CalendarBridge {
    pub fn new(store: impl CalendarStore + 'static) -> Self {
        Self {
            store: Arc::new(Mutex::new(Box::new(store))),
        }
    }

    /// Run `op` against the store on the blocking pool.
    async fn call<T, F>(&self, op: F) -> Result<T, CalendarError>
    where
        F: FnOnce(&dyn CalendarStore) -> Result<T, CalendarError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || {
            let guard = store.lock();
            op(&**guard)
        })
        .await?
    }

    /// Ask for calendar access. Resolves with `granted: false` when refused.
    #[instrument(skip(self), level = "info")]
    pub async fn request_calendar_permission(&self) -> Result<PermissionResult, CalendarError> {
        let status = self
            .call(|store| store.request_access(EntityType::Event))
            .await?;
        Ok(status.into())
    }

    /// Ask for reminder access. Resolves with `granted: false` when refused.
    #[instrument(skip(self), level = "info")]
    pub async fn request_reminder_permission(&self) -> Result<PermissionResult, CalendarError> {
        let status = self
            .call(|store| store.request_access(EntityType::Reminder))
            .await?;
        Ok(status.into())
    }

    /// Current calendar permission, without prompting.
    #[instrument(skip(self), level = "debug")]
    pub async fn get_calendar_permission(&self) -> Result<PermissionResult, CalendarError> {
        let status = self
            .call(|store| store.authorization_status(EntityType::Event))
            .await?;
        Ok(status.into())
    }

    /// Current reminder permission, without prompting.
    #[instrument(skip(self), level = "debug")]
    pub async fn get_reminder_permission(&self) -> Result<PermissionResult, CalendarError> {
        let status = self
            .call(|store| store.authorization_status(EntityType::Reminder))
            .await?;
        Ok(status.into())
    }

    #[instrument(skip(self), level = "info")]
    pub async fn get_calendars(&self) -> Result<Vec<Calendar>, CalendarError> {
        self.call(|store| store.calendars()).await
    }

    /// Default calendar for new events.
    #[instrument(skip(self), level = "info")]
    pub async fn get_default_calendar(&self) -> Result<Calendar, CalendarError> {
        self.call(|store| store.default_calendar(EntityType::Event))
            .await?
            .ok_or(CalendarError::NoDefaultCalendar)
    }

    /// Events overlapping `[start_date, end_date]`.
    ///
    /// `calendar_ids` of `None` or an empty list searches every event calendar.
    #[instrument(skip(self), level = "info")]
    pub async fn get_events(
        &self,
        start_date: &str,
        end_date: &str,
        calendar_ids: Option<Vec<String>>,
    ) -> Result<Vec<Event>, CalendarError> {
        let range = DateRange::new(dates::parse(start_date)?, dates::parse(end_date)?)?;
        self.call(move |store| store.events(range, calendar_ids.as_deref()))
            .await
    }

    /// Look up an event, or one occurrence of it when `instance_start_date` is given.
    #[instrument(skip(self), level = "info")]
    pub async fn get_event_by_id(
        &self,
        id: &str,
        instance_start_date: Option<&str>,
    ) -> Result<Event, CalendarError> {
        let id = required_id(id, "eventId")?;
        let instance = dates::parse_opt(instance_start_date)?;
        let lookup = id.clone();
        self.call(move |store| store.event(&lookup, instance))
            .await?
            .ok_or(CalendarError::EventNotFound(id))
    }

    /// Create an event (no id) or update one.
    #[instrument(skip(self, event), fields(event_id = ?event.id), level = "info")]
    pub async fn save_event(&self, event: Event) -> Result<SaveEventResult, CalendarError> {
        let saved = self.call(move |store| store.save_event(event)).await?;
        Ok(SaveEventResult::saved(&saved))
    }

    #[instrument(skip(self), level = "info")]
    pub async fn delete_event(&self, id: &str) -> Result<(), CalendarError> {
        let id = required_id(id, "eventId")?;
        self.call(move |store| store.delete_event(&id)).await
    }

    #[instrument(skip(self), level = "info")]
    pub async fn get_reminders(&self) -> Result<Vec<Reminder>, CalendarError> {
        self.call(|store| store.reminders()).await
    }

    #[instrument(skip(self), level = "info")]
    pub async fn get_reminder_by_id(&self, id: &str) -> Result<Reminder, CalendarError> {
        let id = required_id(id, "reminderId")?;
        let lookup = id.clone();
        self.call(move |store| store.reminder(&lookup))
            .await?
            .ok_or(CalendarError::ReminderNotFound(id))
    }

    /// Create a reminder (no id) or update one. Returns its identifier.
    #[instrument(skip(self, reminder), fields(reminder_id = ?reminder.id), level = "info")]
    pub async fn save_reminder(&self, reminder: Reminder) -> Result<String, CalendarError> {
        let saved = self.call(move |store| store.save_reminder(reminder)).await?;
        Ok(saved.id.unwrap_or_default())
    }

    #[instrument(skip(self), level = "info")]
    pub async fn delete_reminder(&self, id: &str) -> Result<(), CalendarError> {
        let id = required_id(id, "reminderId")?;
        self.call(move |store| store.delete_reminder(&id)).await
    }

    /// Create a calendar (no id) or update one. Returns its identifier.
    #[instrument(skip(self, details), fields(calendar_id = ?details.id), level = "info")]
    pub async fn save_calendar(&self, details: CalendarDetails) -> Result<String, CalendarError> {
        self.call(move |store| store.save_calendar(details)).await
    }

    /// Delete a calendar and everything in it.
    #[instrument(skip(self), level = "info")]
    pub async fn delete_calendar(&self, id: &str) -> Result<(), CalendarError> {
        let id = required_id(id, "calendarId")?;
        self.call(move |store| store.delete_calendar(&id)).await
    }
}

fn required_id(id: &str, name: &'static str) -> Result<String, CalendarError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(CalendarError::MissingParameter(name));
    }
    Ok(id.to_string())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::sqlite::SqliteCalendarStore;
    use crate::types::PermissionStatus;
    use calbridge_core::PermissionsConfig;

    async fn granted_bridge() -> CalendarBridge {
        let store = SqliteCalendarStore::in_memory(PermissionsConfig::default()).unwrap();
        let bridge = CalendarBridge::new(store);
        bridge.request_calendar_permission().await.unwrap();
        bridge.request_reminder_permission().await.unwrap();
        bridge
    }

    fn meeting(title: &str, start: &str) -> Event {
        let start = dates::parse(start).unwrap();
        Event::new(title, start, start + chrono::Duration::hours(1))
    }

    #[tokio::test]
    async fn test_permission_request_and_status() {
        let store = SqliteCalendarStore::in_memory(PermissionsConfig::default()).unwrap();
        let bridge = CalendarBridge::new(store);

        let status = bridge.get_calendar_permission().await.unwrap();
        assert!(!status.granted);
        assert_eq!(status.status, PermissionStatus::Undetermined);

        let result = bridge.request_calendar_permission().await.unwrap();
        assert!(result.granted);
        assert!(bridge.get_calendar_permission().await.unwrap().granted);
        assert!(!bridge.get_reminder_permission().await.unwrap().granted);
    }

    #[tokio::test]
    async fn test_get_events_rejects_bad_dates() {
        let bridge = granted_bridge().await;

        let err = bridge
            .get_events("yesterday", "2024-02-01T00:00:00Z", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_DATE");

        let err = bridge
            .get_events("2024-02-02T00:00:00Z", "2024-02-01T00:00:00Z", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_save_event_result() {
        let bridge = granted_bridge().await;
        let result = bridge
            .save_event(meeting("Lunch", "2024-02-01T12:00:00Z"))
            .await
            .unwrap();

        assert!(!result.event_id.is_empty());
        assert_eq!(result.title, "Lunch");
        assert_eq!(dates::format(&result.start_date), "2024-02-01T12:00:00.000Z");

        let event = bridge.get_event_by_id(&result.event_id, None).await.unwrap();
        assert_eq!(event.title, "Lunch");
    }

    #[tokio::test]
    async fn test_missing_ids() {
        let bridge = granted_bridge().await;
        let err = bridge.get_event_by_id("  ", None).await.unwrap_err();
        assert!(matches!(err, CalendarError::MissingParameter("eventId")));

        let err = bridge.get_reminder_by_id("nope").await.unwrap_err();
        assert!(matches!(err, CalendarError::ReminderNotFound(_)));
    }

    #[tokio::test]
    async fn test_default_calendar_missing() {
        let bridge = granted_bridge().await;
        let calendar = bridge.get_default_calendar().await.unwrap();
        bridge.delete_calendar(&calendar.id).await.unwrap();

        let err = bridge.get_default_calendar().await.unwrap_err();
        assert_eq!(err.code(), "NO_DEFAULT_CALENDAR");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves() {
        let bridge = granted_bridge().await;

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let bridge = bridge.clone();
                tokio::spawn(async move {
                    let start = format!("2024-02-01T{:02}:00:00Z", i);
                    bridge.save_event(meeting(&format!("Slot {}", i), &start)).await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let events = bridge
            .get_events("2024-02-01T00:00:00Z", "2024-02-02T00:00:00Z", None)
            .await
            .unwrap();
        assert_eq!(events.len(), 16);
    }
}
