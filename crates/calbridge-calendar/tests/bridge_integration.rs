//! Integration tests for CalendarBridge over the SQLite store.
//!
//! These tests exercise the bridge the way an application would: permission
//! requests first, then calendar, event and reminder calls.

#![allow(clippy::unwrap_used)]

use calbridge_calendar::{
    dates, CalendarBridge, CalendarDetails, CalendarEntity, CalendarError, ErrorKind, Event,
    Frequency, PermissionStatus, RecurrenceRule, Reminder, SqliteCalendarStore,
};
use calbridge_core::{PermissionsConfig, PromptResponse};

/// Helper to build an event from ISO strings
fn test_event(title: &str, start: &str, end: &str) -> Event {
    Event::new(title, dates::parse(start).unwrap(), dates::parse(end).unwrap())
}

async fn granted_bridge() -> CalendarBridge {
    let store = SqliteCalendarStore::in_memory(PermissionsConfig::default()).unwrap();
    let bridge = CalendarBridge::new(store);
    assert!(bridge.request_calendar_permission().await.unwrap().granted);
    assert!(bridge.request_reminder_permission().await.unwrap().granted);
    bridge
}

#[tokio::test]
async fn test_events_restricted_to_calendar() {
    let bridge = granted_bridge().await;
    let work = bridge
        .save_calendar(CalendarDetails::new("Work", CalendarEntity::Event))
        .await
        .unwrap();
    let default = bridge.get_default_calendar().await.unwrap();

    bridge
        .save_event(test_event("Home", "2024-02-01T08:00:00Z", "2024-02-01T09:00:00Z"))
        .await
        .unwrap();
    bridge
        .save_event(
            test_event("Standup", "2024-02-01T10:00:00Z", "2024-02-01T10:15:00Z").in_calendar(&work),
        )
        .await
        .unwrap();
    bridge
        .save_event(
            test_event("Retro", "2024-02-01T15:00:00Z", "2024-02-01T16:00:00Z").in_calendar(&work),
        )
        .await
        .unwrap();

    let calendars = bridge.get_calendars().await.unwrap();
    assert!(calendars.iter().any(|c| c.id == work));
    assert!(calendars.iter().any(|c| c.id == default.id));

    for calendar in calendars.iter().filter(|c| c.entity_type != CalendarEntity::Reminder) {
        let events = bridge
            .get_events(
                "2024-02-01T00:00:00.000Z",
                "2024-02-02T00:00:00.000Z",
                Some(vec![calendar.id.clone()]),
            )
            .await
            .unwrap();
        assert!(events
            .iter()
            .all(|e| e.calendar_id.as_deref() == Some(calendar.id.as_str())));
    }

    let all = bridge
        .get_events("2024-02-01T00:00:00.000Z", "2024-02-02T00:00:00.000Z", None)
        .await
        .unwrap();
    let titles: Vec<_> = all.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Home", "Standup", "Retro"]);
}

#[tokio::test]
async fn test_save_then_get_matches_input() {
    let bridge = granted_bridge().await;
    let json = serde_json::json!({
        "title": "Team Meeting",
        "notes": "Weekly sync",
        "location": "Conference Room A",
        "url": "https://example.com/meet",
        "startDate": "2024-02-01T10:00:00.000Z",
        "endDate": "2024-02-01T11:00:00.000Z",
        "availability": "free",
        "status": "confirmed",
        "alarms": [{"relativeOffset": -15}],
        "organizerNote": "bring slides"
    });
    let input: Event = serde_json::from_value(json).unwrap();

    let result = bridge.save_event(input.clone()).await.unwrap();
    let stored = bridge.get_event_by_id(&result.event_id, None).await.unwrap();

    assert_eq!(stored.id.as_deref(), Some(result.event_id.as_str()));
    assert_eq!(stored.title, input.title);
    assert_eq!(stored.notes, input.notes);
    assert_eq!(stored.location, input.location);
    assert_eq!(stored.url, input.url);
    assert_eq!(stored.start_date, input.start_date);
    assert_eq!(stored.end_date, input.end_date);
    assert_eq!(stored.availability, input.availability);
    assert_eq!(stored.status, input.status);
    assert_eq!(stored.alarms, input.alarms);
    assert_eq!(stored.attributes, input.attributes);
}

#[tokio::test]
async fn test_delete_then_not_found() {
    let bridge = granted_bridge().await;
    let result = bridge
        .save_event(test_event("Dentist", "2024-02-05T14:00:00Z", "2024-02-05T15:00:00Z"))
        .await
        .unwrap();

    bridge.delete_event(&result.event_id).await.unwrap();

    let err = bridge
        .get_event_by_id(&result.event_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CalendarError::EventNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = bridge.delete_event(&result.event_id).await.unwrap_err();
    assert_eq!(err.code(), "EVENT_NOT_FOUND");
}

#[tokio::test]
async fn test_permission_denied_until_granted() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("calendar.db");
    let prompts = PermissionsConfig {
        calendar: PromptResponse::Deny,
        reminders: PromptResponse::Deny,
    };

    let store = SqliteCalendarStore::open(&db_path, true, prompts).unwrap();
    let bridge = CalendarBridge::new(store);

    let err = bridge.get_calendars().await.unwrap_err();
    assert!(err.is_permission_denied());

    let result = bridge.request_calendar_permission().await.unwrap();
    assert!(!result.granted);
    assert_eq!(result.status, PermissionStatus::Denied);

    let err = bridge
        .get_events("2024-02-01T00:00:00Z", "2024-02-02T00:00:00Z", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PERMISSION_DENIED");

    let err = bridge.get_reminders().await.unwrap_err();
    assert!(matches!(err, CalendarError::PermissionDenied(_)));
    drop(bridge);

    // Grant access out of band, as a user would in system settings.
    let store = SqliteCalendarStore::open(&db_path, true, PermissionsConfig::default()).unwrap();
    store
        .set_authorization_status(calbridge_calendar::EntityType::Event, PermissionStatus::Granted)
        .unwrap();
    let bridge = CalendarBridge::new(store);

    assert!(bridge.get_calendars().await.is_ok());
    assert!(bridge
        .get_events("2024-02-01T00:00:00Z", "2024-02-02T00:00:00Z", None)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_permission_answers_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("calendar.db");

    {
        let store = SqliteCalendarStore::new(&db_path).unwrap();
        let bridge = CalendarBridge::new(store);
        assert!(bridge.request_calendar_permission().await.unwrap().granted);
        bridge
            .save_event(test_event("Kept", "2024-02-01T10:00:00Z", "2024-02-01T11:00:00Z"))
            .await
            .unwrap();
    }

    // Prompts would now be refused, but the stored answer wins.
    let prompts = PermissionsConfig {
        calendar: PromptResponse::Deny,
        reminders: PromptResponse::Deny,
    };
    let store = SqliteCalendarStore::open(&db_path, true, prompts).unwrap();
    let bridge = CalendarBridge::new(store);

    assert!(bridge.get_calendar_permission().await.unwrap().granted);
    assert!(bridge.request_calendar_permission().await.unwrap().granted);
    assert!(!bridge.request_reminder_permission().await.unwrap().granted);

    let calendars = bridge.get_calendars().await.unwrap();
    assert_eq!(calendars.len(), 1, "seeding must not run twice, reminders stay hidden");

    let events = bridge
        .get_events("2024-02-01T00:00:00Z", "2024-02-02T00:00:00Z", None)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn test_end_before_start_is_invalid_argument() {
    let bridge = granted_bridge().await;
    let err = bridge
        .get_events("2024-02-02T00:00:00.000Z", "2024-02-01T00:00:00.000Z", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(err.code(), "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_recurrence_count_and_until() {
    let bridge = granted_bridge().await;

    let mut weekly = test_event("Piano", "2024-01-02T17:00:00Z", "2024-01-02T18:00:00Z");
    weekly.recurrence_rule = Some(RecurrenceRule::new(Frequency::Weekly).count(3));
    bridge.save_event(weekly).await.unwrap();

    let mut daily = test_event("Stretch", "2024-01-10T07:00:00Z", "2024-01-10T07:15:00Z");
    daily.recurrence_rule = Some(
        RecurrenceRule::new(Frequency::Daily)
            .every(2)
            .until(dates::parse("2024-01-16T07:00:00Z").unwrap()),
    );
    let daily_id = bridge.save_event(daily).await.unwrap().event_id;

    let events = bridge
        .get_events("2024-01-01T00:00:00Z", "2024-01-31T00:00:00Z", None)
        .await
        .unwrap();

    let piano: Vec<_> = events
        .iter()
        .filter(|e| e.title == "Piano")
        .map(|e| dates::format(&e.start_date))
        .collect();
    assert_eq!(
        piano,
        vec![
            "2024-01-02T17:00:00.000Z",
            "2024-01-09T17:00:00.000Z",
            "2024-01-16T17:00:00.000Z",
        ]
    );

    let stretch: Vec<_> = events
        .iter()
        .filter(|e| e.title == "Stretch")
        .map(|e| dates::format(&e.start_date))
        .collect();
    assert_eq!(
        stretch,
        vec![
            "2024-01-10T07:00:00.000Z",
            "2024-01-12T07:00:00.000Z",
            "2024-01-14T07:00:00.000Z",
            "2024-01-16T07:00:00.000Z",
        ]
    );

    let starts: Vec<_> = events.iter().map(|e| e.start_date).collect();
    let mut sorted = starts.clone();
    sorted.sort();
    assert_eq!(starts, sorted);

    let occurrence = bridge
        .get_event_by_id(&daily_id, Some("2024-01-14T07:00:00.000Z"))
        .await
        .unwrap();
    assert_eq!(
        occurrence.original_start_date,
        Some(dates::parse("2024-01-14T07:00:00Z").unwrap())
    );
    let err = bridge
        .get_event_by_id(&daily_id, Some("2024-01-18T07:00:00.000Z"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let stored = bridge.get_event_by_id(&daily_id, None).await.unwrap();
    assert_eq!(
        stored.recurrence_rule.map(|r| r.to_rrule()),
        Some("FREQ=DAILY;INTERVAL=2;UNTIL=20240116T070000Z".to_string())
    );
}

#[tokio::test]
async fn test_all_day_event_normalised() {
    let bridge = granted_bridge().await;
    let mut event = test_event("Holiday", "2024-02-14T09:00:00Z", "2024-02-14T10:00:00Z");
    event.all_day = true;

    let result = bridge.save_event(event).await.unwrap();
    assert_eq!(dates::format(&result.start_date), "2024-02-14T00:00:00.000Z");
    assert_eq!(dates::format(&result.end_date), "2024-02-14T23:59:59.999Z");
}

#[tokio::test]
async fn test_save_event_validation() {
    let bridge = granted_bridge().await;

    let err = bridge
        .save_event(test_event("  ", "2024-02-01T10:00:00Z", "2024-02-01T11:00:00Z"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "MISSING_PARAMETER");

    let err = bridge
        .save_event(
            test_event("Nowhere", "2024-02-01T10:00:00Z", "2024-02-01T11:00:00Z")
                .in_calendar("no-such-calendar"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CALENDAR_NOT_FOUND");

    let err = bridge
        .save_event(test_event("Backwards", "2024-02-01T11:00:00Z", "2024-02-01T10:00:00Z"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_reminder_lifecycle() {
    let bridge = granted_bridge().await;

    let mut reminder = Reminder::new("Renew passport");
    reminder.due_date = Some(dates::parse("2024-03-01").unwrap());
    reminder.notes = Some("Photos first".into());
    let id = bridge.save_reminder(reminder).await.unwrap();

    let reminders = bridge.get_reminders().await.unwrap();
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].id.as_deref(), Some(id.as_str()));

    let mut done = bridge.get_reminder_by_id(&id).await.unwrap();
    done.completed = true;
    assert_eq!(bridge.save_reminder(done).await.unwrap(), id);
    assert!(bridge
        .get_reminder_by_id(&id)
        .await
        .unwrap()
        .completion_date
        .is_some());

    bridge.delete_reminder(&id).await.unwrap();
    let err = bridge.get_reminder_by_id(&id).await.unwrap_err();
    assert_eq!(err.code(), "REMINDER_NOT_FOUND");
}

#[tokio::test]
async fn test_delete_calendar_removes_contents() {
    let bridge = granted_bridge().await;
    let trip = bridge
        .save_calendar(CalendarDetails::new("Trip", CalendarEntity::Both))
        .await
        .unwrap();

    let event_id = bridge
        .save_event(
            test_event("Flight", "2024-04-01T06:00:00Z", "2024-04-01T09:00:00Z").in_calendar(&trip),
        )
        .await
        .unwrap()
        .event_id;
    let mut packing = Reminder::new("Pack");
    packing.calendar_id = Some(trip.clone());
    let reminder_id = bridge.save_reminder(packing).await.unwrap();

    bridge.delete_calendar(&trip).await.unwrap();

    assert!(bridge.get_event_by_id(&event_id, None).await.is_err());
    assert!(bridge.get_reminder_by_id(&reminder_id).await.is_err());
    assert!(!bridge
        .get_calendars()
        .await
        .unwrap()
        .iter()
        .any(|c| c.id == trip));
}
