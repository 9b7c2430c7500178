//! Calendar service trait and shared validation.
//!
//! `CalendarStore` abstracts over calendar services (the bundled SQLite store,
//! or a platform service such as EventKit). The bridge owns date parsing; the
//! store owns permission state, validation, storage and recurrence expansion.

use chrono::{DateTime, Utc};

use crate::dates;
use crate::error::CalendarError;
use crate::types::{
    Calendar, CalendarDetails, EntityType, Event, PermissionStatus, Reminder,
};

/// Result type for calendar service operations.
pub type CalendarResult<T> = Result<T, CalendarError>;

/// Inclusive time window for event queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// # Errors
    /// Returns `CalendarError::InvalidArgument` if `end` is before `start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> CalendarResult<Self> {
        if end < start {
            return Err(CalendarError::InvalidArgument(format!(
                "End date {} is before start date {}",
                dates::format(&end),
                dates::format(&start)
            )));
        }
        Ok(Self { start, end })
    }
}

/// Trait for calendar and reminder services.
///
/// Implementations don't need to be Sync; `CalendarBridge` serialises access
/// through a mutex and calls the store from the blocking pool.
pub trait CalendarStore: Send {
    /// Current permission status, without prompting.
    fn authorization_status(&self, entity: EntityType) -> CalendarResult<PermissionStatus>;

    /// Ask for access. Prompts only while the status is undetermined.
    fn request_access(&self, entity: EntityType) -> CalendarResult<PermissionStatus>;

    /// Calendars visible to the caller.
    ///
    /// Requires calendar permission. Reminder lists are included only when
    /// reminder permission is granted as well.
    fn calendars(&self) -> CalendarResult<Vec<Calendar>>;

    /// Default calendar for new items of `entity`, if one is configured.
    fn default_calendar(&self, entity: EntityType) -> CalendarResult<Option<Calendar>>;

    /// Create (no id) or update a calendar. Returns its identifier.
    fn save_calendar(&self, details: CalendarDetails) -> CalendarResult<String>;

    /// Delete a calendar together with its events and reminders.
    fn delete_calendar(&self, id: &str) -> CalendarResult<()>;

    /// Events overlapping `range`, recurring events expanded per occurrence.
    ///
    /// `calendar_ids` of `None` or an empty slice searches every event calendar.
    fn events(
        &self,
        range: DateRange,
        calendar_ids: Option<&[String]>,
    ) -> CalendarResult<Vec<Event>>;

    /// Look up an event. With `instance_start`, returns that occurrence of the
    /// series, or `None` if the series has no occurrence there.
    fn event(
        &self,
        id: &str,
        instance_start: Option<DateTime<Utc>>,
    ) -> CalendarResult<Option<Event>>;

    /// Create (no id) or update an event. Returns the stored event.
    fn save_event(&self, event: Event) -> CalendarResult<Event>;

    /// Delete an event. Deleting a recurring event removes the whole series.
    fn delete_event(&self, id: &str) -> CalendarResult<()>;

    fn reminders(&self) -> CalendarResult<Vec<Reminder>>;

    fn reminder(&self, id: &str) -> CalendarResult<Option<Reminder>>;

    /// Create (no id) or update a reminder. Returns the stored reminder.
    fn save_reminder(&self, reminder: Reminder) -> CalendarResult<Reminder>;

    fn delete_reminder(&self, id: &str) -> CalendarResult<()>;

    /// Fail with `PermissionDenied` unless access to `entity` is granted.
    fn require_access(&self, entity: EntityType) -> CalendarResult<()> {
        match self.authorization_status(entity)? {
            PermissionStatus::Granted => Ok(()),
            _ => Err(CalendarError::PermissionDenied(entity)),
        }
    }
}

/// Validate a title.
///
/// # Errors
/// Returns `CalendarError::MissingParameter` if the title is empty or whitespace-only.
pub fn validate_title(title: &str) -> CalendarResult<()> {
    if title.trim().is_empty() {
        return Err(CalendarError::MissingParameter("title"));
    }
    Ok(())
}

/// Validate a `#RRGGBB` color, if one is given.
pub fn validate_color(color: Option<&str>) -> CalendarResult<()> {
    let Some(color) = color else {
        return Ok(());
    };
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(CalendarError::InvalidArgument(format!(
            "Color {:?} is not of the form #RRGGBB",
            color
        )));
    }
    Ok(())
}

/// Check that `calendar` can take new or changed items of `entity`.
pub fn check_writable(calendar: &Calendar, entity: EntityType) -> CalendarResult<()> {
    if !calendar.entity_type.allows(entity) {
        return Err(CalendarError::InvalidCalendarType {
            id: calendar.id.clone(),
            expected: entity,
        });
    }
    if !calendar.allows_modifications {
        return Err(CalendarError::CalendarImmutable(calendar.title.clone()));
    }
    Ok(())
}

/// Validate and normalise an event before it is stored.
///
/// All-day events span midnight UTC of the start day to the last millisecond
/// of the end day. Alarms without a trigger are dropped.
pub fn prepare_event(mut event: Event) -> CalendarResult<Event> {
    validate_title(&event.title)?;

    if event.end_date < event.start_date {
        return Err(CalendarError::InvalidArgument(format!(
            "Event end date {} is before start date {}",
            dates::format(&event.end_date),
            dates::format(&event.start_date)
        )));
    }

    if event.all_day {
        event.start_date = dates::start_of_day(event.start_date.date_naive());
        event.end_date = dates::end_of_day(&event.end_date);
    }

    event.alarms.retain(|alarm| alarm.has_trigger());
    event.recurrence_rule = event.recurrence_rule.map(|rule| rule.normalized());
    event.original_start_date = None;
    Ok(event)
}

/// Validate and normalise a reminder before it is stored.
pub fn prepare_reminder(mut reminder: Reminder) -> CalendarResult<Reminder> {
    validate_title(&reminder.title)?;

    if let (Some(start), Some(due)) = (reminder.start_date, reminder.due_date) {
        if due < start {
            return Err(CalendarError::InvalidArgument(format!(
                "Reminder due date {} is before start date {}",
                dates::format(&due),
                dates::format(&start)
            )));
        }
    }

    if reminder.completed {
        reminder.completion_date.get_or_insert_with(Utc::now);
    } else {
        reminder.completion_date = None;
    }

    reminder.alarms.retain(|alarm| alarm.has_trigger());
    reminder.recurrence_rule = reminder.recurrence_rule.map(|rule| rule.normalized());
    Ok(reminder)
}
