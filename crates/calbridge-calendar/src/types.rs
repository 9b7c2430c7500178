//! Calendar, event and reminder records as they cross the bridge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::dates;
use crate::recurrence::RecurrenceRule;

/// The kind of item a calendar holds, and the permission that guards it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Event,
    Reminder,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Reminder => "reminder",
        }
    }

    /// Name used in permission errors.
    pub fn permission_name(&self) -> &'static str {
        match self {
            Self::Event => "Calendar",
            Self::Reminder => "Reminders",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity types a calendar accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CalendarEntity {
    #[default]
    Event,
    Reminder,
    Both,
}

impl CalendarEntity {
    pub fn allows(&self, entity: EntityType) -> bool {
        matches!(
            (self, entity),
            (Self::Both, _) | (Self::Event, EntityType::Event) | (Self::Reminder, EntityType::Reminder)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Reminder => "reminder",
            Self::Both => "both",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "reminder" => Self::Reminder,
            "both" => Self::Both,
            _ => Self::Event,
        }
    }
}

/// Permission status reported by the calendar service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    #[default]
    Undetermined,
}

impl PermissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Undetermined => "undetermined",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "granted" => Self::Granted,
            "denied" => Self::Denied,
            _ => Self::Undetermined,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionResult {
    pub granted: bool,
    pub status: PermissionStatus,
}

impl From<PermissionStatus> for PermissionResult {
    fn from(status: PermissionStatus) -> Self {
        Self {
            granted: status == PermissionStatus::Granted,
            status,
        }
    }
}

/// Account a calendar belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default)]
    pub is_local_account: bool,
}

impl Source {
    pub fn local() -> Self {
        Self {
            id: Some("local".to_string()),
            name: "On My Device".to_string(),
            source_type: "local".to_string(),
            is_local_account: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CalendarType {
    #[default]
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "calDAV")]
    CalDav,
    #[serde(rename = "exchange")]
    Exchange,
    #[serde(rename = "subscription")]
    Subscription,
    #[serde(rename = "birthdays")]
    Birthdays,
}

impl CalendarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::CalDav => "calDAV",
            Self::Exchange => "exchange",
            Self::Subscription => "subscription",
            Self::Birthdays => "birthdays",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "calDAV" => Self::CalDav,
            "exchange" => Self::Exchange,
            "subscription" => Self::Subscription,
            "birthdays" => Self::Birthdays,
            _ => Self::Local,
        }
    }
}

/// Event availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Availability {
    #[default]
    Busy,
    Free,
    Tentative,
    Unavailable,
    NotSupported,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Busy => "busy",
            Self::Free => "free",
            Self::Tentative => "tentative",
            Self::Unavailable => "unavailable",
            Self::NotSupported => "notSupported",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "busy" => Self::Busy,
            "free" => Self::Free,
            "tentative" => Self::Tentative,
            "unavailable" => Self::Unavailable,
            _ => Self::NotSupported,
        }
    }
}

/// Event status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    None,
    Confirmed,
    Tentative,
    Canceled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Confirmed => "confirmed",
            Self::Tentative => "tentative",
            Self::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "confirmed" => Self::Confirmed,
            "tentative" => Self::Tentative,
            "canceled" => Self::Canceled,
            _ => Self::None,
        }
    }
}

/// Calendar metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calendar {
    pub id: String,
    pub title: String,
    pub source: Source,
    pub entity_type: CalendarEntity,
    pub color: Option<String>,
    #[serde(rename = "type")]
    pub calendar_type: CalendarType,
    pub allows_modifications: bool,
    pub allowed_availabilities: Vec<Availability>,
}

/// Input for creating or updating a calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDetails {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub entity_type: CalendarEntity,
    #[serde(default)]
    pub source: Option<Source>,
    #[serde(default, rename = "type")]
    pub calendar_type: Option<CalendarType>,
    #[serde(default = "default_true")]
    pub allows_modifications: bool,
}

fn default_true() -> bool {
    true
}

impl CalendarDetails {
    pub fn new(title: impl Into<String>, entity_type: CalendarEntity) -> Self {
        Self {
            id: None,
            title: title.into(),
            color: None,
            entity_type,
            source: None,
            calendar_type: None,
            allows_modifications: true,
        }
    }
}

/// Geographic coordinates for location alarms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Proximity {
    Enter,
    Leave,
    #[default]
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmLocation {
    pub title: String,
    #[serde(default)]
    pub proximity: Proximity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coords: Option<Coordinates>,
}

/// An alarm fires at an absolute date, an offset in minutes from the start,
/// or on entering/leaving a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    #[serde(
        default,
        with = "dates::iso_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub absolute_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_offset: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_location: Option<AlarmLocation>,
}

impl Alarm {
    /// An alarm with no trigger is ignored on save.
    pub fn has_trigger(&self) -> bool {
        self.absolute_date.is_some()
            || self.relative_offset.is_some()
            || self.structured_location.is_some()
    }
}

/// Calendar event.
///
/// `id` is absent for new events. Keys not modelled here are kept in
/// `attributes` and stored alongside the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(with = "dates::iso")]
    pub start_date: DateTime<Utc>,
    #[serde(with = "dates::iso")]
    pub end_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub all_day: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub availability: Availability,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_rule: Option<RecurrenceRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alarms: Vec<Alarm>,
    #[serde(
        default,
        with = "dates::iso_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub original_start_date: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "dates::iso_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "dates::iso_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_modified_date: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Event {
    pub fn new(title: impl Into<String>, start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Self {
        Self {
            id: None,
            calendar_id: None,
            title: title.into(),
            start_date,
            end_date,
            notes: None,
            location: None,
            url: None,
            all_day: false,
            time_zone: None,
            availability: Availability::default(),
            status: EventStatus::default(),
            recurrence_rule: None,
            alarms: Vec::new(),
            original_start_date: None,
            creation_date: None,
            last_modified_date: None,
            attributes: Map::new(),
        }
    }

    pub fn in_calendar(mut self, calendar_id: impl Into<String>) -> Self {
        self.calendar_id = Some(calendar_id.into());
        self
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end_date - self.start_date
    }
}

/// Reminder (task) item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(
        default,
        with = "dates::iso_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "dates::iso_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: bool,
    #[serde(
        default,
        with = "dates::iso_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub completion_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_rule: Option<RecurrenceRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alarms: Vec<Alarm>,
    #[serde(
        default,
        with = "dates::iso_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "dates::iso_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_modified_date: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Reminder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: None,
            calendar_id: None,
            title: title.into(),
            notes: None,
            location: None,
            url: None,
            start_date: None,
            due_date: None,
            completed: false,
            completion_date: None,
            recurrence_rule: None,
            alarms: Vec::new(),
            creation_date: None,
            last_modified_date: None,
            attributes: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveAction {
    Saved,
}

/// Result of `saveEventAsync`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveEventResult {
    pub action: SaveAction,
    pub event_id: String,
    pub title: String,
    #[serde(with = "dates::iso")]
    pub start_date: DateTime<Utc>,
    #[serde(with = "dates::iso")]
    pub end_date: DateTime<Utc>,
}

impl SaveEventResult {
    pub fn saved(event: &Event) -> Self {
        Self {
            action: SaveAction::Saved,
            event_id: event.id.clone().unwrap_or_default(),
            title: event.title.clone(),
            start_date: event.start_date,
            end_date: event.end_date,
        }
    }
}
