//! JSON method-call surface for the bridge.
//!
//! Maps an operation name and a JSON array of positional arguments onto
//! `CalendarBridge`, resolving with a JSON value or rejecting with a
//! `BridgeRejection { code, message }`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::bridge::CalendarBridge;
use crate::error::CalendarError;
use crate::types::{CalendarDetails, Event, Reminder};

/// Operation names accepted by `dispatch`.
pub const METHODS: &[&str] = &[
    "requestCalendarPermission",
    "requestReminderPermission",
    "getCalendarPermission",
    "getReminderPermission",
    "getCalendarsAsync",
    "getDefaultCalendarAsync",
    "getEventsAsync",
    "getEventByIdAsync",
    "saveEventAsync",
    "deleteEventAsync",
    "getRemindersAsync",
    "getReminderByIdAsync",
    "saveReminderAsync",
    "deleteReminderAsync",
    "saveCalendarAsync",
    "deleteCalendarAsync",
];

/// A rejected call, as reported to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct BridgeRejection {
    pub code: String,
    pub message: String,
}

impl BridgeRejection {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn unknown_method(method: &str) -> Self {
        Self::new("UNKNOWN_METHOD", format!("Unknown method `{}`", method))
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new("INVALID_REQUEST", message)
    }
}

impl From<CalendarError> for BridgeRejection {
    fn from(e: CalendarError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

/// Invoke `method` on the bridge with positional JSON `args`.
///
/// `args` may be an array or `null`. Missing trailing arguments and `null`
/// entries count as absent.
pub async fn dispatch(
    bridge: &CalendarBridge,
    method: &str,
    args: Value,
) -> Result<Value, BridgeRejection> {
    let args = Args::new(args)?;

    match method {
        "requestCalendarPermission" => respond(bridge.request_calendar_permission().await),
        "requestReminderPermission" => respond(bridge.request_reminder_permission().await),
        "getCalendarPermission" => respond(bridge.get_calendar_permission().await),
        "getReminderPermission" => respond(bridge.get_reminder_permission().await),
        "getCalendarsAsync" => respond(bridge.get_calendars().await),
        "getDefaultCalendarAsync" => respond(bridge.get_default_calendar().await),
        "getEventsAsync" => {
            let start = args.date(0, "startDate")?;
            let end = args.date(1, "endDate")?;
            let calendar_ids: Option<Vec<String>> = args.optional(2, "calendarIds")?;
            respond(bridge.get_events(&start, &end, calendar_ids).await)
        }
        "getEventByIdAsync" => {
            let id: String = args.required(0, "eventId")?;
            let instance = args.optional_date(1, "instanceStartDate")?;
            respond(bridge.get_event_by_id(&id, instance.as_deref()).await)
        }
        "saveEventAsync" => {
            let event: Event = args.required(0, "event")?;
            respond(bridge.save_event(event).await)
        }
        "deleteEventAsync" => {
            let id: String = args.required(0, "eventId")?;
            respond(bridge.delete_event(&id).await)
        }
        "getRemindersAsync" => respond(bridge.get_reminders().await),
        "getReminderByIdAsync" => {
            let id: String = args.required(0, "reminderId")?;
            respond(bridge.get_reminder_by_id(&id).await)
        }
        "saveReminderAsync" => {
            let reminder: Reminder = args.required(0, "reminder")?;
            respond(bridge.save_reminder(reminder).await)
        }
        "deleteReminderAsync" => {
            let id: String = args.required(0, "reminderId")?;
            respond(bridge.delete_reminder(&id).await)
        }
        "saveCalendarAsync" => {
            let details: CalendarDetails = args.required(0, "calendar")?;
            respond(bridge.save_calendar(details).await)
        }
        "deleteCalendarAsync" => {
            let id: String = args.required(0, "calendarId")?;
            respond(bridge.delete_calendar(&id).await)
        }
        _ => Err(BridgeRejection::unknown_method(method)),
    }
}

fn respond<T: Serialize>(result: Result<T, CalendarError>) -> Result<Value, BridgeRejection> {
    let value = result?;
    serde_json::to_value(value).map_err(|e| CalendarError::from(e).into())
}

/// Positional call arguments.
struct Args(Vec<Value>);

impl Args {
    fn new(args: Value) -> Result<Self, BridgeRejection> {
        match args {
            Value::Array(values) => Ok(Self(values)),
            Value::Null => Ok(Self(Vec::new())),
            other => Err(CalendarError::InvalidArgument(format!(
                "Arguments must be an array, got {}",
                other
            ))
            .into()),
        }
    }

    fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index).filter(|v| !v.is_null())
    }

    fn required<T: DeserializeOwned>(
        &self,
        index: usize,
        name: &'static str,
    ) -> Result<T, BridgeRejection> {
        let value = self
            .get(index)
            .ok_or(CalendarError::MissingParameter(name))?;
        decode(value, name)
    }

    fn optional<T: DeserializeOwned>(
        &self,
        index: usize,
        name: &'static str,
    ) -> Result<Option<T>, BridgeRejection> {
        self.get(index).map(|value| decode(value, name)).transpose()
    }

    /// A date argument as a string; epoch milliseconds are accepted as numbers.
    fn date(&self, index: usize, name: &'static str) -> Result<String, BridgeRejection> {
        self.optional_date(index, name)?
            .ok_or_else(|| CalendarError::MissingParameter(name).into())
    }

    fn optional_date(
        &self,
        index: usize,
        name: &'static str,
    ) -> Result<Option<String>, BridgeRejection> {
        match self.get(index) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(CalendarError::InvalidDate(format!("{} = {}", name, other)).into()),
        }
    }
}

fn decode<T: DeserializeOwned>(value: &Value, name: &str) -> Result<T, BridgeRejection> {
    T::deserialize(value).map_err(|e| {
        CalendarError::InvalidArgument(format!("Invalid `{}`: {}", name, e)).into()
    })
}
