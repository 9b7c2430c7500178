//! Calendar-specific error types.

use calbridge_core::{AppError, RusqliteErrorExt};
use thiserror::Error;

use crate::types::EntityType;

#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("{} permission is required to do this operation", .0.permission_name())]
    PermissionDenied(EntityType),

    #[error("Could not find the default calendar")]
    NoDefaultCalendar,

    #[error("Could not find the default calendar")]
    NoCalendars,

    #[error("Calendar with id {0} could not be found")]
    CalendarNotFound(String),

    #[error("Event with id {0} could not be found")]
    EventNotFound(String),

    #[error("Reminder with id {0} could not be found")]
    ReminderNotFound(String),

    #[error("String could not be interpreted as a date: {0}. Expected format: YYYY-MM-DD'T'HH:mm:ss.sssZ")]
    InvalidDate(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Missing required parameter `{0}`")]
    MissingParameter(&'static str),

    #[error("Calendar {0} is immutable and cannot be modified")]
    CalendarImmutable(String),

    #[error("Calendar with id {id} is not of type `{expected}`")]
    InvalidCalendarType { id: String, expected: EntityType },

    #[error("Calendar service unavailable: {0}")]
    Unavailable(String),
}

/// Coarse classification of a failure, as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PermissionDenied,
    NotFound,
    InvalidArgument,
    Unavailable,
}

impl CalendarError {
    /// Stable rejection code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::NoDefaultCalendar => "NO_DEFAULT_CALENDAR",
            Self::NoCalendars => "NO_CALENDARS",
            Self::CalendarNotFound(_) => "CALENDAR_NOT_FOUND",
            Self::EventNotFound(_) => "EVENT_NOT_FOUND",
            Self::ReminderNotFound(_) => "REMINDER_NOT_FOUND",
            Self::InvalidDate(_) => "INVALID_DATE",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::MissingParameter(_) => "MISSING_PARAMETER",
            Self::CalendarImmutable(_) => "CALENDAR_NOT_SAVED",
            Self::InvalidCalendarType { .. } => "INVALID_CALENDAR_TYPE",
            Self::Unavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied(_) | Self::CalendarImmutable(_) => ErrorKind::PermissionDenied,
            Self::NoDefaultCalendar
            | Self::NoCalendars
            | Self::CalendarNotFound(_)
            | Self::EventNotFound(_)
            | Self::ReminderNotFound(_) => ErrorKind::NotFound,
            Self::InvalidDate(_)
            | Self::InvalidArgument(_)
            | Self::MissingParameter(_)
            | Self::InvalidCalendarType { .. } => ErrorKind::InvalidArgument,
            Self::Unavailable(_) => ErrorKind::Unavailable,
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        self.kind() == ErrorKind::PermissionDenied
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

impl From<rusqlite::Error> for CalendarError {
    fn from(e: rusqlite::Error) -> Self {
        Self::unavailable(e.into_database_error().to_string())
    }
}

impl From<serde_json::Error> for CalendarError {
    fn from(e: serde_json::Error) -> Self {
        Self::unavailable(format!("Stored record is malformed: {}", e))
    }
}

impl From<tokio::task::JoinError> for CalendarError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::unavailable(format!("Calendar task failed: {}", e))
    }
}

impl From<CalendarError> for AppError {
    fn from(e: CalendarError) -> Self {
        AppError::Calendar {
            code: e.code(),
            message: e.to_string(),
        }
    }
}
