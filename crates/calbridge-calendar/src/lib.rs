//! Calendar and reminder bridge for Calbridge.
//!
//! `CalendarBridge` is an async facade over a `CalendarStore`, the service
//! that owns calendars, events, reminders and permission state.
//! `SqliteCalendarStore` is the bundled local implementation.

pub mod bridge;
pub mod dates;
pub mod dispatch;
pub mod error;
pub mod recurrence;
pub mod sqlite;
pub mod store;
pub mod types;

pub use bridge::CalendarBridge;
pub use dispatch::{dispatch, BridgeRejection};
pub use error::{CalendarError, ErrorKind};
pub use recurrence::{Frequency, RecurrenceRule};
pub use sqlite::SqliteCalendarStore;
pub use store::{CalendarStore, DateRange};
pub use types::{
    Alarm, AlarmLocation, Availability, Calendar, CalendarDetails, CalendarEntity, CalendarType,
    Coordinates, EntityType, Event, EventStatus, PermissionResult, PermissionStatus, Proximity,
    Reminder, SaveAction, SaveEventResult, Source,
};
