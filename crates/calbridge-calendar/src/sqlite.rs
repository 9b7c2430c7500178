//! SQLite-backed calendar service.
//!
//! `SqliteCalendarStore` keeps calendars, events, reminders and permission
//! answers in a single database file. Recurring items are stored once with
//! their RRULE and expanded at query time.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

use calbridge_core::{Config, PermissionsConfig, PromptResponse};

use crate::dates;
use crate::error::CalendarError;
use crate::store::{
    check_writable, prepare_event, prepare_reminder, validate_color, validate_title,
    CalendarResult, CalendarStore, DateRange,
};
use crate::types::{
    Availability, Calendar, CalendarDetails, CalendarEntity, CalendarType, EntityType, Event,
    EventStatus, PermissionStatus, Reminder, Source,
};

const CALENDAR_COLUMNS: &str =
    "id, title, entity_type, color, calendar_type, source_json, allows_modifications";

const EVENT_COLUMNS: &str = "id, calendar_id, title, start_ms, end_ms, all_day, notes, location, url, \
     time_zone, availability, status, rrule, alarms_json, attributes_json, created_ms, modified_ms";

const REMINDER_COLUMNS: &str = "id, calendar_id, title, notes, location, url, start_ms, due_ms, \
     completed, completion_ms, rrule, alarms_json, attributes_json, created_ms, modified_ms";

const DEFAULT_EVENT_COLOR: &str = "#1BADF8";
const DEFAULT_REMINDER_COLOR: &str = "#FF9500";

/// SQLite calendar service.
pub struct SqliteCalendarStore {
    conn: Connection,
    prompts: PermissionsConfig,
}

impl SqliteCalendarStore {
    /// Open or create a store at the given path with default settings.
    pub fn new<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Self::open(path, true, PermissionsConfig::default())
    }

    /// Open the store described by the application config.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let path = config.database_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path, config.store.seed_defaults, config.permissions.clone())
    }

    /// Open or create a store.
    ///
    /// `seed_defaults` creates a local calendar and reminder list when the
    /// store has no calendars. `prompts` answers permission requests that are
    /// still undetermined.
    pub fn open<P: AsRef<Path>>(
        path: P,
        seed_defaults: bool,
        prompts: PermissionsConfig,
    ) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, seed_defaults, prompts)
    }

    /// Create a seeded in-memory store.
    pub fn in_memory(prompts: PermissionsConfig) -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, true, prompts)
    }

    fn with_connection(
        conn: Connection,
        seed_defaults: bool,
        prompts: PermissionsConfig,
    ) -> anyhow::Result<Self> {
        let store = Self { conn, prompts };
        store.init_schema()?;
        if seed_defaults {
            store.seed_defaults()?;
        }
        Ok(store)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS calendars (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                color TEXT,
                calendar_type TEXT NOT NULL,
                source_json TEXT NOT NULL,
                allows_modifications INTEGER NOT NULL,
                created_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS default_calendars (
                entity_type TEXT PRIMARY KEY,
                calendar_id TEXT NOT NULL REFERENCES calendars(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                calendar_id TEXT NOT NULL REFERENCES calendars(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                start_ms INTEGER NOT NULL,
                end_ms INTEGER NOT NULL,
                all_day INTEGER NOT NULL,
                notes TEXT,
                location TEXT,
                url TEXT,
                time_zone TEXT,
                availability TEXT NOT NULL,
                status TEXT NOT NULL,
                rrule TEXT,
                alarms_json TEXT NOT NULL DEFAULT '[]',
                attributes_json TEXT NOT NULL DEFAULT '{}',
                created_ms INTEGER NOT NULL,
                modified_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reminders (
                id TEXT PRIMARY KEY,
                calendar_id TEXT NOT NULL REFERENCES calendars(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                notes TEXT,
                location TEXT,
                url TEXT,
                start_ms INTEGER,
                due_ms INTEGER,
                completed INTEGER NOT NULL DEFAULT 0,
                completion_ms INTEGER,
                rrule TEXT,
                alarms_json TEXT NOT NULL DEFAULT '[]',
                attributes_json TEXT NOT NULL DEFAULT '{}',
                created_ms INTEGER NOT NULL,
                modified_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS permissions (
                entity_type TEXT PRIMARY KEY,
                status TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_calendar_start ON events(calendar_id, start_ms);
            CREATE INDEX IF NOT EXISTS idx_reminders_calendar ON reminders(calendar_id);
            "#,
        )?;
        Ok(())
    }

    /// Create the local calendar and reminder list on an empty store.
    fn seed_defaults(&self) -> CalendarResult<()> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM calendars", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(());
        }

        let mut calendar = CalendarDetails::new("Calendar", CalendarEntity::Event);
        calendar.color = Some(DEFAULT_EVENT_COLOR.to_string());
        let calendar_id = self.insert_calendar(&calendar)?;
        self.set_default(EntityType::Event, &calendar_id)?;

        let mut reminders = CalendarDetails::new("Reminders", CalendarEntity::Reminder);
        reminders.color = Some(DEFAULT_REMINDER_COLOR.to_string());
        let reminders_id = self.insert_calendar(&reminders)?;
        self.set_default(EntityType::Reminder, &reminders_id)?;

        tracing::info!("Seeded local calendar and reminder list");
        Ok(())
    }

    /// Overwrite a stored permission answer. `Undetermined` clears it so the
    /// next request prompts again.
    pub fn set_authorization_status(
        &self,
        entity: EntityType,
        status: PermissionStatus,
    ) -> CalendarResult<()> {
        match status {
            PermissionStatus::Undetermined => {
                self.conn.execute(
                    "DELETE FROM permissions WHERE entity_type = ?1",
                    params![entity.as_str()],
                )?;
            }
            status => {
                self.conn.execute(
                    "INSERT OR REPLACE INTO permissions (entity_type, status) VALUES (?1, ?2)",
                    params![entity.as_str(), status.as_str()],
                )?;
            }
        }
        Ok(())
    }

    fn prompt(&self, entity: EntityType) -> PermissionStatus {
        let response = match entity {
            EntityType::Event => self.prompts.calendar,
            EntityType::Reminder => self.prompts.reminders,
        };
        match response {
            PromptResponse::Grant => PermissionStatus::Granted,
            PromptResponse::Deny => PermissionStatus::Denied,
        }
    }

    fn is_granted(&self, entity: EntityType) -> CalendarResult<bool> {
        Ok(self.authorization_status(entity)? == PermissionStatus::Granted)
    }

    /// Calendar lookups by id need at least one of the two permissions.
    fn require_any_access(&self) -> CalendarResult<()> {
        if self.is_granted(EntityType::Event)? || self.is_granted(EntityType::Reminder)? {
            return Ok(());
        }
        Err(CalendarError::PermissionDenied(EntityType::Event))
    }

    fn insert_calendar(&self, details: &CalendarDetails) -> CalendarResult<String> {
        let id = Uuid::new_v4().to_string();
        let source = details.source.clone().unwrap_or_else(Source::local);
        let calendar_type = details.calendar_type.unwrap_or_default();
        let source_json = serde_json::to_string(&source)?;

        self.conn.execute(
            r#"
            INSERT INTO calendars
            (id, title, entity_type, color, calendar_type, source_json, allows_modifications, created_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                id,
                details.title,
                details.entity_type.as_str(),
                details.color,
                calendar_type.as_str(),
                source_json,
                details.allows_modifications as i32,
                Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(id)
    }

    fn set_default(&self, entity: EntityType, calendar_id: &str) -> CalendarResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO default_calendars (entity_type, calendar_id) VALUES (?1, ?2)",
            params![entity.as_str(), calendar_id],
        )?;
        Ok(())
    }

    fn default_for(&self, entity: EntityType) -> CalendarResult<Option<Calendar>> {
        let sql = format!(
            "SELECT {} FROM calendars WHERE id = (SELECT calendar_id FROM default_calendars WHERE entity_type = ?1)",
            CALENDAR_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![entity.as_str()], Self::row_to_calendar)
            .optional()?)
    }

    fn all_calendars(&self) -> CalendarResult<Vec<Calendar>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM calendars ORDER BY created_ms ASC, title ASC",
            CALENDAR_COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::row_to_calendar)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn load_calendar(&self, id: &str) -> CalendarResult<Option<Calendar>> {
        let sql = format!("SELECT {} FROM calendars WHERE id = ?1", CALENDAR_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], Self::row_to_calendar)
            .optional()?)
    }

    fn require_calendar(&self, id: &str) -> CalendarResult<Calendar> {
        self.load_calendar(id)?
            .ok_or_else(|| CalendarError::CalendarNotFound(id.to_string()))
    }

    /// Calendars an event query covers. Empty or absent ids mean every event calendar.
    fn event_calendar_ids(&self, calendar_ids: Option<&[String]>) -> CalendarResult<Vec<String>> {
        let Some(ids) = calendar_ids.filter(|ids| !ids.is_empty()) else {
            let all: Vec<String> = self
                .all_calendars()?
                .into_iter()
                .filter(|c| c.entity_type.allows(EntityType::Event))
                .map(|c| c.id)
                .collect();
            if all.is_empty() {
                return Err(CalendarError::NoCalendars);
            }
            return Ok(all);
        };

        let mut resolved: Vec<String> = Vec::with_capacity(ids.len());
        for id in ids {
            let calendar = self.require_calendar(id)?;
            if !calendar.entity_type.allows(EntityType::Event) {
                return Err(CalendarError::InvalidCalendarType {
                    id: calendar.id,
                    expected: EntityType::Event,
                });
            }
            if !resolved.contains(&calendar.id) {
                resolved.push(calendar.id);
            }
        }
        Ok(resolved)
    }

    fn load_event(&self, id: &str) -> CalendarResult<Option<Event>> {
        let sql = format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], Self::row_to_event)
            .optional()?)
    }

    fn write_event(
        &self,
        id: &str,
        calendar_id: &str,
        event: &Event,
        created_ms: i64,
    ) -> CalendarResult<()> {
        let alarms_json = serde_json::to_string(&event.alarms)?;
        let attributes_json = serde_json::to_string(&event.attributes)?;
        let sql = format!(
            "INSERT OR REPLACE INTO events ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            EVENT_COLUMNS
        );

        self.conn.execute(
            &sql,
            params![
                id,
                calendar_id,
                event.title,
                event.start_date.timestamp_millis(),
                event.end_date.timestamp_millis(),
                event.all_day as i32,
                event.notes,
                event.location,
                event.url,
                event.time_zone,
                event.availability.as_str(),
                event.status.as_str(),
                event.recurrence_rule.as_ref().map(|rule| rule.to_rrule()),
                alarms_json,
                attributes_json,
                created_ms,
                Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn load_reminder(&self, id: &str) -> CalendarResult<Option<Reminder>> {
        let sql = format!("SELECT {} FROM reminders WHERE id = ?1", REMINDER_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![id], Self::row_to_reminder)
            .optional()?)
    }

    fn write_reminder(
        &self,
        id: &str,
        calendar_id: &str,
        reminder: &Reminder,
        created_ms: i64,
    ) -> CalendarResult<()> {
        let alarms_json = serde_json::to_string(&reminder.alarms)?;
        let attributes_json = serde_json::to_string(&reminder.attributes)?;
        let sql = format!(
            "INSERT OR REPLACE INTO reminders ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            REMINDER_COLUMNS
        );

        self.conn.execute(
            &sql,
            params![
                id,
                calendar_id,
                reminder.title,
                reminder.notes,
                reminder.location,
                reminder.url,
                reminder.start_date.map(|d| d.timestamp_millis()),
                reminder.due_date.map(|d| d.timestamp_millis()),
                reminder.completed as i32,
                reminder.completion_date.map(|d| d.timestamp_millis()),
                reminder.recurrence_rule.as_ref().map(|rule| rule.to_rrule()),
                alarms_json,
                attributes_json,
                created_ms,
                Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn row_to_calendar(row: &rusqlite::Row) -> rusqlite::Result<Calendar> {
        let entity_type: String = row.get(2)?;
        let calendar_type = CalendarType::parse(&row.get::<_, String>(4)?);
        let source_json: String = row.get(5)?;

        Ok(Calendar {
            id: row.get(0)?,
            title: row.get(1)?,
            source: serde_json::from_str(&source_json).unwrap_or_else(|_| Source::local()),
            entity_type: CalendarEntity::parse(&entity_type),
            color: row.get(3)?,
            calendar_type,
            allows_modifications: row.get::<_, i32>(6)? != 0,
            allowed_availabilities: allowed_availabilities(calendar_type),
        })
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<Event> {
        let rrule: Option<String> = row.get(12)?;
        let alarms_json: String = row.get(13)?;
        let attributes_json: String = row.get(14)?;

        Ok(Event {
            id: Some(row.get(0)?),
            calendar_id: Some(row.get(1)?),
            title: row.get(2)?,
            start_date: timestamp(row.get(3)?),
            end_date: timestamp(row.get(4)?),
            all_day: row.get::<_, i32>(5)? != 0,
            notes: row.get(6)?,
            location: row.get(7)?,
            url: row.get(8)?,
            time_zone: row.get(9)?,
            availability: Availability::parse(&row.get::<_, String>(10)?),
            status: EventStatus::parse(&row.get::<_, String>(11)?),
            recurrence_rule: rrule.and_then(|s| s.parse().ok()),
            alarms: serde_json::from_str(&alarms_json).unwrap_or_default(),
            original_start_date: None,
            creation_date: Some(timestamp(row.get(15)?)),
            last_modified_date: Some(timestamp(row.get(16)?)),
            attributes: serde_json::from_str(&attributes_json).unwrap_or_default(),
        })
    }

    fn row_to_reminder(row: &rusqlite::Row) -> rusqlite::Result<Reminder> {
        let rrule: Option<String> = row.get(10)?;
        let alarms_json: String = row.get(11)?;
        let attributes_json: String = row.get(12)?;

        Ok(Reminder {
            id: Some(row.get(0)?),
            calendar_id: Some(row.get(1)?),
            title: row.get(2)?,
            notes: row.get(3)?,
            location: row.get(4)?,
            url: row.get(5)?,
            start_date: opt_timestamp(row.get(6)?),
            due_date: opt_timestamp(row.get(7)?),
            completed: row.get::<_, i32>(8)? != 0,
            completion_date: opt_timestamp(row.get(9)?),
            recurrence_rule: rrule.and_then(|s| s.parse().ok()),
            alarms: serde_json::from_str(&alarms_json).unwrap_or_default(),
            creation_date: Some(timestamp(row.get(13)?)),
            last_modified_date: Some(timestamp(row.get(14)?)),
            attributes: serde_json::from_str(&attributes_json).unwrap_or_default(),
        })
    }
}

impl CalendarStore for SqliteCalendarStore {
    fn authorization_status(&self, entity: EntityType) -> CalendarResult<PermissionStatus> {
        let status: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM permissions WHERE entity_type = ?1",
                params![entity.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status
            .map(|s| PermissionStatus::parse(&s))
            .unwrap_or_default())
    }

    fn request_access(&self, entity: EntityType) -> CalendarResult<PermissionStatus> {
        let current = self.authorization_status(entity)?;
        if current != PermissionStatus::Undetermined {
            return Ok(current);
        }

        let answer = self.prompt(entity);
        self.set_authorization_status(entity, answer)?;
        tracing::info!(entity = %entity, status = answer.as_str(), "Permission answered");
        Ok(answer)
    }

    fn calendars(&self) -> CalendarResult<Vec<Calendar>> {
        self.require_access(EntityType::Event)?;
        let include_reminders = self.is_granted(EntityType::Reminder)?;

        Ok(self
            .all_calendars()?
            .into_iter()
            .filter(|c| {
                c.entity_type.allows(EntityType::Event)
                    || (include_reminders && c.entity_type.allows(EntityType::Reminder))
            })
            .collect())
    }

    fn default_calendar(&self, entity: EntityType) -> CalendarResult<Option<Calendar>> {
        self.require_access(entity)?;
        self.default_for(entity)
    }

    fn save_calendar(&self, details: CalendarDetails) -> CalendarResult<String> {
        if let Some(id) = details.id.as_deref() {
            self.require_any_access()?;
            let calendar = self.require_calendar(id)?;
            self.require_access(access_for(calendar.entity_type))?;
            validate_title(&details.title)?;
            validate_color(details.color.as_deref())?;
            if !calendar.allows_modifications {
                return Err(CalendarError::CalendarImmutable(calendar.title));
            }
            self.conn.execute(
                "UPDATE calendars SET title = ?1, color = COALESCE(?2, color) WHERE id = ?3",
                params![details.title, details.color, id],
            )?;
            tracing::debug!(calendar_id = %id, "Updated calendar");
            return Ok(id.to_string());
        }

        self.require_access(access_for(details.entity_type))?;
        validate_title(&details.title)?;
        validate_color(details.color.as_deref())?;

        let id = self.insert_calendar(&details)?;
        for entity in [EntityType::Event, EntityType::Reminder] {
            if details.entity_type.allows(entity) && self.default_for(entity)?.is_none() {
                self.set_default(entity, &id)?;
            }
        }
        tracing::debug!(calendar_id = %id, "Created calendar");
        Ok(id)
    }

    fn delete_calendar(&self, id: &str) -> CalendarResult<()> {
        self.require_any_access()?;
        let calendar = self.require_calendar(id)?;
        self.require_access(access_for(calendar.entity_type))?;
        if !calendar.allows_modifications {
            return Err(CalendarError::CalendarImmutable(calendar.title));
        }

        self.conn
            .execute("DELETE FROM calendars WHERE id = ?1", params![id])?;
        tracing::info!(calendar_id = %id, "Deleted calendar");
        Ok(())
    }

    fn events(
        &self,
        range: DateRange,
        calendar_ids: Option<&[String]>,
    ) -> CalendarResult<Vec<Event>> {
        self.require_access(EntityType::Event)?;
        let calendar_ids = self.event_calendar_ids(calendar_ids)?;

        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}
            FROM events
            WHERE calendar_id = ?1 AND start_ms <= ?2 AND (rrule IS NOT NULL OR end_ms >= ?3)
            "#,
            EVENT_COLUMNS
        ))?;

        let mut found = Vec::new();
        for calendar_id in &calendar_ids {
            let rows = stmt.query_map(
                params![
                    calendar_id,
                    range.end.timestamp_millis(),
                    range.start.timestamp_millis()
                ],
                Self::row_to_event,
            )?;

            for event in rows {
                let event = event?;
                match event.recurrence_rule.clone() {
                    Some(rule) => found.extend(
                        rule.occurrences_between(
                            event.start_date,
                            event.duration(),
                            range.start,
                            range.end,
                        )
                        .into_iter()
                        .map(|start| occurrence(&event, start)),
                    ),
                    None => found.push(event),
                }
            }
        }

        found.sort_by(|a, b| {
            a.start_date
                .cmp(&b.start_date)
                .then_with(|| a.title.cmp(&b.title))
        });
        tracing::debug!(count = found.len(), "Listed events");
        Ok(found)
    }

    fn event(
        &self,
        id: &str,
        instance_start: Option<DateTime<Utc>>,
    ) -> CalendarResult<Option<Event>> {
        self.require_access(EntityType::Event)?;
        let Some(event) = self.load_event(id)? else {
            return Ok(None);
        };
        let Some(instance) = instance_start else {
            return Ok(Some(event));
        };

        let rule = event.recurrence_rule.clone();
        match rule {
            Some(rule) if rule.has_occurrence_at(event.start_date, instance) => {
                Ok(Some(occurrence(&event, instance)))
            }
            None if event.start_date == instance => Ok(Some(event)),
            _ => Ok(None),
        }
    }

    fn save_event(&self, event: Event) -> CalendarResult<Event> {
        self.require_access(EntityType::Event)?;

        let existing = match event.id.as_deref() {
            Some(id) => Some(
                self.load_event(id)?
                    .ok_or_else(|| CalendarError::EventNotFound(id.to_string()))?,
            ),
            None => None,
        };

        let event = match &existing {
            Some(existing) => rebase_occurrence(event, existing),
            None => event,
        };
        let event = prepare_event(event)?;

        let calendar = match (event.calendar_id.as_deref(), &existing) {
            (Some(calendar_id), _) => self.require_calendar(calendar_id)?,
            (None, Some(existing)) => {
                self.require_calendar(existing.calendar_id.as_deref().unwrap_or_default())?
            }
            (None, None) => self
                .default_for(EntityType::Event)?
                .ok_or(CalendarError::NoDefaultCalendar)?,
        };
        check_writable(&calendar, EntityType::Event)?;

        let now = Utc::now().timestamp_millis();
        let (id, created_ms) = match &existing {
            Some(existing) => {
                if existing.calendar_id.as_deref() != Some(calendar.id.as_str()) {
                    let previous =
                        self.require_calendar(existing.calendar_id.as_deref().unwrap_or_default())?;
                    check_writable(&previous, EntityType::Event)?;
                }
                (
                    existing.id.clone().unwrap_or_default(),
                    existing
                        .creation_date
                        .map(|d| d.timestamp_millis())
                        .unwrap_or(now),
                )
            }
            None => (Uuid::new_v4().to_string(), now),
        };

        self.write_event(&id, &calendar.id, &event, created_ms)?;
        tracing::debug!(event_id = %id, calendar_id = %calendar.id, "Saved event");

        self.load_event(&id)?
            .ok_or(CalendarError::EventNotFound(id))
    }

    fn delete_event(&self, id: &str) -> CalendarResult<()> {
        self.require_access(EntityType::Event)?;
        let event = self
            .load_event(id)?
            .ok_or_else(|| CalendarError::EventNotFound(id.to_string()))?;
        let calendar = self.require_calendar(event.calendar_id.as_deref().unwrap_or_default())?;
        if !calendar.allows_modifications {
            return Err(CalendarError::CalendarImmutable(calendar.title));
        }

        self.conn
            .execute("DELETE FROM events WHERE id = ?1", params![id])?;
        tracing::debug!(event_id = %id, "Deleted event");
        Ok(())
    }

    fn reminders(&self) -> CalendarResult<Vec<Reminder>> {
        self.require_access(EntityType::Reminder)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM reminders ORDER BY due_ms IS NULL, due_ms ASC, created_ms ASC",
            REMINDER_COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::row_to_reminder)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn reminder(&self, id: &str) -> CalendarResult<Option<Reminder>> {
        self.require_access(EntityType::Reminder)?;
        self.load_reminder(id)
    }

    fn save_reminder(&self, reminder: Reminder) -> CalendarResult<Reminder> {
        self.require_access(EntityType::Reminder)?;

        let existing = match reminder.id.as_deref() {
            Some(id) => Some(
                self.load_reminder(id)?
                    .ok_or_else(|| CalendarError::ReminderNotFound(id.to_string()))?,
            ),
            None => None,
        };
        let reminder = prepare_reminder(reminder)?;

        let calendar = match (reminder.calendar_id.as_deref(), &existing) {
            (Some(calendar_id), _) => self.require_calendar(calendar_id)?,
            (None, Some(existing)) => {
                self.require_calendar(existing.calendar_id.as_deref().unwrap_or_default())?
            }
            (None, None) => self
                .default_for(EntityType::Reminder)?
                .ok_or(CalendarError::NoDefaultCalendar)?,
        };
        check_writable(&calendar, EntityType::Reminder)?;

        let now = Utc::now().timestamp_millis();
        let (id, created_ms) = match &existing {
            Some(existing) => (
                existing.id.clone().unwrap_or_default(),
                existing
                    .creation_date
                    .map(|d| d.timestamp_millis())
                    .unwrap_or(now),
            ),
            None => (Uuid::new_v4().to_string(), now),
        };

        self.write_reminder(&id, &calendar.id, &reminder, created_ms)?;
        tracing::debug!(reminder_id = %id, calendar_id = %calendar.id, "Saved reminder");

        self.load_reminder(&id)?
            .ok_or(CalendarError::ReminderNotFound(id))
    }

    fn delete_reminder(&self, id: &str) -> CalendarResult<()> {
        self.require_access(EntityType::Reminder)?;
        let reminder = self
            .load_reminder(id)?
            .ok_or_else(|| CalendarError::ReminderNotFound(id.to_string()))?;
        let calendar =
            self.require_calendar(reminder.calendar_id.as_deref().unwrap_or_default())?;
        if !calendar.allows_modifications {
            return Err(CalendarError::CalendarImmutable(calendar.title));
        }

        self.conn
            .execute("DELETE FROM reminders WHERE id = ?1", params![id])?;
        tracing::debug!(reminder_id = %id, "Deleted reminder");
        Ok(())
    }
}

/// Permission that guards a calendar holding `entity`.
fn access_for(entity: CalendarEntity) -> EntityType {
    match entity {
        CalendarEntity::Reminder => EntityType::Reminder,
        CalendarEntity::Event | CalendarEntity::Both => EntityType::Event,
    }
}

fn allowed_availabilities(calendar_type: CalendarType) -> Vec<Availability> {
    match calendar_type {
        CalendarType::Local | CalendarType::Exchange => vec![
            Availability::Busy,
            Availability::Free,
            Availability::Tentative,
            Availability::Unavailable,
        ],
        CalendarType::CalDav => vec![Availability::Busy, Availability::Free],
        CalendarType::Subscription | CalendarType::Birthdays => vec![Availability::NotSupported],
    }
}

/// One occurrence of a recurring event.
fn occurrence(event: &Event, start: DateTime<Utc>) -> Event {
    let duration = event.duration();
    let mut instance = event.clone();
    instance.start_date = start;
    instance.end_date = start + duration;
    instance.original_start_date = Some(start);
    instance
}

/// An edited occurrence moves the whole series by the same offset.
fn rebase_occurrence(mut event: Event, existing: &Event) -> Event {
    if existing.recurrence_rule.is_none() {
        return event;
    }
    if let Some(original) = event.original_start_date {
        let duration = event.duration();
        event.start_date = existing.start_date + (event.start_date - original);
        event.end_date = event.start_date + duration;
    }
    event
}

fn timestamp(ms: i64) -> DateTime<Utc> {
    dates::from_millis(ms).unwrap_or_default()
}

fn opt_timestamp(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(dates::from_millis)
}
