//! SQLite event store.
//!
//! Events live in a single `gui_event` table. Payloads are stored as JSON
//! text and queried with `json_extract`, so configured `payload.` paths can
//! be filtered, sorted and grouped on inside the database.

use crate::analytics::{Event, PayloadPath};
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::source::{Condition, EventSource, Filter, GroupCount, SortKey};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, params_from_iter, Connection};
use serde_json::{Number, Value};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Columns addressable by filters, sorts and group keys.
const COLUMNS: [&str; 6] = [
    "user_name",
    "employee_type",
    "session_id",
    "event_number",
    "event_type",
    "time_stamp",
];

/// Formats a time stamp the way it is stored: RFC 3339, UTC, milliseconds.
/// Fixed width keeps text order equal to time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Database wrapper with thread-safe connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens or creates the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> AnalyticsResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        tracing::info!(path = ?path, "Opening database");

        let conn = Connection::open(path)?;

        // WAL lets readers proceed while ingestion writes.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Opens an in-memory database (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> AnalyticsResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn lock(&self) -> AnalyticsResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AnalyticsError::data_source("database connection lock poisoned"))
    }

    /// Initializes the database schema.
    fn init_schema(&self) -> AnalyticsResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            -- Recorded GUI events
            CREATE TABLE IF NOT EXISTS gui_event (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_name TEXT NOT NULL,
                employee_type TEXT NOT NULL DEFAULT 'unknown',
                session_id TEXT NOT NULL DEFAULT '',
                event_number INTEGER NOT NULL DEFAULT 0,
                event_type TEXT NOT NULL,
                time_stamp TEXT NOT NULL,
                payload TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_gui_event_time ON gui_event(time_stamp);
            CREATE INDEX IF NOT EXISTS idx_gui_event_session ON gui_event(user_name, session_id);
            CREATE INDEX IF NOT EXISTS idx_gui_event_type ON gui_event(event_type);
            "#,
        )?;

        tracing::debug!("Database schema initialized");
        Ok(())
    }

    /// Saves a batch of events in one transaction.
    pub fn save_events(&self, events: &[Event]) -> AnalyticsResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO gui_event (user_name, employee_type, session_id, event_number, event_type, time_stamp, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for event in events {
                stmt.execute(params![
                    event.user_name,
                    event.employee_type,
                    event.session_id,
                    event.event_number,
                    event.event_type,
                    format_timestamp(event.time_stamp),
                    event.payload.to_string(),
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!(count = events.len(), "Saved events");
        Ok(events.len())
    }

    /// Queries events matching `filter`, ordered by `sort` then insertion order.
    pub fn query_events(&self, filter: &Filter, sort: &[SortKey]) -> AnalyticsResult<Vec<Event>> {
        let mut params = Vec::new();
        let where_clause = where_clause(filter, &mut params)?;

        let mut order = Vec::with_capacity(sort.len() + 1);
        for key in sort {
            let expr = field_expr(&key.field, &mut params)?;
            order.push(format!("{} {}", expr, if key.descending { "DESC" } else { "ASC" }));
        }
        order.push("id ASC".to_string());

        let sql = format!(
            "SELECT user_name, employee_type, session_id, event_number, event_type, time_stamp, payload
             FROM gui_event
             WHERE {}
             ORDER BY {}",
            where_clause,
            order.join(", ")
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            let time_stamp: String = row.get(5)?;
            let time_stamp = DateTime::parse_from_rfc3339(&time_stamp)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?
                .with_timezone(&Utc);
            let payload: Option<String> = row.get(6)?;

            Ok(Event {
                user_name: row.get(0)?,
                employee_type: row.get(1)?,
                session_id: row.get(2)?,
                event_number: row.get(3)?,
                event_type: row.get(4)?,
                time_stamp,
                payload: parse_payload(payload.as_deref()),
            })
        })?;

        let events = rows.collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(count = events.len(), "Fetched events");
        Ok(events)
    }

    /// Counts events per distinct combination of `group_keys`, ordered by key.
    pub fn count_groups(
        &self,
        filter: &Filter,
        group_keys: &[String],
    ) -> AnalyticsResult<Vec<GroupCount>> {
        if group_keys.is_empty() {
            return Err(AnalyticsError::configuration("at least one group key is required"));
        }

        let mut params = Vec::new();
        let mut select = Vec::with_capacity(group_keys.len());
        for key in group_keys {
            select.push(field_expr(key, &mut params)?);
        }
        let where_clause = where_clause(filter, &mut params)?;
        let positions = (1..=group_keys.len())
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "SELECT {}, COUNT(*) FROM gui_event WHERE {} GROUP BY {} ORDER BY {}",
            select.join(", "),
            where_clause,
            positions,
            positions
        );

        let width = group_keys.len();
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
            let mut key = Vec::with_capacity(width);
            for i in 0..width {
                key.push(sql_to_json(row.get::<_, SqlValue>(i)?));
            }
            let count: i64 = row.get(width)?;
            Ok(GroupCount {
                key,
                count: count.max(0) as u64,
            })
        })?;

        let groups = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    /// Counts all stored events.
    pub fn event_count(&self) -> AnalyticsResult<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM gui_event", [], |row| row.get(0))?)
    }

    async fn blocking<T, F>(&self, f: F) -> AnalyticsResult<T>
    where
        F: FnOnce(&Database) -> AnalyticsResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(AnalyticsError::data_source)?
    }
}

#[async_trait]
impl EventSource for Database {
    async fn fetch_ordered(
        &self,
        filter: &Filter,
        sort: &[SortKey],
    ) -> AnalyticsResult<Vec<Event>> {
        let (filter, sort) = (filter.clone(), sort.to_vec());
        self.blocking(move |db| db.query_events(&filter, &sort)).await
    }

    async fn count_grouped_by(
        &self,
        filter: &Filter,
        group_keys: &[&str],
    ) -> AnalyticsResult<Vec<GroupCount>> {
        let filter = filter.clone();
        let keys: Vec<String> = group_keys.iter().map(|k| k.to_string()).collect();
        self.blocking(move |db| db.count_groups(&filter, &keys)).await
    }

    async fn insert_events(&self, events: Vec<Event>) -> AnalyticsResult<usize> {
        self.blocking(move |db| db.save_events(&events)).await
    }
}

/// Renders a filter as a SQL condition, appending bound values to `params`.
fn where_clause(filter: &Filter, params: &mut Vec<SqlValue>) -> AnalyticsResult<String> {
    if filter.is_empty() {
        return Ok("1".to_string());
    }

    let mut clauses = Vec::with_capacity(filter.conditions().len());

    for condition in filter.conditions() {
        let clause = match condition {
            Condition::Equals { field, value } => {
                let expr = field_expr(field, params)?;
                match json_to_sql(field, value)? {
                    SqlValue::Null => format!("{expr} IS NULL"),
                    bound => {
                        params.push(bound);
                        format!("{expr} = ?")
                    }
                }
            }
            Condition::Exists { field, exists } => {
                let expr = field_expr(field, params)?;
                if *exists {
                    format!("{expr} IS NOT NULL")
                } else {
                    format!("{expr} IS NULL")
                }
            }
            Condition::Between { field, start, end } => {
                let mut parts = Vec::new();
                if let Some(start) = start {
                    let expr = field_expr(field, params)?;
                    params.push(SqlValue::Text(format_timestamp(*start)));
                    parts.push(format!("{expr} >= ?"));
                }
                if let Some(end) = end {
                    let expr = field_expr(field, params)?;
                    params.push(SqlValue::Text(format_timestamp(*end)));
                    parts.push(format!("{expr} <= ?"));
                }
                if parts.is_empty() {
                    "1".to_string()
                } else {
                    parts.join(" AND ")
                }
            }
            Condition::In { field, values } => {
                if values.is_empty() {
                    "0".to_string()
                } else {
                    let expr = field_expr(field, params)?;
                    params.extend(values.iter().cloned().map(SqlValue::Text));
                    let placeholders = vec!["?"; values.len()].join(", ");
                    format!("{expr} IN ({placeholders})")
                }
            }
        };
        clauses.push(clause);
    }

    Ok(clauses.join(" AND "))
}

/// Maps an event field to a SQL expression. Payload paths bind their JSON
/// path as a parameter.
fn field_expr(field: &str, params: &mut Vec<SqlValue>) -> AnalyticsResult<String> {
    if let Some(column) = COLUMNS.iter().find(|c| **c == field) {
        return Ok(column.to_string());
    }

    let path = PayloadPath::parse(field)
        .ok_or_else(|| AnalyticsError::configuration(format!("unknown event field \"{field}\"")))?;
    if path.segments().iter().any(|s| s.contains('"')) {
        return Err(AnalyticsError::configuration(format!(
            "invalid payload path \"{field}\""
        )));
    }

    let json_path = path
        .segments()
        .iter()
        .fold(String::from("$"), |acc, s| format!("{acc}.\"{s}\""));
    params.push(SqlValue::Text(json_path));
    Ok(format!("json_extract({}, ?)", path.container_key()))
}

fn json_to_sql(field: &str, value: &Value) -> AnalyticsResult<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => {
            return Err(AnalyticsError::configuration(format!(
                "cannot compare field \"{field}\" with a composite value"
            )))
        }
    })
}

fn sql_to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(b) => Value::String(String::from_utf8_lossy(&b).into_owned()),
    }
}

fn parse_payload(raw: Option<&str>) -> Value {
    match raw {
        None => Value::Null,
        Some(text) => serde_json::from_str(text).unwrap_or_else(|e| {
            tracing::warn!(?e, "Stored payload is not valid JSON, treating as null");
            Value::Null
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{employee_type_filter, time_interval_filter};
    use chrono::TimeZone;
    use serde_json::json;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 3, h, m, 0).unwrap()
    }

    fn event(user: &str, kind: &str, number: i64, time: DateTime<Utc>, payload: Value) -> Event {
        Event {
            user_name: user.to_string(),
            employee_type: if user == "adrian" { "full-time" } else { "contractor" }.to_string(),
            session_id: format!("{user}-s1"),
            event_number: number,
            event_type: kind.to_string(),
            time_stamp: time,
            payload,
        }
    }

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.save_events(&[
            event("adrian", "Create", 1, at(9, 0), json!({"operation": "new menu"})),
            event("adrian", "Create", 2, at(9, 1), json!({"operation": "edit menu"})),
            event("adrian", "GraspGUI Start", 3, at(9, 3), json!({"objectsExplorerSelection": "123"})),
            event("bianca", "Tab", 1, at(10, 0), json!({"tab": "TabA"})),
            event("bianca", "Tab", 2, at(10, 5), json!({"tab": "TabB", "nested": {"x": 1}})),
        ])
        .unwrap();
        db
    }

    #[test]
    fn test_create_database() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.event_count().unwrap(), 0);
    }

    #[test]
    fn test_save_and_query_round_trip() {
        let db = seeded();
        let events = db
            .query_events(&Filter::new(), &[SortKey::asc("time_stamp")])
            .unwrap();

        assert_eq!(events.len(), 5);
        assert_eq!(events[0].time_stamp, at(9, 0));
        assert_eq!(events[0].payload, json!({"operation": "new menu"}));
        assert_eq!(events[4].payload["nested"]["x"], json!(1));
    }

    #[test]
    fn test_sort_descending() {
        let db = seeded();
        let events = db
            .query_events(&Filter::new(), &[SortKey::desc("time_stamp")])
            .unwrap();
        assert_eq!(events[0].time_stamp, at(10, 5));
    }

    #[test]
    fn test_filters() {
        let db = seeded();

        let creates = db
            .query_events(&Filter::new().eq("event_type", "Create"), &[])
            .unwrap();
        assert_eq!(creates.len(), 2);

        let by_payload = db
            .query_events(&Filter::new().eq("payload.tab", "TabB"), &[])
            .unwrap();
        assert_eq!(by_payload.len(), 1);
        assert_eq!(by_payload[0].event_number, 2);

        let nested = db
            .query_events(&Filter::new().eq("payload.nested.x", 1), &[])
            .unwrap();
        assert_eq!(nested.len(), 1);

        let window = time_interval_filter(Some(at(9, 1)), Some(at(10, 0)));
        let windowed = db.query_events(&window, &[]).unwrap();
        // Both bounds are inclusive.
        assert_eq!(windowed.len(), 3);

        let contractors = db
            .query_events(&employee_type_filter(Some("contractor")), &[])
            .unwrap();
        assert!(contractors.iter().all(|e| e.user_name == "bianca"));

        let doc = json!({"payload.tab": {"$exists": true}});
        let with_tab = db
            .query_events(&Filter::from_document(doc.as_object().unwrap()).unwrap(), &[])
            .unwrap();
        assert_eq!(with_tab.len(), 2);

        let sessions = db
            .query_events(
                &Filter::new().one_of("session_id", vec!["adrian-s1".to_string()]),
                &[],
            )
            .unwrap();
        assert_eq!(sessions.len(), 3);

        let none = db
            .query_events(&Filter::new().one_of("session_id", vec![]), &[])
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_unknown_field_is_configuration_error() {
        let db = seeded();
        let err = db
            .query_events(&Filter::new().eq("nonsense", 1), &[])
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::Configuration(_)));
    }

    #[test]
    fn test_count_groups() {
        let db = seeded();
        let groups = db
            .count_groups(
                &Filter::new().eq("event_type", "Create"),
                &["user_name".to_string(), "payload.operation".to_string()],
            )
            .unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, vec![json!("adrian"), json!("edit menu")]);
        assert_eq!(groups[0].count, 1);
    }

    #[tokio::test]
    async fn test_event_source_impl() {
        let db = seeded();
        let source: &dyn EventSource = &db;

        let events = source
            .fetch_ordered(&Filter::new().eq("user_name", "bianca"), &[SortKey::asc("time_stamp")])
            .await
            .unwrap();
        assert_eq!(events.len(), 2);

        let groups = source
            .count_grouped_by(&Filter::new(), &["user_name"])
            .await
            .unwrap();
        assert_eq!(groups[0].key, vec![json!("adrian")]);
        assert_eq!(groups[0].count, 3);

        let inserted = source
            .insert_events(vec![event("carl", "Tab", 1, at(12, 0), Value::Null)])
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(db.event_count().unwrap(), 6);
    }
}
