//! Query configuration.
//!
//! Maps symbolic event-type names to a stored query filter and the payload
//! field that carries the activity label. Two JSON files exist: one for the
//! event pool views and one for the session views. Each entry looks like:
//!
//! ```json
//! "TabpageSessions": {
//!   "query": { "event_type": "Tabpage" },
//!   "fields": { "_id": 0, "time_stamp": 1, "payload.tab": 1 }
//! }
//! ```
//!
//! Files are read on every request so edits apply without a restart.

pub mod manager;

use crate::analytics::PayloadPath;
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::source::Filter;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which configuration file an entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigKind {
    /// Event pool and pooled-count views.
    Queries,
    /// Session breakdown views.
    Sessions,
}

impl ConfigKind {
    pub fn file_name(self) -> &'static str {
        match self {
            ConfigKind::Queries => "queries.json",
            ConfigKind::Sessions => "sessions.json",
        }
    }

    /// Projection fields every generated entry declares before its payload field.
    pub fn base_fields(self) -> &'static [&'static str] {
        match self {
            ConfigKind::Queries => &["event_type", "time_stamp", "user_name", "employee_type"],
            ConfigKind::Sessions => &["time_stamp", "user_name", "event_number", "session_id"],
        }
    }
}

impl FromStr for ConfigKind {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queries" => Ok(ConfigKind::Queries),
            "sessions" => Ok(ConfigKind::Sessions),
            other => Err(AnalyticsError::configuration(format!(
                "unknown configuration file \"{other}\""
            ))),
        }
    }
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigKind::Queries => write!(f, "queries"),
            ConfigKind::Sessions => write!(f, "sessions"),
        }
    }
}

/// One configured event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEntry {
    #[serde(default)]
    pub query: Map<String, Value>,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// A resolved event-type key: what to fetch and where its label lives.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuery {
    pub key: String,
    pub filter: Filter,
    pub payload: PayloadPath,
}

/// The parsed contents of one configuration file, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryConfig {
    entries: Map<String, Value>,
}

impl QueryConfig {
    /// Parses a configuration file. Blank text is an empty configuration.
    pub fn from_json(text: &str) -> AnalyticsResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let entries: Map<String, Value> = serde_json::from_str(text)?;
        Ok(Self { entries })
    }

    pub fn to_json_pretty(&self) -> AnalyticsResult<String> {
        Ok(serde_json::to_string_pretty(&self.entries)?)
    }

    /// Entry names in declaration order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn entry(&self, key: &str) -> AnalyticsResult<QueryEntry> {
        let value = self.entries.get(key).ok_or_else(|| {
            AnalyticsError::configuration(format!("event type \"{key}\" not found in config"))
        })?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Resolves `key` into a filter and payload path.
    ///
    /// Only the first declared `payload.` field is used.
    pub fn resolve(&self, key: &str) -> AnalyticsResult<ResolvedQuery> {
        let entry = self.entry(key)?;

        let field = entry
            .fields
            .keys()
            .find(|f| f.starts_with("payload."))
            .ok_or_else(|| {
                AnalyticsError::configuration(format!(
                    "no payload fields configured for event type \"{key}\""
                ))
            })?;
        let payload = PayloadPath::parse(field).ok_or_else(|| {
            AnalyticsError::configuration(format!("invalid payload field \"{field}\""))
        })?;

        Ok(ResolvedQuery {
            key: key.to_string(),
            filter: Filter::from_document(&entry.query)?,
            payload,
        })
    }

    pub(crate) fn entries_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.entries
    }
}

/// Reads configuration files from a directory.
#[derive(Debug)]
pub struct ConfigStore {
    dir: PathBuf,
    /// Serializes read-modify-write cycles of the manager.
    write_lock: tokio::sync::Mutex<()>,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, kind: ConfigKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// Loads one configuration file. A missing file is an empty configuration.
    pub async fn load(&self, kind: ConfigKind) -> AnalyticsResult<QueryConfig> {
        let path = self.path_for(kind);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => QueryConfig::from_json(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = ?path, "Configuration file missing, treating as empty");
                Ok(QueryConfig::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Loads `kind` and resolves `key` in it.
    pub async fn resolve(&self, kind: ConfigKind, key: &str) -> AnalyticsResult<ResolvedQuery> {
        self.load(kind).await?.resolve(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Condition;

    const SESSIONS: &str = r#"{
        "TabpageSessions": {
            "query": { "event_type": "Tabpage" },
            "fields": { "_id": 0, "time_stamp": 1, "payload.tab": 1, "payload.window": 1 }
        },
        "Bare": {
            "query": {},
            "fields": { "time_stamp": 1 }
        }
    }"#;

    #[test]
    fn test_resolve_uses_first_payload_field() {
        let config = QueryConfig::from_json(SESSIONS).unwrap();
        let resolved = config.resolve("TabpageSessions").unwrap();

        assert_eq!(resolved.payload.field(), "payload.tab");
        assert_eq!(resolved.payload.container_key(), "payload");
        assert_eq!(resolved.payload.leaf_key(), "tab");
        assert_eq!(
            resolved.filter.conditions(),
            &[Condition::Equals {
                field: "event_type".into(),
                value: Value::from("Tabpage"),
            }]
        );
    }

    #[test]
    fn test_resolve_errors() {
        let config = QueryConfig::from_json(SESSIONS).unwrap();

        let missing = config.resolve("Nope").unwrap_err();
        assert!(matches!(missing, AnalyticsError::Configuration(_)));

        let no_payload = config.resolve("Bare").unwrap_err();
        assert!(no_payload.to_string().contains("no payload fields"));
    }

    #[test]
    fn test_keys_keep_declaration_order() {
        let config = QueryConfig::from_json(SESSIONS).unwrap();
        assert_eq!(config.keys(), vec!["TabpageSessions", "Bare"]);
        assert!(QueryConfig::from_json("  \n").unwrap().keys().is_empty());
    }

    #[test]
    fn test_config_kind_parse() {
        assert_eq!("queries".parse::<ConfigKind>().unwrap(), ConfigKind::Queries);
        assert_eq!("sessions".parse::<ConfigKind>().unwrap(), ConfigKind::Sessions);
        assert!("other".parse::<ConfigKind>().is_err());
    }

    #[tokio::test]
    async fn test_store_loads_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sessions.json"), SESSIONS).unwrap();
        let store = ConfigStore::new(dir.path());

        let resolved = store
            .resolve(ConfigKind::Sessions, "TabpageSessions")
            .await
            .unwrap();
        assert_eq!(resolved.key, "TabpageSessions");

        // queries.json does not exist yet.
        let queries = store.load(ConfigKind::Queries).await.unwrap();
        assert!(queries.keys().is_empty());
    }
}
