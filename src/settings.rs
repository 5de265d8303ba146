//! Process settings, read from the environment at startup.

use crate::analytics::PayloadPath;
use crate::error::{AnalyticsError, AnalyticsResult};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Event type and payload field for one pooled-count view.
#[derive(Debug, Clone, PartialEq)]
pub struct PooledField {
    pub event_type: String,
    pub field: PayloadPath,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub host: IpAddr,
    pub port: u16,
    /// SQLite event store.
    pub db_path: PathBuf,
    /// Directory holding `queries.json` and `sessions.json`.
    pub config_dir: PathBuf,
    /// Operation clicks (`/api/clicks`).
    pub clicks: PooledField,
    /// Object selections (`/api/selections`).
    pub selections: PooledField,
}

impl Settings {
    /// Reads settings from process environment variables.
    pub fn from_env() -> AnalyticsResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AnalyticsResult<Self> {
        let host = match lookup("USAGELENS_HOST") {
            Some(raw) => raw.parse().map_err(|_| {
                AnalyticsError::configuration(format!("USAGELENS_HOST is not an IP address: {raw}"))
            })?,
            None => IpAddr::V4(Ipv4Addr::LOCALHOST),
        };

        let port = match lookup("PORT") {
            Some(raw) => raw.parse().map_err(|_| {
                AnalyticsError::configuration(format!("PORT is not a valid port: {raw}"))
            })?,
            None => DEFAULT_PORT,
        };

        let db_path = lookup("USAGELENS_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);

        let config_dir = lookup("USAGELENS_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config"));

        let clicks = pooled_field(
            &lookup,
            ("USAGELENS_CLICK_EVENT_TYPE", "Create"),
            ("USAGELENS_CLICK_FIELD", "payload.operation"),
        )?;
        let selections = pooled_field(
            &lookup,
            ("USAGELENS_SELECTION_EVENT_TYPE", "GraspGUI Start"),
            ("USAGELENS_SELECTION_FIELD", "payload.objectsExplorerSelection"),
        )?;

        Ok(Self {
            host,
            port,
            db_path,
            config_dir,
            clicks,
            selections,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn pooled_field(
    lookup: &impl Fn(&str) -> Option<String>,
    (type_var, type_default): (&str, &str),
    (field_var, field_default): (&str, &str),
) -> AnalyticsResult<PooledField> {
    let event_type = lookup(type_var).unwrap_or_else(|| type_default.to_string());
    let raw_field = lookup(field_var).unwrap_or_else(|| field_default.to_string());
    let field = PayloadPath::parse(&raw_field).ok_or_else(|| {
        AnalyticsError::configuration(format!("{field_var} must look like payload.<key>: {raw_field}"))
    })?;
    Ok(PooledField { event_type, field })
}

/// Returns the default database path.
fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("usagelens")
        .join("events.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_with(vars: &[(&str, &str)]) -> AnalyticsResult<Settings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = settings_with(&[]).unwrap();

        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.bind_addr().to_string(), "127.0.0.1:3000");
        assert_eq!(settings.config_dir, PathBuf::from("config"));
        assert!(settings.db_path.ends_with("usagelens/events.db"));
        assert_eq!(settings.clicks.event_type, "Create");
        assert_eq!(settings.selections.field.leaf_key(), "objectsExplorerSelection");
    }

    #[test]
    fn test_overrides() {
        let settings = settings_with(&[
            ("USAGELENS_HOST", "0.0.0.0"),
            ("PORT", "8080"),
            ("USAGELENS_DB_PATH", "/tmp/events.db"),
            ("USAGELENS_CLICK_FIELD", "payload.classname"),
        ])
        .unwrap();

        assert_eq!(settings.bind_addr().to_string(), "0.0.0.0:8080");
        assert_eq!(settings.db_path, PathBuf::from("/tmp/events.db"));
        assert_eq!(settings.clicks.field.field(), "payload.classname");
    }

    #[test]
    fn test_invalid_values() {
        assert!(settings_with(&[("PORT", "many")]).is_err());
        assert!(settings_with(&[("USAGELENS_HOST", "localhost")]).is_err());
        assert!(settings_with(&[("USAGELENS_SELECTION_FIELD", "selection")]).is_err());
    }
}
