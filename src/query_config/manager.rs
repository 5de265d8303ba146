//! Editing of the configuration files.
//!
//! Entries are generated from a per-file schema so the files stay uniform.
//! Titles are unique per file; a clashing title gets `_1`, `_2`, ... appended.

use super::{ConfigKind, ConfigStore, QueryConfig};
use crate::analytics::PayloadPath;
use crate::error::{AnalyticsError, AnalyticsResult};
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Input for creating or replacing an entry.
#[derive(Debug, Clone, Deserialize)]
pub struct EntrySpec {
    pub title: String,
    pub event_type: String,
    pub payload_path: String,
}

impl EntrySpec {
    fn validate(&self) -> AnalyticsResult<()> {
        if self.title.trim().is_empty() {
            return Err(AnalyticsError::MissingParameter("title"));
        }
        if self.event_type.is_empty() {
            return Err(AnalyticsError::MissingParameter("event_type"));
        }
        if PayloadPath::parse(&self.payload_path).is_none() {
            return Err(AnalyticsError::configuration(format!(
                "payload path \"{}\" must look like payload.<key>",
                self.payload_path
            )));
        }
        Ok(())
    }
}

/// Builds the stored entry for `spec` following the file's schema.
pub fn build_entry(kind: ConfigKind, spec: &EntrySpec) -> Value {
    let mut fields = Map::new();
    fields.insert("_id".to_string(), json!(0));
    for field in kind.base_fields() {
        fields.insert(field.to_string(), json!(1));
    }
    fields.insert(spec.payload_path.clone(), json!(1));

    json!({
        "query": { "event_type": spec.event_type },
        "fields": fields,
    })
}

impl QueryConfig {
    /// Inserts `entry` under `title`, or under the first free `title_N`.
    /// Returns the key used.
    pub fn insert_unique(&mut self, title: &str, entry: Value) -> String {
        let mut key = title.to_string();
        let mut counter = 1;
        while self.contains(&key) {
            key = format!("{title}_{counter}");
            counter += 1;
        }
        self.entries_mut().insert(key.clone(), entry);
        key
    }

    /// Removes `key`, failing with `NotFound` when absent.
    pub fn remove(&mut self, key: &str) -> AnalyticsResult<Value> {
        self.entries_mut()
            .shift_remove(key)
            .ok_or_else(|| AnalyticsError::NotFound(format!("key \"{key}\" not found")))
    }
}

impl ConfigStore {
    /// Adds a new entry, returning its key.
    pub async fn append(&self, kind: ConfigKind, spec: &EntrySpec) -> AnalyticsResult<String> {
        spec.validate()?;
        let _guard = self.write_lock.lock().await;

        let mut config = self.load(kind).await?;
        let key = config.insert_unique(&spec.title, build_entry(kind, spec));
        self.save(kind, &config).await?;

        tracing::info!(file = %kind, key = %key, "Configuration entry added");
        Ok(key)
    }

    /// Replaces `key` with a fresh entry built from `spec`, returning the
    /// new key.
    pub async fn update(
        &self,
        kind: ConfigKind,
        key: &str,
        spec: &EntrySpec,
    ) -> AnalyticsResult<String> {
        spec.validate()?;
        let _guard = self.write_lock.lock().await;

        let mut config = self.load(kind).await?;
        config.remove(key)?;
        let new_key = config.insert_unique(&spec.title, build_entry(kind, spec));
        self.save(kind, &config).await?;

        tracing::info!(file = %kind, old = %key, new = %new_key, "Configuration entry updated");
        Ok(new_key)
    }

    /// Deletes `key`.
    pub async fn delete(&self, kind: ConfigKind, key: &str) -> AnalyticsResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut config = self.load(kind).await?;
        config.remove(key)?;
        self.save(kind, &config).await?;

        tracing::info!(file = %kind, key = %key, "Configuration entry deleted");
        Ok(())
    }

    async fn save(&self, kind: ConfigKind, config: &QueryConfig) -> AnalyticsResult<()> {
        tokio::fs::create_dir_all(self.dir()).await?;
        tokio::fs::write(self.path_for(kind), config.to_json_pretty()?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(title: &str, event_type: &str, path: &str) -> EntrySpec {
        EntrySpec {
            title: title.to_string(),
            event_type: event_type.to_string(),
            payload_path: path.to_string(),
        }
    }

    #[test]
    fn test_build_entry_follows_schema() {
        let entry = build_entry(ConfigKind::Sessions, &spec("Tabs", "Tabpage", "payload.tab"));
        let fields: Vec<&String> = entry["fields"].as_object().unwrap().keys().collect();

        assert_eq!(entry["query"]["event_type"], "Tabpage");
        assert_eq!(
            fields,
            vec!["_id", "time_stamp", "user_name", "event_number", "session_id", "payload.tab"]
        );
        assert_eq!(entry["fields"]["_id"], 0);
    }

    #[tokio::test]
    async fn test_append_deduplicates_titles() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        let create = spec("Create", "Create", "payload.operation");

        assert_eq!(store.append(ConfigKind::Queries, &create).await.unwrap(), "Create");
        assert_eq!(store.append(ConfigKind::Queries, &create).await.unwrap(), "Create_1");
        assert_eq!(store.append(ConfigKind::Queries, &create).await.unwrap(), "Create_2");

        let config = store.load(ConfigKind::Queries).await.unwrap();
        assert_eq!(config.keys(), vec!["Create", "Create_1", "Create_2"]);

        let resolved = config.resolve("Create_1").unwrap();
        assert_eq!(resolved.payload.leaf_key(), "operation");
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        store
            .append(ConfigKind::Sessions, &spec("Tabs", "Tabpage", "payload.tab"))
            .await
            .unwrap();

        let key = store
            .update(
                ConfigKind::Sessions,
                "Tabs",
                &spec("Windows", "Window", "payload.window"),
            )
            .await
            .unwrap();
        assert_eq!(key, "Windows");

        let config = store.load(ConfigKind::Sessions).await.unwrap();
        assert_eq!(config.keys(), vec!["Windows"]);

        store.delete(ConfigKind::Sessions, "Windows").await.unwrap();
        assert!(store.load(ConfigKind::Sessions).await.unwrap().keys().is_empty());

        let err = store.delete(ConfigKind::Sessions, "Windows").await.unwrap_err();
        assert!(matches!(err, AnalyticsError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_invalid_payload_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());

        let err = store
            .append(ConfigKind::Queries, &spec("Create", "Create", "operation"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::Configuration(_)));
    }
}
