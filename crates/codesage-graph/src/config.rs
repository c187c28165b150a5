//! Backend and updater configuration.
//!
//! Every struct deserializes with defaults for missing fields, so a caller
//! can load a partial JSON/TOML document and override only what it needs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Settings for the embedded SQLite backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationalConfig {
    /// Database file, or `:memory:` for a private in-memory database
    pub database: String,

    /// How long a statement waits on a locked database
    #[serde(with = "duration_secs")]
    pub busy_timeout: Duration,

    /// Log every statement at debug level
    pub echo: bool,

    /// Chunk size for bulk saves
    pub batch_size: usize,
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            database: "codesage_graph.db".to_string(),
            busy_timeout: Duration::from_secs(30),
            echo: false,
            batch_size: 1000,
        }
    }
}

impl RelationalConfig {
    /// Config for a private in-memory database.
    pub fn in_memory() -> Self {
        Self {
            database: ":memory:".to_string(),
            ..Default::default()
        }
    }

    /// Set the database path.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the busy timeout.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Enable or disable statement logging.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Set the bulk-save chunk size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Settings for the key-value backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyValueConfig {
    /// RocksDB directory; unused by the in-memory store
    pub path: PathBuf,

    /// Prefix for every key the adapter writes
    pub key_prefix: String,

    /// Expiry applied to written keys when a save does not set one
    #[serde(with = "duration_option")]
    pub default_ttl: Option<Duration>,

    /// Also remove edges pointing at a deleted node
    pub cascade_incoming: bool,

    /// Chunk size for bulk saves
    pub batch_size: usize,
}

impl Default for KeyValueConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("codesage_graph_kv"),
            key_prefix: "codesage:graph".to_string(),
            default_ttl: Some(Duration::from_secs(3600)),
            cascade_incoming: false,
            batch_size: 1000,
        }
    }
}

impl KeyValueConfig {
    /// Set the database directory.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the default expiry (`None` keeps keys forever).
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Remove incoming edges on node deletion.
    pub fn with_cascade_incoming(mut self, cascade: bool) -> Self {
        self.cascade_incoming = cascade;
        self
    }

    /// Set the bulk-save chunk size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Settings for the incremental updater.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    /// File extensions to watch, with the leading dot, lowercase
    pub watched_extensions: Vec<String>,

    /// Path components that exclude a file (hidden components always do)
    pub ignored_dirs: Vec<String>,

    /// Quiet period before a change is processed
    #[serde(with = "duration_secs")]
    pub debounce_interval: Duration,

    /// Capacity of the change queue
    pub max_queue_size: usize,

    /// How long the consumer blocks on an empty queue before re-checking
    /// the stop flag
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,

    /// Pause after requeueing a change that is still inside its window
    #[serde(with = "duration_secs")]
    pub requeue_delay: Duration,

    /// Upper bound on joining the consumer thread in `stop()`
    #[serde(with = "duration_secs")]
    pub stop_timeout: Duration,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            watched_extensions: [
                ".py", ".go", ".java", ".js", ".ts", ".jsx", ".tsx", ".c", ".cpp", ".h", ".hpp",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            ignored_dirs: ["node_modules", "__pycache__", ".git", "build", "dist", "target"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            debounce_interval: Duration::from_secs(1),
            max_queue_size: 1000,
            poll_interval: Duration::from_secs(1),
            requeue_delay: Duration::from_millis(100),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

impl UpdaterConfig {
    /// Replace the extension allow-list.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.watched_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Set the debounce window.
    pub fn with_debounce(mut self, interval: Duration) -> Self {
        self.debounce_interval = interval;
        self
    }

    /// Set the change queue capacity.
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size.max(1);
        self
    }

    /// Set the consumer poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the requeue pause.
    pub fn with_requeue_delay(mut self, delay: Duration) -> Self {
        self.requeue_delay = delay;
        self
    }

    /// Set the stop timeout.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}

// Durations travel as fractional seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod duration_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => d.as_secs_f64().serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs: Option<f64> = Option::deserialize(deserializer)?;
        secs.map(|s| Duration::try_from_secs_f64(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let kv = KeyValueConfig::default();
        assert_eq!(kv.key_prefix, "codesage:graph");
        assert_eq!(kv.default_ttl, Some(Duration::from_secs(3600)));
        assert!(!kv.cascade_incoming);

        let updater = UpdaterConfig::default();
        assert_eq!(updater.max_queue_size, 1000);
        assert!(updater.watched_extensions.contains(&".py".to_string()));
        assert!(updater.ignored_dirs.contains(&"node_modules".to_string()));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: UpdaterConfig =
            serde_json::from_str(r#"{"debounce_interval": 0.25, "max_queue_size": 8}"#).unwrap();
        assert_eq!(config.debounce_interval, Duration::from_millis(250));
        assert_eq!(config.max_queue_size, 8);
        assert_eq!(config.stop_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_ttl_null_means_no_expiry() {
        let config: KeyValueConfig = serde_json::from_str(r#"{"default_ttl": null}"#).unwrap();
        assert_eq!(config.default_ttl, None);

        let json = serde_json::to_string(&KeyValueConfig::default()).unwrap();
        assert!(json.contains("\"default_ttl\":3600.0"));
    }

    #[test]
    fn test_negative_duration_rejected() {
        let result: Result<RelationalConfig, _> = serde_json::from_str(r#"{"busy_timeout": -1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_builders() {
        let config = RelationalConfig::in_memory().with_echo(true).with_batch_size(0);
        assert_eq!(config.database, ":memory:");
        assert!(config.echo);
        assert_eq!(config.batch_size, 1);
    }
}
