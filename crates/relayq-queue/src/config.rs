//! Queue configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{QueueError, QueueResult};

/// What happens to a task when it finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishMode {
    /// No `done` queue; finished tasks are deleted from storage.
    #[default]
    #[serde(rename = "clean")]
    Clean,
    /// No `done` queue; finished tasks stay in storage.
    #[serde(rename = "clean+keep-storage", alias = "keep-storage")]
    CleanKeepStorage,
    /// Finished refs move into `done` and tasks stay in storage.
    #[serde(rename = "dirty")]
    Dirty,
}

impl FinishMode {
    /// Whether this mode keeps a `done` queue.
    pub fn has_done_queue(&self) -> bool {
        matches!(self, Self::Dirty)
    }

    /// Whether finished tasks are deleted from storage.
    pub fn deletes_storage(&self) -> bool {
        matches!(self, Self::Clean)
    }
}

/// Settings for one of the timed promotion sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Whether the feature is available.
    #[serde(default)]
    pub enabled: bool,

    /// Milliseconds between sweeps.
    #[serde(default = "default_polling_interval")]
    pub polling_interval_ms: u64,

    /// Set key. Defaults to `{prefix}{delimiter}deferred` or `...recurring`.
    #[serde(default)]
    pub key: Option<String>,
}

impl SweepConfig {
    /// An enabled sweep with the default interval.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    /// Sweep interval.
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            polling_interval_ms: default_polling_interval(),
            key: None,
        }
    }
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Maximum deliveries in flight at once.
    #[serde(default = "default_max_out")]
    pub max_out: usize,

    /// How long one blocking claim waits before checking for shutdown.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,
}

impl ListenerConfig {
    /// Blocking claim window.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            max_out: default_max_out(),
            poll_timeout_ms: default_poll_timeout(),
        }
    }
}

/// Queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Namespace of every key.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Key separator.
    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    /// Name of the identifier field in task records.
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Finish mode.
    #[serde(default)]
    pub finish_mode: FinishMode,

    /// Deferred task list.
    #[serde(default)]
    pub deferred: SweepConfig,

    /// Recurring task list.
    #[serde(default)]
    pub recurring: SweepConfig,

    /// Listener.
    #[serde(default)]
    pub listener: ListenerConfig,
}

fn default_prefix() -> String {
    "relayq".to_string()
}

fn default_delimiter() -> String {
    ":".to_string()
}

fn default_id_field() -> String {
    "id".to_string()
}

fn default_polling_interval() -> u64 {
    1000
}

fn default_max_out() -> usize {
    10
}

fn default_poll_timeout() -> u64 {
    1000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            delimiter: default_delimiter(),
            id_field: default_id_field(),
            finish_mode: FinishMode::default(),
            deferred: SweepConfig::default(),
            recurring: SweepConfig::default(),
            listener: ListenerConfig::default(),
        }
    }
}

impl QueueConfig {
    /// Config for `prefix` with every other setting defaulted.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// Key of a named queue.
    pub fn queue_key(&self, name: QueueName) -> String {
        self.namespaced(name.as_str())
    }

    /// Key of the deferred set.
    pub fn deferred_key(&self) -> String {
        self.deferred
            .key
            .clone()
            .unwrap_or_else(|| self.namespaced("deferred"))
    }

    /// Key of the recurring set.
    pub fn recurring_key(&self) -> String {
        self.recurring
            .key
            .clone()
            .unwrap_or_else(|| self.namespaced("recurring"))
    }

    /// Key of the interval map kept beside the recurring set.
    pub fn recurring_intervals_key(&self) -> String {
        format!("{}{}intervals", self.recurring_key(), self.delimiter)
    }

    /// Default prefix for keyed task storage.
    pub fn storage_prefix(&self) -> String {
        self.namespaced("jobs")
    }

    fn namespaced(&self, name: &str) -> String {
        format!("{}{}{}", self.prefix, self.delimiter, name)
    }

    /// Every value the coordinator cannot run with, as `(field, message)`
    /// pairs in field order. Fields are dotted paths relative to the queue
    /// section, such as `listener.max_out`.
    pub fn problems(&self) -> Vec<(&'static str, String)> {
        let mut problems = Vec::new();
        for (field, value) in [
            ("prefix", &self.prefix),
            ("delimiter", &self.delimiter),
            ("id_field", &self.id_field),
        ] {
            if value.is_empty() {
                problems.push((field, format!("{} must not be empty", field)));
            }
        }
        for (field, sweep) in [
            ("deferred.polling_interval_ms", &self.deferred),
            ("recurring.polling_interval_ms", &self.recurring),
        ] {
            if sweep.enabled && sweep.polling_interval_ms == 0 {
                problems.push((field, format!("{} must be greater than 0", field)));
            }
        }
        if self.listener.max_out == 0 {
            problems.push((
                "listener.max_out",
                "listener.max_out must be greater than 0".to_string(),
            ));
        }
        problems
    }

    /// Check the configuration for values the coordinator cannot run with.
    /// Reports the first of [`problems`](Self::problems).
    pub fn validate(&self) -> QueueResult<()> {
        match self.problems().into_iter().next() {
            Some((_, message)) => Err(QueueError::Config(message)),
            None => Ok(()),
        }
    }
}

/// One of the four coordinator queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    Todo,
    Doing,
    Failed,
    Done,
}

impl QueueName {
    /// All queues, in lifecycle order.
    pub const ALL: [QueueName; 4] = [Self::Todo, Self::Doing, Self::Failed, Self::Done];

    /// Key suffix.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Doing => "doing",
            Self::Failed => "failed",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "doing" => Ok(Self::Doing),
            "failed" => Ok(Self::Failed),
            "done" => Ok(Self::Done),
            other => Err(QueueError::Config(format!("unknown queue: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.prefix, "relayq");
        assert_eq!(config.delimiter, ":");
        assert_eq!(config.id_field, "id");
        assert_eq!(config.finish_mode, FinishMode::Clean);
        assert!(!config.deferred.enabled);
        assert_eq!(config.recurring.polling_interval_ms, 1000);
        assert_eq!(config.listener.max_out, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_keys() {
        let config = QueueConfig {
            delimiter: "|".to_string(),
            ..QueueConfig::with_prefix("mail")
        };
        assert_eq!(config.queue_key(QueueName::Todo), "mail|todo");
        assert_eq!(config.queue_key(QueueName::Done), "mail|done");
        assert_eq!(config.deferred_key(), "mail|deferred");
        assert_eq!(config.recurring_key(), "mail|recurring");
        assert_eq!(config.recurring_intervals_key(), "mail|recurring|intervals");
        assert_eq!(config.storage_prefix(), "mail|jobs");
    }

    #[test]
    fn test_explicit_set_keys() {
        let mut config = QueueConfig::default();
        config.deferred.key = Some("later".to_string());
        config.recurring.key = Some("every".to_string());
        assert_eq!(config.deferred_key(), "later");
        assert_eq!(config.recurring_intervals_key(), "every:intervals");
    }

    #[test]
    fn test_finish_mode_serde() {
        let mode: FinishMode = serde_json::from_str(r#""clean+keep-storage""#).unwrap();
        assert_eq!(mode, FinishMode::CleanKeepStorage);
        let mode: FinishMode = serde_json::from_str(r#""dirty""#).unwrap();
        assert!(mode.has_done_queue());
        assert!(!FinishMode::CleanKeepStorage.deletes_storage());
        assert!(FinishMode::Clean.deletes_storage());
    }

    #[test]
    fn test_partial_deserialize() {
        let config: QueueConfig =
            serde_json::from_str(r#"{"prefix": "jobs", "deferred": {"enabled": true}}"#).unwrap();
        assert_eq!(config.prefix, "jobs");
        assert!(config.deferred.enabled);
        assert_eq!(config.deferred.polling_interval_ms, 1000);
        assert!(!config.recurring.enabled);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = QueueConfig::default();
        config.listener.max_out = 0;
        assert!(matches!(config.validate(), Err(QueueError::Config(_))));

        let mut config = QueueConfig::default();
        config.deferred = SweepConfig {
            polling_interval_ms: 0,
            ..SweepConfig::enabled()
        };
        assert!(config.validate().is_err());

        let config = QueueConfig::with_prefix("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_problems_lists_every_field() {
        let mut config = QueueConfig::with_prefix("");
        config.id_field = String::new();
        config.recurring = SweepConfig {
            polling_interval_ms: 0,
            ..SweepConfig::enabled()
        };
        config.listener.max_out = 0;

        let fields: Vec<_> = config.problems().into_iter().map(|(f, _)| f).collect();
        assert_eq!(
            fields,
            vec!["prefix", "id_field", "recurring.polling_interval_ms", "listener.max_out"]
        );
        match config.validate() {
            Err(QueueError::Config(message)) => assert_eq!(message, "prefix must not be empty"),
            other => panic!("expected config error, got {:?}", other),
        }
        assert!(QueueConfig::default().problems().is_empty());
    }

    #[test]
    fn test_queue_name_parse() {
        assert_eq!("failed".parse::<QueueName>().unwrap(), QueueName::Failed);
        assert!("archive".parse::<QueueName>().is_err());
        assert_eq!(QueueName::Doing.to_string(), "doing");
    }
}
