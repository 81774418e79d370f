//! Task record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{StorageError, StorageResult};

/// An application-defined task record.
///
/// The only field the queue cares about is the identifier, whose name is
/// configurable. Everything else is opaque. Queue membership is never stored
/// on the task itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Task(Map<String, Value>);

impl Task {
    /// Create an empty task.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a task from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> StorageResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StorageError::NotARecord(other.to_string())),
        }
    }

    /// Set a field.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Read a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Write a field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Remove a field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// The identifier stored under `id_field` as a ref.
    ///
    /// Strings are used as they are and other values by their JSON text, so
    /// `42` becomes `"42"`. A missing field, `null` or `""` means no id.
    pub fn id(&self, id_field: &str) -> Option<String> {
        match self.0.get(id_field)? {
            Value::Null => None,
            Value::String(id) if id.is_empty() => None,
            Value::String(id) => Some(id.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Store `id` under `id_field`.
    pub fn set_id(&mut self, id_field: &str, id: impl Into<String>) {
        self.0.insert(id_field.to_string(), Value::String(id.into()));
    }

    /// All fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the task has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert into a JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Task {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Task {
    type Error = StorageError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_builder() {
        let task = Task::new().with("kind", "email").with("attempt", 1);
        assert_eq!(task.get("kind"), Some(&json!("email")));
        assert_eq!(task.len(), 2);
    }

    #[test]
    fn test_id_field() {
        let mut task = Task::new();
        assert_eq!(task.id("id"), None);

        task.set_id("id", "abc");
        assert_eq!(task.id("id").as_deref(), Some("abc"));
        assert_eq!(task.id("uid"), None);
    }

    #[test]
    fn test_empty_or_null_id_is_absent() {
        let task = Task::new().with("id", "");
        assert_eq!(task.id("id"), None);

        let task = Task::new().with("id", Value::Null);
        assert_eq!(task.id("id"), None);
    }

    #[test]
    fn test_number_id_used_as_decimal_text() {
        let task = Task::new().with("id", 42);
        assert_eq!(task.id("id").as_deref(), Some("42"));

        let task = Task::new().with("id", -7);
        assert_eq!(task.id("id").as_deref(), Some("-7"));
    }

    #[test]
    fn test_from_value_requires_object() {
        assert!(Task::from_value(json!({"a": 1})).is_ok());
        assert!(matches!(
            Task::from_value(json!("plain")),
            Err(StorageError::NotARecord(_))
        ));
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let task = Task::new().with("id", "x").with("n", 1);
        let text = serde_json::to_string(&task).unwrap();
        assert_eq!(text, r#"{"id":"x","n":1}"#);
    }
}
