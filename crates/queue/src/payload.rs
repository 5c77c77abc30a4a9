//! Serialized job payloads.
//!
//! A payload is a JSON object. The queue owns a handful of keys (`uuid`,
//! `displayName`, `job`, `data`); payload hooks may add more at enqueue time
//! and listeners read them back before execution.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::JobId;

pub const UUID_KEY: &str = "uuid";
pub const DISPLAY_NAME_KEY: &str = "displayName";
pub const JOB_KEY: &str = "job";
pub const DATA_KEY: &str = "data";
pub const COMMAND_NAME_KEY: &str = "commandName";
pub const COMMAND_KEY: &str = "command";

/// A job payload (string keys → JSON values).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobPayload(Map<String, Value>);

impl JobPayload {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build the queue-owned part of a payload for a serialized command.
    pub fn for_command(id: JobId, type_name: &str, display_name: &str, command: Value) -> Self {
        let mut data = Map::new();
        data.insert(COMMAND_NAME_KEY.into(), Value::String(type_name.into()));
        data.insert(COMMAND_KEY.into(), command);

        let mut payload = Map::new();
        payload.insert(UUID_KEY.into(), Value::String(id.to_string()));
        payload.insert(DISPLAY_NAME_KEY.into(), Value::String(display_name.into()));
        payload.insert(JOB_KEY.into(), Value::String(type_name.into()));
        payload.insert(DATA_KEY.into(), Value::Object(data));
        Self(payload)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether `key` exists, even if it holds `null`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Merge extra fields. Extra fields win over existing keys.
    pub fn merge(&mut self, extra: Map<String, Value>) {
        for (key, value) in extra {
            self.0.insert(key, value);
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        self.0.get(DISPLAY_NAME_KEY).and_then(Value::as_str)
    }

    /// Registry name of the serialized command.
    pub fn job_type(&self) -> Option<&str> {
        self.0.get(JOB_KEY).and_then(Value::as_str)
    }

    /// The serialized command body under `data.command`.
    pub fn command(&self) -> Option<&Value> {
        self.0
            .get(DATA_KEY)
            .and_then(Value::as_object)
            .and_then(|data| data.get(COMMAND_KEY))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
