//! Job abstraction and the type registry used to decode payloads.

use std::collections::HashMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use tenantry_core::TenantAwareness;

use crate::error::QueueError;
use crate::payload::JobPayload;

/// A unit of deferred work.
///
/// Implement this for serializable job types. `NAME` is the stable,
/// fully-qualified type name written to payloads and matched against the
/// tenancy configuration lists.
///
/// Envelope types (a thin wrapper around the real work) expose their inner
/// job through [`Job::member`].
pub trait Job: Serialize + DeserializeOwned + Send + Sync + 'static {
    const NAME: &'static str;

    fn display_name(&self) -> String {
        Self::NAME.to_string()
    }

    /// Explicit tenant-awareness marker; `Unmarked` defers to configuration.
    fn tenant_awareness(&self) -> TenantAwareness {
        TenantAwareness::Unmarked
    }

    /// Named member of an envelope (accessor or field). `None` by default.
    fn member(&self, _name: &str) -> Option<&dyn Queueable> {
        None
    }

    fn handle(&self) -> anyhow::Result<()>;
}

/// Object-safe view of a [`Job`], as seen by the queue and its hooks.
pub trait Queueable: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn display_name(&self) -> String;

    fn tenant_awareness(&self) -> TenantAwareness;

    fn member(&self, name: &str) -> Option<&dyn Queueable>;

    fn serialize_command(&self) -> Result<Value, serde_json::Error>;

    fn handle(&self) -> anyhow::Result<()>;
}

impl<J: Job> Queueable for J {
    fn type_name(&self) -> &'static str {
        J::NAME
    }

    fn display_name(&self) -> String {
        Job::display_name(self)
    }

    fn tenant_awareness(&self) -> TenantAwareness {
        Job::tenant_awareness(self)
    }

    fn member(&self, name: &str) -> Option<&dyn Queueable> {
        Job::member(self, name)
    }

    fn serialize_command(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn handle(&self) -> anyhow::Result<()> {
        Job::handle(self)
    }
}

type Decoder = fn(Value) -> Result<Box<dyn Queueable>, serde_json::Error>;

fn decode_as<J: Job>(value: Value) -> Result<Box<dyn Queueable>, serde_json::Error> {
    Ok(Box::new(serde_json::from_value::<J>(value)?))
}

/// Maps payload type names back to concrete job types.
#[derive(Default)]
pub struct JobRegistry {
    decoders: HashMap<&'static str, Decoder>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<J: Job>(&mut self) {
        self.decoders.insert(J::NAME, decode_as::<J>);
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }

    /// Rebuild the command stored in `payload`.
    pub fn decode(&self, payload: &JobPayload) -> Result<Box<dyn Queueable>, QueueError> {
        let type_name = payload
            .job_type()
            .ok_or(QueueError::MalformedPayload("job"))?;
        let decoder = self
            .decoders
            .get(type_name)
            .ok_or_else(|| QueueError::UnknownJobType(type_name.to_string()))?;
        let command = payload
            .command()
            .cloned()
            .ok_or(QueueError::MalformedPayload("data.command"))?;
        Ok(decoder(command)?)
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("types", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    use crate::types::JobId;

    #[derive(Debug, Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    impl Job for Ping {
        const NAME: &'static str = "tests.Ping";

        fn handle(&self) -> anyhow::Result<()> {
            anyhow::ensure!(self.n > 0, "n must be positive");
            Ok(())
        }
    }

    #[test]
    fn registry_decodes_registered_types() {
        let mut registry = JobRegistry::new();
        registry.register::<Ping>();

        let ping = Ping { n: 3 };
        let payload = JobPayload::for_command(
            JobId::new(),
            Ping::NAME,
            "ping",
            (&ping as &dyn Queueable).serialize_command().unwrap(),
        );

        let decoded = registry.decode(&payload).unwrap();
        assert_eq!(decoded.type_name(), "tests.Ping");
        assert!(decoded.handle().is_ok());
    }

    #[test]
    fn unknown_types_are_reported() {
        let registry = JobRegistry::new();
        let payload = JobPayload::for_command(JobId::new(), "tests.Missing", "x", json!({}));

        assert!(matches!(
            registry.decode(&payload),
            Err(QueueError::UnknownJobType(name)) if name == "tests.Missing"
        ));
    }

    #[test]
    fn default_markers_are_neutral() {
        let ping: &dyn Queueable = &Ping { n: 1 };
        assert_eq!(ping.tenant_awareness(), TenantAwareness::Unmarked);
        assert!(ping.member("job").is_none());
        assert_eq!(ping.display_name(), "tests.Ping");
    }
}
