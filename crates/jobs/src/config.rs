//! Tenancy settings for queued jobs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const ENV_DEFAULT: &str = "TENANTRY_QUEUES_ARE_TENANT_AWARE_BY_DEFAULT";
pub const ENV_TENANT_AWARE_JOBS: &str = "TENANTRY_TENANT_AWARE_JOBS";
pub const ENV_NOT_TENANT_AWARE_JOBS: &str = "TENANTRY_NOT_TENANT_AWARE_JOBS";
pub const ENV_QUEUEABLE_TO_JOB: &str = "TENANTRY_QUEUEABLE_TO_JOB";

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid tenancy config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{key}: expected a boolean, got `{value}`")]
    InvalidBool { key: &'static str, value: String },
    #[error("{key}: expected `Type=member`, got `{entry}`")]
    InvalidMapping { key: &'static str, entry: String },
}

/// Which queued jobs need the dispatching tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenancyConfig {
    /// Job type names that always run tenant-aware (unless explicitly marked).
    pub tenant_aware_jobs: Vec<String>,
    /// Job type names that never run tenant-aware (unless explicitly marked).
    pub not_tenant_aware_jobs: Vec<String>,
    /// Policy for jobs that are neither marked nor listed.
    pub queues_are_tenant_aware_by_default: bool,
    /// Envelope type name → member holding the real job.
    pub queueable_to_job: HashMap<String, String>,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            tenant_aware_jobs: Vec::new(),
            not_tenant_aware_jobs: Vec::new(),
            queues_are_tenant_aware_by_default: true,
            queueable_to_job: HashMap::new(),
        }
    }
}

impl TenancyConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Read settings from the process environment; unset variables keep defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_DEFAULT) {
            config.queues_are_tenant_aware_by_default = parse_bool(ENV_DEFAULT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_TENANT_AWARE_JOBS) {
            config.tenant_aware_jobs = split_list(&raw);
        }
        if let Some(raw) = lookup(ENV_NOT_TENANT_AWARE_JOBS) {
            config.not_tenant_aware_jobs = split_list(&raw);
        }
        if let Some(raw) = lookup(ENV_QUEUEABLE_TO_JOB) {
            for entry in split_list(&raw) {
                let (envelope, member) = entry
                    .split_once('=')
                    .map(|(e, m)| (e.trim(), m.trim()))
                    .filter(|(e, m)| !e.is_empty() && !m.is_empty())
                    .ok_or_else(|| ConfigError::InvalidMapping {
                        key: ENV_QUEUEABLE_TO_JOB,
                        entry: entry.clone(),
                    })?;
                config
                    .queueable_to_job
                    .insert(envelope.to_string(), member.to_string());
            }
        }

        Ok(config)
    }

    pub fn with_default_tenant_awareness(mut self, aware: bool) -> Self {
        self.queues_are_tenant_aware_by_default = aware;
        self
    }

    pub fn with_tenant_aware_job(mut self, type_name: impl Into<String>) -> Self {
        self.tenant_aware_jobs.push(type_name.into());
        self
    }

    pub fn with_not_tenant_aware_job(mut self, type_name: impl Into<String>) -> Self {
        self.not_tenant_aware_jobs.push(type_name.into());
        self
    }

    pub fn with_queueable_to_job(
        mut self,
        envelope: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        self.queueable_to_job.insert(envelope.into(), member.into());
        self
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: raw.to_string(),
        }),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
