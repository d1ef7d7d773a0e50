//! Backend descriptors and health status values.

use har_core::Params;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A concrete execution backend an operation can be routed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backend {
    pub name: String,
    #[serde(rename = "type")]
    pub backend_type: BackendType,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthProbe>,
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub metadata: Params,
}

fn default_priority() -> i64 {
    50
}

impl Backend {
    pub fn new(name: impl Into<String>, backend_type: BackendType) -> Self {
        Self {
            name: name.into(),
            backend_type,
            priority: default_priority(),
            locality: None,
            capabilities: Vec::new(),
            health_check: None,
            metadata: Params::new(),
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_health_check(mut self, probe: HealthProbe) -> Self {
        self.health_check = Some(probe);
        self
    }

    /// Health-map key: `<type>:<name>`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.backend_type, self.name)
    }
}

/// The kind of execution backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    Local,
    Remote,
    Cloud,
    Passthrough,
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Cloud => "cloud",
            Self::Passthrough => "passthrough",
        };
        f.write_str(s)
    }
}

/// How to probe a backend's liveness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HealthProbe {
    /// GET a URL; 2xx healthy, 5xx unhealthy, other degraded, transport
    /// failure unhealthy.
    Http { url: String },
    /// Connect with timeout; success healthy, failure unhealthy.
    Tcp { host: String, port: u16 },
    /// Named callback registered on the checker; panic-free by contract.
    Function { name: String },
}

/// Liveness state per backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    #[default]
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_key() {
        let backend = Backend::new("builder-1", BackendType::Remote);
        assert_eq!(backend.key(), "remote:builder-1");
    }

    #[test]
    fn test_probe_yaml_shape() {
        let yaml = "type: http\nurl: http://localhost:8500/health\n";
        let probe: HealthProbe = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(
            probe,
            HealthProbe::Http {
                url: "http://localhost:8500/health".to_string()
            }
        );
    }

    #[test]
    fn test_backend_defaults() {
        let yaml = "name: fallback\ntype: passthrough\n";
        let backend: Backend = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(backend.priority, 50);
        assert!(backend.capabilities.is_empty());
        assert!(backend.health_check.is_none());
    }
}
