//! Heterogeneous value trees used by operation params, targets, and metadata.
//!
//! The IR is heterogeneous by design: parameter values can be strings,
//! numbers, booleans, ordered sequences, or nested string-keyed mappings.
//! `serde_json::Value` is exactly that shape, so the IR reuses it rather
//! than inventing a parallel tree.

use serde::{Deserialize, Serialize};

/// A single tagged value in the IR tree.
pub type Value = serde_json::Value;

/// A string-keyed mapping of [`Value`]s (params, metadata).
pub type Params = serde_json::Map<String, Value>;

/// Placement constraints for an operation.
///
/// Describes where the operation should run. Common keys (`os`, `arch`,
/// `environment`, `device_type`, `provider`, `region`, `namespace`) have
/// typed accessors; anything else is reachable through [`Target::get`],
/// which is what routing-table pattern matching uses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target(pub Params);

impl Target {
    /// An empty target (no placement constraints).
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an arbitrary target field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a field, returning `self` for chained construction.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// True when no constraints are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Operating system family (`debian`, `redhat`, `alpine`, ...).
    pub fn os(&self) -> Option<&str> {
        self.str_field("os")
    }

    /// CPU architecture.
    pub fn arch(&self) -> Option<&str> {
        self.str_field("arch")
    }

    /// Deployment environment. Anything other than `dev`, `staging`, or
    /// `prod` reads back as `unknown`.
    pub fn environment(&self) -> &str {
        match self.str_field("environment") {
            Some(env @ ("dev" | "staging" | "prod")) => env,
            _ => "unknown",
        }
    }

    /// Device class (`server`, `router`, `switch`, ...).
    pub fn device_type(&self) -> Option<&str> {
        self.str_field("device_type")
    }

    /// Cloud provider (`aws`, `gcp`, `azure`).
    pub fn provider(&self) -> Option<&str> {
        self.str_field("provider")
    }

    /// Cloud region.
    pub fn region(&self) -> Option<&str> {
        self.str_field("region")
    }

    /// Kubernetes namespace.
    pub fn namespace(&self) -> Option<&str> {
        self.str_field("namespace")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_target_typed_accessors() {
        let target = Target::new()
            .with("os", "debian")
            .with("environment", "prod")
            .with("provider", "aws");

        assert_eq!(target.os(), Some("debian"));
        assert_eq!(target.environment(), "prod");
        assert_eq!(target.provider(), Some("aws"));
        assert_eq!(target.region(), None);
    }

    #[test]
    fn test_environment_defaults_to_unknown() {
        assert_eq!(Target::new().environment(), "unknown");
        assert_eq!(Target::new().with("environment", "qa").environment(), "unknown");
    }

    #[test]
    fn test_target_serializes_transparent() {
        let target = Target::new().with("os", "alpine").with("ipv6", true);
        let encoded = serde_json::to_value(&target).unwrap();
        assert_eq!(encoded, json!({"os": "alpine", "ipv6": true}));

        let decoded: Target = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, target);
    }
}
