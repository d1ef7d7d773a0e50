//! Target dialect transformers.
//!
//! Each transformer lowers a semantic graph, in a valid execution order,
//! into a target dialect's document structure. The shared algorithm:
//! topologically sort (a cycle is fatal), lower each operation through the
//! dialect's table (inexpressible operations are logged and skipped, never
//! fatal), then emit the concatenated declarations through the dialect's
//! formatter.
//!
//! A routing plan is reduced to its graph before it reaches this crate;
//! downstream behavior is identical.

pub mod ansible;
pub mod chef;
pub mod kubernetes;
pub mod puppet;
pub mod salt;
pub mod terraform;

use har_core::Graph;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The closed set of target dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetFormat {
    Ansible,
    Salt,
    Terraform,
    Puppet,
    Chef,
    Kubernetes,
}

impl TargetFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ansible => "ansible",
            Self::Salt => "salt",
            Self::Terraform => "terraform",
            Self::Puppet => "puppet",
            Self::Chef => "chef",
            Self::Kubernetes => "kubernetes",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetFormat {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ansible" => Ok(Self::Ansible),
            "salt" | "saltstack" | "sls" => Ok(Self::Salt),
            "terraform" | "tf" => Ok(Self::Terraform),
            "puppet" => Ok(Self::Puppet),
            "chef" => Ok(Self::Chef),
            "kubernetes" | "k8s" => Ok(Self::Kubernetes),
            other => Err(TransformError::UnsupportedTarget(other.to_string())),
        }
    }
}

/// Cloud provider for Terraform emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[default]
    Aws,
    Gcp,
    Azure,
}

impl Provider {
    pub fn default_region(&self) -> &'static str {
        match self {
            Self::Aws => "us-east-1",
            Self::Gcp => "us-central1",
            Self::Azure => "",
        }
    }
}

impl FromStr for Provider {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aws" => Ok(Self::Aws),
            "gcp" | "google" => Ok(Self::Gcp),
            "azure" | "azurerm" => Ok(Self::Azure),
            other => Err(TransformError::Options(format!("unknown provider: {other}"))),
        }
    }
}

/// Terraform output rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerraformSyntax {
    /// Canonical JSON document.
    #[default]
    Json,
    /// Hand-formatted HCL rendering of the same document.
    Hcl,
}

/// Caller-supplied transform options.
#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub to: TargetFormat,
    /// Ansible play `hosts` (default `all`).
    pub hosts: Option<String>,
    /// Ansible play `become` (default false).
    pub r#become: bool,
    /// OS family override for OS-aware package emission.
    pub os: Option<String>,
    /// Terraform provider (default aws).
    pub provider: Provider,
    /// Terraform region (provider default when unset).
    pub region: Option<String>,
    /// Terraform output syntax (default JSON).
    pub syntax: TerraformSyntax,
    /// Puppet class wrapper name.
    pub class_name: Option<String>,
    /// Chef cookbook name for the header comment (default `generated`).
    pub cookbook: Option<String>,
}

impl TransformOptions {
    pub fn new(to: TargetFormat) -> Self {
        Self {
            to,
            hosts: None,
            r#become: false,
            os: None,
            provider: Provider::default(),
            region: None,
            syntax: TerraformSyntax::default(),
            class_name: None,
            cookbook: None,
        }
    }
}

/// Transformer failures. Operations the dialect cannot express are not
/// errors; they degrade to a logged skip.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The input graph cannot be linearized.
    #[error("graph contains a circular dependency")]
    CircularDependency,
    /// The requested target string names no known dialect.
    #[error("unsupported target format: {0}")]
    UnsupportedTarget(String),
    /// A single operation failed the dialect's formatter.
    #[error("failed to render operation {op_id}: {reason}")]
    TransformFailed { op_id: String, reason: String },
    /// Invalid option combination.
    #[error("invalid transform options: {0}")]
    Options(String),
    /// Document serialization failed.
    #[error("emission failed: {0}")]
    Emit(String),
}

/// The contract every dialect transformer implements.
pub trait DialectTransformer {
    fn format(&self) -> TargetFormat;

    fn transform(&self, graph: &Graph, opts: &TransformOptions)
        -> Result<String, TransformError>;

    /// Structural validation is the graph's own.
    fn validate(&self, graph: &Graph) -> Result<(), har_core::GraphError> {
        graph.validate()
    }
}

/// Look up the transformer for a dialect.
pub fn transformer_for(format: TargetFormat) -> &'static dyn DialectTransformer {
    match format {
        TargetFormat::Ansible => &ansible::AnsibleTransformer,
        TargetFormat::Salt => &salt::SaltTransformer,
        TargetFormat::Terraform => &terraform::TerraformTransformer,
        TargetFormat::Puppet => &puppet::PuppetTransformer,
        TargetFormat::Chef => &chef::ChefTransformer,
        TargetFormat::Kubernetes => &kubernetes::KubernetesTransformer,
    }
}

/// Transform a graph into the target named by `opts.to`.
pub fn transform(graph: &Graph, opts: &TransformOptions) -> Result<String, TransformError> {
    transformer_for(opts.to).transform(graph, opts)
}

/// Topologically sort the graph or fail with the transformer's cycle error.
pub(crate) fn sorted_ops<'g>(
    graph: &'g Graph,
) -> Result<Vec<&'g har_core::Operation>, TransformError> {
    graph
        .topological_sort()
        .map_err(|_| TransformError::CircularDependency)
}

/// Serialize a document tree to YAML.
pub(crate) fn to_yaml(value: &har_core::Value) -> Result<String, TransformError> {
    serde_yaml_ng::to_string(value).map_err(|err| TransformError::Emit(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_from_str() {
        assert_eq!("salt".parse::<TargetFormat>().unwrap(), TargetFormat::Salt);
        assert_eq!("k8s".parse::<TargetFormat>().unwrap(), TargetFormat::Kubernetes);
        assert!(matches!(
            "nomad".parse::<TargetFormat>(),
            Err(TransformError::UnsupportedTarget(_))
        ));
    }

    #[test]
    fn test_provider_defaults() {
        assert_eq!(Provider::Aws.default_region(), "us-east-1");
        assert_eq!(Provider::Gcp.default_region(), "us-central1");
        assert_eq!(Provider::Azure.default_region(), "");
    }
}
