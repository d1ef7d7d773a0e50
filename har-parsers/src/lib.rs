//! Source dialect parsers.
//!
//! Each supported dialect lifts source text into the semantic graph:
//! every declaration becomes an [`Operation`] with a normalized verb and
//! parameter vocabulary, and the dialect's implicit or explicit ordering is
//! reconstructed as [`Dependency`] edges. Unknown constructs degrade to
//! `tool.<verb>` passthrough operations instead of failing the parse.
//!
//! The [`parse`] facade dispatches on [`SourceFormat`]; [`detect_format`]
//! guesses the format from a file extension and content sniffing.

pub mod ansible;
pub mod chef;
pub mod detect;
pub mod kubernetes;
pub mod puppet;
pub mod salt;
pub mod terraform;

mod normalize;
mod yaml;

pub use detect::detect_format;

use har_core::{Graph, Target};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The closed set of source dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Ansible,
    Salt,
    Terraform,
    Puppet,
    Chef,
    Kubernetes,
}

impl SourceFormat {
    pub const ALL: [SourceFormat; 6] = [
        Self::Ansible,
        Self::Salt,
        Self::Terraform,
        Self::Puppet,
        Self::Chef,
        Self::Kubernetes,
    ];

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

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceFormat {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ansible" => Ok(Self::Ansible),
            "salt" | "saltstack" | "sls" => Ok(Self::Salt),
            "terraform" | "tf" | "hcl" => Ok(Self::Terraform),
            "puppet" => Ok(Self::Puppet),
            "chef" => Ok(Self::Chef),
            "kubernetes" | "k8s" => Ok(Self::Kubernetes),
            other => Err(ParseError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Parser failures. Structural failures are fatal for the request; unknown
/// verbs and missing optional fields never surface here.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Malformed source text for the named dialect.
    #[error("{format} parse error: {detail}")]
    Syntax {
        format: SourceFormat,
        detail: String,
    },
    /// The requested format string names no known dialect.
    #[error("unsupported source format: {0}")]
    UnsupportedFormat(String),
}

impl ParseError {
    pub(crate) fn syntax(format: SourceFormat, detail: impl Into<String>) -> Self {
        Self::Syntax {
            format,
            detail: detail.into(),
        }
    }
}

/// Caller-supplied parse options.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Extra target fields stamped onto every parsed operation, e.g. an
    /// environment tag the source text does not carry.
    pub target: Target,
}

/// The contract every dialect parser implements.
pub trait DialectParser {
    fn format(&self) -> SourceFormat;

    /// Lift source text into a graph. The returned graph is not validated;
    /// callers run `Graph::validate` to surface missing required params.
    fn parse(&self, content: &str, opts: &ParseOptions) -> Result<Graph, ParseError>;

    /// Cheap structural check; permitted to accept documents `parse` would
    /// reject on deeper inspection.
    fn validate(&self, content: &str) -> Result<(), ParseError>;
}

/// Look up the parser for a dialect.
pub fn parser_for(format: SourceFormat) -> &'static dyn DialectParser {
    match format {
        SourceFormat::Ansible => &ansible::AnsibleParser,
        SourceFormat::Salt => &salt::SaltParser,
        SourceFormat::Terraform => &terraform::TerraformParser,
        SourceFormat::Puppet => &puppet::PuppetParser,
        SourceFormat::Chef => &chef::ChefParser,
        SourceFormat::Kubernetes => &kubernetes::KubernetesParser,
    }
}

/// Parse `content` as the given dialect.
pub fn parse(
    format: SourceFormat,
    content: &str,
    opts: &ParseOptions,
) -> Result<Graph, ParseError> {
    parser_for(format).parse(content, opts)
}

/// Base graph every parser starts from: source format and parse timestamp.
pub(crate) fn base_graph(format: SourceFormat) -> Graph {
    Graph::new()
        .with_metadata("source_format", format.as_str())
        .with_metadata("parsed_at", chrono::Utc::now().to_rfc3339())
}

/// Apply caller-supplied target fields on top of parser-derived ones.
pub(crate) fn apply_target_overlay(graph: &mut Graph, opts: &ParseOptions) {
    if opts.target.is_empty() {
        return;
    }
    for op in graph.operations_mut() {
        for (key, value) in &opts.target.0 {
            op.target.0.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_round_trip() {
        for format in SourceFormat::ALL {
            assert_eq!(format.as_str().parse::<SourceFormat>().unwrap(), format);
        }
    }

    #[test]
    fn test_unknown_format_string() {
        let err = "cfengine".parse::<SourceFormat>().unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedFormat(name) if name == "cfengine"));
    }
}
