//! Terraform parser for HCL and canonical JSON layouts.
//!
//! JSON documents are walked structurally. HCL documents go through a
//! line-oriented block scanner, which is brittle by construction and marks
//! the graph metadata accordingly; the IR contract is unchanged either way.
//!
//! Dependency recovery: explicit `depends_on` lists become `depends_on`
//! edges, and implicit references (`${type.name.attr}` interpolations or
//! bare `type.name` addresses anywhere in a resource's values) become
//! `requires` edges, deduplicated by `{from, to, kind}`.

use crate::{apply_target_overlay, base_graph, DialectParser, ParseError, ParseOptions, SourceFormat};
use har_core::{DepKind, Dependency, Graph, OpType, Operation, Params, Value};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

pub struct TerraformParser;

const FORMAT: SourceFormat = SourceFormat::Terraform;

impl DialectParser for TerraformParser {
    fn format(&self) -> SourceFormat {
        FORMAT
    }

    fn parse(&self, content: &str, opts: &ParseOptions) -> Result<Graph, ParseError> {
        let trimmed = content.trim_start();
        let mut graph = if trimmed.starts_with('{') {
            parse_json(content)?
        } else {
            parse_hcl(content)?
        };
        recover_dependencies(&mut graph);
        apply_target_overlay(&mut graph, opts);
        Ok(graph)
    }

    fn validate(&self, content: &str) -> Result<(), ParseError> {
        let trimmed = content.trim_start();
        if trimmed.starts_with('{') {
            serde_json::from_str::<Value>(content)
                .map(|_| ())
                .map_err(|err| ParseError::syntax(FORMAT, err.to_string()))
        } else if balanced_braces(content) {
            Ok(())
        } else {
            Err(ParseError::syntax(FORMAT, "unbalanced braces"))
        }
    }
}

fn balanced_braces(content: &str) -> bool {
    let mut depth = 0i64;
    for c in content.chars() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    depth == 0
}

// ---------------------------------------------------------------------------
// JSON layout
// ---------------------------------------------------------------------------

fn parse_json(content: &str) -> Result<Graph, ParseError> {
    let doc: Value =
        serde_json::from_str(content).map_err(|err| ParseError::syntax(FORMAT, err.to_string()))?;
    let Value::Object(root) = doc else {
        return Err(ParseError::syntax(FORMAT, "expected a JSON object"));
    };
    if root.contains_key("planned_values") {
        return Err(ParseError::syntax(
            FORMAT,
            "plan-output layout (`planned_values`) is not supported; supply configuration JSON",
        ));
    }

    let mut graph = base_graph(FORMAT);

    if let Some(Value::Object(resources)) = root.get("resource") {
        for (rtype, instances) in resources {
            let Value::Object(instances) = instances else {
                continue;
            };
            for (rname, attrs) in instances {
                let attrs = match attrs {
                    Value::Object(map) => map.clone(),
                    // Terraform JSON also permits a list of instance bodies.
                    Value::Array(items) => match items.first() {
                        Some(Value::Object(map)) => map.clone(),
                        _ => Params::new(),
                    },
                    _ => Params::new(),
                };
                graph.add_operation(resource_operation(rtype, rname, attrs));
            }
        }
    }
    for section in ["variable", "output"] {
        if let Some(Value::Object(entries)) = root.get(section) {
            for (name, body) in entries {
                graph.add_operation(declaration_operation(section, name, body));
            }
        }
    }
    Ok(graph)
}

fn declaration_operation(section: &str, name: &str, body: &Value) -> Operation {
    let mut op = Operation::new(
        format!("{section}.{name}"),
        OpType::Passthrough(section.to_string()),
    )
    .with_param("name", name)
    .with_meta("source_format", "terraform")
    .with_meta("name", name)
    .with_meta("raw", serde_json::to_string(body).unwrap_or_default());
    if let Value::Object(map) = body {
        for (key, value) in map {
            op.params.insert(key.clone(), value.clone());
        }
    }
    op
}

// ---------------------------------------------------------------------------
// HCL layout
// ---------------------------------------------------------------------------

fn block_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?m)^\s*(resource|data|variable|output|provider|terraform|locals)(?:\s+"([^"]+)")?(?:\s+"([^"]+)")?\s*\{"#,
        )
        .expect("static regex")
    })
}

fn parse_hcl(content: &str) -> Result<Graph, ParseError> {
    if !balanced_braces(content) {
        return Err(ParseError::syntax(FORMAT, "unbalanced braces"));
    }
    let mut graph = base_graph(FORMAT).with_metadata("parser", "regex");

    for caps in block_header_re().captures_iter(content) {
        let whole = caps.get(0).map(|m| m.end()).unwrap_or(0);
        let kind = &caps[1];
        let Some(body) = extract_block_body(&content[whole..]) else {
            continue;
        };
        match kind {
            "resource" => {
                let (Some(rtype), Some(rname)) = (caps.get(2), caps.get(3)) else {
                    debug!("resource block without type/name labels, skipping");
                    continue;
                };
                let attrs = parse_attrs(body);
                graph.add_operation(resource_operation(rtype.as_str(), rname.as_str(), attrs));
            }
            "variable" | "output" => {
                if let Some(name) = caps.get(2) {
                    let raw = Value::Object(parse_attrs(body));
                    graph.add_operation(declaration_operation(kind, name.as_str(), &raw));
                }
            }
            // provider/terraform/data/locals blocks carry no operations
            _ => {}
        }
    }
    Ok(graph)
}

/// Given text starting just after an opening brace, return the body up to
/// the matching close.
fn extract_block_body(rest: &str) -> Option<&str> {
    let mut depth = 1i64;
    for (idx, c) in rest.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&rest[..idx]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Line-oriented attribute parser for a block body. Handles `key = value`
/// assignments (accumulating lines until brackets balance) and nested
/// `key { ... }` blocks; repeated nested blocks collect into an array.
fn parse_attrs(body: &str) -> Params {
    let mut params = Params::new();
    let lines: Vec<&str> = body.lines().collect();
    let mut idx = 0;

    while idx < lines.len() {
        let line = lines[idx].trim();
        idx += 1;
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }

        if let Some((key, rhs)) = split_assignment(line) {
            let mut value_text = rhs.to_string();
            while !brackets_balanced(&value_text) && idx < lines.len() {
                value_text.push('\n');
                value_text.push_str(lines[idx].trim());
                idx += 1;
            }
            params.insert(key.to_string(), parse_value(&value_text));
            continue;
        }

        if let Some(key) = nested_block_key(line) {
            let mut depth = line.matches('{').count() as i64 - line.matches('}').count() as i64;
            let mut inner = String::new();
            while depth > 0 && idx < lines.len() {
                let next = lines[idx];
                idx += 1;
                depth += next.matches('{').count() as i64;
                depth -= next.matches('}').count() as i64;
                if depth > 0 {
                    inner.push_str(next);
                    inner.push('\n');
                }
            }
            let nested = Value::Object(parse_attrs(&inner));
            match params.entry(key) {
                serde_json::map::Entry::Vacant(slot) => {
                    slot.insert(nested);
                }
                serde_json::map::Entry::Occupied(mut slot) => match slot.get_mut() {
                    Value::Array(items) => items.push(nested),
                    existing => {
                        let first = existing.take();
                        *existing = Value::Array(vec![first, nested]);
                    }
                },
            }
        }
    }
    params
}

fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let (lhs, rhs) = line.split_once('=')?;
    let key = lhs.trim();
    // Reject `==` comparisons and keys that are not identifiers.
    if rhs.starts_with('=') || key.is_empty() || !key.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some((key, rhs.trim()))
}

fn nested_block_key(line: &str) -> Option<String> {
    let stripped = line.strip_suffix('{')?.trim();
    if stripped.is_empty() || !stripped.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '"' || c == ' ') {
        return None;
    }
    Some(stripped.split_whitespace().next()?.trim_matches('"').to_string())
}

fn brackets_balanced(text: &str) -> bool {
    let opens = text.matches('[').count() + text.matches('{').count();
    let closes = text.matches(']').count() + text.matches('}').count();
    opens <= closes
}

/// Parse an HCL scalar/list literal. Quoted strings, numbers, booleans,
/// and string lists are JSON-compatible once trailing commas are removed;
/// anything else (bare references, functions, heredocs) stays a string.
fn parse_value(text: &str) -> Value {
    let cleaned = text.trim().trim_end_matches(',').trim();
    let normalized = if cleaned.starts_with('[') {
        cleaned.replace(",]", "]").replace(", ]", "]")
    } else {
        cleaned.to_string()
    };
    serde_json::from_str(&normalized).unwrap_or_else(|_| Value::String(cleaned.to_string()))
}

// ---------------------------------------------------------------------------
// Resource normalization
// ---------------------------------------------------------------------------

fn provider_of(rtype: &str) -> Option<&'static str> {
    if rtype.starts_with("aws_") {
        Some("aws")
    } else if rtype.starts_with("google_") {
        Some("gcp")
    } else if rtype.starts_with("azurerm_") {
        Some("azure")
    } else {
        None
    }
}

fn resource_operation(rtype: &str, rname: &str, mut attrs: Params) -> Operation {
    let id = format!("{rtype}.{rname}");
    let depends_on = attrs.remove("depends_on");

    let op_type = match rtype {
        "aws_instance" | "google_compute_instance" | "azurerm_linux_virtual_machine"
        | "azurerm_windows_virtual_machine" => OpType::ComputeInstanceCreate,
        "aws_s3_bucket" | "google_storage_bucket" | "azurerm_storage_account" => {
            OpType::StorageBucketCreate
        }
        "aws_ebs_volume" | "google_compute_disk" | "azurerm_managed_disk" => {
            OpType::StorageVolumeCreate
        }
        "aws_vpc" | "google_compute_network" | "azurerm_virtual_network" => OpType::NetworkCreate,
        "aws_subnet" | "google_compute_subnetwork" | "azurerm_subnet" => OpType::SubnetCreate,
        "aws_security_group" | "google_compute_firewall" | "azurerm_network_security_group" => {
            OpType::FirewallRule
        }
        "aws_iam_user" => OpType::IamUserCreate,
        "aws_iam_role" => OpType::IamRoleCreate,
        "aws_db_instance" | "google_sql_database_instance" => OpType::DatabaseCreate,
        "aws_lb" | "aws_elb" | "aws_alb" => OpType::LoadBalancerCreate,
        "aws_route53_record" | "google_dns_record_set" | "azurerm_dns_a_record" => {
            OpType::DnsRecordCreate
        }
        "local_file" => OpType::FileWrite,
        other => OpType::Passthrough(other.to_string()),
    };

    let mut op = Operation::new(&id, op_type);

    match &op.op_type {
        OpType::StorageBucketCreate => {
            if !attrs.contains_key("bucket") {
                op.params.insert("bucket".into(), Value::String(rname.to_string()));
            }
        }
        OpType::FileWrite => {
            if let Some(filename) = attrs.remove("filename") {
                op.params.insert("path".into(), filename);
            }
        }
        _ => {
            if !attrs.contains_key("name") {
                op.params.insert("name".into(), Value::String(rname.to_string()));
            }
        }
    }
    if let Some(ami) = attrs.remove("ami") {
        op.params.insert("image".into(), ami);
    }
    op.params.append(&mut attrs);

    if let Some(provider) = provider_of(rtype) {
        op.target.0.insert("provider".into(), Value::String(provider.to_string()));
    }
    if let Some(region) = op.params.get("region").cloned() {
        op.target.0.insert("region".into(), region);
    }

    op = op
        .with_meta("source_format", "terraform")
        .with_meta("name", rname)
        .with_meta("resource_type", rtype);
    if op.op_type.is_passthrough() {
        op = op.with_meta("raw", format!("resource \"{rtype}\" \"{rname}\""));
    }
    if let Some(depends_on) = depends_on {
        op = op.with_meta("depends_on", depends_on);
    }
    op
}

// ---------------------------------------------------------------------------
// Dependency recovery
// ---------------------------------------------------------------------------

fn recover_dependencies(graph: &mut Graph) {
    let addresses: Vec<String> = graph.operations().iter().map(|op| op.id.clone()).collect();
    let mut edges: Vec<Dependency> = Vec::new();

    for op in graph.operations() {
        // Explicit depends_on lists.
        if let Some(Value::Array(deps)) = op.metadata.get("depends_on") {
            for entry in deps {
                if let Some(address) = entry.as_str()
                    && addresses.iter().any(|a| a == address)
                {
                    edges.push(
                        Dependency::new(address, &op.id, DepKind::DependsOn)
                            .with_reason("depends_on"),
                    );
                }
            }
        }
        // Implicit references anywhere in the resource's values.
        let haystack = serde_json::to_string(&op.params).unwrap_or_default();
        for address in &addresses {
            if *address != op.id && contains_address(&haystack, address) {
                edges.push(
                    Dependency::new(address, &op.id, DepKind::Requires)
                        .with_reason("implicit reference"),
                );
            }
        }
    }

    for dep in edges {
        if !graph.dependencies().iter().any(|d| d.key() == dep.key()) {
            graph.add_dependency(dep);
        }
    }
}

/// Word-boundary substring match for a resource address.
fn contains_address(haystack: &str, address: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(address) {
        let abs = start + pos;
        let before_ok = abs == 0
            || !haystack[..abs]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-');
        let after = haystack[abs + address.len()..].chars().next();
        let after_ok = !after.is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-');
        if before_ok && after_ok {
            return true;
        }
        start = abs + address.len();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Graph {
        TerraformParser
            .parse(content, &ParseOptions::default())
            .unwrap()
    }

    const VPC_JSON: &str = r#"{
      "resource": {
        "aws_vpc": {
          "main": { "cidr_block": "10.0.0.0/16" }
        },
        "aws_subnet": {
          "public": { "vpc_id": "${aws_vpc.main.id}", "cidr_block": "10.0.1.0/24" }
        }
      }
    }"#;

    #[test]
    fn test_json_resources_and_implicit_reference() {
        let graph = parse(VPC_JSON);
        assert_eq!(graph.operation_count(), 2);

        let vpc = graph.find_operation("aws_vpc.main").unwrap();
        assert_eq!(vpc.op_type, OpType::NetworkCreate);
        assert_eq!(vpc.target.provider(), Some("aws"));

        assert_eq!(graph.dependency_count(), 1);
        let dep = &graph.dependencies()[0];
        assert_eq!(dep.from, "aws_vpc.main");
        assert_eq!(dep.to, "aws_subnet.public");
        assert_eq!(dep.kind, DepKind::Requires);

        // topo order puts the VPC strictly before the subnet
        let order: Vec<_> = graph
            .topological_sort()
            .unwrap()
            .iter()
            .map(|op| op.id.clone())
            .collect();
        assert!(order.iter().position(|id| id == "aws_vpc.main").unwrap()
            < order.iter().position(|id| id == "aws_subnet.public").unwrap());
    }

    #[test]
    fn test_explicit_depends_on() {
        let graph = parse(
            r#"{
              "resource": {
                "aws_s3_bucket": { "logs": { "bucket": "logs" } },
                "aws_instance": {
                  "web": { "ami": "ami-123", "depends_on": ["aws_s3_bucket.logs"] }
                }
              }
            }"#,
        );
        let dep = graph
            .dependencies()
            .iter()
            .find(|d| d.kind == DepKind::DependsOn)
            .unwrap();
        assert_eq!(dep.from, "aws_s3_bucket.logs");
        assert_eq!(dep.to, "aws_instance.web");
    }

    #[test]
    fn test_hcl_resource_block() {
        let graph = parse(
            r#"
resource "aws_instance" "web" {
  ami           = "ami-0c55b159cbfafe1f0"
  instance_type = "t3.micro"

  tags {
    Name = "web"
  }
}
"#,
        );
        assert_eq!(graph.metadata.get("parser"), Some(&Value::String("regex".into())));
        let op = graph.find_operation("aws_instance.web").unwrap();
        assert_eq!(op.op_type, OpType::ComputeInstanceCreate);
        assert_eq!(op.param_str("image"), Some("ami-0c55b159cbfafe1f0"));
        assert_eq!(op.param_str("instance_type"), Some("t3.micro"));
        assert!(op.params.get("tags").is_some());
    }

    #[test]
    fn test_hcl_implicit_reference_bare_address() {
        let graph = parse(
            r#"
resource "aws_vpc" "main" {
  cidr_block = "10.0.0.0/16"
}

resource "aws_subnet" "public" {
  vpc_id = aws_vpc.main.id
}
"#,
        );
        assert_eq!(graph.dependency_count(), 1);
        assert_eq!(graph.dependencies()[0].from, "aws_vpc.main");
    }

    #[test]
    fn test_unknown_resource_passthrough() {
        let graph = parse(r#"{"resource": {"aws_eip": {"ip": {}}}}"#);
        assert_eq!(
            graph.operations()[0].op_type,
            OpType::Passthrough("aws_eip".into())
        );
    }

    #[test]
    fn test_variable_block_becomes_declaration() {
        let graph = parse("variable \"region\" {\n  default = \"us-east-1\"\n}\n");
        let op = graph.find_operation("variable.region").unwrap();
        assert_eq!(op.op_type, OpType::Passthrough("variable".into()));
        assert_eq!(op.param_str("default"), Some("us-east-1"));
    }

    #[test]
    fn test_planned_values_layout_rejected() {
        let err = TerraformParser
            .parse(r#"{"planned_values": {}}"#, &ParseOptions::default())
            .unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
    }

    #[test]
    fn test_malformed_json_fatal() {
        assert!(TerraformParser
            .parse("{ not json", &ParseOptions::default())
            .is_err());
    }

    #[test]
    fn test_unbalanced_hcl_fatal() {
        assert!(TerraformParser
            .parse("resource \"aws_vpc\" \"x\" {", &ParseOptions::default())
            .is_err());
    }

    #[test]
    fn test_edges_deduplicated() {
        // Two references to the same address produce a single edge.
        let graph = parse(
            r#"{
              "resource": {
                "aws_vpc": { "main": { "cidr_block": "10.0.0.0/16" } },
                "aws_subnet": {
                  "public": {
                    "vpc_id": "${aws_vpc.main.id}",
                    "note": "${aws_vpc.main.arn}"
                  }
                }
              }
            }"#,
        );
        assert_eq!(graph.dependency_count(), 1);
    }
}
