//! Terraform emitter.
//!
//! Lowers the graph into a canonical JSON configuration document; the HCL
//! syntax option pretty-prints the same document. The provider option
//! selects emitted resource types and the `required_providers` block.
//! Operations parsed from Terraform keep their original resource type via
//! metadata, so a round-trip reproduces the same `aws_*` keys.

use crate::{
    sorted_ops, DialectTransformer, Provider, TargetFormat, TerraformSyntax, TransformError,
    TransformOptions,
};
use har_core::{DepKind, Graph, OpType, Operation, Params, Value};
use serde_json::json;
use std::collections::HashMap;
use tracing::warn;

pub struct TerraformTransformer;

impl DialectTransformer for TerraformTransformer {
    fn format(&self) -> TargetFormat {
        TargetFormat::Terraform
    }

    fn transform(&self, graph: &Graph, opts: &TransformOptions) -> Result<String, TransformError> {
        let sorted = sorted_ops(graph)?;

        // First pass: emitted address per op id, for depends_on wiring.
        let mut addresses: HashMap<String, (String, String)> = HashMap::new();
        for op in &sorted {
            if let Some(rtype) = resource_type(op, opts.provider) {
                addresses.insert(op.id.clone(), (rtype, resource_label(op)));
            }
        }

        let mut resources = Params::new();
        for op in &sorted {
            let Some((rtype, label)) = addresses.get(&op.id) else {
                warn!(
                    "operation {} ({}) has no {} terraform peer, skipping",
                    op.id,
                    op.op_type,
                    opts.provider_name()
                );
                continue;
            };
            let mut attrs = resource_attrs(op, rtype);

            let depends: Vec<Value> = graph
                .dependencies_for(&op.id)
                .iter()
                .filter(|dep| dep.kind == DepKind::DependsOn)
                .filter_map(|dep| addresses.get(&dep.from))
                .map(|(dep_type, dep_label)| Value::String(format!("{dep_type}.{dep_label}")))
                .collect();
            if !depends.is_empty() {
                attrs.insert("depends_on".into(), Value::Array(depends));
            }

            let by_type = resources
                .entry(rtype.clone())
                .or_insert_with(|| Value::Object(Params::new()));
            if let Value::Object(by_type) = by_type {
                by_type.insert(label.clone(), Value::Object(attrs));
            }
        }

        let document = json!({
            "terraform": {
                "required_providers": required_providers(opts.provider),
            },
            "provider": provider_block(opts),
            "resource": Value::Object(resources),
        });

        match opts.syntax {
            TerraformSyntax::Json => serde_json::to_string_pretty(&document)
                .map_err(|err| TransformError::Emit(err.to_string())),
            TerraformSyntax::Hcl => Ok(render_hcl(&document)),
        }
    }
}

impl TransformOptions {
    fn provider_name(&self) -> &'static str {
        match self.provider {
            Provider::Aws => "aws",
            Provider::Gcp => "gcp",
            Provider::Azure => "azure",
        }
    }
}

fn required_providers(provider: Provider) -> Value {
    match provider {
        Provider::Aws => json!({"aws": {"source": "hashicorp/aws"}}),
        Provider::Gcp => json!({"google": {"source": "hashicorp/google"}}),
        Provider::Azure => json!({"azurerm": {"source": "hashicorp/azurerm"}}),
    }
}

fn provider_block(opts: &TransformOptions) -> Value {
    let region = opts
        .region
        .clone()
        .unwrap_or_else(|| opts.provider.default_region().to_string());
    match opts.provider {
        Provider::Aws => json!({"aws": {"region": region}}),
        Provider::Gcp => json!({"google": {"region": region}}),
        Provider::Azure => json!({"azurerm": {"features": {}}}),
    }
}

/// Resource type for an operation under the selected provider. Operations
/// that came from Terraform keep their original type.
fn resource_type(op: &Operation, provider: Provider) -> Option<String> {
    if let Some(original) = op.metadata.get("resource_type").and_then(Value::as_str) {
        return Some(original.to_string());
    }
    let mapped = match (&op.op_type, provider) {
        (OpType::ComputeInstanceCreate, Provider::Aws) => "aws_instance",
        (OpType::ComputeInstanceCreate, Provider::Gcp) => "google_compute_instance",
        (OpType::ComputeInstanceCreate, Provider::Azure) => "azurerm_linux_virtual_machine",
        (OpType::NetworkCreate, Provider::Aws) => "aws_vpc",
        (OpType::NetworkCreate, Provider::Gcp) => "google_compute_network",
        (OpType::NetworkCreate, Provider::Azure) => "azurerm_virtual_network",
        (OpType::SubnetCreate, Provider::Aws) => "aws_subnet",
        (OpType::SubnetCreate, Provider::Gcp) => "google_compute_subnetwork",
        (OpType::SubnetCreate, Provider::Azure) => "azurerm_subnet",
        (OpType::FirewallRule, Provider::Aws) => "aws_security_group",
        (OpType::FirewallRule, Provider::Gcp) => "google_compute_firewall",
        (OpType::FirewallRule, Provider::Azure) => "azurerm_network_security_group",
        (OpType::StorageBucketCreate, Provider::Aws) => "aws_s3_bucket",
        (OpType::StorageBucketCreate, Provider::Gcp) => "google_storage_bucket",
        (OpType::StorageBucketCreate, Provider::Azure) => "azurerm_storage_account",
        (OpType::StorageVolumeCreate, Provider::Aws) => "aws_ebs_volume",
        (OpType::StorageVolumeCreate, Provider::Gcp) => "google_compute_disk",
        (OpType::StorageVolumeCreate, Provider::Azure) => "azurerm_managed_disk",
        (OpType::DatabaseCreate, Provider::Aws) => "aws_db_instance",
        (OpType::DatabaseCreate, Provider::Gcp) => "google_sql_database_instance",
        (OpType::LoadBalancerCreate, Provider::Aws) => "aws_lb",
        (OpType::DnsRecordCreate, Provider::Aws) => "aws_route53_record",
        (OpType::DnsRecordCreate, Provider::Gcp) => "google_dns_record_set",
        (OpType::IamUserCreate | OpType::UserCreate, Provider::Aws) => "aws_iam_user",
        (OpType::IamUserCreate | OpType::UserCreate, Provider::Gcp) => "google_service_account",
        (OpType::IamRoleCreate, Provider::Aws) => "aws_iam_role",
        (OpType::FileWrite, _) => "local_file",
        (OpType::CommandRun, _) => "null_resource",
        _ => return None,
    };
    Some(mapped.to_string())
}

/// A terraform-safe resource label.
fn resource_label(op: &Operation) -> String {
    let source_format = op.metadata.get("source_format").and_then(Value::as_str);
    let raw = if source_format == Some("terraform") {
        op.name().map(str::to_string)
    } else {
        op.param_str("name")
            .or_else(|| op.param_str("bucket"))
            .or_else(|| op.param_str("package"))
            .or_else(|| op.param_str("service"))
            .map(str::to_string)
    };
    let raw = raw.unwrap_or_else(|| op.id.clone());
    let label: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    label.trim_matches('_').to_string()
}

fn resource_attrs(op: &Operation, rtype: &str) -> Params {
    let mut attrs = op.params.clone();
    match rtype {
        "aws_instance" => {
            if let Some(image) = attrs.remove("image") {
                attrs.insert("ami".into(), image);
            }
        }
        "local_file" => {
            if let Some(path) = attrs.remove("path") {
                attrs.insert("filename".into(), path);
            }
            attrs.remove("source");
            attrs.entry("content").or_insert(Value::String(String::new()));
        }
        "null_resource" => {
            let command = attrs
                .remove("command")
                .unwrap_or(Value::String(String::new()));
            attrs = Params::new();
            attrs.insert(
                "provisioner".into(),
                json!({"local-exec": {"command": command}}),
            );
        }
        _ => {}
    }
    attrs
}

// ---------------------------------------------------------------------------
// HCL rendering
// ---------------------------------------------------------------------------

fn render_hcl(document: &Value) -> String {
    let mut out = String::new();
    let Value::Object(root) = document else {
        return out;
    };

    if let Some(terraform) = root.get("terraform") {
        out.push_str("terraform {\n");
        render_body(terraform, 1, &mut out);
        out.push_str("}\n\n");
    }
    if let Some(Value::Object(providers)) = root.get("provider") {
        for (name, body) in providers {
            out.push_str(&format!("provider \"{name}\" {{\n"));
            render_body(body, 1, &mut out);
            out.push_str("}\n\n");
        }
    }
    if let Some(Value::Object(resources)) = root.get("resource") {
        for (rtype, instances) in resources {
            let Value::Object(instances) = instances else {
                continue;
            };
            for (label, attrs) in instances {
                out.push_str(&format!("resource \"{rtype}\" \"{label}\" {{\n"));
                render_body(attrs, 1, &mut out);
                out.push_str("}\n\n");
            }
        }
    }
    out.trim_end().to_string() + "\n"
}

fn render_body(value: &Value, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let Value::Object(map) = value else {
        return;
    };
    for (key, inner) in map {
        match inner {
            Value::Object(_) => {
                out.push_str(&format!("{indent}{key} {{\n"));
                render_body(inner, depth + 1, out);
                out.push_str(&format!("{indent}}}\n"));
            }
            other => {
                out.push_str(&format!("{indent}{key} = {}\n", render_scalar(other)));
            }
        }
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(render_scalar).collect();
            format!("[{}]", rendered.join(", "))
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
