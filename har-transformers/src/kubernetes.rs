//! Kubernetes manifest emitter.
//!
//! Lowers the graph into multi-document YAML, one manifest per operation,
//! emitted in topological order so the stream is a valid install order.
//! A `firewall_rule` aimed at a namespace becomes a NetworkPolicy; other
//! dependency edges are carried only through document order.

use crate::{sorted_ops, to_yaml, DialectTransformer, TargetFormat, TransformError, TransformOptions};
use har_core::{Graph, OpType, Operation, Params, Value};
use serde_json::json;
use tracing::warn;

pub struct KubernetesTransformer;

impl DialectTransformer for KubernetesTransformer {
    fn format(&self) -> TargetFormat {
        TargetFormat::Kubernetes
    }

    fn transform(&self, graph: &Graph, _opts: &TransformOptions) -> Result<String, TransformError> {
        let sorted = sorted_ops(graph)?;

        let mut documents = Vec::new();
        for op in sorted {
            let Some(manifests) = lower(op) else {
                warn!(
                    "operation {} ({}) has no kubernetes peer, skipping",
                    op.id, op.op_type
                );
                continue;
            };
            for manifest in manifests {
                documents.push(to_yaml(&manifest)?);
            }
        }
        Ok(documents.join("---\n"))
    }
}

fn metadata(op: &Operation, name: &str) -> Value {
    let mut meta = Params::new();
    meta.insert("name".into(), Value::String(name.to_string()));
    if let Some(namespace) = op.target.namespace() {
        meta.insert("namespace".into(), Value::String(namespace.to_string()));
    }
    Value::Object(meta)
}

fn name_of<'a>(op: &'a Operation) -> &'a str {
    op.param_str("name").unwrap_or(&op.id)
}

fn lower(op: &Operation) -> Option<Vec<Value>> {
    let name = name_of(op);
    let manifest = match &op.op_type {
        OpType::ContainerNamespaceCreate => json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": name},
        }),
        OpType::ContainerDeploymentCreate => {
            let labels = op
                .params
                .get("labels")
                .cloned()
                .unwrap_or_else(|| json!({"app": name}));
            let mut container = Params::new();
            container.insert("name".into(), Value::String(name.to_string()));
            if let Some(image) = op.params.get("image") {
                container.insert("image".into(), image.clone());
            }
            for key in ["ports", "env"] {
                if let Some(value) = op.params.get(key) {
                    container.insert(key.into(), value.clone());
                }
            }
            let deployment = json!({
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "metadata": metadata(op, name),
                "spec": {
                    "replicas": op.params.get("replicas").cloned().unwrap_or(json!(1)),
                    "selector": {"matchLabels": labels.clone()},
                    "template": {
                        "metadata": {"labels": labels.clone()},
                        "spec": {"containers": [Value::Object(container)]},
                    },
                },
            });

            // A `service` param block asks for a companion Service.
            if let Some(service) = op.params.get("service") {
                let ports = service
                    .get("ports")
                    .cloned()
                    .unwrap_or_else(|| json!([{"port": 80}]));
                let companion = json!({
                    "apiVersion": "v1",
                    "kind": "Service",
                    "metadata": metadata(op, name),
                    "spec": {
                        "selector": labels,
                        "ports": ports,
                    },
                });
                return Some(vec![deployment, companion]);
            }
            deployment
        }
        OpType::ContainerServiceCreate => json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": metadata(op, name),
            "spec": {
                "selector": op.params.get("selector").cloned().unwrap_or(json!({})),
                "ports": op.params.get("ports").cloned().unwrap_or(json!([])),
                "type": op.params.get("service_type").cloned().unwrap_or(json!("ClusterIP")),
            },
        }),
        OpType::ContainerConfigCreate => json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": metadata(op, name),
            "data": op.params.get("data").cloned().unwrap_or(json!({})),
        }),
        OpType::ContainerSecretCreate => json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": metadata(op, name),
            "type": op.params.get("secret_type").cloned().unwrap_or(json!("Opaque")),
            "data": op.params.get("data").cloned().unwrap_or(json!({})),
        }),
        OpType::ContainerRun => {
            let mut container = Params::new();
            container.insert("name".into(), Value::String(name.to_string()));
            if let Some(image) = op.params.get("image") {
                container.insert("image".into(), image.clone());
            }
            json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": metadata(op, name),
                "spec": {"containers": [Value::Object(container)]},
            })
        }
        // The IR user verb lowers to a ServiceAccount, name only.
        OpType::UserCreate => json!({
            "apiVersion": "v1",
            "kind": "ServiceAccount",
            "metadata": metadata(op, name),
        }),
        // File content survives as ConfigMap data keyed by basename.
        OpType::FileWrite => {
            let path = op.param_str("path").unwrap_or(&op.id);
            let basename = path.rsplit('/').next().unwrap_or(path);
            let config_name: String = basename
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
                .collect();
            json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": metadata(op, config_name.trim_matches('-')),
                "data": {
                    basename: op.params.get("content").cloned().unwrap_or(json!("")),
                },
            })
        }
        OpType::FirewallRule if op.target.namespace().is_some() => json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "NetworkPolicy",
            "metadata": metadata(op, name),
            "spec": {
                "podSelector": op.params.get("selector").cloned().unwrap_or(json!({})),
                "policyTypes": ["Ingress"],
            },
        }),
        OpType::LoadBalancerCreate => json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "Ingress",
            "metadata": metadata(op, name),
            "spec": {
                "rules": op.params.get("rules").cloned().unwrap_or(json!([])),
            },
        }),
        OpType::StorageVolumeCreate => json!({
            "apiVersion": "v1",
            "kind": "PersistentVolumeClaim",
            "metadata": metadata(op, name),
            "spec": {
                "accessModes": op.params.get("access_modes").cloned().unwrap_or(json!(["ReadWriteOnce"])),
                "resources": {
                    "requests": {
                        "storage": op.params.get("storage").cloned().unwrap_or(json!("1Gi")),
                    },
                },
            },
        }),
        OpType::CronCreate => {
            let schedule = op
                .param_str("schedule")
                .map(str::to_string)
                .unwrap_or_else(|| {
                    format!(
                        "{} {} * * *",
                        op.param_str("minute").unwrap_or("*"),
                        op.param_str("hour").unwrap_or("*"),
                    )
                });
            json!({
                "apiVersion": "batch/v1",
                "kind": "CronJob",
                "metadata": metadata(op, name),
                "spec": {
                    "schedule": schedule,
                    "jobTemplate": {
                        "spec": {
                            "template": {
                                "spec": {
                                    "containers": [{
                                        "name": name,
                                        "image": op.param_str("image").unwrap_or("busybox"),
                                        "command": ["/bin/sh", "-c", op.param_str("job").unwrap_or("true")],
                                    }],
                                    "restartPolicy": "OnFailure",
                                },
                            },
                        },
                    },
                },
            })
        }
        _ => return None,
    };
    Some(vec![manifest])
}
