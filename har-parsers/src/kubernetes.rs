//! Kubernetes manifest parser.
//!
//! Accepts multi-document YAML split on `---`. Each document's `kind` maps
//! to an IR verb; dependencies are synthesized from references: a Service
//! points at the first Deployment in insertion order, workloads point at the
//! ConfigMaps/Secrets they mount or inject, and namespaced resources point
//! at their Namespace document when it is present in the stream.

use crate::{apply_target_overlay, base_graph, yaml, DialectParser, ParseError, ParseOptions, SourceFormat};
use har_core::{DepKind, Dependency, Graph, OpType, Operation, Params, Target, Value};
use tracing::debug;

pub struct KubernetesParser;

const FORMAT: SourceFormat = SourceFormat::Kubernetes;

impl DialectParser for KubernetesParser {
    fn format(&self) -> SourceFormat {
        FORMAT
    }

    fn parse(&self, content: &str, opts: &ParseOptions) -> Result<Graph, ParseError> {
        let mut graph = base_graph(FORMAT);
        let mut docs: Vec<(String, String, Value)> = Vec::new(); // (id, kind, doc)

        for document in yaml::split_documents(content) {
            let doc = yaml::parse_document(&document)
                .map_err(|detail| ParseError::syntax(FORMAT, detail))?;
            let Value::Object(ref root) = doc else {
                return Err(ParseError::syntax(FORMAT, "manifest document must be a mapping"));
            };
            let Some(kind) = root.get("kind").and_then(Value::as_str) else {
                debug!("document without kind, skipping");
                continue;
            };
            let name = root
                .get("metadata")
                .and_then(|m| m.get("name"))
                .and_then(Value::as_str)
                .unwrap_or("unnamed")
                .to_string();
            let namespace = root
                .get("metadata")
                .and_then(|m| m.get("namespace"))
                .and_then(Value::as_str)
                .map(str::to_string);

            let id = format!("{}/{}", kind.to_lowercase(), name);
            let kind = kind.to_string();
            let op = build_operation(&id, &kind, &name, namespace.as_deref(), root);
            graph.add_operation(op);
            docs.push((id, kind, doc));
        }

        synthesize_edges(&mut graph, &docs);
        apply_target_overlay(&mut graph, opts);
        Ok(graph)
    }

    fn validate(&self, content: &str) -> Result<(), ParseError> {
        for document in yaml::split_documents(content) {
            yaml::parse_document(&document)
                .map_err(|detail| ParseError::syntax(FORMAT, detail))?;
        }
        Ok(())
    }
}

fn first_container(root: &Params) -> Option<&Value> {
    root.get("spec")
        .and_then(|spec| {
            spec.get("template")
                .and_then(|t| t.get("spec"))
                .or(Some(spec))
        })
        .and_then(|pod_spec| pod_spec.get("containers"))
        .and_then(Value::as_array)
        .and_then(|containers| containers.first())
}

fn build_operation(
    id: &str,
    kind: &str,
    name: &str,
    namespace: Option<&str>,
    root: &Params,
) -> Operation {
    let spec = root.get("spec");
    let mut params = Params::new();
    params.insert("name".into(), Value::String(name.to_string()));

    let op_type = match kind {
        "Namespace" => OpType::ContainerNamespaceCreate,
        "Deployment" | "StatefulSet" | "DaemonSet" => {
            if let Some(container) = first_container(root) {
                if let Some(image) = container.get("image") {
                    params.insert("image".into(), image.clone());
                }
                if let Some(ports) = container.get("ports") {
                    params.insert("ports".into(), ports.clone());
                }
                if let Some(env) = container.get("env") {
                    params.insert("env".into(), env.clone());
                }
            }
            if let Some(replicas) = spec.and_then(|s| s.get("replicas")) {
                params.insert("replicas".into(), replicas.clone());
            }
            if let Some(labels) = spec
                .and_then(|s| s.get("selector"))
                .and_then(|s| s.get("matchLabels"))
            {
                params.insert("labels".into(), labels.clone());
            }
            if kind != "Deployment" {
                params.insert("workload".into(), Value::String(kind.to_lowercase()));
            }
            OpType::ContainerDeploymentCreate
        }
        "Pod" | "Job" => {
            if let Some(container) = first_container(root)
                && let Some(image) = container.get("image")
            {
                params.insert("image".into(), image.clone());
            }
            OpType::ContainerRun
        }
        "CronJob" => {
            if let Some(schedule) = spec.and_then(|s| s.get("schedule")) {
                params.insert("schedule".into(), schedule.clone());
            }
            params.insert("job".into(), Value::String(name.to_string()));
            OpType::CronCreate
        }
        "Service" => {
            if let Some(selector) = spec.and_then(|s| s.get("selector")) {
                params.insert("selector".into(), selector.clone());
            }
            if let Some(ports) = spec.and_then(|s| s.get("ports")) {
                params.insert("ports".into(), ports.clone());
            }
            if let Some(service_type) = spec.and_then(|s| s.get("type")) {
                params.insert("service_type".into(), service_type.clone());
            }
            OpType::ContainerServiceCreate
        }
        "ConfigMap" => {
            if let Some(data) = root.get("data") {
                params.insert("data".into(), data.clone());
            }
            OpType::ContainerConfigCreate
        }
        "Secret" => {
            if let Some(secret_type) = root.get("type") {
                params.insert("secret_type".into(), secret_type.clone());
            }
            if let Some(data) = root.get("data") {
                params.insert("data".into(), data.clone());
            }
            OpType::ContainerSecretCreate
        }
        "ServiceAccount" => OpType::UserCreate,
        "Ingress" => {
            if let Some(rules) = spec.and_then(|s| s.get("rules")) {
                params.insert("rules".into(), rules.clone());
            }
            OpType::LoadBalancerCreate
        }
        "PersistentVolumeClaim" => {
            if let Some(storage) = spec
                .and_then(|s| s.get("resources"))
                .and_then(|r| r.get("requests"))
                .and_then(|r| r.get("storage"))
            {
                params.insert("storage".into(), storage.clone());
            }
            if let Some(modes) = spec.and_then(|s| s.get("accessModes")) {
                params.insert("access_modes".into(), modes.clone());
            }
            OpType::StorageVolumeCreate
        }
        other => OpType::Passthrough(format!("k8s_{}", other.to_lowercase())),
    };

    let mut target = Target::new();
    if let Some(namespace) = namespace {
        target = target.with("namespace", namespace);
    }

    let mut op = Operation::new(id, op_type)
        .with_params(params)
        .with_target(target)
        .with_meta("source_format", "kubernetes")
        .with_meta("name", name)
        .with_meta("kind", kind);
    if op.op_type.is_passthrough() {
        op = op.with_meta(
            "raw",
            serde_json::to_string(&Value::Object(root.clone())).unwrap_or_default(),
        );
    }
    op
}

fn synthesize_edges(graph: &mut Graph, docs: &[(String, String, Value)]) {
    let mut edges: Vec<Dependency> = Vec::new();

    let first_deployment = docs
        .iter()
        .find(|(_, kind, _)| kind == "Deployment")
        .map(|(id, _, _)| id.clone());
    let namespace_ids: Vec<(String, String)> = docs
        .iter()
        .filter(|(_, kind, _)| kind == "Namespace")
        .filter_map(|(id, _, doc)| {
            doc.get("metadata")
                .and_then(|m| m.get("name"))
                .and_then(Value::as_str)
                .map(|name| (name.to_string(), id.clone()))
        })
        .collect();

    for (id, kind, doc) in docs {
        // Service → Deployment: first deployment in insertion order; label
        // matching is a known imprecision left on the table.
        if kind == "Service"
            && let Some(deployment_id) = &first_deployment
        {
            edges.push(
                Dependency::new(deployment_id.clone(), id.clone(), DepKind::Requires)
                    .with_reason("service selector"),
            );
        }

        // Workload → ConfigMap/Secret references.
        if matches!(kind.as_str(), "Deployment" | "StatefulSet" | "DaemonSet" | "Pod" | "Job") {
            let mut refs = Vec::new();
            collect_refs(doc, &mut refs);
            for (ref_kind, ref_name) in refs {
                let ref_id = format!("{ref_kind}/{ref_name}");
                if docs.iter().any(|(other, _, _)| *other == ref_id) {
                    edges.push(
                        Dependency::new(&ref_id, id, DepKind::Requires)
                            .with_reason("mounted reference"),
                    );
                }
            }
        }

        // Namespaced resource → its Namespace document.
        if kind != "Namespace"
            && let Some(namespace) = doc
                .get("metadata")
                .and_then(|m| m.get("namespace"))
                .and_then(Value::as_str)
            && let Some((_, namespace_id)) =
                namespace_ids.iter().find(|(name, _)| name == namespace)
        {
            edges.push(
                Dependency::new(namespace_id.clone(), id.clone(), DepKind::Requires)
                    .with_reason("namespace"),
            );
        }
    }

    for dep in edges {
        if !graph.dependencies().iter().any(|d| d.key() == dep.key()) {
            graph.add_dependency(dep);
        }
    }
}

/// Walk a manifest tree collecting ConfigMap/Secret references from env
/// injection and volume mounts.
fn collect_refs(value: &Value, out: &mut Vec<(&'static str, String)>) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                match key.as_str() {
                    "configMapRef" | "configMapKeyRef" => {
                        if let Some(name) = inner.get("name").and_then(Value::as_str) {
                            out.push(("configmap", name.to_string()));
                        }
                    }
                    "secretRef" | "secretKeyRef" => {
                        if let Some(name) = inner.get("name").and_then(Value::as_str) {
                            out.push(("secret", name.to_string()));
                        }
                    }
                    "configMap" => {
                        if let Some(name) = inner.get("name").and_then(Value::as_str) {
                            out.push(("configmap", name.to_string()));
                        }
                    }
                    "secret" => {
                        if let Some(name) = inner.get("secretName").and_then(Value::as_str) {
                            out.push(("secret", name.to_string()));
                        }
                    }
                    _ => {}
                }
                collect_refs(inner, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_refs(item, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Graph {
        KubernetesParser
            .parse(content, &ParseOptions::default())
            .unwrap()
    }

    const MANIFESTS: &str = r#"
apiVersion: v1
kind: Namespace
metadata:
  name: web
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: app
  namespace: web
spec:
  replicas: 2
  selector:
    matchLabels:
      app: app
  template:
    spec:
      containers:
        - name: app
          image: example/app:1.2
          envFrom:
            - configMapRef:
                name: app-config
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: app-config
  namespace: web
data:
  LOG_LEVEL: info
---
apiVersion: v1
kind: Service
metadata:
  name: app
  namespace: web
spec:
  selector:
    app: app
  ports:
    - port: 80
"#;

    #[test]
    fn test_kinds_mapped() {
        let graph = parse(MANIFESTS);
        assert_eq!(graph.operation_count(), 4);
        assert_eq!(
            graph.find_operation("namespace/web").unwrap().op_type,
            OpType::ContainerNamespaceCreate
        );
        let deployment = graph.find_operation("deployment/app").unwrap();
        assert_eq!(deployment.op_type, OpType::ContainerDeploymentCreate);
        assert_eq!(deployment.param_str("image"), Some("example/app:1.2"));
        assert_eq!(deployment.target.namespace(), Some("web"));
        assert_eq!(
            graph.find_operation("service/app").unwrap().op_type,
            OpType::ContainerServiceCreate
        );
    }

    #[test]
    fn test_reference_edges() {
        let graph = parse(MANIFESTS);

        // configmap precedes the deployment that mounts it
        assert!(graph.dependencies().iter().any(|d| {
            d.from == "configmap/app-config" && d.to == "deployment/app" && d.kind == DepKind::Requires
        }));
        // service points at the first deployment
        assert!(graph
            .dependencies()
            .iter()
            .any(|d| d.from == "deployment/app" && d.to == "service/app"));
        // namespaced resources depend on the namespace document
        assert!(graph
            .dependencies()
            .iter()
            .any(|d| d.from == "namespace/web" && d.to == "deployment/app"));

        // install order is valid: namespace first, service last
        let order: Vec<_> = graph
            .topological_sort()
            .unwrap()
            .iter()
            .map(|op| op.id.clone())
            .collect();
        assert_eq!(order.first().map(String::as_str), Some("namespace/web"));
        assert!(order.iter().position(|id| id == "deployment/app").unwrap()
            < order.iter().position(|id| id == "service/app").unwrap());
    }

    #[test]
    fn test_secret_volume_reference() {
        let graph = parse(
            "apiVersion: v1\nkind: Secret\nmetadata:\n  name: tls\n---\napiVersion: v1\nkind: Pod\nmetadata:\n  name: proxy\nspec:\n  containers:\n    - name: proxy\n      image: nginx\n  volumes:\n    - name: certs\n      secret:\n        secretName: tls\n",
        );
        assert!(graph
            .dependencies()
            .iter()
            .any(|d| d.from == "secret/tls" && d.to == "pod/proxy"));
    }

    #[test]
    fn test_service_account_maps_to_user() {
        let graph = parse("apiVersion: v1\nkind: ServiceAccount\nmetadata:\n  name: deployer\n");
        assert_eq!(graph.operations()[0].op_type, OpType::UserCreate);
    }

    #[test]
    fn test_unknown_kind_passthrough() {
        let graph = parse("apiVersion: v1\nkind: LimitRange\nmetadata:\n  name: limits\n");
        let op = &graph.operations()[0];
        assert_eq!(op.op_type, OpType::Passthrough("k8s_limitrange".into()));
        assert!(op.metadata.contains_key("raw"));
    }

    #[test]
    fn test_document_without_kind_skipped() {
        let graph = parse("just: yaml\n---\napiVersion: v1\nkind: Namespace\nmetadata:\n  name: x\n");
        assert_eq!(graph.operation_count(), 1);
    }

    #[test]
    fn test_malformed_document_fatal() {
        assert!(KubernetesParser
            .parse("kind: [unclosed\n", &ParseOptions::default())
            .is_err());
    }
}
