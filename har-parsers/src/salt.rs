//! Salt SLS parser.
//!
//! An SLS document is a mapping from state id to `module.function` keys,
//! each carrying a list of single-key argument mappings. Requisites
//! (`require`, `watch`, `prereq`, and their `_in` inversions) become edges;
//! a requisite target like `pkg: nginx` is resolved by matching the module
//! prefix and principal-name parameter of previously parsed states, falling
//! back to the state id.

use crate::normalize::{package_state, service_state};
use crate::{apply_target_overlay, base_graph, yaml, DialectParser, ParseError, ParseOptions, SourceFormat};
use har_core::{DepKind, Dependency, Graph, OpType, Operation, Params, Value};
use tracing::debug;

pub struct SaltParser;

const FORMAT: SourceFormat = SourceFormat::Salt;

impl DialectParser for SaltParser {
    fn format(&self) -> SourceFormat {
        FORMAT
    }

    fn parse(&self, content: &str, opts: &ParseOptions) -> Result<Graph, ParseError> {
        let doc = yaml::parse_document(content)
            .map_err(|detail| ParseError::syntax(FORMAT, detail))?;
        let Value::Object(states) = doc else {
            return Err(ParseError::syntax(
                FORMAT,
                "expected a mapping of state ids at the top level",
            ));
        };

        let mut graph = base_graph(FORMAT);
        let mut counter = 0usize;
        // (op id, module prefix, principal name, state id) for requisite
        // resolution, plus deferred requisites to resolve after all states
        // are known.
        let mut parsed: Vec<ParsedState> = Vec::new();
        let mut requisites: Vec<PendingRequisite> = Vec::new();

        for (state_id, body) in &states {
            if state_id == "include" || state_id == "extend" {
                debug!("skipping top-level `{state_id}` directive");
                continue;
            }
            let Value::Object(body) = body else {
                continue;
            };
            for (module_key, raw_args) in body {
                let Some((module, function)) = module_key.split_once('.') else {
                    continue;
                };
                let id = format!("op_{counter}");
                counter += 1;

                let (args, reqs) = collect_args(raw_args);
                let (op_type, params) = normalize_state(module, function, state_id, args);
                let principal = principal_name(&op_type, &params, state_id);

                let op = Operation::new(&id, op_type)
                    .with_params(params)
                    .with_meta("source_format", "salt")
                    .with_meta("name", state_id.clone())
                    .with_meta("salt_module", module)
                    .with_meta("salt_function", function);
                let op = if op.op_type.is_passthrough() {
                    op.with_meta("raw", format!("{state_id}: {module_key}"))
                } else {
                    op
                };
                graph.add_operation(op);

                for req in reqs {
                    requisites.push(PendingRequisite {
                        op_id: id.clone(),
                        req,
                    });
                }
                parsed.push(ParsedState {
                    op_id: id,
                    module: module.to_string(),
                    principal,
                    state_id: state_id.clone(),
                });
            }
        }

        for pending in requisites {
            let Some(target_id) = resolve(&parsed, &pending.req.module, &pending.req.name) else {
                debug!(
                    "unresolvable {} requisite {}:{} on {}",
                    pending.req.keyword, pending.req.module, pending.req.name, pending.op_id
                );
                continue;
            };
            if target_id == pending.op_id {
                continue;
            }
            let (from, to, kind) = match pending.req.keyword.as_str() {
                "require" => (target_id, pending.op_id.clone(), DepKind::Requires),
                "watch" => (target_id, pending.op_id.clone(), DepKind::Watches),
                "prereq" => (target_id, pending.op_id.clone(), DepKind::Requires),
                "require_in" => (pending.op_id.clone(), target_id, DepKind::Requires),
                "watch_in" => (pending.op_id.clone(), target_id, DepKind::Watches),
                _ => continue,
            };
            let dep = Dependency::new(from, to, kind).with_reason(pending.req.keyword.clone());
            if !graph.dependencies().iter().any(|d| d.key() == dep.key()) {
                graph.add_dependency(dep);
            }
        }

        apply_target_overlay(&mut graph, opts);
        Ok(graph)
    }

    fn validate(&self, content: &str) -> Result<(), ParseError> {
        let doc = yaml::parse_document(content)
            .map_err(|detail| ParseError::syntax(FORMAT, detail))?;
        if doc.is_object() {
            Ok(())
        } else {
            Err(ParseError::syntax(FORMAT, "expected a top-level mapping"))
        }
    }
}

struct ParsedState {
    op_id: String,
    module: String,
    principal: Option<String>,
    state_id: String,
}

struct Requisite {
    keyword: String,
    module: String,
    name: String,
}

struct PendingRequisite {
    op_id: String,
    req: Requisite,
}

const REQUISITE_KEYWORDS: &[&str] = &["require", "watch", "prereq", "require_in", "watch_in"];

/// Split the argument list into plain args and requisite declarations.
fn collect_args(raw: &Value) -> (Params, Vec<Requisite>) {
    let mut args = Params::new();
    let mut reqs = Vec::new();

    let Value::Array(items) = raw else {
        // `pkg.installed: {}` or a bare null are both legal.
        if let Value::Object(map) = raw {
            return (map.clone(), reqs);
        }
        return (args, reqs);
    };

    for item in items {
        let Value::Object(map) = item else {
            continue;
        };
        for (key, value) in map {
            if REQUISITE_KEYWORDS.contains(&key.as_str()) {
                if let Value::Array(targets) = value {
                    for target in targets {
                        if let Value::Object(target) = target {
                            for (module, name) in target {
                                if let Some(name) = name.as_str() {
                                    reqs.push(Requisite {
                                        keyword: key.clone(),
                                        module: module.clone(),
                                        name: name.to_string(),
                                    });
                                }
                            }
                        }
                    }
                }
            } else {
                args.insert(key.clone(), value.clone());
            }
        }
    }
    (args, reqs)
}

/// Resolve a requisite target against prior states: module prefix plus
/// principal name, falling back to the state id. First match wins; two
/// states sharing a package name are not disambiguated.
fn resolve(parsed: &[ParsedState], module: &str, name: &str) -> Option<String> {
    parsed
        .iter()
        .find(|state| {
            state.module == module
                && (state.principal.as_deref() == Some(name) || state.state_id == name)
        })
        .or_else(|| parsed.iter().find(|state| state.state_id == name))
        .map(|state| state.op_id.clone())
}

/// The parameter that names the thing a state manages, used as the
/// requisite match key.
fn principal_name(op_type: &OpType, params: &Params, state_id: &str) -> Option<String> {
    let key = match op_type {
        OpType::PackageInstall | OpType::PackageUpgrade | OpType::PackageRemove => "package",
        OpType::ServiceStart
        | OpType::ServiceStop
        | OpType::ServiceRestart
        | OpType::ServiceEnable
        | OpType::ServiceDisable => "service",
        OpType::FileWrite
        | OpType::FileDelete
        | OpType::FileCopy
        | OpType::DirectoryCreate
        | OpType::SymlinkCreate => "path",
        OpType::CommandRun => "command",
        OpType::UserCreate | OpType::UserRemove | OpType::GroupCreate | OpType::GroupRemove => {
            "name"
        }
        _ => return Some(state_id.to_string()),
    };
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| Some(state_id.to_string()))
}

fn insert_principal(params: &mut Params, args: &mut Params, ir_key: &str, state_id: &str) {
    let value = args
        .remove("name")
        .unwrap_or_else(|| Value::String(state_id.to_string()));
    params.insert(ir_key.to_string(), value);
}

/// Map `module.function` to an IR verb and normalized params.
fn normalize_state(
    module: &str,
    function: &str,
    state_id: &str,
    mut args: Params,
) -> (OpType, Params) {
    let mut params = Params::new();
    let op_type = match (module, function) {
        ("pkg", func) => {
            insert_principal(&mut params, &mut args, "package", state_id);
            package_state(func).unwrap_or(OpType::PackageInstall)
        }
        ("service", func) => {
            insert_principal(&mut params, &mut args, "service", state_id);
            if let Some(enable) = args.remove("enable") {
                params.insert("enabled".into(), enable);
            }
            service_state(func).unwrap_or(OpType::ServiceStart)
        }
        ("file", "managed") => {
            insert_principal(&mut params, &mut args, "path", state_id);
            if let Some(source) = args.remove("source") {
                params.insert("source".into(), source);
            }
            if let Some(contents) = args.remove("contents") {
                params.insert("content".into(), contents);
            }
            OpType::FileWrite
        }
        ("file", "directory") => {
            insert_principal(&mut params, &mut args, "path", state_id);
            OpType::DirectoryCreate
        }
        ("file", "absent") => {
            insert_principal(&mut params, &mut args, "path", state_id);
            OpType::FileDelete
        }
        ("file", "symlink") => {
            insert_principal(&mut params, &mut args, "path", state_id);
            if let Some(target) = args.remove("target") {
                params.insert("source".into(), target);
            }
            OpType::SymlinkCreate
        }
        ("cmd", "run") => {
            insert_principal(&mut params, &mut args, "command", state_id);
            OpType::CommandRun
        }
        ("cmd", "script") => {
            insert_principal(&mut params, &mut args, "script", state_id);
            OpType::ScriptRun
        }
        ("user", "present") => {
            insert_principal(&mut params, &mut args, "name", state_id);
            OpType::UserCreate
        }
        ("user", "absent") => {
            insert_principal(&mut params, &mut args, "name", state_id);
            OpType::UserRemove
        }
        ("group", "present") => {
            insert_principal(&mut params, &mut args, "name", state_id);
            OpType::GroupCreate
        }
        ("group", "absent") => {
            insert_principal(&mut params, &mut args, "name", state_id);
            OpType::GroupRemove
        }
        ("cron", "present") => {
            insert_principal(&mut params, &mut args, "job", state_id);
            params.insert("name".into(), Value::String(state_id.to_string()));
            OpType::CronCreate
        }
        ("cron", "absent") => {
            params.insert("name".into(), Value::String(state_id.to_string()));
            OpType::CronRemove
        }
        ("mount", "mounted") => {
            insert_principal(&mut params, &mut args, "path", state_id);
            if let Some(device) = args.remove("device") {
                params.insert("device".into(), device);
            }
            OpType::MountCreate
        }
        ("sysctl", "present") => {
            insert_principal(&mut params, &mut args, "name", state_id);
            OpType::SysctlSet
        }
        ("host", "present") => {
            insert_principal(&mut params, &mut args, "hostname", state_id);
            OpType::HostEntry
        }
        ("timezone", "system") => {
            insert_principal(&mut params, &mut args, "timezone", state_id);
            OpType::TimezoneSet
        }
        ("git", "latest") | ("git", "cloned") => {
            insert_principal(&mut params, &mut args, "repo", state_id);
            if let Some(target) = args.remove("target") {
                params.insert("dest".into(), target);
            }
            OpType::GitCheckout
        }
        ("archive", "extracted") => {
            insert_principal(&mut params, &mut args, "dest", state_id);
            if let Some(source) = args.remove("source") {
                params.insert("source".into(), source);
            }
            OpType::ArchiveExtract
        }
        ("ssh_auth", "present") => {
            insert_principal(&mut params, &mut args, "key", state_id);
            if let Some(user) = args.remove("user") {
                params.insert("user".into(), user);
            }
            OpType::SshKeyDeploy
        }
        _ => OpType::Passthrough(format!("{module}.{function}")),
    };
    params.append(&mut args);
    (op_type, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Graph {
        SaltParser.parse(content, &ParseOptions::default()).unwrap()
    }

    const SLS: &str = r#"
nginx:
  pkg.installed: []
  service.running:
    - enable: true
    - require:
      - pkg: nginx
"#;

    #[test]
    fn test_pkg_and_service_with_require() {
        let graph = parse(SLS);
        assert_eq!(graph.operation_count(), 2);

        let pkg = &graph.operations()[0];
        assert_eq!(pkg.op_type, OpType::PackageInstall);
        assert_eq!(pkg.param_str("package"), Some("nginx"));

        let svc = &graph.operations()[1];
        assert_eq!(svc.op_type, OpType::ServiceStart);
        assert_eq!(svc.param_str("service"), Some("nginx"));
        assert_eq!(svc.params.get("enabled"), Some(&Value::Bool(true)));

        assert_eq!(graph.dependency_count(), 1);
        let dep = &graph.dependencies()[0];
        assert_eq!(dep.kind, DepKind::Requires);
        assert_eq!(dep.from, pkg.id);
        assert_eq!(dep.to, svc.id);
        graph.validate().unwrap();
    }

    #[test]
    fn test_watch_becomes_watches_edge() {
        let graph = parse(
            "config:\n  file.managed:\n    - name: /etc/app.conf\n    - contents: x\napp:\n  service.running:\n    - watch:\n      - file: /etc/app.conf\n",
        );
        let dep = &graph.dependencies()[0];
        assert_eq!(dep.kind, DepKind::Watches);
        assert_eq!(graph.find_operation(&dep.from).unwrap().op_type, OpType::FileWrite);
    }

    #[test]
    fn test_require_in_inverts_direction() {
        let graph = parse(
            "pkg_state:\n  pkg.installed:\n    - name: nginx\n    - require_in:\n      - service: nginx\nnginx:\n  service.running: []\n",
        );
        assert_eq!(graph.dependency_count(), 1);
        let dep = &graph.dependencies()[0];
        assert_eq!(dep.kind, DepKind::Requires);
        // package precedes service even though declared via require_in
        assert_eq!(graph.find_operation(&dep.from).unwrap().op_type, OpType::PackageInstall);
    }

    #[test]
    fn test_requisite_resolves_by_state_id() {
        let graph = parse(
            "install_tools:\n  pkg.installed:\n    - name: htop\nafter:\n  cmd.run:\n    - name: echo done\n    - require:\n      - pkg: install_tools\n",
        );
        assert_eq!(graph.dependency_count(), 1);
    }

    #[test]
    fn test_unresolvable_requisite_dropped() {
        let graph = parse(
            "solo:\n  cmd.run:\n    - name: echo hi\n    - require:\n      - pkg: missing\n",
        );
        assert_eq!(graph.dependency_count(), 0);
        graph.validate().unwrap();
    }

    #[test]
    fn test_unknown_module_passthrough() {
        let graph = parse("thing:\n  zfs.filesystem_present: []\n");
        assert_eq!(
            graph.operations()[0].op_type,
            OpType::Passthrough("zfs.filesystem_present".into())
        );
    }

    #[test]
    fn test_state_verb_from_function() {
        let graph = parse("old:\n  pkg.removed:\n    - name: telnet\n");
        assert_eq!(graph.operations()[0].op_type, OpType::PackageRemove);
    }

    #[test]
    fn test_non_mapping_is_fatal() {
        let err = SaltParser
            .parse("- just\n- a list\n", &ParseOptions::default())
            .unwrap_err();
        assert!(matches!(err, ParseError::Syntax { format: SourceFormat::Salt, .. }));
    }
}
