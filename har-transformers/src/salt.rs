//! Salt SLS emitter.
//!
//! Lowers the graph into a state-id → module mapping, in topological order.
//! State ids come from the operation's user-given name (slugified) or a
//! `<verb>_<principal>` fallback, deduplicated with numeric suffixes.
//! Operations without a Salt peer are logged and skipped.

use crate::{sorted_ops, to_yaml, DialectTransformer, TargetFormat, TransformError, TransformOptions};
use har_core::{Graph, OpType, Operation, Params, Value};
use std::collections::HashSet;
use tracing::warn;

pub struct SaltTransformer;

impl DialectTransformer for SaltTransformer {
    fn format(&self) -> TargetFormat {
        TargetFormat::Salt
    }

    fn transform(&self, graph: &Graph, _opts: &TransformOptions) -> Result<String, TransformError> {
        let sorted = sorted_ops(graph)?;

        let mut document = Params::new();
        let mut used_ids: HashSet<String> = HashSet::new();
        for op in sorted {
            let Some((function, args)) = lower(op) else {
                warn!("operation {} ({}) has no salt peer, skipping", op.id, op.op_type);
                continue;
            };
            let state_id = unique_state_id(op, &mut used_ids);
            let mut body = Params::new();
            body.insert(function.to_string(), args);
            document.insert(state_id, Value::Object(body));
        }

        to_yaml(&Value::Object(document))
    }
}

fn slugify(text: &str) -> String {
    let slug: String = text
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    slug.trim_matches('_').to_string()
}

fn principal(op: &Operation) -> Option<&str> {
    for key in ["package", "service", "path", "name", "hostname"] {
        if let Some(value) = op.param_str(key) {
            return Some(value);
        }
    }
    None
}

fn unique_state_id(op: &Operation, used: &mut HashSet<String>) -> String {
    let base = op
        .name()
        .map(slugify)
        .filter(|slug| !slug.is_empty())
        .unwrap_or_else(|| match principal(op) {
            Some(name) => format!("{}_{}", op.op_type, slugify(name)),
            None => slugify(&op.id),
        });
    let mut candidate = base.clone();
    let mut suffix = 2;
    while !used.insert(candidate.clone()) {
        candidate = format!("{base}_{suffix}");
        suffix += 1;
    }
    candidate
}

/// Arguments as the SLS list-of-single-key-mappings convention.
fn args_list(pairs: Vec<(&str, Value)>) -> Value {
    Value::Array(
        pairs
            .into_iter()
            .map(|(key, value)| {
                let mut map = Params::new();
                map.insert(key.to_string(), value);
                Value::Object(map)
            })
            .collect(),
    )
}

fn param(op: &Operation, key: &str) -> Option<Value> {
    op.params.get(key).cloned()
}

fn lower(op: &Operation) -> Option<(&'static str, Value)> {
    let mut args: Vec<(&str, Value)> = Vec::new();
    let function = match &op.op_type {
        OpType::PackageInstall | OpType::PackageUpgrade | OpType::PackageRemove => {
            if let Some(name) = param(op, "package") {
                args.push(("name", name));
            }
            match op.op_type {
                OpType::PackageUpgrade => "pkg.latest",
                OpType::PackageRemove => "pkg.removed",
                _ => "pkg.installed",
            }
        }
        OpType::ServiceStart | OpType::ServiceRestart => {
            if let Some(name) = param(op, "service") {
                args.push(("name", name));
            }
            if let Some(enabled) = param(op, "enabled") {
                args.push(("enable", enabled));
            }
            "service.running"
        }
        OpType::ServiceStop => {
            if let Some(name) = param(op, "service") {
                args.push(("name", name));
            }
            "service.dead"
        }
        OpType::ServiceEnable => {
            if let Some(name) = param(op, "service") {
                args.push(("name", name));
            }
            "service.enabled"
        }
        OpType::ServiceDisable => {
            if let Some(name) = param(op, "service") {
                args.push(("name", name));
            }
            "service.disabled"
        }
        OpType::FileWrite | OpType::FileCopy | OpType::TemplateRender => {
            if let Some(path) = param(op, "path") {
                args.push(("name", path));
            }
            if let Some(content) = param(op, "content") {
                args.push(("contents", content));
            } else if let Some(source) = param(op, "source") {
                args.push(("source", source));
            }
            for key in ["mode", "user", "owner", "group"] {
                if let Some(value) = param(op, key) {
                    args.push((if key == "owner" { "user" } else { key }, value));
                }
            }
            "file.managed"
        }
        OpType::DirectoryCreate => {
            if let Some(path) = param(op, "path") {
                args.push(("name", path));
            }
            "file.directory"
        }
        OpType::FileDelete | OpType::DirectoryDelete => {
            if let Some(path) = param(op, "path") {
                args.push(("name", path));
            }
            "file.absent"
        }
        OpType::SymlinkCreate => {
            if let Some(path) = param(op, "path") {
                args.push(("name", path));
            }
            if let Some(source) = param(op, "source") {
                args.push(("target", source));
            }
            "file.symlink"
        }
        OpType::CommandRun => {
            if let Some(command) = param(op, "command") {
                args.push(("name", command));
            }
            if let Some(chdir) = param(op, "chdir") {
                args.push(("cwd", chdir));
            }
            "cmd.run"
        }
        OpType::ScriptRun => {
            if let Some(script) = param(op, "script") {
                args.push(("name", script));
            }
            "cmd.script"
        }
        OpType::UserCreate => {
            if let Some(name) = param(op, "name") {
                args.push(("name", name));
            }
            for key in ["shell", "home", "groups"] {
                if let Some(value) = param(op, key) {
                    args.push((key, value));
                }
            }
            "user.present"
        }
        OpType::UserRemove => {
            if let Some(name) = param(op, "name") {
                args.push(("name", name));
            }
            "user.absent"
        }
        OpType::GroupCreate => {
            if let Some(name) = param(op, "name") {
                args.push(("name", name));
            }
            "group.present"
        }
        OpType::GroupRemove => {
            if let Some(name) = param(op, "name") {
                args.push(("name", name));
            }
            "group.absent"
        }
        OpType::SshKeyDeploy => {
            if let Some(key) = param(op, "key") {
                args.push(("name", key));
            }
            if let Some(user) = param(op, "user") {
                args.push(("user", user));
            }
            "ssh_auth.present"
        }
        OpType::CronCreate => {
            if let Some(job) = param(op, "job") {
                args.push(("name", job));
            }
            for key in ["minute", "hour", "user"] {
                if let Some(value) = param(op, key) {
                    args.push((key, value));
                }
            }
            "cron.present"
        }
        OpType::CronRemove => {
            if let Some(name) = param(op, "name") {
                args.push(("name", name));
            }
            "cron.absent"
        }
        OpType::MountCreate => {
            if let Some(path) = param(op, "path") {
                args.push(("name", path));
            }
            if let Some(device) = param(op, "device") {
                args.push(("device", device));
            }
            if let Some(fstype) = param(op, "fstype") {
                args.push(("fstype", fstype));
            }
            "mount.mounted"
        }
        OpType::SysctlSet => {
            if let Some(name) = param(op, "name") {
                args.push(("name", name));
            }
            if let Some(value) = param(op, "value") {
                args.push(("value", value));
            }
            "sysctl.present"
        }
        OpType::HostEntry => {
            if let Some(hostname) = param(op, "hostname") {
                args.push(("name", hostname));
            }
            if let Some(ip) = param(op, "ip") {
                args.push(("ip", ip));
            }
            "host.present"
        }
        OpType::TimezoneSet => {
            if let Some(timezone) = param(op, "timezone") {
                args.push(("name", timezone));
            }
            "timezone.system"
        }
        OpType::GitCheckout => {
            if let Some(repo) = param(op, "repo") {
                args.push(("name", repo));
            }
            if let Some(dest) = param(op, "dest") {
                args.push(("target", dest));
            }
            "git.latest"
        }
        OpType::ArchiveExtract => {
            if let Some(dest) = param(op, "dest") {
                args.push(("name", dest));
            }
            if let Some(source) = param(op, "source") {
                args.push(("source", source));
            }
            "archive.extracted"
        }
        OpType::HttpDownload => {
            if let Some(dest) = param(op, "dest") {
                args.push(("name", dest));
            }
            if let Some(url) = param(op, "url") {
                args.push(("source", url));
                args.push(("skip_verify", Value::Bool(true)));
            }
            "file.managed"
        }
        _ => return None,
    };
    Some((function, args_list(args)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_then_service_order() {
        let mut graph = Graph::new();
        graph.add_operation(
            Operation::new("op_0", OpType::PackageInstall)
                .with_param("package", "nginx")
                .with_meta("name", "Install nginx"),
        );
        graph.add_operation(
            Operation::new("op_1", OpType::ServiceStart)
                .with_param("service", "nginx")
                .with_meta("name", "Start nginx"),
        );
        graph.add_dependency(har_core::Dependency::new(
            "op_0",
            "op_1",
            har_core::DepKind::Sequential,
        ));

        let out = SaltTransformer
            .transform(&graph, &TransformOptions::new(TargetFormat::Salt))
            .unwrap();
        assert!(out.contains("pkg.installed"));
        assert!(out.contains("service.running"));
        // the service state is listed after the package state
        assert!(out.find("pkg.installed").unwrap() < out.find("service.running").unwrap());
        assert!(out.contains("name: nginx"));
    }

    #[test]
    fn test_state_id_from_name_slug() {
        let mut graph = Graph::new();
        graph.add_operation(
            Operation::new("op_0", OpType::CommandRun)
                .with_param("command", "echo hi")
                .with_meta("name", "Say Hello World"),
        );
        let out = SaltTransformer
            .transform(&graph, &TransformOptions::new(TargetFormat::Salt))
            .unwrap();
        assert!(out.contains("say_hello_world:"));
    }

    #[test]
    fn test_duplicate_state_ids_suffixed() {
        let mut graph = Graph::new();
        for id in ["op_0", "op_1"] {
            graph.add_operation(
                Operation::new(id, OpType::PackageInstall)
                    .with_param("package", "nginx"),
            );
        }
        let out = SaltTransformer
            .transform(&graph, &TransformOptions::new(TargetFormat::Salt))
            .unwrap();
        assert!(out.contains("package_install_nginx:"));
        assert!(out.contains("package_install_nginx_2:"));
    }

    #[test]
    fn test_unsupported_op_skipped() {
        let mut graph = Graph::new();
        graph.add_operation(
            Operation::new("op_0", OpType::ComputeInstanceCreate).with_param("name", "web"),
        );
        graph.add_operation(
            Operation::new("op_1", OpType::PackageInstall).with_param("package", "vim"),
        );
        let out = SaltTransformer
            .transform(&graph, &TransformOptions::new(TargetFormat::Salt))
            .unwrap();
        assert!(!out.contains("web"));
        assert!(out.contains("pkg.installed"));
    }

    #[test]
    fn test_empty_graph_empty_document() {
        let out = SaltTransformer
            .transform(&Graph::new(), &TransformOptions::new(TargetFormat::Salt))
            .unwrap();
        assert_eq!(out.trim(), "{}");
    }
}
