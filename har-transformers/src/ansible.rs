//! Ansible playbook emitter.
//!
//! Lowers the graph into a single play with configurable `hosts` and
//! `become`. Package operations pick an OS-aware module from the target's
//! `os` field (or the `os` option); operations Ansible cannot express lower
//! to a `debug` task naming the original verb, so a playbook is always a
//! complete record of the graph.

use crate::{sorted_ops, to_yaml, DialectTransformer, TargetFormat, TransformError, TransformOptions};
use har_core::{Graph, OpType, Operation, Params, Value};
use serde_json::json;
use tracing::warn;

pub struct AnsibleTransformer;

impl DialectTransformer for AnsibleTransformer {
    fn format(&self) -> TargetFormat {
        TargetFormat::Ansible
    }

    fn transform(&self, graph: &Graph, opts: &TransformOptions) -> Result<String, TransformError> {
        let sorted = sorted_ops(graph)?;

        let mut tasks = Vec::new();
        for op in sorted {
            tasks.push(lower(op, opts));
        }

        let mut play = Params::new();
        play.insert(
            "hosts".into(),
            Value::String(opts.hosts.clone().unwrap_or_else(|| "all".to_string())),
        );
        if opts.r#become {
            play.insert("become".into(), Value::Bool(true));
        }
        play.insert("tasks".into(), Value::Array(tasks));

        to_yaml(&Value::Array(vec![Value::Object(play)]))
    }
}

/// Package manager module for an OS family.
fn package_module(os: Option<&str>) -> &'static str {
    match os {
        Some("debian") | Some("ubuntu") => "apt",
        Some("redhat") | Some("centos") | Some("oracle") => "yum",
        Some("fedora") | Some("rocky") | Some("alma") => "dnf",
        Some("suse") => "zypper",
        Some("alpine") => "apk",
        Some("arch") | Some("manjaro") => "pacman",
        Some("darwin") => "homebrew",
        Some("windows") => "win_chocolatey",
        _ => "package",
    }
}

fn task(op: &Operation, module: &str, args: Value) -> Value {
    let mut map = Params::new();
    let name = op
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} {}", op.op_type, op.id));
    map.insert("name".into(), Value::String(name));
    map.insert(module.to_string(), args);
    Value::Object(map)
}

fn copy_str(params: &Params, from: &str, to: &str, out: &mut Params) {
    if let Some(value) = params.get(from) {
        out.insert(to.to_string(), value.clone());
    }
}

fn lower(op: &Operation, opts: &TransformOptions) -> Value {
    let params = &op.params;
    match &op.op_type {
        OpType::PackageInstall | OpType::PackageUpgrade | OpType::PackageRemove => {
            let os = op.target.os().or(opts.os.as_deref());
            let module = package_module(os);
            let state = match op.op_type {
                OpType::PackageUpgrade => "latest",
                OpType::PackageRemove => "absent",
                _ => "present",
            };
            let mut args = Params::new();
            copy_str(params, "package", "name", &mut args);
            args.insert("state".into(), Value::String(state.to_string()));
            if module == "apt"
                && let Some(update) = params.get("update_cache")
            {
                args.insert("update_cache".into(), update.clone());
            }
            task(op, module, Value::Object(args))
        }
        OpType::ServiceStart
        | OpType::ServiceStop
        | OpType::ServiceRestart
        | OpType::ServiceEnable
        | OpType::ServiceDisable => {
            let mut args = Params::new();
            copy_str(params, "service", "name", &mut args);
            match op.op_type {
                OpType::ServiceStart => {
                    args.insert("state".into(), json!("started"));
                }
                OpType::ServiceStop => {
                    args.insert("state".into(), json!("stopped"));
                }
                OpType::ServiceRestart => {
                    args.insert("state".into(), json!("restarted"));
                }
                OpType::ServiceEnable => {
                    args.insert("enabled".into(), json!(true));
                }
                _ => {
                    args.insert("enabled".into(), json!(false));
                }
            }
            if op.op_type == OpType::ServiceStart
                && let Some(enabled) = params.get("enabled")
            {
                args.insert("enabled".into(), enabled.clone());
            }
            task(op, "service", Value::Object(args))
        }
        OpType::FileWrite | OpType::FileCopy => {
            let mut args = Params::new();
            copy_str(params, "path", "dest", &mut args);
            if params.contains_key("content") {
                copy_str(params, "content", "content", &mut args);
            } else {
                copy_str(params, "source", "src", &mut args);
            }
            copy_str(params, "mode", "mode", &mut args);
            copy_str(params, "owner", "owner", &mut args);
            copy_str(params, "group", "group", &mut args);
            task(op, "copy", Value::Object(args))
        }
        OpType::TemplateRender => {
            let mut args = Params::new();
            copy_str(params, "path", "dest", &mut args);
            copy_str(params, "source", "src", &mut args);
            copy_str(params, "mode", "mode", &mut args);
            task(op, "template", Value::Object(args))
        }
        OpType::DirectoryCreate => {
            let mut args = Params::new();
            copy_str(params, "path", "path", &mut args);
            args.insert("state".into(), json!("directory"));
            copy_str(params, "mode", "mode", &mut args);
            copy_str(params, "owner", "owner", &mut args);
            task(op, "file", Value::Object(args))
        }
        OpType::FileDelete | OpType::DirectoryDelete => {
            let mut args = Params::new();
            copy_str(params, "path", "path", &mut args);
            args.insert("state".into(), json!("absent"));
            task(op, "file", Value::Object(args))
        }
        OpType::SymlinkCreate => {
            let mut args = Params::new();
            copy_str(params, "path", "dest", &mut args);
            copy_str(params, "source", "src", &mut args);
            args.insert("state".into(), json!("link"));
            task(op, "file", Value::Object(args))
        }
        OpType::PermissionsSet => {
            let mut args = Params::new();
            copy_str(params, "path", "path", &mut args);
            copy_str(params, "mode", "mode", &mut args);
            copy_str(params, "owner", "owner", &mut args);
            copy_str(params, "group", "group", &mut args);
            task(op, "file", Value::Object(args))
        }
        OpType::UserCreate | OpType::UserRemove => {
            let mut args = Params::new();
            copy_str(params, "name", "name", &mut args);
            if op.op_type == OpType::UserRemove {
                args.insert("state".into(), json!("absent"));
            }
            copy_str(params, "shell", "shell", &mut args);
            copy_str(params, "groups", "groups", &mut args);
            copy_str(params, "home", "home", &mut args);
            task(op, "user", Value::Object(args))
        }
        OpType::GroupCreate | OpType::GroupRemove => {
            let mut args = Params::new();
            copy_str(params, "name", "name", &mut args);
            if op.op_type == OpType::GroupRemove {
                args.insert("state".into(), json!("absent"));
            }
            task(op, "group", Value::Object(args))
        }
        OpType::SshKeyDeploy => {
            let mut args = Params::new();
            copy_str(params, "user", "user", &mut args);
            copy_str(params, "key", "key", &mut args);
            task(op, "authorized_key", Value::Object(args))
        }
        OpType::CommandRun => {
            let module = if params.get("shell").and_then(Value::as_bool) == Some(true) {
                "shell"
            } else {
                "command"
            };
            let mut args = Params::new();
            copy_str(params, "command", "cmd", &mut args);
            copy_str(params, "chdir", "chdir", &mut args);
            copy_str(params, "creates", "creates", &mut args);
            task(op, module, Value::Object(args))
        }
        OpType::ScriptRun => {
            let mut args = Params::new();
            copy_str(params, "script", "cmd", &mut args);
            task(op, "script", Value::Object(args))
        }
        OpType::CronCreate | OpType::CronRemove => {
            let mut args = Params::new();
            copy_str(params, "name", "name", &mut args);
            copy_str(params, "job", "job", &mut args);
            for field in ["minute", "hour", "day", "month", "weekday", "user"] {
                copy_str(params, field, field, &mut args);
            }
            if op.op_type == OpType::CronRemove {
                args.insert("state".into(), json!("absent"));
            }
            task(op, "cron", Value::Object(args))
        }
        OpType::MountCreate => {
            let mut args = Params::new();
            copy_str(params, "path", "path", &mut args);
            copy_str(params, "device", "src", &mut args);
            copy_str(params, "fstype", "fstype", &mut args);
            args.insert("state".into(), json!("mounted"));
            task(op, "mount", Value::Object(args))
        }
        OpType::SysctlSet => {
            let mut args = Params::new();
            copy_str(params, "name", "name", &mut args);
            copy_str(params, "value", "value", &mut args);
            task(op, "sysctl", Value::Object(args))
        }
        OpType::HostnameSet => {
            let mut args = Params::new();
            copy_str(params, "hostname", "name", &mut args);
            task(op, "hostname", Value::Object(args))
        }
        OpType::HostEntry => {
            let line = format!(
                "{} {}",
                op.param_str("ip").unwrap_or_default(),
                op.param_str("hostname").unwrap_or_default()
            );
            task(
                op,
                "lineinfile",
                json!({"path": "/etc/hosts", "line": line}),
            )
        }
        OpType::TimezoneSet => {
            let mut args = Params::new();
            copy_str(params, "timezone", "name", &mut args);
            task(op, "timezone", Value::Object(args))
        }
        OpType::GitCheckout => {
            let mut args = Params::new();
            copy_str(params, "repo", "repo", &mut args);
            copy_str(params, "dest", "dest", &mut args);
            copy_str(params, "version", "version", &mut args);
            task(op, "git", Value::Object(args))
        }
        OpType::ArchiveExtract => {
            let mut args = Params::new();
            copy_str(params, "source", "src", &mut args);
            copy_str(params, "dest", "dest", &mut args);
            task(op, "unarchive", Value::Object(args))
        }
        OpType::HttpDownload => {
            let mut args = Params::new();
            copy_str(params, "url", "url", &mut args);
            copy_str(params, "dest", "dest", &mut args);
            task(op, "get_url", Value::Object(args))
        }
        OpType::FirewallRule => {
            let mut args = Params::new();
            copy_str(params, "rule", "rule", &mut args);
            copy_str(params, "port", "port", &mut args);
            copy_str(params, "proto", "proto", &mut args);
            if args.is_empty() {
                args.insert("rule".into(), json!("allow"));
            }
            task(op, "ufw", Value::Object(args))
        }
        // Cloud and container verbs have no Ansible peer here; a debug
        // task documents the passthrough instead of dropping the vertex.
        other => {
            warn!("operation {} ({}) has no ansible peer, emitting debug task", op.id, other);
            task(
                op,
                "debug",
                json!({"msg": format!("unsupported operation {other} ({})", op.id)}),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use har_core::Target;

    fn graph_with(op: Operation) -> Graph {
        let mut graph = Graph::new();
        graph.add_operation(op);
        graph
    }

    fn install_op(os: Option<&str>) -> Operation {
        let mut op = Operation::new("op_0", OpType::PackageInstall).with_param("package", "nginx");
        if let Some(os) = os {
            op = op.with_target(Target::new().with("os", os));
        }
        op
    }

    #[test]
    fn test_os_aware_package_module() {
        let opts = TransformOptions::new(TargetFormat::Ansible);

        let debian = AnsibleTransformer
            .transform(&graph_with(install_op(Some("debian"))), &opts)
            .unwrap();
        assert!(debian.contains("apt:"));
        assert!(debian.contains("state: present"));

        let alpine = AnsibleTransformer
            .transform(&graph_with(install_op(Some("alpine"))), &opts)
            .unwrap();
        assert!(alpine.contains("apk:"));

        let generic = AnsibleTransformer
            .transform(&graph_with(install_op(None)), &opts)
            .unwrap();
        assert!(generic.contains("package:"));
    }

    #[test]
    fn test_os_option_fallback() {
        let mut opts = TransformOptions::new(TargetFormat::Ansible);
        opts.os = Some("redhat".to_string());
        let out = AnsibleTransformer
            .transform(&graph_with(install_op(None)), &opts)
            .unwrap();
        assert!(out.contains("yum:"));
    }

    #[test]
    fn test_hosts_and_become() {
        let mut opts = TransformOptions::new(TargetFormat::Ansible);
        opts.hosts = Some("web".to_string());
        opts.r#become = true;
        let out = AnsibleTransformer
            .transform(&graph_with(install_op(None)), &opts)
            .unwrap();
        assert!(out.contains("hosts: web"));
        assert!(out.contains("become: true"));
    }

    #[test]
    fn test_unsupported_op_becomes_debug_task() {
        let op = Operation::new("op_0", OpType::ComputeInstanceCreate).with_param("name", "web");
        let out = AnsibleTransformer
            .transform(&graph_with(op), &TransformOptions::new(TargetFormat::Ansible))
            .unwrap();
        assert!(out.contains("debug:"));
        assert!(out.contains("compute_instance_create"));
    }

    #[test]
    fn test_empty_graph_emits_empty_play() {
        let out = AnsibleTransformer
            .transform(&Graph::new(), &TransformOptions::new(TargetFormat::Ansible))
            .unwrap();
        assert!(out.contains("hosts: all"));
        assert!(out.contains("tasks: []"));
    }

    #[test]
    fn test_cycle_is_fatal() {
        let mut graph = Graph::new();
        graph.add_operation(install_op(None));
        graph.add_operation(
            Operation::new("op_1", OpType::ServiceStart).with_param("service", "nginx"),
        );
        graph.add_dependency(har_core::Dependency::new("op_0", "op_1", har_core::DepKind::Requires));
        graph.add_dependency(har_core::Dependency::new("op_1", "op_0", har_core::DepKind::Requires));
        assert!(matches!(
            AnsibleTransformer.transform(&graph, &TransformOptions::new(TargetFormat::Ansible)),
            Err(TransformError::CircularDependency)
        ));
    }

    #[test]
    fn test_service_with_enabled_param() {
        let op = Operation::new("op_0", OpType::ServiceStart)
            .with_param("service", "nginx")
            .with_param("enabled", true);
        let out = AnsibleTransformer
            .transform(&graph_with(op), &TransformOptions::new(TargetFormat::Ansible))
            .unwrap();
        assert!(out.contains("state: started"));
        assert!(out.contains("enabled: true"));
    }
}
