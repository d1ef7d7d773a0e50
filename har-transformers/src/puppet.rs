//! Puppet manifest emitter.
//!
//! Lowers the graph into resource declarations in topological order,
//! optionally wrapped in a named class. Ordering is carried by declaration
//! order alone; relationship metaparameters are not synthesized.

use crate::{sorted_ops, DialectTransformer, TargetFormat, TransformError, TransformOptions};
use har_core::{Graph, OpType, Operation, Value};
use tracing::warn;

pub struct PuppetTransformer;

impl DialectTransformer for PuppetTransformer {
    fn format(&self) -> TargetFormat {
        TargetFormat::Puppet
    }

    fn transform(&self, graph: &Graph, opts: &TransformOptions) -> Result<String, TransformError> {
        let sorted = sorted_ops(graph)?;

        let mut resources = Vec::new();
        for op in sorted {
            match lower(op) {
                Some(resource) => resources.push(resource),
                None => warn!("operation {} ({}) has no puppet peer, skipping", op.id, op.op_type),
            }
        }

        let body = resources.join("\n\n");
        let document = match &opts.class_name {
            Some(class_name) => {
                let indented: String = body
                    .lines()
                    .map(|line| {
                        if line.is_empty() {
                            String::from("\n")
                        } else {
                            format!("  {line}\n")
                        }
                    })
                    .collect();
                format!("class {class_name} {{\n{indented}}}\n")
            }
            None if body.is_empty() => String::new(),
            None => format!("{body}\n"),
        };
        Ok(document)
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "\\'")),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", rendered.join(", "))
        }
        other => format!("'{}'", other),
    }
}

struct ResourceBuilder {
    rtype: &'static str,
    title: String,
    attrs: Vec<(String, String)>,
}

impl ResourceBuilder {
    fn new(rtype: &'static str, title: impl Into<String>) -> Self {
        Self {
            rtype,
            title: title.into(),
            attrs: Vec::new(),
        }
    }

    fn attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attrs.push((key.to_string(), value.into()));
        self
    }

    fn attr_from(mut self, op: &Operation, param: &str, key: &str) -> Self {
        if let Some(value) = op.params.get(param) {
            self.attrs.push((key.to_string(), render_value(value)));
        }
        self
    }

    fn render(self) -> String {
        if self.attrs.is_empty() {
            return format!("{} {{ '{}': }}", self.rtype, self.title);
        }
        let width = self.attrs.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        let mut out = format!("{} {{ '{}':\n", self.rtype, self.title);
        for (key, value) in &self.attrs {
            out.push_str(&format!("  {key:width$} => {value},\n"));
        }
        out.push('}');
        out
    }
}

fn title_param<'a>(op: &'a Operation, key: &str) -> &'a str {
    op.param_str(key).unwrap_or(&op.id)
}

fn lower(op: &Operation) -> Option<String> {
    let resource = match &op.op_type {
        OpType::PackageInstall | OpType::PackageUpgrade | OpType::PackageRemove => {
            let ensure = match op.op_type {
                OpType::PackageUpgrade => "latest",
                OpType::PackageRemove => "absent",
                _ => "present",
            };
            ResourceBuilder::new("package", title_param(op, "package")).attr("ensure", ensure)
        }
        OpType::ServiceStart | OpType::ServiceRestart => {
            let mut builder = ResourceBuilder::new("service", title_param(op, "service"))
                .attr("ensure", "running");
            let enabled = op
                .params
                .get("enabled")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            builder = builder.attr("enable", enabled.to_string());
            builder
        }
        OpType::ServiceStop => {
            ResourceBuilder::new("service", title_param(op, "service")).attr("ensure", "stopped")
        }
        OpType::ServiceEnable => {
            ResourceBuilder::new("service", title_param(op, "service")).attr("enable", "true")
        }
        OpType::ServiceDisable => {
            ResourceBuilder::new("service", title_param(op, "service")).attr("enable", "false")
        }
        OpType::FileWrite | OpType::FileCopy | OpType::TemplateRender => {
            ResourceBuilder::new("file", title_param(op, "path"))
                .attr("ensure", "file")
                .attr_from(op, "content", "content")
                .attr_from(op, "source", "source")
                .attr_from(op, "mode", "mode")
                .attr_from(op, "owner", "owner")
                .attr_from(op, "group", "group")
        }
        OpType::DirectoryCreate => ResourceBuilder::new("file", title_param(op, "path"))
            .attr("ensure", "directory")
            .attr_from(op, "mode", "mode")
            .attr_from(op, "owner", "owner"),
        OpType::FileDelete | OpType::DirectoryDelete => {
            ResourceBuilder::new("file", title_param(op, "path")).attr("ensure", "absent")
        }
        OpType::SymlinkCreate => ResourceBuilder::new("file", title_param(op, "path"))
            .attr("ensure", "link")
            .attr_from(op, "source", "target"),
        OpType::PermissionsSet => ResourceBuilder::new("file", title_param(op, "path"))
            .attr_from(op, "mode", "mode")
            .attr_from(op, "owner", "owner")
            .attr_from(op, "group", "group"),
        OpType::UserCreate => ResourceBuilder::new("user", title_param(op, "name"))
            .attr("ensure", "present")
            .attr_from(op, "shell", "shell")
            .attr_from(op, "home", "home")
            .attr_from(op, "groups", "groups"),
        OpType::UserRemove => {
            ResourceBuilder::new("user", title_param(op, "name")).attr("ensure", "absent")
        }
        OpType::GroupCreate => {
            ResourceBuilder::new("group", title_param(op, "name")).attr("ensure", "present")
        }
        OpType::GroupRemove => {
            ResourceBuilder::new("group", title_param(op, "name")).attr("ensure", "absent")
        }
        OpType::SshKeyDeploy => {
            ResourceBuilder::new("ssh_authorized_key", title_param(op, "user"))
                .attr("ensure", "present")
                .attr_from(op, "user", "user")
                .attr_from(op, "key", "key")
        }
        OpType::CommandRun => ResourceBuilder::new("exec", &op.id)
            .attr_from(op, "command", "command")
            .attr_from(op, "chdir", "cwd"),
        OpType::CronCreate => ResourceBuilder::new("cron", title_param(op, "name"))
            .attr("ensure", "present")
            .attr_from(op, "job", "command")
            .attr_from(op, "minute", "minute")
            .attr_from(op, "hour", "hour"),
        OpType::CronRemove => {
            ResourceBuilder::new("cron", title_param(op, "name")).attr("ensure", "absent")
        }
        OpType::MountCreate => ResourceBuilder::new("mount", title_param(op, "path"))
            .attr("ensure", "mounted")
            .attr_from(op, "device", "device")
            .attr_from(op, "fstype", "fstype"),
        OpType::HostEntry => ResourceBuilder::new("host", title_param(op, "hostname"))
            .attr("ensure", "present")
            .attr_from(op, "ip", "ip"),
        OpType::GitCheckout => ResourceBuilder::new("vcsrepo", title_param(op, "dest"))
            .attr("ensure", "present")
            .attr("provider", "git")
            .attr_from(op, "repo", "source"),
        _ => return None,
    };
    Some(resource.render())
}
