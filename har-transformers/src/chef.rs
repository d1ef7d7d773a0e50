//! Chef recipe emitter.
//!
//! Lowers the graph into resource blocks in topological order, headed by a
//! comment naming the cookbook. Operations without a Chef peer are logged
//! and skipped.

use crate::{sorted_ops, DialectTransformer, TargetFormat, TransformError, TransformOptions};
use har_core::{Graph, OpType, Operation, Value};
use tracing::warn;

pub struct ChefTransformer;

impl DialectTransformer for ChefTransformer {
    fn format(&self) -> TargetFormat {
        TargetFormat::Chef
    }

    fn transform(&self, graph: &Graph, opts: &TransformOptions) -> Result<String, TransformError> {
        let sorted = sorted_ops(graph)?;
        let cookbook = opts.cookbook.as_deref().unwrap_or("generated");

        let mut blocks = Vec::new();
        for op in sorted {
            match lower(op) {
                Some(block) => blocks.push(block),
                None => warn!("operation {} ({}) has no chef peer, skipping", op.id, op.op_type),
            }
        }

        let mut out = format!("# Cookbook:: {cookbook}\n# Recipe:: default\n");
        if !blocks.is_empty() {
            out.push('\n');
            out.push_str(&blocks.join("\n\n"));
            out.push('\n');
        }
        Ok(out)
    }
}

fn ruby_value(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "\\'")),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(ruby_value).collect();
            format!("[{}]", rendered.join(", "))
        }
        other => format!("'{}'", other),
    }
}

struct BlockBuilder {
    rtype: &'static str,
    title: String,
    lines: Vec<String>,
    actions: Vec<&'static str>,
}

impl BlockBuilder {
    fn new(rtype: &'static str, title: impl Into<String>) -> Self {
        Self {
            rtype,
            title: title.into(),
            lines: Vec::new(),
            actions: Vec::new(),
        }
    }

    fn action(mut self, action: &'static str) -> Self {
        self.actions.push(action);
        self
    }

    fn attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.lines.push(format!("{key} {}", value.into()));
        self
    }

    fn attr_from(mut self, op: &Operation, param: &str, key: &str) -> Self {
        if let Some(value) = op.params.get(param) {
            self.lines.push(format!("{key} {}", ruby_value(value)));
        }
        self
    }

    fn render(self) -> String {
        let mut out = format!("{} '{}' do\n", self.rtype, self.title.replace('\'', "\\'"));
        for line in &self.lines {
            out.push_str(&format!("  {line}\n"));
        }
        match self.actions.as_slice() {
            [] => {}
            [single] => out.push_str(&format!("  action :{single}\n")),
            many => {
                let symbols: Vec<String> = many.iter().map(|a| format!(":{a}")).collect();
                out.push_str(&format!("  action [{}]\n", symbols.join(", ")));
            }
        }
        out.push_str("end");
        out
    }
}

fn title_param<'a>(op: &'a Operation, key: &str) -> &'a str {
    op.param_str(key).unwrap_or(&op.id)
}

fn lower(op: &Operation) -> Option<String> {
    let block = match &op.op_type {
        OpType::PackageInstall => {
            BlockBuilder::new("package", title_param(op, "package")).action("install")
        }
        OpType::PackageUpgrade => {
            BlockBuilder::new("package", title_param(op, "package")).action("upgrade")
        }
        OpType::PackageRemove => {
            BlockBuilder::new("package", title_param(op, "package")).action("remove")
        }
        OpType::ServiceStart => {
            let mut builder = BlockBuilder::new("service", title_param(op, "service"));
            if op.params.get("enabled").and_then(Value::as_bool) != Some(false) {
                builder = builder.action("enable");
            }
            builder.action("start")
        }
        OpType::ServiceStop => {
            BlockBuilder::new("service", title_param(op, "service")).action("stop")
        }
        OpType::ServiceRestart => {
            BlockBuilder::new("service", title_param(op, "service")).action("restart")
        }
        OpType::ServiceEnable => {
            BlockBuilder::new("service", title_param(op, "service")).action("enable")
        }
        OpType::ServiceDisable => {
            BlockBuilder::new("service", title_param(op, "service")).action("disable")
        }
        OpType::FileWrite | OpType::FileCopy => {
            BlockBuilder::new("file", title_param(op, "path"))
                .attr_from(op, "content", "content")
                .attr_from(op, "mode", "mode")
                .attr_from(op, "owner", "owner")
                .attr_from(op, "group", "group")
        }
        OpType::TemplateRender => BlockBuilder::new("template", title_param(op, "path"))
            .attr_from(op, "source", "source")
            .attr_from(op, "mode", "mode"),
        OpType::DirectoryCreate => BlockBuilder::new("directory", title_param(op, "path"))
            .attr_from(op, "mode", "mode")
            .attr_from(op, "owner", "owner"),
        OpType::FileDelete => {
            BlockBuilder::new("file", title_param(op, "path")).action("delete")
        }
        OpType::DirectoryDelete => {
            BlockBuilder::new("directory", title_param(op, "path")).action("delete")
        }
        OpType::SymlinkCreate => BlockBuilder::new("link", title_param(op, "path"))
            .attr_from(op, "source", "to"),
        OpType::UserCreate => BlockBuilder::new("user", title_param(op, "name"))
            .attr_from(op, "shell", "shell")
            .attr_from(op, "home", "home"),
        OpType::UserRemove => {
            BlockBuilder::new("user", title_param(op, "name")).action("remove")
        }
        OpType::GroupCreate => BlockBuilder::new("group", title_param(op, "name")),
        OpType::GroupRemove => {
            BlockBuilder::new("group", title_param(op, "name")).action("remove")
        }
        OpType::CommandRun => BlockBuilder::new("execute", &op.id)
            .attr_from(op, "command", "command")
            .attr_from(op, "chdir", "cwd"),
        OpType::ScriptRun => BlockBuilder::new("bash", &op.id).attr_from(op, "script", "code"),
        OpType::CronCreate => BlockBuilder::new("cron", title_param(op, "name"))
            .attr_from(op, "job", "command")
            .attr_from(op, "minute", "minute")
            .attr_from(op, "hour", "hour"),
        OpType::CronRemove => {
            BlockBuilder::new("cron", title_param(op, "name")).action("delete")
        }
        OpType::GitCheckout => BlockBuilder::new("git", title_param(op, "dest"))
            .attr_from(op, "repo", "repository"),
        OpType::HttpDownload => BlockBuilder::new("remote_file", title_param(op, "dest"))
            .attr_from(op, "url", "source"),
        OpType::MountCreate => BlockBuilder::new("mount", title_param(op, "path"))
            .attr_from(op, "device", "device")
            .action("mount"),
        _ => return None,
    };
    Some(block.render())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> TransformOptions {
        TransformOptions::new(TargetFormat::Chef)
    }

    #[test]
    fn test_header_and_blocks() {
        let mut graph = Graph::new();
        graph.add_operation(
            Operation::new("op_0", OpType::PackageInstall).with_param("package", "nginx"),
        );
        graph.add_operation(
            Operation::new("op_1", OpType::ServiceStart)
                .with_param("service", "nginx")
                .with_param("enabled", true),
        );

        let mut chef_opts = opts();
        chef_opts.cookbook = Some("webserver".to_string());
        let out = ChefTransformer.transform(&graph, &chef_opts).unwrap();

        assert!(out.starts_with("# Cookbook:: webserver"));
        assert!(out.contains("package 'nginx' do\n  action :install\nend"));
        assert!(out.contains("service 'nginx' do\n  action [:enable, :start]\nend"));
    }

    #[test]
    fn test_file_block_attrs() {
        let mut graph = Graph::new();
        graph.add_operation(
            Operation::new("op_0", OpType::FileWrite)
                .with_param("path", "/etc/motd")
                .with_param("content", "hello")
                .with_param("mode", "0644"),
        );
        let out = ChefTransformer.transform(&graph, &opts()).unwrap();
        assert!(out.contains("file '/etc/motd' do"));
        assert!(out.contains("content 'hello'"));
        assert!(out.contains("mode '0644'"));
    }

    #[test]
    fn test_unsupported_skipped_with_header_kept() {
        let mut graph = Graph::new();
        graph.add_operation(
            Operation::new("op_0", OpType::StorageBucketCreate).with_param("bucket", "logs"),
        );
        let out = ChefTransformer.transform(&graph, &opts()).unwrap();
        assert!(out.starts_with("# Cookbook:: generated"));
        assert!(!out.contains("logs"));
    }
}
