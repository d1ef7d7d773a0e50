//! Chef recipe parser.
//!
//! A regex-lexed reader of the declarative subset of the Chef DSL: resource
//! blocks (`package 'nginx' do ... end`), their attribute lines, and
//! notification wiring (`notifies`/`subscribes`). Declarations without
//! explicit wiring keep their recipe order through `sequential` edges.
//! Ruby control flow, loops, and attribute interpolation are beyond this
//! reader; the graph marks itself `regex`.

use crate::normalize::package_state;
use crate::{apply_target_overlay, base_graph, DialectParser, ParseError, ParseOptions, SourceFormat};
use har_core::{DepKind, Dependency, Graph, OpType, Operation, Params, Value};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

pub struct ChefParser;

const FORMAT: SourceFormat = SourceFormat::Chef;

fn block_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*([a-z][a-z0-9_]*)\s+['"]([^'"]+)['"]\s+do\s*$"#).expect("static regex")
    })
}

fn oneliner_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*([a-z][a-z0-9_]*)\s+['"]([^'"]+)['"]\s*$"#).expect("static regex")
    })
}

fn notification_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^([a-z_]+)\[(.+)\]$"#).expect("static regex"))
}

/// Lines that open a nested Ruby block and therefore need an extra `end`.
fn opens_block(line: &str) -> bool {
    line.ends_with(" do") || (line.contains(" do |") && line.ends_with('|'))
}

impl DialectParser for ChefParser {
    fn format(&self) -> SourceFormat {
        FORMAT
    }

    fn parse(&self, content: &str, opts: &ParseOptions) -> Result<Graph, ParseError> {
        let mut graph = base_graph(FORMAT).with_metadata("parser", "regex");

        // (resource type, title) -> op id, for notification resolution.
        let mut by_ref: HashMap<(String, String), String> = HashMap::new();
        // (op id, keyword, target type, target title)
        let mut notifications: Vec<(String, String, String, String)> = Vec::new();
        let mut order: Vec<String> = Vec::new();

        let lines: Vec<&str> = content.lines().collect();
        let mut idx = 0;
        while idx < lines.len() {
            let line = lines[idx];
            idx += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let (rtype, title, body) = if let Some(caps) = block_start_re().captures(line) {
                let mut depth = 1usize;
                let mut body: Vec<String> = Vec::new();
                while idx < lines.len() && depth > 0 {
                    let inner = lines[idx].trim().to_string();
                    idx += 1;
                    if inner == "end" {
                        depth -= 1;
                        continue;
                    }
                    if opens_block(&inner) {
                        depth += 1;
                        continue;
                    }
                    // Attribute lines live at the resource level only;
                    // nested guard blocks are skipped whole.
                    if depth == 1 {
                        body.push(inner);
                    }
                }
                (caps[1].to_string(), caps[2].to_string(), body)
            } else if let Some(caps) = oneliner_re().captures(line) {
                (caps[1].to_string(), caps[2].to_string(), Vec::new())
            } else {
                continue;
            };

            let id = format!("{rtype}.{title}");
            if by_ref.contains_key(&(rtype.clone(), title.clone())) {
                debug!("duplicate resource {rtype}[{title}], keeping first");
                continue;
            }

            let mut attrs = Params::new();
            let mut actions: Vec<String> = Vec::new();
            for body_line in &body {
                if let Some(rest) = body_line.strip_prefix("action ") {
                    actions.extend(parse_symbol_list(rest));
                } else if let Some(rest) = body_line.strip_prefix("notifies ") {
                    if let Some((target_type, target_title)) = parse_notification(rest) {
                        notifications.push((id.clone(), "notifies".into(), target_type, target_title));
                    }
                } else if let Some(rest) = body_line.strip_prefix("subscribes ") {
                    if let Some((target_type, target_title)) = parse_notification(rest) {
                        notifications.push((id.clone(), "subscribes".into(), target_type, target_title));
                    }
                } else if let Some((key, value)) = split_attribute(body_line) {
                    attrs.insert(key, value);
                }
            }

            let op = normalize_resource(&rtype, &title, &id, attrs, &actions);
            by_ref.insert((rtype, title), id.clone());
            order.push(id);
            graph.add_operation(op);
        }

        // Notification chains.
        for (op_id, keyword, target_type, target_title) in notifications {
            let Some(target_id) = by_ref.get(&(target_type.clone(), target_title.clone())) else {
                debug!("unresolved {keyword} target {target_type}[{target_title}] on {op_id}");
                continue;
            };
            let (from, to, kind) = match keyword.as_str() {
                // The notifying resource converges first, then the target.
                "notifies" => (op_id, target_id.clone(), DepKind::Notifies),
                // Subscribing inverts: the subscribed-to resource goes first.
                _ => (target_id.clone(), op_id, DepKind::Watches),
            };
            let dep = Dependency::new(from, to, kind).with_reason(keyword);
            if !graph.dependencies().iter().any(|d| d.key() == dep.key()) {
                graph.add_dependency(dep);
            }
        }

        // Recipe order for declarations without explicit wiring.
        for pair in order.windows(2) {
            let wired = graph.dependencies().iter().any(|d| {
                (d.from == pair[0] && d.to == pair[1]) || (d.from == pair[1] && d.to == pair[0])
            });
            if !wired {
                graph.add_dependency(
                    Dependency::new(&pair[0], &pair[1], DepKind::Sequential)
                        .with_reason("recipe order"),
                );
            }
        }

        apply_target_overlay(&mut graph, opts);
        Ok(graph)
    }

    fn validate(&self, content: &str) -> Result<(), ParseError> {
        let opens = content
            .lines()
            .filter(|line| block_start_re().is_match(line) || opens_block(line.trim()))
            .count();
        let ends = content.lines().filter(|line| line.trim() == "end").count();
        if opens == ends {
            Ok(())
        } else {
            Err(ParseError::syntax(FORMAT, "unbalanced do/end blocks"))
        }
    }
}

/// `:install` or `[:enable, :start]` → symbol names.
fn parse_symbol_list(text: &str) -> Vec<String> {
    text.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .filter_map(|part| part.trim().strip_prefix(':').map(str::to_string))
        .collect()
}

/// `:restart, 'service[nginx]', :delayed` → `(service, nginx)`.
fn parse_notification(rest: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = rest.split(',').map(str::trim).collect();
    let target = parts.get(1)?;
    let target = target.trim_matches(|c| c == '\'' || c == '"');
    let caps = notification_ref_re().captures(target)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// `key value` attribute lines.
fn split_attribute(line: &str) -> Option<(String, Value)> {
    let (key, rest) = line.split_once(char::is_whitespace)?;
    if !key.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
        return None;
    }
    Some((key.to_string(), parse_ruby_value(rest.trim())))
}

fn parse_ruby_value(text: &str) -> Value {
    let trimmed = text.trim();
    if let Some(symbol) = trimmed.strip_prefix(':')
        && symbol.chars().all(|c| c.is_alphanumeric() || c == '_')
    {
        return Value::String(symbol.to_string());
    }
    if (trimmed.starts_with('\'') && trimmed.ends_with('\'') && trimmed.len() >= 2)
        || (trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2)
    {
        return Value::String(trimmed[1..trimmed.len() - 1].to_string());
    }
    match trimmed {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "nil" => return Value::Null,
        _ => {}
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::Number(n.into());
    }
    if trimmed.starts_with('[') {
        let inner = trimmed.trim_start_matches('[').trim_end_matches(']');
        return Value::Array(inner.split(',').map(|item| parse_ruby_value(item)).collect());
    }
    Value::String(trimmed.to_string())
}

fn normalize_resource(
    rtype: &str,
    title: &str,
    id: &str,
    mut attrs: Params,
    actions: &[String],
) -> Operation {
    let first_action = actions.first().map(String::as_str);
    let mut params = Params::new();
    let title_value = || Value::String(title.to_string());

    let op_type = match rtype {
        "package" | "apt_package" | "yum_package" | "dnf_package" | "apk_package" => {
            let name = attrs.remove("package_name").unwrap_or_else(title_value);
            params.insert("package".into(), name);
            first_action
                .and_then(package_state)
                .unwrap_or(OpType::PackageInstall)
        }
        "service" => {
            let name = attrs.remove("service_name").unwrap_or_else(title_value);
            params.insert("service".into(), name);
            if actions.iter().any(|a| a == "enable") {
                params.insert("enabled".into(), Value::Bool(true));
            }
            // `action [:enable, :start]` is the start verb plus the
            // enabled param; a lone :enable is the enable verb.
            if actions.iter().any(|a| a == "start") {
                OpType::ServiceStart
            } else {
                match first_action {
                    Some("stop") => OpType::ServiceStop,
                    Some("restart") | Some("reload") => OpType::ServiceRestart,
                    Some("enable") => OpType::ServiceEnable,
                    Some("disable") => OpType::ServiceDisable,
                    _ => OpType::ServiceStart,
                }
            }
        }
        "file" | "cookbook_file" => {
            let path = attrs.remove("path").unwrap_or_else(title_value);
            params.insert("path".into(), path);
            if let Some(content) = attrs.remove("content") {
                params.insert("content".into(), content);
            }
            if let Some(source) = attrs.remove("source") {
                params.insert("source".into(), source);
            }
            match first_action {
                Some("delete") => OpType::FileDelete,
                _ => OpType::FileWrite,
            }
        }
        "template" => {
            let path = attrs.remove("path").unwrap_or_else(title_value);
            params.insert("path".into(), path);
            if let Some(source) = attrs.remove("source") {
                params.insert("source".into(), source);
            }
            OpType::TemplateRender
        }
        "remote_file" => {
            let dest = attrs.remove("path").unwrap_or_else(title_value);
            params.insert("dest".into(), dest);
            if let Some(source) = attrs.remove("source") {
                params.insert("url".into(), source);
            }
            OpType::HttpDownload
        }
        "directory" => {
            let path = attrs.remove("path").unwrap_or_else(title_value);
            params.insert("path".into(), path);
            match first_action {
                Some("delete") => OpType::DirectoryDelete,
                _ => OpType::DirectoryCreate,
            }
        }
        "link" => {
            params.insert("path".into(), title_value());
            if let Some(to) = attrs.remove("to") {
                params.insert("source".into(), to);
            }
            OpType::SymlinkCreate
        }
        "user" => {
            let name = attrs.remove("username").unwrap_or_else(title_value);
            params.insert("name".into(), name);
            match first_action {
                Some("remove") => OpType::UserRemove,
                _ => OpType::UserCreate,
            }
        }
        "group" => {
            let name = attrs.remove("group_name").unwrap_or_else(title_value);
            params.insert("name".into(), name);
            match first_action {
                Some("remove") => OpType::GroupRemove,
                _ => OpType::GroupCreate,
            }
        }
        "execute" => {
            let command = attrs.remove("command").unwrap_or_else(title_value);
            params.insert("command".into(), command);
            OpType::CommandRun
        }
        "bash" | "script" | "ruby_block" => {
            let code = attrs.remove("code").unwrap_or_else(title_value);
            params.insert("script".into(), code);
            OpType::ScriptRun
        }
        "cron" => {
            params.insert("name".into(), title_value());
            if let Some(command) = attrs.remove("command") {
                params.insert("job".into(), command);
            }
            match first_action {
                Some("delete") => OpType::CronRemove,
                _ => OpType::CronCreate,
            }
        }
        "git" => {
            params.insert("dest".into(), title_value());
            if let Some(repository) = attrs.remove("repository") {
                params.insert("repo".into(), repository);
            }
            OpType::GitCheckout
        }
        "mount" => {
            params.insert("path".into(), title_value());
            if let Some(device) = attrs.remove("device") {
                params.insert("device".into(), device);
            }
            OpType::MountCreate
        }
        other => OpType::Passthrough(other.to_string()),
    };

    params.append(&mut attrs);
    let mut op = Operation::new(id, op_type)
        .with_params(params)
        .with_meta("source_format", "chef")
        .with_meta("name", title);
    if !actions.is_empty() {
        op = op.with_meta(
            "actions",
            Value::Array(actions.iter().cloned().map(Value::String).collect()),
        );
    }
    if op.op_type.is_passthrough() {
        op = op.with_meta("raw", format!("{rtype} '{title}'"));
    }
    op
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Graph {
        ChefParser.parse(content, &ParseOptions::default()).unwrap()
    }

    const RECIPE: &str = r#"
package 'nginx' do
  action :install
end

service 'nginx' do
  action [:enable, :start]
end
"#;

    #[test]
    fn test_package_and_service() {
        let graph = parse(RECIPE);
        assert_eq!(graph.operation_count(), 2);

        let pkg = graph.find_operation("package.nginx").unwrap();
        assert_eq!(pkg.op_type, OpType::PackageInstall);
        assert_eq!(pkg.param_str("package"), Some("nginx"));

        let svc = graph.find_operation("service.nginx").unwrap();
        assert_eq!(svc.op_type, OpType::ServiceStart);
        assert_eq!(svc.params.get("enabled"), Some(&Value::Bool(true)));

        // no explicit wiring: recipe order becomes a sequential edge
        assert_eq!(graph.dependency_count(), 1);
        assert_eq!(graph.dependencies()[0].kind, DepKind::Sequential);
        graph.validate().unwrap();
    }

    #[test]
    fn test_notifies_edge_direction() {
        let graph = parse(
            "template '/etc/nginx/nginx.conf' do\n  source 'nginx.conf.erb'\n  notifies :restart, 'service[nginx]', :delayed\nend\n\nservice 'nginx' do\n  action :start\nend\n",
        );
        let notify = graph
            .dependencies()
            .iter()
            .find(|d| d.kind == DepKind::Notifies)
            .unwrap();
        assert_eq!(notify.from, "template./etc/nginx/nginx.conf");
        assert_eq!(notify.to, "service.nginx");
        // explicit wiring suppresses the sequential edge for that pair
        assert_eq!(graph.dependency_count(), 1);
    }

    #[test]
    fn test_subscribes_inverts_direction() {
        let graph = parse(
            "package 'app' do\n  action :install\nend\n\nservice 'app' do\n  subscribes :restart, 'package[app]', :immediately\nend\n",
        );
        let watch = graph
            .dependencies()
            .iter()
            .find(|d| d.kind == DepKind::Watches)
            .unwrap();
        assert_eq!(watch.from, "package.app");
        assert_eq!(watch.to, "service.app");
    }

    #[test]
    fn test_attribute_lines() {
        let graph = parse(
            "file '/etc/motd' do\n  content 'welcome'\n  mode '0644'\n  owner 'root'\nend\n",
        );
        let op = &graph.operations()[0];
        assert_eq!(op.op_type, OpType::FileWrite);
        assert_eq!(op.param_str("content"), Some("welcome"));
        assert_eq!(op.param_str("mode"), Some("0644"));
    }

    #[test]
    fn test_oneliner_resource() {
        let graph = parse("package 'curl'\npackage 'wget'\n");
        assert_eq!(graph.operation_count(), 2);
        assert_eq!(graph.dependency_count(), 1);
    }

    #[test]
    fn test_remove_action() {
        let graph = parse("package 'telnet' do\n  action :remove\nend\n");
        assert_eq!(graph.operations()[0].op_type, OpType::PackageRemove);
    }

    #[test]
    fn test_unknown_resource_passthrough() {
        let graph = parse("docker_image 'redis' do\n  tag 'latest'\nend\n");
        let op = &graph.operations()[0];
        assert_eq!(op.op_type, OpType::Passthrough("docker_image".into()));
        assert!(op.metadata.contains_key("raw"));
    }

    #[test]
    fn test_nested_block_skipped() {
        let graph = parse(
            "execute 'migrate' do\n  command 'rake db:migrate'\n  only_if do\n    ::File.exist?('/srv/app')\n  end\nend\n",
        );
        assert_eq!(graph.operation_count(), 1);
        assert_eq!(graph.operations()[0].param_str("command"), Some("rake db:migrate"));
    }

    #[test]
    fn test_unbalanced_blocks_fail_validate() {
        assert!(ChefParser.validate("package 'x' do\n").is_err());
        assert!(ChefParser.validate(RECIPE).is_ok());
    }
}
