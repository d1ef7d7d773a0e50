//! Puppet manifest parser.
//!
//! A regex-lexed reader of the declarative subset of the Puppet DSL:
//! resource declarations, metaparameter relationships (`require`, `before`,
//! `notify`, `subscribe`), and chaining arrows (`->`, `~>`). Resource
//! references (`Type['title']`) resolve case-insensitively. The parser marks
//! itself `regex` in graph metadata; conditionals, defines, and templates
//! are out of reach of this reader.

use crate::normalize::{package_state, service_state};
use crate::{apply_target_overlay, base_graph, DialectParser, ParseError, ParseOptions, SourceFormat};
use har_core::{DepKind, Dependency, Graph, OpType, Operation, Params, Value};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

pub struct PuppetParser;

const FORMAT: SourceFormat = SourceFormat::Puppet;

fn resource_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)\b([a-z][a-z0-9_:]*)\s*\{\s*['"]([^'"]+)['"]\s*:"#).expect("static regex")
    })
}

fn reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Z][A-Za-z0-9_:]*)\[\s*['"]([^'"]+)['"]\s*\]"#).expect("static regex")
    })
}

impl DialectParser for PuppetParser {
    fn format(&self) -> SourceFormat {
        FORMAT
    }

    fn parse(&self, content: &str, opts: &ParseOptions) -> Result<Graph, ParseError> {
        let content = strip_comments(content);
        let mut graph = base_graph(FORMAT).with_metadata("parser", "regex");

        // (lowercase type, lowercase title) -> op id
        let mut by_ref: HashMap<(String, String), String> = HashMap::new();
        // (op id, metaparam keyword, referenced type, referenced title)
        let mut relations: Vec<(String, String, String, String)> = Vec::new();

        for caps in resource_header_re().captures_iter(&content) {
            let rtype = caps[1].to_string();
            let header_end = caps.get(0).map(|m| m.end()).unwrap_or(0);
            let open = content[..header_end].rfind('{').unwrap_or(header_end);
            let Some(body) = extract_braced(&content[open + 1..]) else {
                continue;
            };

            // A block may declare several titles separated by `;`; every
            // segment starts with a quoted title and a colon.
            let segments: Vec<(String, String)> = split_top_level(body, ';')
                .into_iter()
                .filter_map(|segment| split_title(&segment))
                .collect();

            for (title, attrs_text) in segments {
                let attrs = parse_attributes(&attrs_text);
                let id = format!("{}.{}", rtype.to_lowercase(), title.to_lowercase());
                if by_ref.contains_key(&(rtype.to_lowercase(), title.to_lowercase())) {
                    debug!("duplicate resource {rtype}['{title}'], keeping first");
                    continue;
                }

                let (op, metaparams) = normalize_resource(&rtype, &title, &id, attrs);
                by_ref.insert((rtype.to_lowercase(), title.to_lowercase()), id.clone());
                for (keyword, refs) in metaparams {
                    for (ref_type, ref_title) in refs {
                        relations.push((id.clone(), keyword.clone(), ref_type, ref_title));
                    }
                }
                graph.add_operation(op);
            }
        }

        // Metaparameter-driven edges.
        for (op_id, keyword, ref_type, ref_title) in relations {
            let key = (ref_type.to_lowercase(), ref_title.to_lowercase());
            let Some(ref_id) = by_ref.get(&key) else {
                debug!("unresolved reference {ref_type}['{ref_title}'] on {op_id}");
                continue;
            };
            let (from, to, kind) = match keyword.as_str() {
                "require" => (ref_id.clone(), op_id, DepKind::Requires),
                "before" => (op_id, ref_id.clone(), DepKind::Before),
                "notify" => (op_id, ref_id.clone(), DepKind::Notifies),
                "subscribe" => (ref_id.clone(), op_id, DepKind::Watches),
                _ => continue,
            };
            push_edge(&mut graph, Dependency::new(from, to, kind).with_reason(keyword));
        }

        // Chaining arrows.
        for (left, arrow, right) in chain_pairs(&content) {
            let left_id = by_ref.get(&(left.0.to_lowercase(), left.1.to_lowercase()));
            let right_id = by_ref.get(&(right.0.to_lowercase(), right.1.to_lowercase()));
            let (Some(left_id), Some(right_id)) = (left_id, right_id) else {
                continue;
            };
            let kind = if arrow == "~>" { DepKind::Watches } else { DepKind::Requires };
            push_edge(
                &mut graph,
                Dependency::new(left_id.clone(), right_id.clone(), kind)
                    .with_reason("chaining arrow"),
            );
        }

        apply_target_overlay(&mut graph, opts);
        Ok(graph)
    }

    fn validate(&self, content: &str) -> Result<(), ParseError> {
        let mut depth = 0i64;
        for c in content.chars() {
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
            if depth < 0 {
                return Err(ParseError::syntax(FORMAT, "unbalanced braces"));
            }
        }
        if depth == 0 {
            Ok(())
        } else {
            Err(ParseError::syntax(FORMAT, "unbalanced braces"))
        }
    }
}

fn push_edge(graph: &mut Graph, dep: Dependency) {
    if !graph.dependencies().iter().any(|d| d.key() == dep.key()) {
        graph.add_dependency(dep);
    }
}

fn strip_comments(content: &str) -> String {
    content
        .lines()
        .map(|line| match line.find('#') {
            Some(pos) if !line[..pos].chars().any(|c| c == '\'' || c == '"') => &line[..pos],
            _ => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Return the text up to the brace matching an already-consumed `{`.
fn extract_braced(rest: &str) -> Option<&str> {
    let mut depth = 1i64;
    let mut quote: Option<char> = None;
    for (idx, c) in rest.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&rest[..idx]);
                    }
                }
                _ => {}
            },
        }
    }
    None
}

/// Split on a separator at bracket depth zero, outside quotes.
fn split_top_level(text: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i64;
    let mut quote: Option<char> = None;
    for c in text.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '[' | '{' | '(' => {
                    depth += 1;
                    current.push(c);
                }
                ']' | '}' | ')' => {
                    depth -= 1;
                    current.push(c);
                }
                c if c == separator && depth == 0 => {
                    parts.push(std::mem::take(&mut current));
                }
                _ => current.push(c),
            },
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

fn split_title(segment: &str) -> Option<(String, String)> {
    let trimmed = segment.trim_start();
    let quote = trimmed.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let rest = &trimmed[1..];
    let end = rest.find(quote)?;
    let title = rest[..end].to_string();
    let after = rest[end + 1..].trim_start();
    let attrs = after.strip_prefix(':')?;
    Some((title, attrs.to_string()))
}

const METAPARAMS: &[&str] = &["require", "before", "notify", "subscribe"];

type Metaparams = Vec<(String, Vec<(String, String)>)>;

/// Parse `key => value` attributes; relationship metaparameters are split
/// out as resource references.
fn parse_attributes(text: &str) -> (Params, Metaparams) {
    let mut attrs = Params::new();
    let mut metaparams: Metaparams = Vec::new();

    for segment in split_top_level(text, ',') {
        let Some((key, value)) = segment.split_once("=>") else {
            continue;
        };
        let key = key.trim().to_string();
        let value = value.trim();
        if METAPARAMS.contains(&key.as_str()) {
            let refs: Vec<(String, String)> = reference_re()
                .captures_iter(value)
                .map(|caps| (caps[1].to_string(), caps[2].to_string()))
                .collect();
            if !refs.is_empty() {
                metaparams.push((key, refs));
            }
            continue;
        }
        attrs.insert(key, parse_attr_value(value));
    }
    (attrs, metaparams)
}

fn parse_attr_value(value: &str) -> Value {
    let trimmed = value.trim();
    if let Some(stripped) = strip_quotes(trimmed) {
        return Value::String(stripped);
    }
    match trimmed {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "undef" => return Value::Null,
        _ => {}
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::Number(n.into());
    }
    if trimmed.starts_with('[') {
        let inner = trimmed.trim_start_matches('[').trim_end_matches(']');
        let items: Vec<Value> = split_top_level(inner, ',')
            .into_iter()
            .map(|item| parse_attr_value(&item))
            .filter(|v| !matches!(v, Value::String(s) if s.is_empty()))
            .collect();
        return Value::Array(items);
    }
    Value::String(trimmed.to_string())
}

fn strip_quotes(text: &str) -> Option<String> {
    let first = text.chars().next()?;
    if (first == '\'' || first == '"') && text.len() >= 2 && text.ends_with(first) {
        return Some(text[1..text.len() - 1].to_string());
    }
    None
}

/// Find `Ref -> Ref` / `Ref ~> Ref` chains, pairwise.
fn chain_pairs(content: &str) -> Vec<((String, String), String, (String, String))> {
    let mut refs: Vec<(usize, usize, String, String)> = reference_re()
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((whole.start(), whole.end(), caps[1].to_string(), caps[2].to_string()))
        })
        .collect();
    refs.sort_by_key(|r| r.0);

    let mut pairs = Vec::new();
    for window in refs.windows(2) {
        let (_, left_end, left_type, left_title) = &window[0];
        let (right_start, _, right_type, right_title) = &window[1];
        let between = &content[*left_end..*right_start];
        let arrow = between.trim();
        if arrow == "->" || arrow == "~>" {
            pairs.push((
                (left_type.clone(), left_title.clone()),
                arrow.to_string(),
                (right_type.clone(), right_title.clone()),
            ));
        }
    }
    pairs
}

/// Map a Puppet resource to an IR operation plus its relationship
/// metaparameters.
fn normalize_resource(
    rtype: &str,
    title: &str,
    id: &str,
    (mut attrs, metaparams): (Params, Metaparams),
) -> (Operation, Metaparams) {
    let ensure = attrs
        .remove("ensure")
        .and_then(|v| v.as_str().map(str::to_string));
    let mut params = Params::new();
    let principal = |params: &mut Params, key: &str, attrs: &mut Params| {
        let value = attrs
            .remove("name")
            .unwrap_or_else(|| Value::String(title.to_string()));
        params.insert(key.to_string(), value);
    };

    let op_type = match rtype {
        "package" => {
            principal(&mut params, "package", &mut attrs);
            ensure
                .as_deref()
                .and_then(package_state)
                .unwrap_or(OpType::PackageInstall)
        }
        "service" => {
            principal(&mut params, "service", &mut attrs);
            if let Some(enable) = attrs.remove("enable") {
                params.insert("enabled".into(), enable);
            }
            ensure
                .as_deref()
                .and_then(service_state)
                .unwrap_or(OpType::ServiceStart)
        }
        "file" => {
            let path = attrs
                .remove("path")
                .unwrap_or_else(|| Value::String(title.to_string()));
            params.insert("path".into(), path);
            if let Some(content) = attrs.remove("content") {
                params.insert("content".into(), content);
            }
            if let Some(source) = attrs.remove("source") {
                params.insert("source".into(), source);
            }
            match ensure.as_deref() {
                Some("directory") => OpType::DirectoryCreate,
                Some("absent") => OpType::FileDelete,
                Some("link") => {
                    if let Some(target) = attrs.remove("target") {
                        params.insert("source".into(), target);
                    }
                    OpType::SymlinkCreate
                }
                _ => OpType::FileWrite,
            }
        }
        "user" => {
            principal(&mut params, "name", &mut attrs);
            match ensure.as_deref() {
                Some("absent") => OpType::UserRemove,
                _ => OpType::UserCreate,
            }
        }
        "group" => {
            principal(&mut params, "name", &mut attrs);
            match ensure.as_deref() {
                Some("absent") => OpType::GroupRemove,
                _ => OpType::GroupCreate,
            }
        }
        "exec" => {
            let command = attrs
                .remove("command")
                .unwrap_or_else(|| Value::String(title.to_string()));
            params.insert("command".into(), command);
            OpType::CommandRun
        }
        "cron" => {
            params.insert("name".into(), Value::String(title.to_string()));
            if let Some(command) = attrs.remove("command") {
                params.insert("job".into(), command);
            }
            OpType::CronCreate
        }
        "mount" => {
            params.insert("path".into(), Value::String(title.to_string()));
            if let Some(device) = attrs.remove("device") {
                params.insert("device".into(), device);
            }
            OpType::MountCreate
        }
        "host" => {
            params.insert("hostname".into(), Value::String(title.to_string()));
            if let Some(ip) = attrs.remove("ip") {
                params.insert("ip".into(), ip);
            }
            OpType::HostEntry
        }
        "ssh_authorized_key" => {
            if let Some(user) = attrs.remove("user") {
                params.insert("user".into(), user);
            }
            if let Some(key) = attrs.remove("key") {
                params.insert("key".into(), key);
            }
            OpType::SshKeyDeploy
        }
        other => OpType::Passthrough(other.to_string()),
    };

    if let Some(ensure) = ensure
        && op_type.is_passthrough()
    {
        params.insert("ensure".into(), Value::String(ensure));
    }
    params.append(&mut attrs);

    let mut op = Operation::new(id, op_type)
        .with_params(params)
        .with_meta("source_format", "puppet")
        .with_meta("name", title);
    if op.op_type.is_passthrough() {
        op = op.with_meta("raw", format!("{rtype} {{ '{title}': }}"));
    }
    (op, metaparams)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Graph {
        PuppetParser
            .parse(content, &ParseOptions::default())
            .unwrap()
    }

    const MANIFEST: &str = r#"
package { 'nginx':
  ensure => present,
}

service { 'nginx':
  ensure  => running,
  enable  => true,
  require => Package['nginx'],
}
"#;

    #[test]
    fn test_package_service_require() {
        let graph = parse(MANIFEST);
        assert_eq!(graph.operation_count(), 2);

        let pkg = graph.find_operation("package.nginx").unwrap();
        assert_eq!(pkg.op_type, OpType::PackageInstall);
        assert_eq!(pkg.param_str("package"), Some("nginx"));

        let svc = graph.find_operation("service.nginx").unwrap();
        assert_eq!(svc.op_type, OpType::ServiceStart);
        assert_eq!(svc.params.get("enabled"), Some(&Value::Bool(true)));

        assert_eq!(graph.dependency_count(), 1);
        let dep = &graph.dependencies()[0];
        assert_eq!(dep.from, "package.nginx");
        assert_eq!(dep.to, "service.nginx");
        assert_eq!(dep.kind, DepKind::Requires);
        graph.validate().unwrap();
    }

    #[test]
    fn test_chaining_arrow_requires() {
        let graph = parse(
            "package { 'nginx': ensure => present }\nservice { 'nginx': ensure => running }\nPackage['nginx'] -> Service['nginx']\n",
        );
        assert_eq!(graph.dependency_count(), 1);
        let dep = &graph.dependencies()[0];
        assert_eq!(dep.from, "package.nginx");
        assert_eq!(dep.to, "service.nginx");
        assert_eq!(dep.kind, DepKind::Requires);
    }

    #[test]
    fn test_tilde_arrow_watches() {
        let graph = parse(
            "file { '/etc/nginx.conf': content => 'x' }\nservice { 'nginx': ensure => running }\nFile['/etc/nginx.conf'] ~> Service['nginx']\n",
        );
        let dep = &graph.dependencies()[0];
        assert_eq!(dep.kind, DepKind::Watches);
        assert_eq!(dep.from, "file./etc/nginx.conf");
    }

    #[test]
    fn test_reference_case_insensitive() {
        let graph = parse(
            "package { 'Nginx': }\nservice { 'nginx': require => PACKAGE['NGINX'] }\n",
        );
        assert_eq!(graph.dependency_count(), 1);
    }

    #[test]
    fn test_before_and_notify_directions() {
        let graph = parse(
            "exec { 'prep': command => '/bin/true', before => Service['app'] }\nservice { 'app': }\nfile { '/etc/app.conf': content => 'x', notify => Service['app'] }\n",
        );
        let before = graph
            .dependencies()
            .iter()
            .find(|d| d.kind == DepKind::Before)
            .unwrap();
        assert_eq!(before.from, "exec.prep");
        assert_eq!(before.to, "service.app");

        let notify = graph
            .dependencies()
            .iter()
            .find(|d| d.kind == DepKind::Notifies)
            .unwrap();
        assert_eq!(notify.from, "file./etc/app.conf");
        assert_eq!(notify.to, "service.app");
    }

    #[test]
    fn test_ensure_absent_flips_verb() {
        let graph = parse("package { 'telnet': ensure => absent }\nuser { 'old': ensure => absent }\n");
        assert_eq!(graph.operations()[0].op_type, OpType::PackageRemove);
        assert_eq!(graph.operations()[1].op_type, OpType::UserRemove);
    }

    #[test]
    fn test_file_directory_and_link() {
        let graph = parse(
            "file { '/var/www': ensure => directory }\nfile { '/etc/alias': ensure => link, target => '/etc/real' }\n",
        );
        assert_eq!(graph.operations()[0].op_type, OpType::DirectoryCreate);
        let link = &graph.operations()[1];
        assert_eq!(link.op_type, OpType::SymlinkCreate);
        assert_eq!(link.param_str("source"), Some("/etc/real"));
    }

    #[test]
    fn test_unknown_type_passthrough() {
        let graph = parse("zpool { 'tank': ensure => present }\n");
        let op = &graph.operations()[0];
        assert_eq!(op.op_type, OpType::Passthrough("zpool".into()));
        assert_eq!(op.param_str("ensure"), Some("present"));
    }

    #[test]
    fn test_multi_title_block() {
        let graph = parse("package { 'curl': ensure => present;\n  'wget': ensure => present\n}\n");
        assert_eq!(graph.operation_count(), 2);
        assert_eq!(graph.operations()[1].param_str("package"), Some("wget"));
    }

    #[test]
    fn test_comments_stripped() {
        let graph = parse("# package { 'ghost': }\npackage { 'real': ensure => present }\n");
        assert_eq!(graph.operation_count(), 1);
        assert!(graph.find_operation("package.real").is_some());
    }
}
