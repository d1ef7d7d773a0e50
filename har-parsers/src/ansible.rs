//! Ansible playbook parser.
//!
//! Accepts full playbooks (a list of plays) and bare task lists (role task
//! files). Task ordering inside a play is the contract in Ansible, so
//! consecutive tasks are wired with `sequential` edges. `notify` targets are
//! recorded in task metadata but handler edges are not synthesized yet;
//! neither are `when` conditions.

use crate::normalize::{os_for_package_module, package_state, service_state};
use crate::{apply_target_overlay, base_graph, yaml, DialectParser, ParseError, ParseOptions, SourceFormat};
use har_core::{DepKind, Dependency, Graph, OpType, Operation, Params, Target, Value};
use tracing::debug;

pub struct AnsibleParser;

const FORMAT: SourceFormat = SourceFormat::Ansible;

/// Task keys that are task plumbing rather than module invocations.
const TASK_KEYWORDS: &[&str] = &[
    "name", "when", "notify", "register", "become", "become_user", "become_method",
    "vars", "tags", "loop", "with_items", "with_dict", "with_fileglob", "ignore_errors",
    "changed_when", "failed_when", "delegate_to", "run_once", "environment", "args",
    "until", "retries", "delay", "no_log", "any_errors_fatal", "listen",
];

/// Free-form option keys that may trail a command-module shorthand string.
const COMMAND_OPTIONS: &[&str] = &["chdir", "creates", "removes", "executable", "stdin", "warn"];

impl DialectParser for AnsibleParser {
    fn format(&self) -> SourceFormat {
        FORMAT
    }

    fn parse(&self, content: &str, opts: &ParseOptions) -> Result<Graph, ParseError> {
        let doc = yaml::parse_document(content)
            .map_err(|detail| ParseError::syntax(FORMAT, detail))?;
        let Value::Array(items) = doc else {
            return Err(ParseError::syntax(
                FORMAT,
                "expected a list of plays or tasks at the top level",
            ));
        };

        let mut graph = base_graph(FORMAT);
        let mut counter = 0usize;
        // Bare task entries (role tasks file) form one implicit play.
        let mut bare_chain: Vec<String> = Vec::new();

        for item in &items {
            let Value::Object(map) = item else {
                return Err(ParseError::syntax(FORMAT, "list entries must be mappings"));
            };
            if map.contains_key("hosts") {
                parse_play(map, &mut graph, &mut counter)?;
            } else {
                parse_task(map, &mut graph, &mut counter, &mut bare_chain);
            }
        }
        link_sequential(&mut graph, &bare_chain);

        apply_target_overlay(&mut graph, opts);
        Ok(graph)
    }

    fn validate(&self, content: &str) -> Result<(), ParseError> {
        let doc = yaml::parse_document(content)
            .map_err(|detail| ParseError::syntax(FORMAT, detail))?;
        if doc.is_array() {
            Ok(())
        } else {
            Err(ParseError::syntax(FORMAT, "expected a top-level list"))
        }
    }
}

fn parse_play(
    play: &Params,
    graph: &mut Graph,
    counter: &mut usize,
) -> Result<(), ParseError> {
    if let Some(hosts) = play.get("hosts")
        && !graph.metadata.contains_key("hosts")
    {
        graph.metadata.insert("hosts".into(), hosts.clone());
    }
    if let Some(escalate) = play.get("become")
        && !graph.metadata.contains_key("become")
    {
        graph.metadata.insert("become".into(), escalate.clone());
    }
    if let Some(Value::Array(handlers)) = play.get("handlers") {
        let names: Vec<Value> = handlers
            .iter()
            .filter_map(|h| h.get("name").cloned())
            .collect();
        if !names.is_empty() {
            graph.metadata.insert("handlers".into(), Value::Array(names));
        }
    }

    let mut chain: Vec<String> = Vec::new();
    for section in ["pre_tasks", "tasks", "post_tasks"] {
        if let Some(Value::Array(tasks)) = play.get(section) {
            for task in tasks {
                if let Value::Object(task) = task {
                    parse_task(task, graph, counter, &mut chain);
                }
            }
        }
    }
    link_sequential(graph, &chain);
    Ok(())
}

fn link_sequential(graph: &mut Graph, chain: &[String]) {
    for pair in chain.windows(2) {
        graph.add_dependency(
            Dependency::new(&pair[0], &pair[1], DepKind::Sequential).with_reason("playbook order"),
        );
    }
}

fn parse_task(
    task: &Params,
    graph: &mut Graph,
    counter: &mut usize,
    chain: &mut Vec<String>,
) {
    // block/rescue/always nest further task lists; flatten them in order.
    for nested in ["block", "rescue", "always"] {
        if let Some(Value::Array(tasks)) = task.get(nested) {
            for inner in tasks {
                if let Value::Object(inner) = inner {
                    parse_task(inner, graph, counter, chain);
                }
            }
            return;
        }
    }

    let Some((module, args_value)) = find_module(task) else {
        debug!("task without a module key, skipping");
        return;
    };
    let module = short_module_name(&module);
    let mut args = module_args(&module, args_value);
    if let Some(Value::Object(extra)) = task.get("args") {
        for (key, value) in extra {
            args.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    let id = format!("op_{}", *counter);
    *counter += 1;

    let (op_type, params, os_hint) = normalize_module(&module, args, &id);
    let mut op = Operation::new(&id, op_type).with_params(params);

    let mut target = Target::new();
    if let Some(os) = os_hint {
        target = target.with("os", os);
    }
    op = op.with_target(target).with_meta("source_format", "ansible");

    if let Some(name) = task.get("name").and_then(Value::as_str) {
        op = op.with_meta("name", name);
    }
    if let Some(notify) = task.get("notify") {
        op = op.with_meta("notify", notify.clone());
    }
    if let Some(when) = task.get("when") {
        op = op.with_meta("when", when.clone());
    }
    if op.op_type.is_passthrough() {
        op = op.with_meta("raw", serde_json::to_string(task).unwrap_or_default());
    }

    chain.push(id);
    graph.add_operation(op);
}

/// The module key is the first key that is not task plumbing.
fn find_module(task: &Params) -> Option<(String, Value)> {
    task.iter()
        .find(|(key, _)| !TASK_KEYWORDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
}

/// Strip collection prefixes: `ansible.builtin.apt` → `apt`.
fn short_module_name(module: &str) -> String {
    module.rsplit('.').next().unwrap_or(module).to_string()
}

/// Module args arrive as a mapping, a `k=v` shorthand string, or null.
fn module_args(module: &str, value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        Value::String(text) => parse_shorthand(module, &text),
        _ => Params::new(),
    }
}

fn is_command_module(module: &str) -> bool {
    matches!(module, "command" | "shell" | "raw" | "win_command" | "win_shell")
}

/// Parse the `k=v` shorthand. For command modules the leading free-form
/// words are the command itself and only known trailing options are split
/// out.
fn parse_shorthand(module: &str, text: &str) -> Params {
    let mut params = Params::new();
    if is_command_module(module) {
        let mut words = Vec::new();
        for token in split_tokens(text) {
            if let Some((key, value)) = token.split_once('=')
                && COMMAND_OPTIONS.contains(&key)
            {
                params.insert(key.to_string(), Value::String(unquote(value)));
                continue;
            }
            words.push(token);
        }
        params.insert("_free_form".into(), Value::String(words.join(" ")));
    } else {
        for token in split_tokens(text) {
            if let Some((key, value)) = token.split_once('=') {
                params.insert(key.to_string(), Value::String(unquote(value)));
            }
        }
    }
    params
}

/// Whitespace split that keeps quoted spans intact.
fn split_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in text.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn unquote(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.len() >= 2 {
        let bytes = trimmed.as_bytes();
        if (bytes[0] == b'"' && bytes[trimmed.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[trimmed.len() - 1] == b'\'')
        {
            return trimmed[1..trimmed.len() - 1].to_string();
        }
    }
    trimmed.to_string()
}

fn take(params: &mut Params, keys: &[&str]) -> Option<Value> {
    for key in keys {
        if let Some(value) = params.remove(*key) {
            return Some(value);
        }
    }
    None
}

fn state_of(params: &mut Params) -> Option<String> {
    take(params, &["state"]).and_then(|v| v.as_str().map(str::to_string))
}

/// Map an Ansible module invocation to an IR verb and normalized params.
fn normalize_module(module: &str, mut args: Params, id: &str) -> (OpType, Params, Option<&'static str>) {
    let os_hint = os_for_package_module(module);

    let package_modules = [
        "apt", "yum", "dnf", "zypper", "apk", "pacman", "homebrew", "win_chocolatey",
        "package", "pip",
    ];
    if package_modules.contains(&module) {
        let mut params = Params::new();
        if let Some(name) = take(&mut args, &["name", "pkg", "package"]) {
            params.insert("package".into(), name);
        }
        let verb = state_of(&mut args)
            .as_deref()
            .and_then(package_state)
            .unwrap_or(OpType::PackageInstall);
        params.append(&mut args);
        return (verb, params, os_hint);
    }

    match module {
        "service" | "systemd" | "sysvinit" | "win_service" => {
            let mut params = Params::new();
            if let Some(name) = take(&mut args, &["name"]) {
                params.insert("service".into(), name);
            }
            let state = state_of(&mut args);
            let enabled = take(&mut args, &["enabled"]);
            // The IR verb follows the state, not the module; a task that
            // only toggles `enabled` becomes service_enable/disable.
            let verb = match state.as_deref().and_then(service_state) {
                Some(verb) => verb,
                None => match enabled.as_ref().and_then(Value::as_bool) {
                    Some(false) => OpType::ServiceDisable,
                    _ => OpType::ServiceEnable,
                },
            };
            if let Some(enabled) = enabled {
                params.insert("enabled".into(), enabled);
            }
            params.append(&mut args);
            (verb, params, os_hint)
        }
        "copy" => {
            let mut params = Params::new();
            if let Some(dest) = take(&mut args, &["dest"]) {
                params.insert("path".into(), dest);
            }
            if let Some(src) = take(&mut args, &["src"]) {
                params.insert("source".into(), src);
            }
            if let Some(content) = take(&mut args, &["content"]) {
                params.insert("content".into(), content);
            }
            params.append(&mut args);
            (OpType::FileWrite, params, os_hint)
        }
        "template" => {
            let mut params = Params::new();
            if let Some(dest) = take(&mut args, &["dest"]) {
                params.insert("path".into(), dest);
            }
            if let Some(src) = take(&mut args, &["src"]) {
                params.insert("source".into(), src);
            }
            params.append(&mut args);
            (OpType::TemplateRender, params, os_hint)
        }
        "file" => {
            let mut params = Params::new();
            if let Some(path) = take(&mut args, &["path", "dest", "name"]) {
                params.insert("path".into(), path);
            }
            if let Some(src) = take(&mut args, &["src"]) {
                params.insert("source".into(), src);
            }
            let state = state_of(&mut args);
            let verb = match state.as_deref() {
                Some("directory") => OpType::DirectoryCreate,
                Some("absent") => OpType::FileDelete,
                Some("link") | Some("hard") => OpType::SymlinkCreate,
                Some("touch") => {
                    params.entry("content").or_insert(Value::String(String::new()));
                    OpType::FileWrite
                }
                _ => OpType::PermissionsSet,
            };
            params.append(&mut args);
            (verb, params, os_hint)
        }
        "user" => {
            let mut params = Params::new();
            if let Some(name) = take(&mut args, &["name"]) {
                params.insert("name".into(), name);
            }
            let verb = match state_of(&mut args).as_deref() {
                Some("absent") => OpType::UserRemove,
                _ => OpType::UserCreate,
            };
            params.append(&mut args);
            (verb, params, os_hint)
        }
        "group" => {
            let mut params = Params::new();
            if let Some(name) = take(&mut args, &["name"]) {
                params.insert("name".into(), name);
            }
            let verb = match state_of(&mut args).as_deref() {
                Some("absent") => OpType::GroupRemove,
                _ => OpType::GroupCreate,
            };
            params.append(&mut args);
            (verb, params, os_hint)
        }
        "authorized_key" => {
            let mut params = Params::new();
            if let Some(user) = take(&mut args, &["user"]) {
                params.insert("user".into(), user);
            }
            if let Some(key) = take(&mut args, &["key"]) {
                params.insert("key".into(), key);
            }
            params.append(&mut args);
            (OpType::SshKeyDeploy, params, os_hint)
        }
        "command" | "shell" | "raw" | "win_command" | "win_shell" => {
            let mut params = Params::new();
            if let Some(cmd) = take(&mut args, &["_free_form", "cmd"]) {
                params.insert("command".into(), cmd);
            }
            if module == "shell" || module == "win_shell" {
                params.insert("shell".into(), Value::Bool(true));
            }
            params.append(&mut args);
            (OpType::CommandRun, params, os_hint)
        }
        "script" => {
            let mut params = Params::new();
            if let Some(script) = take(&mut args, &["_free_form", "cmd"]) {
                params.insert("script".into(), script);
            }
            params.append(&mut args);
            (OpType::ScriptRun, params, os_hint)
        }
        "cron" => {
            let mut params = Params::new();
            if let Some(name) = take(&mut args, &["name"]) {
                params.insert("name".into(), name);
            }
            if let Some(job) = take(&mut args, &["job"]) {
                params.insert("job".into(), job);
            }
            let verb = match state_of(&mut args).as_deref() {
                Some("absent") => OpType::CronRemove,
                _ => OpType::CronCreate,
            };
            params.append(&mut args);
            (verb, params, os_hint)
        }
        "mount" => {
            let mut params = Params::new();
            if let Some(path) = take(&mut args, &["path", "name"]) {
                params.insert("path".into(), path);
            }
            if let Some(src) = take(&mut args, &["src"]) {
                params.insert("device".into(), src);
            }
            params.append(&mut args);
            (OpType::MountCreate, params, os_hint)
        }
        "sysctl" => {
            let mut params = Params::new();
            if let Some(name) = take(&mut args, &["name"]) {
                params.insert("name".into(), name);
            }
            if let Some(value) = take(&mut args, &["value"]) {
                params.insert("value".into(), value);
            }
            params.append(&mut args);
            (OpType::SysctlSet, params, os_hint)
        }
        "hostname" => {
            let mut params = Params::new();
            if let Some(name) = take(&mut args, &["name"]) {
                params.insert("hostname".into(), name);
            }
            params.append(&mut args);
            (OpType::HostnameSet, params, os_hint)
        }
        "timezone" => {
            let mut params = Params::new();
            if let Some(name) = take(&mut args, &["name"]) {
                params.insert("timezone".into(), name);
            }
            params.append(&mut args);
            (OpType::TimezoneSet, params, os_hint)
        }
        "git" => {
            let mut params = Params::new();
            if let Some(repo) = take(&mut args, &["repo"]) {
                params.insert("repo".into(), repo);
            }
            if let Some(dest) = take(&mut args, &["dest"]) {
                params.insert("dest".into(), dest);
            }
            params.append(&mut args);
            (OpType::GitCheckout, params, os_hint)
        }
        "unarchive" => {
            let mut params = Params::new();
            if let Some(src) = take(&mut args, &["src"]) {
                params.insert("source".into(), src);
            }
            if let Some(dest) = take(&mut args, &["dest"]) {
                params.insert("dest".into(), dest);
            }
            params.append(&mut args);
            (OpType::ArchiveExtract, params, os_hint)
        }
        "get_url" => {
            let mut params = Params::new();
            if let Some(url) = take(&mut args, &["url"]) {
                params.insert("url".into(), url);
            }
            if let Some(dest) = take(&mut args, &["dest"]) {
                params.insert("dest".into(), dest);
            }
            params.append(&mut args);
            (OpType::HttpDownload, params, os_hint)
        }
        "ufw" | "firewalld" | "iptables" => {
            let mut params = Params::new();
            let name = take(&mut args, &["name"])
                .unwrap_or_else(|| Value::String(format!("{module}-{id}")));
            params.insert("name".into(), name);
            params.append(&mut args);
            (OpType::FirewallRule, params, os_hint)
        }
        "ec2_instance" => {
            let mut params = Params::new();
            if let Some(name) = take(&mut args, &["name"]) {
                params.insert("name".into(), name);
            }
            if let Some(image) = take(&mut args, &["image_id", "image"]) {
                params.insert("image".into(), image);
            }
            params.append(&mut args);
            (OpType::ComputeInstanceCreate, params, os_hint)
        }
        "s3_bucket" => {
            let mut params = Params::new();
            if let Some(name) = take(&mut args, &["name"]) {
                params.insert("bucket".into(), name);
            }
            params.append(&mut args);
            (OpType::StorageBucketCreate, params, os_hint)
        }
        "docker_container" => {
            let mut params = Params::new();
            if let Some(name) = take(&mut args, &["name"]) {
                params.insert("name".into(), name);
            }
            if let Some(image) = take(&mut args, &["image"]) {
                params.insert("image".into(), image);
            }
            params.append(&mut args);
            (OpType::ContainerRun, params, os_hint)
        }
        other => (OpType::Passthrough(other.to_string()), args, os_hint),
    }
}
