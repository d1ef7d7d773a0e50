//! Format autodetection: extension heuristics combined with content sniffs.

use crate::SourceFormat;
use std::path::Path;

/// Guess the source format from an optional file path and the content.
///
/// Extensions that are unambiguous (`.tf`, `.sls`, `.pp`, `.rb`) win
/// outright; YAML and JSON fall through to content sniffing.
pub fn detect_format(path: Option<&Path>, content: &str) -> Option<SourceFormat> {
    if let Some(ext) = path.and_then(Path::extension).and_then(|e| e.to_str()) {
        match ext.to_ascii_lowercase().as_str() {
            "tf" | "hcl" => return Some(SourceFormat::Terraform),
            "sls" => return Some(SourceFormat::Salt),
            "pp" => return Some(SourceFormat::Puppet),
            "rb" => return Some(SourceFormat::Chef),
            "json" => return sniff_json(content),
            "yml" | "yaml" => return sniff_yaml(content),
            _ => {}
        }
    }
    sniff(content)
}

fn sniff(content: &str) -> Option<SourceFormat> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('{') {
        return sniff_json(content);
    }
    if looks_like_terraform_hcl(content) {
        return Some(SourceFormat::Terraform);
    }
    if looks_like_puppet(content) {
        return Some(SourceFormat::Puppet);
    }
    if looks_like_chef(content) {
        return Some(SourceFormat::Chef);
    }
    sniff_yaml(content)
}

fn sniff_json(content: &str) -> Option<SourceFormat> {
    let doc: serde_json::Value = serde_json::from_str(content).ok()?;
    let obj = doc.as_object()?;
    if obj.contains_key("resource") || obj.contains_key("planned_values") || obj.contains_key("terraform") {
        return Some(SourceFormat::Terraform);
    }
    None
}

fn sniff_yaml(content: &str) -> Option<SourceFormat> {
    let has_kind = content.lines().any(|l| l.starts_with("kind:"));
    let has_api_version = content.lines().any(|l| l.starts_with("apiVersion:"));
    if has_kind && has_api_version {
        return Some(SourceFormat::Kubernetes);
    }

    // Ansible plays carry a top-level `hosts:` key.
    if content
        .lines()
        .any(|l| l.trim_start().starts_with("- hosts:") || l.trim_start().starts_with("hosts:"))
    {
        return Some(SourceFormat::Ansible);
    }

    // A top-level list of task-shaped mappings is an Ansible task file.
    if content.trim_start().starts_with("- ") {
        return Some(SourceFormat::Ansible);
    }

    // Salt SLS: top-level state ids whose bodies key on `module.function`.
    if looks_like_salt(content) {
        return Some(SourceFormat::Salt);
    }
    None
}

fn looks_like_salt(content: &str) -> bool {
    let Ok(doc) = serde_yaml_ng::from_str::<serde_yaml_ng::Value>(content) else {
        return false;
    };
    let serde_yaml_ng::Value::Mapping(map) = doc else {
        return false;
    };
    map.values().any(|body| {
        matches!(body, serde_yaml_ng::Value::Mapping(inner) if inner
            .keys()
            .any(|k| matches!(k, serde_yaml_ng::Value::String(s) if s.contains('.'))))
    })
}

fn looks_like_terraform_hcl(content: &str) -> bool {
    content.lines().any(|line| {
        let trimmed = line.trim_start();
        trimmed.starts_with("resource \"")
            || trimmed.starts_with("terraform {")
            || trimmed.starts_with("provider \"")
            || trimmed.starts_with("variable \"")
    })
}

fn looks_like_puppet(content: &str) -> bool {
    content.contains("=>")
        && content
            .lines()
            .any(|line| line.trim_start().contains("{ '") || line.trim_start().contains("{ \""))
}

fn looks_like_chef(content: &str) -> bool {
    let has_do_block = content
        .lines()
        .any(|line| line.trim_end().ends_with(" do"));
    has_do_block && content.lines().any(|line| line.trim() == "end")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn path(name: &str) -> PathBuf {
        PathBuf::from(name)
    }

    #[test]
    fn test_extension_wins() {
        assert_eq!(
            detect_format(Some(&path("main.tf")), "anything"),
            Some(SourceFormat::Terraform)
        );
        assert_eq!(
            detect_format(Some(&path("web.sls")), "anything"),
            Some(SourceFormat::Salt)
        );
        assert_eq!(
            detect_format(Some(&path("site.pp")), ""),
            Some(SourceFormat::Puppet)
        );
        assert_eq!(
            detect_format(Some(&path("default.rb")), ""),
            Some(SourceFormat::Chef)
        );
    }

    #[test]
    fn test_yaml_sniffing() {
        assert_eq!(
            detect_format(Some(&path("play.yml")), "- hosts: web\n  tasks: []\n"),
            Some(SourceFormat::Ansible)
        );
        assert_eq!(
            detect_format(
                Some(&path("app.yaml")),
                "apiVersion: v1\nkind: Service\nmetadata:\n  name: x\n"
            ),
            Some(SourceFormat::Kubernetes)
        );
        assert_eq!(
            detect_format(Some(&path("state.yml")), "nginx:\n  pkg.installed: []\n"),
            Some(SourceFormat::Salt)
        );
    }

    #[test]
    fn test_json_sniffing() {
        assert_eq!(
            detect_format(None, r#"{"resource": {"aws_vpc": {"main": {}}}}"#),
            Some(SourceFormat::Terraform)
        );
        assert_eq!(detect_format(None, r#"{"unrelated": true}"#), None);
    }

    #[test]
    fn test_content_only_detection() {
        assert_eq!(
            detect_format(None, "resource \"aws_vpc\" \"main\" {\n}\n"),
            Some(SourceFormat::Terraform)
        );
        assert_eq!(
            detect_format(None, "package { 'nginx': ensure => present }\n"),
            Some(SourceFormat::Puppet)
        );
        assert_eq!(
            detect_format(None, "package 'nginx' do\n  action :install\nend\n"),
            Some(SourceFormat::Chef)
        );
    }

    #[test]
    fn test_undetectable_returns_none() {
        assert_eq!(detect_format(None, "plain text"), None);
    }
}
