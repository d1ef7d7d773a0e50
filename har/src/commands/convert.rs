//! `har convert` - parse and transform in one step.

use super::{parse::resolve_format, read_file, transform::build_options, write_output, StageError};
use super::transform::TransformArgs;
use clap::Args;
use har_parsers::ParseOptions;
use std::path::PathBuf;

#[derive(Args)]
pub struct ConvertArgs {
    /// Source file to convert
    pub file: PathBuf,

    /// Target format
    #[arg(long)]
    pub to: String,

    /// Source format (auto-detected when omitted)
    #[arg(long)]
    pub from: Option<String>,

    /// Write the output here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Cloud provider for Terraform emission (aws, gcp, azure)
    #[arg(long)]
    pub provider: Option<String>,

    /// Region for Terraform emission
    #[arg(long)]
    pub region: Option<String>,

    /// Emit Terraform as HCL instead of JSON
    #[arg(long)]
    pub hcl: bool,

    /// OS family for OS-aware package emission
    #[arg(long)]
    pub os: Option<String>,

    /// Ansible play hosts
    #[arg(long)]
    pub hosts: Option<String>,

    /// Ansible play privilege escalation
    #[arg(long)]
    pub r#become: bool,

    /// Puppet class wrapper name
    #[arg(long)]
    pub class_name: Option<String>,

    /// Chef cookbook name
    #[arg(long)]
    pub cookbook: Option<String>,
}

pub fn run(args: &ConvertArgs) -> Result<(), StageError> {
    let content = read_file(&args.file)?;
    let format = resolve_format(args.from.as_deref(), &args.file, &content)?;

    let graph = har_parsers::parse(format, &content, &ParseOptions::default())
        .map_err(|err| StageError::new("parse", err))?;

    let transform_args = TransformArgs {
        graph: PathBuf::new(),
        to: args.to.clone(),
        output: None,
        provider: args.provider.clone(),
        region: args.region.clone(),
        hcl: args.hcl,
        os: args.os.clone(),
        hosts: args.hosts.clone(),
        r#become: args.r#become,
        class_name: args.class_name.clone(),
        cookbook: args.cookbook.clone(),
    };
    let opts = build_options(&transform_args)?;

    let text = har_transformers::transform(&graph, &opts)
        .map_err(|err| StageError::new("transform", err))?;
    write_output(args.output.as_ref(), &text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(file: PathBuf, to: &str) -> ConvertArgs {
        ConvertArgs {
            file,
            to: to.to_string(),
            from: None,
            output: None,
            provider: None,
            region: None,
            hcl: false,
            os: None,
            hosts: None,
            r#become: false,
            class_name: None,
            cookbook: None,
        }
    }

    #[test]
    fn test_ansible_to_salt_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let playbook = dir.path().join("web.yml");
        std::fs::write(
            &playbook,
            "- hosts: web\n  tasks:\n    - name: Install nginx\n      apt: { name: nginx, state: present }\n    - name: Start nginx\n      service: { name: nginx, state: started }\n",
        )
        .unwrap();

        let output = dir.path().join("web.sls");
        let mut a = args(playbook, "salt");
        a.output = Some(output.clone());
        run(&a).unwrap();

        let sls = std::fs::read_to_string(&output).unwrap();
        assert!(sls.contains("pkg.installed"));
        assert!(sls.contains("service.running"));
        assert!(sls.find("pkg.installed").unwrap() < sls.find("service.running").unwrap());
    }

    #[test]
    fn test_parse_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("broken.yml");
        std::fs::write(&bad, ": [bad yaml").unwrap();

        let mut a = args(bad, "salt");
        a.from = Some("ansible".to_string());
        let err = run(&a).unwrap_err();
        assert!(err.to_string().starts_with("parse error:"));
    }
}
