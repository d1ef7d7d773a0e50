//! `har transform` - lower a graph envelope into target dialect text.

use super::{read_file, write_output, StageError};
use clap::Args;
use har_core::decode_graph;
use har_transformers::{TargetFormat, TerraformSyntax, TransformOptions};
use std::path::PathBuf;

#[derive(Args)]
pub struct TransformArgs {
    /// Graph envelope JSON file
    pub graph: PathBuf,

    /// Target format
    #[arg(long)]
    pub to: String,

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

pub(crate) fn build_options(args: &TransformArgs) -> Result<TransformOptions, StageError> {
    let to = args
        .to
        .parse::<TargetFormat>()
        .map_err(|err| StageError::new("transform", err))?;
    let mut opts = TransformOptions::new(to);
    if let Some(provider) = &args.provider {
        opts.provider = provider
            .parse()
            .map_err(|err| StageError::new("transform", err))?;
    }
    opts.region = args.region.clone();
    if args.hcl {
        opts.syntax = TerraformSyntax::Hcl;
    }
    opts.os = args.os.clone();
    opts.hosts = args.hosts.clone();
    opts.r#become = args.r#become;
    opts.class_name = args.class_name.clone();
    opts.cookbook = args.cookbook.clone();
    Ok(opts)
}

pub fn run(args: &TransformArgs) -> Result<(), StageError> {
    let envelope = read_file(&args.graph)?;
    let graph = decode_graph(&envelope).map_err(|err| StageError::new("bridge", err))?;
    let opts = build_options(args)?;

    let text = har_transformers::transform(&graph, &opts)
        .map_err(|err| StageError::new("transform", err))?;
    write_output(args.output.as_ref(), &text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use har_core::{graph_to_json_string, Graph, OpType, Operation};
    use har_transformers::Provider;

    fn args(to: &str) -> TransformArgs {
        TransformArgs {
            graph: PathBuf::from("graph.json"),
            to: to.to_string(),
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
    fn test_unknown_target_fails() {
        let err = build_options(&args("nomad")).unwrap_err();
        assert!(err.to_string().contains("unsupported target format"));
    }

    #[test]
    fn test_provider_option() {
        let mut a = args("terraform");
        a.provider = Some("gcp".to_string());
        let opts = build_options(&a).unwrap();
        assert_eq!(opts.provider, Provider::Gcp);
    }

    #[test]
    fn test_run_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let graph_path = dir.path().join("graph.json");
        let mut graph = Graph::new();
        graph.add_operation(
            Operation::new("op_0", OpType::PackageInstall).with_param("package", "nginx"),
        );
        std::fs::write(&graph_path, graph_to_json_string(&graph)).unwrap();

        let out_path = dir.path().join("out.sls");
        let mut a = args("salt");
        a.graph = graph_path;
        a.output = Some(out_path.clone());
        run(&a).unwrap();

        let text = std::fs::read_to_string(&out_path).unwrap();
        assert!(text.contains("pkg.installed"));
    }

    #[test]
    fn test_bad_envelope_is_bridge_error() {
        let dir = tempfile::tempdir().unwrap();
        let graph_path = dir.path().join("graph.json");
        std::fs::write(&graph_path, "not json").unwrap();

        let mut a = args("salt");
        a.graph = graph_path;
        let err = run(&a).unwrap_err();
        assert!(err.to_string().starts_with("bridge error:"));
    }
}
