//! Operation and dependency value types.
//!
//! An [`Operation`] is a vertex in the semantic graph: one unit of declared
//! work, normalized out of whatever dialect it was written in. A
//! [`Dependency`] is a directed edge between two operations. Edges always
//! point from the prerequisite to the dependent operation; [`DepKind`]
//! records why the edge exists, not which way it points.

use crate::value::{Params, Target, Value};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Closed enumeration of semantic verbs, plus an open passthrough variant
/// for source constructs with no canonical IR verb.
///
/// The string form is the snake_case verb name; passthrough renders as
/// `tool.<name>` and keeps the original declaration in operation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OpType {
    // Packages
    PackageInstall,
    PackageUpgrade,
    PackageRemove,
    // Services
    ServiceStart,
    ServiceStop,
    ServiceRestart,
    ServiceEnable,
    ServiceDisable,
    // Files and directories
    FileWrite,
    FileDelete,
    FileCopy,
    DirectoryCreate,
    DirectoryDelete,
    SymlinkCreate,
    PermissionsSet,
    TemplateRender,
    // Accounts
    UserCreate,
    UserRemove,
    GroupCreate,
    GroupRemove,
    SshKeyDeploy,
    // Execution
    CommandRun,
    ScriptRun,
    // Scheduling
    CronCreate,
    CronRemove,
    // Host configuration
    MountCreate,
    SysctlSet,
    HostnameSet,
    HostEntry,
    TimezoneSet,
    // Content retrieval
    GitCheckout,
    ArchiveExtract,
    HttpDownload,
    // Network
    FirewallRule,
    NetworkCreate,
    SubnetCreate,
    LoadBalancerCreate,
    DnsRecordCreate,
    // Cloud compute and storage
    ComputeInstanceCreate,
    ComputeInstanceDelete,
    StorageBucketCreate,
    StorageVolumeCreate,
    DatabaseCreate,
    // Cloud identity
    IamUserCreate,
    IamRoleCreate,
    // Containers
    ContainerRun,
    ContainerImageBuild,
    ContainerDeploymentCreate,
    ContainerServiceCreate,
    ContainerConfigCreate,
    ContainerSecretCreate,
    ContainerNamespaceCreate,
    /// Unmapped source construct, rendered as `tool.<name>`.
    Passthrough(String),
}

impl OpType {
    /// Parse a verb string. Unknown verbs become [`OpType::Passthrough`];
    /// a `tool.` prefix is stripped first, so the mapping never fails.
    pub fn parse(s: &str) -> Self {
        match s {
            "package_install" => Self::PackageInstall,
            "package_upgrade" => Self::PackageUpgrade,
            "package_remove" => Self::PackageRemove,
            "service_start" => Self::ServiceStart,
            "service_stop" => Self::ServiceStop,
            "service_restart" => Self::ServiceRestart,
            "service_enable" => Self::ServiceEnable,
            "service_disable" => Self::ServiceDisable,
            "file_write" => Self::FileWrite,
            "file_delete" => Self::FileDelete,
            "file_copy" => Self::FileCopy,
            "directory_create" => Self::DirectoryCreate,
            "directory_delete" => Self::DirectoryDelete,
            "symlink_create" => Self::SymlinkCreate,
            "permissions_set" => Self::PermissionsSet,
            "template_render" => Self::TemplateRender,
            "user_create" => Self::UserCreate,
            "user_remove" => Self::UserRemove,
            "group_create" => Self::GroupCreate,
            "group_remove" => Self::GroupRemove,
            "ssh_key_deploy" => Self::SshKeyDeploy,
            "command_run" => Self::CommandRun,
            "script_run" => Self::ScriptRun,
            "cron_create" => Self::CronCreate,
            "cron_remove" => Self::CronRemove,
            "mount_create" => Self::MountCreate,
            "sysctl_set" => Self::SysctlSet,
            "hostname_set" => Self::HostnameSet,
            "host_entry" => Self::HostEntry,
            "timezone_set" => Self::TimezoneSet,
            "git_checkout" => Self::GitCheckout,
            "archive_extract" => Self::ArchiveExtract,
            "http_download" => Self::HttpDownload,
            "firewall_rule" => Self::FirewallRule,
            "network_create" => Self::NetworkCreate,
            "subnet_create" => Self::SubnetCreate,
            "load_balancer_create" => Self::LoadBalancerCreate,
            "dns_record_create" => Self::DnsRecordCreate,
            "compute_instance_create" => Self::ComputeInstanceCreate,
            "compute_instance_delete" => Self::ComputeInstanceDelete,
            "storage_bucket_create" => Self::StorageBucketCreate,
            "storage_volume_create" => Self::StorageVolumeCreate,
            "database_create" => Self::DatabaseCreate,
            "iam_user_create" => Self::IamUserCreate,
            "iam_role_create" => Self::IamRoleCreate,
            "container_run" => Self::ContainerRun,
            "container_image_build" => Self::ContainerImageBuild,
            "container_deployment_create" => Self::ContainerDeploymentCreate,
            "container_service_create" => Self::ContainerServiceCreate,
            "container_config_create" => Self::ContainerConfigCreate,
            "container_secret_create" => Self::ContainerSecretCreate,
            "container_namespace_create" => Self::ContainerNamespaceCreate,
            other => {
                let name = other.strip_prefix("tool.").unwrap_or(other);
                Self::Passthrough(name.to_string())
            }
        }
    }

    /// True for the open `tool.<name>` variant.
    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::Passthrough(_))
    }

    /// Parameter names that must be present for the operation to validate.
    ///
    /// `file_write` additionally needs one of `content`/`source`, which is
    /// checked by [`Operation::check_params`] since it is not a plain
    /// required-key rule.
    pub fn required_params(&self) -> &'static [&'static str] {
        match self {
            Self::PackageInstall | Self::PackageUpgrade | Self::PackageRemove => &["package"],
            Self::ServiceStart
            | Self::ServiceStop
            | Self::ServiceRestart
            | Self::ServiceEnable
            | Self::ServiceDisable => &["service"],
            Self::FileWrite
            | Self::FileDelete
            | Self::DirectoryCreate
            | Self::DirectoryDelete => &["path"],
            Self::FileCopy => &["path", "source"],
            Self::SymlinkCreate => &["path", "source"],
            Self::PermissionsSet => &["path"],
            Self::TemplateRender => &["path", "source"],
            Self::UserCreate | Self::UserRemove => &["name"],
            Self::GroupCreate | Self::GroupRemove => &["name"],
            Self::SshKeyDeploy => &["user", "key"],
            Self::CommandRun => &["command"],
            Self::ScriptRun => &["script"],
            Self::CronCreate => &["name", "job"],
            Self::CronRemove => &["name"],
            Self::MountCreate => &["path", "device"],
            Self::SysctlSet => &["name", "value"],
            Self::HostnameSet => &["hostname"],
            Self::HostEntry => &["ip", "hostname"],
            Self::TimezoneSet => &["timezone"],
            Self::GitCheckout => &["repo", "dest"],
            Self::ArchiveExtract => &["source", "dest"],
            Self::HttpDownload => &["url", "dest"],
            Self::FirewallRule => &["name"],
            Self::ComputeInstanceCreate | Self::ComputeInstanceDelete => &["name"],
            Self::StorageBucketCreate => &["bucket"],
            Self::StorageVolumeCreate => &["name"],
            Self::NetworkCreate | Self::SubnetCreate => &["name"],
            Self::LoadBalancerCreate | Self::DnsRecordCreate => &["name"],
            Self::DatabaseCreate => &["name"],
            Self::IamUserCreate | Self::IamRoleCreate => &["name"],
            Self::ContainerRun => &["name", "image"],
            Self::ContainerImageBuild => &["name"],
            Self::ContainerDeploymentCreate => &["name", "image"],
            Self::ContainerServiceCreate => &["name"],
            Self::ContainerConfigCreate | Self::ContainerSecretCreate => &["name"],
            Self::ContainerNamespaceCreate => &["name"],
            Self::Passthrough(_) => &[],
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PackageInstall => f.write_str("package_install"),
            Self::PackageUpgrade => f.write_str("package_upgrade"),
            Self::PackageRemove => f.write_str("package_remove"),
            Self::ServiceStart => f.write_str("service_start"),
            Self::ServiceStop => f.write_str("service_stop"),
            Self::ServiceRestart => f.write_str("service_restart"),
            Self::ServiceEnable => f.write_str("service_enable"),
            Self::ServiceDisable => f.write_str("service_disable"),
            Self::FileWrite => f.write_str("file_write"),
            Self::FileDelete => f.write_str("file_delete"),
            Self::FileCopy => f.write_str("file_copy"),
            Self::DirectoryCreate => f.write_str("directory_create"),
            Self::DirectoryDelete => f.write_str("directory_delete"),
            Self::SymlinkCreate => f.write_str("symlink_create"),
            Self::PermissionsSet => f.write_str("permissions_set"),
            Self::TemplateRender => f.write_str("template_render"),
            Self::UserCreate => f.write_str("user_create"),
            Self::UserRemove => f.write_str("user_remove"),
            Self::GroupCreate => f.write_str("group_create"),
            Self::GroupRemove => f.write_str("group_remove"),
            Self::SshKeyDeploy => f.write_str("ssh_key_deploy"),
            Self::CommandRun => f.write_str("command_run"),
            Self::ScriptRun => f.write_str("script_run"),
            Self::CronCreate => f.write_str("cron_create"),
            Self::CronRemove => f.write_str("cron_remove"),
            Self::MountCreate => f.write_str("mount_create"),
            Self::SysctlSet => f.write_str("sysctl_set"),
            Self::HostnameSet => f.write_str("hostname_set"),
            Self::HostEntry => f.write_str("host_entry"),
            Self::TimezoneSet => f.write_str("timezone_set"),
            Self::GitCheckout => f.write_str("git_checkout"),
            Self::ArchiveExtract => f.write_str("archive_extract"),
            Self::HttpDownload => f.write_str("http_download"),
            Self::FirewallRule => f.write_str("firewall_rule"),
            Self::NetworkCreate => f.write_str("network_create"),
            Self::SubnetCreate => f.write_str("subnet_create"),
            Self::LoadBalancerCreate => f.write_str("load_balancer_create"),
            Self::DnsRecordCreate => f.write_str("dns_record_create"),
            Self::ComputeInstanceCreate => f.write_str("compute_instance_create"),
            Self::ComputeInstanceDelete => f.write_str("compute_instance_delete"),
            Self::StorageBucketCreate => f.write_str("storage_bucket_create"),
            Self::StorageVolumeCreate => f.write_str("storage_volume_create"),
            Self::DatabaseCreate => f.write_str("database_create"),
            Self::IamUserCreate => f.write_str("iam_user_create"),
            Self::IamRoleCreate => f.write_str("iam_role_create"),
            Self::ContainerRun => f.write_str("container_run"),
            Self::ContainerImageBuild => f.write_str("container_image_build"),
            Self::ContainerDeploymentCreate => f.write_str("container_deployment_create"),
            Self::ContainerServiceCreate => f.write_str("container_service_create"),
            Self::ContainerConfigCreate => f.write_str("container_config_create"),
            Self::ContainerSecretCreate => f.write_str("container_secret_create"),
            Self::ContainerNamespaceCreate => f.write_str("container_namespace_create"),
            Self::Passthrough(name) => write!(f, "tool.{name}"),
        }
    }
}

impl FromStr for OpType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl Serialize for OpType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OpType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// Why a dependency edge exists.
///
/// The edge direction is uniform across kinds: `from` precedes `to` in any
/// valid linearization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepKind {
    /// Source dialect ordered the operations implicitly (list position).
    Sequential,
    /// Explicit requisite (`require`, `prereq`, implicit reference).
    Requires,
    /// Explicit before/after metaparameter.
    Before,
    /// Notification chain (`notify`/`notifies`).
    Notifies,
    /// Watch/subscribe relationship.
    Watches,
    /// Explicit `depends_on` list.
    DependsOn,
}

impl fmt::Display for DepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sequential => "sequential",
            Self::Requires => "requires",
            Self::Before => "before",
            Self::Notifies => "notifies",
            Self::Watches => "watches",
            Self::DependsOn => "depends_on",
        };
        f.write_str(s)
    }
}

/// A vertex in the semantic graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique within the graph, stable across a single parse.
    pub id: String,
    /// Normalized semantic verb.
    #[serde(rename = "type")]
    pub op_type: OpType,
    /// Normalized parameters.
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub params: Params,
    /// Placement constraints.
    #[serde(default, skip_serializing_if = "Target::is_empty")]
    pub target: Target,
    /// Source dialect, original declaration, user-given name.
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub metadata: Params,
}

impl Operation {
    pub fn new(id: impl Into<String>, op_type: OpType) -> Self {
        Self {
            id: id.into(),
            op_type,
            params: Params::new(),
            target: Target::new(),
            metadata: Params::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// String-valued parameter lookup.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// User-given name from metadata, if the source carried one.
    pub fn name(&self) -> Option<&str> {
        self.metadata.get("name").and_then(Value::as_str)
    }

    /// Check per-type required-parameter rules.
    ///
    /// Missing required fields are recorded by the parser anyway; this is
    /// what `Graph::validate` calls to surface them afterwards.
    pub fn check_params(&self) -> Result<(), String> {
        for key in self.op_type.required_params() {
            if !self.params.contains_key(*key) {
                return Err(format!("missing required param `{key}`"));
            }
        }
        if self.op_type == OpType::FileWrite
            && !self.params.contains_key("content")
            && !self.params.contains_key("source")
        {
            return Err("missing one of `content`/`source`".to_string());
        }
        Ok(())
    }
}

/// A directed edge in the semantic graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    /// Prerequisite operation id.
    pub from: String,
    /// Dependent operation id.
    pub to: String,
    #[serde(rename = "type")]
    pub kind: DepKind,
    /// Reason tag and other edge annotations.
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub metadata: Params,
}

impl Dependency {
    pub fn new(from: impl Into<String>, to: impl Into<String>, kind: DepKind) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind,
            metadata: Params::new(),
        }
    }

    /// Tag the edge with a human-readable reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.metadata.insert("reason".into(), Value::String(reason.into()));
        self
    }

    /// Identity for deduplication: `{from, to, kind}`. Metadata is advisory.
    pub fn key(&self) -> (&str, &str, DepKind) {
        (&self.from, &self.to, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_type_round_trip() {
        for verb in ["package_install", "service_restart", "container_deployment_create"] {
            assert_eq!(OpType::parse(verb).to_string(), verb);
        }
    }

    #[test]
    fn test_unknown_verb_degrades_to_passthrough() {
        let op = OpType::parse("zfs_snapshot");
        assert_eq!(op, OpType::Passthrough("zfs_snapshot".to_string()));
        assert_eq!(op.to_string(), "tool.zfs_snapshot");
        // tool.-prefixed strings parse back to the same variant
        assert_eq!(OpType::parse("tool.zfs_snapshot"), op);
    }

    #[test]
    fn test_op_type_serde_as_string() {
        let encoded = serde_json::to_string(&OpType::ServiceStart).unwrap();
        assert_eq!(encoded, "\"service_start\"");
        let decoded: OpType = serde_json::from_str("\"tool.debug\"").unwrap();
        assert_eq!(decoded, OpType::Passthrough("debug".to_string()));
    }

    #[test]
    fn test_required_params_enforced() {
        let op = Operation::new("op_0", OpType::PackageInstall);
        assert!(op.check_params().is_err());

        let op = op.with_param("package", "nginx");
        assert!(op.check_params().is_ok());
    }

    #[test]
    fn test_file_write_needs_content_or_source() {
        let bare = Operation::new("op_0", OpType::FileWrite).with_param("path", "/etc/motd");
        assert!(bare.check_params().is_err());

        let with_content = bare.clone().with_param("content", "hello");
        assert!(with_content.check_params().is_ok());

        let with_source = bare.with_param("source", "motd.tmpl");
        assert!(with_source.check_params().is_ok());
    }

    #[test]
    fn test_dep_kind_serde() {
        let encoded = serde_json::to_string(&DepKind::DependsOn).unwrap();
        assert_eq!(encoded, "\"depends_on\"");
    }
}
