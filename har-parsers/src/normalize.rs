//! Shared verb-normalization tables.
//!
//! Package and service declarations carry both a module/resource name and a
//! desired state in most dialects. The IR collapses the state values into a
//! small verb set; where a dialect distinguishes both a verb and a state,
//! the state wins.

use har_core::OpType;

/// Collapse a package state value to an IR verb.
///
/// `present`/`installed` install, `latest` upgrades, `absent`/`removed`/
/// `purged` remove. Unknown states return `None` and callers keep their
/// module default.
pub fn package_state(state: &str) -> Option<OpType> {
    match state {
        "present" | "installed" | "install" => Some(OpType::PackageInstall),
        "latest" | "upgrade" | "upgraded" => Some(OpType::PackageUpgrade),
        "absent" | "removed" | "remove" | "purged" | "purge" => Some(OpType::PackageRemove),
        _ => None,
    }
}

/// Collapse a service state value to an IR verb.
pub fn service_state(state: &str) -> Option<OpType> {
    match state {
        "started" | "running" | "start" => Some(OpType::ServiceStart),
        "stopped" | "dead" | "stop" => Some(OpType::ServiceStop),
        "restarted" | "reloaded" | "restart" | "reload" => Some(OpType::ServiceRestart),
        "enabled" | "enable" => Some(OpType::ServiceEnable),
        "disabled" | "disable" => Some(OpType::ServiceDisable),
        _ => None,
    }
}

/// OS family implied by an OS-specific package manager module, used to
/// stamp `target.os` so OS-aware emission survives a round-trip.
pub fn os_for_package_module(module: &str) -> Option<&'static str> {
    match module {
        "apt" | "apt_rpm" => Some("debian"),
        "yum" => Some("redhat"),
        "dnf" => Some("fedora"),
        "zypper" => Some("suse"),
        "apk" => Some("alpine"),
        "pacman" => Some("arch"),
        "homebrew" => Some("darwin"),
        "win_chocolatey" | "chocolatey" => Some("windows"),
        _ => None,
    }
}
