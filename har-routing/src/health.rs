//! Backend health monitoring.
//!
//! Maintains a map from backend key (`<type>:<name>`) to health status and
//! answers `is_healthy` in O(1) from that map. A background task probes all
//! registered backends on a fixed interval with a per-probe timeout; an
//! administrator override wins until the next scheduled probe overwrites
//! it. The routing path fails open: an absent or unknown state reads as
//! healthy so a degraded checker never drops all traffic.

use crate::backend::{Backend, HealthProbe, HealthStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Health checker configuration.
#[derive(Debug, Clone)]
pub struct HealthCheckerConfig {
    /// Interval between scheduled probe rounds.
    pub check_interval: Duration,
    /// Timeout for each probe.
    pub check_timeout: Duration,
    /// Treat unknown/unprobed backends as healthy.
    pub fail_open: bool,
}

impl Default for HealthCheckerConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            check_timeout: Duration::from_secs(5),
            fail_open: true,
        }
    }
}

/// Result of a single probe.
#[derive(Debug, Clone)]
struct ProbeOutcome {
    status: HealthStatus,
    error: Option<String>,
}

/// Tracked state per backend.
#[derive(Debug, Clone)]
struct BackendHealth {
    status: HealthStatus,
    /// Set by `set_health`; cleared when the next scheduled probe lands.
    overridden: bool,
    last_error: Option<String>,
    #[allow(dead_code)] // Will be used by a status API
    last_checked: Option<Instant>,
}

impl Default for BackendHealth {
    fn default() -> Self {
        Self {
            status: HealthStatus::Unknown,
            overridden: false,
            last_error: None,
            last_checked: None,
        }
    }
}

/// User-supplied probe callback, registered by name.
pub type ProbeFn = Arc<dyn Fn() -> HealthStatus + Send + Sync>;

/// Health state service: single writer (the poller plus admin overrides),
/// many readers on the routing path.
pub struct HealthChecker {
    config: HealthCheckerConfig,
    states: Arc<RwLock<HashMap<String, BackendHealth>>>,
    functions: Arc<RwLock<HashMap<String, ProbeFn>>>,
    running: Arc<RwLock<bool>>,
}

impl HealthChecker {
    pub fn new(config: HealthCheckerConfig) -> Self {
        Self {
            config,
            states: Arc::new(RwLock::new(HashMap::new())),
            functions: Arc::new(RwLock::new(HashMap::new())),
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Register a named callback for `function` probes.
    pub async fn register_function(&self, name: impl Into<String>, probe: ProbeFn) {
        self.functions.write().await.insert(name.into(), probe);
    }

    /// Administrator override; sticky until the next scheduled probe.
    pub async fn set_health(&self, backend_key: &str, status: HealthStatus) {
        let mut states = self.states.write().await;
        let entry = states.entry(backend_key.to_string()).or_default();
        entry.status = status;
        entry.overridden = true;
        info!("health override: {backend_key} -> {status}");
    }

    /// Current status; `Unknown` when never probed.
    pub async fn status(&self, backend_key: &str) -> HealthStatus {
        self.states
            .read()
            .await
            .get(backend_key)
            .map(|state| state.status)
            .unwrap_or_default()
    }

    /// True while an administrator override is in force.
    pub async fn is_overridden(&self, backend_key: &str) -> bool {
        self.states
            .read()
            .await
            .get(backend_key)
            .is_some_and(|state| state.overridden)
    }

    /// Last probe error for a backend, if any.
    pub async fn last_error(&self, backend_key: &str) -> Option<String> {
        self.states
            .read()
            .await
            .get(backend_key)
            .and_then(|state| state.last_error.clone())
    }

    /// Routing-path liveness answer. Degraded backends stay usable;
    /// unknown state fails open (configurable), and the audit log records
    /// every such degraded-open decision.
    pub async fn is_healthy(&self, backend: &Backend) -> bool {
        match self.status(&backend.key()).await {
            HealthStatus::Healthy | HealthStatus::Degraded => true,
            HealthStatus::Unhealthy => false,
            HealthStatus::Unknown => {
                if self.config.fail_open {
                    warn!("backend {} health unknown, failing open", backend.key());
                }
                self.config.fail_open
            }
        }
    }

    /// Drop unhealthy candidates, preserving order.
    pub async fn filter_healthy(&self, candidates: Vec<Backend>) -> Vec<Backend> {
        let mut survivors = Vec::with_capacity(candidates.len());
        for backend in candidates {
            if self.is_healthy(&backend).await {
                survivors.push(backend);
            } else {
                debug!("dropping unhealthy backend {}", backend.key());
            }
        }
        survivors
    }

    /// Probe one backend now and record the outcome, clearing any
    /// administrator override.
    pub async fn check_now(&self, backend: &Backend) {
        let outcome = probe_backend(backend, &self.config, &self.functions).await;
        let mut states = self.states.write().await;
        let entry = states.entry(backend.key()).or_default();
        entry.status = outcome.status;
        entry.overridden = false;
        entry.last_error = outcome.error;
        entry.last_checked = Some(Instant::now());
    }

    /// Start the background poller over a fixed backend set.
    pub fn start(&self, backends: Vec<Backend>) -> tokio::task::JoinHandle<()> {
        let config = self.config.clone();
        let states = Arc::clone(&self.states);
        let functions = Arc::clone(&self.functions);
        let running = Arc::clone(&self.running);

        tokio::spawn(async move {
            *running.write().await = true;
            let mut ticker = interval(config.check_interval);
            info!(
                "health checker started ({} backends, interval {:?})",
                backends.len(),
                config.check_interval
            );

            loop {
                ticker.tick().await;
                if !*running.read().await {
                    info!("health checker stopping");
                    break;
                }
                for backend in &backends {
                    let outcome = probe_backend(backend, &config, &functions).await;
                    if outcome.status != HealthStatus::Healthy {
                        warn!(
                            "backend {} is {}: {:?}",
                            backend.key(),
                            outcome.status,
                            outcome.error
                        );
                    }
                    let mut states = states.write().await;
                    let entry = states.entry(backend.key()).or_default();
                    entry.status = outcome.status;
                    entry.overridden = false;
                    entry.last_error = outcome.error;
                    entry.last_checked = Some(Instant::now());
                }
            }
        })
    }

    /// Stop the background poller after its current round.
    pub async fn stop(&self) {
        *self.running.write().await = false;
    }

    /// Snapshot of all tracked states.
    pub async fn all_statuses(&self) -> Vec<(String, HealthStatus)> {
        self.states
            .read()
            .await
            .iter()
            .map(|(key, state)| (key.clone(), state.status))
            .collect()
    }
}

async fn probe_backend(
    backend: &Backend,
    config: &HealthCheckerConfig,
    functions: &Arc<RwLock<HashMap<String, ProbeFn>>>,
) -> ProbeOutcome {
    let Some(probe) = &backend.health_check else {
        // No check configured: trust the backend.
        return ProbeOutcome {
            status: HealthStatus::Healthy,
            error: None,
        };
    };

    match probe {
        HealthProbe::Http { url } => probe_http(url.clone(), config.check_timeout).await,
        HealthProbe::Tcp { host, port } => probe_tcp(host, *port, config.check_timeout).await,
        HealthProbe::Function { name } => {
            let functions = functions.read().await;
            match functions.get(name) {
                Some(callback) => ProbeOutcome {
                    status: callback(),
                    error: None,
                },
                None => ProbeOutcome {
                    status: HealthStatus::Unhealthy,
                    error: Some(format!("no probe function registered as {name:?}")),
                },
            }
        }
    }
}

/// HTTP probe via a blocking client on the blocking pool. 2xx → healthy,
/// 5xx → unhealthy, other statuses → degraded, transport error → unhealthy.
async fn probe_http(url: String, timeout: Duration) -> ProbeOutcome {
    let result = tokio::task::spawn_blocking(move || {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        let agent: ureq::Agent = config.into();
        agent.get(&url).call()
    })
    .await;

    match result {
        Ok(Ok(response)) => {
            let code = response.status().as_u16();
            let status = match code {
                200..=299 => HealthStatus::Healthy,
                500..=599 => HealthStatus::Unhealthy,
                _ => HealthStatus::Degraded,
            };
            ProbeOutcome {
                status,
                error: (status != HealthStatus::Healthy).then(|| format!("HTTP {code}")),
            }
        }
        Ok(Err(err)) => ProbeOutcome {
            status: HealthStatus::Unhealthy,
            error: Some(err.to_string()),
        },
        Err(join_err) => ProbeOutcome {
            status: HealthStatus::Unhealthy,
            error: Some(join_err.to_string()),
        },
    }
}

async fn probe_tcp(host: &str, port: u16, timeout: Duration) -> ProbeOutcome {
    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => ProbeOutcome {
            status: HealthStatus::Healthy,
            error: None,
        },
        Ok(Err(err)) => ProbeOutcome {
            status: HealthStatus::Unhealthy,
            error: Some(err.to_string()),
        },
        Err(_) => ProbeOutcome {
            status: HealthStatus::Unhealthy,
            error: Some(format!("connect timeout after {timeout:?}")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendType;

    fn checker() -> Arc<HealthChecker> {
        Arc::new(HealthChecker::new(HealthCheckerConfig::default()))
    }

    fn backend(name: &str) -> Backend {
        Backend::new(name, BackendType::Remote)
    }

    #[tokio::test]
    async fn test_unknown_backend_fails_open() {
        let checker = checker();
        assert!(checker.is_healthy(&backend("never-seen")).await);
        assert_eq!(checker.status("remote:never-seen").await, HealthStatus::Unknown);
    }

    #[tokio::test]
    async fn test_fail_closed_configuration() {
        let config = HealthCheckerConfig {
            fail_open: false,
            ..Default::default()
        };
        let checker = HealthChecker::new(config);
        assert!(!checker.is_healthy(&backend("never-seen")).await);
    }

    #[tokio::test]
    async fn test_admin_override_and_filter() {
        let checker = checker();
        checker.set_health("remote:bad", HealthStatus::Unhealthy).await;
        assert!(checker.is_overridden("remote:bad").await);

        let candidates = vec![backend("good"), backend("bad")];
        let survivors = checker.filter_healthy(candidates).await;
        let names: Vec<_> = survivors.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["good"]);
    }

    #[tokio::test]
    async fn test_scheduled_probe_overwrites_override() {
        let checker = checker();
        let probed = backend("flappy");
        checker.set_health(&probed.key(), HealthStatus::Unhealthy).await;
        assert!(!checker.is_healthy(&probed).await);

        // no probe configured: the check treats the backend as healthy
        checker.check_now(&probed).await;
        assert!(checker.is_healthy(&probed).await);
        assert_eq!(checker.status(&probed.key()).await, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_function_probe() {
        let checker = checker();
        checker
            .register_function("always-degraded", Arc::new(|| HealthStatus::Degraded))
            .await;

        let probed = backend("fn-backed").with_health_check(HealthProbe::Function {
            name: "always-degraded".to_string(),
        });
        checker.check_now(&probed).await;
        assert_eq!(checker.status(&probed.key()).await, HealthStatus::Degraded);
        // degraded still passes the routing filter
        assert!(checker.is_healthy(&probed).await);
    }

    #[tokio::test]
    async fn test_unregistered_function_is_unhealthy() {
        let checker = checker();
        let probed = backend("ghost-fn").with_health_check(HealthProbe::Function {
            name: "missing".to_string(),
        });
        checker.check_now(&probed).await;
        assert_eq!(checker.status(&probed.key()).await, HealthStatus::Unhealthy);
        assert!(checker.last_error(&probed.key()).await.is_some());
    }

    #[tokio::test]
    async fn test_tcp_probe_connection_refused() {
        let checker = checker();
        // a port nothing listens on
        let probed = backend("dead-tcp").with_health_check(HealthProbe::Tcp {
            host: "127.0.0.1".to_string(),
            port: 1,
        });
        checker.check_now(&probed).await;
        assert_eq!(checker.status(&probed.key()).await, HealthStatus::Unhealthy);
    }
}
