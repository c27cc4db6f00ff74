//! Per-instance health monitor.
//!
//! Owned by the service instance it watches. Startup runs an immediate
//! self-probe: failure aborts startup (an instance with no viable backing
//! store must never advertise availability), success registers the instance
//! and starts the periodic probe loop. Every periodic probe reports through
//! `update_health` regardless of outcome, which doubles as lease renewal; a
//! failing probe flips the reported status to unhealthy but never stops the
//! loop.
//!
//! The in-memory state machine is the probe's own bookkeeping. Discovery
//! visibility is governed by the store-side lease alone: an instance can
//! believe itself registered while already expired from discovery's point
//! of view.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use lattice_core::{HealthCheck, HealthStatus, ServiceDefinition, ServiceHealth};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::config::MonitorConfig;
use crate::registry::ServiceRegistry;

// ---------------------------------------------------------------------------
// HealthProbe
// ---------------------------------------------------------------------------

/// A self-probe supplied by the service instance, e.g. "can this instance
/// reach its backing data store".
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Runs the checks. `Err` reads as an unhealthy probe; `Ok` derives the
    /// status from the worst individual check outcome.
    async fn probe(&self) -> anyhow::Result<Vec<HealthCheck>>;
}

/// One probe pass, normalized to a status plus its checks.
async fn run_probe(probe: &dyn HealthProbe) -> (HealthStatus, Vec<HealthCheck>) {
    match probe.probe().await {
        Ok(checks) => (HealthStatus::from_checks(&checks), checks),
        Err(err) => (
            HealthStatus::Unhealthy,
            vec![HealthCheck::fail("probe", err.to_string())],
        ),
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Monitor lifecycle state.
///
/// `Unregistered -> Registered(status) <-> Registered(status') -> Deregistered`
/// (terminal). Lease expiry is an external, implicit transition to
/// absent-from-discovery that this state machine does not observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Unregistered,
    Registered(HealthStatus),
    Deregistered,
}

// ---------------------------------------------------------------------------
// HealthMonitor
// ---------------------------------------------------------------------------

/// Periodic self-probe driving registration, lease renewal, and health.
pub struct HealthMonitor {
    definition: ServiceDefinition,
    registry: Arc<ServiceRegistry>,
    probe: Arc<dyn HealthProbe>,
    config: MonitorConfig,
    state: Arc<ArcSwap<MonitorState>>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(
        definition: ServiceDefinition,
        registry: Arc<ServiceRegistry>,
        probe: Arc<dyn HealthProbe>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            definition,
            registry,
            probe,
            config,
            state: Arc::new(ArcSwap::from_pointee(MonitorState::Unregistered)),
            shutdown: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Current state machine position (the probe's own bookkeeping).
    #[must_use]
    pub fn state(&self) -> MonitorState {
        **self.state.load()
    }

    /// Id of the monitored instance.
    #[must_use]
    pub fn service_id(&self) -> &str {
        &self.definition.id
    }

    /// Runs the startup probe, registers the instance, and starts the
    /// periodic probe loop.
    ///
    /// # Errors
    ///
    /// Fails when the startup probe errors or reports unhealthy, when the
    /// registration publish hits a configuration error, or when the monitor
    /// was already started or stopped.
    pub async fn start(&self) -> anyhow::Result<()> {
        if self.shutdown.lock().is_some() {
            anyhow::bail!("health monitor already started");
        }
        if self.state() == MonitorState::Deregistered {
            anyhow::bail!("health monitor is stopped and cannot be restarted");
        }

        let (status, checks) = run_probe(self.probe.as_ref()).await;
        if status == HealthStatus::Unhealthy {
            let detail = checks
                .iter()
                .map(|c| format!("{}: {}", c.name, c.output))
                .collect::<Vec<_>>()
                .join("; ");
            anyhow::bail!("startup probe failed: {detail}");
        }

        let mut definition = self.definition.clone();
        definition.health = ServiceHealth::from_checks(status, checks);
        self.registry.register(&definition).await?;
        self.state.store(Arc::new(MonitorState::Registered(status)));
        info!(
            service_id = %definition.id,
            service_name = %definition.name,
            status = status.as_str(),
            "health monitor started"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.shutdown.lock() = Some(shutdown_tx);
        *self.task.lock() = Some(tokio::spawn(probe_loop(
            self.definition.id.clone(),
            self.registry.clone(),
            self.probe.clone(),
            self.config.clone(),
            self.state.clone(),
            shutdown_rx,
        )));
        Ok(())
    }

    /// Cancels the probe loop and deregisters the instance. Idempotent:
    /// later calls are no-ops. A failed deregistration is logged, never
    /// returned, so shutdown always proceeds.
    pub async fn stop(&self) {
        let Some(shutdown_tx) = self.shutdown.lock().take() else {
            return;
        };
        let _ = shutdown_tx.send(true);

        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }

        if let Err(err) = self.registry.deregister(&self.definition.id).await {
            warn!(
                service_id = %self.definition.id,
                error = %err,
                "deregistration failed during shutdown"
            );
        }
        self.state.store(Arc::new(MonitorState::Deregistered));
        info!(service_id = %self.definition.id, "health monitor stopped");
    }
}

/// The periodic probe loop. Probes are serialized per instance: ticks that
/// fire while a probe is still running are skipped, never stacked.
async fn probe_loop(
    service_id: String,
    registry: Arc<ServiceRegistry>,
    probe: Arc<dyn HealthProbe>,
    config: MonitorConfig,
    state: Arc<ArcSwap<MonitorState>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(config.probe_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The startup probe already ran; consume the immediate first tick.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let (status, checks) = run_probe(probe.as_ref()).await;

                // Always report, even on failure: the write renews the lease.
                if let Err(err) = registry.update_health(&service_id, status, checks).await {
                    warn!(service_id = %service_id, error = %err, "health report rejected");
                }

                let previous = **state.load();
                if previous != MonitorState::Registered(status) {
                    info!(
                        service_id = %service_id,
                        status = status.as_str(),
                        "health status changed"
                    );
                }
                state.store(Arc::new(MonitorState::Registered(status)));
            }
            _ = shutdown_rx.changed() => break,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    use crate::bus::EventBus;
    use crate::config::{BusConfig, RegistryConfig};
    use crate::store::MemoryStore;

    use super::*;

    /// Probe whose outcome can be flipped between passes.
    struct SwitchProbe {
        healthy: AtomicBool,
        passes: AtomicU32,
    }

    impl SwitchProbe {
        fn new(healthy: bool) -> Arc<Self> {
            Arc::new(Self {
                healthy: AtomicBool::new(healthy),
                passes: AtomicU32::new(0),
            })
        }

        fn set_healthy(&self, healthy: bool) {
            self.healthy.store(healthy, Ordering::SeqCst);
        }

        fn pass_count(&self) -> u32 {
            self.passes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HealthProbe for SwitchProbe {
        async fn probe(&self) -> anyhow::Result<Vec<HealthCheck>> {
            self.passes.fetch_add(1, Ordering::SeqCst);
            if self.healthy.load(Ordering::SeqCst) {
                Ok(vec![HealthCheck::pass("database", "ok", 2.0)])
            } else {
                Err(anyhow::anyhow!("database connection refused"))
            }
        }
    }

    struct Fixture {
        registry: Arc<ServiceRegistry>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(EventBus::new(BusConfig::default(), None));
        let registry = Arc::new(ServiceRegistry::new(
            Some(store as Arc<dyn crate::store::CoordinationStore>),
            bus,
            RegistryConfig::default(),
        ));
        Fixture { registry }
    }

    fn monitor(fx: &Fixture, probe: Arc<SwitchProbe>, interval: Duration) -> HealthMonitor {
        HealthMonitor::new(
            ServiceDefinition::new("document-service", "2.0.0", "http://localhost:3000", vec![]),
            fx.registry.clone(),
            probe,
            MonitorConfig {
                probe_interval: interval,
            },
        )
    }

    #[tokio::test]
    async fn successful_startup_registers_the_instance() {
        let fx = fixture();
        let monitor = monitor(&fx, SwitchProbe::new(true), Duration::from_secs(30));

        monitor.start().await.unwrap();

        assert_eq!(monitor.state(), MonitorState::Registered(HealthStatus::Healthy));
        let found = fx.registry.discover("document-service").await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, monitor.service_id());

        monitor.stop().await;
    }

    #[tokio::test]
    async fn failed_startup_probe_aborts_and_never_registers() {
        let fx = fixture();
        let monitor = monitor(&fx, SwitchProbe::new(false), Duration::from_secs(30));

        assert!(monitor.start().await.is_err());
        assert_eq!(monitor.state(), MonitorState::Unregistered);
        assert!(fx.registry.discover("document-service").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn probe_failure_flips_state_but_keeps_the_loop_running() {
        let fx = fixture();
        let probe = SwitchProbe::new(true);
        let monitor = monitor(&fx, probe.clone(), Duration::from_secs(30));
        monitor.start().await.unwrap();
        // Let the spawned loop create its interval before moving the clock.
        tokio::time::sleep(Duration::from_millis(1)).await;

        probe.set_healthy(false);
        tokio::time::advance(Duration::from_secs(31)).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(
            monitor.state(),
            MonitorState::Registered(HealthStatus::Unhealthy)
        );
        // Discovery excludes the instance while it reports unhealthy.
        assert!(fx.registry.discover("document-service").await.is_empty());

        // Recovery on a later tick, proving the loop survived the failure.
        probe.set_healthy(true);
        tokio::time::advance(Duration::from_secs(31)).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(
            monitor.state(),
            MonitorState::Registered(HealthStatus::Healthy)
        );
        assert_eq!(fx.registry.discover("document-service").await.len(), 1);

        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_probe_reports_every_interval() {
        let fx = fixture();
        let probe = SwitchProbe::new(true);
        let monitor = monitor(&fx, probe.clone(), Duration::from_secs(30));
        monitor.start().await.unwrap();
        // Let the spawned loop create its interval before moving the clock.
        tokio::time::sleep(Duration::from_millis(1)).await;
        let after_start = probe.pass_count();

        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(31)).await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(probe.pass_count(), after_start + 3);

        monitor.stop().await;
    }

    #[tokio::test]
    async fn stop_deregisters_and_is_idempotent() {
        let fx = fixture();
        let monitor = monitor(&fx, SwitchProbe::new(true), Duration::from_secs(30));
        monitor.start().await.unwrap();

        monitor.stop().await;
        assert_eq!(monitor.state(), MonitorState::Deregistered);
        assert!(fx.registry.discover("document-service").await.is_empty());

        // Second stop is a no-op.
        monitor.stop().await;
        assert_eq!(monitor.state(), MonitorState::Deregistered);
    }

    #[tokio::test]
    async fn restart_after_stop_is_rejected() {
        let fx = fixture();
        let monitor = monitor(&fx, SwitchProbe::new(true), Duration::from_secs(30));
        monitor.start().await.unwrap();
        monitor.stop().await;

        assert!(monitor.start().await.is_err());
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let fx = fixture();
        let monitor = monitor(&fx, SwitchProbe::new(true), Duration::from_secs(30));
        monitor.start().await.unwrap();

        assert!(monitor.start().await.is_err());
        monitor.stop().await;
    }
}
