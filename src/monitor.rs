use crate::aggregator::Aggregator;
use crate::alerts::{evaluate, Alert};
use crate::collectors::TelemetrySource;
use crate::config::AlertThresholds;
use crate::metrics::Metrics;
use crate::state::{
    now_unix_ms, unix_seconds_f64, GpuMemory, MonitorState, ServiceStatus, Snapshot, SystemStats,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

const UNKNOWN: &str = "unknown";

#[derive(Clone)]
pub struct Monitor {
    state: Arc<RwLock<MonitorState>>,
    thresholds: AlertThresholds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
    Online,
    Offline,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: f64,
    pub components: Components,
}

#[derive(Debug, Clone, Serialize)]
pub struct Components {
    pub gpu: ComponentState,
    pub service: String,
    pub system: ComponentState,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub gpu: GpuView,
    pub service: ServiceView,
    pub system: Option<SystemStats>,
    pub alerts: AlertsView,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GpuView {
    pub utilization: Option<f64>,
    pub temperature: Option<f64>,
    pub memory: Option<GpuMemory>,
    pub status: ComponentState,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceView {
    pub status: String,
    pub models_loaded: u64,
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertsView {
    pub count: usize,
    pub alerts: Vec<Alert>,
}

impl Monitor {
    pub fn new(history_size: usize, thresholds: AlertThresholds) -> Self {
        Self {
            state: Arc::new(RwLock::new(MonitorState::new(history_size))),
            thresholds,
        }
    }

    pub fn aggregator<S: TelemetrySource>(
        &self,
        source: S,
        metrics: Arc<Metrics>,
    ) -> Aggregator<S> {
        Aggregator::new(source, Arc::clone(&self.state), metrics, self.thresholds)
    }

    pub async fn latest(&self) -> Option<Arc<Snapshot>> {
        self.state.read().await.latest()
    }

    pub async fn history_since(&self, minutes: u64) -> Vec<Arc<Snapshot>> {
        self.history_since_at(minutes, now_unix_ms()).await
    }

    pub async fn history_since_at(&self, minutes: u64, now_unix_ms: i64) -> Vec<Arc<Snapshot>> {
        let window_ms = i64::try_from(minutes.saturating_mul(60_000)).unwrap_or(i64::MAX);
        let cutoff = now_unix_ms.saturating_sub(window_ms);
        self.state.read().await.history_since(cutoff)
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        match self.latest().await {
            Some(snapshot) => evaluate(&snapshot, &self.thresholds),
            None => Vec::new(),
        }
    }

    pub async fn health(&self) -> HealthReport {
        let latest = self.latest().await;
        health_report(latest.as_deref(), now_unix_ms())
    }

    pub async fn status(&self) -> StatusReport {
        let latest = self.latest().await;
        let alerts = match &latest {
            Some(snapshot) => evaluate(snapshot, &self.thresholds),
            None => Vec::new(),
        };
        let snapshot = latest.as_deref();

        StatusReport {
            gpu: GpuView {
                utilization: snapshot.and_then(|s| s.gpu.utilization),
                temperature: snapshot.and_then(|s| s.gpu.temperature),
                memory: snapshot.and_then(|s| s.gpu.memory),
                status: gpu_state(snapshot),
            },
            service: ServiceView {
                status: service_label(snapshot),
                models_loaded: snapshot.map(|s| s.service.models_loaded).unwrap_or(0),
                models: snapshot
                    .map(|s| s.service.model_names.clone())
                    .unwrap_or_default(),
            },
            system: snapshot.map(|s| s.system),
            alerts: AlertsView {
                count: alerts.len(),
                alerts,
            },
            timestamp: unix_seconds_f64(now_unix_ms()),
        }
    }
}

fn health_report(snapshot: Option<&Snapshot>, now_unix_ms: i64) -> HealthReport {
    let running = snapshot.map(|s| s.service.status) == Some(ServiceStatus::Running);
    HealthReport {
        status: if running {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        },
        timestamp: unix_seconds_f64(now_unix_ms),
        components: Components {
            gpu: gpu_state(snapshot),
            service: service_label(snapshot),
            system: ComponentState::Online,
        },
    }
}

fn gpu_state(snapshot: Option<&Snapshot>) -> ComponentState {
    match snapshot.and_then(|s| s.gpu.utilization) {
        Some(_) => ComponentState::Online,
        None => ComponentState::Offline,
    }
}

fn service_label(snapshot: Option<&Snapshot>) -> String {
    snapshot
        .map(|s| s.service.status.as_str())
        .unwrap_or(UNKNOWN)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{snapshot_at, ServiceStats};

    async fn record(monitor: &Monitor, snapshot: Snapshot) {
        monitor.state.write().await.record(snapshot);
    }

    #[tokio::test]
    async fn empty_monitor_is_degraded_and_quiet() {
        let monitor = Monitor::new(10, AlertThresholds::default());
        assert!(monitor.latest().await.is_none());
        assert!(monitor.alerts().await.is_empty());

        let health = monitor.health().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.components.service, "unknown");
        assert_eq!(health.components.gpu, ComponentState::Offline);
    }

    #[tokio::test]
    async fn offline_service_degrades_health() {
        let monitor = Monitor::new(10, AlertThresholds::default());
        let mut snapshot = snapshot_at(1_000);
        snapshot.service = ServiceStats::offline("Connection refused");
        snapshot.gpu.utilization = Some(12.0);
        record(&monitor, snapshot).await;

        let health = monitor.health().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.components.service, "offline");
        assert_eq!(health.components.gpu, ComponentState::Online);
        assert_eq!(health.components.system, ComponentState::Online);
    }

    #[tokio::test]
    async fn running_service_is_healthy_even_without_gpu() {
        let monitor = Monitor::new(10, AlertThresholds::default());
        record(&monitor, snapshot_at(1_000)).await;

        let json = serde_json::to_value(monitor.health().await).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["components"]["gpu"], "offline");
        assert_eq!(json["components"]["service"], "running");
    }

    #[tokio::test]
    async fn history_window_after_ten_cycles_five_seconds_apart() {
        let monitor = Monitor::new(3600, AlertThresholds::default());
        let start = 1_700_000_000_000_i64;
        for i in 0..10 {
            record(&monitor, snapshot_at(start + i * 5_000)).await;
        }

        let now = start + 9 * 5_000 + 1_000;
        let window = monitor.history_since_at(60, now).await;
        let times: Vec<i64> = window.iter().map(|s| s.collected_at_unix_ms).collect();
        let expected: Vec<i64> = (0..10).map(|i| start + i * 5_000).collect();
        assert_eq!(times, expected);

        // A one-minute window ending at +84s keeps samples from +25s on.
        let late = monitor.history_since_at(1, start + 84_000).await;
        assert_eq!(late.len(), 5);
        assert_eq!(late[0].collected_at_unix_ms, start + 25_000);
    }

    #[tokio::test]
    async fn alerts_follow_latest_snapshot() {
        let monitor = Monitor::new(10, AlertThresholds::default());
        let mut hot = snapshot_at(1_000);
        hot.gpu.temperature = Some(95.0);
        record(&monitor, hot).await;
        assert_eq!(monitor.alerts().await.len(), 1);

        record(&monitor, snapshot_at(2_000)).await;
        assert!(monitor.alerts().await.is_empty());
    }

    #[tokio::test]
    async fn status_combines_all_views() {
        let monitor = Monitor::new(10, AlertThresholds::default());
        let mut snapshot = snapshot_at(1_000);
        snapshot.gpu.utilization = Some(97.0);
        record(&monitor, snapshot).await;

        let status = monitor.status().await;
        assert_eq!(status.gpu.status, ComponentState::Online);
        assert_eq!(status.service.status, "running");
        assert_eq!(status.service.models, vec!["llama3:8b"]);
        assert_eq!(status.alerts.count, 1);
        assert!(status.system.is_some());
    }
}
