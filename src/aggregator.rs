use crate::alerts::evaluate;
use crate::collectors::TelemetrySource;
use crate::config::AlertThresholds;
use crate::metrics::Metrics;
use crate::state::{now_unix_ms, MonitorState, Snapshot};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

pub struct Aggregator<S> {
    source: S,
    state: Arc<RwLock<MonitorState>>,
    metrics: Arc<Metrics>,
    thresholds: AlertThresholds,
}

impl<S: TelemetrySource> Aggregator<S> {
    pub fn new(
        source: S,
        state: Arc<RwLock<MonitorState>>,
        metrics: Arc<Metrics>,
        thresholds: AlertThresholds,
    ) -> Self {
        Self {
            source,
            state,
            metrics,
            thresholds,
        }
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub async fn collect(&mut self) -> Arc<Snapshot> {
        let readings = self.source.read().await;
        for sensor in &readings.unavailable {
            self.metrics.inc_collect_error(sensor);
        }

        let snapshot = Snapshot::new(
            readings.gpu,
            readings.service,
            readings.system,
            now_unix_ms(),
        );

        let (snapshot, samples) = {
            let mut guard = self.state.write().await;
            let snapshot = guard.record(snapshot);
            (snapshot, guard.len())
        };

        let alerts = evaluate(&snapshot, &self.thresholds);
        self.metrics.update_from_snapshot(&snapshot, &alerts, samples);
        debug!(
            samples,
            alerts = alerts.len(),
            service = %snapshot.service.status,
            "цикл сбора завершён"
        );
        snapshot
    }
}
