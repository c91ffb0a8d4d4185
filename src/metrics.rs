use crate::alerts::{Alert, AlertLevel};
use crate::state::{ServiceStatus, Snapshot};
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    device: String,
    started_at_unix: i64,
    // Write side spans a whole cycle's update, read side spans a scrape.
    publish: Arc<RwLock<()>>,
    pub gpu_utilization_percent: GaugeVec,
    pub gpu_temperature_celsius: GaugeVec,
    pub gpu_memory_percent: GaugeVec,
    pub gpu_memory_mb: GaugeVec,
    pub service_models_loaded_total: Gauge,
    pub service_up: Gauge,
    pub system_cpu_percent: Gauge,
    pub system_memory_percent: Gauge,
    pub system_disk_percent: Gauge,
    pub system_load_average: GaugeVec,
    pub monitor_uptime_seconds: Gauge,
    pub monitor_scrape_count_total: Counter,
    pub monitor_collect_errors_total: CounterVec,
    pub monitor_last_collect_timestamp_seconds: Gauge,
    pub monitor_history_samples: Gauge,
    pub monitor_active_alerts: GaugeVec,
}

impl Metrics {
    pub fn new(device: &str) -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let gpu_utilization_percent = GaugeVec::new(
            opts!(
                "gpu_utilization_percent",
                "GPU utilization in percent (omitted when unavailable)"
            ),
            &["device"],
        )?;
        let gpu_temperature_celsius = GaugeVec::new(
            opts!(
                "gpu_temperature_celsius",
                "GPU temperature in Celsius (omitted when unavailable)"
            ),
            &["device"],
        )?;
        let gpu_memory_percent = GaugeVec::new(
            opts!(
                "gpu_memory_percent",
                "GPU memory usage in percent (omitted when unavailable)"
            ),
            &["device"],
        )?;
        let gpu_memory_mb = GaugeVec::new(
            opts!("gpu_memory_mb", "GPU memory in MB by kind (used/total/available)"),
            &["device", "kind"],
        )?;
        let service_models_loaded_total = Gauge::with_opts(opts!(
            "service_models_loaded_total",
            "Number of models reported by the inference service"
        ))?;
        let service_up = Gauge::with_opts(opts!(
            "service_up",
            "Inference service status 0/1 (1 when running)"
        ))?;
        let system_cpu_percent =
            Gauge::with_opts(opts!("system_cpu_percent", "System CPU usage in percent"))?;
        let system_memory_percent = Gauge::with_opts(opts!(
            "system_memory_percent",
            "System memory usage in percent"
        ))?;
        let system_disk_percent =
            Gauge::with_opts(opts!("system_disk_percent", "System disk usage in percent"))?;
        let system_load_average = GaugeVec::new(
            opts!("system_load_average", "System load average by window"),
            &["window"],
        )?;
        let monitor_uptime_seconds =
            Gauge::with_opts(opts!("monitor_uptime_seconds", "Monitor uptime in seconds"))?;
        let monitor_scrape_count_total = Counter::with_opts(opts!(
            "monitor_scrape_count_total",
            "Number of /metrics scrapes"
        ))?;
        let monitor_collect_errors_total = CounterVec::new(
            opts!(
                "monitor_collect_errors_total",
                "Unavailable readings and failed cycles by collector"
            ),
            &["collector"],
        )?;
        let monitor_last_collect_timestamp_seconds = Gauge::with_opts(opts!(
            "monitor_last_collect_timestamp_seconds",
            "Unix timestamp of the last completed collection cycle"
        ))?;
        let monitor_history_samples = Gauge::with_opts(opts!(
            "monitor_history_samples",
            "Number of snapshots retained in history"
        ))?;
        let monitor_active_alerts = GaugeVec::new(
            opts!("monitor_active_alerts", "Active alerts by level"),
            &["level"],
        )?;

        register(&registry, &gpu_utilization_percent)?;
        register(&registry, &gpu_temperature_celsius)?;
        register(&registry, &gpu_memory_percent)?;
        register(&registry, &gpu_memory_mb)?;
        register(&registry, &service_models_loaded_total)?;
        register(&registry, &service_up)?;
        register(&registry, &system_cpu_percent)?;
        register(&registry, &system_memory_percent)?;
        register(&registry, &system_disk_percent)?;
        register(&registry, &system_load_average)?;
        register(&registry, &monitor_uptime_seconds)?;
        register(&registry, &monitor_scrape_count_total)?;
        register(&registry, &monitor_collect_errors_total)?;
        register(&registry, &monitor_last_collect_timestamp_seconds)?;
        register(&registry, &monitor_history_samples)?;
        register(&registry, &monitor_active_alerts)?;

        Ok(Arc::new(Self {
            registry,
            device: device.to_string(),
            started_at_unix: now_unix(),
            publish: Arc::new(RwLock::new(())),
            gpu_utilization_percent,
            gpu_temperature_celsius,
            gpu_memory_percent,
            gpu_memory_mb,
            service_models_loaded_total,
            service_up,
            system_cpu_percent,
            system_memory_percent,
            system_disk_percent,
            system_load_average,
            monitor_uptime_seconds,
            monitor_scrape_count_total,
            monitor_collect_errors_total,
            monitor_last_collect_timestamp_seconds,
            monitor_history_samples,
            monitor_active_alerts,
        }))
    }

    pub fn update_from_snapshot(
        &self,
        snapshot: &Snapshot,
        alerts: &[Alert],
        history_samples: usize,
    ) {
        let _publish = self
            .publish
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        self.gpu_utilization_percent.reset();
        self.gpu_temperature_celsius.reset();
        self.gpu_memory_percent.reset();
        self.gpu_memory_mb.reset();
        self.monitor_active_alerts.reset();

        let device = self.device.as_str();
        if let Some(v) = snapshot.gpu.utilization {
            self.gpu_utilization_percent
                .with_label_values(&[device])
                .set(v);
        }
        if let Some(v) = snapshot.gpu.temperature {
            self.gpu_temperature_celsius
                .with_label_values(&[device])
                .set(v);
        }
        if let Some(mem) = snapshot.gpu.memory {
            self.gpu_memory_percent
                .with_label_values(&[device])
                .set(mem.percent);
            self.gpu_memory_mb
                .with_label_values(&[device, "used"])
                .set(mem.used_mb);
            self.gpu_memory_mb
                .with_label_values(&[device, "total"])
                .set(mem.total_mb);
            self.gpu_memory_mb
                .with_label_values(&[device, "available"])
                .set(mem.available_mb);
        }

        let running = snapshot.service.status == ServiceStatus::Running;
        self.service_up.set(if running { 1.0 } else { 0.0 });
        self.service_models_loaded_total
            .set(snapshot.service.models_loaded as f64);

        let sys = &snapshot.system;
        self.system_cpu_percent.set(sys.cpu_percent);
        self.system_memory_percent.set(sys.memory_percent);
        self.system_disk_percent.set(sys.disk_percent);
        let (one, five, fifteen) = sys.load_average;
        self.system_load_average.with_label_values(&["1m"]).set(one);
        self.system_load_average.with_label_values(&["5m"]).set(five);
        self.system_load_average
            .with_label_values(&["15m"])
            .set(fifteen);

        for level in [AlertLevel::Warning, AlertLevel::Critical] {
            let count = alerts.iter().filter(|a| a.level == level).count();
            self.monitor_active_alerts
                .with_label_values(&[level.as_str()])
                .set(count as f64);
        }

        self.monitor_history_samples.set(history_samples as f64);
        self.monitor_last_collect_timestamp_seconds
            .set(snapshot.collected_at_unix_ms as f64 / 1000.0);
        self.refresh_uptime();
    }

    pub fn inc_scrape_count(&self) {
        self.monitor_scrape_count_total.inc();
    }

    pub fn inc_collect_error(&self, collector: &str) {
        self.monitor_collect_errors_total
            .with_label_values(&[collector])
            .inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        self.refresh_uptime();
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = {
            let _publish = self.publish.read().unwrap_or_else(PoisonError::into_inner);
            self.registry.gather()
        };
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }

    fn refresh_uptime(&self) {
        let uptime = now_unix().saturating_sub(self.started_at_unix) as f64;
        self.monitor_uptime_seconds.set(uptime);
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
