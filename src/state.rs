use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub gpu: GpuStats,
    pub service: ServiceStats,
    pub system: SystemStats,
    pub collected_at_unix_ms: i64,
    pub collected_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GpuStats {
    pub utilization: Option<f64>,
    pub memory: Option<GpuMemory>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpuMemory {
    pub total_mb: f64,
    pub used_mb: f64,
    pub available_mb: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Running,
    Offline,
    Error,
}

impl ServiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceStatus::Running => "running",
            ServiceStatus::Offline => "offline",
            ServiceStatus::Error => "error",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStats {
    pub status: ServiceStatus,
    pub models_loaded: u64,
    pub model_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceStats {
    pub fn running(model_names: Vec<String>) -> Self {
        Self {
            status: ServiceStatus::Running,
            models_loaded: model_names.len() as u64,
            model_names,
            status_code: None,
            error: None,
        }
    }

    pub fn offline(error: impl Into<String>) -> Self {
        Self {
            status: ServiceStatus::Offline,
            models_loaded: 0,
            model_names: Vec::new(),
            status_code: None,
            error: Some(error.into()),
        }
    }

    pub fn http_error(status_code: u16) -> Self {
        Self {
            status: ServiceStatus::Error,
            models_loaded: 0,
            model_names: Vec::new(),
            status_code: Some(status_code),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ServiceStatus::Error,
            models_loaded: 0,
            model_names: Vec::new(),
            status_code: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SystemStats {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub load_average: (f64, f64, f64),
}

impl Snapshot {
    pub fn new(
        gpu: GpuStats,
        service: ServiceStats,
        system: SystemStats,
        collected_at_unix_ms: i64,
    ) -> Self {
        Self {
            gpu,
            service,
            system,
            collected_at_unix_ms,
            collected_at: format_rfc3339_ms(collected_at_unix_ms),
        }
    }

    fn restamped(mut self, collected_at_unix_ms: i64) -> Self {
        self.collected_at_unix_ms = collected_at_unix_ms;
        self.collected_at = format_rfc3339_ms(collected_at_unix_ms);
        self
    }
}

#[derive(Debug)]
pub struct MonitorState {
    latest: Option<Arc<Snapshot>>,
    history: VecDeque<Arc<Snapshot>>,
    capacity: usize,
}

impl MonitorState {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            latest: None,
            history: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn record(&mut self, snapshot: Snapshot) -> Arc<Snapshot> {
        // History must stay ordered even if the wall clock steps back.
        let snapshot = match self.history.back() {
            Some(last) if snapshot.collected_at_unix_ms < last.collected_at_unix_ms => {
                snapshot.restamped(last.collected_at_unix_ms)
            }
            _ => snapshot,
        };

        let snapshot = Arc::new(snapshot);
        self.history.push_back(Arc::clone(&snapshot));
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
        self.latest = Some(Arc::clone(&snapshot));
        snapshot
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.latest.clone()
    }

    pub fn history_since(&self, cutoff_unix_ms: i64) -> Vec<Arc<Snapshot>> {
        let start = self
            .history
            .partition_point(|s| s.collected_at_unix_ms < cutoff_unix_ms);
        self.history.range(start..).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }
}

pub fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub fn unix_seconds_f64(unix_ms: i64) -> f64 {
    unix_ms as f64 / 1000.0
}

fn format_rfc3339_ms(unix_ms: i64) -> String {
    let st = UNIX_EPOCH + Duration::from_millis(unix_ms.max(0) as u64);
    humantime::format_rfc3339_millis(st).to_string()
}

#[cfg(test)]
pub(crate) fn snapshot_at(collected_at_unix_ms: i64) -> Snapshot {
    Snapshot::new(
        GpuStats::default(),
        ServiceStats::running(vec!["llama3:8b".to_string()]),
        SystemStats::default(),
        collected_at_unix_ms,
    )
}
