pub mod gpu;
pub mod service;
pub mod system;

use crate::config::{Config, SensorsConfig};
use crate::state::{GpuStats, ServiceStats, SystemStats};
use gpu::SensorError;
use reqwest::Client;
use service::ServiceProbe;
use std::future::Future;
use system::HostReader;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CycleReadings {
    pub gpu: GpuStats,
    pub service: ServiceStats,
    pub system: SystemStats,
    pub unavailable: Vec<&'static str>,
}

pub trait TelemetrySource: Send {
    fn read(&mut self) -> impl Future<Output = CycleReadings> + Send;
}

pub struct Collector {
    sensors: SensorsConfig,
    host: HostReader,
    probe: ServiceProbe,
}

impl Collector {
    pub fn new(cfg: &Config, client: Client) -> Self {
        Self {
            sensors: cfg.sensors.clone(),
            host: HostReader::new(cfg.sensors.disk_mount.clone()),
            probe: ServiceProbe::new(client, cfg.service_base_url(), cfg.probe_timeout()),
        }
    }
}

impl TelemetrySource for Collector {
    async fn read(&mut self) -> CycleReadings {
        let mut unavailable = Vec::new();
        let utilization = absent_on_error(
            "gpu_utilization",
            gpu::read_gpu_utilization(&self.sensors),
            &mut unavailable,
        );
        let memory = absent_on_error(
            "gpu_memory",
            gpu::read_gpu_memory(&self.sensors),
            &mut unavailable,
        );
        let temperature = absent_on_error(
            "gpu_temperature",
            gpu::read_gpu_temperature(&self.sensors),
            &mut unavailable,
        );
        let system = self.host.read();
        let service = self.probe.probe().await;

        CycleReadings {
            gpu: GpuStats {
                utilization,
                memory,
                temperature,
            },
            service,
            system,
            unavailable,
        }
    }
}

fn absent_on_error<T>(
    sensor: &'static str,
    reading: Result<T, SensorError>,
    unavailable: &mut Vec<&'static str>,
) -> Option<T> {
    match reading {
        Ok(v) => Some(v),
        Err(err) => {
            debug!(sensor, error = %err, "датчик недоступен");
            unavailable.push(sensor);
            None
        }
    }
}
