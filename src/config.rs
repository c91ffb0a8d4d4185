use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

const MAX_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub const ENV_LISTEN: &str = "GPU_MONITOR_LISTEN";
pub const ENV_SERVICE_URL: &str = "GPU_MONITOR_SERVICE_URL";
pub const ENV_INTERVAL_SECS: &str = "GPU_MONITOR_INTERVAL_SECS";
pub const ENV_HISTORY_SIZE: &str = "GPU_MONITOR_HISTORY_SIZE";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_service_url")]
    pub service_url: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    #[serde(default = "default_gpu_device")]
    pub gpu_device: String,
    #[serde(default)]
    pub sensors: SensorsConfig,
    #[serde(default)]
    pub alerts: AlertThresholds,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SensorsConfig {
    #[serde(default = "default_devfreq_dir")]
    pub devfreq_dir: PathBuf,
    #[serde(default = "default_thermal_zones")]
    pub thermal_zones: Vec<PathBuf>,
    #[serde(default = "default_meminfo_path")]
    pub meminfo_path: PathBuf,
    #[serde(default = "default_disk_mount")]
    pub disk_mount: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct AlertThresholds {
    #[serde(default = "default_gpu_utilization_threshold")]
    pub gpu_utilization_threshold: f64,
    #[serde(default = "default_temperature_threshold")]
    pub temperature_threshold: f64,
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            service_url: default_service_url(),
            interval_secs: default_interval_secs(),
            history_size: default_history_size(),
            gpu_device: default_gpu_device(),
            sensors: SensorsConfig::default(),
            alerts: AlertThresholds::default(),
        }
    }
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            devfreq_dir: default_devfreq_dir(),
            thermal_zones: default_thermal_zones(),
            meminfo_path: default_meminfo_path(),
            disk_mount: default_disk_mount(),
        }
    }
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            gpu_utilization_threshold: default_gpu_utilization_threshold(),
            temperature_threshold: default_temperature_threshold(),
            memory_threshold: default_memory_threshold(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать YAML в {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let mut cfg = match Self::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!(error = %err, "используется конфигурация по умолчанию");
                Self::default()
            }
        };

        let overridden = cfg.clone().with_env_overrides(|key| std::env::var(key).ok());
        match overridden.validate() {
            Ok(()) => cfg = overridden,
            Err(err) => {
                warn!(error = %err, "переменные окружения проигнорированы");
            }
        }
        cfg
    }

    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup(ENV_LISTEN) {
            self.listen = v;
        }
        if let Some(v) = lookup(ENV_SERVICE_URL) {
            self.service_url = v;
        }
        if let Some(v) = lookup(ENV_INTERVAL_SECS) {
            match v.trim().parse() {
                Ok(secs) => self.interval_secs = secs,
                Err(_) => warn!(variable = ENV_INTERVAL_SECS, value = %v, "некорректное число"),
            }
        }
        if let Some(v) = lookup(ENV_HISTORY_SIZE) {
            match v.trim().parse() {
                Ok(size) => self.history_size = size,
                Err(_) => warn!(variable = ENV_HISTORY_SIZE, value = %v, "некорректное число"),
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if SocketAddr::from_str(self.listen.trim()).is_err() {
            return Err(ConfigError::Validation(
                "поле listen должно быть корректным адресом host:port".to_string(),
            ));
        }
        if self.service_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "поле service_url не должно быть пустым".to_string(),
            ));
        }
        if self.interval_secs < 1 {
            return Err(ConfigError::Validation(
                "interval_secs должно быть >= 1".to_string(),
            ));
        }
        if self.history_size < 1 {
            return Err(ConfigError::Validation(
                "history_size должно быть >= 1".to_string(),
            ));
        }
        if self.gpu_device.trim().is_empty() {
            return Err(ConfigError::Validation(
                "поле gpu_device не должно быть пустым".to_string(),
            ));
        }

        validate_alerts(&self.alerts)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        let interval = self.interval();
        if interval > MAX_PROBE_TIMEOUT {
            MAX_PROBE_TIMEOUT
        } else {
            interval.mul_f64(0.8)
        }
    }

    pub fn service_base_url(&self) -> &str {
        self.service_url.trim().trim_end_matches('/')
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../monitor.yaml.example")
    }
}

fn validate_alerts(cfg: &AlertThresholds) -> Result<(), ConfigError> {
    if !(0.0..=100.0).contains(&cfg.gpu_utilization_threshold) {
        return Err(ConfigError::Validation(
            "alerts.gpu_utilization_threshold должно быть в диапазоне 0..100".to_string(),
        ));
    }
    if !(cfg.temperature_threshold > 0.0 && cfg.temperature_threshold.is_finite()) {
        return Err(ConfigError::Validation(
            "alerts.temperature_threshold должно быть > 0".to_string(),
        ));
    }
    if !(0.0..=100.0).contains(&cfg.memory_threshold) {
        return Err(ConfigError::Validation(
            "alerts.memory_threshold должно быть в диапазоне 0..100".to_string(),
        ));
    }
    Ok(())
}

fn default_listen() -> String {
    "0.0.0.0:9100".to_string()
}

fn default_service_url() -> String {
    "http://localhost:11434".to_string()
}

const fn default_interval_secs() -> u64 {
    5
}

const fn default_history_size() -> usize {
    3600
}

fn default_gpu_device() -> String {
    "mali0".to_string()
}

fn default_devfreq_dir() -> PathBuf {
    PathBuf::from("/sys/class/devfreq/fb000000.gpu")
}

fn default_thermal_zones() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/sys/class/thermal/thermal_zone0/temp"),
        PathBuf::from("/sys/class/thermal/thermal_zone1/temp"),
    ]
}

fn default_meminfo_path() -> PathBuf {
    PathBuf::from("/proc/meminfo")
}

fn default_disk_mount() -> PathBuf {
    PathBuf::from("/")
}

const fn default_gpu_utilization_threshold() -> f64 {
    90.0
}

const fn default_temperature_threshold() -> f64 {
    80.0
}

const fn default_memory_threshold() -> f64 {
    85.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.service_url, "http://localhost:11434");
        assert_eq!(cfg.interval_secs, 5);
        assert_eq!(cfg.history_size, 3600);
        assert_eq!(cfg.alerts.gpu_utilization_threshold, 90.0);
        assert_eq!(cfg.alerts.temperature_threshold, 80.0);
        assert_eq!(cfg.alerts.memory_threshold, 85.0);
        cfg.validate().expect("конфигурация по умолчанию валидна");
    }

    #[test]
    fn example_yaml_parses_and_validates() {
        let cfg: Config = serde_yaml::from_str(Config::example_yaml()).expect("разбор примера");
        cfg.validate().expect("пример валиден");
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "service_url: http://10.0.0.2:11434\nalerts:\n  temperature_threshold: 70"
        )
        .unwrap();

        let cfg = Config::load_from_file(file.path()).expect("загрузка");
        assert_eq!(cfg.service_url, "http://10.0.0.2:11434");
        assert_eq!(cfg.alerts.temperature_threshold, 70.0);
        assert_eq!(cfg.alerts.gpu_utilization_threshold, 90.0);
        assert_eq!(cfg.interval_secs, 5);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_or_default(dir.path().join("absent.yaml"));
        assert_eq!(cfg.history_size, 3600);
    }

    #[test]
    fn invalid_file_is_rejected_by_loader() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "interval_secs: 0").unwrap();
        let err = Config::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let env: HashMap<&str, &str> = [
            (ENV_SERVICE_URL, "http://ollama:11434"),
            (ENV_INTERVAL_SECS, "10"),
            (ENV_HISTORY_SIZE, "not-a-number"),
        ]
        .into_iter()
        .collect();

        let cfg = Config::default().with_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.service_url, "http://ollama:11434");
        assert_eq!(cfg.interval_secs, 10);
        assert_eq!(cfg.history_size, 3600);
    }

    #[test]
    fn probe_timeout_stays_below_interval() {
        let mut cfg = Config::default();
        assert!(cfg.probe_timeout() < cfg.interval());

        cfg.interval_secs = 30;
        assert_eq!(cfg.probe_timeout(), Duration::from_secs(5));

        cfg.interval_secs = 1;
        assert!(cfg.probe_timeout() < Duration::from_secs(1));
    }

    #[test]
    fn out_of_range_threshold_fails_validation() {
        let mut cfg = Config::default();
        cfg.alerts.memory_threshold = 120.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn non_finite_thresholds_fail_validation() {
        for yaml in [
            "alerts:\n  temperature_threshold: .nan",
            "alerts:\n  temperature_threshold: .inf",
            "alerts:\n  gpu_utilization_threshold: .nan",
            "alerts:\n  memory_threshold: .nan",
        ] {
            let cfg: Config = serde_yaml::from_str(yaml).expect("разбор yaml");
            assert!(cfg.validate().is_err(), "{yaml} должен быть отклонён");
        }
    }
}
