use crate::config::SensorsConfig;
use crate::state::GpuMemory;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

const THERMAL_MIN_CELSIUS: f64 = 20.0;
const THERMAL_MAX_CELSIUS: f64 = 150.0;
const HEURISTIC_IDLE_CELSIUS: f64 = 60.0;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("не удалось прочитать {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("некорректное значение в {path}: {value:?}")]
    Malformed { path: String, value: String },
    #[error("в {path} отсутствует ключ {key}")]
    MissingKey { path: String, key: &'static str },
    #[error("нулевой делитель в {path}")]
    ZeroDivisor { path: String },
    #[error("значение {value} вне допустимого диапазона")]
    OutOfRange { value: f64 },
    #[error("источник данных не настроен")]
    NoSource,
}

pub fn read_gpu_utilization(cfg: &SensorsConfig) -> Result<f64, SensorError> {
    match devfreq_utilization(&cfg.devfreq_dir) {
        Ok(v) => return Ok(v),
        Err(err) => {
            debug!(error = %err, "devfreq недоступен, используется оценка по температуре");
        }
    }

    let zone = cfg.thermal_zones.first().ok_or(SensorError::NoSource)?;
    let celsius = read_celsius(zone)?;
    Ok(thermal_utilization_estimate(celsius))
}

pub fn read_gpu_memory(cfg: &SensorsConfig) -> Result<GpuMemory, SensorError> {
    let path = cfg.meminfo_path.as_path();
    let text = read_text(path)?;
    let total_kb = meminfo_value(&text, path, "MemTotal")?;
    let available_kb = meminfo_value(&text, path, "MemAvailable")?;
    if total_kb == 0 {
        return Err(SensorError::ZeroDivisor {
            path: path.display().to_string(),
        });
    }

    let used_kb = total_kb.saturating_sub(available_kb);
    Ok(GpuMemory {
        total_mb: round2(total_kb as f64 / 1024.0),
        used_mb: round2(used_kb as f64 / 1024.0),
        available_mb: round2(available_kb as f64 / 1024.0),
        percent: round2(used_kb as f64 / total_kb as f64 * 100.0),
    })
}

pub fn read_gpu_temperature(cfg: &SensorsConfig) -> Result<f64, SensorError> {
    let mut last_err = SensorError::NoSource;
    for zone in &cfg.thermal_zones {
        match read_celsius(zone) {
            Ok(c) if c > THERMAL_MIN_CELSIUS && c < THERMAL_MAX_CELSIUS => return Ok(round2(c)),
            Ok(c) => last_err = SensorError::OutOfRange { value: c },
            Err(err) => last_err = err,
        }
    }
    Err(last_err)
}

fn devfreq_utilization(dir: &Path) -> Result<f64, SensorError> {
    let cur_path = dir.join("cur_freq");
    let max_path = dir.join("max_freq");
    let cur = read_u64(&cur_path)?;
    let max = read_u64(&max_path)?;
    if max == 0 {
        return Err(SensorError::ZeroDivisor {
            path: max_path.display().to_string(),
        });
    }
    Ok(round2((cur as f64 / max as f64 * 100.0).clamp(0.0, 100.0)))
}

fn thermal_utilization_estimate(celsius: f64) -> f64 {
    if celsius <= HEURISTIC_IDLE_CELSIUS {
        return 0.0;
    }
    round2(((celsius - 40.0) / 0.4).clamp(0.0, 100.0))
}

fn read_celsius(path: &Path) -> Result<f64, SensorError> {
    let text = read_text(path)?;
    let millideg = text
        .trim()
        .parse::<i64>()
        .map_err(|_| SensorError::Malformed {
            path: path.display().to_string(),
            value: text.trim().to_string(),
        })?;
    Ok(millideg as f64 / 1000.0)
}

fn read_u64(path: &Path) -> Result<u64, SensorError> {
    let text = read_text(path)?;
    text.trim().parse::<u64>().map_err(|_| SensorError::Malformed {
        path: path.display().to_string(),
        value: text.trim().to_string(),
    })
}

fn read_text(path: &Path) -> Result<String, SensorError> {
    fs::read_to_string(path).map_err(|source| SensorError::Read {
        path: path.display().to_string(),
        source,
    })
}

fn meminfo_value(text: &str, path: &Path, key: &'static str) -> Result<u64, SensorError> {
    let line = text
        .lines()
        .find(|l| l.split(':').next().map(str::trim) == Some(key))
        .ok_or_else(|| SensorError::MissingKey {
            path: path.display().to_string(),
            key,
        })?;
    let raw = line
        .split(':')
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or_default();
    raw.parse::<u64>().map_err(|_| SensorError::Malformed {
        path: path.display().to_string(),
        value: line.to_string(),
    })
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
