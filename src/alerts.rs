use crate::config::AlertThresholds;
use crate::state::Snapshot;
use serde::Serialize;

pub const CRITICAL_TEMPERATURE_CELSIUS: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    GpuUtilization,
    GpuTemperature,
    GpuMemory,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub value: f64,
    pub threshold: f64,
}

pub fn evaluate(snapshot: &Snapshot, thresholds: &AlertThresholds) -> Vec<Alert> {
    let mut out = Vec::new();
    let gpu = &snapshot.gpu;

    if let Some(util) = gpu.utilization {
        if util > thresholds.gpu_utilization_threshold {
            out.push(Alert {
                level: AlertLevel::Warning,
                kind: AlertKind::GpuUtilization,
                value: util,
                threshold: thresholds.gpu_utilization_threshold,
            });
        }
    }

    if let Some(temp) = gpu.temperature {
        if temp > thresholds.temperature_threshold {
            let level = if temp > CRITICAL_TEMPERATURE_CELSIUS {
                AlertLevel::Critical
            } else {
                AlertLevel::Warning
            };
            out.push(Alert {
                level,
                kind: AlertKind::GpuTemperature,
                value: temp,
                threshold: thresholds.temperature_threshold,
            });
        }
    }

    if let Some(mem) = gpu.memory {
        if mem.percent > thresholds.memory_threshold {
            out.push(Alert {
                level: AlertLevel::Warning,
                kind: AlertKind::GpuMemory,
                value: mem.percent,
                threshold: thresholds.memory_threshold,
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{snapshot_at, GpuMemory, GpuStats};

    fn with_gpu(gpu: GpuStats) -> Snapshot {
        let mut snapshot = snapshot_at(0);
        snapshot.gpu = gpu;
        snapshot
    }

    fn memory(percent: f64) -> GpuMemory {
        GpuMemory {
            total_mb: 16000.0,
            used_mb: 16000.0 * percent / 100.0,
            available_mb: 16000.0 * (100.0 - percent) / 100.0,
            percent,
        }
    }

    #[test]
    fn utilization_over_threshold_warns() {
        let snapshot = with_gpu(GpuStats {
            utilization: Some(95.0),
            ..GpuStats::default()
        });
        let alerts = evaluate(&snapshot, &AlertThresholds::default());
        assert_eq!(
            alerts,
            vec![Alert {
                level: AlertLevel::Warning,
                kind: AlertKind::GpuUtilization,
                value: 95.0,
                threshold: 90.0,
            }]
        );
    }

    #[test]
    fn hot_gpu_escalates_to_critical() {
        let snapshot = with_gpu(GpuStats {
            temperature: Some(95.0),
            ..GpuStats::default()
        });
        let alerts = evaluate(&snapshot, &AlertThresholds::default());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::GpuTemperature);
        assert_eq!(alerts[0].level, AlertLevel::Critical);
        assert_eq!(alerts[0].value, 95.0);
        assert_eq!(alerts[0].threshold, 80.0);
    }

    #[test]
    fn warm_gpu_is_only_a_warning() {
        let snapshot = with_gpu(GpuStats {
            temperature: Some(85.0),
            ..GpuStats::default()
        });
        let alerts = evaluate(&snapshot, &AlertThresholds::default());
        assert_eq!(alerts[0].level, AlertLevel::Warning);
    }

    #[test]
    fn values_at_threshold_do_not_alert() {
        let snapshot = with_gpu(GpuStats {
            utilization: Some(90.0),
            memory: Some(memory(85.0)),
            temperature: Some(80.0),
        });
        assert!(evaluate(&snapshot, &AlertThresholds::default()).is_empty());
    }

    #[test]
    fn absent_readings_never_alert() {
        let thresholds = AlertThresholds {
            gpu_utilization_threshold: 0.0,
            temperature_threshold: 0.001,
            memory_threshold: 0.0,
        };
        assert!(evaluate(&with_gpu(GpuStats::default()), &thresholds).is_empty());
    }

    #[test]
    fn all_three_rules_fire_in_order_and_repeat_identically() {
        let snapshot = with_gpu(GpuStats {
            utilization: Some(99.0),
            memory: Some(memory(90.0)),
            temperature: Some(82.0),
        });
        let thresholds = AlertThresholds::default();

        let first = evaluate(&snapshot, &thresholds);
        let kinds: Vec<AlertKind> = first.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AlertKind::GpuUtilization,
                AlertKind::GpuTemperature,
                AlertKind::GpuMemory
            ]
        );
        assert_eq!(first, evaluate(&snapshot, &thresholds));
    }

    #[test]
    fn alert_serializes_with_type_field() {
        let alert = Alert {
            level: AlertLevel::Critical,
            kind: AlertKind::GpuTemperature,
            value: 95.0,
            threshold: 80.0,
        };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "gpu_temperature");
        assert_eq!(json["level"], "critical");
    }
}
