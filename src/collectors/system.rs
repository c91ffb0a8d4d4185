use crate::collectors::gpu::round2;
use crate::state::SystemStats;
use std::path::{Path, PathBuf};
use sysinfo::{CpuExt, DiskExt, System, SystemExt};
use tracing::debug;

// CPU usage is a delta between refreshes, so the first reading is 0.
pub struct HostReader {
    system: System,
    disk_mount: PathBuf,
}

impl HostReader {
    pub fn new(disk_mount: impl Into<PathBuf>) -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_disks_list();
        Self {
            system,
            disk_mount: disk_mount.into(),
        }
    }

    pub fn read(&mut self) -> SystemStats {
        let system = &mut self.system;
        system.refresh_cpu();
        system.refresh_memory();
        system.refresh_disks();

        let cpu_percent = round2(system.global_cpu_info().cpu_usage() as f64);

        let total = system.total_memory();
        let available = system.available_memory();
        let memory_percent = percent_used(total, total.saturating_sub(available));

        let disk_percent = match disk_usage(system, &self.disk_mount) {
            Some((used, total)) => percent_used(total, used),
            None => {
                debug!(mount = %self.disk_mount.display(), "диск для точки монтирования не найден");
                0.0
            }
        };

        let load = system.load_average();

        SystemStats {
            cpu_percent,
            memory_percent,
            disk_percent,
            load_average: (load.one, load.five, load.fifteen),
        }
    }
}

fn disk_usage(system: &System, mount: &Path) -> Option<(u64, u64)> {
    system
        .disks()
        .iter()
        .filter(|d| mount.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| {
            let total = d.total_space();
            (total.saturating_sub(d.available_space()), total)
        })
}

fn percent_used(total: u64, used: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(used as f64 / total as f64 * 100.0)
}
