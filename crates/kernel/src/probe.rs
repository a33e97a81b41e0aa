use parking_lot::Mutex;
use std::{fmt::Debug, path::Path};
use sysinfo::{Disks, Pid, ProcessesToUpdate, System};

/// Resource readings the diagnostics depend on. `None` means the reading is
/// unavailable on this platform, never an error.
pub trait ResourceProbe: Send + Sync + Debug {
    /// Resident memory of this process as a percentage of total memory.
    fn process_memory_percent(&self) -> Option<f32>;

    /// Used system memory as a percentage of total memory.
    fn system_memory_percent(&self) -> Option<f32>;

    /// Free bytes on the disk holding `path`.
    fn disk_free(&self, path: &Path) -> Option<u64>;
}

#[derive(Debug)]
pub struct SysinfoProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SysinfoProbe {
    fn process_memory_percent(&self) -> Option<f32> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        system.refresh_memory();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let used = system.process(pid)?.memory();
        percent(used, system.total_memory())
    }

    fn system_memory_percent(&self) -> Option<f32> {
        let mut system = self.system.lock();
        system.refresh_memory();
        percent(system.used_memory(), system.total_memory())
    }

    fn disk_free(&self, path: &Path) -> Option<u64> {
        let path = path.canonicalize().ok()?;
        let disks = Disks::new_with_refreshed_list();
        // the most specific mount point wins
        disks
            .list()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }
}

fn percent(part: u64, total: u64) -> Option<f32> {
    (total > 0).then(|| (part as f64 / total as f64 * 100.0) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(percent(1, 0), None);
        assert_eq!(percent(50, 200), Some(25.0));
    }

    #[test]
    fn test_sysinfo_probe() {
        let probe = SysinfoProbe::new();
        let system = probe.system_memory_percent().unwrap();
        assert!((0.0..=100.0).contains(&system));
        if let Some(process) = probe.process_memory_percent() {
            assert!(process > 0.0 && process <= 100.0);
        }
    }
}
