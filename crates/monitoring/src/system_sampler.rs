//! Real `SystemSampler` backed by `sysinfo` (spec.md §4.10: CPU, memory,
//! disk, network, process-count on a 30-second cadence).

use std::sync::Mutex;

use sysinfo::{Disks, Networks, System};

use crate::metrics::SystemSampler;
use crate::models::SystemMetrics;

pub struct HostSampler {
    system: Mutex<System>,
    disks: Mutex<Disks>,
    networks: Mutex<Networks>,
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSampler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new_all()),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
            networks: Mutex::new(Networks::new_with_refreshed_list()),
        }
    }
}

impl SystemSampler for HostSampler {
    fn sample(&self) -> SystemMetrics {
        let mut system = self.system.lock().unwrap_or_else(|p| p.into_inner());
        system.refresh_cpu_usage();
        system.refresh_memory();
        system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);

        let cpu_percent = f64::from(system.global_cpu_usage());
        let memory_percent = if system.total_memory() == 0 {
            0.0
        } else {
            (system.used_memory() as f64 / system.total_memory() as f64) * 100.0
        };
        let process_count = system.processes().len() as u64;

        let mut disks = self.disks.lock().unwrap_or_else(|p| p.into_inner());
        disks.refresh(true);
        let (total_disk, available_disk) = disks.list().iter().fold((0u64, 0u64), |(t, a), d| {
            (t + d.total_space(), a + d.available_space())
        });
        let disk_percent = if total_disk == 0 { 0.0 } else { ((total_disk - available_disk) as f64 / total_disk as f64) * 100.0 };

        let mut networks = self.networks.lock().unwrap_or_else(|p| p.into_inner());
        networks.refresh(true);
        let network_bytes_per_sec = networks.list().values().map(|n| n.received() + n.transmitted()).sum::<u64>() as f64;

        SystemMetrics { cpu_percent, memory_percent, disk_percent, network_bytes_per_sec, process_count, sampled_at: None }
    }
}
