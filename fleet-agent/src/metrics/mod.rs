//! Host information collected on demand for the kernel
//!
//! Four categories, each serialized under its own key:
//! - cpu: model, cores, usage, load averages
//! - os: distribution, kernel, hostname, uptime
//! - memory: RAM and swap usage
//! - disk: one entry per mounted filesystem

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sysinfo::{Disks, System};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfoCategory {
    Cpu,
    Os,
    Memory,
    Disk,
}

impl InfoCategory {
    pub const ALL: [InfoCategory; 4] = [
        InfoCategory::Cpu,
        InfoCategory::Os,
        InfoCategory::Memory,
        InfoCategory::Disk,
    ];

    pub fn key(self) -> &'static str {
        match self {
            InfoCategory::Cpu => "cpu",
            InfoCategory::Os => "os",
            InfoCategory::Memory => "memory",
            InfoCategory::Disk => "disk",
        }
    }
}

/// CPU usage metrics
#[derive(Debug, Serialize)]
pub struct CpuInfo {
    pub model_name: String,
    pub vendor_id: String,
    pub frequency_mhz: u64,
    pub logical_cores: usize,
    pub physical_cores: Option<usize>,
    pub architecture: Option<String>,
    pub percent: f32,
    pub load_avg: [f64; 3], // [1min, 5min, 15min]
}

#[derive(Debug, Serialize)]
pub struct OsInfo {
    pub name: Option<String>,
    pub version: Option<String>,
    pub long_version: Option<String>,
    pub kernel: Option<String>,
    pub hostname: Option<String>,
    pub uptime_seconds: u64,
}

/// Memory usage metrics
#[derive(Debug, Serialize)]
pub struct MemoryInfo {
    pub total_mb: u64,
    pub used_mb: u64,
    pub available_mb: u64,
    pub percent_used: f32,
    pub swap_total_mb: u64,
    pub swap_used_mb: u64,
}

/// Disk usage metrics per filesystem
#[derive(Debug, Serialize)]
pub struct DiskInfo {
    pub device: String,
    pub mount_point: String,
    pub file_system: String,
    pub total_gb: f64,
    pub used_gb: f64,
    pub free_gb: f64,
    pub percent_used: f32,
}

const MB: u64 = 1024 * 1024;
const GB: f64 = 1024.0 * 1024.0 * 1024.0;

fn percent(part: u64, total: u64) -> f32 {
    if total > 0 {
        (part as f32 / total as f32) * 100.0
    } else {
        0.0
    }
}

impl CpuInfo {
    fn collect(sys: &System) -> Self {
        let cpus = sys.cpus();
        let first = cpus.first();
        let load_avg = if cfg!(unix) {
            let load = System::load_average();
            [load.one, load.five, load.fifteen]
        } else {
            [0.0, 0.0, 0.0] // Windows fallback
        };

        CpuInfo {
            model_name: first.map(|c| c.brand().trim().to_string()).unwrap_or_default(),
            vendor_id: first.map(|c| c.vendor_id().to_string()).unwrap_or_default(),
            frequency_mhz: first.map(|c| c.frequency()).unwrap_or(0),
            logical_cores: cpus.len(),
            physical_cores: sys.physical_core_count(),
            architecture: System::cpu_arch(),
            percent: sys.global_cpu_info().cpu_usage(),
            load_avg,
        }
    }
}

impl OsInfo {
    fn collect() -> Self {
        OsInfo {
            name: System::name(),
            version: System::os_version(),
            long_version: System::long_os_version(),
            kernel: System::kernel_version(),
            hostname: System::host_name(),
            uptime_seconds: System::uptime(),
        }
    }
}

impl MemoryInfo {
    fn collect(sys: &System) -> Self {
        let total = sys.total_memory();
        let available = sys.available_memory();
        let used = total.saturating_sub(available);

        MemoryInfo {
            total_mb: total / MB,
            used_mb: used / MB,
            available_mb: available / MB,
            percent_used: percent(used, total),
            swap_total_mb: sys.total_swap() / MB,
            swap_used_mb: sys.used_swap() / MB,
        }
    }
}

impl DiskInfo {
    fn collect() -> Vec<Self> {
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .map(|disk| {
                let total = disk.total_space();
                let free = disk.available_space();
                let used = total.saturating_sub(free);
                DiskInfo {
                    device: disk.name().to_string_lossy().into_owned(),
                    mount_point: disk.mount_point().display().to_string(),
                    file_system: disk.file_system().to_string_lossy().into_owned(),
                    total_gb: total as f64 / GB,
                    used_gb: used as f64 / GB,
                    free_gb: free as f64 / GB,
                    percent_used: percent(used, total),
                }
            })
            .collect()
    }
}

fn to_value<T: Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Collects the requested categories; an empty request means all of them.
pub async fn collect_host_info(categories: &[InfoCategory]) -> Map<String, Value> {
    let categories: &[InfoCategory] = if categories.is_empty() { &InfoCategory::ALL } else { categories };
    debug!("collecting host info for {:?}", categories);

    let mut sys = System::new();
    if categories.contains(&InfoCategory::Cpu) {
        sys.refresh_cpu();
        // Wait a moment for accurate CPU readings
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        sys.refresh_cpu_usage();
    }
    if categories.contains(&InfoCategory::Memory) {
        sys.refresh_memory();
    }

    let mut info = Map::new();
    for category in categories {
        let value = match category {
            InfoCategory::Cpu => to_value(CpuInfo::collect(&sys)),
            InfoCategory::Os => to_value(OsInfo::collect()),
            InfoCategory::Memory => to_value(MemoryInfo::collect(&sys)),
            InfoCategory::Disk => to_value(DiskInfo::collect()),
        };
        info.insert(category.key().to_string(), value);
    }
    info
}
