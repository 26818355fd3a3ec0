//! Per-unit hardware descriptors
//!
//! A [`UnitHardwareInfo`] describes the hardware a single unit runs on: its
//! host, core and thread counts, NUMA placement, cache hierarchy, clock range
//! and memory. The runtime normally exchanges these between units; this
//! module can also inspect the local machine through sysfs.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Number of cache levels tracked per unit (L1..L3)
pub const CACHE_LEVELS: usize = 3;

const SYSFS_CPU_ROOT: &str = "/sys/devices/system/cpu";
const SYSFS_NODE_ROOT: &str = "/sys/devices/system/node";

/// Hardware descriptor of one unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitHardwareInfo {
    /// Hostname the unit runs on
    pub host: String,
    /// Physical cores available to the unit's host
    pub num_cores: usize,
    /// Minimum hardware threads per core
    pub min_threads: usize,
    /// Maximum hardware threads per core
    pub max_threads: usize,
    /// NUMA domain of the unit, if known
    pub numa_id: Option<u32>,
    /// CPU the unit was scheduled on at detection time
    pub cpu_id: Option<u32>,
    /// Cache ids for L1..L3
    pub cache_ids: [Option<u32>; CACHE_LEVELS],
    /// Cache sizes in bytes for L1..L3
    pub cache_sizes: [Option<u64>; CACHE_LEVELS],
    /// Cache line sizes in bytes for L1..L3
    pub cache_line_sizes: [Option<u32>; CACHE_LEVELS],
    /// Minimum clock in MHz
    pub min_cpu_mhz: Option<u64>,
    /// Maximum clock in MHz
    pub max_cpu_mhz: Option<u64>,
    /// Peak shared-memory bandwidth in MB/s
    pub max_shmem_mbps: Option<u64>,
    /// Host memory in MB
    pub system_memory_mb: Option<u64>,
    /// Memory of the unit's NUMA domain in MB
    pub numa_memory_mb: Option<u64>,
}

impl UnitHardwareInfo {
    /// Descriptor for a unit on `host` with nothing else known
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            num_cores: 1,
            min_threads: 1,
            max_threads: 1,
            ..Default::default()
        }
    }

    /// Set the core count
    pub fn with_cores(mut self, num_cores: usize) -> Self {
        self.num_cores = num_cores;
        self
    }

    /// Set the NUMA domain
    pub fn with_numa(mut self, numa_id: u32) -> Self {
        self.numa_id = Some(numa_id);
        self
    }

    /// Set the cache id of one level (1-based)
    pub fn with_cache_id(mut self, level: usize, id: u32) -> Self {
        if (1..=CACHE_LEVELS).contains(&level) {
            self.cache_ids[level - 1] = Some(id);
        }
        self
    }

    /// Cache id at a 1-based cache level
    pub fn cache_id(&self, level: usize) -> Option<u32> {
        level
            .checked_sub(1)
            .and_then(|idx| self.cache_ids.get(idx).copied().flatten())
    }

    /// Cache size at a 1-based cache level
    pub fn cache_size(&self, level: usize) -> Option<u64> {
        level
            .checked_sub(1)
            .and_then(|idx| self.cache_sizes.get(idx).copied().flatten())
    }

    /// Detect the hardware of the calling process
    pub fn detect() -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());

        let logical = num_cpus::get().max(1);
        let physical = num_cpus::get_physical().max(1);
        let threads = (logical / physical).max(1);

        let mut sys = sysinfo::System::new_all();
        sys.refresh_all();

        let mut info = Self {
            host,
            num_cores: physical,
            min_threads: threads,
            max_threads: threads,
            cpu_id: current_cpu(),
            max_cpu_mhz: sys.cpus().iter().map(|c| c.frequency()).max().filter(|f| *f > 0),
            system_memory_mb: Some(sys.total_memory() / (1024 * 1024)).filter(|m| *m > 0),
            ..Default::default()
        };

        if let Some(cpu) = info.cpu_id {
            let cpu_dir = Path::new(SYSFS_CPU_ROOT).join(format!("cpu{}", cpu));
            info.read_cache_info(&cpu_dir);
            info.read_clock_range(&cpu_dir);

            if let Some((numa_id, mem_bytes)) = numa_of_cpu(Path::new(SYSFS_NODE_ROOT), cpu) {
                info.numa_id = Some(numa_id);
                info.numa_memory_mb = Some(mem_bytes / (1024 * 1024)).filter(|m| *m > 0);
            }
        }

        if info.numa_id.is_none() {
            info.numa_id = Some(0);
            info.numa_memory_mb = info.system_memory_mb;
        }

        tracing::debug!(
            host = %info.host,
            cores = info.num_cores,
            numa = ?info.numa_id,
            cpu = ?info.cpu_id,
            "detected local unit hardware"
        );

        info
    }

    /// Fill cache ids, sizes and line sizes from a sysfs `cpuN` directory
    fn read_cache_info(&mut self, cpu_dir: &Path) {
        let entries = match std::fs::read_dir(cpu_dir.join("cache")) {
            Ok(entries) => entries,
            Err(_) => return,
        };

        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with("index") {
                continue;
            }
            let dir = entry.path();

            if read_trimmed(&dir.join("type")).as_deref() == Some("Instruction") {
                continue;
            }
            let level = match read_trimmed(&dir.join("level")).and_then(|s| s.parse::<usize>().ok()) {
                Some(level) if (1..=CACHE_LEVELS).contains(&level) => level - 1,
                _ => continue,
            };

            self.cache_ids[level] = read_trimmed(&dir.join("id")).and_then(|s| s.parse().ok());
            self.cache_sizes[level] = read_trimmed(&dir.join("size")).and_then(|s| parse_cache_size(&s));
            self.cache_line_sizes[level] =
                read_trimmed(&dir.join("coherency_line_size")).and_then(|s| s.parse().ok());
        }
    }

    fn read_clock_range(&mut self, cpu_dir: &Path) {
        let khz = |file: &str| {
            read_trimmed(&cpu_dir.join("cpufreq").join(file)).and_then(|s| s.parse::<u64>().ok())
        };
        if let Some(min) = khz("cpuinfo_min_freq") {
            self.min_cpu_mhz = Some(min / 1000);
        }
        if let Some(max) = khz("cpuinfo_max_freq") {
            self.max_cpu_mhz = Some(max / 1000);
        }
    }

    /// Print a human-readable summary
    pub fn print_summary(&self) {
        println!("Unit Hardware:");
        println!("  Host: {}", self.host);
        println!("  Cores: {} ({}-{} threads/core)", self.num_cores, self.min_threads, self.max_threads);
        if let Some(numa) = self.numa_id {
            println!("  NUMA domain: {}", numa);
        }
        if let Some(cpu) = self.cpu_id {
            println!("  CPU: {}", cpu);
        }
        for level in 1..=CACHE_LEVELS {
            if let Some(size) = self.cache_size(level) {
                println!(
                    "  L{} cache: {} (id {})",
                    level,
                    humansize::format_size(size, humansize::BINARY),
                    self.cache_id(level).map(|id| id.to_string()).unwrap_or_else(|| "-".into())
                );
            }
        }
        if let (Some(min), Some(max)) = (self.min_cpu_mhz, self.max_cpu_mhz) {
            println!("  Clock: {}-{} MHz", min, max);
        }
        if let Some(mem) = self.system_memory_mb {
            println!("  Memory: {}", humansize::format_size(mem * 1024 * 1024, humansize::BINARY));
        }
    }
}

#[cfg(target_os = "linux")]
fn current_cpu() -> Option<u32> {
    // SAFETY: sched_getcpu has no preconditions.
    let cpu = unsafe { libc::sched_getcpu() };
    u32::try_from(cpu).ok()
}

#[cfg(not(target_os = "linux"))]
fn current_cpu() -> Option<u32> {
    None
}

fn read_trimmed(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

/// Find the NUMA node whose cpulist contains `cpu`, with its memory in bytes
fn numa_of_cpu(node_root: &Path, cpu: u32) -> Option<(u32, u64)> {
    let entries = std::fs::read_dir(node_root).ok()?;

    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        let node_id = match name_str.strip_prefix("node").and_then(|n| n.parse::<u32>().ok()) {
            Some(id) => id,
            None => continue,
        };

        let cpus = read_trimmed(&entry.path().join("cpulist"))
            .map(|s| parse_cpu_list(&s))
            .unwrap_or_default();

        if cpus.contains(&(cpu as usize)) {
            let mem = read_trimmed(&entry.path().join("meminfo"))
                .and_then(|content| {
                    content
                        .lines()
                        .find(|line| line.contains("MemTotal:"))
                        .and_then(|line| line.split_whitespace().nth(3))
                        .and_then(|kb| kb.parse::<u64>().ok())
                })
                .map(|kb| kb * 1024)
                .unwrap_or(0);
            return Some((node_id, mem));
        }
    }

    None
}

/// Parse CPU list format (e.g., "0-3,8-11" -> [0,1,2,3,8,9,10,11])
fn parse_cpu_list(s: &str) -> Vec<usize> {
    let mut cpus = Vec::new();

    for part in s.split(',') {
        let part = part.trim();
        if let Some((start, end)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.parse::<usize>(), end.parse::<usize>()) {
                cpus.extend(start..=end);
            }
        } else if let Ok(cpu) = part.parse::<usize>() {
            cpus.push(cpu);
        }
    }

    cpus
}

/// Parse sysfs cache sizes such as "32K" or "30720K"
fn parse_cache_size(s: &str) -> Option<u64> {
    let (digits, mult) = match s.chars().last()? {
        'K' => (&s[..s.len() - 1], 1024),
        'M' => (&s[..s.len() - 1], 1024 * 1024),
        'G' => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1),
    };
    digits.parse::<u64>().ok().map(|v| v * mult)
}
