//! Host statistics sensor
//!
//! Publishes a JSON object with CPU temperature, CPU and memory utilisation,
//! and optionally the mount points whose usage exceeds a threshold:
//!
//! ```json
//! {"cpu_temp":"48.3","cpu_pct":"7.5","mem_used_pct":"41.0","disk_full":["/var"]}
//! ```

use crate::sensor::args::{ArgSchema, ArgSpec, ArgType, TypedArgs};
use crate::sensor::{Sensor, SensorBase, SensorDescriptor, SensorError};
use serde::Serialize;
use std::path::Path;
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, RefreshKind, System};
use tracing::{debug, warn};

/// Thermal zone read for the CPU temperature, in millidegrees Celsius
pub const THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

const ARGS: ArgSchema = &[
    ArgSpec::new("partitions", ArgType::Str),
    ArgSpec::new("diskthresh", ArgType::Float),
];

/// One published reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_temp: Option<String>,
    pub cpu_pct: String,
    pub mem_used_pct: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub disk_full: Vec<String>,
}

/// Usage of one mounted file system
#[derive(Debug, Clone, PartialEq)]
pub struct DiskUsage {
    pub mount_point: String,
    pub used_pct: f64,
}

pub struct SystemSensor {
    base: SensorBase,
    partitions: Vec<String>,
    disk_threshold: f64,
    system: System,
}

impl SystemSensor {
    pub fn new(base: SensorBase, partitions: Vec<String>, disk_threshold: f64) -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        Self {
            base,
            partitions,
            disk_threshold,
            system,
        }
    }

    pub fn construct(args: &TypedArgs) -> Result<Box<dyn Sensor>, SensorError> {
        let base = SensorBase::from_args(args)?;
        let partitions = parse_partitions(args.str("partitions").unwrap_or_default());
        let disk_threshold = args.float("diskthresh").unwrap_or(0.0);
        Ok(Box::new(Self::new(base, partitions, disk_threshold)))
    }

    pub fn descriptor() -> SensorDescriptor {
        SensorDescriptor::derived(ARGS, Self::construct)
    }

    fn sample(&mut self) -> SystemStats {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();

        let cpu_temp = read_cpu_temp(Path::new(THERMAL_ZONE));
        let cpu_pct = f64::from(self.system.global_cpu_usage());
        let mem_used_pct = percent(self.system.used_memory(), self.system.total_memory());

        let disk_full = if self.disk_threshold != 0.0 {
            let usage = disk_usage();
            disks_over_threshold(&usage, &self.partitions, self.disk_threshold)
        } else {
            Vec::new()
        };

        SystemStats {
            cpu_temp: cpu_temp.map(one_decimal),
            cpu_pct: one_decimal(cpu_pct),
            mem_used_pct: one_decimal(mem_used_pct),
            disk_full,
        }
    }
}

impl Sensor for SystemSensor {
    fn base(&self) -> &SensorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SensorBase {
        &mut self.base
    }

    fn fire(&mut self) -> Result<(), SensorError> {
        let stats = self.sample();
        let payload =
            serde_json::to_string(&stats).map_err(|e| SensorError::Read(e.to_string()))?;
        debug!(sensor = %self.base.name, %payload, "System stats sampled");
        self.base.publish(payload)
    }
}

/// Split a comma-separated partition list, dropping empty entries
pub fn parse_partitions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// CPU temperature in degrees Celsius, or `None` if the zone is unreadable
pub fn read_cpu_temp(path: &Path) -> Option<f64> {
    let raw = std::fs::read_to_string(path).ok()?;
    parse_millidegrees(&raw)
}

pub fn parse_millidegrees(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .map(|milli| milli as f64 / 1000.0)
}

/// Mount points above `threshold` percent used.
///
/// With an explicit partition list only those are checked, in list order;
/// otherwise every mounted file system is.
pub fn disks_over_threshold(
    usage: &[DiskUsage],
    partitions: &[String],
    threshold: f64,
) -> Vec<String> {
    if partitions.is_empty() {
        return usage
            .iter()
            .filter(|disk| disk.used_pct > threshold)
            .map(|disk| disk.mount_point.clone())
            .collect();
    }

    partitions
        .iter()
        .filter(|part| match usage.iter().find(|disk| &disk.mount_point == *part) {
            Some(disk) => disk.used_pct > threshold,
            None => {
                warn!(partition = %part, "Partition is not mounted");
                false
            }
        })
        .cloned()
        .collect()
}

fn disk_usage() -> Vec<DiskUsage> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .map(|disk| {
            let total = disk.total_space();
            let used = total.saturating_sub(disk.available_space());
            DiskUsage {
                mount_point: disk.mount_point().to_string_lossy().to_string(),
                used_pct: percent(used, total),
            }
        })
        .collect()
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn one_decimal(value: f64) -> String {
    format!("{value:.1}")
}
