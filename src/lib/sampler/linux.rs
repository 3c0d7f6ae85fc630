use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use sysinfo::{DiskExt, System, SystemExt};
use tracing::*;

use super::{
    ensure_finite, procfs, DiskIo, DiskUsage, Error, MemoryBreakdown, NetworkBytes,
    ProcessCounts, Result, Sampler,
};
use crate::settings::manager::CounterMode;

const STAT: &str = "stat";
const DISKSTATS: &str = "diskstats";
const NET_DEV: &str = "net/dev";

/// [`Sampler`] backed by the Linux procfs counters and `sysinfo` for
/// filesystem space.
///
/// Percentages and rates are computed from two reads taken `interval` apart,
/// nothing is kept between calls. A scrape reads every counter file over one
/// shared [`Window`].
#[derive(Debug, Clone)]
pub struct ProcfsSampler {
    root: PathBuf,
    interval: Duration,
    counter_mode: CounterMode,
}

impl ProcfsSampler {
    pub fn new(interval: Duration, counter_mode: CounterMode) -> Self {
        Self::with_root("/proc", interval, counter_mode)
    }

    pub fn with_root(root: impl Into<PathBuf>, interval: Duration, counter_mode: CounterMode) -> Self {
        Self {
            root: root.into(),
            interval,
            counter_mode,
        }
    }

    fn read(&self, file: &str) -> Result<String> {
        procfs::read(&self.root.join(file))
    }

    /// Read `files` twice, `interval` apart.
    pub fn window(&self, files: &[&'static str]) -> Result<Window<'_>> {
        let read_all = || {
            files
                .iter()
                .map(|file| self.read(file))
                .collect::<Result<Vec<String>>>()
        };

        let start = Instant::now();
        let first = read_all()?;
        std::thread::sleep(self.interval);
        let second = read_all()?;
        let elapsed = start.elapsed();

        let counters = files
            .iter()
            .zip(first.into_iter().zip(second))
            .map(|(&file, (first, second))| Counters {
                file,
                first,
                second,
            })
            .collect();

        Ok(Window {
            sampler: self,
            counters,
            elapsed,
        })
    }

    fn diskstats(&self, device: &str) -> Result<procfs::DiskStats> {
        procfs::parse_diskstats(&self.read(DISKSTATS)?, &kernel_device_name(device))
    }

    fn interface_bytes(&self, interface: &str) -> Result<procfs::InterfaceBytes> {
        procfs::parse_net_dev(&self.read(NET_DEV)?, interface)
    }
}

/// Content of one counter file at both ends of a window.
#[derive(Debug)]
struct Counters {
    file: &'static str,
    first: String,
    second: String,
}

/// Counter files read at both ends of one sampling window.
///
/// Windowed readings come from the two reads, instant readings go straight to
/// the sampler.
#[derive(Debug)]
pub struct Window<'a> {
    sampler: &'a ProcfsSampler,
    counters: Vec<Counters>,
    elapsed: Duration,
}

impl Window<'_> {
    fn counters(&self, file: &'static str) -> Result<&Counters> {
        self.counters
            .iter()
            .find(|counters| counters.file == file)
            .ok_or_else(|| Error::Parse {
                file,
                reason: "not read in this sampling window".to_string(),
            })
    }

    /// Parse both reads of `file`.
    fn both<T>(&self, file: &'static str, parse: impl Fn(&str) -> Result<T>) -> Result<(T, T)> {
        let counters = self.counters(file)?;
        Ok((parse(&counters.first)?, parse(&counters.second)?))
    }

    fn diskstats(&self, device: &str) -> Result<(procfs::DiskStats, procfs::DiskStats)> {
        let name = kernel_device_name(device);
        self.both(DISKSTATS, |content| procfs::parse_diskstats(content, &name))
    }

    fn interface_bytes(
        &self,
        interface: &str,
    ) -> Result<(procfs::InterfaceBytes, procfs::InterfaceBytes)> {
        self.both(NET_DEV, |content| procfs::parse_net_dev(content, interface))
    }
}

/// Name of the `/proc/diskstats` line of `device`.
///
/// `sda3` is used as is. A path such as `/dev/sda3` or a symlink such as
/// `/dev/mapper/vg-root` (to `/dev/dm-0`) is resolved first, the unresolved
/// last component is used when the path does not exist.
fn kernel_device_name(device: &str) -> String {
    let path = Path::new(device);
    let resolved = if path.components().count() > 1 {
        std::fs::canonicalize(path).ok()
    } else {
        None
    };

    resolved
        .as_deref()
        .unwrap_or(path)
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or(device)
        .to_string()
}

fn matches_device(disk_name: &OsStr, device: &str) -> bool {
    let Some(disk_name) = disk_name.to_str() else {
        return false;
    };

    disk_name == device
        || disk_name.strip_prefix("/dev/") == Some(device)
        || kernel_device_name(disk_name) == kernel_device_name(device)
}

/// Counter increase per second. Counters that went backwards were reset, the
/// reading after the reset is the best available.
fn per_second(what: &'static str, first: u64, second: u64, elapsed: Duration) -> Result<f64> {
    let delta = second.checked_sub(first).unwrap_or(second);
    ensure_finite(what, delta as f64 / elapsed.as_secs_f64())
}

fn cumulative_disk_io(stats: &procfs::DiskStats) -> DiskIo {
    DiskIo {
        reads: stats.reads_completed as f64,
        writes: stats.writes_completed as f64,
    }
}

fn cumulative_network_bytes(bytes: &procfs::InterfaceBytes) -> NetworkBytes {
    NetworkBytes {
        rx: bytes.rx as f64,
        tx: bytes.tx as f64,
    }
}

impl Sampler for ProcfsSampler {
    fn begin_scrape(&self) -> Result<Box<dyn Sampler + '_>> {
        Ok(Box::new(self.window(&[STAT, DISKSTATS, NET_DEV])?))
    }

    #[instrument(level = "debug", skip(self))]
    fn cpu_utilization(&self) -> Result<f64> {
        self.window(&[STAT])?.cpu_utilization()
    }

    #[instrument(level = "debug", skip(self))]
    fn load_average(&self) -> Result<f64> {
        procfs::parse_load_average(&self.read("loadavg")?)
    }

    #[instrument(level = "debug", skip(self))]
    fn process_counts(&self) -> Result<ProcessCounts> {
        procfs::parse_process_counts(&self.read(STAT)?)
    }

    #[instrument(level = "debug", skip(self))]
    fn disk_busy(&self, device: &str) -> Result<f64> {
        self.window(&[DISKSTATS])?.disk_busy(device)
    }

    #[instrument(level = "debug", skip(self))]
    fn disk_io_rate(&self, device: &str) -> Result<DiskIo> {
        match self.counter_mode {
            CounterMode::Cumulative => Ok(cumulative_disk_io(&self.diskstats(device)?)),
            CounterMode::Rate => self.window(&[DISKSTATS])?.disk_io_rate(device),
        }
    }

    #[instrument(level = "debug", skip(self))]
    fn disk_usage(&self, device: &str) -> Result<DiskUsage> {
        let mut system = System::new();
        system.refresh_disks_list();

        let disk = system
            .disks()
            .iter()
            .find(|disk| matches_device(disk.name(), device))
            .ok_or_else(|| Error::DeviceNotFound(device.to_string()))?;

        let total = disk.total_space();
        let free = disk.available_space();
        trace!(
            "Disk {device} mounted at {:?}: total {total}, available {free}",
            disk.mount_point()
        );

        Ok(DiskUsage {
            total,
            used: total.saturating_sub(free),
            free,
        })
    }

    #[instrument(level = "debug", skip(self))]
    fn network_bytes(&self, interface: &str) -> Result<NetworkBytes> {
        match self.counter_mode {
            CounterMode::Cumulative => Ok(cumulative_network_bytes(
                &self.interface_bytes(interface)?,
            )),
            CounterMode::Rate => self.window(&[NET_DEV])?.network_bytes(interface),
        }
    }

    #[instrument(level = "debug", skip(self))]
    fn memory_breakdown(&self) -> Result<MemoryBreakdown> {
        procfs::parse_meminfo(&self.read("meminfo")?)
    }
}

impl Sampler for Window<'_> {
    #[instrument(level = "debug", skip(self))]
    fn cpu_utilization(&self) -> Result<f64> {
        let (first, second) = self.both(STAT, procfs::parse_cpu_times)?;

        let total = second.total.saturating_sub(first.total);
        let idle = second.idle.saturating_sub(first.idle);
        let idle_percent = ensure_finite("cpu", idle as f64 / total as f64 * 100.0)?;

        Ok((100.0 - idle_percent).clamp(0.0, 100.0))
    }

    fn load_average(&self) -> Result<f64> {
        self.sampler.load_average()
    }

    fn process_counts(&self) -> Result<ProcessCounts> {
        self.sampler.process_counts()
    }

    #[instrument(level = "debug", skip(self))]
    fn disk_busy(&self, device: &str) -> Result<f64> {
        let (first, second) = self.diskstats(device)?;

        let busy_ms = second.io_ticks_ms.saturating_sub(first.io_ticks_ms) as f64;
        let busy = ensure_finite("disk busy", busy_ms / self.elapsed.as_secs_f64() / 10.0)?;

        Ok(busy.clamp(0.0, 100.0))
    }

    #[instrument(level = "debug", skip(self))]
    fn disk_io_rate(&self, device: &str) -> Result<DiskIo> {
        let (first, second) = self.diskstats(device)?;

        match self.sampler.counter_mode {
            CounterMode::Cumulative => Ok(cumulative_disk_io(&second)),
            CounterMode::Rate => Ok(DiskIo {
                reads: per_second(
                    "disk reads",
                    first.reads_completed,
                    second.reads_completed,
                    self.elapsed,
                )?,
                writes: per_second(
                    "disk writes",
                    first.writes_completed,
                    second.writes_completed,
                    self.elapsed,
                )?,
            }),
        }
    }

    fn disk_usage(&self, device: &str) -> Result<DiskUsage> {
        self.sampler.disk_usage(device)
    }

    #[instrument(level = "debug", skip(self))]
    fn network_bytes(&self, interface: &str) -> Result<NetworkBytes> {
        let (first, second) = self.interface_bytes(interface)?;

        match self.sampler.counter_mode {
            CounterMode::Cumulative => Ok(cumulative_network_bytes(&second)),
            CounterMode::Rate => Ok(NetworkBytes {
                rx: per_second("network rx", first.rx, second.rx, self.elapsed)?,
                tx: per_second("network tx", first.tx, second.tx, self.elapsed)?,
            }),
        }
    }

    fn memory_breakdown(&self) -> Result<MemoryBreakdown> {
        self.sampler.memory_breakdown()
    }
}
