//! Parsers for the Linux procfs counter files.
//!
//! Every parser takes the file content as a string so it can be exercised
//! without a live `/proc`. Readings are raw kernel counters, turning them into
//! percentages or rates is left to [`super::linux`].

use std::path::Path;

use super::{Error, MemoryBreakdown, ProcessCounts, Result};

/// Aggregate CPU time from the first line of `/proc/stat`, in clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

/// Counters of one line of `/proc/diskstats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskStats {
    pub reads_completed: u64,
    pub writes_completed: u64,
    /// Milliseconds spent with I/O in flight.
    pub io_ticks_ms: u64,
}

/// Byte counters of one interface in `/proc/net/dev`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceBytes {
    pub rx: u64,
    pub tx: u64,
}

pub fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })
}

fn parse_field(file: &'static str, name: &str, value: Option<&str>) -> Result<u64> {
    let value = value.ok_or_else(|| Error::Parse {
        file,
        reason: format!("missing field {name:?}"),
    })?;

    value.parse().map_err(|error| Error::Parse {
        file,
        reason: format!("invalid value {value:?} for field {name:?}: {error}"),
    })
}

/// Parse the aggregate `cpu` line of `/proc/stat`.
///
/// ```text
/// cpu  user nice system idle iowait irq softirq steal guest guest_nice
/// ```
/// `guest` and `guest_nice` are already accounted in `user` and `nice`, so the
/// total only sums up to `steal`.
pub fn parse_cpu_times(stat: &str) -> Result<CpuTimes> {
    let line = stat
        .lines()
        .find(|line| line.split_whitespace().next() == Some("cpu"))
        .ok_or_else(|| Error::Parse {
            file: "/proc/stat",
            reason: "missing aggregate cpu line".to_string(),
        })?;

    let values = line
        .split_whitespace()
        .skip(1)
        .take(8)
        .map(|value| parse_field("/proc/stat", "cpu", Some(value)))
        .collect::<Result<Vec<u64>>>()?;

    if values.len() < 4 {
        return Err(Error::Parse {
            file: "/proc/stat",
            reason: format!("expected at least 4 cpu columns, got {}", values.len()),
        });
    }

    Ok(CpuTimes {
        idle: values[3],
        total: values.iter().sum(),
    })
}

pub fn parse_process_counts(stat: &str) -> Result<ProcessCounts> {
    let find = |key: &str| {
        let value = stat.lines().find_map(|line| {
            let mut fields = line.split_whitespace();
            (fields.next() == Some(key)).then(|| fields.next()).flatten()
        });
        parse_field("/proc/stat", key, value)
    };

    Ok(ProcessCounts {
        running: find("procs_running")?,
        blocked: find("procs_blocked")?,
    })
}

/// Parse the 1-minute figure of `/proc/loadavg`.
pub fn parse_load_average(loadavg: &str) -> Result<f64> {
    let value = loadavg
        .split_whitespace()
        .next()
        .ok_or_else(|| Error::Parse {
            file: "/proc/loadavg",
            reason: "empty file".to_string(),
        })?;

    let load: f64 = value.parse().map_err(|error| Error::Parse {
        file: "/proc/loadavg",
        reason: format!("invalid load average {value:?}: {error}"),
    })?;

    if load < 0.0 {
        return Err(Error::Parse {
            file: "/proc/loadavg",
            reason: format!("negative load average {load}"),
        });
    }

    super::ensure_finite("load average", load)
}

/// Find `device` in `/proc/diskstats`.
///
/// ```text
/// major minor name reads_completed reads_merged sectors_read time_reading
///     writes_completed writes_merged sectors_written time_writing
///     io_in_progress io_ticks weighted_io_ticks ...
/// ```
pub fn parse_diskstats(diskstats: &str, device: &str) -> Result<DiskStats> {
    let fields: Vec<&str> = diskstats
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<&str>>())
        .find(|fields| fields.get(2) == Some(&device))
        .ok_or_else(|| Error::DeviceNotFound(device.to_string()))?;

    Ok(DiskStats {
        reads_completed: parse_field("/proc/diskstats", "reads_completed", fields.get(3).copied())?,
        writes_completed: parse_field(
            "/proc/diskstats",
            "writes_completed",
            fields.get(7).copied(),
        )?,
        io_ticks_ms: parse_field("/proc/diskstats", "io_ticks", fields.get(12).copied())?,
    })
}

/// Find `interface` in `/proc/net/dev`.
///
/// After the two header lines every line reads `name: rx_bytes rx_packets ...`
/// with `tx_bytes` as the ninth counter.
pub fn parse_net_dev(net_dev: &str, interface: &str) -> Result<InterfaceBytes> {
    let counters = net_dev
        .lines()
        .skip(2)
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim() == interface)
        .map(|(_, counters)| counters.split_whitespace().collect::<Vec<&str>>())
        .ok_or_else(|| Error::InterfaceNotFound(interface.to_string()))?;

    Ok(InterfaceBytes {
        rx: parse_field("/proc/net/dev", "rx_bytes", counters.first().copied())?,
        tx: parse_field("/proc/net/dev", "tx_bytes", counters.get(8).copied())?,
    })
}

/// Parse `/proc/meminfo`, converting every value to bytes.
pub fn parse_meminfo(meminfo: &str) -> Result<MemoryBreakdown> {
    let find = |key: &str| -> Result<u64> {
        let line = meminfo
            .lines()
            .find_map(|line| line.strip_prefix(key)?.strip_prefix(':'))
            .ok_or_else(|| Error::Parse {
                file: "/proc/meminfo",
                reason: format!("missing field {key:?}"),
            })?;

        let mut fields = line.split_whitespace();
        let value = parse_field("/proc/meminfo", key, fields.next())?;
        match fields.next() {
            Some("kB") => value.checked_mul(1024).ok_or_else(|| Error::Parse {
                file: "/proc/meminfo",
                reason: format!("field {key:?} overflows in bytes"),
            }),
            None => Ok(value),
            Some(unit) => Err(Error::Parse {
                file: "/proc/meminfo",
                reason: format!("unexpected unit {unit:?} for field {key:?}"),
            }),
        }
    };

    Ok(MemoryBreakdown {
        total: find("MemTotal")?,
        active: find("Active")?,
        free: find("MemFree")?,
        cached: find("Cached")?,
        buffers: find("Buffers")?,
        swap_total: find("SwapTotal")?,
        swap_free: find("SwapFree")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "\
cpu  4705 150 1120 16250 520 0 35 0 0 0
cpu0 2355 75 560 8125 260 0 17 0 0 0
cpu1 2350 75 560 8125 260 0 18 0 0 0
intr 114930548 113199788 3 0 5 263 0 4 [... lots more numbers ...]
ctxt 1990473
btime 1062191376
processes 2915
procs_running 3
procs_blocked 1
";

    const DISKSTATS: &str = "\
   8       0 sda 9524 3042 612562 5464 19836 21876 1074570 38216 0 20684 43680 0 0 0 0
   8       3 sda3 9100 3000 600000 5300 19000 21000 1000000 38000 2 20000 43300 0 0 0 0
 259       0 nvme0n1 120 0 4096 12 30 0 2048 8 0 16 20 0 0 0 0
";

    const NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  123456     100    0    0    0     0          0         0   123456     100    0    0    0     0       0          0
  eth0: 98765432   65432    0    0    0     0          0        12 1234567    8901    0    0    0     0       0          0
";

    const MEMINFO: &str = "\
MemTotal:       16000000 kB
MemFree:         2000000 kB
MemAvailable:    7000000 kB
Buffers:         1000000 kB
Cached:          4000000 kB
SwapCached:            0 kB
Active:          6000000 kB
Inactive:        3000000 kB
SwapTotal:       2097148 kB
SwapFree:        2097148 kB
HugePages_Total:       0
";

    #[test]
    fn test_parse_cpu_times() {
        let times = parse_cpu_times(STAT).unwrap();
        assert_eq!(times.idle, 16250);
        assert_eq!(times.total, 4705 + 150 + 1120 + 16250 + 520 + 35);
    }

    #[test]
    fn test_parse_cpu_times_rejects_garbage() {
        assert!(matches!(
            parse_cpu_times("cpu  12 abc 3 4"),
            Err(Error::Parse { .. })
        ));
        assert!(matches!(
            parse_cpu_times("intr 1 2 3"),
            Err(Error::Parse { .. })
        ));
        assert!(parse_cpu_times("cpu 1 2").is_err());
    }

    #[test]
    fn test_parse_process_counts() {
        let counts = parse_process_counts(STAT).unwrap();
        assert_eq!(
            counts,
            ProcessCounts {
                running: 3,
                blocked: 1
            }
        );
        assert!(parse_process_counts("procs_running 3\n").is_err());
    }

    #[test]
    fn test_parse_load_average() {
        assert_eq!(
            parse_load_average("0.42 0.35 0.30 1/234 5678\n").unwrap(),
            0.42
        );
        assert!(parse_load_average("").is_err());
        assert!(parse_load_average("nan 0 0").is_err());
    }

    #[test]
    fn test_parse_diskstats() {
        let stats = parse_diskstats(DISKSTATS, "sda3").unwrap();
        assert_eq!(stats.reads_completed, 9100);
        assert_eq!(stats.writes_completed, 19000);
        assert_eq!(stats.io_ticks_ms, 20000);

        let stats = parse_diskstats(DISKSTATS, "nvme0n1").unwrap();
        assert_eq!(stats.io_ticks_ms, 16);
    }

    #[test]
    fn test_parse_diskstats_missing_device() {
        // Prefix of an existing device must not match
        assert!(matches!(
            parse_diskstats(DISKSTATS, "sd"),
            Err(Error::DeviceNotFound(device)) if device == "sd"
        ));
    }

    #[test]
    fn test_parse_net_dev() {
        let bytes = parse_net_dev(NET_DEV, "eth0").unwrap();
        assert_eq!(bytes.rx, 98765432);
        assert_eq!(bytes.tx, 1234567);

        assert!(matches!(
            parse_net_dev(NET_DEV, "wlan0"),
            Err(Error::InterfaceNotFound(_))
        ));
    }

    #[test]
    fn test_parse_meminfo() {
        let memory = parse_meminfo(MEMINFO).unwrap();
        assert_eq!(memory.total, 16_000_000 * 1024);
        assert_eq!(memory.free, 2_000_000 * 1024);
        assert_eq!(memory.cached, 4_000_000 * 1024);
        assert_eq!(memory.buffers, 1_000_000 * 1024);
        assert_eq!(memory.active, 6_000_000 * 1024);
        assert_eq!(memory.swap_total, 2_097_148 * 1024);
        assert_eq!(memory.used(), 9_000_000 * 1024);
    }

    #[test]
    fn test_parse_meminfo_does_not_confuse_prefixed_keys() {
        // Longer keys sharing a prefix come first
        let meminfo = "\
MemTotal:       16000000 kB
MemFree:         2000000 kB
SwapCached:          123 kB
Cached:          4000000 kB
Buffers:         1000000 kB
Active(anon):     456789 kB
Active(file):     987654 kB
Active:          6000000 kB
SwapTotal:       2097148 kB
SwapFree:        2097148 kB
";
        let memory = parse_meminfo(meminfo).unwrap();
        assert_eq!(memory.cached, 4_000_000 * 1024);
        assert_eq!(memory.active, 6_000_000 * 1024);
    }

    #[test]
    fn test_parse_meminfo_overflow() {
        let meminfo = MEMINFO.replace(
            "MemTotal:       16000000 kB",
            "MemTotal: 18446744073709551615 kB",
        );
        assert!(matches!(
            parse_meminfo(&meminfo),
            Err(Error::Parse { reason, .. }) if reason.contains("overflows")
        ));
    }

    #[test]
    fn test_parse_meminfo_missing_field() {
        assert!(matches!(
            parse_meminfo("MemTotal: 100 kB\n"),
            Err(Error::Parse { .. })
        ));
    }
}
