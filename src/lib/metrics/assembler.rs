use tracing::*;

use super::encoder::{encode, Labels};
use crate::{
    sampler::{self, Sampler},
    settings::manager::{CounterMode, Settings},
};

const MEGABYTE: f64 = 1024.0 * 1024.0;
const GIGABYTE: f64 = 1024.0 * 1024.0 * 1024.0;

/// Rates and cumulative counters are never reported under the same name.
struct CounterNames {
    disk_io: &'static str,
    network: &'static str,
}

impl From<CounterMode> for CounterNames {
    fn from(mode: CounterMode) -> Self {
        match mode {
            CounterMode::Rate => Self {
                disk_io: "disk_io_rate",
                network: "network",
            },
            CounterMode::Cumulative => Self {
                disk_io: "disk_sum",
                network: "network_sum",
            },
        }
    }
}

struct Lines {
    timestamp: i64,
    lines: Vec<String>,
}

impl Lines {
    fn push(&mut self, name: &str, value: f64, labels: Labels) {
        self.lines.push(encode(name, value, &labels, self.timestamp));
    }
}

/// Sample every metric and render the scrape body.
///
/// The line order is fixed: scalars, then each network interface and each disk
/// in configuration order, then memory. Windowed readings share the one window
/// opened by [`Sampler::begin_scrape`]. The first sampler failure aborts the
/// whole scrape.
#[instrument(level = "debug", skip_all)]
pub fn assemble(
    sampler: &dyn Sampler,
    settings: &Settings,
    timestamp: i64,
) -> sampler::Result<String> {
    let names = CounterNames::from(settings.counter_mode);
    let mut lines = Lines {
        timestamp,
        lines: Vec::new(),
    };

    let scrape = sampler.begin_scrape()?;

    let processes = scrape.process_counts()?;
    lines.push("load_average", scrape.load_average()?, Labels::new());
    lines.push("procs_running", processes.running as f64, Labels::new());
    lines.push("procs_blocked", processes.blocked as f64, Labels::new());
    lines.push("cpu", scrape.cpu_utilization()?, Labels::new());

    for interface in &settings.network_interfaces {
        let bytes = scrape.network_bytes(interface)?;
        for (kind, value) in [("rx", bytes.rx), ("tx", bytes.tx)] {
            lines.push(
                names.network,
                value / MEGABYTE,
                Labels::new()
                    .with("type", kind)
                    .with("interface", interface.as_str()),
            );
        }
    }

    for disk in &settings.disks {
        let dev = || Labels::new().with("dev", disk.as_str());

        lines.push("disk_busy", scrape.disk_busy(disk)?, dev());

        let io = scrape.disk_io_rate(disk)?;
        for (operation, value) in [("reads", io.reads), ("writes", io.writes)] {
            lines.push(names.disk_io, value, dev().with("operation", operation));
        }

        let usage = scrape.disk_usage(disk)?;
        for (kind, bytes) in [
            ("size", usage.total),
            ("used", usage.used),
            ("free", usage.free),
        ] {
            lines.push("disk_space", bytes as f64 / MEGABYTE, dev().with("type", kind));
        }
    }

    let memory = scrape.memory_breakdown()?;
    for (kind, bytes) in [
        ("used", memory.used()),
        ("cached", memory.cached),
        ("buffers", memory.buffers),
        ("free", memory.free),
    ] {
        lines.push(
            "ram",
            bytes as f64 / GIGABYTE,
            Labels::new().with("type", kind),
        );
    }

    debug!("Assembled {} metric lines", lines.lines.len());

    Ok(lines.lines.join("\n"))
}
