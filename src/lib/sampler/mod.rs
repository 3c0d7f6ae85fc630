pub mod linux;
pub mod procfs;

pub use linux::{ProcfsSampler, Window};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {file}: {reason}")]
    Parse { file: &'static str, reason: String },

    #[error("Block device not found: {0}")]
    DeviceNotFound(String),

    #[error("Network interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("Reading of {0} is not a finite number")]
    NotFinite(&'static str),
}

/// Completed read and write operations of a block device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskIo {
    pub reads: f64,
    pub writes: f64,
}

/// Space of the filesystem backed by a block device, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

/// Received and transmitted bytes of a network interface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkBytes {
    pub rx: f64,
    pub tx: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessCounts {
    pub running: u64,
    pub blocked: u64,
}

/// Memory accounting, all values in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBreakdown {
    pub total: u64,
    pub active: u64,
    pub free: u64,
    pub cached: u64,
    pub buffers: u64,
    pub swap_total: u64,
    pub swap_free: u64,
}

impl MemoryBreakdown {
    /// Memory not accounted as free, page cache or buffers.
    pub fn used(&self) -> u64 {
        self.total
            .saturating_sub(self.free)
            .saturating_sub(self.cached)
            .saturating_sub(self.buffers)
    }
}

/// One reading per call, always taken from the current system state.
///
/// Every method either returns a valid reading or an [`Error`], a sampler
/// never reports a placeholder value.
pub trait Sampler: Send + Sync {
    /// Readings for a single scrape.
    ///
    /// Samplers measuring over a window take it once here, so every reading
    /// of the scrape shares the same window. Others serve the scrape directly.
    fn begin_scrape(&self) -> Result<Box<dyn Sampler + '_>> {
        Ok(Box::new(self))
    }

    /// Percent of CPU time not spent idle, in `[0, 100]`.
    fn cpu_utilization(&self) -> Result<f64>;

    /// 1-minute load average.
    fn load_average(&self) -> Result<f64>;

    fn process_counts(&self) -> Result<ProcessCounts>;

    /// Percent of the sampling window the device had I/O in flight, in `[0, 100]`.
    fn disk_busy(&self, device: &str) -> Result<f64>;

    fn disk_io_rate(&self, device: &str) -> Result<DiskIo>;

    fn disk_usage(&self, device: &str) -> Result<DiskUsage>;

    fn network_bytes(&self, interface: &str) -> Result<NetworkBytes>;

    fn memory_breakdown(&self) -> Result<MemoryBreakdown>;
}

impl<S: Sampler + ?Sized> Sampler for &S {
    fn begin_scrape(&self) -> Result<Box<dyn Sampler + '_>> {
        (**self).begin_scrape()
    }

    fn cpu_utilization(&self) -> Result<f64> {
        (**self).cpu_utilization()
    }

    fn load_average(&self) -> Result<f64> {
        (**self).load_average()
    }

    fn process_counts(&self) -> Result<ProcessCounts> {
        (**self).process_counts()
    }

    fn disk_busy(&self, device: &str) -> Result<f64> {
        (**self).disk_busy(device)
    }

    fn disk_io_rate(&self, device: &str) -> Result<DiskIo> {
        (**self).disk_io_rate(device)
    }

    fn disk_usage(&self, device: &str) -> Result<DiskUsage> {
        (**self).disk_usage(device)
    }

    fn network_bytes(&self, interface: &str) -> Result<NetworkBytes> {
        (**self).network_bytes(interface)
    }

    fn memory_breakdown(&self) -> Result<MemoryBreakdown> {
        (**self).memory_breakdown()
    }
}

pub fn ensure_finite(what: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::NotFinite(what))
    }
}
