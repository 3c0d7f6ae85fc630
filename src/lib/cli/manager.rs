use std::path::PathBuf;

use clap::Parser;

use crate::settings::manager::CounterMode;

/// Command line, every option can also be given by its environment variable.
/// Values given here take precedence over the settings file.
#[derive(Parser, Debug, Clone, Default)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Sets the settings file, a JSON document with the same keys as the options below.
    #[arg(long, value_name = "FILE", env = "HME_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Sets the address the HTTP server binds to.
    #[arg(long, env = "HME_HOST")]
    pub host: Option<String>,

    /// Sets the port the HTTP server listens on.
    #[arg(long, env = "HME_PORT", value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// Turn all log categories up to Debug and enable the HTTP runtime diagnostics, for more information check RUST_LOG env variable.
    #[arg(short, long, visible_alias = "debug", env = "HME_DEBUG")]
    pub verbose: bool,

    /// Block device to report, can be repeated.
    #[arg(long = "disk", value_name = "DEVICE", env = "HME_DISKS", value_delimiter = ',')]
    pub disks: Vec<String>,

    /// Network interface to report, can be repeated.
    #[arg(
        long = "interface",
        value_name = "INTERFACE",
        env = "HME_INTERFACES",
        value_delimiter = ','
    )]
    pub interfaces: Vec<String>,

    /// How disk I/O and network counters are reported.
    #[arg(long, value_enum, env = "HME_COUNTER_MODE")]
    pub counter_mode: Option<CounterMode>,

    /// Window used to compute rates and busy percentages, in milliseconds.
    #[arg(long, value_name = "MILLISECONDS", env = "HME_SAMPLE_INTERVAL_MS")]
    pub sample_interval_ms: Option<u64>,

    /// Directory of the hourly rotated log files, no file log when unset.
    #[arg(long, value_name = "DIRECTORY", env = "HME_LOG_PATH")]
    pub log_path: Option<PathBuf>,
}

pub fn parse() -> Args {
    Args::parse()
}

// Return the command line used to start this application
pub fn command_line_string() -> String {
    std::env::args().collect::<Vec<String>>().join(" ")
}
