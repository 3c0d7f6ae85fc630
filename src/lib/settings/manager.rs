use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::ValueEnum;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::cli::manager::Args;

/// One kernel tick at 100 Hz, shorter windows often see no CPU time at all.
pub const MIN_SAMPLE_INTERVAL_MS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to read settings file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

/// How disk I/O and network counters are reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CounterMode {
    /// Per second, measured over the sampling interval.
    #[default]
    Rate,
    /// Raw counters since boot.
    Cumulative,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub disks: Vec<String>,
    pub network_interfaces: Vec<String>,
    pub counter_mode: CounterMode,
    pub sample_interval_ms: u64,
    pub log_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
            debug: false,
            disks: vec!["sda3".to_string()],
            network_interfaces: vec!["eth0".to_string()],
            counter_mode: CounterMode::Rate,
            sample_interval_ms: 200,
            log_path: None,
        }
    }
}

impl Settings {
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    /// Command line and environment values take precedence over the file.
    pub fn apply(&mut self, args: &Args) {
        if let Some(host) = &args.host {
            self.host.clone_from(host);
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if args.verbose {
            self.debug = true;
        }
        if !args.disks.is_empty() {
            self.disks.clone_from(&args.disks);
        }
        if !args.interfaces.is_empty() {
            self.network_interfaces.clone_from(&args.interfaces);
        }
        if let Some(counter_mode) = args.counter_mode {
            self.counter_mode = counter_mode;
        }
        if let Some(sample_interval_ms) = args.sample_interval_ms {
            self.sample_interval_ms = sample_interval_ms;
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.host.trim().is_empty() {
            return Err(Error::Invalid("host is empty".to_string()));
        }
        if self.port == 0 {
            return Err(Error::Invalid("port must be within 1-65535".to_string()));
        }
        if self.sample_interval_ms < MIN_SAMPLE_INTERVAL_MS {
            return Err(Error::Invalid(format!(
                "sample_interval_ms must be at least {MIN_SAMPLE_INTERVAL_MS}"
            )));
        }

        validate_names("disk", &self.disks)?;
        validate_names("network interface", &self.network_interfaces)
    }
}

/// Names end up quoted inside label values, so they must be non-empty,
/// unique and free of quotes, backslashes and line breaks.
fn validate_names(kind: &str, names: &[String]) -> Result<(), Error> {
    let mut seen = HashSet::new();
    for name in names {
        if name.is_empty() {
            return Err(Error::Invalid(format!("empty {kind} name")));
        }
        if name.contains(['"', '\\', '\n', '\r']) {
            return Err(Error::Invalid(format!(
                "{kind} name {name:?} contains a quote, backslash or line break"
            )));
        }
        if !seen.insert(name) {
            return Err(Error::Invalid(format!("duplicated {kind} {name:?}")));
        }
    }
    Ok(())
}

/// Where the resolved settings came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Defaults { searched: Option<PathBuf> },
}

pub fn default_settings_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", env!("CARGO_PKG_NAME"))
        .map(|project| project.config_dir().join("settings.json"))
}

pub fn load_settings_from_file(file_name: &Path) -> Result<Settings, Error> {
    let content = std::fs::read_to_string(file_name).map_err(|source| Error::Io {
        path: file_name.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| Error::Parse {
        path: file_name.to_path_buf(),
        source,
    })
}

/// Resolve the settings once at startup.
///
/// An explicit settings file must exist. Without one, the per-user settings
/// file is used when present, falling back to the defaults otherwise.
pub fn load(args: &Args) -> Result<(Settings, Source), Error> {
    let (mut settings, source) = match &args.settings {
        Some(path) => (load_settings_from_file(path)?, Source::File(path.clone())),
        None => match default_settings_path() {
            Some(path) if path.exists() => {
                (load_settings_from_file(&path)?, Source::File(path))
            }
            searched => (Settings::default(), Source::Defaults { searched }),
        },
    };

    settings.apply(args);
    settings.validate()?;

    Ok((settings, source))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn generate_random_settings_file_name() -> PathBuf {
        use rand::Rng;

        let rand_string: String = rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(30)
            .map(char::from)
            .collect();

        std::env::temp_dir().join(format!("{rand_string}.json"))
    }

    fn args(arguments: &[&str]) -> Args {
        Args::try_parse_from(
            std::iter::once("host-metrics-exporter").chain(arguments.iter().copied()),
        )
        .unwrap()
    }

    #[test]
    fn test_load_is_idempotent() {
        let file_name = generate_random_settings_file_name();
        std::fs::write(
            &file_name,
            r#"{
                "host": "0.0.0.0",
                "port": 9100,
                "disks": ["sda", "nvme0n1"],
                "network_interfaces": ["enp3s0"],
                "counter_mode": "cumulative"
            }"#,
        )
        .unwrap();

        let arguments = args(&["--settings", file_name.to_str().unwrap()]);
        let (first, source) = load(&arguments).unwrap();
        let (second, _) = load(&arguments).unwrap();

        assert_eq!(first, second);
        assert_eq!(source, Source::File(file_name.clone()));
        assert_eq!(first.server_address(), "0.0.0.0:9100");
        assert_eq!(first.disks, vec!["sda", "nvme0n1"]);
        assert_eq!(first.counter_mode, CounterMode::Cumulative);
        // Unset fields keep their defaults
        assert!(!first.debug);
        assert_eq!(first.sample_interval_ms, 200);

        std::fs::remove_file(file_name).unwrap();
    }

    #[test]
    fn test_command_line_overrides_file() {
        let file_name = generate_random_settings_file_name();
        std::fs::write(&file_name, r#"{ "port": 9100, "disks": ["sda"] }"#).unwrap();

        let arguments = args(&[
            "--settings",
            file_name.to_str().unwrap(),
            "--port",
            "9200",
            "--disk",
            "sdb",
            "--disk",
            "sdc",
            "--debug",
        ]);
        let (settings, _) = load(&arguments).unwrap();

        assert_eq!(settings.port, 9200);
        assert_eq!(settings.disks, vec!["sdb", "sdc"]);
        assert!(settings.debug);

        std::fs::remove_file(file_name).unwrap();
    }

    #[test]
    fn test_missing_settings_file() {
        let arguments = args(&[
            "--settings",
            generate_random_settings_file_name().to_str().unwrap(),
        ]);
        assert!(matches!(load(&arguments), Err(Error::Io { .. })));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let file_name = generate_random_settings_file_name();
        std::fs::write(&file_name, r#"{ "prot": 9100 }"#).unwrap();

        assert!(matches!(
            load_settings_from_file(&file_name),
            Err(Error::Parse { .. })
        ));

        std::fs::remove_file(file_name).unwrap();
    }

    #[test]
    fn test_validate() {
        assert!(Settings::default().validate().is_ok());

        let settings = Settings {
            port: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            sample_interval_ms: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            sample_interval_ms: MIN_SAMPLE_INTERVAL_MS - 1,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            sample_interval_ms: MIN_SAMPLE_INTERVAL_MS,
            ..Default::default()
        };
        assert!(settings.validate().is_ok());

        let settings = Settings {
            disks: vec!["sda".into(), "sda".into()],
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            network_interfaces: vec!["eth\"0".into()],
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
