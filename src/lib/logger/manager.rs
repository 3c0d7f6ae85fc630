use anyhow::{Context, Result};
use tracing::{metadata::LevelFilter, *};
use tracing_log::LogTracer;
use tracing_subscriber::{filter::Directive, fmt, layer::SubscriberExt, EnvFilter, Layer};

use crate::{
    cli,
    settings::manager::{Settings, Source},
};

// Start logger, should be done inside main
pub fn init(settings: &Settings) -> Result<()> {
    // Redirect all logs from libs using "Log"
    LogTracer::init_with_filter(tracing::log::LevelFilter::Trace)
        .context("Failed to set logger")?;

    // Configure the console log
    let console_env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if settings.debug {
            EnvFilter::new(LevelFilter::DEBUG.to_string())
        } else {
            EnvFilter::new(LevelFilter::INFO.to_string())
        }
    });

    let console_layer = fmt::Layer::new()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(fmt::format::FmtSpan::NONE)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_filter(filter_runtime_crates(console_env_filter, settings.debug)?);

    // Configure the file log
    let file_layer = match &settings.log_path {
        Some(dir) => {
            let file_env_filter = EnvFilter::new(LevelFilter::DEBUG.to_string());
            let file_appender =
                tracing_appender::rolling::hourly(dir, concat!(env!("CARGO_PKG_NAME"), ".log"));
            Some(
                fmt::Layer::new()
                    .with_writer(file_appender)
                    .with_ansi(false)
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(fmt::format::FmtSpan::NONE)
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_filter(filter_runtime_crates(file_env_filter, settings.debug)?),
            )
        }
        None => None,
    };

    // Configure the default subscriber
    let subscriber = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("Unable to set a global subscriber")?;

    info!(
        "{}, version: {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
    );
    info!(
        "Starting at {}",
        chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
    );
    debug!("Command line call: {}", cli::manager::command_line_string());
    debug!("Settings: {settings:?}");

    Ok(())
}

/// Say where the settings came from, once the subscriber is in place.
pub fn log_settings_source(source: &Source) {
    match source {
        Source::File(path) => info!("Settings file {path:?} has been applied"),
        Source::Defaults {
            searched: Some(path),
        } => warn!("Settings file was not found, using defaults. Discovery path: {path:?}"),
        Source::Defaults { searched: None } => {
            warn!("No settings directory available, using defaults")
        }
    }
}

/// The HTTP runtime crates carry the connection and worker scheduling
/// diagnostics, they are only wanted in debug mode.
fn filter_runtime_crates(env_filter: EnvFilter, debug: bool) -> Result<EnvFilter> {
    let level = if debug { "trace" } else { "warn" };

    ["actix_server", "actix_http", "actix_rt", "mio"]
        .iter()
        .try_fold(env_filter, |env_filter, target| {
            let directive = format!("{target}={level}")
                .parse::<Directive>()
                .with_context(|| format!("Invalid log directive for {target}"))?;
            Ok(env_filter.add_directive(directive))
        })
}
