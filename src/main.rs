use anyhow::{Context, Result};

use host_metrics_exporter::{cli, logger, server, settings};

#[actix_web::main]
async fn main() -> Result<()> {
    let args = cli::manager::parse();
    let (settings, source) =
        settings::manager::load(&args).context("Failed to resolve settings")?;

    logger::manager::init(&settings)?;
    logger::manager::log_settings_source(&source);
    server::error::install_panic_hook();

    let context = server::context::AppContext::new(settings);

    server::manager::run(context)
        .await
        .context("Failed running the HTTP server")
}
