use actix_web::{web, HttpRequest, HttpResponse};
use tracing::*;

use crate::{
    metrics::{assembler, encoder},
    server::{
        context::AppContext,
        error::{catch_panic, Error, Result},
    },
};

/// Sample the host and render every metric, one per line
pub async fn metrics(context: web::Data<AppContext>) -> Result<HttpResponse> {
    let context = context.get_ref().clone();

    // Sampling sleeps through its window, keep it off the server workers
    let body = tokio::task::spawn_blocking(move || {
        catch_panic(|| {
            let timestamp = encoder::timestamp_now();
            assembler::assemble(context.sampler.as_ref(), &context.settings, timestamp)
        })
        .and_then(|body| body.map_err(Error::from))
    })
    .await??;

    trace!("Scrape body: {body}");

    Ok(HttpResponse::Ok().content_type("text/plain").body(body))
}

pub async fn not_found(req: HttpRequest) -> Result<HttpResponse> {
    Err(Error::NotFound(format!(
        "Page does not exist: {:?}",
        req.path()
    )))
}

pub async fn method_not_allowed(req: HttpRequest) -> Result<HttpResponse> {
    Err(Error::MethodNotAllowed(format!(
        "{} is not supported on {:?}",
        req.method(),
        req.path()
    )))
}
