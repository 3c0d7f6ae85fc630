use actix_web::{
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
    middleware::from_fn,
    web, App, HttpServer,
};
use tracing::*;
use tracing_actix_web::TracingLogger;

use super::{context::AppContext, pages, translator};

/// Build the application, shared by the server and the tests.
pub fn app(
    context: web::Data<AppContext>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .wrap(from_fn(translator::translate_errors))
        .wrap(TracingLogger::default())
        .app_data(context)
        .configure(configure_routes)
        .default_service(web::route().to(pages::not_found))
}

fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/metrics")
            .route(web::get().to(pages::metrics))
            .default_service(web::route().to(pages::method_not_allowed)),
    );
}

// Start the HTTP server with the desired context, serving until shutdown
pub async fn run(context: AppContext) -> Result<(), std::io::Error> {
    let server_address = context.settings.server_address();
    let context = web::Data::new(context);

    info!("Server running at {server_address}");

    HttpServer::new(move || app(context.clone()))
        .bind(server_address)?
        .run()
        .await
}
