use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
};
use tracing::*;

use super::error::{http_fault_message, unknown_error_message, Error, ErrorEnvelope};

enum Fault {
    Http(String),
    Unknown(String),
}

/// Turn every failed response into an [`ErrorEnvelope`], logging each fault once.
///
/// Faults raised by the HTTP layer keep their status code and are logged with
/// the request URL at warn level, everything else is logged at error level.
pub async fn translate_errors(
    request: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> actix_web::Result<ServiceResponse<BoxBody>> {
    let http_request = request.request().clone();

    let response = match next.call(request).await {
        Ok(response) => response.map_into_boxed_body(),
        Err(error) => ServiceResponse::from_err(error, http_request.clone()),
    };

    let status = response.status();
    let fault = match response.response().error() {
        Some(error) => match error.as_error::<Error>() {
            Some(error) if error.is_http_fault() => Fault::Http(error.message()),
            Some(error) => Fault::Unknown(error.message()),
            None if status.is_server_error() => Fault::Unknown(unknown_error_message(
                "actix_web::Error",
                &format!("{error:?}"),
            )),
            None => Fault::Http(http_fault_message(status, &error.to_string())),
        },
        None if status.is_server_error() => Fault::Unknown(unknown_error_message(
            "UnexpectedResponse",
            status.canonical_reason().unwrap_or("Unknown"),
        )),
        None if status.is_client_error() => Fault::Http(http_fault_message(
            status,
            status.canonical_reason().unwrap_or("Error"),
        )),
        None => return Ok(response),
    };

    let msg = match fault {
        Fault::Http(msg) => {
            warn!("{}", http_request.full_url());
            msg
        }
        Fault::Unknown(msg) => {
            error!("{msg}");
            msg
        }
    };

    let (request, _) = response.into_parts();
    Ok(ServiceResponse::new(
        request,
        ErrorEnvelope::new(msg).into_response(status),
    ))
}
