use std::{
    any::Any,
    backtrace::Backtrace,
    cell::RefCell,
    panic::{self, AssertUnwindSafe},
    sync::Once,
};

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;

use crate::sampler;

pub type Result<T> = actix_web::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Method Not Allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Sampling failed: {0}")]
    Sampling(#[from] sampler::Error),

    #[error("{kind}: {trace}")]
    Unexpected { kind: String, trace: String },
}

impl Error {
    /// Faults raised on purpose by the HTTP layer, as opposed to failures while serving.
    pub fn is_http_fault(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::MethodNotAllowed(_)
        )
    }

    /// Text of the `msg` field of the error envelope.
    pub fn message(&self) -> String {
        match self {
            Self::NotFound(detail) | Self::MethodNotAllowed(detail) => {
                http_fault_message(self.status_code(), detail)
            }
            Self::Sampling(error) => {
                let mut trace = error.to_string();
                let mut source = std::error::Error::source(error);
                while let Some(cause) = source {
                    trace.push_str(&format!("\nCaused by: {cause}"));
                    source = cause.source();
                }
                unknown_error_message("SamplingFault", &trace)
            }
            Self::Unexpected { kind, trace } => unknown_error_message(kind, trace),
        }
    }
}

pub fn http_fault_message(status: StatusCode, detail: &str) -> String {
    format!(
        "{}. {}.",
        status.canonical_reason().unwrap_or("Error"),
        detail.trim_end_matches('.')
    )
}

pub fn unknown_error_message(kind: &str, trace: &str) -> String {
    format!("Unknown error. {kind} {trace}")
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Sampling(_) | Self::Unexpected { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        ErrorEnvelope::new(self.message()).into_response(self.status_code())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(error: tokio::task::JoinError) -> Self {
        if !error.is_panic() {
            return Self::Unexpected {
                kind: "Cancelled".to_string(),
                trace: error.to_string(),
            };
        }

        Self::Unexpected {
            kind: "Panic".to_string(),
            trace: panic_message(error.into_panic().as_ref()),
        }
    }
}

thread_local! {
    static PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Keep the backtrace of every panic for [`catch_panic`] on the panicking
/// thread. The previous hook still runs. Installing more than once is a no-op.
pub fn install_panic_hook() {
    static INSTALL: Once = Once::new();

    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture().to_string();
            PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            previous(info);
        }));
    });
}

/// Run `f`, turning a panic into [`Error::Unexpected`].
///
/// The trace is the panic message, followed by the backtrace when the hook of
/// [`install_panic_hook`] is in place.
pub fn catch_panic<T>(f: impl FnOnce() -> T) -> Result<T> {
    PANIC_BACKTRACE.with(|slot| slot.borrow_mut().take());

    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let mut trace = panic_message(payload.as_ref());
        if let Some(backtrace) = PANIC_BACKTRACE.with(|slot| slot.borrow_mut().take()) {
            trace.push('\n');
            trace.push_str(&backtrace);
        }

        Error::Unexpected {
            kind: "Panic".to_string(),
            trace,
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "Box<dyn Any>".to_string())
}

/// Body of every non successful response.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub status: &'static str,
    pub error_code: Option<i64>,
    pub msg: String,
    pub data: Option<serde_json::Value>,
}

impl ErrorEnvelope {
    pub fn new(msg: String) -> Self {
        Self {
            status: "ERROR",
            error_code: None,
            msg,
            data: None,
        }
    }

    pub fn into_response(self, status: StatusCode) -> HttpResponse {
        HttpResponse::build(status).json(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_fault_message() {
        let error = Error::NotFound("Page does not exist: \"/nonexistent\"".to_string());
        assert!(error.is_http_fault());
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            error.message(),
            "Not Found. Page does not exist: \"/nonexistent\"."
        );
    }

    #[test]
    fn test_sampling_fault_message() {
        let error = Error::from(sampler::Error::Io {
            path: "/proc/diskstats".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file"),
        });
        assert!(!error.is_http_fault());
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let message = error.message();
        assert!(message.starts_with("Unknown error. SamplingFault Failed to read /proc/diskstats"));
        assert!(message.contains("Caused by: No such file"));
    }

    #[test]
    fn test_envelope_shape() {
        let envelope = ErrorEnvelope::new("Something. Happened.".to_string());
        let value = serde_json::to_value(envelope).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "status": "ERROR",
                "error_code": null,
                "msg": "Something. Happened.",
                "data": null,
            })
        );
    }

    #[test]
    fn test_caught_panic_carries_backtrace() {
        install_panic_hook();
        // Second install must not stack another hook
        install_panic_hook();

        let error = catch_panic(|| -> u32 { panic!("counter exploded") }).unwrap_err();
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let message = error.message();
        let (head, backtrace) = message.split_once('\n').unwrap();
        assert_eq!(head, "Unknown error. Panic counter exploded");
        assert!(!backtrace.trim().is_empty());
    }

    #[test]
    fn test_catch_panic_passes_values_through() {
        assert_eq!(catch_panic(|| 42).unwrap(), 42);
    }

    #[tokio::test]
    async fn test_panic_becomes_unexpected() {
        let error = tokio::task::spawn_blocking(|| panic!("counter exploded"))
            .await
            .unwrap_err();

        let error = Error::from(error);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.message(), "Unknown error. Panic counter exploded");
    }
}
