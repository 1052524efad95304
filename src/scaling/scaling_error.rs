use actix_web::{http::StatusCode as ActixStatus, HttpResponse, ResponseError};
use reqwest::StatusCode;
use serde_json::Error as JsonError;
use std::sync::Arc;

/// Failures reported by a `ServiceQuery` backend.
#[derive(thiserror::Error, Debug)]
pub enum ScalingError {
    #[error("HTTP error ({0}): {1}")]
    HttpError(StatusCode, String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] JsonError),

    #[error("Invalid scaling factor {0} (must be 1-100)")]
    InvalidFactor(u64),

    #[error("Label parse error: {0}")]
    LabelParse(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Terminal outcomes of a scale-from-zero attempt. The request is never
/// forwarded when one of these is returned.
#[derive(thiserror::Error, Debug)]
pub enum ScaleFromZeroError {
    /// The authoritative replica lookup failed.
    #[error("error finding function {name}: {source}")]
    Query {
        name: String,
        #[source]
        source: ScalingError,
    },

    /// The scale-up command was rejected.
    #[error("unable to scale function [{name}], err: {source}")]
    ScaleCommand {
        name: String,
        #[source]
        source: ScalingError,
    },

    /// A lookup inside the readiness poll failed.
    #[error("error: {source}")]
    PollQuery {
        name: String,
        #[source]
        source: ScalingError,
    },

    /// The failure of a scale-up sequence another request ran for the same
    /// function while this one waited.
    #[error(transparent)]
    Coalesced(Arc<ScaleFromZeroError>),
}

impl ScaleFromZeroError {
    pub fn function_name(&self) -> &str {
        match self {
            Self::Query { name, .. }
            | Self::ScaleCommand { name, .. }
            | Self::PollQuery { name, .. } => name,
            Self::Coalesced(err) => err.function_name(),
        }
    }
}

impl ResponseError for ScaleFromZeroError {
    fn status_code(&self) -> ActixStatus {
        match self {
            Self::Query { .. } => ActixStatus::NOT_FOUND,
            Self::ScaleCommand { .. } | Self::PollQuery { .. } => {
                ActixStatus::INTERNAL_SERVER_ERROR
            }
            Self::Coalesced(err) => err.status_code(),
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).body(self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_down() -> ScalingError {
        ScalingError::HttpError(StatusCode::SERVICE_UNAVAILABLE, "provider down".into())
    }

    #[test]
    fn query_error_maps_to_not_found() {
        let err = ScaleFromZeroError::Query {
            name: "figlet".into(),
            source: backend_down(),
        };
        assert_eq!(err.status_code(), ActixStatus::NOT_FOUND);
        assert_eq!(
            err.to_string(),
            "error finding function figlet: HTTP error (503 Service Unavailable): provider down"
        );
    }

    #[test]
    fn scale_and_poll_errors_map_to_server_error() {
        let scale = ScaleFromZeroError::ScaleCommand {
            name: "figlet".into(),
            source: backend_down(),
        };
        let poll = ScaleFromZeroError::PollQuery {
            name: "figlet".into(),
            source: backend_down(),
        };
        assert_eq!(scale.status_code(), ActixStatus::INTERNAL_SERVER_ERROR);
        assert_eq!(poll.status_code(), ActixStatus::INTERNAL_SERVER_ERROR);
        assert!(scale
            .to_string()
            .starts_with("unable to scale function [figlet], err: "));
        assert!(poll.to_string().starts_with("error: HTTP error"));
        assert_eq!(poll.function_name(), "figlet");
    }

    #[test]
    fn coalesced_error_keeps_status_and_message() {
        let inner = Arc::new(ScaleFromZeroError::Query {
            name: "figlet".into(),
            source: backend_down(),
        });
        let shared = ScaleFromZeroError::Coalesced(Arc::clone(&inner));
        assert_eq!(shared.status_code(), ActixStatus::NOT_FOUND);
        assert_eq!(shared.to_string(), inner.to_string());
        assert_eq!(shared.function_name(), "figlet");
    }
}
