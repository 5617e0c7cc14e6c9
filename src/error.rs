//! Error taxonomy.
//!
//! Admission errors resolve to a literal HTTP status + body at the upgrade
//! boundary; they never reach the `Gateway`. TCP/API errors are recovered
//! locally (as a WS close or a 401) and are never fatal to the process.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("Invalid subprotocols")]
    InvalidSubprotocols,

    #[error("Invalid token '{0}'")]
    InvalidToken(String),

    #[error("Invalid node")]
    InvalidNode,

    #[error("auth API request failed: {0}")]
    Api(#[from] ApiError),
}

impl AdmissionError {
    /// The literal body the source emits for this failure.
    pub fn body(&self) -> String {
        match self {
            AdmissionError::InvalidSubprotocols => "Invalid subprotocols".to_owned(),
            AdmissionError::InvalidToken(tok) => format!("Invalid token '{tok}'"),
            AdmissionError::InvalidNode => "Invalid node".to_owned(),
            AdmissionError::Api(e) => e.to_string(),
        }
    }
}

impl ResponseError for AdmissionError {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).body(self.body())
    }
}

/// Failures talking to the upstream REST API.
///
/// Any failure here is surfaced to the admission caller as a 401, matching
/// the source's observable behavior, rather than a distinct 5xx.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request to auth API failed: {0}")]
    Transport(String),

    #[error("auth API returned status {0}")]
    Status(u16),

    #[error("could not parse auth API response: {0}")]
    Decode(String),
}

/// Errors surfaced by the in-process local API.
#[derive(Debug, thiserror::Error)]
pub enum LocalApiError {
    #[error("No internal token set")]
    NoTokenConfigured,

    #[error("Invalid resource '{0}'")]
    InvalidResource(String),
}

impl LocalApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            LocalApiError::NoTokenConfigured => StatusCode::BAD_REQUEST,
            LocalApiError::InvalidResource(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl ResponseError for LocalApiError {
    fn status_code(&self) -> StatusCode {
        LocalApiError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).body(self.to_string())
    }
}
