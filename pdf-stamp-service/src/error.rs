use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Forbidden: invalid API key")]
    Unauthorized,

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("{0}")]
    Annotation(#[from] AnnotationError),

    #[error("Failed to load PDF: {0}")]
    Load(#[source] CodecError),

    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to embed image {image}: {source}")]
    Embed {
        image: String,
        #[source]
        source: CodecError,
    },

    #[error("Failed to draw annotation {index}: {source}")]
    Draw {
        index: usize,
        #[source]
        source: CodecError,
    },

    #[error("Failed to serialize edited PDF: {0}")]
    Serialize(#[source] CodecError),

    #[error("Request did not complete within {seconds}s")]
    RequestTimeout { seconds: u64 },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Annotation validation errors. `index` is the position in the request's list.
#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("Annotation {index} targets page {page_index}, but the document has {page_count} page(s)")]
    PageIndex {
        index: usize,
        page_index: u32,
        page_count: usize,
    },

    #[error("Annotation {index}: {message}")]
    Invalid { index: usize, message: String },
}

/// Remote image fetch errors
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid image URL: {url}")]
    InvalidUrl { url: String },

    #[error("Image request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Image request to {url} timed out")]
    Timeout { url: String },

    #[error("Image request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Image at {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: u64 },
}

/// PDF codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("{0}")]
    Pdf(#[from] lopdf::Error),

    #[error("{0}")]
    Image(#[from] image::ImageError),

    #[error("Malformed document: {message}")]
    Malformed { message: String },

    #[error("Page {page} does not exist")]
    PageNotFound { page: usize },

    #[error("Character {ch:?} cannot be encoded in the standard font")]
    UnencodableText { ch: char },
}

/// API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ServiceError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        ServiceError::InvalidRequest {
            message: message.into(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Unauthorized => StatusCode::FORBIDDEN,
            ServiceError::InvalidRequest { .. } | ServiceError::Annotation(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Load(_) | ServiceError::Embed { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServiceError::Fetch(FetchError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::RequestTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
            ServiceError::Fetch(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::Unauthorized => "unauthorized",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Annotation(AnnotationError::PageIndex { .. }) => "page_index",
            ServiceError::Annotation(AnnotationError::Invalid { .. }) => "invalid_annotation",
            ServiceError::Load(_) => "load_error",
            ServiceError::Fetch(FetchError::Timeout { .. }) => "fetch_timeout",
            ServiceError::Fetch(_) => "fetch_error",
            ServiceError::Embed { .. } => "embed_error",
            ServiceError::Draw { .. } => "draw_error",
            ServiceError::Serialize(_) => "serialize_error",
            ServiceError::RequestTimeout { .. } => "request_timeout",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "Request failed");
        } else {
            tracing::warn!(error = %self, code = self.error_code(), "Request rejected");
        }

        let response = ErrorResponse {
            status: "error",
            message: self.to_string(),
            code: Some(self.error_code().to_string()),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
