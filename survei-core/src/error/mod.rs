use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

/// The message returned to callers when the feedback listing cannot be fetched.
/// The underlying store error is logged, not returned.
pub const LISTING_FAILURE_MESSAGE: &str = "Failed to fetch data";

/// The `error` field used for unexpected server-side failures.
/// The raw failure text is returned alongside it in `message`.
pub const INTERNAL_FAILURE_MESSAGE: &str = "Internal server error";

#[derive(Clone, Debug, Error)]
#[cfg_attr(test, derive(PartialEq))]
#[error(transparent)]
// The inner details are private so that every error goes through `Error::new` and gets logged.
pub struct Error(Arc<ErrorDetails>);

impl Error {
    pub fn new(details: ErrorDetails) -> Self {
        details.log();
        Error(Arc::new(details))
    }

    pub fn status_code(&self) -> StatusCode {
        self.0.status_code()
    }

    pub fn get_details(&self) -> &ErrorDetails {
        &self.0
    }

    pub fn log(&self) {
        self.0.log();
    }
}

impl From<ErrorDetails> for Error {
    fn from(details: ErrorDetails) -> Self {
        Error::new(details)
    }
}

#[derive(Debug, Error)]
#[cfg_attr(test, derive(PartialEq))]
pub enum ErrorDetails {
    #[error("Error initializing AppState: {message}")]
    AppState { message: String },
    #[error("{message}")]
    Config { message: String },
    #[error("Failed to fetch feedback listing: {message}")]
    FeedbackListing { message: String },
    #[error("{message}")]
    InternalError { message: String },
    #[error("Missing required field `{field}`")]
    MissingFeedbackField { field: String },
    #[error("Invalid value for field `{field}`: {message}")]
    InvalidFeedbackField { field: String, message: String },
    #[error("Unknown form field `{field}`")]
    UnknownFeedbackField { field: String },
    #[error("Malformed multipart form: {message}")]
    Multipart { message: String },
    #[error("Error in observability setup: {message}")]
    Observability { message: String },
    #[error("Request body too large: {message}")]
    PayloadTooLarge { message: String },
    #[error("Photo is {size} bytes, the maximum is {max_size} bytes")]
    PhotoTooLarge { size: u64, max_size: u64 },
    #[error("Photo storage is disabled, so photos cannot be submitted")]
    PhotoStorageDisabled,
    #[error("Failed to upload photo `{key}`: {message}")]
    PhotoUpload { key: String, message: String },
    #[error("Route not found: {method} {path}")]
    RouteNotFound { path: String, method: String },
    #[error("Error serializing or deserializing JSON: {message}")]
    Serialization { message: String },
    #[error("Error connecting to the feedback store: {message}")]
    StoreConnection { message: String },
    #[error("Failed to insert feedback: {message}")]
    StoreInsert { message: String },
    #[error("Feedback store query failed: {message}")]
    StoreQuery { message: String },
    #[error("Unsupported photo type `{content_type}`, use JPG or PNG")]
    UnsupportedPhotoType { content_type: String },
}

impl ErrorDetails {
    /// Defines the error level for logging this error
    fn level(&self) -> tracing::Level {
        match self {
            ErrorDetails::AppState { .. } => tracing::Level::ERROR,
            ErrorDetails::Config { .. } => tracing::Level::ERROR,
            ErrorDetails::FeedbackListing { .. } => tracing::Level::ERROR,
            ErrorDetails::InternalError { .. } => tracing::Level::ERROR,
            ErrorDetails::MissingFeedbackField { .. } => tracing::Level::WARN,
            ErrorDetails::InvalidFeedbackField { .. } => tracing::Level::WARN,
            ErrorDetails::UnknownFeedbackField { .. } => tracing::Level::WARN,
            ErrorDetails::Multipart { .. } => tracing::Level::WARN,
            ErrorDetails::Observability { .. } => tracing::Level::ERROR,
            ErrorDetails::PayloadTooLarge { .. } => tracing::Level::WARN,
            ErrorDetails::PhotoTooLarge { .. } => tracing::Level::WARN,
            ErrorDetails::PhotoStorageDisabled => tracing::Level::WARN,
            ErrorDetails::PhotoUpload { .. } => tracing::Level::ERROR,
            ErrorDetails::RouteNotFound { .. } => tracing::Level::WARN,
            ErrorDetails::Serialization { .. } => tracing::Level::ERROR,
            ErrorDetails::StoreConnection { .. } => tracing::Level::ERROR,
            ErrorDetails::StoreInsert { .. } => tracing::Level::ERROR,
            ErrorDetails::StoreQuery { .. } => tracing::Level::ERROR,
            ErrorDetails::UnsupportedPhotoType { .. } => tracing::Level::WARN,
        }
    }

    /// Defines the HTTP status code for responses involving this error
    fn status_code(&self) -> StatusCode {
        match self {
            ErrorDetails::AppState { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::FeedbackListing { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::MissingFeedbackField { .. } => StatusCode::BAD_REQUEST,
            ErrorDetails::InvalidFeedbackField { .. } => StatusCode::BAD_REQUEST,
            ErrorDetails::UnknownFeedbackField { .. } => StatusCode::BAD_REQUEST,
            ErrorDetails::Multipart { .. } => StatusCode::BAD_REQUEST,
            ErrorDetails::Observability { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorDetails::PhotoTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorDetails::PhotoStorageDisabled => StatusCode::BAD_REQUEST,
            ErrorDetails::PhotoUpload { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            ErrorDetails::Serialization { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::StoreConnection { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::StoreInsert { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::StoreQuery { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetails::UnsupportedPhotoType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        }
    }

    pub fn log_at_level(&self, prefix: &str, level: tracing::Level) {
        match level {
            tracing::Level::ERROR => tracing::error!("{prefix}{self}"),
            tracing::Level::WARN => tracing::warn!("{prefix}{self}"),
            tracing::Level::INFO => tracing::info!("{prefix}{self}"),
            tracing::Level::DEBUG => tracing::debug!("{prefix}{self}"),
            tracing::Level::TRACE => tracing::trace!("{prefix}{self}"),
        }
    }

    /// Log the error using the `tracing` library
    pub fn log(&self) {
        self.log_at_level("", self.level());
    }
}

impl IntoResponse for Error {
    /// Convert the error into an Axum response.
    ///
    /// Listing failures hide the store error behind a fixed message. Other server-side
    /// failures expose the raw failure text in `message`. Client errors carry their
    /// message in `error`.
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let body = match self.get_details() {
            ErrorDetails::FeedbackListing { .. } => json!({
                "success": false,
                "error": LISTING_FAILURE_MESSAGE,
            }),
            _ if status_code.is_server_error() => json!({
                "success": false,
                "error": INTERNAL_FAILURE_MESSAGE,
                "message": self.to_string(),
            }),
            _ => json!({
                "success": false,
                "error": self.to_string(),
            }),
        };
        (status_code, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorDetails::Serialization {
            message: err.to_string(),
        })
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::new(ErrorDetails::StoreConnection {
            message: err.to_string(),
        })
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::new(ErrorDetails::StoreQuery {
            message: err.to_string(),
        })
    }
}
