//! Error types for apinbox
//!
//! All errors in the application are converted to `AppError`.
//! The inbox boundary maps each variant to a status code and a
//! plain-text body; internal failures are logged and not echoed
//! to the remote caller unless explicitly configured.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// No `Signature` (or `Authorization: Signature`) header (401)
    #[error("Missing signature header")]
    MissingSignature,

    /// Signature header or signed headers could not be read (401)
    #[error("Malformed signature: {0}")]
    SignatureParse(String),

    /// Signature does not verify, or algorithm is unsupported (401)
    #[error("Invalid signature: {0}")]
    SignatureInvalid(String),

    /// `date` or `(expires)` outside the accepted window (401)
    #[error("Signature expired: {0}")]
    SignatureExpired(String),

    /// Signed `digest` header does not match the body (401)
    #[error("Digest mismatch")]
    DigestMismatch,

    /// Stored key material is not a PEM `PUBLIC KEY` block (401)
    #[error("Invalid key format: {0}")]
    KeyFormat(String),

    /// PEM block could not be parsed as an RSA public key (401)
    #[error("Invalid public key: {0}")]
    KeyParse(String),

    /// Request authentication failed (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed request body (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Acting actor could not be resolved (500)
    #[error("Actor resolution failed: {0}")]
    Resolution(String),

    /// Remote actor fetch failed (500)
    #[error("Federation error: {0}")]
    Federation(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Activity persistence failed outside of the database driver (500)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// HTTP status this error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingSignature
            | AppError::SignatureParse(_)
            | AppError::SignatureInvalid(_)
            | AppError::SignatureExpired(_)
            | AppError::DigestMismatch
            | AppError::KeyFormat(_)
            | AppError::KeyParse(_)
            | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Resolution(_)
            | AppError::Federation(_)
            | AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for the error metric.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::MissingSignature => "missing_signature",
            AppError::SignatureParse(_) => "signature_parse",
            AppError::SignatureInvalid(_) => "signature_invalid",
            AppError::SignatureExpired(_) => "signature_expired",
            AppError::DigestMismatch => "digest_mismatch",
            AppError::KeyFormat(_) => "key_format",
            AppError::KeyParse(_) => "key_parse",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::BadRequest(_) => "bad_request",
            AppError::Resolution(_) => "resolution",
            AppError::Federation(_) => "federation",
            AppError::Database(_) => "database",
            AppError::Storage(_) => "storage",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }

    /// Body text sent to the remote caller.
    ///
    /// Client errors describe the caller's own request and are returned as-is.
    /// Server errors are replaced with an opaque message unless
    /// `expose_internal` is set.
    pub fn public_message(&self, expose_internal: bool) -> String {
        if self.status_code().is_server_error() && !expose_internal {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }

    /// Build the plain-text HTTP response for this error.
    pub fn into_response_with(self, expose_internal: bool) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[self.error_type()]).inc();

        (status, self.public_message(expose_internal)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.into_response_with(false)
    }
}
