//! Error types for the docx2pdf library.
//!
//! A single fatal type, [`ConvertError`], covers every way a conversion
//! request can terminate early. Two views of each error exist:
//!
//! * `Display` — the **internal diagnostic**: verbose, may name paths and
//!   engine output. Logged, never sent to the caller.
//!
//! * [`ConvertError::public_message`] — the **caller-visible** text: generic,
//!   never contains a filesystem path.
//!
//! Validation failures ([`ConvertError::is_client_error`]) map to HTTP 400
//! and happen before any artifact exists; everything else maps to 500.

use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docx2pdf library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Validation (client faults) ────────────────────────────────────────
    /// The filename's extension is not in the policy allow-list.
    #[error("Unsupported file type '{extension}'")]
    UnsupportedType { extension: String },

    /// The upload is larger than the policy maximum. `size` is the number
    /// of bytes seen, a lower bound when the transport cut the body short.
    #[error("Upload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: u64, max: u64 },

    /// No `file` field, no filename, or a zero-byte payload.
    #[error("No file uploaded")]
    MissingFile,

    /// The multipart body itself could not be parsed.
    #[error("Malformed upload: {detail}")]
    MalformedUpload { detail: String },

    // ── Storage ───────────────────────────────────────────────────────────
    /// Writing or preparing a temporary artifact failed (disk full, permission).
    #[error("Storage error at '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Conversion ────────────────────────────────────────────────────────
    /// The backend did not finish within the configured timeout.
    #[error("Conversion timed out after {secs}s")]
    ConversionTimeout { secs: u64 },

    /// Structural extraction found no text to render.
    #[error("Document has no extractable content")]
    EmptyContent,

    /// The backend reported success but the output is absent or zero bytes.
    #[error("Conversion produced no output")]
    OutputMissing,

    /// The backend failed; `detail` carries its diagnostic.
    #[error("Conversion failed: {detail}")]
    Conversion { detail: String },

    // ── Delivery ──────────────────────────────────────────────────────────
    /// The converted file could not be handed to the transport.
    #[error("Delivery failed: {detail}")]
    Delivery { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a panicked blocking task).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Field-less discriminant of [`ConvertError`].
///
/// Stored in [`crate::request::Stage::Failed`] so a request's terminal
/// state stays `Copy` and comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedType,
    PayloadTooLarge,
    MissingFile,
    MalformedUpload,
    StorageError,
    ConversionTimeout,
    EmptyContent,
    OutputMissing,
    ConversionError,
    DeliveryError,
    /// The request was dropped before finishing (client went away).
    Cancelled,
    InvalidConfig,
    Internal,
}

impl ConvertError {
    /// Shorthand for a backend failure with a message.
    pub fn conversion(detail: impl Into<String>) -> Self {
        ConvertError::Conversion {
            detail: detail.into(),
        }
    }

    /// Wrap an I/O error against `path` as a storage failure.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Storage {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::UnsupportedType { .. } => ErrorKind::UnsupportedType,
            ConvertError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            ConvertError::MissingFile => ErrorKind::MissingFile,
            ConvertError::MalformedUpload { .. } => ErrorKind::MalformedUpload,
            ConvertError::Storage { .. } => ErrorKind::StorageError,
            ConvertError::ConversionTimeout { .. } => ErrorKind::ConversionTimeout,
            ConvertError::EmptyContent => ErrorKind::EmptyContent,
            ConvertError::OutputMissing => ErrorKind::OutputMissing,
            ConvertError::Conversion { .. } => ErrorKind::ConversionError,
            ConvertError::Delivery { .. } => ErrorKind::DeliveryError,
            ConvertError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            ConvertError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// `true` for faults in the request itself (HTTP 400).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ConvertError::UnsupportedType { .. }
                | ConvertError::PayloadTooLarge { .. }
                | ConvertError::MissingFile
                | ConvertError::MalformedUpload { .. }
        )
    }

    pub fn status_code(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// Caller-safe message. Never includes paths or engine output.
    pub fn public_message(&self) -> String {
        match self {
            ConvertError::UnsupportedType { .. } => {
                "Unsupported file type. Please upload a Word document (.doc or .docx)".to_string()
            }
            ConvertError::PayloadTooLarge { max, .. } => {
                format!("File too large. Maximum upload size is {max} bytes")
            }
            ConvertError::MissingFile => "No file uploaded".to_string(),
            ConvertError::MalformedUpload { .. } => "Failed to read upload".to_string(),
            ConvertError::ConversionTimeout { .. } => "Conversion timed out".to_string(),
            ConvertError::EmptyContent => "Document has no content to convert".to_string(),
            ConvertError::Storage { .. }
            | ConvertError::OutputMissing
            | ConvertError::Conversion { .. } => "Error converting file".to_string(),
            ConvertError::Delivery { .. }
            | ConvertError::InvalidConfig(_)
            | ConvertError::Internal(_) => "Internal server error".to_string(),
        }
    }
}
