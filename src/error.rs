//! Error types for the OCR service.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`OcrError`] — **Fatal**: the request cannot be served at all (wrong
//!   content type, undecodable image, unparseable PDF, staging I/O). Returned
//!   as `Err(OcrError)` from the `ocr_*` entry points and turned into an HTTP
//!   error response by the server.
//!
//! * [`EngineError`] — **Non-fatal per page**: the external engine could not
//!   produce Markdown for one page. The batch orchestrator records an
//!   empty-text [`crate::output::PageResult`] for that page and moves on.
//!   On the single-image path there is only one page, so the error is
//!   wrapped into [`OcrError::Engine`] instead.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// All fatal errors returned by the OCR service.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The upload is not what the endpoint accepts (content type, missing field).
    #[error("{reason}")]
    InvalidInput { reason: String },

    /// Image bytes are not in a recognisable format.
    #[error("Cannot decode image: {detail}")]
    Decode { detail: String },

    /// The uploaded PDF cannot be parsed as a paginated document.
    #[error("Malformed PDF document: {detail}")]
    MalformedDocument { detail: String },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// The engine failed on the only page of a single-image request.
    #[error(transparent)]
    Engine(#[from] EngineError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the working area or write a staged document.
    #[error("Failed to stage '{path}': {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrError {
    /// Shorthand for [`OcrError::InvalidInput`].
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        OcrError::InvalidInput {
            reason: reason.into(),
        }
    }

    /// HTTP status code this error maps to.
    ///
    /// Only caller mistakes are 400; decode and malformed-document failures
    /// are folded into the generic 500 like every other pipeline failure.
    pub fn status_code(&self) -> u16 {
        match self {
            OcrError::InvalidInput { .. } => 400,
            _ => 500,
        }
    }
}

/// A failure of the external engine on one page.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The page document could not be written where the engine expects it.
    #[error("Failed to stage page document '{path}': {source}")]
    Stage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine process could not be started.
    #[error("Failed to start engine '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine ran and reported failure.
    #[error("Engine exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    /// The engine finished but left no Markdown artifact behind.
    #[error("Engine produced no Markdown at '{path}'")]
    MissingArtifact { path: PathBuf },

    /// The Markdown artifact exists but could not be read.
    #[error("Failed to read Markdown artifact '{path}': {source}")]
    ReadArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other engine-reported failure (used by in-process engines).
    #[error("Engine error: {0}")]
    Other(String),

    /// The blocking engine task panicked.
    #[error("Engine task panicked: {0}")]
    Panicked(String),
}
