use std::path::PathBuf;

use thiserror::Error;

use crate::translate::DocumentHandle;

#[derive(Error, Debug)]
pub enum TtError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Transcriber error: {0}")]
    Transcriber(String),

    #[error("A transcription is already running")]
    TranscriptionBusy,

    #[error("Subtitle error: {0}")]
    Subtitle(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Document translation error: {message}")]
    DocumentTranslation {
        message: String,
        handle: Option<DocumentHandle>,
    },

    #[error("Usage information unavailable")]
    QuotaUnavailable,

    #[error("Quota left for {remaining} characters, needed {needed}")]
    QuotaExceeded { remaining: u64, needed: u64 },

    #[error("Translation already exists: {}", .0.display())]
    OutputExists(PathBuf),
}

pub type Result<T> = std::result::Result<T, TtError>;
