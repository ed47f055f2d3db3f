// Whisper model acquisition
//
// - Catalogue: known ggml models and the artifacts they are published as
// - Download: transport abstraction and the HTTP implementation
// - Acquisition: staging, commit, CoreML follow-up and extraction

pub mod acquisition;
pub mod download;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use std::path::{Path, PathBuf};

pub use acquisition::*;
pub use download::*;

use crate::error::Result;

/// Remote location all model artifacts are published under
pub const MODEL_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Model the selection falls back to whenever acquisition fails
pub const DEFAULT_MODEL: &str = "medium.en";

#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    pub name: String,
    pub size_bytes: u64,
    pub local_path: PathBuf,
    pub coreml_required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub size_mb: f64,
}

pub const MODEL_CATALOG: [CatalogEntry; 12] = [
    CatalogEntry { name: "tiny", size_mb: 75.0 },
    CatalogEntry { name: "tiny.en", size_mb: 75.0 },
    CatalogEntry { name: "base", size_mb: 142.0 },
    CatalogEntry { name: "base.en", size_mb: 142.0 },
    CatalogEntry { name: "small", size_mb: 466.0 },
    CatalogEntry { name: "small.en", size_mb: 466.0 },
    CatalogEntry { name: "medium", size_mb: 1500.0 },
    CatalogEntry { name: "medium.en", size_mb: 1500.0 },
    CatalogEntry { name: "large-v1", size_mb: 2900.0 },
    CatalogEntry { name: "large-v2", size_mb: 2900.0 },
    CatalogEntry { name: "large-v3", size_mb: 2900.0 },
    CatalogEntry { name: "large", size_mb: 2900.0 },
];

pub fn catalog_entry(name: &str) -> Option<&'static CatalogEntry> {
    MODEL_CATALOG.iter().find(|entry| entry.name == name)
}

/// English audio gets the English-only medium model, everything else `large`
pub fn default_model_for_language(language: &str) -> &'static str {
    if language.eq_ignore_ascii_case("english") || language.eq_ignore_ascii_case("en") {
        DEFAULT_MODEL
    } else {
        "large"
    }
}

/// `<dirname(executable)>/models`
pub fn models_dir_for<P: AsRef<Path>>(executable: P) -> PathBuf {
    executable
        .as_ref()
        .parent()
        .map(|dir| dir.to_path_buf())
        .unwrap_or_default()
        .join("models")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// `ggml-<model>.bin`
    Binary,
    /// `ggml-<model>-encoder.mlmodelc.zip`
    CoreMlEncoder,
}

impl ArtifactKind {
    pub fn filename(&self, model: &str) -> String {
        match self {
            Self::Binary => format!("ggml-{}.bin", model),
            Self::CoreMlEncoder => format!("ggml-{}-encoder.mlmodelc.zip", model),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Binary => "model",
            Self::CoreMlEncoder => "CoreML encoder",
        }
    }
}

/// A remote artifact opened for streaming
pub struct ArtifactStream {
    /// Size announced by the host, if any
    pub total_bytes: Option<u64>,
    pub chunks: BoxStream<'static, Result<Bytes>>,
}

/// Where model artifacts are fetched from
#[async_trait]
pub trait ModelHost: Send + Sync {
    async fn open(&self, url: &str) -> Result<ArtifactStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_filenames() {
        assert_eq!(ArtifactKind::Binary.filename("base.en"), "ggml-base.en.bin");
        assert_eq!(
            ArtifactKind::CoreMlEncoder.filename("large-v3"),
            "ggml-large-v3-encoder.mlmodelc.zip"
        );
    }

    #[test]
    fn test_models_dir_is_next_to_executable() {
        assert_eq!(
            models_dir_for("/opt/whisper.cpp/main"),
            PathBuf::from("/opt/whisper.cpp/models")
        );
    }

    #[test]
    fn test_default_model_for_language() {
        assert_eq!(default_model_for_language("English"), "medium.en");
        assert_eq!(default_model_for_language("German"), "large");
        assert_eq!(default_model_for_language("auto"), "large");
    }
}
