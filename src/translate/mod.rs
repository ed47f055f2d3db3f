// Subtitle translation through a remote document-translation service
//
// - Languages: display names and service codes
// - DeepL: REST client for usage and document translation
// - Usage: quota gate in front of every paid call
// - Pipeline: subtitle -> text -> remote translation -> subtitle, with temp files

pub mod deepl;
pub mod languages;
pub mod pipeline;
pub mod usage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use deepl::DeeplClient;
pub use languages::*;
pub use pipeline::*;
pub use usage::*;

use crate::error::Result;

/// Identifies a document the service accepted. Kept for manual recovery
/// when a translation fails after the upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHandle {
    pub document_id: String,
    pub document_key: String,
}

/// Character allowance of the account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub used: u64,
    pub limit: u64,
    pub any_limit_reached: bool,
}

impl Quota {
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }
}

/// Remote translation service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranslationApi: Send + Sync {
    async fn usage(&self, api_key: &str) -> Result<Quota>;

    /// Translate the text file `input` as one document and write the result to `output`
    async fn translate_document(
        &self,
        api_key: &str,
        input: &Path,
        output: &Path,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<()>;
}
