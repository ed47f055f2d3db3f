use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ArtifactStream, ModelHost};
use crate::error::{Result, TtError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Pending,
    Active,
    Completed,
    Failed,
}

/// One transfer of one artifact. Data lands in `<destination>.download`
/// and is only renamed to the destination once the transfer is complete.
#[derive(Debug, Clone)]
pub struct DownloadSession {
    pub url: String,
    pub destination: PathBuf,
    pub total_bytes: Option<u64>,
    pub bytes_so_far: u64,
    pub state: DownloadState,
}

impl DownloadSession {
    pub fn new<S: Into<String>>(url: S, destination: PathBuf) -> Self {
        Self {
            url: url.into(),
            destination,
            total_bytes: None,
            bytes_so_far: 0,
            state: DownloadState::Pending,
        }
    }

    pub fn staging_path(&self) -> PathBuf {
        staging_path_for(&self.destination)
    }

    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(total) if total > 0 => Some((self.bytes_so_far as f64 / total as f64).min(1.0)),
            _ => None,
        }
    }

    /// Bytes received must match the announced size, when there is one
    pub fn verify_length(&self) -> Result<()> {
        match self.total_bytes {
            Some(total) if total != self.bytes_so_far => Err(TtError::Download(format!(
                "Incomplete transfer of {}: received {} of {} bytes",
                self.url, self.bytes_so_far, total
            ))),
            _ => Ok(()),
        }
    }
}

pub fn staging_path_for(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(".download");
    PathBuf::from(name)
}

/// Plain HTTPS GET against the model host
pub struct HttpModelHost {
    client: Client,
}

impl HttpModelHost {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tt-tool/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TtError::Http)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ModelHost for HttpModelHost {
    async fn open(&self, url: &str) -> Result<ArtifactStream> {
        debug!("Sending GET request to: {}", url);
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(TtError::Download(format!(
                "Failed to download {}: HTTP {}",
                url,
                response.status()
            )));
        }

        let total_bytes = response.content_length();
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TtError::Http))
            .boxed();

        Ok(ArtifactStream { total_bytes, chunks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_path_appends_suffix() {
        assert_eq!(
            staging_path_for(Path::new("/models/ggml-base.bin")),
            PathBuf::from("/models/ggml-base.bin.download")
        );
    }

    #[test]
    fn test_session_fraction_and_length_check() {
        let mut session = DownloadSession::new("https://host/ggml-tiny.bin", PathBuf::from("/m/ggml-tiny.bin"));
        assert_eq!(session.fraction(), None);
        assert!(session.verify_length().is_ok());

        session.total_bytes = Some(200);
        session.bytes_so_far = 50;
        assert_eq!(session.fraction(), Some(0.25));
        assert!(session.verify_length().is_err());

        session.bytes_so_far = 200;
        assert!(session.verify_length().is_ok());
    }
}
