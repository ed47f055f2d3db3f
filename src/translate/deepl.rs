use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::{DocumentHandle, Quota, TranslationApi};
use crate::error::{Result, TtError};

const PRO_ENDPOINT: &str = "https://api.deepl.com";
const FREE_ENDPOINT: &str = "https://api-free.deepl.com";

const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct UsageResponse {
    #[serde(default)]
    character_count: u64,
    #[serde(default)]
    character_limit: u64,
    document_count: Option<u64>,
    document_limit: Option<u64>,
}

impl From<UsageResponse> for Quota {
    fn from(usage: UsageResponse) -> Self {
        let characters_reached =
            usage.character_limit > 0 && usage.character_count >= usage.character_limit;
        let documents_reached = match (usage.document_count, usage.document_limit) {
            (Some(count), Some(limit)) => limit > 0 && count >= limit,
            _ => false,
        };
        Quota {
            used: usage.character_count,
            limit: usage.character_limit,
            any_limit_reached: characters_reached || documents_reached,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DocumentStatus {
    status: String,
    seconds_remaining: Option<u64>,
    error_message: Option<String>,
}

/// Client for the DeepL v2 REST API
pub struct DeeplClient {
    client: Client,
    endpoint: Option<String>,
}

impl DeeplClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tt-tool/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TtError::Http)?;

        Ok(Self {
            client,
            endpoint: None,
        })
    }

    /// Use a fixed endpoint instead of choosing one from the key
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    fn endpoint(&self, api_key: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => endpoint_for_key(api_key).to_string(),
        }
    }

    fn authorized(&self, request: RequestBuilder, api_key: &str) -> RequestBuilder {
        request.header("Authorization", format!("DeepL-Auth-Key {}", api_key))
    }

    async fn upload(
        &self,
        api_key: &str,
        input: &Path,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<DocumentHandle> {
        let content = tokio::fs::read(input).await?;
        let file_name = input
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "document.txt".to_string());

        let part = Part::bytes(content)
            .file_name(file_name)
            .mime_str("text/plain")
            .map_err(TtError::Http)?;
        let form = Form::new()
            .text("source_lang", source_lang.to_uppercase())
            .text("target_lang", target_lang.to_uppercase())
            .part("file", part);

        let url = format!("{}/v2/document", self.endpoint(api_key));
        debug!("Uploading {} to {}", input.display(), url);

        let response = self
            .authorized(self.client.post(&url), api_key)
            .multipart(form)
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(response.json::<DocumentHandle>().await?)
    }

    async fn status(&self, api_key: &str, handle: &DocumentHandle) -> Result<DocumentStatus> {
        let url = format!("{}/v2/document/{}", self.endpoint(api_key), handle.document_id);
        let response = self
            .authorized(self.client.post(&url), api_key)
            .form(&[("document_key", handle.document_key.as_str())])
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(response.json::<DocumentStatus>().await?)
    }

    async fn download(&self, api_key: &str, handle: &DocumentHandle, output: &Path) -> Result<()> {
        let url = format!(
            "{}/v2/document/{}/result",
            self.endpoint(api_key),
            handle.document_id
        );
        let response = self
            .authorized(self.client.post(&url), api_key)
            .form(&[("document_key", handle.document_key.as_str())])
            .send()
            .await?;
        let response = check_status(response).await?;

        let bytes = response.bytes().await?;
        tokio::fs::write(output, &bytes).await?;
        Ok(())
    }

    /// Poll until the service reports the document done
    async fn wait_until_done(&self, api_key: &str, handle: &DocumentHandle) -> Result<()> {
        loop {
            let status = self.status(api_key, handle).await?;
            debug!("Document {} status: {}", handle.document_id, status.status);

            match status.status.as_str() {
                "done" => return Ok(()),
                "error" => {
                    return Err(TtError::Translation(
                        status
                            .error_message
                            .unwrap_or_else(|| "Document translation failed".to_string()),
                    ));
                }
                _ => {
                    let wait = status
                        .seconds_remaining
                        .map(Duration::from_secs)
                        .unwrap_or(MIN_POLL_INTERVAL)
                        .clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

/// Free-plan keys end in `:fx` and live on a separate host
pub fn endpoint_for_key(api_key: &str) -> &'static str {
    if api_key.trim().ends_with(":fx") {
        FREE_ENDPOINT
    } else {
        PRO_ENDPOINT
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let reason = match status.as_u16() {
        403 => "authorization failed, check the API key".to_string(),
        456 => "quota exceeded".to_string(),
        429 => "too many requests".to_string(),
        _ => body,
    };
    Err(TtError::Translation(format!("DeepL API error {}: {}", status, reason)))
}

#[async_trait]
impl TranslationApi for DeeplClient {
    async fn usage(&self, api_key: &str) -> Result<Quota> {
        let url = format!("{}/v2/usage", self.endpoint(api_key));
        debug!("Sending usage request to: {}", url);

        let response = self
            .authorized(self.client.get(&url), api_key)
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(response.json::<UsageResponse>().await?.into())
    }

    async fn translate_document(
        &self,
        api_key: &str,
        input: &Path,
        output: &Path,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<()> {
        let handle = self
            .upload(api_key, input, source_lang, target_lang)
            .await
            .map_err(|e| TtError::DocumentTranslation {
                message: e.to_string(),
                handle: None,
            })?;
        info!("Document {} uploaded", handle.document_id);

        // From here on the document exists remotely; failures carry its handle
        let result = match self.wait_until_done(api_key, &handle).await {
            Ok(()) => self.download(api_key, &handle, output).await,
            Err(e) => Err(e),
        };

        result.map_err(|e| TtError::DocumentTranslation {
            message: e.to_string(),
            handle: Some(handle),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_selection() {
        assert_eq!(endpoint_for_key("abc-123:fx"), FREE_ENDPOINT);
        assert_eq!(endpoint_for_key("abc-123"), PRO_ENDPOINT);

        let client = DeeplClient::new().unwrap().with_endpoint("http://localhost:8080/");
        assert_eq!(client.endpoint("abc:fx"), "http://localhost:8080");
    }

    #[test]
    fn test_usage_response_to_quota() {
        let usage: UsageResponse =
            serde_json::from_str(r#"{"character_count": 180118, "character_limit": 500000}"#).unwrap();
        let quota = Quota::from(usage);
        assert_eq!(quota.used, 180118);
        assert_eq!(quota.remaining(), 319882);
        assert!(!quota.any_limit_reached);

        let full: UsageResponse =
            serde_json::from_str(r#"{"character_count": 500000, "character_limit": 500000}"#).unwrap();
        assert!(Quota::from(full).any_limit_reached);

        let documents: UsageResponse = serde_json::from_str(
            r#"{"character_count": 10, "character_limit": 500000, "document_count": 5, "document_limit": 5}"#,
        )
        .unwrap();
        assert!(Quota::from(documents).any_limit_reached);
    }

    #[test]
    fn test_document_responses() {
        let handle: DocumentHandle =
            serde_json::from_str(r#"{"document_id": "04DE5AD98A02647D83285A36021911C6", "document_key": "0CB0054F1C132C1625B392EADDA41CB754A742822F6877173029A6C487E7F60A"}"#)
                .unwrap();
        assert_eq!(handle.document_id, "04DE5AD98A02647D83285A36021911C6");

        let status: DocumentStatus =
            serde_json::from_str(r#"{"document_id": "x", "status": "translating", "seconds_remaining": 20}"#)
                .unwrap();
        assert_eq!(status.status, "translating");
        assert_eq!(status.seconds_remaining, Some(20));
        assert!(status.error_message.is_none());
    }
}
