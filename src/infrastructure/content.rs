//! # HTTP Content Provider
//!
//! Resolves media references that are plain URLs. A `HEAD` request confirms the
//! resource exists and supplies its MIME type; nothing is downloaded.

use async_trait::async_trait;

use crate::domain::errors::ContentError;
use crate::domain::traits::ContentProvider;
use crate::domain::types::{ContentPayload, MediaKind};
use crate::infrastructure::llm::providers::http_client;

#[derive(Default)]
pub struct HttpContentProvider;

impl HttpContentProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContentProvider for HttpContentProvider {
    async fn fetch(&self, kind: MediaKind, query: &str) -> Result<ContentPayload, ContentError> {
        let url = reqwest::Url::parse(query).map_err(|e| ContentError(format!("{query}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ContentError(format!("{query}: unsupported scheme")));
        }

        let response = http_client()
            .head(url.clone())
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| ContentError(format!("{query}: {e}")))?;
        if !response.status().is_success() {
            return Err(ContentError(format!("{query}: HTTP {}", response.status())));
        }

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

        Ok(ContentPayload {
            kind,
            url: url.to_string(),
            mime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_url_references_are_rejected_without_a_request() {
        let provider = HttpContentProvider::new();
        assert!(provider.fetch(MediaKind::Image, "menu.png").await.is_err());
        assert!(
            provider
                .fetch(MediaKind::Document, "file:///etc/passwd")
                .await
                .is_err()
        );
    }
}
