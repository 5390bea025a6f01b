use crate::client::providers::ProviderError;
use crate::client::HttpClientConfig;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// One creator as reported by the translation server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Creator {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Single-field name, used for organizations
    pub name: Option<String>,
    pub creator_type: Option<String>,
}

impl Creator {
    /// `First Last`, or the single-field name
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        if parts.is_empty() {
            self.name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
        } else {
            Some(parts.join(" "))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub tag: String,
}

/// Bibliographic metadata returned by the translation server's `/web` endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranslatedItem {
    pub item_type: Option<String>,
    pub title: Option<String>,
    pub creators: Vec<Creator>,
    pub abstract_note: Option<String>,
    pub publication_title: Option<String>,
    pub proceedings_title: Option<String>,
    pub book_title: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,
    pub date: Option<String>,
    #[serde(rename = "DOI")]
    pub doi: Option<String>,
    pub url: Option<String>,
    pub library_catalog: Option<String>,
    pub tags: Vec<Tag>,
}

/// Client for a Zotero translation server
#[derive(Debug, Clone)]
pub struct TranslationClient {
    client: Client,
    endpoint: String,
}

impl TranslationClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let http = HttpClientConfig {
            timeout,
            ..HttpClientConfig::default()
        };
        Ok(Self {
            client: http.build_client()?,
            endpoint: endpoint.into(),
        })
    }

    /// Translate one landing-page URL
    ///
    /// Returns `Ok(None)` when the server has no translator for the page or
    /// returns an empty item list.
    pub async fn translate(&self, url: &str) -> Result<Option<TranslatedItem>, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(url.to_string())
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("translation server", &e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            warn!("No translator found for URL: {}", url);
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("translation server", status, &body));
        }

        let items: Vec<TranslatedItem> = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("translation server response: {e}")))?;

        if items.is_empty() {
            warn!("Translation server returned no metadata for URL: {}", url);
        } else {
            debug!("Translation server returned {} item(s) for {}", items.len(), url);
        }
        Ok(items.into_iter().next())
    }
}
