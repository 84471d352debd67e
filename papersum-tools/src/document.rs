//! PDF excerpt source.
//!
//! Downloads a paper's PDF and extracts a bounded plain-text excerpt with
//! `pdf-extract`. Extraction runs on the blocking pool; a panic inside the
//! extractor surfaces as an extraction error.

use async_trait::async_trait;
use papersum_core::config::DocumentConfig;
use papersum_core::error::DocumentError;
use papersum_core::ports::DocumentSource;
use papersum_core::synthesizer::truncate_chars;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("papersum/", env!("CARGO_PKG_VERSION"));

pub struct PdfTextSource {
    client: Client,
    max_chars: usize,
    max_bytes: u64,
}

impl PdfTextSource {
    pub fn new(config: &DocumentConfig) -> Result<Self, DocumentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DocumentError::Fetch {
                url: String::new(),
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            max_chars: config.max_chars,
            max_bytes: config.max_bytes,
        })
    }

    /// Fetch the document body, refusing anything over `max_bytes` whether or
    /// not the server declares a length.
    async fn download(&self, url: &str) -> Result<Vec<u8>, DocumentError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DocumentError::Fetch {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DocumentError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let too_large = || DocumentError::TooLarge {
            url: url.to_string(),
            limit_bytes: self.max_bytes,
        };
        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| DocumentError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        })? {
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl DocumentSource for PdfTextSource {
    async fn excerpt(&self, url: &str) -> Result<String, DocumentError> {
        let bytes = self.download(url).await?;
        debug!(url, bytes = bytes.len(), "Downloaded document");
        let text = extract_text(bytes).await?;
        let excerpt = excerpt_from(&text, self.max_chars);
        if excerpt.is_empty() {
            return Err(DocumentError::Empty);
        }
        Ok(excerpt)
    }
}

/// Extract raw text from PDF bytes on the blocking pool.
pub async fn extract_text(bytes: Vec<u8>) -> Result<String, DocumentError> {
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| DocumentError::Extract {
            message: if e.is_panic() {
                "PDF extractor panicked".to_string()
            } else {
                e.to_string()
            },
        })?
        .map_err(|e| DocumentError::Extract {
            message: e.to_string(),
        })
}

/// Collapse whitespace runs to single spaces and keep at most `max_chars`.
pub fn excerpt_from(text: &str, max_chars: usize) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&normalized, max_chars).trim_end().to_string()
}
