//! Error types for the papersum core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the generative-text provider, persistence and document fetching.

/// Errors from generative-text provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Unsupported provider: {provider}")]
    UnsupportedProvider { provider: String },
}

/// Errors from the persistence collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Record for item {item_id} could not be written: {message}")]
    WriteFailed { item_id: i64, message: String },

    #[error("Store task failed: {message}")]
    Task { message: String },
}

/// Errors from the document text collaborator.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Document fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Document source returned HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("Document at {url} exceeds the {limit_bytes}-byte download limit")]
    TooLarge { url: String, limit_bytes: u64 },

    #[error("Text extraction failed: {message}")]
    Extract { message: String },

    #[error("Document has no extractable text")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_llm() {
        let err = LlmError::ApiRequest {
            message: "connection refused".into(),
        };
        assert_eq!(err.to_string(), "API request failed: connection refused");
    }

    #[test]
    fn test_error_display_store() {
        let err = StoreError::WriteFailed {
            item_id: 42,
            message: "disk full".into(),
        };
        assert_eq!(
            err.to_string(),
            "Record for item 42 could not be written: disk full"
        );
    }

    #[test]
    fn test_error_display_document() {
        let err = DocumentError::Http {
            url: "https://arxiv.org/pdf/1706.03762".into(),
            status: 404,
        };
        assert_eq!(
            err.to_string(),
            "Document source returned HTTP 404 for https://arxiv.org/pdf/1706.03762"
        );
    }

    #[test]
    fn test_llm_error_variants() {
        let err = LlmError::RateLimited {
            retry_after_secs: 60,
        };
        assert_eq!(err.to_string(), "Rate limited by provider, retry after 60s");

        let err = LlmError::Timeout { timeout_secs: 120 };
        assert_eq!(err.to_string(), "Request timed out after 120s");
    }
}
