use std::time::Duration;

use async_openai::error::OpenAIError;
use thiserror::Error;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

/// Failures of an external capability (embedding, search backend, reranker).
///
/// These never reach callers of the retrieval pipeline; each one selects a
/// degraded behavior for the stage that observed it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// No credential or backend is configured for this provider.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider call failed: {0}")]
    CallFailure(String),
    #[error("malformed provider response: {0}")]
    Malformed(String),
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),
}

impl From<AppError> for ProviderError {
    fn from(err: AppError) -> Self {
        Self::CallFailure(err.to_string())
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::CallFailure(err.to_string())
        }
    }
}

impl From<OpenAIError> for ProviderError {
    fn from(err: OpenAIError) -> Self {
        match err {
            OpenAIError::JSONDeserialize(inner) => Self::Malformed(inner.to_string()),
            other => Self::CallFailure(other.to_string()),
        }
    }
}

/// Runs `future` under `limit`, mapping an elapsed deadline to [`ProviderError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, future: F) -> Result<T, ProviderError>
where
    F: std::future::Future<Output = Result<T, ProviderError>>,
{
    tokio::time::timeout(limit, future)
        .await
        .unwrap_or(Err(ProviderError::Timeout(limit)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn with_timeout_maps_elapsed_deadline() {
        let result: Result<(), ProviderError> = with_timeout(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;

        assert_eq!(result, Err(ProviderError::Timeout(Duration::from_millis(5))));
    }

    #[tokio::test]
    async fn with_timeout_passes_through_inner_result() {
        let result = with_timeout(Duration::from_secs(1), async {
            Err::<(), _>(ProviderError::Unavailable("no key".into()))
        })
        .await;

        assert_eq!(result, Err(ProviderError::Unavailable("no key".into())));
    }
}
