use crate::{SearchMode, ServiceError};
use async_trait::async_trait;
use std::future::Future;
use tracing::warn;

/// The external embedding/LLM-backed retrieval engine. Everything it persists lives
/// under the storage directory it was opened on.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Name of the environment variable this service needs but was not given.
    fn missing_credential(&self) -> Option<&'static str> {
        None
    }

    async fn initialize_storages(&self) -> Result<(), ServiceError>;

    async fn finalize_storages(&self) -> Result<(), ServiceError>;

    async fn insert(&self, text: &str) -> Result<(), ServiceError>;

    async fn query(&self, text: &str, mode: SearchMode) -> Result<String, ServiceError>;
}

/// Runs `work` between exactly one `initialize_storages` and one `finalize_storages`.
///
/// Finalize runs whether `work` succeeds or fails. When both fail, the error from
/// `work` wins and the finalize error is logged.
pub async fn with_storages<S, F, T, E>(service: &S, work: F) -> Result<T, E>
where
    S: SemanticIndex + ?Sized,
    F: Future<Output = Result<T, E>>,
    E: From<ServiceError>,
{
    service.initialize_storages().await?;

    let outcome = work.await;
    let finalized = service.finalize_storages().await;

    match (outcome, finalized) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(error)) => Err(error.into()),
        (Err(error), Ok(())) => Err(error),
        (Err(error), Err(finalize_error)) => {
            warn!(error = %finalize_error, "finalize failed after an earlier error");
            Err(error)
        }
    }
}
