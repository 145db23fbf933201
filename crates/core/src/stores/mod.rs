pub mod lightrag;
pub mod local;

pub use lightrag::LightRagClient;
pub use local::LocalIndex;

use crate::traits::SemanticIndex;
use crate::{SearchMode, ServiceError};
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    LightRag,
    Local,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::LightRag => "lightrag",
            Backend::Local => "local",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "lightrag" => Ok(Backend::LightRag),
            "local" => Ok(Backend::Local),
            other => Err(format!("unknown backend '{other}'; use lightrag or local")),
        }
    }
}

/// Whichever semantic index the CLI was pointed at.
pub enum AnyIndex {
    LightRag(LightRagClient),
    Local(LocalIndex),
}

impl AnyIndex {
    pub fn open(
        backend: Backend,
        storage_dir: &Path,
        lightrag_url: &str,
    ) -> Result<Self, ServiceError> {
        match backend {
            Backend::LightRag => LightRagClient::from_env(lightrag_url).map(AnyIndex::LightRag),
            Backend::Local => LocalIndex::open(storage_dir).map(AnyIndex::Local),
        }
    }
}

#[async_trait]
impl SemanticIndex for AnyIndex {
    fn missing_credential(&self) -> Option<&'static str> {
        match self {
            AnyIndex::LightRag(index) => index.missing_credential(),
            AnyIndex::Local(index) => index.missing_credential(),
        }
    }

    async fn initialize_storages(&self) -> Result<(), ServiceError> {
        match self {
            AnyIndex::LightRag(index) => index.initialize_storages().await,
            AnyIndex::Local(index) => index.initialize_storages().await,
        }
    }

    async fn finalize_storages(&self) -> Result<(), ServiceError> {
        match self {
            AnyIndex::LightRag(index) => index.finalize_storages().await,
            AnyIndex::Local(index) => index.finalize_storages().await,
        }
    }

    async fn insert(&self, text: &str) -> Result<(), ServiceError> {
        match self {
            AnyIndex::LightRag(index) => index.insert(text).await,
            AnyIndex::Local(index) => index.insert(text).await,
        }
    }

    async fn query(&self, text: &str, mode: SearchMode) -> Result<String, ServiceError> {
        match self {
            AnyIndex::LightRag(index) => index.query(text, mode).await,
            AnyIndex::Local(index) => index.query(text, mode).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_parse() {
        assert_eq!("LightRAG".parse::<Backend>(), Ok(Backend::LightRag));
        assert_eq!("local".parse::<Backend>(), Ok(Backend::Local));
        assert!("qdrant".parse::<Backend>().is_err());
    }

    #[test]
    fn local_backend_needs_no_credential() -> Result<(), ServiceError> {
        let index = AnyIndex::open(Backend::Local, Path::new("store"), lightrag::DEFAULT_ENDPOINT)?;
        assert!(matches!(index, AnyIndex::Local(_)));
        assert_eq!(index.missing_credential(), None);
        Ok(())
    }
}
