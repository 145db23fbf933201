use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("{variable} not set; export it in your environment before running this command")]
    MissingCredential { variable: &'static str },

    #[error("PDF directory not specified")]
    PdfDirNotSet,

    #[error("PDF directory not found: {}", .0.display())]
    MissingPdfDir(PathBuf),

    #[error("no indexed data found at {}", .0.display())]
    MissingStorage(PathBuf),
}

#[derive(Debug, Error)]
#[error("invalid mode '{0}'; use one of: naive, local, global, hybrid")]
pub struct InvalidModeError(pub String);

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("pdf had no readable page text: {}", .0.display())]
    NoText(PathBuf),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("regex error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("service request failed: {0}")]
    Request(String),

    #[error("storages not initialized: {0}")]
    NotReady(String),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("semantic index failed: {0}")]
    Service(#[from] ServiceError),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    InvalidMode(#[from] InvalidModeError),

    #[error("query is empty")]
    EmptyQuery,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("semantic index failed: {0}")]
    Service(#[from] ServiceError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error writing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}
