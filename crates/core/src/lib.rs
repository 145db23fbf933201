pub mod chunking;
pub mod config;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod inspector;
pub mod interrupt;
pub mod models;
pub mod progress;
pub mod router;
pub mod session;
pub mod stores;
pub mod traits;

pub use chunking::{chunk_by_paragraph, normalize_whitespace, ChunkingConfig};
pub use config::{
    resolve_mode, resolve_paths, ConfigStore, Configuration, EnvDefaults, ResolvedPaths,
};
pub use error::{
    ConfigError, ExtractError, IndexError, InvalidModeError, PreconditionError, QueryError,
    ServiceError,
};
pub use extractor::{join_pages, LopdfExtractor, PageText, TextExtractor};
pub use ingest::{discover_pdf_files, document_name, plan_index, IndexPlan, Indexer};
pub use inspector::{list_indexed, parse_document_marker, stats, wrap_with_header};
pub use interrupt::Interrupt;
pub use models::{FailedDocument, IndexReport, SearchMode, StorageStats};
pub use progress::ProgressIndicator;
pub use router::QueryRouter;
pub use session::{Session, SessionCommand, SessionSummary};
pub use stores::{AnyIndex, Backend, LightRagClient, LocalIndex};
pub use traits::{with_storages, SemanticIndex};
