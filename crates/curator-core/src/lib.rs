pub mod config;
pub mod error;
pub mod models;
pub mod storage;

pub use config::{
    AuditConfig, BackupConfig, ContainerConfig, CuratorConfig, NearDuplicateConfig,
    NormalizationConfig, PolicyConfig,
};
pub use error::{ClassificationError, CuratorError, ExitCode, ParseError, Result, WriteError};
pub use models::*;

pub use storage::container::{line_of, load_catalog, parse_catalog};
pub use storage::writer::{
    CatalogDraft, CatalogWriter, DraftItem, PreparedWrite, WriteOutcome, render_catalog,
};
