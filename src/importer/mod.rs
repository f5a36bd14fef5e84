//! # Knowledge Importer
//!
//! Loads persisted knowledge files, normalizes them for one domain and
//! submits them to the RAG backend in batches.
//!
//! ## Key Components
//!
//! - `ImportSettings`: Per-domain import configuration
//! - `Normalizer`: Maps heterogeneous JSON items onto `KnowledgeRecord`
//! - `BatchImporter`: Sequential batched submission with failure accounting
//! - `Verifier`: Presence and isolation checks after an import

mod batch;
mod error;
mod loader;
mod normalize;
mod report;
mod verify;

pub use batch::{BatchImporter, BatchOutcome, ClearScope, ImportResult};
pub use error::ImportError;
pub use loader::{discover_files, load_records_file, parse_records};
pub use normalize::{Normalizer, Section, SectionKind, StructuredSchema, FALLBACK_KNOWLEDGE_TYPE};
pub use report::{render_markdown, write_report, REPORT_FILE};
pub use verify::{find_leaks, CheckResult, CheckStatus, VerificationReport, Verifier};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Import configuration of one domain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// Directory holding the data files, defaults to the crawl output directory
    pub data_dir: Option<PathBuf>,

    /// Explicit file names inside the data directory
    pub files: Vec<String>,

    pub batch_size: usize,
    pub batch_delay_ms: u64,

    /// Queries that must find something after import
    pub presence_queries: Vec<String>,

    /// Queries whose results must all belong to this domain
    pub isolation_probes: Vec<String>,

    pub schemas: Vec<StructuredSchema>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            data_dir: None,
            files: Vec::new(),
            batch_size: 50,
            batch_delay_ms: 500,
            presence_queries: Vec::new(),
            isolation_probes: Vec::new(),
            schemas: Vec::new(),
        }
    }
}
