//! Batched submission of knowledge records to the RAG backend

use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

use super::error::ImportError;
use super::loader::{discover_files, load_records_file};
use super::normalize::Normalizer;
use crate::config::DomainConfig;
use crate::http::{ClearOutcome, RagClient};
use crate::knowledge::{CharacterId, ImportBatch, KnowledgeRecord};

/// What a pre-import clear removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    All,
    Characters(Vec<CharacterId>),
}

impl ClearScope {
    /// Everything when no domains were named, otherwise only the named ones
    pub fn for_selection(named: bool, domains: &[DomainConfig]) -> Self {
        if named {
            Self::Characters(domains.iter().map(|d| d.domain.character_id).collect())
        } else {
            Self::All
        }
    }
}

/// Totals for one sequence of batches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub imported: usize,
    pub failed: usize,
    pub batches: usize,
    pub failed_batches: usize,
    /// Titles of records in accepted batches
    pub imported_titles: Vec<String>,
}

/// Result of importing one domain
#[derive(Debug, Clone)]
pub struct ImportResult {
    pub name: String,
    pub character_id: CharacterId,
    pub total_files: usize,
    pub total_records: usize,
    pub imported: usize,
    pub failed: usize,
    pub elapsed: Duration,
    pub imported_titles: Vec<String>,
}

impl ImportResult {
    /// Imported over total records, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_records == 0 {
            0.0
        } else {
            self.imported as f64 / self.total_records as f64 * 100.0
        }
    }
}

/// Imports records in sequential batches
#[derive(Debug, Clone)]
pub struct BatchImporter {
    client: RagClient,
}

impl BatchImporter {
    pub fn new(client: RagClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RagClient {
        &self.client
    }

    /// Clear backend knowledge for `scope`.
    ///
    /// Returns `Unsupported` if the backend lacks any of the needed endpoints.
    pub async fn clear(&self, scope: &ClearScope) -> crate::Result<ClearOutcome> {
        let ids = match scope {
            ClearScope::All => return self.client.clear().await,
            ClearScope::Characters(ids) => ids,
        };
        let mut outcome = ClearOutcome::Cleared;
        for id in ids {
            match self.client.clear_character(*id).await? {
                ClearOutcome::Cleared => info!("Cleared knowledge of character {}", id),
                ClearOutcome::Unsupported => {
                    warn!("Backend cannot clear character {}", id);
                    outcome = ClearOutcome::Unsupported;
                }
            }
        }
        Ok(outcome)
    }

    /// Post `records` in batches of `batch_size`, pausing `delay` between them.
    ///
    /// A failed batch is logged and counted; the remaining batches still run.
    pub async fn import_records(
        &self,
        character_id: CharacterId,
        records: &[KnowledgeRecord],
        batch_size: usize,
        delay: Duration,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let batch_count = records.len().div_ceil(batch_size.max(1));

        for (index, chunk) in records.chunks(batch_size.max(1)).enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            outcome.batches += 1;

            let batch = ImportBatch::new(character_id, chunk);
            match self.client.import_batch(&batch).await {
                Ok(response) if response.success => {
                    let count = response.imported_count.unwrap_or(chunk.len());
                    outcome.imported += count;
                    outcome
                        .imported_titles
                        .extend(chunk.iter().map(|r| r.title.clone()));
                    info!(
                        "Batch {}/{} imported {} records",
                        index + 1,
                        batch_count,
                        count
                    );
                }
                Ok(response) => {
                    outcome.failed += chunk.len();
                    outcome.failed_batches += 1;
                    error!(
                        "Batch {}/{} rejected: {}",
                        index + 1,
                        batch_count,
                        response.message.as_deref().unwrap_or("no message")
                    );
                }
                Err(e) => {
                    outcome.failed += chunk.len();
                    outcome.failed_batches += 1;
                    error!("Batch {}/{} failed: {}", index + 1, batch_count, e);
                }
            }
        }
        outcome
    }

    /// Discover, load, normalize and import the data of one domain
    #[instrument(skip_all, fields(domain = %domain.domain.slug))]
    pub async fn import_domain(
        &self,
        domain: &DomainConfig,
        data_dir: &Path,
    ) -> Result<ImportResult, ImportError> {
        let started = Instant::now();
        let profile = &domain.domain;
        let settings = &domain.import;

        let files = discover_files(data_dir, &settings.files).await?;
        if files.is_empty() {
            warn!("No data files in {}", data_dir.display());
        }

        let normalizer = Normalizer::new(profile, settings.schemas.clone());
        let mut records = Vec::new();
        for path in &files {
            match load_records_file(path).await {
                Ok(items) => {
                    let before = records.len();
                    records.extend(items.iter().filter_map(|item| normalizer.normalize(item)));
                    info!(
                        "Loaded {} records from {}",
                        records.len() - before,
                        path.display()
                    );
                }
                Err(e) => error!("Skipping {}: {}", path.display(), e),
            }
        }

        let outcome = self
            .import_records(
                profile.character_id,
                &records,
                settings.batch_size,
                Duration::from_millis(settings.batch_delay_ms),
            )
            .await;

        let result = ImportResult {
            name: profile.name.clone(),
            character_id: profile.character_id,
            total_files: files.len(),
            total_records: records.len(),
            imported: outcome.imported,
            failed: outcome.failed,
            elapsed: started.elapsed(),
            imported_titles: outcome.imported_titles,
        };
        info!(
            "Imported {}/{} records for {} ({:.1}%)",
            result.imported,
            result.total_records,
            result.name,
            result.success_rate()
        );
        Ok(result)
    }
}
