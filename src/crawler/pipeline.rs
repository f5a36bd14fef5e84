//! The sequential crawl loop: fetch, extract, build, deduplicate, persist

use std::future::Future;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use super::config::CrawlerConfig;
use super::content_extraction::ContentExtractor;
use super::error::CrawlError;
use super::fetcher::PageFetcher;
use super::pacing::Pacer;
use super::storage::{CrawlReport, Duplicate, RecordStore};
use super::PageTarget;
use crate::knowledge::{KnowledgeRecord, RecordBuilder};

/// Why a page produced no record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    AlreadyCrawled,
    FetchFailed(String),
    ParseFailed(String),
    TooShort(String),
    Duplicate(Duplicate),
}

/// Result of processing one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Accepted,
    Rejected(RejectReason),
}

/// Progress event sent after each target
#[derive(Debug, Clone)]
pub struct CrawlProgress {
    pub index: usize,
    pub total: usize,
    pub title: String,
    pub outcome: PageOutcome,
}

/// Crawls a list of targets for one domain
#[derive(Debug)]
pub struct Crawler<F: PageFetcher> {
    fetcher: F,
    extractor: ContentExtractor,
    builder: RecordBuilder,
    store: RecordStore,
    pacer: Pacer,
    config: CrawlerConfig,
}

impl<F: PageFetcher> Crawler<F> {
    pub fn new(
        fetcher: F,
        extractor: ContentExtractor,
        builder: RecordBuilder,
        store: RecordStore,
        config: CrawlerConfig,
    ) -> Self {
        let pacer = Pacer::new(config.delay(), config.jitter());
        Self {
            fetcher,
            extractor,
            builder,
            store,
            pacer,
            config,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Crawl all targets to completion
    pub async fn run(
        &mut self,
        targets: &[PageTarget],
        progress: Option<mpsc::Sender<CrawlProgress>>,
    ) -> Result<CrawlReport, CrawlError> {
        self.run_until(targets, progress, std::future::pending()).await
    }

    /// Crawl targets until done or until `shutdown` resolves.
    ///
    /// Shutdown cancels the page in flight, whether it is waiting on the pacer
    /// or being fetched, but never a page already being persisted. Whatever
    /// was accepted is flushed before returning.
    #[instrument(skip_all, fields(domain = %self.builder.profile().slug))]
    pub async fn run_until(
        &mut self,
        targets: &[PageTarget],
        progress: Option<mpsc::Sender<CrawlProgress>>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<CrawlReport, CrawlError> {
        let limit = match self.config.max_pages {
            0 => targets.len(),
            n => n.min(targets.len()),
        };
        let targets = &targets[..limit];
        info!("Crawling {} pages", targets.len());

        tokio::pin!(shutdown);
        let mut interrupted = false;

        for (index, target) in targets.iter().enumerate() {
            let span = info_span!("page", index = index + 1, title = %target.title);
            let prepared = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    warn!("Interrupted, saving partial results");
                    interrupted = true;
                    break;
                }
                prepared = self.prepare(target).instrument(span.clone()) => prepared,
            };

            let outcome = self
                .commit(target, prepared, targets.len())
                .instrument(span)
                .await?;

            if let Some(tx) = &progress {
                let _ = tx
                    .send(CrawlProgress {
                        index: index + 1,
                        total: targets.len(),
                        title: target.title.clone(),
                        outcome,
                    })
                    .await;
            }
        }

        let report = self.store.flush(targets.len(), interrupted).await?;
        info!(
            "Crawl finished: {} accepted, {} failed, {} duplicate, {} too short, {} skipped",
            report.stats.success,
            report.stats.failed,
            report.stats.duplicate,
            report.stats.too_short,
            report.stats.skipped
        );
        Ok(report)
    }

    /// Fetch, extract and build without touching the store
    async fn prepare(&self, target: &PageTarget) -> Result<KnowledgeRecord, RejectReason> {
        let url = target
            .resolve(&self.config.base_url)
            .map_err(|e| RejectReason::FetchFailed(e.to_string()))?;
        if self.store.has_crawled(&url) {
            return Err(RejectReason::AlreadyCrawled);
        }

        self.pacer.wait().await;
        let html = self
            .fetcher
            .fetch(&url)
            .await
            .map_err(|e| RejectReason::FetchFailed(e.to_string()))?;

        let extracted = self
            .extractor
            .extract(&html, &target.title)
            .map_err(|e| {
                if e.is_too_short() {
                    RejectReason::TooShort(e.to_string())
                } else {
                    RejectReason::ParseFailed(e.to_string())
                }
            })?;
        debug!(
            "Extracted {} paragraphs from {} raw characters",
            extracted.paragraphs.len(),
            extracted.raw_length
        );

        Ok(self.builder.build(&extracted, target, &url))
    }

    /// Deduplicate and persist a prepared page, updating statistics.
    ///
    /// `total_pages` is the size of the run, recorded in periodic reports.
    async fn commit(
        &mut self,
        target: &PageTarget,
        prepared: Result<KnowledgeRecord, RejectReason>,
        total_pages: usize,
    ) -> Result<PageOutcome, CrawlError> {
        let reason = match prepared {
            Ok(record) => {
                self.store.stats_mut().total_attempted += 1;
                match self.store.check_duplicate(&record) {
                    Some(kind) => RejectReason::Duplicate(kind),
                    None => {
                        info!(
                            "Accepted '{}' ({} characters, importance {})",
                            record.title,
                            record.content_chars(),
                            record.importance_score
                        );
                        self.store.accept(record, &target.category).await?;
                        let accepted = self.store.stats().success;
                        if self.config.flush_every > 0 && accepted % self.config.flush_every == 0 {
                            self.store.flush(total_pages, false).await?;
                        }
                        return Ok(PageOutcome::Accepted);
                    }
                }
            }
            Err(RejectReason::AlreadyCrawled) => RejectReason::AlreadyCrawled,
            Err(reason) => {
                self.store.stats_mut().total_attempted += 1;
                reason
            }
        };

        let url = target
            .resolve(&self.config.base_url)
            .unwrap_or_else(|_| target.url.clone());
        let stats = self.store.stats_mut();
        match &reason {
            RejectReason::AlreadyCrawled => stats.skipped += 1,
            RejectReason::Duplicate(_) => stats.duplicate += 1,
            RejectReason::TooShort(_) => stats.too_short += 1,
            RejectReason::FetchFailed(_) => stats.failed += 1,
            RejectReason::ParseFailed(_) => stats.parse_failed += 1,
        }
        match &reason {
            RejectReason::FetchFailed(error) | RejectReason::ParseFailed(error) => {
                warn!("Failed {}: {}", url, error);
                self.store.record_failure(&url, error).await?;
            }
            RejectReason::TooShort(error) => debug!("Too short {}: {}", url, error),
            RejectReason::Duplicate(kind) => debug!("Duplicate {} ({:?})", url, kind),
            RejectReason::AlreadyCrawled => debug!("Already crawled {}", url),
        }

        Ok(PageOutcome::Rejected(reason))
    }
}
