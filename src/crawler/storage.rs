//! Deduplication and persistence of accepted knowledge records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::config::OutputFormat;
use super::error::StorageError;
use crate::knowledge::{CharacterId, DomainProfile, KnowledgeRecord};

type Result<T> = std::result::Result<T, StorageError>;

/// Characters of content compared for near-duplicate detection
const PREFIX_CHARS: usize = 100;

/// Longest file stem written for a record
const MAX_FILENAME_CHARS: usize = 50;

pub const REPORT_FILE: &str = "crawl_report.json";
pub const FAILURE_FILE: &str = "failed.txt";

/// Why a record was considered a duplicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Duplicate {
    Title,
    ContentPrefix,
}

/// Per-outcome counters for one crawl run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    pub total_attempted: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duplicate: usize,
    pub too_short: usize,
    pub parse_failed: usize,
}

/// Summary line for an accepted page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSummary {
    pub title: String,
    pub url: String,
    pub category: String,
    pub knowledge_type: String,
    pub content_length: usize,
    pub importance: u8,
}

/// Contents of `crawl_report.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlReport {
    pub timestamp: DateTime<Utc>,
    pub character: String,
    pub character_id: CharacterId,
    pub total_pages: usize,
    #[serde(flatten)]
    pub stats: CrawlStats,
    /// Accepted over attempted, as a percentage
    pub success_rate: f64,
    pub total_content_length: usize,
    pub avg_content_length: usize,
    /// Accepted pages per category
    pub categories: BTreeMap<String, usize>,
    pub interrupted: bool,
    pub pages: Vec<PageSummary>,
}

/// Deduplicating sink for accepted records
#[derive(Debug)]
pub struct RecordStore {
    output_dir: PathBuf,
    slug: String,
    character: String,
    character_id: CharacterId,
    format: OutputFormat,
    seen_urls: HashSet<String>,
    seen_titles: HashSet<String>,
    seen_prefixes: HashSet<String>,
    records: Vec<KnowledgeRecord>,
    pages: Vec<PageSummary>,
    stats: CrawlStats,
}

impl RecordStore {
    /// Prepare `output_dir` for a new run.
    ///
    /// In JSON-Lines mode the previous line file and failure log are removed.
    pub async fn open(
        output_dir: impl Into<PathBuf>,
        profile: &DomainProfile,
        format: OutputFormat,
    ) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).await?;

        let store = Self {
            output_dir,
            slug: profile.slug.clone(),
            character: profile.name.clone(),
            character_id: profile.character_id,
            format,
            seen_urls: HashSet::new(),
            seen_titles: HashSet::new(),
            seen_prefixes: HashSet::new(),
            records: Vec::new(),
            pages: Vec::new(),
            stats: CrawlStats::default(),
        };

        if format == OutputFormat::JsonLines {
            remove_if_exists(&store.lines_path()).await?;
            remove_if_exists(&store.output_dir.join(FAILURE_FILE)).await?;
        }
        Ok(store)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn records(&self) -> &[KnowledgeRecord] {
        &self.records
    }

    pub fn stats(&self) -> &CrawlStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut CrawlStats {
        &mut self.stats
    }

    pub fn has_crawled(&self, url: &str) -> bool {
        self.seen_urls.contains(url)
    }

    pub fn check_duplicate(&self, record: &KnowledgeRecord) -> Option<Duplicate> {
        if self.seen_titles.contains(&record.title) {
            Some(Duplicate::Title)
        } else if self.seen_prefixes.contains(&content_prefix(&record.content)) {
            Some(Duplicate::ContentPrefix)
        } else {
            None
        }
    }

    /// Persist an accepted record and remember its URL, title and prefix
    pub async fn accept(&mut self, record: KnowledgeRecord, category: &str) -> Result<()> {
        match self.format {
            OutputFormat::JsonFiles => self.write_record_file(&record).await?,
            OutputFormat::JsonLines => {
                let mut line = serde_json::to_string(&record)?;
                line.push('\n');
                append(&self.lines_path(), &line).await?;
            }
        }

        self.seen_urls.insert(record.source_url.clone());
        self.seen_titles.insert(record.title.clone());
        self.seen_prefixes.insert(content_prefix(&record.content));
        self.pages.push(PageSummary {
            title: record.title.clone(),
            url: record.source_url.clone(),
            category: category.to_string(),
            knowledge_type: record.knowledge_type.clone(),
            content_length: record.content_chars(),
            importance: record.importance_score,
        });
        self.stats.success += 1;
        self.records.push(record);
        Ok(())
    }

    /// Note a fetch or parse failure; logged to `failed.txt` in JSON-Lines mode
    pub async fn record_failure(&mut self, url: &str, error: &str) -> Result<()> {
        if self.format == OutputFormat::JsonLines {
            let line = format!("{}\t{}\n", url, error.replace(['\n', '\t'], " "));
            append(&self.output_dir.join(FAILURE_FILE), &line).await?;
        }
        Ok(())
    }

    /// Write the aggregate (JSON-files mode) and the crawl report
    pub async fn flush(&self, total_pages: usize, interrupted: bool) -> Result<CrawlReport> {
        if self.format == OutputFormat::JsonFiles {
            let path = self.aggregate_path();
            fs::write(&path, serde_json::to_string_pretty(&self.records)?).await?;
            debug!("Wrote {} records to {}", self.records.len(), path.display());
        }

        let report = self.report(total_pages, interrupted);
        fs::write(
            self.output_dir.join(REPORT_FILE),
            serde_json::to_string_pretty(&report)?,
        )
        .await?;
        info!(
            "Saved progress: {} accepted of {} attempted",
            report.stats.success, report.stats.total_attempted
        );
        Ok(report)
    }

    pub fn report(&self, total_pages: usize, interrupted: bool) -> CrawlReport {
        let total_content_length: usize = self.pages.iter().map(|p| p.content_length).sum();
        let avg_content_length = total_content_length
            .checked_div(self.pages.len())
            .unwrap_or(0);
        let success_rate = if self.stats.total_attempted == 0 {
            0.0
        } else {
            self.stats.success as f64 / self.stats.total_attempted as f64 * 100.0
        };

        let mut categories = BTreeMap::new();
        for page in &self.pages {
            *categories.entry(page.category.clone()).or_insert(0) += 1;
        }

        CrawlReport {
            timestamp: Utc::now(),
            character: self.character.clone(),
            character_id: self.character_id,
            total_pages,
            stats: self.stats.clone(),
            success_rate,
            total_content_length,
            avg_content_length,
            categories,
            interrupted,
            pages: self.pages.clone(),
        }
    }

    fn lines_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.jsonl", self.slug))
    }

    async fn write_record_file(&self, record: &KnowledgeRecord) -> Result<()> {
        let stem = sanitize_filename(&record.title);
        if stem.is_empty() {
            warn!("Title '{}' has no usable file name, skipping file", record.title);
            return Ok(());
        }
        let stem = if self.is_reserved_stem(&stem) {
            format!("{}_record", stem)
        } else {
            stem
        };
        let path = self.output_dir.join(format!("{}.json", stem));
        fs::write(&path, serde_json::to_string_pretty(record)?).await?;
        Ok(())
    }

    fn aggregate_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_knowledge_base.json", self.slug))
    }

    /// Stems of the files the store writes itself
    fn is_reserved_stem(&self, stem: &str) -> bool {
        [REPORT_FILE.to_string(), format!("{}_knowledge_base.json", self.slug)]
            .iter()
            .filter_map(|name| name.strip_suffix(".json"))
            .any(|reserved| reserved.eq_ignore_ascii_case(stem))
    }
}

fn content_prefix(content: &str) -> String {
    content.chars().take(PREFIX_CHARS).collect()
}

/// File stem for a title: word characters, `_` and `-`, whitespace as `_`
pub fn sanitize_filename(title: &str) -> String {
    title
        .trim()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                Some(c)
            } else if c.is_whitespace() {
                Some('_')
            } else {
                None
            }
        })
        .take(MAX_FILENAME_CHARS)
        .collect()
}

async fn append(path: &Path, text: &str) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn profile() -> DomainProfile {
        DomainProfile::new(CharacterId::new(3), "爱因斯坦", "einstein")
    }

    fn record(title: &str, content: &str) -> KnowledgeRecord {
        KnowledgeRecord::new(CharacterId::new(3), title, content)
            .with_source_url(format!("https://zh.wikipedia.org/wiki/{}", title))
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("  相对论 (物理学)  "), "相对论_物理学");
        assert_eq!(sanitize_filename("E=mc2"), "Emc2");
        assert_eq!(sanitize_filename("a/b\\c"), "abc");
        assert_eq!(sanitize_filename(&"长".repeat(80)).chars().count(), 50);
        assert_eq!(sanitize_filename("???"), "");
    }

    #[tokio::test]
    async fn test_title_and_prefix_dedup() {
        let dir = TempDir::new().unwrap();
        let mut store = RecordStore::open(dir.path(), &profile(), OutputFormat::JsonFiles)
            .await
            .unwrap();

        let body = "广义相对论".repeat(30);
        store.accept(record("广义相对论", &body), "theory").await.unwrap();

        assert_eq!(
            store.check_duplicate(&record("广义相对论", "别的内容")),
            Some(Duplicate::Title)
        );
        let same_start = format!("{}额外的结尾", body);
        assert_eq!(
            store.check_duplicate(&record("另一个标题", &same_start)),
            Some(Duplicate::ContentPrefix)
        );
        assert_eq!(store.check_duplicate(&record("光电效应", "不同的内容")), None);
        assert!(store.has_crawled("https://zh.wikipedia.org/wiki/广义相对论"));
    }

    #[tokio::test]
    async fn test_json_files_and_report() {
        let dir = TempDir::new().unwrap();
        let mut store = RecordStore::open(dir.path(), &profile(), OutputFormat::JsonFiles)
            .await
            .unwrap();

        store.stats_mut().total_attempted = 2;
        store.accept(record("光电 效应", &"光".repeat(120)), "physics").await.unwrap();
        store.stats_mut().failed += 1;
        let report = store.flush(2, false).await.unwrap();

        assert!(dir.path().join("光电_效应.json").exists());
        let aggregate =
            std::fs::read_to_string(dir.path().join("einstein_knowledge_base.json")).unwrap();
        let records: Vec<serde_json::Value> = serde_json::from_str(&aggregate).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["character_id"], 3);

        assert_eq!(report.stats.success, 1);
        assert_eq!(report.success_rate, 50.0);
        assert_eq!(report.avg_content_length, 120);
        assert_eq!(report.categories.get("physics"), Some(&1));

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(REPORT_FILE)).unwrap())
                .unwrap();
        assert_eq!(written["character_id"], 3);
        assert_eq!(written["failed"], 1);
    }

    #[tokio::test]
    async fn test_record_files_never_overwrite_store_files() {
        let dir = TempDir::new().unwrap();
        let mut store = RecordStore::open(dir.path(), &profile(), OutputFormat::JsonFiles)
            .await
            .unwrap();

        store.accept(record("crawl report", "报告内容"), "a").await.unwrap();
        store
            .accept(record("Einstein knowledge base", "汇总内容"), "a")
            .await
            .unwrap();
        store.flush(2, false).await.unwrap();

        let saved = std::fs::read_to_string(dir.path().join("crawl_report_record.json")).unwrap();
        assert!(saved.contains("报告内容"));
        assert!(dir.path().join("Einstein_knowledge_base_record.json").exists());

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(REPORT_FILE)).unwrap())
                .unwrap();
        assert_eq!(report["success"], 2);
    }

    #[tokio::test]
    async fn test_json_lines_mode_resets_and_logs_failures() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("einstein.jsonl"), "stale\n").unwrap();
        std::fs::write(dir.path().join(FAILURE_FILE), "stale\n").unwrap();

        let mut store = RecordStore::open(dir.path(), &profile(), OutputFormat::JsonLines)
            .await
            .unwrap();
        store.accept(record("一", "内容一"), "a").await.unwrap();
        store.accept(record("二", "内容二"), "a").await.unwrap();
        store
            .record_failure("https://zh.wikipedia.org/wiki/x", "HTTP error: 404")
            .await
            .unwrap();
        store.flush(3, false).await.unwrap();

        let lines = std::fs::read_to_string(dir.path().join("einstein.jsonl")).unwrap();
        assert_eq!(lines.lines().count(), 2);
        assert!(!lines.contains("stale"));

        let failures = std::fs::read_to_string(dir.path().join(FAILURE_FILE)).unwrap();
        assert_eq!(failures, "https://zh.wikipedia.org/wiki/x\tHTTP error: 404\n");
        assert!(!dir.path().join("einstein_knowledge_base.json").exists());
    }
}
