//! Merging of several crawl outputs for one domain into a single file

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::error::Error as CrateError;
use crate::importer::{discover_files, load_records_file, ImportError};

pub const MERGE_REPORT_FILE: &str = "merge_report.json";

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Load(#[from] ImportError),

    #[error("Invalid merge source '{0}', expected LABEL=PATH or PATH")]
    InvalidSource(String),
}

impl From<MergeError> for CrateError {
    fn from(err: MergeError) -> Self {
        match err {
            MergeError::Io(e) => CrateError::Io(e),
            MergeError::Json(e) => CrateError::Json(e),
            MergeError::Load(e) => e.into(),
            other => CrateError::Other(other.to_string()),
        }
    }
}

/// A labelled JSON file or directory of single-record files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSource {
    pub label: String,
    pub path: PathBuf,
}

impl FromStr for MergeSource {
    type Err = MergeError;

    /// Parse `LABEL=PATH`, or a bare `PATH` labelled by its file stem
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (label, path) = match s.split_once('=') {
            Some((label, path)) => (label.trim().to_string(), PathBuf::from(path.trim())),
            None => {
                let path = PathBuf::from(s.trim());
                let label = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (label, path)
            }
        };
        if label.is_empty() || path.as_os_str().is_empty() {
            return Err(MergeError::InvalidSource(s.to_string()));
        }
        Ok(Self { label, path })
    }
}

/// Contents of `merge_report.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReport {
    pub merge_date: DateTime<Utc>,
    pub total_records: usize,
    /// Unique records contributed by each source label
    pub source_statistics: BTreeMap<String, usize>,
    pub merged_files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub records: Vec<Value>,
    pub report: MergeReport,
}

/// Merge sources in order, keeping the first record seen for each title
pub async fn merge_sources(sources: &[MergeSource]) -> MergeOutcome {
    let merged_at = Utc::now();
    let stamp = merged_at.to_rfc3339();
    let mut seen = HashSet::new();
    let mut records = Vec::new();
    let mut statistics = BTreeMap::new();

    for source in sources {
        let items = match load_source(&source.path).await {
            Ok(items) => items,
            Err(e) => {
                warn!("Skipping source {}: {}", source.label, e);
                continue;
            }
        };

        let raw = items.len();
        let mut unique = 0;
        for (fallback, mut item) in items {
            let Some(object) = item.as_object_mut() else {
                continue;
            };
            let title = ["title", "name"]
                .iter()
                .find_map(|key| object.get(*key).and_then(Value::as_str))
                .map(str::to_string)
                .or(fallback)
                .filter(|title| !title.trim().is_empty());
            let Some(title) = title else {
                continue;
            };
            if !seen.insert(title) {
                continue;
            }
            object.insert("merged_from".to_string(), Value::String(source.label.clone()));
            object.insert("merged_at".to_string(), Value::String(stamp.clone()));
            records.push(item);
            unique += 1;
        }
        info!("{}: {} raw -> {} unique", source.label, raw, unique);
        statistics.insert(source.label.clone(), unique);
    }

    MergeOutcome {
        report: MergeReport {
            merge_date: merged_at,
            total_records: records.len(),
            source_statistics: statistics,
            merged_files: sources.iter().map(|s| s.label.clone()).collect(),
        },
        records,
    }
}

/// Items of a source paired with a fallback title (file stem for directory entries)
async fn load_source(path: &Path) -> Result<Vec<(Option<String>, Value)>, MergeError> {
    if fs::metadata(path).await?.is_dir() {
        let files = discover_files(path, &[]).await?;
        let mut items = Vec::new();
        for file in files {
            let stem = file
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
            match fs::read_to_string(&file).await {
                Ok(text) => match serde_json::from_str::<Value>(&text) {
                    Ok(value @ Value::Object(_)) => items.push((stem, value)),
                    Ok(_) => warn!("{} is not a single record, skipping", file.display()),
                    Err(e) => warn!("Skipping {}: {}", file.display(), e),
                },
                Err(e) => warn!("Skipping {}: {}", file.display(), e),
            }
        }
        return Ok(items);
    }

    let items = load_records_file(path).await?;
    Ok(items.into_iter().map(|item| (None, item)).collect())
}

/// Write the merged array to `output` and the report next to it
pub async fn write_merged(outcome: &MergeOutcome, output: &Path) -> Result<PathBuf, MergeError> {
    let dir = output.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).await?;
    fs::write(output, serde_json::to_string_pretty(&outcome.records)?).await?;

    let report_path = dir.join(MERGE_REPORT_FILE);
    fs::write(&report_path, serde_json::to_string_pretty(&outcome.report)?).await?;
    Ok(report_path)
}
