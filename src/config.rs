//! # Domain Configuration
//!
//! Each character domain is described by one TOML file: the domain profile,
//! extraction and crawl settings, the page targets, link priorities and the
//! import settings. A directory of such files is loaded and validated
//! together so identifiers stay unique.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

use crate::crawler::{CrawlerConfig, ExtractorConfig, LinkPriority, PageTarget};
use crate::error::Error as CrateError;
use crate::importer::ImportSettings;
use crate::knowledge::{CharacterId, DomainProfile};

/// Root of crawl output when a domain does not set its own directory
pub const DEFAULT_DATA_ROOT: &str = "data";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid domain {path}: {message}")]
    Invalid { path: PathBuf, message: String },

    #[error("Character id {id} is used by both {first} and {second}")]
    DuplicateId {
        id: CharacterId,
        first: String,
        second: String,
    },

    #[error("No domain files found in {0}")]
    NoDomains(PathBuf),

    #[error("Unknown domain '{0}'")]
    UnknownDomain(String),
}

impl From<ConfigError> for CrateError {
    fn from(err: ConfigError) -> Self {
        CrateError::Config(err.to_string())
    }
}

/// Everything known about one character domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub domain: DomainProfile,

    #[serde(default)]
    pub extraction: ExtractorConfig,

    #[serde(default)]
    pub crawl: CrawlerConfig,

    #[serde(default)]
    pub links: LinkPriority,

    #[serde(default)]
    pub targets: Vec<PageTarget>,

    #[serde(default)]
    pub import: ImportSettings,
}

impl DomainConfig {
    /// Parse and validate a domain from TOML text
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate().map_err(|message| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(config)
    }

    /// Load a single domain file
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml(&text, path)
    }

    pub fn validate(&self) -> Result<(), String> {
        let profile = &self.domain;
        if profile.character_id.get() == 0 {
            return Err("character_id must be positive".to_string());
        }
        if profile.slug.trim().is_empty() {
            return Err("slug must not be empty".to_string());
        }
        if profile.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.import.batch_size == 0 {
            return Err("import.batch_size must be positive".to_string());
        }
        if self.extraction.max_content_chars < 4 {
            return Err("extraction.max_content_chars is too small".to_string());
        }
        if let Some(target) = self
            .targets
            .iter()
            .find(|t| !(1..=10).contains(&t.importance))
        {
            return Err(format!(
                "target '{}' has importance {} outside 1..=10",
                target.title, target.importance
            ));
        }
        if let Some(target) = self.targets.iter().find(|t| t.url.trim().is_empty()) {
            return Err(format!("target '{}' has no url", target.title));
        }
        Ok(())
    }

    /// Where crawl output goes and import input comes from by default
    pub fn output_dir(&self) -> PathBuf {
        if self.crawl.output_dir.as_os_str().is_empty() {
            Path::new(DEFAULT_DATA_ROOT).join(&self.domain.slug)
        } else {
            self.crawl.output_dir.clone()
        }
    }

    /// Directory the importer reads from
    pub fn import_dir(&self) -> PathBuf {
        self.import
            .data_dir
            .clone()
            .unwrap_or_else(|| self.output_dir())
    }

    /// Whether `key` names this domain by slug, name or id
    pub fn matches(&self, key: &str) -> bool {
        let key = key.trim();
        self.domain.slug.eq_ignore_ascii_case(key)
            || self.domain.name == key
            || self.domain.character_id.to_string() == key
    }
}

/// Load every `*.toml` domain file in `dir`, ordered by character id
pub async fn load_domain_dir(dir: &Path) -> Result<Vec<DomainConfig>, ConfigError> {
    let read_error = |source| ConfigError::Read {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = fs::read_dir(dir).await.map_err(read_error)?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_error)? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "toml") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut domains = Vec::new();
    for path in paths {
        let domain = DomainConfig::load(&path).await?;
        debug!(
            "Loaded domain {} ({}) from {}",
            domain.domain.name,
            domain.domain.character_id,
            path.display()
        );
        domains.push(domain);
    }
    if domains.is_empty() {
        return Err(ConfigError::NoDomains(dir.to_path_buf()));
    }

    check_unique_ids(&domains)?;
    domains.sort_by_key(|d| d.domain.character_id);
    Ok(domains)
}

fn check_unique_ids(domains: &[DomainConfig]) -> Result<(), ConfigError> {
    let mut seen: HashMap<CharacterId, &str> = HashMap::new();
    for domain in domains {
        if let Some(first) = seen.insert(domain.domain.character_id, &domain.domain.slug) {
            return Err(ConfigError::DuplicateId {
                id: domain.domain.character_id,
                first: first.to_string(),
                second: domain.domain.slug.clone(),
            });
        }
    }
    Ok(())
}

/// Pick the domains named by `keys`, or all of them when `keys` is empty
pub fn select_domains<'a>(
    domains: &'a [DomainConfig],
    keys: &[String],
) -> Result<Vec<&'a DomainConfig>, ConfigError> {
    if keys.is_empty() {
        return Ok(domains.iter().collect());
    }
    keys.iter()
        .map(|key| {
            domains
                .iter()
                .find(|d| d.matches(key))
                .ok_or_else(|| ConfigError::UnknownDomain(key.clone()))
        })
        .collect()
}
