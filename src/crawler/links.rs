//! Ranking of discovered links into crawl targets

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use super::error::CrawlError;
use super::PageTarget;

const BASE_SCORE: i32 = 10;
const CHARACTER_CATEGORY: &str = "CHARACTERS";
const CHARACTER_BONUS: i32 = 20;
const TITLE_LENGTH_BONUS: i32 = 10;

/// A link collected by an earlier discovery crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkEntry {
    pub text: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub full_url: Option<String>,
    #[serde(default)]
    pub category: String,
}

impl LinkEntry {
    /// The absolute URL if recorded, otherwise the raw one
    pub fn target_url(&self) -> Option<&str> {
        self.full_url
            .as_deref()
            .or(self.url.as_deref())
            .filter(|u| !u.trim().is_empty())
    }
}

/// Keyword weights and the number of targets to keep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkPriority {
    pub weights: BTreeMap<String, i32>,
    pub max_pages: usize,
}

impl LinkPriority {
    pub fn score(&self, link: &LinkEntry) -> i32 {
        let mut score = BASE_SCORE;
        score += self
            .weights
            .iter()
            .filter(|(keyword, _)| link.text.contains(keyword.as_str()))
            .map(|(_, weight)| *weight)
            .sum::<i32>();
        if link.category == CHARACTER_CATEGORY {
            score += CHARACTER_BONUS;
        }
        let length = link.text.trim().chars().count();
        if (3..=50).contains(&length) {
            score += TITLE_LENGTH_BONUS;
        }
        score
    }

    /// Rank links by score and turn the best ones into targets.
    ///
    /// Ties keep their input order; repeated URLs are dropped.
    pub fn prioritize(&self, links: &[LinkEntry]) -> Vec<PageTarget> {
        let mut scored: Vec<(i32, &LinkEntry)> = links
            .iter()
            .filter(|link| link.target_url().is_some())
            .map(|link| (self.score(link), link))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let limit = if self.max_pages == 0 {
            usize::MAX
        } else {
            self.max_pages
        };
        let mut seen = HashSet::new();
        scored
            .into_iter()
            .filter_map(|(_, link)| {
                let url = link.target_url()?;
                seen.insert(url.to_string()).then(|| PageTarget {
                    url: url.to_string(),
                    title: link.text.trim().to_string(),
                    category: link.category.clone(),
                    importance: 5,
                })
            })
            .take(limit)
            .collect()
    }
}

/// Load a JSON array of links written by a discovery crawl
pub async fn load_links(path: &Path) -> Result<Vec<LinkEntry>, CrawlError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CrawlError::Other(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&text)
        .map_err(|e| CrawlError::Other(format!("Invalid link file {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(text: &str, url: &str, category: &str) -> LinkEntry {
        LinkEntry {
            text: text.to_string(),
            url: Some(url.to_string()),
            full_url: None,
            category: category.to_string(),
        }
    }

    fn priority() -> LinkPriority {
        LinkPriority {
            weights: BTreeMap::from([("柯南".to_string(), 15), ("黑衣".to_string(), 12)]),
            max_pages: 3,
        }
    }

    #[test]
    fn test_score() {
        let priority = priority();
        assert_eq!(priority.score(&link("江户川柯南", "/a", "CHARACTERS")), 10 + 15 + 20 + 10);
        assert_eq!(priority.score(&link("黑衣组织", "/b", "ORGANIZATIONS")), 10 + 12 + 10);
        assert_eq!(priority.score(&link("A", "/c", "MISC")), 10);
    }

    #[test]
    fn test_prioritize_sorts_dedups_and_limits() {
        let links = vec![
            link("A", "/misc", "MISC"),
            link("黑衣组织", "/black", "ORGANIZATIONS"),
            link("江户川柯南", "/conan", "CHARACTERS"),
            link("江户川柯南", "/conan", "CHARACTERS"),
            link("毛利兰", "/ran", "CHARACTERS"),
            LinkEntry {
                text: "无链接".to_string(),
                url: None,
                full_url: None,
                category: "MISC".to_string(),
            },
        ];
        let targets = priority().prioritize(&links);
        let urls: Vec<&str> = targets.iter().map(|t| t.url.as_str()).collect();
        assert_eq!(urls, vec!["/conan", "/ran", "/black"]);
        assert_eq!(targets[0].title, "江户川柯南");
        assert_eq!(targets[0].importance, 5);
    }

    #[test]
    fn test_full_url_preferred() {
        let entry: LinkEntry = serde_json::from_str(
            r#"{"text": "工藤新一", "url": "/wiki/x", "full_url": "https://example.org/wiki/x", "category": "CHARACTERS"}"#,
        )
        .unwrap();
        assert_eq!(entry.target_url(), Some("https://example.org/wiki/x"));
    }
}
