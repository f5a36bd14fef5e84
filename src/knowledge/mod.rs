//! # Knowledge Record Module
//!
//! The normalized unit of scraped content that is persisted to disk and
//! submitted to the RAG backend.
//!
//! ## Key Components
//!
//! - `CharacterId`: The identifier of the domain a record belongs to
//! - `KnowledgeRecord`: A single piece of knowledge with its metadata
//! - `ImportBatch`: The request body for the knowledge import endpoint
//! - `RecordBuilder`: Turns extracted page content into records for one domain
//!
//! A record can only be created through [`KnowledgeRecord::new`], which takes
//! the character id as a required argument. There is no default id and no
//! setter, so a record can never silently end up tagged with another domain.

mod builder;

pub use builder::{DomainProfile, ImportanceRules, KeywordRule, RecordBuilder};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a character domain in the RAG backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(u32);

impl CharacterId {
    /// Wrap a raw backend identifier
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw identifier value
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Default knowledge type for records that carry none
pub const DEFAULT_KNOWLEDGE_TYPE: &str = "knowledge";

/// Lowest and highest importance score accepted by the backend
pub const MIN_IMPORTANCE: u8 = 1;
pub const MAX_IMPORTANCE: u8 = 10;

/// A normalized knowledge record.
///
/// Only serializable: input files go through the importer's `Normalizer`,
/// which supplies the configured id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeRecord {
    character_id: CharacterId,

    /// Title of the record, also used for deduplication and the file name
    pub title: String,

    /// Cleaned text body
    pub content: String,

    /// Knowledge category understood by the backend
    pub knowledge_type: String,

    /// Importance between 1 and 10
    pub importance_score: u8,

    /// Human readable source label
    pub source: String,

    /// URL the content was taken from
    pub source_url: String,

    /// Content language code
    pub language: String,

    /// Backend status flag, 1 means active
    pub status: u8,

    /// Ordered, deduplicated tags
    pub tags: Vec<String>,
}

impl KnowledgeRecord {
    /// Create a record owned by `character_id`
    pub fn new(
        character_id: CharacterId,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            character_id,
            title: title.into(),
            content: content.into(),
            knowledge_type: DEFAULT_KNOWLEDGE_TYPE.to_string(),
            importance_score: 5,
            source: String::new(),
            source_url: String::new(),
            language: "zh".to_string(),
            status: 1,
            tags: Vec::new(),
        }
    }

    /// The domain this record belongs to
    pub fn character_id(&self) -> CharacterId {
        self.character_id
    }

    pub fn with_knowledge_type(mut self, knowledge_type: impl Into<String>) -> Self {
        self.knowledge_type = knowledge_type.into();
        self
    }

    /// Set the importance, clamped to the accepted range
    pub fn with_importance(mut self, importance: i64) -> Self {
        self.importance_score =
            importance.clamp(i64::from(MIN_IMPORTANCE), i64::from(MAX_IMPORTANCE)) as u8;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_source_url(mut self, source_url: impl Into<String>) -> Self {
        self.source_url = source_url.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_status(mut self, status: u8) -> Self {
        self.status = status;
        self
    }

    /// Set the tags, dropping blanks and repeated entries
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = dedup_tags(tags.into_iter().map(Into::into), usize::MAX);
        self
    }

    /// Number of characters in the content
    pub fn content_chars(&self) -> usize {
        self.content.chars().count()
    }
}

/// Deduplicate tags preserving first occurrence, skipping blanks, keeping at most `cap`
pub(crate) fn dedup_tags(tags: impl IntoIterator<Item = String>, cap: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() || out.iter().any(|t| t == tag) {
            continue;
        }
        if out.len() >= cap {
            break;
        }
        out.push(tag.to_string());
    }
    out
}

/// Body of `POST /api/knowledge/import/text`
#[derive(Debug, Serialize)]
pub struct ImportBatch<'a> {
    #[serde(rename = "characterId")]
    pub character_id: CharacterId,

    #[serde(rename = "knowledgeItems")]
    pub knowledge_items: &'a [KnowledgeRecord],
}

impl<'a> ImportBatch<'a> {
    pub fn new(character_id: CharacterId, knowledge_items: &'a [KnowledgeRecord]) -> Self {
        Self {
            character_id,
            knowledge_items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_constructor_id() {
        let record = KnowledgeRecord::new(CharacterId::new(4), "工藤新一", "高中生侦探")
            .with_importance(42)
            .with_tags(["conan", " ", "conan", "detective"]);

        assert_eq!(record.character_id(), CharacterId::new(4));
        assert_eq!(record.importance_score, 10);
        assert_eq!(record.tags, vec!["conan", "detective"]);
    }

    #[test]
    fn test_importance_floor() {
        let record = KnowledgeRecord::new(CharacterId::new(1), "t", "c").with_importance(-3);
        assert_eq!(record.importance_score, 1);
    }

    #[test]
    fn test_serializes_snake_case() {
        let record = KnowledgeRecord::new(CharacterId::new(3), "相对论", "内容")
            .with_source_url("https://zh.wikipedia.org/wiki/x");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["character_id"], 3);
        assert_eq!(json["source_url"], "https://zh.wikipedia.org/wiki/x");
        assert_eq!(json["knowledge_type"], DEFAULT_KNOWLEDGE_TYPE);
        assert!(json.get("characterId").is_none());
    }

    #[test]
    fn test_import_batch_wire_format() {
        let records = vec![KnowledgeRecord::new(CharacterId::new(2), "申辩篇", "文本")];
        let batch = ImportBatch::new(CharacterId::new(2), &records);
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["characterId"], 2);
        assert_eq!(json["knowledgeItems"][0]["title"], "申辩篇");
        assert_eq!(json["knowledgeItems"][0]["character_id"], 2);
    }

    #[test]
    fn test_dedup_tags_cap() {
        let tags = dedup_tags(
            ["a", "b", "a", "c", "d"].into_iter().map(String::from),
            3,
        );
        assert_eq!(tags, vec!["a", "b", "c"]);
    }
}
