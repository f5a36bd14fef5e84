//! Assembles extracted page content into knowledge records for one domain

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{dedup_tags, CharacterId, KnowledgeRecord};
use crate::crawler::{ExtractedContent, PageTarget};

/// Static description of one character domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainProfile {
    /// Identifier the backend assigned to this domain
    pub character_id: CharacterId,

    /// Display name, e.g. "爱因斯坦"
    pub name: String,

    /// File-system friendly name, e.g. "einstein"
    pub slug: String,

    /// Source label written into every record
    #[serde(default)]
    pub source: String,

    #[serde(default = "default_language")]
    pub language: String,

    /// Category label to knowledge type
    #[serde(default)]
    pub category_types: BTreeMap<String, String>,

    /// Category label to descriptive tags
    #[serde(default)]
    pub category_tags: BTreeMap<String, Vec<String>>,

    /// Keyword rules checked before the category table, first match wins
    #[serde(default)]
    pub type_rules: Vec<KeywordRule>,

    /// Type used when neither rules nor the category table match.
    /// Falls back to the category label itself when unset.
    #[serde(default)]
    pub default_type: Option<String>,

    /// Entities whose presence boosts importance
    #[serde(default)]
    pub important_entities: Vec<String>,

    /// Keywords added as tags when they occur in the content
    #[serde(default)]
    pub topic_keywords: Vec<String>,

    /// Tags added to every record of this domain
    #[serde(default)]
    pub domain_tags: Vec<String>,

    #[serde(default = "default_max_tags")]
    pub max_tags: usize,

    #[serde(default)]
    pub importance: ImportanceRules,
}

fn default_language() -> String {
    "zh".to_string()
}

fn default_max_tags() -> usize {
    8
}

impl DomainProfile {
    /// A bare profile with no classification tables
    pub fn new(
        character_id: CharacterId,
        name: impl Into<String>,
        slug: impl Into<String>,
    ) -> Self {
        Self {
            character_id,
            name: name.into(),
            slug: slug.into(),
            source: String::new(),
            language: default_language(),
            category_types: BTreeMap::new(),
            category_tags: BTreeMap::new(),
            type_rules: Vec::new(),
            default_type: None,
            important_entities: Vec::new(),
            topic_keywords: Vec::new(),
            domain_tags: Vec::new(),
            max_tags: default_max_tags(),
            importance: ImportanceRules::default(),
        }
    }
}

/// Maps titles containing any of `keywords` to `knowledge_type`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRule {
    pub keywords: Vec<String>,
    pub knowledge_type: String,

    /// Also match against the content, not only the title
    #[serde(default)]
    pub match_content: bool,
}

/// Adjustments applied on top of a target's seeded importance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportanceRules {
    pub title_entity_boost: i64,
    pub content_entity_boost: i64,
    pub long_content_chars: usize,
    pub long_content_boost: i64,
    pub medium_content_chars: usize,
    pub medium_content_boost: i64,
    pub short_content_chars: usize,
    pub short_content_penalty: i64,
}

impl Default for ImportanceRules {
    fn default() -> Self {
        Self {
            title_entity_boost: 3,
            content_entity_boost: 1,
            long_content_chars: 1000,
            long_content_boost: 2,
            medium_content_chars: 500,
            medium_content_boost: 1,
            short_content_chars: 100,
            short_content_penalty: 1,
        }
    }
}

/// Builds records for a single domain
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    profile: DomainProfile,
}

impl RecordBuilder {
    pub fn new(profile: DomainProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &DomainProfile {
        &self.profile
    }

    /// Build a record from extracted content.
    ///
    /// The target's title is authoritative; the page heading is only used
    /// when the target has none.
    pub fn build(
        &self,
        extracted: &ExtractedContent,
        target: &PageTarget,
        source_url: &str,
    ) -> KnowledgeRecord {
        let title = if target.title.trim().is_empty() {
            extracted.title.trim()
        } else {
            target.title.trim()
        };
        let content = extracted.content.as_str();
        let knowledge_type = self.knowledge_type(title, &target.category, content);
        let importance = self.importance(i64::from(target.importance), title, content);
        let tags = self.tags(title, &target.category, &knowledge_type, content);

        KnowledgeRecord::new(self.profile.character_id, title, content)
            .with_knowledge_type(knowledge_type)
            .with_importance(importance)
            .with_source(self.profile.source.clone())
            .with_source_url(source_url)
            .with_language(self.profile.language.clone())
            .with_status(1)
            .with_tags(tags)
    }

    pub fn knowledge_type(&self, title: &str, category: &str, content: &str) -> String {
        let rule = self.profile.type_rules.iter().find(|rule| {
            rule.keywords.iter().any(|keyword| {
                title.contains(keyword.as_str())
                    || (rule.match_content && content.contains(keyword.as_str()))
            })
        });
        if let Some(rule) = rule {
            return rule.knowledge_type.clone();
        }

        self.profile
            .category_types
            .get(category)
            .or(self.profile.default_type.as_ref())
            .cloned()
            .unwrap_or_else(|| category.to_string())
    }

    pub fn importance(&self, seed: i64, title: &str, content: &str) -> i64 {
        let rules = &self.profile.importance;
        let mut score = seed;

        let entities = &self.profile.important_entities;
        if entities.iter().any(|e| title.contains(e.as_str())) {
            score += rules.title_entity_boost;
        } else if entities.iter().any(|e| content.contains(e.as_str())) {
            score += rules.content_entity_boost;
        }

        let length = content.chars().count();
        if length > rules.long_content_chars {
            score += rules.long_content_boost;
        } else if length > rules.medium_content_chars {
            score += rules.medium_content_boost;
        } else if length < rules.short_content_chars {
            score -= rules.short_content_penalty;
        }

        score.clamp(1, 10)
    }

    fn tags(
        &self,
        title: &str,
        category: &str,
        knowledge_type: &str,
        content: &str,
    ) -> Vec<String> {
        let category_tags = match self.profile.category_tags.get(category) {
            Some(tags) => tags.clone(),
            None => vec![category.to_lowercase()],
        };
        let topics = self
            .profile
            .topic_keywords
            .iter()
            .filter(|keyword| content.contains(keyword.as_str()))
            .cloned();

        let all = category_tags
            .into_iter()
            .chain(std::iter::once(knowledge_type.to_string()))
            .chain(self.profile.domain_tags.iter().cloned())
            .chain(topics)
            .chain(std::iter::once(title.to_string()));
        dedup_tags(all, self.profile.max_tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conan_profile() -> DomainProfile {
        let mut profile = DomainProfile::new(CharacterId::new(4), "江户川柯南", "conan");
        profile.source = "conanpedia".to_string();
        profile.type_rules = vec![
            KeywordRule {
                keywords: vec!["TV".into(), "集".into()],
                knowledge_type: "episode".into(),
                match_content: false,
            },
            KeywordRule {
                keywords: vec!["组织".into(), "黑衣".into(), "FBI".into()],
                knowledge_type: "organization".into(),
                match_content: false,
            },
        ];
        profile
            .category_types
            .insert("CHARACTERS".into(), "character".into());
        profile.default_type = Some("knowledge".into());
        profile.important_entities = vec!["江户川柯南".into(), "黑衣组织".into()];
        profile.domain_tags = vec!["detective".into(), "conan".into()];
        profile
    }

    fn extracted(title: &str, content: &str) -> ExtractedContent {
        ExtractedContent {
            title: title.to_string(),
            paragraphs: vec![content.to_string()],
            content: content.to_string(),
            raw_length: content.chars().count(),
            matched_selector: None,
        }
    }

    fn target(title: &str, category: &str, importance: u8) -> PageTarget {
        PageTarget {
            url: "/wiki/x".to_string(),
            title: title.to_string(),
            category: category.to_string(),
            importance,
        }
    }

    #[test]
    fn test_character_id_comes_from_profile() {
        let builder = RecordBuilder::new(conan_profile());
        let record = builder.build(
            &extracted("ignored", &"推理".repeat(80)),
            &target("毛利兰", "CHARACTERS", 7),
            "https://www.conanpedia.com/毛利兰",
        );
        assert_eq!(record.character_id(), CharacterId::new(4));
        assert_eq!(record.title, "毛利兰");
        assert_eq!(record.source, "conanpedia");
    }

    #[test]
    fn test_knowledge_type_rules_before_category() {
        let builder = RecordBuilder::new(conan_profile());
        assert_eq!(builder.knowledge_type("黑衣组织", "CHARACTERS", ""), "organization");
        assert_eq!(builder.knowledge_type("毛利兰", "CHARACTERS", ""), "character");
        assert_eq!(builder.knowledge_type("米花町", "PLACES", ""), "knowledge");

        let mut profile = conan_profile();
        profile.default_type = None;
        let builder = RecordBuilder::new(profile);
        assert_eq!(builder.knowledge_type("米花町", "PLACES", ""), "PLACES");
    }

    #[test]
    fn test_importance_boosts_and_caps() {
        let builder = RecordBuilder::new(conan_profile());
        let long = "字".repeat(1200);
        assert_eq!(builder.importance(9, "江户川柯南", &long), 10);
        assert_eq!(builder.importance(5, "毛利兰", &long), 7);
        assert_eq!(builder.importance(5, "毛利兰", &"字".repeat(600)), 6);
        assert_eq!(
            builder.importance(5, "毛利兰", &format!("黑衣组织{}", "字".repeat(200))),
            6
        );
    }

    #[test]
    fn test_importance_short_content_penalty_floor() {
        let builder = RecordBuilder::new(conan_profile());
        assert_eq!(builder.importance(5, "米花町", "短"), 4);
        assert_eq!(builder.importance(1, "米花町", "短"), 1);
    }

    #[test]
    fn test_tags_union_dedup_and_cap() {
        let mut profile = conan_profile();
        profile.topic_keywords = vec!["推理".into(), "侦探".into()];
        profile.max_tags = 5;
        let builder = RecordBuilder::new(profile);
        let record = builder.build(
            &extracted("x", &format!("推理{}", "字".repeat(120))),
            &target("毛利兰", "CHARACTERS", 5),
            "u",
        );
        assert_eq!(
            record.tags,
            vec!["characters", "character", "detective", "conan", "推理"]
        );
    }
}
