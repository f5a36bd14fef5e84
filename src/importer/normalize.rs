//! Normalization of heterogeneous persisted items into knowledge records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::knowledge::{CharacterId, DomainProfile, KnowledgeRecord};

/// Knowledge type for items that carry none
pub const FALLBACK_KNOWLEDGE_TYPE: &str = "综合知识";

/// How a structured field is rendered into content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// A scalar value
    #[default]
    Text,
    /// An object rendered as `key：value` lines
    Map,
    /// A list of `{产物, 材料, 制作站}` objects
    Recipes,
    /// A list of strings, comma-joined
    List,
}

/// One labelled field of a structured item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub field: String,
    pub label: String,
    #[serde(default)]
    pub kind: SectionKind,
}

/// Layout of a structured item type, recognized by its title field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredSchema {
    /// Field holding the item name, e.g. `武器名`
    pub title_field: String,
    /// Label of the name block, e.g. `武器名称`
    pub title_label: String,
    #[serde(default)]
    pub knowledge_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl StructuredSchema {
    fn matches(&self, item: &Map<String, Value>) -> bool {
        item.get(&self.title_field)
            .and_then(scalar_text)
            .is_some_and(|t| !t.is_empty())
    }

    /// Render the item as labelled blocks
    pub fn render(&self, item: &Map<String, Value>) -> String {
        let title = item
            .get(&self.title_field)
            .and_then(scalar_text)
            .unwrap_or_default();
        let mut blocks = vec![format!("【{}】{}", self.title_label, title)];

        for section in &self.sections {
            let Some(value) = item.get(&section.field) else {
                continue;
            };
            let block = match section.kind {
                SectionKind::Text => scalar_text(value)
                    .filter(|text| !text.is_empty())
                    .map(|text| format!("【{}】{}", section.label, text)),
                SectionKind::Map => value.as_object().filter(|map| !map.is_empty()).map(|map| {
                    let lines: Vec<String> = map
                        .iter()
                        .map(|(key, value)| {
                            format!("  {}：{}", key, scalar_text(value).unwrap_or_default())
                        })
                        .collect();
                    format!("【{}】\n{}", section.label, lines.join("\n"))
                }),
                SectionKind::Recipes => value
                    .as_array()
                    .filter(|list| !list.is_empty())
                    .map(|list| {
                        let lines: Vec<String> = list
                            .iter()
                            .filter_map(Value::as_object)
                            .map(render_recipe)
                            .collect();
                        format!("【{}】\n{}", section.label, lines.join("\n"))
                    }),
                SectionKind::List => value
                    .as_array()
                    .filter(|list| !list.is_empty())
                    .map(|list| format!("【{}】{}", section.label, string_list(list).join(", "))),
            };
            if let Some(block) = block {
                blocks.push(block);
            }
        }
        blocks.join("\n")
    }
}

fn render_recipe(recipe: &Map<String, Value>) -> String {
    let product = recipe
        .get("产物")
        .and_then(scalar_text)
        .unwrap_or_else(|| "未知".to_string());
    let materials = recipe
        .get("材料")
        .and_then(Value::as_array)
        .map(|list| string_list(list))
        .unwrap_or_default();
    let materials = if materials.is_empty() {
        "无材料".to_string()
    } else {
        materials.join(", ")
    };
    let station = recipe
        .get("制作站")
        .and_then(scalar_text)
        .unwrap_or_else(|| "未知".to_string());
    format!("  制作 {}：需要 {}（制作站：{}）", product, materials, station)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_list(list: &[Value]) -> Vec<String> {
    list.iter().filter_map(scalar_text).collect()
}

/// Builds records for one domain from raw JSON items
#[derive(Debug, Clone)]
pub struct Normalizer {
    character_id: CharacterId,
    name: String,
    source: String,
    language: String,
    schemas: Vec<StructuredSchema>,
}

impl Normalizer {
    pub fn new(profile: &DomainProfile, schemas: Vec<StructuredSchema>) -> Self {
        Self {
            character_id: profile.character_id,
            name: profile.name.clone(),
            source: profile.source.clone(),
            language: profile.language.clone(),
            schemas,
        }
    }

    /// Normalize one item; non-objects yield `None`.
    ///
    /// Any character id in the item is ignored.
    pub fn normalize(&self, item: &Value) -> Option<KnowledgeRecord> {
        let object = item.as_object()?;
        let schema = self.schemas.iter().find(|schema| schema.matches(object));

        let title = match schema {
            Some(schema) => field(object, &[schema.title_field.as_str()]),
            None => field(object, &["title", "name"]),
        }
        .unwrap_or_else(|| format!("未命名_{}", self.name));

        let content = match schema {
            Some(schema) => schema.render(object),
            None => field(object, &["content", "description"])
                .unwrap_or_else(|| format!("{}相关知识", self.name)),
        };

        let knowledge_type = field(object, &["knowledge_type", "knowledgeType"])
            .or_else(|| schema.and_then(|s| s.knowledge_type.clone()))
            .unwrap_or_else(|| FALLBACK_KNOWLEDGE_TYPE.to_string());
        let importance = ["importance_score", "importanceScore"]
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_i64))
            .unwrap_or(5);
        let status = object
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u8::try_from(s).ok())
            .unwrap_or(1);

        let mut tags: Vec<String> = object
            .get("tags")
            .and_then(Value::as_array)
            .map(|list| string_list(list))
            .unwrap_or_default();
        if let Some(schema) = schema {
            tags.extend(schema.tags.iter().cloned());
        }

        Some(
            KnowledgeRecord::new(self.character_id, title, content)
                .with_knowledge_type(knowledge_type)
                .with_importance(importance)
                .with_source(field(object, &["source"]).unwrap_or_else(|| self.source.clone()))
                .with_source_url(
                    field(object, &["source_url", "sourceUrl", "url"]).unwrap_or_default(),
                )
                .with_language(
                    field(object, &["language"]).unwrap_or_else(|| self.language.clone()),
                )
                .with_status(status)
                .with_tags(tags),
        )
    }
}

/// First non-empty scalar among `keys`
fn field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| object.get(*key).and_then(scalar_text))
        .find(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalizer(id: u32, schemas: Vec<StructuredSchema>) -> Normalizer {
        let mut profile = DomainProfile::new(CharacterId::new(id), "泰拉瑞亚向导", "terraria");
        profile.source = "terraria.wiki.gg".to_string();
        Normalizer::new(&profile, schemas)
    }

    fn weapon_schema() -> StructuredSchema {
        StructuredSchema {
            title_field: "武器名".into(),
            title_label: "武器名称".into(),
            knowledge_type: Some("weapon".into()),
            tags: vec!["武器".into()],
            sections: vec![
                Section {
                    field: "属性".into(),
                    label: "属性信息".into(),
                    kind: SectionKind::Map,
                },
                Section {
                    field: "合成表".into(),
                    label: "合成配方".into(),
                    kind: SectionKind::Recipes,
                },
                Section {
                    field: "url".into(),
                    label: "详细信息".into(),
                    kind: SectionKind::Text,
                },
            ],
        }
    }

    #[test]
    fn test_foreign_character_id_is_ignored() {
        let normalizer = normalizer(5, vec![]);
        let record = normalizer
            .normalize(&json!({"title": "史莱姆王", "content": "Boss", "character_id": 1}))
            .unwrap();
        assert_eq!(record.character_id(), CharacterId::new(5));

        let record = normalizer
            .normalize(&json!({"name": "向导", "characterId": 3}))
            .unwrap();
        assert_eq!(record.character_id(), CharacterId::new(5));
        assert_eq!(record.title, "向导");
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let record = normalizer(5, vec![]).normalize(&json!({"misc": 1})).unwrap();
        assert_eq!(record.title, "未命名_泰拉瑞亚向导");
        assert_eq!(record.content, "泰拉瑞亚向导相关知识");
        assert_eq!(record.knowledge_type, FALLBACK_KNOWLEDGE_TYPE);
        assert_eq!(record.importance_score, 5);
        assert_eq!(record.status, 1);
        assert_eq!(record.source, "terraria.wiki.gg");

        assert!(normalizer(5, vec![]).normalize(&json!("text")).is_none());
    }

    #[test]
    fn test_description_and_camel_case_fields() {
        let record = normalizer(2, vec![])
            .normalize(&json!({
                "title": "理想国",
                "description": "柏拉图的对话录",
                "knowledgeType": "WORK",
                "importanceScore": 12,
                "sourceUrl": "https://zh.wikipedia.org/wiki/理想国",
                "tags": ["哲学", "哲学"]
            }))
            .unwrap();
        assert_eq!(record.content, "柏拉图的对话录");
        assert_eq!(record.knowledge_type, "WORK");
        assert_eq!(record.importance_score, 10);
        assert_eq!(record.source_url, "https://zh.wikipedia.org/wiki/理想国");
        assert_eq!(record.tags, vec!["哲学"]);
    }

    #[test]
    fn test_structured_weapon_rendering() {
        let item = json!({
            "武器名": "泰拉刃",
            "属性": {"伤害": "95 近战", "击退": 6.5},
            "合成表": [
                {"产物": "泰拉刃", "材料": ["真永夜刃", "真断钢剑"], "制作站": "秘银砧"},
                {"产物": "测试", "材料": []}
            ],
            "url": "https://terraria.wiki.gg/zh/wiki/泰拉刃"
        });
        let record = normalizer(5, vec![weapon_schema()]).normalize(&item).unwrap();

        assert_eq!(record.title, "泰拉刃");
        assert_eq!(record.knowledge_type, "weapon");
        assert_eq!(record.source_url, "https://terraria.wiki.gg/zh/wiki/泰拉刃");
        assert_eq!(record.tags, vec!["武器"]);
        assert_eq!(
            record.content,
            "【武器名称】泰拉刃\n\
             【属性信息】\n  伤害：95 近战\n  击退：6.5\n\
             【合成配方】\n  制作 泰拉刃：需要 真永夜刃, 真断钢剑（制作站：秘银砧）\n  制作 测试：需要 无材料（制作站：未知）\n\
             【详细信息】https://terraria.wiki.gg/zh/wiki/泰拉刃"
        );
    }

    #[test]
    fn test_list_section() {
        let schema = StructuredSchema {
            title_field: "Boss中文名".into(),
            title_label: "Boss名称".into(),
            knowledge_type: None,
            tags: vec![],
            sections: vec![Section {
                field: "掉落列表".into(),
                label: "掉落物品".into(),
                kind: SectionKind::List,
            }],
        };
        let record = normalizer(5, vec![weapon_schema(), schema])
            .normalize(&json!({"Boss中文名": "克苏鲁之眼", "掉落列表": ["魔矿", "邪恶箭"]}))
            .unwrap();
        assert_eq!(record.content, "【Boss名称】克苏鲁之眼\n【掉落物品】魔矿, 邪恶箭");
        assert_eq!(record.knowledge_type, FALLBACK_KNOWLEDGE_TYPE);
    }
}
