//! Post-import presence and isolation checks

use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

use crate::config::DomainConfig;
use crate::http::{RagClient, SearchHit, SearchRequest};
use crate::knowledge::CharacterId;

const TOP_K: usize = 3;

/// Outcome of a single check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Passed,
    Failed(String),
    /// The backend could not be asked; not counted as a failure
    Inconclusive(String),
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub domain: String,
    pub query: String,
    pub status: CheckStatus,
}

#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    pub presence: Vec<CheckResult>,
    pub isolation: Vec<CheckResult>,
}

impl VerificationReport {
    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.presence
            .iter()
            .chain(&self.isolation)
            .filter(|check| matches!(check.status, CheckStatus::Failed(_)))
    }

    pub fn passed(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Titles of results that belong to another domain.
///
/// A hit leaks when it carries a different character id, or when its title
/// was imported only under other domains.
pub fn find_leaks(
    scope: CharacterId,
    hits: &[SearchHit],
    own_titles: &HashSet<String>,
    foreign_titles: &HashSet<String>,
) -> Vec<String> {
    hits.iter()
        .filter(|hit| {
            let other_id = hit.character_id.is_some_and(|id| id != scope.get());
            let foreign_title =
                foreign_titles.contains(&hit.title) && !own_titles.contains(&hit.title);
            other_id || foreign_title
        })
        .map(|hit| match hit.character_id {
            Some(id) => format!("{} (character {})", hit.title, id),
            None => hit.title.clone(),
        })
        .collect()
}

/// Runs search queries against the backend to confirm an import
#[derive(Debug)]
pub struct Verifier<'a> {
    client: &'a RagClient,
}

impl<'a> Verifier<'a> {
    pub fn new(client: &'a RagClient) -> Self {
        Self { client }
    }

    /// Check every domain; `imported` maps each id to the titles imported for it
    pub async fn verify(
        &self,
        domains: &[DomainConfig],
        imported: &BTreeMap<CharacterId, Vec<String>>,
    ) -> VerificationReport {
        let mut report = VerificationReport::default();

        for domain in domains {
            let profile = &domain.domain;
            let queries = if domain.import.presence_queries.is_empty() {
                vec![profile.name.clone()]
            } else {
                domain.import.presence_queries.clone()
            };
            for query in queries {
                let status = self.presence(profile.character_id, &query).await;
                report.presence.push(CheckResult {
                    domain: profile.name.clone(),
                    query,
                    status,
                });
            }
        }

        for domain in domains {
            let profile = &domain.domain;
            let own: HashSet<String> = imported
                .get(&profile.character_id)
                .map(|titles| titles.iter().cloned().collect())
                .unwrap_or_default();
            let foreign: HashSet<String> = imported
                .iter()
                .filter(|(id, _)| **id != profile.character_id)
                .flat_map(|(_, titles)| titles.iter().cloned())
                .collect();

            for query in &domain.import.isolation_probes {
                let request = SearchRequest::new(profile.character_id, query.clone(), TOP_K);
                let status = match self.client.search(&request).await {
                    Ok(response) => {
                        let leaks =
                            find_leaks(profile.character_id, &response.results, &own, &foreign);
                        if leaks.is_empty() {
                            CheckStatus::Passed
                        } else {
                            warn!(
                                "Cross-domain results for '{}' under {}: {}",
                                query,
                                profile.name,
                                leaks.join(", ")
                            );
                            CheckStatus::Failed(leaks.join(", "))
                        }
                    }
                    Err(e) => CheckStatus::Inconclusive(e.to_string()),
                };
                report.isolation.push(CheckResult {
                    domain: profile.name.clone(),
                    query: query.clone(),
                    status,
                });
            }
        }

        info!(
            "Verification: {} presence checks, {} isolation checks, {} failures",
            report.presence.len(),
            report.isolation.len(),
            report.failures().count()
        );
        report
    }

    async fn presence(&self, character_id: CharacterId, query: &str) -> CheckStatus {
        let request = SearchRequest::new(character_id, query, TOP_K);
        match self.client.search(&request).await {
            Ok(response) if response.hit_count() > 0 => CheckStatus::Passed,
            Ok(_) => CheckStatus::Failed("no results".to_string()),
            Err(e) => CheckStatus::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn hit(title: &str, id: Option<u32>) -> SearchHit {
        SearchHit {
            title: title.to_string(),
            character_id: id,
            content: String::new(),
        }
    }

    fn titles(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_find_leaks() {
        let own = titles(&["相对论"]);
        let foreign = titles(&["魁地奇", "相对论"]);
        let hits = vec![
            hit("相对论", Some(3)),
            hit("魁地奇", None),
            hit("申辩篇", Some(2)),
            hit("光电效应", None),
        ];
        let leaks = find_leaks(CharacterId::new(3), &hits, &own, &foreign);
        assert_eq!(leaks, vec!["魁地奇", "申辩篇 (character 2)"]);
    }

    fn domain(id: u32, name: &str, probes: &[&str]) -> DomainConfig {
        let text = format!(
            r#"
            [domain]
            character_id = {id}
            name = "{name}"
            slug = "d{id}"

            [import]
            isolation_probes = {probes:?}
            "#
        );
        toml::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_verify_presence_and_isolation() {
        let mut server = Server::new_async().await;
        let einstein_presence = server
            .mock("POST", "/api/knowledge/search")
            .match_body(Matcher::PartialJson(
                serde_json::json!({"characterId": 3, "query": "爱因斯坦"}),
            ))
            .with_status(200)
            .with_body(r#"{"count": 1, "results": [{"title": "相对论", "character_id": 3}]}"#)
            .create_async()
            .await;
        let harry_presence = server
            .mock("POST", "/api/knowledge/search")
            .match_body(Matcher::PartialJson(
                serde_json::json!({"characterId": 1, "query": "哈利波特"}),
            ))
            .with_status(200)
            .with_body(r#"{"count": 0, "results": []}"#)
            .create_async()
            .await;
        let isolation = server
            .mock("POST", "/api/knowledge/search")
            .match_body(Matcher::PartialJson(
                serde_json::json!({"characterId": 3, "query": "魔法"}),
            ))
            .with_status(200)
            .with_body(r#"{"knowledge_list": [{"title": "魁地奇"}]}"#)
            .create_async()
            .await;

        let domains = vec![domain(3, "爱因斯坦", &["魔法"]), domain(1, "哈利波特", &[])];
        let imported = BTreeMap::from([
            (CharacterId::new(3), vec!["相对论".to_string()]),
            (CharacterId::new(1), vec!["魁地奇".to_string()]),
        ]);

        let client = RagClient::new(server.url()).unwrap();
        let report = Verifier::new(&client).verify(&domains, &imported).await;

        assert_eq!(report.presence.len(), 2);
        assert_eq!(report.presence[0].status, CheckStatus::Passed);
        assert!(matches!(report.presence[1].status, CheckStatus::Failed(_)));
        assert_eq!(report.isolation.len(), 1);
        assert_eq!(report.isolation[0].status, CheckStatus::Failed("魁地奇".to_string()));
        assert!(!report.passed());

        einstein_presence.assert_async().await;
        harry_presence.assert_async().await;
        isolation.assert_async().await;
    }
}
