//! Query Router (C6).
//!
//! Three optional, order-applied transformations (synonym expansion, LLM
//! rewrite, LLM decomposition/intent classification), each safe to skip, plus
//! the static intent → [`RetrievalConfig`] lookup table (a startup-computed
//! table, not rebuilt per request).

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use serde::Deserialize;

use crate::config::LlmConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Factual,
    Procedural,
    Recommendation,
    Exploratory,
    Comparison,
    DocumentLookup,
    Contact,
    Schedule,
    Navigational,
}

impl Intent {
    fn parse(s: &str) -> Intent {
        match s {
            "procedural" => Intent::Procedural,
            "recommendation" => Intent::Recommendation,
            "exploratory" => Intent::Exploratory,
            "comparison" => Intent::Comparison,
            "document_lookup" => Intent::DocumentLookup,
            "contact" => Intent::Contact,
            "schedule" => Intent::Schedule,
            "navigational" => Intent::Navigational,
            _ => Intent::Factual,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub threshold: f32,
    pub count: i64,
    pub recency_weight: f32,
    pub authority_weight: f32,
    pub source_boosts: &'static [(&'static str, f32)],
    pub sibling_expansion_count: usize,
    pub source_filter: Option<&'static str>,
}

fn retrieval_table() -> &'static HashMap<Intent, RetrievalConfig> {
    static TABLE: OnceLock<HashMap<Intent, RetrievalConfig>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut m = HashMap::new();
        m.insert(
            Intent::Factual,
            RetrievalConfig {
                threshold: 0.75,
                count: 5,
                recency_weight: 0.05,
                authority_weight: 0.20,
                source_boosts: &[],
                sibling_expansion_count: 0,
                source_filter: None,
            },
        );
        m.insert(
            Intent::Procedural,
            RetrievalConfig {
                threshold: 0.70,
                count: 8,
                recency_weight: 0.05,
                authority_weight: 0.15,
                source_boosts: &[],
                sibling_expansion_count: 3,
                source_filter: None,
            },
        );
        m.insert(
            Intent::Recommendation,
            RetrievalConfig {
                threshold: 0.65,
                count: 10,
                recency_weight: 0.10,
                authority_weight: 0.05,
                source_boosts: &[("local_business", 0.20)],
                sibling_expansion_count: 0,
                source_filter: None,
            },
        );
        m.insert(
            Intent::Exploratory,
            RetrievalConfig {
                threshold: 0.65,
                count: 12,
                recency_weight: 0.25,
                authority_weight: 0.05,
                source_boosts: &[("news", 0.10), ("community", 0.10)],
                sibling_expansion_count: 0,
                source_filter: None,
            },
        );
        m.insert(
            Intent::Comparison,
            RetrievalConfig {
                threshold: 0.67,
                count: 8,
                recency_weight: 0.10,
                authority_weight: 0.10,
                source_boosts: &[],
                sibling_expansion_count: 0,
                source_filter: None,
            },
        );
        m.insert(
            Intent::DocumentLookup,
            RetrievalConfig {
                threshold: 0.73,
                count: 3,
                recency_weight: 0.05,
                authority_weight: 0.25,
                source_boosts: &[],
                sibling_expansion_count: 5,
                source_filter: Some("documents"),
            },
        );
        m.insert(
            Intent::Contact,
            RetrievalConfig {
                threshold: 0.75,
                count: 3,
                recency_weight: 0.05,
                authority_weight: 0.20,
                source_boosts: &[("municipal", 0.15)],
                sibling_expansion_count: 0,
                source_filter: None,
            },
        );
        m.insert(
            Intent::Schedule,
            RetrievalConfig {
                threshold: 0.75,
                count: 5,
                recency_weight: 0.20,
                authority_weight: 0.10,
                source_boosts: &[("municipal", 0.10)],
                sibling_expansion_count: 0,
                source_filter: None,
            },
        );
        m.insert(
            Intent::Navigational,
            RetrievalConfig {
                threshold: 0.75,
                count: 3,
                recency_weight: 0.05,
                authority_weight: 0.15,
                source_boosts: &[("municipal", 0.10)],
                sibling_expansion_count: 0,
                source_filter: None,
            },
        );
        m
    })
}

pub fn retrieval_config_for(intent: Intent) -> &'static RetrievalConfig {
    retrieval_table()
        .get(&intent)
        .unwrap_or_else(|| retrieval_table().get(&Intent::Factual).unwrap())
}

/// A two-tier synonym dictionary: universal terms plus per-tenant overrides.
/// Single-word triggers require word-boundary matching; multi-word triggers use
/// substring matching.
#[derive(Debug, Clone, Default)]
pub struct SynonymDictionary {
    pub universal: Vec<(String, Vec<String>)>,
    pub tenant: Vec<(String, Vec<String>)>,
}

impl SynonymDictionary {
    pub fn default_universal() -> Vec<(String, Vec<String>)> {
        vec![
            ("trash".into(), vec!["garbage".into(), "refuse".into()]),
            ("town hall".into(), vec!["municipal building".into()]),
            ("dmv".into(), vec!["registry of motor vehicles".into(), "rmv".into()]),
        ]
    }

    /// Expands `query`, appending unique expansion terms not already present.
    /// Deterministic — no I/O.
    pub fn expand(&self, query: &str) -> String {
        let lower = query.to_lowercase();
        let mut additions: Vec<String> = Vec::new();

        let mut check = |trigger: &str, expansions: &[String]| {
            let matched = if trigger.contains(' ') {
                lower.contains(trigger)
            } else {
                word_boundary_match(&lower, trigger)
            };
            if matched {
                for term in expansions {
                    if !lower.contains(&term.to_lowercase()) && !additions.contains(term) {
                        additions.push(term.clone());
                    }
                }
            }
        };

        for (trigger, expansions) in self.universal.iter().chain(self.tenant.iter()) {
            check(trigger, expansions);
        }

        if additions.is_empty() {
            query.to_string()
        } else {
            format!("{} {}", query, additions.join(" "))
        }
    }
}

fn word_boundary_match(haystack: &str, needle: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == needle)
}

/// Result of best-effort query rewrite.
pub async fn rewrite(config: &LlmConfig, query: &str) -> Option<String> {
    if !config.is_enabled() {
        return None;
    }
    let timeout = Duration::from_secs(config.rewrite_timeout_secs);
    let system = "You produce an ideal municipal government search query. \
        Respond with only the rewritten query, no explanation.";

    match crate::llm_client::complete(config, system, query, timeout).await {
        Ok(rewritten) => {
            let rewritten = rewritten.trim().to_string();
            if rewritten.is_empty()
                || rewritten.trim().eq_ignore_ascii_case(query.trim())
            {
                None
            } else {
                Some(rewritten)
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "query rewrite failed, proceeding with original query");
            None
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubQuery {
    pub query: String,
    pub intent: String,
    #[serde(default)]
    pub source_hint: Vec<String>,
    #[serde(default)]
    pub priority: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Decomposition {
    pub original_query: String,
    pub is_complex: bool,
    pub sub_queries: Vec<SubQuery>,
    pub strategy: String, // single | parallel | sequential
}

impl Decomposition {
    pub fn single(query: &str) -> Self {
        Self {
            original_query: query.to_string(),
            is_complex: false,
            sub_queries: vec![SubQuery {
                query: query.to_string(),
                intent: "factual".to_string(),
                source_hint: vec!["any".to_string()],
                priority: 0,
            }],
            strategy: "single".to_string(),
        }
    }
}

/// Best-effort decomposition + intent classification. Falls back to a single
/// factual sub-query on failure or timeout.
pub async fn decompose(config: &LlmConfig, query: &str) -> Decomposition {
    if !config.is_enabled() {
        return Decomposition::single(query);
    }

    let system = r#"Classify and, if needed, decompose a municipal government question.
Respond with JSON only: {"originalQuery": string, "isComplex": bool, "subQueries": [{"query": string, "intent": "factual"|"procedural"|"recommendation"|"exploratory"|"comparison"|"document_lookup"|"contact"|"schedule"|"navigational", "sourceHint": [string], "priority": number}], "strategy": "single"|"parallel"|"sequential"}"#;

    let timeout = Duration::from_secs(config.timeout_secs);
    match crate::llm_client::complete(config, system, query, timeout).await {
        Ok(raw) => match parse_decomposition(&raw) {
            Some(d) => d,
            None => Decomposition::single(query),
        },
        Err(e) => {
            tracing::warn!(error = %e, "query decomposition failed, defaulting to single factual sub-query");
            Decomposition::single(query)
        }
    }
}

fn parse_decomposition(raw: &str) -> Option<Decomposition> {
    #[derive(Deserialize)]
    struct Wire {
        #[serde(rename = "originalQuery")]
        original_query: String,
        #[serde(rename = "isComplex")]
        is_complex: bool,
        #[serde(rename = "subQueries")]
        sub_queries: Vec<WireSub>,
        strategy: String,
    }
    #[derive(Deserialize)]
    struct WireSub {
        query: String,
        intent: String,
        #[serde(rename = "sourceHint", default)]
        source_hint: Vec<String>,
        #[serde(default)]
        priority: i64,
    }

    let wire: Wire = serde_json::from_str(raw.trim()).ok()?;
    if wire.sub_queries.is_empty() {
        return None;
    }
    Some(Decomposition {
        original_query: wire.original_query,
        is_complex: wire.is_complex,
        sub_queries: wire
            .sub_queries
            .into_iter()
            .map(|s| SubQuery {
                query: s.query,
                intent: s.intent,
                source_hint: s.source_hint,
                priority: s.priority,
            })
            .collect(),
        strategy: wire.strategy,
    })
}

pub fn intent_of(sub: &SubQuery) -> Intent {
    Intent::parse(&sub.intent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synonym_expansion_is_deterministic_and_appends_unique_terms() {
        let dict = SynonymDictionary {
            universal: SynonymDictionary::default_universal(),
            tenant: vec![],
        };
        let expanded = dict.expand("trash pickup schedule");
        assert!(expanded.contains("garbage"));
        assert!(expanded.contains("refuse"));
        assert!(expanded.starts_with("trash pickup schedule"));
    }

    #[test]
    fn single_word_trigger_requires_word_boundary() {
        let dict = SynonymDictionary {
            universal: SynonymDictionary::default_universal(),
            tenant: vec![],
        };
        let expanded = dict.expand("untrashable policy");
        assert_eq!(expanded, "untrashable policy");
    }

    #[test]
    fn decomposition_defaults_to_single_factual() {
        let d = Decomposition::single("where is the dump");
        assert_eq!(d.sub_queries.len(), 1);
        assert_eq!(d.sub_queries[0].intent, "factual");
        assert_eq!(d.strategy, "single");
    }

    #[test]
    fn retrieval_table_has_all_intents() {
        for intent in [
            Intent::Factual,
            Intent::Procedural,
            Intent::Recommendation,
            Intent::Exploratory,
            Intent::Comparison,
            Intent::DocumentLookup,
            Intent::Contact,
            Intent::Schedule,
            Intent::Navigational,
        ] {
            let cfg = retrieval_config_for(intent);
            assert!(cfg.threshold > 0.0);
        }
    }
}
