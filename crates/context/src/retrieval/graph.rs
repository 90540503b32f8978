//! Knowledge-graph retrieval
//!
//! Entities mentioned in the question are extracted by the language model,
//! looked up with a fuzzy full-text query against the tenant-namespaced
//! entity index, and expanded to their direct relationship neighbourhood.
//! The result is plain `subject - RELATION -> object` lines.

use super::store_call;
use crate::prompts::{self, PromptKind};
use async_trait::async_trait;
use hybridrag_common::config::GraphConfig;
use hybridrag_common::errors::{AppError, Result};
use hybridrag_common::tenant::NAMESPACE_SEPARATOR;
use hybridrag_common::{LanguageModel, ModelFamily};
use neo4rs::{query, ConfigBuilder, Graph};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Characters with meaning in Lucene query syntax
const LUCENE_SPECIAL_CHARS: &[char] = &[
    '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\', '/',
];

/// One fuzzy neighbourhood lookup
#[derive(Debug, Clone)]
pub struct NeighborQuery<'a> {
    /// Full-text index over entity ids
    pub index: &'a str,
    /// Tenant prefix every returned entity must carry, e.g. `acme::`
    pub namespace: &'a str,
    /// Lucene query string
    pub query: &'a str,
    /// Best-scoring in-namespace nodes kept
    pub match_limit: usize,
    /// Relationship rows returned
    pub row_limit: usize,
}

/// Read access to the knowledge graph
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create the entity full-text index if it does not exist
    async fn ensure_fulltext_index(&self, index: &str) -> Result<()>;

    /// Relationship triples around the nodes matching a full-text query.
    /// Edges of the `MENTIONS` provenance type are never traversed.
    async fn fuzzy_neighbor_query(&self, request: &NeighborQuery<'_>) -> Result<Vec<String>>;

    /// Connectivity check
    async fn ping(&self) -> Result<()>;
}

/// Replace Lucene operators with spaces
pub fn remove_lucene_chars(text: &str) -> String {
    text.chars()
        .map(|c| if LUCENE_SPECIAL_CHARS.contains(&c) { ' ' } else { c })
        .collect()
}

/// Fuzzy full-text query: every token gets an edit distance of 2, tokens are
/// AND-ed. `None` when nothing searchable is left.
pub fn build_fulltext_query(input: &str) -> Option<String> {
    let cleaned = remove_lucene_chars(input);
    let terms: Vec<String> = cleaned
        .split_whitespace()
        .map(|word| format!("{}~2", word))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" AND "))
    }
}

/// Entity id in the shared graph: `tenant::` followed by the entity name as is
pub fn namespace_entity(tenant: &str, entity: &str) -> String {
    format!("{}{}{}", tenant, NAMESPACE_SEPARATOR, entity)
}

/// Reverses entity namespacing on relationship lines
pub struct Denamespacer {
    pattern: regex_lite::Regex,
}

impl Denamespacer {
    pub fn new(tenant: &str) -> Result<Self> {
        let prefix = regex_lite::escape(&format!("{}{}", tenant, NAMESPACE_SEPARATOR));
        let pattern = regex_lite::Regex::new(&format!(r"^{p}(.+) - (.+) -> {p}(.+)$", p = prefix))
            .map_err(|e| AppError::Internal {
                message: format!("invalid namespace pattern: {}", e),
            })?;
        Ok(Self { pattern })
    }

    /// `acme::Jane Doe - CEO_OF -> acme::Acme Corp` becomes
    /// `Jane Doe - CEO_OF -> Acme Corp`. Only the tenant prefix is removed.
    /// Lines outside the namespace are returned unchanged.
    pub fn strip(&self, line: &str) -> String {
        match self.pattern.captures(line) {
            Some(caps) => format!("{} - {} -> {}", &caps[1], &caps[2], &caps[3]),
            None => line.to_string(),
        }
    }
}

/// Parse the extraction reply: a JSON list of strings, or an object whose
/// first list-of-strings field holds the entities.
pub fn parse_entities(reply: &serde_json::Value) -> Result<Vec<String>> {
    let list = match reply {
        serde_json::Value::Array(items) => Some(items),
        serde_json::Value::Object(fields) => fields.values().find_map(|v| match v {
            serde_json::Value::Array(items) if items.iter().all(|i| i.is_string()) => Some(items),
            _ => None,
        }),
        _ => None,
    };

    let list = list.ok_or_else(|| AppError::Extraction {
        message: format!("expected a JSON list of entities, got {}", reply),
    })?;

    Ok(list
        .iter()
        .filter_map(|item| item.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Limits for one graph retrieval
#[derive(Debug, Clone)]
pub struct GraphSearchSettings {
    pub index: String,
    pub match_limit: usize,
    pub row_limit: usize,
    pub timeout: Duration,
}

pub struct GraphRetriever {
    store: Arc<dyn GraphStore>,
    llm: Arc<dyn LanguageModel>,
    family: ModelFamily,
    settings: GraphSearchSettings,
}

impl GraphRetriever {
    pub fn new(
        store: Arc<dyn GraphStore>,
        llm: Arc<dyn LanguageModel>,
        family: ModelFamily,
        settings: GraphSearchSettings,
    ) -> Self {
        Self {
            store,
            llm,
            family,
            settings,
        }
    }

    /// Ask the model for the entities named in a question
    pub async fn extract_entities(&self, question: &str) -> Result<Vec<String>> {
        let prompt = prompts::render(
            PromptKind::ExtractEntities,
            self.family,
            &[("question", question)],
        );

        let reply = self
            .llm
            .complete_json(&prompt)
            .await
            .map_err(|e| AppError::Extraction {
                message: e.to_string(),
            })?;

        parse_entities(&reply)
    }

    /// Relationship neighbourhood of the entities in `question`, one triple
    /// per line. Extraction failures and single-entity query failures
    /// degrade to fewer lines; an unreachable store is an error.
    pub async fn retrieve(&self, tenant: &str, question: &str) -> Result<String> {
        let entities = match self.extract_entities(question).await {
            Ok(entities) => entities,
            Err(e) => {
                warn!(
                    tenant,
                    error = %e,
                    "Entity extraction failed, continuing without graph context"
                );
                return Ok(String::new());
            }
        };
        debug!(tenant, ?entities, "Extracted entities");

        let namespace = format!("{}{}", tenant, NAMESPACE_SEPARATOR);
        let denamespacer = Denamespacer::new(tenant)?;
        let mut seen = HashSet::new();
        let mut lines = Vec::new();

        for entity in &entities {
            let Some(fulltext) = build_fulltext_query(&namespace_entity(tenant, entity)) else {
                debug!(tenant, entity = %entity, "Entity has no searchable terms");
                continue;
            };

            let request = NeighborQuery {
                index: &self.settings.index,
                namespace: &namespace,
                query: &fulltext,
                match_limit: self.settings.match_limit,
                row_limit: self.settings.row_limit,
            };

            let rows = match store_call(
                "graph",
                self.settings.timeout,
                self.store.fuzzy_neighbor_query(&request),
            )
            .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    self.ensure_reachable().await?;
                    warn!(
                        tenant,
                        entity = %entity,
                        error = %e,
                        "Graph query failed for entity, skipping"
                    );
                    continue;
                }
            };

            debug!(tenant, entity = %entity, rows = rows.len(), "Graph neighbourhood");
            for row in rows.into_iter().take(self.settings.row_limit) {
                let line = denamespacer.strip(&row);
                if seen.insert(line.clone()) {
                    lines.push(line);
                }
            }
        }

        Ok(lines.join("\n"))
    }

    async fn ensure_reachable(&self) -> Result<()> {
        store_call("graph", self.settings.timeout, self.store.ping())
            .await
            .map_err(|e| AppError::retrieval("graph", format!("graph store unreachable: {}", e)))
    }
}

const NEIGHBORHOOD_QUERY: &str = "\
CALL db.index.fulltext.queryNodes($index, $query)
YIELD node, score
WHERE node.id STARTS WITH $namespace
WITH node, score
ORDER BY score DESC
LIMIT $match_limit
CALL {
  WITH node
  MATCH (node)-[r:!MENTIONS]->(neighbor)
  WHERE neighbor.id STARTS WITH $namespace
  RETURN node.id + ' - ' + type(r) + ' -> ' + neighbor.id AS output
  UNION ALL
  WITH node
  MATCH (node)<-[r:!MENTIONS]-(neighbor)
  WHERE neighbor.id STARTS WITH $namespace
  RETURN neighbor.id + ' - ' + type(r) + ' -> ' + node.id AS output
}
RETURN output LIMIT $row_limit";

/// Neo4j-backed graph store
pub struct Neo4jGraphStore {
    graph: Arc<Graph>,
}

impl Neo4jGraphStore {
    /// Connect and verify the connection
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        info!(uri = %config.uri, database = %config.database, "Connecting to Neo4j");

        let neo4j_config = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.username.as_str())
            .password(config.password.as_str())
            .db(config.database.as_str())
            .fetch_size(500)
            .max_connections(config.max_connections)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Invalid Neo4j configuration: {}", e),
            })?;

        let graph = Graph::connect(neo4j_config).await?;
        let store = Self {
            graph: Arc::new(graph),
        };
        store.ping().await?;

        info!("Neo4j connection established");
        Ok(store)
    }
}

fn valid_index_name(index: &str) -> bool {
    !index.is_empty() && index.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn ensure_fulltext_index(&self, index: &str) -> Result<()> {
        if !valid_index_name(index) {
            return Err(AppError::Configuration {
                message: format!("invalid full-text index name '{}'", index),
            });
        }

        let cypher = format!(
            "CREATE FULLTEXT INDEX {} IF NOT EXISTS FOR (e:__Entity__) ON EACH [e.id]",
            index
        );
        self.graph.run(query(&cypher)).await?;
        debug!(index, "Entity full-text index ensured");
        Ok(())
    }

    async fn fuzzy_neighbor_query(&self, request: &NeighborQuery<'_>) -> Result<Vec<String>> {
        let mut result = self
            .graph
            .execute(
                query(NEIGHBORHOOD_QUERY)
                    .param("index", request.index)
                    .param("query", request.query)
                    .param("namespace", request.namespace)
                    .param("match_limit", request.match_limit as i64)
                    .param("row_limit", request.row_limit as i64),
            )
            .await?;

        let mut rows = Vec::new();
        while let Some(row) = result.next().await? {
            let output: String = row
                .get("output")
                .map_err(|e| AppError::retrieval("graph", format!("unexpected row: {}", e)))?;
            rows.push(output);
        }
        Ok(rows)
    }

    async fn ping(&self) -> Result<()> {
        let mut result = self.graph.execute(query("RETURN 1 AS ok")).await?;
        result.next().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{needles, InMemoryGraphStore, ScriptedModel};

    fn settings() -> GraphSearchSettings {
        GraphSearchSettings {
            index: "entity".into(),
            match_limit: 2,
            row_limit: 50,
            timeout: Duration::from_secs(5),
        }
    }

    fn acme_graph() -> InMemoryGraphStore {
        InMemoryGraphStore::new()
            .with_edge("acme::Jane Doe", "CEO_OF", "acme::Acme Corp")
            .with_edge("acme::Acme Corp", "LOCATED_IN", "acme::Berlin")
            .with_edge("acme::Jane Doe", "MENTIONS", "acme::Doc 1")
            .with_edge("globex::Jane Doe", "CEO_OF", "globex::Globex")
    }

    #[test]
    fn test_fulltext_query_one_marker_per_token() {
        assert_eq!(
            build_fulltext_query("acme::Jane-Doe").as_deref(),
            Some("acme~2 AND Jane~2 AND Doe~2")
        );
        assert_eq!(build_fulltext_query("Berlin").as_deref(), Some("Berlin~2"));

        let query = build_fulltext_query("  New   York (City)? ").unwrap();
        assert_eq!(query, "New~2 AND York~2 AND City~2");
        assert_eq!(query.matches("~2").count(), 3);
        assert!(!query.ends_with("AND"));
    }

    #[test]
    fn test_fulltext_query_empty_input() {
        assert_eq!(build_fulltext_query(""), None);
        assert_eq!(build_fulltext_query(" :: - ?"), None);
    }

    #[test]
    fn test_namespace_round_trip() {
        let denamespacer = Denamespacer::new("acme").unwrap();

        for (subject, relation, object) in [
            ("Jane Doe", "CEO_OF", "Acme Corp"),
            ("Berlin", "CAPITAL_OF", "Germany"),
            ("Acme Research and Development", "PART_OF", "Acme"),
            ("Coca-Cola", "MAKES", "Sprite"),
            ("Jean-Luc  Picard", "CAPTAIN_OF", "USS  Enterprise-D"),
            ("Rolls - Royce", "BASED_IN", "Derby"),
        ] {
            let line = format!(
                "{} - {} -> {}",
                namespace_entity("acme", subject),
                relation,
                namespace_entity("acme", object)
            );
            assert_eq!(
                denamespacer.strip(&line),
                format!("{} - {} -> {}", subject, relation, object)
            );
        }
    }

    #[test]
    fn test_strip_ignores_foreign_namespace() {
        let denamespacer = Denamespacer::new("acme").unwrap();
        let foreign = "globex::Jane Doe - CEO_OF -> globex::Globex";
        assert_eq!(denamespacer.strip(foreign), foreign);

        // Tenant names are matched literally
        let dotted = Denamespacer::new("a.b").unwrap();
        assert_eq!(dotted.strip("axb::X - R -> axb::Y"), "axb::X - R -> axb::Y");
        assert_eq!(dotted.strip("a.b::X - R -> a.b::Y"), "X - R -> Y");
    }

    #[test]
    fn test_parse_entities() {
        let list = parse_entities(&serde_json::json!(["Jane Doe", " Acme ", ""])).unwrap();
        assert_eq!(list, vec!["Jane Doe", "Acme"]);

        let wrapped = parse_entities(&serde_json::json!({"entities": ["Berlin"]})).unwrap();
        assert_eq!(wrapped, vec!["Berlin"]);

        assert!(matches!(
            parse_entities(&serde_json::json!({"score": "yes"})),
            Err(AppError::Extraction { .. })
        ));
        assert!(parse_entities(&serde_json::json!("Berlin")).is_err());
    }

    #[tokio::test]
    async fn test_retrieve_returns_denamespaced_neighbourhood() {
        let store = Arc::new(acme_graph());
        let llm = Arc::new(ScriptedModel::new().on(needles::EXTRACT, &[r#"["Jane Doe"]"#]));
        let retriever = GraphRetriever::new(store.clone(), llm, ModelFamily::Other, settings());

        let relationships = retriever.retrieve("acme", "Who is Jane Doe?").await.unwrap();

        assert_eq!(relationships, "Jane Doe - CEO_OF -> Acme Corp");
        assert_eq!(store.queries(), vec!["acme~2 AND Jane~2 AND Doe~2".to_string()]);
    }

    #[tokio::test]
    async fn test_retrieve_concatenates_entities_without_duplicates() {
        let store = Arc::new(acme_graph());
        let llm = Arc::new(
            ScriptedModel::new().on(needles::EXTRACT, &[r#"["Jane Doe", "Acme Corp"]"#]),
        );
        let retriever = GraphRetriever::new(store, llm, ModelFamily::Other, settings());

        let relationships = retriever.retrieve("acme", "Where does Jane Doe work?").await.unwrap();
        let lines: Vec<&str> = relationships.lines().collect();

        assert_eq!(
            lines,
            vec!["Jane Doe - CEO_OF -> Acme Corp", "Acme Corp - LOCATED_IN -> Berlin"]
        );
    }

    #[tokio::test]
    async fn test_extraction_failure_degrades_to_empty() {
        let store = Arc::new(acme_graph());
        let llm = Arc::new(ScriptedModel::new().on(needles::EXTRACT, &["Jane Doe, obviously"]));
        let retriever = GraphRetriever::new(store.clone(), llm, ModelFamily::Other, settings());

        let relationships = retriever.retrieve("acme", "Who is Jane Doe?").await.unwrap();

        assert_eq!(relationships, "");
        assert!(store.queries().is_empty());
    }

    #[tokio::test]
    async fn test_single_entity_failure_is_skipped() {
        let store = Arc::new(acme_graph().failing_for("Berlin"));
        let llm = Arc::new(
            ScriptedModel::new().on(needles::EXTRACT, &[r#"["Berlin", "Jane Doe"]"#]),
        );
        let retriever = GraphRetriever::new(store, llm, ModelFamily::Other, settings());

        let relationships = retriever.retrieve("acme", "Berlin and Jane Doe?").await.unwrap();

        assert_eq!(relationships, "Jane Doe - CEO_OF -> Acme Corp");
    }

    #[tokio::test]
    async fn test_unreachable_store_is_fatal() {
        let store = Arc::new(acme_graph().unreachable());
        let llm = Arc::new(ScriptedModel::new().on(needles::EXTRACT, &[r#"["Jane Doe"]"#]));
        let retriever = GraphRetriever::new(store, llm, ModelFamily::Other, settings());

        let result = retriever.retrieve("acme", "Who is Jane Doe?").await;

        assert!(matches!(result, Err(AppError::Retrieval { .. })));
    }

    #[tokio::test]
    async fn test_no_entities_means_no_queries() {
        let store = Arc::new(acme_graph());
        let llm = Arc::new(ScriptedModel::new().on(needles::EXTRACT, &["[]"]));
        let retriever = GraphRetriever::new(store.clone(), llm, ModelFamily::Llama, settings());

        assert_eq!(retriever.retrieve("acme", "Hello there").await.unwrap(), "");
        assert!(store.queries().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_tenants_do_not_crowd_out_matches() {
        // Other tenants' near-identical ids score better than ours
        let store = Arc::new(
            InMemoryGraphStore::new()
                .with_edge("acne::Jane Doe", "CEO_OF", "acne::Acne Labs")
                .with_edge("acmes::Jane Doe", "CEO_OF", "acmes::Acmes Inc")
                .with_edge("acme::Janet Does", "CEO_OF", "acme::Acme Corp"),
        );
        let llm = Arc::new(ScriptedModel::new().on(needles::EXTRACT, &[r#"["Jane Doe"]"#]));
        let retriever = GraphRetriever::new(store, llm, ModelFamily::Other, settings());

        let relationships = retriever.retrieve("acme", "Who is Jane Doe?").await.unwrap();

        assert_eq!(relationships, "Janet Does - CEO_OF -> Acme Corp");
    }

    #[test]
    fn test_namespace_filter_precedes_match_limit() {
        let filter = NEIGHBORHOOD_QUERY.find("WHERE node.id STARTS WITH $namespace").unwrap();
        let limit = NEIGHBORHOOD_QUERY.find("LIMIT $match_limit").unwrap();
        assert!(filter < limit);
        assert!(!NEIGHBORHOOD_QUERY.contains("{limit: $match_limit}"));
    }

    #[tokio::test]
    async fn test_match_and_row_limits() {
        let mut graph = InMemoryGraphStore::new()
            .with_edge("acme::Jane Doe Sr", "PARENT_OF", "acme::Jane Doe")
            .with_edge("acme::Jane Doe Jr", "STUDIES_AT", "acme::Oxford");
        for i in 0..60 {
            graph = graph.with_edge("acme::Jane Doe", "OWNS", &format!("acme::Asset {}", i));
        }
        let store = Arc::new(graph);
        let llm = Arc::new(ScriptedModel::new().on(needles::EXTRACT, &[r#"["Jane Doe"]"#]));
        let retriever = GraphRetriever::new(store.clone(), llm, ModelFamily::Other, settings());

        let relationships = retriever.retrieve("acme", "What does Jane Doe own?").await.unwrap();
        let lines: Vec<&str> = relationships.lines().collect();

        assert_eq!(store.limits(), vec![(2, 50)]);
        assert_eq!(lines.len(), 50);
        // Only the two best matches are expanded
        assert!(!relationships.contains("Oxford"));
        assert!(lines.contains(&"Jane Doe Sr - PARENT_OF -> Jane Doe"));
    }

    #[tokio::test]
    async fn test_rows_capped_when_store_ignores_limit() {
        let mut graph = InMemoryGraphStore::new().ignoring_row_limit();
        for i in 0..60 {
            graph = graph.with_edge(
                "acme::Berlin",
                "HAS_DISTRICT",
                &format!("acme::District {}", i),
            );
        }
        let llm = Arc::new(ScriptedModel::new().on(needles::EXTRACT, &[r#"["Berlin"]"#]));
        let retriever = GraphRetriever::new(Arc::new(graph), llm, ModelFamily::Other, settings());

        let relationships = retriever.retrieve("acme", "Berlin districts?").await.unwrap();

        assert_eq!(relationships.lines().count(), 50);
    }

    #[test]
    fn test_index_name_validation() {
        assert!(valid_index_name("entity"));
        assert!(valid_index_name("tenant_entities_2"));
        assert!(!valid_index_name("entity; DROP"));
        assert!(!valid_index_name(""));
    }
}
