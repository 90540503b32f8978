//! In-process test doubles for the workflow collaborators

use crate::memory::ConversationState;
use crate::retrieval::{Document, GraphStore, NeighborQuery, VectorStore, VectorStoreFactory};
use crate::service::{ModelFactory, SessionStore};
use async_trait::async_trait;
use hybridrag_common::errors::{AppError, Result};
use hybridrag_common::llm::{parse_json_reply, TenantModels};
use hybridrag_common::{Embedder, LanguageModel, LlmProvider, TenantProfile};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Phrases that identify each prompt kind
pub mod needles {
    pub const REFORM: &str = "Follow up input";
    pub const SUMMARIZE: &str = "Progressively summarize";
    pub const EXTRACT: &str = "You extract named entities";
    pub const RELEVANCE: &str = "retrieved document is relevant";
    pub const HALLUCINATION: &str = "grounded in and supported";
    pub const USEFULNESS: &str = "answer resolves a question";
    pub const GROUNDED: &str = "using the context below";
    pub const FALLBACK: &str = "conversation summary and the recent";
}

struct Rule {
    needle: String,
    replies: VecDeque<String>,
    fail: bool,
}

/// Language model answering from a script keyed by prompt content.
///
/// The first rule whose needle occurs in the prompt answers. Replies are
/// consumed in order and the last one repeats. Unmatched prompts fail.
#[derive(Default)]
pub struct ScriptedModel {
    rules: Mutex<Vec<Rule>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, needle: &str, replies: &[&str]) -> Self {
        self.push_rule(Rule {
            needle: needle.to_string(),
            replies: replies.iter().map(|r| r.to_string()).collect(),
            fail: false,
        })
    }

    pub fn failing_on(self, needle: &str) -> Self {
        self.push_rule(Rule {
            needle: needle.to_string(),
            replies: VecDeque::new(),
            fail: true,
        })
    }

    fn push_rule(self, rule: Rule) -> Self {
        self.rules.lock().unwrap().push(rule);
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, needle: &str) -> usize {
        self.prompts_matching(needle).len()
    }

    pub fn prompts_matching(&self, needle: &str) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let mut rules = self.rules.lock().unwrap();
        let rule = rules
            .iter_mut()
            .find(|r| prompt.contains(&r.needle))
            .ok_or_else(|| AppError::LanguageModel {
                provider: "scripted".into(),
                message: "no scripted reply for prompt".into(),
            })?;

        if rule.fail {
            return Err(AppError::LanguageModel {
                provider: "scripted".into(),
                message: format!("scripted failure on '{}'", rule.needle),
            });
        }

        let reply = if rule.replies.len() > 1 {
            rule.replies.pop_front()
        } else {
            rule.replies.front().cloned()
        };
        reply.ok_or_else(|| AppError::LanguageModel {
            provider: "scripted".into(),
            message: format!("no replies left for '{}'", rule.needle),
        })
    }

    async fn complete_json(&self, prompt: &str) -> Result<serde_json::Value> {
        let reply = self.complete(prompt).await?;
        parse_json_reply(&reply)
    }

    fn provider(&self) -> LlmProvider {
        LlmProvider::Ollama
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Embedder returning a fixed-size vector derived from the text bytes
pub struct StaticEmbedder;

#[async_trait]
impl Embedder for StaticEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; 8];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % 8] += byte as f32 / 255.0;
        }
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn model_name(&self) -> &str {
        "static"
    }

    fn dimension(&self) -> usize {
        8
    }
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.iter().enumerate() {
        let mut row = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            row[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(row[j] + 1);
        }
        prev = row;
    }
    prev[b.len()]
}

fn id_terms(id: &str) -> Vec<String> {
    id.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Knowledge graph held as `(subject, relation, object)` id triples.
///
/// Fuzzy matching mirrors `term~2 AND term~2`: every query term must be
/// within two edits of some term of the node id.
#[derive(Default)]
pub struct InMemoryGraphStore {
    edges: Vec<(String, String, String)>,
    failing_for: Option<String>,
    unreachable: bool,
    ignore_row_limit: bool,
    queries: Mutex<Vec<String>>,
    limits: Mutex<Vec<(usize, usize)>>,
    indexes: Mutex<Vec<String>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_edge(mut self, subject: &str, relation: &str, object: &str) -> Self {
        self.edges
            .push((subject.to_string(), relation.to_string(), object.to_string()));
        self
    }

    /// Fail queries containing `fragment`
    pub fn failing_for(mut self, fragment: &str) -> Self {
        self.failing_for = Some(fragment.to_string());
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Return every neighbourhood row regardless of `row_limit`
    pub fn ignoring_row_limit(mut self) -> Self {
        self.ignore_row_limit = true;
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    /// `(match_limit, row_limit)` of each query
    pub fn limits(&self) -> Vec<(usize, usize)> {
        self.limits.lock().unwrap().clone()
    }

    pub fn indexes(&self) -> Vec<String> {
        self.indexes.lock().unwrap().clone()
    }

    fn nodes(&self) -> Vec<&str> {
        let mut nodes: Vec<&str> = Vec::new();
        for (s, _, o) in &self.edges {
            for id in [s.as_str(), o.as_str()] {
                if !nodes.contains(&id) {
                    nodes.push(id);
                }
            }
        }
        nodes
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn ensure_fulltext_index(&self, index: &str) -> Result<()> {
        if self.unreachable {
            return Err(AppError::retrieval("graph", "connection refused"));
        }
        self.indexes.lock().unwrap().push(index.to_string());
        Ok(())
    }

    async fn fuzzy_neighbor_query(&self, request: &NeighborQuery<'_>) -> Result<Vec<String>> {
        self.queries.lock().unwrap().push(request.query.to_string());
        self.limits
            .lock()
            .unwrap()
            .push((request.match_limit, request.row_limit));

        if self.unreachable {
            return Err(AppError::retrieval("graph", "connection refused"));
        }
        if let Some(fragment) = &self.failing_for {
            if request.query.contains(fragment.as_str()) {
                return Err(AppError::retrieval("graph", "query failed"));
            }
        }

        let terms: Vec<String> = request
            .query
            .split(" AND ")
            .map(|t| t.trim_end_matches("~2").to_lowercase())
            .collect();

        // Closest ids first, then the tenant filter, then the limit
        let mut scored: Vec<(usize, &str)> = self
            .nodes()
            .into_iter()
            .filter_map(|id| {
                let id_terms = id_terms(id);
                let distances: Option<Vec<usize>> = terms
                    .iter()
                    .map(|term| {
                        id_terms
                            .iter()
                            .map(|t| edit_distance(term, t))
                            .filter(|d| *d <= 2)
                            .min()
                    })
                    .collect();
                distances.map(|d| (d.iter().sum(), id))
            })
            .collect();
        scored.sort_by_key(|(distance, _)| *distance);

        let matched: Vec<&str> = scored
            .into_iter()
            .map(|(_, id)| id)
            .filter(|id| id.starts_with(request.namespace))
            .take(request.match_limit)
            .collect();

        let mut rows = Vec::new();
        for node in matched {
            for (s, r, o) in &self.edges {
                if s == node && r != "MENTIONS" && o.starts_with(request.namespace) {
                    rows.push(format!("{} - {} -> {}", s, r, o));
                }
            }
            for (s, r, o) in &self.edges {
                if o == node && r != "MENTIONS" && s.starts_with(request.namespace) {
                    rows.push(format!("{} - {} -> {}", s, r, o));
                }
            }
        }
        if !self.ignore_row_limit {
            rows.truncate(request.row_limit);
        }
        Ok(rows)
    }

    async fn ping(&self) -> Result<()> {
        if self.unreachable {
            Err(AppError::retrieval("graph", "connection refused"))
        } else {
            Ok(())
        }
    }
}

/// Vector index returning its documents in insertion order
#[derive(Clone, Default)]
pub struct InMemoryVectorStore {
    documents: Arc<Vec<Document>>,
    failing: bool,
    searches: Arc<Mutex<Vec<(String, usize)>>>,
    tenants: Arc<Mutex<Vec<Uuid>>>,
}

impl InMemoryVectorStore {
    pub fn new(contents: &[&str]) -> Self {
        Self {
            documents: Arc::new(contents.iter().map(|c| Document::new(*c)).collect()),
            ..Default::default()
        }
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn searches(&self) -> Vec<(String, usize)> {
        self.searches.lock().unwrap().clone()
    }

    pub fn tenants(&self) -> Vec<Uuid> {
        self.tenants.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        self.searches.lock().unwrap().push((query.to_string(), k));
        if self.failing {
            return Err(AppError::retrieval("vector", "connection refused"));
        }
        Ok(self.documents.iter().take(k).cloned().collect())
    }
}

impl VectorStoreFactory for InMemoryVectorStore {
    fn for_tenant(&self, tenant_id: Uuid, _embedder: Arc<dyn Embedder>) -> Arc<dyn VectorStore> {
        self.tenants.lock().unwrap().push(tenant_id);
        Arc::new(self.clone())
    }
}

/// Tenant and conversation storage in maps
#[derive(Default)]
pub struct InMemorySessionStore {
    tenants: Mutex<HashMap<String, TenantProfile>>,
    conversations: Mutex<HashMap<(Uuid, String), ConversationState>>,
    saves: Mutex<usize>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(self, profile: TenantProfile) -> Self {
        self.tenants
            .lock()
            .unwrap()
            .insert(profile.name.clone(), profile);
        self
    }

    pub fn with_conversation(
        self,
        tenant_id: Uuid,
        user_id: &str,
        state: ConversationState,
    ) -> Self {
        self.conversations
            .lock()
            .unwrap()
            .insert((tenant_id, user_id.to_string()), state);
        self
    }

    pub fn tenant(&self, name: &str) -> Option<TenantProfile> {
        self.tenants.lock().unwrap().get(name).cloned()
    }

    pub fn conversation(&self, tenant_id: Uuid, user_id: &str) -> Option<ConversationState> {
        self.conversations
            .lock()
            .unwrap()
            .get(&(tenant_id, user_id.to_string()))
            .cloned()
    }

    pub fn saves(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn find_tenant(&self, name: &str) -> Result<Option<TenantProfile>> {
        Ok(self.tenant(name))
    }

    async fn create_tenant(&self, profile: &TenantProfile) -> Result<TenantProfile> {
        let mut tenants = self.tenants.lock().unwrap();
        if tenants.contains_key(&profile.name) {
            return Err(AppError::Duplicate {
                message: format!("tenant '{}' already exists", profile.name),
            });
        }
        tenants.insert(profile.name.clone(), profile.clone());
        Ok(profile.clone())
    }

    async fn load_conversation(
        &self,
        tenant_id: Uuid,
        user_id: &str,
    ) -> Result<Option<ConversationState>> {
        Ok(self.conversation(tenant_id, user_id))
    }

    async fn save_conversation(
        &self,
        tenant_id: Uuid,
        user_id: &str,
        state: &ConversationState,
    ) -> Result<()> {
        *self.saves.lock().unwrap() += 1;
        self.conversations
            .lock()
            .unwrap()
            .insert((tenant_id, user_id.to_string()), state.clone());
        Ok(())
    }

    async fn delete_conversation(&self, tenant_id: Uuid, user_id: &str) -> Result<bool> {
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .remove(&(tenant_id, user_id.to_string()))
            .is_some())
    }
}

/// Hands every tenant the same scripted model
pub struct StaticModels {
    pub chat: Arc<ScriptedModel>,
}

impl StaticModels {
    pub fn new(chat: Arc<ScriptedModel>) -> Self {
        Self { chat }
    }
}

impl ModelFactory for StaticModels {
    fn models_for(&self, _tenant: &TenantProfile) -> Result<TenantModels> {
        Ok(TenantModels {
            chat: self.chat.clone(),
            embedder: Arc::new(StaticEmbedder),
        })
    }
}

#[test]
fn test_edit_distance() {
    assert_eq!(edit_distance("jane", "jane"), 0);
    assert_eq!(edit_distance("jnae", "jane"), 2);
    assert_eq!(edit_distance("berlin", "berln"), 1);
    assert_eq!(edit_distance("corp", "doe"), 3);
}
