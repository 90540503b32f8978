//! Vector similarity retrieval over a tenant's document chunks

use super::{store_call, Document, Reranker};
use async_trait::async_trait;
use hybridrag_common::errors::{AppError, Result};
use hybridrag_common::metrics;
use hybridrag_common::{Embedder, Repository};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Nearest-neighbour search over embedded documents
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// The `k` documents most similar to `query`, best first
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>>;
}

/// Builds the document index view for one tenant
pub trait VectorStoreFactory: Send + Sync {
    fn for_tenant(&self, tenant_id: Uuid, embedder: Arc<dyn Embedder>) -> Arc<dyn VectorStore>;
}

/// pgvector-backed store scoped to one tenant
pub struct PgVectorStore {
    repo: Repository,
    embedder: Arc<dyn Embedder>,
    tenant_id: Uuid,
}

impl PgVectorStore {
    pub fn new(repo: Repository, embedder: Arc<dyn Embedder>, tenant_id: Uuid) -> Self {
        Self {
            repo,
            embedder,
            tenant_id,
        }
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| AppError::retrieval("vector", format!("query embedding failed: {}", e)))?;

        let chunks = self
            .repo
            .vector_search(self.tenant_id, &embedding, k)
            .await
            .map_err(|e| AppError::retrieval("vector", e.to_string()))?;

        Ok(chunks
            .into_iter()
            .map(|chunk| {
                let mut metadata = match chunk.metadata {
                    serde_json::Value::Object(map) => map,
                    _ => serde_json::Map::new(),
                };
                metadata.insert("chunk_id".into(), chunk.chunk_id.to_string().into());
                metadata.insert("score".into(), chunk.score.into());

                Document {
                    content: chunk.content,
                    metadata: serde_json::Value::Object(metadata),
                }
            })
            .collect())
    }
}

impl VectorStoreFactory for Repository {
    fn for_tenant(&self, tenant_id: Uuid, embedder: Arc<dyn Embedder>) -> Arc<dyn VectorStore> {
        Arc::new(PgVectorStore::new(self.clone(), embedder, tenant_id))
    }
}

pub struct VectorRetriever {
    store: Arc<dyn VectorStore>,
    reranker: Option<Arc<dyn Reranker>>,
    top_k: usize,
    timeout: Duration,
}

impl VectorRetriever {
    pub fn new(store: Arc<dyn VectorStore>, top_k: usize, timeout: Duration) -> Self {
        Self {
            store,
            reranker: None,
            top_k,
            timeout,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Documents for the (reformed) question. Store failures are fatal.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        let mut documents = store_call(
            "vector",
            self.timeout,
            self.store.similarity_search(query, self.top_k),
        )
        .await?;
        debug!(found = documents.len(), "Vector search");

        if let Some(reranker) = &self.reranker {
            documents = reranker.rerank(query, documents).await?;
        }

        metrics::record_retrieval("vector", documents.len());
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::LexicalReranker;
    use crate::testing::InMemoryVectorStore;

    #[tokio::test]
    async fn test_retrieve_returns_top_k() {
        let store = Arc::new(InMemoryVectorStore::new(&[
            "Jane Doe is the CEO of Acme.",
            "Acme is based in Berlin.",
            "Acme sells anvils.",
        ]));
        let retriever = VectorRetriever::new(store.clone(), 2, Duration::from_secs(5));

        let documents = retriever.retrieve("Who is the CEO of Acme?").await.unwrap();

        assert_eq!(documents.len(), 2);
        assert_eq!(store.searches(), vec![("Who is the CEO of Acme?".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_reranker_applied() {
        let store = Arc::new(InMemoryVectorStore::new(&["a", "b", "c", "d"]));
        let retriever = VectorRetriever::new(store, 4, Duration::from_secs(5))
            .with_reranker(Arc::new(LexicalReranker::new(2)));

        assert_eq!(retriever.retrieve("question").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_is_fatal() {
        let store = Arc::new(InMemoryVectorStore::new(&["a"]).failing());
        let retriever = VectorRetriever::new(store, 4, Duration::from_secs(5));

        let result = retriever.retrieve("question").await;
        assert!(matches!(result, Err(AppError::Retrieval { .. })));
    }

    #[tokio::test]
    async fn test_empty_index() {
        let store = Arc::new(InMemoryVectorStore::new(&[]));
        let retriever = VectorRetriever::new(store, 4, Duration::from_secs(5));

        assert!(retriever.retrieve("question").await.unwrap().is_empty());
    }
}
