//! Retrieval over the tenant's knowledge graph and document index
//!
//! - `graph`: entity extraction + fuzzy full-text lookup of relationship neighbourhoods
//! - `vector`: semantic nearest-neighbour search over document chunks
//! - `rerank`: lexical reranking of vector results

pub mod graph;
pub mod rerank;
pub mod vector;

pub use graph::{GraphRetriever, GraphSearchSettings, GraphStore, Neo4jGraphStore, NeighborQuery};
pub use rerank::{LexicalReranker, Reranker};
pub use vector::{PgVectorStore, VectorRetriever, VectorStore, VectorStoreFactory};

use hybridrag_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// A retrieved document chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Join document contents for a prompt, separated by blank lines
pub fn join_documents(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Bound a store call. Elapsing counts as a retrieval failure of that store.
pub(crate) async fn store_call<T, F>(store: &str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::retrieval(
            store,
            format!("timed out after {}ms", limit.as_millis()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_documents() {
        let docs = [Document::new("first"), Document::new("second")];
        assert_eq!(join_documents(&docs), "first\n\nsecond");
        assert!(Document::new(" \n\t").is_blank());
    }

    #[tokio::test]
    async fn test_store_call_timeout_is_retrieval_failure() {
        let result: Result<()> = store_call("vector", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        match result {
            Err(AppError::Retrieval { store, message }) => {
                assert_eq!(store, "vector");
                assert!(message.contains("timed out"));
            }
            other => panic!("expected retrieval failure, got {:?}", other),
        }
    }
}
