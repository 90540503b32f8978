//! Reranking of vector search results
//!
//! The lexical reranker scores the candidate set with BM25 against the query
//! and fuses that ranking with the original vector ranking using Reciprocal
//! Rank Fusion:
//!
//! ```text
//! RRF(d) = w_vec / (k + rank_vec(d)) + w_lex / (k + rank_lex(d))
//! ```

use super::Document;
use async_trait::async_trait;
use hybridrag_common::errors::Result;
use std::collections::HashMap;

/// Reorders and trims retrieved documents for a query
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, documents: Vec<Document>) -> Result<Vec<Document>>;
}

/// BM25-over-candidates reranker fused with the vector order
#[derive(Debug, Clone)]
pub struct LexicalReranker {
    /// Documents kept
    pub top_n: usize,
    /// BM25 term saturation
    pub k1: f32,
    /// BM25 length normalisation
    pub b: f32,
    /// RRF constant
    pub rrf_k: f32,
    pub vector_weight: f32,
    pub lexical_weight: f32,
}

impl LexicalReranker {
    pub fn new(top_n: usize) -> Self {
        Self {
            top_n,
            k1: 1.2,
            b: 0.75,
            rrf_k: 60.0,
            vector_weight: 0.6,
            lexical_weight: 0.4,
        }
    }

    /// BM25 score of every document against the query terms
    fn bm25_scores(&self, query: &str, documents: &[Document]) -> Vec<f32> {
        let query_terms = tokenize(query);
        let doc_terms: Vec<Vec<String>> = documents.iter().map(|d| tokenize(&d.content)).collect();

        let n = documents.len() as f32;
        let avg_len = doc_terms.iter().map(Vec::len).sum::<usize>() as f32 / n.max(1.0);

        // Document frequency per query term
        let mut df: HashMap<&str, usize> = HashMap::new();
        for term in &query_terms {
            if df.contains_key(term.as_str()) {
                continue;
            }
            let count = doc_terms.iter().filter(|terms| terms.contains(term)).count();
            df.insert(term.as_str(), count);
        }

        doc_terms
            .iter()
            .map(|terms| {
                let len = terms.len() as f32;
                let mut seen = Vec::new();
                query_terms
                    .iter()
                    .filter(|term| {
                        if seen.contains(term) {
                            false
                        } else {
                            seen.push(*term);
                            true
                        }
                    })
                    .map(|term| {
                        let tf = terms.iter().filter(|t| *t == term).count() as f32;
                        if tf == 0.0 {
                            return 0.0;
                        }
                        let df = df.get(term.as_str()).copied().unwrap_or(0) as f32;
                        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                        let norm = self.k1 * (1.0 - self.b + self.b * len / avg_len.max(1.0));
                        idf * tf * (self.k1 + 1.0) / (tf + norm)
                    })
                    .sum()
            })
            .collect()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl Reranker for LexicalReranker {
    async fn rerank(&self, query: &str, documents: Vec<Document>) -> Result<Vec<Document>> {
        if documents.len() <= 1 {
            return Ok(documents.into_iter().take(self.top_n).collect());
        }

        let scores = self.bm25_scores(query, &documents);

        // Lexical rank: by score, ties keep the vector order
        let mut lexical_order: Vec<usize> = (0..documents.len()).collect();
        lexical_order.sort_by(|a, b| {
            scores[*b]
                .partial_cmp(&scores[*a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut lexical_rank = vec![0usize; documents.len()];
        for (rank, idx) in lexical_order.into_iter().enumerate() {
            lexical_rank[idx] = rank + 1;
        }

        let mut fused: Vec<(usize, f32)> = (0..documents.len())
            .map(|idx| {
                let rrf = self.vector_weight / (self.rrf_k + (idx + 1) as f32)
                    + self.lexical_weight / (self.rrf_k + lexical_rank[idx] as f32);
                (idx, rrf)
            })
            .collect();
        fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut slots: Vec<Option<Document>> = documents.into_iter().map(Some).collect();
        Ok(fused
            .into_iter()
            .take(self.top_n)
            .filter_map(|(idx, _)| slots[idx].take())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(contents: &[&str]) -> Vec<Document> {
        contents.iter().map(|c| Document::new(*c)).collect()
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Who is the CEO of Acme-Corp?"),
            vec!["who", "the", "ceo", "acme", "corp"]
        );
    }

    #[test]
    fn test_bm25_prefers_matching_documents() {
        let reranker = LexicalReranker::new(3);
        let documents = docs(&[
            "The weather in Berlin is mild.",
            "Jane Doe is the chief executive of Acme.",
            "Acme sells anvils.",
        ]);

        let scores = reranker.bm25_scores("who runs acme, jane doe?", &documents);
        assert_eq!(scores[0], 0.0);
        assert!(scores[1] > scores[2]);
        assert!(scores[2] > 0.0);
    }

    #[tokio::test]
    async fn test_rerank_truncates_to_top_n() {
        let reranker = LexicalReranker::new(2);
        let result = reranker
            .rerank("acme", docs(&["one acme", "two", "three acme"]))
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].content, "one acme");
    }

    #[tokio::test]
    async fn test_rerank_keeps_vector_order_without_lexical_signal() {
        let reranker = LexicalReranker::new(5);
        let result = reranker
            .rerank("zebra", docs(&["first", "second", "third"]))
            .await
            .unwrap();

        let contents: Vec<&str> = result.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_strong_lexical_match_moves_up() {
        let reranker = LexicalReranker::new(3);
        let result = reranker
            .rerank(
                "pgvector extension",
                docs(&[
                    "unrelated text",
                    "more unrelated text",
                    "the pgvector extension adds vectors",
                ]),
            )
            .await
            .unwrap();

        assert_eq!(result[0].content, "unrelated text");
        assert_eq!(result[1].content, "the pgvector extension adds vectors");
    }

    #[tokio::test]
    async fn test_empty_input() {
        let reranker = LexicalReranker::new(3);
        assert!(reranker.rerank("anything", Vec::new()).await.unwrap().is_empty());
    }
}
