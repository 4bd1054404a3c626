//! Retrieval subsystem: embed the latest message, query the professor index,
//! and render the matches as prompt text.

use rateprof_core::prompt::format_matches;
use rateprof_core::{EmbeddingBackend, RagError, RetrievalMatch, VectorIndex, TOP_K};

#[derive(Debug, Clone)]
pub struct RetrievedContext {
    pub matches: Vec<RetrievalMatch>,
    pub summary: String,
}

pub async fn retrieve_context(
    embedder: &dyn EmbeddingBackend,
    index: &dyn VectorIndex,
    text: &str,
) -> Result<RetrievedContext, RagError> {
    let vector = embedder.embed(text).await?;
    tracing::debug!(
        backend = embedder.name(),
        dimensions = vector.len(),
        "Query embedded"
    );

    let matches = index.query(&vector, TOP_K).await?;
    tracing::info!(
        index = index.name(),
        matches = matches.len(),
        top = matches.first().map(|m| m.id.as_str()).unwrap_or("-"),
        "Professors retrieved"
    );

    let summary = format_matches(&matches);
    Ok(RetrievedContext { matches, summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rateprof_core::{EmbeddingError, ProfessorMetadata, RetrievalError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedEmbedder(Result<Vec<f32>, u16>);

    #[async_trait]
    impl EmbeddingBackend for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.0.clone().map_err(|status| EmbeddingError::Service {
                status,
                message: "down".to_string(),
            })
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[derive(Default)]
    struct RecordingIndex {
        calls: AtomicUsize,
        seen: Mutex<Vec<(usize, usize)>>,
        available: usize,
    }

    #[async_trait]
    impl VectorIndex for RecordingIndex {
        async fn query(
            &self,
            vector: &[f32],
            top_k: usize,
        ) -> Result<Vec<RetrievalMatch>, RetrievalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push((vector.len(), top_k));
            Ok((0..self.available.min(top_k))
                .map(|i| RetrievalMatch {
                    id: format!("Prof {}", i),
                    score: None,
                    metadata: ProfessorMetadata {
                        subject: "Math".to_string(),
                        stars: (5 - i as u64).into(),
                        review: None,
                    },
                })
                .collect())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_query_uses_full_embedding_and_top_three() {
        for d in [1usize, 2, 384, 768] {
            let embedder = FixedEmbedder(Ok(vec![0.5; d]));
            let index = RecordingIndex {
                available: 10,
                ..Default::default()
            };
            let ctx = retrieve_context(&embedder, &index, "q").await.unwrap();
            assert_eq!(index.seen.lock().unwrap().as_slice(), &[(d, 3)]);
            assert_eq!(ctx.matches.len(), 3);
        }
    }

    #[tokio::test]
    async fn test_summary_has_one_block_per_match() {
        for k in 0..=3 {
            let embedder = FixedEmbedder(Ok(vec![0.1, 0.2]));
            let index = RecordingIndex {
                available: k,
                ..Default::default()
            };
            let ctx = retrieve_context(&embedder, &index, "q").await.unwrap();
            assert_eq!(ctx.matches.len(), k);
            assert_eq!(ctx.summary.matches("Professor: ").count(), k);
            for (i, m) in ctx.matches.iter().enumerate() {
                assert_eq!(m.id, format!("Prof {}", i));
            }
        }
    }

    #[tokio::test]
    async fn test_embedding_failure_skips_index() {
        let embedder = FixedEmbedder(Err(500));
        let index = RecordingIndex::default();

        let err = retrieve_context(&embedder, &index, "q").await.unwrap_err();
        assert_eq!(err.stage(), "embedding");
        assert_eq!(index.calls.load(Ordering::SeqCst), 0);
    }
}
