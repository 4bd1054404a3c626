//! Request pipeline: intake, embedding, retrieval, then opening the completion
//! stream. Every stage runs strictly after the previous one and the first
//! failure aborts the rest.

use rateprof_core::prompt::augment;
use rateprof_core::{ChatMessage, CompletionStream, Conversation, RagError};

use crate::state::AppState;
use crate::subsystems::{intake, retrieve};

/// Build the augmented message list for `conversation`.
pub async fn build_messages(
    state: &AppState,
    conversation: &Conversation,
) -> Result<Vec<ChatMessage>, RagError> {
    let context = retrieve::retrieve_context(
        state.embedder.as_ref(),
        state.index.as_ref(),
        &conversation.latest.content,
    )
    .await?;

    Ok(augment(
        &state.system_prompt,
        &conversation.history,
        &conversation.latest.content,
        &context.summary,
    ))
}

/// Run every stage up to the point where the reply can start streaming.
///
/// Nothing has been sent to the client when this returns, so any error here
/// can still become a proper HTTP error response.
pub async fn prepare_reply(state: &AppState, body: &[u8]) -> Result<CompletionStream, RagError> {
    let conversation = intake::parse_conversation(body)?;
    tracing::debug!(history = conversation.history.len(), "Conversation accepted");

    let messages = build_messages(state, &conversation).await?;
    let upstream = state.completion.stream_chat(&messages).await?;
    tracing::info!(
        model = state.completion.model(),
        messages = messages.len(),
        "Streaming completion"
    );
    Ok(upstream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream::{self, StreamExt, TryStreamExt};
    use rateprof_core::prompt::format_matches;
    use rateprof_core::{
        CompletionBackend, CompletionError, EmbeddingBackend, EmbeddingError, ProfessorMetadata,
        RagConfig, RetrievalError, RetrievalMatch, Role, VectorIndex,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct StubEmbedder {
        fail_with: Option<u16>,
    }

    #[async_trait]
    impl EmbeddingBackend for StubEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            match self.fail_with {
                Some(status) => Err(EmbeddingError::Service {
                    status,
                    message: "unavailable".to_string(),
                }),
                None => Ok(vec![0.1, 0.2]),
            }
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    struct StubIndex {
        matches: Vec<RetrievalMatch>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VectorIndex for StubIndex {
        async fn query(&self, _v: &[f32], _k: usize) -> Result<Vec<RetrievalMatch>, RetrievalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.matches.clone())
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    #[derive(Default)]
    struct CapturingCompletion {
        sent: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl CompletionBackend for CapturingCompletion {
        async fn stream_chat(
            &self,
            messages: &[ChatMessage],
        ) -> Result<CompletionStream, CompletionError> {
            self.sent.lock().unwrap().push(messages.to_vec());
            Ok(stream::iter(vec![Ok("Dr. ".to_string()), Ok("Abel".to_string())]).boxed())
        }

        fn model(&self) -> &str {
            "stub-model"
        }
    }

    fn two_matches() -> Vec<RetrievalMatch> {
        vec![
            RetrievalMatch {
                id: "Dr. Abel".to_string(),
                score: Some(0.93),
                metadata: ProfessorMetadata {
                    subject: "Machine Learning".to_string(),
                    stars: 5.into(),
                    review: None,
                },
            },
            RetrievalMatch {
                id: "Dr. Zed".to_string(),
                score: Some(0.81),
                metadata: ProfessorMetadata {
                    subject: "Statistics".to_string(),
                    stars: 4.into(),
                    review: Some("Tough but fair.".to_string()),
                },
            },
        ]
    }

    fn state(
        fail_with: Option<u16>,
        matches: Vec<RetrievalMatch>,
    ) -> (AppState, Arc<StubIndex>, Arc<CapturingCompletion>) {
        let index = Arc::new(StubIndex {
            matches,
            calls: AtomicUsize::new(0),
        });
        let completion = Arc::new(CapturingCompletion::default());
        let state = AppState::new(
            RagConfig::default(),
            Arc::new(StubEmbedder { fail_with }),
            index.clone(),
            completion.clone(),
        );
        (state, index, completion)
    }

    #[tokio::test]
    async fn test_single_question_scenario() {
        let (state, _index, completion) = state(None, two_matches());
        let body = br#"[{"role":"user","content":"best ML professor?"}]"#;

        let upstream = prepare_reply(&state, body).await.unwrap();
        let fragments: Vec<String> = upstream.try_collect().await.unwrap();
        assert_eq!(fragments.concat(), "Dr. Abel");

        let sent = completion.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let messages = &sent[0];
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, state.system_prompt);

        let summary = format_matches(&two_matches());
        assert_eq!(summary.matches("Professor: ").count(), 2);
        assert_eq!(messages[1], ChatMessage::user(format!("best ML professor?{}", summary)));
    }

    #[tokio::test]
    async fn test_history_order_preserved_and_summary_appended() {
        let (state, _index, completion) = state(None, two_matches());
        let body = br#"[
            {"role":"user","content":"I study CS"},
            {"role":"assistant","content":"Great, which topic?"},
            {"role":"user","content":"Something with statistics"},
            {"role":"assistant","content":"Any preference on grading?"},
            {"role":"user","content":"fair grading"}
        ]"#;

        prepare_reply(&state, body).await.unwrap();

        let sent = completion.sent.lock().unwrap();
        let messages = &sent[0];
        assert_eq!(messages.len(), 6);
        let middle: Vec<&str> = messages[1..5].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            middle,
            vec![
                "I study CS",
                "Great, which topic?",
                "Something with statistics",
                "Any preference on grading?"
            ]
        );
        let last = &messages[5];
        assert_eq!(last.role, Role::User);
        assert!(last.content.starts_with("fair grading"));
        assert!(last.content.ends_with(&format_matches(&two_matches())));
    }

    #[tokio::test]
    async fn test_zero_matches_sends_header_only() {
        let (state, _index, completion) = state(None, Vec::new());
        prepare_reply(&state, br#"[{"role":"user","content":"anyone?"}]"#)
            .await
            .unwrap();

        let sent = completion.sent.lock().unwrap();
        let last = sent[0].last().unwrap();
        assert_eq!(last.content, format!("anyone?{}", rateprof_core::prompt::RESULTS_HEADER));
    }

    #[tokio::test]
    async fn test_embedding_failure_stops_pipeline() {
        let (state, index, completion) = state(Some(500), two_matches());
        let result = prepare_reply(&state, br#"[{"role":"user","content":"q"}]"#).await;

        match result {
            Err(e) => assert_eq!(e.stage(), "embedding"),
            Ok(_) => panic!("Expected embedding-stage error"),
        }
        assert_eq!(index.calls.load(Ordering::SeqCst), 0);
        assert!(completion.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_input_stops_before_embedding() {
        let (state, index, completion) = state(None, two_matches());
        match prepare_reply(&state, b"[]").await {
            Err(e) => assert_eq!(e.stage(), "intake"),
            Ok(_) => panic!("Expected intake error"),
        }
        assert_eq!(index.calls.load(Ordering::SeqCst), 0);
        assert!(completion.sent.lock().unwrap().is_empty());
    }
}
