//! Answer generation for the question/answer loop.
//!
//! [`ResponseGenerator`] ties retrieval, chat history, and the
//! completion provider together behind a fail-safe surface: `respond`
//! always returns an answer string. Any stage failure is written to the
//! error log and the configured fallback response goes back to the
//! caller instead of an error.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::completion::{Completion, PromptMessage};
use crate::config::{ChatConfig, RetrievalConfig};
use crate::error::PipelineError;
use crate::error_log::ErrorLogStore;
use crate::models::Message;
use crate::retrieve::ContextRetriever;
use crate::session::SessionStore;

pub struct ResponseGenerator {
    retriever: ContextRetriever,
    completion: Arc<dyn Completion>,
    sessions: SessionStore,
    error_log: ErrorLogStore,
    retrieval: RetrievalConfig,
    chat: ChatConfig,
    /// Per-session locks serializing concurrent turns on the same
    /// session id, so a save never clobbers a concurrent turn's
    /// messages.
    session_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ResponseGenerator {
    pub fn new(
        retriever: ContextRetriever,
        completion: Arc<dyn Completion>,
        sessions: SessionStore,
        error_log: ErrorLogStore,
        retrieval: RetrievalConfig,
        chat: ChatConfig,
    ) -> Self {
        Self {
            retriever,
            completion,
            sessions,
            error_log,
            retrieval,
            chat,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Answer `question` within `topic`, updating the session history.
    ///
    /// Never fails: every pipeline error is recorded in the error log
    /// and the configured fallback response is returned instead.
    pub async fn respond(&self, session_id: &str, topic: &str, question: &str) -> String {
        let lock = self.session_lock(session_id);
        let answer = {
            let _guard = lock.lock().await;

            match self.run_turn(session_id, topic, question).await {
                Ok(answer) => answer,
                Err(e) => {
                    tracing::error!(session_id, topic, error = %e, "turn failed, returning fallback");
                    self.error_log.record(Some(topic), &e).await;
                    self.chat.fallback_response.clone()
                }
            }
        };
        self.release_session_lock(session_id, lock);
        answer
    }

    async fn run_turn(
        &self,
        session_id: &str,
        topic: &str,
        question: &str,
    ) -> Result<String, PipelineError> {
        let mut session = self.sessions.get_or_create(session_id, topic).await?;
        session.messages.push(Message::user(question));

        let context = self
            .retriever
            .retrieve(
                question,
                topic,
                self.retrieval.similarity_top_k,
                self.retrieval.similarity_threshold,
            )
            .await?;

        // No context above the threshold: answer from the canned
        // fallback without calling the completion provider, so the model
        // never free-associates an answer the knowledge base cannot back.
        if context.is_empty() {
            let answer = self.chat.fallback_response.clone();
            session.messages.push(Message::assistant(answer.clone()));
            self.save_session(&session, topic).await;
            return Ok(answer);
        }

        let prompt = self.build_prompt(&session.messages, &context);
        let answer = self.completion.complete(&prompt).await?;

        session.messages.push(Message::assistant(answer.clone()));
        self.save_session(&session, topic).await;

        Ok(answer)
    }

    /// Prompt layout: system instructions, retrieved context as a second
    /// system message, then the most recent history window (which ends
    /// with the current user question).
    fn build_prompt(&self, messages: &[Message], context: &str) -> Vec<PromptMessage> {
        let mut prompt = Vec::with_capacity(messages.len() + 2);
        prompt.push(PromptMessage::system(self.chat.system_prompt.clone()));
        prompt.push(PromptMessage::system(format!("Context:\n{}", context)));

        let window_start = messages.len().saturating_sub(self.chat.history_window);
        for message in &messages[window_start..] {
            prompt.push(PromptMessage::new(message.role.as_str(), &message.content));
        }

        prompt
    }

    /// Persist the session after a turn. A failed save is an
    /// availability problem, not a correctness one: the answer already
    /// exists, so log the failure and keep going.
    async fn save_session(&self, session: &crate::models::ChatSession, topic: &str) {
        if let Err(e) = self.sessions.save(session).await {
            tracing::warn!(session_id = %session.session_id, error = %e, "session save failed");
            self.error_log.record(Some(topic), &e).await;
        }
    }

    fn session_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.session_locks.lock().unwrap();
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Return a turn's lock handle and drop the map entry once no other
    /// turn holds it, so the map does not grow by one entry per session
    /// id over a long-lived generator. Handles are cloned and returned
    /// only under the map mutex, so a strong count of one after dropping
    /// ours means exactly the map's own reference remains.
    fn release_session_lock(&self, session_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.session_locks.lock().unwrap();
        drop(lock);
        if locks
            .get(session_id)
            .is_some_and(|l| Arc::strong_count(l) == 1)
        {
            locks.remove(session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::index::{ChunkVector, InMemoryIndex, VectorIndex};
    use crate::migrate::run_migrations;
    use async_trait::async_trait;
    use sqlx::SqlitePool;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticEmbedder;

    #[async_trait]
    impl Embedder for StaticEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
            Ok(if text.contains("grading") {
                vec![1.0, 0.0]
            } else {
                vec![0.0, 1.0]
            })
        }

        fn dims(&self) -> usize {
            2
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, PipelineError> {
            Err(PipelineError::Embedding("service unavailable".into()))
        }

        fn dims(&self) -> usize {
            2
        }
    }

    struct CountingCompletion {
        calls: AtomicUsize,
        reply: String,
    }

    impl CountingCompletion {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                reply: reply.to_string(),
            })
        }
    }

    #[async_trait]
    impl Completion for CountingCompletion {
        async fn complete(&self, _messages: &[PromptMessage]) -> Result<String, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    struct FailingCompletion;

    #[async_trait]
    impl Completion for FailingCompletion {
        async fn complete(&self, _messages: &[PromptMessage]) -> Result<String, PipelineError> {
            Err(PipelineError::Completion("model overloaded".into()))
        }
    }

    async fn seeded_index() -> Arc<InMemoryIndex> {
        let index = Arc::new(InMemoryIndex::new(2, vec!["school_info".to_string()]));
        index
            .upsert(
                &[ChunkVector {
                    id: "doc-0-x".to_string(),
                    document_id: "doc".to_string(),
                    chunk_index: 0,
                    text: "Grading uses a 1-10 scale.".to_string(),
                    embedding: vec![1.0, 0.0],
                    content_hash: "h".to_string(),
                }],
                "school_info",
            )
            .await
            .unwrap();
        index
    }

    async fn generator(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        completion: Arc<dyn Completion>,
    ) -> (ResponseGenerator, SqlitePool) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool, 2).await.unwrap();
        let generator = ResponseGenerator::new(
            ContextRetriever::new(embedder, index),
            completion,
            SessionStore::new(pool.clone()),
            ErrorLogStore::new(pool.clone()),
            RetrievalConfig::default(),
            ChatConfig::default(),
        );
        (generator, pool)
    }

    #[tokio::test]
    async fn answers_and_persists_history_on_success() {
        let completion = CountingCompletion::new("Grades run from 1 to 10.");
        let (generator, pool) =
            generator(Arc::new(StaticEmbedder), seeded_index().await, completion.clone()).await;

        let answer = generator
            .respond("s1", "school_info", "what is the grading scale?")
            .await;
        assert_eq!(answer, "Grades run from 1 to 10.");
        assert_eq!(completion.calls.load(Ordering::SeqCst), 1);

        let session = SessionStore::new(pool)
            .get_or_create("s1", "school_info")
            .await
            .unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0], Message::user("what is the grading scale?"));
        assert_eq!(
            session.messages[1],
            Message::assistant("Grades run from 1 to 10.")
        );
    }

    #[tokio::test]
    async fn empty_context_short_circuits_to_fallback() {
        let completion = CountingCompletion::new("should never be used");
        let (generator, pool) =
            generator(Arc::new(StaticEmbedder), seeded_index().await, completion.clone()).await;

        // Query orthogonal to the only stored chunk: score 0.0 is below
        // the default threshold.
        let answer = generator
            .respond("s1", "school_info", "where is the cafeteria?")
            .await;
        assert_eq!(answer, ChatConfig::default().fallback_response);
        assert_eq!(completion.calls.load(Ordering::SeqCst), 0);

        // The fallback turn is still part of the history.
        let session = SessionStore::new(pool)
            .get_or_create("s1", "school_info")
            .await
            .unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[1].content, answer);
    }

    #[tokio::test]
    async fn embedding_failure_returns_fallback_and_logs() {
        let completion = CountingCompletion::new("unused");
        let (generator, pool) =
            generator(Arc::new(FailingEmbedder), seeded_index().await, completion.clone()).await;

        let answer = generator
            .respond("s1", "school_info", "what is the grading scale?")
            .await;
        assert_eq!(answer, ChatConfig::default().fallback_response);
        assert_eq!(completion.calls.load(Ordering::SeqCst), 0);

        let entries = ErrorLogStore::new(pool).recent(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].error_kind, "embedding_generation");
        assert_eq!(entries[0].topic.as_deref(), Some("school_info"));
    }

    #[tokio::test]
    async fn completion_failure_returns_fallback_and_logs() {
        let (generator, pool) = generator(
            Arc::new(StaticEmbedder),
            seeded_index().await,
            Arc::new(FailingCompletion),
        )
        .await;

        let answer = generator
            .respond("s1", "school_info", "what is the grading scale?")
            .await;
        assert_eq!(answer, ChatConfig::default().fallback_response);

        let entries = ErrorLogStore::new(pool).recent(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].error_kind, "completion_generation");
    }

    #[tokio::test]
    async fn unknown_topic_returns_fallback_not_error() {
        let completion = CountingCompletion::new("unused");
        let (generator, _pool) =
            generator(Arc::new(StaticEmbedder), seeded_index().await, completion.clone()).await;

        let answer = generator
            .respond("s1", "no_such_topic", "what is the grading scale?")
            .await;
        assert_eq!(answer, ChatConfig::default().fallback_response);
    }

    #[tokio::test]
    async fn prompt_history_is_bounded_by_window() {
        let completion = CountingCompletion::new("ack");
        let (generator, _pool) =
            generator(Arc::new(StaticEmbedder), seeded_index().await, completion.clone()).await;

        let mut messages = Vec::new();
        for i in 0..20 {
            messages.push(Message::user(format!("grading question {}", i)));
            messages.push(Message::assistant(format!("answer {}", i)));
        }
        let prompt = generator.build_prompt(&messages, "some context");

        // Two system messages plus the trailing window of ten.
        assert_eq!(prompt.len(), 2 + ChatConfig::default().history_window);
        assert_eq!(prompt[0].role, "system");
        assert!(prompt[1].content.starts_with("Context:"));
        assert_eq!(prompt.last().unwrap().content, "answer 19");
    }

    #[tokio::test]
    async fn session_locks_do_not_accumulate_across_turns() {
        let completion = CountingCompletion::new("ack");
        let (generator, _pool) =
            generator(Arc::new(StaticEmbedder), seeded_index().await, completion.clone()).await;

        for session in ["s1", "s2", "s3"] {
            generator
                .respond(session, "school_info", "grading question")
                .await;
        }

        assert!(generator.session_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_turns_on_one_session_all_land_in_history() {
        let completion = CountingCompletion::new("ack");
        let (generator, pool) =
            generator(Arc::new(StaticEmbedder), seeded_index().await, completion.clone()).await;
        let generator = Arc::new(generator);

        let mut handles = Vec::new();
        for i in 0..4 {
            let g = Arc::clone(&generator);
            handles.push(tokio::spawn(async move {
                g.respond("s1", "school_info", &format!("grading question {}", i))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let session = SessionStore::new(pool)
            .get_or_create("s1", "school_info")
            .await
            .unwrap();
        // Four user turns, four assistant replies, none lost.
        assert_eq!(session.messages.len(), 8);
        // The last finisher also released the shared lock entry.
        assert!(generator.session_locks.lock().unwrap().is_empty());
    }
}
