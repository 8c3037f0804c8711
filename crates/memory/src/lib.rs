//! `trellis-memory` — per-conversation memory.
//!
//! Persists messages to the document store (unique by id) and mirrors
//! them into a KV-cached list for fast context reads; produces a
//! token-bounded [`ContextBlock`] per turn; maintains the executive
//! summary in the background.
//!
//! Failure model: append failures are fatal for the turn; read failures
//! degrade to an empty context with a warning; summarization failures are
//! logged and never surfaced.

pub mod context;
pub mod summarize;

pub use context::ContextBlock;

use std::sync::Arc;

use trellis_domain::config::MemoryConfig;
use trellis_domain::error::Result;
use trellis_domain::message::Message;
use trellis_ports::counter::TokenCounter;
use trellis_ports::doc::DocStore;
use trellis_ports::kv::KvStore;
use trellis_ports::llm::LanguageModel;

fn cache_key(conversation_id: &str) -> String {
    format!("conversations:{conversation_id}:messages")
}

fn summary_key(conversation_id: &str) -> String {
    format!("conversations:{conversation_id}:summary")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MemoryService
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Conversation memory backed by the doc store (durable, unique ids) and
/// the KV store (cached list + summary).
pub struct MemoryService {
    kv: Arc<dyn KvStore>,
    docs: Arc<dyn DocStore>,
    counter: Arc<dyn TokenCounter>,
    summarizer: Arc<dyn LanguageModel>,
    config: MemoryConfig,
}

impl MemoryService {
    pub fn new(
        kv: Arc<dyn KvStore>,
        docs: Arc<dyn DocStore>,
        counter: Arc<dyn TokenCounter>,
        summarizer: Arc<dyn LanguageModel>,
        config: MemoryConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            kv,
            docs,
            counter,
            summarizer,
            config,
        })
    }

    /// Persist a message durably and into the cached list. Store errors
    /// here abort the turn.
    pub async fn append_message(&self, message: &Message) -> Result<String> {
        self.docs.insert_message(message).await?;
        let record = serde_json::to_string(message)?;
        self.kv
            .list_push(&cache_key(&message.conversation_id), &record)
            .await?;
        Ok(message.id.clone())
    }

    /// Read the cached conversation, dedup by id, and fit it into
    /// `max_tokens`. Read errors degrade to an empty context.
    pub async fn get_context(&self, conversation_id: &str, max_tokens: usize) -> ContextBlock {
        let raw = match self.kv.list_range(&cache_key(conversation_id)).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    conversation_id,
                    error = %e,
                    "context read failed, degrading to empty context"
                );
                return ContextBlock::default();
            }
        };

        let mut messages = Vec::with_capacity(raw.len());
        for line in raw {
            match serde_json::from_str::<Message>(&line) {
                Ok(m) => messages.push(m),
                Err(e) => {
                    tracing::warn!(conversation_id, error = %e, "skipping unparseable cached message");
                }
            }
        }

        let messages = context::dedup_by_id(messages);
        let summary = self.get_executive_summary(conversation_id).await;
        context::fit_to_budget(messages, summary, max_tokens, self.counter.as_ref())
    }

    /// The running long-horizon summary, if one has been generated.
    pub async fn get_executive_summary(&self, conversation_id: &str) -> Option<String> {
        match self.kv.get(&summary_key(conversation_id)).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(conversation_id, error = %e, "summary read failed");
                None
            }
        }
    }

    /// Enqueue a background summary rewrite. Returns immediately; the job
    /// only runs once the conversation passes the turn threshold.
    pub fn schedule_summarize(self: &Arc<Self>, conversation_id: &str) {
        let service = self.clone();
        let conversation_id = conversation_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = service.run_summarize(&conversation_id).await {
                tracing::warn!(conversation_id = %conversation_id, error = %e, "summarization failed");
            }
        });
    }

    async fn run_summarize(&self, conversation_id: &str) -> Result<()> {
        let raw = self.kv.list_range(&cache_key(conversation_id)).await?;
        let messages: Vec<Message> = raw
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        let messages = context::dedup_by_id(messages);

        if !summarize::should_summarize(&messages, self.config.summarize_after_turns) {
            return Ok(());
        }

        let previous = self.get_executive_summary(conversation_id).await;
        let summary = summarize::generate_summary(
            self.summarizer.as_ref(),
            &messages,
            previous.as_deref(),
            self.config.summary_max_tokens,
        )
        .await?;

        if !summary.is_empty() {
            self.kv.set(&summary_key(conversation_id), &summary).await?;
            tracing::debug!(conversation_id, chars = summary.len(), "executive summary updated");
        }
        Ok(())
    }

    /// Offline utility: rewrite the cached list without duplicate ids.
    /// Returns the number of entries removed.
    pub async fn dedup_cache(&self, conversation_id: &str) -> Result<usize> {
        let key = cache_key(conversation_id);
        let raw = self.kv.list_range(&key).await?;
        let messages: Vec<Message> = raw
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        let before = messages.len();
        let deduped = context::dedup_by_id(messages);
        let removed = before - deduped.len();

        if removed > 0 {
            let lines: Result<Vec<String>> = deduped
                .iter()
                .map(|m| serde_json::to_string(m).map_err(Into::into))
                .collect();
            self.kv.list_replace(&key, lines?).await?;
        }
        Ok(removed)
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use trellis_domain::message::Role;
    use trellis_domain::stream::{BoxStream, StreamEvent};
    use trellis_ports::counter::HeuristicTokenCounter;
    use trellis_ports::llm::{ChatRequest, ChatResponse};
    use trellis_stores::{MemoryDocs, MemoryKv};

    /// A summarizer stub that always returns the same text.
    struct FixedSummarizer(&'static str);

    #[async_trait::async_trait]
    impl LanguageModel for FixedSummarizer {
        async fn invoke(&self, _req: ChatRequest) -> Result<ChatResponse> {
            Ok(ChatResponse {
                content: self.0.to_string(),
                usage: None,
                model: "stub".into(),
            })
        }
        async fn stream(
            &self,
            _req: ChatRequest,
        ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            unimplemented!("not used")
        }
        async fn invoke_structured(&self, _req: ChatRequest, _schema: &Value) -> Result<Value> {
            unimplemented!("not used")
        }
        async fn embed(&self, _inputs: Vec<String>) -> Result<Vec<Vec<f32>>> {
            unimplemented!("not used")
        }
        fn model_id(&self) -> &str {
            "stub"
        }
    }

    fn service() -> Arc<MemoryService> {
        MemoryService::new(
            Arc::new(MemoryKv::new()),
            Arc::new(MemoryDocs::new()),
            Arc::new(HeuristicTokenCounter::new(1)),
            Arc::new(FixedSummarizer("the summary")),
            MemoryConfig {
                summarize_after_turns: 2,
                ..MemoryConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn append_then_context_roundtrip() {
        let memory = service();
        let m1 = Message::new("c1", Role::User, "hello");
        let m2 = Message::new("c1", Role::Assistant, "hi there");
        memory.append_message(&m1).await.unwrap();
        memory.append_message(&m2).await.unwrap();

        let block = memory.get_context("c1", 1000).await;
        assert_eq!(block.messages.len(), 2);
        assert_eq!(block.messages[0].content, "hello");
    }

    #[tokio::test]
    async fn append_duplicate_id_is_fatal() {
        let memory = service();
        let msg = Message::new("c1", Role::User, "hello");
        memory.append_message(&msg).await.unwrap();
        assert!(memory.append_message(&msg).await.is_err());
    }

    #[tokio::test]
    async fn context_respects_budget() {
        let memory = service();
        for i in 0..20 {
            let msg = Message::new("c1", Role::User, format!("message number {i}"));
            memory.append_message(&msg).await.unwrap();
        }
        let block = memory.get_context("c1", 50).await;
        assert!(block.total_tokens <= 50);
        assert!(block.messages.len() < 20);
    }

    #[tokio::test]
    async fn unknown_conversation_yields_empty_context() {
        let memory = service();
        let block = memory.get_context("ghost", 100).await;
        assert!(block.messages.is_empty());
        assert_eq!(block.total_tokens, 0);
    }

    #[tokio::test]
    async fn summarize_runs_past_threshold() {
        let memory = service();
        for i in 0..3 {
            let msg = Message::new("c1", Role::User, format!("turn {i}"));
            memory.append_message(&msg).await.unwrap();
        }
        memory.run_summarize("c1").await.unwrap();
        assert_eq!(
            memory.get_executive_summary("c1").await.as_deref(),
            Some("the summary")
        );
    }

    #[tokio::test]
    async fn summarize_skipped_below_threshold() {
        let memory = service();
        memory
            .append_message(&Message::new("c1", Role::User, "only turn"))
            .await
            .unwrap();
        memory.run_summarize("c1").await.unwrap();
        assert!(memory.get_executive_summary("c1").await.is_none());
    }

    #[tokio::test]
    async fn dedup_cache_removes_duplicates() {
        let memory = service();
        let msg = Message::new("c1", Role::User, "hello");
        // Write the same record twice directly into the cache, simulating
        // a crash-retry double write.
        let record = serde_json::to_string(&msg).unwrap();
        memory.kv.list_push(&cache_key("c1"), &record).await.unwrap();
        memory.kv.list_push(&cache_key("c1"), &record).await.unwrap();

        let removed = memory.dedup_cache("c1").await.unwrap();
        assert_eq!(removed, 1);

        let block = memory.get_context("c1", 1000).await;
        assert_eq!(block.messages.len(), 1);
    }
}
