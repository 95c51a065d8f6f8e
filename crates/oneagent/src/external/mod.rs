//! External collaborator interfaces (spec §6, supplemental per SPEC_FULL.md).
//!
//! `oneagent` depends on an LLM and a long-term memory store only through
//! these narrow traits. Implementing a real provider (Gemini, an
//! embeddings service, a vector store) is explicitly out of scope per
//! spec.md §1 — only in-memory/no-op test doubles live here.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// What C10's LLM-backed insight-extraction strategy (and any future tool
/// handler) needs from a language model.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// What a long-term memory collaborator needs to support.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemoryClient: Send + Sync {
    async fn store(&self, key: &str, value: serde_json::Value) -> anyhow::Result<()>;
    async fn search(&self, query: &str) -> anyhow::Result<Vec<serde_json::Value>>;
    async fn update(&self, key: &str, value: serde_json::Value) -> anyhow::Result<()>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// Deterministic no-op `LlmClient`: echoes the prompt back and returns a
/// fixed-width zero embedding. Used only by this crate's own tests —
/// never wired into `main.rs`.
#[derive(Debug, Default)]
pub struct NoopLlmClient;

#[async_trait]
impl LlmClient for NoopLlmClient {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        Ok(format!("[noop-llm] {prompt}"))
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(vec![text.len() as f32])
    }
}

/// In-memory `MemoryClient` double, keyed by exact string match on
/// `search` (no real similarity search — a stand-in, not a vector store).
#[derive(Default)]
pub struct InMemoryMemoryClient {
    store: Mutex<HashMap<String, serde_json::Value>>,
}

#[async_trait]
impl MemoryClient for InMemoryMemoryClient {
    async fn store(&self, key: &str, value: serde_json::Value) -> anyhow::Result<()> {
        self.store.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn search(&self, query: &str) -> anyhow::Result<Vec<serde_json::Value>> {
        let guard = self.store.lock().unwrap();
        Ok(guard
            .iter()
            .filter(|(k, _)| k.contains(query))
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn update(&self, key: &str, value: serde_json::Value) -> anyhow::Result<()> {
        self.store.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.store.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_llm_echoes_prompt() {
        let client = NoopLlmClient;
        let out = client.generate("hello").await.unwrap();
        assert!(out.contains("hello"));
    }

    #[tokio::test]
    async fn in_memory_store_roundtrips() {
        let client = InMemoryMemoryClient::default();
        client.store("insight:rollout", serde_json::json!({"a": 1})).await.unwrap();
        let found = client.search("rollout").await.unwrap();
        assert_eq!(found.len(), 1);
        client.delete("insight:rollout").await.unwrap();
        assert!(client.search("rollout").await.unwrap().is_empty());
    }

    /// Any caller depending on `LlmClient` as a trait object works against a
    /// mock exactly as it would against `NoopLlmClient` or a future real
    /// provider — the point of narrowing the collaborator to a trait.
    #[tokio::test]
    async fn callers_depend_on_the_trait_object_not_a_concrete_client() {
        let mut mock = MockLlmClient::new();
        mock.expect_generate()
            .withf(|prompt| prompt == "summarize this thread")
            .returning(|_| Ok("mocked summary".to_string()));
        let client: Box<dyn LlmClient> = Box::new(mock);
        let out = client.generate("summarize this thread").await.unwrap();
        assert_eq!(out, "mocked summary");
    }
}
