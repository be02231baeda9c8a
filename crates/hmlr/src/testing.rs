//! Test doubles shared across the crate's test modules: a scriptable
//! LLM client and a deterministic bag-of-words embedder.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::embed::Embedder;
use crate::error::{HmlrError, HmlrResult};
use crate::llm::{LlmClient, ResponseFormat};

type Handler = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Scriptable LLM client
///
/// Responses can be routed by prompt content (robust to the pipeline's
/// concurrent call ordering) or popped from a queue.
pub struct MockLlm {
    handler: Option<Handler>,
    queue: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    pub calls: Mutex<Vec<String>>,
}

impl MockLlm {
    /// Route responses by inspecting the prompt; `None` falls through to
    /// the queue/fallback
    pub fn with_handler(handler: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            handler: Some(Box::new(handler)),
            queue: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Pop scripted responses in order
    pub fn with_responses(responses: Vec<&str>) -> Self {
        Self {
            handler: None,
            queue: Mutex::new(responses.into_iter().map(String::from).collect()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always return the same response
    pub fn always(response: &str) -> Self {
        Self {
            handler: None,
            queue: Mutex::new(VecDeque::new()),
            fallback: Some(response.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail every call, for fallback-path tests
    pub fn failing() -> Self {
        Self::with_handler(|_| None)
    }

    /// Number of calls observed
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn query(&self, prompt: &str, _: &str, _: ResponseFormat) -> HmlrResult<String> {
        self.calls.lock().unwrap().push(prompt.to_string());

        if let Some(handler) = &self.handler {
            if let Some(response) = handler(prompt) {
                return Ok(response);
            }
        }
        if let Some(response) = self.queue.lock().unwrap().pop_front() {
            return Ok(response);
        }
        if let Some(fallback) = &self.fallback {
            return Ok(fallback.clone());
        }
        Err(HmlrError::llm("mock: no scripted response"))
    }
}

/// Deterministic bag-of-words embedder
///
/// Texts sharing words land close together in cosine space, which is all
/// retrieval and voting tests need.
pub struct HashEmbedder {
    dims: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self { dims: 64 }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn encode(&self, text: &str) -> HmlrResult<Vec<f32>> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut vector = vec![0.0f32; self.dims];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            vector[(hasher.finish() as usize) % self.dims] += 1.0;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// An embedder that always fails, for degraded-retrieval tests
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn encode(&self, _: &str) -> HmlrResult<Vec<f32>> {
        Err(HmlrError::embedding("mock: encoder offline"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::cosine_similarity;

    #[tokio::test]
    async fn test_hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new();
        let a = embedder.encode("vegetarian diet facts").await.unwrap();
        let b = embedder.encode("vegetarian diet facts").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_shared_words_score_higher() {
        let embedder = HashEmbedder::new();
        let base = embedder.encode("the weather api key").await.unwrap();
        let close = embedder.encode("weather api credentials key").await.unwrap();
        let far = embedder.encode("hiking boots and trail maps").await.unwrap();

        assert!(cosine_similarity(&base, &close) > cosine_similarity(&base, &far));
    }

    #[tokio::test]
    async fn test_mock_llm_queue_then_fallback() {
        let llm = MockLlm::with_responses(vec!["one", "two"]);
        assert_eq!(llm.query("p", "m", ResponseFormat::Text).await.unwrap(), "one");
        assert_eq!(llm.query("p", "m", ResponseFormat::Text).await.unwrap(), "two");
        assert!(llm.query("p", "m", ResponseFormat::Text).await.is_err());
        assert_eq!(llm.call_count(), 3);
    }
}
