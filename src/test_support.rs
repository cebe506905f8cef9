use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::ChatMessage;
use crate::infrastructure::llm_clients::LLMClient;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

const STUB_DIMENSIONS: usize = 64;

pub const STUB_DEFAULT_COMPLETION: &str = r#"{
  "name": "Stub generated case",
  "param": {"value": "abc"},
  "rule": {"rules": [{"matchType": "equal", "dataPath": "result", "columns": {"result": 0}}]}
}"#;

/// Deterministic client: bag-of-words hashing embeddings and a queue of
/// scripted completions. Once the queue is empty every completion returns
/// [`STUB_DEFAULT_COMPLETION`].
#[derive(Default)]
pub struct StubClient {
    completions: Mutex<VecDeque<std::result::Result<String, String>>>,
    calls: Mutex<Vec<(Vec<ChatMessage>, f32)>>,
    fail_embeddings: AtomicBool,
}

impl StubClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_completions<I, S>(completions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::default();
        for completion in completions {
            client.push_completion(completion);
        }
        client
    }

    pub fn push_completion(&self, completion: impl Into<String>) {
        self.completions
            .lock()
            .unwrap()
            .push_back(Ok(completion.into()));
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        self.completions
            .lock()
            .unwrap()
            .push_back(Err(message.into()));
    }

    pub fn fail_embeddings(&self, fail: bool) {
        self.fail_embeddings.store(fail, Ordering::SeqCst);
    }

    /// Every completion request seen so far, with its temperature.
    pub fn calls(&self) -> Vec<(Vec<ChatMessage>, f32)> {
        self.calls.lock().unwrap().clone()
    }
}

fn token_bucket(token: &str) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % STUB_DIMENSIONS as u64) as usize
}

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; STUB_DIMENSIONS];
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        vector[token_bucket(&token.to_lowercase())] += 1.0;
    }
    vector
}

#[async_trait]
impl LLMClient for StubClient {
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((messages.to_vec(), temperature));

        match self.completions.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(AppError::Llm(message)),
            None => Ok(STUB_DEFAULT_COMPLETION.to_string()),
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail_embeddings.load(Ordering::SeqCst) {
            return Err(AppError::Rag("stub embedding failure".to_string()));
        }
        Ok(bag_of_words(text))
    }
}
