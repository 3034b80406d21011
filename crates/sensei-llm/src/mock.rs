//! Deterministic provider for tests and offline development.

use std::sync::Mutex;

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message};

/// Returns canned replies in order, then repeats the last one.
#[derive(Debug, Default)]
pub struct MockProvider {
    replies: Mutex<Vec<String>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockProvider {
    #[must_use]
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies),
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn single(reply: impl Into<String>) -> Self {
        Self::new(vec![reply.into()])
    }

    /// Every message list `chat` was called with, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

impl LlmProvider for MockProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        let mut replies = self
            .replies
            .lock()
            .map_err(|_| LlmError::Other("mock lock poisoned".into()))?;
        if replies.is_empty() {
            return Err(LlmError::EmptyResponse { provider: "mock" });
        }
        if replies.len() == 1 {
            return Ok(replies[0].clone());
        }
        Ok(replies.remove(0))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_replies_in_order_then_repeats_last() {
        let mock = MockProvider::new(vec!["one".into(), "two".into()]);
        assert_eq!(mock.chat(&[]).await.unwrap(), "one");
        assert_eq!(mock.chat(&[]).await.unwrap(), "two");
        assert_eq!(mock.chat(&[]).await.unwrap(), "two");
    }

    #[tokio::test]
    async fn records_calls() {
        let mock = MockProvider::single("ok");
        mock.chat(&[Message::user("hello")]).await.unwrap();
        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0].content, "hello");
    }

    #[tokio::test]
    async fn empty_script_errors() {
        let mock = MockProvider::new(Vec::new());
        assert!(mock.chat(&[]).await.is_err());
    }
}
