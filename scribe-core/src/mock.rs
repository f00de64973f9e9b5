//! Deterministic generator for tests and dry runs.
//!
//! ```rust
//! use scribe_core::mock::MockGenerator;
//!
//! let generator = MockGenerator::new()
//!     .with_fixed_response("# Title")
//!     .then_fail("quota exceeded");
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::generation::{GenerationError, TextGenerator};

/// A recorded `generate` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub prompt: String,
    pub max_tokens: u32,
    pub system: String,
}

#[derive(Debug, Clone)]
enum Scripted {
    Text(String),
    Fail(String),
}

/// Replays scripted outcomes in order, then falls back to the fixed response.
#[derive(Clone, Default)]
pub struct MockGenerator {
    default_response: String,
    script: Arc<Mutex<VecDeque<Scripted>>>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Response returned once the script is exhausted.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = response.into();
        self
    }

    /// Queue a successful response.
    pub fn then_respond(self, response: impl Into<String>) -> Self {
        self.push(Scripted::Text(response.into()));
        self
    }

    /// Queue a backend failure.
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.push(Scripted::Fail(message.into()));
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.call_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls().len()
    }

    fn push(&self, item: Scripted) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(item);
        }
    }

    fn next(&self) -> Option<Scripted> {
        self.script.lock().ok().and_then(|mut script| script.pop_front())
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        system: &str,
    ) -> Result<String, GenerationError> {
        if let Ok(mut log) = self.call_log.lock() {
            log.push(MockCall {
                prompt: prompt.to_string(),
                max_tokens,
                system: system.to_string(),
            });
        }

        match self.next() {
            Some(Scripted::Text(text)) => Ok(text),
            Some(Scripted::Fail(message)) => Err(GenerationError::Backend(message)),
            None => Ok(self.default_response.clone()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_replays_in_order_then_falls_back() {
        let generator = MockGenerator::new()
            .with_fixed_response("default")
            .then_fail("boom")
            .then_respond("second");

        assert!(matches!(
            generator.generate("a", 1, "s").await,
            Err(GenerationError::Backend(m)) if m == "boom"
        ));
        assert_eq!(generator.generate("b", 1, "s").await.unwrap(), "second");
        assert_eq!(generator.generate("c", 1, "s").await.unwrap(), "default");
        assert_eq!(generator.call_count(), 3);
        assert_eq!(generator.calls()[1].prompt, "b");
    }

    #[tokio::test]
    async fn test_clones_share_script_and_log() {
        let generator = MockGenerator::new().then_respond("once");
        let clone = generator.clone();

        assert_eq!(clone.generate("p", 5, "s").await.unwrap(), "once");
        assert_eq!(generator.generate("p", 5, "s").await.unwrap(), "");
        assert_eq!(generator.call_count(), 2);
    }
}
