//! Scripted in-memory backend for tests
//!
//! Test seam; not part of public API stability guarantees.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::LlmError;
use crate::types::{LlmBackend, LlmInvocation, LlmResult};

type Responder = Box<dyn Fn(&LlmInvocation) -> Result<String, LlmError> + Send + Sync>;

/// One recorded call to a [`ScriptedBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub run_id: String,
    pub stage: String,
    pub prompt: String,
    pub image_count: usize,
}

/// Backend that replays queued responses, then falls back to a responder.
pub struct ScriptedBackend {
    queue: Mutex<VecDeque<Result<String, LlmError>>>,
    responder: Option<Responder>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            responder: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call not covered by the queue with `f`.
    #[must_use]
    pub fn with_responder<F>(mut self, f: F) -> Self
    where
        F: Fn(&LlmInvocation) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn then_ok(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    #[must_use]
    pub fn then_err(self, err: LlmError) -> Self {
        self.push(Err(err));
        self
    }

    fn push(&self, item: Result<String, LlmError>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(item);
        }
    }

    /// Calls received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                run_id: inv.run_id.clone(),
                stage: inv.stage.clone(),
                prompt: inv.prompt.clone(),
                image_count: inv.images.len(),
            });
        }

        let queued = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        let text = match (queued, &self.responder) {
            (Some(item), _) => item?,
            (None, Some(responder)) => responder(&inv)?,
            (None, None) => {
                return Err(LlmError::Transport("scripted backend exhausted".to_string()));
            }
        };
        Ok(LlmResult::new(text, "scripted", "scripted-model"))
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }

    fn supports_images(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn inv(stage: &str) -> LlmInvocation {
        LlmInvocation::new("r", stage, "", Duration::from_secs(1), format!("prompt for {stage}"))
    }

    #[tokio::test]
    async fn test_queue_then_responder() {
        let backend = ScriptedBackend::new()
            .then_ok("first")
            .then_err(LlmError::ProviderQuota("429".to_string()))
            .with_responder(|inv| Ok(format!("echo {}", inv.stage)));

        assert_eq!(backend.invoke(inv("a")).await.unwrap().raw_response, "first");
        assert!(backend.invoke(inv("b")).await.is_err());
        assert_eq!(backend.invoke(inv("c")).await.unwrap().raw_response, "echo c");
        assert_eq!(backend.call_count(), 3);
        assert_eq!(backend.calls()[2].prompt, "prompt for c");
    }

    #[tokio::test]
    async fn test_exhausted_without_responder() {
        let backend = ScriptedBackend::new();
        assert!(matches!(
            backend.invoke(inv("a")).await,
            Err(LlmError::Transport(_))
        ));
    }
}
