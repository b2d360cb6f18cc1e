//! A completion client driven by canned responses, for tests and demos.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::{CompletionClient, CompletionRequest, LlmError};

/// Replays scripted responses and records every request.
///
/// Rules added with [`ScriptedClient::when`] answer any prompt containing
/// their marker and can fire repeatedly. Otherwise queued responses are
/// consumed in order. With neither, the call fails.
#[derive(Default)]
pub struct ScriptedClient {
    rules: Mutex<Vec<(String, Result<String, String>)>>,
    queue: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<CompletionRequest>>,
    always_fail: bool,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client whose every call fails.
    pub fn failing() -> Self {
        Self {
            always_fail: true,
            ..Self::default()
        }
    }

    /// Queue responses to be returned in order.
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        for r in responses {
            client.push(r);
        }
        client
    }

    /// Answer any prompt containing `marker` with `response`.
    pub fn when(self, marker: impl Into<String>, response: impl Into<String>) -> Self {
        self.lock_rules().push((marker.into(), Ok(response.into())));
        self
    }

    /// Fail any prompt containing `marker`.
    pub fn fail_when(self, marker: impl Into<String>, message: impl Into<String>) -> Self {
        self.lock_rules().push((marker.into(), Err(message.into())));
        self
    }

    pub fn push(&self, response: impl Into<String>) {
        self.lock_queue().push_back(Ok(response.into()));
    }

    pub fn push_error(&self, message: impl Into<String>) {
        self.lock_queue().push_back(Err(message.into()));
    }

    /// Every request seen so far.
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn lock_rules(&self) -> std::sync::MutexGuard<'_, Vec<(String, Result<String, String>)>> {
        self.rules.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, String>>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn generate(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        if self.always_fail {
            return Err(LlmError::Api("scripted failure".to_string()));
        }

        let haystack = format!(
            "{}\n{}",
            request.system_prompt.as_deref().unwrap_or(""),
            request.prompt
        );
        let rule = self
            .lock_rules()
            .iter()
            .find(|(marker, _)| haystack.contains(marker.as_str()))
            .map(|(_, r)| r.clone());

        let next = match rule {
            Some(r) => Some(r),
            None => self.lock_queue().pop_front(),
        };

        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(LlmError::Api(message)),
            None => Err(LlmError::Api("no scripted response left".to_string())),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
