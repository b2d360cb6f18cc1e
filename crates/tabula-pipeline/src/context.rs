//! Follow-up question resolution.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tabula_llm::{parse_json, CompletionClient, CompletionRequest};
use tabula_types::{ConversationTurn, FollowUpTopic, ResolvedQuestion};
use tracing::{info, warn};

use crate::prompt::{self, CONTEXT_SYSTEM};
use crate::stage::{complete, StageError};

#[derive(Debug, Deserialize)]
struct RawResolution {
    #[serde(alias = "resolvedQuestion")]
    resolved_question: Option<String>,
    #[serde(default, alias = "isFollowUp")]
    is_follow_up: bool,
    #[serde(default)]
    topic: Option<String>,
}

/// Rewrites follow-up questions into standalone ones.
pub struct ContextResolver {
    client: Arc<dyn CompletionClient>,
    timeout: Duration,
    history_turns: usize,
}

impl ContextResolver {
    pub fn new(client: Arc<dyn CompletionClient>, timeout: Duration, history_turns: usize) -> Self {
        Self {
            client,
            timeout,
            history_turns,
        }
    }

    /// Resolve `question` against the last turns of `history`.
    ///
    /// Without history no call is made. Any failure returns the question unchanged.
    pub async fn resolve(&self, question: &str, history: &[ConversationTurn]) -> ResolvedQuestion {
        if history.is_empty() || self.history_turns == 0 {
            return ResolvedQuestion::standalone(question);
        }

        let recent = &history[history.len().saturating_sub(self.history_turns)..];
        match self.try_resolve(question, recent).await {
            Ok(resolved) => {
                if resolved.is_follow_up {
                    info!(resolved = %resolved.resolved_question, "follow-up resolved");
                }
                resolved
            }
            Err(e) => {
                warn!(error = %e, "context resolution failed, using question as-is");
                ResolvedQuestion::standalone(question)
            }
        }
    }

    async fn try_resolve(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<ResolvedQuestion, StageError> {
        let request = CompletionRequest::new(prompt::build_context_prompt(question, history))
            .system(CONTEXT_SYSTEM)
            .json();
        let text = complete(self.client.as_ref(), request, self.timeout, "context").await?;
        let raw: RawResolution = parse_json(&text)?;

        let resolved = raw
            .resolved_question
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .ok_or_else(|| StageError::Unusable("empty resolved question".to_string()))?;

        let topic = raw
            .topic
            .as_deref()
            .and_then(FollowUpTopic::parse)
            .unwrap_or(if raw.is_follow_up {
                FollowUpTopic::Refinement
            } else {
                FollowUpTopic::NewTopic
            });

        Ok(ResolvedQuestion {
            original_question: question.to_string(),
            resolved_question: resolved,
            is_follow_up: raw.is_follow_up,
            topic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_llm::ScriptedClient;

    fn history() -> Vec<ConversationTurn> {
        vec![
            ConversationTurn::user("total sales by region"),
            ConversationTurn::assistant("East leads with 300."),
        ]
    }

    #[tokio::test]
    async fn test_no_history_short_circuits() {
        let client = Arc::new(ScriptedClient::new());
        let resolver = ContextResolver::new(client.clone(), Duration::from_secs(5), 5);

        let resolved = resolver.resolve("what about costs?", &[]).await;
        assert_eq!(resolved.resolved_question, "what about costs?");
        assert!(!resolved.is_follow_up);
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_follow_up_rewritten() {
        let client = Arc::new(ScriptedClient::with_responses([
            r#"```json
{"resolved_question": "total costs by region", "is_follow_up": true, "topic": "refinement"}
```"#,
        ]));
        let resolver = ContextResolver::new(client.clone(), Duration::from_secs(5), 5);

        let resolved = resolver.resolve("what about costs?", &history()).await;
        assert_eq!(resolved.resolved_question, "total costs by region");
        assert_eq!(resolved.original_question, "what about costs?");
        assert!(resolved.is_follow_up);
        assert_eq!(resolved.topic, FollowUpTopic::Refinement);
    }

    #[tokio::test]
    async fn test_failure_falls_back() {
        let resolver = ContextResolver::new(
            Arc::new(ScriptedClient::with_responses(["not json at all"])),
            Duration::from_secs(5),
            5,
        );
        let resolved = resolver.resolve("what about costs?", &history()).await;
        assert_eq!(resolved.resolved_question, "what about costs?");
        assert!(!resolved.is_follow_up);
    }

    #[tokio::test]
    async fn test_only_recent_turns_are_sent() {
        let client = Arc::new(ScriptedClient::with_responses([
            r#"{"resolved_question": "q", "is_follow_up": false}"#,
        ]));
        let resolver = ContextResolver::new(client.clone(), Duration::from_secs(5), 1);

        let mut turns = history();
        turns.insert(0, ConversationTurn::user("an old question about churn"));
        resolver.resolve("q", &turns).await;

        let prompt = &client.calls()[0].prompt;
        assert!(!prompt.contains("churn"));
        assert!(prompt.contains("East leads"));
    }
}
