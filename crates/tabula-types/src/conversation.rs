//! Conversation turns and follow-up resolution.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a session. Sessions are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// What a follow-up question is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpTopic {
    Refinement,
    NewTopic,
    Visualization,
    Explanation,
}

impl FollowUpTopic {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "refinement" => Some(FollowUpTopic::Refinement),
            "new_topic" => Some(FollowUpTopic::NewTopic),
            "visualization" => Some(FollowUpTopic::Visualization),
            "explanation" => Some(FollowUpTopic::Explanation),
            _ => None,
        }
    }
}

/// A question rewritten to stand on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedQuestion {
    pub original_question: String,
    pub resolved_question: String,
    pub is_follow_up: bool,
    pub topic: FollowUpTopic,
}

impl ResolvedQuestion {
    /// The question taken as-is.
    pub fn standalone(question: impl Into<String>) -> Self {
        let question = question.into();
        Self {
            original_question: question.clone(),
            resolved_question: question,
            is_follow_up: false,
            topic: FollowUpTopic::NewTopic,
        }
    }
}
