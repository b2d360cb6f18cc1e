//! Retrieved grounding context.

use serde::{Deserialize, Serialize};

/// Who may see an indexed entry.
///
/// `None` fields match everything; an entry scoped to a dataset is only
/// returned for that dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Scope {
    pub fn global() -> Self {
        Self::default()
    }

    pub fn dataset(id: impl Into<String>) -> Self {
        Self {
            dataset_id: Some(id.into()),
            user_id: None,
        }
    }

    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user_id = user;
        self
    }

    /// Whether an entry stored under `self` is visible to a request made under `request`.
    pub fn admits(&self, request: &Scope) -> bool {
        let dataset_ok = match (&self.dataset_id, &request.dataset_id) {
            (None, _) => true,
            (Some(a), Some(b)) => a == b,
            (Some(_), None) => false,
        };
        let user_ok = match (&self.user_id, &request.user_id) {
            (None, _) => true,
            (Some(a), Some(b)) => a == b,
            (Some(_), None) => false,
        };
        dataset_ok && user_ok
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PastQuery {
    pub question: String,
    pub sql: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessTerm {
    pub term: String,
    pub definition: String,
    pub score: f32,
}

/// Context handed to the generation stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedContext {
    pub schema_fragments: Vec<String>,
    pub similar_queries: Vec<PastQuery>,
    pub business_terms: Vec<BusinessTerm>,
    /// Set when retrieval failed and the full schema was returned instead
    pub degraded: bool,
}

impl RetrievedContext {
    /// Prompt rendering.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        if !self.schema_fragments.is_empty() {
            out.push_str("Relevant columns:\n");
            for fragment in &self.schema_fragments {
                out.push_str(&format!("- {}\n", fragment));
            }
        }
        if !self.similar_queries.is_empty() {
            out.push_str("Similar past questions:\n");
            for q in &self.similar_queries {
                out.push_str(&format!("- Q: {}\n  SQL: {}\n", q.question, q.sql));
            }
        }
        if !self.business_terms.is_empty() {
            out.push_str("Business terms:\n");
            for t in &self.business_terms {
                out.push_str(&format!("- {}: {}\n", t.term, t.definition));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_admission() {
        let global = Scope::global();
        let sales = Scope::dataset("sales");
        let sales_alice = Scope::dataset("sales").with_user(Some("alice".into()));

        assert!(global.admits(&sales));
        assert!(sales.admits(&sales_alice));
        assert!(!sales.admits(&Scope::dataset("hr")));
        assert!(!sales_alice.admits(&sales));
        assert!(!sales.admits(&global));
    }
}
