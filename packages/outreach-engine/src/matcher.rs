use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Posting;

#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("matcher request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected matcher response: {0}")]
    Parse(String),
}

/// Semantic relevance check between a posting and the target role
/// description. Invoked by the filter pipeline only after every cheaper
/// predicate has passed, and only when the criteria enable AI matching.
#[async_trait]
pub trait SemanticMatcher: Send + Sync {
    async fn matches(&self, posting: &Posting, role_description: &str)
        -> Result<bool, MatcherError>;
}

/// Matcher backed by a chat-completions style HTTP endpoint. The model is
/// asked for a bare yes/no verdict.
pub struct HttpSemanticMatcher {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpSemanticMatcher {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn build_prompt(posting: &Posting, role_description: &str) -> String {
        format!(
            "You screen job postings for a candidate.\n\
             Target role: {role_description}\n\
             Posting: title={title}; company={company}; salary={salary}; tags={tags}\n\
             Is this posting a good match for the target role? Answer yes or no.",
            title = posting.title,
            company = posting.company,
            salary = posting.salary_text,
            tags = posting.source_tags.join(", "),
        )
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl SemanticMatcher for HttpSemanticMatcher {
    async fn matches(
        &self,
        posting: &Posting,
        role_description: &str,
    ) -> Result<bool, MatcherError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: Self::build_prompt(posting, role_description),
            }],
            temperature: 0.0,
        };

        let response: ChatResponse = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let verdict = response
            .choices
            .first()
            .map(|c| c.message.content.trim().to_lowercase())
            .ok_or_else(|| MatcherError::Parse("empty choices".to_string()))?;

        Ok(verdict.starts_with("yes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Platform;

    #[test]
    fn prompt_includes_posting_fields() {
        let mut posting = Posting::new(Platform::Boss, "j-1");
        posting.title = "Senior Rust Engineer".into();
        posting.source_tags = vec!["remote".into(), "backend".into()];

        let prompt = HttpSemanticMatcher::build_prompt(&posting, "systems programmer");
        assert!(prompt.contains("Senior Rust Engineer"));
        assert!(prompt.contains("remote, backend"));
        assert!(prompt.contains("systems programmer"));
    }
}
