//! AI answer service client

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// One earlier turn of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// `user` or `assistant`
    pub role: String,
    pub content: String,
}

/// Reference the answer was based on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerSource {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Generated answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<AnswerSource>,
}

/// Answer service failure; the question is not counted
#[derive(Debug, thiserror::Error)]
pub enum AnswerError {
    #[error("answer service timed out")]
    Timeout,

    #[error("answer service unavailable: {0}")]
    Unavailable(String),

    #[error("invalid answer: {0}")]
    InvalidResponse(String),
}

/// Produces answers to user questions
#[async_trait]
pub trait AnswerProvider: Send + Sync {
    async fn answer(&self, question: &str, history: &[ChatTurn]) -> Result<Answer, AnswerError>;
}

#[derive(Serialize)]
struct AnswerRequest<'a> {
    question: &'a str,
    history: &'a [ChatTurn],
}

/// [`AnswerProvider`] backed by the answer service's HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpAnswerProvider {
    client: reqwest::Client,
    url: String,
}

impl HttpAnswerProvider {
    /// Create a client posting to `url`
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AnswerProvider for HttpAnswerProvider {
    #[instrument(skip_all, fields(history = history.len()))]
    async fn answer(&self, question: &str, history: &[ChatTurn]) -> Result<Answer, AnswerError> {
        let response = self
            .client
            .post(&self.url)
            .json(&AnswerRequest { question, history })
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Answer service request failed");
                if e.is_timeout() {
                    AnswerError::Timeout
                } else {
                    AnswerError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "Answer service error");
            return Err(AnswerError::Unavailable(format!("HTTP {status}")));
        }

        let answer: Answer = response
            .json()
            .await
            .map_err(|e| AnswerError::InvalidResponse(e.to_string()))?;
        if answer.answer.trim().is_empty() {
            return Err(AnswerError::InvalidResponse("empty answer".to_string()));
        }

        debug!(sources = answer.sources.len(), "Answer received");
        Ok(answer)
    }
}
