//! Answer-generation collaborator and the deadline that bounds it.

use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embedder::Embedder;
use crate::retrieve::{RetrieveError, Retriever};

/// Deadline for the retrieve-and-complete path, chosen to fit inside the
/// webhook transport's own response window.
pub const DEFAULT_ANSWER_DEADLINE: Duration = Duration::from_secs(8);

/// Errors surfaced by completion providers.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The client was constructed with unusable parameters.
    #[error("invalid completion configuration: {0}")]
    Config(String),
    /// The transport failed or the response could not be decoded.
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The endpoint answered with a non-success status.
    #[error("completion endpoint returned {status}: {body}")]
    Api {
        /// HTTP status code.
        status: StatusCode,
        /// Response body, for diagnostics.
        body: String,
    },
    /// The endpoint returned no choices.
    #[error("completion response contained no choices")]
    NoChoices,
}

/// Black-box text completion over a system prompt, retrieved context, and
/// the user's question.
pub trait CompletionProvider: Send + Sync {
    /// Produces the answer text. Errors propagate as-is; callers own the
    /// user-facing fallback.
    fn complete(
        &self,
        system_prompt: &str,
        context: &str,
        question: &str,
    ) -> Result<String, CompletionError>;
}

/// Blocking chat-completion client for OpenAI-compatible endpoints.
pub struct OpenAiCompletion {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

impl OpenAiCompletion {
    /// Builds a new completion client.
    pub fn new(api_key: String, base_url: String, model: String) -> Result<Self, CompletionError> {
        if api_key.trim().is_empty() {
            return Err(CompletionError::Config("missing API key".to_string()));
        }
        if model.trim().is_empty() {
            return Err(CompletionError::Config("missing model name".to_string()));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| CompletionError::Config("API key is not a valid header".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()?;
        let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint,
            model,
            temperature: 0.7,
            max_tokens: 500,
        })
    }

    /// Overrides the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Overrides the completion token cap.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

impl CompletionProvider for OpenAiCompletion {
    fn complete(
        &self,
        system_prompt: &str,
        context: &str,
        question: &str,
    ) -> Result<String, CompletionError> {
        let user_content = format!("Context:\n{context}\n\nQuestion: {question}");
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &user_content,
                },
            ],
        };

        let resp = self.client.post(&self.endpoint).json(&body).send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(CompletionError::Api { status, body });
        }

        let parsed: ChatResponse = resp.json()?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(CompletionError::NoChoices)
    }
}

/// Errors surfaced by the bounded answer path.
#[derive(Debug, Error)]
pub enum AnswerError {
    /// Retrieval failed before generation started.
    #[error("retrieval failed: {0}")]
    Retrieve(#[from] RetrieveError),
    /// The generation call failed.
    #[error("completion failed: {0}")]
    Completion(#[from] CompletionError),
    /// The deadline fired before an answer arrived; in-flight work is
    /// abandoned and no partial result is returned.
    #[error("answer generation exceeded the {0:?} deadline")]
    DeadlineExceeded(Duration),
    /// The worker task died before producing a result.
    #[error("answer task was aborted before completing")]
    Aborted,
}

/// Runs retrieve-then-complete on the blocking pool, raced against
/// `deadline`. The timer winning surfaces [`AnswerError::DeadlineExceeded`]
/// and control returns immediately; the abandoned request is never merged in
/// afterwards.
pub async fn answer_with_deadline<E, C>(
    retriever: Arc<Retriever<E>>,
    provider: Arc<C>,
    system_prompt: String,
    question: String,
    deadline: Duration,
) -> Result<String, AnswerError>
where
    E: Embedder + Send + Sync + 'static,
    C: CompletionProvider + ?Sized + 'static,
{
    let work = tokio::task::spawn_blocking(move || -> Result<String, AnswerError> {
        let context = retriever.retrieve(&question)?;
        let answer = provider.complete(&system_prompt, &context, &question)?;
        Ok(answer)
    });

    match tokio::time::timeout(deadline, work).await {
        Ok(Ok(result)) => result,
        Ok(Err(_join)) => Err(AnswerError::Aborted),
        Err(_elapsed) => Err(AnswerError::DeadlineExceeded(deadline)),
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}
