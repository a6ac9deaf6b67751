use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use lru::LruCache;
use serde::Deserialize;
use serde_json::json;
use sitechat::webhook::{verify_signature, WebhookEvent};
use sitechat::{
    answer_with_deadline, EmbedError, Embedder, LazyStore, Messenger, OpenAiCompletion,
    OpenAiEmbedder, Retriever,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_SYSTEM_PROMPT: &str = "You are the support assistant for this website. \
Answer using only the information from the provided context. If the context does not \
cover the question, ask for clarification or suggest contacting the team directly. \
Never invent prices, deadlines, or policies. Keep replies short, professional, and polite.";

const DEFAULT_FALLBACK_REPLY: &str =
    "Sorry, we ran into a technical problem. Please try again later.";

#[derive(Parser, Debug)]
#[command(
    name = "sitechat-server",
    about = "Webhook service that answers incoming messages from the embedded site content"
)]
struct ServerCli {
    /// Address to bind the HTTP server to (host:port)
    #[arg(long, env = "SITECHAT_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Embedding snapshot produced by sitechat-embed
    #[arg(long, env = "SITECHAT_SNAPSHOT", default_value = "data/embeddings.json")]
    snapshot: PathBuf,

    /// Token echoed back during the webhook verification handshake
    #[arg(long, env = "SITECHAT_VERIFY_TOKEN")]
    verify_token: String,

    /// App secret for payload signature verification (unset disables the check)
    #[arg(long, env = "SITECHAT_APP_SECRET")]
    app_secret: Option<String>,

    /// Page access token for outbound replies
    #[arg(long, env = "SITECHAT_PAGE_ACCESS_TOKEN")]
    page_access_token: String,

    /// OpenAI API key for embeddings and completions
    #[arg(long, env = "OPENAI_API_KEY")]
    openai_api_key: String,

    /// Embedding model identifier
    #[arg(long, env = "SITECHAT_EMBED_MODEL", default_value = "text-embedding-3-small")]
    embed_model: String,

    /// Chat model used to draft replies
    #[arg(long, env = "SITECHAT_CHAT_MODEL", default_value = "gpt-4o-mini")]
    chat_model: String,

    /// Base URL for OpenAI-compatible endpoints
    #[arg(long, env = "SITECHAT_OPENAI_BASE", default_value = "https://api.openai.com/v1")]
    openai_base_url: String,

    /// System prompt steering the assistant
    #[arg(long, env = "SITECHAT_SYSTEM_PROMPT", default_value = DEFAULT_SYSTEM_PROMPT)]
    system_prompt: String,

    /// Reply sent when answer generation fails
    #[arg(long, env = "SITECHAT_FALLBACK_REPLY", default_value = DEFAULT_FALLBACK_REPLY)]
    fallback_reply: String,

    /// Chunks retrieved into the context window
    #[arg(long, default_value_t = 5)]
    top_k: usize,

    /// Seconds allowed for the retrieve-and-complete path
    #[arg(long, default_value_t = 8)]
    answer_deadline_secs: u64,

    /// Max cached query embeddings (0 disables caching)
    #[arg(long, default_value_t = 1024)]
    embedding_cache_size: usize,
}

/// Query-embedding client with a small LRU in front, so repeated questions
/// skip the embedding call.
struct CachedEmbedder {
    inner: OpenAiEmbedder,
    cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
}

impl CachedEmbedder {
    fn new(inner: OpenAiEmbedder, cache_size: usize) -> Self {
        let cache = NonZeroUsize::new(cache_size).map(|capacity| Mutex::new(LruCache::new(capacity)));
        Self { inner, cache }
    }
}

impl Embedder for CachedEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if let Some(cache) = &self.cache {
            let mut guard = cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(hit) = guard.get(text) {
                return Ok(hit.clone());
            }
        }

        let vector = self.inner.embed(text)?;

        if let Some(cache) = &self.cache {
            let mut guard = cache.lock().unwrap_or_else(PoisonError::into_inner);
            guard.put(text.to_string(), vector.clone());
        }
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.inner.embed_batch(texts)
    }
}

#[derive(Clone)]
struct AppState {
    verify_token: Arc<str>,
    app_secret: Option<Arc<str>>,
    retriever: Arc<Retriever<CachedEmbedder>>,
    completion: Arc<OpenAiCompletion>,
    messenger: Arc<Messenger>,
    system_prompt: Arc<str>,
    fallback_reply: Arc<str>,
    deadline: Duration,
}

#[derive(Debug, Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = ServerCli::parse();

    let embedder = OpenAiEmbedder::new(
        cli.openai_api_key.clone(),
        cli.openai_base_url.clone(),
        cli.embed_model,
        None,
        Duration::from_secs(30),
        3,
        32,
    )
    .context("failed to build embedding client")?;
    let completion = OpenAiCompletion::new(
        cli.openai_api_key,
        cli.openai_base_url,
        cli.chat_model,
    )
    .context("failed to build completion client")?;
    let messenger = Messenger::new(cli.page_access_token)
        .context("failed to build messenger client")?;

    let store = Arc::new(LazyStore::new(cli.snapshot));
    let retriever = Retriever::new(
        store,
        CachedEmbedder::new(embedder, cli.embedding_cache_size),
    )
    .with_top_k(cli.top_k);

    let state = AppState {
        verify_token: cli.verify_token.into(),
        app_secret: cli.app_secret.map(Arc::from),
        retriever: Arc::new(retriever),
        completion: Arc::new(completion),
        messenger: Arc::new(messenger),
        system_prompt: cli.system_prompt.into(),
        fallback_reply: cli.fallback_reply.into(),
        deadline: Duration::from_secs(cli.answer_deadline_secs.max(1)),
    };
    if state.app_secret.is_none() {
        warn!("SITECHAT_APP_SECRET is unset; webhook signatures will not be checked");
    }

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .with_state(state);

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "sitechat-server listening");
    axum::serve(listener, app).await.context("server shutdown")?;
    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Response {
    let mode_ok = params.mode.as_deref() == Some("subscribe");
    let token_ok = params.verify_token.as_deref() == Some(state.verify_token.as_ref());
    if mode_ok && token_ok {
        info!("webhook verification handshake accepted");
        (StatusCode::OK, params.challenge.unwrap_or_default()).into_response()
    } else {
        warn!("webhook verification handshake rejected");
        (StatusCode::FORBIDDEN, "Forbidden").into_response()
    }
}

async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = &state.app_secret {
        let signature = headers
            .get("x-hub-signature-256")
            .and_then(|value| value.to_str().ok());
        let verified = signature
            .map(|header| verify_signature(&body, header, secret))
            .unwrap_or(false);
        if !verified {
            warn!("rejecting webhook delivery with missing or invalid signature");
            return (StatusCode::FORBIDDEN, "invalid signature").into_response();
        }
    }

    let event = match WebhookEvent::parse(&body) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "rejecting malformed webhook payload");
            return (StatusCode::BAD_REQUEST, "malformed payload").into_response();
        }
    };

    if event.object == "instagram" {
        for message in event.text_messages() {
            // Answer off the request path; the webhook must ACK promptly.
            tokio::spawn(handle_message(
                state.clone(),
                message.sender_id.to_string(),
                message.text.to_string(),
            ));
        }
    } else {
        debug!(object = %event.object, "ignoring delivery for unhandled object");
    }

    Json(json!({ "success": true })).into_response()
}

async fn handle_message(state: AppState, sender_id: String, text: String) {
    info!(%sender_id, "handling inbound message");

    if let Err(err) = state.messenger.mark_seen(&sender_id).await {
        debug!(error = %err, "mark-seen failed");
    }
    if let Err(err) = state.messenger.send_typing_indicator(&sender_id).await {
        debug!(error = %err, "typing indicator failed");
    }

    let reply = match answer_with_deadline(
        Arc::clone(&state.retriever),
        Arc::clone(&state.completion),
        state.system_prompt.as_ref().to_string(),
        text,
        state.deadline,
    )
    .await
    {
        Ok(answer) => answer,
        Err(err) => {
            error!(%sender_id, error = %err, "failed to generate answer; sending fallback");
            state.fallback_reply.as_ref().to_string()
        }
    };

    if let Err(err) = state.messenger.send_message(&sender_id, &reply).await {
        error!(%sender_id, error = %err, "failed to deliver reply");
    }
}
