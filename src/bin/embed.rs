use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sitechat::{ContentChunk, EmbeddedChunk, Embedder, OpenAiEmbedder};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "sitechat-embed",
    about = "Embed scraped content chunks and write the snapshot the retriever serves from"
)]
struct EmbedCli {
    /// Content file produced by sitechat-scrape
    #[arg(long, env = "SITECHAT_CONTENT_FILE", default_value = "data/content.json")]
    input: PathBuf,

    /// Output path for the embedding snapshot
    #[arg(long, env = "SITECHAT_SNAPSHOT", default_value = "data/embeddings.json")]
    output: PathBuf,

    /// OpenAI API key used for embedding calls
    #[arg(long, env = "OPENAI_API_KEY")]
    openai_api_key: String,

    /// Embedding model identifier
    #[arg(long, env = "SITECHAT_EMBED_MODEL", default_value = "text-embedding-3-small")]
    model: String,

    /// Base URL for OpenAI-compatible endpoints
    #[arg(long, env = "SITECHAT_OPENAI_BASE", default_value = "https://api.openai.com/v1")]
    base_url: String,

    /// Optional embedding dimension override
    #[arg(long, env = "SITECHAT_OPENAI_DIMENSIONS")]
    dimensions: Option<usize>,

    /// Chunks sent per embedding request
    #[arg(long, default_value_t = 100)]
    batch_size: usize,

    /// Seconds before embedding requests time out
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Retry attempts for rate limits and transient errors
    #[arg(long, default_value_t = 5)]
    max_retries: usize,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = EmbedCli::parse();

    let input = File::open(&cli.input)
        .with_context(|| format!("failed to open {}", cli.input.display()))?;
    let chunks: Vec<ContentChunk> = serde_json::from_reader(BufReader::new(input))
        .context("failed to parse content file")?;
    println!("read {} chunks from {}", chunks.len(), cli.input.display());

    let batch_size = cli.batch_size.max(1);
    let embedder = OpenAiEmbedder::new(
        cli.openai_api_key,
        cli.base_url,
        cli.model,
        cli.dimensions,
        Duration::from_secs(cli.timeout_secs.max(1)),
        cli.max_retries.max(1),
        batch_size,
    )
    .context("failed to build embedding client")?;

    let total_batches = chunks.len().div_ceil(batch_size).max(1);
    let mut embedded: Vec<EmbeddedChunk> = Vec::with_capacity(chunks.len());

    for (index, batch) in chunks.chunks(batch_size).enumerate() {
        println!("embedding batch {}/{}...", index + 1, total_batches);
        // Newlines degrade embedding quality on some models; flatten first.
        let inputs: Vec<String> = batch.iter().map(|c| c.text.replace('\n', " ")).collect();
        let refs: Vec<&str> = inputs.iter().map(String::as_str).collect();
        match embedder.embed_batch(&refs) {
            Ok(vectors) => {
                for (chunk, embedding) in batch.iter().zip(vectors) {
                    embedded.push(EmbeddedChunk {
                        url: chunk.url.clone(),
                        title: chunk.title.clone(),
                        text: chunk.text.clone(),
                        embedding,
                    });
                }
            }
            Err(err) => {
                warn!(batch = index + 1, error = %err, "embedding batch failed; skipping");
            }
        }
    }
    println!("generated {} embeddings", embedded.len());

    if let Some(parent) = cli.output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let output = File::create(&cli.output)
        .with_context(|| format!("failed to create {}", cli.output.display()))?;
    let mut writer = BufWriter::new(output);
    serde_json::to_writer(&mut writer, &embedded).context("failed to write snapshot")?;
    writer.flush().context("failed to flush snapshot")?;
    println!("saved snapshot to {}", cli.output.display());

    Ok(())
}
