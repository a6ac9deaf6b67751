use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sitechat::{chunk_pages, ChunkConfig, CrawlOptions, Crawler, HttpFetcher};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "sitechat-scrape",
    about = "Crawl a website and write its chunked content to a JSON file"
)]
struct ScrapeCli {
    /// Start URL of the site to crawl
    #[arg(long, env = "SITECHAT_SITE_URL")]
    url: String,

    /// Maximum link depth to follow
    #[arg(long, env = "SITECHAT_MAX_DEPTH", default_value_t = 5)]
    max_depth: usize,

    /// Maximum number of pages to collect
    #[arg(long, env = "SITECHAT_MAX_PAGES", default_value_t = 200)]
    max_pages: usize,

    /// Follow links to other hosts as well
    #[arg(long, default_value_t = false)]
    allow_external: bool,

    /// Accept invalid TLS certificates (only for the known self-signed site)
    #[arg(long, default_value_t = false)]
    insecure_self_signed: bool,

    /// Target chunk size in characters
    #[arg(long, default_value_t = 1000)]
    max_chunk_chars: usize,

    /// Minimum chunk size; shorter fragments are discarded
    #[arg(long, default_value_t = 50)]
    min_chunk_chars: usize,

    /// Output path for the content file
    #[arg(long, env = "SITECHAT_CONTENT_FILE", default_value = "data/content.json")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = ScrapeCli::parse();

    let fetcher = if cli.insecure_self_signed {
        HttpFetcher::accepting_invalid_certs()
    } else {
        HttpFetcher::new()
    }
    .context("failed to build page fetcher")?;

    let options = CrawlOptions {
        max_depth: cli.max_depth,
        max_pages: cli.max_pages,
        same_domain_only: !cli.allow_external,
    };
    println!("crawling {} (depth {}, up to {} pages)...", cli.url, options.max_depth, options.max_pages);
    let crawler = Crawler::new(fetcher);
    let pages = crawler
        .crawl(&cli.url, &options)
        .await
        .context("crawl failed to start")?;
    println!("crawled {} pages", pages.len());

    let chunk_config = ChunkConfig {
        max_chars: cli.max_chunk_chars,
        min_chars: cli.min_chunk_chars,
    };
    let chunks = chunk_pages(&pages, &chunk_config);
    println!("produced {} content chunks", chunks.len());

    if let Some(parent) = cli.output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let file = File::create(&cli.output)
        .with_context(|| format!("failed to create {}", cli.output.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &chunks).context("failed to write content file")?;
    writer.flush().context("failed to flush content file")?;
    println!("saved content to {}", cli.output.display());

    Ok(())
}
