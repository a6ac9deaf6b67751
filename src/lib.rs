#![warn(missing_docs)]
//! Core library for the sitechat support bot: crawl a website, chunk its
//! content, and answer questions over the embedded chunks.

pub mod chunk;
pub mod completion;
pub mod crawler;
pub mod embedder;
pub mod extract;
pub mod messenger;
pub mod normalize;
pub mod retrieve;
pub mod store;
pub mod webhook;

pub use chunk::{chunk_pages, chunk_text, ChunkConfig, ContentChunk};
pub use completion::{
    answer_with_deadline, AnswerError, CompletionError, CompletionProvider, OpenAiCompletion,
    DEFAULT_ANSWER_DEADLINE,
};
pub use crawler::{
    CrawlError, CrawlOptions, Crawler, FetchError, FetchedDocument, HttpFetcher, PageFetcher,
    PageRecord,
};
pub use embedder::{EmbedError, Embedder, OpenAiEmbedder};
pub use extract::{ExtractedPage, Extractor};
pub use messenger::{Messenger, MessengerError};
pub use normalize::normalize_url;
pub use retrieve::{RetrieveError, Retriever, DEFAULT_TOP_K};
pub use store::{
    cosine_similarity, EmbeddedChunk, EmbeddingStore, LazyStore, RetrievalResult, StoreError,
};
