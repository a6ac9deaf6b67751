//! Sentence-respecting text chunking for embedding and retrieval.

use serde::{Deserialize, Serialize};

use crate::crawler::PageRecord;

/// Chunking knobs.
#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    /// Target upper bound on chunk length in bytes. A single sentence longer
    /// than this is emitted whole rather than truncated mid-word.
    pub max_chars: usize,
    /// Trimmed chunks below this length are discarded as noise fragments.
    pub min_chars: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: 1000,
            min_chars: 50,
        }
    }
}

/// A bounded span of page text ready for embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentChunk {
    /// URL of the page the chunk came from.
    pub url: String,
    /// Title of the source page.
    pub title: String,
    /// Chunk text.
    pub text: String,
}

/// Splits `text` into chunks of at most `config.max_chars` bytes, ending on
/// sentence boundaries where possible.
///
/// Sentences are delimited by runs of terminal punctuation (`.`, `!`, `?`)
/// and accumulated greedily; whenever the next sentence would overflow the
/// bound, the buffer is flushed and the sentence starts a new chunk. The
/// trailing buffer is flushed at end of input. Trimmed chunks shorter than
/// `config.min_chars` are dropped.
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Vec<String> {
    let max_chars = config.max_chars.max(1);
    let mut chunks = Vec::new();
    let mut buffer = String::new();

    for sentence in split_sentences(text) {
        if !buffer.is_empty() && buffer.len() + sentence.len() > max_chars {
            flush(&mut chunks, &buffer, config.min_chars);
            buffer.clear();
        }
        if buffer.is_empty() {
            buffer.push_str(sentence.trim_start());
        } else {
            buffer.push_str(sentence);
        }
    }
    flush(&mut chunks, &buffer, config.min_chars);

    chunks
}

/// Chunks every page's content, tagging each chunk with the page URL and
/// title. Pages whose content yields no chunk contribute nothing.
pub fn chunk_pages(pages: &[PageRecord], config: &ChunkConfig) -> Vec<ContentChunk> {
    pages
        .iter()
        .flat_map(|page| {
            chunk_text(&page.content, config)
                .into_iter()
                .map(move |text| ContentChunk {
                    url: page.url.clone(),
                    title: page.title.clone(),
                    text,
                })
        })
        .collect()
}

/// Splits on terminal punctuation, keeping the punctuation with the sentence
/// it ends. Trailing text without terminal punctuation forms a final unit.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut in_terminal = false;

    for (idx, ch) in text.char_indices() {
        let terminal = matches!(ch, '.' | '!' | '?');
        if in_terminal && !terminal {
            sentences.push(&text[start..idx]);
            start = idx;
        }
        in_terminal = terminal;
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
}

fn flush(chunks: &mut Vec<String>, buffer: &str, min_chars: usize) {
    let trimmed = buffer.trim();
    if !trimmed.is_empty() && trimmed.len() >= min_chars {
        chunks.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_chars: usize, min_chars: usize) -> ChunkConfig {
        ChunkConfig {
            max_chars,
            min_chars,
        }
    }

    #[test]
    fn respects_max_length_on_splittable_input() {
        let text = "One sentence here. Another sentence follows. A third one lands. \
                    And a fourth for good measure."
            .to_string();
        let chunks = chunk_text(&text, &config(50, 5));
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 50, "oversized chunk: {chunk:?}");
        }
    }

    #[test]
    fn emits_oversized_sentence_whole() {
        let long = "word ".repeat(40) + "end.";
        let chunks = chunk_text(&long, &config(50, 5));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].len() > 50);
    }

    #[test]
    fn ends_on_sentence_boundaries() {
        let text = "Alpha beta gamma delta. Epsilon zeta eta theta! Iota kappa?";
        let chunks = chunk_text(text, &config(30, 5));
        assert_eq!(
            chunks,
            vec![
                "Alpha beta gamma delta.".to_string(),
                "Epsilon zeta eta theta!".to_string(),
                "Iota kappa?".to_string(),
            ],
        );
    }

    #[test]
    fn flushes_trailing_text_without_punctuation() {
        let chunks = chunk_text("First part done. trailing words no period", &config(20, 5));
        assert_eq!(chunks.last().unwrap(), "trailing words no period");
    }

    #[test]
    fn discards_fragments_below_minimum() {
        let chunks = chunk_text(
            "Ok. This sentence is long enough to survive the filter easily.",
            &config(40, 10),
        );
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("long enough"));
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_text("", &ChunkConfig::default()).is_empty());
        assert!(chunk_text("   \n  ", &ChunkConfig::default()).is_empty());
    }

    #[test]
    fn tags_chunks_with_page_metadata() {
        let pages = vec![PageRecord {
            url: "https://example.com/a".to_string(),
            title: "A".to_string(),
            content: "This page talks about printing services in plenty of detail.".to_string(),
            depth: 0,
        }];
        let chunks = chunk_pages(&pages, &ChunkConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].url, "https://example.com/a");
        assert_eq!(chunks[0].title, "A");
    }
}
