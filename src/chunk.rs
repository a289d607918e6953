//! Fixed-window text chunker.
//!
//! Splits normalized page text into overlapping windows of `chunk_size`
//! characters. Consecutive windows share exactly `overlap` characters:
//! `start[i + 1] == end[i] - overlap`, and the last window ends at the end
//! of the text, so coverage has no gaps.
//!
//! Windows are measured in `char`s, never bytes, so a window boundary can
//! not land inside a multi-byte code point.

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, ChunkMetadata, Page};
use crate::sanitize::page_url;

/// Half-open character range `[start, end)` of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Compute chunk windows for a text of `len` characters.
///
/// Empty text yields no windows. Callers must ensure `overlap < chunk_size`;
/// [`crate::config::parse_config`] enforces it for configured values.
pub fn chunk_spans(len: usize, chunk_size: usize, overlap: usize) -> Vec<Span> {
    assert!(
        overlap < chunk_size,
        "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
    );

    let mut spans = Vec::new();
    let mut start = 0;
    while start < len {
        let end = (start + chunk_size).min(len);
        spans.push(Span { start, end });
        if end == len {
            break;
        }
        start = end - overlap;
    }
    spans
}

/// Split text into overlapping windows and return their contents.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chunk_spans(chars.len(), chunk_size, overlap)
        .into_iter()
        .map(|span| chars[span.start..span.end].iter().collect())
        .collect()
}

/// Cut text down to at most `max_chars` characters.
///
/// Returns the text unchanged (borrowed) when it already fits.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Apply the page ceiling, chunk, and attach metadata.
pub fn chunk_page(page: &Page, base_url: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let text = truncate_chars(&page.text, config.max_chars);
    if text.len() < page.text.len() {
        debug!(
            page_id = %page.id,
            max_chars = config.max_chars,
            "page text truncated before chunking"
        );
    }

    let url = page_url(base_url, &page.id);
    chunk_text(text, config.chunk_size, config.overlap)
        .into_iter()
        .enumerate()
        .map(|(index, content)| make_chunk(page, &url, index, content))
        .collect()
}

fn make_chunk(page: &Page, url: &str, index: usize, content: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        page_content: content,
        metadata: ChunkMetadata {
            page_id: page.id.clone(),
            title: page.title.clone(),
            version: page.version,
            url: url.to_string(),
            chunk_index: index,
        },
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected_count(len: usize, size: usize, overlap: usize) -> usize {
        if len == 0 {
            0
        } else if len <= size {
            1
        } else {
            (len - overlap).div_ceil(size - overlap)
        }
    }

    fn reconstruct(chunks: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (i, c) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(c);
            } else {
                out.extend(c.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunk_text("", 3000, 300).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 3000, 300);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_exact_size_single_chunk() {
        let text = "a".repeat(3000);
        assert_eq!(chunk_text(&text, 3000, 300).len(), 1);
    }

    #[test]
    fn test_spans_overlap_and_end_at_len() {
        let spans = chunk_spans(10_000, 3000, 300);
        assert_eq!(spans.first().unwrap().start, 0);
        assert_eq!(spans.last().unwrap().end, 10_000);
        for pair in spans.windows(2) {
            assert_eq!(pair[1].start, pair[0].end - 300);
        }
    }

    #[test]
    fn test_count_and_reconstruction_across_sizes() {
        let base: String = (0..997).map(|i| format!("w{} ", i)).collect();
        for &(size, overlap) in &[(3000, 300), (100, 10), (7, 3), (5, 0), (2, 1)] {
            for len in [1usize, 2, 5, 99, 100, 101, 1000, 4321] {
                let text: String = base.chars().cycle().take(len).collect();
                let chunks = chunk_text(&text, size, overlap);
                assert_eq!(
                    chunks.len(),
                    expected_count(len, size, overlap),
                    "len={len} size={size} overlap={overlap}"
                );
                assert_eq!(reconstruct(&chunks, overlap), text);
                assert!(chunks.iter().all(|c| c.chars().count() <= size));
            }
        }
    }

    #[test]
    fn test_multibyte_chars_are_not_split() {
        let text = "héllo wörld ✓ ünïcode ".repeat(50);
        let chunks = chunk_text(&text, 17, 4);
        assert_eq!(reconstruct(&chunks, 4), text);
        assert!(chunks.iter().all(|c| c.chars().count() <= 17));
    }

    #[test]
    #[should_panic(expected = "overlap")]
    fn test_overlap_not_smaller_than_size_panics() {
        chunk_spans(10, 5, 5);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_chars("äöü", 2), "äö");
    }

    #[test]
    fn test_chunk_page_attaches_metadata() {
        let page = Page {
            id: "42".into(),
            title: "Runbook".into(),
            version: 7,
            text: "x".repeat(250),
        };
        let cfg = ChunkingConfig {
            chunk_size: 100,
            overlap: 10,
            max_chars: 200,
        };
        let chunks = chunk_page(&page, "https://x.atlassian.net/wiki", &cfg);
        // truncated to 200 chars: ceil((200 - 10) / 90) = 3
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.metadata.chunk_index, i);
            assert_eq!(c.metadata.page_id, "42");
            assert_eq!(c.metadata.version, 7);
            assert_eq!(
                c.metadata.url,
                "https://x.atlassian.net/wiki/pages/viewpage.action?pageId=42"
            );
            assert_eq!(c.hash.len(), 64);
        }
        assert_eq!(chunks.last().unwrap().page_content.chars().count(), 20);
    }

    #[test]
    fn test_chunk_serializes_camel_case() {
        let page = Page {
            id: "1".into(),
            title: "T".into(),
            version: 1,
            text: "body".into(),
        };
        let chunks = chunk_page(&page, "https://h/wiki", &ChunkingConfig::default());
        let json = serde_json::to_value(&chunks[0]).unwrap();
        assert_eq!(json["pageContent"], "body");
        assert_eq!(json["metadata"]["pageId"], "1");
        assert_eq!(json["metadata"]["chunkIndex"], 0);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha Beta Gamma Delta ".repeat(40);
        let c1 = chunk_text(&text, 50, 5);
        let c2 = chunk_text(&text, 50, 5);
        assert_eq!(c1, c2);
    }
}
