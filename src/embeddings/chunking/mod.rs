
use tracing::debug;

use crate::config::ChunkingConfig;

/// A bounded, contiguous slice of a document's text, the unit of embedding
/// and retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Identifier of the document this chunk belongs to
    pub document_id: String,
    /// Display name of the parent document
    pub document_name: String,
    /// Zero-based position of this chunk within the document
    pub chunk_index: usize,
    /// The chunk text
    pub content: String,
}

/// Split a document's text into ordered, size-bounded chunks.
///
/// The first pass splits recursively on paragraph, then sentence, then word
/// boundaries, accumulating greedily up to `chunk_size` bytes and carrying
/// `chunk_overlap` trailing bytes of each chunk into the next. A second pass
/// concatenates adjacent pieces up to `max_embed_size`, the hard bound the
/// embedding provider will accept.
///
/// Empty or whitespace-only input produces zero chunks.
#[inline]
pub fn chunk_document(
    text: &str,
    document_id: &str,
    document_name: &str,
    config: &ChunkingConfig,
) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let pieces = split_with_overlap(text, config.chunk_size, config.chunk_overlap);
    let merged = merge_for_embedding(pieces, config.max_embed_size);

    let chunks: Vec<Chunk> = merged
        .into_iter()
        .enumerate()
        .map(|(chunk_index, content)| Chunk {
            document_id: document_id.to_string(),
            document_name: document_name.to_string(),
            chunk_index,
            content,
        })
        .collect();

    debug!(
        "Chunked document {} into {} pieces",
        document_id,
        chunks.len()
    );

    chunks
}

/// First pass: greedy accumulation of boundary-aligned segments with overlap
/// carry-over. Every returned piece is at most `max` bytes.
fn split_with_overlap(text: &str, max: usize, overlap: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for segment in segment_text(text, max) {
        if !current.is_empty() && current.len() + segment.len() > max {
            let finished = std::mem::take(&mut current);
            // Cap the carried tail so the next piece still fits the bound
            current = overlap_tail(&finished, overlap, max.saturating_sub(segment.len()));
            let trimmed = finished.trim();
            if !trimmed.is_empty() {
                pieces.push(trimmed.to_string());
            }
        }
        current.push_str(segment.as_ref());
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        pieces.push(trimmed.to_string());
    }

    pieces
}

/// Break `text` into segments no larger than `max` bytes, preferring
/// paragraph boundaries, then sentences, then words, then raw char runs for
/// a single token that exceeds the bound on its own. Segments concatenate
/// back to the original text, so nothing is dropped.
fn segment_text(text: &str, max: usize) -> Vec<std::borrow::Cow<'_, str>> {
    use std::borrow::Cow;

    let mut segments = Vec::new();

    for paragraph in text.split_inclusive("\n\n") {
        if paragraph.len() <= max {
            segments.push(Cow::Borrowed(paragraph));
            continue;
        }
        for sentence in paragraph.split_inclusive(['.', '!', '?']) {
            if sentence.len() <= max {
                segments.push(Cow::Borrowed(sentence));
                continue;
            }
            for word in sentence.split_inclusive(char::is_whitespace) {
                if word.len() <= max {
                    segments.push(Cow::Borrowed(word));
                } else {
                    segments.extend(hard_split(word, max).into_iter().map(Cow::Owned));
                }
            }
        }
    }

    segments
}

/// Last-resort split of a single oversized token into `max`-byte pieces,
/// cutting only at char boundaries
fn hard_split(token: &str, max: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();

    for ch in token.chars() {
        if current.len() + ch.len_utf8() > max {
            out.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        out.push(current);
    }

    out
}

/// Trailing `overlap` bytes of a finished piece, capped at `cap` and snapped
/// forward to a char boundary
fn overlap_tail(piece: &str, overlap: usize, cap: usize) -> String {
    let want = overlap.min(cap);
    if want == 0 {
        return String::new();
    }
    if piece.len() <= want {
        return piece.to_string();
    }

    let mut start = piece.len() - want;
    while !piece.is_char_boundary(start) {
        start += 1;
    }
    piece.get(start..).map_or_else(String::new, str::to_string)
}

/// Second pass: concatenate pieces up to the absolute embedding bound,
/// flushing the accumulated buffer whenever the next piece would overflow it
fn merge_for_embedding(pieces: Vec<String>, max_embed: usize) -> Vec<String> {
    let mut merged = Vec::new();
    let mut current = String::new();

    for piece in pieces {
        let joined_len = if current.is_empty() {
            piece.len()
        } else {
            current.len() + 2 + piece.len()
        };

        if !current.is_empty() && joined_len > max_embed {
            merged.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(&piece);
    }

    if !current.is_empty() {
        merged.push(current);
    }

    merged
}
