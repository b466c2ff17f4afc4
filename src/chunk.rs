//! Splits file text into bounded, overlapping chunks for embedding.
//!
//! Cuts prefer natural boundaries (blank line, newline, statement or brace
//! end) searched backward from the window end; a boundary is accepted only
//! past the window midpoint, otherwise the cut is a hard one at the size
//! limit. Offsets are byte offsets into the original text and always land on
//! UTF-8 character boundaries. Chunking is deterministic and covers every
//! byte of the input, so re-running it over unchanged files reproduces the
//! same chunk ids.

use sha2::{Digest, Sha256};

use crate::models::Chunk;

/// Boundary sequences in preference order. The first match past the window
/// midpoint wins; the separator stays inside the chunk it ends.
const BREAK_SEQUENCES: [&str; 6] = ["\n\n", "\n", ".", ";", "}", "{"];

/// Splits `text` into chunks of at most `max_chunk_size` bytes, consecutive
/// chunks sharing roughly `overlap` bytes. Always returns at least one chunk;
/// `overlap` must be smaller than `max_chunk_size` (enforced at config load).
pub fn chunk_file(
    project_id: &str,
    source_file: &str,
    text: &str,
    max_chunk_size: usize,
    overlap: usize,
) -> Vec<Chunk> {
    debug_assert!(max_chunk_size > 0);
    debug_assert!(overlap < max_chunk_size);

    if text.len() <= max_chunk_size {
        return vec![make_chunk(project_id, source_file, 0, 0, text.len(), text)];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0i64;

    loop {
        let window_end = floor_char_boundary(text, (start + max_chunk_size).min(text.len()));
        let end = if window_end < text.len() {
            find_break(text, start, window_end, max_chunk_size).unwrap_or(window_end)
        } else {
            window_end
        };

        chunks.push(make_chunk(project_id, source_file, index, start, end, text));
        index += 1;

        if end >= text.len() {
            break;
        }
        start = ceil_char_boundary(text, (start + 1).max(end.saturating_sub(overlap)));
    }

    chunks
}

/// Searches the window backward for the most preferred break sequence.
/// Returns the absolute byte offset just past the separator, or None when no
/// sequence lands beyond the window midpoint.
fn find_break(text: &str, start: usize, window_end: usize, max_chunk_size: usize) -> Option<usize> {
    let window = &text[start..window_end];
    for sep in BREAK_SEQUENCES {
        if let Some(pos) = window.rfind(sep) {
            if pos > max_chunk_size / 2 {
                return Some(start + pos + sep.len());
            }
        }
    }
    None
}

fn make_chunk(
    project_id: &str,
    source_file: &str,
    index: i64,
    start: usize,
    end: usize,
    text: &str,
) -> Chunk {
    let body = &text[start..end];
    let mut hasher = Sha256::new();
    hasher.update(project_id.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(source_file.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(index.to_le_bytes());
    hasher.update(b"\x1f");
    hasher.update(body.as_bytes());
    // 16 hex chars of the digest: stable across re-ingestions, short enough
    // to read in logs and CLI output.
    let hex = format!("{:x}", hasher.finalize());
    let id = hex[..16].to_string();

    Chunk {
        id,
        project_id: project_id.to_string(),
        source_file: source_file.to_string(),
        byte_start: start as i64,
        byte_end: end as i64,
        text: body.to_string(),
        chunk_index: index,
    }
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}
