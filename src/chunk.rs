//! Recursive separator text splitter with overlapping windows.
//!
//! Text is split on the coarsest separator present (`"\n\n"`, then `"\n"`,
//! then `" "`, then individual characters). Pieces that are still too long
//! are split again with the next separator. Small pieces are merged into
//! windows of at most `chunk_size` characters, and each window starts with
//! up to `chunk_overlap` characters carried over from the previous one.
//!
//! Lengths are counted in `char`s, so a chunk never ends mid-codepoint.
//! Separators stay attached to the start of the piece that follows them,
//! and every emitted chunk is whitespace-trimmed.

use crate::config::ChunkingConfig;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy)]
pub struct Splitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Splitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Split `text` into trimmed, non-empty chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // First separator that occurs in the text; "" always matches.
        let pos = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s))
            .unwrap_or(separators.len() - 1);
        let separator = separators[pos];
        let finer = &separators[pos + 1..];

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in split_keep_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_with(piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }
        chunks
    }

    /// Merge short pieces into windows, carrying an overlap tail forward.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut out = Vec::new();
        let mut window: std::collections::VecDeque<(&str, usize)> =
            std::collections::VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut out, window.iter().map(|(p, _)| *p));
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, l)) => total -= l,
                        None => break,
                    }
                }
            }
            window.push_back((piece, len));
            total += len;
        }

        push_trimmed(&mut out, window.iter().map(|(p, _)| *p));
        out
    }
}

fn push_trimmed<'a>(out: &mut Vec<String>, parts: impl Iterator<Item = &'a str>) {
    let joined: String = parts.collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split on `separator`, attaching each separator to the following piece.
/// An empty separator splits into individual characters.
fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}
