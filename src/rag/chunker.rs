//! Overlapping fixed-size text splitting.
//!
//! Lengths are counted in `char`s. Each chunk ends at the best boundary found
//! in the second half of its window (paragraph, then sentence, then
//! whitespace, then a hard cut) and the next chunk starts exactly
//! `chunk_overlap` characters before that end. Dropping the first
//! `chunk_overlap` characters of every chunk after the first and
//! concatenating therefore gives back the input unchanged.

use crate::core::config::settings::ChunkingSettings;
use crate::pipeline::types::{Chunk, PageMetadata};

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// `chunk_overlap` is clamped below `chunk_size` so every step makes progress.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn from_settings(settings: &ChunkingSettings) -> Self {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn chunk(&self, text: &str, metadata: &PageMetadata) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        self.spans(&chars)
            .into_iter()
            .map(|(start, end)| Chunk {
                content: chars[start..end].iter().collect(),
                metadata: metadata.clone(),
            })
            .collect()
    }

    fn spans(&self, chars: &[char]) -> Vec<(usize, usize)> {
        let total = chars.len();
        let mut spans = Vec::new();
        if total == 0 {
            return spans;
        }

        let mut start = 0;
        loop {
            let hard_end = (start + self.chunk_size).min(total);
            if hard_end == total {
                spans.push((start, total));
                break;
            }

            let min_end = start + (self.chunk_overlap + 1).max(self.chunk_size / 2);
            let end = find_break(chars, min_end, hard_end);
            spans.push((start, end));
            start = end - self.chunk_overlap;
        }

        spans
    }
}

/// Picks the cut position in `[min_end, hard_end]`, latest first within each class.
fn find_break(chars: &[char], min_end: usize, hard_end: usize) -> usize {
    let is_paragraph = |p: usize| p >= 2 && chars[p - 2] == '\n' && chars[p - 1] == '\n';
    let is_sentence = |p: usize| {
        p >= 2 && matches!(chars[p - 2], '.' | '!' | '?') && chars[p - 1].is_whitespace()
    };
    let is_word = |p: usize| p >= 1 && chars[p - 1].is_whitespace();

    last_position(min_end, hard_end, is_paragraph)
        .or_else(|| last_position(min_end, hard_end, is_sentence))
        .or_else(|| last_position(min_end, hard_end, is_word))
        .unwrap_or(hard_end)
}

fn last_position(lo: usize, hi: usize, accept: impl Fn(usize) -> bool) -> Option<usize> {
    (lo..=hi).rev().find(|&p| accept(p))
}
