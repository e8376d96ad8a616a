//! Recursive, separator-aware text splitter.
//!
//! Text is split on the coarsest separator present (paragraph break, line
//! break, sentence end, space) and only fragments that are still too large are
//! split again on the next finer separator, down to single characters. Small
//! fragments are then merged back into chunks of at most `chunk_size`
//! characters, carrying up to `chunk_overlap` characters of trailing context
//! into the next chunk.

use regex::Regex;
use std::collections::VecDeque;

use crate::config::ChunkingConfig;
use crate::error::{RagweaveError, Result};

/// Separators from coarsest to finest; character level is implicit.
const SEPARATORS: [&str; 4] = [r"\n\n", r"\n", r"[.!?]\s", r" "];

/// Splits extracted text into overlapping chunks.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<Regex>,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split `text` after every match of `separator`, keeping the separator on
/// the preceding piece so sentences keep their punctuation.
fn split_keeping_separator<'a>(text: &'a str, separator: &Regex) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for m in separator.find_iter(text) {
        if m.end() > start {
            pieces.push(&text[start..m.end()]);
            start = m.end();
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn split_chars(text: &str) -> Vec<&str> {
    text.char_indices()
        .map(|(i, c)| &text[i..i + c.len_utf8()])
        .collect()
}

fn push_joined(chunks: &mut Vec<String>, pieces: &VecDeque<&str>) {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagweaveError::InvalidInput(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagweaveError::InvalidInput(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }

        let separators = SEPARATORS
            .iter()
            .map(|s| Regex::new(s))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| RagweaveError::InvalidInput(format!("invalid separator: {}", e)))?;

        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into ordered, overlapping chunks.
    ///
    /// Empty or whitespace-only input yields no chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_from(text, 0)
    }

    fn split_from(&self, text: &str, level: usize) -> Vec<String> {
        let chosen = (level..self.separators.len()).find(|&i| self.separators[i].is_match(text));

        let (pieces, next_level) = match chosen {
            Some(i) => (split_keeping_separator(text, &self.separators[i]), Some(i + 1)),
            None => (split_chars(text), None),
        };

        let mut chunks = Vec::new();
        let mut small: Vec<&str> = Vec::new();

        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                small.push(piece);
                continue;
            }

            if !small.is_empty() {
                chunks.extend(self.merge(&small));
                small.clear();
            }

            match next_level {
                Some(next) => chunks.extend(self.split_from(piece, next)),
                None => {
                    // single character at chunk_size == 1
                    let trimmed = piece.trim();
                    if !trimmed.is_empty() {
                        chunks.push(trimmed.to_string());
                    }
                }
            }
        }

        if !small.is_empty() {
            chunks.extend(self.merge(&small));
        }

        chunks
    }

    /// Greedily pack pieces into chunks, keeping at most `chunk_overlap`
    /// characters of the previous chunk's tail.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !current.is_empty() {
                push_joined(&mut chunks, &current);

                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match current.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            current.push_back(piece);
            total += len;
        }

        push_joined(&mut chunks, &current);
        chunks
    }
}
