use crate::domain::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkConfig {
    pub max_chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 1000,
            overlap: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub chunk_index: usize,
}

/// Greedy character-window splitter with overlap.
///
/// Each window covers at most `max_chunk_size` characters. When the text
/// continues past the window, the cut moves back to the last line break in
/// the window tail, and the next window starts `overlap` characters before
/// the cut.
pub struct ChunkEngine {
    config: ChunkConfig,
}

impl ChunkEngine {
    pub fn new(config: ChunkConfig) -> Result<Self> {
        if config.max_chunk_size == 0 {
            return Err(AppError::Configuration(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if config.overlap >= config.max_chunk_size {
            return Err(AppError::Configuration(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                config.overlap, config.max_chunk_size
            )));
        }
        Ok(Self { config })
    }

    pub fn chunk_text(&self, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= self.config.max_chunk_size {
            return vec![Chunk {
                content: text.to_string(),
                chunk_index: 0,
            }];
        }

        self.split_with_overlap(&chars)
    }

    fn split_with_overlap(&self, chars: &[char]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let mut end = std::cmp::min(start + self.config.max_chunk_size, chars.len());

            if end < chars.len() {
                end = self.find_line_boundary(chars, start, end);
            }

            chunks.push(Chunk {
                content: chars[start..end].iter().collect(),
                chunk_index: chunks.len(),
            });

            if end >= chars.len() {
                break;
            }

            // The line-break search never cuts at or before start + overlap,
            // so every step advances.
            start = end - self.config.overlap;
        }

        chunks
    }

    /// Last line break in the window tail, cutting just after it.
    fn find_line_boundary(&self, chars: &[char], start: usize, max_end: usize) -> usize {
        let floor = start + self.config.overlap + 1;
        let search_start = std::cmp::max(floor, max_end.saturating_sub(self.config.overlap));

        for i in (search_start..max_end).rev() {
            if chars[i] == '\n' && i + 1 > floor {
                return i + 1;
            }
        }

        max_end
    }
}
