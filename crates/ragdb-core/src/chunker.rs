//! Fixed-window character chunking with overlap.
//!
//! Windows advance by `size - overlap` characters, so each chunk after the
//! first repeats the last `overlap` characters of its predecessor. Offsets
//! are counted in `char`s, which keeps boundaries on code points and makes
//! the output a pure function of `(document_id, text, size, overlap)`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkId, DocumentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { size: 1000, overlap: 200 }
    }
}

impl ChunkingConfig {
    pub fn new(size: usize, overlap: usize) -> Self {
        Self { size, overlap }
    }

    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::invalid_config("chunk size must be greater than 0"));
        }
        if self.overlap >= self.size {
            return Err(Error::invalid_config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.overlap, self.size
            )));
        }
        Ok(())
    }

    fn stride(&self) -> usize {
        self.size - self.overlap
    }
}

/// Split `text` into overlapping chunks.
///
/// Empty text yields no chunks. The final chunk may be shorter than `size`.
pub fn chunk(document_id: &DocumentId, text: &str, size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    let config = ChunkingConfig::new(size, overlap);
    config.validate()?;

    // Byte position of every char boundary, including the end of the text.
    let boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
    let total_chars = boundaries.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < total_chars {
        let end = (start + config.size).min(total_chars);
        let seq = u32::try_from(chunks.len())
            .map_err(|_| Error::invalid_config("document produces more chunks than a u32 can index"))?;
        chunks.push(Chunk {
            id: ChunkId::new(document_id.clone(), seq),
            text: text[boundaries[start]..boundaries[end]].to_string(),
            start,
            end,
            position: chunks.len(),
        });
        if end == total_chars {
            break;
        }
        start += config.stride();
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_is_size_minus_overlap() {
        assert_eq!(ChunkingConfig::new(100, 20).stride(), 80);
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let doc = DocumentId::from("d");
        let chunks = chunk(&doc, "héllo wörld ✓✓✓", 4, 1).expect("chunk");
        let rebuilt: String = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| if i == 0 { c.text.clone() } else { c.text.chars().skip(1).collect() })
            .collect();
        assert_eq!(rebuilt, "héllo wörld ✓✓✓");
    }
}
