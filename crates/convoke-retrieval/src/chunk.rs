//! Document chunking for ingestion.
//!
//! Documents are split on paragraph boundaries and packed into chunks of at
//! most `max_chars`, with a tail overlap carried between consecutive chunks
//! so sentence fragments near a boundary stay findable.  A single paragraph
//! longer than the budget is hard-split at char boundaries.

/// Default chunk budget in characters.
pub const DEFAULT_CHUNK_CHARS: usize = 1_200;

/// Default overlap carried into the next chunk.
pub const DEFAULT_CHUNK_OVERLAP: usize = 120;

/// Paragraph-packing chunker.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    max_chars: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(max_chars: usize, overlap: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
            overlap: overlap.min(max_chars / 2),
        }
    }

    /// Split `text` into retrieval-sized chunks.  Empty input yields no
    /// chunks; whitespace-only paragraphs are dropped.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();

        for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            for piece in self.hard_split(paragraph) {
                let separator = if current.is_empty() { 0 } else { 2 };
                if !current.is_empty()
                    && current.chars().count() + separator + piece.chars().count() > self.max_chars
                {
                    let tail = self.tail_of(&current);
                    chunks.push(std::mem::take(&mut current));
                    current = tail;
                    if !current.is_empty() {
                        current.push_str("\n\n");
                    }
                }
                if !current.is_empty() && !current.ends_with("\n\n") {
                    current.push_str("\n\n");
                }
                current.push_str(&piece);
            }
        }

        if !current.trim().is_empty() {
            chunks.push(current);
        }
        chunks
    }

    /// Split an oversize paragraph at char boundaries.
    fn hard_split(&self, paragraph: &str) -> Vec<String> {
        if paragraph.chars().count() <= self.max_chars {
            return vec![paragraph.to_string()];
        }

        let chars: Vec<char> = paragraph.chars().collect();
        chars
            .chunks(self.max_chars)
            .map(|piece| piece.iter().collect())
            .collect()
    }

    /// The overlap tail carried into the next chunk.
    fn tail_of(&self, chunk: &str) -> String {
        if self.overlap == 0 {
            return String::new();
        }
        let count = chunk.chars().count();
        if count <= self.overlap {
            return chunk.to_string();
        }
        chunk.chars().skip(count - self.overlap).collect()
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_CHARS, DEFAULT_CHUNK_OVERLAP)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_document_is_one_chunk() {
        let chunker = Chunker::new(100, 10);
        let chunks = chunker.chunk("one paragraph\n\nanother paragraph");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("one paragraph"));
        assert!(chunks[0].contains("another paragraph"));
    }

    #[test]
    fn empty_input_yields_nothing() {
        let chunker = Chunker::default();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("\n\n   \n\n").is_empty());
    }

    #[test]
    fn paragraphs_pack_up_to_the_budget() {
        let chunker = Chunker::new(30, 0);
        let text = "aaaaaaaaaa\n\nbbbbbbbbbb\n\ncccccccccc\n\ndddddddddd";
        let chunks = chunker.chunk(text);

        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 30, "chunk too large: {chunk:?}");
        }
        let joined = chunks.join(" ");
        for part in ["aaaaaaaaaa", "bbbbbbbbbb", "cccccccccc", "dddddddddd"] {
            assert!(joined.contains(part));
        }
    }

    #[test]
    fn oversize_paragraph_is_hard_split() {
        let chunker = Chunker::new(10, 0);
        let chunks = chunker.chunk(&"x".repeat(25));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 10);
        assert_eq!(chunks[2].chars().count(), 5);
    }

    #[test]
    fn overlap_carries_tail_between_chunks() {
        let chunker = Chunker::new(20, 5);
        let text = "aaaaaaaaaaaaaaa\n\nbbbbbbbbbbbbbbb";
        let chunks = chunker.chunk(text);

        assert_eq!(chunks.len(), 2);
        // The second chunk starts with the tail of the first.
        assert!(chunks[1].starts_with("aaaaa"));
        assert!(chunks[1].contains("bbbbb"));
    }

    #[test]
    fn multibyte_text_splits_cleanly() {
        let chunker = Chunker::new(4, 0);
        let chunks = chunker.chunk("αβγδεζη");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "αβγδ");
        assert_eq!(chunks[1], "εζη");
    }
}
