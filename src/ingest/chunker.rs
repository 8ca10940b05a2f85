//! Word-window chunker.

/// Splits text into overlapping word windows for embedding.
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    /// `chunk_size` words per window, `chunk_overlap` shared with the
    /// previous window. The window is clamped to at least one word and
    /// the overlap to less than the window, so the scan always advances.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let size = chunk_size.max(1);
        let overlap = chunk_overlap.min(size - 1);
        if size != chunk_size || overlap != chunk_overlap {
            tracing::warn!(
                chunk_size,
                chunk_overlap,
                size,
                overlap,
                "invalid chunking parameters clamped"
            );
        }
        Self {
            chunk_size: size,
            chunk_overlap: overlap,
        }
    }

    /// Chunk `text` into windows. Text shorter than one window yields
    /// exactly one chunk; empty text yields none.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }

        let step = self.chunk_size - self.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end == words.len() {
                break;
            }
            start += step;
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_short_text_yields_single_chunk() {
        let chunker = TextChunker::new(220, 40);
        let chunks = chunker.chunk(&words(50));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].split_whitespace().count(), 50);
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        let chunker = TextChunker::new(220, 40);
        assert!(chunker.chunk("   ").is_empty());
    }

    #[test]
    fn test_windows_overlap_and_cover_all_words() {
        let chunker = TextChunker::new(10, 3);
        let chunks = chunker.chunk(&words(25));
        // Steps of 7: [0..10], [7..17], [14..24], [21..25].
        assert_eq!(chunks.len(), 4);
        for chunk in &chunks {
            assert!(chunk.split_whitespace().count() <= 10);
        }
        assert!(chunks[1].starts_with("w7"));
        assert!(chunks.last().unwrap().ends_with("w24"));
    }

    #[test]
    fn test_exact_window_yields_single_chunk() {
        let chunker = TextChunker::new(10, 3);
        assert_eq!(chunker.chunk(&words(10)).len(), 1);
    }

    #[test]
    fn test_overlap_at_or_above_window_is_clamped() {
        // Overlap >= size would otherwise underflow or never advance.
        for overlap in [10, 15] {
            let chunker = TextChunker::new(10, overlap);
            let chunks = chunker.chunk(&words(25));
            assert!(!chunks.is_empty());
            assert!(chunks.last().unwrap().ends_with("w24"));
        }
    }

    #[test]
    fn test_zero_window_is_clamped_to_one_word() {
        let chunker = TextChunker::new(0, 0);
        let chunks = chunker.chunk(&words(3));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], "w0");
    }
}
