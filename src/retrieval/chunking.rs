//! Fixed-window text chunking.

/// Splits text into non-overlapping windows of `chunk_size` characters.
///
/// Windows are counted in `char`s, so multi-byte text is never split inside
/// a code point. The final window may be shorter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    pub chunk_size: usize,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self { chunk_size: 1000 }
    }
}

impl ChunkPolicy {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let size = self.chunk_size.max(1);
        let mut chunks = Vec::with_capacity(text.len() / size + 1);
        let mut start = 0;
        let mut count = 0;
        for (offset, _) in text.char_indices() {
            if count == size {
                chunks.push(&text[start..offset]);
                start = offset;
                count = 0;
            }
            count += 1;
        }
        if start < text.len() {
            chunks.push(&text[start..]);
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_into_fixed_windows_with_short_tail() {
        let text = "a".repeat(3500);

        let lengths: Vec<usize> = ChunkPolicy::default()
            .split(&text)
            .iter()
            .map(|c| c.len())
            .collect();

        assert_eq!(lengths, vec![1000, 1000, 1000, 500]);
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        assert_eq!(ChunkPolicy::new(4).split("abcdefgh"), vec!["abcd", "efgh"]);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(ChunkPolicy::default().split("").is_empty());
    }

    #[test]
    fn counts_characters_not_bytes() {
        let chunks = ChunkPolicy::new(2).split("héllo");

        assert_eq!(chunks, vec!["hé", "ll", "o"]);
    }

    #[test]
    fn chunks_reassemble_to_input() {
        let text = "The quick brown fox\njumps over the lazy dog.";

        assert_eq!(ChunkPolicy::new(7).split(text).concat(), text);
    }
}
