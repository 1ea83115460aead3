//! Recursive boundary-aware text splitter.
//!
//! Splitting strategy, coarsest boundary first:
//! 1. Split at blank lines (paragraphs)
//! 2. Pieces still too large are split at single newlines
//! 3. Then at spaces
//! 4. Last resort: individual characters
//!
//! Small pieces are merged back up to the size budget, and consecutive
//! chunks share a tail of at most `chunk_overlap` characters. A separator
//! stays attached to the piece after it, so every chunk is a verbatim slice
//! of the input with only its edges trimmed.

use std::collections::VecDeque;

pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct SplitterConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Maximum characters repeated from the end of the previous chunk
    pub chunk_overlap: usize,
    /// Boundaries tried in order. An empty string means "between characters".
    pub separators: Vec<String>,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 150,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SplitterConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    config: SplitterConfig,
}

impl RecursiveSplitter {
    pub fn new(config: SplitterConfig) -> anyhow::Result<Self> {
        if config.chunk_size == 0 {
            anyhow::bail!("chunk_size must be positive");
        }
        if config.chunk_overlap >= config.chunk_size {
            anyhow::bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                config.chunk_overlap,
                config.chunk_size
            );
        }
        Ok(Self { config })
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.config.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        // Pick the first boundary that occurs in the text; "" always matches.
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() || text.contains(sep.as_str()) {
                separator = sep.as_str();
                remaining = &separators[i + 1..];
                break;
            }
        }

        let pieces = split_keeping_separator(text, separator);

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in pieces {
            if char_len(piece) < self.config.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if remaining.is_empty() {
                // Atomic piece longer than the budget; emitted whole.
                push_trimmed(&mut chunks, piece);
            } else {
                chunks.extend(self.split_with(piece, remaining));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }

        chunks
    }

    /// Greedily concatenate pieces up to `chunk_size`, carrying an overlap tail.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if !window.is_empty() && total + len > size {
                push_trimmed(&mut chunks, &window.iter().copied().collect::<String>());

                // Shrink to the overlap tail, and further if the next piece
                // still would not fit.
                while total > overlap || (total > 0 && total + len > size) {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(front);
                }
            }

            total += len;
            window.push_back(piece);
        }

        push_trimmed(&mut chunks, &window.iter().copied().collect::<String>());
        chunks
    }
}

/// Split `text` before every occurrence of `separator`, keeping the
/// separator at the start of the following piece. The pieces concatenate
/// back to `text` exactly.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
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

fn push_trimmed(chunks: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(size: usize, overlap: usize) -> RecursiveSplitter {
        RecursiveSplitter::new(SplitterConfig::new(size, overlap)).unwrap()
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(RecursiveSplitter::new(SplitterConfig::new(0, 0)).is_err());
        assert!(RecursiveSplitter::new(SplitterConfig::new(100, 100)).is_err());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = splitter(1000, 150).split("print(1)");
        assert_eq!(chunks, vec!["print(1)".to_string()]);
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(splitter(1000, 150).split("").is_empty());
        assert!(splitter(1000, 150).split("  \n\n  ").is_empty());
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let text = "aaaa aaaa\n\nbbbb bbbb";
        let chunks = splitter(12, 0).split(text);
        assert_eq!(chunks, vec!["aaaa aaaa".to_string(), "bbbb bbbb".to_string()]);
    }

    #[test]
    fn test_falls_back_to_words() {
        let text = "one two three four five six";
        let chunks = splitter(10, 0).split(text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 10, "chunk too long: {chunk:?}");
            assert!(!chunk.starts_with(' ') && !chunk.ends_with(' '));
        }
    }

    #[test]
    fn test_hard_cut_without_boundaries() {
        let text = "x".repeat(2500);
        let chunks = splitter(1000, 150).split(&text);
        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 1000);
        }
    }

    #[test]
    fn test_overlap_between_neighbours() {
        let words: Vec<String> = (0..400).map(|i| format!("w{i:03}")).collect();
        let text = words.join(" ");
        let chunks = splitter(100, 30).split(&text);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap();
            assert!(
                pair[1].contains(last_word),
                "expected {last_word} to be carried into the next chunk"
            );
        }
    }

    #[test]
    fn test_no_chunk_exceeds_budget_on_mixed_text() {
        let para = "fn main() {\n    println!(\"hello\");\n}\n".repeat(40);
        let text = format!("# Title\n\n{para}\n\n{}", "lorem ipsum ".repeat(200));
        for chunk in splitter(1000, 150).split(&text) {
            assert!(chunk.chars().count() <= 1000);
        }
    }

    #[test]
    fn test_multibyte_characters_counted_as_chars() {
        let text = "é".repeat(25);
        let chunks = splitter(10, 2).split(&text);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 10);
        }
    }

    #[test]
    fn test_separators_kept_at_piece_start() {
        assert_eq!(
            split_keeping_separator("a\n\n\n\nb\n\nc", "\n\n"),
            vec!["a", "\n\n", "\n\nb", "\n\nc"]
        );
        assert_eq!(split_keeping_separator("\n\nx", "\n\n"), vec!["\n\nx"]);
        assert_eq!(split_keeping_separator("ab", ""), vec!["a", "b"]);
    }

    #[test]
    fn test_whitespace_runs_survive_merging() {
        let chunks = splitter(1000, 150).split("def f():\n\n\n\n    x  =  1");
        assert_eq!(chunks, vec!["def f():\n\n\n\n    x  =  1".to_string()]);
    }

    #[test]
    fn test_chunks_are_verbatim_slices_of_source() {
        let text = "x  =  1;    ".repeat(100);
        let chunks = splitter(1000, 150).split(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 1000);
            assert!(chunk.contains("x  =  1;"), "whitespace collapsed: {chunk:?}");
            assert!(text.contains(chunk.as_str()), "not a slice of the source");
        }

        let code = "fn main() {\n\n\n    let  a = 1;\t// tab\n}\n".repeat(60);
        for chunk in splitter(200, 40).split(&code) {
            assert!(code.contains(chunk.as_str()), "not a slice: {chunk:?}");
        }
    }

    #[test]
    fn test_atomic_piece_without_char_fallback() {
        let config = SplitterConfig {
            chunk_size: 5,
            chunk_overlap: 0,
            separators: vec![" ".to_string()],
        };
        let chunks = RecursiveSplitter::new(config).unwrap().split("ab abcdefgh cd");
        assert_eq!(chunks, vec!["ab", "abcdefgh", "cd"]);
    }
}
