//! Optional sentence-aware splitting of loaded segments into chunks

use serde_json::Value;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkingConfig;
use crate::types::chunk::CHUNK_KEY;
use crate::types::Chunk;

use super::parser::Segment;

/// Text chunker with configurable size and overlap (both in characters)
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl TextChunker {
    /// Create a new chunker; overlap is clamped below the chunk size
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    /// Split text into pieces of at most `chunk_size` characters where
    /// sentence and word boundaries allow
    pub fn split(&self, text: &str) -> Vec<String> {
        if char_len(text) <= self.chunk_size {
            return vec![text.to_string()];
        }

        let mut pieces = Vec::new();
        let mut current = String::new();
        // Characters carried over from the previous piece
        let mut carried = 0;

        for unit in self.units(text) {
            let unit_len = char_len(&unit);
            let len = char_len(&current);
            if len > carried && !current.trim().is_empty() && len + unit_len > self.chunk_size {
                pieces.push(current.trim().to_string());
                current = tail(&current, self.overlap);
                carried = char_len(&current);
            }
            // Only carried overlap (or whitespace) is left; shrink it so the piece fits
            if char_len(&current) + unit_len > self.chunk_size {
                current = tail(&current, self.chunk_size.saturating_sub(unit_len));
                carried = carried.min(char_len(&current));
            }
            current.push_str(&unit);
        }

        if char_len(&current) > carried && !current.trim().is_empty() {
            pieces.push(current.trim().to_string());
        }

        pieces
    }

    /// Sentences, with over-long sentences broken on word boundaries
    fn units(&self, text: &str) -> Vec<String> {
        let mut units = Vec::new();
        for sentence in text.split_sentence_bounds() {
            if char_len(sentence) <= self.chunk_size {
                units.push(sentence.to_string());
                continue;
            }

            let mut group = String::new();
            for word in sentence.split_word_bounds() {
                if !group.is_empty() && char_len(&group) + char_len(word) > self.chunk_size {
                    units.push(std::mem::take(&mut group));
                }
                if char_len(word) > self.chunk_size {
                    let chars: Vec<char> = word.chars().collect();
                    units.extend(chars.chunks(self.chunk_size).map(|c| c.iter().collect()));
                    continue;
                }
                group.push_str(word);
            }
            if !group.is_empty() {
                units.push(group);
            }
        }
        units
    }
}

/// Converts segments to chunks, splitting only when enabled
#[derive(Debug, Clone)]
pub struct Chunker {
    splitter: Option<TextChunker>,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            splitter: config
                .enabled
                .then(|| TextChunker::new(config.chunk_size, config.chunk_overlap)),
        }
    }

    /// Each segment becomes one chunk verbatim, or (when splitting) one chunk
    /// per piece tagged with its `chunk` index
    pub fn chunk_segments(&self, segments: Vec<Segment>) -> Vec<Chunk> {
        let Some(splitter) = &self.splitter else {
            return segments
                .into_iter()
                .map(|s| Chunk::new(s.text, s.metadata))
                .collect();
        };

        let mut chunks = Vec::new();
        for segment in segments {
            for (i, piece) in splitter.split(&segment.text).into_iter().enumerate() {
                let mut metadata = segment.metadata.clone();
                metadata.insert(CHUNK_KEY.to_string(), Value::from(i));
                chunks.push(Chunk::new(piece, metadata));
            }
        }
        chunks
    }
}

/// At most the last `max` characters of `text`, starting at a word boundary if possible
fn tail(text: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }

    let total = char_len(text);
    if total <= max {
        return text.to_string();
    }

    let start = text
        .char_indices()
        .nth(total - max)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let tail = &text[start..];

    match tail.find(' ') {
        Some(pos) if pos + 1 < tail.len() => tail[pos + 1..].to_string(),
        _ => tail.to_string(),
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkMetadata;
    use serde_json::json;

    fn segment(text: &str) -> Segment {
        let mut metadata = ChunkMetadata::new();
        metadata.insert("source".to_string(), json!("doc.pdf"));
        metadata.insert("page".to_string(), json!(3));
        Segment {
            text: text.to_string(),
            metadata,
        }
    }

    #[test]
    fn test_disabled_keeps_segments_verbatim() {
        let chunker = Chunker::new(&ChunkingConfig::default());
        let long = "A sentence. ".repeat(500);
        let chunks = chunker.chunk_segments(vec![segment(&long), segment("short")]);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, long);
        assert!(chunks[0].metadata.get("chunk").is_none());
        assert_eq!(chunks[1].metadata.get("page"), Some(&json!(3)));
    }

    #[test]
    fn test_split_respects_size() {
        let splitter = TextChunker::new(60, 15);
        let text = "The first sentence is here. The second one follows it. \
                    A third sentence appears. And finally a fourth sentence ends it.";
        let pieces = splitter.split(text);

        assert!(pieces.len() > 1);
        for piece in &pieces {
            assert!(piece.chars().count() <= 60, "piece too long: {:?}", piece);
        }
        assert!(pieces[0].starts_with("The first sentence"));
        assert!(pieces.last().unwrap().ends_with("ends it."));
    }

    #[test]
    fn test_pieces_overlap() {
        let splitter = TextChunker::new(40, 12);
        let pieces = splitter.split("Alpha beta gamma delta. Epsilon zeta eta theta. Iota kappa lambda mu.");

        assert!(pieces.len() >= 2);
        let tail: String = pieces[0].split_whitespace().last().unwrap().to_string();
        assert!(pieces[1].contains(&tail), "{:?}", pieces);
    }

    #[test]
    fn test_long_sentence_broken_on_words() {
        let splitter = TextChunker::new(20, 0);
        let pieces = splitter.split("one two three four five six seven eight nine ten eleven");

        assert!(pieces.len() >= 3);
        for piece in &pieces {
            assert!(piece.chars().count() <= 20);
        }
    }

    #[test]
    fn test_enabled_tags_chunk_index() {
        let chunker = Chunker::new(&ChunkingConfig {
            enabled: true,
            chunk_size: 30,
            chunk_overlap: 5,
            ..Default::default()
        });
        let chunks = chunker.chunk_segments(vec![segment(
            "First sentence here. Second sentence here. Third one.",
        )]);

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.metadata.get("chunk"), Some(&json!(i)));
            assert_eq!(chunk.metadata.get("source"), Some(&json!("doc.pdf")));
        }
    }

    #[test]
    fn test_overlap_never_exceeds_size() {
        let splitter = TextChunker::new(60, 15);
        let sentence = |word: &str| format!("{} sentence runs on for exactly enough characters. ", word);
        let text = format!("{}{}{}", sentence("First"), sentence("Second"), sentence("Third"));
        let pieces = splitter.split(&text);

        assert_eq!(pieces.len(), 3, "{:?}", pieces);
        for piece in &pieces {
            assert!(piece.chars().count() <= 60, "piece too long: {:?}", piece);
        }
        assert!(pieces[2].contains("Third"));
    }

    #[test]
    fn test_overlong_word_is_hard_split() {
        let splitter = TextChunker::new(10, 3);
        let pieces = splitter.split("tiny abcdefghijklmnopqrstuvwxyz end");

        assert!(pieces.iter().all(|p| p.chars().count() <= 10), "{:?}", pieces);
        assert!(pieces.concat().contains("klmnopqrst"));
    }
}
