//! Paragraph-aware splitting of document text into retrieval passages.

use serde::{Deserialize, Serialize};

const PARAGRAPH_SEPARATOR: &str = "\n\n";
const SENTENCE_SEPARATOR: &str = " ";

/// Bounds applied by [`chunk_text`]. Lengths are counted in chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Target size of a packed chunk.
    pub max_chars: usize,
    /// Ceiling no returned chunk may exceed.
    pub hard_limit: usize,
    /// Chunks below this length are dropped as noise.
    pub min_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: 2_000,
            hard_limit: 18_000,
            min_chars: 50,
        }
    }
}

impl ChunkerConfig {
    pub fn with_max_chars(max_chars: usize) -> Self {
        Self {
            max_chars,
            ..Self::default()
        }
    }

    fn sanitized(self) -> Self {
        let hard_limit = self.hard_limit.max(1);
        Self {
            max_chars: self.max_chars.clamp(1, hard_limit),
            hard_limit,
            min_chars: self.min_chars,
        }
    }
}

/// Splits `text` with the default bounds and the given packing size.
pub fn chunk(text: &str, max_chars: usize) -> Vec<String> {
    chunk_text(text, &ChunkerConfig::with_max_chars(max_chars))
}

/// Packs blank-line separated paragraphs greedily into chunks of at most
/// `max_chars`, pre-splitting paragraphs longer than `hard_limit` by sentence.
pub fn chunk_text(text: &str, config: &ChunkerConfig) -> Vec<String> {
    let config = config.sanitized();
    let normalized = text.replace("\r\n", "\n");

    let mut packer = Packer::new(config.max_chars);
    for paragraph in normalized.split(PARAGRAPH_SEPARATOR) {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        if char_len(paragraph) > config.hard_limit {
            for piece in split_long(paragraph, config.hard_limit) {
                packer.push(&piece);
            }
        } else {
            packer.push(paragraph);
        }
    }
    let packed = packer.finish();

    let retained: Vec<String> = packed
        .iter()
        .filter(|chunk| char_len(chunk) >= config.min_chars)
        .cloned()
        .collect();
    // Short content is still content when nothing else survives.
    let retained = if retained.is_empty() { packed } else { retained };

    retained
        .into_iter()
        .flat_map(|chunk| {
            if char_len(&chunk) > config.hard_limit {
                split_long(&chunk, config.hard_limit)
            } else {
                vec![chunk]
            }
        })
        .collect()
}

struct Packer {
    max_chars: usize,
    current: String,
    current_len: usize,
    chunks: Vec<String>,
}

impl Packer {
    fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            current: String::new(),
            current_len: 0,
            chunks: Vec::new(),
        }
    }

    fn push(&mut self, unit: &str) {
        let unit_len = char_len(unit);
        if self.current.is_empty() {
            self.current.push_str(unit);
            self.current_len = unit_len;
        } else if self.current_len + PARAGRAPH_SEPARATOR.len() + unit_len <= self.max_chars {
            self.current.push_str(PARAGRAPH_SEPARATOR);
            self.current.push_str(unit);
            self.current_len += PARAGRAPH_SEPARATOR.len() + unit_len;
        } else {
            self.flush();
            self.current.push_str(unit);
            self.current_len = unit_len;
        }
    }

    fn flush(&mut self) {
        let chunk = std::mem::take(&mut self.current);
        self.current_len = 0;
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            self.chunks.push(trimmed.to_string());
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}

/// Splits text over `limit` chars at sentence boundaries, hard-cutting any
/// sentence that alone exceeds the limit.
fn split_long(text: &str, limit: usize) -> Vec<String> {
    if char_len(text) <= limit {
        return vec![text.to_string()];
    }

    let sentences = split_sentences(text);
    if sentences.len() <= 1 {
        return hard_cut(text, limit);
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for sentence in sentences {
        let sentence_len = char_len(sentence);
        if sentence_len > limit {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
                current_len = 0;
            }
            pieces.extend(hard_cut(sentence, limit));
        } else if current.is_empty() {
            current.push_str(sentence);
            current_len = sentence_len;
        } else if current_len + SENTENCE_SEPARATOR.len() + sentence_len <= limit {
            current.push_str(SENTENCE_SEPARATOR);
            current.push_str(sentence);
            current_len += SENTENCE_SEPARATOR.len() + sentence_len;
        } else {
            pieces.push(std::mem::replace(&mut current, sentence.to_string()));
            current_len = sentence_len;
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Sentences end after `.`, `!` or `?` followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let end = idx + ch.len_utf8();
        let Some(&(_, next)) = chars.peek() else {
            break;
        };
        if !next.is_whitespace() {
            continue;
        }
        sentences.push(&text[start..end]);
        while let Some(&(_, ws)) = chars.peek() {
            if !ws.is_whitespace() {
                break;
            }
            chars.next();
        }
        start = chars.peek().map_or(text.len(), |(next_idx, _)| *next_idx);
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
        .into_iter()
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .collect()
}

fn hard_cut(text: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(limit.max(1))
        .map(|window| window.iter().collect::<String>().trim().to_string())
        .filter(|piece| !piece.is_empty())
        .collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(label: &str, len: usize) -> String {
        let mut text = format!("{label} ");
        while text.chars().count() < len {
            text.push('x');
        }
        text
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk("", 2_000).is_empty());
        assert!(chunk("\n\n   \n\n", 2_000).is_empty());
    }

    #[test]
    fn small_paragraphs_share_a_chunk() {
        assert_eq!(
            chunk("Paragraph A.\n\nParagraph B.", 2_000),
            vec!["Paragraph A.\n\nParagraph B.".to_string()]
        );
    }

    #[test]
    fn paragraphs_are_packed_up_to_max_chars() {
        let first = paragraph("first", 120);
        let second = paragraph("second", 120);
        let third = paragraph("third", 120);
        let text = format!("{first}\n\n{second}\n\n{third}");

        let chunks = chunk(&text, 250);

        assert_eq!(chunks, vec![format!("{first}\n\n{second}"), third]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 250));
    }

    #[test]
    fn oversized_paragraph_without_sentences_is_hard_cut() {
        let text = "a".repeat(25_000);

        let chunks = chunk(&text, 2_000);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 18_000);
        assert_eq!(chunks[1].chars().count(), 7_000);
    }

    #[test]
    fn oversized_paragraph_splits_on_sentence_boundaries() {
        let sentence = format!("{}.", "word ".repeat(200).trim_end());
        let text = vec![sentence.as_str(); 30].join(" ");
        assert!(text.chars().count() > 18_000);

        let chunks = chunk(&text, 2_000);

        assert!(chunks.len() >= 2);
        for piece in &chunks {
            assert!(piece.chars().count() <= 18_000);
            assert!(piece.ends_with('.'), "piece should end on a sentence: {piece:?}");
        }
    }

    #[test]
    fn every_chunk_respects_hard_limit() {
        let config = ChunkerConfig {
            max_chars: 300,
            hard_limit: 400,
            min_chars: 10,
        };
        let long_sentence = "z".repeat(1_000);
        let text = format!(
            "Intro paragraph here.\n\n{long_sentence}. Tail sentence! Another one?\n\n{}",
            paragraph("closing", 350)
        );

        let chunks = chunk_text(&text, &config);

        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.chars().count() <= 400));
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn short_chunks_are_dropped_as_noise() {
        let body = paragraph("body", 200);
        let text = format!("{body}\n\nPage 3");
        let config = ChunkerConfig {
            max_chars: 200,
            ..ChunkerConfig::default()
        };

        let chunks = chunk_text(&text, &config);

        assert_eq!(chunks, vec![body]);
    }

    #[test]
    fn sentence_split_keeps_punctuation() {
        assert_eq!(
            split_sentences("First one.  Second!\nThird? tail"),
            vec!["First one.", "Second!", "Third?", "tail"]
        );
        assert_eq!(split_sentences("v1.2 is not a boundary."), vec!["v1.2 is not a boundary."]);
    }

    #[test]
    fn hard_cut_respects_char_boundaries() {
        let text = "é".repeat(10);
        let pieces = hard_cut(&text, 4);
        assert_eq!(pieces.iter().map(|p| p.chars().count()).collect::<Vec<_>>(), vec![4, 4, 2]);
    }

    #[test]
    fn reading_order_is_preserved() {
        let parts: Vec<String> = (0..6).map(|i| paragraph(&format!("part{i}"), 90)).collect();
        let text = parts.join("\n\n");

        let chunks = chunk(&text, 200);
        let rejoined = chunks.join("\n\n");

        let mut cursor = 0;
        for part in &parts {
            let found = rejoined[cursor..].find(part.as_str()).expect("part present in order");
            cursor += found + part.len();
        }
    }
}
