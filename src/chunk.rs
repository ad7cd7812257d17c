//! Paragraph and sentence aware splitting of long text.

use once_cell::sync::Lazy;
use regex::Regex;

static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n").expect("static pattern"));
static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]\s+").expect("static pattern"));

/// Words whose trailing period does not end a sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr.", "mrs.", "ms.", "dr.", "prof.", "sr.", "jr.", "st.", "vs.", "etc.", "e.g.", "i.e.", "no.",
];

/// Split `text` into chunks of at most `max_len` characters.
///
/// Paragraphs never share a chunk. Sentences are packed greedily; a single
/// sentence longer than `max_len` becomes its own over-length chunk. Always
/// returns at least one chunk, which may be empty for blank input.
pub fn chunk_text(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();

    for paragraph in PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        let mut current = String::new();
        let mut current_len = 0usize;

        for sentence in split_sentences(paragraph) {
            let sentence_len = sentence.chars().count();
            if current.is_empty() {
                current.push_str(sentence);
                current_len = sentence_len;
            } else if current_len + 1 + sentence_len <= max_len {
                current.push(' ');
                current.push_str(sentence);
                current_len += 1 + sentence_len;
            } else {
                chunks.push(std::mem::take(&mut current));
                current.push_str(sentence);
                current_len = sentence_len;
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }
    }

    if chunks.is_empty() {
        chunks.push(text.trim().to_string());
    }
    chunks
}

/// Sentences of one paragraph, each keeping its terminator.
fn split_sentences(paragraph: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for boundary in SENTENCE_END.find_iter(paragraph) {
        // Terminators are single-byte ASCII.
        let end = boundary.start() + 1;
        let candidate = &paragraph[start..end];
        if ends_with_abbreviation(candidate) {
            continue;
        }
        let sentence = candidate.trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = boundary.end();
    }

    let tail = paragraph[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn ends_with_abbreviation(candidate: &str) -> bool {
    candidate
        .split_whitespace()
        .last()
        .map(|word| {
            let word = word.trim_start_matches(|c: char| !c.is_alphanumeric());
            ABBREVIATIONS.iter().any(|abbr| word.eq_ignore_ascii_case(abbr))
        })
        .unwrap_or(false)
}
