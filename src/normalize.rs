//! Text canonicalization ahead of symbol indexing.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Upper bound on rewrite passes; real input settles after two.
const MAX_PASSES: usize = 4;

/// Typographic variants and their canonical ASCII form.
const REPLACEMENTS: &[(char, &str)] = &[
    ('\u{2013}', "-"),  // en dash
    ('\u{2011}', "-"),  // non-breaking hyphen
    ('\u{2010}', "-"),  // hyphen
    ('\u{2014}', "-"),  // em dash
    ('\u{00AF}', " "),  // macron
    ('_', " "),
    ('\u{201C}', "\""),
    ('\u{201D}', "\""),
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{00B4}', "'"),  // acute accent
    ('`', "'"),
    ('[', " "),
    (']', " "),
    ('|', " "),
    ('/', " "),
    ('#', " "),
    ('\u{2192}', " "),  // right arrow
    ('\u{2190}', " "),  // left arrow
];

const DECORATIVE: &[char] = &['\u{2665}', '\u{2606}', '\u{2661}', '\u{00A9}', '\\'];

const EXPANSIONS: &[(&str, &str)] = &[
    ("@", " at "),
    ("e.g.,", "for example, "),
    ("i.e.,", "that is, "),
];

/// Marks that may end a normalized text without an appended period.
const TERMINATORS: &[char] = &[
    '.', '!', '?', ';', ':', ',', '\'', '"', ')', ']', '}', '>',
    '\u{2026}', '\u{3002}', '\u{300D}', '\u{300F}', '\u{3011}', '\u{3009}',
    '\u{300B}', '\u{203A}', '\u{00BB}', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}',
];

static SPACE_BEFORE_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+([,.!?;:'])").expect("static pattern"));

/// Text that went through [`normalize`]; the only way to build one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NormalizedText(String);

impl NormalizedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in characters, the unit used for symbol sequences and masks.
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for NormalizedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonicalize raw text. Never fails; normalizing twice is a no-op.
pub fn normalize(text: &str) -> NormalizedText {
    // Closing up spaces or decomposing wide forms can expose a pattern an
    // earlier step handles, so rewrite until the text is stable.
    let mut current = rewrite(text);
    for _ in 1..MAX_PASSES {
        let next = rewrite(&current);
        if next == current {
            break;
        }
        current = next;
    }
    NormalizedText(current)
}

fn rewrite(text: &str) -> String {
    let mut text: String = text.chars().filter(|&c| !is_emoji(c)).collect();

    text = replace_variants(&text);

    text = text.nfkd().filter(|&c| !is_combining_mark(c)).collect();

    text.retain(|c| !DECORATIVE.contains(&c));

    for (from, to) in EXPANSIONS {
        if text.contains(from) {
            text = text.replace(from, to);
        }
    }

    text = SPACE_BEFORE_PUNCT.replace_all(&text, "$1").into_owned();

    for quote in ['"', '\'', '`'] {
        text = collapse_repeats(&text, quote);
    }

    let mut text = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if let Some(last) = text.chars().last() {
        if !TERMINATORS.contains(&last) {
            text.push('.');
        }
    }
    text
}

fn replace_variants(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match REPLACEMENTS.iter().find(|(from, _)| *from == c) {
            Some((_, to)) => out.push_str(to),
            None => out.push(c),
        }
    }
    out
}

fn collapse_repeats(text: &str, target: char) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous = None;
    for c in text.chars() {
        if c == target && previous == Some(target) {
            continue;
        }
        out.push(c);
        previous = Some(c);
    }
    out
}

fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F600..=0x1F64F   // emoticons
            | 0x1F300..=0x1F5FF // pictographs
            | 0x1F680..=0x1F6FF // transport and map
            | 0x1F700..=0x1F7FF // alchemical, geometric extended
            | 0x1F800..=0x1F8FF // supplemental arrows
            | 0x1F900..=0x1FAFF // supplemental symbols and pictographs
            | 0x2600..=0x26FF   // miscellaneous symbols
            | 0x2700..=0x27BF   // dingbats
            | 0x1F1E6..=0x1F1FF // regional indicators
            | 0xFE00..=0xFE0F   // variation selectors
            | 0x200D            // zero width joiner
    )
}
