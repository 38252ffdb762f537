//! Sentence splitting, tokenization and re-tokenization.
//!
//! # Responsibility
//! - Split source text into sentences and sentences into word tokens.
//! - Re-tokenize an edited sentence while keeping unchanged tokens (and
//!   their annotations) in place.
//!
//! # Invariants
//! - Old English letters (þ, ð, æ, ƿ, ȝ, macron vowels) are word characters.
//! - Hyphenated compounds stay one token.
//! - Structural changes reach notes only through `crate::ranges`.

use crate::model::project::Sentence;
use crate::ranges::TokenEdit;
use once_cell::sync::Lazy;
use regex::Regex;

static SENTENCE_END_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+\s*|\[\d+\]\s*").expect("valid sentence end regex"));
static BRACKET_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\d+\]").expect("valid bracket number regex"));
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\w+(?:[-–—]\w+)*|[.,;:!?\-—"']+"#).expect("valid token regex")
});
static PUNCT_QUOTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^[.!?]+["']+$"#).expect("valid punctuation quote regex"));

const ATTACHED_PUNCTUATION: &[&str] = &[",", ";", ":", "-", "—", "\"", "'"];
const CLOSING_PUNCTUATION: &[&str] = &[".", "!", "?"];

/// Splits free text into trimmed sentences.
///
/// Sentences end at runs of `.`, `!`, `?` or at `[n]` line markers; the
/// markers themselves are dropped. Trailing text without a terminator is kept.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut last = 0;
    for found in SENTENCE_END_RE.find_iter(text) {
        sentences.push(&text[last..found.end()]);
        last = found.end();
    }
    if last < text.len() {
        sentences.push(&text[last..]);
    }

    sentences
        .into_iter()
        .map(|sentence| BRACKET_NUMBER_RE.replace_all(sentence, "").trim().to_string())
        .filter(|sentence| !sentence.is_empty())
        .collect()
}

/// Splits one sentence into annotatable tokens.
pub fn tokenize(sentence: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for chunk in sentence.split_whitespace() {
        if is_standalone_punctuation(chunk) {
            continue;
        }
        for part in TOKEN_RE.find_iter(chunk) {
            let part = part.as_str();
            if is_skipped_punctuation(part) {
                continue;
            }
            tokens.push(part.to_string());
        }
    }

    while tokens
        .last()
        .is_some_and(|last| CLOSING_PUNCTUATION.contains(&last.as_str()))
    {
        tokens.pop();
    }
    tokens
}

fn is_standalone_punctuation(chunk: &str) -> bool {
    CLOSING_PUNCTUATION.contains(&chunk) || is_skipped_punctuation(chunk)
}

fn is_skipped_punctuation(part: &str) -> bool {
    ATTACHED_PUNCTUATION.contains(&part) || PUNCT_QUOTE_RE.is_match(part)
}

/// Replaces the sentence text and reconciles its tokens.
///
/// Tokens in the common prefix and suffix are kept. Inside the changed
/// middle, tokens are first reused position by position (surface updated,
/// annotation kept); any surplus is removed, any shortfall inserted. Returns
/// the structural edits that were applied to the notes.
pub fn retokenize(sentence: &mut Sentence, new_text: &str) -> Vec<TokenEdit> {
    let new_surfaces = tokenize(new_text);
    sentence.text = new_text.to_string();

    let old_len = sentence.tokens.len();
    let new_len = new_surfaces.len();
    let prefix = sentence
        .tokens
        .iter()
        .zip(&new_surfaces)
        .take_while(|(token, surface)| token.text == **surface)
        .count();
    let max_suffix = old_len.min(new_len) - prefix;
    let suffix = sentence
        .tokens
        .iter()
        .rev()
        .zip(new_surfaces.iter().rev())
        .take(max_suffix)
        .take_while(|(token, surface)| token.text == **surface)
        .count();

    let old_middle = old_len - prefix - suffix;
    let new_middle = new_len - prefix - suffix;
    let reused = old_middle.min(new_middle);
    for offset in 0..reused {
        sentence.tokens[prefix + offset].text = new_surfaces[prefix + offset].clone();
    }

    let mut edits = Vec::new();
    let at = prefix + reused;
    if old_middle > reused {
        let count = old_middle - reused;
        sentence.remove_tokens(at, count);
        edits.push(TokenEdit::Removed { from: at, count });
    }
    if new_middle > reused {
        let count = new_middle - reused;
        sentence.insert_tokens(at, &new_surfaces[at..at + count]);
        edits.push(TokenEdit::Inserted { at, count });
    }
    edits
}
