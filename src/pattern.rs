//! Vocabulary → single case-insensitive matcher.

use crate::logging;
use eyre::Result;
use regex::{Match, Regex, RegexBuilder};
use std::collections::BTreeSet;

const SIZE_LIMIT: usize = 64 * (1 << 20);

#[derive(Debug, Clone)]
pub struct CompiledPattern {
    regex: Option<Regex>,
    phrase_count: usize,
    generation: u64,
}

impl CompiledPattern {
    /// A pattern that never matches.
    pub fn empty() -> Self {
        Self {
            regex: None,
            phrase_count: 0,
            generation: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.regex.is_none()
    }

    pub fn phrase_count(&self) -> usize {
        self.phrase_count
    }

    /// Vocabulary generation this pattern was compiled from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_ref().map(Regex::as_str).unwrap_or("")
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(text))
    }

    /// All non-overlapping matches, left to right.
    pub fn find_iter<'a>(&'a self, text: &'a str) -> impl Iterator<Item = Match<'a>> + 'a {
        self.regex.iter().flat_map(move |re| re.find_iter(text))
    }
}

/// Compile `phrases` into one alternation. Never fails: a vocabulary that cannot
/// be compiled is logged and degrades to a pattern that matches nothing.
pub fn compile<'a, I>(phrases: I, generation: u64) -> CompiledPattern
where
    I: IntoIterator<Item = &'a str>,
{
    match try_compile(phrases, generation) {
        Ok(pattern) => pattern,
        Err(err) => {
            logging::warn(format!("Could not compile vocabulary pattern: {err}"));
            CompiledPattern {
                generation,
                ..CompiledPattern::empty()
            }
        }
    }
}

pub fn try_compile<'a, I>(phrases: I, generation: u64) -> Result<CompiledPattern>
where
    I: IntoIterator<Item = &'a str>,
{
    let unique: BTreeSet<String> = phrases
        .into_iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect();

    // Longest first: leftmost-first alternation must prefer "good will" over "good".
    let mut ordered: Vec<&String> = unique.iter().collect();
    ordered.sort_by(|a, b| {
        b.chars()
            .count()
            .cmp(&a.chars().count())
            .then_with(|| a.cmp(b))
    });

    let alternatives: Vec<String> = ordered.iter().filter_map(|p| phrase_pattern(p)).collect();
    if alternatives.is_empty() {
        return Ok(CompiledPattern {
            generation,
            ..CompiledPattern::empty()
        });
    }

    let source = format!("(?:{})", alternatives.join("|"));
    let regex = RegexBuilder::new(&source)
        .case_insensitive(true)
        .size_limit(SIZE_LIMIT)
        .build()?;

    Ok(CompiledPattern {
        regex: Some(regex),
        phrase_count: alternatives.len(),
        generation,
    })
}

/// Escaped, boundary-anchored source for one phrase. Anchors are only placed on
/// edges that are word characters; inner whitespace matches any whitespace run.
fn phrase_pattern(phrase: &str) -> Option<String> {
    let words: Vec<String> = phrase.split_whitespace().map(regex::escape).collect();
    let first = phrase.chars().next()?;
    let last = phrase.chars().last()?;
    if words.is_empty() {
        return None;
    }
    let lead = if is_word_char(first) { r"\b" } else { "" };
    let trail = if is_word_char(last) { r"\b" } else { "" };
    Some(format!("{lead}{}{trail}", words.join(r"\s+")))
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}
