//! The growing word sequence that is the generation state

use serde::{Deserialize, Serialize};
use std::fmt;

/// An append-only sequence of word tokens.
///
/// A prompt only ever grows during a generation run; words are never removed
/// or reordered.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    words: Vec<String>,
}

impl Prompt {
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Split free-form text into words. Empty or all-whitespace input yields
    /// an empty prompt, which is a valid generation starting point.
    pub fn from_text(text: &str) -> Self {
        Self {
            words: text.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.words.last().map(String::as_str)
    }

    pub fn push(&mut self, word: impl Into<String>) {
        self.words.push(word.into());
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.words.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_text_splits_on_whitespace() {
        let prompt = Prompt::from_text("  the   quick\tbrown\n");
        assert_eq!(prompt.words(), &["the", "quick", "brown"]);
        assert_eq!(prompt.to_string(), "the quick brown");
    }

    #[test]
    fn test_empty_text_is_empty_prompt() {
        assert!(Prompt::from_text("").is_empty());
        assert!(Prompt::from_text("   \n ").is_empty());
        assert_eq!(Prompt::new(), Prompt::default());
    }

    #[test]
    fn test_push_appends() {
        let mut prompt = Prompt::from_text("the quick");
        prompt.push("brown");
        assert_eq!(prompt.len(), 3);
        assert_eq!(prompt.last(), Some("brown"));
        assert_eq!(prompt.to_string(), "the quick brown");
    }
}
