//! Corpus loading and text cleaning for the demo predictor

use anyhow::{Context, Result};
use regex::Regex;
use std::path::Path;

/// Normalize raw corpus text before counting: drop parenthesized and
/// bracketed spans (stage directions, references), drop digits, collapse
/// runs of whitespace to single spaces.
pub fn clean_text(text: &str) -> String {
    let parenthesized = Regex::new(r"\([^)]*\)").unwrap();
    let bracketed = Regex::new(r"\[[^\]]*\]").unwrap();
    let digits = Regex::new(r"\d+").unwrap();
    let whitespace = Regex::new(r"\s+").unwrap();

    let text = parenthesized.replace_all(text, "");
    let text = bracketed.replace_all(&text, "");
    let text = digits.replace_all(&text, "");
    whitespace.replace_all(&text, " ").trim().to_string()
}

/// Read and clean a corpus file.
pub fn load_corpus(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read corpus file: {}", path.display()))?;
    Ok(clean_text(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_parenthesized_and_bracketed_spans() {
        assert_eq!(
            clean_text("the quick (very quick) brown [sic] fox"),
            "the quick brown fox"
        );
    }

    #[test]
    fn test_strips_digits() {
        assert_eq!(clean_text("chapter 12 begins"), "chapter begins");
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(clean_text("  the \n\t quick   fox "), "the quick fox");
    }
}
