//! Built-in script splitter

use crate::error::BoxError;
use crate::params::SplitMode;
use crate::services::ScriptSplitter;
use async_trait::async_trait;

/// Splits fixed scripts on paragraph, line or sentence boundaries
#[derive(Debug, Clone, Copy, Default)]
pub struct TextSplitter;

impl TextSplitter {
    /// Split synchronously; segments are trimmed and empty ones dropped
    #[must_use]
    pub fn split_text(text: &str, mode: SplitMode) -> Vec<String> {
        let normalized = text.replace("\r\n", "\n");
        let raw: Vec<String> = match mode {
            SplitMode::Paragraph => paragraphs(&normalized),
            SplitMode::Line => normalized.lines().map(str::to_string).collect(),
            SplitMode::Sentence => sentences(&normalized),
        };

        raw.into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim());
        }
    }
    if !current.is_empty() {
        out.push(current.join("\n"));
    }
    out
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '。' | '！' | '？')
}

fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' {
            current.push(' ');
            continue;
        }
        current.push(c);
        if is_terminator(c) {
            // Keep runs like "?!" or "..." together
            while let Some(&next) = chars.peek() {
                if is_terminator(next) {
                    current.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            let ascii_stop = c.is_ascii();
            let at_boundary = chars.peek().map_or(true, |n| n.is_whitespace());
            if !ascii_stop || at_boundary {
                out.push(std::mem::take(&mut current));
            }
        }
    }
    out.push(current);
    out
}

#[async_trait]
impl ScriptSplitter for TextSplitter {
    async fn split(&self, text: &str, mode: SplitMode) -> Result<Vec<String>, BoxError> {
        Ok(Self::split_text(text, mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn paragraph_mode() {
        let text = "First paragraph\ncontinues here.\n\n\nSecond one.\r\n\r\n  Third.  ";
        assert_eq!(
            TextSplitter::split_text(text, SplitMode::Paragraph),
            vec!["First paragraph\ncontinues here.", "Second one.", "Third."]
        );
    }

    #[test]
    fn line_mode() {
        let text = "one\n\n two \nthree";
        assert_eq!(
            TextSplitter::split_text(text, SplitMode::Line),
            vec!["one", "two", "three"]
        );
    }

    #[test]
    fn sentence_mode() {
        let text = "It works. Really?! Version 1.2 ships.\n再见。你好！";
        assert_eq!(
            TextSplitter::split_text(text, SplitMode::Sentence),
            vec!["It works.", "Really?!", "Version 1.2 ships.", "再见。", "你好！"]
        );
    }

    #[test]
    fn empty_script() {
        for mode in [SplitMode::Paragraph, SplitMode::Line, SplitMode::Sentence] {
            assert!(TextSplitter::split_text(" \n\n ", mode).is_empty());
        }
    }

    #[tokio::test]
    async fn async_split_matches_sync() {
        let text = "a\n\nb";
        let segments = TextSplitter.split(text, SplitMode::Paragraph).await.unwrap();
        assert_eq!(segments, TextSplitter::split_text(text, SplitMode::Paragraph));
    }

    proptest! {
        #[test]
        fn segments_are_trimmed_and_non_empty(text in "[a-z .!?\n]{0,200}") {
            for mode in [SplitMode::Paragraph, SplitMode::Line, SplitMode::Sentence] {
                for segment in TextSplitter::split_text(&text, mode) {
                    prop_assert!(!segment.is_empty());
                    prop_assert_eq!(segment.trim(), segment.as_str());
                }
            }
        }
    }
}
