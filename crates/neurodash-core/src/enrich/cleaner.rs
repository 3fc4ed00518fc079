//! Narrative text cleaner.
//!
//! Handles:
//! - RTF control words and brace groups (`\par`, `{\fonttbl ...}`)
//! - Line breaks and carriage returns
//! - Space-before-period artifacts
//! - Underscore-wrapped template tokens (`_FIELD_`)
//! - Whitespace runs

use std::sync::LazyLock;

use regex::Regex;

static ESCAPES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\\w+|\{.*?\}|\}").expect("valid regex"));
static NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n+").expect("valid regex"));
static CARRIAGE_RETURNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r+").expect("valid regex"));
static TEMPLATE_TOKENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_\S+_").expect("valid regex"));
static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("valid regex"));

/// Cleans raw narratives as exported by the RIS.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCleaner;

impl TextCleaner {
    pub fn new() -> Self {
        Self
    }

    /// Clean a narrative. Total: every input yields a string.
    pub fn clean(&self, raw: &str) -> String {
        let text = ESCAPES.replace_all(raw, "");
        let text = NEWLINES.replace_all(&text, " ");
        let text = CARRIAGE_RETURNS.replace_all(&text, " ");
        let text = text.replace(" .", ".");
        let text = TEMPLATE_TOKENS.replace_all(&text, "");
        let text = WHITESPACE_RUNS.replace_all(&text, " ");
        text.trim().to_string()
    }
}

/// Clean a narrative with the default cleaner.
pub fn clean_text(raw: &str) -> String {
    TextCleaner.clean(raw)
}
