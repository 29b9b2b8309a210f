//! Structural summarizer: a cheap, model-free file summary.
//!
//! Reports size, line count, extension, declaration counts and a preview of
//! the first lines, truncated to the requested token budget.

use async_trait::async_trait;
use continuum_core::error::ProviderError;
use continuum_core::provider::Summarizer;
use continuum_core::token::estimate_tokens;
use std::path::Path;

const PREVIEW_LINES: usize = 10;

const IMPORT_PREFIXES: &[&str] = &["import ", "from ", "use ", "#include", "require ", "using "];
const TYPE_PREFIXES: &[&str] = &["class ", "struct ", "enum ", "trait ", "interface ", "type "];
const FN_PREFIXES: &[&str] = &["def ", "fn ", "async fn ", "async def ", "func ", "function "];

/// Summarizes files by structure rather than meaning.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutlineSummarizer;

impl OutlineSummarizer {
    pub fn new() -> Self {
        Self
    }
}

/// Strip visibility and export keywords so `pub fn` counts as `fn`.
fn declaration(line: &str) -> &str {
    let mut line = line.trim_start();
    for prefix in ["pub(crate) ", "pub ", "export default ", "export ", "public ", "private "] {
        if let Some(rest) = line.strip_prefix(prefix) {
            line = rest;
        }
    }
    line
}

fn count_prefixed(lines: &[&str], prefixes: &[&str]) -> usize {
    lines
        .iter()
        .map(|l| declaration(l))
        .filter(|l| prefixes.iter().any(|p| l.starts_with(p)))
        .count()
}

/// Cut `text` so its token estimate does not exceed `max_tokens`.
fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    if estimate_tokens(text) <= max_tokens {
        return text.to_string();
    }
    let marker = "\n[...]";
    let budget_chars = (max_tokens * 4).saturating_sub(marker.len());
    let mut cut = budget_chars.min(text.len());
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{marker}", &text[..cut])
}

/// Build the outline for already-read content.
pub fn outline(path: &str, content: &str, max_tokens: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("none");

    let preview = lines
        .iter()
        .take(PREVIEW_LINES)
        .copied()
        .collect::<Vec<_>>()
        .join("\n");

    let text = format!(
        "File: {path}\nSize: {} bytes, {} lines, extension: {extension}\n\
         Imports: {}, types: {}, functions: {}\nPreview:\n{}",
        content.len(),
        lines.len(),
        count_prefixed(&lines, IMPORT_PREFIXES),
        count_prefixed(&lines, TYPE_PREFIXES),
        count_prefixed(&lines, FN_PREFIXES),
        preview.trim_end(),
    );
    truncate_to_tokens(&text, max_tokens)
}

#[async_trait]
impl Summarizer for OutlineSummarizer {
    fn name(&self) -> &str {
        "outline"
    }

    async fn summarize(
        &self,
        path: &str,
        content: &str,
        max_tokens: usize,
    ) -> std::result::Result<String, ProviderError> {
        Ok(outline(path, content, max_tokens))
    }
}
