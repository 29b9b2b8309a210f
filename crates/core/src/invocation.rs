//! The inbound request shape for one stateless tool call.

use crate::file::FileHandlingMode;
use crate::thread::ThreadId;
use serde::{Deserialize, Serialize};

/// How much of the model's context window to grant for extended reasoning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingMode {
    Minimal,
    Low,
    Medium,
    High,
    Max,
}

impl ThinkingMode {
    /// Share of the context limit granted to thinking.
    pub fn fraction(self) -> f64 {
        match self {
            Self::Minimal => 0.005,
            Self::Low => 0.08,
            Self::Medium => 0.33,
            Self::High => 0.67,
            Self::Max => 1.0,
        }
    }

    /// Thinking tokens for a model with the given context limit.
    pub fn budget(self, context_limit: usize) -> usize {
        (context_limit as f64 * self.fraction()) as usize
    }
}

impl std::str::FromStr for ThinkingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "max" => Ok(Self::Max),
            other => Err(format!("unknown thinking mode '{other}'")),
        }
    }
}

/// One tool invocation as seen by the context assembler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Opaque thread token from a previous response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_id: Option<ThreadId>,

    /// Tool specialization (chat, analyze, review, ...).
    pub mode: String,

    /// Explicit model name, or `None`/"auto" for automatic selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_model: Option<String>,

    /// Absolute file or directory paths.
    #[serde(default)]
    pub files: Vec<String>,

    #[serde(default)]
    pub file_handling_mode: FileHandlingMode,

    pub prompt_text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_mode: Option<ThinkingMode>,
}

impl ToolInvocation {
    pub fn new(mode: impl Into<String>, prompt_text: impl Into<String>) -> Self {
        Self {
            mode: mode.into(),
            prompt_text: prompt_text.into(),
            ..Self::default()
        }
    }

    pub fn continuing(mut self, id: ThreadId) -> Self {
        self.continuation_id = Some(id);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.requested_model = Some(model.into());
        self
    }

    pub fn with_files<I, S>(mut self, files: I, mode: FileHandlingMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self.file_handling_mode = mode;
        self
    }

    pub fn with_thinking(mut self, mode: ThinkingMode) -> Self {
        self.thinking_mode = Some(mode);
        self
    }

    /// The explicit model, with "auto" and blanks treated as absent.
    pub fn explicit_model(&self) -> Option<&str> {
        self.requested_model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty() && !m.eq_ignore_ascii_case("auto"))
    }
}
