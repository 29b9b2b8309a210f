//! Token budget allocation across system prompt, history and files.
//!
//! # Allocation order
//!
//! | Slice | Charge | When it does not fit |
//! |-------|--------|----------------------|
//! | System prompt + request | estimated | `BudgetExceeded` |
//! | History | per turn, newest first, up to the history ceiling | oldest turns dropped |
//! | Embedded file | estimated | degraded to reference |
//! | Summary file | fixed `summary_tokens` | degraded to reference |
//! | Reference file | fixed `reference_tokens` | omitted |
//!
//! Allocation is a pure function of its inputs: no clocks, no I/O.

use continuum_core::error::ContextError;
use continuum_core::file::{FileHandlingMode, FileReference};
use serde::{Deserialize, Serialize};

/// Shares and fixed charges for allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetSettings {
    /// Share of the post-system budget history may occupy.
    pub history_share: f64,
    /// Absolute cap on history tokens.
    pub max_history_tokens: Option<usize>,
    /// Fixed cost of a reference line.
    pub reference_tokens: usize,
    /// Fixed cost of a summary.
    pub summary_tokens: usize,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            history_share: 0.5,
            max_history_tokens: None,
            reference_tokens: 24,
            summary_tokens: 256,
        }
    }
}

impl BudgetSettings {
    pub fn from_config(budget: &continuum_config::BudgetConfig) -> Self {
        Self {
            history_share: budget.history_share,
            max_history_tokens: budget.max_history_tokens,
            reference_tokens: budget.reference_tokens,
            summary_tokens: budget.summary_tokens,
        }
    }
}

/// One requested file as the allocator sees it.
#[derive(Debug, Clone)]
pub struct FileCandidate {
    pub file: FileReference,
    /// Estimated cost of the full content.
    pub estimated_tokens: usize,
    /// The same content was embedded earlier in the thread.
    pub previously_embedded: bool,
    /// Estimation did not finish within its deadline.
    pub estimate_timed_out: bool,
}

/// Why a file fell back to a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeReason {
    /// Not enough budget left.
    Overflow,
    /// An external estimate or summary missed its deadline.
    Timeout,
    /// The summarizer failed.
    Unavailable,
}

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum FileDecision {
    EmbeddedFull,
    DegradedToReference { reason: DegradeReason },
    Summarized,
    /// Requested as a reference, or already embedded earlier in the thread.
    Referenced,
    /// Not even the reference line fits.
    Omitted,
}

impl FileDecision {
    /// The representation actually sent, if any.
    pub fn sent_as(&self) -> Option<FileHandlingMode> {
        match self {
            Self::EmbeddedFull => Some(FileHandlingMode::Embedded),
            Self::Summarized => Some(FileHandlingMode::Summary),
            Self::Referenced | Self::DegradedToReference { .. } => {
                Some(FileHandlingMode::Reference)
            }
            Self::Omitted => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAllocation {
    pub path: String,
    pub requested: FileHandlingMode,
    pub decision: FileDecision,
    pub tokens: usize,
}

/// The allocator's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub total_budget: usize,
    pub system_tokens: usize,
    pub history_budget: usize,
    pub history_tokens: usize,
    /// Number of newest turns kept.
    pub history_turns_kept: usize,
    pub history_turns_dropped: usize,
    pub file_tokens: usize,
    pub files: Vec<FileAllocation>,
}

impl AllocationPlan {
    pub fn used_tokens(&self) -> usize {
        self.system_tokens + self.history_tokens + self.file_tokens
    }

    pub fn remaining_tokens(&self) -> usize {
        self.total_budget.saturating_sub(self.used_tokens())
    }

    /// Decision for the first entry with this path.
    pub fn decision_for(&self, path: &str) -> Option<FileDecision> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.decision)
    }

    /// Demote the file at `index` after the fact, refunding the difference.
    ///
    /// Reference lines are never more expensive than summaries, so this can
    /// only free budget.
    pub fn degrade_to_reference(
        &mut self,
        index: usize,
        reason: DegradeReason,
        reference_tokens: usize,
    ) {
        let Some(file) = self.files.get_mut(index) else {
            return;
        };
        if !matches!(file.decision, FileDecision::Summarized | FileDecision::EmbeddedFull) {
            return;
        }
        let charge = reference_tokens.min(file.tokens);
        self.file_tokens = self.file_tokens - file.tokens + charge;
        file.tokens = charge;
        file.decision = FileDecision::DegradedToReference { reason };
    }
}

/// Apportions a fixed token budget.
#[derive(Debug, Clone, Default)]
pub struct TokenBudgetAllocator {
    settings: BudgetSettings,
}

impl TokenBudgetAllocator {
    pub fn new(settings: BudgetSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &BudgetSettings {
        &self.settings
    }

    /// Allocate `total` tokens.
    ///
    /// `history` holds per-turn costs, oldest first. `system_tokens` is the
    /// hard floor (system prompt plus the request itself).
    pub fn allocate(
        &self,
        total: usize,
        system_tokens: usize,
        history: &[usize],
        files: &[FileCandidate],
        mode: FileHandlingMode,
    ) -> Result<AllocationPlan, ContextError> {
        if system_tokens > total {
            return Err(ContextError::BudgetExceeded {
                system_tokens,
                budget: total,
            });
        }
        let after_system = total - system_tokens;

        // History: newest contiguous suffix under the ceiling.
        let mut history_budget = (after_system as f64 * self.settings.history_share) as usize;
        if let Some(cap) = self.settings.max_history_tokens {
            history_budget = history_budget.min(cap);
        }
        let mut history_tokens = 0;
        let mut kept = 0;
        for cost in history.iter().rev() {
            if history_tokens + cost > history_budget {
                break;
            }
            history_tokens += cost;
            kept += 1;
        }

        let mut remaining = after_system - history_tokens;
        let mut file_tokens = 0;
        let mut allocations = Vec::with_capacity(files.len());

        for candidate in files {
            let (decision, tokens) = self.decide(candidate, mode, remaining);
            remaining -= tokens;
            file_tokens += tokens;
            allocations.push(FileAllocation {
                path: candidate.file.path.clone(),
                requested: mode,
                decision,
                tokens,
            });
        }

        Ok(AllocationPlan {
            total_budget: total,
            system_tokens,
            history_budget,
            history_tokens,
            history_turns_kept: kept,
            history_turns_dropped: history.len() - kept,
            file_tokens,
            files: allocations,
        })
    }

    fn decide(
        &self,
        candidate: &FileCandidate,
        mode: FileHandlingMode,
        remaining: usize,
    ) -> (FileDecision, usize) {
        let reference = self.settings.reference_tokens;
        let as_reference = |decision: FileDecision| {
            if reference <= remaining {
                (decision, reference)
            } else {
                (FileDecision::Omitted, 0)
            }
        };
        let degraded = |reason| as_reference(FileDecision::DegradedToReference { reason });

        if candidate.previously_embedded {
            return as_reference(FileDecision::Referenced);
        }

        match mode {
            FileHandlingMode::Embedded => {
                if candidate.estimate_timed_out {
                    degraded(DegradeReason::Timeout)
                } else if candidate.estimated_tokens <= remaining {
                    (FileDecision::EmbeddedFull, candidate.estimated_tokens)
                } else {
                    degraded(DegradeReason::Overflow)
                }
            }
            FileHandlingMode::Summary => {
                if self.settings.summary_tokens <= remaining {
                    (FileDecision::Summarized, self.settings.summary_tokens)
                } else {
                    degraded(DegradeReason::Overflow)
                }
            }
            FileHandlingMode::Reference => as_reference(FileDecision::Referenced),
        }
    }
}
