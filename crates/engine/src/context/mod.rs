//! Context assembly for stateless tool calls.
//!
//! | Stage | Module | Output |
//! |-------|--------|--------|
//! | Identity | `fingerprint` | (path, content hash) per file |
//! | Dedup | `dedup` | files to embed vs. files already seen |
//! | Budget | `budget` | per-file decisions and kept history |
//! | History | `token` | rendered turns and their costs |
//! | Orchestration | `assembler` | `AssembledContext` + appended turn |

pub mod assembler;
pub mod budget;
pub mod dedup;
pub mod fingerprint;
pub mod token;

pub use assembler::{AssembledContext, AssemblerSettings, ContextAssembler, FilePayload};
pub use budget::{
    AllocationPlan, BudgetSettings, DegradeReason, FileAllocation, FileCandidate, FileDecision,
    TokenBudgetAllocator,
};
pub use dedup::Partition;
pub use fingerprint::{reference_id, ContentFingerprinter};
