//! Continuum engine: turns stateless tool calls into multi-turn sessions.
//!
//! Owns file deduplication, token budgeting, model resolution and the
//! assembly pipeline that ties them to a `ThreadStore`.

pub mod context;
pub mod deadline;
pub mod files;
pub mod resolver;

pub use context::{
    AllocationPlan, AssembledContext, AssemblerSettings, BudgetSettings, ContentFingerprinter,
    ContextAssembler, DegradeReason, FileDecision, FilePayload, TokenBudgetAllocator,
};
pub use files::FsFileSource;
pub use resolver::{eligible_models, ModelResolver, Resolution, ResolutionSource};
