//! The context assembly pipeline.
//!
//! One call turns a stateless `ToolInvocation` into a payload that carries
//! the thread's history and only the file content the model has not seen:
//!
//! 1. Load the thread (or draft a new one)
//! 2. Resolve the model against the restriction policy
//! 3. Read and fingerprint the requested files, partition against the thread
//! 4. Estimate token costs under a deadline
//! 5. Allocate the budget
//! 6. Produce summaries under a deadline
//! 7. Build the payload
//! 8. Append the user turn
//!
//! The append is the only mutation and always the last step, so a failure or
//! cancellation anywhere earlier leaves the thread exactly as it was.

use crate::context::budget::{
    AllocationPlan, BudgetSettings, DegradeReason, FileCandidate, FileDecision,
    TokenBudgetAllocator,
};
use crate::context::dedup::{self, Partition};
use crate::context::fingerprint::{reference_id, ContentFingerprinter};
use crate::context::token::{estimate_turn_tokens, render_history, render_turn};
use crate::deadline;
use crate::files::FsFileSource;
use crate::resolver::{ModelResolver, Resolution, ResolutionSource};
use continuum_config::AppConfig;
use continuum_core::error::{ContextError, ProviderError, Result, StoreError};
use continuum_core::file::{FileHandlingMode, FileReference, FileSource};
use continuum_core::invocation::ToolInvocation;
use continuum_core::policy::RestrictionPolicy;
use continuum_core::provider::{ModelCatalog, Provider, Summarizer, SystemPrompts};
use continuum_core::thread::{ModelPin, RefTag, Thread, ThreadId, Turn, TurnFileRef};
use continuum_core::token::estimate_tokens;
use continuum_memory::{AppendOutcome, ReferenceStore, ReferencedFile, ThreadStore};
use continuum_providers::{OutlineSummarizer, ProviderRegistry};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Deadlines for external capabilities.
#[derive(Debug, Clone)]
pub struct AssemblerSettings {
    /// Per-provider model listing.
    pub catalog_timeout: Duration,
    /// Per-text token estimation.
    pub estimate_timeout: Duration,
    /// Per-file summarization.
    pub summary_timeout: Duration,
}

impl Default for AssemblerSettings {
    fn default() -> Self {
        Self {
            catalog_timeout: Duration::from_secs(10),
            estimate_timeout: Duration::from_millis(2000),
            summary_timeout: Duration::from_millis(5000),
        }
    }
}

impl AssemblerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            estimate_timeout: Duration::from_millis(config.budget.estimate_timeout_ms),
            summary_timeout: Duration::from_millis(config.budget.summary_timeout_ms),
            ..Self::default()
        }
    }
}

/// One file as it goes out to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    pub path: String,
    /// The representation actually sent.
    pub mode: FileHandlingMode,
    pub decision: FileDecision,
    /// Full content, summary text, or a reference line.
    pub body: String,
    /// Resolvable through the reference store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
}

/// The result of one assembly call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledContext {
    /// Thread to pass back on the next call.
    pub continuation_id: ThreadId,
    pub mode: String,
    pub system_prompt: String,
    /// Rendered kept history; empty for a new thread.
    pub history_text: String,
    pub prompt_text: String,
    pub file_payload: Vec<FilePayload>,
    pub resolved_provider: String,
    pub resolved_model: String,
    pub resolution: ResolutionSource,
    pub plan: AllocationPlan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<usize>,
    pub is_new_thread: bool,
    /// Turns in the thread after this call's append.
    pub turn_count: usize,
}

impl AssembledContext {
    /// The user-facing message: history, files, then the request.
    pub fn render_prompt(&self) -> String {
        let mut sections = Vec::new();
        if !self.history_text.is_empty() {
            sections.push(self.history_text.clone());
        }
        if !self.file_payload.is_empty() {
            let files: Vec<String> = self
                .file_payload
                .iter()
                .map(|f| match f.mode {
                    FileHandlingMode::Reference => f.body.clone(),
                    _ => format!(
                        "--- BEGIN FILE: {} ({}) ---\n{}\n--- END FILE: {} ---",
                        f.path, f.mode, f.body, f.path
                    ),
                })
                .collect();
            sections.push(files.join("\n\n"));
        }
        sections.push(self.prompt_text.clone());
        sections.join("\n\n")
    }
}

/// A file read during assembly. Content never outlives the call.
struct LoadedFile {
    reference: FileReference,
    content: String,
}

/// Everything planned for one append attempt.
struct DraftTurn {
    resolution: Resolution,
    plan: AllocationPlan,
    history_text: String,
    file_payload: Vec<FilePayload>,
    thinking_budget: Option<usize>,
    turn: Turn,
    pin: Option<ModelPin>,
}

/// Orchestrates thread state, dedup, budgeting and model resolution.
pub struct ContextAssembler {
    /// Source for limits and the context-window table
    config: Arc<AppConfig>,

    store: ThreadStore,

    registry: ProviderRegistry,

    files: Arc<dyn FileSource>,

    summarizer: Arc<dyn Summarizer>,

    prompts: Arc<dyn SystemPrompts>,

    /// Immutable restriction snapshot
    policy: RestrictionPolicy,

    references: ReferenceStore,

    allocator: TokenBudgetAllocator,

    resolver: ModelResolver,

    fingerprinter: ContentFingerprinter,

    settings: AssemblerSettings,
}

impl ContextAssembler {
    /// Create an assembler with the filesystem source, the structural
    /// summarizer and the configured prompts and policy.
    pub fn new(config: Arc<AppConfig>, store: ThreadStore, registry: ProviderRegistry) -> Self {
        Self {
            files: Arc::new(FsFileSource::new(&config.files)),
            summarizer: Arc::new(OutlineSummarizer::new()),
            prompts: Arc::new(config.prompts.clone()),
            policy: config.restriction_policy(),
            references: ReferenceStore::default(),
            allocator: TokenBudgetAllocator::new(BudgetSettings::from_config(&config.budget)),
            resolver: ModelResolver::new(),
            fingerprinter: ContentFingerprinter::new(),
            settings: AssemblerSettings::from_config(&config),
            config,
            store,
            registry,
        }
    }

    pub fn with_file_source(mut self, files: Arc<dyn FileSource>) -> Self {
        self.files = files;
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn with_prompts(mut self, prompts: Arc<dyn SystemPrompts>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_policy(mut self, policy: RestrictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_reference_store(mut self, references: ReferenceStore) -> Self {
        self.references = references;
        self
    }

    pub fn with_settings(mut self, settings: AssemblerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &ThreadStore {
        &self.store
    }

    pub fn references(&self) -> &ReferenceStore {
        &self.references
    }

    pub fn policy(&self) -> &RestrictionPolicy {
        &self.policy
    }

    /// Assemble context for one invocation and record it as a user turn.
    ///
    /// If another call appends to the thread first, the turn is planned again
    /// against the fresh thread so files it just embedded are referenced.
    pub async fn assemble(&self, invocation: &ToolInvocation) -> Result<AssembledContext> {
        let (mut thread, is_new_thread) = self.load_thread(invocation).await?;
        let catalog = self.registry.catalog(self.settings.catalog_timeout).await;
        let loaded = self.load_files(invocation).await?;
        let system_prompt = self.prompts.system_prompt(&invocation.mode);

        let attempts = self.store.settings().append_retries.max(1);
        for attempt in 1..=attempts {
            let draft = self
                .draft_turn(invocation, &thread, &catalog, &loaded, &system_prompt)
                .await?;

            // --- Append (last) ---
            let outcome = if is_new_thread {
                let saved = self
                    .store
                    .create_with_turn(thread.clone(), draft.turn.clone(), draft.pin.as_ref())
                    .await?;
                AppendOutcome::Appended(saved)
            } else {
                self.store
                    .append_if_unchanged(
                        &thread.id,
                        thread.turn_count(),
                        draft.turn.clone(),
                        draft.pin.as_ref(),
                    )
                    .await?
            };

            match outcome {
                AppendOutcome::Appended(saved) => {
                    return Ok(self.finish(invocation, saved, draft, system_prompt, is_new_thread));
                }
                AppendOutcome::Stale(fresh) => {
                    debug!(
                        thread_id = %fresh.id,
                        attempt,
                        seen = thread.turn_count(),
                        current = fresh.turn_count(),
                        "Thread moved on during assembly, planning again"
                    );
                    thread = fresh;
                }
            }
        }

        Err(StoreError::Conflict {
            thread_id: thread.id.to_string(),
            attempts,
        }
        .into())
    }

    /// Resolve, partition, estimate, allocate and build the payload against
    /// one snapshot of the thread. Writes nothing to the thread.
    async fn draft_turn(
        &self,
        invocation: &ToolInvocation,
        thread: &Thread,
        catalog: &ModelCatalog,
        loaded: &[LoadedFile],
        system_prompt: &str,
    ) -> Result<DraftTurn> {
        // --- Model ---
        let explicit = invocation.explicit_model();
        let resolution = self
            .resolver
            .resolve(explicit, thread.pinned(), &self.policy, catalog)?;
        let provider = self.registry.get(&resolution.provider).ok_or_else(|| {
            ProviderError::NotConfigured(format!("provider '{}'", resolution.provider))
        })?;

        // --- Files ---
        let requested: Vec<FileReference> = loaded.iter().map(|f| f.reference.clone()).collect();
        let partition = dedup::partition(&thread.file_fingerprints, &requested);
        debug!(
            thread_id = %thread.id,
            to_embed = partition.to_embed.len(),
            to_reference = partition.to_reference.len(),
            "Files partitioned"
        );

        // --- Estimates ---
        let request_text = format!("{system_prompt}\n\n{}", invocation.prompt_text);
        let system_tokens = self
            .estimate(provider.as_ref(), "system_prompt", &request_text)
            .await
            .unwrap_or_else(|| estimate_tokens(&request_text));

        let history_costs: Vec<usize> = thread
            .turns
            .iter()
            .enumerate()
            .map(|(i, turn)| estimate_turn_tokens(&render_turn(i + 1, turn)))
            .collect();

        let candidates = self
            .file_candidates(provider.as_ref(), loaded, &partition, invocation.file_handling_mode)
            .await;

        // --- Allocation ---
        let total_budget = self.config.total_budget(&resolution.model);
        let mut plan = self.allocator.allocate(
            total_budget,
            system_tokens,
            &history_costs,
            &candidates,
            invocation.file_handling_mode,
        )?;
        let summaries = self.summarize(&mut plan, loaded).await;

        let kept_from = thread.turns.len() - plan.history_turns_kept;
        let history_text = render_history(
            thread.id.as_str(),
            kept_from + 1,
            &thread.turns[kept_from..],
        );
        if plan.history_turns_dropped > 0 {
            debug!(
                thread_id = %thread.id,
                dropped = plan.history_turns_dropped,
                "Oldest turns dropped from history"
            );
        }

        let file_payload = self.build_payload(&plan, loaded, summaries).await;

        let thinking_budget = invocation
            .thinking_mode
            .map(|mode| mode.budget(self.config.context_limit(&resolution.model)));

        let turn = Turn::user(&invocation.mode, &invocation.prompt_text)
            .with_file_refs(turn_refs(&plan, loaded))
            .with_model(&resolution.provider, &resolution.model);
        let pin = explicit.map(|_| ModelPin {
            provider: resolution.provider.clone(),
            model: resolution.model.clone(),
        });

        Ok(DraftTurn {
            resolution,
            plan,
            history_text,
            file_payload,
            thinking_budget,
            turn,
            pin,
        })
    }

    fn finish(
        &self,
        invocation: &ToolInvocation,
        thread: Thread,
        draft: DraftTurn,
        system_prompt: String,
        is_new_thread: bool,
    ) -> AssembledContext {
        let DraftTurn {
            resolution,
            plan,
            history_text,
            file_payload,
            thinking_budget,
            ..
        } = draft;

        info!(
            thread_id = %thread.id,
            provider = %resolution.provider,
            model = %resolution.model,
            is_new_thread,
            turns = thread.turn_count(),
            used_tokens = plan.used_tokens(),
            total_budget = plan.total_budget,
            "Context assembled"
        );

        let Resolution {
            provider: resolved_provider,
            model: resolved_model,
            source,
        } = resolution;
        AssembledContext {
            continuation_id: thread.id.clone(),
            mode: invocation.mode.clone(),
            system_prompt,
            history_text,
            prompt_text: invocation.prompt_text.clone(),
            file_payload,
            resolved_provider,
            resolved_model,
            resolution: source,
            plan,
            thinking_budget,
            is_new_thread,
            turn_count: thread.turn_count(),
        }
    }

    /// Record the model's reply as an assistant turn.
    pub async fn record_response(
        &self,
        context: &AssembledContext,
        content: &str,
    ) -> Result<Thread> {
        let turn = Turn::assistant(&context.mode, content)
            .with_model(&context.resolved_provider, &context.resolved_model);
        self.store.append(&context.continuation_id, turn).await
    }

    async fn load_thread(&self, invocation: &ToolInvocation) -> Result<(Thread, bool)> {
        let Some(id) = &invocation.continuation_id else {
            return Ok((self.store.draft(&invocation.mode), true));
        };

        match self.store.get(id).await {
            Ok(thread) if thread.is_exhausted() => Err(ContextError::ThreadExhausted {
                thread_id: id.to_string(),
                max_turns: thread.max_turns,
            }
            .into()),
            Ok(thread) => Ok((thread, false)),
            Err(e) if e.is_thread_not_found() => {
                warn!(thread_id = %id, "Continuation not found or expired, starting a new thread");
                Ok((self.store.draft(&invocation.mode), true))
            }
            Err(e) => Err(e),
        }
    }

    async fn load_files(&self, invocation: &ToolInvocation) -> Result<Vec<LoadedFile>> {
        if invocation.files.is_empty() {
            return Ok(Vec::new());
        }
        let paths = self.files.expand(&invocation.files).await?;
        let mut loaded = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = self.files.read(&path).await?;
            let reference =
                self.fingerprinter
                    .reference(&path, &bytes, invocation.file_handling_mode);
            loaded.push(LoadedFile {
                reference,
                content: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(loaded)
    }

    /// Provider estimate under the deadline.
    ///
    /// `None` on timeout; a provider error falls back to the heuristic.
    async fn estimate(&self, provider: &dyn Provider, target: &str, text: &str) -> Option<usize> {
        let limit = self.settings.estimate_timeout;
        match deadline::within("estimate_tokens", target, limit, provider.estimate_tokens(text))
            .await
        {
            Ok(Ok(tokens)) => Some(tokens),
            Ok(Err(e)) => {
                warn!(provider = provider.name(), target, error = %e, "Estimate failed, using heuristic");
                Some(estimate_tokens(text))
            }
            Err(_) => None,
        }
    }

    async fn file_candidates(
        &self,
        provider: &dyn Provider,
        loaded: &[LoadedFile],
        partition: &Partition,
        mode: FileHandlingMode,
    ) -> Vec<FileCandidate> {
        let estimates = loaded.iter().map(|file| async move {
            let path = file.reference.path.as_str();
            let needs_estimate =
                mode == FileHandlingMode::Embedded && !partition.is_referenced(path);
            if needs_estimate {
                self.estimate(provider, path, &file.content).await
            } else {
                Some(0)
            }
        });

        join_all(estimates)
            .await
            .into_iter()
            .zip(loaded)
            .map(|(estimate, file)| FileCandidate {
                file: file.reference.clone(),
                estimated_tokens: estimate.unwrap_or(0),
                previously_embedded: partition.is_referenced(&file.reference.path),
                estimate_timed_out: estimate.is_none(),
            })
            .collect()
    }

    /// Summarize every file the plan marked as summarized, in parallel.
    ///
    /// Returns summaries keyed by plan index. Files whose summary times out
    /// or fails are degraded in `plan`.
    async fn summarize(
        &self,
        plan: &mut AllocationPlan,
        loaded: &[LoadedFile],
    ) -> HashMap<usize, String> {
        let max_tokens = self.allocator.settings().summary_tokens;
        let limit = self.settings.summary_timeout;
        let targets: Vec<usize> = plan
            .files
            .iter()
            .enumerate()
            .filter(|(_, f)| f.decision == FileDecision::Summarized)
            .map(|(index, _)| index)
            .collect();

        let results = join_all(targets.iter().map(|&index| {
            let file = &loaded[index];
            let path = file.reference.path.as_str();
            async move {
                deadline::within(
                    "summarize",
                    path,
                    limit,
                    self.summarizer.summarize(path, &file.content, max_tokens),
                )
                .await
            }
        }))
        .await;

        let reference_tokens = self.allocator.settings().reference_tokens;
        let mut summaries = HashMap::new();
        for (index, result) in targets.into_iter().zip(results) {
            match result {
                Ok(Ok(summary)) => {
                    summaries.insert(index, summary);
                }
                Ok(Err(e)) => {
                    warn!(path = %plan.files[index].path, error = %e, "Summarizer failed, degrading to reference");
                    plan.degrade_to_reference(index, DegradeReason::Unavailable, reference_tokens);
                }
                Err(_) => {
                    plan.degrade_to_reference(index, DegradeReason::Timeout, reference_tokens);
                }
            }
        }
        summaries
    }

    async fn build_payload(
        &self,
        plan: &AllocationPlan,
        loaded: &[LoadedFile],
        mut summaries: HashMap<usize, String>,
    ) -> Vec<FilePayload> {
        let mut payload = Vec::new();
        for (index, (allocation, file)) in plan.files.iter().zip(loaded).enumerate() {
            let Some(mode) = allocation.decision.sent_as() else {
                debug!(path = %allocation.path, "File omitted, no budget for a reference");
                continue;
            };
            let reference = &file.reference;
            let (body, reference_id) = match mode {
                FileHandlingMode::Embedded => (file.content.clone(), None),
                FileHandlingMode::Summary => (summaries.remove(&index).unwrap_or_default(), None),
                FileHandlingMode::Reference => {
                    let id = reference_id(&reference.path, &reference.content_hash);
                    self.references
                        .register(
                            &id,
                            ReferencedFile {
                                path: reference.path.clone(),
                                content_hash: reference.content_hash.clone(),
                                content: file.content.clone(),
                            },
                        )
                        .await;
                    let line = format!(
                        "[{id}] {} ({} bytes, {})",
                        reference.path,
                        reference.size_bytes,
                        reference_note(allocation.decision)
                    );
                    (line, Some(id))
                }
            };
            if let FileDecision::DegradedToReference { reason } = allocation.decision {
                warn!(path = %reference.path, ?reason, "File degraded to reference");
            }
            payload.push(FilePayload {
                path: reference.path.clone(),
                mode,
                decision: allocation.decision,
                body,
                reference_id,
            });
        }
        payload
    }
}

fn reference_note(decision: FileDecision) -> &'static str {
    match decision {
        FileDecision::DegradedToReference {
            reason: DegradeReason::Overflow,
        } => "omitted to fit the token budget",
        FileDecision::DegradedToReference { .. } => "content unavailable in time",
        _ => "already in conversation history or sent by reference",
    }
}

/// File refs recorded on the user turn. Omitted files leave no trace.
fn turn_refs(plan: &AllocationPlan, loaded: &[LoadedFile]) -> Vec<TurnFileRef> {
    plan.files
        .iter()
        .zip(loaded)
        .filter(|(allocation, _)| allocation.decision != FileDecision::Omitted)
        .map(|(allocation, file)| TurnFileRef {
            fingerprint: file.reference.fingerprint(),
            tag: if allocation.decision == FileDecision::EmbeddedFull {
                RefTag::Embedded
            } else {
                RefTag::ReferenceOnly
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use continuum_core::error::Error;
    use continuum_core::fingerprint::Fingerprint;
    use continuum_memory::{InMemoryBackend, StoreSettings};
    use continuum_providers::CatalogProvider;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    /// File source over an in-memory map, editable between calls.
    #[derive(Default)]
    struct MemFiles {
        files: RwLock<HashMap<String, String>>,
    }

    impl MemFiles {
        async fn put(&self, path: &str, content: &str) {
            self.files
                .write()
                .await
                .insert(path.to_string(), content.to_string());
        }
    }

    #[async_trait]
    impl FileSource for MemFiles {
        async fn expand(
            &self,
            paths: &[String],
        ) -> std::result::Result<Vec<String>, continuum_core::error::FileError> {
            Ok(paths.to_vec())
        }

        async fn read(
            &self,
            path: &str,
        ) -> std::result::Result<Vec<u8>, continuum_core::error::FileError> {
            self.files
                .read()
                .await
                .get(path)
                .map(|c| c.clone().into_bytes())
                .ok_or_else(|| continuum_core::error::FileError::NotFound {
                    path: path.to_string(),
                })
        }
    }

    /// Provider whose estimates never arrive.
    struct StalledEstimates;

    #[async_trait]
    impl Provider for StalledEstimates {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
            Ok(vec!["slow-model".into()])
        }

        async fn estimate_tokens(&self, _text: &str) -> std::result::Result<usize, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(0)
        }
    }

    struct SlowSummarizer;

    #[async_trait]
    impl Summarizer for SlowSummarizer {
        fn name(&self) -> &str {
            "slow"
        }

        async fn summarize(
            &self,
            _path: &str,
            _content: &str,
            _max_tokens: usize,
        ) -> std::result::Result<String, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(String::new())
        }
    }

    struct BrokenSummarizer;

    #[async_trait]
    impl Summarizer for BrokenSummarizer {
        fn name(&self) -> &str {
            "broken"
        }

        async fn summarize(
            &self,
            path: &str,
            _content: &str,
            _max_tokens: usize,
        ) -> std::result::Result<String, ProviderError> {
            Err(ProviderError::Summarization(format!("cannot parse {path}")))
        }
    }

    struct EchoSummarizer;

    #[async_trait]
    impl Summarizer for EchoSummarizer {
        fn name(&self) -> &str {
            "echo"
        }

        async fn summarize(
            &self,
            path: &str,
            _content: &str,
            _max_tokens: usize,
        ) -> std::result::Result<String, ProviderError> {
            Ok(format!("summary of {path}"))
        }
    }

    struct Fixture {
        assembler: ContextAssembler,
        files: Arc<MemFiles>,
    }

    fn fixture_with(config: AppConfig, settings: StoreSettings) -> Fixture {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(CatalogProvider::new(
            "openai",
            ["gpt-4o", "gpt-4o-mini"],
        )));
        registry.register(Arc::new(CatalogProvider::new("gemini", ["gemini-2.5-pro"])));
        registry.register(Arc::new(StalledEstimates));

        let store = ThreadStore::new(Arc::new(InMemoryBackend::new()), settings);
        let files = Arc::new(MemFiles::default());
        let assembler = ContextAssembler::new(Arc::new(config), store, registry)
            .with_file_source(files.clone())
            .with_policy(RestrictionPolicy::new().with_provider_order(["openai"]));
        Fixture { assembler, files }
    }

    fn fixture() -> Fixture {
        fixture_with(AppConfig::default(), StoreSettings::default())
    }

    #[tokio::test]
    async fn first_call_creates_thread_and_embeds_files() {
        let fx = fixture();
        fx.files.put("/repo/a.rs", "fn a() {}").await;

        let invocation = ToolInvocation::new("review", "check this")
            .with_files(["/repo/a.rs"], FileHandlingMode::Embedded);
        let ctx = fx.assembler.assemble(&invocation).await.unwrap();

        assert!(ctx.is_new_thread);
        assert_eq!(ctx.turn_count, 1);
        assert_eq!(ctx.resolved_provider, "openai");
        assert_eq!(ctx.resolution, ResolutionSource::Auto);
        assert!(ctx.history_text.is_empty());
        assert_eq!(ctx.file_payload[0].decision, FileDecision::EmbeddedFull);
        assert_eq!(ctx.file_payload[0].body, "fn a() {}");

        let thread = fx.assembler.store().get(&ctx.continuation_id).await.unwrap();
        assert_eq!(thread.turns.len(), 1);
        assert_eq!(thread.file_fingerprints.len(), 1);
        // Auto selection never pins.
        assert_eq!(thread.pinned(), None);
    }

    #[tokio::test]
    async fn unchanged_file_is_referenced_on_continuation() {
        let fx = fixture();
        fx.files.put("/repo/a.rs", "fn a() {}").await;
        let first = fx
            .assembler
            .assemble(
                &ToolInvocation::new("review", "one")
                    .with_files(["/repo/a.rs"], FileHandlingMode::Embedded),
            )
            .await
            .unwrap();

        let second = fx
            .assembler
            .assemble(
                &ToolInvocation::new("review", "two")
                    .continuing(first.continuation_id.clone())
                    .with_files(["/repo/a.rs"], FileHandlingMode::Embedded),
            )
            .await
            .unwrap();

        assert!(!second.is_new_thread);
        assert_eq!(second.continuation_id, first.continuation_id);
        assert_eq!(second.file_payload[0].decision, FileDecision::Referenced);
        assert!(!second.file_payload[0].body.contains("fn a() {}"));
        assert!(second.history_text.contains("--- Turn 1 (user"));

        let id = second.file_payload[0].reference_id.clone().unwrap();
        let resolved = fx.assembler.references().resolve(&id).await.unwrap();
        assert_eq!(resolved.content, "fn a() {}");
    }

    #[tokio::test]
    async fn edited_file_is_re_embedded_and_supersedes() {
        let fx = fixture();
        fx.files.put("/repo/a.rs", "v1").await;
        let first = fx
            .assembler
            .assemble(
                &ToolInvocation::new("chat", "one")
                    .with_files(["/repo/a.rs"], FileHandlingMode::Embedded),
            )
            .await
            .unwrap();

        fx.files.put("/repo/a.rs", "v2").await;
        let second = fx
            .assembler
            .assemble(
                &ToolInvocation::new("chat", "two")
                    .continuing(first.continuation_id.clone())
                    .with_files(["/repo/a.rs"], FileHandlingMode::Embedded),
            )
            .await
            .unwrap();
        assert_eq!(second.file_payload[0].decision, FileDecision::EmbeddedFull);
        assert_eq!(second.file_payload[0].body, "v2");

        let thread = fx.assembler.store().get(&first.continuation_id).await.unwrap();
        let v2 = ContentFingerprinter::new().fingerprint("/repo/a.rs", b"v2");
        assert!(thread.file_fingerprints.contains(&v2));
        assert!(!thread
            .file_fingerprints
            .contains(&ContentFingerprinter::new().fingerprint("/repo/a.rs", b"v1")));
        assert_eq!(thread.file_fingerprints.len(), 1);
    }

    #[tokio::test]
    async fn unknown_continuation_starts_new_thread() {
        let fx = fixture();
        let ctx = fx
            .assembler
            .assemble(&ToolInvocation::new("chat", "hi").continuing(ThreadId::from("gone")))
            .await
            .unwrap();
        assert!(ctx.is_new_thread);
        assert_ne!(ctx.continuation_id.as_str(), "gone");
    }

    #[tokio::test]
    async fn exhausted_thread_is_rejected_without_mutation() {
        let fx = fixture_with(
            AppConfig::default(),
            StoreSettings {
                max_turns: 2,
                ..Default::default()
            },
        );
        let first = fx
            .assembler
            .assemble(&ToolInvocation::new("chat", "one"))
            .await
            .unwrap();
        fx.assembler.record_response(&first, "reply").await.unwrap();

        let err = fx
            .assembler
            .assemble(&ToolInvocation::new("chat", "three").continuing(first.continuation_id.clone()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Context(ContextError::ThreadExhausted { max_turns: 2, .. })
        ));
        let thread = fx.assembler.store().get(&first.continuation_id).await.unwrap();
        assert_eq!(thread.turns.len(), 2);
    }

    #[tokio::test]
    async fn explicit_model_pins_and_later_calls_follow_pin() {
        let fx = fixture();
        let first = fx
            .assembler
            .assemble(&ToolInvocation::new("chat", "one").with_model("gemini-2.5-pro"))
            .await
            .unwrap();
        assert_eq!(first.resolution, ResolutionSource::Explicit);

        let second = fx
            .assembler
            .assemble(&ToolInvocation::new("chat", "two").continuing(first.continuation_id.clone()))
            .await
            .unwrap();
        assert_eq!(second.resolved_model, "gemini-2.5-pro");
        assert_eq!(second.resolution, ResolutionSource::Pinned);
    }

    #[tokio::test]
    async fn restricted_model_aborts_before_append() {
        let fx = fixture();
        let first = fx
            .assembler
            .assemble(&ToolInvocation::new("chat", "one"))
            .await
            .unwrap();

        let assembler = fx
            .assembler
            .with_policy(RestrictionPolicy::new().block("gpt-4o"));
        let err = assembler
            .assemble(
                &ToolInvocation::new("chat", "two")
                    .continuing(first.continuation_id.clone())
                    .with_model("gpt-4o"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Context(ContextError::ModelRestricted { .. })));

        let thread = assembler.store().get(&first.continuation_id).await.unwrap();
        assert_eq!(thread.turns.len(), 1);
    }

    #[tokio::test]
    async fn missing_file_aborts_before_append() {
        let fx = fixture();
        let err = fx
            .assembler
            .assemble(
                &ToolInvocation::new("chat", "read")
                    .with_files(["/repo/missing.rs"], FileHandlingMode::Embedded),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::File(_)));
        assert_eq!(fx.assembler.store().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn system_prompt_over_budget_fails_fast() {
        let mut config = AppConfig::default();
        config.models.context_limits.insert("default".into(), 10);
        config.models.context_limits.retain(|k, _| k == "default");
        let fx = fixture_with(config, StoreSettings::default());

        let err = fx
            .assembler
            .assemble(&ToolInvocation::new("chat", "a long request"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Context(ContextError::BudgetExceeded { .. })));
        assert_eq!(fx.assembler.store().count().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_estimate_degrades_file() {
        let fx = fixture();
        fx.files.put("/repo/a.rs", "content").await;

        let ctx = fx
            .assembler
            .assemble(
                &ToolInvocation::new("chat", "hi")
                    .with_model("slow-model")
                    .with_files(["/repo/a.rs"], FileHandlingMode::Embedded),
            )
            .await
            .unwrap();
        assert_eq!(
            ctx.file_payload[0].decision,
            FileDecision::DegradedToReference {
                reason: DegradeReason::Timeout
            }
        );

        // Degraded files are reference-only, so the next call re-embeds them.
        let thread = fx.assembler.store().get(&ctx.continuation_id).await.unwrap();
        assert!(thread.file_fingerprints.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_summary_degrades_file() {
        let fx = fixture();
        fx.files.put("/repo/a.rs", "content").await;
        let assembler = fx.assembler.with_summarizer(Arc::new(SlowSummarizer));

        let ctx = assembler
            .assemble(
                &ToolInvocation::new("chat", "hi")
                    .with_files(["/repo/a.rs"], FileHandlingMode::Summary),
            )
            .await
            .unwrap();
        assert_eq!(
            ctx.plan.files[0].decision,
            FileDecision::DegradedToReference {
                reason: DegradeReason::Timeout
            }
        );
        assert_eq!(ctx.plan.file_tokens, 24);
    }

    #[tokio::test]
    async fn failed_summary_degrades_as_unavailable() {
        let fx = fixture();
        fx.files.put("/repo/a.rs", "content").await;
        let assembler = fx.assembler.with_summarizer(Arc::new(BrokenSummarizer));

        let ctx = assembler
            .assemble(
                &ToolInvocation::new("chat", "hi")
                    .with_files(["/repo/a.rs"], FileHandlingMode::Summary),
            )
            .await
            .unwrap();
        assert_eq!(
            ctx.file_payload[0].decision,
            FileDecision::DegradedToReference {
                reason: DegradeReason::Unavailable
            }
        );
        assert!(ctx.file_payload[0].reference_id.is_some());
    }

    #[tokio::test]
    async fn summary_mode_sends_summary_text() {
        let fx = fixture();
        fx.files.put("/repo/a.rs", "content").await;
        let assembler = fx.assembler.with_summarizer(Arc::new(EchoSummarizer));

        let ctx = assembler
            .assemble(
                &ToolInvocation::new("chat", "hi")
                    .with_files(["/repo/a.rs"], FileHandlingMode::Summary),
            )
            .await
            .unwrap();
        assert_eq!(ctx.file_payload[0].body, "summary of /repo/a.rs");
        assert!(ctx.render_prompt().contains("--- BEGIN FILE: /repo/a.rs (summary) ---"));

        // Summaries are not full embeds.
        let thread = assembler.store().get(&ctx.continuation_id).await.unwrap();
        assert!(!thread
            .file_fingerprints
            .contains(&Fingerprint::new("/repo/a.rs", ContentFingerprinter::new().hash(b"content"))));
    }

    #[tokio::test]
    async fn record_response_appends_assistant_turn() {
        let fx = fixture();
        let ctx = fx
            .assembler
            .assemble(&ToolInvocation::new("chat", "q"))
            .await
            .unwrap();
        let thread = fx.assembler.record_response(&ctx, "a").await.unwrap();
        assert_eq!(thread.turns.len(), 2);
        assert_eq!(thread.turns[1].content, "a");
        assert_eq!(thread.turns[1].model.as_deref(), Some(ctx.resolved_model.as_str()));
    }

    #[tokio::test]
    async fn thinking_budget_scales_with_context_limit() {
        let fx = fixture();
        let ctx = fx
            .assembler
            .assemble(
                &ToolInvocation::new("think", "q")
                    .with_model("gpt-4o")
                    .with_thinking(continuum_core::ThinkingMode::Max),
            )
            .await
            .unwrap();
        let limit = AppConfig::default().context_limit("gpt-4o");
        assert_eq!(ctx.thinking_budget, Some(limit));
    }
}
