//! End-to-end integration tests for Continuum.
//!
//! These tests drive the full pipeline through `ContextAssembler`: thread
//! persistence, file dedup against real files, budget allocation, model
//! resolution and the append semantics under concurrency and expiry.

use std::sync::Arc;
use std::time::Duration;

use continuum_config::AppConfig;
use continuum_core::error::{ContextError, Error, ProviderError};
use continuum_core::file::FileHandlingMode;
use continuum_core::invocation::ToolInvocation;
use continuum_core::policy::RestrictionRule;
use continuum_core::provider::Provider;
use continuum_core::store::ThreadBackend;
use continuum_core::thread::RefTag;
use continuum_engine::{ContextAssembler, DegradeReason, FileDecision, ResolutionSource};
use continuum_memory::{FileBackend, InMemoryBackend, SqliteBackend, StoreSettings, ThreadStore};
use continuum_providers::{CatalogProvider, ProviderRegistry};
use futures::future::join_all;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A provider with scripted token estimates: text containing `BIG` costs
/// 900 tokens, everything else 200.
struct ScriptedEstimates {
    models: Vec<String>,
}

impl ScriptedEstimates {
    fn new(models: &[&str]) -> Self {
        Self {
            models: models.iter().map(|m| m.to_string()).collect(),
        }
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedEstimates {
    fn name(&self) -> &str {
        "openai"
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(self.models.clone())
    }

    async fn estimate_tokens(&self, text: &str) -> Result<usize, ProviderError> {
        Ok(if text.contains("BIG") { 900 } else { 200 })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn default_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(CatalogProvider::new(
        "openai",
        ["gpt-4o", "gpt-4o-mini"],
    )));
    registry.register(Arc::new(CatalogProvider::new("gemini", ["gemini-2.5-flash"])));
    registry
}

fn assembler_with(
    config: AppConfig,
    backend: Arc<dyn ThreadBackend>,
    settings: StoreSettings,
    registry: ProviderRegistry,
) -> ContextAssembler {
    let store = ThreadStore::new(backend, settings);
    ContextAssembler::new(Arc::new(config), store, registry)
}

fn memory_assembler(settings: StoreSettings) -> ContextAssembler {
    assembler_with(
        AppConfig::default(),
        Arc::new(InMemoryBackend::new()),
        settings,
        default_registry(),
    )
}

fn write(dir: &std::path::Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path.to_str().unwrap().to_string()
}

// ── E2E: Multi-turn continuity ───────────────────────────────────────────

#[tokio::test]
async fn e2e_multi_turn_dedup_over_real_files() {
    let workspace = tempfile::tempdir().unwrap();
    let threads = tempfile::tempdir().unwrap();
    let main_rs = write(workspace.path(), "src/main.rs", "fn main() { run(); }");
    let lib_rs = write(workspace.path(), "src/lib.rs", "pub fn run() {}");

    let assembler = assembler_with(
        AppConfig::default(),
        Arc::new(FileBackend::new(threads.path())),
        StoreSettings::default(),
        default_registry(),
    );

    // Turn 1: both files embedded in full.
    let first = assembler
        .assemble(
            &ToolInvocation::new("review", "Review this crate")
                .with_files([main_rs.clone(), lib_rs.clone()], FileHandlingMode::Embedded),
        )
        .await
        .expect("first call should succeed");
    assert!(first.is_new_thread);
    assert!(first
        .file_payload
        .iter()
        .all(|f| f.decision == FileDecision::EmbeddedFull));
    assembler
        .record_response(&first, "main.rs calls run() from lib.rs")
        .await
        .unwrap();

    // Turn 3: nothing changed, nothing re-sent.
    let second = assembler
        .assemble(
            &ToolInvocation::new("review", "Any panics?")
                .continuing(first.continuation_id.clone())
                .with_files([main_rs.clone(), lib_rs.clone()], FileHandlingMode::Embedded),
        )
        .await
        .unwrap();
    assert!(!second.is_new_thread);
    assert!(second
        .file_payload
        .iter()
        .all(|f| f.decision == FileDecision::Referenced));
    assert!(!second.render_prompt().contains("fn main() { run(); }"));
    assert!(second.history_text.contains("main.rs calls run() from lib.rs"));
    assert_eq!(second.plan.history_turns_kept, 2);

    // Turn 4: an edit is re-embedded; the untouched file stays referenced.
    std::fs::write(&lib_rs, "pub fn run() { println!(\"hi\"); }").unwrap();
    let third = assembler
        .assemble(
            &ToolInvocation::new("review", "And now?")
                .continuing(first.continuation_id.clone())
                .with_files([main_rs.clone(), lib_rs.clone()], FileHandlingMode::Embedded),
        )
        .await
        .unwrap();
    assert_eq!(third.plan.decision_for(&main_rs), Some(FileDecision::Referenced));
    assert_eq!(third.plan.decision_for(&lib_rs), Some(FileDecision::EmbeddedFull));

    let thread = assembler.store().get(&first.continuation_id).await.unwrap();
    assert_eq!(thread.turns.len(), 4);
    assert_eq!(thread.file_fingerprints.len(), 2);
}

async fn open_backend(kind: &str, root: &std::path::Path) -> Arc<dyn ThreadBackend> {
    match kind {
        "file" => Arc::new(FileBackend::new(root.join("json"))),
        _ => Arc::new(SqliteBackend::open(&root.join("threads.db")).await.unwrap()),
    }
}

#[tokio::test]
async fn e2e_threads_survive_backend_reopen() {
    let root = tempfile::tempdir().unwrap();

    for kind in ["file", "sqlite"] {
        let first = assembler_with(
            AppConfig::default(),
            open_backend(kind, root.path()).await,
            StoreSettings::default(),
            default_registry(),
        )
        .assemble(&ToolInvocation::new("chat", "remember me").with_model("gemini-2.5-flash"))
        .await
        .unwrap();

        // A fresh backend over the same storage sees the thread and its pin.
        let reopened = assembler_with(
            AppConfig::default(),
            open_backend(kind, root.path()).await,
            StoreSettings::default(),
            default_registry(),
        );
        let second = reopened
            .assemble(
                &ToolInvocation::new("chat", "still there?")
                    .continuing(first.continuation_id.clone()),
            )
            .await
            .unwrap();

        assert!(!second.is_new_thread, "{kind} backend lost the thread");
        assert_eq!(second.resolved_model, "gemini-2.5-flash");
        assert_eq!(second.resolution, ResolutionSource::Pinned);
        assert_eq!(second.turn_count, 2);
    }
}

// ── E2E: Append atomicity ────────────────────────────────────────────────

#[tokio::test]
async fn e2e_concurrent_failing_and_succeeding_calls_append_once() {
    let workspace = tempfile::tempdir().unwrap();
    let present = write(workspace.path(), "ok.rs", "fn ok() {}");
    let missing = workspace.path().join("missing.rs").to_str().unwrap().to_string();

    let assembler = memory_assembler(StoreSettings::default());
    let first = assembler
        .assemble(&ToolInvocation::new("chat", "start"))
        .await
        .unwrap();
    let id = first.continuation_id.clone();

    let failing = ToolInvocation::new("chat", "broken")
        .continuing(id.clone())
        .with_files([missing], FileHandlingMode::Embedded);
    let succeeding = ToolInvocation::new("chat", "fine")
        .continuing(id.clone())
        .with_files([present], FileHandlingMode::Embedded);

    let (failed, succeeded) =
        tokio::join!(assembler.assemble(&failing), assembler.assemble(&succeeding));

    assert!(matches!(failed, Err(Error::File(_))));
    assert_eq!(succeeded.unwrap().turn_count, 2);

    let thread = assembler.store().get(&id).await.unwrap();
    assert_eq!(thread.turns.len(), 2);
    assert_eq!(thread.turns[1].content, "fine");
}

#[tokio::test]
async fn e2e_concurrent_appends_are_all_recorded() {
    let assembler = memory_assembler(StoreSettings::default());
    let first = assembler
        .assemble(&ToolInvocation::new("chat", "start"))
        .await
        .unwrap();
    let id = first.continuation_id.clone();

    let invocations: Vec<ToolInvocation> = (0..5)
        .map(|i| ToolInvocation::new("chat", format!("parallel {i}")).continuing(id.clone()))
        .collect();
    let results = join_all(invocations.iter().map(|inv| assembler.assemble(inv))).await;
    assert!(results.iter().all(|r| r.is_ok()));

    let thread = assembler.store().get(&id).await.unwrap();
    assert_eq!(thread.turns.len(), 6);
    for i in 0..5 {
        let content = format!("parallel {i}");
        assert_eq!(thread.turns.iter().filter(|t| t.content == content).count(), 1);
    }
}

#[tokio::test]
async fn e2e_overlapping_calls_embed_a_new_file_once() {
    let workspace = tempfile::tempdir().unwrap();
    let shared = write(workspace.path(), "a.rs", "pub fn shared() {}");

    let assembler = memory_assembler(StoreSettings::default());
    let first = assembler
        .assemble(&ToolInvocation::new("review", "start"))
        .await
        .unwrap();
    let id = first.continuation_id.clone();

    let left = ToolInvocation::new("review", "left")
        .continuing(id.clone())
        .with_files([shared.clone()], FileHandlingMode::Embedded);
    let right = ToolInvocation::new("review", "right")
        .continuing(id.clone())
        .with_files([shared.clone()], FileHandlingMode::Embedded);

    let (left, right) = tokio::join!(assembler.assemble(&left), assembler.assemble(&right));
    let decisions = [
        left.unwrap().plan.decision_for(&shared),
        right.unwrap().plan.decision_for(&shared),
    ];
    assert_eq!(
        decisions
            .iter()
            .filter(|d| **d == Some(FileDecision::EmbeddedFull))
            .count(),
        1
    );
    assert!(decisions.contains(&Some(FileDecision::Referenced)));

    let thread = assembler.store().get(&id).await.unwrap();
    assert_eq!(thread.turns.len(), 3);
    let embedded = thread
        .turns
        .iter()
        .flat_map(|t| &t.file_refs)
        .filter(|r| r.tag == RefTag::Embedded)
        .count();
    assert_eq!(embedded, 1);
}

// ── E2E: Expiry and exhaustion ───────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn e2e_ttl_slides_and_expires() {
    let assembler = memory_assembler(StoreSettings {
        ttl: Duration::from_secs(3600),
        ..Default::default()
    });
    let first = assembler
        .assemble(&ToolInvocation::new("chat", "one"))
        .await
        .unwrap();
    let id = first.continuation_id.clone();

    // Each access within the TTL pushes expiry out again.
    for _ in 0..3 {
        tokio::time::advance(Duration::from_secs(40 * 60)).await;
        let ctx = assembler
            .assemble(&ToolInvocation::new("chat", "still here").continuing(id.clone()))
            .await
            .unwrap();
        assert!(!ctx.is_new_thread);
    }

    tokio::time::advance(Duration::from_secs(3601)).await;
    let ctx = assembler
        .assemble(&ToolInvocation::new("chat", "too late").continuing(id.clone()))
        .await
        .unwrap();
    assert!(ctx.is_new_thread);
    assert_ne!(ctx.continuation_id, id);
    assert!(assembler.store().get(&id).await.unwrap_err().is_thread_not_found());
}

#[tokio::test]
async fn e2e_exhaustion_at_exactly_max_turns() {
    let assembler = memory_assembler(StoreSettings {
        max_turns: 3,
        ..Default::default()
    });
    let first = assembler
        .assemble(&ToolInvocation::new("chat", "1"))
        .await
        .unwrap();
    assembler.record_response(&first, "2").await.unwrap();
    let third = assembler
        .assemble(&ToolInvocation::new("chat", "3").continuing(first.continuation_id.clone()))
        .await
        .unwrap();
    assert_eq!(third.turn_count, 3);

    let err = assembler
        .assemble(&ToolInvocation::new("chat", "4").continuing(first.continuation_id.clone()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Context(ContextError::ThreadExhausted { max_turns: 3, .. })
    ));

    let err = assembler.record_response(&third, "4").await.unwrap_err();
    assert!(matches!(err, Error::Context(ContextError::ThreadExhausted { .. })));

    let thread = assembler.store().get(&first.continuation_id).await.unwrap();
    assert_eq!(thread.turns.len(), 3);
}

// ── E2E: Budget ──────────────────────────────────────────────────────────

fn budget_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.models.context_limits.clear();
    config.models.context_limits.insert("default".into(), 1000);
    config.budget.response_reserve = 0.0;
    config
}

fn scripted_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(ScriptedEstimates::new(&["gpt-4o"])));
    registry
}

#[tokio::test]
async fn e2e_oversized_file_degrades_to_reference() {
    let workspace = tempfile::tempdir().unwrap();
    let big = write(workspace.path(), "big.rs", "// BIG generated table");

    let assembler = assembler_with(
        budget_config(),
        Arc::new(InMemoryBackend::new()),
        StoreSettings::default(),
        scripted_registry(),
    );
    let ctx = assembler
        .assemble(
            &ToolInvocation::new("chat", "summarize")
                .with_files([big.clone()], FileHandlingMode::Embedded),
        )
        .await
        .unwrap();

    assert_eq!(ctx.plan.total_budget, 1000);
    assert_eq!(ctx.plan.system_tokens, 200);
    assert_eq!(
        ctx.plan.decision_for(&big),
        Some(FileDecision::DegradedToReference {
            reason: DegradeReason::Overflow
        })
    );
    assert_eq!(ctx.plan.file_tokens, 24);
    let id = ctx.file_payload[0].reference_id.clone().unwrap();
    assert_eq!(
        assembler.references().resolve(&id).await.unwrap().content,
        "// BIG generated table"
    );

    // Degraded files are recorded reference-only, never as embedded.
    let thread = assembler.store().get(&ctx.continuation_id).await.unwrap();
    assert_eq!(thread.turns[0].file_refs[0].tag, RefTag::ReferenceOnly);
    assert!(thread.file_fingerprints.is_empty());
}

#[tokio::test]
async fn e2e_reference_mode_charges_fixed_cost_per_file() {
    let workspace = tempfile::tempdir().unwrap();
    write(workspace.path(), "a.rs", "// BIG a");
    write(workspace.path(), "b.rs", "small b");
    write(workspace.path(), "notes.bin", "ignored");

    let assembler = assembler_with(
        budget_config(),
        Arc::new(InMemoryBackend::new()),
        StoreSettings::default(),
        scripted_registry(),
    );
    let dir = workspace.path().to_str().unwrap().to_string();
    let ctx = assembler
        .assemble(
            &ToolInvocation::new("chat", "look").with_files([dir], FileHandlingMode::Reference),
        )
        .await
        .unwrap();

    assert_eq!(ctx.plan.files.len(), 2);
    assert!(ctx
        .plan
        .files
        .iter()
        .all(|f| f.decision == FileDecision::Referenced && f.tokens == 24));
    assert_eq!(ctx.plan.file_tokens, 48);
    for file in &ctx.file_payload {
        let id = file.reference_id.as_deref().unwrap();
        assert!(file.body.starts_with(&format!("[{id}]")));
        assert!(assembler.references().resolve(id).await.is_some());
    }
}

// ── E2E: Restrictions ────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_restriction_precedence_from_config() {
    let mut config = AppConfig::default();
    config.restrictions.blocked_models = vec!["gpt-4".into()];
    config
        .restrictions
        .allowed_models
        .insert("openai".into(), vec!["gpt-4".into(), "gpt-4o-mini".into()]);
    config.restrictions.disabled_patterns = vec!["legacy".into()];

    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(CatalogProvider::new(
        "openai",
        ["gpt-4", "gpt-4o-mini", "legacy-model"],
    )));
    let assembler = assembler_with(
        config,
        Arc::new(InMemoryBackend::new()),
        StoreSettings::default(),
        registry,
    );

    let blocked = assembler
        .assemble(&ToolInvocation::new("chat", "x").with_model("gpt-4"))
        .await
        .unwrap_err();
    assert!(matches!(
        blocked,
        Error::Context(ContextError::ModelRestricted {
            rule: RestrictionRule::Blocked,
            ..
        })
    ));

    let pattern = assembler
        .assemble(&ToolInvocation::new("chat", "x").with_model("legacy-model"))
        .await
        .unwrap_err();
    assert!(matches!(
        pattern,
        Error::Context(ContextError::ModelRestricted {
            rule: RestrictionRule::PatternBlocked { .. },
            ..
        })
    ));

    let allowed = assembler
        .assemble(&ToolInvocation::new("chat", "x").with_model("gpt-4o-mini"))
        .await
        .unwrap();
    assert_eq!(allowed.resolved_model, "gpt-4o-mini");

    let auto = assembler
        .assemble(&ToolInvocation::new("chat", "x").with_model("auto"))
        .await
        .unwrap();
    assert_eq!(auto.resolved_model, "gpt-4o-mini");
    assert_eq!(auto.resolution, ResolutionSource::Auto);

    // Only the two successful calls created threads.
    assert_eq!(assembler.store().count().await.unwrap(), 2);
}
