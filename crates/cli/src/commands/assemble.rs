//! `continuum assemble`: build context for one tool call.

use super::{CliResult, Runtime};
use continuum_core::file::FileHandlingMode;
use continuum_core::invocation::{ThinkingMode, ToolInvocation};
use continuum_core::thread::ThreadId;
use continuum_engine::FileDecision;

pub struct AssembleArgs {
    pub prompt: String,
    pub mode: String,
    pub continuation: Option<String>,
    pub model: Option<String>,
    pub files: Vec<String>,
    pub file_mode: FileHandlingMode,
    pub thinking: Option<ThinkingMode>,
    pub json: bool,
}

impl AssembleArgs {
    fn invocation(&self) -> ToolInvocation {
        ToolInvocation {
            continuation_id: self.continuation.as_deref().map(ThreadId::from),
            mode: self.mode.clone(),
            requested_model: self.model.clone(),
            files: self.files.clone(),
            file_handling_mode: self.file_mode,
            prompt_text: self.prompt.clone(),
            thinking_mode: self.thinking,
        }
    }
}

pub async fn run(args: AssembleArgs) -> CliResult {
    let runtime = Runtime::load().await?;
    let assembler = runtime.assembler();
    let context = assembler.assemble(&args.invocation()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&context)?);
        return Ok(());
    }

    let marker = if context.is_new_thread { " (new)" } else { "" };
    eprintln!("🧵 Thread:   {}{marker}", context.continuation_id);
    eprintln!(
        "🤖 Model:    {}/{} ({})",
        context.resolved_provider, context.resolved_model, context.resolution
    );
    eprintln!(
        "📊 Tokens:   {} / {} (system {}, history {} over {} turns, files {})",
        context.plan.used_tokens(),
        context.plan.total_budget,
        context.plan.system_tokens,
        context.plan.history_tokens,
        context.plan.history_turns_kept,
        context.plan.file_tokens
    );
    if let Some(budget) = context.thinking_budget {
        eprintln!("💭 Thinking: {budget} tokens");
    }
    for file in &context.plan.files {
        let marker = match file.decision {
            FileDecision::EmbeddedFull | FileDecision::Summarized => "✅",
            FileDecision::Referenced => "🔗",
            FileDecision::DegradedToReference { .. } => "⚠️ ",
            FileDecision::Omitted => "❌",
        };
        eprintln!("   {marker} {} ({:?}, {} tokens)", file.path, file.decision, file.tokens);
    }
    eprintln!();

    println!("{}", context.system_prompt);
    println!();
    println!("{}", context.render_prompt());
    Ok(())
}
