//! `continuum respond`: record a model reply.

use super::{CliResult, Runtime};
use continuum_core::thread::{Role, ThreadId, Turn};

pub async fn run(continuation: &str, content: &str) -> CliResult {
    let runtime = Runtime::load().await?;
    let id = ThreadId::from(continuation);
    let thread = runtime.store.get(&id).await?;

    // The reply is attributed to the model that served the latest request.
    let request = thread
        .turns
        .iter()
        .rev()
        .find(|t| t.role == Role::User)
        .ok_or_else(|| format!("Thread {id} has no request to respond to"))?;

    let mut turn = Turn::assistant(&request.mode, content);
    if let (Some(provider), Some(model)) = (&request.provider, &request.model) {
        turn = turn.with_model(provider, model);
    }
    let thread = runtime.store.append(&id, turn).await?;

    println!(
        "✅ Recorded reply on {id} ({}/{} turns)",
        thread.turn_count(),
        thread.max_turns
    );
    Ok(())
}
