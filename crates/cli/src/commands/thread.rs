//! `continuum thread`: inspect and delete threads.

use super::{CliResult, Runtime};
use continuum_core::thread::ThreadId;

pub async fn show(id: &str, json: bool) -> CliResult {
    let runtime = Runtime::load().await?;
    let thread = runtime.store.get(&ThreadId::from(id)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&thread)?);
        return Ok(());
    }

    println!("🧵 Thread {}", thread.id);
    println!("   Mode:     {}", thread.mode);
    println!("   Created:  {}", thread.created_at.to_rfc3339());
    println!("   Active:   {}", thread.last_active_at.to_rfc3339());
    println!("   Turns:    {}/{}", thread.turn_count(), thread.max_turns);
    if let Some((provider, model)) = thread.pinned() {
        println!("   Pinned:   {provider}/{model}");
    }

    if !thread.file_fingerprints.is_empty() {
        println!();
        println!("   Embedded files:");
        for fingerprint in thread.file_fingerprints.iter() {
            println!("     {fingerprint}");
        }
    }

    println!();
    for (i, turn) in thread.turns.iter().enumerate() {
        let model = match (&turn.provider, &turn.model) {
            (Some(p), Some(m)) => format!(" via {p}/{m}"),
            _ => String::new(),
        };
        println!(
            "   [{}] {} ({}{model}) {}",
            i + 1,
            turn.role,
            turn.mode,
            turn.timestamp.format("%H:%M:%S")
        );
        let preview: String = turn.content.chars().take(120).collect();
        println!("       {preview}");
    }
    Ok(())
}

pub async fn delete(id: &str) -> CliResult {
    let runtime = Runtime::load().await?;
    if runtime.store.delete(&ThreadId::from(id)).await? {
        println!("🗑️  Deleted thread {id}");
    } else {
        println!("   Thread {id} not found");
    }
    Ok(())
}
