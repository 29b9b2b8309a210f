//! `continuum sweep`: purge expired threads.

use super::{CliResult, Runtime};

pub async fn run() -> CliResult {
    let runtime = Runtime::load().await?;
    let purged = runtime.store.purge_expired().await?;
    let remaining = runtime.store.count().await?;
    println!(
        "🧹 Purged {purged} expired threads from the {} store ({remaining} live)",
        runtime.store.backend_name()
    );
    Ok(())
}
