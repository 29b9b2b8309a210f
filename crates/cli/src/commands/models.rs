//! `continuum models`: eligible models in resolution order.

use super::{CliResult, Runtime};
use continuum_engine::eligible_models;
use std::time::Duration;

pub async fn run() -> CliResult {
    let runtime = Runtime::load().await?;
    let registry = runtime.registry();
    if registry.is_empty() {
        println!("No providers configured. Add a [providers.<name>] section or set <NAME>_API_KEY.");
        return Ok(());
    }

    let catalog = registry.catalog(Duration::from_secs(10)).await;
    let policy = runtime.config.restriction_policy();
    let eligible = eligible_models(&policy, &catalog);

    println!("🤖 Eligible models (auto selection picks the first):");
    println!();
    for (i, (provider, model)) in eligible.iter().enumerate() {
        let limit = runtime.config.context_limit(model);
        println!("   {:>3}. {provider}/{model}  (context {limit})", i + 1);
    }

    let offered: usize = catalog.values().map(|m| m.len()).sum();
    println!();
    println!(
        "   {} of {offered} offered models are eligible across {} providers",
        eligible.len(),
        catalog.len()
    );
    Ok(())
}
