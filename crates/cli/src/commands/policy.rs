//! `continuum policy`: the active restriction snapshot.

use super::CliResult;
use continuum_config::AppConfig;

pub async fn run() -> CliResult {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let policy = config.restriction_policy();

    if policy.is_unrestricted() {
        println!("🔓 No model restrictions configured");
    }
    println!("{}", serde_json::to_string_pretty(&policy.summary())?);
    Ok(())
}
