//! `continuum config`: configuration management commands.

use super::CliResult;
use continuum_config::AppConfig;

pub async fn validate() -> CliResult {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();
            if config.providers.is_empty() {
                warnings.push("No providers configured; model resolution will fail".to_string());
            }
            if let Some(fallback) = &config.restrictions.fallback_model {
                if config.restriction_policy().check("", fallback).is_err() {
                    warnings.push(format!("Fallback model '{fallback}' is itself restricted"));
                }
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!(
                "   Store:     {} ({})",
                config.store.backend,
                config.store.resolved_path().display()
            );
            println!("   Turns:     {}", config.conversation.max_turns);
            println!("   TTL:       {}h", config.conversation.ttl_hours);
            println!("   Providers: {}", config.providers.len());
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> CliResult {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some("***".into());
        }
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> CliResult {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

pub async fn init() -> CliResult {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        println!("   Config already exists at {}", config_path.display());
        return Ok(());
    }
    std::fs::create_dir_all(&config_dir)?;
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Wrote default config to {}", config_path.display());
    Ok(())
}
