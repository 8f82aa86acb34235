//! `spindle config`: Configuration management commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use spindle_config::{AgentConfig, CredentialChain, EnvLookup, ProcessEnv};

fn default_path(env: &dyn EnvLookup) -> PathBuf {
    env.get("SPINDLE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| AgentConfig::config_dir(env).join("config.toml"))
}

pub fn init(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(|| default_path(&ProcessEnv));
    write_default(&path, force)?;
    println!("✅ Wrote default config to {}", path.display());
    Ok(())
}

fn write_default(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create config directory {}", dir.display()))?;
    }
    std::fs::write(path, AgentConfig::default_toml())
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn check(path: Option<PathBuf>) -> anyhow::Result<()> {
    println!("🔍 Validating configuration...");

    let config = match path {
        Some(path) => load_checked(&path, &ProcessEnv)?,
        None => AgentConfig::load(&ProcessEnv)?,
    };
    println!("   ✅ Config parsed and validated");

    let warnings = warnings(&config, &ProcessEnv);
    if !warnings.is_empty() {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Model:       {}", config.llm.model);
    println!("   Base URL:    {}", config.llm.base_url);
    println!("   Max tokens:  {}", config.max_tokens);
    println!(
        "   Retries:     {} ({} ms → {} ms, ×{})",
        config.retry.max_retries,
        config.retry.initial_backoff_ms,
        config.retry.max_backoff_ms,
        config.retry.multiplier
    );
    if !config.tools.is_empty() {
        println!("   Tools:       {}", config.tools.join(", "));
    }
    Ok(())
}

fn load_checked(path: &Path, env: &dyn EnvLookup) -> anyhow::Result<AgentConfig> {
    if !path.exists() {
        bail!("{} does not exist", path.display());
    }
    let mut config = AgentConfig::load_from(path)?;
    config.apply_env_overrides(env)?;
    config.validate()?;
    Ok(config)
}

/// Non-fatal problems worth pointing out.
fn warnings(config: &AgentConfig, env: &dyn EnvLookup) -> Vec<String> {
    let mut warnings = Vec::new();
    let key_from_env = CredentialChain::default_env(Vec::<String>::new()).resolve(env);
    if config.llm.api_key.is_none() && key_from_env.is_none() {
        warnings.push("No API key set (config llm.api_key or OPENAI_API_KEY, ANTHROPIC_API_KEY, ...)".into());
    }
    if config.retry.max_retries == 0 {
        warnings.push("Tool retries are disabled".into());
    }
    if !config.work_dir.exists() {
        warnings.push(format!("Work dir {} does not exist", config.work_dir.display()));
    }
    warnings
}

pub fn show() -> anyhow::Result<()> {
    let config = AgentConfig::load(&ProcessEnv).context("load config")?;
    println!("{}", config.to_toml());
    Ok(())
}

pub fn path() {
    println!("{}", default_path(&ProcessEnv).display());
}
