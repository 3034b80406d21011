use std::path::PathBuf;

use anyhow::Context as _;
use dialoguer::{Confirm, Input, Password, Select};

use sensei_core::Config;

const MODELS: &[&str] = &["gemini-2.0-flash", "gemini-2.5-flash", "gemini-2.5-pro"];

/// Interactive first-run wizard. Writes a config file and exits.
pub fn run(output: PathBuf) -> anyhow::Result<()> {
    println!("sensei init - configuration wizard\n");

    let mut config = Config::default();

    let model_idx = Select::new()
        .with_prompt("Gemini model")
        .items(MODELS)
        .default(0)
        .interact()?;
    config.llm.model = MODELS[model_idx].to_string();

    let api_key: String = Password::new()
        .with_prompt("Gemini API key (leave empty to use SENSEI_GEMINI_API_KEY)")
        .allow_empty_password(true)
        .interact()?;
    if !api_key.is_empty() {
        config.llm.api_key = Some(api_key);
    }

    let timeout: u64 = Input::new()
        .with_prompt("Command timeout in seconds")
        .default(config.exec.timeout_secs)
        .interact_text()?;
    config.exec.timeout_secs = timeout.max(1);

    config.learning.enabled = Confirm::new()
        .with_prompt("Track learning progress and achievements?")
        .default(true)
        .interact()?;

    config.exec.audit.enabled = Confirm::new()
        .with_prompt("Keep an audit log of executed commands?")
        .default(false)
        .interact()?;
    if config.exec.audit.enabled {
        let destination: String = Input::new()
            .with_prompt("Audit destination (stdout or a file path)")
            .default("stdout".to_string())
            .interact_text()?;
        config.exec.audit.destination = destination;
    }

    let rendered = toml::to_string_pretty(&config).context("failed to serialize config")?;
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    if output.exists() {
        let overwrite = Confirm::new()
            .with_prompt(format!("{} exists, overwrite?", output.display()))
            .default(false)
            .interact()?;
        if !overwrite {
            println!("Aborted, nothing written.");
            return Ok(());
        }
    }
    std::fs::write(&output, rendered)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!("\nWrote {}", output.display());
    if config.llm.api_key.is_none() {
        println!("Remember to export SENSEI_GEMINI_API_KEY before running sensei.");
    }
    Ok(())
}
