//! `todoclaw doctor`: diagnose configuration and the tool process.

use std::path::Path;
use todoclaw_channel::{ProcessChannelOpener, ToolCommand};
use todoclaw_config::AppConfig;
use todoclaw_core::error::ProviderError;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("TodoClaw Doctor");
    println!("===============\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  [warn] No config file, using defaults (run `todoclaw onboard`)");
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  [ok]   Configuration valid");
            config
        }
        Err(e) => {
            println!("  [fail] Configuration invalid: {e}");
            println!("\n  1 issue found.");
            return Ok(());
        }
    };

    if config.has_api_key() || config.providers.values().any(|p| p.api_key.is_some()) {
        println!(
            "  [ok]   API key configured for {} ({})",
            config.default_provider, config.default_model
        );
        let reachable = match todoclaw_providers::default_from_config(&config) {
            Ok(provider) => provider.health_check().await,
            Err(e) => Err(e),
        };
        let (ok, line) = provider_status(&config.default_provider, reachable);
        println!("{line}");
        if !ok {
            issues += 1;
        }
    } else {
        println!("  [fail] No API key: set OPENAI_API_KEY or api_key in config.toml");
        issues += 1;
    }

    println!("  [ok]   Todo service: {}", config.upstream.base_url);

    let opener = ProcessChannelOpener::from_config(&config.tool_process);
    match locate(opener.command()) {
        Some(path) => println!("  [ok]   Tool process: {}", path.display()),
        None => {
            println!(
                "  [fail] Tool process not found: {}",
                opener.command().program.display()
            );
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

/// One report line for the provider health check, and whether it passed.
fn provider_status(name: &str, outcome: Result<bool, ProviderError>) -> (bool, String) {
    match outcome {
        Ok(true) => (true, format!("  [ok]   Provider {name} reachable")),
        Ok(false) => (false, format!("  [fail] Provider {name} rejected the request (check the API key)")),
        Err(e) => (false, format!("  [fail] Provider {name} unreachable: {e}")),
    }
}

/// Where the tool program would be launched from, if it exists.
fn locate(command: &ToolCommand) -> Option<std::path::PathBuf> {
    let program = command.program.as_path();
    if program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(with_exe_suffix(program)))
        .find(|candidate| candidate.is_file())
}

fn with_exe_suffix(program: &Path) -> std::path::PathBuf {
    let suffix = std::env::consts::EXE_SUFFIX;
    if suffix.is_empty() || program.extension().is_some() {
        program.to_path_buf()
    } else {
        program.with_extension(&suffix[1..])
    }
}
