// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tack - agent request orchestrator
//!
//! Entry point for the `tack` CLI.

use std::path::Path;

use clap::Parser;

use tack::cli::{Cli, Commands, SettingsCommands};
use tack::config::Settings;
use tack::error::Result;

#[path = "main/display.rs"]
mod display;
#[path = "main/replay.rs"]
mod replay;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    // `-v` turns on the orchestration targets; `RUST_LOG` still wins.
    if cli.verbose > 0 {
        let level = if cli.verbose > 1 { "trace" } else { "debug" };
        for target in ["tack.orchestrator", "tack.node", "tack.tools", "tack.auth", "tack.context"] {
            if let Ok(parsed) = format!("{}={}", target, level).parse() {
                env_filter = env_filter.add_directive(parsed);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let settings_path = cli.config.clone().unwrap_or_else(Settings::default_path);

    match cli.command {
        Commands::Replay(args) => {
            let settings = load_settings(&settings_path)?;
            let code = replay::run_replay(args, settings).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Settings(args) => run_settings_command(args.command, &settings_path)?,
    }

    Ok(())
}

fn load_settings(path: &Path) -> Result<Settings> {
    let mut settings = Settings::load_from(path)?;
    settings.apply_env_overrides()?;
    tracing::debug!(path = %path.display(), "Loaded settings");
    Ok(settings)
}

fn run_settings_command(command: SettingsCommands, path: &Path) -> Result<()> {
    match command {
        SettingsCommands::Show => {
            let settings = load_settings(path)?;
            settings.validate()?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        SettingsCommands::Path => {
            println!("{}", path.display());
        }
        SettingsCommands::Init { force } => {
            if path.exists() && !force {
                display::print_notice(&format!(
                    "Settings already exist at {} (use --force to overwrite)",
                    path.display()
                ))?;
                return Ok(());
            }
            if force && path.exists() {
                std::fs::remove_file(path)?;
            }
            Settings::default().save_to(path)?;
            display::print_notice(&format!("Wrote default settings to {}", path.display()))?;
        }
    }
    Ok(())
}
