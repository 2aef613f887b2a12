// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Tack - agent request orchestrator
#[derive(Parser, Debug)]
#[command(name = "tack")]
#[command(version, about = "Agent request orchestrator")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file path (defaults to ~/.tack/settings.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a recorded model script against echo tools
    Replay(ReplayArgs),

    /// Inspect or create the settings file
    #[command(alias = "config")]
    Settings(SettingsArgs),
}

/// Arguments for the replay command
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// JSON file with the model script
    pub script: PathBuf,

    /// Instruction that opens the request
    pub instruction: String,

    /// Model name used for profile and pricing lookup
    #[arg(short, long, default_value = "scripted")]
    pub model: String,

    /// Skip every confirmation prompt
    #[arg(long)]
    pub yolo: bool,

    /// Override the global request timeout in seconds (0 disables)
    #[arg(long)]
    pub timeout: Option<f64>,
}

/// Arguments for the settings command
#[derive(Args, Debug)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: SettingsCommands,
}

/// Settings subcommands
#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    /// Print the effective settings as JSON
    Show,

    /// Print the settings file path
    Path,

    /// Write default settings if no file exists
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
