// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::io::{self, Write};

use crossterm::{
    style::{Color, ResetColor, SetForegroundColor},
    ExecutableCommand,
};

use tack::agent::{OrchestratorEvent, RequestOutcome};
use tack::error::{RequestFailure, Result};

const RESULT_PREVIEW_CHARS: usize = 80;

fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > RESULT_PREVIEW_CHARS {
        let head: String = line.chars().take(RESULT_PREVIEW_CHARS - 3).collect();
        format!("{}...", head)
    } else {
        line.to_string()
    }
}

/// Print one orchestrator event.
pub(super) fn print_event(event: &OrchestratorEvent) -> Result<()> {
    let mut stdout = io::stdout();

    match event {
        OrchestratorEvent::ToolStart { tool_name, description, .. } => {
            stdout.execute(SetForegroundColor(Color::DarkGrey))?;
            print!("  ╭─ ");
            stdout.execute(SetForegroundColor(Color::Magenta))?;
            print!("{}", tool_name);
            stdout.execute(SetForegroundColor(Color::DarkGrey))?;
            println!(" {}", description);
        }
        OrchestratorEvent::ToolResult {
            output,
            is_error,
            duration_ms,
            ..
        } => {
            stdout.execute(SetForegroundColor(Color::DarkGrey))?;
            print!("  ╰─ ");
            if *is_error {
                stdout.execute(SetForegroundColor(Color::Red))?;
                print!("✗ ");
            } else {
                stdout.execute(SetForegroundColor(Color::Green))?;
                print!("✓ ");
            }
            stdout.execute(ResetColor)?;
            print!("{}", preview(output));
            stdout.execute(SetForegroundColor(Color::DarkGrey))?;
            println!(" ({}ms)", duration_ms);
        }
        OrchestratorEvent::StreamToken { token } => {
            stdout.execute(ResetColor)?;
            println!("{}", token);
        }
        OrchestratorEvent::ToolRetry { .. }
        | OrchestratorEvent::GuidanceInjected { .. }
        | OrchestratorEvent::CompletionRejected { .. }
        | OrchestratorEvent::FallbackParsed { .. }
        | OrchestratorEvent::IterationExtended { .. } => {
            stdout.execute(SetForegroundColor(Color::Yellow))?;
            println!("  ! {}", event.status_text());
        }
        OrchestratorEvent::ParallelBatch { .. } => {
            stdout.execute(SetForegroundColor(Color::Cyan))?;
            println!("  ⇉ {}", event.status_text());
        }
        // Too chatty for the terminal; visible with -vv
        OrchestratorEvent::StateChanged { .. } => {}
    }

    stdout.execute(ResetColor)?;
    stdout.flush()?;
    Ok(())
}

pub(super) fn print_outcome(outcome: &RequestOutcome) -> Result<()> {
    let mut stdout = io::stdout();
    match outcome {
        RequestOutcome::Completed { iterations, .. } => {
            stdout.execute(SetForegroundColor(Color::Green))?;
            println!("\nCompleted after {} iteration(s)", iterations);
        }
        RequestOutcome::AwaitingGuidance { iterations } => {
            stdout.execute(SetForegroundColor(Color::Yellow))?;
            println!(
                "\nPaused after {} iterations. Send a follow-up instruction to continue.",
                iterations
            );
        }
    }
    stdout.execute(ResetColor)?;
    Ok(())
}

pub(super) fn print_failure(failure: &RequestFailure) -> Result<()> {
    let mut stderr = io::stderr();
    stderr.execute(SetForegroundColor(Color::Red))?;
    eprintln!("\n{}", failure);
    stderr.execute(ResetColor)?;
    Ok(())
}

pub(super) fn print_notice(message: &str) -> Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Cyan))?;
    println!("{}", message);
    stdout.execute(ResetColor)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_keeps_first_line() {
        assert_eq!(preview("one\ntwo"), "one");
        let long = "z".repeat(100);
        assert_eq!(preview(&long), format!("{}...", "z".repeat(77)));
    }
}
