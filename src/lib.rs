// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tack - request-processing core of an AI coding agent.
//!
//! Given a user instruction, Tack drives a multi-turn loop against a model
//! transport, dispatches the tool calls the model asks for, and recovers from
//! model misbehaviour without crashing.
//!
//! Architecture highlights:
//! - `agent`: request orchestrator, node processing, state machine, guidance
//! - `tools`: call classification, retrying executor, fallback parsing,
//!   authorization gate
//! - `llm`: history messages and the model transport contract
//! - `context`: compaction and sanitization hooks run at request start
//! - `config`: settings file, environment overrides, validation
//! - `cli`: argument definitions for the `tack` binary

pub mod agent;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod tools;

pub use error::{Result, TackError};
