// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Model-facing types for Tack
//!
//! History messages, the transport contract and a scripted transport.

pub mod message;
pub mod scripted;
pub mod transport;

pub use message::*;
pub use scripted::{ScriptStep, ScriptedTransport};
pub use transport::*;
