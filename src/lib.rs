//! Turn-based conversation engine for streaming AI answers.
//!
//! A conversation is either `Welcome` (no turns) or `Chat` (an ordered list of
//! turns). Each turn starts when a prompt is submitted and is filled by events
//! from an upstream [`TurnEventSource`]: cumulative stream snapshots, activity
//! notifications, file references and two terminal markers.
//!
//! Invariant: at most one turn is live. Content-bearing events (snapshots,
//! activity) for any other turn are dropped; terminal markers apply to whichever
//! turn they name so a superseded turn's loading indicator still clears.
//!
//! # Public API Overview
//! - [`TurnLifecycle`] applies events synchronously and owns the [`GenerationTracker`]
//!   and [`ConversationStore`].
//! - [`TurnRuntime`] spawns one worker per turn and applies queued events serially,
//!   either on [`TurnRuntime::flush_pending_events`] or from the async
//!   [`TurnRuntime::drive`] loop.
//! - Readers pull immutable `Arc<ConversationState>` snapshots or await changes on
//!   a [`StateReceiver`].
//!
//! # Configuration
//!
//! [`EngineConfig::from_env`] reads `CONVERSATION_ENGINE_CONFIG_PATH` when set. It
//! must name a readable UTF-8 JSON file with this shape:
//!
//! ```json
//! {
//!   "intro": "Ask a question about your project.",
//!   "custom_prompts": [{ "name": "explain", "prompt": "Explain this code" }],
//!   "strict_contracts": false
//! }
//! ```
//!
//! Every field is optional; unknown JSON fields are rejected. With
//! `strict_contracts` on (the debug-build default), reusing a turn id panics.
//!
//! # Logging
//!
//! The crate emits `tracing` events and never installs a subscriber itself; call
//! [`init_tracing`] from a binary or test to print them.

pub mod activity;
pub mod commands;
pub mod config;
pub mod error;
pub mod generation;
pub mod lifecycle;
pub mod runtime;
pub mod state;
pub mod store;
pub mod telemetry;

pub use crate::activity::{classify, route, ActivityEntry};
pub use crate::commands::{parse_slash_command, SlashCommand};
pub use crate::config::{EngineConfig, CONFIG_PATH_ENV_VAR};
pub use crate::error::EngineError;
pub use crate::generation::{Generation, GenerationTracker, TurnTicket};
pub use crate::lifecycle::{EventOutcome, Phase, TurnLifecycle, WelcomeSource};
pub use crate::runtime::{InputOutcome, TurnRuntime};
pub use crate::state::{ConversationState, CustomPrompt, Turn, WelcomeContent};
pub use crate::store::{ConversationStore, StateReceiver};
pub use crate::telemetry::{
    init_tracing, DiagnosticCounts, DiagnosticEvent, Diagnostics, DiagnosticsHook,
};

/// Event contract shared with upstream sources.
pub use turn_events::{
    ActivityNotification, ActivitySource, AgentStep, CancelSignal, FileReference, SourceProfile,
    StreamSnapshot, TokenUsage, TurnEvent, TurnEventSource, TurnId, TurnRequest,
};
