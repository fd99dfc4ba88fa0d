//! Turn lifecycle: begin turn, accept snapshots and activity, finalize.
//!
//! Content-bearing updates (stream snapshots, activity) are gated by the
//! generation tracker so a straggling event from an earlier turn never lands on
//! the turn that replaced it. Terminal markers and file references address a
//! turn by its own immutable id and are applied ungated.

use std::sync::Arc;

use tracing::{debug, info, warn};
use turn_events::{ActivityNotification, FileReference, StreamSnapshot, TurnEvent, TurnId};
use uuid::Uuid;

use crate::activity;
use crate::config::EngineConfig;
use crate::generation::{GenerationTracker, TurnTicket};
use crate::state::{ConversationState, Turn, WelcomeContent};
use crate::store::{ConversationStore, StateReceiver};
use crate::telemetry::{DiagnosticEvent, Diagnostics};

/// Produces the introductory data shown after every clear.
pub trait WelcomeSource: Send + Sync {
    fn load(&self) -> WelcomeContent;
}

impl<F> WelcomeSource for F
where
    F: Fn() -> WelcomeContent + Send + Sync,
{
    fn load(&self) -> WelcomeContent {
        self()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    TurnActive { turn_id: TurnId },
}

/// What happened to one incoming event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    /// The event's turn is no longer live; nothing changed.
    Stale,
    /// No turn with that id exists in the current state; nothing changed.
    UnknownTurn,
    /// Accepted but carried nothing to apply (e.g. empty reasoning text).
    Ignored,
}

pub struct TurnLifecycle {
    tracker: Arc<GenerationTracker>,
    store: ConversationStore,
    phase: Phase,
    welcome: Arc<dyn WelcomeSource>,
    diagnostics: Arc<Diagnostics>,
    strict_contracts: bool,
}

impl TurnLifecycle {
    pub fn new(config: &EngineConfig) -> Self {
        let welcome = config.welcome.clone();
        let welcome_source: Arc<dyn WelcomeSource> = Arc::new(move || welcome.clone());

        Self {
            tracker: Arc::new(GenerationTracker::new()),
            store: ConversationStore::new(ConversationState::Welcome(welcome_source.load())),
            phase: Phase::Idle,
            welcome: welcome_source,
            diagnostics: Arc::new(Diagnostics::new()),
            strict_contracts: config.strict_contracts,
        }
    }

    /// Replaces the welcome loader; the current state is reloaded if in `Welcome`.
    pub fn with_welcome_source(mut self, welcome: Arc<dyn WelcomeSource>) -> Self {
        self.welcome = welcome;
        self.refresh_welcome();
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn tracker(&self) -> &Arc<GenerationTracker> {
        &self.tracker
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn snapshot(&self) -> Arc<ConversationState> {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> StateReceiver {
        self.store.subscribe()
    }

    /// Starts a new turn and makes it the only live one.
    ///
    /// Returns `None` when `turn_id` was already used in this conversation
    /// (panics instead when contracts are strict).
    pub fn submit_prompt(
        &mut self,
        turn_id: TurnId,
        prompt: impl Into<String>,
        model_label: impl Into<String>,
    ) -> Option<TurnTicket> {
        if self.store.snapshot().contains_turn(&turn_id) {
            self.contract_violation(&turn_id, "turn id already submitted");
            return None;
        }

        // Deactivate before the new turn exists: at no point may two turns be live.
        self.tracker.deactivate();
        self.store
            .start_chat(Turn::pending(turn_id.clone(), prompt, model_label));
        let generation = self.tracker.begin_turn(turn_id.clone());
        self.phase = Phase::TurnActive {
            turn_id: turn_id.clone(),
        };
        info!(turn_id = %turn_id, generation, "turn started");

        Some(TurnTicket {
            turn_id,
            generation,
        })
    }

    /// Replaces the live turn's answer with a cumulative snapshot.
    pub fn on_stream_snapshot(&mut self, snapshot: StreamSnapshot) -> EventOutcome {
        if !self.tracker.is_live(&snapshot.turn_id) {
            debug!(turn_id = %snapshot.turn_id, "dropping stale stream snapshot");
            self.diagnostics.record(DiagnosticEvent::StaleSnapshot {
                turn_id: snapshot.turn_id,
            });
            return EventOutcome::Stale;
        }

        let StreamSnapshot {
            turn_id,
            text,
            usage,
            elapsed_ms,
            model_label,
        } = snapshot;
        let applied = self.store.replace_turn(&turn_id, |turn| {
            turn.answer_text = text;
            turn.execution_time_ms = elapsed_ms;
            if let Some(usage) = usage {
                turn.token_usage = usage;
            }
            if let Some(label) = model_label.filter(|label| !label.trim().is_empty()) {
                turn.model_label = label;
            }
        });

        self.outcome_for(applied, &turn_id, "stream_snapshot")
    }

    /// Appends a routed activity entry to the live turn.
    pub fn on_activity(&mut self, notification: &ActivityNotification) -> EventOutcome {
        if !self.tracker.is_live(&notification.turn_id) {
            debug!(turn_id = %notification.turn_id, "dropping stale activity");
            self.diagnostics.record(DiagnosticEvent::StaleActivity {
                turn_id: notification.turn_id.clone(),
            });
            return EventOutcome::Stale;
        }

        let Some(entry) = activity::route(notification, &self.tracker) else {
            return EventOutcome::Ignored;
        };

        let applied = self
            .store
            .replace_turn(&notification.turn_id, |turn| turn.push_activity(entry));
        self.outcome_for(applied, &notification.turn_id, "activity")
    }

    pub fn on_hide_loading(&mut self, turn_id: &TurnId) -> EventOutcome {
        let applied = self
            .store
            .replace_turn(turn_id, |turn| turn.is_loading_visible = false);
        self.outcome_for(applied, turn_id, "hide_loading")
    }

    pub fn on_activity_finalized(&mut self, turn_id: &TurnId) -> EventOutcome {
        let applied = self
            .store
            .replace_turn(turn_id, |turn| turn.activity_finalized = true);
        self.outcome_for(applied, turn_id, "activity_finalized")
    }

    pub fn on_file_references(
        &mut self,
        turn_id: &TurnId,
        files: Vec<FileReference>,
    ) -> EventOutcome {
        let applied = self
            .store
            .replace_turn(turn_id, |turn| turn.extend_file_references(files));
        self.outcome_for(applied, turn_id, "file_references")
    }

    /// Dispatches one collaborator event to its handler.
    pub fn apply_event(&mut self, event: TurnEvent) -> EventOutcome {
        match event {
            TurnEvent::StreamSnapshot(snapshot) => self.on_stream_snapshot(snapshot),
            TurnEvent::Activity(notification) => self.on_activity(&notification),
            TurnEvent::HideLoading { turn_id } => self.on_hide_loading(&turn_id),
            TurnEvent::ActivityFinalized { turn_id } => self.on_activity_finalized(&turn_id),
            TurnEvent::FileReferences { turn_id, files } => {
                self.on_file_references(&turn_id, files)
            }
        }
    }

    /// Stops accepting content for `turn_id` when nothing will ever feed it.
    ///
    /// The turn stays in the conversation; no-op unless it is the live turn.
    pub fn abandon_turn(&mut self, turn_id: &TurnId) {
        if !matches!(&self.phase, Phase::TurnActive { turn_id: active } if active == turn_id) {
            return;
        }

        self.tracker.deactivate();
        self.phase = Phase::Idle;
        warn!(turn_id = %turn_id, "turn abandoned with no worker to feed it");
    }

    /// Drops every turn and returns to `Welcome` with freshly loaded data.
    pub fn clear(&mut self) {
        self.tracker.deactivate();
        self.store.to_welcome(self.welcome.load());
        self.phase = Phase::Idle;
        info!("conversation cleared");
    }

    pub fn set_restoring(&mut self, restoring: bool) {
        self.store.set_restoring(restoring);
    }

    /// Appends a fully formed turn, e.g. when replaying saved history.
    ///
    /// Bypasses the generation tracker; returns false for a reused id.
    pub fn append_turn(&mut self, turn: Turn) -> bool {
        if self.store.snapshot().contains_turn(turn.id()) {
            self.contract_violation(turn.id(), "appended turn id already present");
            return false;
        }

        self.store.start_chat(turn);
        true
    }

    /// Appends a system-injected turn with an empty prompt; returns its id.
    pub fn push_system_message(&mut self, markdown: impl Into<String>) -> TurnId {
        let turn_id = TurnId::new(format!("system_{}", Uuid::new_v4()));
        self.store
            .start_chat(Turn::new(turn_id.clone(), "").with_answer(markdown));
        turn_id
    }

    /// Reloads introductory data while still in `Welcome`.
    pub fn refresh_welcome(&mut self) {
        if self.store.snapshot().is_welcome() {
            self.store.to_welcome(self.welcome.load());
        }
    }

    fn outcome_for(&self, applied: bool, turn_id: &TurnId, update: &'static str) -> EventOutcome {
        if applied {
            return EventOutcome::Applied;
        }

        debug!(turn_id = %turn_id, update, "no turn to update");
        self.diagnostics.record(DiagnosticEvent::UnknownTurn {
            turn_id: turn_id.clone(),
            update,
        });
        EventOutcome::UnknownTurn
    }

    fn contract_violation(&self, turn_id: &TurnId, reason: &'static str) {
        if self.strict_contracts {
            panic!("turn lifecycle contract violated for turn {turn_id}: {reason}");
        }

        warn!(turn_id = %turn_id, reason, "ignoring turn lifecycle contract violation");
        self.diagnostics.record(DiagnosticEvent::ContractViolation {
            turn_id: turn_id.clone(),
            reason,
        });
    }
}

impl std::fmt::Debug for TurnLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnLifecycle")
            .field("tracker", &self.tracker)
            .field("store", &self.store)
            .field("phase", &self.phase)
            .field("diagnostics", &self.diagnostics)
            .field("strict_contracts", &self.strict_contracts)
            .finish_non_exhaustive()
    }
}
