use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use tokio::sync::Notify;
use tracing::{debug, warn};
use turn_events::{CancelSignal, TurnEvent, TurnEventSource, TurnId, TurnRequest};
use uuid::Uuid;

use crate::commands::{parse_slash_command, unknown_command_message, SlashCommand, HELP_TEXT};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::generation::{lock_unpoisoned, GenerationTracker, TurnTicket};
use crate::lifecycle::{EventOutcome, Phase, TurnLifecycle};
use crate::state::ConversationState;
use crate::store::StateReceiver;
use crate::telemetry::{DiagnosticEvent, Diagnostics};

/// What a line of user input turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputOutcome {
    Submitted(TurnId),
    Cleared,
    SystemMessage(TurnId),
    /// Blank input; nothing happened.
    Ignored,
}

struct ActiveWorker {
    ticket: TurnTicket,
    cancel: CancelSignal,
    join_handle: Option<JoinHandle<()>>,
}

/// Owns one conversation and pumps source events into it in arrival order.
///
/// Workers only enqueue. Events are applied by whoever drains the queue: either
/// [`TurnRuntime::flush_pending_events`] or the async [`TurnRuntime::drive`] loop.
pub struct TurnRuntime {
    lifecycle: Mutex<TurnLifecycle>,
    tracker: Arc<GenerationTracker>,
    diagnostics: Arc<Diagnostics>,
    pending_events: Mutex<VecDeque<TurnEvent>>,
    wakeup: Notify,
    active_worker: Mutex<Option<ActiveWorker>>,
    retired_workers: Mutex<Vec<JoinHandle<()>>>,
    source: Arc<dyn TurnEventSource>,
    shutdown: AtomicBool,
}

impl TurnRuntime {
    pub fn new(config: &EngineConfig, source: Arc<dyn TurnEventSource>) -> Arc<Self> {
        Self::with_lifecycle(TurnLifecycle::new(config), source)
    }

    /// Wraps an already configured lifecycle (custom welcome source, diagnostics hook).
    pub fn with_lifecycle(lifecycle: TurnLifecycle, source: Arc<dyn TurnEventSource>) -> Arc<Self> {
        Arc::new(Self {
            tracker: Arc::clone(lifecycle.tracker()),
            diagnostics: Arc::clone(lifecycle.diagnostics()),
            lifecycle: Mutex::new(lifecycle),
            pending_events: Mutex::new(VecDeque::new()),
            wakeup: Notify::new(),
            active_worker: Mutex::new(None),
            retired_workers: Mutex::new(Vec::new()),
            source,
            shutdown: AtomicBool::new(false),
        })
    }

    /// Starts a turn for `prompt`, superseding whatever turn was live.
    pub fn submit_prompt(self: &Arc<Self>, prompt: impl Into<String>) -> Result<TurnId, EngineError> {
        let prompt = prompt.into();
        let turn_id = TurnId::new(Uuid::new_v4().to_string());
        let model_label = self.source.profile().display_label();

        let mut active_worker = self.lock_active_worker();
        let ticket = self
            .lock_lifecycle()
            .submit_prompt(turn_id.clone(), prompt.clone(), model_label)
            .ok_or_else(|| EngineError::TurnRejected {
                turn_id: turn_id.to_string(),
            })?;

        if let Some(previous) = active_worker.take() {
            self.retire(previous);
        }

        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        let request = TurnRequest {
            turn_id: turn_id.clone(),
            prompt,
        };
        let join_handle = match self.spawn_worker(request, ticket.clone(), Arc::clone(&cancel)) {
            Ok(join_handle) => join_handle,
            Err(error) => {
                drop(active_worker);
                warn!(turn_id = %turn_id, %error, "event worker could not start");
                self.lock_lifecycle().abandon_turn(&turn_id);
                self.enqueue_terminal_markers(&turn_id);
                return Err(error);
            }
        };

        *active_worker = Some(ActiveWorker {
            ticket,
            cancel,
            join_handle: Some(join_handle),
        });

        Ok(turn_id)
    }

    /// Routes one line of input: slash commands act locally, anything else is a prompt.
    pub fn submit_input(self: &Arc<Self>, text: &str) -> Result<InputOutcome, EngineError> {
        if text.trim().is_empty() {
            return Ok(InputOutcome::Ignored);
        }

        match parse_slash_command(text) {
            Some(SlashCommand::Clear) => {
                self.clear();
                Ok(InputOutcome::Cleared)
            }
            Some(SlashCommand::Help) => Ok(InputOutcome::SystemMessage(
                self.lock_lifecycle().push_system_message(HELP_TEXT),
            )),
            Some(SlashCommand::Unknown(command)) => Ok(InputOutcome::SystemMessage(
                self.lock_lifecycle()
                    .push_system_message(unknown_command_message(&command)),
            )),
            None => self.submit_prompt(text.trim()).map(InputOutcome::Submitted),
        }
    }

    /// Cancels the running worker and resets the conversation to `Welcome`.
    pub fn clear(&self) {
        let mut active_worker = self.lock_active_worker();
        if let Some(previous) = active_worker.take() {
            self.retire(previous);
        }

        self.lock_lifecycle().clear();
    }

    /// Drains queued events and applies them in arrival order.
    ///
    /// Use this in environments that do not run [`TurnRuntime::drive`], such as
    /// headless tests, to guarantee queued events are applied.
    pub fn flush_pending_events(&self) -> usize {
        let mut lifecycle = self.lock_lifecycle();
        let mut drained = 0usize;

        loop {
            let event = {
                let mut pending_events = lock_unpoisoned(&self.pending_events);
                pending_events.pop_front()
            };

            match event {
                Some(event) => {
                    let turn_id = event.turn_id().clone();
                    let outcome = lifecycle.apply_event(event);
                    if outcome != EventOutcome::Applied {
                        debug!(turn_id = %turn_id, ?outcome, "queued event not applied");
                    }
                    drained += 1;
                }
                None => break,
            }
        }

        drained
    }

    /// Applies events as workers enqueue them until [`TurnRuntime::shutdown`].
    pub async fn drive(&self) {
        loop {
            self.flush_pending_events();
            if self.shutdown.load(Ordering::SeqCst) {
                self.flush_pending_events();
                return;
            }

            self.wakeup.notified().await;
        }
    }

    /// Stops [`TurnRuntime::drive`] after a final drain and cancels the live worker.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(active) = self.lock_active_worker().as_ref() {
            active.cancel.store(true, Ordering::SeqCst);
        }
        self.wakeup.notify_one();
    }

    /// Blocks until every worker spawned so far has returned.
    pub fn join_workers(&self) {
        let mut handles = std::mem::take(&mut *lock_unpoisoned(&self.retired_workers));
        if let Some(active) = self.lock_active_worker().as_mut() {
            handles.extend(active.join_handle.take());
        }

        for handle in handles {
            if handle.join().is_err() {
                warn!("event worker thread panicked outside the source");
            }
        }
    }

    pub fn snapshot(&self) -> Arc<ConversationState> {
        self.lock_lifecycle().snapshot()
    }

    pub fn subscribe(&self) -> StateReceiver {
        self.lock_lifecycle().subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.lock_lifecycle().phase().clone()
    }

    pub fn tracker(&self) -> &Arc<GenerationTracker> {
        &self.tracker
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// Runs `f` with exclusive access to the lifecycle, e.g. to replay history.
    pub fn with_lifecycle_mut<R>(&self, f: impl FnOnce(&mut TurnLifecycle) -> R) -> R {
        f(&mut self.lock_lifecycle())
    }

    fn spawn_worker(
        self: &Arc<Self>,
        request: TurnRequest,
        ticket: TurnTicket,
        cancel: CancelSignal,
    ) -> Result<JoinHandle<()>, EngineError> {
        let turn_id = request.turn_id.to_string();
        let runtime = Arc::clone(self);
        thread::Builder::new()
            .name(format!("conversation-turn-{turn_id}"))
            .spawn(move || runtime.run_worker(request, ticket, cancel))
            .map_err(|source| EngineError::WorkerSpawn { turn_id, source })
    }

    fn run_worker(self: Arc<Self>, request: TurnRequest, ticket: TurnTicket, cancel: CancelSignal) {
        let turn_id = request.turn_id.clone();
        let mut saw_hide_loading = false;
        let mut saw_activity_finalized = false;
        let source = Arc::clone(&self.source);

        let mut emit = |event: TurnEvent| {
            match &event {
                TurnEvent::HideLoading { .. } => saw_hide_loading = true,
                TurnEvent::ActivityFinalized { .. } => saw_activity_finalized = true,
                _ => {}
            }

            self.enqueue_event(&ticket, event);
        };
        let run_outcome = catch_unwind(AssertUnwindSafe(|| source.run(request, cancel, &mut emit)));

        match run_outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(turn_id = %turn_id, %error, "turn event source failed"),
            Err(_) => warn!(turn_id = %turn_id, "turn event source panicked"),
        }

        if !saw_activity_finalized {
            debug!(turn_id = %turn_id, "source ended without finalizing activity");
            self.enqueue(TurnEvent::ActivityFinalized {
                turn_id: turn_id.clone(),
            });
        }
        if !saw_hide_loading {
            debug!(turn_id = %turn_id, "source ended without hiding loading");
            self.enqueue(TurnEvent::HideLoading { turn_id });
        }
    }

    /// Drops content events of a superseded worker before they reach the queue.
    fn enqueue_event(&self, ticket: &TurnTicket, event: TurnEvent) {
        if !self.tracker.is_current(ticket) {
            let dropped = match &event {
                TurnEvent::StreamSnapshot(snapshot) => Some(DiagnosticEvent::StaleSnapshot {
                    turn_id: snapshot.turn_id.clone(),
                }),
                TurnEvent::Activity(notification) => Some(DiagnosticEvent::StaleActivity {
                    turn_id: notification.turn_id.clone(),
                }),
                _ => None,
            };

            if let Some(dropped) = dropped {
                debug!(turn_id = %ticket.turn_id, "dropping event from superseded worker");
                self.diagnostics.record(dropped);
                return;
            }
        }

        self.enqueue(event);
    }

    fn enqueue(&self, event: TurnEvent) {
        lock_unpoisoned(&self.pending_events).push_back(event);
        self.wakeup.notify_one();
    }

    fn enqueue_terminal_markers(&self, turn_id: &TurnId) {
        self.enqueue(TurnEvent::ActivityFinalized {
            turn_id: turn_id.clone(),
        });
        self.enqueue(TurnEvent::HideLoading {
            turn_id: turn_id.clone(),
        });
    }

    fn retire(&self, mut worker: ActiveWorker) {
        worker.cancel.store(true, Ordering::SeqCst);
        debug!(turn_id = %worker.ticket.turn_id, "cancelling superseded worker");

        let mut retired = lock_unpoisoned(&self.retired_workers);
        retired.retain(|handle| !handle.is_finished());
        retired.extend(worker.join_handle.take());
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, TurnLifecycle> {
        lock_unpoisoned(&self.lifecycle)
    }

    fn lock_active_worker(&self) -> MutexGuard<'_, Option<ActiveWorker>> {
        lock_unpoisoned(&self.active_worker)
    }
}
