//! Counters for events the engine drops on purpose, and tracing setup.
//!
//! Dropping is never an error; these counters only make the drops visible.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use turn_events::TurnId;

/// One occurrence of a silently resolved inconsistency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    StaleSnapshot { turn_id: TurnId },
    StaleActivity { turn_id: TurnId },
    UnknownTurn { turn_id: TurnId, update: &'static str },
    ContractViolation { turn_id: TurnId, reason: &'static str },
}

/// Receives every diagnostic occurrence, e.g. to feed a metrics backend.
pub trait DiagnosticsHook: Send + Sync {
    fn record(&self, event: &DiagnosticEvent);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticCounts {
    pub stale_snapshots: u64,
    pub stale_activities: u64,
    pub unknown_turn_updates: u64,
    pub contract_violations: u64,
}

#[derive(Default)]
pub struct Diagnostics {
    stale_snapshots: AtomicU64,
    stale_activities: AtomicU64,
    unknown_turn_updates: AtomicU64,
    contract_violations: AtomicU64,
    hook: Option<Arc<dyn DiagnosticsHook>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook(hook: Arc<dyn DiagnosticsHook>) -> Self {
        Self {
            hook: Some(hook),
            ..Self::default()
        }
    }

    pub fn record(&self, event: DiagnosticEvent) {
        let counter = match &event {
            DiagnosticEvent::StaleSnapshot { .. } => &self.stale_snapshots,
            DiagnosticEvent::StaleActivity { .. } => &self.stale_activities,
            DiagnosticEvent::UnknownTurn { .. } => &self.unknown_turn_updates,
            DiagnosticEvent::ContractViolation { .. } => &self.contract_violations,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if let Some(hook) = &self.hook {
            hook.record(&event);
        }
    }

    pub fn counts(&self) -> DiagnosticCounts {
        DiagnosticCounts {
            stale_snapshots: self.stale_snapshots.load(Ordering::Relaxed),
            stale_activities: self.stale_activities.load(Ordering::Relaxed),
            unknown_turn_updates: self.unknown_turn_updates.load(Ordering::Relaxed),
            contract_violations: self.contract_violations.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("counts", &self.counts())
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

/// Installs a fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call repeatedly; only the first call installs anything.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingHook {
        events: Mutex<Vec<DiagnosticEvent>>,
    }

    impl DiagnosticsHook for RecordingHook {
        fn record(&self, event: &DiagnosticEvent) {
            self.events
                .lock()
                .expect("hook mutex should not be poisoned")
                .push(event.clone());
        }
    }

    #[test]
    fn record_increments_matching_counter() {
        let diagnostics = Diagnostics::new();
        diagnostics.record(DiagnosticEvent::StaleSnapshot { turn_id: "a".into() });
        diagnostics.record(DiagnosticEvent::StaleSnapshot { turn_id: "b".into() });
        diagnostics.record(DiagnosticEvent::UnknownTurn {
            turn_id: "c".into(),
            update: "hide_loading",
        });

        assert_eq!(
            diagnostics.counts(),
            DiagnosticCounts {
                stale_snapshots: 2,
                stale_activities: 0,
                unknown_turn_updates: 1,
                contract_violations: 0,
            }
        );
    }

    #[test]
    fn hook_receives_every_event() {
        let hook = Arc::new(RecordingHook::default());
        let diagnostics = Diagnostics::with_hook(hook.clone());

        diagnostics.record(DiagnosticEvent::StaleActivity { turn_id: "a".into() });

        let events = hook.events.lock().expect("hook mutex should not be poisoned");
        assert_eq!(
            events.as_slice(),
            &[DiagnosticEvent::StaleActivity { turn_id: "a".into() }]
        );
    }

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
