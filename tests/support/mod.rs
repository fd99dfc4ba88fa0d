#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use conversation_engine::{
    CancelSignal, EngineConfig, SourceProfile, StreamSnapshot, Turn, TurnEvent, TurnEventSource,
    TurnId, TurnLifecycle, TurnRequest,
};

pub fn lenient_lifecycle() -> TurnLifecycle {
    TurnLifecycle::new(&EngineConfig::default().with_strict_contracts(false))
}

pub fn turn_of(lifecycle: &TurnLifecycle, turn_id: &str) -> Turn {
    let snapshot = lifecycle.snapshot();
    let Some(turn) = snapshot.turn(&TurnId::from(turn_id)) else {
        panic!("turn {turn_id} should exist");
    };
    turn.clone()
}

pub fn test_profile() -> SourceProfile {
    SourceProfile {
        provider_id: "test".to_string(),
        model_id: "test-model".to_string(),
    }
}

/// Emits one snapshot, then blocks until cancelled or released.
///
/// Records the ids of the turns it was asked to run.
#[derive(Default)]
pub struct BlockingSource {
    released: AtomicBool,
    started: Mutex<Vec<TurnId>>,
}

impl BlockingSource {
    pub fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }

    pub fn started(&self) -> Vec<TurnId> {
        lock_unpoisoned(&self.started).clone()
    }

    pub fn wait_until_started(&self, count: usize) {
        for _ in 0..2_000 {
            if lock_unpoisoned(&self.started).len() >= count {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("source never started {count} turn(s)");
    }
}

impl TurnEventSource for BlockingSource {
    fn profile(&self) -> SourceProfile {
        test_profile()
    }

    fn run(
        &self,
        req: TurnRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(TurnEvent),
    ) -> Result<(), String> {
        let turn_id = req.turn_id;
        emit(TurnEvent::StreamSnapshot(StreamSnapshot::new(
            turn_id.clone(),
            format!("working on {}", req.prompt),
        )));
        lock_unpoisoned(&self.started).push(turn_id.clone());

        while !cancel.load(Ordering::SeqCst) && !self.released.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(2));
        }

        // Late content after cancellation, as a misbehaving source would send.
        emit(TurnEvent::StreamSnapshot(StreamSnapshot::new(
            turn_id.clone(),
            "late content",
        )));
        emit(TurnEvent::HideLoading { turn_id });
        Ok(())
    }
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
