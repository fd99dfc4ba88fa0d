//! Single source of truth for the rendered conversation.
//!
//! The current value is copy-on-write: readers hold an `Arc` snapshot that never
//! changes, and every applied transition publishes a new snapshot to watchers.

use std::sync::Arc;

use tokio::sync::watch;
use turn_events::TurnId;

use crate::state::{ConversationState, Turn, WelcomeContent};

/// Receiving end of the state-changed notification.
pub type StateReceiver = watch::Receiver<Arc<ConversationState>>;

#[derive(Debug)]
pub struct ConversationStore {
    current: Arc<ConversationState>,
    revision: u64,
    publisher: watch::Sender<Arc<ConversationState>>,
}

impl ConversationStore {
    pub fn new(initial: ConversationState) -> Self {
        let current = Arc::new(initial);
        let (publisher, _) = watch::channel(Arc::clone(&current));

        Self {
            current,
            revision: 0,
            publisher,
        }
    }

    pub fn snapshot(&self) -> Arc<ConversationState> {
        Arc::clone(&self.current)
    }

    /// Returns a receiver notified after every applied transition.
    pub fn subscribe(&self) -> StateReceiver {
        self.publisher.subscribe()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn start_chat(&mut self, turn: Turn) {
        let next = self.current.start_chat(turn);
        self.publish(next);
    }

    /// Applies `transform` to turn `turn_id`; returns false on a miss.
    pub fn replace_turn(&mut self, turn_id: &TurnId, transform: impl FnOnce(&mut Turn)) -> bool {
        match self.current.try_replace_turn(turn_id, transform) {
            Some(next) => {
                self.publish(next);
                true
            }
            None => false,
        }
    }

    pub fn to_welcome(&mut self, welcome: WelcomeContent) {
        let next = self.current.to_welcome(welcome);
        self.publish(next);
    }

    pub fn set_restoring(&mut self, restoring: bool) {
        if !matches!(*self.current, ConversationState::Chat { .. }) {
            return;
        }

        let next = self.current.set_restoring(restoring);
        self.publish(next);
    }

    fn publish(&mut self, next: ConversationState) {
        self.current = Arc::new(next);
        self.revision += 1;
        self.publisher.send_replace(Arc::clone(&self.current));
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(ConversationState::default())
    }
}
