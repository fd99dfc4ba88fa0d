//! Immutable conversation model and its pure transitions.
//!
//! Every transition returns a new `ConversationState`; turns are shared through
//! `Arc` so a transition only copies the turn it rewrites.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use turn_events::{FileReference, TokenUsage, TurnId};

use crate::activity::ActivityEntry;

/// A saved prompt offered on the welcome screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomPrompt {
    pub name: String,
    pub prompt: String,
}

/// Static introductory data shown before the first turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WelcomeContent {
    pub intro: String,
    pub custom_prompts: Vec<CustomPrompt>,
}

/// One user prompt plus its evolving answer, activity log and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    id: TurnId,
    pub user_prompt: String,
    pub answer_text: String,
    pub model_label: String,
    pub execution_time_ms: u64,
    pub token_usage: TokenUsage,
    pub is_loading_visible: bool,
    activity_entries: Vec<ActivityEntry>,
    pub activity_section_visible: bool,
    pub activity_finalized: bool,
    file_references: Vec<FileReference>,
}

impl Turn {
    pub fn new(id: impl Into<TurnId>, user_prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_prompt: user_prompt.into(),
            answer_text: String::new(),
            model_label: String::new(),
            execution_time_ms: 0,
            token_usage: TokenUsage::default(),
            is_loading_visible: false,
            activity_entries: Vec::new(),
            activity_section_visible: true,
            activity_finalized: false,
            file_references: Vec::new(),
        }
    }

    /// A freshly submitted turn: prompt shown, loading indicator on.
    pub fn pending(
        id: impl Into<TurnId>,
        user_prompt: impl Into<String>,
        model_label: impl Into<String>,
    ) -> Self {
        Self {
            model_label: model_label.into(),
            is_loading_visible: true,
            ..Self::new(id, user_prompt)
        }
    }

    pub fn with_answer(mut self, answer_text: impl Into<String>) -> Self {
        self.answer_text = answer_text.into();
        self
    }

    pub fn with_model_label(mut self, model_label: impl Into<String>) -> Self {
        self.model_label = model_label.into();
        self
    }

    pub fn with_usage(mut self, token_usage: TokenUsage, execution_time_ms: u64) -> Self {
        self.token_usage = token_usage;
        self.execution_time_ms = execution_time_ms;
        self
    }

    pub fn with_activity(mut self, entries: impl IntoIterator<Item = ActivityEntry>) -> Self {
        self.activity_entries.extend(entries);
        self
    }

    pub fn with_file_references(mut self, files: impl IntoIterator<Item = FileReference>) -> Self {
        self.file_references.extend(files);
        self
    }

    pub fn id(&self) -> &TurnId {
        &self.id
    }

    pub fn activity_entries(&self) -> &[ActivityEntry] {
        &self.activity_entries
    }

    pub fn file_references(&self) -> &[FileReference] {
        &self.file_references
    }

    /// Appends one entry; entries are never rewritten or removed.
    pub fn push_activity(&mut self, entry: ActivityEntry) {
        self.activity_entries.push(entry);
    }

    /// Appends references as-is; the source collaborator already deduplicates.
    pub fn extend_file_references(&mut self, files: impl IntoIterator<Item = FileReference>) {
        self.file_references.extend(files);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversationState {
    Welcome(WelcomeContent),
    Chat {
        turns: Vec<Arc<Turn>>,
        is_restoring: bool,
    },
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::Welcome(WelcomeContent::default())
    }
}

impl ConversationState {
    /// Appends `turn`, leaving `Welcome` for `Chat` when needed.
    pub fn start_chat(&self, turn: Turn) -> Self {
        match self {
            Self::Welcome(_) => Self::Chat {
                turns: vec![Arc::new(turn)],
                is_restoring: false,
            },
            Self::Chat {
                turns,
                is_restoring,
            } => {
                let mut turns = turns.clone();
                turns.push(Arc::new(turn));
                Self::Chat {
                    turns,
                    is_restoring: *is_restoring,
                }
            }
        }
    }

    /// Replaces the turn `turn_id` with `transform(turn)`.
    ///
    /// Returns the state unchanged outside `Chat` or when the id is unknown.
    pub fn replace_turn(&self, turn_id: &TurnId, transform: impl FnOnce(&mut Turn)) -> Self {
        self.try_replace_turn(turn_id, transform)
            .unwrap_or_else(|| self.clone())
    }

    /// Like [`ConversationState::replace_turn`] but reports a miss as `None`.
    pub fn try_replace_turn(
        &self,
        turn_id: &TurnId,
        transform: impl FnOnce(&mut Turn),
    ) -> Option<Self> {
        let Self::Chat {
            turns,
            is_restoring,
        } = self
        else {
            return None;
        };

        let index = turns.iter().position(|turn| turn.id() == turn_id)?;
        let mut updated = Turn::clone(&turns[index]);
        transform(&mut updated);
        // The id is part of the turn's identity and must survive any transform.
        updated.id = turn_id.clone();

        let mut turns = turns.clone();
        turns[index] = Arc::new(updated);
        Some(Self::Chat {
            turns,
            is_restoring: *is_restoring,
        })
    }

    pub fn to_welcome(&self, welcome: WelcomeContent) -> Self {
        Self::Welcome(welcome)
    }

    /// Sets the bulk-restore flag; no-op unless in `Chat`.
    pub fn set_restoring(&self, restoring: bool) -> Self {
        match self {
            Self::Welcome(_) => self.clone(),
            Self::Chat { turns, .. } => Self::Chat {
                turns: turns.clone(),
                is_restoring: restoring,
            },
        }
    }

    pub fn is_welcome(&self) -> bool {
        matches!(self, Self::Welcome(_))
    }

    pub fn is_restoring(&self) -> bool {
        matches!(
            self,
            Self::Chat {
                is_restoring: true,
                ..
            }
        )
    }

    pub fn turns(&self) -> &[Arc<Turn>] {
        match self {
            Self::Welcome(_) => &[],
            Self::Chat { turns, .. } => turns,
        }
    }

    pub fn turn(&self, turn_id: &TurnId) -> Option<&Turn> {
        self.turns()
            .iter()
            .find(|turn| turn.id() == turn_id)
            .map(Arc::as_ref)
    }

    pub fn contains_turn(&self, turn_id: &TurnId) -> bool {
        self.turn(turn_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    fn welcome() -> ConversationState {
        ConversationState::Welcome(WelcomeContent {
            intro: "Ask me anything".to_string(),
            custom_prompts: Vec::new(),
        })
    }

    #[test]
    fn start_chat_leaves_welcome_with_single_turn() {
        let state = welcome().start_chat(Turn::pending("t1", "Explain recursion", ""));

        assert_matches!(&state, ConversationState::Chat { turns, is_restoring: false } if turns.len() == 1);
        let turn = state.turn(&"t1".into()).expect("t1 should exist");
        assert!(turn.is_loading_visible);
        assert_eq!(turn.answer_text, "");
    }

    #[test]
    fn start_chat_appends_in_order_and_keeps_restoring_flag() {
        let state = welcome()
            .start_chat(Turn::new("t1", "one"))
            .set_restoring(true)
            .start_chat(Turn::new("t2", "two"));

        let ids: Vec<_> = state.turns().iter().map(|turn| turn.id().as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2"]);
        assert!(state.is_restoring());
    }

    #[test]
    fn transitions_leave_previous_snapshot_frozen() {
        let before = welcome().start_chat(Turn::new("t1", "prompt"));
        let after = before.replace_turn(&"t1".into(), |turn| {
            turn.answer_text = "answer".to_string();
        });

        assert_eq!(before.turn(&"t1".into()).map(|t| t.answer_text.as_str()), Some(""));
        assert_eq!(
            after.turn(&"t1".into()).map(|t| t.answer_text.as_str()),
            Some("answer")
        );
    }

    #[test]
    fn replace_turn_shares_untouched_turns() {
        let before = welcome()
            .start_chat(Turn::new("t1", "one"))
            .start_chat(Turn::new("t2", "two"));
        let after = before.replace_turn(&"t2".into(), |turn| turn.is_loading_visible = false);

        assert!(Arc::ptr_eq(&before.turns()[0], &after.turns()[0]));
        assert!(!Arc::ptr_eq(&before.turns()[1], &after.turns()[1]));
    }

    #[test]
    fn replace_turn_misses_are_noops() {
        let chat = welcome().start_chat(Turn::new("t1", "one"));

        assert_eq!(chat.try_replace_turn(&"missing".into(), |_| {}), None);
        assert_eq!(chat.replace_turn(&"missing".into(), |_| {}), chat);
        assert_eq!(welcome().replace_turn(&"t1".into(), |_| {}), welcome());
    }

    #[test]
    fn replace_turn_cannot_change_turn_id() {
        let chat = welcome().start_chat(Turn::new("t1", "one"));
        let after = chat.replace_turn(&"t1".into(), |turn| *turn = Turn::new("other", "two"));

        let turn = after.turn(&"t1".into()).expect("t1 keeps its id");
        assert_eq!(turn.user_prompt, "two");
        assert!(!after.contains_turn(&"other".into()));
    }

    #[test]
    fn set_restoring_only_applies_in_chat() {
        assert_eq!(welcome().set_restoring(true), welcome());

        let chat = welcome().start_chat(Turn::new("t1", "one")).set_restoring(true);
        assert!(chat.is_restoring());
        assert!(!chat.set_restoring(false).is_restoring());
    }

    #[test]
    fn to_welcome_drops_all_turns() {
        let chat = welcome().start_chat(Turn::new("t1", "one"));
        let reset = chat.to_welcome(WelcomeContent::default());

        assert!(reset.is_welcome());
        assert!(reset.turns().is_empty());
    }
}
