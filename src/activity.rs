//! Classification of activity notifications into normalized activity entries.

use serde_json::Value;
use tracing::debug;
use turn_events::{ActivityNotification, ActivitySource, AgentStep};

use crate::generation::GenerationTracker;

/// Argument keys that usually name the target of a tool action, most specific first.
const SUMMARY_PRIORITY_KEYS: [&str; 8] = [
    "path",
    "file_path",
    "directory",
    "url",
    "query",
    "pattern",
    "command",
    "name",
];

/// One agent/tool event surfaced to the user during a turn. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    pub source: ActivitySource,
    pub agent_step: Option<AgentStep>,
    pub content: String,
    pub tool_name: Option<String>,
    pub arguments: Option<String>,
    pub result: Option<String>,
    /// `0` means "not applicable".
    pub call_number: u32,
    /// `0` means "not applicable".
    pub max_calls: u32,
}

impl ActivityEntry {
    /// Builds an agent reasoning entry with every tool field empty.
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            source: ActivitySource::Agent,
            agent_step: Some(AgentStep::IntermediateResponse),
            content: text.into(),
            tool_name: None,
            arguments: None,
            result: None,
            call_number: 0,
            max_calls: 0,
        }
    }

    /// Parses `arguments` as JSON, or `None` when absent or malformed.
    pub fn arguments_json(&self) -> Option<Value> {
        self.arguments
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }

    /// Concise action label such as `"edit_file: /src/main.rs"`.
    ///
    /// Falls back to the bare tool name when arguments are missing, malformed,
    /// or carry no string value.
    pub fn tool_summary(&self) -> Option<String> {
        let tool_name = self.tool_name.as_deref()?;
        let target = self.arguments_json().and_then(|value| summary_target(&value));

        Some(match target {
            Some(target) => format!("{tool_name}: {target}"),
            None => tool_name.to_string(),
        })
    }

    /// Returns `"(n/max)"` when the entry carries a call counter.
    pub fn call_counter_label(&self) -> Option<String> {
        (self.call_number > 0).then(|| format!("({}/{})", self.call_number, self.max_calls))
    }
}

fn summary_target(arguments: &Value) -> Option<String> {
    let object = arguments.as_object()?;

    SUMMARY_PRIORITY_KEYS
        .iter()
        .find_map(|key| object.get(*key).and_then(non_empty_str))
        .or_else(|| object.values().find_map(non_empty_str))
        .map(str::to_string)
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|text| !text.is_empty())
}

/// Converts a notification into an entry for the live turn.
///
/// Returns `None` when the notification's turn is not live (stale or no turn
/// active) and for reasoning notifications that carry no text.
pub fn route(
    notification: &ActivityNotification,
    tracker: &GenerationTracker,
) -> Option<ActivityEntry> {
    if !tracker.is_live(&notification.turn_id) {
        debug!(
            turn_id = %notification.turn_id,
            source = %notification.source,
            "dropping activity for inactive turn"
        );
        return None;
    }

    classify(notification)
}

/// Normalizes a notification without consulting the generation tracker.
///
/// Reasoning text is read from `result` and falls back to `content` when
/// `result` is absent or blank. A reasoning notification that is blank in both
/// is dropped rather than logged as an empty entry.
pub fn classify(notification: &ActivityNotification) -> Option<ActivityEntry> {
    if notification.is_agent_reasoning() {
        // Reasoning goes to the activity log; the answer text is replaced by
        // every later snapshot and would lose it.
        let reasoning = non_blank(notification.result.as_deref())
            .or_else(|| non_blank(notification.content.as_deref()))?;
        return Some(ActivityEntry::reasoning(reasoning));
    }

    Some(ActivityEntry {
        source: notification.source.clone(),
        agent_step: notification.agent_step,
        content: notification.content.clone().unwrap_or_default(),
        tool_name: non_blank(notification.tool_name.as_deref()),
        arguments: non_blank(notification.arguments.as_deref()),
        result: notification.result.clone(),
        call_number: notification.call_number,
        max_calls: notification.max_calls,
    })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
}
