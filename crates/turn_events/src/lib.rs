//! Minimal collaborator-neutral contract for the events one chat turn produces.
//!
//! This crate intentionally defines only the values an upstream model
//! collaborator delivers (cumulative answer snapshots, activity notifications,
//! terminal markers) and the `TurnEventSource` trait it implements. It excludes
//! transport details, rendering, and turn correlation concerns.

use std::fmt;
use std::sync::{atomic::AtomicBool, Arc};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Opaque, submitter-supplied identifier of one turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(String);

impl TurnId {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TurnId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TurnId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Shared cancellation flag for a turn's upstream work.
pub type CancelSignal = Arc<AtomicBool>;

/// Token accounting reported alongside an answer snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

/// A file the collaborator attached to a turn's context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    pub path: String,
    pub name: String,
}

impl FileReference {
    /// Builds a reference whose display name is the last path component.
    #[must_use]
    pub fn from_path(path: impl Into<String>) -> Self {
        let path = path.into();
        let name = path
            .rsplit(['/', '\\'])
            .find(|segment| !segment.is_empty())
            .unwrap_or(path.as_str())
            .to_string();

        Self { path, name }
    }
}

/// Origin of an activity notification.
///
/// Sources this crate does not know are preserved by their raw label so newer
/// collaborators degrade gracefully instead of being dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActivitySource {
    Agent,
    Tool,
    Mcp,
    Unknown(String),
}

impl ActivitySource {
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Agent => "AGENT",
            Self::Tool => "TOOL",
            Self::Mcp => "MCP",
            Self::Unknown(label) => label,
        }
    }
}

impl Default for ActivitySource {
    fn default() -> Self {
        Self::Unknown("UNKNOWN".to_string())
    }
}

impl From<&str> for ActivitySource {
    fn from(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "AGENT" => Self::Agent,
            "TOOL" => Self::Tool,
            "MCP" => Self::Mcp,
            _ => Self::Unknown(label.to_string()),
        }
    }
}

impl From<String> for ActivitySource {
    fn from(label: String) -> Self {
        Self::from(label.as_str())
    }
}

impl From<ActivitySource> for String {
    fn from(source: ActivitySource) -> Self {
        source.label().to_string()
    }
}

impl fmt::Display for ActivitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Agent-loop step kinds reported with `ActivitySource::Agent` notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStep {
    ToolRequest,
    ToolResponse,
    ToolError,
    LoopLimit,
    ApprovalRequested,
    ApprovalGranted,
    ApprovalDenied,
    IntermediateResponse,
}

/// One activity notification as delivered by the collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityNotification {
    pub turn_id: TurnId,
    #[serde(default, deserialize_with = "lenient_source")]
    pub source: ActivitySource,
    #[serde(default, deserialize_with = "lenient_agent_step")]
    pub agent_step: Option<AgentStep>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub tool_name: Option<String>,
    /// Raw JSON text; structured arguments are kept as their serialized form.
    #[serde(default, deserialize_with = "lenient_arguments")]
    pub arguments: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub result: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub call_number: u32,
    #[serde(default, deserialize_with = "lenient_count")]
    pub max_calls: u32,
}

impl ActivityNotification {
    /// Creates a notification with every optional field absent.
    #[must_use]
    pub fn new(turn_id: impl Into<TurnId>, source: ActivitySource) -> Self {
        Self {
            turn_id: turn_id.into(),
            source,
            agent_step: None,
            content: None,
            tool_name: None,
            arguments: None,
            result: None,
            call_number: 0,
            max_calls: 0,
        }
    }

    /// Agent reasoning text that must never be merged into the answer.
    #[must_use]
    pub fn agent_reasoning(turn_id: impl Into<TurnId>, text: impl Into<String>) -> Self {
        Self {
            agent_step: Some(AgentStep::IntermediateResponse),
            result: Some(text.into()),
            ..Self::new(turn_id, ActivitySource::Agent)
        }
    }

    /// Tool invocation reported by the agent loop.
    #[must_use]
    pub fn tool_call(
        turn_id: impl Into<TurnId>,
        tool_name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            arguments: Some(arguments.into()),
            ..Self::new(turn_id, ActivitySource::Tool)
        }
    }

    #[must_use]
    pub fn with_step(mut self, step: AgentStep) -> Self {
        self.agent_step = Some(step);
        self
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    #[must_use]
    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    #[must_use]
    pub fn with_call_counter(mut self, call_number: u32, max_calls: u32) -> Self {
        self.call_number = call_number;
        self.max_calls = max_calls;
        self
    }

    /// Returns true for agent intermediate reasoning notifications.
    #[must_use]
    pub fn is_agent_reasoning(&self) -> bool {
        self.source == ActivitySource::Agent
            && self.agent_step == Some(AgentStep::IntermediateResponse)
    }
}

// Each field degrades on its own: a wrongly typed value becomes absent (or
// zero) instead of failing the whole notification.

fn lenient_agent_step<'de, D>(deserializer: D) -> Result<Option<AgentStep>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| serde_json::from_value(value).ok()))
}

fn lenient_source<'de, D>(deserializer: D) -> Result<ActivitySource, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(label)) => Ok(ActivitySource::from(label)),
        _ => Ok(ActivitySource::default()),
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Ok(Some(text)),
        _ => Ok(None),
    }
}

fn lenient_arguments<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Ok(Some(text)),
        Some(value @ (Value::Object(_) | Value::Array(_))) => Ok(Some(value.to_string())),
        _ => Ok(None),
    }
}

fn lenient_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_u64)
        .and_then(|count| u32::try_from(count).ok())
        .unwrap_or(0))
}

/// Cumulative answer-so-far for one turn; replaces, never extends, the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSnapshot {
    pub turn_id: TurnId,
    pub text: String,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default)]
    pub model_label: Option<String>,
}

impl StreamSnapshot {
    #[must_use]
    pub fn new(turn_id: impl Into<TurnId>, text: impl Into<String>) -> Self {
        Self {
            turn_id: turn_id.into(),
            text: text.into(),
            usage: None,
            elapsed_ms: 0,
            model_label: None,
        }
    }

    #[must_use]
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    #[must_use]
    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    #[must_use]
    pub fn with_model_label(mut self, model_label: impl Into<String>) -> Self {
        self.model_label = Some(model_label.into());
        self
    }
}

/// Collaborator-emitted event for one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    StreamSnapshot(StreamSnapshot),
    Activity(ActivityNotification),
    HideLoading { turn_id: TurnId },
    ActivityFinalized { turn_id: TurnId },
    FileReferences { turn_id: TurnId, files: Vec<FileReference> },
}

impl TurnEvent {
    /// Returns the turn identifier this event logically belongs to.
    #[must_use]
    pub fn turn_id(&self) -> &TurnId {
        match self {
            Self::StreamSnapshot(snapshot) => &snapshot.turn_id,
            Self::Activity(notification) => &notification.turn_id,
            Self::HideLoading { turn_id }
            | Self::ActivityFinalized { turn_id }
            | Self::FileReferences { turn_id, .. } => turn_id,
        }
    }

    /// Returns true for the two independent terminal markers of a turn.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::HideLoading { .. } | Self::ActivityFinalized { .. }
        )
    }
}

/// Identity of the model behind a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceProfile {
    pub provider_id: String,
    pub model_id: String,
}

impl SourceProfile {
    /// Formats `"<provider> : <model>"` for display on a turn.
    #[must_use]
    pub fn display_label(&self) -> String {
        let provider = self.provider_id.trim();
        let model = self.model_id.trim();

        match (provider.is_empty(), model.is_empty()) {
            (_, true) => String::new(),
            (true, false) => model.to_string(),
            (false, false) => format!("{provider} : {model}"),
        }
    }
}

/// Input required to start producing events for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub turn_id: TurnId,
    pub prompt: String,
}

/// Upstream collaborator that produces the events of one turn.
pub trait TurnEventSource: Send + Sync + 'static {
    /// Returns provider/model identity metadata.
    fn profile(&self) -> SourceProfile;

    /// Produces events for `req` in collaborator order.
    ///
    /// Implementations should stop emitting content once `cancel` is raised.
    /// Returning `Err` reports a transport failure for the turn.
    fn run(
        &self,
        req: TurnRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(TurnEvent),
    ) -> Result<(), String>;
}
