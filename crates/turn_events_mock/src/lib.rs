//! Deterministic scripted implementation of the `turn_events` source contract.
//!
//! This crate contains no transport logic and is intended for local
//! development and contract-level integration testing.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use turn_events::{
    ActivityNotification, AgentStep, CancelSignal, SourceProfile, StreamSnapshot, TokenUsage,
    TurnEvent, TurnEventSource, TurnId, TurnRequest,
};

/// Stable provider identifier reported by the scripted source.
pub const MOCK_PROVIDER_ID: &str = "mock";

/// Activity emitted once the answer has reached `after_chunk` chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedActivity {
    Reasoning(String),
    ToolCall {
        tool_name: String,
        arguments: String,
        result: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ScriptStep {
    after_chunk: usize,
    activity: ScriptedActivity,
}

/// Scripted source emitting cumulative snapshots interleaved with activity.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    chunks: Vec<String>,
    steps: Vec<ScriptStep>,
    model_id: String,
    token_delay: Duration,
}

impl ScriptedSource {
    /// Creates a source that streams `chunks` with no activity and no delay.
    #[must_use]
    pub fn new(chunks: Vec<String>) -> Self {
        Self {
            chunks,
            steps: Vec::new(),
            model_id: "mock".to_string(),
            token_delay: Duration::ZERO,
        }
    }

    /// Emits `activity` right after the `after_chunk`-th chunk has been streamed.
    #[must_use]
    pub fn with_activity(mut self, after_chunk: usize, activity: ScriptedActivity) -> Self {
        self.steps.push(ScriptStep {
            after_chunk,
            activity,
        });
        self
    }

    #[must_use]
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        let trimmed = model_id.trim();
        if !trimmed.is_empty() {
            self.model_id = trimmed.to_string();
        }
        self
    }

    fn emit_activities_for(
        &self,
        turn_id: &TurnId,
        streamed_chunks: usize,
        call_number: &mut u32,
        emit: &mut dyn FnMut(TurnEvent),
    ) {
        let max_calls = self
            .steps
            .iter()
            .filter(|step| matches!(step.activity, ScriptedActivity::ToolCall { .. }))
            .count() as u32;

        for step in self
            .steps
            .iter()
            .filter(|step| step.after_chunk == streamed_chunks)
        {
            match &step.activity {
                ScriptedActivity::Reasoning(text) => emit(TurnEvent::Activity(
                    ActivityNotification::agent_reasoning(turn_id.clone(), text.clone()),
                )),
                ScriptedActivity::ToolCall {
                    tool_name,
                    arguments,
                    result,
                } => {
                    *call_number += 1;
                    emit(TurnEvent::Activity(
                        ActivityNotification::tool_call(
                            turn_id.clone(),
                            tool_name.clone(),
                            arguments.clone(),
                        )
                        .with_step(AgentStep::ToolRequest)
                        .with_call_counter(*call_number, max_calls),
                    ));
                    emit(TurnEvent::Activity(
                        ActivityNotification::tool_call(
                            turn_id.clone(),
                            tool_name.clone(),
                            arguments.clone(),
                        )
                        .with_step(AgentStep::ToolResponse)
                        .with_result(result.clone())
                        .with_call_counter(*call_number, max_calls),
                    ));
                }
            }
        }
    }

    fn pause(&self) {
        if !self.token_delay.is_zero() {
            thread::sleep(self.token_delay);
        }
    }
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self::new(vec![
            "Recursion is a technique where a function calls itself ".to_string(),
            "on a smaller input until it reaches a base case.\n".to_string(),
            "Each call waits for the result of the next one.\n".to_string(),
        ])
        .with_activity(
            0,
            ScriptedActivity::Reasoning("Looking for an example in the project".to_string()),
        )
        .with_activity(
            1,
            ScriptedActivity::ToolCall {
                tool_name: "read_file".to_string(),
                arguments: r#"{"path":"src/lib.rs"}"#.to_string(),
                result: "fn factorial(n: u64) -> u64".to_string(),
            },
        )
    }
}

impl TurnEventSource for ScriptedSource {
    fn profile(&self) -> SourceProfile {
        SourceProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            model_id: self.model_id.clone(),
        }
    }

    fn run(
        &self,
        req: TurnRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(TurnEvent),
    ) -> Result<(), String> {
        let TurnRequest { turn_id, .. } = req;
        let label = self.profile().display_label();
        let mut answer = String::new();
        let mut call_number = 0;
        let mut output_tokens = 0u64;
        let mut elapsed_ms = 0u64;

        self.emit_activities_for(&turn_id, 0, &mut call_number, emit);

        'chunks: for (index, chunk) in self.chunks.iter().enumerate() {
            for token in chunk.split_inclusive([' ', '\n']) {
                if cancel.load(Ordering::SeqCst) {
                    break 'chunks;
                }

                answer.push_str(token);
                output_tokens += 1;
                elapsed_ms += self.token_delay.as_millis() as u64;
                emit(TurnEvent::StreamSnapshot(
                    StreamSnapshot::new(turn_id.clone(), answer.clone())
                        .with_usage(TokenUsage {
                            input_tokens: 0,
                            output_tokens,
                            cost: 0.0,
                        })
                        .with_elapsed_ms(elapsed_ms)
                        .with_model_label(label.clone()),
                ));
                self.pause();
            }

            self.emit_activities_for(&turn_id, index + 1, &mut call_number, emit);
        }

        emit(TurnEvent::ActivityFinalized {
            turn_id: turn_id.clone(),
        });
        emit(TurnEvent::HideLoading { turn_id });

        Ok(())
    }
}
