mod support;

use conversation_engine::{ConversationState, EventOutcome, StreamSnapshot, TurnId};
use pretty_assertions::assert_eq;

use support::{lenient_lifecycle, turn_of};

#[test]
fn late_snapshot_for_superseded_turn_is_discarded() {
    let mut lifecycle = lenient_lifecycle();

    lifecycle.submit_prompt("T1".into(), "Explain recursion", "");
    let t1 = turn_of(&lifecycle, "T1");
    assert!(t1.is_loading_visible);
    assert_eq!(t1.answer_text, "");

    lifecycle.on_stream_snapshot(StreamSnapshot::new("T1", "Recursion is"));
    assert_eq!(turn_of(&lifecycle, "T1").answer_text, "Recursion is");

    lifecycle.submit_prompt("T2".into(), "Explain iteration", "");
    let ids: Vec<_> = lifecycle
        .snapshot()
        .turns()
        .iter()
        .map(|turn| turn.id().clone())
        .collect();
    assert_eq!(ids, vec![TurnId::from("T1"), TurnId::from("T2")]);
    assert!(turn_of(&lifecycle, "T2").is_loading_visible);
    assert!(!lifecycle.tracker().is_live(&"T1".into()));

    let late = lifecycle.on_stream_snapshot(StreamSnapshot::new("T1", "Recursion is a technique"));
    assert_eq!(late, EventOutcome::Stale);
    assert_eq!(turn_of(&lifecycle, "T1").answer_text, "Recursion is");

    lifecycle.on_stream_snapshot(StreamSnapshot::new("T2", "Iteration is"));
    assert_eq!(turn_of(&lifecycle, "T2").answer_text, "Iteration is");
    assert_eq!(turn_of(&lifecycle, "T1").answer_text, "Recursion is");
}

#[test]
fn hide_loading_after_clear_does_not_resurrect_chat() {
    let mut lifecycle = lenient_lifecycle();
    lifecycle.submit_prompt("T1".into(), "Explain recursion", "");
    lifecycle.on_stream_snapshot(StreamSnapshot::new("T1", "Recursion is"));

    lifecycle.clear();
    assert!(lifecycle.snapshot().is_welcome());

    assert_eq!(
        lifecycle.on_hide_loading(&"T1".into()),
        EventOutcome::UnknownTurn
    );
    assert_eq!(
        lifecycle.on_activity_finalized(&"T1".into()),
        EventOutcome::UnknownTurn
    );
    assert_eq!(
        lifecycle.on_stream_snapshot(StreamSnapshot::new("T1", "Recursion is a technique")),
        EventOutcome::Stale
    );

    assert!(matches!(
        lifecycle.snapshot().as_ref(),
        ConversationState::Welcome(_)
    ));
}

#[test]
fn stale_updates_leave_every_turn_untouched() {
    let mut lifecycle = lenient_lifecycle();
    lifecycle.submit_prompt("A".into(), "first", "");
    lifecycle.on_stream_snapshot(StreamSnapshot::new("A", "a1"));
    lifecycle.submit_prompt("B".into(), "second", "");
    lifecycle.on_stream_snapshot(StreamSnapshot::new("B", "b1"));
    let before = lifecycle.snapshot();

    lifecycle.on_stream_snapshot(StreamSnapshot::new("A", "a2"));
    lifecycle.on_activity(&conversation_engine::ActivityNotification::agent_reasoning(
        "A", "late thought",
    ));

    assert_eq!(lifecycle.snapshot().as_ref(), before.as_ref());
    let counts = lifecycle.diagnostics().counts();
    assert_eq!(counts.stale_snapshots, 1);
    assert_eq!(counts.stale_activities, 1);
}
