// session_flow.rs — PlanSession end to end against a temp workspace.
//
// VERIFY:
//   - auto-apply skips preview and needs no decision
//   - manual mode mutates nothing until accept
//   - reject keeps attachments, apply clears them
//   - parse and model failures return to Idle without touching files
//   - pending-plan policy (supersede / refuse)
//   - previews are released with the plan they belong to
//   - accept never overwrites a file edited after its diff was shown

mod common;

use std::fs;
use std::sync::atomic::Ordering;

use tempfile::tempdir;

use common::*;
use maou_session::session::{
    MSG_CHANGES_APPLIED, MSG_NO_PENDING, MSG_PARSE_FAILED, MSG_PLAN_APPLIED, MSG_PLAN_REJECTED,
    MSG_REFUSED, MSG_SUPERSEDED, MSG_THINKING,
};
use maou_session::{
    InboundEvent, MaouConfig, ModelError, OutboundEvent, PendingPlanPolicy, SessionError,
    SessionPhase,
};

const CREATE_HI: &str =
    r#"{"thought":"add file","actions":[{"type":"CREATE_FILE","path":"a/b.txt","content":"hi"}]}"#;
const EMPTY: &str = r#"{"thought":"t","actions":[]}"#;

#[test]
fn empty_plan_returns_to_idle_without_mutation() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("keep.txt"), "k").unwrap();
    let h = harness(
        dir.path(),
        ScriptedModel::replying(&[&fenced(EMPTY)]),
        auto_config(),
        ListConfirmer::allowing(&[]),
        None,
    );

    h.session.handle_user_message("do nothing").unwrap();

    assert_eq!(h.session.phase(), SessionPhase::Idle);
    assert!(h.session.pending_plan().is_none());
    assert_eq!(h.presenter.shown.load(Ordering::SeqCst), 0);
    assert!(h.confirmer.asked.lock().unwrap().is_empty());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn auto_apply_writes_without_preview_or_decision() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("old.txt"), "old").unwrap();
    let plan = r#"{"thought":"t","actions":[
        {"type":"CREATE_FILE","path":"a/b.txt","content":"hi"},
        {"type":"DELETE_FILE","path":"old.txt"}]}"#;
    let h = harness(
        dir.path(),
        ScriptedModel::replying(&[&fenced(plan)]),
        auto_config(),
        ListConfirmer::allowing(&["old.txt"]),
        None,
    );

    h.session.handle_user_message("go").unwrap();

    assert_eq!(fs::read_to_string(dir.path().join("a/b.txt")).unwrap(), "hi");
    assert!(!dir.path().join("old.txt").exists());
    assert_eq!(h.presenter.shown.load(Ordering::SeqCst), 0);
    assert_eq!(h.sink.count("plan:await-approval"), 0);
    assert_eq!(h.sink.count("plan"), 1);
    assert_eq!(h.session.phase(), SessionPhase::Idle);
    assert!(h.sink.assistant_texts().contains(&MSG_CHANGES_APPLIED.to_string()));
}

#[test]
fn manual_mode_waits_for_accept() {
    let dir = tempdir().unwrap();
    let h = harness(
        dir.path(),
        ScriptedModel::replying(&[&fenced(CREATE_HI)]),
        manual_config(),
        ListConfirmer::allowing(&[]),
        None,
    );

    h.session.handle_user_message("add a file").unwrap();

    assert_eq!(h.session.phase(), SessionPhase::AwaitingApproval);
    assert!(h.session.pending_plan().is_some());
    assert!(!dir.path().join("a/b.txt").exists());
    assert_eq!(h.presenter.shown.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.presenter.titles.lock().unwrap()[0],
        "Maou Preview: a/b.txt"
    );
    assert_eq!(h.sink.count("plan:await-approval"), 1);

    h.session.accept_plan().unwrap();

    assert_eq!(fs::read_to_string(dir.path().join("a/b.txt")).unwrap(), "hi");
    assert_eq!(h.session.phase(), SessionPhase::Idle);
    assert!(h.session.pending_plan().is_none());
    assert!(h.sink.assistant_texts().contains(&MSG_PLAN_APPLIED.to_string()));
}

#[test]
fn events_are_emitted_in_order() {
    let dir = tempdir().unwrap();
    let h = harness(
        dir.path(),
        ScriptedModel::replying(&[&fenced(CREATE_HI)]),
        manual_config(),
        ListConfirmer::allowing(&[]),
        None,
    );

    h.session
        .handle(InboundEvent::Send {
            text: "add".into(),
        })
        .unwrap();

    let types: Vec<&str> = h
        .sink
        .events
        .lock()
        .unwrap()
        .iter()
        .map(|e| e.event_type())
        .collect();
    assert_eq!(
        types,
        vec!["chat:user", "chat:assistant", "plan", "plan:await-approval"]
    );
    assert_eq!(h.sink.assistant_texts(), vec![MSG_THINKING.to_string()]);
}

#[test]
fn reject_keeps_attachments_and_files() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("notes.md"), "context").unwrap();
    let h = harness(
        dir.path(),
        ScriptedModel::replying(&[&fenced(CREATE_HI)]),
        manual_config(),
        ListConfirmer::allowing(&[]),
        None,
    );

    h.session.attach_file(Some("notes.md")).unwrap();
    h.session.handle_user_message("add").unwrap();
    h.session.reject_plan().unwrap();

    assert_eq!(h.session.phase(), SessionPhase::Idle);
    assert!(h.session.pending_plan().is_none());
    assert_eq!(h.session.attachments().len(), 1);
    assert!(!dir.path().join("a/b.txt").exists());
    assert!(h.sink.assistant_texts().contains(&MSG_PLAN_REJECTED.to_string()));
    assert!(h.session.previews().is_empty());
}

#[test]
fn repeated_rejects_hold_no_previews() {
    let dir = tempdir().unwrap();
    let model = ScriptedModel::replying(&[]);
    for n in 0..5 {
        let plan = format!(
            r#"{{"thought":"t","actions":[{{"type":"CREATE_FILE","path":"f{}.txt","content":"{}"}}]}}"#,
            n,
            "x".repeat(1024)
        );
        model.push(Ok(fenced(&plan)));
    }
    let h = harness(
        dir.path(),
        model,
        manual_config(),
        ListConfirmer::allowing(&[]),
        None,
    );

    for _ in 0..5 {
        h.session.handle_user_message("add").unwrap();
        assert_eq!(h.session.previews().len(), 1);
        h.session.reject_plan().unwrap();
    }
    assert!(h.session.previews().is_empty());
}

#[test]
fn supersede_releases_previous_previews() {
    let dir = tempdir().unwrap();
    let second =
        r#"{"thought":"t","actions":[{"type":"CREATE_FILE","path":"other.txt","content":"o"}]}"#;
    let h = harness(
        dir.path(),
        ScriptedModel::replying(&[&fenced(CREATE_HI), &fenced(second)]),
        manual_config(),
        ListConfirmer::allowing(&[]),
        None,
    );

    h.session.handle_user_message("first").unwrap();
    h.session.handle_user_message("second").unwrap();

    assert_eq!(h.session.previews().len(), 1);
}

#[test]
fn successful_apply_clears_attachments() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("notes.md"), "context").unwrap();
    let model = ScriptedModel::replying(&[&fenced(CREATE_HI)]);
    let h = harness(
        dir.path(),
        model.clone(),
        manual_config(),
        ListConfirmer::allowing(&[]),
        None,
    );

    h.session.attach_file(Some("notes.md")).unwrap();
    h.session.handle_user_message("add").unwrap();
    assert!(model.last_prompt().contains("FILE: notes.md"));
    assert_eq!(h.session.previews().len(), 1);
    h.session.accept_plan().unwrap();

    assert!(h.session.attachments().is_empty());
    assert!(h.session.previews().is_empty());
}

#[test]
fn unparseable_output_returns_to_idle() {
    let dir = tempdir().unwrap();
    let h = harness(
        dir.path(),
        ScriptedModel::replying(&["I am not sure what you mean."]),
        manual_config(),
        ListConfirmer::allowing(&[]),
        None,
    );

    h.session.handle_user_message("???").unwrap();

    assert_eq!(h.session.phase(), SessionPhase::Idle);
    assert!(h.session.pending_plan().is_none());
    assert!(h.sink.assistant_texts().contains(&MSG_PARSE_FAILED.to_string()));
    assert_eq!(h.sink.count("plan"), 0);
}

#[test]
fn api_error_is_surfaced_verbatim() {
    let dir = tempdir().unwrap();
    let model = ScriptedModel::replying(&[]);
    model.push(Err(ModelError::Api {
        status: 429,
        body: "quota exceeded".into(),
    }));
    let h = harness(
        dir.path(),
        model,
        manual_config(),
        ListConfirmer::allowing(&[]),
        None,
    );

    let result = h.session.handle(InboundEvent::Send { text: "x".into() });

    assert!(matches!(
        result,
        Err(SessionError::Model(ModelError::Api { status: 429, .. }))
    ));
    assert_eq!(h.session.phase(), SessionPhase::Idle);
    let last = h.sink.assistant_texts().pop().unwrap();
    assert!(last.starts_with("Error: "));
    assert!(last.contains("429"));
    assert!(last.contains("quota exceeded"));
}

#[test]
fn whitespace_message_is_ignored() {
    let dir = tempdir().unwrap();
    let model = ScriptedModel::replying(&[]);
    let h = harness(
        dir.path(),
        model.clone(),
        manual_config(),
        ListConfirmer::allowing(&[]),
        None,
    );

    h.session.handle_user_message("   \n").unwrap();
    assert_eq!(model.calls(), 0);
    assert!(h.sink.events.lock().unwrap().is_empty());
}

#[test]
fn new_request_supersedes_pending_plan_with_notice() {
    let dir = tempdir().unwrap();
    let h = harness(
        dir.path(),
        ScriptedModel::replying(&[&fenced(CREATE_HI), &fenced(EMPTY)]),
        manual_config(),
        ListConfirmer::allowing(&[]),
        None,
    );

    h.session.handle_user_message("first").unwrap();
    let first_id = h.session.pending_plan().unwrap().id;
    h.session.handle_user_message("second").unwrap();

    let pending = h.session.pending_plan().unwrap();
    assert_ne!(pending.id, first_id);
    assert!(pending.plan.is_noop());
    assert!(h.sink.assistant_texts().contains(&MSG_SUPERSEDED.to_string()));
}

#[test]
fn refuse_policy_keeps_pending_plan_and_skips_model() {
    let dir = tempdir().unwrap();
    let model = ScriptedModel::replying(&[&fenced(CREATE_HI), &fenced(EMPTY)]);
    let config = MaouConfig {
        pending_plan_policy: PendingPlanPolicy::Refuse,
        ..MaouConfig::default()
    };
    let h = harness(
        dir.path(),
        model.clone(),
        config,
        ListConfirmer::allowing(&[]),
        None,
    );

    h.session.handle_user_message("first").unwrap();
    let first_id = h.session.pending_plan().unwrap().id;
    h.session.handle_user_message("second").unwrap();

    assert_eq!(model.calls(), 1);
    assert_eq!(h.session.pending_plan().unwrap().id, first_id);
    assert_eq!(h.session.phase(), SessionPhase::AwaitingApproval);
    assert!(h.sink.assistant_texts().contains(&MSG_REFUSED.to_string()));
}

#[test]
fn accept_without_pending_plan_is_a_notice() {
    let dir = tempdir().unwrap();
    let h = harness(
        dir.path(),
        ScriptedModel::replying(&[]),
        manual_config(),
        ListConfirmer::allowing(&[]),
        None,
    );

    h.session.accept_plan().unwrap();
    h.session.reject_plan().unwrap();
    assert_eq!(
        h.sink.assistant_texts(),
        vec![MSG_NO_PENDING.to_string(), MSG_NO_PENDING.to_string()]
    );
}

#[test]
fn failed_apply_discards_plan_and_keeps_attachments() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("main.rs"), "v1").unwrap();
    fs::write(dir.path().join("notes.md"), "n").unwrap();
    let plan = r#"{"thought":"t","actions":[{"type":"UPDATE_FILE","path":"main.rs","content":"v2"}]}"#;
    let h = harness(
        dir.path(),
        ScriptedModel::replying(&[&fenced(plan)]),
        manual_config(),
        ListConfirmer::allowing(&[]),
        None,
    );

    h.session.attach_file(Some("notes.md")).unwrap();
    h.session.handle_user_message("bump").unwrap();
    // A directory now sits where the file was; the host refuses the batch.
    fs::remove_file(dir.path().join("main.rs")).unwrap();
    fs::create_dir(dir.path().join("main.rs")).unwrap();

    let result = h.session.handle(InboundEvent::AcceptPlan);

    assert!(result.is_err());
    assert_eq!(h.session.phase(), SessionPhase::Idle);
    assert!(h.session.pending_plan().is_none());
    assert_eq!(h.session.attachments().len(), 1);
    assert!(h.sink.assistant_texts().pop().unwrap().starts_with("Error: "));
}

#[test]
fn accept_refuses_files_edited_after_preview() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("main.rs"), "v1").unwrap();
    let plan = r#"{"thought":"t","actions":[
        {"type":"UPDATE_FILE","path":"main.rs","content":"v3"},
        {"type":"CREATE_FILE","path":"new.rs","content":"n"}]}"#;
    let h = harness(
        dir.path(),
        ScriptedModel::replying(&[&fenced(plan)]),
        manual_config(),
        ListConfirmer::allowing(&[]),
        None,
    );

    h.session.handle_user_message("bump").unwrap();
    fs::write(dir.path().join("main.rs"), "v2 edited by hand").unwrap();
    let result = h.session.accept_plan();

    match result {
        Err(SessionError::PlanStale { paths }) => assert_eq!(paths, vec!["main.rs"]),
        other => panic!("expected stale plan, got {:?}", other),
    }
    assert_eq!(
        fs::read_to_string(dir.path().join("main.rs")).unwrap(),
        "v2 edited by hand"
    );
    assert!(!dir.path().join("new.rs").exists());
    assert_eq!(h.session.phase(), SessionPhase::Idle);
    assert!(h.session.pending_plan().is_none());
    assert!(h.session.previews().is_empty());
}

#[test]
fn accept_refuses_create_target_that_appeared() {
    let dir = tempdir().unwrap();
    let h = harness(
        dir.path(),
        ScriptedModel::replying(&[&fenced(CREATE_HI)]),
        manual_config(),
        ListConfirmer::allowing(&[]),
        None,
    );

    h.session.handle_user_message("add").unwrap();
    fs::create_dir_all(dir.path().join("a")).unwrap();
    fs::write(dir.path().join("a/b.txt"), "mine").unwrap();

    assert!(matches!(
        h.session.accept_plan(),
        Err(SessionError::PlanStale { .. })
    ));
    assert_eq!(fs::read_to_string(dir.path().join("a/b.txt")).unwrap(), "mine");
}

#[test]
fn accept_applies_when_workspace_is_unchanged() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("main.rs"), "v1").unwrap();
    let plan = r#"{"thought":"t","actions":[{"type":"UPDATE_FILE","path":"main.rs","content":"v2"}]}"#;
    let h = harness(
        dir.path(),
        ScriptedModel::replying(&[&fenced(plan)]),
        manual_config(),
        ListConfirmer::allowing(&[]),
        None,
    );

    h.session.handle_user_message("bump").unwrap();
    let bases = h.session.pending_plan().unwrap().reviewed_bases;
    assert_eq!(bases.len(), 1);
    h.session.accept_plan().unwrap();

    assert_eq!(fs::read_to_string(dir.path().join("main.rs")).unwrap(), "v2");
}

#[test]
fn deletes_are_confirmed_one_by_one() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("x.txt"), "x").unwrap();
    fs::write(dir.path().join("y.txt"), "y").unwrap();
    let plan = r#"{"thought":"t","actions":[
        {"type":"DELETE_FILE","path":"x.txt"},
        {"type":"DELETE_FILE","path":"y.txt"}]}"#;
    let h = harness(
        dir.path(),
        ScriptedModel::replying(&[&fenced(plan)]),
        manual_config(),
        ListConfirmer::allowing(&["x.txt"]),
        None,
    );

    h.session.handle_user_message("clean up").unwrap();
    assert_eq!(h.presenter.shown.load(Ordering::SeqCst), 0);
    assert!(h.confirmer.asked.lock().unwrap().is_empty());

    h.session.accept_plan().unwrap();

    assert_eq!(*h.confirmer.asked.lock().unwrap(), vec!["x.txt", "y.txt"]);
    assert!(!dir.path().join("x.txt").exists());
    assert!(dir.path().join("y.txt").exists());
}

#[test]
fn missing_delete_target_is_reported_but_plan_applies() {
    let dir = tempdir().unwrap();
    let plan = r#"{"thought":"t","actions":[
        {"type":"CREATE_FILE","path":"new.txt","content":"n"},
        {"type":"DELETE_FILE","path":"ghost.txt"}]}"#;
    let h = harness(
        dir.path(),
        ScriptedModel::replying(&[&fenced(plan)]),
        auto_config(),
        ListConfirmer::allowing(&["ghost.txt"]),
        None,
    );

    h.session.handle_user_message("go").unwrap();

    let texts = h.sink.assistant_texts();
    assert!(texts.iter().any(|t| t.starts_with("Could not delete ghost.txt")));
    assert_eq!(texts.last().unwrap(), MSG_CHANGES_APPLIED);
    assert!(dir.path().join("new.txt").exists());
}

#[test]
fn attach_via_picker_and_dismissal() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
    fs::write(dir.path().join("node_modules/pkg/index.js"), "x").unwrap();
    fs::write(dir.path().join("lib.rs"), "pub fn f() {}").unwrap();

    let h = harness(
        dir.path(),
        ScriptedModel::replying(&[]),
        manual_config(),
        ListConfirmer::allowing(&[]),
        Some("lib.rs"),
    );
    h.session.handle(InboundEvent::AttachFile { path: None }).unwrap();
    assert_eq!(h.session.attachments()[0].file_path, "lib.rs");
    assert_eq!(h.session.attachments()[0].content, "pub fn f() {}");
    assert!(h.sink.events.lock().unwrap().contains(&OutboundEvent::Attachment {
        file_path: "lib.rs".into()
    }));

    // Excluded files never reach the picker.
    let h = harness(
        dir.path(),
        ScriptedModel::replying(&[]),
        manual_config(),
        ListConfirmer::allowing(&[]),
        Some("node_modules/pkg/index.js"),
    );
    h.session.attach_file(None).unwrap();
    assert!(h.session.attachments().is_empty());
    assert_eq!(h.sink.count("attachment"), 0);
}

#[test]
fn attach_rejects_paths_outside_workspace() {
    let dir = tempdir().unwrap();
    let h = harness(
        dir.path(),
        ScriptedModel::replying(&[]),
        manual_config(),
        ListConfirmer::allowing(&[]),
        None,
    );
    assert!(matches!(
        h.session.attach_file(Some("../secret")),
        Err(SessionError::Workspace(_))
    ));
}

#[cfg(unix)]
#[test]
fn attach_through_symlink_is_refused() {
    let dir = tempdir().unwrap();
    let outside = tempdir().unwrap();
    fs::write(outside.path().join("secret"), "private").unwrap();
    std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
    let h = harness(
        dir.path(),
        ScriptedModel::replying(&[]),
        manual_config(),
        ListConfirmer::allowing(&[]),
        None,
    );

    assert!(matches!(
        h.session.attach_file(Some("link/secret")),
        Err(SessionError::Workspace(_))
    ));
    assert!(h.session.attachments().is_empty());
    assert_eq!(h.sink.count("attachment"), 0);
}

#[test]
fn ready_reports_auth_model_and_auto_apply() {
    let dir = tempdir().unwrap();
    let h = harness(
        dir.path(),
        ScriptedModel::replying(&[]),
        auto_config(),
        ListConfirmer::allowing(&[]),
        None,
    );

    h.session.handle(InboundEvent::Ready).unwrap();

    assert_eq!(
        *h.sink.events.lock().unwrap(),
        vec![
            OutboundEvent::AuthState { logged_in: true },
            OutboundEvent::Model {
                model: "gemini-2.5-pro".into()
            },
            OutboundEvent::AutoApply { enabled: true },
        ]
    );
}

#[test]
fn select_model_is_used_for_the_next_request() {
    let dir = tempdir().unwrap();
    let model = ScriptedModel::replying(&[&fenced(EMPTY)]);
    let h = harness(
        dir.path(),
        model.clone(),
        manual_config(),
        ListConfirmer::allowing(&[]),
        None,
    );

    h.session
        .handle(InboundEvent::SelectModel {
            model: "gemini-2.5-flash".into(),
        })
        .unwrap();
    h.session.handle_user_message("go").unwrap();

    assert_eq!(model.prompts.lock().unwrap()[0].0, "gemini-2.5-flash");
    assert!(matches!(
        h.session.select_model("gpt-nonexistent"),
        Err(SessionError::UnknownModel(_))
    ));
    assert_eq!(h.session.model(), "gemini-2.5-flash");
}

#[test]
fn toggle_auto_apply_persists_to_config() {
    let dir = tempdir().unwrap();
    let config_path = MaouConfig::path_for_project(dir.path());
    let h = harness(
        dir.path(),
        ScriptedModel::replying(&[]),
        manual_config(),
        ListConfirmer::allowing(&[]),
        None,
    );
    let session = h.session.with_config_path(&config_path);

    session
        .handle(InboundEvent::ToggleAutoApply { enabled: true })
        .unwrap();

    assert!(session.auto_apply());
    assert!(MaouConfig::load(&config_path).unwrap().auto_apply);
    assert!(h.sink.events.lock().unwrap().contains(&OutboundEvent::AutoApply { enabled: true }));
}

#[test]
fn login_logout_emit_auth_state() {
    let dir = tempdir().unwrap();
    let h = harness(
        dir.path(),
        ScriptedModel::replying(&[]),
        manual_config(),
        ListConfirmer::allowing(&[]),
        None,
    );

    h.session.handle(InboundEvent::Logout).unwrap();
    let err = h.session.handle_user_message("hello");
    assert!(matches!(
        err,
        Err(SessionError::Model(ModelError::AuthRequired))
    ));
    assert_eq!(h.session.phase(), SessionPhase::Idle);

    h.session.handle(InboundEvent::Login).unwrap();
    let states: Vec<OutboundEvent> = h
        .sink
        .events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.event_type() == "auth-state")
        .cloned()
        .collect();
    assert_eq!(
        states,
        vec![
            OutboundEvent::AuthState { logged_in: false },
            OutboundEvent::AuthState { logged_in: true },
        ]
    );
}
