// session.rs — PlanSession: the controller that owns the pending-plan lifecycle.
//
// One session value holds the phase, the single pending plan, the attachment
// list, the selected model and the auto-apply flag. Inbound events drive it:
//
//   send → prompt → model → parse → prepare → auto-apply | preview + await
//   accept → re-prepare → apply batch → confirm deletes → reset
//   reject → discard pending plan (attachments kept)
//
// Plan flows are serialized by a busy flag: while one flow is in flight any
// other flow entry point returns SessionError::Busy. `cancel()` is the only
// call that reaches into an in-flight flow.
//
// Reset policy: attachments are cleared only after a successful apply. A
// failed apply discards the pending plan and keeps attachments, so the user
// can ask again with the same context. Preview content lives exactly as long
// as the pending plan it belongs to.
//
// Accept refuses to write over files that changed after their diff was
// shown: the base hashes seen at preview time travel with the pending plan.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use maou_plan::{parse_plan_from_model_text, Attachment, ExecutionPlan, PromptBuilder};
use maou_workspace::{
    ApplyExecutor, ChannelError, DeleteConfirmer, DeleteOutcome, DeleteReport, DiffPresenter,
    DiffPreviewer, PlanPreparer, PreparedEdit, PreviewStore, Workspace,
};

use crate::config::{MaouConfig, PendingPlanPolicy};
use crate::error::{ModelError, SessionError};
use crate::events::{EventSink, InboundEvent, OutboundEvent};
use crate::model::{CancelToken, CredentialProvider, LanguageModel};
use crate::state::SessionPhase;

pub const MSG_THINKING: &str = "Thinking…";
pub const MSG_PARSE_FAILED: &str = "Failed to parse plan. Please try again.";
pub const MSG_CHANGES_APPLIED: &str = "Changes applied.";
pub const MSG_PLAN_APPLIED: &str = "Plan applied.";
pub const MSG_PLAN_REJECTED: &str = "Plan rejected.";
pub const MSG_SUPERSEDED: &str = "Previous pending plan discarded.";
pub const MSG_REFUSED: &str = "A plan is awaiting approval. Accept or reject it first.";
pub const MSG_CANCELLED: &str = "Request cancelled.";
pub const MSG_NO_PENDING: &str = "No plan is awaiting approval.";

/// Host picker used by `attach-file` when no path is given.
pub trait FilePicker: Send + Sync {
    /// `Ok(None)` when the user dismissed the picker.
    fn pick_file(&self, candidates: &[String]) -> Result<Option<String>, ChannelError>;
}

/// UI-side collaborators of a session.
#[derive(Clone)]
pub struct HostPorts {
    pub sink: Arc<dyn EventSink>,
    pub confirmer: Arc<dyn DeleteConfirmer>,
    pub presenter: Arc<dyn DiffPresenter>,
    pub picker: Arc<dyn FilePicker>,
}

/// The plan currently owned by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPlan {
    pub id: Uuid,
    pub plan: ExecutionPlan,
    pub proposed_at: DateTime<Utc>,
    /// Base of every previewed edit, by path (`None`: file was absent).
    /// Empty until a preview has been shown.
    pub reviewed_bases: BTreeMap<String, Option<String>>,
}

#[derive(Debug)]
struct SessionState {
    phase: SessionPhase,
    pending: Option<PendingPlan>,
    attachments: Vec<Attachment>,
    model: String,
    auto_apply: bool,
}

impl SessionState {
    fn transition(&mut self, next: SessionPhase) -> Result<(), SessionError> {
        if !self.phase.can_transition_to(&next) {
            return Err(SessionError::InvalidTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        tracing::info!(from = %self.phase, to = %next, "session transition");
        self.phase = next;
        Ok(())
    }

    /// Drop the pending plan and go back to Idle from wherever the flow is.
    fn reset_to_idle(&mut self) -> Result<(), SessionError> {
        self.pending = None;
        if self.phase == SessionPhase::Idle {
            return Ok(());
        }
        self.transition(SessionPhase::Idle)
    }
}

/// Holds the busy flag for the lifetime of one flow.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, SessionError> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| BusyGuard(flag))
            .map_err(|_| SessionError::Busy)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The plan orchestration state machine.
pub struct PlanSession<W: Workspace> {
    workspace: W,
    credentials: Arc<dyn CredentialProvider>,
    model: Arc<dyn LanguageModel>,
    ports: HostPorts,
    prompts: PromptBuilder,
    previews: PreviewStore,
    config: MaouConfig,
    config_path: Option<PathBuf>,
    state: Mutex<SessionState>,
    busy: AtomicBool,
    in_flight: Mutex<Option<CancelToken>>,
}

impl<W: Workspace> PlanSession<W> {
    pub fn new(
        workspace: W,
        credentials: Arc<dyn CredentialProvider>,
        model: Arc<dyn LanguageModel>,
        ports: HostPorts,
        config: MaouConfig,
    ) -> Self {
        let state = SessionState {
            phase: SessionPhase::Idle,
            pending: None,
            attachments: Vec::new(),
            model: config.default_model.clone(),
            auto_apply: config.auto_apply,
        };
        Self {
            workspace,
            credentials,
            model,
            ports,
            prompts: PromptBuilder::default(),
            previews: PreviewStore::new(config.preview_scheme.clone()),
            config,
            config_path: None,
            state: Mutex::new(state),
            busy: AtomicBool::new(false),
            in_flight: Mutex::new(None),
        }
    }

    /// Persist auto-apply toggles to this file.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_prompt_builder(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    // ── Inbound dispatch ──────────────────────────────────────────

    /// Dispatch one inbound event. Errors are also surfaced to the UI as an
    /// `Error: …` chat notice.
    pub fn handle(&self, event: InboundEvent) -> Result<(), SessionError> {
        let result = match event {
            InboundEvent::Ready => self.ready(),
            InboundEvent::Login => self.login(),
            InboundEvent::Logout => self.logout(),
            InboundEvent::Send { text } => self.handle_user_message(&text),
            InboundEvent::AttachFile { path } => self.attach_file(path.as_deref()),
            InboundEvent::AcceptPlan => self.accept_plan(),
            InboundEvent::RejectPlan => self.reject_plan(),
            InboundEvent::SelectModel { model } => self.select_model(&model),
            InboundEvent::ToggleAutoApply { enabled } => self.toggle_auto_apply(enabled),
            InboundEvent::Cancel => {
                self.cancel();
                Ok(())
            }
        };
        if let Err(e) = &result {
            tracing::warn!(error = %e, "session operation failed");
            self.notify(format!("Error: {}", e));
        }
        result
    }

    // ── Plan flow ─────────────────────────────────────────────────

    /// Turn a chat message into a plan, then auto-apply it or stage it for
    /// approval. Whitespace-only messages are ignored.
    pub fn handle_user_message(&self, text: &str) -> Result<(), SessionError> {
        if text.trim().is_empty() {
            tracing::debug!("ignoring empty message");
            return Ok(());
        }
        let _busy = BusyGuard::acquire(&self.busy)?;

        self.emit(OutboundEvent::ChatUser {
            text: text.to_string(),
        });

        let (attachments, model, superseded) = {
            let mut state = self.state();
            let mut superseded = false;
            if let Some(plan_id) = state.pending.as_ref().map(|p| p.id) {
                match self.config.pending_plan_policy {
                    PendingPlanPolicy::Refuse => {
                        tracing::info!(plan_id = %plan_id, "request refused: plan awaiting approval");
                        drop(state);
                        self.notify(MSG_REFUSED);
                        return Ok(());
                    }
                    PendingPlanPolicy::Supersede => {
                        tracing::info!(plan_id = %plan_id, "pending plan superseded");
                        state.pending = None;
                        self.previews.clear();
                        superseded = true;
                    }
                }
            }
            state.transition(SessionPhase::Thinking)?;
            (state.attachments.clone(), state.model.clone(), superseded)
        };
        if superseded {
            self.notify(MSG_SUPERSEDED);
        }
        self.notify(MSG_THINKING);

        let cancel = CancelToken::new();
        *self.lock_in_flight() = Some(cancel.clone());
        let response = self.call_model(text, &attachments, &model, &cancel);
        *self.lock_in_flight() = None;

        let response = match response {
            Ok(_) | Err(ModelError::Cancelled) if cancel.is_cancelled() => {
                tracing::info!("model response discarded after cancel");
                self.reset_to_idle()?;
                self.notify(MSG_CANCELLED);
                return Ok(());
            }
            Err(e) => {
                self.reset_to_idle()?;
                return Err(e.into());
            }
            Ok(response) => response,
        };

        let plan = match parse_plan_from_model_text(&response) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(error = %e, "model output did not contain a valid plan");
                self.reset_to_idle()?;
                self.notify(MSG_PARSE_FAILED);
                return Ok(());
            }
        };

        self.propose(plan)
    }

    /// Apply the plan awaiting approval.
    pub fn accept_plan(&self) -> Result<(), SessionError> {
        let _busy = BusyGuard::acquire(&self.busy)?;

        let pending = {
            let state = self.state();
            match (&state.pending, state.phase) {
                (Some(pending), SessionPhase::AwaitingApproval) => Some(pending.clone()),
                _ => None,
            }
        };
        let Some(pending) = pending else {
            self.notify(MSG_NO_PENDING);
            return Ok(());
        };

        self.apply_pending(
            &pending.plan,
            Some(&pending.reviewed_bases),
            MSG_PLAN_APPLIED,
        )
    }

    /// Discard the plan awaiting approval. Attachments are kept.
    pub fn reject_plan(&self) -> Result<(), SessionError> {
        let _busy = BusyGuard::acquire(&self.busy)?;

        {
            let mut state = self.state();
            if state.pending.is_none() || state.phase != SessionPhase::AwaitingApproval {
                drop(state);
                self.notify(MSG_NO_PENDING);
                return Ok(());
            }
            state.pending = None;
            state.transition(SessionPhase::Rejected)?;
            state.transition(SessionPhase::Idle)?;
        }
        self.previews.clear();
        self.notify(MSG_PLAN_REJECTED);
        Ok(())
    }

    /// Trip the cancel token of the in-flight model request, if any.
    pub fn cancel(&self) {
        match self.lock_in_flight().as_ref() {
            Some(token) => {
                tracing::info!("cancelling in-flight model request");
                token.cancel();
            }
            None => tracing::debug!("cancel with no request in flight"),
        }
    }

    fn call_model(
        &self,
        text: &str,
        attachments: &[Attachment],
        model: &str,
        cancel: &CancelToken,
    ) -> Result<String, ModelError> {
        let token = self.credentials.access_token()?;
        cancel.check()?;
        let prompt = self.prompts.build_plan_prompt(text, attachments);
        tracing::info!(
            model = %model,
            attachments = attachments.len(),
            prompt_bytes = prompt.len(),
            "requesting plan"
        );
        self.model.generate_text(model, &token, &prompt, cancel)
    }

    fn propose(&self, plan: ExecutionPlan) -> Result<(), SessionError> {
        let auto_apply = {
            let mut state = self.state();
            state.transition(SessionPhase::PlanProposed)?;
            let pending = PendingPlan {
                id: Uuid::new_v4(),
                plan: plan.clone(),
                proposed_at: Utc::now(),
                reviewed_bases: BTreeMap::new(),
            };
            tracing::info!(
                plan_id = %pending.id,
                actions = plan.actions.len(),
                deletes = plan.delete_count(),
                "plan proposed"
            );
            state.pending = Some(pending);
            state.auto_apply
        };
        self.emit(OutboundEvent::Plan { plan: plan.clone() });

        if auto_apply {
            self.state().transition(SessionPhase::AutoApplied)?;
            return self.apply_pending(&plan, None, MSG_CHANGES_APPLIED);
        }

        let prepared = match self.preview(&plan) {
            Ok(prepared) => prepared,
            Err(e) => {
                self.reset_to_idle()?;
                return Err(e);
            }
        };
        {
            let mut state = self.state();
            if let Some(pending) = state.pending.as_mut() {
                pending.reviewed_bases = prepared.base_hashes();
            }
            state.transition(SessionPhase::AwaitingApproval)?;
        }
        self.emit(OutboundEvent::PlanAwaitApproval);
        Ok(())
    }

    fn preview(&self, plan: &ExecutionPlan) -> Result<PreparedEdit, SessionError> {
        let prepared = PlanPreparer::new(&self.workspace, &self.previews).prepare(plan)?;
        DiffPreviewer::new(self.ports.presenter.as_ref(), &self.previews).preview_diffs(&prepared)?;
        Ok(prepared)
    }

    /// Prepare against the current workspace, commit, then confirm deletes.
    ///
    /// With `reviewed` bases, any file whose state differs from what the
    /// preview showed fails the whole apply before anything is written.
    fn execute(
        &self,
        plan: &ExecutionPlan,
        reviewed: Option<&BTreeMap<String, Option<String>>>,
    ) -> Result<Vec<DeleteReport>, SessionError> {
        let prepared = PlanPreparer::new(&self.workspace, &self.previews).prepare(plan)?;
        if let Some(reviewed) = reviewed {
            let stale = stale_paths(reviewed, &prepared.base_hashes());
            if !stale.is_empty() {
                return Err(SessionError::PlanStale { paths: stale });
            }
        }
        let executor = ApplyExecutor::new(&self.workspace);
        executor.apply(&prepared)?;
        Ok(executor.confirm_and_delete(&prepared.delete_paths, self.ports.confirmer.as_ref()))
    }

    fn apply_pending(
        &self,
        plan: &ExecutionPlan,
        reviewed: Option<&BTreeMap<String, Option<String>>>,
        done: &str,
    ) -> Result<(), SessionError> {
        let reports = match self.execute(plan, reviewed) {
            Ok(reports) => reports,
            Err(e) => {
                tracing::warn!(error = %e, "apply failed; pending plan discarded");
                self.reset_to_idle()?;
                return Err(e);
            }
        };

        {
            let mut state = self.state();
            state.attachments.clear();
            state.pending = None;
            state.transition(SessionPhase::Applied)?;
            state.transition(SessionPhase::Idle)?;
        }
        self.previews.clear();

        for report in &reports {
            if let DeleteOutcome::Failed(reason) = &report.outcome {
                self.notify(format!("Could not delete {}: {}", report.path, reason));
            }
        }
        self.notify(done);
        Ok(())
    }

    // ── Attachments, model, settings, auth ────────────────────────

    /// Attach a workspace file as prompt context. Without `path` the host
    /// picker chooses; a dismissed picker is a no-op.
    pub fn attach_file(&self, path: Option<&str>) -> Result<(), SessionError> {
        let _busy = BusyGuard::acquire(&self.busy)?;

        let chosen = match path {
            Some(path) => path.to_string(),
            None => {
                let candidates = self.workspace.list_files()?;
                match self.ports.picker.pick_file(&candidates)? {
                    Some(path) => path,
                    None => {
                        tracing::debug!("attachment picker dismissed");
                        return Ok(());
                    }
                }
            }
        };

        let content = self.workspace.read_text(&chosen)?;
        tracing::info!(path = %chosen, bytes = content.len(), "file attached");
        self.state()
            .attachments
            .push(Attachment::new(chosen.clone(), content));
        self.emit(OutboundEvent::Attachment { file_path: chosen });
        Ok(())
    }

    pub fn select_model(&self, model: &str) -> Result<(), SessionError> {
        if !self.config.is_known_model(model) {
            return Err(SessionError::UnknownModel(model.to_string()));
        }
        self.state().model = model.to_string();
        tracing::info!(model = %model, "model selected");
        self.emit(OutboundEvent::Model {
            model: model.to_string(),
        });
        Ok(())
    }

    /// Flip auto-apply and persist it. A failed write is logged; the session
    /// value still changes.
    pub fn toggle_auto_apply(&self, enabled: bool) -> Result<(), SessionError> {
        self.state().auto_apply = enabled;
        tracing::info!(enabled, "auto-apply toggled");

        if let Some(path) = &self.config_path {
            let on_disk = if path.exists() {
                MaouConfig::load(path)
            } else {
                Ok(self.config.clone())
            };
            let persisted = on_disk.and_then(|mut on_disk| {
                on_disk.auto_apply = enabled;
                on_disk.save(path)
            });
            if let Err(e) = persisted {
                tracing::warn!(error = %e, "could not persist auto-apply setting");
            }
        }

        self.emit(OutboundEvent::AutoApply { enabled });
        Ok(())
    }

    /// Publish the current auth state, model and auto-apply flag.
    pub fn ready(&self) -> Result<(), SessionError> {
        let (model, enabled) = {
            let state = self.state();
            (state.model.clone(), state.auto_apply)
        };
        self.emit(OutboundEvent::AuthState {
            logged_in: self.credentials.is_authenticated(),
        });
        self.emit(OutboundEvent::Model { model });
        self.emit(OutboundEvent::AutoApply { enabled });
        Ok(())
    }

    pub fn login(&self) -> Result<(), SessionError> {
        let result = self.credentials.login();
        self.emit(OutboundEvent::AuthState {
            logged_in: self.credentials.is_authenticated(),
        });
        result.map_err(SessionError::from)
    }

    pub fn logout(&self) -> Result<(), SessionError> {
        let result = self.credentials.logout();
        self.emit(OutboundEvent::AuthState {
            logged_in: self.credentials.is_authenticated(),
        });
        result.map_err(SessionError::from)
    }

    // ── Accessors ─────────────────────────────────────────────────

    pub fn phase(&self) -> SessionPhase {
        self.state().phase
    }

    pub fn pending_plan(&self) -> Option<PendingPlan> {
        self.state().pending.clone()
    }

    pub fn attachments(&self) -> Vec<Attachment> {
        self.state().attachments.clone()
    }

    pub fn model(&self) -> String {
        self.state().model.clone()
    }

    pub fn auto_apply(&self) -> bool {
        self.state().auto_apply
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn previews(&self) -> &PreviewStore {
        &self.previews
    }

    pub fn workspace(&self) -> &W {
        &self.workspace
    }

    // ── Internals ─────────────────────────────────────────────────

    /// Drop the pending plan and its previews, back to Idle.
    fn reset_to_idle(&self) -> Result<(), SessionError> {
        self.previews.clear();
        self.state().reset_to_idle()
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<CancelToken>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: OutboundEvent) {
        if let Err(e) = self.ports.sink.send(&event) {
            tracing::warn!(event = event.event_type(), error = %e, "event sink error");
        }
    }

    fn notify(&self, text: impl Into<String>) {
        self.emit(OutboundEvent::assistant(text));
    }
}

/// Paths whose current base differs from the reviewed one, sorted.
fn stale_paths(
    reviewed: &BTreeMap<String, Option<String>>,
    current: &BTreeMap<String, Option<String>>,
) -> Vec<String> {
    reviewed
        .keys()
        .chain(current.keys().filter(|path| !reviewed.contains_key(*path)))
        .filter(|path| reviewed.get(*path) != current.get(*path))
        .cloned()
        .collect()
}
