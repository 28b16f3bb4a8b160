// common/mod.rs — In-memory collaborators shared by the session tests.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use maou_session::{
    CancelToken, CredentialProvider, EventSink, FilePicker, HostPorts, LanguageModel, MaouConfig,
    ModelError, OutboundEvent, PlanSession, SessionError,
};
use maou_workspace::{
    ChannelError, DeleteConfirmer, DiffPresenter, DiffView, LocalWorkspace, WorkspaceError,
};

pub struct FakeCredentials {
    pub logged_in: AtomicBool,
}

impl FakeCredentials {
    pub fn logged_in() -> Arc<Self> {
        Arc::new(Self {
            logged_in: AtomicBool::new(true),
        })
    }

    pub fn logged_out() -> Arc<Self> {
        Arc::new(Self {
            logged_in: AtomicBool::new(false),
        })
    }
}

impl CredentialProvider for FakeCredentials {
    fn is_authenticated(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }
    fn access_token(&self) -> Result<String, ModelError> {
        if self.is_authenticated() {
            Ok("token".into())
        } else {
            Err(ModelError::AuthRequired)
        }
    }
    fn login(&self) -> Result<(), ModelError> {
        self.logged_in.store(true, Ordering::SeqCst);
        Ok(())
    }
    fn logout(&self) -> Result<(), ModelError> {
        self.logged_in.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Returns canned responses in order and records every prompt.
#[derive(Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String, ModelError>>>,
    pub prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedModel {
    pub fn replying(responses: &[&str]) -> Arc<Self> {
        let model = Self::default();
        for r in responses {
            model.push(Ok(r.to_string()));
        }
        Arc::new(model)
    }

    pub fn push(&self, response: Result<String, ModelError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().unwrap().1.clone()
    }
}

impl LanguageModel for ScriptedModel {
    fn generate_text(
        &self,
        model: &str,
        _access_token: &str,
        prompt: &str,
        _cancel: &CancelToken,
    ) -> Result<String, ModelError> {
        self.prompts
            .lock()
            .unwrap()
            .push((model.to_string(), prompt.to_string()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Transport("no scripted response".into())))
    }
}

/// Blocks inside `generate_text` until the test releases it.
pub struct GatedModel {
    pub entered: Barrier,
    pub release: Barrier,
    pub response: String,
}

impl GatedModel {
    pub fn new(response: &str) -> Arc<Self> {
        Arc::new(Self {
            entered: Barrier::new(2),
            release: Barrier::new(2),
            response: response.to_string(),
        })
    }
}

impl LanguageModel for GatedModel {
    fn generate_text(
        &self,
        _model: &str,
        _access_token: &str,
        _prompt: &str,
        _cancel: &CancelToken,
    ) -> Result<String, ModelError> {
        self.entered.wait();
        self.release.wait();
        Ok(self.response.clone())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<OutboundEvent>>,
}

impl RecordingSink {
    pub fn assistant_texts(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                OutboundEvent::ChatAssistant { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl EventSink for RecordingSink {
    fn send(&self, event: &OutboundEvent) -> Result<(), SessionError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Confirms exactly the listed paths and records every question.
#[derive(Default)]
pub struct ListConfirmer {
    pub allow: HashSet<String>,
    pub asked: Mutex<Vec<String>>,
}

impl ListConfirmer {
    pub fn allowing(paths: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            allow: paths.iter().map(|p| p.to_string()).collect(),
            asked: Mutex::new(Vec::new()),
        })
    }
}

impl DeleteConfirmer for ListConfirmer {
    fn confirm_delete(&self, path: &str) -> Result<bool, ChannelError> {
        self.asked.lock().unwrap().push(path.to_string());
        Ok(self.allow.contains(path))
    }
}

#[derive(Default)]
pub struct CountingPresenter {
    pub shown: AtomicUsize,
    pub titles: Mutex<Vec<String>>,
}

impl DiffPresenter for CountingPresenter {
    fn show_diff(&self, view: &DiffView) -> Result<(), WorkspaceError> {
        self.shown.fetch_add(1, Ordering::SeqCst);
        self.titles.lock().unwrap().push(view.title.clone());
        Ok(())
    }
}

pub struct FixedPicker(pub Option<String>);

impl FilePicker for FixedPicker {
    fn pick_file(&self, candidates: &[String]) -> Result<Option<String>, ChannelError> {
        Ok(self.0.clone().filter(|p| candidates.contains(p)))
    }
}

pub struct Harness {
    pub session: PlanSession<LocalWorkspace>,
    pub sink: Arc<RecordingSink>,
    pub presenter: Arc<CountingPresenter>,
    pub confirmer: Arc<ListConfirmer>,
}

pub fn harness(
    root: &Path,
    model: Arc<dyn LanguageModel>,
    config: MaouConfig,
    confirmer: Arc<ListConfirmer>,
    picker: Option<&str>,
) -> Harness {
    let sink = Arc::new(RecordingSink::default());
    let presenter = Arc::new(CountingPresenter::default());
    let ports = HostPorts {
        sink: sink.clone(),
        confirmer: confirmer.clone(),
        presenter: presenter.clone(),
        picker: Arc::new(FixedPicker(picker.map(str::to_string))),
    };
    let workspace = LocalWorkspace::new(root)
        .with_trash_dir(config.trash_dir.clone())
        .with_excludes(config.attach_exclude.as_slice());
    let session = PlanSession::new(
        workspace,
        FakeCredentials::logged_in(),
        model,
        ports,
        config,
    );
    Harness {
        session,
        sink,
        presenter,
        confirmer,
    }
}

pub fn manual_config() -> MaouConfig {
    MaouConfig::default()
}

pub fn auto_config() -> MaouConfig {
    MaouConfig {
        auto_apply: true,
        ..MaouConfig::default()
    }
}

pub fn fenced(plan_json: &str) -> String {
    format!("Here is the plan:\n```json\n{}\n```\nDone.", plan_json)
}
