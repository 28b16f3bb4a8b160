//! # maou-cli
//!
//! Terminal host for the Maou plan session.
//!
//! Two front ends over the same session:
//! - chat REPL (default) — plain lines are requests, `/commands` drive the rest
//! - `--json` — JSON-lines events on stdin/stdout, for editor integrations
//!
//! Diffs and prompts go to stderr in both modes so stdout carries only the
//! event stream.

mod credentials;
mod gemini;
mod repl;

use std::fs::OpenOptions;
use std::io::{self, BufRead, Read};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use maou_session::{
    EventDispatcher, EventSink, HostPorts, InboundEvent, JsonLinesSink, MaouConfig, PlanSession,
    TerminalChannel,
};
use maou_workspace::{LocalWorkspace, TextDiffPresenter};

use crate::credentials::TokenCredentials;
use crate::gemini::HttpModel;
use crate::repl::{ReplCommand, TextSink};

/// Maou — turn chat requests into reviewed file-change plans.
#[derive(Parser)]
#[command(name = "maou", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    /// Run without a workspace folder; plans that touch files will fail.
    #[arg(long)]
    detached: bool,

    /// Speak the JSON-lines event protocol instead of the chat REPL.
    #[arg(long)]
    json: bool,

    /// Model to start with (must be one of the configured models).
    #[arg(long)]
    model: Option<String>,

    /// Apply plans without review for this run.
    #[arg(long)]
    auto_apply: bool,

    /// Append every outbound event as JSON to this file.
    #[arg(long)]
    event_log: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("maou_plan=info".parse()?)
                .add_directive("maou_session=info".parse()?)
                .add_directive("maou_workspace=info".parse()?)
                .add_directive("maou_cli=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();

    let (workspace, mut config, config_path) = if cli.detached {
        (LocalWorkspace::detached(), MaouConfig::default(), None)
    } else {
        let root = cli.project_root.canonicalize().with_context(|| {
            format!("project root {} not found", cli.project_root.display())
        })?;
        let config = MaouConfig::for_project(&root)?;
        let workspace = LocalWorkspace::new(&root)
            .with_trash_dir(config.trash_dir.clone())
            .with_excludes(config.attach_exclude.as_slice());
        (workspace, config, Some(MaouConfig::path_for_project(&root)))
    };
    if cli.auto_apply {
        config.auto_apply = true;
    }

    let credentials = Arc::new(TokenCredentials::from_env());
    let model = Arc::new(HttpModel::new(config.model_endpoint.clone())?);

    // One reader thread owns stdin. Cancel lines are acted on immediately;
    // everything else is queued for the main loop or a pending prompt.
    let (tx, rx) = mpsc::channel::<String>();
    let lines = Arc::new(Mutex::new(rx));
    let terminal = Arc::new(TerminalChannel::new(
        Box::new(LineFeed::new(lines.clone())),
        Box::new(io::stderr()),
    ));

    let mut dispatcher = EventDispatcher::new();
    if cli.json {
        dispatcher.add_sink(Box::new(JsonLinesSink::stdout()));
    } else {
        dispatcher.add_sink(Box::new(TextSink::stdout()));
    }
    if let Some(path) = &cli.event_log {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("cannot open event log {}", path.display()))?;
        dispatcher.add_sink(Box::new(JsonLinesSink::new(Box::new(file))));
    }
    let sink: Arc<dyn EventSink> = Arc::new(dispatcher);

    let ports = HostPorts {
        sink,
        confirmer: terminal.clone(),
        presenter: Arc::new(TextDiffPresenter::stderr()),
        picker: terminal,
    };
    let mut session = PlanSession::new(workspace, credentials, model, ports, config);
    if let Some(path) = config_path {
        session = session.with_config_path(path);
    }
    let session = Arc::new(session);

    {
        let session = session.clone();
        let json = cli.json;
        thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if repl::is_cancel(&line, json) {
                    session.cancel();
                    continue;
                }
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    }

    if !cli.json {
        eprintln!("{}", repl::HELP);
    }
    dispatch(&session, InboundEvent::Ready);
    if let Some(model) = &cli.model {
        dispatch(&session, InboundEvent::SelectModel { model: model.clone() });
    }

    loop {
        let next = match lines.lock() {
            Ok(rx) => rx.recv(),
            Err(_) => break,
        };
        let Ok(line) = next else { break };

        let event = if cli.json {
            match serde_json::from_str::<InboundEvent>(&line) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring malformed event");
                    continue;
                }
            }
        } else {
            match repl::parse_line(&line) {
                Some(ReplCommand::Event(event)) => event,
                Some(ReplCommand::Help) => {
                    eprintln!("{}", repl::HELP);
                    continue;
                }
                Some(ReplCommand::Quit) => break,
                None => continue,
            }
        };
        dispatch(&session, event);
    }

    tracing::debug!("input closed, exiting");
    Ok(())
}

/// The session reports failures to the user itself; here they are only logged.
fn dispatch(session: &PlanSession<LocalWorkspace>, event: InboundEvent) {
    let event_type = format!("{:?}", event);
    if let Err(e) = session.handle(event) {
        tracing::debug!(event = %event_type, error = %e, "event failed");
    }
}

/// `Read` over queued input lines, so terminal prompts share stdin with the
/// main loop.
struct LineFeed {
    lines: Arc<Mutex<Receiver<String>>>,
    pending: Vec<u8>,
    pos: usize,
}

impl LineFeed {
    fn new(lines: Arc<Mutex<Receiver<String>>>) -> Self {
        Self {
            lines,
            pending: Vec::new(),
            pos: 0,
        }
    }
}

impl Read for LineFeed {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.pending.len() {
            let next = {
                let rx = self
                    .lines
                    .lock()
                    .map_err(|_| io::Error::other("input queue poisoned"))?;
                rx.recv()
            };
            match next {
                Ok(line) => {
                    self.pending = format!("{}\n", line).into_bytes();
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
