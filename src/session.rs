//! Session state and the command orchestration loop.
//!
//! A session owns the log, the task registry, the current analysis and the
//! busy flag. Handling a line is split in two so callers can keep reading
//! input while a remote call is outstanding:
//!
//! ```text
//! idle --submit(local)--> idle
//! idle --submit(remote)--> busy --settle(ok | err)--> idle
//! ```

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::analyzer::{AnalysisStatus, LLMAnalysis};
use crate::backend::Backend;
use crate::command::{Command, CommandParser, help_lines};
use crate::config::Config;
use crate::error::ClientError;
use crate::tasks::{Task, TaskDraft, TaskRegistry};

/// Version shown in the startup banner.
pub const TERMINAL_VERSION: &str = "3.1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Input,
    Output,
    System,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalLine {
    pub text: String,
    pub kind: LineKind,
    pub timestamp: DateTime<Utc>,
}

/// Append-only list of displayed lines. `clear` is the only removal and
/// bumps the epoch so renderers know to start over.
#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    lines: Vec<TerminalLine>,
    epoch: u64,
}

impl SessionLog {
    pub fn push(&mut self, text: impl Into<String>, kind: LineKind) {
        self.lines.push(TerminalLine {
            text: text.into(),
            kind,
            timestamp: Utc::now(),
        });
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.epoch += 1;
    }

    pub fn lines(&self) -> &[TerminalLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// A remote call requested by a submitted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Analyze { task: Task, model: String },
    Generate { topic: String },
}

/// Result of a `RemoteCall`, fed back through `SessionState::settle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    Analysis(Result<LLMAnalysis, ClientError>),
    Generated(Result<TaskDraft, ClientError>),
}

impl RemoteCall {
    pub async fn dispatch(&self, backend: &dyn Backend) -> RemoteOutcome {
        match self {
            RemoteCall::Analyze { task, model } => {
                RemoteOutcome::Analysis(backend.analyze(&task.prompt, model).await)
            }
            RemoteCall::Generate { topic } => RemoteOutcome::Generated(backend.generate(topic).await),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Blank input; nothing happened.
    Empty,
    /// Handled synchronously; the session stays idle.
    Completed,
    /// The session is now busy until the call is settled.
    Pending(RemoteCall),
    /// A command is already in flight; the input was dropped.
    Rejected,
}

pub struct SessionState {
    log: SessionLog,
    registry: TaskRegistry,
    analysis: Option<LLMAnalysis>,
    busy: bool,
    parser: CommandParser,
    environment: Vec<String>,
    breakthroughs: usize,
}

impl SessionState {
    /// `environment` holds the `KEY=value` lines shown by `env`.
    pub fn new(config: &Config, environment: Vec<String>) -> Self {
        let registry = if config.session.seed_tasks {
            TaskRegistry::seeded()
        } else {
            TaskRegistry::new()
        };
        let mut lines = vec!["ACTIVE_AGENT=terminus".to_string()];
        lines.extend(environment);

        Self {
            log: SessionLog::default(),
            registry,
            analysis: None,
            busy: false,
            parser: CommandParser::with_defaults(
                config.provider.analysis_model.clone(),
                config.session.default_topic.clone(),
            ),
            environment: lines,
            breakthroughs: 0,
        }
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn analysis(&self) -> Option<&LLMAnalysis> {
        self.analysis.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn breakthroughs(&self) -> usize {
        self.breakthroughs
    }

    /// Drop the current analysis.
    pub fn clear_analysis(&mut self) {
        self.analysis = None;
    }

    /// Lines shown when an interactive session opens.
    pub fn open_banner(&mut self) {
        self.log.push(
            format!("PROJECT TERMINUS [Version {}]", TERMINAL_VERSION),
            LineKind::System,
        );
        self.log
            .push("Initializing environment variables...", LineKind::System);
        for line in self.environment.iter().skip(1) {
            self.log.push(format!("export {}", line), LineKind::System);
        }
        self.log.push(
            "Ready for input. Type \"help\" for available commands.",
            LineKind::Success,
        );
    }

    /// Accept one input line.
    pub fn submit(&mut self, input: &str) -> Submission {
        let input = input.trim();
        if input.is_empty() {
            return Submission::Empty;
        }
        if self.busy {
            info!("Command rejected while busy: {}", input);
            return Submission::Rejected;
        }

        self.log.push(input, LineKind::Input);

        let command = match self.parser.parse(input) {
            Ok(command) => command,
            Err(e) => {
                self.log.push(format!("Error: {}", e), LineKind::Error);
                return Submission::Completed;
            }
        };

        debug!("Parsed {:?} (remote: {})", command, command.is_remote());
        match self.handle(command, input) {
            Some(call) => {
                self.busy = true;
                Submission::Pending(call)
            }
            None => Submission::Completed,
        }
    }

    fn handle(&mut self, command: Command, input: &str) -> Option<RemoteCall> {
        match command {
            Command::Help => {
                for line in help_lines() {
                    self.log.push(line, LineKind::Output);
                }
            }
            Command::Clear => self.log.clear(),
            Command::ListTasks => {
                self.log.push("Adversarial Repository:", LineKind::Success);
                for task in self.registry.tasks() {
                    self.log.push(
                        format!("[{}] {} ({})", task.id, task.title, task.difficulty),
                        LineKind::Output,
                    );
                }
            }
            Command::ShowTask { id } => match self.registry.get(&id) {
                Some(task) => {
                    let task = task.clone();
                    self.log.push(
                        format!("--- TASK {}: {} ---", task.id, task.title),
                        LineKind::Success,
                    );
                    self.log
                        .push(format!("Difficulty: {}", task.difficulty), LineKind::Output);
                    self.log
                        .push(format!("Language: {}", task.language), LineKind::Output);
                    self.log
                        .push(format!("Description: {}", task.description), LineKind::Output);
                    self.log.push(format!("Prompt: {}", task.prompt), LineKind::System);
                }
                None => self.task_not_found(&id),
            },
            Command::Env => {
                for line in &self.environment {
                    self.log.push(line.clone(), LineKind::Output);
                }
            }
            Command::Run { task_id, model } => {
                let Some(task) = self.registry.get(&task_id).cloned() else {
                    self.task_not_found(&task_id);
                    return None;
                };
                self.log.push(
                    format!("Initiating Terminus Agent on {}...", model),
                    LineKind::System,
                );
                self.log
                    .push(format!("Injecting payload: {}", task.title), LineKind::System);
                return Some(RemoteCall::Analyze { task, model });
            }
            Command::CreateTask { topic } => {
                self.log.push(
                    format!("Synthesizing new adversarial task for: {}...", topic),
                    LineKind::System,
                );
                return Some(RemoteCall::Generate { topic });
            }
            Command::Unknown => self.log.push(
                format!(
                    "Command not recognized: {}. Type 'help' for assistance.",
                    input
                ),
                LineKind::Error,
            ),
        }
        None
    }

    fn task_not_found(&mut self, id: &str) {
        self.log
            .push(format!("Error: Task {} not found.", id), LineKind::Error);
    }

    /// Apply the outcome of the outstanding remote call and return to idle.
    pub fn settle(&mut self, outcome: RemoteOutcome) {
        if !self.busy {
            warn!("Settling a remote call while idle");
        }
        self.busy = false;

        match outcome {
            RemoteOutcome::Analysis(Ok(analysis)) => {
                self.log.push("Analysis complete.", LineKind::Success);
                match analysis.status {
                    AnalysisStatus::Breakthrough => {
                        self.breakthroughs += 1;
                        self.log
                            .push("--- [BREAKTHROUGH DETECTED] ---", LineKind::Success);
                        self.log.push(
                            format!("Failure Mode: {}", analysis.failure_point),
                            LineKind::Output,
                        );
                    }
                    AnalysisStatus::Success => {
                        self.log.push("--- [TASK SOLVED] ---", LineKind::Error);
                        self.log.push(
                            "Warning: Current LLM handled this correctly.",
                            LineKind::Error,
                        );
                    }
                }
                self.analysis = Some(analysis);
            }
            RemoteOutcome::Analysis(Err(e)) => {
                self.log.push(format!("ERROR: {}", e), LineKind::Error);
            }
            RemoteOutcome::Generated(Ok(draft)) => {
                let task = self.registry.register(draft);
                info!("Registered generated task {}", task.id);
                let line = format!(
                    "New task [{}] \"{}\" registered to repository.",
                    task.id, task.title
                );
                self.log.push(line, LineKind::Success);
            }
            RemoteOutcome::Generated(Err(e)) => {
                self.log
                    .push(format!("Synthesis failed: {}", e), LineKind::Error);
            }
        }
    }

    /// Submit a line and, if it needs one, perform the remote call before
    /// returning. The session is idle again when this returns.
    pub async fn run_line(&mut self, backend: &dyn Backend, input: &str) -> Submission {
        let submission = self.submit(input);
        if let Submission::Pending(call) = &submission {
            let outcome = call.dispatch(backend).await;
            self.settle(outcome);
        }
        submission
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Backend answering from a queue of scripted replies.
    #[derive(Default)]
    struct ScriptedBackend {
        analyses: Mutex<VecDeque<Result<LLMAnalysis, ClientError>>>,
        drafts: Mutex<VecDeque<Result<TaskDraft, ClientError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn with_analysis(self, reply: Result<LLMAnalysis, ClientError>) -> Self {
            self.analyses.lock().unwrap().push_back(reply);
            self
        }

        fn with_draft(self, reply: Result<TaskDraft, ClientError>) -> Self {
            self.drafts.lock().unwrap().push_back(reply);
            self
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        async fn analyze(&self, task_prompt: &str, model: &str) -> Result<LLMAnalysis, ClientError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("analyze {} {}", model, task_prompt));
            self.analyses
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected analyze call")
        }

        async fn generate(&self, topic: &str) -> Result<TaskDraft, ClientError> {
            self.calls.lock().unwrap().push(format!("generate {}", topic));
            self.drafts
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected generate call")
        }

        fn environment(&self) -> Vec<String> {
            vec!["MODEL_ENDPOINT=scripted".to_string()]
        }
    }

    fn session() -> SessionState {
        SessionState::new(&Config::default(), vec!["MODEL_ENDPOINT=scripted".to_string()])
    }

    fn analysis(status: AnalysisStatus) -> LLMAnalysis {
        LLMAnalysis {
            model: "gpt-4o".to_string(),
            reasoning: "step 1".to_string(),
            code_output: "print(1)".to_string(),
            failure_point: "forgot the lock".to_string(),
            status,
        }
    }

    fn draft(title: &str) -> TaskDraft {
        TaskDraft {
            title: title.to_string(),
            description: "desc".to_string(),
            difficulty: "EXTREME".to_string(),
            language: "Python".to_string(),
            prompt: "prompt".to_string(),
        }
    }

    fn texts(state: &SessionState) -> Vec<&str> {
        state.log().lines().iter().map(|l| l.text.as_str()).collect()
    }

    fn errors(state: &SessionState) -> Vec<&str> {
        state
            .log()
            .lines()
            .iter()
            .filter(|l| l.kind == LineKind::Error)
            .map(|l| l.text.as_str())
            .collect()
    }

    #[test]
    fn test_input_is_always_logged_first() {
        let mut state = session();
        assert_eq!(state.submit("  frobnicate now "), Submission::Completed);
        let lines = state.log().lines();
        assert_eq!(lines[0].kind, LineKind::Input);
        assert_eq!(lines[0].text, "frobnicate now");
        assert_eq!(
            lines[1].text,
            "Command not recognized: frobnicate now. Type 'help' for assistance."
        );
        assert_eq!(lines[1].kind, LineKind::Error);
    }

    #[test]
    fn test_blank_input_is_ignored() {
        let mut state = session();
        assert_eq!(state.submit("   "), Submission::Empty);
        assert_eq!(state.log().len(), 0);
    }

    #[test]
    fn test_help_and_env() {
        let mut state = session();
        state.submit("help");
        assert_eq!(texts(&state)[1], "Available Commands:");

        state.submit("env");
        let lines = texts(&state);
        let env_start = lines.iter().position(|l| *l == "env").unwrap();
        assert_eq!(
            &lines[env_start + 1..],
            &["ACTIVE_AGENT=terminus", "MODEL_ENDPOINT=scripted"]
        );
    }

    #[test]
    fn test_ls_and_cat() {
        let mut state = session();
        state.submit("ls tasks");
        let lines = texts(&state);
        assert_eq!(lines[1], "Adversarial Repository:");
        assert_eq!(lines[2], "[101] Docker-in-Docker Recursion (HARD)");

        state.submit("cat task 102");
        let lines = texts(&state);
        assert!(lines.contains(&"--- TASK 102: Python Metaclass Injection ---"));
        assert!(lines.contains(&"Difficulty: EXTREME"));
        assert!(lines.contains(&"Language: Python"));
    }

    #[test]
    fn test_cat_unknown_task() {
        let mut state = session();
        let before = state.registry().len();
        assert_eq!(state.submit("cat task 999"), Submission::Completed);
        assert_eq!(errors(&state), vec!["Error: Task 999 not found."]);
        assert_eq!(state.registry().len(), before);
        assert!(!state.is_busy());
    }

    #[test]
    fn test_clear_empties_log() {
        let mut state = session();
        state.open_banner();
        state.submit("help");
        state.submit("ls tasks");
        let epoch = state.log().epoch();
        state.submit("clear");
        assert_eq!(state.log().len(), 0);
        assert_eq!(state.log().epoch(), epoch + 1);
    }

    #[test]
    fn test_run_without_task_id_issues_no_call() {
        let mut state = session();
        assert_eq!(state.submit("tb run"), Submission::Completed);
        assert_eq!(errors(&state), vec!["Error: Missing required argument --task-id"]);
        assert!(!state.is_busy());
    }

    #[test]
    fn test_run_unknown_task_issues_no_call() {
        let mut state = session();
        assert_eq!(state.submit("tb run --task-id 4242"), Submission::Completed);
        assert_eq!(errors(&state), vec!["Error: Task 4242 not found."]);
        assert!(!state.is_busy());
    }

    #[test]
    fn test_run_enters_busy_with_default_model() {
        let mut state = session();
        let submission = state.submit("tb run --task-id 101");
        match submission {
            Submission::Pending(RemoteCall::Analyze { task, model }) => {
                assert_eq!(task.id, "101");
                assert_eq!(model, "gpt-4o");
            }
            other => panic!("unexpected submission: {:?}", other),
        }
        assert!(state.is_busy());
        let lines = texts(&state);
        assert_eq!(lines[1], "Initiating Terminus Agent on gpt-4o...");
        assert_eq!(lines[2], "Injecting payload: Docker-in-Docker Recursion");
    }

    #[test]
    fn test_busy_gate_rejects_second_command() {
        let mut state = session();
        assert!(matches!(
            state.submit("tb run --task-id 101"),
            Submission::Pending(_)
        ));
        let logged = state.log().len();

        assert_eq!(state.submit("tb task create Rust"), Submission::Rejected);
        assert_eq!(state.submit("ls tasks"), Submission::Rejected);
        assert_eq!(state.log().len(), logged);

        state.settle(RemoteOutcome::Analysis(Ok(analysis(AnalysisStatus::Success))));
        assert!(!state.is_busy());
        assert!(matches!(
            state.submit("tb task create Rust"),
            Submission::Pending(RemoteCall::Generate { .. })
        ));
    }

    #[tokio::test]
    async fn test_breakthrough_analysis() {
        let backend =
            ScriptedBackend::default().with_analysis(Ok(analysis(AnalysisStatus::Breakthrough)));
        let mut state = session();

        state
            .run_line(&backend, "tb run --task-id 102 --model gpt-4o-mini")
            .await;

        assert!(!state.is_busy());
        assert_eq!(backend.call_count(), 1);
        assert!(backend.calls.lock().unwrap()[0].starts_with("analyze gpt-4o-mini Design a system"));
        let lines = texts(&state);
        assert!(lines.ends_with(&[
            "Analysis complete.",
            "--- [BREAKTHROUGH DETECTED] ---",
            "Failure Mode: forgot the lock",
        ]));
        assert_eq!(state.analysis().map(|a| a.status), Some(AnalysisStatus::Breakthrough));
        assert_eq!(state.breakthroughs(), 1);
    }

    #[tokio::test]
    async fn test_solved_analysis_replaces_previous() {
        let backend = ScriptedBackend::default()
            .with_analysis(Ok(analysis(AnalysisStatus::Breakthrough)))
            .with_analysis(Ok(analysis(AnalysisStatus::Success)));
        let mut state = session();

        state.run_line(&backend, "tb run --task-id 101").await;
        state.run_line(&backend, "tb run --task-id 101").await;

        assert_eq!(state.analysis().map(|a| a.status), Some(AnalysisStatus::Success));
        assert!(texts(&state).ends_with(&[
            "Analysis complete.",
            "--- [TASK SOLVED] ---",
            "Warning: Current LLM handled this correctly.",
        ]));

        state.clear_analysis();
        assert!(state.analysis().is_none());
    }

    #[tokio::test]
    async fn test_failed_analysis_returns_to_idle() {
        let backend = ScriptedBackend::default().with_analysis(Err(ClientError::Malformed(
            "expected value at line 1 column 1".to_string(),
        )));
        let mut state = session();

        state.run_line(&backend, "tb run --task-id 101").await;

        assert!(!state.is_busy());
        assert!(state.analysis().is_none());
        assert_eq!(
            errors(&state),
            vec!["ERROR: Failed to parse response: expected value at line 1 column 1"]
        );
    }

    #[tokio::test]
    async fn test_failed_analysis_keeps_previous_analysis() {
        let backend = ScriptedBackend::default()
            .with_analysis(Ok(analysis(AnalysisStatus::Breakthrough)))
            .with_analysis(Err(ClientError::EmptyBody));
        let mut state = session();

        state.run_line(&backend, "tb run --task-id 101").await;
        state.run_line(&backend, "tb run --task-id 102").await;

        assert_eq!(state.analysis().map(|a| a.status), Some(AnalysisStatus::Breakthrough));
        assert_eq!(errors(&state), vec!["ERROR: Empty response from model"]);
    }

    #[tokio::test]
    async fn test_generated_task_is_listed() {
        let backend = ScriptedBackend::default().with_draft(Ok(draft("Signal Storm")));
        let mut state = session();
        let existing: Vec<String> = state.registry().tasks().iter().map(|t| t.id.clone()).collect();

        state.run_line(&backend, "tb task create signal handling").await;
        assert!(!state.is_busy());
        assert_eq!(backend.calls.lock().unwrap()[0], "generate signal handling");

        let created = state.registry().tasks().last().unwrap().clone();
        assert_eq!(created.title, "Signal Storm");
        assert!(!existing.contains(&created.id));
        assert_eq!(
            texts(&state).last().copied(),
            Some(format!("New task [{}] \"Signal Storm\" registered to repository.", created.id).as_str())
        );

        state.submit("ls tasks");
        let listing = format!("[{}] Signal Storm (EXTREME)", created.id);
        assert!(texts(&state).contains(&listing.as_str()));
    }

    #[tokio::test]
    async fn test_create_uses_default_topic() {
        let backend = ScriptedBackend::default().with_draft(Ok(draft("Cloudy")));
        let mut state = session();
        state.run_line(&backend, "tb task create").await;
        assert_eq!(backend.calls.lock().unwrap()[0], "generate Cloud Infrastructure");
        assert!(texts(&state).contains(&"Synthesizing new adversarial task for: Cloud Infrastructure..."));
    }

    #[tokio::test]
    async fn test_malformed_generation_leaves_registry_alone() {
        let backend = ScriptedBackend::default()
            .with_draft(Err(ClientError::NotJson("I cannot do that".to_string())));
        let mut state = session();
        let before = state.registry().len();

        state.run_line(&backend, "tb task create anything").await;

        assert!(!state.is_busy());
        assert_eq!(state.registry().len(), before);
        assert!(state.analysis().is_none());
        assert_eq!(
            errors(&state),
            vec!["Synthesis failed: Response is not a JSON object: I cannot do that"]
        );
    }

    #[tokio::test]
    async fn test_local_commands_never_call_backend() {
        let backend = ScriptedBackend::default();
        let mut state = session();
        for line in ["help", "env", "ls tasks", "cat task 101", "clear", "nope", "tb run"] {
            assert_eq!(state.run_line(&backend, line).await, Submission::Completed);
            assert!(!state.is_busy());
        }
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn test_banner() {
        let mut state = session();
        state.open_banner();
        let lines = texts(&state);
        assert_eq!(lines[0], "PROJECT TERMINUS [Version 3.1.0]");
        assert_eq!(lines[2], "export MODEL_ENDPOINT=scripted");
        assert_eq!(state.log().lines().last().unwrap().kind, LineKind::Success);
    }
}
