use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use colored::*;
use crossterm::{
    cursor::MoveTo,
    execute,
    terminal::{Clear, ClearType},
};
use futures::future::BoxFuture;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::analyzer::{AnalysisStatus, LLMAnalysis};
use crate::backend::Backend;
use crate::config::UIConfig;
use crate::session::{LineKind, RemoteOutcome, SessionLog, SessionState, Submission, TerminalLine};

/// Prints session log lines incrementally.
pub struct Renderer {
    colorful: bool,
    timestamps: bool,
    /// Print `input` lines. Off in the interactive shell, where the terminal
    /// already echoed what the user typed.
    echo_input: bool,
    epoch: u64,
    shown: usize,
}

impl Renderer {
    pub fn new(ui: &UIConfig, echo_input: bool) -> Self {
        Self {
            colorful: ui.colorful,
            timestamps: ui.timestamps,
            echo_input,
            epoch: 0,
            shown: 0,
        }
    }

    /// Lines added since the last call, formatted for display. Returns
    /// `true` as the first element when the log was cleared in between.
    pub fn pending(&mut self, log: &SessionLog) -> (bool, Vec<String>) {
        let cleared = log.epoch() != self.epoch;
        if cleared {
            self.epoch = log.epoch();
            self.shown = 0;
        }
        let fresh = log.lines()[self.shown.min(log.len())..]
            .iter()
            .filter(|line| self.echo_input || line.kind != LineKind::Input)
            .map(|line| self.format_line(line))
            .collect();
        self.shown = log.len();
        (cleared, fresh)
    }

    pub fn format_line(&self, line: &TerminalLine) -> String {
        let text = match line.kind {
            LineKind::Input => format!("$ {}", line.text),
            _ => line.text.clone(),
        };
        let text = if self.colorful {
            match line.kind {
                LineKind::Input => format!("{} {}", "$".magenta(), line.text.white()),
                LineKind::Output => text.green().to_string(),
                LineKind::System => text.yellow().to_string(),
                LineKind::Success => text.bright_cyan().bold().to_string(),
                LineKind::Error => text.red().to_string(),
            }
        } else {
            text
        };

        if self.timestamps {
            let time = line.timestamp.with_timezone(&Local).format("%H:%M:%S");
            format!("[{}] {}", time, text)
        } else {
            text
        }
    }

    /// Print pending lines, clearing the screen first if the log was reset.
    pub fn flush(&mut self, state: &SessionState, clear_screen: bool) -> Result<()> {
        let (cleared, lines) = self.pending(state.log());
        let mut stdout = io::stdout();
        if cleared && clear_screen {
            execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;
        }
        for line in lines {
            writeln!(stdout, "{}", line)?;
        }
        stdout.flush()?;
        Ok(())
    }
}

/// The inspector panel for an analysis: target model, a preview of the
/// reasoning trace, the failure point and the generated code.
pub fn inspector_lines(analysis: &LLMAnalysis, preview_chars: usize) -> Vec<String> {
    let mut reasoning: String = analysis.reasoning.chars().take(preview_chars).collect();
    if analysis.reasoning.chars().count() > preview_chars {
        reasoning.push_str("...");
    }

    let mut lines = vec![
        "=== INSPECTOR ===".to_string(),
        format!("Target Model:   {}", analysis.model),
        format!("Verdict:        {}", analysis.status),
        format!("Reasoning:      \"{}\"", reasoning),
        format!("Failure Point:  {}", analysis.failure_point),
    ];
    if !analysis.code_output.trim().is_empty() {
        lines.push("--- LLM_GENERATED_CODE ---".to_string());
        lines.extend(analysis.code_output.lines().map(|l| format!("  {}", l)));
    }
    lines
}

/// Interactive session on stdin/stdout.
pub struct Shell {
    state: SessionState,
    backend: Arc<dyn Backend>,
    renderer: Renderer,
    ui: UIConfig,
    headless: bool,
}

type PendingCall = BoxFuture<'static, RemoteOutcome>;

impl Shell {
    pub fn new(state: SessionState, backend: Arc<dyn Backend>, ui: UIConfig, headless: bool) -> Self {
        Self {
            state,
            renderer: Renderer::new(&ui, false),
            backend,
            ui,
            headless,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        if !self.headless {
            execute!(io::stdout(), Clear(ClearType::All), MoveTo(0, 0))?;
            println!("{}", "=".repeat(60).bright_green());
            println!("{}", "Terminus Terminal".bright_white().bold());
            println!("{}", "=".repeat(60).bright_green());
            self.state.open_banner();
        }

        let mut input = BufReader::new(tokio::io::stdin()).lines();
        let mut pending: Option<PendingCall> = None;
        let mut spinner: Option<ProgressBar> = None;

        loop {
            self.renderer.flush(&self.state, !self.headless)?;
            if pending.is_none() {
                self.prompt()?;
            }

            tokio::select! {
                outcome = async {
                    match pending.as_mut() {
                        Some(call) => call.await,
                        None => std::future::pending().await,
                    }
                }, if pending.is_some() => {
                    pending = None;
                    self.finish_call(outcome, spinner.take())?;
                }
                line = input.next_line() => {
                    let Some(line) = line? else {
                        debug!("stdin closed");
                        // No cancellation: let the outstanding call settle first.
                        if let Some(call) = pending.take() {
                            let outcome = call.await;
                            self.finish_call(outcome, spinner.take())?;
                        }
                        break;
                    };
                    let line = line.trim();

                    if let Some(meta) = line.strip_prefix(':') {
                        if !self.meta_command(meta) {
                            break;
                        }
                        continue;
                    }

                    match self.state.submit(line) {
                        Submission::Pending(call) => {
                            let backend = self.backend.clone();
                            pending = Some(Box::pin(async move { call.dispatch(backend.as_ref()).await }));
                            spinner = self.start_spinner();
                        }
                        Submission::Rejected => self.notice("Executing… command ignored until the current one finishes."),
                        Submission::Completed | Submission::Empty => {}
                    }
                }
            }
        }

        if let Some(bar) = spinner.take() {
            bar.finish_and_clear();
        }
        self.renderer.flush(&self.state, false)?;
        Ok(())
    }

    fn finish_call(&mut self, outcome: RemoteOutcome, spinner: Option<ProgressBar>) -> Result<()> {
        if let Some(bar) = spinner {
            bar.finish_and_clear();
        }
        let analysed = matches!(outcome, RemoteOutcome::Analysis(Ok(_)));
        self.state.settle(outcome);
        if analysed {
            self.renderer.flush(&self.state, !self.headless)?;
            self.show_inspector();
        }
        Ok(())
    }

    fn prompt(&self) -> Result<()> {
        let mut stdout = io::stdout();
        if self.ui.colorful {
            write!(stdout, "{} ", "$".magenta().bold())?;
        } else {
            write!(stdout, "$ ")?;
        }
        stdout.flush()?;
        Ok(())
    }

    fn start_spinner(&self) -> Option<ProgressBar> {
        if self.headless {
            return None;
        }
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            bar.set_style(style);
        }
        bar.set_message("Processing agent...");
        bar.enable_steady_tick(Duration::from_millis(120));
        Some(bar)
    }

    fn notice(&self, message: &str) {
        if self.ui.colorful {
            println!("{}", message.dimmed());
        } else {
            println!("{}", message);
        }
    }

    fn show_inspector(&self) {
        let Some(analysis) = self.state.analysis() else {
            self.notice("No analysis loaded. Run 'tb run --task-id 101' to test.");
            return;
        };
        for line in inspector_lines(analysis, self.ui.inspector_preview_chars) {
            if self.ui.colorful {
                let colored = match analysis.status {
                    AnalysisStatus::Breakthrough => line.bright_yellow(),
                    AnalysisStatus::Success => line.bright_white(),
                };
                println!("{}", colored);
            } else {
                println!("{}", line);
            }
        }
    }

    /// Handle a `:`-prefixed shell command. Returns `false` to exit.
    fn meta_command(&mut self, meta: &str) -> bool {
        match meta.trim().to_ascii_lowercase().as_str() {
            "inspect" => self.show_inspector(),
            "dismiss" => {
                self.state.clear_analysis();
                self.notice("Analysis cleared.");
            }
            "status" => {
                let status = if self.state.is_busy() { "BUSY" } else { "NOMINAL" };
                self.notice(&format!(
                    "System Status: {} | Registry Count: {} | Breakthroughs: {}",
                    status,
                    self.state.registry().len(),
                    self.state.breakthroughs()
                ));
            }
            "quit" | "q" | "exit" => return false,
            other => self.notice(&format!(
                "Unknown shell command :{} (try :inspect, :dismiss, :status, :quit)",
                other
            )),
        }
        true
    }
}

/// Run a single session command and print what it produced.
pub async fn run_once(
    mut state: SessionState,
    backend: &dyn Backend,
    ui: &UIConfig,
    line: &str,
) -> Result<()> {
    let mut renderer = Renderer::new(ui, true);
    state.run_line(backend, line).await;
    renderer.flush(&state, false)?;
    if let Some(analysis) = state.analysis() {
        for line in inspector_lines(analysis, ui.inspector_preview_chars) {
            println!("{}", line);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn plain() -> UIConfig {
        UIConfig {
            colorful: false,
            ..UIConfig::default()
        }
    }

    fn state() -> SessionState {
        SessionState::new(&Config::default(), Vec::new())
    }

    #[test]
    fn test_renderer_emits_only_new_lines() {
        let mut state = state();
        let mut renderer = Renderer::new(&plain(), true);

        state.submit("cat task 999");
        let (cleared, lines) = renderer.pending(state.log());
        assert!(!cleared);
        assert_eq!(lines, vec!["$ cat task 999", "Error: Task 999 not found."]);

        let (_, lines) = renderer.pending(state.log());
        assert!(lines.is_empty());

        state.submit("nope");
        let (_, lines) = renderer.pending(state.log());
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_renderer_restarts_after_clear() {
        let mut state = state();
        let mut renderer = Renderer::new(&plain(), false);
        state.submit("help");
        let (_, lines) = renderer.pending(state.log());
        assert_eq!(lines[0], "Available Commands:");

        state.submit("clear");
        state.submit("cat task 1");
        let (cleared, lines) = renderer.pending(state.log());
        assert!(cleared);
        assert_eq!(lines, vec!["Error: Task 1 not found."]);
    }

    #[test]
    fn test_timestamps_prefix() {
        let mut state = state();
        let ui = UIConfig {
            colorful: false,
            timestamps: true,
            ..UIConfig::default()
        };
        let mut renderer = Renderer::new(&ui, true);
        state.submit("help");
        let (_, lines) = renderer.pending(state.log());
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] $ help"));
    }

    #[test]
    fn test_inspector_truncates_reasoning() {
        let analysis = LLMAnalysis {
            model: "gpt-4o".to_string(),
            reasoning: "a".repeat(200),
            code_output: "line one\nline two".to_string(),
            failure_point: "race".to_string(),
            status: AnalysisStatus::Breakthrough,
        };
        let lines = inspector_lines(&analysis, 150);
        assert_eq!(lines[1], "Target Model:   gpt-4o");
        assert_eq!(lines[2], "Verdict:        BREAKTHROUGH");
        assert_eq!(lines[3], format!("Reasoning:      \"{}...\"", "a".repeat(150)));
        assert_eq!(lines[4], "Failure Point:  race");
        assert_eq!(&lines[5..], &["--- LLM_GENERATED_CODE ---", "  line one", "  line two"]);
    }

    #[test]
    fn test_inspector_short_reasoning_untouched() {
        let analysis = LLMAnalysis {
            model: "m".to_string(),
            reasoning: "short".to_string(),
            code_output: String::new(),
            failure_point: "f".to_string(),
            status: AnalysisStatus::Success,
        };
        let lines = inspector_lines(&analysis, 150);
        assert_eq!(lines[3], "Reasoning:      \"short\"");
        assert_eq!(lines.len(), 5);
    }

    #[tokio::test]
    async fn test_meta_commands() {
        let config = Config {
            provider: crate::config::ProviderConfig {
                api_key_env: "TERMINUS_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
                ..Default::default()
            },
            ..Config::default()
        };
        let backend: Arc<dyn Backend> =
            Arc::new(crate::backend::DirectBackend::from_config(&config.provider));
        let mut state = SessionState::new(&config, backend.environment());
        state.run_line(backend.as_ref(), "tb run --task-id 101").await;
        assert_eq!(state.analysis().map(|a| a.model.as_str()), Some("mock-gpt-4o"));

        let mut shell = Shell::new(state, backend, plain(), true);
        assert!(shell.meta_command("inspect"));
        assert!(shell.meta_command(" STATUS "));
        assert!(shell.meta_command("dismiss"));
        assert!(shell.state.analysis().is_none());
        assert!(shell.meta_command("bogus"));
        assert!(!shell.meta_command("quit"));
        assert!(!shell.meta_command("q"));
    }
}
