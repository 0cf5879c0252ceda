use crate::error::CommandError;

/// Model used by `tb run` when `--model` is not given.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Topic used by `tb task create` when no words follow it.
pub const DEFAULT_TOPIC: &str = "Cloud Infrastructure";

/// A recognized line of the session command language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Clear,
    ListTasks,
    ShowTask { id: String },
    Env,
    Run { task_id: String, model: String },
    CreateTask { topic: String },
    /// Anything outside the grammar. The caller echoes the original input.
    Unknown,
}

impl Command {
    /// Whether handling this command needs a remote call.
    pub fn is_remote(&self) -> bool {
        matches!(self, Command::Run { .. } | Command::CreateTask { .. })
    }
}

/// Turns raw input lines into `Command`s.
///
/// Keywords match case-insensitively; arguments keep the case they were
/// typed in.
#[derive(Debug, Clone)]
pub struct CommandParser {
    default_model: String,
    default_topic: String,
}

impl CommandParser {
    pub fn new() -> Self {
        Self::with_defaults(DEFAULT_MODEL, DEFAULT_TOPIC)
    }

    pub fn with_defaults(model: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            default_model: model.into(),
            default_topic: topic.into(),
        }
    }

    pub fn parse(&self, input: &str) -> Result<Command, CommandError> {
        let tokens: Vec<&str> = input.split_whitespace().collect();
        let keyword = |i: usize, expected: &str| {
            tokens
                .get(i)
                .is_some_and(|t| t.eq_ignore_ascii_case(expected))
        };

        let command = match tokens.len() {
            1 if keyword(0, "help") => Command::Help,
            1 if keyword(0, "clear") => Command::Clear,
            1 if keyword(0, "env") => Command::Env,
            2 if keyword(0, "ls") && keyword(1, "tasks") => Command::ListTasks,
            _ if keyword(0, "cat") && keyword(1, "task") => self.parse_show(&tokens[2..])?,
            _ if keyword(0, "tb") && keyword(1, "run") => self.parse_run(&tokens[2..])?,
            _ if keyword(0, "tb") && keyword(1, "task") && keyword(2, "create") => {
                self.parse_create(&tokens[3..])
            }
            _ => Command::Unknown,
        };
        Ok(command)
    }

    fn parse_show(&self, args: &[&str]) -> Result<Command, CommandError> {
        match args {
            [] => Err(CommandError::MissingArgument("<id>")),
            [id] => Ok(Command::ShowTask { id: id.to_string() }),
            [_, extra, ..] => Err(CommandError::UnexpectedArgument(extra.to_string())),
        }
    }

    fn parse_run(&self, args: &[&str]) -> Result<Command, CommandError> {
        let mut task_id: Option<String> = None;
        let mut model: Option<String> = None;

        let mut rest = args.iter();
        while let Some(token) = rest.next() {
            let Some(flag) = token.strip_prefix("--") else {
                return Err(CommandError::UnexpectedArgument(token.to_string()));
            };
            let (name, inline) = match flag.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => (flag, None),
            };
            let display = format!("--{}", name);
            let value = match inline {
                Some(v) if !v.is_empty() => v,
                Some(_) => return Err(CommandError::MissingValue(display)),
                None => match rest.next() {
                    Some(v) if !v.starts_with("--") => v.to_string(),
                    _ => return Err(CommandError::MissingValue(display)),
                },
            };

            let (slot, valid) = match name.to_ascii_lowercase().as_str() {
                "task-id" => (&mut task_id, is_task_id(&value)),
                "model" => (&mut model, is_model_name(&value)),
                _ => return Err(CommandError::UnknownFlag(display)),
            };
            if !valid {
                return Err(CommandError::InvalidValue {
                    flag: display,
                    value,
                });
            }
            if slot.is_some() {
                return Err(CommandError::DuplicateFlag(display));
            }
            *slot = Some(value);
        }

        let task_id = task_id.ok_or(CommandError::MissingArgument("--task-id"))?;
        Ok(Command::Run {
            task_id,
            model: model.unwrap_or_else(|| self.default_model.clone()),
        })
    }

    fn parse_create(&self, words: &[&str]) -> Command {
        let topic = if words.is_empty() {
            self.default_topic.clone()
        } else {
            words.join(" ")
        };
        Command::CreateTask { topic }
    }
}

impl Default for CommandParser {
    fn default() -> Self {
        Self::new()
    }
}

fn is_task_id(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

fn is_model_name(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '/' | '-'))
}

/// Lines shown by `help`.
pub fn help_lines() -> Vec<&'static str> {
    vec![
        "Available Commands:",
        "  help                     - Show this help menu",
        "  clear                    - Clear the terminal screen",
        "  ls tasks                 - List all adversarial tasks",
        "  cat task <id>            - Show details for a specific task",
        "  tb run --task-id <id>    - Run an LLM breaker agent on task",
        "       [--model <name>]      (default: gpt-4o)",
        "  tb task create <topic>   - Generate a new adversarial task",
        "  env                      - Show current environment variables",
    ]
}
