use std::path::PathBuf;

use thiserror::Error;

/// Per-command failures.
///
/// `Display` carries the full internal detail (paths, owners) and is only
/// written to logs.  [`CommandError::user_message`] is the short text sent
/// back to the chat and never contains filesystem paths.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("empty command from {sender}")]
    EmptyCommand { sender: String },
    #[error("unknown action `{0}`")]
    UnknownAction(String),
    #[error("action `{action}` got {got} argument(s), usage: {usage}")]
    ArgumentCount {
        action: String,
        got: usize,
        usage: &'static str,
    },
    #[error("alias `{0}` is not in the file catalog")]
    UnknownAlias(String),
    #[error("alias `{alias}` resolves to missing file {}", path.display())]
    FileMissing { alias: String, path: PathBuf },
    #[error("{owner} already tails `{running}`")]
    AlreadyRunning { owner: String, running: String },
    #[error("{owner} has no active tail")]
    NoActiveSession { owner: String },
    #[error("no help topic `{0}`")]
    UnknownHelpTopic(String),
    #[error("cannot open {} for alias `{alias}`: {source}", path.display())]
    Open {
        alias: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    /// Chat-safe summary of the failure.
    pub fn user_message(&self) -> String {
        match self {
            CommandError::EmptyCommand { .. } => {
                "Command Error: empty command. Type 'help' to list commands.".to_string()
            }
            CommandError::UnknownAction(action) => format!(
                "Command Error: unknown command '{action}'. Type 'help' to list commands."
            ),
            CommandError::ArgumentCount { usage, .. } => {
                format!("Command Error: wrong number of arguments. Usage: {usage}")
            }
            CommandError::UnknownAlias(alias) => format!(
                "Command Error: filename '{alias}' is not tailable. Type 'ls' to list all tailable files."
            ),
            CommandError::FileMissing { alias, .. } => {
                format!("Command Error: file '{alias}' is not available right now.")
            }
            CommandError::AlreadyRunning { .. } => {
                "Command Error: a tail is already running. Type 'stop' to end it first."
                    .to_string()
            }
            CommandError::NoActiveSession { .. } => "No tail is running".to_string(),
            CommandError::UnknownHelpTopic(topic) => {
                format!("Command Error: no help for '{topic}'. Type 'help' to list commands.")
            }
            CommandError::Open { alias, .. } => {
                format!("Command Error: file '{alias}' could not be opened.")
            }
        }
    }

    /// Failures that are an expected answer rather than a problem worth a
    /// warning in the logs.
    pub fn is_informational(&self) -> bool {
        matches!(self, CommandError::NoActiveSession { .. })
    }
}
