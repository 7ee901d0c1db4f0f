//! Chat command parsing.
//!
//! A message body is first split into a raw [`Invocation`] (action token +
//! argument tokens) by [`parse`], then validated into the closed [`Command`]
//! set by [`Command::from_invocation`].  The dispatcher matches on
//! [`Command`] exhaustively.
//!
//! Splitting is a literal single-space split after trimming: `"tail  foo"`
//! yields the arguments `["", "foo"]`.  No quoting, no escaping.

mod error;

pub use error::CommandError;

// ── Types ────────────────────────────────────────────────────

/// Raw result of splitting a message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub action: String,
    pub args: Vec<String>,
}

/// A validated chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `ls`: list tailable aliases.
    List,
    /// `tail <alias>`: start streaming a file.
    Tail { alias: String },
    /// `stop`: stop the caller's running tail.
    Stop,
    /// `help [action]`: full command list or one command's usage.
    Help { topic: Option<String> },
}

/// Static description of a supported action.
#[derive(Debug, Clone, Copy)]
pub struct ActionHelp {
    pub name: &'static str,
    pub usage: &'static str,
    pub description: &'static str,
}

/// Every supported action, in the order `help` lists them.
pub const ACTIONS: &[ActionHelp] = &[
    ActionHelp {
        name: "ls",
        usage: "ls",
        description: "list all tailable files",
    },
    ActionHelp {
        name: "tail",
        usage: "tail <file>",
        description: "stream new lines of a file (one tail at a time)",
    },
    ActionHelp {
        name: "stop",
        usage: "stop",
        description: "stop the running tail",
    },
    ActionHelp {
        name: "help",
        usage: "help [command]",
        description: "show all commands, or the usage of one",
    },
];

/// Look up the help entry for `action`.
pub fn action_help(action: &str) -> Option<&'static ActionHelp> {
    ACTIONS.iter().find(|a| a.name == action)
}

/// Full command list, one action per line.
pub fn help_overview() -> String {
    let mut lines = vec!["Available commands:".to_string()];
    for a in ACTIONS {
        lines.push(format!("- {:<15} {}", a.usage, a.description));
    }
    lines.join("\n")
}

// ── Parsing ──────────────────────────────────────────────────

/// Split a raw message body into an [`Invocation`].
///
/// `sender` is only used to attribute the error in logs.
pub fn parse(sender: &str, body: &str) -> Result<Invocation, CommandError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(CommandError::EmptyCommand {
            sender: sender.to_string(),
        });
    }

    let mut words = trimmed.split(' ').map(String::from);
    let action = words.next().unwrap_or_default();
    let args = words.collect();
    Ok(Invocation { action, args })
}

impl Command {
    /// Validate an [`Invocation`] against the supported actions and their
    /// argument counts.
    pub fn from_invocation(inv: Invocation) -> Result<Command, CommandError> {
        let Invocation { action, mut args } = inv;
        let cmd = match action.as_str() {
            "ls" if args.is_empty() => Command::List,
            "tail" if args.len() == 1 => Command::Tail {
                alias: args.remove(0),
            },
            "stop" if args.is_empty() => Command::Stop,
            "help" if args.len() <= 1 => Command::Help { topic: args.pop() },
            _ => {
                return Err(match action_help(&action) {
                    Some(help) => CommandError::ArgumentCount {
                        action,
                        got: args.len(),
                        usage: help.usage,
                    },
                    None => CommandError::UnknownAction(action),
                })
            }
        };
        Ok(cmd)
    }

    /// Action name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::List => "ls",
            Command::Tail { .. } => "tail",
            Command::Stop => "stop",
            Command::Help { .. } => "help",
        }
    }
}

/// Parse and validate a message body in one step.
pub fn parse_command(sender: &str, body: &str) -> Result<Command, CommandError> {
    parse(sender, body).and_then(Command::from_invocation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inv(action: &str, args: &[&str]) -> Invocation {
        Invocation {
            action: action.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn trims_before_splitting() {
        assert_eq!(parse("a", "  tail  ").unwrap(), inv("tail", &[]));
    }

    #[test]
    fn double_space_yields_empty_argument() {
        assert_eq!(parse("a", "tail  foo").unwrap(), inv("tail", &["", "foo"]));
    }

    #[test]
    fn empty_body_is_rejected() {
        assert!(matches!(
            parse("a", "   \n"),
            Err(CommandError::EmptyCommand { .. })
        ));
    }

    #[test]
    fn tail_requires_exactly_one_argument() {
        assert_eq!(
            parse_command("a", "tail access").unwrap(),
            Command::Tail {
                alias: "access".into()
            }
        );
        assert!(matches!(
            parse_command("a", "tail"),
            Err(CommandError::ArgumentCount { got: 0, .. })
        ));
        assert!(matches!(
            parse_command("a", "tail  access"),
            Err(CommandError::ArgumentCount { got: 2, .. })
        ));
    }

    #[test]
    fn ls_and_stop_take_no_arguments() {
        assert_eq!(parse_command("a", "ls").unwrap(), Command::List);
        assert_eq!(parse_command("a", "stop").unwrap(), Command::Stop);
        assert!(parse_command("a", "ls all").is_err());
        assert!(parse_command("a", "stop now").is_err());
    }

    #[test]
    fn help_takes_optional_topic() {
        assert_eq!(
            parse_command("a", "help").unwrap(),
            Command::Help { topic: None }
        );
        assert_eq!(
            parse_command("a", "help tail").unwrap(),
            Command::Help {
                topic: Some("tail".into())
            }
        );
        assert!(parse_command("a", "help tail stop").is_err());
    }

    #[test]
    fn actions_are_case_sensitive() {
        assert!(matches!(
            parse_command("a", "LS"),
            Err(CommandError::UnknownAction(a)) if a == "LS"
        ));
    }

    #[test]
    fn overview_lists_every_action() {
        let text = help_overview();
        for a in ACTIONS {
            assert!(text.contains(a.usage), "missing {}", a.name);
        }
    }
}
