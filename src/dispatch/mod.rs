//! Command dispatcher.
//!
//! Turns an authorized message body into a [`Command`] and executes it
//! against the catalog and the [`TailManager`].  Every invocation runs on
//! its own tokio task so a slow command never delays the event loop or
//! other senders.  Commands of one sender still run one after another, in
//! the order they were dispatched.
//!
//! Failures never escape [`Dispatcher::dispatch`]: they are logged with full
//! detail and answered with a single chat-safe reply.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::{self, Command, CommandError};
use crate::comm::{self, Contact, Replier};
use crate::tail::{self, TailManager};

#[derive(Clone)]
pub struct Dispatcher {
    tails: Arc<TailManager>,
    replier: Arc<dyn Replier>,
    /// Completion signal of each sender's most recently dispatched command.
    last_done: Arc<Mutex<HashMap<Contact, oneshot::Receiver<()>>>>,
}

impl Dispatcher {
    pub fn new(tails: Arc<TailManager>, replier: Arc<dyn Replier>) -> Self {
        Self {
            tails,
            replier,
            last_done: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn tails(&self) -> &Arc<TailManager> {
        &self.tails
    }

    /// Parse and execute `body` from `sender` on a new task.
    ///
    /// The task first waits for the sender's previous command to finish.
    /// The returned handle completes once the command has replied; for
    /// `tail` that is when the session has been set up, not when it ends.
    pub fn dispatch(&self, sender: &str, body: &str) -> JoinHandle<()> {
        let (done_tx, done_rx) = oneshot::channel();
        let previous = self
            .last_done
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(sender.to_string(), done_rx);

        let this = self.clone();
        let sender = sender.to_string();
        let body = body.to_string();
        tokio::spawn(async move {
            if let Some(previous) = previous {
                // An error only means the earlier task is gone.
                let _ = previous.await;
            }
            this.handle(&sender, &body).await;
            let _ = done_tx.send(());
        })
    }

    /// Parse and execute `body` from `sender` on the current task.
    pub async fn handle(&self, sender: &str, body: &str) {
        let result = match command::parse_command(sender, body) {
            Ok(cmd) => {
                debug!(sender = %sender, action = cmd.name(), "command received");
                self.execute(sender, cmd).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(Some(reply)) => comm::send_reply(self.replier.as_ref(), sender, &reply).await,
            Ok(None) => {}
            Err(e) => {
                if e.is_informational() {
                    info!(sender = %sender, reason = %e, "command declined");
                } else {
                    warn!(sender = %sender, error = %e, "command failed");
                }
                comm::send_reply(self.replier.as_ref(), sender, &e.user_message()).await;
            }
        }
    }

    /// Run a validated command.  `Ok(None)` means the command replies on
    /// its own (a started tail streams its own messages).
    async fn execute(&self, sender: &str, cmd: Command) -> Result<Option<String>, CommandError> {
        match cmd {
            Command::List => Ok(Some(self.tails.catalog().listing())),
            Command::Tail { alias } => {
                self.tails
                    .start(sender, &alias, Arc::clone(&self.replier))
                    .await?;
                Ok(None)
            }
            Command::Stop => {
                let alias = self.tails.stop(sender)?;
                Ok(Some(tail::stopped_notice(&alias)))
            }
            Command::Help { topic: None } => Ok(Some(command::help_overview())),
            Command::Help { topic: Some(topic) } => command::action_help(&topic)
                .map(|h| Some(format!("{}: {}", h.usage, h.description)))
                .ok_or(CommandError::UnknownHelpTopic(topic)),
        }
    }
}
