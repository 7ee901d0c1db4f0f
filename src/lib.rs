//! chattail: tail log files over chat.
//!
//! This library crate re-exports modules so integration tests
//! (under `tests/`) can access them.

pub mod catalog;
pub mod comm;
pub mod command;
pub mod config;
pub mod discord;
pub mod dispatch;
pub mod events;
pub mod presence;
pub mod tail;
pub mod utils;

use std::sync::Arc;

use crate::comm::Replier;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::events::EventAdapter;
use crate::presence::Registry;
use crate::tail::TailManager;

/// Wire the command core together from a loaded configuration.
///
/// `replier` is the transport's outbound send primitive.
pub fn build_adapter(cfg: &Config, replier: Arc<dyn Replier>) -> EventAdapter {
    let registry = Arc::new(Registry::new(cfg.contacts.iter().cloned()));
    let tails = Arc::new(TailManager::new(
        Arc::new(cfg.catalog()),
        cfg.tail_options(),
    ));
    EventAdapter::new(registry, Dispatcher::new(tails, replier))
}
