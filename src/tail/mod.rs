//! Tail session manager.
//!
//! Owns every running tail, keyed by the contact that started it.  A contact
//! has at most one session at a time: a second `start` is rejected, never
//! queued or swapped in.
//!
//! Each session runs on its own tokio task that polls a [`Follower`] and
//! pushes every new line to its owner through a [`Replier`].  When the
//! follower has nothing new the task sleeps for the configured backoff.
//! Cancellation is cooperative through a [`CancellationToken`] that the task
//! checks around every sleep and every delivered line.
//!
//! The session table sits behind a `std::sync::Mutex`.  It is only held for
//! lookups, inserts and removals, never across an `.await`.

pub mod follow;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::FileCatalog;
use crate::comm::{self, Contact, Replier};
use crate::command::CommandError;
use crate::utils::truncate_str;

pub use follow::Follower;

/// How long [`TailManager::stop_all`] waits for each session task to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Streaming behaviour shared by every session.
#[derive(Debug, Clone)]
pub struct TailOptions {
    /// Backoff between polls when the file has nothing new.
    pub poll_interval: Duration,
    /// Lines of existing content sent when a session starts.
    pub backlog_lines: usize,
    /// Longer lines are cut and end with an ellipsis.
    pub max_line_len: usize,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            backlog_lines: 0,
            max_line_len: 1900,
        }
    }
}

/// Public view of a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub owner: Contact,
    pub alias: String,
    pub started_at: DateTime<Utc>,
}

struct Entry {
    /// Distinguishes this session from a later one of the same owner.
    id: u64,
    alias: String,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

type SessionTable = Arc<Mutex<HashMap<Contact, Entry>>>;

fn lock(table: &SessionTable) -> MutexGuard<'_, HashMap<Contact, Entry>> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Start notice sent to the owner before any line.
pub fn started_notice(alias: &str) -> String {
    format!("Tailing '{alias}'. Type 'stop' to end it.")
}

/// Notice sent when a session ends because its file became unreadable.
pub fn failed_notice(alias: &str) -> String {
    format!("Tail of '{alias}' ended: the file can no longer be read")
}

/// Reply confirming an explicit `stop`.
pub fn stopped_notice(alias: &str) -> String {
    format!("Tail of '{alias}' stopped")
}

pub struct TailManager {
    catalog: Arc<FileCatalog>,
    options: TailOptions,
    sessions: SessionTable,
    next_id: AtomicU64,
}

impl TailManager {
    pub fn new(catalog: Arc<FileCatalog>, options: TailOptions) -> Self {
        Self {
            catalog,
            options,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn catalog(&self) -> &FileCatalog {
        &self.catalog
    }

    /// Start tailing `alias` for `owner`.
    ///
    /// Returns once the start notice has been sent.  Lines are then
    /// delivered to `owner` through `replier` until the session is stopped
    /// or the file becomes unreadable.
    pub async fn start(
        &self,
        owner: &str,
        alias: &str,
        replier: Arc<dyn Replier>,
    ) -> Result<(), CommandError> {
        if let Some(running) = self.running_alias(owner) {
            return Err(CommandError::AlreadyRunning {
                owner: owner.to_string(),
                running,
            });
        }

        let path = self.catalog.resolve_existing(alias).await?;
        let open_err = |source| CommandError::Open {
            alias: alias.to_string(),
            path: path.clone(),
            source,
        };
        let mut follower = Follower::open(&path).await.map_err(open_err)?;
        let backlog = match follower.backlog(self.options.backlog_lines).await {
            Ok(lines) => lines,
            Err(e) => {
                warn!(owner = %owner, alias = %alias, error = %e, "failed to read tail backlog");
                Vec::new()
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let (announced_tx, announced_rx) = oneshot::channel();
        {
            // A concurrent start for the same owner may have won while the
            // file was being opened; the loser's follower is dropped here.
            let mut sessions = lock(&self.sessions);
            if let Some(existing) = sessions.get(owner) {
                return Err(CommandError::AlreadyRunning {
                    owner: owner.to_string(),
                    running: existing.alias.clone(),
                });
            }

            let session = Session {
                id,
                owner: owner.to_string(),
                alias: alias.to_string(),
                follower,
                backlog,
                announced: Some(announced_rx),
                cancel: cancel.clone(),
                replier: Arc::clone(&replier),
                sessions: Arc::clone(&self.sessions),
                options: self.options.clone(),
            };
            let task = tokio::spawn(session.run());
            sessions.insert(
                owner.to_string(),
                Entry {
                    id,
                    alias: alias.to_string(),
                    started_at: Utc::now(),
                    cancel,
                    task,
                },
            );
        }
        info!(owner = %owner, alias = %alias, file = %path.display(), "tail started");

        // The session holds back every line until the owner has the notice.
        comm::send_reply(replier.as_ref(), owner, &started_notice(alias)).await;
        let _ = announced_tx.send(());
        Ok(())
    }

    /// Stop `owner`'s session and return the alias it was tailing.
    ///
    /// The task observes the cancellation at its next check; one line that
    /// was already being delivered may still arrive.
    pub fn stop(&self, owner: &str) -> Result<String, CommandError> {
        let entry = lock(&self.sessions)
            .remove(owner)
            .ok_or_else(|| CommandError::NoActiveSession {
                owner: owner.to_string(),
            })?;
        entry.cancel.cancel();
        info!(
            owner = %owner,
            alias = %entry.alias,
            started_at = %entry.started_at,
            "tail stopped"
        );
        Ok(entry.alias)
    }

    /// Stop every session and wait (bounded) for their tasks to release
    /// their files.  Returns how many sessions were stopped.
    pub async fn stop_all(&self) -> usize {
        let drained: Vec<(Contact, Entry)> = lock(&self.sessions).drain().collect();
        let count = drained.len();
        for (owner, entry) in &drained {
            debug!(owner = %owner, alias = %entry.alias, started_at = %entry.started_at, "stopping tail");
            entry.cancel.cancel();
        }
        for (owner, entry) in drained {
            match tokio::time::timeout(SHUTDOWN_GRACE, entry.task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(owner = %owner, error = %e, "tail task ended abnormally"),
                Err(_) => warn!(owner = %owner, "tail task did not exit in time"),
            }
        }
        if count > 0 {
            info!(count, "all tails stopped");
        }
        count
    }

    /// Alias currently tailed by `owner`, if any.
    pub fn running_alias(&self, owner: &str) -> Option<String> {
        lock(&self.sessions).get(owner).map(|e| e.alias.clone())
    }

    pub fn is_running(&self, owner: &str) -> bool {
        lock(&self.sessions).contains_key(owner)
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of running sessions, oldest first.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut out: Vec<SessionInfo> = lock(&self.sessions)
            .iter()
            .map(|(owner, e)| SessionInfo {
                owner: owner.clone(),
                alias: e.alias.clone(),
                started_at: e.started_at,
            })
            .collect();
        out.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        out
    }
}

// ── Session task ─────────────────────────────────────────────

enum Outcome {
    Cancelled,
    Failed(std::io::Error),
}

struct Session {
    id: u64,
    owner: Contact,
    alias: String,
    follower: Follower,
    backlog: Vec<String>,
    /// Fires once the start notice is out.
    announced: Option<oneshot::Receiver<()>>,
    cancel: CancellationToken,
    replier: Arc<dyn Replier>,
    sessions: SessionTable,
    options: TailOptions,
}

impl Session {
    async fn run(mut self) {
        if let Some(announced) = self.announced.take() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {}
                _ = announced => {}
            }
        }
        for line in std::mem::take(&mut self.backlog) {
            if self.cancel.is_cancelled() {
                break;
            }
            self.deliver(&line).await;
        }

        let outcome = self.stream().await;

        let Session {
            id,
            owner,
            alias,
            follower,
            replier,
            sessions,
            ..
        } = self;
        let file = follower.path().to_path_buf();
        drop(follower);

        // Free the slot unless it was already freed by stop/stop_all (and
        // possibly reused by a newer session).
        {
            let mut table = lock(&sessions);
            if table.get(&owner).is_some_and(|e| e.id == id) {
                table.remove(&owner);
            }
        }

        match outcome {
            Outcome::Cancelled => debug!(owner = %owner, alias = %alias, "tail task finished"),
            Outcome::Failed(e) => {
                warn!(
                    owner = %owner,
                    alias = %alias,
                    file = %file.display(),
                    error = %e,
                    "tail ended: file unreadable"
                );
                comm::send_reply(replier.as_ref(), &owner, &failed_notice(&alias)).await;
            }
        }
    }

    async fn stream(&mut self) -> Outcome {
        loop {
            if self.cancel.is_cancelled() {
                return Outcome::Cancelled;
            }
            match self.follower.next_line().await {
                Ok(Some(line)) => {
                    if self.cancel.is_cancelled() {
                        return Outcome::Cancelled;
                    }
                    self.deliver(&line).await;
                }
                Ok(None) => {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Outcome::Cancelled,
                        _ = tokio::time::sleep(self.options.poll_interval) => {}
                    }
                }
                Err(e) => return Outcome::Failed(e),
            }
        }
    }

    async fn deliver(&self, line: &str) {
        let body = truncate_str(line, self.options.max_line_len);
        comm::send_reply(self.replier.as_ref(), &self.owner, &body).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::RecordingReplier;
    use std::io::Write;
    use std::path::PathBuf;

    fn fast() -> TailOptions {
        TailOptions {
            poll_interval: Duration::from_millis(10),
            ..TailOptions::default()
        }
    }

    fn manager(entries: &[(&str, PathBuf)]) -> TailManager {
        let catalog = FileCatalog::new(
            entries
                .iter()
                .map(|(a, p)| (a.to_string(), p.clone())),
        );
        TailManager::new(Arc::new(catalog), fast())
    }

    fn append(path: &std::path::Path, text: &str) {
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    async fn wait_for(replier: &RecordingReplier, to: &str, count: usize) -> Vec<String> {
        for _ in 0..200 {
            let got = replier.sent_to(to);
            if got.len() >= count {
                return got;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        replier.sent_to(to)
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("a.log");
        append(&log, "");
        let m = manager(&[("a", log.clone()), ("b", log)]);
        let r = Arc::new(RecordingReplier::new());

        m.start("alice", "a", r.clone()).await.unwrap();
        let err = m.start("alice", "b", r.clone()).await.unwrap_err();
        assert!(matches!(err, CommandError::AlreadyRunning { running, .. } if running == "a"));
        assert_eq!(m.len(), 1);
        m.stop_all().await;
    }

    #[tokio::test]
    async fn stop_frees_the_slot() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("a.log");
        append(&log, "");
        let m = manager(&[("a", log)]);
        let r = Arc::new(RecordingReplier::new());

        assert!(matches!(
            m.stop("alice"),
            Err(CommandError::NoActiveSession { .. })
        ));
        m.start("alice", "a", r.clone()).await.unwrap();
        assert_eq!(m.stop("alice").unwrap(), "a");
        assert!(!m.is_running("alice"));
        m.start("alice", "a", r.clone()).await.unwrap();
        assert!(m.is_running("alice"));
        assert_eq!(m.stop_all().await, 1);
        assert!(m.is_empty());
    }

    #[tokio::test]
    async fn sessions_snapshot_lists_running_tails() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("a.log");
        append(&log, "");
        let m = manager(&[("a", log)]);
        let r = Arc::new(RecordingReplier::new());

        m.start("alice", "a", r.clone()).await.unwrap();
        let snapshot = m.sessions();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].owner, "alice");
        assert_eq!(snapshot[0].alias, "a");
        assert_eq!(m.running_alias("alice").as_deref(), Some("a"));
        m.stop_all().await;
        assert!(m.sessions().is_empty());
    }

    #[tokio::test]
    async fn lines_are_delivered_in_order_to_the_owner() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("a.log");
        append(&log, "old\n");
        let m = manager(&[("a", log.clone())]);
        let r = Arc::new(RecordingReplier::new());

        m.start("alice", "a", r.clone()).await.unwrap();
        append(&log, "one\ntwo\nthree\n");

        let got = wait_for(&r, "alice", 4).await;
        assert_eq!(got, vec![started_notice("a"), "one".into(), "two".into(), "three".into()]);
        assert!(r.sent_to("bob").is_empty());
        m.stop_all().await;
    }

    #[tokio::test]
    async fn nothing_is_delivered_after_stop_all() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("a.log");
        append(&log, "");
        let m = manager(&[("a", log.clone())]);
        let r = Arc::new(RecordingReplier::new());

        m.start("alice", "a", r.clone()).await.unwrap();
        m.start("bob", "a", r.clone()).await.unwrap();
        assert_eq!(m.stop_all().await, 2);

        let before = r.sent().len();
        append(&log, "late\n");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(r.sent().len(), before);
    }

    #[tokio::test]
    async fn backlog_lines_follow_the_start_notice() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("a.log");
        append(&log, "1\n2\n3\n");
        let catalog = FileCatalog::new([("a".to_string(), log)]);
        let m = TailManager::new(
            Arc::new(catalog),
            TailOptions {
                backlog_lines: 2,
                ..fast()
            },
        );
        let r = Arc::new(RecordingReplier::new());

        m.start("alice", "a", r.clone()).await.unwrap();
        let got = wait_for(&r, "alice", 3).await;
        assert_eq!(got, vec![started_notice("a"), "2".into(), "3".into()]);
        m.stop_all().await;
    }

    #[tokio::test]
    async fn catalog_errors_surface_from_start() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(&[("gone", dir.path().join("gone.log"))]);
        let r = Arc::new(RecordingReplier::new());

        assert!(matches!(
            m.start("alice", "bogus", r.clone()).await,
            Err(CommandError::UnknownAlias(_))
        ));
        assert!(matches!(
            m.start("alice", "gone", r.clone()).await,
            Err(CommandError::FileMissing { .. })
        ));
        assert!(m.is_empty());
    }

    #[tokio::test]
    async fn concurrent_starts_leave_one_session() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("a.log");
        append(&log, "");
        let m = Arc::new(manager(&[("a", log)]));
        let r = Arc::new(RecordingReplier::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let m = Arc::clone(&m);
            let r: Arc<dyn Replier> = r.clone();
            handles.push(tokio::spawn(async move { m.start("alice", "a", r).await }));
        }
        let mut ok = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(m.len(), 1);
        m.stop_all().await;
    }

    #[tokio::test]
    async fn long_lines_are_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("a.log");
        append(&log, "");
        let catalog = FileCatalog::new([("a".to_string(), log.clone())]);
        let m = TailManager::new(
            Arc::new(catalog),
            TailOptions {
                max_line_len: 5,
                ..fast()
            },
        );
        let r = Arc::new(RecordingReplier::new());

        m.start("alice", "a", r.clone()).await.unwrap();
        append(&log, "abcdefghij\n");
        let got = wait_for(&r, "alice", 2).await;
        assert_eq!(got[1], "abcde…");
        m.stop_all().await;
    }
}
