//! Poll-based line follower: the "tail -f" primitive behind a session.
//!
//! A [`Follower`] starts at the current end of a file and hands out each
//! complete line appended afterwards.  It never blocks waiting for data:
//! [`Follower::next_line`] returns `Ok(None)` when nothing new is available
//! and the caller decides how long to back off.
//!
//! Rotation and truncation are tolerated.  When the file shrinks below the
//! read offset, or (on unix) the path now points at a different inode, the
//! follower reopens it from the start.  While the path is absent the
//! follower holds no handle and simply reports nothing new.

use std::collections::VecDeque;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info};

/// Upper bound on bytes consumed per poll so a burst of writes cannot
/// monopolise a session.
const MAX_READ_PER_POLL: u64 = 64 * 1024;

/// How far back from the end of the file [`Follower::backlog`] looks.
const BACKLOG_WINDOW: u64 = 64 * 1024;

/// An unterminated line this long is handed out as it is.
const MAX_PARTIAL_LINE: usize = 64 * 1024;

pub struct Follower {
    path: PathBuf,
    file: Option<File>,
    /// Byte offset of the next unread byte.
    offset: u64,
    /// Bytes after the last newline seen; an unfinished line.
    partial: Vec<u8>,
    /// Complete lines read but not yet handed out.
    ready: VecDeque<String>,
    #[cfg(unix)]
    inode: Option<u64>,
}

impl std::fmt::Debug for Follower {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Follower")
            .field("path", &self.path)
            .field("offset", &self.offset)
            .field("open", &self.file.is_some())
            .finish()
    }
}

impl Follower {
    /// Open `path` positioned at its current end.
    pub async fn open(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path).await?;
        let meta = file.metadata().await?;
        let offset = meta.len();
        file.seek(SeekFrom::Start(offset)).await?;
        debug!(file = %path.display(), offset, "follower opened");

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            offset,
            partial: Vec::new(),
            ready: VecDeque::new(),
            #[cfg(unix)]
            inode: Some(inode_of(&meta)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Up to `count` complete lines that were already in the file when it
    /// was opened, oldest first.
    pub async fn backlog(&mut self, count: usize) -> io::Result<Vec<String>> {
        if count == 0 || self.offset == 0 {
            return Ok(Vec::new());
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(Vec::new());
        };

        let start = self.offset.saturating_sub(BACKLOG_WINDOW);
        file.seek(SeekFrom::Start(start)).await?;
        let mut buf = Vec::new();
        (&mut *file).take(self.offset - start).read_to_end(&mut buf).await?;
        file.seek(SeekFrom::Start(self.offset)).await?;

        // Only lines terminated inside the window are complete; the text
        // before the first newline may be cut when the window starts
        // mid-file.
        let end = match buf.iter().rposition(|b| *b == b'\n') {
            Some(pos) => pos,
            None => return Ok(Vec::new()),
        };
        let mut lines: Vec<String> = buf[..end].split(|b| *b == b'\n').map(decode).collect();
        if start > 0 && !lines.is_empty() {
            lines.remove(0);
        }
        let skip = lines.len().saturating_sub(count);
        Ok(lines.split_off(skip))
    }

    /// Next complete line, or `None` when nothing new has been appended.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        if let Some(line) = self.ready.pop_front() {
            return Ok(Some(line));
        }
        self.poll().await?;
        Ok(self.ready.pop_front())
    }

    async fn poll(&mut self) -> io::Result<()> {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Whatever shows up at this path next is a new file.
                if self.file.take().is_some() {
                    info!(file = %self.path.display(), "followed file disappeared");
                }
                self.offset = 0;
                self.partial.clear();
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is no longer a regular file", self.path.display()),
            ));
        }

        if self.replaced(&meta) || meta.len() < self.offset {
            info!(
                file = %self.path.display(),
                old_offset = self.offset,
                new_size = meta.len(),
                "followed file rotated or truncated, reading from start"
            );
            self.file = None;
            self.offset = 0;
            self.partial.clear();
        }

        if self.file.is_none() {
            let mut file = match File::open(&self.path).await {
                Ok(f) => f,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(e),
            };
            file.seek(SeekFrom::Start(self.offset)).await?;
            #[cfg(unix)]
            {
                self.inode = Some(inode_of(&file.metadata().await?));
            }
            self.file = Some(file);
        }

        if meta.len() == self.offset {
            return Ok(());
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };

        let mut buf = Vec::new();
        let n = (&mut *file).take(MAX_READ_PER_POLL).read_to_end(&mut buf).await?;
        self.offset += n as u64;
        self.split_lines(&buf);
        Ok(())
    }

    fn split_lines(&mut self, bytes: &[u8]) {
        let mut rest = bytes;
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            self.partial.extend_from_slice(&rest[..pos]);
            self.ready.push_back(decode(&self.partial));
            self.partial.clear();
            rest = &rest[pos + 1..];
        }
        self.partial.extend_from_slice(rest);

        if self.partial.len() >= MAX_PARTIAL_LINE {
            debug!(
                file = %self.path.display(),
                bytes = self.partial.len(),
                "unterminated line hit the size cap, emitting it"
            );
            self.ready.push_back(decode(&self.partial));
            self.partial.clear();
        }
    }

    #[cfg(unix)]
    fn replaced(&self, meta: &std::fs::Metadata) -> bool {
        self.file.is_some() && self.inode.is_some_and(|ino| ino != inode_of(meta))
    }

    #[cfg(not(unix))]
    fn replaced(&self, _meta: &std::fs::Metadata) -> bool {
        false
    }
}

#[cfg(unix)]
fn inode_of(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

/// Lossy UTF-8 decode with any trailing `\r` removed.
fn decode(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}
