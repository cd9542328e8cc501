// SPDX-License-Identifier: Apache-2.0

//! Tails a single file and turns its bytes into records.
//!
//! A [`FileFollower`] owns one open handle and runs its read loop on its own
//! task. Complete lines are assembled into records (single-line, or multiline
//! delimited by a boundary pattern) and pushed onto the source's bounded
//! queue together with the byte offset a restart should resume from. A full
//! queue blocks the loop.
//!
//! At end of file the follower checks, in order, for truncation (file shorter
//! than the tracked offset), rotation (a different file now lives at the
//! path), and otherwise sleeps for the idle interval. Any I/O failure ends the
//! follower; it is never restarted.

use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::select;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::bounded_channel::{BoundedSender, SendError};
use crate::receivers::file::config::{SourceConfig, SourceWatcherConfig};
use crate::receivers::file::error::{Error, Result};
use crate::receivers::file::input::FileId;

/// A finished record on its way to the batch collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowerMessage {
    pub path: String,
    /// Offset to resume from once this record is delivered
    pub offset: u64,
    pub record: String,
}

/// `Closing` is published when a close is requested and lasts until the file
/// handle is released, at which point the state becomes `Closed`. A follower
/// that stops on its own (file gone, read error) goes straight to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowerState {
    Init,
    Running,
    Closing,
    Closed,
}

/// Per-source settings shared by every follower of that source.
#[derive(Debug, Clone)]
pub struct FollowerSettings {
    pub source: String,
    pub prefix: Option<String>,
    pub terminator: String,
    pub boundary: Option<Regex>,
    pub idle_interval: Duration,
}

impl FollowerSettings {
    /// Fails if the source is multiline and its boundary pattern does not compile.
    pub fn from_config(config: &SourceConfig, watcher_config: &SourceWatcherConfig) -> Result<Self> {
        Ok(Self {
            source: config.name.clone(),
            prefix: config.record_prefix(),
            terminator: config.line_terminator().to_string(),
            boundary: config.boundary_regex()?,
            idle_interval: watcher_config.idle_interval,
        })
    }
}

pub struct FileFollower {
    path: String,
    cancel: CancellationToken,
    state: Arc<watch::Sender<FollowerState>>,
    handle: JoinHandle<()>,
}

// Running -> Closing only; a terminated follower stays Closed.
fn begin_closing(state: &watch::Sender<FollowerState>) -> bool {
    state.send_if_modified(|s| {
        if *s == FollowerState::Running {
            *s = FollowerState::Closing;
            true
        } else {
            false
        }
    })
}

impl FileFollower {
    /// Open `path`, seek to `offset` and start tailing.
    ///
    /// Records go to `tx`. Cancelling `cancel` (or calling [`close`]) stops
    /// the follower.
    ///
    /// [`close`]: FileFollower::close
    pub async fn start(
        path: impl Into<String>,
        offset: u64,
        settings: FollowerSettings,
        tx: BoundedSender<FollowerMessage>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let path = path.into();
        let (state_tx, _) = watch::channel(FollowerState::Init);
        let state = Arc::new(state_tx);

        let open_err = |source| Error::Open {
            path: path.clone().into(),
            source,
        };
        let mut file = File::open(&path).await.map_err(open_err)?;
        file.seek(SeekFrom::Start(offset)).await.map_err(open_err)?;
        let file_id = FileId::from_file(&file).await.map_err(open_err)?;

        let tail = Tail {
            path: path.clone(),
            reader: BufReader::new(file),
            file_id,
            offset,
            fragment: Vec::new(),
            record: String::new(),
            settings,
            tx,
            cancel: cancel.clone(),
        };

        state.send_replace(FollowerState::Running);
        info!(source = %tail.settings.source, path = %path, offset, "Following file");

        let task_state = state.clone();
        let handle = tokio::spawn(async move {
            let mut tail = tail;
            if tail.run().await == Stop::Cancelled {
                begin_closing(&task_state);
                debug!(path = %tail.path, offset = tail.offset, "Closing follower");
            }
            // releases the file handle
            drop(tail);
            task_state.send_replace(FollowerState::Closed);
        });

        Ok(Self {
            path,
            cancel,
            state,
            handle,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> FollowerState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn state_changes(&self) -> watch::Receiver<FollowerState> {
        self.state.subscribe()
    }

    /// Stop the read loop and wait until the file handle is released.
    pub async fn close(self) {
        begin_closing(&self.state);
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            error!(path = %self.path, error = ?e, "Follower task failed");
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Stop {
    Cancelled,
    Terminated,
}

struct Tail {
    path: String,
    reader: BufReader<File>,
    file_id: FileId,
    // end of the last complete line; excludes `fragment`
    offset: u64,
    fragment: Vec<u8>,
    record: String,
    settings: FollowerSettings,
    tx: BoundedSender<FollowerMessage>,
    cancel: CancellationToken,
}

impl Tail {
    async fn run(&mut self) -> Stop {
        let mut buf = Vec::with_capacity(1024);
        loop {
            buf.clear();
            let res = select! {
                biased;

                _ = self.cancel.cancelled() => return Stop::Cancelled,
                res = self.reader.read_until(b'\n', &mut buf) => res,
            };

            let step = match res {
                Ok(0) => self.at_eof().await,
                Ok(_) if buf.last() != Some(&b'\n') => {
                    self.fragment.extend_from_slice(&buf);
                    Ok(())
                }
                Ok(n) => {
                    let line_start = self.offset;
                    self.offset += (self.fragment.len() + n) as u64;
                    let line = self.complete_line(&buf);
                    self.dispatch(line, line_start).await
                }
                Err(e) => {
                    error!(source = %self.settings.source, path = %self.path, error = %e,
                        "Failed to read file, stopping follower");
                    Err(Stop::Terminated)
                }
            };

            if let Err(stop) = step {
                return stop;
            }
        }
    }

    /// Join the pending fragment with `buf` and strip the line ending.
    fn complete_line(&mut self, buf: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.fragment);
        bytes.extend_from_slice(buf);

        bytes.pop();
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    async fn dispatch(&mut self, line: String, line_start: u64) -> std::result::Result<(), Stop> {
        let starts_record = self.settings.boundary.as_ref().map(|re| re.is_match(&line));

        match starts_record {
            None => self.emit(line, self.offset).await,
            Some(starts_record) => {
                // resuming from line_start rebuilds the record this line opens
                if starts_record && !self.record.is_empty() {
                    let record = std::mem::take(&mut self.record);
                    self.emit(record, line_start).await?;
                }
                self.record.push_str(&line);
                self.record.push_str(&self.settings.terminator);
                Ok(())
            }
        }
    }

    async fn emit(&mut self, body: String, offset: u64) -> std::result::Result<(), Stop> {
        let record = match &self.settings.prefix {
            Some(prefix) => format!("{}{}", prefix, body),
            None => body,
        };
        let message = FollowerMessage {
            path: self.path.clone(),
            offset,
            record,
        };

        match self.tx.send_or_cancel(message, &self.cancel).await {
            Ok(()) => Ok(()),
            Err(SendError::Cancelled) => Err(Stop::Cancelled),
            Err(SendError::Disconnected) => {
                debug!(path = %self.path, "Record queue closed, stopping follower");
                Err(Stop::Terminated)
            }
        }
    }

    async fn at_eof(&mut self) -> std::result::Result<(), Stop> {
        let size = match self.reader.get_ref().metadata().await {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                error!(source = %self.settings.source, path = %self.path, error = %e,
                    "Failed to stat file, stopping follower");
                return Err(Stop::Terminated);
            }
        };

        if size < self.offset {
            info!(source = %self.settings.source, path = %self.path, offset = self.offset, size,
                "File truncated, reading from the start");
            if let Err(e) = self.reader.seek(SeekFrom::Start(0)).await {
                error!(source = %self.settings.source, path = %self.path, error = %e,
                    "Failed to rewind truncated file, stopping follower");
                return Err(Stop::Terminated);
            }
            self.offset = 0;
            self.fragment.clear();
            self.record.clear();
            return Ok(());
        }

        match FileId::from_path(&self.path).await {
            Err(e) => {
                error!(source = %self.settings.source, path = %self.path, error = %e,
                    "File moved and nothing replaced it, stopping follower");
                Err(Stop::Terminated)
            }
            Ok(id) if id != self.file_id => self.reopen(id).await,
            Ok(_) => {
                select! {
                    biased;

                    _ = self.cancel.cancelled() => Err(Stop::Cancelled),
                    _ = tokio::time::sleep(self.settings.idle_interval) => Ok(()),
                }
            }
        }
    }

    async fn reopen(&mut self, id: FileId) -> std::result::Result<(), Stop> {
        let file = match File::open(Path::new(&self.path)).await {
            Ok(file) => file,
            Err(e) => {
                error!(source = %self.settings.source, path = %self.path, error = %e,
                    "Failed to open rotated file, stopping follower");
                return Err(Stop::Terminated);
            }
        };

        info!(source = %self.settings.source, path = %self.path, old = %self.file_id, new = %id,
            "File rotated, following the new file");

        self.file_id = FileId::from_file(&file).await.unwrap_or(id);
        self.reader = BufReader::new(file);
        self.offset = 0;
        self.fragment.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounded_channel::{BoundedReceiver, bounded};
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use tempfile::TempDir;
    use tokio::time::timeout;
    use tokio_test::{assert_pending, task};

    const WAIT: Duration = Duration::from_secs(5);

    fn settings() -> FollowerSettings {
        FollowerSettings {
            source: "test".to_string(),
            prefix: None,
            terminator: "\n".to_string(),
            boundary: None,
            idle_interval: Duration::from_millis(10),
        }
    }

    fn multiline(pattern: &str, terminator: &str) -> FollowerSettings {
        FollowerSettings {
            boundary: Some(Regex::new(pattern).unwrap()),
            terminator: terminator.to_string(),
            ..settings()
        }
    }

    fn append(path: &Path, data: &str) {
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(data.as_bytes()).unwrap();
    }

    async fn next(rx: &mut BoundedReceiver<FollowerMessage>) -> FollowerMessage {
        timeout(WAIT, rx.next()).await.unwrap().unwrap()
    }

    async fn assert_quiet(rx: &mut BoundedReceiver<FollowerMessage>) {
        assert!(timeout(Duration::from_millis(100), rx.next()).await.is_err());
    }

    async fn follow(
        path: &Path,
        offset: u64,
        settings: FollowerSettings,
    ) -> (FileFollower, BoundedReceiver<FollowerMessage>) {
        let (tx, rx) = bounded(100);
        let follower = FileFollower::start(
            path.to_str().unwrap(),
            offset,
            settings,
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();
        (follower, rx)
    }

    #[tokio::test]
    async fn test_single_line_offsets() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "a\nb\r\nc\n").unwrap();

        let (follower, mut rx) = follow(&path, 0, settings()).await;
        assert_eq!(follower.state(), FollowerState::Running);

        let expected = [("a", 2), ("b", 5), ("c", 7)];
        for (record, offset) in expected {
            let msg = next(&mut rx).await;
            assert_eq!(msg.record, record);
            assert_eq!(msg.offset, offset);
            assert_eq!(msg.path, path.to_str().unwrap());
        }

        follower.close().await;
    }

    #[tokio::test]
    async fn test_empty_line_is_a_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "\nx\n").unwrap();

        let (follower, mut rx) = follow(&path, 0, settings()).await;
        assert_eq!(next(&mut rx).await.record, "");
        assert_eq!(next(&mut rx).await.record, "x");
        follower.close().await;
    }

    #[tokio::test]
    async fn test_partial_line_completed_later() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "hel").unwrap();

        let (follower, mut rx) = follow(&path, 0, settings()).await;
        assert_quiet(&mut rx).await;

        append(&path, "lo\n");
        let msg = next(&mut rx).await;
        assert_eq!(msg.record, "hello");
        assert_eq!(msg.offset, 6);

        follower.close().await;
    }

    #[tokio::test]
    async fn test_resume_from_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "skip\nkeep\n").unwrap();

        let (follower, mut rx) = follow(&path, 5, settings()).await;
        let msg = next(&mut rx).await;
        assert_eq!(msg.record, "keep");
        assert_eq!(msg.offset, 10);

        follower.close().await;
    }

    #[tokio::test]
    async fn test_hostname_prefix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "started\n").unwrap();

        let settings = FollowerSettings {
            prefix: Some("web-01 ".to_string()),
            ..settings()
        };
        let (follower, mut rx) = follow(&path, 0, settings).await;
        assert_eq!(next(&mut rx).await.record, "web-01 started");

        follower.close().await;
    }

    #[tokio::test]
    async fn test_multiline_records_split_on_boundary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "1 first\n  cont\n2 second\n").unwrap();

        let (follower, mut rx) = follow(&path, 0, multiline(r"^\d", "\n")).await;

        let msg = next(&mut rx).await;
        assert_eq!(msg.record, "1 first\n  cont\n");
        // start of the boundary line that completed it
        assert_eq!(msg.offset, 15);

        // the second record waits for the next boundary
        assert_quiet(&mut rx).await;
        append(&path, "3 third\n");

        let msg = next(&mut rx).await;
        assert_eq!(msg.record, "2 second\n");
        assert_eq!(msg.offset, 24);

        follower.close().await;
    }

    #[tokio::test]
    async fn test_multiline_resume_from_record_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "1 first\n  cont\n2 second\n3 third\n").unwrap();

        // 15 is the offset queued with "1 first\n  cont\n"
        let (follower, mut rx) = follow(&path, 15, multiline(r"^\d", "\n")).await;

        let msg = next(&mut rx).await;
        assert_eq!(msg.record, "2 second\n");
        assert_eq!(msg.offset, 24);

        follower.close().await;
    }

    #[tokio::test]
    async fn test_multiline_lines_before_first_boundary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "orphan\nSTART one\nSTART two\n").unwrap();

        let (follower, mut rx) = follow(&path, 0, multiline("^START", " | ")).await;

        assert_eq!(next(&mut rx).await.record, "orphan | ");
        assert_eq!(next(&mut rx).await.record, "START one | ");
        assert_quiet(&mut rx).await;

        follower.close().await;
    }

    #[tokio::test]
    async fn test_truncation_restarts_at_zero() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "aaaa\nbbbb\n").unwrap();

        let (follower, mut rx) = follow(&path, 0, settings()).await;
        assert_eq!(next(&mut rx).await.offset, 5);
        assert_eq!(next(&mut rx).await.offset, 10);

        fs::write(&path, "c\n").unwrap();

        let msg = next(&mut rx).await;
        assert_eq!(msg.record, "c");
        assert_eq!(msg.offset, 2);

        follower.close().await;
    }

    #[tokio::test]
    async fn test_truncation_drops_pending_record_and_fragment() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "S one\ncont\nS two\nmore\npartial").unwrap();

        let (follower, mut rx) = follow(&path, 0, multiline("^S", "\n")).await;
        let msg = next(&mut rx).await;
        assert_eq!(msg.record, "S one\ncont\n");
        assert_eq!(msg.offset, 11);
        // "S two\nmore\n" is open and "partial" is buffered
        assert_quiet(&mut rx).await;

        fs::File::create(&path).unwrap();
        append(&path, "S three\nS four\n");

        let msg = next(&mut rx).await;
        assert_eq!(msg.record, "S three\n");
        assert_eq!(msg.offset, 8);

        follower.close().await;
    }

    #[tokio::test]
    async fn test_offset_past_end_is_truncation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "short\n").unwrap();

        let (follower, mut rx) = follow(&path, 120, settings()).await;
        let msg = next(&mut rx).await;
        assert_eq!(msg.record, "short");
        assert_eq!(msg.offset, 6);

        follower.close().await;
    }

    #[tokio::test]
    async fn test_rotation_follows_new_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "old\n").unwrap();

        let (follower, mut rx) = follow(&path, 0, settings()).await;
        assert_eq!(next(&mut rx).await.record, "old");

        let staged = dir.path().join("app.log.new");
        fs::write(&staged, "new one\n").unwrap();
        fs::rename(&staged, &path).unwrap();

        let msg = next(&mut rx).await;
        assert_eq!(msg.record, "new one");
        assert_eq!(msg.offset, 8);
        assert_eq!(follower.state(), FollowerState::Running);

        follower.close().await;
    }

    #[tokio::test]
    async fn test_rotation_keeps_open_record_and_drops_fragment() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "S one\ncont\npart").unwrap();

        let (follower, mut rx) = follow(&path, 0, multiline("^S", "\n")).await;
        assert_quiet(&mut rx).await;

        let staged = dir.path().join("app.log.new");
        fs::write(&staged, "more\nS two\n").unwrap();
        fs::rename(&staged, &path).unwrap();

        let msg = next(&mut rx).await;
        assert_eq!(msg.record, "S one\ncont\nmore\n");
        // start of "S two" in the new file
        assert_eq!(msg.offset, 5);

        follower.close().await;
    }

    #[tokio::test]
    async fn test_removed_file_terminates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "line\n").unwrap();

        let (follower, mut rx) = follow(&path, 0, settings()).await;
        assert_eq!(next(&mut rx).await.record, "line");

        fs::remove_file(&path).unwrap();

        let mut state = follower.state_changes();
        timeout(WAIT, state.wait_for(|s| *s == FollowerState::Closed))
            .await
            .unwrap()
            .unwrap();

        // a terminated follower never reports Closing
        let mut closing = task::spawn(follower.close());
        let _ = closing.poll();
        assert_eq!(*state.borrow_and_update(), FollowerState::Closed);
        timeout(WAIT, closing).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_while_queue_full() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "a\nb\nc\n").unwrap();

        let (tx, mut rx) = bounded(1);
        let follower = FileFollower::start(
            path.to_str().unwrap(),
            0,
            settings(),
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let mut state = follower.state_changes();
        timeout(WAIT, follower.close()).await.unwrap();
        assert_eq!(*state.borrow_and_update(), FollowerState::Closed);
        assert_eq!(rx.drain_ready().len(), 1);
    }

    #[tokio::test]
    async fn test_close_reports_closing_until_released() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "a\n").unwrap();

        let (follower, mut rx) = follow(&path, 0, settings()).await;
        assert_eq!(next(&mut rx).await.record, "a");

        let mut state = follower.state_changes();
        let mut closing = task::spawn(follower.close());
        assert_pending!(closing.poll());
        assert_eq!(*state.borrow_and_update(), FollowerState::Closing);

        timeout(WAIT, closing).await.unwrap();
        assert_eq!(*state.borrow_and_update(), FollowerState::Closed);
        // the follower held the only sender
        assert_eq!(timeout(WAIT, rx.next()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_parent_cancel_stops_follower() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "").unwrap();

        let (tx, _rx) = bounded(1);
        let parent = CancellationToken::new();
        let follower = FileFollower::start(
            path.to_str().unwrap(),
            0,
            settings(),
            tx,
            parent.child_token(),
        )
        .await
        .unwrap();

        parent.cancel();
        let mut state = follower.state_changes();
        timeout(WAIT, state.wait_for(|s| *s == FollowerState::Closed))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_fails_to_start() {
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = bounded(1);

        let result = FileFollower::start(
            dir.path().join("nope.log").to_str().unwrap(),
            0,
            settings(),
            tx,
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(Error::Open { .. })));
    }
}
