// SPDX-License-Identifier: Apache-2.0

//! Source watcher: one per configured source.
//!
//! Three tasks cooperate per source:
//!
//! * discovery expands the glob (immediately, then every discovery interval)
//!   and starts a [`FileFollower`] for each new path. It also drives shutdown.
//! * the batch collector moves queued records into the pending batch,
//!   records their offsets in the status store and sends the batch once it
//!   grows past the size limit or a flush is requested.
//! * the flush ticker requests a flush every flush interval and waits for the
//!   acknowledgement before scheduling the next one.
//!
//! The status store is the only state shared between the tasks. A successful
//! send is followed by [`StatusStore::dump`], which is the durable checkpoint.
//!
//! [`SourceWatcher::close`] delivers everything already read before it
//! returns. Dropping a running watcher instead aborts all of its tasks: pending
//! records are discarded and nothing more is checkpointed, so they are read
//! again on the next start.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::select;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bounded_channel::{BoundedReceiver, BoundedSender, bounded};
use crate::exporters::producer::{BrokerProducer, RecordBatch};
use crate::receivers::file::config::{SourceConfig, SourceWatcherConfig};
use crate::receivers::file::error::Result;
use crate::receivers::file::follower::{FileFollower, FollowerMessage, FollowerSettings};
use crate::receivers::file::input::GlobFileFinder;
use crate::receivers::file::status::{SharedStatusStore, Status, StatusStore, lock_store};

const FLUSH_CHAN_SIZE: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Init,
    Running,
    Closing,
    Closed,
}

#[derive(Debug)]
struct FlushRequest {
    ack: oneshot::Sender<()>,
}

pub struct SourceWatcher {
    name: String,
    cancel: CancellationToken,
    abort: CancellationToken,
    state: watch::Receiver<WatcherState>,
    store: SharedStatusStore,
    handle: JoinHandle<()>,
}

impl SourceWatcher {
    /// Start watching `config.path`.
    ///
    /// `store` holds the statuses loaded for this source, if any; it is
    /// checkpointed to `var_dir/<config.name>`. Fails without spawning anything
    /// if the glob or the boundary pattern is invalid.
    pub fn start(
        config: SourceConfig,
        store: StatusStore,
        var_dir: &Path,
        producer: Arc<dyn BrokerProducer>,
        watcher_config: SourceWatcherConfig,
    ) -> Result<Self> {
        let (state_tx, state_rx) = watch::channel(WatcherState::Init);

        let finder = GlobFileFinder::new(config.path.clone())?;
        let settings = FollowerSettings::from_config(&config, &watcher_config)?;

        let store: SharedStatusStore = Arc::new(Mutex::new(store));
        let status_path = var_dir.join(&config.name);
        let abort = CancellationToken::new();
        let cancel = abort.child_token();

        let (records_tx, records_rx) = bounded(watcher_config.queue_capacity);
        let (flush_tx, flush_rx) = bounded(FLUSH_CHAN_SIZE);

        let collector_cancel = CancellationToken::new();
        let collector = BatchCollector {
            source: config.name.clone(),
            topic: config.topic.clone(),
            records: records_rx,
            flush_requests: flush_rx,
            batch: RecordBatch::new(),
            store: store.clone(),
            status_path: status_path.clone(),
            producer,
            max_batch_records: watcher_config.max_batch_records,
            retry_delay: watcher_config.retry_delay,
            cancel: collector_cancel.clone(),
            abort: abort.clone(),
        };
        let collector_handle = tokio::spawn(collector.run());

        let ticker_cancel = CancellationToken::new();
        let ticker = FlushTicker {
            flush_requests: flush_tx,
            interval: watcher_config.flush_interval,
            cancel: ticker_cancel.clone(),
        };
        let ticker_handle = tokio::spawn(ticker.run());

        let discovery = Discovery {
            source: config.name.clone(),
            config,
            finder,
            settings,
            store: store.clone(),
            status_path,
            followers: HashMap::new(),
            records: records_tx,
            interval: watcher_config.discovery_interval,
            cancel: cancel.clone(),
            state: state_tx,
            collector: (collector_cancel, collector_handle),
            ticker: (ticker_cancel, ticker_handle),
        };
        let name = discovery.source.clone();

        let _ = discovery.state.send(WatcherState::Running);
        info!(source = %name, pattern = %discovery.finder.pattern(), "Started source watcher");
        let handle = tokio::spawn(discovery.run());

        Ok(Self {
            name,
            cancel,
            abort,
            state: state_rx,
            store,
            handle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WatcherState {
        *self.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<WatcherState> {
        self.state.clone()
    }

    /// Current status of `path`, if it is tracked.
    pub fn status(&self, path: &str) -> Option<Status> {
        lock_store(&self.store).get_status(path).cloned()
    }

    /// Stop discovery, close every follower, deliver what is still pending and
    /// wait for all of it to finish.
    ///
    /// With an unreachable broker this waits until the final send succeeds.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.handle).await {
            error!(source = %self.name, error = ?e, "Source watcher task failed");
        }
    }
}

impl Drop for SourceWatcher {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            warn!(source = %self.name, "Source watcher dropped while running, discarding pending records");
            self.abort.cancel();
        }
    }
}

struct Discovery {
    source: String,
    config: SourceConfig,
    finder: GlobFileFinder,
    settings: FollowerSettings,
    store: SharedStatusStore,
    status_path: PathBuf,
    followers: HashMap<String, FileFollower>,
    records: BoundedSender<FollowerMessage>,
    interval: Duration,
    cancel: CancellationToken,
    state: watch::Sender<WatcherState>,
    collector: (CancellationToken, JoinHandle<()>),
    ticker: (CancellationToken, JoinHandle<()>),
}

impl Discovery {
    async fn run(mut self) {
        let mut first_pass = true;
        loop {
            if let Err(e) = self.discover(first_pass).await {
                error!(source = %self.source, error = %e, "Unable to expand path pattern, stopping source watcher");
                break;
            }
            first_pass = false;

            select! {
                biased;

                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.shutdown().await;
    }

    async fn discover(&mut self, first_pass: bool) -> Result<()> {
        let paths = self.finder.find_files()?;
        let had_statuses = !lock_store(&self.store).is_empty();

        for path in paths {
            if self.cancel.is_cancelled() {
                break;
            }

            let Some(key) = path.to_str().map(str::to_string) else {
                warn!(source = %self.source, path = ?path, "Skipping non UTF-8 path");
                continue;
            };
            // terminated followers stay here and are not restarted
            if self.followers.contains_key(&key) {
                continue;
            }

            let Some(offset) = self.start_offset(&key, first_pass, had_statuses).await else {
                continue;
            };

            match FileFollower::start(
                key.clone(),
                offset,
                self.settings.clone(),
                self.records.clone(),
                self.cancel.child_token(),
            )
            .await
            {
                Ok(follower) => {
                    self.followers.insert(key, follower);
                }
                Err(e) => {
                    error!(source = %self.source, path = %key, error = %e, "Failed to start follower, will retry");
                }
            }
        }

        lock_store(&self.store).persist(&self.status_path);
        Ok(())
    }

    /// Offset a new follower for `path` starts at, creating its status if needed.
    async fn start_offset(&self, path: &str, first_pass: bool, had_statuses: bool) -> Option<u64> {
        let existing = lock_store(&self.store).get_status(path).map(|s| s.last_offset);
        if existing.is_some() {
            return existing;
        }

        if self.config.from_beginning || !first_pass || had_statuses {
            info!(source = %self.source, path, "Discovered file, reading from the start");
            lock_store(&self.store).add_status(Status::new(path, 0, 0));
            return Some(0);
        }

        match tokio::fs::metadata(path).await {
            Ok(metadata) => {
                let size = metadata.len();
                info!(source = %self.source, path, offset = size, "Discovered file, tailing new content");
                lock_store(&self.store).add_status(Status::new(path, size, size));
                Some(size)
            }
            Err(e) => {
                error!(source = %self.source, path, error = %e, "Failed to stat discovered file");
                None
            }
        }
    }

    async fn shutdown(mut self) {
        let _ = self.state.send(WatcherState::Closing);
        info!(source = %self.source, followers = self.followers.len(), "Closing source watcher");

        // stop any follower still running, including on a self-inflicted shutdown
        self.cancel.cancel();
        for (_, follower) in self.followers.drain() {
            follower.close().await;
        }

        let (ticker_cancel, ticker_handle) = self.ticker;
        ticker_cancel.cancel();
        if let Err(e) = ticker_handle.await {
            error!(source = %self.source, error = ?e, "Flush ticker task failed");
        }

        // the collector drains the queue and flushes on the way out
        drop(self.records);
        let (collector_cancel, collector_handle) = self.collector;
        collector_cancel.cancel();
        if let Err(e) = collector_handle.await {
            error!(source = %self.source, error = ?e, "Batch collector task failed");
        }

        let _ = self.state.send(WatcherState::Closed);
        info!(source = %self.source, "Source watcher closed");
    }
}

struct BatchCollector {
    source: String,
    topic: String,
    records: BoundedReceiver<FollowerMessage>,
    flush_requests: BoundedReceiver<FlushRequest>,
    batch: RecordBatch,
    store: SharedStatusStore,
    status_path: PathBuf,
    producer: Arc<dyn BrokerProducer>,
    max_batch_records: usize,
    retry_delay: Duration,
    cancel: CancellationToken,
    // stop without delivering or checkpointing
    abort: CancellationToken,
}

impl BatchCollector {
    async fn run(mut self) {
        loop {
            select! {
                biased;

                _ = self.abort.cancelled() => {
                    debug!(source = %self.source, records = self.batch.len(), "Batch collector aborted");
                    return;
                },
                _ = self.cancel.cancelled() => break,

                Some(req) = self.flush_requests.next() => {
                    self.flush().await;
                    let _ = req.ack.send(());
                },

                msg = self.records.next() => match msg {
                    Some(msg) => self.accept(msg).await,
                    None => break,
                },
            }
        }

        for msg in self.records.drain_ready() {
            self.accept(msg).await;
        }
        self.flush().await;
        debug!(source = %self.source, "Batch collector stopped");
    }

    async fn accept(&mut self, msg: FollowerMessage) {
        if !lock_store(&self.store).set_current_offset(&msg.path, msg.offset) {
            warn!(source = %self.source, path = %msg.path, "Record for untracked path");
        }

        let pending = self.batch.add(Bytes::new(), msg.record);
        if pending > self.max_batch_records {
            self.send().await;
        }
    }

    async fn flush(&mut self) {
        if !self.batch.is_empty() {
            self.send().await;
        }
    }

    /// Deliver the pending batch, retrying until the producer accepts it, then
    /// checkpoint. An abort leaves the batch and the checkpoint untouched.
    async fn send(&mut self) {
        let mut attempt: u64 = 1;
        loop {
            let res = select! {
                biased;

                _ = self.abort.cancelled() => return,
                res = self.producer.produce(&self.topic, &self.batch) => res,
            };
            let Err(e) = res else { break };

            warn!(source = %self.source, producer = self.producer.name(), records = self.batch.len(),
                attempt, error = %e, "Failed to send batch, retrying");
            select! {
                biased;

                _ = self.abort.cancelled() => return,
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
            attempt += 1;
        }

        debug!(source = %self.source, topic = %self.topic, records = self.batch.len(), attempt, "Sent batch");
        self.batch.reset();
        lock_store(&self.store).dump(&self.status_path);
    }
}

struct FlushTicker {
    flush_requests: BoundedSender<FlushRequest>,
    interval: Duration,
    cancel: CancellationToken,
}

impl FlushTicker {
    async fn run(self) {
        loop {
            select! {
                biased;

                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            let (ack_tx, ack_rx) = oneshot::channel();
            let req = FlushRequest { ack: ack_tx };
            if self.flush_requests.send_or_cancel(req, &self.cancel).await.is_err() {
                break;
            }

            select! {
                biased;

                _ = self.cancel.cancelled() => break,
                _ = ack_rx => {}
            }
        }
    }
}
