// SPDX-License-Identifier: Apache-2.0

//! File tailing pipeline.
//!
//! Each configured source gets a [`SourceWatcher`] that expands the source's
//! glob pattern, runs one [`FileFollower`] per matching file, batches the
//! records they produce and hands the batches to a broker producer. Read
//! progress is tracked per file in a [`StatusStore`] and checkpointed after
//! every confirmed send, so a restart resumes where delivery left off.
//!
//! Features:
//! - Single-line or regex-delimited multiline records
//! - Truncation and rotation detection (device + inode)
//! - Backpressure from the broker down to disk reads through a bounded queue

pub mod config;
pub mod error;
pub mod follower;
pub mod input;
pub mod source;
pub mod status;

pub use config::{SourceConfig, SourceWatcherConfig};
pub use error::{Error, Result};
pub use follower::{FileFollower, FollowerMessage, FollowerSettings, FollowerState};
pub use input::{FileId, GlobFileFinder};
pub use source::{SourceWatcher, WatcherState};
pub use status::{Status, StatusStore};
