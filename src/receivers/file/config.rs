// SPDX-License-Identifier: Apache-2.0

//! Configuration for a single log source.

use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::receivers::file::error::{Error, Result};

/// Separator between the hostname prefix and the record body.
pub const HOSTNAME_SEPARATOR: &str = " ";

/// One source definition, loaded from its own JSON file.
///
/// Field names on disk are PascalCase (`Path`, `Topic`, `FirstLineRegex`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SourceConfig {
    /// Glob pattern selecting the files to tail
    pub path: String,
    /// Broker topic records are published to
    pub topic: String,
    /// Assemble records spanning several physical lines
    #[serde(default)]
    pub multiline: bool,
    /// Pattern matching the first line of a multiline record
    #[serde(default)]
    pub first_line_regex: String,
    /// Replace the newline between lines of a multiline record
    #[serde(default)]
    pub replace_newline: bool,
    /// Replacement used when `replace_newline` is set
    #[serde(default)]
    pub newline_replacement: String,
    /// Read newly discovered files from offset 0 instead of tailing them
    #[serde(default)]
    pub from_beginning: bool,
    /// Prefix every record with a hostname
    #[serde(default)]
    pub prepend_hostname: bool,
    /// Hostname to prefix instead of the machine's own
    #[serde(default)]
    pub hostname_override: String,

    /// Source name (config file name). Names the status file.
    #[serde(skip)]
    pub name: String,
    /// Resolved machine hostname, filled in at startup
    #[serde(skip)]
    pub hostname: String,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>, path: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            topic: topic.into(),
            ..Default::default()
        }
    }

    /// Parse a config file body. `name` is the file name it was read from.
    pub fn from_json(name: &str, bytes: &[u8]) -> Result<Self> {
        let mut config: SourceConfig = serde_json::from_slice(bytes)?;
        if config.path.is_empty() || config.topic.is_empty() {
            return Err(Error::Config(format!("{}: Path and Topic are required", name)));
        }
        config.name = name.to_string();
        Ok(config)
    }

    /// Prefix put in front of every record, if any.
    pub fn record_prefix(&self) -> Option<String> {
        if !self.prepend_hostname {
            return None;
        }
        let host = if self.hostname_override.is_empty() {
            &self.hostname
        } else {
            &self.hostname_override
        };
        Some(format!("{}{}", host, HOSTNAME_SEPARATOR))
    }

    /// Terminator appended to each line of a multiline record.
    pub fn line_terminator(&self) -> &str {
        if self.replace_newline {
            &self.newline_replacement
        } else {
            "\n"
        }
    }

    /// Compile the boundary pattern. `None` in single-line mode.
    pub fn boundary_regex(&self) -> Result<Option<Regex>> {
        if !self.multiline {
            return Ok(None);
        }
        Ok(Some(Regex::new(&self.first_line_regex)?))
    }
}

/// Timing and sizing of a source watcher and its followers.
#[derive(Debug, Clone)]
pub struct SourceWatcherConfig {
    /// Interval between glob discovery passes
    pub discovery_interval: Duration,
    /// Interval between flush requests to the batch collector
    pub flush_interval: Duration,
    /// Delay before re-sending a batch the broker rejected
    pub retry_delay: Duration,
    /// A send is forced once the pending batch holds more than this many records
    pub max_batch_records: usize,
    /// Capacity of the follower -> watcher queue
    pub queue_capacity: usize,
    /// How long a follower sleeps after reaching end of file
    pub idle_interval: Duration,
}

impl Default for SourceWatcherConfig {
    fn default() -> Self {
        Self {
            discovery_interval: Duration::from_secs(60),
            flush_interval: Duration::from_secs(1),
            retry_delay: Duration::from_millis(500),
            max_batch_records: 1000,
            queue_capacity: 10_000,
            idle_interval: Duration::from_secs(1),
        }
    }
}
