// SPDX-License-Identifier: Apache-2.0

//! Broker producer boundary.
//!
//! A source watcher accumulates records in a [`RecordBatch`] and hands the
//! whole batch to a [`BrokerProducer`] together with the source's topic. A
//! batch is either accepted in full or rejected; the watcher retries rejected
//! batches unchanged.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProduceError {
    /// The broker rejected or failed to acknowledge the batch
    #[error("delivery failed: {0}")]
    Delivery(String),
}

pub type ProduceFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ProduceError>> + Send + 'a>>;

/// One key/value record awaiting delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRecord {
    pub key: Bytes,
    pub value: Bytes,
}

/// Records waiting for a single produce call.
#[derive(Debug, Default, Clone)]
pub struct RecordBatch {
    records: Vec<BatchRecord>,
}

impl RecordBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and return the number now pending.
    pub fn add(&mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> usize {
        self.records.push(BatchRecord {
            key: key.into(),
            value: value.into(),
        });
        self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn reset(&mut self) {
        self.records.clear();
    }

    pub fn records(&self) -> &[BatchRecord] {
        &self.records
    }
}

/// Publishes batches to a named topic.
pub trait BrokerProducer: Send + Sync + 'static {
    /// Deliver every record of `batch` to `topic`. Resolves to `Ok` only once
    /// the broker has acknowledged all of them.
    fn produce<'a>(&'a self, topic: &'a str, batch: &'a RecordBatch) -> ProduceFuture<'a>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}
