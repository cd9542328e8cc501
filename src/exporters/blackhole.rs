// SPDX-License-Identifier: Apache-2.0

use tracing::debug;

use crate::exporters::producer::{BrokerProducer, ProduceFuture, RecordBatch};

/// Accepts every batch and drops it. Used for dry runs without a broker.
#[derive(Debug, Default, Clone)]
pub struct BlackholeProducer;

impl BlackholeProducer {
    pub fn new() -> Self {
        BlackholeProducer
    }
}

impl BrokerProducer for BlackholeProducer {
    fn produce<'a>(&'a self, topic: &'a str, batch: &'a RecordBatch) -> ProduceFuture<'a> {
        Box::pin(async move {
            debug!(topic, records = batch.len(), "Discarding batch");
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "blackhole"
    }
}
