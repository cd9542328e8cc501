// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tracing::{debug, info};

use crate::exporters::kafka::config::KafkaProducerConfig;
use crate::exporters::kafka::errors::{KafkaExportError, Result};
use crate::exporters::producer::{BrokerProducer, ProduceError, ProduceFuture, RecordBatch};

/// Publishes record batches with a librdkafka `FutureProducer`.
///
/// Every record of a batch is enqueued at once; the batch succeeds only when
/// every delivery report is positive.
pub struct KafkaProducer {
    producer: FutureProducer,
    request_timeout: Duration,
}

impl KafkaProducer {
    pub fn new(config: &KafkaProducerConfig) -> Result<Self> {
        let producer: FutureProducer = config.build_client_config().create().map_err(|e| {
            KafkaExportError::ConfigurationError(format!("Failed to create producer: {}", e))
        })?;

        info!(brokers = %config.brokers, client_id = %config.client_id, "Created Kafka producer");

        Ok(Self {
            producer,
            request_timeout: Duration::from_millis(config.request_timeout_ms as u64),
        })
    }

    async fn send_batch(&self, topic: &str, batch: &RecordBatch) -> Result<()> {
        let mut sends: FuturesUnordered<_> = batch
            .records()
            .iter()
            .map(|r| {
                let record = FutureRecord::to(topic)
                    .key(&r.key[..])
                    .payload(&r.value[..]);
                self.producer.send(record, Timeout::After(self.request_timeout))
            })
            .collect();

        let mut result = Ok(());
        while let Some(res) = sends.next().await {
            if let Err(e) = res {
                // keep draining so no delivery report is left pending
                result = Err(KafkaExportError::from(e));
            }
        }

        if result.is_ok() {
            debug!(topic, records = batch.len(), "Batch delivered to Kafka");
        }
        result
    }
}

impl BrokerProducer for KafkaProducer {
    fn produce<'a>(&'a self, topic: &'a str, batch: &'a RecordBatch) -> ProduceFuture<'a> {
        Box::pin(async move { self.send_batch(topic, batch).await.map_err(ProduceError::from) })
    }

    fn name(&self) -> &'static str {
        "kafka"
    }
}

impl Drop for KafkaProducer {
    fn drop(&mut self) {
        let _ = self.producer.flush(Timeout::After(Duration::from_secs(5)));
    }
}
