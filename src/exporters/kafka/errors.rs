// SPDX-License-Identifier: Apache-2.0

use rdkafka::error::KafkaError;
use thiserror::Error;

use crate::exporters::producer::ProduceError;

/// Errors that can occur while talking to Kafka
#[derive(Error, Debug)]
pub enum KafkaExportError {
    /// Error from Kafka producer
    #[error("Kafka producer error: {0}")]
    ProducerError(#[from] KafkaError),

    /// Configuration error
    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),
}

impl From<(KafkaError, rdkafka::message::OwnedMessage)> for KafkaExportError {
    fn from((error, _): (KafkaError, rdkafka::message::OwnedMessage)) -> Self {
        KafkaExportError::ProducerError(error)
    }
}

impl From<KafkaExportError> for ProduceError {
    fn from(e: KafkaExportError) -> Self {
        ProduceError::Delivery(e.to_string())
    }
}

/// Result type for Kafka operations
pub type Result<T> = std::result::Result<T, KafkaExportError>;
