// SPDX-License-Identifier: Apache-2.0

//! Kafka producer.
//!
//! Publishes record batches to Apache Kafka using the rdkafka library. Only
//! built with the `rdkafka` feature.

pub mod config;
pub mod errors;
pub mod producer;

#[cfg(test)]
mod tests;

pub use config::{AcknowledgementMode, KafkaProducerConfig};
pub use producer::KafkaProducer;
