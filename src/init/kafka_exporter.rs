// SPDX-License-Identifier: Apache-2.0

use clap::{Args, ValueEnum};

#[cfg(feature = "rdkafka")]
use crate::exporters::kafka::config::{AcknowledgementMode, KafkaProducerConfig};
use crate::init::parse;

#[derive(Debug, Args, Clone)]
pub struct KafkaExporterArgs {
    /// Acknowledgement mode (none, one, all)
    #[arg(value_enum, long, env = "LOGROCKET_KAFKA_ACKS", default_value = "one")]
    pub kafka_acks: KafkaAcknowledgementMode,

    /// Compression type (gzip, snappy, lz4, zstd, none)
    #[arg(long, env = "LOGROCKET_KAFKA_COMPRESSION")]
    pub kafka_compression: Option<String>,

    /// Request timeout in milliseconds
    #[arg(long, env = "LOGROCKET_KAFKA_REQUEST_TIMEOUT", default_value = "30000")]
    pub kafka_request_timeout: u32,

    /// Message delivery timeout in milliseconds
    #[arg(long, env = "LOGROCKET_KAFKA_MESSAGE_TIMEOUT", default_value = "300000")]
    pub kafka_message_timeout: u32,

    /// Comma-separated key=value librdkafka properties, applied last
    #[arg(long, env = "LOGROCKET_KAFKA_PRODUCER_CONFIG", value_parser = parse::parse_key_val::<String, String>, value_delimiter = ',')]
    pub kafka_producer_config: Vec<(String, String)>,
}

impl Default for KafkaExporterArgs {
    fn default() -> Self {
        Self {
            kafka_acks: KafkaAcknowledgementMode::One,
            kafka_compression: None,
            kafka_request_timeout: 30000,
            kafka_message_timeout: 300000,
            kafka_producer_config: Vec::new(),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum KafkaAcknowledgementMode {
    /// No acknowledgement required (acks=0)
    None,
    /// Wait for leader acknowledgement only (acks=1)
    One,
    /// Wait for all in-sync replicas (acks=all)
    All,
}

#[cfg(feature = "rdkafka")]
impl From<KafkaAcknowledgementMode> for AcknowledgementMode {
    fn from(value: KafkaAcknowledgementMode) -> Self {
        match value {
            KafkaAcknowledgementMode::None => AcknowledgementMode::None,
            KafkaAcknowledgementMode::One => AcknowledgementMode::One,
            KafkaAcknowledgementMode::All => AcknowledgementMode::All,
        }
    }
}

#[cfg(feature = "rdkafka")]
impl KafkaExporterArgs {
    pub fn build_config(&self, hosts: &[String], client_id: &str) -> KafkaProducerConfig {
        let mut config = KafkaProducerConfig::new(hosts)
            .with_client_id(client_id.to_string())
            .with_acks(self.kafka_acks.into())
            .with_request_timeout_ms(self.kafka_request_timeout)
            .with_message_timeout_ms(self.kafka_message_timeout)
            .with_custom_config(self.kafka_producer_config.clone());

        let compression = self.kafka_compression.as_ref().filter(|c| c.as_str() != "none");
        if let Some(compression) = compression {
            config = config.with_compression(compression.clone());
        }

        config
    }
}

#[cfg(all(test, feature = "rdkafka"))]
mod tests {
    use super::*;

    #[test]
    fn test_build_config() {
        let args = KafkaExporterArgs {
            kafka_acks: KafkaAcknowledgementMode::All,
            kafka_compression: Some("none".to_string()),
            kafka_producer_config: vec![("linger.ms".to_string(), "50".to_string())],
            ..Default::default()
        };

        let config = args.build_config(&["k1:9092".to_string(), "k2:9092".to_string()], "web-01");
        assert_eq!(config.brokers, "k1:9092,k2:9092");
        assert_eq!(config.client_id, "web-01");
        assert_eq!(config.acks, AcknowledgementMode::All);
        assert_eq!(config.compression, None);
        assert_eq!(config.producer_config.get("linger.ms"), Some(&"50".to_string()));
    }
}
