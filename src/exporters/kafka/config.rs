// SPDX-License-Identifier: Apache-2.0

use rdkafka::ClientConfig;
use std::collections::HashMap;

/// Kafka acknowledgement configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AcknowledgementMode {
    /// No acknowledgement required (acks=0)
    None,
    /// Wait for leader acknowledgement only (acks=1)
    #[default]
    One,
    /// Wait for all in-sync replicas to acknowledge (acks=all)
    All,
}

impl AcknowledgementMode {
    /// Convert to the string value expected by librdkafka
    pub fn to_kafka_value(&self) -> &'static str {
        match self {
            AcknowledgementMode::None => "0",
            AcknowledgementMode::One => "1",
            AcknowledgementMode::All => "all",
        }
    }
}

/// Producer settings shared by every source watcher.
#[derive(Clone, Debug)]
pub struct KafkaProducerConfig {
    /// Kafka broker addresses (comma-separated)
    pub brokers: String,

    /// Client ID for the Kafka producer
    pub client_id: String,

    pub acks: AcknowledgementMode,

    /// Compression codec (gzip, snappy, lz4, zstd)
    pub compression: Option<String>,

    /// Message timeout in milliseconds
    pub message_timeout_ms: u32,

    /// Request timeout in milliseconds
    pub request_timeout_ms: u32,

    /// Linger time in milliseconds (queue.buffering.max.ms)
    pub linger_ms: u32,

    /// Raw librdkafka properties, applied last
    pub producer_config: HashMap<String, String>,
}

impl Default for KafkaProducerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            client_id: "logrocket".to_string(),
            acks: AcknowledgementMode::default(),
            compression: None,
            message_timeout_ms: 300000,
            request_timeout_ms: 30000,
            linger_ms: 5,
            producer_config: HashMap::new(),
        }
    }
}

impl KafkaProducerConfig {
    /// Configuration for the given host list, e.g. `["k1:9092", "k2:9092"]`.
    pub fn new(hosts: &[String]) -> Self {
        Self {
            brokers: hosts.join(","),
            ..Default::default()
        }
    }

    pub fn with_client_id(mut self, client_id: String) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn with_acks(mut self, acks: AcknowledgementMode) -> Self {
        self.acks = acks;
        self
    }

    pub fn with_compression(mut self, compression: String) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn with_message_timeout_ms(mut self, message_timeout_ms: u32) -> Self {
        self.message_timeout_ms = message_timeout_ms;
        self
    }

    pub fn with_request_timeout_ms(mut self, request_timeout_ms: u32) -> Self {
        self.request_timeout_ms = request_timeout_ms;
        self
    }

    /// Set custom producer configuration parameters
    pub fn with_custom_config(mut self, custom_config: Vec<(String, String)>) -> Self {
        for (key, value) in custom_config {
            self.producer_config.insert(key, value);
        }
        self
    }

    /// Build rdkafka ClientConfig from this configuration
    pub fn build_client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();

        config.set("bootstrap.servers", &self.brokers);
        config.set("client.id", &self.client_id);
        config.set("acks", self.acks.to_kafka_value());
        config.set("linger.ms", self.linger_ms.to_string());

        if let Some(ref compression) = self.compression {
            config.set("compression.type", compression);
        }

        config.set("message.timeout.ms", self.message_timeout_ms.to_string());
        config.set("request.timeout.ms", self.request_timeout_ms.to_string());

        // Custom settings override the built-in ones
        for (key, value) in &self.producer_config {
            config.set(key, value);
        }

        config
    }
}
