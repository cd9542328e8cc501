// SPDX-License-Identifier: Apache-2.0
#[cfg(test)]
#[allow(clippy::module_inception)]
mod tests {
    use crate::exporters::kafka::config::{AcknowledgementMode, KafkaProducerConfig};
    use crate::exporters::kafka::errors::KafkaExportError;
    use crate::exporters::producer::ProduceError;
    use rdkafka::error::KafkaError;

    #[test]
    fn test_kafka_config_from_hosts() {
        let hosts = vec!["broker1:9092".to_string(), "broker2:9092".to_string()];
        let config = KafkaProducerConfig::new(&hosts)
            .with_client_id("web-01".to_string())
            .with_compression("gzip".to_string());

        assert_eq!(config.brokers, "broker1:9092,broker2:9092");
        assert_eq!(config.client_id, "web-01");
        assert_eq!(config.compression, Some("gzip".to_string()));
    }

    #[test]
    fn test_acknowledgement_mode_values() {
        assert_eq!(AcknowledgementMode::None.to_kafka_value(), "0");
        assert_eq!(AcknowledgementMode::One.to_kafka_value(), "1");
        assert_eq!(AcknowledgementMode::All.to_kafka_value(), "all");
        assert_eq!(AcknowledgementMode::default(), AcknowledgementMode::One);
    }

    #[test]
    fn test_client_config_settings() {
        let config = KafkaProducerConfig::new(&["k:9092".to_string()])
            .with_acks(AcknowledgementMode::All)
            .with_request_timeout_ms(1000);
        let client_config = config.build_client_config();

        assert_eq!(client_config.get("bootstrap.servers"), Some("k:9092"));
        assert_eq!(client_config.get("acks"), Some("all"));
        assert_eq!(client_config.get("request.timeout.ms"), Some("1000"));
        assert_eq!(client_config.get("client.id"), Some("logrocket"));
        assert_eq!(client_config.get("compression.type"), None);
    }

    #[test]
    fn test_custom_config_overrides() {
        let config = KafkaProducerConfig::new(&["k:9092".to_string()]).with_custom_config(vec![
            ("acks".to_string(), "0".to_string()),
            ("queue.buffering.max.messages".to_string(), "5000".to_string()),
        ]);
        let client_config = config.build_client_config();

        assert_eq!(client_config.get("acks"), Some("0"));
        assert_eq!(client_config.get("queue.buffering.max.messages"), Some("5000"));
    }

    #[test]
    fn test_error_conversions() {
        let err = KafkaExportError::from(KafkaError::Canceled);
        match ProduceError::from(err) {
            ProduceError::Delivery(msg) => assert!(msg.starts_with("Kafka producer error")),
        }
    }
}
