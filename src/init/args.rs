// SPDX-License-Identifier: Apache-2.0

use clap::{Args, ValueEnum};
use std::path::PathBuf;

use crate::init::kafka_exporter::KafkaExporterArgs;

#[derive(Debug, Args, Clone)]
pub struct AgentRun {
    /// Directory with one JSON config file per log source
    #[arg(long, env = "LOGROCKET_CONF_PATH", default_value = "./conf/")]
    pub conf_path: PathBuf,

    /// Directory for status files
    #[arg(long, env = "LOGROCKET_VAR_PATH", default_value = "./var/")]
    pub var_path: PathBuf,

    /// Directory holding hosts.txt, a JSON array of broker addresses
    #[arg(long, env = "LOGROCKET_KAFKA_PATH", default_value = "./kafka/")]
    pub kafka_path: PathBuf,

    /// Client identifier sent to the broker (defaults to the hostname)
    #[arg(long, env = "LOGROCKET_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Where batches are delivered
    #[arg(value_enum, long, env = "LOGROCKET_EXPORTER", default_value = "kafka")]
    pub exporter: Exporter,

    #[command(flatten)]
    pub kafka_exporter: KafkaExporterArgs,
}

impl Default for AgentRun {
    fn default() -> Self {
        AgentRun {
            conf_path: PathBuf::from("./conf/"),
            var_path: PathBuf::from("./var/"),
            kafka_path: PathBuf::from("./kafka/"),
            client_id: None,
            exporter: Exporter::Kafka,
            kafka_exporter: KafkaExporterArgs::default(),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum Exporter {
    Kafka,
    Blackhole,
}
