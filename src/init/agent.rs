// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::exporters::blackhole::BlackholeProducer;
#[cfg(feature = "rdkafka")]
use crate::exporters::kafka::KafkaProducer;
use crate::exporters::producer::BrokerProducer;
use crate::init::BoxError;
use crate::init::args::{AgentRun, Exporter};
use crate::init::config::{load_hosts, load_source_configs, load_status_stores};
use crate::receivers::file::config::{SourceConfig, SourceWatcherConfig};
use crate::receivers::file::source::SourceWatcher;
use crate::receivers::file::status::StatusStore;

/// Starts a watcher per configured source and closes them all on cancellation.
pub struct Agent {
    config: Box<AgentRun>,
    hostname: String,
    watcher_config: SourceWatcherConfig,
}

impl Agent {
    pub fn new(config: Box<AgentRun>, hostname: String) -> Self {
        Self {
            config,
            hostname,
            watcher_config: SourceWatcherConfig::default(),
        }
    }

    pub fn with_watcher_config(mut self, watcher_config: SourceWatcherConfig) -> Self {
        self.watcher_config = watcher_config;
        self
    }

    /// Runs until `agent_cancel` fires.
    ///
    /// Returns early with `Ok` when there is no source to run, and with an
    /// error when the broker host list is unusable or no watcher could start.
    pub async fn run(self, agent_cancel: CancellationToken) -> Result<(), BoxError> {
        let hosts = load_hosts(&self.config.kafka_path)?;
        info!(hosts = ?hosts, "Loaded broker hosts");

        let configs = load_source_configs(&self.config.conf_path)?;
        if configs.is_empty() {
            info!(dir = ?self.config.conf_path, "No readable config files, nothing to do");
            return Ok(());
        }

        let mut stores = load_status_stores(&self.config.var_path)?;
        let client_id = self
            .config
            .client_id
            .clone()
            .unwrap_or_else(|| self.hostname.clone());

        let mut watchers = Vec::new();
        for mut config in configs {
            config.hostname = self.hostname.clone();
            let store = stores.remove(&config.name).unwrap_or_default();

            match self.start_watcher(config, store, &hosts, &client_id) {
                Ok(watcher) => watchers.push(watcher),
                Err((name, e)) => error!(source = %name, error = %e, "Unable to start source watcher, skipping"),
            }
        }

        if !stores.is_empty() {
            debug!(statuses = ?stores.keys().collect::<Vec<_>>(), "Ignoring statuses of unconfigured sources");
        }

        if watchers.is_empty() {
            return Err("unable to start any source watcher".into());
        }
        info!(sources = watchers.len(), "Agent running");

        agent_cancel.cancelled().await;

        info!(sources = watchers.len(), "Closing source watchers");
        futures::future::join_all(watchers.into_iter().map(|w| w.close())).await;

        Ok(())
    }

    fn start_watcher(
        &self,
        config: SourceConfig,
        store: StatusStore,
        hosts: &[String],
        client_id: &str,
    ) -> Result<SourceWatcher, (String, BoxError)> {
        let name = config.name.clone();
        let producer = self
            .build_producer(hosts, client_id)
            .map_err(|e| (name.clone(), e))?;

        SourceWatcher::start(
            config,
            store,
            &self.config.var_path,
            producer,
            self.watcher_config.clone(),
        )
        .map_err(|e| (name, e.into()))
    }

    // One producer per source, each with its own broker connection.
    #[allow(unused_variables)]
    fn build_producer(
        &self,
        hosts: &[String],
        client_id: &str,
    ) -> Result<Arc<dyn BrokerProducer>, BoxError> {
        match self.config.exporter {
            Exporter::Blackhole => {
                warn!("Using the blackhole exporter, records are discarded");
                Ok(Arc::new(BlackholeProducer::new()))
            }
            #[cfg(feature = "rdkafka")]
            Exporter::Kafka => {
                let config = self.config.kafka_exporter.build_config(hosts, client_id);
                Ok(Arc::new(KafkaProducer::new(&config)?))
            }
            #[cfg(not(feature = "rdkafka"))]
            Exporter::Kafka => {
                Err("the kafka exporter requires building with the rdkafka feature".into())
            }
        }
    }
}
