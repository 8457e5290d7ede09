//! Wiring of the adapter's long-lived parts
//!
//! [`Adapter`] owns the shared translator, rule store, catalog lister and
//! provider. [`Adapter::start`] spawns the background drivers that keep them
//! current.

use std::future::Future;
use std::sync::Arc;

use kube::client::Client;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::client::StoreClient;
use crate::config::AdapterConfig;
use crate::error::{Error, Result};
use crate::provider::{
    ConfigFileWatcher, HpaWatcher, MetricsLister, MetricsProvider, ResourceResolver, RuleStore,
    Translator,
};

pub struct Adapter {
    config: AdapterConfig,
    rules: Option<Arc<RuleStore>>,
    lister: Arc<MetricsLister>,
    provider: Arc<MetricsProvider>,
    kube_client: Option<Client>,
}

impl Adapter {
    /// Compose the provider
    ///
    /// A rule store is only created when there is a source of rules: a rule
    /// file or a cluster to watch for annotated HPAs.
    pub fn new(
        config: AdapterConfig,
        store_client: Arc<dyn StoreClient>,
        resolver: Arc<dyn ResourceResolver>,
        kube_client: Option<Client>,
    ) -> Self {
        let translator = Translator::new(config.metric_prefix.clone());
        let rules = (config.external_config.is_some() || kube_client.is_some())
            .then(|| Arc::new(RuleStore::new()));

        let lister = Arc::new(MetricsLister::new(
            translator.clone(),
            store_client.clone(),
            rules.clone(),
            config.relist_interval,
        ));
        let provider = Arc::new(MetricsProvider::new(
            translator,
            store_client,
            resolver,
            lister.clone(),
            rules.clone(),
        ));

        Self {
            config,
            rules,
            lister,
            provider,
            kube_client,
        }
    }

    pub fn provider(&self) -> Arc<MetricsProvider> {
        self.provider.clone()
    }

    pub fn rules(&self) -> Option<Arc<RuleStore>> {
        self.rules.clone()
    }

    /// Spawn the catalog refresher and the configured rule producers
    pub async fn start(&self) -> BackgroundTasks {
        self.lister.register().await;

        let mut tasks = BackgroundTasks::default();
        let lister = self.lister.clone();
        tasks.spawn("metrics catalog refresher", async move {
            lister.run().await;
            Ok(())
        });

        if let Some(rules) = &self.rules {
            if let Some(path) = &self.config.external_config {
                let watcher =
                    ConfigFileWatcher::new(path, self.config.config_poll_interval, rules.clone());
                tasks.spawn("external metrics config watcher", watcher.run());
            }

            if let Some(client) = &self.kube_client {
                let watcher = HpaWatcher::new(client.clone(), rules.clone());
                tasks.spawn("HPA annotation watcher", async move {
                    watcher.run().await;
                    Ok(())
                });
            }
        }

        info!("Started {} background tasks", tasks.len());
        tasks
    }
}

/// Drivers spawned by [`Adapter::start`]
///
/// Every driver is meant to run for the life of the process, so one that
/// returns, fails or panics is reported by [`wait`](Self::wait). Dropping
/// the set aborts the remaining drivers.
#[derive(Default)]
pub struct BackgroundTasks {
    drivers: JoinSet<(&'static str, Result<()>)>,
}

impl BackgroundTasks {
    pub fn spawn<F>(&mut self, name: &'static str, driver: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.drivers.spawn(async move { (name, driver.await) });
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Resolve with the first driver that stops
    ///
    /// Never resolves when no driver is running.
    pub async fn wait(&mut self) -> Result<()> {
        let Some(outcome) = self.drivers.join_next().await else {
            return std::future::pending().await;
        };

        match outcome {
            Ok((name, Ok(()))) => {
                error!("{} stopped unexpectedly", name);
                Err(Error::InternalError(format!("{} stopped", name)))
            }
            Ok((name, Err(e))) => {
                error!("{} failed: {}", name, e);
                Err(e)
            }
            Err(e) => {
                error!("background task failed: {}", e);
                Err(Error::InternalError(format!("background task failed: {}", e)))
            }
        }
    }

    /// Abort every driver
    pub fn stop(&mut self) {
        self.drivers.abort_all();
    }
}
