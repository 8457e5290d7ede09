//! Cached catalog of available custom and external metrics
//!
//! Listing metrics in Wavefront is too slow to do per API request, so the
//! catalog is rebuilt periodically and whenever the rule store changes, and
//! readers are served the last published snapshot.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{Mutex, Notify};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use super::rules::{RuleListener, RuleStore};
use super::translator::Translator;
use super::types::{CustomMetricInfo, ExternalMetricInfo};
use crate::client::StoreClient;
use crate::config::{non_zero_interval, DEFAULT_RELIST_INTERVAL};
use crate::error::Result;
use crate::metrics;

/// Immutable catalog published by [`MetricsLister::refresh`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub custom: Vec<CustomMetricInfo>,
    pub external: Vec<ExternalMetricInfo>,
}

/// Wakes the refresh loop when the rule store changes
struct RefreshTrigger(Arc<Notify>);

impl RuleListener for RefreshTrigger {
    fn rules_changed(&self) {
        self.0.notify_one();
    }
}

pub struct MetricsLister {
    translator: Translator,
    client: Arc<dyn StoreClient>,
    rules: Option<Arc<RuleStore>>,
    update_interval: Duration,
    snapshot: ArcSwap<MetricsSnapshot>,
    refresh_lock: Mutex<()>,
    trigger: Arc<Notify>,
}

impl MetricsLister {
    pub fn new(
        translator: Translator,
        client: Arc<dyn StoreClient>,
        rules: Option<Arc<RuleStore>>,
        update_interval: Duration,
    ) -> Self {
        Self {
            translator,
            client,
            rules,
            update_interval: non_zero_interval(update_interval, DEFAULT_RELIST_INTERVAL),
            snapshot: ArcSwap::from_pointee(MetricsSnapshot::default()),
            refresh_lock: Mutex::new(()),
            trigger: Arc::new(Notify::new()),
        }
    }

    /// Last published catalog
    pub fn snapshot(&self) -> Arc<MetricsSnapshot> {
        self.snapshot.load_full()
    }

    pub fn list_custom_metrics(&self) -> Vec<CustomMetricInfo> {
        self.snapshot.load().custom.clone()
    }

    pub fn list_external_metrics(&self) -> Vec<ExternalMetricInfo> {
        self.snapshot.load().external.clone()
    }

    /// Rebuild and publish the catalog
    ///
    /// Both halves are always rebuilt. If listing custom metrics fails the
    /// custom half is published empty and the error is returned.
    pub async fn refresh(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;

        let pattern = format!("{}.*", self.translator.prefix());
        let (custom, custom_err) = match self.client.list_metrics(&pattern).await {
            Ok(names) => (self.translator.custom_metrics_for(&names), None),
            Err(e) => {
                error!("error retrieving list of custom metrics from Wavefront: {}", e);
                (Vec::new(), Some(e))
            }
        };

        let external = match &self.rules {
            Some(rules) => self
                .translator
                .external_metrics_for(rules.get_metric_names().await),
            None => Vec::new(),
        };

        metrics::set_catalog_sizes(custom.len(), external.len());
        self.snapshot
            .store(Arc::new(MetricsSnapshot { custom, external }));

        match custom_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Subscribe to rule store changes so they trigger a refresh
    pub async fn register(&self) {
        if let Some(rules) = &self.rules {
            rules
                .register_listener(Arc::new(RefreshTrigger(self.trigger.clone())))
                .await;
        }
    }

    /// Refresh on every tick and on every rule change, forever
    pub async fn run(self: Arc<Self>) {
        info!(
            "Refreshing metrics catalog every {:?}",
            self.update_interval
        );

        let mut ticker = interval(self.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.trigger.notified() => {
                    info!("Configuration changed, updating metrics");
                }
            }

            if let Err(e) = self.refresh().await {
                error!("error updating metrics: {}", e);
            }
        }
    }
}
