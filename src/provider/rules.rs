//! Catalog of external metric rules
//!
//! Two producers feed the store independently: the rule file poller
//! ([`super::config_watch`]) and the HPA annotation watcher
//! ([`super::hpa`]). Every mutation is applied under the write lock and the
//! registered listener is notified only after the lock is released, so a
//! listener that reads the store back never deadlocks and never observes a
//! half-applied batch.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::MetricRule;

/// Receives a notification after every change to the rule catalog
pub trait RuleListener: Send + Sync {
    fn rules_changed(&self);
}

#[derive(Debug, Default)]
struct RuleCatalog {
    rules: BTreeMap<String, MetricRule>,
    /// Names whose current definition came from the rule file
    file_owned: BTreeSet<String>,
}

/// Concurrently updated mapping from external metric name to its query
#[derive(Default)]
pub struct RuleStore {
    catalog: RwLock<RuleCatalog>,
    listener: RwLock<Option<Arc<dyn RuleListener>>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite rules by name
    pub async fn add_rules(&self, rules: Vec<MetricRule>) {
        if rules.is_empty() {
            return;
        }

        let names = rule_names(&rules);
        {
            let mut catalog = self.catalog.write().await;
            for rule in rules {
                catalog.file_owned.remove(&rule.name);
                catalog.rules.insert(rule.name.clone(), rule);
            }
        }

        self.notify().await;
        debug!("Added external metric rules: {:?}", names);
    }

    /// Remove rules by name, ignoring names that are not present
    pub async fn delete_rules(&self, rules: Vec<MetricRule>) {
        if rules.is_empty() {
            return;
        }

        let names = rule_names(&rules);
        {
            let mut catalog = self.catalog.write().await;
            for name in &names {
                catalog.rules.remove(name);
                catalog.file_owned.remove(name);
            }
        }

        self.notify().await;
        debug!("Deleted external metric rules: {:?}", names);
    }

    /// Atomically replace the rules loaded from the rule file
    ///
    /// This is deliberately not a wholesale replace of the store: only the
    /// file's share of the rules is swapped, since the annotation watcher
    /// feeds the same store. Rules the previous file defined and `rules` no
    /// longer does are removed even without an explicit delete. Rules last
    /// written by the annotation watcher are left alone unless `rules`
    /// redefines them.
    pub async fn replace_all(&self, rules: Vec<MetricRule>) {
        let count = rules.len();
        {
            let mut catalog = self.catalog.write().await;
            let previous = std::mem::take(&mut catalog.file_owned);
            for name in &previous {
                catalog.rules.remove(name);
            }
            for rule in rules {
                catalog.file_owned.insert(rule.name.clone());
                catalog.rules.insert(rule.name.clone(), rule);
            }
        }

        self.notify().await;
        info!("Loaded {} external metric rules from file", count);
    }

    /// Register the single change listener, replacing any previous one
    pub async fn register_listener(&self, listener: Arc<dyn RuleListener>) {
        *self.listener.write().await = Some(listener);
        info!("External configuration listener registered");
    }

    /// Names of all rules, in ascending order
    pub async fn get_metric_names(&self) -> Vec<String> {
        self.catalog.read().await.rules.keys().cloned().collect()
    }

    /// Query of the rule named `name`
    pub async fn get_query(&self, name: &str) -> Option<String> {
        self.catalog
            .read()
            .await
            .rules
            .get(name)
            .map(|rule| rule.query.clone())
    }

    pub async fn len(&self) -> usize {
        self.catalog.read().await.rules.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.catalog.read().await.rules.is_empty()
    }

    async fn notify(&self) {
        let listener = self.listener.read().await.clone();
        if let Some(listener) = listener {
            listener.rules_changed();
        }
    }
}

fn rule_names(rules: &[MetricRule]) -> Vec<String> {
    rules.iter().map(|r| r.name.clone()).collect()
}
