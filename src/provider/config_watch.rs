//! Rule file poller
//!
//! Stats the external metrics rule file on a fixed interval and reloads it
//! into the [`RuleStore`] whenever its modification time advances. A file
//! that cannot be read or parsed is fatal: [`ConfigFileWatcher::run`]
//! returns the error and the process is expected to exit and be restarted,
//! rather than serve a half-loaded rule set.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::rules::RuleStore;
use crate::config::{non_zero_interval, ExternalMetricsConfig, DEFAULT_CONFIG_POLL_INTERVAL};
use crate::error::{Error, Result};

pub struct ConfigFileWatcher {
    path: PathBuf,
    poll_interval: Duration,
    store: Arc<RuleStore>,
    last_modified: Option<SystemTime>,
}

impl ConfigFileWatcher {
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration, store: Arc<RuleStore>) -> Self {
        Self {
            path: path.into(),
            poll_interval: non_zero_interval(poll_interval, DEFAULT_CONFIG_POLL_INTERVAL),
            store,
            last_modified: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Poll the rule file until an error occurs
    ///
    /// The first poll happens immediately.
    pub async fn run(mut self) -> Result<()> {
        info!(
            "Watching external metrics config {} every {:?}",
            self.path.display(),
            self.poll_interval
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.poll_once().await {
                error!(
                    "unable to load external metrics config {}: {}",
                    self.path.display(),
                    e
                );
                return Err(e);
            }
        }
    }

    /// Reload the rule file if it changed since the last load
    ///
    /// Returns whether the rules were reloaded.
    pub async fn poll_once(&mut self) -> Result<bool> {
        let metadata = tokio::fs::metadata(&self.path).await.map_err(|e| {
            Error::ConfigError(format!(
                "unable to get external config file stats for {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let modified = metadata.modified()?;

        if self.last_modified.is_some_and(|last| modified <= last) {
            debug!("External metrics config {} unchanged", self.path.display());
            return Ok(false);
        }

        let path = self.path.clone();
        let config = tokio::task::spawn_blocking(move || ExternalMetricsConfig::from_file(&path))
            .await
            .map_err(|e| Error::ConfigError(format!("config loader task failed: {}", e)))??;

        self.last_modified = Some(modified);
        self.store.replace_all(config.rules).await;
        Ok(true)
    }
}
