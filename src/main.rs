//! wavefront-adapter: Kubernetes metrics API server backed by Wavefront

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use kube::Client;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use wavefront_adapter::adapter::Adapter;
use wavefront_adapter::client::{StoreClient, WavefrontClient};
use wavefront_adapter::config::AdapterConfig;
use wavefront_adapter::provider::{KubeResourceResolver, ResourceResolver, StaticResourceResolver};
use wavefront_adapter::rest_api;

#[derive(Parser)]
#[command(name = "wavefront-adapter")]
#[command(about = "Kubernetes custom and external metrics adapter for Wavefront", long_about = None)]
#[command(version)]
struct Cli {
    /// Wavefront URL of the form https://INSTANCE.wavefront.com
    #[arg(long, env = "WAVEFRONT_URL")]
    wavefront_url: String,

    /// Wavefront API token
    #[arg(long, env = "WAVEFRONT_TOKEN", hide_env_values = true)]
    wavefront_token: String,

    /// Wavefront metric prefix
    #[arg(long, default_value = "kubernetes")]
    wavefront_metric_prefix: String,

    /// Interval at which to fetch the list of all available metrics from Wavefront, 0 means the default
    #[arg(long, default_value_t = 600)]
    metrics_relist_interval_secs: u64,

    /// Timeout for Wavefront API calls, 0 means the default
    #[arg(long, default_value_t = 10)]
    api_client_timeout_secs: u64,

    /// Rule file defining external metrics
    #[arg(long)]
    external_metrics_config: Option<PathBuf>,

    /// Interval at which the rule file is checked for changes, 0 means the default
    #[arg(long, default_value_t = 60)]
    config_poll_interval_secs: u64,

    /// Address the metrics API server listens on
    #[arg(long, default_value = "0.0.0.0:6443")]
    listen_addr: SocketAddr,

    /// Do not watch HPA annotations for external metric rules
    #[arg(long)]
    disable_hpa_watch: bool,

    /// Startup message
    #[arg(long, default_value = "starting wavefront adapter")]
    msg: String,
}

impl Cli {
    fn adapter_config(&self) -> AdapterConfig {
        AdapterConfig {
            relist_interval: Duration::from_secs(self.metrics_relist_interval_secs),
            api_timeout: Duration::from_secs(self.api_client_timeout_secs),
            external_config: self.external_metrics_config.clone(),
            config_poll_interval: Duration::from_secs(self.config_poll_interval_secs),
            ..AdapterConfig::default()
        }
        .with_metric_prefix(&self.wavefront_metric_prefix)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    info!("{} version {}", cli.msg, env!("CARGO_PKG_VERSION"));

    let config = cli.adapter_config();
    let store_client: Arc<dyn StoreClient> = Arc::new(
        WavefrontClient::from_url(&cli.wavefront_url, cli.wavefront_token.clone(), config.api_timeout)
            .context("unable to construct wavefront client")?,
    );

    let (resolver, kube_client): (Arc<dyn ResourceResolver>, Option<Client>) =
        match Client::try_default().await {
            Ok(client) => {
                let watch = (!cli.disable_hpa_watch).then(|| client.clone());
                (Arc::new(KubeResourceResolver::new(client)), watch)
            }
            Err(e) if cli.disable_hpa_watch => {
                warn!("No Kubernetes client available, label selectors will match nothing: {}", e);
                (Arc::new(StaticResourceResolver::default()), None)
            }
            Err(e) => return Err(e).context("unable to construct kubernetes client"),
        };

    let adapter = Adapter::new(config, store_client, resolver, kube_client);
    let mut tasks = adapter.start().await;

    let outcome = tokio::select! {
        result = rest_api::run_server(adapter.provider(), cli.listen_addr) => {
            result.context("metrics API server failed")
        }
        result = tasks.wait() => {
            result.context("background task failed")
        }
    };

    tasks.stop();
    outcome
}
