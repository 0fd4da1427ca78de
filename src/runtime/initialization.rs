//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, Kubernetes client and reconciler wiring.

use crate::config::{load_config, ControllerConfig, ServerConfig};
use crate::controller::reconciler::{KubeStore, Reconciler};
use crate::controller::server::{start_server, ServerState};
use crate::credentials::KubeSecretSource;
use crate::crd::ImageUpdateConfig;
use crate::git::GitCli;
use crate::observability;
use crate::provider::EcrTagResolver;
use anyhow::{Context, Result};
use kube::{api::Api, api::ListParams, Client};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// API for ImageUpdateConfig resources in the watched scope
    pub configs: Api<ImageUpdateConfig>,
    /// Reconciler context
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("reconciler", &self.reconciler)
            .field("server_state", &self.server_state)
            .finish_non_exhaustive()
    }
}

/// Install the tracing subscriber
///
/// `RUST_LOG` overrides the default `image_update_controller=info` filter.
pub fn init_tracing() {
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_update_controller=info".into()),
        )
        .try_init()
    {
        eprintln!("Tracing subscriber already initialized: {e}");
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Reconciler setup
/// - Startup resource summary
pub async fn initialize() -> Result<InitializationResult> {
    // Must happen before anything opens a TLS connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_provider| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    init_tracing();

    let (controller_config, server_config) = load_config();
    info!("Starting Image Update Controller v{}", env!("CARGO_PKG_VERSION"));
    info!(
        metrics_port = server_config.metrics_port,
        watch_namespace = controller_config.watch_namespace.as_deref().unwrap_or("<all>"),
        git_binary = %controller_config.git_binary,
        "Loaded configuration"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {:#}", e);
        }
    });

    wait_for_server_ready(&server_config, &server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let configs: Api<ImageUpdateConfig> = match &controller_config.watch_namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    };

    let reconciler = Arc::new(build_reconciler(client.clone(), controller_config));

    log_startup_summary(&configs).await;

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        configs,
        reconciler,
        server_state,
    })
}

/// Wire the Kubernetes-backed collaborators into a reconciler
pub fn build_reconciler(client: Client, config: ControllerConfig) -> Reconciler {
    let store = Arc::new(KubeStore::new(client.clone()));
    let secrets = Arc::new(KubeSecretSource::new(client));
    let resolver = Arc::new(EcrTagResolver::new(Arc::<KubeSecretSource>::clone(&secrets)));
    let git = Arc::new(GitCli::new(
        config.git_binary.clone(),
        config.workspace_dir.clone(),
        secrets,
    ));
    Reconciler::new(Arc::<KubeStore>::clone(&store), store, resolver, git, config)
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_config: &ServerConfig,
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = server_config.startup_timeout();
    let poll_interval = server_config.poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}

/// Group resource names by namespace, both sorted
pub fn group_by_namespace(configs: &[ImageUpdateConfig]) -> BTreeMap<String, Vec<String>> {
    let mut by_namespace: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for item in configs {
        let namespace = item.metadata.namespace.as_deref().unwrap_or("default");
        let name = item.metadata.name.as_deref().unwrap_or("unknown");
        by_namespace
            .entry(namespace.to_string())
            .or_default()
            .push(name.to_string());
    }
    for names in by_namespace.values_mut() {
        names.sort();
    }
    by_namespace
}

/// Log the resources present at startup
///
/// The watch loop's initial list reconciles them; this only confirms the CRD
/// is queryable and gives operators an overview.
async fn log_startup_summary(configs: &Api<ImageUpdateConfig>) {
    let span = tracing::span!(
        tracing::Level::INFO,
        "controller.startup.summary",
        operation = "list_existing_resources"
    );
    let _guard = span.enter();

    let list = match configs.list(&ListParams::default()).await {
        Ok(list) => list,
        Err(e) => {
            warn!(
                "Failed to list ImageUpdateConfig resources (is the CRD installed?): {}",
                e
            );
            return;
        }
    };

    info!("Image Update Controller - Startup Resource Summary");
    info!("Total Resources: {}", list.items.len());

    let by_namespace = group_by_namespace(&list.items);
    info!("Namespaces: {}", by_namespace.len());
    for (namespace, names) in &by_namespace {
        let shown = if names.len() <= 3 {
            names.join(", ")
        } else {
            format!("{}, ... ({} total)", names[..3].join(", "), names.len())
        };
        info!("Namespace: {}", namespace);
        info!("  Resources ({}): {}", names.len(), shown);
    }
}
