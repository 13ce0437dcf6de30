// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use clap::Parser;
use cluster_agent::{
    alerts::{alert_channel, AlertSink},
    api::{self, AppState},
    config::AgentConfig,
    constants::{CACHE_SYNC_TIMEOUT_SECS, TOKIO_WORKER_THREADS},
    context::{stores, StoreWriters, Stores},
    informer::{reflect_only, watch_and_publish, ClusterEvent, EventBus, Projection},
    mesh::LinkerdClient,
    monitor::{checks::CheckContext, usage::KubeMetricsSource, ThresholdMonitor},
    nodeagent::{NodeAgentConnector, NodeAgentPool},
    projections::{
        storage::cache::MountpointCache, NetworkProjection, ServiceTopology, StorageProjection,
    },
    reconcilers::ConfigReconciler,
    writer::{ClusterWriter, KubeWriter},
};
use kube::{Api, Client};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

fn main() -> Result<()> {
    let config = AgentConfig::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("cluster-agent")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

fn init_tracing() {
    // Respects RUST_LOG if set, otherwise defaults to INFO level.
    // RUST_LOG_FORMAT=json switches to structured output.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(config: AgentConfig) -> Result<()> {
    init_tracing();
    info!("Starting cluster agent");
    debug!(?config, "Configuration loaded");

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;

    let (stores, writers) = stores();
    let (alerts, alert_rx) = alert_channel();
    let writer: Arc<dyn ClusterWriter> = Arc::new(KubeWriter::new(client.clone()));

    let node_agents = Arc::new(
        NodeAgentPool::new(
            Arc::new(NodeAgentConnector::new(
                stores.clone(),
                config.node_agent_port,
                http.clone(),
            )),
            alerts.clone(),
        )
        .with_concurrency(config.node_agent_concurrency),
    );
    let mountpoints = Arc::new(MountpointCache::new(
        node_agents.clone(),
        config.cache_ttl(),
    ));

    let topology = Arc::new(ServiceTopology::new(stores.clone()));
    let storage = Arc::new(StorageProjection::new(mountpoints));
    let network = Arc::new(NetworkProjection::new());
    let reconciler = Arc::new(ConfigReconciler::new(stores.clone(), writer.clone()));
    let monitor = Arc::new(ThresholdMonitor::new(
        CheckContext {
            stores: stores.clone(),
            storage: storage.clone(),
            metrics: Arc::new(KubeMetricsSource::new(client.clone())),
        },
        alerts,
        config.check_interval(),
    ));

    let projections: Vec<Arc<dyn Projection>> = vec![
        reconciler,
        topology.clone(),
        storage.clone(),
        network.clone(),
        monitor,
    ];
    let mut bus = EventBus::gated();
    for projection in projections {
        bus.subscribe(projection);
    }
    let bus = Arc::new(bus);

    info!("Starting informers");
    let mut informers = start_informers(&client, writers, &bus);

    wait_for_caches(&stores).await?;
    info!("Initial cache sync complete");
    bus.open().await;

    let state = AppState {
        topology,
        storage,
        network,
        node_agents,
        mesh: LinkerdClient::new(config.linkerd_api_url.clone(), http),
        mesh_time_window: config.mesh_time_window.clone(),
        stores,
    };
    let sink = AlertSink::new(writer, config.pod_name.clone(), config.pod_namespace.clone());

    // None of these should ever exit; if one does, the process exits with it
    tokio::select! {
        result = informers.join_next() => {
            error!("CRITICAL: informer exited unexpectedly: {:?}", result);
            match result {
                Some(Ok(inner)) => inner?,
                Some(Err(join)) => return Err(join.into()),
                None => {}
            }
            anyhow::bail!("Informer exited unexpectedly without error")
        }
        result = sink.run(alert_rx) => {
            error!("CRITICAL: alert sink exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Alert sink exited unexpectedly without error")
        }
        result = api::serve(config.listen_address, state) => {
            error!("CRITICAL: REST API exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("REST API exited unexpectedly without error")
        }
    }
}

/// Spawn one watch task per kind. Every kind the projections consume publishes
/// to the bus; kinds only read from the cache just keep their store current.
fn start_informers(
    client: &Client,
    writers: StoreWriters,
    bus: &Arc<EventBus>,
) -> JoinSet<Result<()>> {
    let mut tasks = JoinSet::new();

    tasks.spawn(watch_and_publish(
        Api::all(client.clone()),
        writers.namespaces,
        bus.clone(),
        ClusterEvent::Namespace,
    ));
    tasks.spawn(watch_and_publish(
        Api::all(client.clone()),
        writers.nodes,
        bus.clone(),
        ClusterEvent::Node,
    ));
    tasks.spawn(watch_and_publish(
        Api::all(client.clone()),
        writers.persistent_volumes,
        bus.clone(),
        ClusterEvent::PersistentVolume,
    ));
    tasks.spawn(watch_and_publish(
        Api::all(client.clone()),
        writers.pods,
        bus.clone(),
        ClusterEvent::Pod,
    ));
    tasks.spawn(watch_and_publish(
        Api::all(client.clone()),
        writers.services,
        bus.clone(),
        ClusterEvent::Service,
    ));
    tasks.spawn(watch_and_publish(
        Api::all(client.clone()),
        writers.endpoints,
        bus.clone(),
        ClusterEvent::Endpoints,
    ));
    tasks.spawn(watch_and_publish(
        Api::all(client.clone()),
        writers.ingresses,
        bus.clone(),
        ClusterEvent::Ingress,
    ));
    tasks.spawn(watch_and_publish(
        Api::all(client.clone()),
        writers.config_maps,
        bus.clone(),
        ClusterEvent::ConfigMap,
    ));
    tasks.spawn(watch_and_publish(
        Api::all(client.clone()),
        writers.secrets,
        bus.clone(),
        ClusterEvent::Secret,
    ));
    tasks.spawn(watch_and_publish(
        Api::all(client.clone()),
        writers.deployments,
        bus.clone(),
        ClusterEvent::Deployment,
    ));
    tasks.spawn(watch_and_publish(
        Api::all(client.clone()),
        writers.daemon_sets,
        bus.clone(),
        ClusterEvent::DaemonSet,
    ));
    tasks.spawn(watch_and_publish(
        Api::all(client.clone()),
        writers.stateful_sets,
        bus.clone(),
        ClusterEvent::StatefulSet,
    ));
    tasks.spawn(watch_and_publish(
        Api::all(client.clone()),
        writers.persistent_volume_claims,
        bus.clone(),
        ClusterEvent::PersistentVolumeClaim,
    ));

    tasks.spawn(reflect_only(Api::all(client.clone()), writers.replica_sets));
    tasks.spawn(reflect_only(Api::all(client.clone()), writers.resource_quotas));

    tasks
}

/// The initial sync is a bootstrap requirement: without it the projections
/// would answer from a partial view.
async fn wait_for_caches(stores: &Stores) -> Result<()> {
    tokio::time::timeout(
        Duration::from_secs(CACHE_SYNC_TIMEOUT_SECS),
        stores.wait_until_ready(),
    )
    .await
    .context("timed out waiting for the initial cache sync")?
    .context("initial cache sync failed")
}
