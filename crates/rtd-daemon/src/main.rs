//! `rtd-daemon` — the remote task dispatch core's JSON-RPC daemon.
//!
//! Wires C1-C9 together (identity store, HAL, serverless/client registries,
//! supervisor, power coordinator, dispatcher, scheduling proxy) and serves
//! them over a local JSON-RPC/WebSocket endpoint (spec §6).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod callback;
mod rpc;
mod server;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rand::Rng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rtd_core::UidName;
use rtd_crypto::ProcessKey;
use rtd_dispatch::{DispatchTunables, Dispatcher, PowerController, PowerCoordinator, PowerTunables, SchedulingProxy};
use rtd_events::EventBus;
use rtd_hal::testing::MockHal;
use rtd_hal::{HalWrapper, RemoteTaskHandler};
use rtd_registry::{ClientRegistry, PermissionChecker};
use rtd_storage::IdentityStore;
use rtd_supervisor::testing::{MockPackageManager, MockServiceBinder};
use rtd_supervisor::{PackageManager, PackageRemovalHandler, PendingTaskQueue, Supervisor};

use server::RpcImpl;

/// Bridges the package manager's package-removed broadcast (spec §4.9) into
/// the client registry and scheduling proxy: uninstalling a package destroys
/// its identity row and drops its HAL schedules.
struct PackageRemovalBridge {
    registry: Arc<ClientRegistry>,
    scheduling: Arc<SchedulingProxy>,
}

#[async_trait::async_trait]
impl PackageRemovalHandler for PackageRemovalBridge {
    async fn on_package_removed(&self, uid: UidName) {
        if let Some(client_id) = self.registry.remove(&uid).await {
            if let Err(e) = self.scheduling.unschedule_all(&client_id).await {
                warn!(%uid, %client_id, error = %e, "failed to unschedule tasks for uninstalled package");
            }
        }
    }
}

/// Remote task dispatch core daemon.
#[derive(Parser)]
#[command(name = "rtd-daemon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to bind the JSON-RPC server on.
    #[arg(long, default_value = "127.0.0.1:7878")]
    bind: SocketAddr,

    /// Directory holding the persistent identity store's data file.
    #[arg(long, default_value = "/var/lib/rtd-daemon")]
    data_dir: PathBuf,

    /// Optional TOML file overriding the embedded tunables defaults.
    #[arg(long)]
    tunables: Option<PathBuf>,

    /// Optional YAML file declaring the static serverless client map.
    #[arg(long)]
    serverless_config: Option<PathBuf>,

    /// Optional YAML file declaring the control/privileged caller allowlist.
    #[arg(long)]
    privileged_config: Option<PathBuf>,

    /// Prefix used when generating new client ids.
    #[arg(long, default_value = "client")]
    client_id_prefix: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,rtd_daemon=info")))
        .init();

    let cli = Cli::parse();

    let tunables = rtd_config::Tunables::load(cli.tunables.as_deref()).context("loading tunables")?;
    let power_tunables = PowerTunables {
        notify_ap_state_max_retry: tunables.notify_ap_state_max_retry,
        notify_ap_state_retry_sleep: std::time::Duration::from_millis(tunables.notify_ap_state_retry_sleep_ms),
        allowed_system_uptime: std::time::Duration::from_millis(tunables.allowed_system_uptime_ms),
        shutdown_warning_margin: std::time::Duration::from_millis(tunables.shutdown_warning_margin_ms),
    };
    let dispatch_tunables = DispatchTunables {
        max_task_pending: std::time::Duration::from_millis(tunables.max_task_pending_ms),
        task_unbind_delay: std::time::Duration::from_millis(tunables.task_unbind_delay_ms),
    };
    let task_unbind_delay = dispatch_tunables.task_unbind_delay;

    let serverless = match &cli.serverless_config {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(source) => Arc::new(rtd_registry::load_or_disable(&source)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read serverless config, serverless clients disabled");
                Arc::new(rtd_registry::ServerlessRegistry::empty())
            },
        },
        None => Arc::new(rtd_registry::ServerlessRegistry::empty()),
    };

    let permissions: Arc<dyn PermissionChecker> = match &cli.privileged_config {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(source) => Arc::new(rtd_registry::load_permissions_or_disable(&source)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read privileged-caller config, control operations disabled for everyone");
                Arc::new(rtd_registry::PermissionRegistry::empty())
            },
        },
        None => Arc::new(rtd_registry::PermissionRegistry::empty()),
    };

    let kv = open_kv_store(&cli.data_dir)?;
    let identity_store = Arc::new(IdentityStore::new(kv, ProcessKey::generate()));

    // Non-goal per spec §1: no real HAL/power-manager/service-binder exists
    // to talk to. These in-memory doubles are this core's only production
    // collaborators for those three seams.
    let hal: Arc<dyn HalWrapper> = Arc::new(MockHal::new());
    let binder = Arc::new(MockServiceBinder::new());
    let power_controller: Arc<dyn PowerController> = Arc::new(rtd_dispatch::testing::MockPowerController::new());
    let package_manager: Arc<dyn PackageManager> = Arc::new(MockPackageManager::new(Vec::new()));

    let registry = Arc::new(ClientRegistry::new(
        Arc::clone(&identity_store),
        Arc::clone(&serverless),
        Arc::clone(&hal),
        cli.client_id_prefix,
    ));
    registry.restore_from_identity_store().await;

    let client_init_grace = std::time::Duration::from_millis(tunables.allowed_time_for_client_init_ms);
    let supervisor = Arc::new(Supervisor::new(binder, task_unbind_delay, client_init_grace));

    let power_events = EventBus::new();
    let power_events_for_logging = power_events.clone();
    let coordinator = Arc::new(PowerCoordinator::new(
        Arc::clone(&hal),
        power_controller,
        Arc::clone(&supervisor),
        Arc::clone(&registry),
        power_tunables,
        power_events,
    ));
    coordinator.start();

    let queue = Arc::new(PendingTaskQueue::new());
    let dispatch_events = EventBus::new();
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&queue),
        Arc::clone(&supervisor),
        Arc::clone(&registry),
        Arc::clone(&coordinator),
        dispatch_tunables,
        dispatch_events,
    ));

    hal.set_remote_task_handler(Arc::clone(&dispatcher) as Arc<dyn RemoteTaskHandler>);
    hal.init().await.context("initializing HAL")?;

    let scheduling = Arc::new(SchedulingProxy::new(Arc::clone(&hal), Arc::clone(&serverless)));

    package_manager.set_removal_handler(Arc::new(PackageRemovalBridge {
        registry: Arc::clone(&registry),
        scheduling: Arc::clone(&scheduling),
    }));
    spawn_package_search(
        Arc::clone(&supervisor),
        Arc::clone(&package_manager),
        Duration::from_millis(tunables.package_search_delay_ms),
    );

    spawn_event_logger(dispatcher.subscribe_events());
    spawn_event_logger(power_events_for_logging.subscribe());

    let rpc_impl = RpcImpl::new(
        Arc::clone(&dispatcher),
        scheduling,
        Arc::clone(&registry),
        serverless,
        Arc::clone(&coordinator),
        Arc::clone(&supervisor),
        permissions,
    );
    let handle = server::start(cli.bind, rpc_impl).await?;

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutdown signal received, releasing dispatch core");

    dispatcher.release().await;
    if let Err(e) = hal.release().await {
        warn!(error = %e, "HAL release reported an error");
    }
    let _ = handle.stop();
    handle.await;

    Ok(())
}

/// Open the identity store's persistent `KvStore` backend.
fn open_kv_store(data_dir: &std::path::Path) -> anyhow::Result<Arc<dyn rtd_storage::KvStore>> {
    std::fs::create_dir_all(data_dir).context("creating data directory")?;
    let path = data_dir.join("identity.kv");
    let store = rtd_storage::SurrealKvStore::open(&path).context("opening identity store")?;
    Ok(Arc::new(store))
}

fn spawn_event_logger(mut events: rtd_events::EventReceiver<rtd_dispatch::DispatchEvent>) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!(?event, "dispatch event");
        }
    });
}

/// Spec §4.8 step 3: a one-shot, post-boot sweep over every installed
/// package, run once after `PACKAGE_SEARCH_DELAY` plus jitter so a
/// HAL-delivered task can start a client that never called `register()`.
fn spawn_package_search(supervisor: Arc<Supervisor>, package_manager: Arc<dyn PackageManager>, delay: Duration) {
    tokio::spawn(async move {
        let jitter_max_ms = (delay.as_millis() as u64 / 10).max(1);
        let jitter_ms = rand::thread_rng().gen_range(0..=jitter_max_ms);
        tokio::time::sleep(delay + Duration::from_millis(jitter_ms)).await;

        for uid in package_manager.installed_packages().await {
            supervisor.discover(&uid, true).await;
        }
    });
}
