use crate::ci::github::GithubClient;
use crate::ci::CheckRunService;
use crate::config::Config;
use crate::db::Storage;
use crate::tenant_service::ServiceRegistry;
use buildfarm_common::config::GC_INTERVAL;
use buildfarm_common::errors::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub mod ci;
pub mod config;
pub mod db;
pub mod models;
pub mod notify;
pub mod queue;
pub mod rebuild;
pub mod result;
pub mod retention;
pub mod retry;
pub mod schema;
pub mod service_state;
pub mod tenant_service;

/// Everything a transition needs: the store, the configuration and the
/// registered tenant services.
pub struct Context<S: Storage = db::Pool> {
    pub storage: S,
    pub config: Config,
    pub services: ServiceRegistry,
}

impl<S: Storage> Context<S> {
    pub fn new(storage: S, config: Config, services: ServiceRegistry) -> Context<S> {
        Context {
            storage,
            config,
            services,
        }
    }
}

pub fn run_config(pool: db::Pool, config: Config) -> Result<()> {
    let mut services = ServiceRegistry::new();
    let check_runs = if config.github.app_id.is_some() {
        let client = GithubClient::new(&config.github)?;
        let service = Arc::new(CheckRunService::new(client, config.github.details_url.clone()));
        services.register(ci::SERVICE_TYPE, service.clone());
        Some(service)
    } else {
        info!("No GitHub app configured, check runs are disabled");
        None
    };
    debug!("Registered tenant services: {:?}", services);

    let tick_interval = config.tick_interval;
    let ctx = Arc::new(Context::new(pool, config, services));

    {
        let ctx = ctx.clone();
        thread::spawn(move || loop {
            debug!("Collecting garbage...");
            match retention::collect_garbage(&*ctx) {
                Ok(stats) => debug!(
                    "Deleted {} builds and {} tenants",
                    stats.builds, stats.tenants
                ),
                Err(err) => error!("Failed to collect garbage: {:#}", err),
            }

            debug!("Sleeping until next garbage collection cycle...");
            thread::sleep(Duration::from_secs(GC_INTERVAL));
        });
    }

    loop {
        if let Err(err) = queue::requeue_forced(&*ctx) {
            error!("Failed to requeue forced builds: {:#}", err);
        }
        if let Some(service) = &check_runs {
            if let Err(err) = service.resync_unsynced(&*ctx) {
                error!("Failed to resync check runs: {:#}", err);
            }
        }
        thread::sleep(tick_interval);
    }
}
