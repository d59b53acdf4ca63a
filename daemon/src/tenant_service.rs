//! The contract between the build state machine and an external service a
//! tenant is bound to.
//!
//! A service implements any subset of the notification capabilities. Each
//! notification may return an update function which is then persisted through
//! the retrying service state driver. The notification itself runs once, only
//! the update function is re-invoked if the write has to be retried, so any
//! expensive work (network calls) belongs in the notification and the update
//! function should only merge its result into the stored data.

use crate::models::Build;
use buildfarm_common::errors::*;
use buildfarm_common::BuildState;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The service binding of a tenant. `data` is opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantService {
    pub service_type: String,
    pub id: String,
    pub data: Option<String>,
}

impl TenantService {
    pub fn new<T: Into<String>, I: Into<String>>(service_type: T, id: I, data: Option<String>) -> TenantService {
        TenantService {
            service_type: service_type.into(),
            id: id.into(),
            data,
        }
    }
}

/// Computes the new service data from the currently stored service, `None`
/// leaves it unchanged.
pub type UpdateFn = Box<dyn Fn(&str, &TenantService) -> Option<String> + Send>;

/// Hints about how a queued batch came to be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueuedHints {
    /// Only one package version was submitted for the tenant.
    pub single_package_version: bool,
    /// The package version only has one build configuration.
    pub single_package_config: bool,
}

pub trait BuildQueued {
    /// All builds share `initial_state`: `None` for new builds, `Building`
    /// for interrupted ones and `Built` for rebuilds.
    fn build_queued(
        &self,
        tenant_id: &str,
        service: &TenantService,
        builds: &[Build],
        initial_state: Option<BuildState>,
        hints: &QueuedHints,
    ) -> Result<Option<UpdateFn>>;
}

pub trait BuildBuilding {
    fn build_building(
        &self,
        tenant_id: &str,
        service: &TenantService,
        build: &Build,
    ) -> Result<Option<UpdateFn>>;
}

pub trait BuildBuilt {
    fn build_built(
        &self,
        tenant_id: &str,
        service: &TenantService,
        build: &Build,
    ) -> Result<Option<UpdateFn>>;
}

pub trait BuildCanceled {
    /// The tenant was archived, no further notifications follow.
    fn build_canceled(&self, tenant_id: &str, service: &TenantService);
}

pub trait TenantServiceHandler: Send + Sync {
    fn as_build_queued(&self) -> Option<&dyn BuildQueued> {
        None
    }

    fn as_build_building(&self) -> Option<&dyn BuildBuilding> {
        None
    }

    fn as_build_built(&self) -> Option<&dyn BuildBuilt> {
        None
    }

    fn as_build_canceled(&self) -> Option<&dyn BuildCanceled> {
        None
    }
}

#[derive(Clone, Default)]
pub struct ServiceRegistry {
    handlers: BTreeMap<String, Arc<dyn TenantServiceHandler>>,
}

impl ServiceRegistry {
    pub fn new() -> ServiceRegistry {
        ServiceRegistry::default()
    }

    pub fn register<T: Into<String>>(&mut self, service_type: T, handler: Arc<dyn TenantServiceHandler>) {
        self.handlers.insert(service_type.into(), handler);
    }

    pub fn get(&self, service_type: &str) -> Option<&dyn TenantServiceHandler> {
        self.handlers.get(service_type).map(|h| h.as_ref())
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}
