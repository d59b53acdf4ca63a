use crate::db::Storage;
use crate::models::{Build, Tenant};
use crate::service_state;
use crate::tenant_service::{QueuedHints, TenantService, TenantServiceHandler, UpdateFn};
use crate::Context;
use buildfarm_common::errors::Context as _;
use buildfarm_common::errors::*;
use buildfarm_common::BuildState;

/// Looks up the handler for the tenant's service. Archived tenants and
/// tenants without a service are never notified.
fn handler<'a, S: Storage>(
    ctx: &'a Context<S>,
    tenant: &Tenant,
) -> Option<(&'a dyn TenantServiceHandler, TenantService)> {
    if tenant.archived {
        trace!("Not notifying archived tenant {}", tenant.id);
        return None;
    }
    let service = tenant.service()?;
    match ctx.services.get(&service.service_type) {
        Some(handler) => Some((handler, service)),
        None => {
            debug!(
                "No handler for service type {:?} of tenant {}",
                service.service_type, tenant.id
            );
            None
        }
    }
}

/// Whether a `build_queued` notification for this tenant would reach a
/// handler.
pub fn handles_build_queued<S: Storage>(ctx: &Context<S>, tenant: &Tenant) -> bool {
    handler(ctx, tenant)
        .map(|(handler, _)| handler.as_build_queued().is_some())
        .unwrap_or(false)
}

/// Persist what a notification returned. Errors of the notification itself
/// are logged and dropped, errors of the driver are returned.
fn persist<S: Storage>(
    ctx: &Context<S>,
    event: &str,
    tenant: &Tenant,
    service: &TenantService,
    result: Result<Option<UpdateFn>>,
) -> Result<()> {
    match result {
        Ok(Some(update)) => {
            service_state::update_tenant_service_state(ctx, &service.service_type, &service.id, update)
                .with_context(|| anyhow!("Failed to store service state after {} of tenant {}", event, tenant.id))?;
        }
        Ok(None) => (),
        Err(err) => error!("Notification {} for tenant {} failed: {:#}", event, tenant.id, err),
    }
    Ok(())
}

pub fn build_queued<S: Storage>(
    ctx: &Context<S>,
    tenant: &Tenant,
    builds: &[Build],
    initial_state: Option<BuildState>,
    hints: &QueuedHints,
) -> Result<()> {
    if builds.is_empty() {
        return Ok(());
    }
    let Some((handler, service)) = handler(ctx, tenant) else {
        return Ok(());
    };
    let Some(cb) = handler.as_build_queued() else {
        return Ok(());
    };

    debug!(
        "Notifying {} of {} queued builds of tenant {}",
        service.service_type,
        builds.len(),
        tenant.id
    );
    let result = cb.build_queued(&tenant.id, &service, builds, initial_state, hints);
    persist(ctx, "build_queued", tenant, &service, result)
}

pub fn build_building<S: Storage>(ctx: &Context<S>, tenant: &Tenant, build: &Build) -> Result<()> {
    let Some((handler, service)) = handler(ctx, tenant) else {
        return Ok(());
    };
    let Some(cb) = handler.as_build_building() else {
        return Ok(());
    };

    let result = cb.build_building(&tenant.id, &service, build);
    persist(ctx, "build_building", tenant, &service, result)
}

pub fn build_built<S: Storage>(ctx: &Context<S>, tenant: &Tenant, build: &Build) -> Result<()> {
    let Some((handler, service)) = handler(ctx, tenant) else {
        return Ok(());
    };
    let Some(cb) = handler.as_build_built() else {
        return Ok(());
    };

    let result = cb.build_built(&tenant.id, &service, build);
    persist(ctx, "build_built", tenant, &service, result)
}

/// Delivered after the tenant was archived, so the archived check of the
/// other notifications doesn't apply.
pub fn build_canceled<S: Storage>(ctx: &Context<S>, tenant_id: &str, service: &TenantService) {
    let Some(handler) = ctx.services.get(&service.service_type) else {
        debug!(
            "No handler for service type {:?} of canceled tenant {}",
            service.service_type, tenant_id
        );
        return;
    };
    if let Some(cb) = handler.as_build_canceled() {
        info!("Notifying {} of canceled tenant {}", service.service_type, tenant_id);
        cb.build_canceled(tenant_id, service);
    }
}
