//! Read-modify-write of the tenant service state with retries, and tenant
//! cancellation once the retries run out.

use crate::db::Storage;
use crate::models::Tenant;
use crate::notify;
use crate::retry;
use crate::tenant_service::TenantService;
use crate::Context;
use buildfarm_common::errors::*;
use chrono::Utc;
use diesel::SqliteConnection;

/// Look up the tenant by its service binding and let `mutate` change it.
///
/// `mutate` is called once per attempt, with `None` if there is no such
/// tenant, and returns whether it changed anything. Changes are written and
/// the new service is returned. A change must keep the service.
///
/// If the storage keeps failing until the retries are exhausted, the tenant
/// is canceled and its service gets `build_canceled` before the error is
/// returned.
pub fn update_tenant_service<S, F>(
    ctx: &Context<S>,
    service_type: &str,
    service_id: &str,
    mut mutate: F,
) -> Result<Option<TenantService>>
where
    S: Storage,
    F: FnMut(Option<&mut Tenant>) -> bool,
{
    // pre-mutation service of the latest attempt that found the tenant
    let mut snapshot: Option<(String, TenantService)> = None;

    let result = retry::transact(&ctx.storage, &ctx.config.retry, |connection, _attempt| {
        let mut tenant = Tenant::get_by_service(service_type, service_id, connection)?;
        if let Some(tenant) = &tenant {
            if let Some(service) = tenant.service() {
                snapshot = Some((tenant.id.clone(), service));
            }
        }

        let changed = mutate(tenant.as_mut());
        let Some(tenant) = tenant else {
            return Ok(None);
        };
        if !changed {
            return Ok(None);
        }

        let service = tenant.service().ok_or_else(|| {
            format_err!(
                "Service {}/{} was removed from tenant {} by a state update",
                service_type,
                service_id,
                tenant.id
            )
        })?;
        tenant.update(connection)?;
        Ok(Some(service))
    });

    match result {
        Err(err) if retry::is_exhausted(&err) => {
            if let Some((tenant_id, service)) = snapshot {
                error!(
                    "Failed to update state of service {}/{}, canceling tenant {}",
                    service_type, service_id, tenant_id
                );
                match archive(ctx, |connection| Tenant::get_id(&tenant_id, connection)) {
                    Ok(Some(_)) => notify::build_canceled(ctx, &tenant_id, &service),
                    Ok(None) => debug!("Tenant {} was already canceled", tenant_id),
                    Err(cancel_err) => {
                        error!("Failed to cancel tenant {}: {:#}", tenant_id, cancel_err)
                    }
                }
            }
            Err(err)
        }
        result => result,
    }
}

/// Replace the service data of an active tenant with whatever `update`
/// computes from the current service. Returns the new data if it changed.
pub fn update_tenant_service_state<S, F>(
    ctx: &Context<S>,
    service_type: &str,
    service_id: &str,
    update: F,
) -> Result<Option<String>>
where
    S: Storage,
    F: Fn(&str, &TenantService) -> Option<String>,
{
    let service = update_tenant_service(ctx, service_type, service_id, |tenant| {
        let Some(tenant) = tenant else {
            return false;
        };
        if tenant.archived {
            return false;
        }
        let Some(service) = tenant.service() else {
            return false;
        };
        match update(&tenant.id, &service) {
            Some(data) => {
                tenant.service_data = Some(data);
                true
            }
            None => false,
        }
    })?;
    Ok(service.and_then(|s| s.data))
}

/// Archive the tenant `lookup` finds, unless it's missing or archived
/// already. Returns the archived tenant.
fn archive<S, F>(ctx: &Context<S>, lookup: F) -> Result<Option<Tenant>>
where
    S: Storage,
    F: Fn(&mut SqliteConnection) -> Result<Option<Tenant>>,
{
    retry::transact(&ctx.storage, &ctx.config.cancel_retry(), |connection, _attempt| {
        let Some(mut tenant) = lookup(connection)? else {
            return Ok(None);
        };
        if !tenant.archive(Utc::now().naive_utc(), connection)? {
            return Ok(None);
        }
        Ok(Some(tenant))
    })
}

/// Cancel the tenant and notify its service. Canceling a missing or
/// already archived tenant does nothing and returns false.
pub fn cancel_tenant<S: Storage>(ctx: &Context<S>, tenant_id: &str) -> Result<bool> {
    let tenant = archive(ctx, |connection| Tenant::get_id(tenant_id, connection))?;
    Ok(canceled(ctx, tenant))
}

pub fn cancel_tenant_by_service<S: Storage>(
    ctx: &Context<S>,
    service_type: &str,
    service_id: &str,
) -> Result<bool> {
    let tenant = archive(ctx, |connection| {
        Tenant::get_by_service(service_type, service_id, connection)
    })?;
    Ok(canceled(ctx, tenant))
}

// runs after the transaction committed and the connection went back to the pool
fn canceled<S: Storage>(ctx: &Context<S>, tenant: Option<Tenant>) -> bool {
    let Some(tenant) = tenant else {
        return false;
    };
    info!("Canceled tenant {}", tenant.id);
    if let Some(service) = tenant.service() {
        notify::build_canceled(ctx, &tenant.id, &service);
    }
    true
}
