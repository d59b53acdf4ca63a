use crate::db::Storage;
use crate::models::{Build, Package, Tenant};
use crate::notify;
use crate::retry;
use crate::service_state;
use crate::tenant_service::{QueuedHints, TenantService};
use crate::Context;
use buildfarm_common::errors::*;
use buildfarm_common::{BuildId, BuildState, ForceState, PackageId, Toolchain};
use chrono::Utc;

/// Request a rebuild of an existing build.
///
/// A queued build is left alone, a building one is marked as forcing and a
/// built one as forced, the scheduler takes it from there. Returns the state
/// the build was in, or `None` if the build, its tenant or its package is
/// gone, the tenant is archived or the package isn't buildable.
///
/// If `update` is given and the tenant has a service, it's used to update the
/// service state with the state of the build.
pub fn rebuild<S: Storage>(
    ctx: &Context<S>,
    bid: &BuildId,
    update: Option<&dyn Fn(&str, &TenantService, BuildState) -> Option<String>>,
) -> Result<Option<BuildState>> {
    let found = retry::transact(&ctx.storage, &ctx.config.retry, |connection, _| {
        let Some(mut build) = Build::get(bid, connection)? else {
            return Ok(None);
        };
        let Some(tenant) = Tenant::get_id(&build.tenant_id, connection)? else {
            return Ok(None);
        };
        if tenant.archived {
            return Ok(None);
        }
        match Package::get(&build.package_id(), connection)? {
            Some(package) if package.buildable => (),
            _ => return Ok(None),
        }

        let state = build.state;
        match state {
            BuildState::Queued => (),
            BuildState::Building => {
                build.set_force(ForceState::Forcing, connection)?;
            }
            BuildState::Built => {
                build.set_force(ForceState::Forced, connection)?;
            }
        }
        Ok(Some((tenant, state)))
    })?;

    let Some((tenant, state)) = found else {
        debug!("Not rebuilding {}, nothing to rebuild", bid);
        return Ok(None);
    };
    debug!("Rebuild of {} requested while {}", bid, state);

    if let (Some(update), Some(service)) = (update, tenant.service()) {
        service_state::update_tenant_service_state(ctx, &service.service_type, &service.id, |tenant_id, service| {
            update(tenant_id, service, state)
        })?;
    }

    Ok(Some(state))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForceRequest {
    pub package: PackageId,
    pub target: String,
    pub target_config_name: String,
    pub package_config_name: String,
    pub toolchain: Toolchain,
    pub reason: String,
}

impl ForceRequest {
    pub fn build_id(&self) -> BuildId {
        BuildId {
            tenant: self.package.tenant.clone(),
            package_name: self.package.name.clone(),
            package_version: self.package.version.clone(),
            target: self.target.clone(),
            target_config_name: self.target_config_name.clone(),
            package_config_name: self.package_config_name.clone(),
            toolchain_name: self.toolchain.name.clone(),
            toolchain_version: self.toolchain.version.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ForceError {
    #[error("Unknown target configuration {name} for target {target}")]
    UnknownTargetConfig { name: String, target: String },
    #[error("Unknown toolchain {0}")]
    UnknownToolchain(Toolchain),
    #[error("Package {name} {version} not found")]
    PackageNotFound { name: String, version: String },
    #[error("Unknown package configuration {0}")]
    UnknownPackageConfig(String),
    #[error("Build not found: {0}")]
    NotFound(BuildId),
}

/// Operator-initiated rebuild. Unlike [`rebuild`] the request is checked
/// against the configuration first and a building build gets a queued
/// notification right away, so the service can show the pending rebuild.
pub fn force_rebuild<S: Storage>(ctx: &Context<S>, req: &ForceRequest) -> Result<BuildState> {
    if ctx
        .config
        .build_configs
        .find(&req.target_config_name, &req.target)
        .is_none()
    {
        return Err(ForceError::UnknownTargetConfig {
            name: req.target_config_name.clone(),
            target: req.target.clone(),
        }
        .into());
    }
    if !ctx.config.has_toolchain(&req.toolchain) {
        return Err(ForceError::UnknownToolchain(req.toolchain.clone()).into());
    }

    let bid = req.build_id();
    let now = Utc::now().naive_utc();

    let (tenant, build, state, notify_queued) =
        retry::transact(&ctx.storage, &ctx.config.retry, |connection, _| {
            let package = Package::get(&req.package, connection)?.ok_or_else(|| {
                ForceError::PackageNotFound {
                    name: req.package.name.clone(),
                    version: req.package.version.clone(),
                }
            })?;
            if package.find_build_config(&req.package_config_name)?.is_none() {
                return Err(ForceError::UnknownPackageConfig(req.package_config_name.clone()).into());
            }

            let mut build = Build::get(&bid, connection)?
                .ok_or_else(|| ForceError::NotFound(bid.clone()))?;
            let mut tenant = Tenant::get_id(&build.tenant_id, connection)?
                .ok_or_else(|| format_err!("Tenant not found: {}", build.tenant_id))?;

            let state = build.state;
            let mut notify_queued = false;
            match state {
                BuildState::Queued => (),
                BuildState::Building => {
                    if build.set_force(ForceState::Forcing, connection)?
                        && notify::handles_build_queued(ctx, &tenant)
                    {
                        tenant.stamp_queued(now, connection)?;
                        notify_queued = true;
                    }
                }
                BuildState::Built => {
                    build.set_force(ForceState::Forced, connection)?;
                }
            }
            Ok((tenant, build, state, notify_queued))
        })?;

    info!("Forced rebuild of {} while {}: {}", bid, state, req.reason);

    if notify_queued {
        notify::build_queued(
            ctx,
            &tenant,
            std::slice::from_ref(&build),
            Some(BuildState::Building),
            &QueuedHints::default(),
        )?;
    }

    Ok(state)
}
