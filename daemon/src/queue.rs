use crate::db::Storage;
use crate::models::{Build, BuildResult, NewBuild, NewPackage, Package, PackageManifest, Tenant};
use crate::notify;
use crate::retry;
use crate::tenant_service::QueuedHints;
use crate::Context;
use buildfarm_common::build_config;
use buildfarm_common::errors::*;
use buildfarm_common::{BuildId, BuildMachine, BuildState, ForceState, PackageId, Toolchain};
use chrono::Utc;

/// A (target configuration, package configuration) pair the package is not
/// built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusion {
    pub target: String,
    pub target_config_name: String,
    pub package_config_name: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct Enqueued {
    pub builds: Vec<Build>,
    pub excluded: Vec<Exclusion>,
}

/// Store a new tenant together with its packages, then queue the builds of
/// every package.
pub fn admit_tenant<S: Storage>(
    ctx: &Context<S>,
    tenant: &Tenant,
    packages: &[PackageManifest],
    toolchain: &Toolchain,
) -> Result<Vec<Enqueued>> {
    if !ctx.config.has_toolchain(toolchain) {
        bail!("Unknown toolchain: {}", toolchain);
    }

    retry::transact(&ctx.storage, &ctx.config.retry, |connection, _| {
        tenant.insert(connection)?;
        for manifest in packages {
            NewPackage::from_manifest(&tenant.id, manifest)?.insert(connection)?;
        }
        Ok(())
    })?;
    info!("Admitted tenant {} with {} packages", tenant.id, packages.len());

    packages
        .iter()
        .map(|manifest| enqueue_package(ctx, &tenant.id, &manifest.name, &manifest.version, toolchain))
        .collect()
}

/// Create the missing builds of a package version for every configuration
/// it's eligible for and notify the tenant service about them.
pub fn enqueue_package<S: Storage>(
    ctx: &Context<S>,
    tenant_id: &str,
    name: &str,
    version: &str,
    toolchain: &Toolchain,
) -> Result<Enqueued> {
    if !ctx.config.has_toolchain(toolchain) {
        bail!("Unknown toolchain: {}", toolchain);
    }

    let pkg = PackageId {
        tenant: tenant_id.to_string(),
        name: name.to_string(),
        version: version.to_string(),
    };
    let configs = &ctx.config.build_configs;
    let now = Utc::now().naive_utc();

    let (tenant, enqueued, hints) = retry::transact(&ctx.storage, &ctx.config.retry, |connection, _| {
        let mut tenant = Tenant::get_id(tenant_id, connection)?
            .ok_or_else(|| format_err!("Tenant not found: {}", tenant_id))?;
        if tenant.archived {
            bail!("Tenant {} is archived", tenant_id);
        }

        let package = Package::get(&pkg, connection)?
            .ok_or_else(|| format_err!("Package not found: {} {}", name, version))?;
        if !package.buildable {
            bail!("Package {} {} is not buildable", name, version);
        }
        let exprs = package.build_exprs()?;
        let constraints = package.build_constraints()?;
        let package_configs = package.build_configs()?;

        let existing = Build::list_for_package(&pkg, connection)?
            .into_iter()
            .map(|b| b.build_id())
            .collect::<Vec<_>>();

        let mut enqueued = Enqueued::default();
        for target_config in &configs.configs {
            for package_config in &package_configs {
                if let Some(reason) = build_config::package_excluded(
                    package_config,
                    &exprs,
                    &constraints,
                    target_config,
                    &configs.inheritance,
                    package.default_all_classes,
                ) {
                    debug!(
                        "Package {} {} excluded from {}/{}: {:?}",
                        name, version, target_config.name, package_config.name, reason
                    );
                    enqueued.excluded.push(Exclusion {
                        target: target_config.target.clone(),
                        target_config_name: target_config.name.clone(),
                        package_config_name: package_config.name.clone(),
                        reason,
                    });
                    continue;
                }

                let bid = BuildId {
                    tenant: tenant_id.to_string(),
                    package_name: name.to_string(),
                    package_version: version.to_string(),
                    target: target_config.target.clone(),
                    target_config_name: target_config.name.clone(),
                    package_config_name: package_config.name.clone(),
                    toolchain_name: toolchain.name.clone(),
                    toolchain_version: toolchain.version.clone(),
                };
                if existing.contains(&bid) {
                    continue;
                }
                let build = NewBuild::queued(bid, now).insert(connection)?;
                enqueued.builds.push(build);
            }
        }

        if !enqueued.builds.is_empty() {
            tenant.stamp_queued(now, connection)?;
        }

        let hints = QueuedHints {
            single_package_version: Package::count_for_tenant(tenant_id, connection)? == 1,
            single_package_config: package_configs.len() == 1,
        };
        Ok((tenant, enqueued, hints))
    })?;

    info!(
        "Queued {} builds of {} {} for tenant {} ({} excluded)",
        enqueued.builds.len(),
        name,
        version,
        tenant_id,
        enqueued.excluded.len()
    );
    notify::build_queued(ctx, &tenant, &enqueued.builds, None, &hints)?;

    Ok(enqueued)
}

/// Hand the oldest queued build for this toolchain to a machine.
pub fn claim_build<S: Storage>(
    ctx: &Context<S>,
    toolchain: &Toolchain,
    machine: &BuildMachine,
) -> Result<Option<Build>> {
    let now = Utc::now().naive_utc();

    let claimed = retry::transact(&ctx.storage, &ctx.config.retry, |connection, _| {
        let Some(mut build) = Build::next_queued(toolchain, connection)? else {
            return Ok(None);
        };
        let tenant = Tenant::get_id(&build.tenant_id, connection)?
            .ok_or_else(|| format_err!("Tenant not found: {}", build.tenant_id))?;

        build.state = BuildState::Building;
        build.status = None;
        build.timestamp = now;
        build.machine = Some(machine.name.clone());
        build.machine_summary = Some(machine.summary.clone());
        build.update(connection)?;

        Ok(Some((tenant, build)))
    })?;

    let Some((tenant, build)) = claimed else {
        trace!("No queued builds for toolchain {}", toolchain);
        return Ok(None);
    };
    info!("Build {} claimed by {}", build.build_id(), machine.name);
    notify::build_building(ctx, &tenant, &build)?;

    Ok(Some(build))
}

/// Queue built builds that were forced, one batch per tenant. Tenants that
/// got a queued notification recently are left for the next pass.
pub fn requeue_forced<S: Storage>(ctx: &Context<S>) -> Result<usize> {
    let now = Utc::now().naive_utc();
    let cutoff = now - ctx.config.queued_notification_delay;

    let batches = retry::transact(&ctx.storage, &ctx.config.retry, |connection, _| {
        let mut batches: Vec<(Tenant, Vec<Build>)> = Vec::new();

        // ordered by tenant
        for mut build in Build::list_forced(connection)? {
            let same_tenant = batches
                .last()
                .map(|(tenant, _)| tenant.id == build.tenant_id)
                .unwrap_or(false);
            if !same_tenant {
                let tenant = Tenant::get_id(&build.tenant_id, connection)?
                    .ok_or_else(|| format_err!("Tenant not found: {}", build.tenant_id))?;
                batches.push((tenant, Vec::new()));
            }
            let Some((tenant, builds)) = batches.last_mut() else {
                continue;
            };

            if let Some(queued) = tenant.queued_timestamp {
                if queued > cutoff {
                    trace!("Tenant {} was notified recently, skipping", tenant.id);
                    continue;
                }
            }

            build.state = BuildState::Queued;
            build.force = ForceState::Unforced;
            build.status = None;
            build.timestamp = now;
            build.completion_timestamp = None;
            build.machine = None;
            build.machine_summary = None;
            build.update(connection)?;
            BuildResult::delete_for_build(build.id, connection)?;

            builds.push(build);
        }

        batches.retain(|(_, builds)| !builds.is_empty());
        for (tenant, _) in &mut batches {
            tenant.stamp_queued(now, connection)?;
        }

        Ok(batches)
    })?;

    let mut count = 0;
    for (tenant, builds) in &batches {
        info!("Requeued {} forced builds of tenant {}", builds.len(), tenant.id);
        count += builds.len();
        if let Err(err) = notify::build_queued(
            ctx,
            tenant,
            builds,
            Some(BuildState::Built),
            &QueuedHints::default(),
        ) {
            error!("Failed to notify tenant {}: {:#}", tenant.id, err);
        }
    }

    Ok(count)
}
