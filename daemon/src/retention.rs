use crate::db::Storage;
use crate::models::{Build, Package, Tenant};
use crate::retry;
use crate::Context;
use buildfarm_common::errors::Context as _;
use buildfarm_common::errors::*;
use buildfarm_common::Toolchain;
use chrono::Utc;
use std::collections::HashSet;

const DELETE_CHUNK_SIZE: usize = 500;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GarbageStats {
    pub builds: usize,
    pub tenants: usize,
}

/// Builds whose package is gone or whose target configuration or toolchain
/// isn't configured anymore.
pub fn find_orphaned_builds<S: Storage>(ctx: &Context<S>) -> Result<Vec<i32>> {
    retry::transact(&ctx.storage, &ctx.config.retry, |connection, _| {
        let packages = Package::list_keys(connection)?
            .into_iter()
            .collect::<HashSet<_>>();

        let orphaned = Build::list_keys(connection)?
            .into_iter()
            .filter(|key| {
                let package = (
                    key.tenant_id.clone(),
                    key.package_name.clone(),
                    key.package_version.clone(),
                );
                let toolchain = Toolchain::new(&key.toolchain_name, &key.toolchain_version);
                !packages.contains(&package)
                    || ctx
                        .config
                        .build_configs
                        .find(&key.target_config_name, &key.target)
                        .is_none()
                    || !ctx.config.has_toolchain(&toolchain)
            })
            .map(|key| key.id)
            .collect();
        Ok(orphaned)
    })
}

pub fn collect_garbage<S: Storage>(ctx: &Context<S>) -> Result<GarbageStats> {
    let mut stats = GarbageStats::default();

    let orphaned = find_orphaned_builds(ctx)?;
    if !orphaned.is_empty() {
        info!("Deleting {} orphaned builds...", orphaned.len());
        for ids in orphaned.chunks(DELETE_CHUNK_SIZE) {
            stats.builds += retry::transact(&ctx.storage, &ctx.config.retry, |connection, _| {
                Build::delete_multiple(ids, connection).context("Failed to delete builds")
            })?;
            debug!("Deleted chunk of {} builds", ids.len());
        }
        info!("Finished removing orphaned builds");
    }

    let cutoff = Utc::now().naive_utc() - chrono::Duration::days(ctx.config.retention_days);
    let expired = retry::transact(&ctx.storage, &ctx.config.retry, |connection, _| {
        Tenant::list_archived_before(cutoff, connection)
    })?;
    if !expired.is_empty() {
        info!("Deleting {} archived tenants...", expired.len());
        for ids in expired.chunks(DELETE_CHUNK_SIZE) {
            stats.tenants += retry::transact(&ctx.storage, &ctx.config.retry, |connection, _| {
                Tenant::delete_multiple(ids, connection).context("Failed to delete tenants")
            })?;
        }
    }

    Ok(stats)
}
