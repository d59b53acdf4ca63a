use crate::db::Storage;
use crate::models::{Build, BuildResult, NewBuildResult, Tenant};
use crate::notify;
use crate::retry;
use crate::tenant_service::QueuedHints;
use crate::Context;
use buildfarm_common::errors::*;
use buildfarm_common::{BuildId, BuildMachine, BuildState, ForceState, ResultStatus};
use chrono::Utc;
use diesel::SqliteConnection;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub operation: String,
    pub status: ResultStatus,
    pub log: Vec<u8>,
}

impl OperationResult {
    pub fn new<O: Into<String>>(operation: O, status: ResultStatus) -> OperationResult {
        OperationResult {
            operation: operation.into(),
            status,
            log: Vec::new(),
        }
    }
}

/// What a build machine reports once it's done with a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub status: ResultStatus,
    pub results: Vec<OperationResult>,
    pub auxiliary_machines: Vec<BuildMachine>,
}

impl BuildReport {
    /// The overall status is the worst of the operation results, a report
    /// without any operations is a success.
    pub fn from_results(results: Vec<OperationResult>) -> BuildReport {
        let status = ResultStatus::worst(results.iter().map(|r| r.status))
            .unwrap_or(ResultStatus::Success);
        BuildReport {
            status,
            results,
            auxiliary_machines: Vec::new(),
        }
    }
}

fn building_build(
    bid: &BuildId,
    connection: &mut SqliteConnection,
) -> Result<(Tenant, Build)> {
    let build = Build::get(bid, connection)?
        .ok_or_else(|| format_err!("Build not found: {}", bid))?;
    if build.state != BuildState::Building {
        bail!("Build {} is {}, not building", bid, build.state);
    }
    let tenant = Tenant::get_id(&build.tenant_id, connection)?
        .ok_or_else(|| format_err!("Tenant not found: {}", build.tenant_id))?;
    Ok((tenant, build))
}

/// Move a building build to built and store the operation results.
pub fn report_result<S: Storage>(ctx: &Context<S>, bid: &BuildId, report: &BuildReport) -> Result<Build> {
    let now = Utc::now().naive_utc();
    let auxiliary_machines = serde_json::to_string(&report.auxiliary_machines)?;

    let (tenant, build) = retry::transact(&ctx.storage, &ctx.config.retry, |connection, _| {
        let (tenant, mut build) = building_build(bid, connection)?;

        build.state = BuildState::Built;
        build.status = Some(report.status);
        build.force = match build.force {
            ForceState::Forcing => ForceState::Forced,
            _ => ForceState::Unforced,
        };
        build.timestamp = now;
        build.completion_timestamp = Some(now);
        build.auxiliary_machines = auxiliary_machines.clone();
        build.update(connection)?;

        BuildResult::delete_for_build(build.id, connection)?;
        let results = report
            .results
            .iter()
            .map(|r| NewBuildResult {
                build_id: build.id,
                operation: r.operation.clone(),
                status: r.status,
                log: r.log.clone(),
            })
            .collect::<Vec<_>>();
        NewBuildResult::insert_batch(&results, connection)?;

        Ok((tenant, build))
    })?;

    info!("Build {} finished: {}", bid, report.status);
    if build.force == ForceState::Forced {
        debug!("Build {} was forced while building, it will be queued again", bid);
    }
    notify::build_built(ctx, &tenant, &build)?;

    Ok(build)
}

/// Record the status a building build has so far, without notifying.
pub fn report_interim_status<S: Storage>(ctx: &Context<S>, bid: &BuildId, status: ResultStatus) -> Result<()> {
    retry::transact(&ctx.storage, &ctx.config.retry, |connection, _| {
        let (_, mut build) = building_build(bid, connection)?;
        if build.status != Some(status) {
            build.status = Some(status);
            build.update(connection)?;
        }
        Ok(())
    })
}

/// Put a building build back into the queue, eg. because its machine went
/// away. A pending force request is satisfied by the requeue.
pub fn interrupt_build<S: Storage>(ctx: &Context<S>, bid: &BuildId) -> Result<Build> {
    let now = Utc::now().naive_utc();

    let (tenant, build) = retry::transact(&ctx.storage, &ctx.config.retry, |connection, _| {
        let (mut tenant, mut build) = building_build(bid, connection)?;

        build.state = BuildState::Queued;
        build.force = ForceState::Unforced;
        build.status = None;
        build.timestamp = now;
        build.machine = None;
        build.machine_summary = None;
        build.update(connection)?;
        tenant.stamp_queued(now, connection)?;

        Ok((tenant, build))
    })?;

    warn!("Build {} was interrupted, queued again", bid);
    notify::build_queued(
        ctx,
        &tenant,
        std::slice::from_ref(&build),
        Some(BuildState::Building),
        &QueuedHints::default(),
    )?;

    Ok(build)
}
