//! Reports the builds of a tenant as check runs of a CI provider.
//!
//! Every build gets one check run, mirrored in the tenant's service data.
//! Remote calls happen in the notifications, the returned update functions
//! only merge their outcome into the stored data.

pub mod github;
pub mod service_data;

use self::service_data::{CheckRun, ServiceData};
use crate::db::Storage;
use crate::models::{Build, Tenant};
use crate::retry;
use crate::service_state;
use crate::tenant_service::{
    BuildBuilding, BuildBuilt, BuildCanceled, BuildQueued, QueuedHints, TenantService,
    TenantServiceHandler, UpdateFn,
};
use crate::Context;
use buildfarm_common::errors::*;
use buildfarm_common::{BuildId, BuildState, ResultStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const SERVICE_TYPE: &str = "ci-github";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckRunStatus {
    Queued,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Conclusion {
    Success,
    Failure,
    Neutral,
    Cancelled,
    Skipped,
}

impl Conclusion {
    pub fn from_status(status: ResultStatus, warning_success: bool) -> Conclusion {
        match status {
            ResultStatus::Success => Conclusion::Success,
            ResultStatus::Warning if warning_success => Conclusion::Success,
            ResultStatus::Warning
            | ResultStatus::Error
            | ResultStatus::Abort
            | ResultStatus::Abnormal => Conclusion::Failure,
            ResultStatus::Skip => Conclusion::Skipped,
            ResultStatus::Interrupt => Conclusion::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRunUpdate {
    pub status: CheckRunStatus,
    pub conclusion: Option<Conclusion>,
    pub title: String,
    pub summary: String,
    pub details_url: Option<String>,
}

impl CheckRunUpdate {
    pub fn for_check_run(cr: &CheckRun, warning_success: bool) -> CheckRunUpdate {
        let (status, conclusion, title, summary) = match cr.state {
            BuildState::Queued => (
                CheckRunStatus::Queued,
                None,
                "Queued".to_string(),
                "Waiting for a build machine".to_string(),
            ),
            BuildState::Building => (
                CheckRunStatus::InProgress,
                None,
                "Building".to_string(),
                "Build in progress".to_string(),
            ),
            BuildState::Built => {
                let conclusion = cr
                    .status
                    .map(|s| Conclusion::from_status(s, warning_success))
                    .unwrap_or(Conclusion::Neutral);
                let title = match cr.status {
                    Some(status) => format!("Built: {}", status),
                    None => "Built".to_string(),
                };
                (
                    CheckRunStatus::Completed,
                    Some(conclusion),
                    title,
                    "Build finished".to_string(),
                )
            }
        };
        CheckRunUpdate {
            status,
            conclusion,
            title,
            summary,
            details_url: cr.details_url.clone(),
        }
    }

    pub fn canceled() -> CheckRunUpdate {
        CheckRunUpdate {
            status: CheckRunStatus::Completed,
            conclusion: Some(Conclusion::Cancelled),
            title: "Canceled".to_string(),
            summary: "The CI request was canceled".to_string(),
            details_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// The calls the check-run service makes to the CI provider.
pub trait CheckRunClient: Send + Sync {
    fn access_token(&self, installation_id: u64) -> Result<AccessToken>;

    /// Returns the node id of the new check run.
    fn create_check_run(
        &self,
        token: &str,
        repository_node_id: &str,
        head_sha: &str,
        name: &str,
        update: &CheckRunUpdate,
    ) -> Result<String>;

    fn update_check_run(
        &self,
        token: &str,
        repository_node_id: &str,
        node_id: &str,
        update: &CheckRunUpdate,
    ) -> Result<()>;
}

fn load(service: &TenantService) -> Result<ServiceData> {
    let data = service
        .data
        .as_deref()
        .ok_or_else(|| format_err!("Service {} has no data", service.id))?;
    ServiceData::parse(data)
}

/// Merges a refreshed token and the pushed check runs into the currently
/// stored data.
fn update_fn(token: Option<AccessToken>, check_runs: Vec<CheckRun>, regress: bool) -> Option<UpdateFn> {
    if token.is_none() && check_runs.is_empty() {
        return None;
    }

    Some(Box::new(move |tenant_id: &str, service: &TenantService| {
        let mut data = match load(service) {
            Ok(data) => data,
            Err(err) => {
                error!("Invalid service data of tenant {}: {:#}", tenant_id, err);
                return None;
            }
        };

        let mut changed = false;
        if let Some(token) = &token {
            let newer = data
                .installation_access_token_expires_at
                .map(|expires_at| expires_at < token.expires_at)
                .unwrap_or(true);
            if newer {
                data.installation_access_token = Some(token.token.clone());
                data.installation_access_token_expires_at = Some(token.expires_at);
                changed = true;
            }
        }
        for cr in &check_runs {
            changed |= data.merge_check_run(cr, regress);
        }
        if !changed {
            return None;
        }

        match data.to_json() {
            Ok(json) => Some(json),
            Err(err) => {
                error!("Failed to serialize service data of tenant {}: {:#}", tenant_id, err);
                None
            }
        }
    }))
}

pub struct CheckRunService<C> {
    client: C,
    details_url: Option<String>,
}

impl<C: CheckRunClient> CheckRunService<C> {
    pub fn new(client: C, details_url: Option<String>) -> CheckRunService<C> {
        CheckRunService {
            client,
            details_url,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn new_check_run(&self, build_id: BuildId) -> CheckRun {
        let name = format!(
            "{}/{}/{}/{}",
            build_id.package_name,
            build_id.package_version,
            build_id.target_config_name,
            build_id.package_config_name
        );
        let details_url = self
            .details_url
            .as_ref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), build_id));
        let mut cr = CheckRun::new(build_id, name);
        cr.details_url = details_url;
        cr
    }

    /// Returns the new token if it had to be refreshed. A failed refresh
    /// leaves the old one in place.
    fn refresh_token(&self, data: &mut ServiceData) -> Option<AccessToken> {
        if data.token_valid(Utc::now()) {
            return None;
        }
        match self.client.access_token(data.installation_id) {
            Ok(token) => {
                debug!("Refreshed access token of installation {}", data.installation_id);
                data.installation_access_token = Some(token.token.clone());
                data.installation_access_token_expires_at = Some(token.expires_at);
                Some(token)
            }
            Err(err) => {
                warn!(
                    "Failed to get access token of installation {}: {:#}",
                    data.installation_id, err
                );
                None
            }
        }
    }

    /// Push the mirror to the remote side, it's marked synced if that worked.
    fn push(&self, data: &ServiceData, cr: &mut CheckRun) {
        let Some(token) = data.installation_access_token.as_deref() else {
            warn!("No access token, not pushing check run {}", cr.name);
            return;
        };

        let update = CheckRunUpdate::for_check_run(cr, data.warning_success);
        let result = if let Some(node_id) = cr.node_id.clone() {
            self.client
                .update_check_run(token, &data.repository_node_id, &node_id, &update)
        } else {
            self.client
                .create_check_run(token, &data.repository_node_id, &data.report_sha, &cr.name, &update)
                .map(|node_id| {
                    cr.node_id = Some(node_id);
                })
        };

        match result {
            Ok(()) => cr.state_synced = true,
            Err(err) => warn!("Failed to push check run {}: {:#}", cr.name, err),
        }
    }

    fn transition(&self, tenant_id: &str, service: &TenantService, build: &Build) -> Result<Option<UpdateFn>> {
        let mut data = load(service)?;
        let token = self.refresh_token(&mut data);

        let bid = build.build_id();
        let mut cr = match data.check_run(&bid) {
            Some(cr) => cr.clone(),
            None => self.new_check_run(bid),
        };
        cr.set_state(build.state, build.status);
        self.push(&data, &mut cr);
        debug!("Check run {} of tenant {} is {}", cr.name, tenant_id, cr.state);

        Ok(update_fn(token, vec![cr], false))
    }

    /// Push a single tenant's unsynced check runs again. Returns how many
    /// made it.
    pub fn resync_tenant<S: Storage>(&self, ctx: &Context<S>, tenant: &Tenant) -> Result<usize> {
        let Some(service) = tenant.service() else {
            return Ok(0);
        };
        let mut data = load(&service)?;
        let unsynced = data.unsynced().cloned().collect::<Vec<_>>();
        if unsynced.is_empty() {
            return Ok(0);
        }
        let token = self.refresh_token(&mut data);

        let mut synced = 0;
        let mut pushed = Vec::with_capacity(unsynced.len());
        for mut cr in unsynced {
            self.push(&data, &mut cr);
            if cr.state_synced {
                synced += 1;
            }
            pushed.push(cr);
        }

        if let Some(update) = update_fn(token, pushed, false) {
            service_state::update_tenant_service_state(ctx, &service.service_type, &service.id, update)?;
        }
        Ok(synced)
    }

    /// Reconciliation pass over all active tenants of this service type.
    pub fn resync_unsynced<S: Storage>(&self, ctx: &Context<S>) -> Result<usize> {
        let tenants = retry::transact(&ctx.storage, &ctx.config.retry, |connection, _| {
            Tenant::list_by_service_type(SERVICE_TYPE, connection)
        })?;

        let mut synced = 0;
        for tenant in &tenants {
            match self.resync_tenant(ctx, tenant) {
                Ok(n) => synced += n,
                Err(err) => error!("Failed to resync check runs of tenant {}: {:#}", tenant.id, err),
            }
        }
        if synced > 0 {
            info!("Synced {} check runs", synced);
        }
        Ok(synced)
    }
}

impl<C: CheckRunClient> BuildQueued for CheckRunService<C> {
    fn build_queued(
        &self,
        tenant_id: &str,
        service: &TenantService,
        builds: &[Build],
        initial_state: Option<BuildState>,
        _hints: &QueuedHints,
    ) -> Result<Option<UpdateFn>> {
        let mut data = load(service)?;
        let token = self.refresh_token(&mut data);
        // interrupted builds and rebuilds go back to queued for real
        let requeued = initial_state.is_some();

        let mut pushed = Vec::with_capacity(builds.len());
        for build in builds {
            let bid = build.build_id();
            let mut cr = match data.check_run(&bid) {
                Some(cr) if !requeued && cr.state > BuildState::Queued => {
                    debug!("Check run {} is already {}, not queueing", cr.name, cr.state);
                    continue;
                }
                Some(cr) => cr.clone(),
                None => self.new_check_run(bid),
            };
            cr.set_state(BuildState::Queued, None);
            self.push(&data, &mut cr);
            pushed.push(cr);
        }
        debug!("Queued {} check runs of tenant {}", pushed.len(), tenant_id);

        Ok(update_fn(token, pushed, requeued))
    }
}

impl<C: CheckRunClient> BuildBuilding for CheckRunService<C> {
    fn build_building(&self, tenant_id: &str, service: &TenantService, build: &Build) -> Result<Option<UpdateFn>> {
        self.transition(tenant_id, service, build)
    }
}

impl<C: CheckRunClient> BuildBuilt for CheckRunService<C> {
    fn build_built(&self, tenant_id: &str, service: &TenantService, build: &Build) -> Result<Option<UpdateFn>> {
        self.transition(tenant_id, service, build)
    }
}

impl<C: CheckRunClient> BuildCanceled for CheckRunService<C> {
    fn build_canceled(&self, tenant_id: &str, service: &TenantService) {
        let mut data = match load(service) {
            Ok(data) => data,
            Err(err) => {
                warn!("Not canceling check runs of tenant {}: {:#}", tenant_id, err);
                return;
            }
        };
        self.refresh_token(&mut data);
        let Some(token) = data.installation_access_token.as_deref() else {
            return;
        };

        let update = CheckRunUpdate::canceled();
        for cr in data.check_runs.iter().filter(|cr| cr.state != BuildState::Built) {
            let Some(node_id) = &cr.node_id else {
                continue;
            };
            if let Err(err) = self
                .client
                .update_check_run(token, &data.repository_node_id, node_id, &update)
            {
                warn!("Failed to cancel check run {}: {:#}", cr.name, err);
            }
        }
    }
}

impl<C: CheckRunClient> TenantServiceHandler for CheckRunService<C> {
    fn as_build_queued(&self) -> Option<&dyn BuildQueued> {
        Some(self)
    }

    fn as_build_building(&self) -> Option<&dyn BuildBuilding> {
        Some(self)
    }

    fn as_build_built(&self) -> Option<&dyn BuildBuilt> {
        Some(self)
    }

    fn as_build_canceled(&self) -> Option<&dyn BuildCanceled> {
        Some(self)
    }
}
