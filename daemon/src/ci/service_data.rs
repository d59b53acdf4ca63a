//! The state a check-run tenant keeps in its opaque service data.
//!
//! Every check run mirrors one build. A mirror whose `state_synced` flag is
//! cleared wasn't confirmed by the remote side yet and gets pushed again by
//! the reconciliation pass.

use buildfarm_common::errors::*;
use buildfarm_common::{BuildId, BuildState, ResultStatus};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const SERVICE_DATA_VERSION: u32 = 1;

/// Access tokens are refreshed if they expire within this many seconds.
const TOKEN_REFRESH_MARGIN: i64 = 5 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRun {
    pub build_id: BuildId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub state: BuildState,
    pub state_synced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResultStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details_url: Option<String>,
}

impl CheckRun {
    pub fn new<N: Into<String>>(build_id: BuildId, name: N) -> CheckRun {
        CheckRun {
            build_id,
            name: name.into(),
            node_id: None,
            state: BuildState::Queued,
            state_synced: false,
            status: None,
            details_url: None,
        }
    }

    /// Changing the state marks the mirror unsynced. The status is dropped
    /// unless the build is built.
    pub fn set_state(&mut self, state: BuildState, status: Option<ResultStatus>) {
        self.state = state;
        self.status = match state {
            BuildState::Built => status,
            _ => None,
        };
        self.state_synced = false;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceData {
    pub version: u32,

    pub installation_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_access_token_expires_at: Option<DateTime<Utc>>,

    pub repository_node_id: String,
    pub repository_clone_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_node_id: Option<String>,

    pub check_sha: String,
    pub report_sha: String,

    #[serde(default)]
    pub warning_success: bool,
    #[serde(default)]
    pub check_runs: Vec<CheckRun>,
}

#[derive(Deserialize)]
struct Versioned {
    version: u32,
}

impl ServiceData {
    pub fn new<R: Into<String>, U: Into<String>, S: Into<String>>(
        installation_id: u64,
        repository_node_id: R,
        repository_clone_url: U,
        sha: S,
    ) -> ServiceData {
        let sha = sha.into();
        ServiceData {
            version: SERVICE_DATA_VERSION,
            installation_id,
            installation_access_token: None,
            installation_access_token_expires_at: None,
            repository_node_id: repository_node_id.into(),
            repository_clone_url: repository_clone_url.into(),
            pr_number: None,
            pr_node_id: None,
            check_sha: sha.clone(),
            report_sha: sha,
            warning_success: false,
            check_runs: Vec::new(),
        }
    }

    pub fn parse(s: &str) -> Result<ServiceData> {
        let versioned = serde_json::from_str::<Versioned>(s).context("Failed to parse service data")?;
        if versioned.version != SERVICE_DATA_VERSION {
            bail!("Unsupported service data version: {}", versioned.version);
        }

        let data = serde_json::from_str::<ServiceData>(s).context("Failed to parse service data")?;

        {
            let mut seen = HashSet::new();
            for cr in &data.check_runs {
                if cr.status.is_some() && cr.state != BuildState::Built {
                    bail!("Check run {} has a status but is {}", cr.name, cr.state);
                }
                if !seen.insert(&cr.build_id) {
                    bail!("Duplicate check run for build {}", cr.build_id);
                }
            }
        }

        Ok(data)
    }

    pub fn to_json(&self) -> Result<String> {
        let s = serde_json::to_string(self)?;
        Ok(s)
    }

    pub fn check_run(&self, build_id: &BuildId) -> Option<&CheckRun> {
        self.check_runs.iter().find(|cr| cr.build_id == *build_id)
    }

    pub fn check_run_mut(&mut self, build_id: &BuildId) -> Option<&mut CheckRun> {
        self.check_runs.iter_mut().find(|cr| cr.build_id == *build_id)
    }

    pub fn unsynced(&self) -> impl Iterator<Item = &CheckRun> {
        self.check_runs.iter().filter(|cr| !cr.state_synced)
    }

    /// Whether the access token is present and not about to expire.
    pub fn token_valid(&self, now: DateTime<Utc>) -> bool {
        match (
            &self.installation_access_token,
            self.installation_access_token_expires_at,
        ) {
            (Some(_), Some(expires_at)) => expires_at > now + Duration::seconds(TOKEN_REFRESH_MARGIN),
            _ => false,
        }
    }

    /// Store a check run pushed earlier, on top of whatever is stored now.
    ///
    /// Unless `regress` is set, a mirror that is further along isn't replaced
    /// by an older state, it only picks up the remote node id if it has none.
    /// Returns whether anything changed.
    pub fn merge_check_run(&mut self, cr: &CheckRun, regress: bool) -> bool {
        let Some(existing) = self.check_run_mut(&cr.build_id) else {
            self.check_runs.push(cr.clone());
            return true;
        };

        if regress || cr.state >= existing.state {
            let node_id = cr.node_id.clone().or_else(|| existing.node_id.clone());
            let merged = CheckRun {
                node_id,
                ..cr.clone()
            };
            if *existing == merged {
                return false;
            }
            *existing = merged;
            true
        } else if existing.node_id.is_none() && cr.node_id.is_some() {
            existing.node_id = cr.node_id.clone();
            true
        } else {
            false
        }
    }
}
