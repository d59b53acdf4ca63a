use crate::actions::*;
use crate::data::*;
use crate::fixtures::IsolatedFarm;
use buildfarm::models::Build;
use buildfarm_common::{BuildId, ResultStatus};

/// One tenant with a single portable package, queued on every
/// configuration. Recorded events are cleared.
pub fn setup_queued_package(farm: &IsolatedFarm) -> BuildId {
    admit_recorded_tenant(farm, DUMMY_TENANT, &[portable_package(DUMMY_PACKAGE)]);
    farm.recorder.clear();
    linux_build_id(DUMMY_TENANT, DUMMY_PACKAGE)
}

pub fn setup_building_build(farm: &IsolatedFarm) -> Build {
    let bid = setup_queued_package(farm);
    let build = claim(farm, &bid);
    farm.recorder.clear();
    build
}

pub fn setup_built_build(farm: &IsolatedFarm, status: ResultStatus) -> Build {
    let bid = setup_building_build(farm).build_id();
    let build = report(farm, &bid, status);
    farm.recorder.clear();
    build
}

/// A built build with a pending rebuild request.
pub fn setup_forced_build(farm: &IsolatedFarm) -> Build {
    let build = setup_built_build(farm, ResultStatus::Error);
    let bid = build.build_id();
    buildfarm::rebuild::rebuild(&farm.ctx, &bid, None).unwrap();
    farm.recorder.clear();
    get_build(farm, &bid).unwrap()
}
