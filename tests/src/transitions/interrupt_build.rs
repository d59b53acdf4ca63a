use crate::actions::*;
use crate::assertions::assert_fresh_in_queue;
use crate::data::*;
use crate::fixtures::services::Event;
use crate::fixtures::*;
use crate::setup::*;
use buildfarm::rebuild;
use buildfarm::result;
use buildfarm::tenant_service::QueuedHints;
use buildfarm_common::{BuildState, ResultStatus};
use rstest::rstest;

#[rstest]
pub fn interrupted_build_is_queued_again(isolated_farm: IsolatedFarm) {
    let bid = setup_building_build(&isolated_farm).build_id();
    result::report_interim_status(&isolated_farm.ctx, &bid, ResultStatus::Warning).unwrap();

    let build = result::interrupt_build(&isolated_farm.ctx, &bid).unwrap();

    assert_fresh_in_queue(&build);
    assert_eq!(build, get_build(&isolated_farm, &bid).unwrap());
}

#[rstest]
pub fn interrupt_notifies_queued_from_building(isolated_farm: IsolatedFarm) {
    let bid = setup_building_build(&isolated_farm).build_id();

    result::interrupt_build(&isolated_farm.ctx, &bid).unwrap();

    assert_eq!(
        vec![Event::Queued {
            tenant: DUMMY_TENANT.to_string(),
            builds: vec![bid],
            initial_state: Some(BuildState::Building),
            hints: QueuedHints::default(),
        }],
        isolated_farm.recorder.events()
    );
}

#[rstest]
pub fn interrupt_satisfies_pending_rebuild(isolated_farm: IsolatedFarm) {
    let bid = setup_building_build(&isolated_farm).build_id();
    rebuild::rebuild(&isolated_farm.ctx, &bid, None).unwrap();

    let build = result::interrupt_build(&isolated_farm.ctx, &bid).unwrap();

    assert_fresh_in_queue(&build);
}

#[rstest]
pub fn interrupted_build_can_be_claimed_again(isolated_farm: IsolatedFarm) {
    let bid = setup_building_build(&isolated_farm).build_id();
    result::interrupt_build(&isolated_farm.ctx, &bid).unwrap();

    let build = claim(&isolated_farm, &bid);

    assert_eq!(BuildState::Building, build.state);
}

#[rstest]
pub fn only_building_builds_can_be_interrupted(isolated_farm: IsolatedFarm) {
    let bid = setup_built_build(&isolated_farm, ResultStatus::Success).build_id();

    let result = result::interrupt_build(&isolated_farm.ctx, &bid);

    assert!(result.is_err());
    assert_eq!(BuildState::Built, get_build(&isolated_farm, &bid).unwrap().state);
}
