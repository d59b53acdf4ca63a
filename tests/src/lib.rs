#![cfg(test)]

use crate::actions::*;
use crate::data::*;
use crate::fixtures::services::Event;
use crate::fixtures::*;
use crate::setup::*;
use buildfarm_common::{BuildState, ForceState, ResultStatus};
use rstest::rstest;

mod retention;
pub mod setup;

#[rstest]
pub fn new_database_has_no_work(isolated_farm: IsolatedFarm) {
    assert!(claim_next(&isolated_farm).is_none());
}

#[rstest]
pub fn package_can_be_built_end_to_end(isolated_farm: IsolatedFarm) {
    let bid = setup_queued_package(&isolated_farm);

    let build = claim(&isolated_farm, &bid);
    assert_eq!(BuildState::Building, build.state);

    let build = report(&isolated_farm, &bid, ResultStatus::Success);
    assert_eq!(BuildState::Built, build.state);
    assert_eq!(ForceState::Unforced, build.force);
    assert_eq!(Some(ResultStatus::Success), build.status);
}

#[rstest]
pub fn every_transition_reaches_the_service(isolated_farm: IsolatedFarm) {
    let bid = setup_queued_package(&isolated_farm);
    let build = claim_next(&isolated_farm).unwrap();
    assert_eq!(bid, build.build_id());
    report(&isolated_farm, &bid, ResultStatus::Warning);

    let events = isolated_farm.recorder.events();
    assert_eq!(
        events,
        vec![
            Event::Building {
                tenant: DUMMY_TENANT.to_string(),
                build: bid.clone(),
            },
            Event::Built {
                tenant: DUMMY_TENANT.to_string(),
                build: bid,
                status: Some(ResultStatus::Warning),
            },
        ]
    );
    assert_eq!(
        Some(format!("queued:3;building:{0};built:{0};", DUMMY_PACKAGE)),
        service_data(&isolated_farm, DUMMY_TENANT)
    );
}

#[rstest]
pub fn archived_tenant_gets_no_work(isolated_farm: IsolatedFarm) {
    setup_queued_package(&isolated_farm);

    buildfarm::service_state::cancel_tenant(&isolated_farm.ctx, DUMMY_TENANT).unwrap();

    assert!(claim_next(&isolated_farm).is_none());
}
