use crate::actions::*;
use crate::data::*;
use crate::fixtures::services::Event;
use crate::fixtures::*;
use crate::setup::*;
use buildfarm::queue;
use buildfarm::service_state;
use buildfarm_common::{BuildState, Toolchain};
use rstest::rstest;

#[rstest]
pub fn claimed_build_is_building(isolated_farm: IsolatedFarm) {
    let bid = setup_queued_package(&isolated_farm);

    let build = claim_next(&isolated_farm).unwrap();

    assert_eq!(bid, build.build_id());
    assert_eq!(BuildState::Building, build.state);
    assert_eq!(Some(DUMMY_MACHINE.to_string()), build.machine);
    assert_eq!(Some("Linux with GCC 13".to_string()), build.machine_summary);
    assert_eq!(None, build.status);

    let stored = get_build(&isolated_farm, &bid).unwrap();
    assert_eq!(build, stored);
}

#[rstest]
pub fn claim_notifies_building(isolated_farm: IsolatedFarm) {
    let bid = setup_queued_package(&isolated_farm);

    claim_next(&isolated_farm).unwrap();

    assert_eq!(
        vec![Event::Building {
            tenant: DUMMY_TENANT.to_string(),
            build: bid,
        }],
        isolated_farm.recorder.events()
    );
}

#[rstest]
pub fn builds_are_claimed_in_queue_order(isolated_farm: IsolatedFarm) {
    setup_queued_package(&isolated_farm);

    let claimed = (0..3)
        .map(|_| claim_next(&isolated_farm).unwrap().target_config_name)
        .collect::<Vec<_>>();

    assert_eq!(vec![DUMMY_LINUX_CONFIG, DUMMY_ARM_CONFIG, DUMMY_WINDOWS_CONFIG], claimed);
    assert!(claim_next(&isolated_farm).is_none());
}

#[rstest]
pub fn other_toolchain_gets_nothing(isolated_farm: IsolatedFarm) {
    setup_queued_package(&isolated_farm);

    let build = queue::claim_build(&isolated_farm.ctx, &Toolchain::new("stage", "0.18.0-a.1"), &machine()).unwrap();

    assert!(build.is_none());
    assert!(isolated_farm.recorder.events().is_empty());
}

#[rstest]
pub fn archived_tenants_are_skipped(isolated_farm: IsolatedFarm) {
    setup_queued_package(&isolated_farm);
    admit_plain_tenant(&isolated_farm, DUMMY_OTHER_TENANT, &[portable_package(DUMMY_PACKAGE)]);
    service_state::cancel_tenant(&isolated_farm.ctx, DUMMY_TENANT).unwrap();

    let build = claim_next(&isolated_farm).unwrap();

    assert_eq!(DUMMY_OTHER_TENANT, build.tenant_id);
}
