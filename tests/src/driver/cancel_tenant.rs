use crate::actions::*;
use crate::data::*;
use crate::fixtures::services::{Event, RECORDING_SERVICE};
use crate::fixtures::*;
use crate::setup::*;
use buildfarm::service_state;
use buildfarm_common::ResultStatus;
use rstest::rstest;

#[rstest]
pub fn cancel_archives_and_notifies(isolated_farm: IsolatedFarm) {
    setup_queued_package(&isolated_farm);

    let canceled = service_state::cancel_tenant(&isolated_farm.ctx, DUMMY_TENANT).unwrap();

    assert!(canceled);
    assert!(get_tenant(&isolated_farm, DUMMY_TENANT).unwrap().archived);
    assert_eq!(
        vec![Event::Canceled {
            tenant: DUMMY_TENANT.to_string(),
        }],
        isolated_farm.recorder.events()
    );
}

#[rstest]
pub fn cancel_is_idempotent(isolated_farm: IsolatedFarm) {
    setup_queued_package(&isolated_farm);

    assert!(service_state::cancel_tenant(&isolated_farm.ctx, DUMMY_TENANT).unwrap());
    assert!(!service_state::cancel_tenant(&isolated_farm.ctx, DUMMY_TENANT).unwrap());
    assert!(!service_state::cancel_tenant_by_service(&isolated_farm.ctx, RECORDING_SERVICE, DUMMY_TENANT).unwrap());

    assert_eq!(1, isolated_farm.recorder.canceled());
}

#[rstest]
pub fn missing_tenant_is_not_canceled(isolated_farm: IsolatedFarm) {
    let canceled = service_state::cancel_tenant(&isolated_farm.ctx, DUMMY_OTHER_TENANT).unwrap();

    assert!(!canceled);
    assert!(isolated_farm.recorder.events().is_empty());
}

#[rstest]
pub fn cancel_by_service(isolated_farm: IsolatedFarm) {
    setup_queued_package(&isolated_farm);

    let canceled =
        service_state::cancel_tenant_by_service(&isolated_farm.ctx, RECORDING_SERVICE, DUMMY_TENANT).unwrap();

    assert!(canceled);
    assert!(get_tenant(&isolated_farm, DUMMY_TENANT).unwrap().archived);
    assert_eq!(1, isolated_farm.recorder.canceled());
}

#[rstest]
pub fn tenant_without_service_is_canceled_quietly(isolated_farm: IsolatedFarm) {
    admit_plain_tenant(&isolated_farm, DUMMY_TENANT, &[portable_package(DUMMY_PACKAGE)]);

    let canceled = service_state::cancel_tenant(&isolated_farm.ctx, DUMMY_TENANT).unwrap();

    assert!(canceled);
    assert!(isolated_farm.recorder.events().is_empty());
}

#[rstest]
pub fn canceled_tenant_is_not_notified_anymore(isolated_farm: IsolatedFarm) {
    let bid = setup_building_build(&isolated_farm).build_id();
    service_state::cancel_tenant(&isolated_farm.ctx, DUMMY_TENANT).unwrap();
    isolated_farm.recorder.clear();

    report(&isolated_farm, &bid, ResultStatus::Success);

    assert!(isolated_farm.recorder.events().is_empty());
}

#[rstest]
pub fn other_tenants_are_not_affected(isolated_farm: IsolatedFarm) {
    setup_queued_package(&isolated_farm);
    admit_recorded_tenant(&isolated_farm, DUMMY_OTHER_TENANT, &[portable_package(DUMMY_PACKAGE)]);

    service_state::cancel_tenant(&isolated_farm.ctx, DUMMY_TENANT).unwrap();

    assert!(!get_tenant(&isolated_farm, DUMMY_OTHER_TENANT).unwrap().archived);
    assert_eq!(DUMMY_OTHER_TENANT, claim_next(&isolated_farm).unwrap().tenant_id);
}
