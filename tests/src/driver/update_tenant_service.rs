use crate::actions::*;
use crate::data::*;
use crate::fixtures::services::{Event, RECORDING_SERVICE};
use crate::fixtures::*;
use crate::setup::*;
use buildfarm::retry;
use buildfarm::service_state;
use rstest::rstest;
use std::cell::Cell;

#[rstest]
pub fn service_data_is_replaced(isolated_farm: IsolatedFarm) {
    setup_queued_package(&isolated_farm);

    let data = service_state::update_tenant_service_state(
        &isolated_farm.ctx,
        RECORDING_SERVICE,
        DUMMY_TENANT,
        |tenant_id, service| {
            assert_eq!(DUMMY_TENANT, tenant_id);
            assert_eq!(Some("queued:3;"), service.data.as_deref());
            Some("replaced".to_string())
        },
    )
    .unwrap();

    assert_eq!(Some("replaced".to_string()), data);
    assert_eq!(Some("replaced".to_string()), service_data(&isolated_farm, DUMMY_TENANT));
}

#[rstest]
pub fn unchanged_data_is_not_written(isolated_farm: IsolatedFarm) {
    setup_queued_package(&isolated_farm);

    let data = service_state::update_tenant_service_state(
        &isolated_farm.ctx,
        RECORDING_SERVICE,
        DUMMY_TENANT,
        |_, _| None,
    )
    .unwrap();

    assert_eq!(None, data);
    assert_eq!(Some("queued:3;".to_string()), service_data(&isolated_farm, DUMMY_TENANT));
}

#[rstest]
pub fn missing_tenant_is_reported_to_mutate(isolated_farm: IsolatedFarm) {
    setup_queued_package(&isolated_farm);

    let mut seen = Vec::new();
    let service = service_state::update_tenant_service(
        &isolated_farm.ctx,
        RECORDING_SERVICE,
        DUMMY_OTHER_SERVICE_ID,
        |tenant| {
            seen.push(tenant.is_some());
            false
        },
    )
    .unwrap();

    assert_eq!(None, service);
    assert_eq!(vec![false], seen);
}

#[rstest]
pub fn archived_tenant_state_is_frozen(isolated_farm: IsolatedFarm) {
    setup_queued_package(&isolated_farm);
    service_state::cancel_tenant(&isolated_farm.ctx, DUMMY_TENANT).unwrap();

    let data = service_state::update_tenant_service_state(
        &isolated_farm.ctx,
        RECORDING_SERVICE,
        DUMMY_TENANT,
        |_, _| Some("replaced".to_string()),
    )
    .unwrap();

    assert_eq!(None, data);
    assert_eq!(Some("queued:3;".to_string()), service_data(&isolated_farm, DUMMY_TENANT));
}

#[rstest]
pub fn removing_the_service_is_an_error(isolated_farm: IsolatedFarm) {
    setup_queued_package(&isolated_farm);

    let result = service_state::update_tenant_service(
        &isolated_farm.ctx,
        RECORDING_SERVICE,
        DUMMY_TENANT,
        |tenant| {
            if let Some(tenant) = tenant {
                tenant.set_service(None);
            }
            true
        },
    );

    assert!(result.is_err());
    assert_eq!(Some("queued:3;".to_string()), service_data(&isolated_farm, DUMMY_TENANT));
}

#[rstest]
pub fn conflicts_are_retried(isolated_farm: IsolatedFarm) {
    setup_queued_package(&isolated_farm);
    isolated_farm.storage().fail_next(DUMMY_RETRY_MAX - 1);

    let attempts = Cell::new(0);
    let data = service_state::update_tenant_service_state(
        &isolated_farm.ctx,
        RECORDING_SERVICE,
        DUMMY_TENANT,
        |_, service| {
            attempts.set(attempts.get() + 1);
            let data = service.data.clone().unwrap_or_default();
            Some(format!("{}retried;", data))
        },
    )
    .unwrap();

    assert_eq!(DUMMY_RETRY_MAX, attempts.get());
    assert_eq!(Some("queued:3;retried;".to_string()), data);
    assert_eq!(data, service_data(&isolated_farm, DUMMY_TENANT));
    assert!(!get_tenant(&isolated_farm, DUMMY_TENANT).unwrap().archived);
    assert_eq!(0, isolated_farm.recorder.canceled());
}

#[rstest]
pub fn exhausted_retries_cancel_the_tenant(isolated_farm: IsolatedFarm) {
    setup_queued_package(&isolated_farm);
    isolated_farm.storage().fail_next(DUMMY_RETRY_MAX);

    let err = service_state::update_tenant_service_state(
        &isolated_farm.ctx,
        RECORDING_SERVICE,
        DUMMY_TENANT,
        |_, _| Some("lost".to_string()),
    )
    .unwrap_err();

    assert!(retry::is_exhausted(&err));
    assert_eq!(0, isolated_farm.storage().pending_failures());

    let tenant = get_tenant(&isolated_farm, DUMMY_TENANT).unwrap();
    assert!(tenant.archived);
    assert_eq!(Some("queued:3;".to_string()), tenant.service_data);
    assert_eq!(
        vec![Event::Canceled {
            tenant: DUMMY_TENANT.to_string(),
        }],
        isolated_farm.recorder.events()
    );
}

#[rstest]
pub fn failed_cancellation_leaves_tenant_active(isolated_farm: IsolatedFarm) {
    setup_queued_package(&isolated_farm);
    let cancel_retry_max = isolated_farm.ctx.config.cancel_retry_max;
    isolated_farm.storage().fail_next(DUMMY_RETRY_MAX + cancel_retry_max);

    let err = service_state::update_tenant_service_state(
        &isolated_farm.ctx,
        RECORDING_SERVICE,
        DUMMY_TENANT,
        |_, _| Some("lost".to_string()),
    )
    .unwrap_err();

    assert!(retry::is_exhausted(&err));
    assert_eq!(0, isolated_farm.storage().pending_failures());

    let tenant = get_tenant(&isolated_farm, DUMMY_TENANT).unwrap();
    assert!(!tenant.archived);
    assert_eq!(None, tenant.archived_timestamp);
    assert_eq!(Some("queued:3;".to_string()), tenant.service_data);
    assert_eq!(0, isolated_farm.recorder.canceled());
}

#[rstest]
pub fn failing_notification_is_not_persisted(isolated_farm: IsolatedFarm) {
    let bid = setup_queued_package(&isolated_farm);
    isolated_farm.recorder.set_failing(true);

    let build = claim(&isolated_farm, &bid);

    assert_eq!(bid, build.build_id());
    assert_eq!(1, isolated_farm.recorder.events().len());
    assert_eq!(Some("queued:3;".to_string()), service_data(&isolated_farm, DUMMY_TENANT));
}

#[rstest]
pub fn report_survives_conflicts(isolated_farm: IsolatedFarm) {
    let bid = setup_queued_package(&isolated_farm);
    let transactions = isolated_farm.storage().transactions();

    claim(&isolated_farm, &bid);
    isolated_farm.storage().fail_next(DUMMY_RETRY_MAX - 1);
    report(&isolated_farm, &bid, buildfarm_common::ResultStatus::Success);

    // claim and report, each followed by a state update, plus the conflicts
    assert_eq!(transactions + 4 + DUMMY_RETRY_MAX - 1, isolated_farm.storage().transactions());
    assert_eq!(
        Some(format!("queued:3;building:{0};built:{0};", DUMMY_PACKAGE)),
        service_data(&isolated_farm, DUMMY_TENANT)
    );
    assert_eq!(0, isolated_farm.recorder.canceled());
}
