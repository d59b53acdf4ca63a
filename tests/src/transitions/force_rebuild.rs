use crate::actions::*;
use crate::data::*;
use crate::fixtures::services::Event;
use crate::fixtures::*;
use crate::setup::*;
use buildfarm::rebuild::{self, ForceError};
use buildfarm::tenant_service::QueuedHints;
use buildfarm_common::{BuildState, ForceState, ResultStatus, Toolchain};
use rstest::rstest;

fn force_error(result: anyhow::Result<BuildState>) -> ForceError {
    result
        .unwrap_err()
        .downcast::<ForceError>()
        .expect("Expected a force error")
}

#[rstest]
pub fn unknown_target_config_is_rejected(isolated_farm: IsolatedFarm) {
    let mut bid = setup_queued_package(&isolated_farm);
    bid.target_config_name = "linux-clang_17".to_string();

    let err = force_error(rebuild::force_rebuild(&isolated_farm.ctx, &force_request(&bid, "flaky")));

    assert!(matches!(err, ForceError::UnknownTargetConfig { .. }));
}

#[rstest]
pub fn target_must_match_target_config(isolated_farm: IsolatedFarm) {
    let mut bid = setup_queued_package(&isolated_farm);
    bid.target = DUMMY_ARM_TARGET.to_string();

    let err = force_error(rebuild::force_rebuild(&isolated_farm.ctx, &force_request(&bid, "flaky")));

    assert!(matches!(err, ForceError::UnknownTargetConfig { .. }));
}

#[rstest]
pub fn unknown_toolchain_is_rejected(isolated_farm: IsolatedFarm) {
    let bid = setup_queued_package(&isolated_farm);
    let mut req = force_request(&bid, "flaky");
    req.toolchain = Toolchain::new("stage", "0.18.0-a.1");

    let err = force_error(rebuild::force_rebuild(&isolated_farm.ctx, &req));

    assert!(matches!(err, ForceError::UnknownToolchain(_)));
}

#[rstest]
pub fn missing_package_is_rejected(isolated_farm: IsolatedFarm) {
    setup_queued_package(&isolated_farm);
    let bid = linux_build_id(DUMMY_TENANT, DUMMY_OTHER_PACKAGE);

    let err = force_error(rebuild::force_rebuild(&isolated_farm.ctx, &force_request(&bid, "flaky")));

    assert!(matches!(err, ForceError::PackageNotFound { .. }));
}

#[rstest]
pub fn unknown_package_config_is_rejected(isolated_farm: IsolatedFarm) {
    let mut bid = setup_queued_package(&isolated_farm);
    bid.package_config_name = "debug".to_string();

    let err = force_error(rebuild::force_rebuild(&isolated_farm.ctx, &force_request(&bid, "flaky")));

    assert!(matches!(err, ForceError::UnknownPackageConfig(_)));
}

#[rstest]
pub fn excluded_build_is_not_found(isolated_farm: IsolatedFarm) {
    admit_recorded_tenant(&isolated_farm, DUMMY_TENANT, &[linux_only_package(DUMMY_PACKAGE)]);
    let bid = build_id(DUMMY_TENANT, DUMMY_PACKAGE, DUMMY_WINDOWS_CONFIG, DUMMY_WINDOWS_TARGET);

    let err = force_error(rebuild::force_rebuild(&isolated_farm.ctx, &force_request(&bid, "flaky")));

    assert!(matches!(err, ForceError::NotFound(_)));
}

#[rstest]
pub fn queued_build_is_left_alone(isolated_farm: IsolatedFarm) {
    let bid = setup_queued_package(&isolated_farm);

    let state = rebuild::force_rebuild(&isolated_farm.ctx, &force_request(&bid, "flaky")).unwrap();

    assert_eq!(BuildState::Queued, state);
    assert_eq!(ForceState::Unforced, get_build(&isolated_farm, &bid).unwrap().force);
    assert!(isolated_farm.recorder.events().is_empty());
}

#[rstest]
pub fn building_build_is_announced_as_queued(isolated_farm: IsolatedFarm) {
    let bid = setup_building_build(&isolated_farm).build_id();
    let stamped = get_tenant(&isolated_farm, DUMMY_TENANT).unwrap().queued_timestamp;

    let state = rebuild::force_rebuild(&isolated_farm.ctx, &force_request(&bid, "flaky")).unwrap();

    assert_eq!(BuildState::Building, state);
    assert_eq!(ForceState::Forcing, get_build(&isolated_farm, &bid).unwrap().force);
    assert_eq!(
        vec![Event::Queued {
            tenant: DUMMY_TENANT.to_string(),
            builds: vec![bid],
            initial_state: Some(BuildState::Building),
            hints: QueuedHints::default(),
        }],
        isolated_farm.recorder.events()
    );
    assert!(get_tenant(&isolated_farm, DUMMY_TENANT).unwrap().queued_timestamp > stamped);
}

#[rstest]
pub fn repeated_force_is_announced_once(isolated_farm: IsolatedFarm) {
    let bid = setup_building_build(&isolated_farm).build_id();

    rebuild::force_rebuild(&isolated_farm.ctx, &force_request(&bid, "flaky")).unwrap();
    rebuild::force_rebuild(&isolated_farm.ctx, &force_request(&bid, "still flaky")).unwrap();

    assert_eq!(1, isolated_farm.recorder.events().len());
}

#[rstest]
pub fn building_build_without_service_is_only_marked(isolated_farm: IsolatedFarm) {
    admit_plain_tenant(&isolated_farm, DUMMY_TENANT, &[portable_package(DUMMY_PACKAGE)]);
    let bid = claim_next(&isolated_farm).unwrap().build_id();
    let stamped = get_tenant(&isolated_farm, DUMMY_TENANT).unwrap().queued_timestamp;

    let state = rebuild::force_rebuild(&isolated_farm.ctx, &force_request(&bid, "")).unwrap();

    assert_eq!(BuildState::Building, state);
    assert_eq!(ForceState::Forcing, get_build(&isolated_farm, &bid).unwrap().force);
    assert_eq!(stamped, get_tenant(&isolated_farm, DUMMY_TENANT).unwrap().queued_timestamp);
}

#[rstest]
pub fn built_build_is_forced_silently(isolated_farm: IsolatedFarm) {
    let bid = setup_built_build(&isolated_farm, ResultStatus::Abnormal).build_id();

    let state = rebuild::force_rebuild(&isolated_farm.ctx, &force_request(&bid, "")).unwrap();

    assert_eq!(BuildState::Built, state);
    assert_eq!(ForceState::Forced, get_build(&isolated_farm, &bid).unwrap().force);
    assert!(isolated_farm.recorder.events().is_empty());
}
