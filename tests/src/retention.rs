use crate::actions::*;
use crate::data::*;
use crate::fixtures::*;
use crate::setup::*;
use buildfarm::retention::{self, GarbageStats};
use buildfarm::models::Tenant;
use buildfarm::queue;
use buildfarm::service_state;
use chrono::{Duration, Utc};
use rstest::rstest;

#[rstest]
pub fn nothing_to_collect(isolated_farm: IsolatedFarm) {
    setup_queued_package(&isolated_farm);

    let stats = retention::collect_garbage(&isolated_farm.ctx).unwrap();

    assert_eq!(GarbageStats::default(), stats);
    assert_eq!(3, list_builds(&isolated_farm, DUMMY_TENANT).len());
}

#[rstest]
pub fn builds_of_removed_target_config_are_orphaned(mut isolated_farm: IsolatedFarm) {
    setup_queued_package(&isolated_farm);
    isolated_farm
        .ctx
        .config
        .build_configs
        .configs
        .retain(|c| c.name != DUMMY_ARM_CONFIG);

    let orphaned = retention::find_orphaned_builds(&isolated_farm.ctx).unwrap();
    assert_eq!(1, orphaned.len());

    let stats = retention::collect_garbage(&isolated_farm.ctx).unwrap();

    assert_eq!(1, stats.builds);
    let remaining = list_builds(&isolated_farm, DUMMY_TENANT)
        .into_iter()
        .map(|b| b.target_config_name)
        .collect::<Vec<_>>();
    assert_eq!(vec![DUMMY_LINUX_CONFIG, DUMMY_WINDOWS_CONFIG], remaining);
}

#[rstest]
pub fn builds_of_removed_toolchain_are_orphaned(mut isolated_farm: IsolatedFarm) {
    setup_built_build(&isolated_farm, buildfarm_common::ResultStatus::Success);
    isolated_farm.ctx.config.toolchains.clear();

    let stats = retention::collect_garbage(&isolated_farm.ctx).unwrap();

    assert_eq!(3, stats.builds);
    assert!(list_builds(&isolated_farm, DUMMY_TENANT).is_empty());
    assert!(get_tenant(&isolated_farm, DUMMY_TENANT).is_some());
}

#[rstest]
pub fn recently_archived_tenant_is_kept(isolated_farm: IsolatedFarm) {
    setup_queued_package(&isolated_farm);
    service_state::cancel_tenant(&isolated_farm.ctx, DUMMY_TENANT).unwrap();

    let stats = retention::collect_garbage(&isolated_farm.ctx).unwrap();

    assert_eq!(0, stats.tenants);
    assert!(get_tenant(&isolated_farm, DUMMY_TENANT).is_some());
}

#[rstest]
pub fn retention_counts_from_archival(isolated_farm: IsolatedFarm) {
    let created_at = Utc::now().naive_utc() - Duration::days(isolated_farm.ctx.config.retention_days + 10);
    let tenant = Tenant::new(DUMMY_TENANT, created_at);
    queue::admit_tenant(&isolated_farm.ctx, &tenant, &[portable_package(DUMMY_PACKAGE)], &toolchain()).unwrap();
    service_state::cancel_tenant(&isolated_farm.ctx, DUMMY_TENANT).unwrap();

    let stats = retention::collect_garbage(&isolated_farm.ctx).unwrap();

    assert_eq!(GarbageStats::default(), stats);
    let tenant = get_tenant(&isolated_farm, DUMMY_TENANT).unwrap();
    assert!(tenant.archived);
    assert!(tenant.archived_timestamp.unwrap() > created_at);
    assert_eq!(3, list_builds(&isolated_farm, DUMMY_TENANT).len());
}

#[rstest]
pub fn expired_archived_tenant_is_deleted(mut isolated_farm: IsolatedFarm) {
    setup_queued_package(&isolated_farm);
    admit_plain_tenant(&isolated_farm, DUMMY_OTHER_TENANT, &[portable_package(DUMMY_PACKAGE)]);
    service_state::cancel_tenant(&isolated_farm.ctx, DUMMY_TENANT).unwrap();
    // everything created so far counts as expired
    isolated_farm.ctx.config.retention_days = -1;

    let stats = retention::collect_garbage(&isolated_farm.ctx).unwrap();

    assert_eq!(
        GarbageStats {
            builds: 0,
            tenants: 1,
        },
        stats
    );
    assert!(get_tenant(&isolated_farm, DUMMY_TENANT).is_none());
    assert!(list_builds(&isolated_farm, DUMMY_TENANT).is_empty());
    assert!(get_tenant(&isolated_farm, DUMMY_OTHER_TENANT).is_some());
    assert_eq!(3, list_builds(&isolated_farm, DUMMY_OTHER_TENANT).len());
}
