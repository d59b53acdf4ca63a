use crate::schema::*;
use buildfarm_common::errors::*;
use buildfarm_common::{BuildId, BuildMachine, BuildState, ForceState, PackageId, ResultStatus, Toolchain};
use chrono::NaiveDateTime;
use diesel::prelude::*;

#[derive(Identifiable, Queryable, Selectable, AsChangeset, Clone, PartialEq, Eq, Debug)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
#[diesel(table_name = builds)]
pub struct Build {
    pub id: i32,
    pub tenant_id: String,
    pub package_name: String,
    pub package_version: String,
    pub target: String,
    pub target_config_name: String,
    pub package_config_name: String,
    pub toolchain_name: String,
    pub toolchain_version: String,
    pub state: BuildState,
    pub force: ForceState,
    pub status: Option<ResultStatus>,
    pub timestamp: NaiveDateTime,
    pub completion_timestamp: Option<NaiveDateTime>,
    pub machine: Option<String>,
    pub machine_summary: Option<String>,
    pub auxiliary_machines: String,
}

impl Build {
    pub fn build_id(&self) -> BuildId {
        BuildId {
            tenant: self.tenant_id.clone(),
            package_name: self.package_name.clone(),
            package_version: self.package_version.clone(),
            target: self.target.clone(),
            target_config_name: self.target_config_name.clone(),
            package_config_name: self.package_config_name.clone(),
            toolchain_name: self.toolchain_name.clone(),
            toolchain_version: self.toolchain_version.clone(),
        }
    }

    pub fn package_id(&self) -> PackageId {
        PackageId {
            tenant: self.tenant_id.clone(),
            name: self.package_name.clone(),
            version: self.package_version.clone(),
        }
    }

    pub fn auxiliary_machines(&self) -> Result<Vec<BuildMachine>> {
        let machines = serde_json::from_str(&self.auxiliary_machines)
            .context("Invalid auxiliary machines")?;
        Ok(machines)
    }

    pub fn get(bid: &BuildId, connection: &mut SqliteConnection) -> Result<Option<Build>> {
        use crate::schema::builds::dsl::*;
        let build = builds
            .filter(tenant_id.eq(&bid.tenant))
            .filter(package_name.eq(&bid.package_name))
            .filter(package_version.eq(&bid.package_version))
            .filter(target.eq(&bid.target))
            .filter(target_config_name.eq(&bid.target_config_name))
            .filter(package_config_name.eq(&bid.package_config_name))
            .filter(toolchain_name.eq(&bid.toolchain_name))
            .filter(toolchain_version.eq(&bid.toolchain_version))
            .select(Build::as_select())
            .first(connection)
            .optional()?;
        Ok(build)
    }

    pub fn get_id(my_id: i32, connection: &mut SqliteConnection) -> Result<Build> {
        use crate::schema::builds::dsl::*;
        let build = builds
            .filter(id.eq(my_id))
            .select(Build::as_select())
            .first(connection)?;
        Ok(build)
    }

    pub fn list_for_package(pkg: &PackageId, connection: &mut SqliteConnection) -> Result<Vec<Build>> {
        use crate::schema::builds::dsl::*;
        let list = builds
            .filter(tenant_id.eq(&pkg.tenant))
            .filter(package_name.eq(&pkg.name))
            .filter(package_version.eq(&pkg.version))
            .order_by(id)
            .select(Build::as_select())
            .load(connection)?;
        Ok(list)
    }

    pub fn list_for_tenant(my_tenant: &str, connection: &mut SqliteConnection) -> Result<Vec<Build>> {
        use crate::schema::builds::dsl::*;
        let list = builds
            .filter(tenant_id.eq(my_tenant))
            .order_by(id)
            .select(Build::as_select())
            .load(connection)?;
        Ok(list)
    }

    /// The oldest queued build for this toolchain that belongs to an active
    /// tenant.
    pub fn next_queued(toolchain: &Toolchain, connection: &mut SqliteConnection) -> Result<Option<Build>> {
        let build = builds::table
            .inner_join(tenants::table)
            .filter(builds::state.eq(BuildState::Queued))
            .filter(builds::toolchain_name.eq(&toolchain.name))
            .filter(builds::toolchain_version.eq(&toolchain.version))
            .filter(tenants::archived.eq(false))
            .order_by((builds::timestamp, builds::id))
            .select(Build::as_select())
            .first(connection)
            .optional()?;
        Ok(build)
    }

    /// Built builds with a pending rebuild request, grouped by tenant.
    pub fn list_forced(connection: &mut SqliteConnection) -> Result<Vec<Build>> {
        let list = builds::table
            .inner_join(tenants::table)
            .filter(builds::state.eq(BuildState::Built))
            .filter(builds::force.eq(ForceState::Forced))
            .filter(tenants::archived.eq(false))
            .order_by((builds::tenant_id, builds::timestamp, builds::id))
            .select(Build::as_select())
            .load(connection)?;
        Ok(list)
    }

    /// Only writes if the value actually changes. Returns whether it did.
    pub fn set_force(&mut self, value: ForceState, connection: &mut SqliteConnection) -> Result<bool> {
        use crate::schema::builds::columns::*;
        if self.force == value {
            return Ok(false);
        }
        diesel::update(builds::table.filter(id.eq(self.id)))
            .set(force.eq(value))
            .execute(connection)?;
        self.force = value;
        Ok(true)
    }

    pub fn update(&self, connection: &mut SqliteConnection) -> Result<()> {
        use crate::schema::builds::columns::*;
        diesel::update(builds::table.filter(id.eq(self.id)))
            .set(self)
            .execute(connection)?;
        Ok(())
    }

    pub fn list_keys(connection: &mut SqliteConnection) -> Result<Vec<BuildKey>> {
        use crate::schema::builds::dsl::*;
        let keys = builds
            .select(BuildKey::as_select())
            .load(connection)?;
        Ok(keys)
    }

    pub fn delete_multiple(ids: &[i32], connection: &mut SqliteConnection) -> Result<usize> {
        use crate::schema::builds::columns::*;
        let n = diesel::delete(builds::table.filter(id.eq_any(ids))).execute(connection)?;
        Ok(n)
    }
}

/// The columns the retention sweep looks at.
#[derive(Queryable, Selectable, Clone, PartialEq, Eq, Debug)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(table_name = builds)]
pub struct BuildKey {
    pub id: i32,
    pub tenant_id: String,
    pub package_name: String,
    pub package_version: String,
    pub target: String,
    pub target_config_name: String,
    pub toolchain_name: String,
    pub toolchain_version: String,
}

#[derive(Insertable, PartialEq, Eq, Debug, Clone)]
#[diesel(table_name = builds)]
pub struct NewBuild {
    pub tenant_id: String,
    pub package_name: String,
    pub package_version: String,
    pub target: String,
    pub target_config_name: String,
    pub package_config_name: String,
    pub toolchain_name: String,
    pub toolchain_version: String,
    pub state: BuildState,
    pub force: ForceState,
    pub timestamp: NaiveDateTime,
}

impl NewBuild {
    pub fn queued(bid: BuildId, now: NaiveDateTime) -> NewBuild {
        NewBuild {
            tenant_id: bid.tenant,
            package_name: bid.package_name,
            package_version: bid.package_version,
            target: bid.target,
            target_config_name: bid.target_config_name,
            package_config_name: bid.package_config_name,
            toolchain_name: bid.toolchain_name,
            toolchain_version: bid.toolchain_version,
            state: BuildState::Queued,
            force: ForceState::Unforced,
            timestamp: now,
        }
    }

    pub fn insert(&self, connection: &mut SqliteConnection) -> Result<Build> {
        let build = diesel::insert_into(builds::table)
            .values(self)
            .returning(Build::as_returning())
            .get_result(connection)
            .context("Failed to insert build")?;
        Ok(build)
    }
}
