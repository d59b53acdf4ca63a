use crate::schema::*;
use buildfarm_common::errors::*;
use buildfarm_common::ResultStatus;
use diesel::prelude::*;

#[derive(Identifiable, Queryable, Selectable, Clone, PartialEq, Eq, Debug)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(table_name = build_results)]
pub struct BuildResult {
    pub id: i32,
    pub build_id: i32,
    pub operation: String,
    pub status: ResultStatus,
    pub log: Vec<u8>,
}

impl BuildResult {
    pub fn list_for_build(my_build_id: i32, connection: &mut SqliteConnection) -> Result<Vec<BuildResult>> {
        use crate::schema::build_results::dsl::*;
        let list = build_results
            .filter(build_id.eq(my_build_id))
            .order_by(id)
            .select(BuildResult::as_select())
            .load(connection)?;
        Ok(list)
    }

    pub fn delete_for_build(my_build_id: i32, connection: &mut SqliteConnection) -> Result<usize> {
        use crate::schema::build_results::dsl::*;
        let n = diesel::delete(build_results.filter(build_id.eq(my_build_id))).execute(connection)?;
        Ok(n)
    }
}

#[derive(Insertable, PartialEq, Eq, Debug, Clone)]
#[diesel(table_name = build_results)]
pub struct NewBuildResult {
    pub build_id: i32,
    pub operation: String,
    pub status: ResultStatus,
    pub log: Vec<u8>,
}

impl NewBuildResult {
    pub fn insert_batch(results: &[NewBuildResult], connection: &mut SqliteConnection) -> Result<()> {
        diesel::insert_into(build_results::table)
            .values(results)
            .execute(connection)?;
        Ok(())
    }
}
