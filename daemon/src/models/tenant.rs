use crate::schema::*;
use crate::tenant_service::TenantService;
use buildfarm_common::errors::*;
use chrono::NaiveDateTime;
use diesel::prelude::*;

#[derive(Identifiable, Queryable, Selectable, Insertable, AsChangeset, Clone, PartialEq, Eq, Debug)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
#[diesel(table_name = tenants)]
pub struct Tenant {
    pub id: String,
    pub private: bool,
    pub interactive: Option<String>,
    pub archived: bool,
    pub archived_timestamp: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub queued_timestamp: Option<NaiveDateTime>,
    pub service_type: Option<String>,
    pub service_id: Option<String>,
    pub service_data: Option<String>,
}

impl Tenant {
    pub fn new<I: Into<String>>(id: I, now: NaiveDateTime) -> Tenant {
        Tenant {
            id: id.into(),
            private: false,
            interactive: None,
            archived: false,
            archived_timestamp: None,
            created_at: now,
            queued_timestamp: None,
            service_type: None,
            service_id: None,
            service_data: None,
        }
    }

    pub fn with_service(mut self, service: TenantService) -> Tenant {
        self.set_service(Some(service));
        self
    }

    pub fn service(&self) -> Option<TenantService> {
        match (&self.service_type, &self.service_id) {
            (Some(service_type), Some(id)) => Some(TenantService {
                service_type: service_type.clone(),
                id: id.clone(),
                data: self.service_data.clone(),
            }),
            _ => None,
        }
    }

    pub fn set_service(&mut self, service: Option<TenantService>) {
        match service {
            Some(service) => {
                self.service_type = Some(service.service_type);
                self.service_id = Some(service.id);
                self.service_data = service.data;
            }
            None => {
                self.service_type = None;
                self.service_id = None;
                self.service_data = None;
            }
        }
    }

    pub fn insert(&self, connection: &mut SqliteConnection) -> Result<()> {
        diesel::insert_into(tenants::table)
            .values(self)
            .execute(connection)
            .with_context(|| anyhow!("Failed to insert tenant {:?}", self.id))?;
        Ok(())
    }

    pub fn get_id(my_id: &str, connection: &mut SqliteConnection) -> Result<Option<Tenant>> {
        use crate::schema::tenants::dsl::*;
        let tenant = tenants
            .filter(id.eq(my_id))
            .select(Tenant::as_select())
            .first(connection)
            .optional()?;
        Ok(tenant)
    }

    pub fn get_by_service(
        my_type: &str,
        my_id: &str,
        connection: &mut SqliteConnection,
    ) -> Result<Option<Tenant>> {
        use crate::schema::tenants::dsl::*;
        let tenant = tenants
            .filter(service_type.eq(my_type))
            .filter(service_id.eq(my_id))
            .select(Tenant::as_select())
            .first(connection)
            .optional()?;
        Ok(tenant)
    }

    /// Active tenants bound to a service of the given type.
    pub fn list_by_service_type(
        my_type: &str,
        connection: &mut SqliteConnection,
    ) -> Result<Vec<Tenant>> {
        use crate::schema::tenants::dsl::*;
        let list = tenants
            .filter(service_type.eq(my_type))
            .filter(archived.eq(false))
            .order_by(created_at)
            .select(Tenant::as_select())
            .load(connection)?;
        Ok(list)
    }

    pub fn update(&self, connection: &mut SqliteConnection) -> Result<()> {
        use crate::schema::tenants::columns::*;
        diesel::update(tenants::table.filter(id.eq(&self.id)))
            .set(self)
            .execute(connection)?;
        Ok(())
    }

    /// Returns false if the tenant was already archived.
    pub fn archive(&mut self, now: NaiveDateTime, connection: &mut SqliteConnection) -> Result<bool> {
        use crate::schema::tenants::columns::*;
        let n = diesel::update(
            tenants::table
                .filter(id.eq(&self.id))
                .filter(archived.eq(false)),
        )
        .set((archived.eq(true), archived_timestamp.eq(Some(now))))
        .execute(connection)?;
        if n > 0 {
            self.archived = true;
            self.archived_timestamp = Some(now);
        }
        Ok(n > 0)
    }

    pub fn stamp_queued(&mut self, now: NaiveDateTime, connection: &mut SqliteConnection) -> Result<()> {
        use crate::schema::tenants::columns::*;
        diesel::update(tenants::table.filter(id.eq(&self.id)))
            .set(queued_timestamp.eq(Some(now)))
            .execute(connection)?;
        self.queued_timestamp = Some(now);
        Ok(())
    }

    /// Tenants archived before the cutoff, regardless of when they were created.
    pub fn list_archived_before(
        cutoff: NaiveDateTime,
        connection: &mut SqliteConnection,
    ) -> Result<Vec<String>> {
        use crate::schema::tenants::dsl::*;
        let ids = tenants
            .filter(archived.eq(true))
            .filter(archived_timestamp.lt(cutoff))
            .select(id)
            .load::<String>(connection)?;
        Ok(ids)
    }

    pub fn delete_multiple(ids: &[String], connection: &mut SqliteConnection) -> Result<usize> {
        use crate::schema::tenants::columns::*;
        let n = diesel::delete(tenants::table.filter(id.eq_any(ids))).execute(connection)?;
        Ok(n)
    }
}
