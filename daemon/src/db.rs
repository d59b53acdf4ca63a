use buildfarm_common::errors::*;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection, PoolError};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::time::Duration;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub type Pool = r2d2::Pool<ConnectionManager<SqliteConnection>>;

/// One transaction per call. Everything a state transition reads and writes
/// happens inside `f`, nothing is cached across calls.
pub trait Storage: Send + Sync {
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T>;
}

impl Storage for Pool {
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T>,
    {
        let mut connection = self.get()?;
        // BEGIN IMMEDIATE takes the write lock up front, concurrent writers
        // get SQLITE_BUSY instead of a deadlock on lock upgrade
        connection.immediate_transaction(f)
    }
}

#[derive(Debug)]
struct ConnectionOptions {
    busy_timeout: Duration,
}

impl CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, connection: &mut SqliteConnection) -> std::result::Result<(), r2d2::Error> {
        connection
            .batch_execute(&format!(
                "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON;",
                self.busy_timeout.as_millis()
            ))
            .map_err(r2d2::Error::QueryError)
    }
}

pub fn setup(url: &str) -> Result<SqliteConnection> {
    let mut connection = SqliteConnection::establish(url)
        .with_context(|| anyhow!("Failed to open database: {:?}", url))?;
    let applied = connection
        .run_pending_migrations(MIGRATIONS)
        .map_err(|err| anyhow!("Failed to run migrations: {}", err))?;
    for version in applied {
        debug!("Applied migration: {}", version);
    }
    Ok(connection)
}

pub fn setup_pool(url: &str) -> Result<Pool> {
    setup(url)?;

    let manager = ConnectionManager::<SqliteConnection>::new(url);
    let pool = r2d2::Pool::builder()
        .connection_customizer(Box::new(ConnectionOptions {
            busy_timeout: BUSY_TIMEOUT,
        }))
        .build(manager)
        .context("Failed to create pool")?;
    Ok(pool)
}

fn is_locked_message(msg: &str) -> bool {
    msg.contains("database is locked")
        || msg.contains("database table is locked")
        || msg.contains("deadlock")
}

/// Transient failures of the storage layer that are safe to retry: the
/// transaction was rolled back and nothing became visible.
pub fn is_recoverable(err: &Error) -> bool {
    err.chain().any(|cause| {
        if cause.is::<PoolError>() {
            return true;
        }

        match cause.downcast_ref::<DieselError>() {
            Some(DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _)) => true,
            Some(DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _)) => true,
            Some(DieselError::DatabaseError(_, info)) => is_locked_message(info.message()),
            _ => false,
        }
    })
}
