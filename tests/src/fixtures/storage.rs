use buildfarm::db::{Pool, Storage};
use buildfarm_common::errors::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::SqliteConnection;
use std::sync::atomic::{AtomicU32, Ordering};

/// Runs every transaction against the real database, but can be told to
/// roll back the next few with a serialization failure after the work was
/// done.
pub struct FlakyStorage {
    pool: Pool,
    failures: AtomicU32,
    transactions: AtomicU32,
}

impl FlakyStorage {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            failures: AtomicU32::new(0),
            transactions: AtomicU32::new(0),
        }
    }

    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn pending_failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn transactions(&self) -> u32 {
        self.transactions.load(Ordering::SeqCst)
    }
}

impl Storage for FlakyStorage {
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T>,
    {
        self.transactions.fetch_add(1, Ordering::SeqCst);
        let mut connection = self.pool.get()?;
        connection.immediate_transaction(|connection| {
            let value = f(connection)?;
            let injected = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if injected {
                return Err(DieselError::DatabaseError(
                    DatabaseErrorKind::SerializationFailure,
                    Box::new("injected conflict".to_string()),
                )
                .into());
            }
            Ok(value)
        })
    }
}
