//! Store layer shared by the engine, the scheduler, and the CLI.
//!
//! `FerryStore` wraps `FerryDb`. All repo methods are implemented as
//! `impl FerryStore` blocks in [`crate::repos`].
//!
//! The store is shared behind an `Arc` by concurrent tasks that all use one
//! libSQL connection. Every mutation runs under `write_lock`, so a checkpoint
//! transaction never absorbs an unrelated write from another task.

use tokio::sync::{Mutex, MutexGuard};

use crate::FerryDb;
use crate::error::DatabaseError;

pub struct FerryStore {
    db: FerryDb,
    write_lock: Mutex<()>,
}

impl FerryStore {
    /// Open a store on a local database file, or `":memory:"` for tests.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or migrated.
    pub async fn open_local(db_path: &str) -> Result<Self, DatabaseError> {
        let db = FerryDb::open_local(db_path).await?;
        Ok(Self::from_db(db))
    }

    #[must_use]
    pub fn from_db(db: FerryDb) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
        }
    }

    /// Access the underlying database handle.
    #[must_use]
    pub const fn db(&self) -> &FerryDb {
        &self.db
    }

    pub(crate) async fn write(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }
}
