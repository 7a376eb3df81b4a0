//! Named range tables over a single redb database.
//!
//! `Db` owns the database and a registry of table names. Handles are cheap;
//! the registry only remembers which key and value types each name was
//! opened with so a name cannot be reused with a different layout.

use crate::config::DbConfig;
use crate::error::{Error, Result};
use crate::table::RangeTable;
use redb::backends::InMemoryBackend;
use redb::{Database, Key, TableHandle, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct Registration {
    name: Arc<str>,
    signature: String,
}

/// Entry point for opening and deleting range tables.
#[derive(Clone)]
pub struct Db {
    database: Arc<Database>,
    tables: Arc<Mutex<HashMap<String, Registration>>>,
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("tables", &self.table_names())
            .finish()
    }
}

impl Db {
    /// Creates a database file at `path`, or opens it if it already exists.
    pub fn create(path: impl AsRef<Path>, config: DbConfig) -> Result<Self> {
        let mut builder = Database::builder();
        builder.set_cache_size(config.cache_size);
        let database = builder.create(path.as_ref())?;

        tracing::debug!(path = %path.as_ref().display(), "created range table database");
        Ok(Self::from_database(database))
    }

    /// Opens an existing database file at `path`.
    pub fn open(path: impl AsRef<Path>, config: DbConfig) -> Result<Self> {
        let mut builder = Database::builder();
        builder.set_cache_size(config.cache_size);
        let database = builder.open(path.as_ref())?;

        tracing::debug!(path = %path.as_ref().display(), "opened range table database");
        Ok(Self::from_database(database))
    }

    /// Creates a database that lives only in memory.
    pub fn in_memory(config: DbConfig) -> Result<Self> {
        let mut builder = Database::builder();
        builder.set_cache_size(config.cache_size);
        let database = builder.create_with_backend(InMemoryBackend::new())?;

        Ok(Self::from_database(database))
    }

    /// Wraps an already opened redb database.
    pub fn from_database(database: Database) -> Self {
        Self {
            database: Arc::new(database),
            tables: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the underlying redb database.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Returns a handle to the table `name` with the given key and value types.
    ///
    /// The first call registers the name; later calls must use the same types.
    ///
    /// # Errors
    /// `TableTypeMismatch` if `name` was already opened with other types.
    pub fn get_table<H, R, V>(&self, name: &str) -> Result<RangeTable<H, R, V>>
    where
        H: Key + 'static,
        for<'a> H: From<H::SelfType<'a>>,
        R: Key + 'static,
        for<'a> R: From<R::SelfType<'a>>,
        V: Value + 'static,
        for<'a> V: From<V::SelfType<'a>>,
    {
        let signature = RangeTable::<H, R, V>::signature();

        let mut tables = self.tables.lock().unwrap_or_else(|err| err.into_inner());
        let registration = tables.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(table = name, signature = %signature, "registered range table");
            Registration {
                name: Arc::from(name),
                signature: signature.clone(),
            }
        });

        if registration.signature != signature {
            return Err(Error::TableTypeMismatch {
                name: name.to_string(),
                expected: registration.signature.clone(),
                found: signature,
            });
        }

        Ok(RangeTable::new(
            Arc::clone(&self.database),
            Arc::clone(&registration.name),
        ))
    }

    /// Removes the table `name` with all its entries and forgets its registration.
    ///
    /// Returns `true` if the table existed in the database. Handles obtained
    /// earlier keep working and see an empty table.
    pub fn delete_table(&self, name: &str) -> Result<bool> {
        let txn = self.database.begin_write()?;
        let handle = txn.list_tables()?.find(|table| table.name() == name);
        let existed = match handle {
            Some(handle) => txn.delete_table(handle)?,
            None => false,
        };
        txn.commit()?;

        self.tables
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .remove(name);

        tracing::debug!(table = name, existed, "deleted range table");
        Ok(existed)
    }

    /// Names of the currently registered tables, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let tables = self.tables.lock().unwrap_or_else(|err| err.into_inner());
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}
