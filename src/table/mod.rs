//! Hash key + range key tables.
//!
//! A `RangeTable` is a thin handle over one redb table keyed by
//! [`CompositeKey`]. Every call runs in its own redb transaction, so the
//! handle holds no locks and can be cloned and shared across threads.
//! Concurrent behavior is redb's: one writer at a time, readers see the
//! snapshot that was committed when their transaction began.

use crate::encoding::CompositeKey;
use crate::error::{Error, Result};
use redb::{
    Database, Key, ReadableDatabase, TableDefinition, TableError, Value,
};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

pub mod cursor;

pub use cursor::RangeCursor;

/// Typed table addressed by (hash key, range key).
///
/// Entries under one hash key are kept in range key order as defined by
/// `R::compare`; hash keys are ordered by `H::compare`.
pub struct RangeTable<H, R, V> {
    db: Arc<Database>,
    name: Arc<str>,
    _types: PhantomData<fn() -> (H, R, V)>,
}

impl<H, R, V> Clone for RangeTable<H, R, V> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            name: Arc::clone(&self.name),
            _types: PhantomData,
        }
    }
}

impl<H, R, V> fmt::Debug for RangeTable<H, R, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeTable")
            .field("name", &self.name)
            .finish()
    }
}

impl<H, R, V> RangeTable<H, R, V>
where
    H: Key + 'static,
    for<'a> H: From<H::SelfType<'a>>,
    R: Key + 'static,
    for<'a> R: From<R::SelfType<'a>>,
    V: Value + 'static,
    for<'a> V: From<V::SelfType<'a>>,
{
    /// Creates a handle for the named table. The redb table itself is
    /// created by the first write.
    pub fn new(db: Arc<Database>, name: impl Into<Arc<str>>) -> Self {
        Self {
            db,
            name: name.into(),
            _types: PhantomData,
        }
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn definition(&self) -> TableDefinition<'_, CompositeKey<H, R>, V> {
        TableDefinition::new(&self.name)
    }

    /// Key and value type names, as redb records them for the table.
    pub(crate) fn signature() -> String {
        format!(
            "{} -> {}",
            CompositeKey::<H, R>::type_name().name(),
            V::type_name().name()
        )
    }

    fn open_error(&self, err: TableError) -> Error {
        match err {
            TableError::TableTypeMismatch {
                table, key, value, ..
            } => Error::TableTypeMismatch {
                name: table,
                expected: format!("{} -> {}", key.name(), value.name()),
                found: Self::signature(),
            },
            other => other.into(),
        }
    }

    /// Looks up the value stored at (hash, range).
    ///
    /// Returns `None` if the entry, or the whole table, does not exist.
    #[tracing::instrument(level = "trace", skip_all, fields(table = %self.name))]
    pub fn get<'h, 'r>(
        &self,
        hash: impl Borrow<H::SelfType<'h>>,
        range: impl Borrow<R::SelfType<'r>>,
    ) -> Result<Option<V>> {
        let key = CompositeKey::<H, R>::new(hash.borrow(), range.borrow());
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(self.definition()) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(self.open_error(err)),
        };

        let value = table.get(&key)?.map(|guard| V::from(guard.value()));
        Ok(value)
    }

    /// Stores `value` at (hash, range), replacing any previous value.
    ///
    /// The write is committed before returning.
    #[tracing::instrument(level = "trace", skip_all, fields(table = %self.name))]
    pub fn put<'h, 'r, 'v>(
        &self,
        hash: impl Borrow<H::SelfType<'h>>,
        range: impl Borrow<R::SelfType<'r>>,
        value: impl Borrow<V::SelfType<'v>>,
    ) -> Result<()> {
        let key = CompositeKey::<H, R>::new(hash.borrow(), range.borrow());
        let txn = self.db.begin_write()?;
        {
            let mut table = txn
                .open_table(self.definition())
                .map_err(|err| self.open_error(err))?;
            table.insert(&key, value.borrow())?;
        }
        txn.commit()?;

        Ok(())
    }

    /// Removes the entry at (hash, range). Removing a missing entry is a no-op.
    #[tracing::instrument(level = "trace", skip_all, fields(table = %self.name))]
    pub fn delete<'h, 'r>(
        &self,
        hash: impl Borrow<H::SelfType<'h>>,
        range: impl Borrow<R::SelfType<'r>>,
    ) -> Result<()> {
        let key = CompositeKey::<H, R>::new(hash.borrow(), range.borrow());
        let txn = self.db.begin_write()?;
        {
            let mut table = txn
                .open_table(self.definition())
                .map_err(|err| self.open_error(err))?;
            table.remove(&key)?;
        }
        txn.commit()?;

        Ok(())
    }

    /// Iterates every entry under `hash` in range key order.
    #[tracing::instrument(level = "trace", skip_all, fields(table = %self.name))]
    pub fn range<'h>(&self, hash: impl Borrow<H::SelfType<'h>>) -> Result<RangeCursor<H, R, V>> {
        let hash = hash.borrow();
        self.scan(
            CompositeKey::<H, R>::hash_start(hash),
            CompositeKey::<H, R>::hash_end(hash),
        )
    }

    /// Iterates entries under `hash` with range key >= `from`.
    #[tracing::instrument(level = "trace", skip_all, fields(table = %self.name))]
    pub fn range_from<'h, 'r>(
        &self,
        hash: impl Borrow<H::SelfType<'h>>,
        from: impl Borrow<R::SelfType<'r>>,
    ) -> Result<RangeCursor<H, R, V>> {
        let hash = hash.borrow();
        self.scan(
            CompositeKey::<H, R>::range_start(hash, from.borrow()),
            CompositeKey::<H, R>::hash_end(hash),
        )
    }

    /// Iterates entries under `hash` with `from <= range key <= to`.
    ///
    /// An inverted window (`from > to`) yields nothing.
    #[tracing::instrument(level = "trace", skip_all, fields(table = %self.name))]
    pub fn range_between<'h, 'f, 't>(
        &self,
        hash: impl Borrow<H::SelfType<'h>>,
        from: impl Borrow<R::SelfType<'f>>,
        to: impl Borrow<R::SelfType<'t>>,
    ) -> Result<RangeCursor<H, R, V>> {
        let (hash, from, to) = (hash.borrow(), from.borrow(), to.borrow());
        let order = R::compare(R::as_bytes(from).as_ref(), R::as_bytes(to).as_ref());
        if order == Ordering::Greater {
            return Ok(RangeCursor::exhausted(Arc::clone(&self.name)));
        }

        self.scan(
            CompositeKey::<H, R>::range_start(hash, from),
            CompositeKey::<H, R>::range_end(hash, to),
        )
    }

    /// Deletes every entry under `hash` in one write transaction.
    ///
    /// Returns the number of removed entries.
    #[tracing::instrument(level = "trace", skip_all, fields(table = %self.name))]
    pub fn clear_hash<'h>(&self, hash: impl Borrow<H::SelfType<'h>>) -> Result<u64> {
        let hash = hash.borrow();
        let lower = CompositeKey::<H, R>::hash_start(hash);
        let upper = CompositeKey::<H, R>::hash_end(hash);

        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn
                .open_table(self.definition())
                .map_err(|err| self.open_error(err))?;

            let mut removed = 0u64;
            for entry in table.extract_from_if(lower..upper, |_, _| true)? {
                entry?;
                removed += 1;
            }
            removed
        };
        txn.commit()?;

        tracing::debug!(table = %self.name, removed, "cleared hash key");
        Ok(removed)
    }

    fn scan(
        &self,
        lower: CompositeKey<H, R>,
        upper: CompositeKey<H, R>,
    ) -> Result<RangeCursor<H, R, V>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(self.definition()) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => {
                return Ok(RangeCursor::exhausted(Arc::clone(&self.name)))
            }
            Err(err) => return Err(self.open_error(err)),
        };

        let range = table.range(lower..upper)?;
        Ok(RangeCursor::new(Arc::clone(&self.name), range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redb::backends::InMemoryBackend;
    use tempfile::NamedTempFile;

    type Events = RangeTable<String, u64, String>;

    fn memory_db() -> Arc<Database> {
        Arc::new(
            Database::builder()
                .create_with_backend(InMemoryBackend::new())
                .unwrap(),
        )
    }

    fn collect(cursor: RangeCursor<String, u64, String>) -> Vec<(String, u64, String)> {
        cursor.collect::<Result<Vec<_>>>().unwrap()
    }

    fn seed(table: &Events) {
        for (hash, range) in [("alice", 1u64), ("alice", 5), ("alice", 9), ("bob", 3)] {
            table
                .put(hash.to_string(), range, format!("{}:{}", hash, range).as_str().to_string())
                .unwrap();
        }
    }

    #[test]
    fn test_get_put_delete() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_file = NamedTempFile::new()?;
        let db = Arc::new(Database::create(temp_file.path())?);
        let table: Events = RangeTable::new(db, "events");

        // Missing table reads as empty
        assert_eq!(table.get("alice".to_string(), 1u64)?, None);

        table.put("alice".to_string(), 1u64, "first".to_string())?;
        assert_eq!(table.get("alice".to_string(), 1u64)?, Some("first".to_string()));

        // Overwrite
        table.put("alice".to_string(), 1u64, "second".to_string())?;
        assert_eq!(table.get("alice".to_string(), 1u64)?, Some("second".to_string()));

        // Same range key under another hash is a different entry
        assert_eq!(table.get("bob".to_string(), 1u64)?, None);

        table.delete("alice".to_string(), 1u64)?;
        assert_eq!(table.get("alice".to_string(), 1u64)?, None);

        // Deleting again is a no-op
        table.delete("alice".to_string(), 1u64)?;
        assert_eq!(table.get("alice".to_string(), 1u64)?, None);

        Ok(())
    }

    #[test]
    fn test_delete_on_missing_table() {
        let table: Events = RangeTable::new(memory_db(), "never_written");
        table.delete("alice".to_string(), 1u64).unwrap();
        assert_eq!(table.clear_hash("alice".to_string()).unwrap(), 0);
    }

    #[test]
    fn test_range_over_hash() {
        let table: Events = RangeTable::new(memory_db(), "events");
        seed(&table);

        let ranges: Vec<u64> = collect(table.range("alice".to_string()).unwrap())
            .into_iter()
            .map(|(_, range, _)| range)
            .collect();
        assert_eq!(ranges, vec![1, 5, 9]);

        let bob = collect(table.range("bob".to_string()).unwrap());
        assert_eq!(bob, vec![("bob".to_string(), 3u64, "bob:3".to_string())]);

        assert!(collect(table.range("carol".to_string()).unwrap()).is_empty());
    }

    #[test]
    fn test_range_from_and_between() {
        let table: Events = RangeTable::new(memory_db(), "events");
        seed(&table);

        let from: Vec<u64> = collect(table.range_from("alice".to_string(), 5u64).unwrap())
            .into_iter()
            .map(|(_, range, _)| range)
            .collect();
        assert_eq!(from, vec![5, 9]);

        // Both ends inclusive
        let between = table.range_between("alice".to_string(), 1u64, 5u64).unwrap();
        let between: Vec<u64> = collect(between)
            .into_iter()
            .map(|(_, range, _)| range)
            .collect();
        assert_eq!(between, vec![1, 5]);

        let single = table.range_between("alice".to_string(), 9u64, 9u64).unwrap();
        let single: Vec<u64> = collect(single)
            .into_iter()
            .map(|(_, range, _)| range)
            .collect();
        assert_eq!(single, vec![9]);

        // Inverted window
        let mut inverted = table.range_between("alice".to_string(), 9u64, 1u64).unwrap();
        assert!(inverted.is_exhausted());
        assert!(inverted.next().is_none());
    }

    #[test]
    fn test_range_on_missing_table() {
        let table: Events = RangeTable::new(memory_db(), "empty");
        let mut cursor = table.range("alice".to_string()).unwrap();
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_numeric_range_keys_sort_numerically() {
        let table: RangeTable<u32, u64, u32> = RangeTable::new(memory_db(), "numbers");
        for range in [256u64, 1, 65536, 255, 0] {
            table.put(7u32, range, range as u32).unwrap();
        }

        let ranges: Vec<u64> = table
            .range(7u32)
            .unwrap()
            .map(|entry| entry.unwrap().1)
            .collect();
        assert_eq!(ranges, vec![0, 1, 255, 256, 65536]);
    }

    #[test]
    fn test_clear_hash() {
        let table: Events = RangeTable::new(memory_db(), "events");
        seed(&table);

        assert_eq!(table.clear_hash("alice".to_string()).unwrap(), 3);
        assert!(collect(table.range("alice".to_string()).unwrap()).is_empty());
        assert_eq!(table.get("bob".to_string(), 3u64).unwrap(), Some("bob:3".to_string()));
    }

    #[test]
    fn test_clear_hash_keeps_neighbouring_hash_keys() {
        let table: Events = RangeTable::new(memory_db(), "events");
        for hash in ["alic", "alice", "alice\0", "alicf"] {
            for range in [0u64, 1, u64::MAX] {
                table.put(hash.to_string(), range, hash.to_string()).unwrap();
            }
        }

        assert_eq!(table.clear_hash("alice".to_string()).unwrap(), 3);
        assert_eq!(table.clear_hash("alice".to_string()).unwrap(), 0);

        for hash in ["alic", "alice\0", "alicf"] {
            let entries = collect(table.range(hash.to_string()).unwrap());
            assert_eq!(entries.len(), 3, "hash {:?}", hash);
            assert!(entries.iter().all(|(h, _, value)| h == hash && value == hash));
        }
    }

    #[test]
    fn test_reopen_with_other_types_is_a_type_mismatch() {
        let db = memory_db();
        let numbers: RangeTable<u64, u64, u64> = RangeTable::new(Arc::clone(&db), "events");
        numbers.put(1u64, 1u64, 1u64).unwrap();

        let strings: Events = RangeTable::new(db, "events");
        let read = strings.get("alice".to_string(), 1u64).unwrap_err();
        assert!(matches!(read, Error::TableTypeMismatch { .. }), "{:?}", read);

        let write = strings.put("alice".to_string(), 1u64, "first".to_string()).unwrap_err();
        assert!(matches!(write, Error::TableTypeMismatch { .. }), "{:?}", write);

        match strings.range("alice".to_string()) {
            Err(Error::TableTypeMismatch { name, found, .. }) => {
                assert_eq!(name, "events");
                assert_eq!(found, Events::signature());
            }
            other => panic!("expected a type mismatch, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_cursor_sees_snapshot() {
        let table: Events = RangeTable::new(memory_db(), "events");
        seed(&table);

        let cursor = table.range("alice".to_string()).unwrap();
        table.put("alice".to_string(), 7u64, "late".to_string()).unwrap();
        table.delete("alice".to_string(), 1u64).unwrap();

        let ranges: Vec<u64> = collect(cursor).into_iter().map(|(_, r, _)| r).collect();
        assert_eq!(ranges, vec![1, 5, 9]);
    }
}
