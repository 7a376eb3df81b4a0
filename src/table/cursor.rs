//! Range cursor implementation.
//!
//! Lazily decodes entries from a bounded redb range. The cursor owns the
//! range and with it the read snapshot; dropping the cursor, or running it
//! to the end, releases both.

use crate::encoding::CompositeKey;
use crate::error::{Error, Result};
use redb::{AccessGuard, Key, Range, Value};
use std::iter::FusedIterator;
use std::sync::Arc;

/// Single-use iterator over (hash key, range key, value) entries.
///
/// Yields entries in composite key order. Once the bound is passed, the
/// range runs out or an error is yielded, the cursor is exhausted and keeps
/// returning `None`.
///
/// Implements `DoubleEndedIterator` for reverse iteration over the same bounds.
pub struct RangeCursor<H, R, V>
where
    H: Key + 'static,
    R: Key + 'static,
    V: Value + 'static,
{
    table: Arc<str>,
    range: Option<Range<'static, CompositeKey<H, R>, V>>,
}

type Entry<H, R, V> = (
    AccessGuard<'static, CompositeKey<H, R>>,
    AccessGuard<'static, V>,
);

impl<H, R, V> RangeCursor<H, R, V>
where
    H: Key + 'static,
    for<'a> H: From<H::SelfType<'a>>,
    R: Key + 'static,
    for<'a> R: From<R::SelfType<'a>>,
    V: Value + 'static,
    for<'a> V: From<V::SelfType<'a>>,
{
    pub(crate) fn new(table: Arc<str>, range: Range<'static, CompositeKey<H, R>, V>) -> Self {
        Self {
            table,
            range: Some(range),
        }
    }

    /// A cursor that yields nothing.
    pub(crate) fn exhausted(table: Arc<str>) -> Self {
        Self { table, range: None }
    }

    /// True once the cursor can yield no more entries.
    pub fn is_exhausted(&self) -> bool {
        self.range.is_none()
    }

    fn advance(&mut self, from_back: bool) -> Option<Result<(H, R, V)>> {
        let range = self.range.as_mut()?;
        let next = if from_back {
            range.next_back()
        } else {
            range.next()
        };

        let Some(entry) = next else {
            self.range = None;
            return None;
        };

        let decoded = entry.map_err(Error::from).and_then(decode_entry);
        if let Err(err) = &decoded {
            if err.is_corrupt_key() {
                tracing::warn!(table = %self.table, error = %err, "corrupt key in range scan");
            }
            self.range = None;
        }

        Some(decoded)
    }
}

fn decode_entry<H, R, V>((key, value): Entry<H, R, V>) -> Result<(H, R, V)>
where
    H: Key + 'static,
    for<'a> H: From<H::SelfType<'a>>,
    R: Key + 'static,
    for<'a> R: From<R::SelfType<'a>>,
    V: Value + 'static,
    for<'a> V: From<V::SelfType<'a>>,
{
    let (hash, range) = key.value().decode()?;
    Ok((hash, range, V::from(value.value())))
}

impl<H, R, V> Iterator for RangeCursor<H, R, V>
where
    H: Key + 'static,
    for<'a> H: From<H::SelfType<'a>>,
    R: Key + 'static,
    for<'a> R: From<R::SelfType<'a>>,
    V: Value + 'static,
    for<'a> V: From<V::SelfType<'a>>,
{
    type Item = Result<(H, R, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance(false)
    }
}

impl<H, R, V> DoubleEndedIterator for RangeCursor<H, R, V>
where
    H: Key + 'static,
    for<'a> H: From<H::SelfType<'a>>,
    R: Key + 'static,
    for<'a> R: From<R::SelfType<'a>>,
    V: Value + 'static,
    for<'a> V: From<V::SelfType<'a>>,
{
    fn next_back(&mut self) -> Option<Self::Item> {
        self.advance(true)
    }
}

impl<H, R, V> FusedIterator for RangeCursor<H, R, V>
where
    H: Key + 'static,
    for<'a> H: From<H::SelfType<'a>>,
    R: Key + 'static,
    for<'a> R: From<R::SelfType<'a>>,
    V: Value + 'static,
    for<'a> V: From<V::SelfType<'a>>,
{
}
