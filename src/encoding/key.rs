//! Key encoding and decoding for range tables.
//!
//! A composite key is two escape-terminated segments:
//!
//! Composite key: [hash segment][range segment]
//! Segment:       [component bytes, 0x00 -> 0x00 0xFF][0x00 0x01]
//!
//! Bounds reuse the same layout but may close the last segment with
//! `0x00 0x02`, which sorts after every key whose segment holds exactly the
//! same bytes, whatever follows it.

use super::EncodingError;
use redb::{Key, TypeName, Value};
use std::any::TypeId;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;

pub type Result<T> = std::result::Result<T, EncodingError>;

const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;
const CLOSED: u8 = 0x01;
const SUCCESSOR: u8 = 0x02;

/// How a segment was closed. `Closed` sorts before `Successor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Terminator {
    Closed,
    Successor,
}

fn corrupt(msg: impl Into<String>) -> EncodingError {
    EncodingError::CorruptKey(msg.into())
}

fn push_segment(buf: &mut Vec<u8>, bytes: &[u8], terminator: u8) {
    for &byte in bytes {
        buf.push(byte);
        if byte == ESCAPE {
            buf.push(ESCAPED_ZERO);
        }
    }
    buf.push(ESCAPE);
    buf.push(terminator);
}

/// Splits the leading segment off `data`.
///
/// Returns the unescaped component bytes, the terminator and the remaining
/// input. Borrows from `data` unless the segment contains escaped zeros.
fn split_segment(data: &[u8]) -> Result<(Cow<'_, [u8]>, Terminator, &[u8])> {
    let mut owned: Option<Vec<u8>> = None;
    let mut run_start = 0;
    let mut pos = 0;

    while pos < data.len() {
        if data[pos] != ESCAPE {
            pos += 1;
            continue;
        }

        let marker = *data
            .get(pos + 1)
            .ok_or_else(|| corrupt(format!("truncated escape at offset {}", pos)))?;

        let terminator = match marker {
            ESCAPED_ZERO => {
                let buf = owned.get_or_insert_with(Vec::new);
                buf.extend_from_slice(&data[run_start..pos]);
                buf.push(ESCAPE);
                pos += 2;
                run_start = pos;
                continue;
            }
            CLOSED => Terminator::Closed,
            SUCCESSOR => Terminator::Successor,
            other => {
                return Err(corrupt(format!(
                    "unknown escape byte 0x{:02x} at offset {}",
                    other,
                    pos + 1
                )))
            }
        };

        let bytes = match owned {
            Some(mut buf) => {
                buf.extend_from_slice(&data[run_start..pos]);
                Cow::Owned(buf)
            }
            None => Cow::Borrowed(&data[..pos]),
        };
        return Ok((bytes, terminator, &data[pos + 2..]));
    }

    Err(corrupt("missing segment terminator"))
}

/// Rejects component bytes that `T::from_bytes` cannot take.
///
/// Covers the fixed width of every type, plus the redb types whose decoders
/// panic on invalid input.
fn check_component<T: Value + 'static>(bytes: &[u8], role: &str) -> Result<()> {
    if let Some(width) = T::fixed_width() {
        if width != bytes.len() {
            return Err(corrupt(format!(
                "{} segment is {} bytes, expected {}",
                role,
                bytes.len(),
                width
            )));
        }
    }

    let id = TypeId::of::<T>();
    if id == TypeId::of::<String>() || id == TypeId::of::<&'static str>() {
        if let Err(err) = std::str::from_utf8(bytes) {
            return Err(corrupt(format!("{} segment is not UTF-8: {}", role, err)));
        }
    } else if id == TypeId::of::<bool>() {
        if !matches!(bytes, [0] | [1]) {
            return Err(corrupt(format!("{} segment is not a bool", role)));
        }
    } else if id == TypeId::of::<char>() {
        if let [b0, b1, b2] = *bytes {
            if char::from_u32(u32::from_le_bytes([b0, b1, b2, 0])).is_none() {
                return Err(corrupt(format!("{} segment is not a char", role)));
            }
        }
    }

    Ok(())
}

fn decode_segment<T>(bytes: &[u8], role: &str) -> Result<T>
where
    T: Key + 'static,
    for<'a> T: From<T::SelfType<'a>>,
{
    check_component::<T>(bytes, role)?;
    Ok(T::from(T::from_bytes(bytes)))
}

/// Encodes a hash key as a closed segment.
///
/// For byte-ordered hash types the result compares exactly like the keys do.
pub fn encode_hash<H: Key + 'static>(hash: &H::SelfType<'_>) -> Vec<u8> {
    let mut buf = Vec::new();
    push_segment(&mut buf, H::as_bytes(hash).as_ref(), CLOSED);
    buf
}

/// Encodes a range key as a closed segment.
pub fn encode_range<R: Key + 'static>(range: &R::SelfType<'_>) -> Vec<u8> {
    let mut buf = Vec::new();
    push_segment(&mut buf, R::as_bytes(range).as_ref(), CLOSED);
    buf
}

/// Encodes a (hash, range) pair: `[hash segment][range segment]`.
pub fn encode_composite<H: Key + 'static, R: Key + 'static>(
    hash: &H::SelfType<'_>,
    range: &R::SelfType<'_>,
) -> Vec<u8> {
    let hash_bytes = H::as_bytes(hash);
    let range_bytes = R::as_bytes(range);
    let mut buf =
        Vec::with_capacity(hash_bytes.as_ref().len() + range_bytes.as_ref().len() + 4);
    push_segment(&mut buf, hash_bytes.as_ref(), CLOSED);
    push_segment(&mut buf, range_bytes.as_ref(), CLOSED);
    buf
}

/// Decodes a composite key produced by [`encode_composite`].
///
/// # Errors
/// `CorruptKey` if the layout is malformed, a segment is a bound rather than
/// a stored key, a fixed-width component has the wrong length, or a string,
/// bool or char component holds bytes its type cannot decode.
pub fn decode_composite<H, R>(data: &[u8]) -> Result<(H, R)>
where
    H: Key + 'static,
    for<'a> H: From<H::SelfType<'a>>,
    R: Key + 'static,
    for<'a> R: From<R::SelfType<'a>>,
{
    let (hash_bytes, hash_end, rest) = split_segment(data)?;
    if hash_end != Terminator::Closed {
        return Err(corrupt("hash segment is a bound, not a stored key"));
    }
    if rest.is_empty() {
        return Err(corrupt("missing range segment"));
    }

    let (range_bytes, range_end, trailing) = split_segment(rest)?;
    if range_end != Terminator::Closed {
        return Err(corrupt("range segment is a bound, not a stored key"));
    }
    if !trailing.is_empty() {
        return Err(corrupt(format!(
            "{} trailing bytes after range segment",
            trailing.len()
        )));
    }

    let hash = decode_segment::<H>(&hash_bytes, "hash")?;
    let range = decode_segment::<R>(&range_bytes, "range")?;
    Ok((hash, range))
}

/// Inclusive lower bound of every key under `hash`.
pub fn hash_lower_bound<H: Key + 'static>(hash: &H::SelfType<'_>) -> Vec<u8> {
    encode_hash::<H>(hash)
}

/// Exclusive upper bound of every key under `hash`.
pub fn hash_upper_bound<H: Key + 'static>(hash: &H::SelfType<'_>) -> Vec<u8> {
    let mut buf = Vec::new();
    push_segment(&mut buf, H::as_bytes(hash).as_ref(), SUCCESSOR);
    buf
}

/// Inclusive lower bound of keys under `hash` with range key >= `from`.
pub fn range_lower_bound<H: Key + 'static, R: Key + 'static>(
    hash: &H::SelfType<'_>,
    from: &R::SelfType<'_>,
) -> Vec<u8> {
    encode_composite::<H, R>(hash, from)
}

/// Exclusive upper bound of keys under `hash` with range key <= `to`.
///
/// This is the successor of `encode_composite(hash, to)`, so a scan up to
/// it still includes `to` itself.
pub fn range_upper_bound<H: Key + 'static, R: Key + 'static>(
    hash: &H::SelfType<'_>,
    to: &R::SelfType<'_>,
) -> Vec<u8> {
    let mut buf = Vec::new();
    push_segment(&mut buf, H::as_bytes(hash).as_ref(), CLOSED);
    push_segment(&mut buf, R::as_bytes(to).as_ref(), SUCCESSOR);
    buf
}

/// Compares two encodings segment by segment using the component orders.
fn compare_encoded<H: Key + 'static, R: Key + 'static>(data1: &[u8], data2: &[u8]) -> Result<Ordering> {
    let (hash1, end1, rest1) = split_segment(data1)?;
    let (hash2, end2, rest2) = split_segment(data2)?;
    check_component::<H>(&hash1, "hash")?;
    check_component::<H>(&hash2, "hash")?;

    match H::compare(&hash1, &hash2).then(end1.cmp(&end2)) {
        Ordering::Equal => {}
        other => return Ok(other),
    }
    if end1 == Terminator::Successor {
        return Ok(Ordering::Equal);
    }

    match (rest1.is_empty(), rest2.is_empty()) {
        (true, true) => Ok(Ordering::Equal),
        (true, false) => Ok(Ordering::Less),
        (false, true) => Ok(Ordering::Greater),
        (false, false) => {
            let (range1, end1, _) = split_segment(rest1)?;
            let (range2, end2, _) = split_segment(rest2)?;
            check_component::<R>(&range1, "range")?;
            check_component::<R>(&range2, "range")?;
            Ok(R::compare(&range1, &range2).then(end1.cmp(&end2)))
        }
    }
}

/// Encoded (hash key, range key) pair stored as a redb key.
///
/// Ordering is hash key first, using `H::compare`, then range key, using
/// `R::compare`. Both comparators see the component's own `as_bytes` form.
/// The same type also carries scan bounds built by [`CompositeKey::hash_start`]
/// and friends, which are never stored.
pub struct CompositeKey<H, R> {
    bytes: Vec<u8>,
    _types: PhantomData<fn() -> (H, R)>,
}

impl<H, R> CompositeKey<H, R> {
    fn from_encoded(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            _types: PhantomData,
        }
    }

    /// The encoded bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the key and returns the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl<H: Key + 'static, R: Key + 'static> CompositeKey<H, R> {
    /// Encodes a (hash, range) pair.
    pub fn new(hash: &H::SelfType<'_>, range: &R::SelfType<'_>) -> Self {
        Self::from_encoded(encode_composite::<H, R>(hash, range))
    }

    /// Lower bound of every key under `hash`.
    pub fn hash_start(hash: &H::SelfType<'_>) -> Self {
        Self::from_encoded(hash_lower_bound::<H>(hash))
    }

    /// Exclusive upper bound of every key under `hash`.
    pub fn hash_end(hash: &H::SelfType<'_>) -> Self {
        Self::from_encoded(hash_upper_bound::<H>(hash))
    }

    /// Lower bound of keys under `hash` with range key >= `from`.
    pub fn range_start(hash: &H::SelfType<'_>, from: &R::SelfType<'_>) -> Self {
        Self::from_encoded(range_lower_bound::<H, R>(hash, from))
    }

    /// Exclusive upper bound of keys under `hash` with range key <= `to`.
    pub fn range_end(hash: &H::SelfType<'_>, to: &R::SelfType<'_>) -> Self {
        Self::from_encoded(range_upper_bound::<H, R>(hash, to))
    }

    /// Decodes back into owned hash and range keys.
    pub fn decode(&self) -> Result<(H, R)>
    where
        for<'a> H: From<H::SelfType<'a>>,
        for<'a> R: From<R::SelfType<'a>>,
    {
        decode_composite::<H, R>(&self.bytes)
    }
}

impl<H, R> Clone for CompositeKey<H, R> {
    fn clone(&self) -> Self {
        Self::from_encoded(self.bytes.clone())
    }
}

impl<H, R> fmt::Debug for CompositeKey<H, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeKey")
            .field("bytes", &self.bytes)
            .finish()
    }
}

impl<H: Key + 'static, R: Key + 'static> Value for CompositeKey<H, R> {
    type SelfType<'a>
        = CompositeKey<H, R>
    where
        Self: 'a;

    type AsBytes<'a>
        = &'a [u8]
    where
        Self: 'a;

    fn fixed_width() -> Option<usize> {
        None
    }

    fn from_bytes<'a>(data: &'a [u8]) -> Self::SelfType<'a>
    where
        Self: 'a,
    {
        CompositeKey::from_encoded(data.to_vec())
    }

    fn as_bytes<'a, 'b: 'a>(value: &'a Self::SelfType<'b>) -> Self::AsBytes<'a>
    where
        Self: 'a,
        Self: 'b,
    {
        value.bytes.as_slice()
    }

    fn type_name() -> TypeName {
        TypeName::new(&format!(
            "redb_range_table::CompositeKey<{}, {}>",
            H::type_name().name(),
            R::type_name().name()
        ))
    }
}

impl<H: Key + 'static, R: Key + 'static> Key for CompositeKey<H, R> {
    fn compare(data1: &[u8], data2: &[u8]) -> Ordering {
        // Stored keys and bounds are always well formed; anything else keeps
        // a total order so the B-tree stays consistent, and fails on decode.
        compare_encoded::<H, R>(data1, data2).unwrap_or_else(|_| data1.cmp(data2))
    }
}
