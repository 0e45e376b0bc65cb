// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Deterministic core types and canonical encoding helpers.

use bincode::Options;
use serde::{de, de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::core::security::crypto::sha256;

/// Canonical serialization error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("serialization")]
    Serialize,
    #[error("deserialization")]
    Deserialize,
    #[error("size limit exceeded")]
    TooLarge,
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("trailing bytes")]
    TrailingBytes,
    #[error("invalid {0}")]
    Invalid(&'static str),
}

/// Upper bound for a single stored record.
pub const MAX_RECORD_BYTES: usize = 4 * 1024 * 1024;

/// Canonical bincode options (deterministic).
fn bincode_opts() -> impl Options {
    // Fixint encoding provides a stable integer representation.
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Encode with deterministic rules. Requires deterministic container ordering (use BTreeMap/BTreeSet).
pub fn encode_canonical<T: Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    bincode_opts()
        .serialize(v)
        .map_err(|_| CodecError::Serialize)
}

/// Decode with a hard size cap.
pub fn decode_canonical_limited<T: DeserializeOwned>(
    bytes: &[u8],
    max: usize,
) -> Result<T, CodecError> {
    if bytes.len() > max {
        return Err(CodecError::TooLarge);
    }
    bincode_opts()
        .with_limit(max as u64)
        .deserialize(bytes)
        .map_err(|_| CodecError::Deserialize)
}

/// Decode a stored record.
pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    decode_canonical_limited(bytes, MAX_RECORD_BYTES)
}

struct FixedBytesVisitor<const N: usize>;

impl<'de, const N: usize> de::Visitor<'de> for FixedBytesVisitor<N> {
    type Value = [u8; N];

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{N} bytes or a hex string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        let raw = hex::decode(v).map_err(E::custom)?;
        self.visit_bytes(&raw)
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        if v.len() != N {
            return Err(E::invalid_length(v.len(), &self));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(v);
        Ok(out)
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut out = [0u8; N];
        for (i, b) in out.iter_mut().enumerate() {
            *b = seq
                .next_element()?
                .ok_or_else(|| de::Error::invalid_length(i, &self))?;
        }
        Ok(out)
    }
}

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// All-zero value.
            pub const ZERO: Self = Self([0u8; $len]);
            /// Length in bytes.
            pub const LEN: usize = $len;

            /// Construct from raw bytes.
            pub fn from_bytes(b: [u8; $len]) -> Self {
                Self(b)
            }
            /// Return bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
            /// Construct from a slice of exactly the right length.
            pub fn from_slice(b: &[u8]) -> Option<Self> {
                if b.len() != $len {
                    return None;
                }
                let mut out = [0u8; $len];
                out.copy_from_slice(b);
                Some(Self(out))
            }
            /// True if every byte is zero.
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
            /// Lowercase hex.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
            /// Parse lowercase/uppercase hex.
            pub fn from_hex(s: &str) -> Result<Self, CodecError> {
                let raw = hex::decode(s).map_err(|_| CodecError::Invalid("hex"))?;
                Self::from_slice(&raw).ok_or(CodecError::Invalid("length"))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                if s.is_human_readable() {
                    s.serialize_str(&self.to_hex())
                } else {
                    s.serialize_bytes(&self.0)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                if d.is_human_readable() {
                    d.deserialize_str(FixedBytesVisitor::<$len>).map(Self)
                } else {
                    d.deserialize_bytes(FixedBytesVisitor::<$len>).map(Self)
                }
            }
        }
    };
}

fixed_bytes!(
    /// 256-bit hash type (32 bytes).
    H256,
    32
);

fixed_bytes!(
    /// Ed25519 public key bytes.
    PublicKey,
    32
);

fixed_bytes!(
    /// Ed25519 signature bytes.
    Signature,
    64
);

impl H256 {
    /// Little-endian u64 over the first 8 bytes; block and transaction ids are derived this way.
    pub fn id_prefix(&self) -> u64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(b)
    }
}

/// 96-bit account identifier: primary id + disambiguator, both taken from SHA-256(public key).
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FullId {
    /// Primary 64-bit id.
    pub id: u64,
    /// 32-bit disambiguator.
    pub id2: u32,
}

const ADDRESS_PREFIX: &str = "AMUN-";

impl FullId {
    /// The designated burn account; exempt from the balance invariant.
    pub const BURN: FullId = FullId { id: 0, id2: 0 };

    /// Construct from parts.
    pub fn new(id: u64, id2: u32) -> Self {
        Self { id, id2 }
    }

    /// Derive from a public key.
    pub fn from_public_key(pk: &PublicKey) -> Self {
        let h = sha256(pk.as_bytes());
        let mut a = [0u8; 8];
        a.copy_from_slice(&h[..8]);
        let mut b = [0u8; 4];
        b.copy_from_slice(&h[8..12]);
        Self {
            id: u64::from_le_bytes(a),
            id2: u32::from_le_bytes(b),
        }
    }

    /// True for the all-zero id.
    pub fn is_zero(&self) -> bool {
        self.id == 0 && self.id2 == 0
    }

    /// Big-endian storage key (orders by id, then id2).
    pub fn key_bytes(&self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[..8].copy_from_slice(&self.id.to_be_bytes());
        out[8..].copy_from_slice(&self.id2.to_be_bytes());
        out
    }

    /// Inverse of [`FullId::key_bytes`].
    pub fn from_key_bytes(b: &[u8]) -> Option<Self> {
        if b.len() < 12 {
            return None;
        }
        let mut a = [0u8; 8];
        a.copy_from_slice(&b[..8]);
        let mut c = [0u8; 4];
        c.copy_from_slice(&b[8..12]);
        Some(Self {
            id: u64::from_be_bytes(a),
            id2: u32::from_be_bytes(c),
        })
    }
}

impl fmt::Display for FullId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ADDRESS_PREFIX}{}", bs58::encode(self.key_bytes()).into_string())
    }
}

impl fmt::Debug for FullId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FullId({}:{})", self.id, self.id2)
    }
}

impl FromStr for FullId {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix(ADDRESS_PREFIX)
            .ok_or(CodecError::Invalid("address prefix"))?;
        let raw = bs58::decode(body)
            .into_vec()
            .map_err(|_| CodecError::Invalid("address"))?;
        if raw.len() != 12 {
            return Err(CodecError::Invalid("address length"));
        }
        FullId::from_key_bytes(&raw).ok_or(CodecError::Invalid("address"))
    }
}

impl Serialize for FullId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.serialize_str(&self.to_string())
        } else {
            (self.id, self.id2).serialize(s)
        }
    }
}

impl<'de> Deserialize<'de> for FullId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        if d.is_human_readable() {
            let s = String::deserialize(d)?;
            s.parse().map_err(de::Error::custom)
        } else {
            let (id, id2) = <(u64, u32)>::deserialize(d)?;
            Ok(Self { id, id2 })
        }
    }
}

/// Little-endian wire writer.
#[derive(Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Empty writer.
    pub fn new() -> Self {
        Self::default()
    }
    /// Writer with preallocated capacity.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            buf: Vec::with_capacity(n),
        }
    }
    /// Append one byte.
    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }
    /// Append a LE u16.
    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    /// Append a LE u32.
    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    /// Append a LE u64.
    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    /// Append a LE i64.
    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    /// Append raw bytes.
    pub fn put_bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }
    /// Append a u16-length-prefixed UTF-8 string (callers bound the length).
    pub fn put_string(&mut self, s: &str) {
        let len = u16::try_from(s.len()).unwrap_or(u16::MAX);
        self.put_u16(len);
        self.buf.extend_from_slice(&s.as_bytes()[..len as usize]);
    }
    /// Append a u32-length-prefixed blob.
    pub fn put_blob(&mut self, b: &[u8]) {
        let len = u32::try_from(b.len()).unwrap_or(u32::MAX);
        self.put_u32(len);
        self.buf.extend_from_slice(&b[..len as usize]);
    }
    /// Current length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }
    /// True if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
    /// Finish and return bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Little-endian wire reader.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Reader over a byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(n).ok_or(CodecError::UnexpectedEof)?;
        if end > self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read one byte.
    pub fn get_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }
    /// Read a LE u16.
    pub fn get_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }
    /// Read a LE u32.
    pub fn get_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }
    /// Read a LE u64.
    pub fn get_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }
    /// Read a LE i64.
    pub fn get_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }
    /// Read a fixed-size array.
    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        self.take_array()
    }
    /// Read `n` raw bytes.
    pub fn get_bytes(&mut self, n: usize) -> Result<Vec<u8>, CodecError> {
        Ok(self.take(n)?.to_vec())
    }
    /// Read a u16-length-prefixed UTF-8 string of at most `max` bytes.
    pub fn get_string(&mut self, max: usize) -> Result<String, CodecError> {
        let len = self.get_u16()? as usize;
        if len > max {
            return Err(CodecError::TooLarge);
        }
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| CodecError::Invalid("utf-8"))
    }
    /// Read a u32-length-prefixed blob of at most `max` bytes.
    pub fn get_blob(&mut self, max: usize) -> Result<Vec<u8>, CodecError> {
        let len = self.get_u32()? as usize;
        if len > max {
            return Err(CodecError::TooLarge);
        }
        self.get_bytes(len)
    }
    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }
    /// Bytes left.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
    /// Fail if anything is left unread.
    pub fn finish(&self) -> Result<(), CodecError> {
        if self.remaining() != 0 {
            return Err(CodecError::TrailingBytes);
        }
        Ok(())
    }
}

/// Source of epoch time (seconds since the chain epoch).
pub trait Clock: Send + Sync {
    /// Current epoch time in seconds.
    fn now(&self) -> u64;
}

/// Wall clock relative to a configured epoch beginning.
#[derive(Clone, Debug)]
pub struct SystemClock {
    epoch_beginning_secs: u64,
}

impl SystemClock {
    /// Clock whose zero is `epoch_beginning_secs` UNIX seconds.
    pub fn new(epoch_beginning_secs: u64) -> Self {
        Self {
            epoch_beginning_secs,
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
            .saturating_sub(self.epoch_beginning_secs)
    }
}

/// Manually driven clock for simulations and tests.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    /// Clock starting at `t`.
    pub fn new(t: u64) -> Self {
        Self(AtomicU64::new(t))
    }
    /// Set the time.
    pub fn set(&self, t: u64) {
        self.0.store(t, Ordering::SeqCst);
    }
    /// Advance by `secs`.
    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}
