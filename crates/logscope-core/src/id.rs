//! Sortable entry identifiers.
//!
//! An [`EntryId`] is 128 bits: a 48-bit millisecond timestamp followed by 80
//! bits of randomness, rendered as 26 characters of Crockford base32. Text
//! order equals numeric order equals chronological order.
//!
//! [`IdGenerator`] is monotonic: within one millisecond the random part is
//! incremented instead of redrawn, so entries sharing a timestamp receive
//! distinct identifiers in insertion order.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{IndexError, IndexResult};

const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const ENCODED_LEN: usize = 26;
const RANDOM_BITS: u32 = 80;
const RANDOM_MASK: u128 = (1 << RANDOM_BITS) - 1;
const MAX_TIME_MS: u64 = (1 << 48) - 1;

/// Unique, chronologically sortable identifier of an indexed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u128);

impl EntryId {
    /// Builds an identifier from its parts.
    #[must_use]
    pub const fn from_parts(time_ms: u64, random: u128) -> Self {
        Self(((time_ms as u128 & MAX_TIME_MS as u128) << RANDOM_BITS) | (random & RANDOM_MASK))
    }

    /// Millisecond timestamp component.
    #[must_use]
    pub const fn time_ms(&self) -> u64 {
        (self.0 >> RANDOM_BITS) as u64
    }

    /// Random component.
    #[must_use]
    pub const fn random(&self) -> u128 {
        self.0 & RANDOM_MASK
    }

    /// Raw 128-bit value.
    #[must_use]
    pub const fn as_u128(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = [0_u8; ENCODED_LEN];
        for (i, slot) in buf.iter_mut().enumerate() {
            let shift = 5 * (ENCODED_LEN - 1 - i);
            *slot = ALPHABET[((self.0 >> shift) & 0x1f) as usize];
        }
        // The alphabet is ASCII.
        f.write_str(std::str::from_utf8(&buf).map_err(|_| fmt::Error)?)
    }
}

/// Error returned when parsing an [`EntryId`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid entry id: {0}")]
pub struct ParseEntryIdError(String);

impl FromStr for EntryId {
    type Err = ParseEntryIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ENCODED_LEN {
            return Err(ParseEntryIdError(s.to_string()));
        }
        let mut value: u128 = 0;
        for (i, c) in s.bytes().enumerate() {
            let digit = decode_char(c).ok_or_else(|| ParseEntryIdError(s.to_string()))?;
            // 26 * 5 = 130 bits, so the leading character may only carry 3.
            if i == 0 && digit > 7 {
                return Err(ParseEntryIdError(s.to_string()));
            }
            value = (value << 5) | u128::from(digit);
        }
        Ok(Self(value))
    }
}

fn decode_char(c: u8) -> Option<u8> {
    let upper = c.to_ascii_uppercase();
    let upper = match upper {
        b'O' => b'0',
        b'I' | b'L' => b'1',
        other => other,
    };
    ALPHABET.iter().position(|&a| a == upper).map(|p| p as u8)
}

impl Serialize for EntryId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntryId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

struct GeneratorState {
    last_ms: Option<u64>,
    last_random: u128,
    rng: StdRng,
}

/// Monotonic [`EntryId`] generator.
///
/// One generator is owned per index; it is safe to share across threads.
pub struct IdGenerator {
    state: Mutex<GeneratorState>,
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdGenerator").finish_non_exhaustive()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    /// Creates a generator seeded from the operating system.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Creates a generator with a deterministic seed.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            state: Mutex::new(GeneratorState {
                last_ms: None,
                last_random: 0,
                rng,
            }),
        }
    }

    /// Generates an identifier for an entry with the given timestamp.
    ///
    /// A missing timestamp uses the current time.
    pub fn generate(&self, timestamp: Option<DateTime<Utc>>) -> IndexResult<EntryId> {
        let millis = timestamp.unwrap_or_else(Utc::now).timestamp_millis();
        let time_ms = u64::try_from(millis)
            .ok()
            .filter(|ms| *ms <= MAX_TIME_MS)
            .ok_or(IndexError::TimestampOutOfRange(millis))?;

        let mut state = self.state.lock();
        let random = if state.last_ms == Some(time_ms) {
            let next = state.last_random + 1;
            if next > RANDOM_MASK {
                return Err(IndexError::IdOverflow(time_ms));
            }
            next
        } else {
            // Leave headroom so a burst within one millisecond rarely overflows.
            state.rng.r#gen::<u128>() & (RANDOM_MASK >> 1)
        };
        state.last_ms = Some(time_ms);
        state.last_random = random;
        Ok(EntryId::from_parts(time_ms, random))
    }
}
