//! Leading-zero-bit difficulty checks.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::digest::{DIGEST_LEN, Digest};
use crate::error::ConfigurationError;

/// Number of bits in a digest; no difficulty above this can ever be met.
pub const DIGEST_BITS: u32 = (DIGEST_LEN * 8) as u32;

/// Required number of leading zero bits, validated against the digest width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Difficulty(u32);

impl Difficulty {
    pub const ZERO: Difficulty = Difficulty(0);

    pub fn new(bits: u32) -> Result<Self, ConfigurationError> {
        if bits > DIGEST_BITS {
            return Err(ConfigurationError::DifficultyTooLarge {
                bits: bits as u64,
                max: DIGEST_BITS,
            });
        }
        Ok(Self(bits))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    /// Last nonce of the search space `[1, 2^d]`.
    ///
    /// Nonces are `u64`, so for `d >= 64` the space is clamped to `u64::MAX`.
    pub fn space_end(self) -> u64 {
        if self.0 >= u64::BITS {
            u64::MAX
        } else {
            1u64 << self.0
        }
    }
}

impl TryFrom<i64> for Difficulty {
    type Error = ConfigurationError;

    fn try_from(bits: i64) -> Result<Self, Self::Error> {
        if bits < 0 {
            return Err(ConfigurationError::NegativeDifficulty(bits));
        }
        let bits = u32::try_from(bits).map_err(|_| ConfigurationError::DifficultyTooLarge {
            bits: bits as u64,
            max: DIGEST_BITS,
        })?;
        Self::new(bits)
    }
}

impl From<Difficulty> for u32 {
    fn from(d: Difficulty) -> u32 {
        d.0
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bits", self.0)
    }
}

/// Count leading zero bits of a big-endian byte string.
pub fn leading_zero_bits(bytes: &[u8]) -> u32 {
    let mut zeros = 0;
    for &b in bytes {
        if b != 0 {
            return zeros + b.leading_zeros();
        }
        zeros += 8;
    }
    zeros
}

/// True iff the first `difficulty` bits of `digest` are all zero.
pub fn satisfies(digest: &Digest, difficulty: Difficulty) -> bool {
    let bits = difficulty.bits() as usize;
    let full = bits / 8;
    if digest[..full].iter().any(|&b| b != 0) {
        return false;
    }
    let rem = bits % 8;
    rem == 0 || digest[full].leading_zeros() as usize >= rem
}
