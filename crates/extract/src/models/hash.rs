use std::fmt;
use std::str::FromStr;

use crate::error::{Error, ErrorKind};

/// Width of a perceptual hash in bytes.
pub const HASH_BYTES: usize = 16;

/// Fixed-width perceptual fingerprint of an image.
///
/// Ordering is bytewise, which is also how SQLite orders the stored `BLOB`,
/// so a hash doubles as a pagination cursor over duplicate groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PerceptualHash([u8; HASH_BYTES]);

impl PerceptualHash {
    pub const MIN: Self = Self([0x00; HASH_BYTES]);
    pub const MAX: Self = Self([0xff; HASH_BYTES]);

    pub const fn new(bytes: [u8; HASH_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// How far through the hash space this hash lies, from `0.0` to `1.0`.
    ///
    /// Only meant for progress reporting while paging through duplicates.
    pub fn progress(&self) -> f64 {
        u128::from_be_bytes(self.0) as f64 / u128::MAX as f64
    }
}

impl TryFrom<&[u8]> for PerceptualHash {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array = <[u8; HASH_BYTES]>::try_from(bytes).map_err(|_| ErrorKind::InvalidHash(bytes.len()))?;
        Ok(Self(array))
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|byte| write!(f, "{byte:02x}"))
    }
}

impl FromStr for PerceptualHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != HASH_BYTES * 2 || !s.is_ascii() {
            exn::bail!(ErrorKind::InvalidHash(s.len() / 2));
        }
        let mut bytes = [0u8; HASH_BYTES];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| ErrorKind::InvalidData(format!("not a hexadecimal hash: {s}")))?;
        }
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bounds() {
        assert_eq!(PerceptualHash::MIN.progress(), 0.0);
        assert_eq!(PerceptualHash::MAX.progress(), 1.0);
        let mut half = [0u8; HASH_BYTES];
        half[0] = 0x80;
        assert!((PerceptualHash::new(half).progress() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_ordering_is_bytewise() {
        let mut low = [0u8; HASH_BYTES];
        let mut high = [0u8; HASH_BYTES];
        low[HASH_BYTES - 1] = 0xff;
        high[0] = 0x01;
        assert!(PerceptualHash::new(low) < PerceptualHash::new(high));
    }

    #[test]
    fn test_hex() {
        let hash: PerceptualHash = "000102030405060708090a0b0c0d0eff".parse().unwrap();
        assert_eq!(hash.as_bytes()[15], 0xff);
        assert_eq!(hash.to_string(), "000102030405060708090a0b0c0d0eff");
        assert!("0001".parse::<PerceptualHash>().is_err());
        assert!("zz0102030405060708090a0b0c0d0eff".parse::<PerceptualHash>().is_err());
    }

    #[test]
    fn test_wrong_width_is_rejected() {
        let err = PerceptualHash::try_from([0u8; 8].as_slice()).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidHash(8));
    }
}
