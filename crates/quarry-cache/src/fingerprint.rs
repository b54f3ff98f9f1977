use std::fmt;
use std::hash::Hasher;

use twox_hash::XxHash64;

/// A deterministic key for one cacheable unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub fn builder() -> FingerprintBuilder {
        FingerprintBuilder {
            hasher: XxHash64::with_seed(0),
        }
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

pub struct FingerprintBuilder {
    hasher: XxHash64,
}

impl FingerprintBuilder {
    pub fn with_str(mut self, part: &str) -> Self {
        self.hasher.write(part.as_bytes());
        // separator so that ("ab", "c") and ("a", "bc") differ
        self.hasher.write_u8(0xff);
        self
    }

    pub fn with_u64(mut self, part: u64) -> Self {
        self.hasher.write_u64(part);
        self
    }

    pub fn with_option_u64(self, part: Option<u64>) -> Self {
        match part {
            Some(v) => self.with_u64(1).with_u64(v),
            None => self.with_u64(0),
        }
    }

    pub fn build(self) -> Fingerprint {
        Fingerprint(self.hasher.finish())
    }
}
