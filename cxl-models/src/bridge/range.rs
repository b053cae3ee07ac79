// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The region of host physical address space mapped onto the CXL device.

use std::fmt;

use crate::bridge::config::ConfigError;

/// The half-open interval `[base, base + size)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressRange {
    base: u64,
    size: u64,
}

impl AddressRange {
    pub fn new(base: u64, size: u64) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::EmptyRange);
        }
        if base.checked_add(size).is_none() {
            return Err(ConfigError::RangeOverflow { base, size });
        }
        Ok(Self { base, size })
    }

    #[must_use]
    pub fn base(&self) -> u64 {
        self.base
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// First address past the end of the range.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.base + self.size
    }

    #[must_use]
    pub fn accepts(&self, address: u64) -> bool {
        address >= self.base && address - self.base < self.size
    }

    /// True if every byte of the `size` byte access at `address` is in range.
    #[must_use]
    pub fn contains(&self, address: u64, size: usize) -> bool {
        self.accepts(address) && (size as u64) <= self.size - (address - self.base)
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.base, self.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds() {
        let range = AddressRange::new(0x1000, 0x100).unwrap();
        assert!(!range.accepts(0xfff));
        assert!(range.accepts(0x1000));
        assert!(range.accepts(0x10ff));
        assert!(!range.accepts(0x1100));
    }

    #[test]
    fn accesses_must_not_straddle_the_end() {
        let range = AddressRange::new(0x1000, 0x100).unwrap();
        assert!(range.contains(0x10c0, 64));
        assert!(!range.contains(0x10c1, 64));
        assert!(!range.contains(0xfc0, 64));
    }

    #[test]
    fn construction_errors() {
        assert_eq!(AddressRange::new(0, 0), Err(ConfigError::EmptyRange));
        assert_eq!(
            AddressRange::new(u64::MAX, 2),
            Err(ConfigError::RangeOverflow {
                base: u64::MAX,
                size: 2
            })
        );
    }
}
