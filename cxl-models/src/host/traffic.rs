// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Generators of host request streams.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::transaction::{MemoryRequest, TransactionId};

/// Aligned accesses at random addresses within a window.
pub struct RandomAccesses {
    rng: StdRng,
    base: u64,
    num_slots: u64,
    access_bytes: usize,
    write_percent: u32,
    next_id: TransactionId,
    remaining: usize,
}

impl RandomAccesses {
    /// `count` accesses of `access_bytes` within `[base, base + window_bytes)`.
    /// `write_percent` of them are writes of random data.
    #[must_use]
    pub fn new(
        seed: u64,
        base: u64,
        window_bytes: u64,
        access_bytes: usize,
        write_percent: u32,
        count: usize,
    ) -> Self {
        let access_bytes = access_bytes.max(1);
        Self {
            rng: StdRng::seed_from_u64(seed),
            base,
            num_slots: (window_bytes / access_bytes as u64).max(1),
            access_bytes,
            write_percent: write_percent.min(100),
            next_id: 1,
            remaining: count,
        }
    }
}

impl Iterator for RandomAccesses {
    type Item = MemoryRequest;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let id = self.next_id;
        self.next_id += 1;
        let address = self.base + self.rng.gen_range(0..self.num_slots) * self.access_bytes as u64;
        if self.rng.gen_range(0..100) < self.write_percent {
            let mut data = vec![0; self.access_bytes];
            self.rng.fill(&mut data[..]);
            Some(MemoryRequest::write(id, address, data))
        } else {
            Some(MemoryRequest::read(id, address, self.access_bytes))
        }
    }
}

/// Accesses walking through memory with a fixed stride.
///
/// Writes fill each access with the low byte of its transaction id.
pub struct StridedAccesses {
    next_address: u64,
    stride: u64,
    access_bytes: usize,
    writes: bool,
    next_id: TransactionId,
    remaining: usize,
}

impl StridedAccesses {
    #[must_use]
    pub fn reads(base: u64, stride: u64, access_bytes: usize, count: usize) -> Self {
        Self {
            next_address: base,
            stride,
            access_bytes,
            writes: false,
            next_id: 1,
            remaining: count,
        }
    }

    #[must_use]
    pub fn writes(base: u64, stride: u64, access_bytes: usize, count: usize) -> Self {
        Self {
            writes: true,
            ..Self::reads(base, stride, access_bytes, count)
        }
    }

    /// Number transactions from `first_id`.
    #[must_use]
    pub fn starting_at_id(mut self, first_id: TransactionId) -> Self {
        self.next_id = first_id;
        self
    }
}

impl Iterator for StridedAccesses {
    type Item = MemoryRequest;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let id = self.next_id;
        let address = self.next_address;
        self.next_id += 1;
        self.next_address = self.next_address.wrapping_add(self.stride);
        if self.writes {
            Some(MemoryRequest::write(
                id,
                address,
                vec![id as u8; self.access_bytes],
            ))
        } else {
            Some(MemoryRequest::read(id, address, self.access_bytes))
        }
    }
}
