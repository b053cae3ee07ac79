// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Sparse byte storage.

use std::collections::HashMap;

pub const LINE_BYTES: usize = 64;

type Line = [u8; LINE_BYTES];

/// Memory contents held as 64-byte lines, allocated on first write.
///
/// Bytes that have never been written read as zero.
#[derive(Default)]
pub struct BackingStore {
    lines: HashMap<u64, Line>,
}

fn line_of(address: u64) -> (u64, usize) {
    let line_bytes = LINE_BYTES as u64;
    (address / line_bytes, (address % line_bytes) as usize)
}

impl BackingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lines that have been written.
    #[must_use]
    pub fn num_lines(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn read(&self, address: u64, size: usize) -> Vec<u8> {
        (0..size as u64)
            .map(|i| {
                let (line, offset) = line_of(address + i);
                self.lines.get(&line).map_or(0, |data| data[offset])
            })
            .collect()
    }

    pub fn write(&mut self, address: u64, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.write_byte(address + i as u64, *byte);
        }
    }

    /// Write only the bytes whose bit is set in `byte_mask`.
    pub fn write_masked(&mut self, address: u64, data: &[u8], byte_mask: u64) {
        for (i, byte) in data.iter().enumerate().take(u64::BITS as usize) {
            if byte_mask & (1 << i) != 0 {
                self.write_byte(address + i as u64, *byte);
            }
        }
    }

    fn write_byte(&mut self, address: u64, byte: u8) {
        let (line, offset) = line_of(address);
        self.lines.entry(line).or_insert([0; LINE_BYTES])[offset] = byte;
    }
}
