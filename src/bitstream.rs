// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A bounded, LSB-first bit writer for block payloads

use crate::Error;
use bitstream_io::{BitWrite, BitWriter, LittleEndian};

/// Writes bits least-significant first into a bounded byte buffer
///
/// Once the number of whole bytes written reaches the capacity,
/// the packer is flagged as overflowed and discards
/// all further writes.  The flag is sticky,
/// so an overflowed payload can never be closed successfully.
///
/// Callers are expected to consult [`BitPacker::remaining`]
/// before writing anything that cannot be rolled back.
pub struct BitPacker {
    writer: BitWriter<Vec<u8>, LittleEndian>,
    bits: u64,
    capacity: usize,
    overflow: bool,
}

impl BitPacker {
    /// Opens a packer with room for the given number of bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            writer: BitWriter::endian(Vec::with_capacity(capacity.min(1 << 20)), LittleEndian),
            bits: 0,
            capacity,
            overflow: capacity == 0,
        }
    }

    /// Number of whole bytes written so far
    #[inline]
    pub fn bytes_written(&self) -> usize {
        (self.bits / 8) as usize
    }

    /// Approximate number of bytes left before overflow
    ///
    /// Returns `None` once the packer has overflowed.
    #[inline]
    pub fn remaining(&self) -> Option<usize> {
        (!self.overflow).then(|| self.capacity - self.bytes_written())
    }

    /// Whether the packer has run out of room
    #[inline]
    pub fn overflowed(&self) -> bool {
        self.overflow
    }

    fn wrote(&mut self, result: std::io::Result<()>, bits: u32) {
        match result {
            Ok(()) => {
                self.bits += u64::from(bits);
                if self.bytes_written() >= self.capacity {
                    self.overflow = true;
                }
            }
            Err(_) => {
                self.overflow = true;
            }
        }
    }

    /// Writes a single bit
    pub fn put_bit(&mut self, bit: bool) {
        if !self.overflow {
            let result = self.writer.write_bit(bit);
            self.wrote(result, 1);
        }
    }

    /// Writes the lowest `count` bits of `value`, least-significant first
    ///
    /// Any bits of `value` above `count` are ignored.
    pub fn put_bits(&mut self, value: u64, count: u32) {
        if !self.overflow && count > 0 {
            let value = match count {
                64.. => value,
                count => value & ((1 << count) - 1),
            };
            let result = self.writer.write_var(count.min(64), value);
            self.wrote(result, count.min(64));
        }
    }

    /// Writes `ones` 1 bits followed by a single 0 bit
    pub fn put_unary(&mut self, ones: u32) {
        if !self.overflow {
            let result = self.writer.write_unary::<0>(ones);
            self.wrote(result, ones + 1);
        }
    }

    /// Pads the payload with 1 bits to an even number of bytes
    /// and returns those bytes
    ///
    /// # Errors
    ///
    /// Returns [`Error::BitstreamOverflow`] if the packer
    /// ran out of room at any point.
    pub fn close(mut self) -> Result<Vec<u8>, Error> {
        if self.overflow {
            return Err(Error::BitstreamOverflow);
        }

        while self.bits % 8 != 0 || self.bytes_written() % 2 != 0 {
            self.put_bit(true);
        }

        match self.overflow {
            false if self.writer.byte_aligned() => Ok(self.writer.into_writer()),
            _ => Err(Error::BitstreamOverflow),
        }
    }
}
