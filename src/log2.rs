// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Fixed-point base-2 logarithms
//!
//! These are not strict logarithms in that they become linear
//! around zero and can therefore represent both zero and negative values.
//! They carry 8 bits of fractional precision, which is enough
//! to store 32-bit magnitudes in 16 bits of block metadata
//! and to turn multiplicative updates into additions.

/// Number of significant bits in each byte value
const NBITS_TABLE: [u8; 256] = {
    let mut table = [0; 256];
    let mut i = 1;
    while i < 256 {
        table[i] = (u8::BITS - (i as u8).leading_zeros()) as u8;
        i += 1;
    }
    table
};

const LOG2_TABLE: [u8; 256] = [
    0x00, 0x01, 0x03, 0x04, 0x06, 0x07, 0x09, 0x0a, 0x0b, 0x0d, 0x0e, 0x10, 0x11, 0x12, 0x14, 0x15,
    0x16, 0x18, 0x19, 0x1a, 0x1c, 0x1d, 0x1e, 0x20, 0x21, 0x22, 0x24, 0x25, 0x26, 0x28, 0x29, 0x2a,
    0x2c, 0x2d, 0x2e, 0x2f, 0x31, 0x32, 0x33, 0x34, 0x36, 0x37, 0x38, 0x39, 0x3b, 0x3c, 0x3d, 0x3e,
    0x3f, 0x41, 0x42, 0x43, 0x44, 0x45, 0x47, 0x48, 0x49, 0x4a, 0x4b, 0x4d, 0x4e, 0x4f, 0x50, 0x51,
    0x52, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x5c, 0x5d, 0x5e, 0x5f, 0x60, 0x61, 0x62, 0x63,
    0x64, 0x66, 0x67, 0x68, 0x69, 0x6a, 0x6b, 0x6c, 0x6d, 0x6e, 0x6f, 0x70, 0x71, 0x72, 0x74, 0x75,
    0x76, 0x77, 0x78, 0x79, 0x7a, 0x7b, 0x7c, 0x7d, 0x7e, 0x7f, 0x80, 0x81, 0x82, 0x83, 0x84, 0x85,
    0x86, 0x87, 0x88, 0x89, 0x8a, 0x8b, 0x8c, 0x8d, 0x8e, 0x8f, 0x90, 0x91, 0x92, 0x93, 0x94, 0x95,
    0x96, 0x97, 0x98, 0x99, 0x9a, 0x9b, 0x9b, 0x9c, 0x9d, 0x9e, 0x9f, 0xa0, 0xa1, 0xa2, 0xa3, 0xa4,
    0xa5, 0xa6, 0xa7, 0xa8, 0xa9, 0xa9, 0xaa, 0xab, 0xac, 0xad, 0xae, 0xaf, 0xb0, 0xb1, 0xb2, 0xb2,
    0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xb9, 0xba, 0xbb, 0xbc, 0xbd, 0xbe, 0xbf, 0xc0, 0xc0,
    0xc1, 0xc2, 0xc3, 0xc4, 0xc5, 0xc6, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xcb, 0xcb, 0xcc, 0xcd, 0xce,
    0xcf, 0xd0, 0xd0, 0xd1, 0xd2, 0xd3, 0xd4, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd8, 0xd9, 0xda, 0xdb,
    0xdc, 0xdc, 0xdd, 0xde, 0xdf, 0xe0, 0xe0, 0xe1, 0xe2, 0xe3, 0xe4, 0xe4, 0xe5, 0xe6, 0xe7, 0xe7,
    0xe8, 0xe9, 0xea, 0xea, 0xeb, 0xec, 0xed, 0xee, 0xee, 0xef, 0xf0, 0xf1, 0xf1, 0xf2, 0xf3, 0xf4,
    0xf4, 0xf5, 0xf6, 0xf7, 0xf7, 0xf8, 0xf9, 0xf9, 0xfa, 0xfb, 0xfc, 0xfc, 0xfd, 0xfe, 0xff, 0xff,
];

const EXP2_TABLE: [u8; 256] = [
    0x00, 0x01, 0x01, 0x02, 0x03, 0x03, 0x04, 0x05, 0x06, 0x06, 0x07, 0x08, 0x08, 0x09, 0x0a, 0x0b,
    0x0b, 0x0c, 0x0d, 0x0e, 0x0e, 0x0f, 0x10, 0x10, 0x11, 0x12, 0x13, 0x13, 0x14, 0x15, 0x16, 0x16,
    0x17, 0x18, 0x19, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1d, 0x1e, 0x1f, 0x20, 0x20, 0x21, 0x22, 0x23,
    0x24, 0x24, 0x25, 0x26, 0x27, 0x28, 0x28, 0x29, 0x2a, 0x2b, 0x2c, 0x2c, 0x2d, 0x2e, 0x2f, 0x30,
    0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x3a, 0x3b, 0x3c, 0x3d,
    0x3e, 0x3f, 0x40, 0x41, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x48, 0x49, 0x4a, 0x4b,
    0x4c, 0x4d, 0x4e, 0x4f, 0x50, 0x51, 0x51, 0x52, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a,
    0x5b, 0x5c, 0x5d, 0x5e, 0x5e, 0x5f, 0x60, 0x61, 0x62, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69,
    0x6a, 0x6b, 0x6c, 0x6d, 0x6e, 0x6f, 0x70, 0x71, 0x72, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79,
    0x7a, 0x7b, 0x7c, 0x7d, 0x7e, 0x7f, 0x80, 0x81, 0x82, 0x83, 0x84, 0x85, 0x87, 0x88, 0x89, 0x8a,
    0x8b, 0x8c, 0x8d, 0x8e, 0x8f, 0x90, 0x91, 0x92, 0x93, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0x9b,
    0x9c, 0x9d, 0x9f, 0xa0, 0xa1, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa8, 0xa9, 0xaa, 0xab, 0xac, 0xad,
    0xaf, 0xb0, 0xb1, 0xb2, 0xb3, 0xb4, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xbc, 0xbd, 0xbe, 0xbf, 0xc0,
    0xc2, 0xc3, 0xc4, 0xc5, 0xc6, 0xc8, 0xc9, 0xca, 0xcb, 0xcd, 0xce, 0xcf, 0xd0, 0xd2, 0xd3, 0xd4,
    0xd6, 0xd7, 0xd8, 0xd9, 0xdb, 0xdc, 0xdd, 0xde, 0xe0, 0xe1, 0xe2, 0xe4, 0xe5, 0xe6, 0xe8, 0xe9,
    0xea, 0xec, 0xed, 0xee, 0xf0, 0xf1, 0xf2, 0xf4, 0xf5, 0xf6, 0xf8, 0xf9, 0xfa, 0xfc, 0xfd, 0xff,
];

/// Returns the number of significant bits in the given value
///
/// ```
/// use wavpack_encoder::log2::count_bits;
/// assert_eq!(count_bits(0), 0);
/// assert_eq!(count_bits(1), 1);
/// assert_eq!(count_bits(255), 8);
/// assert_eq!(count_bits(256), 9);
/// assert_eq!(count_bits(u32::MAX), 32);
/// ```
#[inline]
pub fn count_bits(av: u32) -> u32 {
    u32::from(if av < (1 << 8) {
        NBITS_TABLE[av as usize]
    } else if av < (1 << 16) {
        NBITS_TABLE[(av >> 8) as usize] + 8
    } else if av < (1 << 24) {
        NBITS_TABLE[(av >> 16) as usize] + 16
    } else {
        NBITS_TABLE[(av >> 24) as usize] + 24
    })
}

/// Returns the log2 of the given unsigned value
///
/// The result has 8 fractional bits.
/// A value of 0 yields 0.
pub fn mylog2(value: u32) -> i32 {
    // the pre-scale may carry into bit 32
    let avalue = u64::from(value) + u64::from(value >> 9);

    match u32::try_from(avalue) {
        Ok(avalue) if avalue < (1 << 8) => {
            let dbits = count_bits(avalue);
            ((dbits << 8) + u32::from(LOG2_TABLE[((avalue << (9 - dbits)) & 0xff) as usize]))
                as i32
        }
        Ok(avalue) => {
            let dbits = count_bits(avalue);
            ((dbits << 8) + u32::from(LOG2_TABLE[((avalue >> (dbits - 9)) & 0xff) as usize]))
                as i32
        }
        Err(_) => (33 << 8) + i32::from(LOG2_TABLE[((avalue >> (33 - 9)) & 0xff) as usize]),
    }
}

/// Returns the log2 of the given signed value
///
/// Negative values yield the negated log2 of their magnitude.
#[inline]
pub fn log2s(value: i32) -> i32 {
    if value < 0 {
        -mylog2(value.unsigned_abs())
    } else {
        mylog2(value as u32)
    }
}

/// Returns the integer represented by the given log2 value
///
/// The result is accurate to the log's 8 bits of precision.
/// Since the full 32 bits are returned, this also
/// inverts [`mylog2`] for unsigned values,
/// whose bit pattern can be recovered with an `as u32` cast.
pub fn exp2s(log: i32) -> i32 {
    if log < 0 {
        return exp2s(-log).wrapping_neg();
    }

    let value = u64::from(EXP2_TABLE[(log & 0xff) as usize]) | 0x100;

    match log >> 8 {
        shift @ 0..=9 => (value >> (9 - shift)) as i32,
        shift => (value << (shift - 9).min(32)) as u32 as i32,
    }
}

#[test]
fn test_log2_table_endpoints() {
    assert_eq!(mylog2(0), 0);
    assert_eq!(mylog2(1), 0x100);
    assert_eq!(mylog2(2), 0x200);
    assert_eq!(log2s(-1), -0x100);
    assert_eq!(exp2s(0), 0);
    assert_eq!(exp2s(0x100), 1);
    assert_eq!(exp2s(-0x100), -1);
}

#[test]
fn test_log2_roundtrip() {
    // 8 bits of precision means a relative error within 1 part in 225
    // apart from a handful of small values that are off by one
    for value in (0..1 << 20).step_by(97).chain([i32::MAX >> 1]) {
        let restored = exp2s(log2s(value));
        let error = (i64::from(restored) - i64::from(value)).abs();
        assert!(
            error <= 1 || error * 225 <= i64::from(value),
            "{value} restored as {restored}"
        );
        assert_eq!(exp2s(log2s(-value)), -restored);
    }
}

#[test]
fn test_log2_monotonic() {
    let mut last = 0;
    for value in 0..1 << 16 {
        let log = mylog2(value);
        assert!(log >= last);
        last = log;
    }

    // values whose rounding carries past 32 bits
    let mut last = mylog2(u32::MAX >> 1);
    assert!(last < 33 << 8);
    for value in (u32::MAX - 0x00ff_ffff..=u32::MAX).step_by(4099) {
        let log = mylog2(value);
        assert!(log >= last);
        last = log;
    }
    assert!(mylog2(u32::MAX) >= 33 << 8);
}
