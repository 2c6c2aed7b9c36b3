// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Little-endian PCM bytes
//!
//! Samples are stored in 1 to 3 bytes.
//! As with WAVE files, 8-bit samples are unsigned
//! and centered on 128, while wider samples are signed.

use crate::Error;
use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, LittleEndian};

/// Bytes needed to store samples of the given bits-per-sample
#[inline]
pub fn bytes_per_sample(bits_per_sample: u32) -> usize {
    bits_per_sample.div_ceil(8) as usize
}

/// Converts whole samples from `bytes`, appending them to `samples`
///
/// Returns the number of bytes consumed,
/// leaving any incomplete trailing sample untouched.
///
/// # Errors
///
/// Returns [`Error::InvalidBitsPerSample`] if `bytes_per_sample`
/// is not 1 to 3.
pub fn bytes_to_samples(
    bytes: &[u8],
    bytes_per_sample: usize,
    samples: &mut Vec<i32>,
) -> Result<usize, Error> {
    if !(1..=3).contains(&bytes_per_sample) {
        return Err(Error::InvalidBitsPerSample);
    }

    let count = bytes.len() / bytes_per_sample;
    let mut r = BitReader::endian(bytes, LittleEndian);
    samples.reserve(count);

    for _ in 0..count {
        samples.push(match bytes_per_sample {
            1 => i32::from(r.read::<8, u8>()?) - 128,
            2 => r.read::<16, i32>()?,
            _ => r.read::<24, i32>()?,
        });
    }

    Ok(count * bytes_per_sample)
}

/// Converts samples to bytes, appending them to `buf`
///
/// # Errors
///
/// Returns [`Error::InvalidBitsPerSample`] if `bytes_per_sample`
/// is not 1 to 3, or an I/O error if a sample
/// does not fit in that many bytes.
pub fn samples_to_bytes(
    samples: &[i32],
    bytes_per_sample: usize,
    buf: &mut Vec<u8>,
) -> Result<(), Error> {
    buf.reserve(samples.len() * bytes_per_sample);
    let mut w = BitWriter::endian(buf, LittleEndian);

    match bytes_per_sample {
        1 => samples
            .iter()
            .try_for_each(|s| w.write::<8, u32>(s.wrapping_add(128) as u32))?,
        2 => samples.iter().try_for_each(|s| w.write::<16, i32>(*s))?,
        3 => samples.iter().try_for_each(|s| w.write::<24, i32>(*s))?,
        _ => return Err(Error::InvalidBitsPerSample),
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bytes_per_sample() {
        assert_eq!(bytes_per_sample(1), 1);
        assert_eq!(bytes_per_sample(8), 1);
        assert_eq!(bytes_per_sample(9), 2);
        assert_eq!(bytes_per_sample(20), 3);
        assert_eq!(bytes_per_sample(24), 3);
    }

    #[test]
    fn test_unsigned_8bit() {
        let mut samples = vec![];
        bytes_to_samples(&[0, 128, 255], 1, &mut samples).unwrap();
        assert_eq!(samples, [-128, 0, 127]);

        let mut buf = vec![];
        samples_to_bytes(&samples, 1, &mut buf).unwrap();
        assert_eq!(buf, [0, 128, 255]);

        assert!(samples_to_bytes(&[128], 1, &mut vec![]).is_err());
    }

    #[test]
    fn test_signed_samples() {
        let samples16 = (i16::MIN..=i16::MAX).map(i32::from).collect::<Vec<_>>();
        let mut buf = vec![];
        samples_to_bytes(&samples16, 2, &mut buf).unwrap();
        assert_eq!(
            buf,
            samples16
                .iter()
                .flat_map(|s| (*s as i16).to_le_bytes())
                .collect::<Vec<_>>()
        );
        let mut samples = vec![];
        assert_eq!(bytes_to_samples(&buf, 2, &mut samples).unwrap(), buf.len());
        assert_eq!(samples, samples16);

        let samples24 = ((-1 << 23)..(1 << 23))
            .step_by(97)
            .chain([(1 << 23) - 1])
            .collect::<Vec<i32>>();
        let mut buf = vec![];
        samples_to_bytes(&samples24, 3, &mut buf).unwrap();
        // the low 3 bytes of a 32-bit two's complement sample
        assert_eq!(
            buf,
            samples24
                .iter()
                .flat_map(|s| s.to_le_bytes().into_iter().take(3))
                .collect::<Vec<_>>()
        );
        let mut samples = vec![];
        bytes_to_samples(&buf, 3, &mut samples).unwrap();
        assert_eq!(samples, samples24);

        assert!(samples_to_bytes(&[1 << 23], 3, &mut vec![]).is_err());
    }

    #[test]
    fn test_partial_sample() {
        let mut samples = vec![];
        assert_eq!(bytes_to_samples(&[1, 0, 2, 0, 3], 2, &mut samples).unwrap(), 4);
        assert_eq!(samples, [1, 2]);
    }

    #[test]
    fn test_invalid_width() {
        assert!(matches!(
            bytes_to_samples(&[0; 8], 4, &mut vec![]),
            Err(Error::InvalidBitsPerSample)
        ));
        assert!(matches!(
            samples_to_bytes(&[0], 0, &mut vec![]),
            Err(Error::InvalidBitsPerSample)
        ));
    }
}
