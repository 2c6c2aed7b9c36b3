// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The adaptive entropy coder for decorrelated residuals
//!
//! Each residual's magnitude is located on a ladder
//! of three adaptive medians per channel.
//! The number of rungs climbed is sent as a run of 1 bits
//! and the position within the final rung as a truncated binary code.
//! Long runs of zero residuals collapse into a single count.
//!
//! In hybrid mode the position within the rung is only sent
//! to within an error limit, and whatever is needed to resolve
//! it exactly goes to the correction stream.

use crate::bitstream::BitPacker;
use crate::decorr::apply_weight;
use crate::log2::{count_bits, exp2s, log2s, mylog2};
use crate::metadata::{
    HYBRID_BALANCE, HYBRID_BITRATE, HYBRID_FLAG, HYBRID_SHAPE, JOINT_STEREO, MetadataId,
    MetadataItem, NEW_SHAPING, is_mono,
};

/// Most consecutive 1 bits sent before switching to an escape code
const LIMIT_ONES: u32 = 16;

/// Time constant of the slow level, as a shift
const SLS: u32 = 8;
const SLO: i32 = 1 << (SLS - 1);

/// Divisors controlling how fast each median adapts
const DIV: [u32; 3] = [128, 64, 32];

/// Bitrate below which a channel gets no extra allowance
const BITRATE_FLOOR: u32 = 568;

fn get_med(median: u32) -> u32 {
    (median >> 4) + 1
}

fn inc_med(median: &mut u32, div: u32) {
    *median = median.wrapping_add(((median.wrapping_add(div)) / div) * 5);
}

fn dec_med(median: &mut u32, div: u32) {
    *median -= ((median.wrapping_add(div - 2)) / div) * 2;
}

/// Builds the minimal-redundancy code of `code` within `0..=maxcode`
///
/// Returns the code's bits, least-significant first,
/// along with their count.
fn truncated_binary(code: u32, maxcode: u32) -> (u64, u32) {
    let bitcount = count_bits(maxcode);
    if bitcount == 0 {
        return (0, 0);
    }
    let extras = (1u64 << bitcount) - u64::from(maxcode) - 1;
    let code = u64::from(code);

    if code < extras {
        (code, bitcount - 1)
    } else {
        let code = code + extras;
        ((code >> 1) | ((code & 1) << (bitcount - 1)), bitcount)
    }
}

fn midpoint(low: u32, high: u32) -> u32 {
    ((u64::from(low) + u64::from(high) + 1) >> 1) as u32
}

/// A residual's place on the median ladder
struct Rung {
    ones: u32,
    low: u32,
    high: u32,
}

/// Entropy coder state shared by both channels of a stream
#[derive(Clone, Debug, Default)]
pub struct Words {
    flags: u32,
    bits: u32,
    median: [[u32; 2]; 3],
    slow_level: [i32; 2],
    bitrate_acc: [u32; 2],
    bitrate_delta: [i32; 2],
    error_limit: [i32; 2],
    pend_data: u64,
    pend_count: u32,
    holding_one: u32,
    holding_zero: bool,
    zeros_acc: u32,
}

impl Words {
    /// Builds fresh coder for a stream with the given header flags
    ///
    /// `bits` is the hybrid bitrate in bits per sample × 256,
    /// and is ignored for lossless streams.
    pub fn new(flags: u32, bits: u32) -> Self {
        let mut words = Self {
            flags,
            bits,
            ..Self::default()
        };
        if flags & HYBRID_FLAG != 0 {
            words.set_bitrate();
        }
        words
    }

    /// The current median for the given rung and channel
    #[inline]
    pub fn median(&self, rung: usize, channel: usize) -> u32 {
        self.median[rung][channel]
    }

    /// The current error limit for the given channel
    #[inline]
    pub fn error_limit(&self, channel: usize) -> i32 {
        self.error_limit[channel]
    }

    /// Resets bitrate accumulators from the target bitrate
    ///
    /// With balancing, channel 1's accumulator holds
    /// the balance between channels rather than a bitrate.
    pub fn set_bitrate(&mut self) {
        let (bitrate_0, bitrate_1) = if self.flags & HYBRID_BITRATE != 0 {
            let mut bitrate_0 = self.bits.saturating_sub(BITRATE_FLOOR);

            let bitrate_1 = if is_mono(self.flags) {
                0
            } else if self.flags & HYBRID_BALANCE != 0 {
                if self.flags & JOINT_STEREO != 0 { 256 } else { 0 }
            } else if self.flags & JOINT_STEREO != 0 {
                if bitrate_0 < 128 {
                    std::mem::replace(&mut bitrate_0, 0) * 2
                } else {
                    bitrate_0 -= 128;
                    bitrate_0 + 256
                }
            } else {
                bitrate_0
            };

            (bitrate_0, bitrate_1)
        } else {
            (0, 0)
        };

        self.bitrate_acc = [bitrate_0 << 16, bitrate_1 << 16];
    }

    /// Steps bitrate accumulators and recalculates
    /// each channel's error limit
    pub fn update_error_limit(&mut self) {
        fn limit(slow_log: i32, bitrate: i32) -> i32 {
            if slow_log - bitrate > -0x100 {
                exp2s(slow_log - bitrate + 0x100)
            } else {
                0
            }
        }

        self.bitrate_acc[0] = self.bitrate_acc[0].wrapping_add(self.bitrate_delta[0] as u32);
        let mut bitrate_0 = (self.bitrate_acc[0] >> 16) as i32;

        if is_mono(self.flags) {
            self.error_limit[0] = if self.flags & HYBRID_BITRATE != 0 {
                limit((self.slow_level[0] + SLO) >> SLS, bitrate_0)
            } else {
                exp2s(bitrate_0)
            };
        } else {
            self.bitrate_acc[1] = self.bitrate_acc[1].wrapping_add(self.bitrate_delta[1] as u32);
            let mut bitrate_1 = (self.bitrate_acc[1] >> 16) as i32;

            if self.flags & HYBRID_BITRATE != 0 {
                let slow_log_0 = (self.slow_level[0] + SLO) >> SLS;
                let slow_log_1 = (self.slow_level[1] + SLO) >> SLS;

                if self.flags & HYBRID_BALANCE != 0 {
                    let balance = (slow_log_1 - slow_log_0 + bitrate_1 + 1) >> 1;

                    if balance > bitrate_0 {
                        bitrate_1 = bitrate_0 * 2;
                        bitrate_0 = 0;
                    } else if -balance > bitrate_0 {
                        bitrate_0 *= 2;
                        bitrate_1 = 0;
                    } else {
                        bitrate_1 = bitrate_0 + balance;
                        bitrate_0 -= balance;
                    }
                }

                self.error_limit = [limit(slow_log_0, bitrate_0), limit(slow_log_1, bitrate_1)];
            } else {
                self.error_limit = [exp2s(bitrate_0), exp2s(bitrate_1)];
            }
        }
    }

    #[inline]
    fn decay_slow_level(&mut self, channel: usize) {
        if self.flags & HYBRID_BITRATE != 0 {
            self.slow_level[channel] -= (self.slow_level[channel] + SLO) >> SLS;
        }
    }

    /// Handles the zero-run state ahead of coding a value
    ///
    /// Returns `true` if the value was absorbed into a run of zeros.
    fn zero_run(&mut self, wv: &mut BitPacker, value: i32, channel: usize, hybrid: bool) -> bool {
        if (self.median[0][0] & !1) != 0 || self.holding_zero || (self.median[0][1] & !1) != 0 {
            return false;
        }

        if self.zeros_acc != 0 {
            if value != 0 {
                self.flush(wv);
                false
            } else {
                if hybrid {
                    self.decay_slow_level(channel);
                }
                self.zeros_acc += 1;
                true
            }
        } else if value != 0 {
            wv.put_bit(false);
            false
        } else {
            if hybrid {
                self.decay_slow_level(channel);
            }
            self.median = [[0; 2]; 3];
            self.zeros_acc = 1;
            true
        }
    }

    /// Locates a sign-folded value on the channel's median ladder,
    /// adapting each median it passes
    fn climb(&mut self, value: u32, channel: usize) -> Rung {
        let [med0, med1, med2] = &mut self.median;

        let step = get_med(med0[channel]);
        if value < step {
            dec_med(&mut med0[channel], DIV[0]);
            return Rung {
                ones: 0,
                low: 0,
                high: step - 1,
            };
        }
        let mut low = step;
        inc_med(&mut med0[channel], DIV[0]);

        let step = get_med(med1[channel]);
        if value - low < step {
            dec_med(&mut med1[channel], DIV[1]);
            return Rung {
                ones: 1,
                low,
                high: low + step - 1,
            };
        }
        low += step;
        inc_med(&mut med1[channel], DIV[1]);

        let step = get_med(med2[channel]);
        if value - low < step {
            dec_med(&mut med2[channel], DIV[2]);
            Rung {
                ones: 2,
                low,
                high: low + step - 1,
            }
        } else {
            let ones = 2 + (value - low) / step;
            low += (ones - 2) * step;
            inc_med(&mut med2[channel], DIV[2]);
            Rung {
                ones,
                low,
                high: low.wrapping_add(step - 1),
            }
        }
    }

    /// Queues the rung count behind any held zero
    fn hold(&mut self, wv: &mut BitPacker, mut ones: u32) {
        if self.holding_zero {
            if ones != 0 {
                self.holding_one += 1;
            }

            self.flush(wv);

            if ones != 0 {
                self.holding_zero = true;
                ones -= 1;
            } else {
                self.holding_zero = false;
            }
        } else {
            self.holding_zero = true;
        }

        self.holding_one = ones.wrapping_mul(2);
    }

    #[inline]
    fn pend(&mut self, (bits, count): (u64, u32)) {
        self.pend_data |= bits << self.pend_count;
        self.pend_count += count;
    }

    /// Codes a residual exactly
    pub fn send_word_lossless(&mut self, wv: &mut BitPacker, value: i32, channel: usize) {
        if self.zero_run(wv, value, channel, false) {
            return;
        }

        let sign = value < 0;
        let value = if sign { !value } else { value } as u32;

        let Rung { ones, low, high } = self.climb(value, channel);
        self.hold(wv, ones);

        if high != low {
            self.pend(truncated_binary(value - low, high - low));
        }

        self.pend((u64::from(sign), 1));

        if !self.holding_zero {
            self.flush(wv);
        }
    }

    /// Codes a residual to within the channel's error limit
    ///
    /// Anything needed to recover the exact residual
    /// is written to `wvc`, if present.
    /// Returns the value a decoder of the primary stream will see,
    /// which must be fed back into prediction.
    pub fn send_word(
        &mut self,
        wv: &mut BitPacker,
        wvc: Option<&mut BitPacker>,
        value: i32,
        channel: usize,
    ) -> i32 {
        if self.zero_run(wv, value, channel, true) {
            return 0;
        }

        let sign = value < 0;
        let value = if sign { !value } else { value } as u32;

        if self.flags & HYBRID_FLAG != 0 && channel == 0 {
            self.update_error_limit();
        }

        let Rung {
            ones,
            mut low,
            mut high,
        } = self.climb(value, channel);
        self.hold(wv, ones);

        let error_limit = self.error_limit[channel];
        let mid = if error_limit == 0 {
            if high != low {
                self.pend(truncated_binary(value - low, high - low));
            }
            value
        } else {
            let mut mid = midpoint(low, high);
            while high - low > error_limit as u32 {
                if value < mid {
                    high = mid - 1;
                    self.pend((0, 1));
                } else {
                    low = mid;
                    self.pend((1, 1));
                }
                mid = midpoint(low, high);
            }
            mid
        };

        self.pend((u64::from(sign), 1));

        if !self.holding_zero {
            self.flush(wv);
        }

        if let Some(wvc) = wvc {
            if error_limit != 0 {
                let (bits, count) = truncated_binary(value - low, high - low);
                wvc.put_bits(bits, count);
            }
        }

        if self.flags & HYBRID_BITRATE != 0 {
            self.decay_slow_level(channel);
            self.slow_level[channel] += mylog2(mid);
        }

        if sign { !(mid as i32) } else { mid as i32 }
    }

    /// Writes out everything held back by the coder
    pub fn flush(&mut self, wv: &mut BitPacker) {
        if self.zeros_acc != 0 {
            let cbits = count_bits(self.zeros_acc);
            wv.put_unary(cbits);
            wv.put_bits(self.zeros_acc.into(), cbits - 1);
            self.zeros_acc = 0;
        }

        if self.holding_one != 0 {
            if self.holding_one >= LIMIT_ONES {
                wv.put_unary(LIMIT_ONES);
                self.holding_one -= LIMIT_ONES;
                let cbits = count_bits(self.holding_one);
                wv.put_unary(cbits);
                if cbits > 1 {
                    wv.put_bits(self.holding_one.into(), cbits - 1);
                }
                self.holding_zero = false;
            } else {
                wv.put_bits((1 << self.holding_one) - 1, self.holding_one);
            }

            self.holding_one = 0;
        }

        if self.holding_zero {
            wv.put_bit(false);
            self.holding_zero = false;
        }

        if self.pend_count != 0 {
            wv.put_bits(self.pend_data, self.pend_count);
            self.pend_data = 0;
            self.pend_count = 0;
        }
    }

    /// Builds the entropy variables sub-chunk
    ///
    /// Medians are stored as log2 values and read back in place.
    pub fn write_entropy_vars(&mut self) -> MetadataItem {
        let channels = if is_mono(self.flags) { 1 } else { 2 };
        let mut data = Vec::with_capacity(channels * 6);

        for channel in 0..channels {
            for rung in self.median.iter_mut() {
                let temp = mylog2(rung[channel]);
                rung[channel] = exp2s(temp) as u32;
                data.extend((temp as u16).to_le_bytes());
            }
        }

        MetadataItem::new(MetadataId::EntropyVars, data)
    }

    /// Builds the hybrid profile sub-chunk
    ///
    /// The bitrate accumulators are reset from the target bitrate
    /// beforehand, and every stored value is read back in place.
    pub fn write_hybrid_profile(&mut self) -> MetadataItem {
        self.set_bitrate();

        let channels = if is_mono(self.flags) { 1 } else { 2 };
        let mut data = Vec::with_capacity(channels * 6);

        if self.flags & HYBRID_BITRATE != 0 {
            for slow_level in &mut self.slow_level[0..channels] {
                let temp = log2s(*slow_level);
                *slow_level = exp2s(temp);
                data.extend((temp as i16).to_le_bytes());
            }
        }

        for acc in &mut self.bitrate_acc[0..channels] {
            let temp = (*acc >> 16) as u16;
            *acc = u32::from(temp) << 16;
            data.extend(temp.to_le_bytes());
        }

        if (self.bitrate_delta[0] | self.bitrate_delta[1]) != 0 {
            for delta in &mut self.bitrate_delta[0..channels] {
                let temp = log2s(*delta);
                *delta = exp2s(temp);
                data.extend((temp as i16).to_le_bytes());
            }
        }

        MetadataItem::new(MetadataId::HybridProfile, data)
    }
}

/// Feedback of quantization error in hybrid mode
///
/// The error of each channel's previous sample is weighted
/// and added to the next sample before decorrelation,
/// tilting the spectrum of the hybrid stream's noise.
#[derive(Clone, Debug, Default)]
pub struct NoiseShaping {
    flags: u32,
    acc: [i32; 2],
    delta: [i32; 2],
    error: [i32; 2],
}

impl NoiseShaping {
    /// Lowest shaping weight used
    pub const MIN_WEIGHT: i32 = -1000;

    /// Builds shaping state for a stream with the given header flags
    ///
    /// `weight` is scaled by 1024 and only matters
    /// if the stream's flags enable shaping.
    pub fn new(flags: u32, weight: i32) -> Self {
        let acc = if flags & HYBRID_SHAPE != 0 {
            weight.max(Self::MIN_WEIGHT) << 16
        } else {
            0
        };

        Self {
            flags,
            acc: [acc; 2],
            ..Self::default()
        }
    }

    /// Whether shaping is applied at all
    #[inline]
    pub fn enabled(&self) -> bool {
        self.flags & HYBRID_SHAPE != 0
    }

    /// The current shaping weight for the given channel
    #[inline]
    pub fn weight(&self, channel: usize) -> i32 {
        self.acc[channel] >> 16
    }

    /// Applies the channel's error feedback to a sample
    pub fn shape(&mut self, channel: usize, sample: i32) -> i32 {
        if !self.enabled() {
            return sample;
        }

        self.acc[channel] = self.acc[channel].wrapping_add(self.delta[channel]);
        let weight = self.acc[channel] >> 16;
        let mut temp = apply_weight(weight, self.error[channel]).wrapping_neg();

        if self.flags & NEW_SHAPING != 0 && weight < 0 && temp != 0 {
            if temp == self.error[channel] {
                temp += if temp < 0 { 1 } else { -1 };
            }
            self.error[channel] = sample.wrapping_neg();
            sample.wrapping_add(temp)
        } else {
            let shaped = sample.wrapping_add(temp);
            self.error[channel] = shaped.wrapping_neg();
            shaped
        }
    }

    /// Accumulates the channel's reconstructed sample into its error
    #[inline]
    pub fn feedback(&mut self, channel: usize, reconstructed: i32) {
        self.error[channel] = self.error[channel].wrapping_add(reconstructed);
    }

    /// Builds the shaping sub-chunk carried by correction blocks
    ///
    /// Every stored value is read back in place.
    pub fn write_info(&mut self, stereo: bool) -> MetadataItem {
        fn store(data: &mut Vec<u8>, value: &mut i32) {
            let temp = log2s(*value);
            *value = exp2s(temp);
            data.extend((temp as i16).to_le_bytes());
        }

        let channels = if stereo { 2 } else { 1 };
        let mut data = Vec::with_capacity(channels * 6);

        for channel in 0..channels {
            store(&mut data, &mut self.error[channel]);
            store(&mut data, &mut self.acc[channel]);
        }

        if (self.delta[0] | self.delta[1]) != 0 {
            for delta in &mut self.delta[0..channels] {
                store(&mut data, delta);
            }
        }

        MetadataItem::new(MetadataId::ShapingWeights, data)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::metadata::MONO_FLAG;
    use bitstream_io::{BitRead, BitReader, LittleEndian};

    #[test]
    fn test_median_monotonic() {
        for div in DIV {
            let mut median = 0;
            for _ in 0..200 {
                let last = median;
                inc_med(&mut median, div);
                assert!(median > last);
            }

            while median > 1 {
                let last = median;
                dec_med(&mut median, div);
                assert!(median < last);
                assert!(get_med(median) >= 1);
            }

            let last = median;
            dec_med(&mut median, div);
            assert_eq!(median, last);
        }
    }

    #[test]
    fn test_zero_run() {
        let mut wv = BitPacker::new(64);
        let mut words = Words::new(MONO_FLAG, 0);

        for _ in 0..1000 {
            words.send_word_lossless(&mut wv, 0, 0);
        }
        words.send_word_lossless(&mut wv, 5, 0);
        words.flush(&mut wv);

        let bytes = wv.close().unwrap();
        assert_eq!(bytes.len(), 4);

        let mut r = BitReader::endian(bytes.as_slice(), LittleEndian);
        let cbits = r.read_unary::<0>().unwrap();
        assert_eq!(cbits, 10);
        let zeros = (1 << (cbits - 1)) | r.read_var::<u32>(cbits - 1).unwrap();
        assert_eq!(zeros, 1000);

        // 5 climbs past every rung of the collapsed medians
        assert_eq!(r.read_unary::<0>().unwrap(), 10);
        assert!(!r.read_bit().unwrap());
    }

    #[test]
    fn test_truncated_binary_bijection() {
        fn decode(r: &mut BitReader<&[u8], LittleEndian>, maxcode: u32) -> u64 {
            let bitcount = count_bits(maxcode);
            let extras = (1u64 << bitcount) - u64::from(maxcode) - 1;
            let v = match bitcount {
                0 | 1 => 0,
                bitcount => r.read_var::<u64>(bitcount - 1).unwrap(),
            };
            if v < extras {
                v
            } else {
                (v * 2 + u64::from(r.read_bit().unwrap())) - extras
            }
        }

        let mut rng = fastrand::Rng::with_seed(0xc0de);

        for bitcount in 1..=32u32 {
            let top = (1u64 << bitcount) - 1;
            let bottom = 1u64 << (bitcount - 1);
            let maxcodes = [bottom, top, rng.u64(bottom..=top)];

            for maxcode in maxcodes.map(|m| m as u32) {
                let codes: Vec<u32> = if maxcode <= 300 {
                    (0..=maxcode).collect()
                } else {
                    let extras = ((1u64 << bitcount) - u64::from(maxcode) - 1) as u32;
                    [0, 1, extras.saturating_sub(1), extras, maxcode - 1, maxcode]
                        .into_iter()
                        .chain(std::iter::repeat_with(|| rng.u32(0..=maxcode)).take(50))
                        .filter(|c| *c <= maxcode)
                        .collect()
                };

                let mut wv = BitPacker::new(1 << 12);
                for code in &codes {
                    let (bits, count) = truncated_binary(*code, maxcode);
                    assert!(count == bitcount || count + 1 == bitcount);
                    wv.put_bits(bits, count);
                }
                let bytes = wv.close().unwrap();

                let mut r = BitReader::endian(bytes.as_slice(), LittleEndian);
                for code in codes {
                    assert_eq!(decode(&mut r, maxcode), u64::from(code), "{maxcode}");
                }
            }
        }

        assert_eq!(truncated_binary(0, 0), (0, 0));
    }

    fn hybrid_residuals(error_limit_log: Option<i32>) -> Vec<(i32, i32)> {
        let mut rng = fastrand::Rng::with_seed(100);
        let mut wv = BitPacker::new(1 << 16);
        let mut words = Words::new(HYBRID_FLAG | MONO_FLAG, 0);
        if let Some(log) = error_limit_log {
            words.bitrate_acc[0] = (log as u32) << 16;
        }

        (0..1000)
            .map(|_| {
                let value = rng.i32(-5000..5000);
                (value, words.send_word(&mut wv, None, value, 0))
            })
            .collect()
    }

    #[test]
    fn test_error_limit() {
        assert!(hybrid_residuals(None).iter().all(|(v, sent)| v == sent));

        let limited = hybrid_residuals(Some(mylog2(100)));
        assert!(limited.iter().any(|(v, sent)| v != sent));
        assert!(limited.iter().all(|(v, sent)| (v - sent).abs() <= 100));
    }

    #[test]
    fn test_correction_leaves_primary_alone() {
        let values = [3000, -2000, 1500, 0, 4000, -4000, 2500, 7];

        let encode = |mut wvc: Option<&mut BitPacker>| -> (Vec<u8>, Vec<i32>) {
            let mut wv = BitPacker::new(1 << 16);
            let mut words = Words::new(HYBRID_FLAG | MONO_FLAG, 0);
            words.median = [[4000 << 4; 2]; 3];
            words.bitrate_acc[0] = (mylog2(100) as u32) << 16;

            let sent = values
                .iter()
                .map(|v| words.send_word(&mut wv, wvc.as_deref_mut(), *v, 0))
                .collect::<Vec<_>>();
            words.flush(&mut wv);
            (wv.close().unwrap(), sent)
        };

        let mut wvc = BitPacker::new(1 << 16);
        assert_eq!(encode(Some(&mut wvc)), encode(None));
        // every quantized value leaves a few bits of correction
        assert!(wvc.bytes_written() >= values.len() * 5 / 8);
    }

    #[test]
    fn test_set_bitrate() {
        let acc = |flags| {
            let words = Words::new(HYBRID_FLAG | HYBRID_BITRATE | flags, 1024);
            words.bitrate_acc.map(|a| a >> 16)
        };

        assert_eq!(acc(MONO_FLAG), [456, 0]);
        assert_eq!(acc(HYBRID_BALANCE | JOINT_STEREO), [456, 256]);
        assert_eq!(acc(HYBRID_BALANCE), [456, 0]);
        assert_eq!(acc(JOINT_STEREO), [328, 584]);
        assert_eq!(acc(0), [456, 456]);

        let words = Words::new(HYBRID_FLAG | HYBRID_BITRATE | JOINT_STEREO, 600);
        assert_eq!(words.bitrate_acc.map(|a| a >> 16), [0, 64]);
    }

    #[test]
    fn test_balanced_error_limits() {
        let mut words = Words::new(
            HYBRID_FLAG | HYBRID_BITRATE | HYBRID_BALANCE | JOINT_STEREO,
            1024,
        );
        words.slow_level = [mylog2(4000) << SLS, mylog2(4000) << SLS];
        words.update_error_limit();
        // the side channel is given the larger share of the budget
        assert!(words.error_limit(0) > words.error_limit(1));
        assert!(words.error_limit(1) > 0);
    }

    #[test]
    fn test_hybrid_profile() {
        let mut words = Words::new(HYBRID_FLAG | HYBRID_BITRATE | MONO_FLAG, 1024);
        words.slow_level[0] = 123_456;
        let item = words.write_hybrid_profile();
        assert_eq!(item.data.len(), 4);
        assert_eq!(&item.data[2..4], &456u16.to_le_bytes());
        assert_eq!(words.slow_level[0], exp2s(log2s(123_456)));
    }

    #[test]
    fn test_noise_shaping() {
        let mut off = NoiseShaping::new(0, 500);
        assert_eq!(off.shape(0, 100), 100);

        let mut shaping = NoiseShaping::new(HYBRID_SHAPE, 512);
        assert_eq!(shaping.weight(0), 512);
        assert_eq!(shaping.shape(0, 100), 100);
        shaping.feedback(0, 104);
        // the previous sample's error of 4 is half subtracted
        assert_eq!(shaping.shape(0, 100), 98);

        let shaping = NoiseShaping::new(HYBRID_SHAPE, -1024);
        assert_eq!(shaping.weight(1), NoiseShaping::MIN_WEIGHT);
    }
}
