// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The chain of adaptive decorrelation passes
//!
//! Each pass is a tiny adaptive predictor
//! whose weighted prediction is subtracted from the sample
//! before it moves on to the next pass.
//! A pass's `term` selects its topology:
//!
//! | Term    | Prediction
//! |---------|-----------
//! | 1 to 8  | sample from `term` samples ago
//! | 17      | `2 * s₀ - s₁`
//! | 18      | `(3 * s₀ - s₁) >> 1`
//! | -1      | channel A's previous sample predicts B, and vice versa
//! | -2      | as -1 with the channels swapped
//! | -3      | both channels predicted from each other's previous sample
//!
//! Negative terms are only used in stereo streams.

use crate::log2::{exp2s, log2s};
use crate::metadata::{MetadataId, MetadataItem};
use arrayvec::ArrayVec;

/// Longest sample delay a pass may use
pub const MAX_TERM: usize = 8;

/// Most passes a stream may use
pub const MAX_NTERMS: usize = 16;

/// The adaptation step of every pass
pub const DELTA: i32 = 2;

/// Terms for very high quality mode
pub const VERY_HIGH_TERMS: &[i32] = &[18, 18, 2, 3, -2, 18, 2, 4, 7, 5, 3, 6, 8, -1, 18, 2];

/// Terms for high quality mode
pub const HIGH_TERMS: &[i32] = &[18, 18, 18, -2, 2, 3, 5, -1, 17, 4];

/// Terms for normal quality mode
pub const DEFAULT_TERMS: &[i32] = &[18, 18, 2, 17, 3];

/// Terms for fast mode
pub const FAST_TERMS: &[i32] = &[18, 17];

/// Applies a fixed-point weight to a sample
///
/// `weight` is scaled by 1024 and the sample is split
/// at bit 16 so the multiplication cannot overflow
/// 32-bit arithmetic for any weight in ±1024.
/// The result is rounded half up.
#[inline]
pub fn apply_weight(weight: i32, sample: i32) -> i32 {
    (((sample & 0xffff).wrapping_mul(weight) >> 9)
        .wrapping_add(((sample & !0xffff) >> 9).wrapping_mul(weight))
        .wrapping_add(1))
        >> 1
}

/// Moves weight one `delta` step toward agreement between
/// `source` and `result`
///
/// The weight is left alone if either value is zero.
#[inline]
pub fn update_weight(weight: i32, delta: i32, source: i32, result: i32) -> i32 {
    if source != 0 && result != 0 {
        weight + ((((source ^ result) >> 30) | 1) * delta)
    } else {
        weight
    }
}

/// Like [`update_weight`] but clips the result to ±1024
///
/// Used by the cross-channel passes.
#[inline]
pub fn update_weight_clip(weight: i32, delta: i32, source: i32, result: i32) -> i32 {
    if source != 0 && result != 0 {
        if (source ^ result) < 0 {
            (weight - delta).max(-1024)
        } else {
            (weight + delta).min(1024)
        }
    } else {
        weight
    }
}

/// Converts weight to the signed byte stored in block metadata
#[inline]
pub fn store_weight(weight: i32) -> i8 {
    let weight = weight.clamp(-1024, 1024);
    let weight = if weight > 0 {
        weight - ((weight + 64) >> 7)
    } else {
        weight
    };
    ((weight + 4) >> 3) as i8
}

/// Converts a stored byte back into a weight
#[inline]
pub fn restore_weight(weight: i8) -> i32 {
    match i32::from(weight) << 3 {
        result @ 1.. => result + ((result + 64) >> 7),
        result => result,
    }
}

#[inline]
fn extrapolate(term: i32, s0: i32, s1: i32) -> i32 {
    if term & 1 != 0 {
        s0.wrapping_mul(2).wrapping_sub(s1)
    } else {
        s0.wrapping_mul(3).wrapping_sub(s1) >> 1
    }
}

/// A single decorrelation pass
#[derive(Clone, Debug, Default)]
pub struct DecorrPass {
    term: i32,
    delta: i32,
    weight_a: i32,
    weight_b: i32,
    samples_a: [i32; MAX_TERM],
    samples_b: [i32; MAX_TERM],
    aweight_a: i32,
    aweight_b: i32,
}

impl DecorrPass {
    /// Builds fresh pass for the given term
    pub fn new(term: i32) -> Self {
        Self {
            term,
            delta: DELTA,
            ..Self::default()
        }
    }

    /// The pass's term
    #[inline]
    pub fn term(&self) -> i32 {
        self.term
    }

    /// The pass's weights for channels A and B
    #[inline]
    pub fn weights(&self) -> (i32, i32) {
        (self.weight_a, self.weight_b)
    }

    #[inline]
    fn is_delay(&self) -> bool {
        (1..=MAX_TERM as i32).contains(&self.term)
    }
}

/// An ordered chain of decorrelation passes
/// with a shared history cursor
#[derive(Clone, Debug)]
pub struct Decorrelator {
    passes: ArrayVec<DecorrPass, MAX_NTERMS>,
    stereo: bool,
    m: usize,
}

impl Decorrelator {
    /// Builds chain from a term table
    ///
    /// Negative terms become -3 in stereo streams
    /// without cross-channel decorrelation
    /// and are dropped entirely from mono streams.
    pub fn new(terms: &[i32], stereo: bool, cross_decorr: bool) -> Self {
        Self {
            passes: terms
                .iter()
                .filter_map(|&term| match term {
                    0.. => Some(term),
                    _ if !stereo => None,
                    _ if cross_decorr => Some(term),
                    _ => Some(-3),
                })
                .take(MAX_NTERMS)
                .map(DecorrPass::new)
                .collect(),
            stereo,
            m: 0,
        }
    }

    /// The chain's passes, in application order
    #[inline]
    pub fn passes(&self) -> &[DecorrPass] {
        &self.passes
    }

    #[inline]
    fn advance(&mut self) {
        self.m = (self.m + 1) & (MAX_TERM - 1);
    }

    /// Removes redundancy from a mono sample, returning its residual
    pub fn decorrelate_mono(&mut self, sample: i32) -> i32 {
        let m = self.m;
        let mut code = sample;

        for dpp in self.passes.iter_mut() {
            let sam = if dpp.term > MAX_TERM as i32 {
                let sam = extrapolate(dpp.term, dpp.samples_a[0], dpp.samples_a[1]);
                dpp.samples_a[1] = dpp.samples_a[0];
                dpp.samples_a[0] = code;
                sam
            } else {
                let sam = dpp.samples_a[m];
                dpp.samples_a[(m + dpp.term as usize) & (MAX_TERM - 1)] = code;
                sam
            };

            code = code.wrapping_sub(apply_weight(dpp.weight_a, sam));
            dpp.weight_a = update_weight(dpp.weight_a, dpp.delta, sam, code);
        }

        self.advance();
        code
    }

    /// Removes redundancy from a stereo sample pair,
    /// returning their residuals
    pub fn decorrelate_stereo(&mut self, mut left: i32, mut right: i32) -> (i32, i32) {
        let m = self.m;

        for dpp in self.passes.iter_mut() {
            if dpp.term > 0 {
                let (sam_a, sam_b) = if dpp.term > MAX_TERM as i32 {
                    let sam_a = extrapolate(dpp.term, dpp.samples_a[0], dpp.samples_a[1]);
                    let sam_b = extrapolate(dpp.term, dpp.samples_b[0], dpp.samples_b[1]);
                    dpp.samples_a[1] = dpp.samples_a[0];
                    dpp.samples_b[1] = dpp.samples_b[0];
                    dpp.samples_a[0] = left;
                    dpp.samples_b[0] = right;
                    (sam_a, sam_b)
                } else {
                    let k = (m + dpp.term as usize) & (MAX_TERM - 1);
                    let sams = (dpp.samples_a[m], dpp.samples_b[m]);
                    dpp.samples_a[k] = left;
                    dpp.samples_b[k] = right;
                    sams
                };

                left = left.wrapping_sub(apply_weight(dpp.weight_a, sam_a));
                right = right.wrapping_sub(apply_weight(dpp.weight_b, sam_b));
                dpp.weight_a = update_weight(dpp.weight_a, dpp.delta, sam_a, left);
                dpp.weight_b = update_weight(dpp.weight_b, dpp.delta, sam_b, right);
            } else {
                let sam_a = match dpp.term {
                    -2 => right,
                    _ => dpp.samples_a[0],
                };
                let sam_b = match dpp.term {
                    -1 => left,
                    _ => dpp.samples_b[0],
                };

                dpp.samples_a[0] = right;
                dpp.samples_b[0] = left;
                left = left.wrapping_sub(apply_weight(dpp.weight_a, sam_a));
                right = right.wrapping_sub(apply_weight(dpp.weight_b, sam_b));
                dpp.weight_a = update_weight_clip(dpp.weight_a, dpp.delta, sam_a, left);
                dpp.weight_b = update_weight_clip(dpp.weight_b, dpp.delta, sam_b, right);
            }
        }

        self.advance();
        (left, right)
    }

    /// Subtracts every pass's prediction from a mono sample
    /// without adapting
    ///
    /// Must be followed by [`Decorrelator::reconstruct_mono`]
    /// once the residual has been quantized.
    pub fn predict_mono(&mut self, mut code: i32) -> i32 {
        let m = self.m;

        for dpp in self.passes.iter_mut() {
            let sam = if dpp.term > MAX_TERM as i32 {
                dpp.samples_a[2] = extrapolate(dpp.term, dpp.samples_a[0], dpp.samples_a[1]);
                dpp.samples_a[2]
            } else {
                dpp.samples_a[m]
            };

            dpp.aweight_a = apply_weight(dpp.weight_a, sam);
            code = code.wrapping_sub(dpp.aweight_a);
        }

        code
    }

    /// Adds predictions back onto a quantized mono residual
    /// in reverse pass order, adapting each pass,
    /// and returns the reconstructed sample
    pub fn reconstruct_mono(&mut self, mut code: i32) -> i32 {
        let m = self.m;

        for dpp in self.passes.iter_mut().rev() {
            if dpp.term > MAX_TERM as i32 {
                dpp.weight_a = update_weight(dpp.weight_a, dpp.delta, dpp.samples_a[2], code);
                dpp.samples_a[1] = dpp.samples_a[0];
                code = code.wrapping_add(dpp.aweight_a);
                dpp.samples_a[0] = code;
            } else {
                dpp.weight_a = update_weight(dpp.weight_a, dpp.delta, dpp.samples_a[m], code);
                code = code.wrapping_add(dpp.aweight_a);
                dpp.samples_a[(m + dpp.term as usize) & (MAX_TERM - 1)] = code;
            }
        }

        self.advance();
        code
    }

    /// Subtracts every pass's prediction from a stereo pair
    /// without adapting
    ///
    /// Must be followed by [`Decorrelator::reconstruct_stereo`]
    /// once the residuals have been quantized.
    pub fn predict_stereo(&mut self, mut left: i32, mut right: i32) -> (i32, i32) {
        let m = self.m;

        for dpp in self.passes.iter_mut() {
            let (sam_a, sam_b) = if dpp.term > MAX_TERM as i32 {
                dpp.samples_a[2] = extrapolate(dpp.term, dpp.samples_a[0], dpp.samples_a[1]);
                dpp.samples_b[2] = extrapolate(dpp.term, dpp.samples_b[0], dpp.samples_b[1]);
                (dpp.samples_a[2], dpp.samples_b[2])
            } else if dpp.term > 0 {
                (dpp.samples_a[m], dpp.samples_b[m])
            } else {
                match dpp.term {
                    -1 => dpp.samples_b[0] = left,
                    -2 => dpp.samples_a[0] = right,
                    _ => { /* -3 uses both histories as-is */ }
                }
                (dpp.samples_a[0], dpp.samples_b[0])
            };

            dpp.aweight_a = apply_weight(dpp.weight_a, sam_a);
            left = left.wrapping_sub(dpp.aweight_a);
            dpp.aweight_b = apply_weight(dpp.weight_b, sam_b);
            right = right.wrapping_sub(dpp.aweight_b);
        }

        (left, right)
    }

    /// Adds predictions back onto a quantized stereo pair
    /// in reverse pass order, adapting each pass,
    /// and returns the reconstructed pair
    pub fn reconstruct_stereo(&mut self, mut left: i32, mut right: i32) -> (i32, i32) {
        let m = self.m;

        for dpp in self.passes.iter_mut().rev() {
            if dpp.term > MAX_TERM as i32 {
                dpp.weight_a = update_weight(dpp.weight_a, dpp.delta, dpp.samples_a[2], left);
                dpp.weight_b = update_weight(dpp.weight_b, dpp.delta, dpp.samples_b[2], right);
                dpp.samples_a[1] = dpp.samples_a[0];
                dpp.samples_b[1] = dpp.samples_b[0];
                left = left.wrapping_add(dpp.aweight_a);
                dpp.samples_a[0] = left;
                right = right.wrapping_add(dpp.aweight_b);
                dpp.samples_b[0] = right;
            } else if dpp.term > 0 {
                let k = (m + dpp.term as usize) & (MAX_TERM - 1);

                dpp.weight_a = update_weight(dpp.weight_a, dpp.delta, dpp.samples_a[m], left);
                left = left.wrapping_add(dpp.aweight_a);
                dpp.samples_a[k] = left;

                dpp.weight_b = update_weight(dpp.weight_b, dpp.delta, dpp.samples_b[m], right);
                right = right.wrapping_add(dpp.aweight_b);
                dpp.samples_b[k] = right;
            } else {
                // the opposite channel's reconstructed value
                // replaces the one it was predicted from
                match dpp.term {
                    -1 => {
                        dpp.samples_b[0] = left.wrapping_add(dpp.aweight_a);
                        dpp.aweight_b = apply_weight(dpp.weight_b, dpp.samples_b[0]);
                    }
                    -2 => {
                        dpp.samples_a[0] = right.wrapping_add(dpp.aweight_b);
                        dpp.aweight_a = apply_weight(dpp.weight_a, dpp.samples_a[0]);
                    }
                    _ => {}
                }

                dpp.weight_a = update_weight_clip(dpp.weight_a, dpp.delta, dpp.samples_a[0], left);
                dpp.weight_b =
                    update_weight_clip(dpp.weight_b, dpp.delta, dpp.samples_b[0], right);
                left = left.wrapping_add(dpp.aweight_a);
                dpp.samples_b[0] = left;
                right = right.wrapping_add(dpp.aweight_b);
                dpp.samples_a[0] = right;
            }
        }

        self.advance();
        (left, right)
    }

    /// Rotates every delay pass's history so the cursor is back at 0
    ///
    /// Stored sample history is always zero-based.
    pub fn realign(&mut self) {
        if self.m != 0 {
            for dpp in self.passes.iter_mut().filter(|dpp| dpp.is_delay()) {
                dpp.samples_a.rotate_left(self.m);
                dpp.samples_b.rotate_left(self.m);
            }
            self.m = 0;
        }
    }

    /// Builds the decorrelation terms sub-chunk
    ///
    /// Each pass's term and delta are packed into a single byte.
    pub fn write_terms(&self) -> MetadataItem {
        MetadataItem::new(
            MetadataId::DecorrTerms,
            self.passes
                .iter()
                .map(|dpp| (((dpp.term + 5) & 0x1f) | ((dpp.delta << 5) & 0xe0)) as u8)
                .collect(),
        )
    }

    /// Builds the decorrelation weights sub-chunk
    ///
    /// Weights are quantized to signed bytes and the quantized
    /// values replace the running weights, so that a decoder
    /// starts from exactly the same state.
    /// Trailing passes whose stored weights are all zero are omitted
    /// and have their weights reset.
    pub fn write_weights(&mut self) -> MetadataItem {
        let stereo = self.stereo;
        let stored = self
            .passes
            .iter()
            .rposition(|dpp| {
                store_weight(dpp.weight_a) != 0 || (stereo && store_weight(dpp.weight_b) != 0)
            })
            .map(|i| i + 1)
            .unwrap_or(0);

        let mut data = Vec::with_capacity(stored * 2);

        for (i, dpp) in self.passes.iter_mut().enumerate() {
            if i < stored {
                let a = store_weight(dpp.weight_a);
                dpp.weight_a = restore_weight(a);
                data.push(a as u8);

                if stereo {
                    let b = store_weight(dpp.weight_b);
                    dpp.weight_b = restore_weight(b);
                    data.push(b as u8);
                }
            } else {
                dpp.weight_a = 0;
                dpp.weight_b = 0;
            }
        }

        MetadataItem::new(MetadataId::DecorrWeights, data)
    }

    /// Builds the decorrelation samples sub-chunk
    ///
    /// Only the first pass's history is stored, as log2 values,
    /// and read back in place to match what a decoder will see.
    /// The history of every later pass is cleared.
    pub fn write_samples(&mut self) -> MetadataItem {
        fn store(data: &mut Vec<u8>, sample: &mut i32) {
            let temp = log2s(*sample);
            *sample = exp2s(temp);
            data.extend((temp as i16).to_le_bytes());
        }

        let stereo = self.stereo;
        let mut data = Vec::new();
        let mut passes = self.passes.iter_mut();

        if let Some(dpp) = passes.next() {
            if dpp.term > MAX_TERM as i32 {
                store(&mut data, &mut dpp.samples_a[0]);
                store(&mut data, &mut dpp.samples_a[1]);
                if stereo {
                    store(&mut data, &mut dpp.samples_b[0]);
                    store(&mut data, &mut dpp.samples_b[1]);
                }
            } else if dpp.term < 0 {
                store(&mut data, &mut dpp.samples_a[0]);
                store(&mut data, &mut dpp.samples_b[0]);
            } else {
                for m in 0..dpp.term as usize {
                    store(&mut data, &mut dpp.samples_a[m]);
                    if stereo {
                        store(&mut data, &mut dpp.samples_b[m]);
                    }
                }
            }
        }

        for dpp in passes {
            dpp.samples_a = [0; MAX_TERM];
            dpp.samples_b = [0; MAX_TERM];
        }

        MetadataItem::new(MetadataId::DecorrSamples, data)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn reference_weight(weight: i32, sample: i32) -> i32 {
        let weight = i64::from(weight);
        let sample = i64::from(sample);
        (((((sample & 0xffff) * weight) >> 9) + (((sample & !0xffff) >> 9) * weight) + 1) >> 1)
            as i32
    }

    #[test]
    fn test_apply_weight_boundaries() {
        let samples = [
            0,
            1,
            -1,
            0xffff,
            0x10000,
            0x10001,
            -0xffff,
            -0x10000,
            -0x10001,
            0x7fffff,
            -0x800000,
            0x3ffffff,
            -0x4000000,
        ];

        for weight in [-1024, -1023, -1, 0, 1, 512, 1023, 1024] {
            for sample in samples {
                assert_eq!(
                    apply_weight(weight, sample),
                    reference_weight(weight, sample),
                    "weight {weight}, sample {sample}"
                );
            }
        }

        assert_eq!(apply_weight(1024, 1000), 1000);
        assert_eq!(apply_weight(-1024, 1000), -1000);
        assert_eq!(apply_weight(512, 1001), 501);
        assert_eq!(apply_weight(0, 0x7fffff), 0);
    }

    #[test]
    fn test_weight_updates() {
        assert_eq!(update_weight(0, 2, 5, 7), 2);
        assert_eq!(update_weight(0, 2, 5, -7), -2);
        assert_eq!(update_weight(0, 2, -5, -7), 2);
        assert_eq!(update_weight(10, 2, 0, -7), 10);
        assert_eq!(update_weight(10, 2, 5, 0), 10);
        // only the clipping variant respects the weight range
        assert_eq!(update_weight(1024, 2, 5, 7), 1026);
        assert_eq!(update_weight_clip(1024, 2, 5, 7), 1024);
        assert_eq!(update_weight_clip(-1023, 2, 5, -7), -1024);
        assert_eq!(update_weight_clip(0, 2, 0, -7), 0);
    }

    #[test]
    fn test_stored_weights() {
        assert_eq!(store_weight(0), 0);
        assert_eq!(store_weight(1024), 127);
        assert_eq!(store_weight(2000), 127);
        assert_eq!(store_weight(-1024), -128);
        assert_eq!(restore_weight(127), 1024);
        assert_eq!(restore_weight(-128), -1024);

        // storing is idempotent once restored
        for weight in -1024..=1024 {
            let restored = restore_weight(store_weight(weight));
            assert!((restored - weight).abs() <= 8, "{weight}");
            assert_eq!(restore_weight(store_weight(restored)), restored);
        }
    }

    #[test]
    fn test_term_selection() {
        let terms = |d: &Decorrelator| d.passes().iter().map(|p| p.term()).collect::<Vec<_>>();

        assert_eq!(
            terms(&Decorrelator::new(HIGH_TERMS, true, true)),
            HIGH_TERMS
        );
        assert_eq!(
            terms(&Decorrelator::new(HIGH_TERMS, true, false)),
            [18, 18, 18, -3, 2, 3, 5, -3, 17, 4]
        );
        assert_eq!(
            terms(&Decorrelator::new(HIGH_TERMS, false, false)),
            [18, 18, 18, 2, 3, 5, 17, 4]
        );
        assert_eq!(
            Decorrelator::new(VERY_HIGH_TERMS, true, true).passes().len(),
            MAX_NTERMS
        );
    }

    #[test]
    fn test_terms_metadata() {
        let d = Decorrelator::new(&[18, 17, 3, -1, -2, -3], true, true);
        assert_eq!(
            d.write_terms().data,
            [0x57, 0x56, 0x48, 0x44, 0x43, 0x42]
        );
    }

    #[test]
    fn test_hybrid_matches_lossless() {
        // with no quantization, split prediction and adaptation
        // must track the single-step lossless path exactly
        let mut rng = fastrand::Rng::with_seed(0x5eed);

        for (terms, stereo) in [
            (VERY_HIGH_TERMS, true),
            (HIGH_TERMS, true),
            (DEFAULT_TERMS, false),
            (VERY_HIGH_TERMS, false),
        ] {
            let mut lossless = Decorrelator::new(terms, stereo, true);
            let mut hybrid = lossless.clone();

            for i in 0..2000 {
                let left = ((i as f64 / 9.0).sin() * 20000.0) as i32 + rng.i32(-300..300);
                let right = left / 2 + rng.i32(-300..300);

                if stereo {
                    let residual = lossless.decorrelate_stereo(left, right);
                    let (l, r) = hybrid.predict_stereo(left, right);
                    assert_eq!((l, r), residual);
                    assert_eq!(hybrid.reconstruct_stereo(l, r), (left, right));
                } else {
                    let residual = lossless.decorrelate_mono(left);
                    let code = hybrid.predict_mono(left);
                    assert_eq!(code, residual);
                    assert_eq!(hybrid.reconstruct_mono(code), left);
                }
            }

            for (a, b) in lossless.passes().iter().zip(hybrid.passes()) {
                assert_eq!(a.weights(), b.weights());
            }
        }
    }

    #[test]
    fn test_realign() {
        let mut d = Decorrelator::new(&[1, 3], false, false);
        let mut shadow = Decorrelator::new(&[1, 3], false, false);

        for sample in [5, -3, 8, 100, -42] {
            d.decorrelate_mono(sample);
            shadow.decorrelate_mono(sample);
        }
        d.realign();

        // realigned history predicts identically from here on
        for sample in [7, 7, -9, 300, 12, 0, -1, 4, 4, 4] {
            assert_eq!(d.decorrelate_mono(sample), shadow.decorrelate_mono(sample));
        }
    }

    #[test]
    fn test_weights_metadata_trims_zeros() {
        let mut d = Decorrelator::new(&[18, 17, 2], true, true);
        d.passes[0].weight_a = 100;
        d.passes[1].weight_b = -3;
        d.passes[2].weight_a = 3;

        let item = d.write_weights();
        // -3 and 3 both store as zero, so pass 1 and 2 are trimmed
        assert_eq!(item.data, [store_weight(100) as u8, 0]);
        assert_eq!(d.passes[0].weights(), (restore_weight(store_weight(100)), 0));
        assert_eq!(d.passes[1].weights(), (0, 0));
        assert_eq!(d.passes[2].weights(), (0, 0));
    }

    #[test]
    fn test_samples_metadata() {
        let mut d = Decorrelator::new(&[2, 18], false, false);
        d.passes[0].samples_a = [1000, -1000, 0, 0, 0, 0, 0, 7];
        d.passes[1].samples_a[0] = 55;

        let item = d.write_samples();
        assert_eq!(item.data.len(), 4);
        assert_eq!(&item.data[0..2], &(log2s(1000) as i16).to_le_bytes());
        assert_eq!(d.passes[0].samples_a[0], exp2s(log2s(1000)));
        assert_eq!(d.passes[0].samples_a[1], exp2s(log2s(-1000)));
        // history beyond the term is untouched, later passes cleared
        assert_eq!(d.passes[0].samples_a[7], 7);
        assert_eq!(d.passes[1].samples_a, [0; MAX_TERM]);
    }
}
