// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Encoder options and the stream parameters derived from them

use crate::Error;
use crate::decorr::{DEFAULT_TERMS, FAST_TERMS, HIGH_TERMS, VERY_HIGH_TERMS};
use crate::metadata::{
    CROSS_DECORR, FINAL_BLOCK, HYBRID_BALANCE, HYBRID_BITRATE, HYBRID_FLAG, HYBRID_SHAPE,
    INITIAL_BLOCK, JOINT_STEREO, MONO_FLAG, NEW_SHAPING, SHIFT_LSB, SRATE_LSB, SRATE_MASK,
};
use std::num::NonZero;

/// Hybrid mode requested
pub const CONFIG_HYBRID_FLAG: u32 = 0x8;
/// Joint stereo requested
pub const CONFIG_JOINT_STEREO: u32 = 0x10;
/// Noise shaping requested
pub const CONFIG_HYBRID_SHAPE: u32 = 0x40;
/// Fast mode
pub const CONFIG_FAST_FLAG: u32 = 0x200;
/// High quality mode
pub const CONFIG_HIGH_FLAG: u32 = 0x800;
/// Very high quality mode
pub const CONFIG_VERY_HIGH_FLAG: u32 = 0x1000;
/// Noise shaping chosen automatically
pub const CONFIG_AUTO_SHAPING: u32 = 0x4000;
/// Noise shaping set explicitly
pub const CONFIG_SHAPE_OVERRIDE: u32 = 0x8000;
/// Joint stereo set explicitly
pub const CONFIG_JOINT_OVERRIDE: u32 = 0x10000;
/// Correction stream created
pub const CONFIG_CREATE_WVC: u32 = 0x80000;
/// Hybrid stream optimized for its correction stream
pub const CONFIG_OPTIMIZE_WVC: u32 = 0x100000;
/// MD5 sum of the original audio stored
pub const CONFIG_MD5_CHECKSUM: u32 = 0x8000000;

/// Sample rates with a header index of their own
///
/// Any other rate is indexed as 15
/// and stored in a metadata sub-chunk.
pub const SAMPLE_RATES: [u32; 15] = [
    6000, 8000, 9600, 11025, 12000, 16000, 22050, 24000, 32000, 44100, 48000, 64000, 88200, 96000,
    192000,
];

/// The smallest block buffer accepted
pub const MIN_BUFFER_SIZE: usize = 512;

/// Speed and compression trade-off
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Quality {
    /// Fewest decorrelation passes
    Fast,
    /// The default
    #[default]
    Normal,
    /// More passes and longer blocks
    High,
    /// The most passes
    VeryHigh,
}

impl Quality {
    /// The decorrelation term table for this quality
    pub fn terms(&self) -> &'static [i32] {
        match self {
            Self::Fast => FAST_TERMS,
            Self::Normal => DEFAULT_TERMS,
            Self::High => HIGH_TERMS,
            Self::VeryHigh => VERY_HIGH_TERMS,
        }
    }

    fn config_flags(&self) -> u32 {
        match self {
            Self::Fast => CONFIG_FAST_FLAG,
            Self::Normal => 0,
            Self::High => CONFIG_HIGH_FLAG,
            Self::VeryHigh => CONFIG_HIGH_FLAG | CONFIG_VERY_HIGH_FLAG,
        }
    }

    fn is_high(&self) -> bool {
        matches!(self, Self::High | Self::VeryHigh)
    }
}

/// WavPack encoding options
#[derive(Clone, Debug)]
pub struct EncodingOptions {
    quality: Quality,
    bitrate: Option<u32>,
    optimize_correction: bool,
    joint_stereo: Option<bool>,
    shaping_weight: Option<i32>,
    balance: bool,
    block_samples: Option<NonZero<u32>>,
    buffer_size: usize,
    md5: bool,
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self {
            quality: Quality::default(),
            bitrate: None,
            optimize_correction: false,
            joint_stereo: None,
            shaping_weight: None,
            balance: true,
            block_samples: None,
            buffer_size: 65536,
            md5: false,
        }
    }
}

impl EncodingOptions {
    /// Lowest hybrid bitrate, in bits per sample × 256
    pub const MIN_BITRATE: u32 = 512;

    /// Highest hybrid bitrate, in bits per sample × 256
    pub const MAX_BITRATE: u32 = 4096;

    /// Assigns compression quality
    pub fn quality(self, quality: Quality) -> Self {
        Self { quality, ..self }
    }

    /// Enables hybrid mode at the given bitrate
    ///
    /// `bitrate` is in bits per sample × 256,
    /// so 2.0 to 16.0 bits per sample is 512 to 4096.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBitrate`] if out of range.
    pub fn hybrid(self, bitrate: u32) -> Result<Self, Error> {
        (Self::MIN_BITRATE..=Self::MAX_BITRATE)
            .contains(&bitrate)
            .then_some(Self {
                bitrate: Some(bitrate),
                ..self
            })
            .ok_or(Error::InvalidBitrate)
    }

    /// Whether to favor the correction stream's size
    /// over the hybrid stream's quality
    pub fn optimize_correction(self, optimize_correction: bool) -> Self {
        Self {
            optimize_correction,
            ..self
        }
    }

    /// Overrides whether stereo streams use mid/side coding
    pub fn joint_stereo(self, joint_stereo: bool) -> Self {
        Self {
            joint_stereo: Some(joint_stereo),
            ..self
        }
    }

    /// Overrides the hybrid noise shaping weight
    ///
    /// `weight` is scaled by 1024 so -1.0 to 1.0 is -1024 to 1024.
    /// A weight of 0 disables shaping.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShapingWeight`] if out of range.
    pub fn noise_shaping(self, weight: i32) -> Result<Self, Error> {
        (-1024..=1024)
            .contains(&weight)
            .then_some(Self {
                shaping_weight: Some(weight),
                ..self
            })
            .ok_or(Error::InvalidShapingWeight)
    }

    /// Whether hybrid stereo streams shift bitrate
    /// between channels as their levels differ
    pub fn balance(self, balance: bool) -> Self {
        Self { balance, ..self }
    }

    /// Fixes the number of PCM frames per block
    pub fn block_samples(self, block_samples: NonZero<u32>) -> Self {
        Self {
            block_samples: Some(block_samples),
            ..self
        }
    }

    /// Bounds the size of each encoded block
    ///
    /// Blocks which fill their buffer are ended early.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBufferSize`] if smaller
    /// than [`MIN_BUFFER_SIZE`].
    pub fn buffer_size(self, buffer_size: usize) -> Result<Self, Error> {
        (buffer_size >= MIN_BUFFER_SIZE)
            .then_some(Self {
                buffer_size,
                ..self
            })
            .ok_or(Error::InvalidBufferSize)
    }

    /// Whether to store an MD5 sum of the original audio
    pub fn md5(self, md5: bool) -> Self {
        Self { md5, ..self }
    }

    /// Whether hybrid mode is enabled
    #[inline]
    pub fn is_hybrid(&self) -> bool {
        self.bitrate.is_some()
    }

    /// Whether an MD5 sum is requested
    #[inline]
    pub fn has_md5(&self) -> bool {
        self.md5
    }

    /// The configuration word as requested,
    /// before any automatic choices are made
    pub fn config_flags(&self, correction: bool) -> u32 {
        let mut config = self.quality.config_flags();

        if self.bitrate.is_some() {
            config |= CONFIG_HYBRID_FLAG;
        }

        match self.shaping_weight {
            Some(0) => config |= CONFIG_SHAPE_OVERRIDE,
            Some(_) => config |= CONFIG_SHAPE_OVERRIDE | CONFIG_HYBRID_SHAPE,
            None => {}
        }

        match self.joint_stereo {
            Some(false) => config |= CONFIG_JOINT_OVERRIDE,
            Some(true) => config |= CONFIG_JOINT_OVERRIDE | CONFIG_JOINT_STEREO,
            None => {}
        }

        if correction {
            config |= CONFIG_CREATE_WVC;
        }
        if self.optimize_correction {
            config |= CONFIG_OPTIMIZE_WVC;
        }
        if self.md5 {
            config |= CONFIG_MD5_CHECKSUM;
        }

        config
    }

    /// PCM frames per block for the given stream
    ///
    /// Unless fixed, this is half a second of audio
    /// (a whole second in high quality modes or at odd sample rates)
    /// scaled by powers of 2 until a block holds
    /// between 40,000 and 150,000 samples across all channels.
    pub fn block_length(&self, sample_rate: u32, channels: u32) -> u32 {
        match self.block_samples {
            Some(block_samples) => block_samples.get(),
            None => {
                let mut block_samples = if self.quality.is_high() || sample_rate % 2 != 0 {
                    sample_rate
                } else {
                    sample_rate / 2
                }
                .max(1);

                while block_samples * channels > 150000 {
                    block_samples /= 2;
                }

                while block_samples * channels < 40000 {
                    block_samples *= 2;
                }

                block_samples
            }
        }
    }

    /// Derives every stream parameter from the options
    /// and the stream's format
    ///
    /// # Errors
    ///
    /// Returns an error if the format is unsupported,
    /// or if a correction stream or hybrid-only option
    /// is requested for a lossless stream.
    pub fn stream_config(
        &self,
        sample_rate: u32,
        bits_per_sample: u32,
        channels: NonZero<u8>,
        correction: bool,
    ) -> Result<StreamConfig, Error> {
        if channels.get() > 2 {
            return Err(Error::ExcessiveChannels);
        }
        if !(1..=24).contains(&bits_per_sample) {
            return Err(Error::InvalidBitsPerSample);
        }
        if !(1..1 << 24).contains(&sample_rate) {
            return Err(Error::InvalidSampleRate);
        }
        if self.bitrate.is_none()
            && (correction || self.shaping_weight.is_some() || self.optimize_correction)
        {
            return Err(Error::HybridOnly);
        }

        let bytes_per_sample = bits_per_sample.div_ceil(8);
        let mut config_flags = self.config_flags(correction);

        let mut flags = (bytes_per_sample - 1)
            | ((bytes_per_sample * 8 - bits_per_sample) << SHIFT_LSB)
            | match SAMPLE_RATES.iter().position(|r| *r == sample_rate) {
                Some(index) => (index as u32) << SRATE_LSB,
                None => SRATE_MASK,
            };

        match self.bitrate {
            Some(_) => {
                flags |= HYBRID_FLAG | HYBRID_BITRATE;

                if self.balance {
                    flags |= HYBRID_BALANCE;
                }

                match self.shaping_weight {
                    None => {
                        config_flags |= CONFIG_HYBRID_SHAPE | CONFIG_AUTO_SHAPING;
                        flags |= HYBRID_SHAPE | NEW_SHAPING;
                    }
                    Some(0) => { /* shaping disabled */ }
                    Some(_) => {
                        flags |= HYBRID_SHAPE | NEW_SHAPING;
                    }
                }

                if self.optimize_correction {
                    flags |= CROSS_DECORR;
                }
            }
            None => {
                flags |= CROSS_DECORR;
            }
        }

        if self.joint_stereo.unwrap_or(true) {
            flags |= JOINT_STEREO;
        }

        if channels.get() == 1 {
            flags &= !(JOINT_STEREO | CROSS_DECORR | HYBRID_BALANCE);
            flags |= MONO_FLAG;
        }

        Ok(StreamConfig {
            flags: flags | INITIAL_BLOCK | FINAL_BLOCK,
            config_flags,
            bitrate: self.bitrate.unwrap_or(0),
            shaping_weight: self.shaping_weight.unwrap_or(0),
            sample_rate,
            bits_per_sample,
            channels,
            block_samples: self.block_length(sample_rate, channels.get().into()),
            buffer_size: self.buffer_size,
            terms: self.quality.terms(),
        })
    }
}

/// Everything needed to pack one stream
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Header flags shared by every block
    pub flags: u32,
    /// The configuration word
    pub config_flags: u32,
    /// Hybrid bitrate in bits per sample × 256, or 0
    pub bitrate: u32,
    /// Noise shaping weight × 1024
    pub shaping_weight: i32,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Significant bits per sample
    pub bits_per_sample: u32,
    /// Channel count, 1 or 2
    pub channels: NonZero<u8>,
    /// Most PCM frames in a block
    pub block_samples: u32,
    /// Most bytes in a block
    pub buffer_size: usize,
    /// Decorrelation terms before stream adjustments
    pub terms: &'static [i32],
}

impl StreamConfig {
    /// Whether stream is mono
    #[inline]
    pub fn is_mono(&self) -> bool {
        self.flags & MONO_FLAG != 0
    }

    /// Whether stream is hybrid
    #[inline]
    pub fn is_hybrid(&self) -> bool {
        self.flags & HYBRID_FLAG != 0
    }

    /// Whether the sample rate needs a sub-chunk of its own
    #[inline]
    pub fn custom_sample_rate(&self) -> bool {
        self.flags & SRATE_MASK == SRATE_MASK && self.sample_rate != 44100
    }

    /// Bytes needed for each sample
    #[inline]
    pub fn bytes_per_sample(&self) -> u32 {
        self.bits_per_sample.div_ceil(8)
    }

    /// Bits each sample is shifted right before packing
    #[inline]
    pub fn shift(&self) -> u32 {
        self.bytes_per_sample() * 8 - self.bits_per_sample
    }
}
