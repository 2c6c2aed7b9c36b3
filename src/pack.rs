// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Assembly of samples into blocks
//!
//! A [`Stream`] cycles through three states per block:
//!
//! 1. [`Stream::start_block`] writes the header and the metadata
//!    a decoder needs to resume the stream's adaptive state
//! 2. [`Stream::pack_samples`] codes as many PCM frames
//!    as fit, and may be called repeatedly
//! 3. [`Stream::finish_block`] flushes the coder
//!    and returns the finished block's bytes
//!
//! Running out of room in a block is not an error;
//! packing simply stops short and the caller finishes
//! the block and starts a new one for the remainder.

use crate::Error;
use crate::bitstream::BitPacker;
use crate::config::StreamConfig;
use crate::decorr::Decorrelator;
use crate::metadata::{
    BYTES_STORED, BlockBuffer, BlockHeader, CROSS_DECORR, HYBRID_SHAPE, INITIAL_BLOCK,
    JOINT_STEREO, MAG_LSB, MAG_MASK, MetadataId, MetadataItem,
};
use crate::words::{NoiseShaping, Words};

/// Headroom needed to code one mono PCM frame
const MONO_HEADROOM: usize = 64;

/// Headroom needed to code one stereo PCM frame
const STEREO_HEADROOM: usize = 128;

#[inline]
fn crc_step(crc: u32, sample: i32) -> u32 {
    crc.wrapping_mul(3).wrapping_add(sample as u32)
}

/// A finished block ready for output
#[derive(Clone, Debug)]
pub struct FinishedBlock {
    /// Index of the block's first PCM frame in the stream
    pub index: u32,
    /// PCM frames in the block
    pub samples: u32,
    /// Whether the primary block alone cannot reproduce its input
    pub lossy: bool,
    /// The primary block's bytes
    pub wv: Vec<u8>,
    /// The correction block's bytes, if any
    pub wvc: Option<Vec<u8>>,
}

struct Correction {
    block: BlockBuffer,
    bits: BitPacker,
}

struct OpenBlock {
    wv: BlockBuffer,
    bits: BitPacker,
    wvc: Option<Correction>,
    ideal_crc: u32,
    lossy: bool,
}

impl OpenBlock {
    /// Whether every active bitstream has room for one more frame
    fn has_room(&self, headroom: usize) -> bool {
        let fits = |bits: &BitPacker| bits.remaining().is_some_and(|r| r >= headroom);

        fits(&self.bits) && self.wvc.as_ref().is_none_or(|c| fits(&c.bits))
    }
}

/// The state of one WavPack stream being encoded
pub struct Stream {
    config: StreamConfig,
    total_samples: u32,
    sample_index: u32,
    decorr: Decorrelator,
    words: Words,
    shaping: NoiseShaping,
    correction: bool,
    block: Option<OpenBlock>,
}

impl Stream {
    /// Prepares stream for packing
    ///
    /// `total_samples` is the stream's length in PCM frames, if known.
    /// If `correction` is set, a correction block is produced
    /// alongside every primary block.
    pub fn new(config: StreamConfig, total_samples: Option<u32>, correction: bool) -> Self {
        Self {
            decorr: Decorrelator::new(
                config.terms,
                !config.is_mono(),
                config.flags & CROSS_DECORR != 0,
            ),
            words: Words::new(config.flags, config.bitrate),
            shaping: NoiseShaping::new(config.flags, config.shaping_weight),
            total_samples: total_samples.unwrap_or(BlockHeader::UNKNOWN_SAMPLES),
            sample_index: 0,
            correction,
            block: None,
            config,
        }
    }

    /// The stream's parameters
    #[inline]
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Number of PCM frames packed so far
    #[inline]
    pub fn sample_index(&self) -> u32 {
        self.sample_index
    }

    /// PCM frames in the open block, if any
    #[inline]
    pub fn open_block_samples(&self) -> Option<u32> {
        self.block.as_ref().map(|b| b.wv.header().block_samples)
    }

    /// Opens a new block
    ///
    /// The block's metadata snapshots the adaptive state
    /// so a decoder can start from this block.
    /// Since that snapshot is lossy, the encoder's own state
    /// is replaced by the values read back from it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BlockAlreadyOpen`] if a block is open
    /// or [`Error::MetadataOverflow`] if the block buffer
    /// is too small for its metadata.
    pub fn start_block(&mut self) -> Result<(), Error> {
        if self.block.is_some() {
            return Err(Error::BlockAlreadyOpen);
        }

        let flags = self.config.flags;
        let header = BlockHeader {
            ck_size: 0,
            version: BlockHeader::STREAM_VERSION,
            track_no: 0,
            index_no: 0,
            total_samples: self.total_samples,
            block_index: self.sample_index,
            block_samples: 0,
            flags: (flags & !MAG_MASK) | (((flags & BYTES_STORED) * 8 + 7) << MAG_LSB),
            crc: u32::MAX,
        };

        let mut wv = BlockBuffer::new(header, self.config.buffer_size);
        wv.append(&self.decorr.write_terms())?;
        wv.append(&self.decorr.write_weights())?;
        wv.append(&self.decorr.write_samples())?;
        wv.append(&self.words.write_entropy_vars())?;

        if self.config.custom_sample_rate() {
            wv.append(&MetadataItem::new(
                MetadataId::SampleRate,
                self.config.sample_rate.to_le_bytes()[0..3].to_vec(),
            ))?;
        }

        if self.config.is_hybrid() {
            wv.append(&self.words.write_hybrid_profile())?;
        }

        if flags & INITIAL_BLOCK != 0 && self.sample_index == 0 {
            wv.append(&MetadataItem::new(
                MetadataId::ConfigBlock,
                self.config.config_flags.to_le_bytes()[1..4].to_vec(),
            ))?;
        }

        let wvc = if self.correction {
            let mut block = BlockBuffer::new(header, self.config.buffer_size);
            if flags & HYBRID_SHAPE != 0 {
                block.append(&self.shaping.write_info(!self.config.is_mono()))?;
            }
            Some(Correction {
                bits: BitPacker::new(block.bitstream_capacity()),
                block,
            })
        } else {
            None
        };

        self.block = Some(OpenBlock {
            bits: BitPacker::new(wv.bitstream_capacity()),
            wv,
            wvc,
            ideal_crc: u32::MAX,
            lossy: false,
        });

        Ok(())
    }

    /// Packs interleaved samples into the open block
    ///
    /// Samples must already be shifted down to the stream's
    /// significant bits.
    /// Returns the number of PCM frames packed, which
    /// is less than given if the block ran out of room.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BlockNotOpen`] if no block is open
    /// or [`Error::PartialFrame`] if the samples are not
    /// a whole number of PCM frames.
    pub fn pack_samples(&mut self, samples: &[i32]) -> Result<usize, Error> {
        let Self {
            config,
            decorr,
            words,
            shaping,
            block,
            sample_index,
            ..
        } = self;

        let block = block.as_mut().ok_or(Error::BlockNotOpen)?;
        let channels = usize::from(config.channels.get());
        if samples.len() % channels != 0 {
            return Err(Error::PartialFrame);
        }

        let joint = config.flags & JOINT_STEREO != 0;
        let mut crc = block.wv.header().crc;
        let mut ideal_crc = block.ideal_crc;
        let mut lossy = false;
        let mut packed = 0;

        match (config.is_hybrid(), config.is_mono()) {
            (false, true) => {
                for &sample in samples {
                    if !block.has_room(MONO_HEADROOM) {
                        break;
                    }

                    crc = crc_step(crc, sample);
                    let code = decorr.decorrelate_mono(sample);
                    words.send_word_lossless(&mut block.bits, code, 0);
                    packed += 1;
                }
            }
            (false, false) => {
                for frame in samples.chunks_exact(2) {
                    if !block.has_room(STEREO_HEADROOM) {
                        break;
                    }

                    let (mut left, mut right) = (frame[0], frame[1]);
                    crc = crc_step(crc_step(crc, left), right);

                    if joint {
                        left = left.wrapping_sub(right);
                        right = right.wrapping_add(left >> 1);
                    }

                    let (left, right) = decorr.decorrelate_stereo(left, right);
                    words.send_word_lossless(&mut block.bits, left, 0);
                    words.send_word_lossless(&mut block.bits, right, 1);
                    packed += 1;
                }
            }
            (true, true) => {
                for &sample in samples {
                    if !block.has_room(MONO_HEADROOM) {
                        break;
                    }

                    ideal_crc = crc_step(ideal_crc, sample);

                    let code = decorr.predict_mono(shaping.shape(0, sample));
                    let code = words.send_word(
                        &mut block.bits,
                        block.wvc.as_mut().map(|c| &mut c.bits),
                        code,
                        0,
                    );
                    let code = decorr.reconstruct_mono(code);
                    shaping.feedback(0, code);

                    crc = crc_step(crc, code);
                    lossy |= crc != ideal_crc;
                    packed += 1;
                }
            }
            (true, false) => {
                for frame in samples.chunks_exact(2) {
                    if !block.has_room(STEREO_HEADROOM) {
                        break;
                    }

                    ideal_crc = crc_step(crc_step(ideal_crc, frame[0]), frame[1]);

                    let mut left = shaping.shape(0, frame[0]);
                    let mut right = shaping.shape(1, frame[1]);

                    if joint {
                        left = left.wrapping_sub(right);
                        right = right.wrapping_add(left >> 1);
                    }

                    let (left, right) = decorr.predict_stereo(left, right);
                    let left = words.send_word(
                        &mut block.bits,
                        block.wvc.as_mut().map(|c| &mut c.bits),
                        left,
                        0,
                    );
                    let right = words.send_word(
                        &mut block.bits,
                        block.wvc.as_mut().map(|c| &mut c.bits),
                        right,
                        1,
                    );
                    let (mut left, mut right) = decorr.reconstruct_stereo(left, right);

                    if joint {
                        right = right.wrapping_sub(left >> 1);
                        left = left.wrapping_add(right);
                    }

                    shaping.feedback(0, left);
                    shaping.feedback(1, right);

                    crc = crc_step(crc_step(crc, left), right);
                    lossy |= crc != ideal_crc;
                    packed += 1;
                }
            }
        }

        let header = block.wv.header_mut();
        header.block_samples += packed as u32;
        header.crc = crc;

        if let Some(wvc) = block.wvc.as_mut() {
            let header = wvc.block.header_mut();
            header.block_samples += packed as u32;
            header.crc = ideal_crc;
        }

        block.ideal_crc = ideal_crc;
        block.lossy |= lossy;
        *sample_index += packed as u32;

        Ok(packed)
    }

    /// Closes the open block and returns its bytes
    ///
    /// A correction block only carries a bitstream
    /// if its primary block was lossy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BlockNotOpen`] if no block is open
    /// or [`Error::BitstreamOverflow`] if a bitstream
    /// ran out of room.
    pub fn finish_block(&mut self) -> Result<FinishedBlock, Error> {
        let mut block = self.block.take().ok_or(Error::BlockNotOpen)?;

        self.decorr.realign();
        self.words.flush(&mut block.bits);

        let data = block.bits.close()?;
        if !data.is_empty() {
            block.wv.push_bitstream(MetadataId::WvBitstream, data)?;
        }

        let lossy = block.lossy;

        let wvc = match block.wvc {
            Some(Correction {
                block: mut wvc,
                bits,
            }) => {
                match bits.close() {
                    Ok(data) if lossy && !data.is_empty() => {
                        wvc.push_bitstream(MetadataId::WvcBitstream, data)?;
                    }
                    Err(err) if lossy => return Err(err),
                    Ok(_) | Err(_) => { /* lossless block needs no correction */ }
                }
                Some(wvc.into_bytes()?)
            }
            None => None,
        };

        let header = *block.wv.header();
        let wv = block.wv.into_bytes()?;

        log::debug!(
            "block {} finished with {} samples in {} bytes{}",
            header.block_index,
            header.block_samples,
            wv.len(),
            if lossy { " (lossy)" } else { "" },
        );

        Ok(FinishedBlock {
            index: header.block_index,
            samples: header.block_samples,
            lossy,
            wv,
            wvc,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::EncodingOptions;
    use crate::metadata::read_block;
    use std::num::NonZero;

    fn stream(options: EncodingOptions, channels: u8, correction: bool) -> Stream {
        Stream::new(
            options
                .stream_config(44100, 16, NonZero::new(channels).unwrap(), correction)
                .unwrap(),
            None,
            correction,
        )
    }

    fn noise(len: usize, seed: u64) -> Vec<i32> {
        let mut rng = fastrand::Rng::with_seed(seed);
        (0..len)
            .map(|i| ((i as f64 / 7.0).sin() * 12000.0) as i32 + rng.i32(-2000..2000))
            .collect()
    }

    #[test]
    fn test_block_state() {
        let mut s = stream(EncodingOptions::default(), 2, false);
        assert!(matches!(s.pack_samples(&[1, 2]), Err(Error::BlockNotOpen)));
        assert!(matches!(s.finish_block(), Err(Error::BlockNotOpen)));
        s.start_block().unwrap();
        assert!(matches!(s.start_block(), Err(Error::BlockAlreadyOpen)));
        assert!(matches!(s.pack_samples(&[1, 2, 3]), Err(Error::PartialFrame)));
        assert_eq!(s.pack_samples(&[1, 2, 3, 4]).unwrap(), 2);
        assert_eq!(s.open_block_samples(), Some(2));
        assert_eq!(s.finish_block().unwrap().samples, 2);
        assert_eq!(s.open_block_samples(), None);
        assert_eq!(s.sample_index(), 2);
    }

    #[test]
    fn test_lossless_crc() {
        let samples = noise(512, 1);

        for channels in [1, 2] {
            let mut s = stream(EncodingOptions::default(), channels, false);
            s.start_block().unwrap();
            s.pack_samples(&samples).unwrap();
            let block = s.finish_block().unwrap();
            assert!(!block.lossy);

            let (header, items) = read_block(&block.wv).unwrap();
            assert_eq!(
                header.crc,
                samples.iter().fold(u32::MAX, |crc, s| crc_step(crc, *s))
            );
            assert_eq!(header.block_samples as usize, samples.len() / usize::from(channels));
            assert_eq!(items.last().unwrap().id, MetadataId::WvBitstream);
        }
    }

    #[test]
    fn test_split_packing() {
        let samples = noise(2000, 2);

        for (options, correction) in [
            (EncodingOptions::default(), false),
            (EncodingOptions::default().hybrid(600).unwrap(), true),
            (
                EncodingOptions::default()
                    .hybrid(1024)
                    .and_then(|o| o.noise_shaping(-300))
                    .unwrap(),
                true,
            ),
        ] {
            let mut whole = stream(options.clone(), 2, correction);
            whole.start_block().unwrap();
            assert_eq!(whole.pack_samples(&samples).unwrap(), 1000);
            let whole = whole.finish_block().unwrap();

            for split in [2, 602, 1998] {
                let mut parts = stream(options.clone(), 2, correction);
                parts.start_block().unwrap();
                assert_eq!(parts.pack_samples(&samples[0..split]).unwrap(), split / 2);
                assert_eq!(parts.pack_samples(&samples[split..]).unwrap(), 1000 - split / 2);
                let parts = parts.finish_block().unwrap();

                assert_eq!(parts.wv, whole.wv);
                assert_eq!(parts.wvc, whole.wvc);
            }
        }
    }

    #[test]
    fn test_buffer_exhaustion() {
        let samples = noise(20000, 3);
        let mut s = stream(EncodingOptions::default().buffer_size(2048).unwrap(), 2, false);
        let mut remaining = samples.as_slice();
        let mut blocks = vec![];

        while !remaining.is_empty() {
            s.start_block().unwrap();
            let packed = s.pack_samples(remaining).unwrap();
            assert!(packed > 0);
            remaining = &remaining[packed * 2..];
            let block = s.finish_block().unwrap();
            assert!(block.wv.len() <= 2048);
            blocks.push(block);
        }

        assert!(blocks.len() > 1);
        assert_eq!(blocks.iter().map(|b| b.samples).sum::<u32>(), 10000);

        // each block picks up where the last left off
        let mut index = 0;
        for block in blocks {
            let (header, _) = read_block(&block.wv).unwrap();
            assert_eq!(header.block_index, index);
            index += header.block_samples;
        }
    }

    #[test]
    fn test_hybrid_lossy() {
        let samples = noise(4000, 4);

        let mut s = stream(EncodingOptions::default().hybrid(512).unwrap(), 2, true);
        s.start_block().unwrap();
        s.pack_samples(&samples).unwrap();
        let block = s.finish_block().unwrap();
        assert!(block.lossy);

        let (wv_header, wv_items) = read_block(&block.wv).unwrap();
        let (wvc_header, wvc_items) = read_block(block.wvc.as_deref().unwrap()).unwrap();
        assert_ne!(wv_header.crc, wvc_header.crc);
        assert_eq!(
            wvc_header.crc,
            samples.iter().fold(u32::MAX, |crc, s| crc_step(crc, *s))
        );
        assert!(wv_items.iter().any(|i| i.id == MetadataId::HybridProfile));
        assert!(wvc_items.iter().any(|i| i.id == MetadataId::ShapingWeights));
        assert_eq!(wvc_items.last().unwrap().id, MetadataId::WvcBitstream);
    }

    #[test]
    fn test_hybrid_without_error_limit() {
        use crate::metadata::HYBRID_BITRATE;

        let samples = noise(4000, 5);

        // a hybrid stream without a bitrate target has an error limit of 0
        let mut config = EncodingOptions::default()
            .hybrid(512)
            .unwrap()
            .stream_config(44100, 16, NonZero::new(2).unwrap(), true)
            .unwrap();
        config.flags &= !HYBRID_BITRATE;

        let mut s = Stream::new(config, None, true);
        s.start_block().unwrap();
        assert_eq!(s.pack_samples(&samples).unwrap(), 2000);
        let block = s.finish_block().unwrap();
        assert!(!block.lossy);

        let (wv_header, _) = read_block(&block.wv).unwrap();
        let (wvc_header, wvc_items) = read_block(block.wvc.as_deref().unwrap()).unwrap();
        assert_eq!(wv_header.crc, wvc_header.crc);
        assert!(wvc_items.iter().all(|i| i.id != MetadataId::WvcBitstream));
    }

    #[test]
    fn test_metadata_order() {
        let mut s = Stream::new(
            EncodingOptions::default()
                .hybrid(1024)
                .unwrap()
                .stream_config(22000, 16, NonZero::new(1).unwrap(), false)
                .unwrap(),
            Some(10),
            false,
        );
        s.start_block().unwrap();
        s.pack_samples(&[0; 10]).unwrap();
        let block = s.finish_block().unwrap();

        let (header, items) = read_block(&block.wv).unwrap();
        assert_eq!(header.total_samples, 10);
        assert_eq!(header.flags & MAG_MASK, 15 << MAG_LSB);
        assert_eq!(
            items.iter().map(|i| i.id).collect::<Vec<_>>(),
            [
                MetadataId::DecorrTerms,
                MetadataId::DecorrWeights,
                MetadataId::DecorrSamples,
                MetadataId::EntropyVars,
                MetadataId::SampleRate,
                MetadataId::HybridProfile,
                MetadataId::ConfigBlock,
                MetadataId::WvBitstream,
            ]
        );
        assert_eq!(items[4].data, 22000u32.to_le_bytes()[0..3]);

        // config and sample rate only ride along where needed
        s.start_block().unwrap();
        s.pack_samples(&[0; 10]).unwrap();
        let (_, items) = read_block(&s.finish_block().unwrap().wv).unwrap();
        assert!(items.iter().all(|i| i.id != MetadataId::ConfigBlock));
    }
}
