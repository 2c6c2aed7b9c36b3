// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For encoding PCM samples to WavPack files

use crate::Error;
use crate::config::EncodingOptions;
use crate::metadata::{BlockBuffer, BlockHeader, MetadataId, MetadataItem};
use crate::pack::{FinishedBlock, Stream};
use crate::pcm;
use bitstream_io::{BitWrite, BitWriter, LittleEndian};
use std::io::{Seek, SeekFrom, Write};
use std::num::NonZero;

/// A WavPack encoder
///
/// Writes primary blocks to one stream and, in hybrid mode,
/// correction blocks to an optional second stream.
pub struct Encoder<W: Write + Seek> {
    writer: W,
    correction: Option<W>,
    stream: Stream,
    channels: usize,
    total_samples: Option<u32>,
    samples_written: u64,
    // where each output's first block starts
    start: (u64, Option<u64>),
    md5: Option<BitWriter<md5::Context, LittleEndian>>,
    lossy_blocks: bool,
    finalized: bool,
}

impl<W: Write + Seek> Encoder<W> {
    /// Creates new encoder with the given parameters
    ///
    /// `correction`, if given, receives the correction stream
    /// and is only valid in hybrid mode.
    ///
    /// `sample_rate` must be between 1 and 16777215 (a 24 bit field).
    ///
    /// `bits_per_sample` must be between 1 and 24.
    ///
    /// `channels` must be 1 or 2.
    ///
    /// `total_samples`, if known, must be less than 4294967295.
    ///
    /// Note that if `total_samples` is indicated,
    /// the number written *must* be equal to that value
    /// or an error will occur when writing or finalizing the stream.
    ///
    /// # Errors
    ///
    /// Returns I/O error if unable to query the output streams.
    /// Returns error if any of the encoding parameters are invalid.
    pub fn new(
        mut writer: W,
        mut correction: Option<W>,
        options: EncodingOptions,
        sample_rate: u32,
        bits_per_sample: u32,
        channels: NonZero<u8>,
        total_samples: Option<u32>,
    ) -> Result<Self, Error> {
        let config = options.stream_config(
            sample_rate,
            bits_per_sample,
            channels,
            correction.is_some(),
        )?;

        if total_samples == Some(BlockHeader::UNKNOWN_SAMPLES) {
            return Err(Error::ExcessiveTotalSamples);
        }

        log::debug!(
            "encoding {} channel(s) of {}-bit samples at {} Hz, {} samples per block, flags {:08X}",
            channels,
            bits_per_sample,
            sample_rate,
            config.block_samples,
            config.flags,
        );

        Ok(Self {
            start: (
                writer.stream_position()?,
                correction
                    .as_mut()
                    .map(|w| w.stream_position())
                    .transpose()?,
            ),
            stream: Stream::new(config, total_samples, correction.is_some()),
            writer,
            correction,
            channels: channels.get().into(),
            total_samples,
            samples_written: 0,
            md5: options
                .has_md5()
                .then(|| BitWriter::endian(md5::Context::new(), LittleEndian)),
            lossy_blocks: false,
            finalized: false,
        })
    }

    /// Whether any block written so far is lossy
    /// without a correction block to restore it
    #[inline]
    pub fn lossy_blocks(&self) -> bool {
        self.lossy_blocks
    }

    /// Total PCM frames written so far
    #[inline]
    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Encodes interleaved PCM samples
    ///
    /// Samples are signed and justified to the
    /// container's bytes-per-sample, so 12-bit samples
    /// in 16-bit containers occupy the upper 12 bits.
    /// Depending on the encoder's block length,
    /// this may write zero or more blocks to disk.
    ///
    /// # Errors
    ///
    /// Returns an I/O error from the underlying streams,
    /// or if samples are not a whole number of PCM frames,
    /// or if more samples are written than indicated.
    /// With MD5 enabled, samples which overflow their
    /// container are also an error.
    pub fn encode(&mut self, samples: &[i32]) -> Result<(), Error> {
        if samples.len() % self.channels != 0 {
            return Err(Error::PartialFrame);
        }

        // rejected samples leave the running total untouched
        let written = self.samples_written + (samples.len() / self.channels) as u64;
        match self.total_samples {
            Some(total) if written > total.into() => {
                return Err(Error::ExcessiveTotalSamples);
            }
            None if written >= BlockHeader::UNKNOWN_SAMPLES.into() => {
                return Err(Error::ExcessiveTotalSamples);
            }
            _ => {}
        }

        // update MD5 calculation
        if let Some(md5) = self.md5.as_mut() {
            let mut bytes = Vec::new();
            pcm::samples_to_bytes(
                samples,
                self.stream.config().bytes_per_sample() as usize,
                &mut bytes,
            )?;
            md5.write_bytes(&bytes)?;
        }
        self.samples_written = written;

        let shift = self.stream.config().shift();
        let shifted: Vec<i32>;
        let mut remaining = if shift > 0 {
            shifted = samples.iter().map(|s| s >> shift).collect();
            shifted.as_slice()
        } else {
            samples
        };

        let block_samples = self.stream.config().block_samples;

        while !remaining.is_empty() {
            let in_block = match self.stream.open_block_samples() {
                Some(in_block) => in_block,
                None => {
                    self.stream.start_block()?;
                    0
                }
            };

            let wanted = ((block_samples - in_block) as usize).min(remaining.len() / self.channels);
            let packed = self
                .stream
                .pack_samples(&remaining[..wanted * self.channels])?;
            remaining = &remaining[packed * self.channels..];

            if packed < wanted {
                if in_block == 0 && packed == 0 {
                    return Err(Error::NoProgress);
                }
                log::warn!(
                    "block at sample {} full after {} samples",
                    self.stream.sample_index() - (in_block + packed as u32),
                    in_block + packed as u32,
                );
                self.finish_block()?;
            } else if in_block + packed as u32 == block_samples {
                self.finish_block()?;
            }
        }

        Ok(())
    }

    /// Finishes any partially-filled block and writes it out
    ///
    /// The next samples encoded start a new block.
    ///
    /// # Errors
    ///
    /// Returns an I/O error from the underlying streams.
    pub fn flush(&mut self) -> Result<(), Error> {
        if self.stream.open_block_samples().is_some() {
            self.finish_block()?;
        }
        self.writer.flush()?;
        if let Some(w) = self.correction.as_mut() {
            w.flush()?;
        }
        Ok(())
    }

    fn finish_block(&mut self) -> Result<(), Error> {
        let FinishedBlock { lossy, wv, wvc, .. } = self.stream.finish_block()?;

        self.writer.write_all(&wv)?;

        match (self.correction.as_mut(), wvc) {
            (Some(w), Some(wvc)) => w.write_all(&wvc)?,
            _ => self.lossy_blocks |= lossy,
        }

        Ok(())
    }

    fn finalize_inner(&mut self) -> Result<(), Error> {
        if !self.finalized {
            self.finalized = true;

            self.flush()?;

            match self.total_samples {
                Some(expected) => {
                    if u64::from(expected) != self.samples_written {
                        return Err(Error::SampleCountMismatch);
                    }
                }
                None if self.samples_written > 0 => {
                    let total = self.samples_written as u32;
                    rewrite_total_samples(&mut self.writer, self.start.0, total)?;
                    if let (Some(w), Some(start)) = (self.correction.as_mut(), self.start.1) {
                        rewrite_total_samples(w, start, total)?;
                    }
                }
                None => { /* no blocks to update */ }
            }

            if let Some(md5) = self.md5.take() {
                let mut block = BlockBuffer::new(
                    BlockHeader {
                        version: BlockHeader::STREAM_VERSION,
                        total_samples: self.samples_written as u32,
                        ..BlockHeader::default()
                    },
                    usize::MAX,
                );
                block.append(&MetadataItem::new(
                    MetadataId::Md5Checksum,
                    md5.into_writer().compute().0.to_vec(),
                ))?;
                self.writer.write_all(&block.into_bytes()?)?;
                self.writer.flush()?;
            }

            log::info!(
                "finished stream of {} samples{}",
                self.samples_written,
                if self.lossy_blocks { " with lossy blocks" } else { "" },
            );
        }

        Ok(())
    }

    /// Attempt to finalize stream
    ///
    /// It is necessary to finalize the WavPack encoder
    /// so that it will write any partially filled block
    /// to the stream and update the first block's
    /// total samples if they were not known in advance.
    ///
    /// Dropping the encoder will attempt to finalize the stream
    /// automatically, but will ignore any errors that may occur.
    pub fn finalize(mut self) -> Result<(), Error> {
        self.finalize_inner()?;
        Ok(())
    }
}

impl<W: Write + Seek> Drop for Encoder<W> {
    fn drop(&mut self) {
        let _ = self.finalize_inner();
    }
}

fn rewrite_total_samples<W: Write + Seek>(
    writer: &mut W,
    block_start: u64,
    total_samples: u32,
) -> Result<(), Error> {
    let end = writer.stream_position()?;
    writer.seek(SeekFrom::Start(
        block_start + BlockHeader::TOTAL_SAMPLES_OFFSET,
    ))?;
    writer.write_all(&total_samples.to_le_bytes())?;
    writer.seek(SeekFrom::Start(end))?;
    Ok(())
}

/// A WavPack encoder which accepts little-endian PCM bytes
///
/// Bytes are laid out as in a WAVE file's data chunk:
/// interleaved samples of 1 to 3 bytes each,
/// with 8-bit samples unsigned.
pub struct WavpackWriter<W: Write + Seek> {
    encoder: Encoder<W>,
    buf: Vec<u8>,
    samples: Vec<i32>,
    bytes_per_sample: usize,
    frame_size: usize,
}

impl<W: Write + Seek> WavpackWriter<W> {
    /// Creates new writer with the given parameters
    ///
    /// Parameters are as for [`Encoder::new`].
    ///
    /// # Errors
    ///
    /// Returns error if any of the encoding parameters are invalid.
    pub fn new(
        writer: W,
        correction: Option<W>,
        options: EncodingOptions,
        sample_rate: u32,
        bits_per_sample: u32,
        channels: NonZero<u8>,
        total_samples: Option<u32>,
    ) -> Result<Self, Error> {
        let bytes_per_sample = pcm::bytes_per_sample(bits_per_sample);

        Ok(Self {
            encoder: Encoder::new(
                writer,
                correction,
                options,
                sample_rate,
                bits_per_sample,
                channels,
                total_samples,
            )?,
            buf: Vec::new(),
            samples: Vec::new(),
            bytes_per_sample,
            frame_size: bytes_per_sample * usize::from(channels.get()),
        })
    }

    /// Whether any block written so far is lossy
    /// without a correction block to restore it
    #[inline]
    pub fn lossy_blocks(&self) -> bool {
        self.encoder.lossy_blocks()
    }

    /// Attempt to finalize stream
    ///
    /// # Errors
    ///
    /// Returns [`Error::PartialFrame`] if bytes of an
    /// incomplete PCM frame remain, or any error
    /// from [`Encoder::finalize`].
    pub fn finalize(self) -> Result<(), Error> {
        if !self.buf.is_empty() {
            return Err(Error::PartialFrame);
        }
        self.encoder.finalize()
    }
}

impl<W: Write + Seek> Write for WavpackWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(buf);

        let whole = self.buf.len() - self.buf.len() % self.frame_size;
        if whole > 0 {
            self.samples.clear();
            pcm::bytes_to_samples(&self.buf[..whole], self.bytes_per_sample, &mut self.samples)
                .map_err(std::io::Error::other)?;
            self.buf.drain(..whole);
            self.encoder
                .encode(&self.samples)
                .map_err(std::io::Error::other)?;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.encoder.flush().map_err(std::io::Error::other)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Quality;
    use crate::metadata::read_block;
    use std::io::Cursor;

    fn blocks(mut bytes: &[u8]) -> Vec<(BlockHeader, Vec<MetadataItem>)> {
        let mut blocks = vec![];
        while !bytes.is_empty() {
            let (header, items) = read_block(bytes).unwrap();
            bytes = &bytes[header.ck_size as usize + 8..];
            blocks.push((header, items));
        }
        blocks
    }

    #[test]
    fn test_block_lengths() {
        let mut wv = Cursor::new(vec![]);
        let mut encoder = Encoder::new(
            &mut wv,
            None,
            EncodingOptions::default().block_samples(NonZero::new(1000).unwrap()),
            44100,
            16,
            NonZero::new(1).unwrap(),
            Some(3500),
        )
        .unwrap();

        // block boundaries are independent of how samples arrive
        for chunk in (0..3500).collect::<Vec<i32>>().chunks(333) {
            encoder.encode(chunk).unwrap();
        }
        encoder.finalize().unwrap();

        assert_eq!(
            blocks(wv.get_ref())
                .iter()
                .map(|(h, _)| (h.block_index, h.block_samples, h.total_samples))
                .collect::<Vec<_>>(),
            [
                (0, 1000, 3500),
                (1000, 1000, 3500),
                (2000, 1000, 3500),
                (3000, 500, 3500)
            ]
        );
    }

    #[test]
    fn test_sample_count() {
        let mut wv = Cursor::new(vec![]);
        let mut encoder = Encoder::new(
            &mut wv,
            None,
            EncodingOptions::default(),
            44100,
            16,
            NonZero::new(2).unwrap(),
            Some(2),
        )
        .unwrap();
        assert!(matches!(encoder.encode(&[1, 2, 3]), Err(Error::PartialFrame)));
        assert!(matches!(
            encoder.encode(&[1, 2, 3, 4, 5, 6]),
            Err(Error::ExcessiveTotalSamples)
        ));

        let mut wv = Cursor::new(vec![]);
        let mut encoder = Encoder::new(
            &mut wv,
            None,
            EncodingOptions::default(),
            44100,
            16,
            NonZero::new(2).unwrap(),
            Some(3),
        )
        .unwrap();
        encoder.encode(&[1, 2, 3, 4]).unwrap();
        assert!(matches!(encoder.finalize(), Err(Error::SampleCountMismatch)));
    }

    #[test]
    fn test_rejected_samples_not_counted() {
        let mut wv = Cursor::new(vec![]);
        let mut encoder = Encoder::new(
            &mut wv,
            None,
            EncodingOptions::default().md5(true),
            44100,
            16,
            NonZero::new(1).unwrap(),
            Some(4),
        )
        .unwrap();
        encoder.encode(&[1, 2]).unwrap();
        assert!(matches!(
            encoder.encode(&[3, 4, 5]),
            Err(Error::ExcessiveTotalSamples)
        ));
        assert_eq!(encoder.samples_written(), 2);
        encoder.encode(&[3, 4]).unwrap();
        encoder.finalize().unwrap();

        let blocks = blocks(wv.get_ref());
        assert_eq!(blocks[0].0.block_samples, 4);
        assert_eq!(
            blocks[0].0.crc,
            [1u32, 2, 3, 4]
                .iter()
                .fold(u32::MAX, |crc, s| crc.wrapping_mul(3).wrapping_add(*s))
        );

        // the MD5 only covers samples actually accepted
        let mut bytes = vec![];
        pcm::samples_to_bytes(&[1, 2, 3, 4], 2, &mut bytes).unwrap();
        assert_eq!(blocks[1].1[0].data, md5::compute(&bytes).0.to_vec());
    }

    #[test]
    fn test_shift() {
        // 12-bit samples arrive in the upper bits of 16-bit containers
        let samples = (0..256).map(|i| (i - 128) << 4).collect::<Vec<i32>>();

        let mut wv = Cursor::new(vec![]);
        let mut encoder = Encoder::new(
            &mut wv,
            None,
            EncodingOptions::default(),
            44100,
            12,
            NonZero::new(1).unwrap(),
            None,
        )
        .unwrap();
        encoder.encode(&samples).unwrap();
        encoder.finalize().unwrap();

        let (header, _) = read_block(wv.get_ref()).unwrap();
        assert_eq!(header.shift(), 4);
        assert_eq!(header.total_samples, 256);
        assert_eq!(
            header.crc,
            samples
                .iter()
                .fold(u32::MAX, |crc, s| crc.wrapping_mul(3).wrapping_add((s >> 4) as u32))
        );
    }

    #[test]
    fn test_byte_writer() {
        let mut rng = fastrand::Rng::with_seed(5);
        let pcm = std::iter::repeat_with(|| rng.u8(..))
            .take(3000 * 6)
            .collect::<Vec<u8>>();

        let mut samples = vec![];
        pcm::bytes_to_samples(&pcm, 3, &mut samples).unwrap();

        let mut direct = Cursor::new(vec![]);
        let mut encoder = Encoder::new(
            &mut direct,
            None,
            EncodingOptions::default().quality(Quality::Fast),
            96000,
            24,
            NonZero::new(2).unwrap(),
            None,
        )
        .unwrap();
        encoder.encode(&samples).unwrap();
        encoder.finalize().unwrap();

        let mut bytes = Cursor::new(vec![]);
        let mut writer = WavpackWriter::new(
            &mut bytes,
            None,
            EncodingOptions::default().quality(Quality::Fast),
            96000,
            24,
            NonZero::new(2).unwrap(),
            None,
        )
        .unwrap();
        // odd-sized writes split frames and samples
        for chunk in pcm.chunks(1001) {
            writer.write_all(chunk).unwrap();
        }
        writer.finalize().unwrap();

        assert_eq!(direct.into_inner(), bytes.into_inner());
    }

    #[test]
    fn test_partial_frame_bytes() {
        let mut bytes = Cursor::new(vec![]);
        let mut writer = WavpackWriter::new(
            &mut bytes,
            None,
            EncodingOptions::default(),
            44100,
            16,
            NonZero::new(2).unwrap(),
            None,
        )
        .unwrap();
        writer.write_all(&[0; 7]).unwrap();
        assert!(matches!(writer.finalize(), Err(Error::PartialFrame)));
    }
}
