// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! For handling a WavPack block's header and metadata sub-chunks
//!
//! Every WavPack block starts with a fixed 32 byte header
//! followed by any number of metadata sub-chunks,
//! the last of which is typically the compressed bitstream itself.
//!
//! | Bytes | Field
//! |------:|---------
//! | 4     | chunk ID, always `wvpk`
//! | 4     | chunk size (bytes following this field)
//! | 2     | stream version
//! | 1     | track number
//! | 1     | index number
//! | 4     | total samples in stream
//! | 4     | index of block's first sample
//! | 4     | samples in block
//! | 4     | flags
//! | 4     | CRC of block's samples
//!
//! All fields are little-endian.

use crate::Error;
use bitstream_io::{
    BitRead, BitReader, BitWrite, BitWriter, FromBitStream, LittleEndian, ToBitStream,
};

/// Bytes per sample, minus 1
pub const BYTES_STORED: u32 = 3;
/// Stream is mono
pub const MONO_FLAG: u32 = 4;
/// Stream is hybrid
pub const HYBRID_FLAG: u32 = 8;
/// Stereo channels are stored as mid/side
pub const JOINT_STEREO: u32 = 0x10;
/// Cross-channel decorrelation without delay
pub const CROSS_DECORR: u32 = 0x20;
/// Hybrid noise shaping
pub const HYBRID_SHAPE: u32 = 0x40;
/// Hybrid error limit varies with residual level
pub const HYBRID_BITRATE: u32 = 0x200;
/// Hybrid bitrate is balanced between channels
pub const HYBRID_BALANCE: u32 = 0x400;
/// First block of a multichannel segment
pub const INITIAL_BLOCK: u32 = 0x800;
/// Final block of a multichannel segment
pub const FINAL_BLOCK: u32 = 0x1000;
/// Lowest bit of the 5-bit shift field
pub const SHIFT_LSB: u32 = 13;
/// Mask of the 5-bit shift field
pub const SHIFT_MASK: u32 = 0x1f << SHIFT_LSB;
/// Lowest bit of the 5-bit magnitude field
pub const MAG_LSB: u32 = 18;
/// Mask of the 5-bit magnitude field
pub const MAG_MASK: u32 = 0x1f << MAG_LSB;
/// Lowest bit of the 4-bit sample rate index
pub const SRATE_LSB: u32 = 23;
/// Mask of the 4-bit sample rate index
pub const SRATE_MASK: u32 = 0xf << SRATE_LSB;
/// Noise shaping uses a sign-conditional filter
pub const NEW_SHAPING: u32 = 0x20000000;
/// Block is stereo, but data is mono
pub const FALSE_STEREO: u32 = 0x40000000;

/// Whether the given header flags describe single-channel data
#[inline]
pub fn is_mono(flags: u32) -> bool {
    flags & (MONO_FLAG | FALSE_STEREO) != 0
}

/// The fixed header at the start of every WavPack block
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BlockHeader {
    /// Size of the block, not counting the ID and this field
    pub ck_size: u32,
    /// Stream version
    pub version: u16,
    /// Track number
    pub track_no: u8,
    /// Track index number
    pub index_no: u8,
    /// Total samples in the stream, or `u32::MAX` if unknown
    pub total_samples: u32,
    /// Index of this block's first sample
    pub block_index: u32,
    /// Number of samples in this block
    pub block_samples: u32,
    /// Stream and block flags
    pub flags: u32,
    /// Running CRC of this block's samples
    pub crc: u32,
}

impl BlockHeader {
    /// The block chunk ID
    pub const ID: [u8; 4] = *b"wvpk";

    /// Size of header in bytes
    pub const SIZE: usize = 32;

    /// The stream version we write
    pub const STREAM_VERSION: u16 = 0x405;

    /// Bytes of the header counted by `ck_size`
    const SIZED: u32 = Self::SIZE as u32 - 8;

    /// Offset of the total samples field from the start of the block
    pub const TOTAL_SAMPLES_OFFSET: u64 = 12;

    /// Total samples field for a stream of as-yet unknown length
    pub const UNKNOWN_SAMPLES: u32 = u32::MAX;

    /// Number of bytes stored per sample, from 1 to 4
    pub fn bytes_per_sample(&self) -> u32 {
        (self.flags & BYTES_STORED) + 1
    }

    /// Number of bits samples have been shifted right by
    pub fn shift(&self) -> u32 {
        (self.flags & SHIFT_MASK) >> SHIFT_LSB
    }

    /// Index into the table of standard sample rates, or 15 if custom
    pub fn sample_rate_index(&self) -> u32 {
        (self.flags & SRATE_MASK) >> SRATE_LSB
    }

    /// Whether this block holds a single channel
    pub fn is_mono(&self) -> bool {
        is_mono(self.flags)
    }
}

impl FromBitStream for BlockHeader {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        if r.read_to::<[u8; 4]>()? != Self::ID {
            return Err(Error::InvalidBlockId);
        }

        Ok(Self {
            ck_size: r.read::<32, _>()?,
            version: r.read::<16, _>()?,
            track_no: r.read::<8, _>()?,
            index_no: r.read::<8, _>()?,
            total_samples: r.read::<32, _>()?,
            block_index: r.read::<32, _>()?,
            block_samples: r.read::<32, _>()?,
            flags: r.read::<32, _>()?,
            crc: r.read::<32, _>()?,
        })
    }
}

impl ToBitStream for BlockHeader {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_bytes(&Self::ID)?;
        w.write::<32, _>(self.ck_size)?;
        w.write::<16, _>(self.version)?;
        w.write::<8, _>(self.track_no)?;
        w.write::<8, _>(self.index_no)?;
        w.write::<32, _>(self.total_samples)?;
        w.write::<32, _>(self.block_index)?;
        w.write::<32, _>(self.block_samples)?;
        w.write::<32, _>(self.flags)?;
        w.write::<32, _>(self.crc)
    }
}

/// A metadata sub-chunk's type
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MetadataId {
    /// Decorrelation terms and deltas
    DecorrTerms = 0x2,
    /// Decorrelation weights
    DecorrWeights = 0x3,
    /// Decorrelation sample history
    DecorrSamples = 0x4,
    /// Entropy coder medians
    EntropyVars = 0x5,
    /// Hybrid slow levels and bitrate accumulators
    HybridProfile = 0x6,
    /// Noise shaping state
    ShapingWeights = 0x7,
    /// Primary compressed bitstream
    WvBitstream = 0xa,
    /// Correction compressed bitstream
    WvcBitstream = 0xb,
    /// Upper bytes of the encoder's configuration flags
    ConfigBlock = 0x25,
    /// MD5 sum of original PCM data
    Md5Checksum = 0x26,
    /// Non-standard sample rate
    SampleRate = 0x27,
}

impl MetadataId {
    /// Sub-chunk's payload length is odd
    pub const ODD_SIZE: u8 = 0x40;

    /// Sub-chunk's length field is 3 bytes rather than 1
    pub const LARGE: u8 = 0x80;

    /// Bits of the ID byte not used for flags
    const MASK: u8 = 0x3f;

    /// Whether this ID carries a compressed bitstream
    pub fn is_bitstream(&self) -> bool {
        matches!(self, Self::WvBitstream | Self::WvcBitstream)
    }
}

impl TryFrom<u8> for MetadataId {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self, Error> {
        match id & Self::MASK {
            0x2 => Ok(Self::DecorrTerms),
            0x3 => Ok(Self::DecorrWeights),
            0x4 => Ok(Self::DecorrSamples),
            0x5 => Ok(Self::EntropyVars),
            0x6 => Ok(Self::HybridProfile),
            0x7 => Ok(Self::ShapingWeights),
            0xa => Ok(Self::WvBitstream),
            0xb => Ok(Self::WvcBitstream),
            0x25 => Ok(Self::ConfigBlock),
            0x26 => Ok(Self::Md5Checksum),
            0x27 => Ok(Self::SampleRate),
            _ => Err(Error::UnknownMetadata(id)),
        }
    }
}

/// A typed, length-prefixed metadata sub-chunk
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MetadataItem {
    /// The sub-chunk's type
    pub id: MetadataId,
    /// The sub-chunk's payload, without padding
    pub data: Vec<u8>,
}

impl MetadataItem {
    /// Largest payload stored with a single length byte
    pub const MAX_SMALL: usize = 510;

    /// Builds sub-chunk from ID and payload
    pub fn new(id: MetadataId, data: Vec<u8>) -> Self {
        Self { id, data }
    }

    /// Whether the sub-chunk uses the 3 byte length field
    ///
    /// Bitstreams always use the large form.
    pub fn is_large(&self) -> bool {
        self.id.is_bitstream() || self.data.len() > Self::MAX_SMALL
    }

    /// Total bytes the sub-chunk occupies in a block
    pub fn encoded_len(&self) -> usize {
        let len = self.data.len();
        len + (len & 1) + if self.is_large() { 4 } else { 2 }
    }
}

impl FromBitStream for MetadataItem {
    type Error = Error;

    fn from_reader<R: BitRead + ?Sized>(r: &mut R) -> Result<Self, Self::Error> {
        let id_byte = r.read::<8, u8>()?;
        let words = if id_byte & MetadataId::LARGE != 0 {
            r.read::<24, u32>()?
        } else {
            r.read::<8, u32>()?
        };
        let padded = words as usize * 2;
        let len = match id_byte & MetadataId::ODD_SIZE {
            0 => padded,
            _ => padded.saturating_sub(1),
        };
        let data = r.read_to_vec(len)?;
        if padded > len {
            r.skip(8)?;
        }

        Ok(Self {
            id: MetadataId::try_from(id_byte)?,
            data,
        })
    }
}

impl ToBitStream for MetadataItem {
    type Error = std::io::Error;

    fn to_writer<W: BitWrite + ?Sized>(&self, w: &mut W) -> std::io::Result<()> {
        let len = self.data.len();
        let words = ((len + 1) >> 1) as u32;
        let odd = if len % 2 == 1 {
            MetadataId::ODD_SIZE
        } else {
            0
        };

        if self.is_large() {
            w.write::<8, u8>(self.id as u8 | odd | MetadataId::LARGE)?;
            w.write::<24, u32>(words)?;
        } else {
            w.write::<8, u8>(self.id as u8 | odd)?;
            w.write::<8, u32>(words)?;
        }
        w.write_bytes(&self.data)?;
        if odd != 0 {
            w.write::<8, u8>(0)?;
        }
        Ok(())
    }
}

/// A block under construction in a fixed-size buffer
///
/// The header's chunk size is kept in step
/// with every sub-chunk appended.
#[derive(Clone, Debug)]
pub struct BlockBuffer {
    header: BlockHeader,
    body: Vec<u8>,
    capacity: usize,
}

impl BlockBuffer {
    /// Starts an empty block with room for the given total bytes
    pub fn new(mut header: BlockHeader, capacity: usize) -> Self {
        header.ck_size = BlockHeader::SIZED;
        Self {
            header,
            body: Vec::new(),
            capacity,
        }
    }

    /// The block's header
    #[inline]
    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    /// The block's mutable header
    #[inline]
    pub fn header_mut(&mut self) -> &mut BlockHeader {
        &mut self.header
    }

    /// Current size of the whole block in bytes
    #[inline]
    pub fn len(&self) -> usize {
        BlockHeader::SIZE + self.body.len()
    }

    /// Whether block has no sub-chunks
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Appends sub-chunk to the block
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetadataOverflow`] if the sub-chunk
    /// would not fit into the block buffer.
    pub fn append(&mut self, item: &MetadataItem) -> Result<(), Error> {
        if self.len() + item.encoded_len() >= self.capacity {
            return Err(Error::MetadataOverflow);
        }
        self.push(item)
    }

    /// Room left for a bitstream sub-chunk's payload
    pub fn bitstream_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.len() + 4)
    }

    /// Appends a bitstream sub-chunk whose room was already
    /// reserved by [`BlockBuffer::bitstream_capacity`]
    pub fn push_bitstream(&mut self, id: MetadataId, data: Vec<u8>) -> Result<(), Error> {
        self.push(&MetadataItem::new(id, data))
    }

    fn push(&mut self, item: &MetadataItem) -> Result<(), Error> {
        BitWriter::endian(&mut self.body, LittleEndian).build(item)?;
        self.header.ck_size = BlockHeader::SIZED + self.body.len() as u32;
        Ok(())
    }

    /// Returns the finished block's bytes
    pub fn into_bytes(self) -> Result<Vec<u8>, Error> {
        let mut w = BitWriter::endian(Vec::with_capacity(self.len()), LittleEndian);
        w.build(&self.header)?;
        w.write_bytes(&self.body)?;
        Ok(w.into_writer())
    }
}

/// Parses a block's bytes into its header and sub-chunks
///
/// # Errors
///
/// Returns an error if the block is truncated
/// or contains an unknown sub-chunk.
pub fn read_block(bytes: &[u8]) -> Result<(BlockHeader, Vec<MetadataItem>), Error> {
    let mut r = BitReader::endian(bytes, LittleEndian);
    let header: BlockHeader = r.parse()?;
    let mut remaining = header.ck_size.saturating_sub(BlockHeader::SIZED) as usize;
    let mut items = Vec::new();

    while remaining > 0 {
        let item: MetadataItem = r.parse()?;
        remaining = remaining.saturating_sub(item.encoded_len());
        items.push(item);
    }

    Ok((header, items))
}
