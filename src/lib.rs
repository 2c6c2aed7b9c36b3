//! A library for encoding WavPack audio streams
//!
//! WavPack is a lossless audio codec with an optional
//! hybrid mode.  In hybrid mode the primary stream is lossy
//! at a chosen bitrate while an optional correction stream
//! holds whatever is needed to restore the original samples
//! bit-for-bit.
//!
//! Encoding consists of a chain of adaptive decorrelation
//! passes feeding an adaptive entropy coder, whose output
//! is framed into self-contained blocks of
//! header, metadata and compressed payload.
//!
//! # Example
//!
//! ```
//! use wavpack_encoder::{encode::Encoder, config::EncodingOptions};
//! use std::io::Cursor;
//! use std::num::NonZero;
//!
//! let mut wv = Cursor::new(vec![]);
//!
//! let mut encoder: Encoder<_> = Encoder::new(
//!     &mut wv,
//!     None,
//!     EncodingOptions::default(),
//!     44100,
//!     16,
//!     NonZero::new(2).unwrap(),
//!     Some(4),
//! ).unwrap();
//!
//! encoder.encode(&[0, 0, 1, -1, 2, -2, 3, -3]).unwrap();
//! encoder.finalize().unwrap();
//!
//! assert_eq!(&wv.get_ref()[0..4], b"wvpk");
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod bitstream;
pub mod config;
pub mod decorr;
pub mod encode;
pub mod log2;
pub mod metadata;
pub mod pack;
pub mod pcm;
pub mod words;

/// A WavPack encoding error
#[derive(Debug)]
pub enum Error {
    /// A general I/O error from the underlying stream
    Io(std::io::Error),
    /// Bits-per-sample is outside of 1 to 24
    InvalidBitsPerSample,
    /// More than 2 channels
    ExcessiveChannels,
    /// Sample rate is zero or exceeds 24 bits
    InvalidSampleRate,
    /// Hybrid bitrate outside of 2.0 to 16.0 bits per sample
    InvalidBitrate,
    /// Noise shaping weight outside of -1.0 to 1.0
    InvalidShapingWeight,
    /// Block buffer too small to be useful
    InvalidBufferSize,
    /// Option only meaningful in hybrid mode
    HybridOnly,
    /// Attempt to pack samples without an open block
    BlockNotOpen,
    /// Attempt to open a block while one is still open
    BlockAlreadyOpen,
    /// Block metadata does not fit into the block buffer
    MetadataOverflow,
    /// Bitstream exhausted its share of the block buffer
    BitstreamOverflow,
    /// An empty block was unable to pack a single sample
    NoProgress,
    /// Sample buffer does not contain whole PCM frames
    PartialFrame,
    /// More samples written than indicated
    ExcessiveTotalSamples,
    /// Total samples written differs from total indicated
    SampleCountMismatch,
    /// Block does not start with the WavPack chunk ID
    InvalidBlockId,
    /// Unrecognized metadata sub-chunk ID
    UnknownMetadata(u8),
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Io(e) => e.fmt(f),
            Self::InvalidBitsPerSample => "invalid bits-per-sample".fmt(f),
            Self::ExcessiveChannels => "excessive channel count".fmt(f),
            Self::InvalidSampleRate => "invalid sample rate".fmt(f),
            Self::InvalidBitrate => "hybrid bitrate must be between 2.0 and 16.0".fmt(f),
            Self::InvalidShapingWeight => "noise shaping weight must be between -1.0 and 1.0".fmt(f),
            Self::InvalidBufferSize => "block buffer size too small".fmt(f),
            Self::HybridOnly => "correction and noise shaping are for hybrid mode only".fmt(f),
            Self::BlockNotOpen => "no block open for packing".fmt(f),
            Self::BlockAlreadyOpen => "block already open".fmt(f),
            Self::MetadataOverflow => "metadata exceeds block buffer".fmt(f),
            Self::BitstreamOverflow => "bitstream exceeds block buffer".fmt(f),
            Self::NoProgress => "unable to pack any samples into block".fmt(f),
            Self::PartialFrame => "samples not a multiple of channel count".fmt(f),
            Self::ExcessiveTotalSamples => "total samples exceeded".fmt(f),
            Self::SampleCountMismatch => "sample count mismatch".fmt(f),
            Self::InvalidBlockId => "invalid WavPack block ID".fmt(f),
            Self::UnknownMetadata(id) => write!(f, "unknown metadata ID 0x{id:02X}"),
        }
    }
}
