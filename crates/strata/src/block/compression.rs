//! Block payload compression.
//!
//! The codec of a block is identified by a one-byte [`CompressionType`] stored in
//! the block header. LZ4 payloads carry their uncompressed length as a 4-byte
//! little-endian prefix.

use crate::error::{Result, StrataError};

/// Compression codec of a block payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum CompressionType {
    /// Payload stored as written.
    #[default]
    None = 0,
    /// LZ4 block format with a size prefix.
    Lz4 = 1,
}

impl CompressionType {
    /// Creates a CompressionType from a u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Lz4),
            _ => None,
        }
    }

    /// Like [`CompressionType::from_u8`], failing on unknown codes.
    pub fn try_from_u8(value: u8) -> Result<Self> {
        Self::from_u8(value).ok_or(StrataError::UnknownCompressionType(value))
    }

    /// The code stored in block headers.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Creates a compressor for this codec.
    pub fn compressor(self) -> Box<dyn Compressor> {
        match self {
            Self::None => Box::new(NoCompression),
            Self::Lz4 => Box::new(Lz4Compression),
        }
    }

    /// Creates a decompressor for this codec.
    pub fn decompressor(self) -> Box<dyn Decompressor> {
        match self {
            Self::None => Box::new(NoCompression),
            Self::Lz4 => Box::new(Lz4Compression),
        }
    }
}

/// Compresses block payloads.
pub trait Compressor {
    /// The codec this compressor produces.
    fn compression_type(&self) -> CompressionType;

    /// Compresses `data`.
    fn compress(&mut self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Decompresses block payloads.
pub trait Decompressor {
    /// The codec this decompressor reads.
    fn compression_type(&self) -> CompressionType;

    /// Decompresses `data`.
    fn decompress(&mut self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Identity codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl Compressor for NoCompression {
    fn compression_type(&self) -> CompressionType {
        CompressionType::None
    }

    fn compress(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

impl Decompressor for NoCompression {
    fn compression_type(&self) -> CompressionType {
        CompressionType::None
    }

    fn decompress(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// LZ4 codec backed by `lz4_flex`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Compression;

impl Compressor for Lz4Compression {
    fn compression_type(&self) -> CompressionType {
        CompressionType::Lz4
    }

    fn compress(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(data))
    }
}

impl Decompressor for Lz4Compression {
    fn compression_type(&self) -> CompressionType {
        CompressionType::Lz4
    }

    fn decompress(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        lz4_flex::decompress_size_prepended(data)
            .map_err(|e| StrataError::DecompressionError(e.to_string()))
    }
}
