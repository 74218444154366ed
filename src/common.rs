//! Common types and constants for N64 ROM decompression
//!
//! This module defines the core types, constants, and error type shared by
//! the codecs, the byte-source layer and the ROM rebuilder.

use thiserror::Error;

/// Compression codec that can decode a table-referenced file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// LZ77 block format with control bytes ("Yaz0")
    Yaz0,
    /// Bit-oriented LZ format with repeat offsets ("UCL0")
    Ucl,
    /// In-place LZ4 block variant ("LZ4H")
    Lz4h,
    /// Resumable DEFLATE inflater with optional zlib header ("ZLIB")
    Zlib,
}

impl Codec {
    /// All decodable codecs, in registry order
    pub const ALL: [Codec; 4] = [Codec::Yaz0, Codec::Ucl, Codec::Lz4h, Codec::Zlib];

    /// Look up a codec by its short name (`yaz`, `ucl`, `lz4h`, `zlib`)
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "yaz" | "yaz0" => Ok(Codec::Yaz0),
            "ucl" => Ok(Codec::Ucl),
            "lz4h" => Ok(Codec::Lz4h),
            "zlib" | "deflate" => Ok(Codec::Zlib),
            _ => Err(Z64Error::IncompatibleOptions(format!(
                "unknown codec name '{name}'"
            ))),
        }
    }

    /// Short name of the codec
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Yaz0 => "yaz",
            Codec::Ucl => "ucl",
            Codec::Lz4h => "lz4h",
            Codec::Zlib => "zlib",
        }
    }

    /// Length of the per-file header the codec skips before its payload
    pub fn header_len(&self) -> usize {
        match self {
            Codec::Yaz0 => YAZ0_HEADER_SIZE,
            Codec::Ucl | Codec::Lz4h | Codec::Zlib => SHORT_HEADER_SIZE,
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// File table layout inside a ROM image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableLayout {
    /// Fixed 16-byte entries located by the self-referencing signature
    #[default]
    Standard,
    /// Variable 8/12-byte entries with flag bits in the physical-start word
    DmaExt,
}

/// Error type for decompression operations
#[derive(Debug, Error)]
pub enum Z64Error {
    /// The file table signature was never matched
    #[error("failed to locate {0} file table in rom")]
    StructureNotFound(&'static str),

    /// No registered codec matches the file header and no override was given
    #[error("unknown codec header {magic:02x?}")]
    UnknownCodec {
        /// The leading four bytes of the compressed file
        magic: [u8; 4],
    },

    /// The header matched a registered codec that has no decoder
    #[error("codec '{name}' is recognized but not supported for decoding")]
    UnsupportedCodec {
        /// Short name of the matched descriptor
        name: &'static str,
    },

    /// The DEFLATE stream is malformed
    #[error("malformed stream: {0}")]
    MalformedStream(String),

    /// The requested option combination cannot be honored
    #[error("incompatible options: {0}")]
    IncompatibleOptions(String),

    /// A read went past the end of a byte source
    #[error("read of {length} bytes at offset {offset:#x} exceeds source of {available} bytes")]
    Truncated {
        /// Offset of the attempted read
        offset: usize,
        /// Length of the attempted read
        length: usize,
        /// Total size of the source
        available: usize,
    },

    /// A decoder access would leave the buffer it was given
    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    /// A file table entry failed while being processed
    #[error("dma entry at {offset:08x}: {source}")]
    Entry {
        /// Offset of the entry inside the image
        offset: usize,
        /// Underlying failure
        #[source]
        source: Box<Z64Error>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Z64Error {
    /// Attach the table offset of the entry being processed
    pub fn at_entry(self, offset: usize) -> Self {
        Z64Error::Entry {
            offset,
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through entry context
    pub fn root(&self) -> &Z64Error {
        match self {
            Z64Error::Entry { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for decompression operations
pub type Result<T> = std::result::Result<T, Z64Error>;

// Format constants

/// Header length of a Yaz0 file
pub const YAZ0_HEADER_SIZE: usize = 0x10;

/// Header length of the UCL, LZ4H and zlib files
pub const SHORT_HEADER_SIZE: usize = 0x08;

/// Size of one standard file table entry
pub const DMA_ENTRY_SIZE: usize = 0x10;

/// Field value marking a deleted table entry
pub const DMA_DELETED: u32 = 0xFFFF_FFFF;

/// Read a big-endian u32 at `offset`
pub fn be_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Write `value` as a big-endian u32 at `offset`
pub fn write_be_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

/// Statistics for a single decode operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DecodeStats {
    /// Codec that produced the output
    pub codec: Option<Codec>,
    /// Compressed bytes handed to the codec
    pub input_bytes: usize,
    /// Decompressed bytes produced
    pub output_bytes: usize,
}
