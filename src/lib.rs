//! z64decompress - decompressor for Nintendo 64 Zelda ROMs
//!
//! This crate rebuilds a compressed Zelda 64 cartridge image into its
//! uncompressed layout. It locates the file table inside the ROM, decodes
//! each compressed file to its virtual address, rewrites the table so that
//! every file is marked as stored raw, and repairs the header checksum.
//!
//! # Features
//!
//! - Codecs: Yaz0, UCL (NRV2B), an in-place LZ4 variant and DEFLATE/zlib
//! - Standard and `dmaext` file tables
//! - Headerless (iQue-style) entries
//! - Single compressed file decoding
//! - N64 CIC header checksum repair
//! - Optional async wrappers (`async` feature)
//!
//! # Example - ROM rebuild
//!
//! ```no_run
//! use z64decompress::{decompress_rom_bytes, RomOptions};
//!
//! let rom = std::fs::read("oot.z64")?;
//! let image = decompress_rom_bytes(&rom, &RomOptions::new())?;
//! std::fs::write("oot.decompressed.z64", image)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Example - single file
//!
//! ```no_run
//! use z64decompress::{decompress_file_bytes, Codec};
//!
//! let data = std::fs::read("object.yaz0")?;
//! let plain = decompress_file_bytes(&data, None)?;
//! let forced = decompress_file_bytes(&data, Some(Codec::Yaz0))?;
//! assert_eq!(plain, forced);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

// Public modules
pub mod codec;
pub mod common;
pub mod crc32;
pub mod error;
pub mod rom;
pub mod source;

// Async modules (only available with async feature)
#[cfg(feature = "async")]
pub mod async_batch;
#[cfg(feature = "async")]
pub mod async_convenience;

// Re-export commonly used types
pub use codec::{CodecDescriptor, CODECS};
pub use common::{
    be_u32, write_be_u32, Codec, DecodeStats, Result, TableLayout, Z64Error, DMA_DELETED,
    DMA_ENTRY_SIZE, SHORT_HEADER_SIZE, YAZ0_HEADER_SIZE,
};
pub use crc32::crc32;
pub use rom::checksum::{ChecksumFixer, N64Checksum, NoChecksum};
pub use rom::{decompress_rom, DecompressOptions, RebuildStats, RomImage, RomOptions};
pub use source::{ByteSource, HeaderPrefixed, SourceWindow};

// Re-export async types when async feature is enabled
#[cfg(feature = "async")]
pub use async_batch::AsyncBatchProcessor;
#[cfg(feature = "async")]
pub use async_convenience::*;

// Convenience functions

/// Rebuild a compressed ROM and repair its checksum
///
/// # Arguments
/// * `rom` - The compressed ROM image
/// * `options` - Table layout, codec override and headerless flag
///
/// # Returns
/// The decompressed image
pub fn decompress_rom_bytes(rom: &[u8], options: &RomOptions) -> Result<Vec<u8>> {
    let image = decompress_rom(rom, options, &mut N64Checksum::new())?;
    Ok(image.data)
}

/// Decompress a single compressed file
///
/// # Arguments
/// * `data` - The compressed file, header included
/// * `codec` - Codec to use instead of sniffing the header
///
/// # Returns
/// The decompressed file
pub fn decompress_file_bytes(data: &[u8], codec: Option<Codec>) -> Result<Vec<u8>> {
    codec::decompress_file(data, codec).map(|(output, _)| output)
}

/// Decompress either a ROM or a single file, as `options` requests
pub fn decompress(data: &[u8], options: &DecompressOptions) -> Result<Vec<u8>> {
    options.validate()?;
    if options.individual {
        decompress_file_bytes(data, options.rom.codec)
    } else {
        decompress_rom_bytes(data, &options.rom)
    }
}
