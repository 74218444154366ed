//! Async convenience functions
//!
//! This module provides async wrappers for ROM rebuilds and single-file
//! decoding. Files are read and written with `tokio::fs`; the decode itself
//! is CPU-bound and runs on the blocking pool.

#[cfg(feature = "async")]
pub mod functions {
    use crate::rom::checksum::{N64Checksum, NoChecksum};
    use crate::{Codec, DecodeStats, RebuildStats, Result, RomImage, RomOptions, Z64Error};
    use std::path::Path;
    use tokio::task::JoinError;

    fn join_error(err: JoinError) -> Z64Error {
        Z64Error::Io(std::io::Error::other(err))
    }

    /// Rebuild a ROM held in memory
    pub async fn decompress_rom_async(
        rom: Vec<u8>,
        options: RomOptions,
        fix_checksum: bool,
    ) -> Result<RomImage> {
        tokio::task::spawn_blocking(move || {
            if fix_checksum {
                crate::decompress_rom(&rom, &options, &mut N64Checksum::new())
            } else {
                crate::decompress_rom(&rom, &options, &mut NoChecksum)
            }
        })
        .await
        .map_err(join_error)?
    }

    /// Decode a single compressed file held in memory
    pub async fn decompress_file_bytes_async(
        data: Vec<u8>,
        codec: Option<Codec>,
    ) -> Result<(Vec<u8>, DecodeStats)> {
        tokio::task::spawn_blocking(move || crate::codec::decompress_file(&data, codec))
            .await
            .map_err(join_error)?
    }

    /// Rebuild the ROM at `input_path` and write the image to `output_path`
    pub async fn decompress_rom_file_async<P1: AsRef<Path>, P2: AsRef<Path>>(
        input_path: P1,
        output_path: P2,
        options: RomOptions,
    ) -> Result<RebuildStats> {
        options.validate()?;
        let rom = tokio::fs::read(input_path).await?;
        let image = decompress_rom_async(rom, options, true).await?;
        tokio::fs::write(output_path, &image.data).await?;
        Ok(image.stats)
    }

    /// Decode the compressed file at `input_path` into `output_path`
    pub async fn decompress_file_async<P1: AsRef<Path>, P2: AsRef<Path>>(
        input_path: P1,
        output_path: P2,
        codec: Option<Codec>,
    ) -> Result<DecodeStats> {
        let data = tokio::fs::read(input_path).await?;
        let (output, stats) = decompress_file_bytes_async(data, codec).await?;
        tokio::fs::write(output_path, &output).await?;
        Ok(stats)
    }
}

#[cfg(feature = "async")]
pub use functions::*;
