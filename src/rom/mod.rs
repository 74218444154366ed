//! ROM reconstruction
//!
//! A rebuild locates the file table, sizes the output image so every live
//! file fits, places each file at its virtual address (decoding it if
//! needed), rewrites the table to describe the uncompressed layout and
//! finally repairs the header checksum.

pub mod checksum;
pub mod table;

use std::collections::HashMap;

use crate::codec::{self, synthetic_header};
use crate::source::HeaderPrefixed;
use crate::{Codec, Result, TableLayout, Z64Error};
use checksum::ChecksumFixer;
use log::{debug, info};
use table::{ExtTable, Revision, StandardTable};

/// How a ROM should be rebuilt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RomOptions {
    /// File table layout to look for
    pub layout: TableLayout,
    /// Codec for every compressed file, instead of sniffing headers
    pub codec: Option<Codec>,
    /// Physical offsets point at raw streams without codec headers
    pub headerless: bool,
}

impl RomOptions {
    /// Standard layout, sniffed codecs
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the table layout
    pub fn with_layout(mut self, layout: TableLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Force a codec
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Treat every compressed file as headerless
    pub fn with_headerless(mut self, headerless: bool) -> Self {
        self.headerless = headerless;
        self
    }

    /// Reject option combinations that cannot be honored
    pub fn validate(&self) -> Result<()> {
        if self.layout == TableLayout::DmaExt && self.codec.is_none() {
            return Err(Z64Error::IncompatibleOptions(
                "dmaext tables require an explicit codec".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level request: a whole ROM or one compressed file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecompressOptions {
    /// Options for ROM rebuilds; only `codec` applies to individual files
    pub rom: RomOptions,
    /// Decode a single compressed file instead of a ROM
    pub individual: bool,
}

impl DecompressOptions {
    /// Reject option combinations that cannot be honored
    pub fn validate(&self) -> Result<()> {
        if self.individual {
            if self.rom.layout == TableLayout::DmaExt {
                return Err(Z64Error::IncompatibleOptions(
                    "individual files cannot use a dmaext table".to_string(),
                ));
            }
            return Ok(());
        }
        self.rom.validate()
    }
}

/// Counters collected during a rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildStats {
    /// Entries decoded through a codec
    pub decoded: usize,
    /// Entries copied raw
    pub copied: usize,
    /// Deleted or empty entries left alone
    pub skipped: usize,
    /// Decoded entries per codec
    pub codecs: HashMap<Codec, usize>,
    /// Compressed bytes read by codecs
    pub compressed_bytes: usize,
    /// Bytes placed in the image, raw and decoded
    pub output_bytes: usize,
}

impl RebuildStats {
    fn record_decode(&mut self, codec: Codec, compressed: usize, output: usize) {
        self.decoded += 1;
        *self.codecs.entry(codec).or_insert(0) += 1;
        self.compressed_bytes += compressed;
        self.output_bytes += output;
    }

    fn record_copy(&mut self, length: usize) {
        self.copied += 1;
        self.output_bytes += length;
    }
}

/// A rebuilt image and where its table lives
#[derive(Debug, Clone)]
pub struct RomImage {
    /// The decompressed image
    pub data: Vec<u8>,
    /// Offset of the file table
    pub table_offset: usize,
    /// Number of table entries
    pub entries: usize,
    /// Rebuild counters
    pub stats: RebuildStats,
}

/// Smallest `max(len, 1) * 2^n` that reaches `end`
pub fn image_size(rom_len: usize, end: u32) -> Result<usize> {
    let end = end as usize;
    let mut size = rom_len.max(1);
    while end > size {
        size = size.checked_mul(2).ok_or_else(|| {
            Z64Error::OutOfBounds(format!("image for end {end:#x} is too large"))
        })?;
    }
    Ok(size)
}

/// Rebuilds one ROM
#[derive(Debug)]
pub struct Rebuilder<'a> {
    rom: &'a [u8],
    options: RomOptions,
}

impl<'a> Rebuilder<'a> {
    /// Prepare a rebuild of `rom`; fails before any work on bad options
    pub fn new(rom: &'a [u8], options: RomOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { rom, options })
    }

    /// Run the rebuild, then hand the finished image to `fixer`
    pub fn rebuild(&self, fixer: &mut dyn ChecksumFixer) -> Result<RomImage> {
        let mut image = match self.options.layout {
            TableLayout::Standard => self.rebuild_standard()?,
            TableLayout::DmaExt => self.rebuild_dmaext()?,
        };
        fixer.fix(&mut image.data)?;

        info!(
            "rebuilt {} byte image: {} decoded, {} copied, {} skipped",
            image.data.len(),
            image.stats.decoded,
            image.stats.copied,
            image.stats.skipped
        );
        Ok(image)
    }

    fn rebuild_standard(&self) -> Result<RomImage> {
        let mut table = StandardTable::locate(self.rom)?;
        info!("found file table at {:#x}", table.offset);

        let headerless = self.options.headerless || table.revision.is_headerless();
        let codec = match (self.options.codec, table.revision) {
            (Some(codec), _) => Some(codec),
            (None, Revision::IQue) => Some(Codec::Zlib),
            (None, Revision::Retail) if headerless => Some(Codec::Zlib),
            (None, Revision::Retail) => None,
        };

        let size = image_size(self.rom.len(), table.max_live_end())?;
        let mut data = vec![0u8; size];
        let mut stats = RebuildStats::default();

        for entry in &mut table.entries {
            if !entry.is_live() {
                stats.skipped += 1;
                continue;
            }

            let virt = entry.virt_start as usize;
            let phys = entry.phys_start as usize;
            if entry.is_compressed() {
                let body = slice(self.rom, phys, entry.phys_end as usize)
                    .map_err(|err| err.at_entry(entry.offset))?;
                let (codec, produced) = self
                    .decode_entry(body, codec, headerless, entry.virt_len(), &mut data[virt..])
                    .map_err(|err| err.at_entry(entry.offset))?;
                debug!(
                    "entry {:#x}: {codec} {:#x}..{:#x} -> {virt:#x} ({produced} bytes)",
                    entry.offset, phys, entry.phys_end
                );
                stats.record_decode(codec, body.len(), produced);
            } else {
                let length = entry.virt_len();
                let body = slice(self.rom, phys, phys + length)
                    .map_err(|err| err.at_entry(entry.offset))?;
                data[virt..virt + length].copy_from_slice(body);
                stats.record_copy(length);
            }
            entry.mark_raw();
        }

        table.write_to(&mut data);
        Ok(RomImage {
            data,
            table_offset: table.offset,
            entries: table.entries.len(),
            stats,
        })
    }

    fn rebuild_dmaext(&self) -> Result<RomImage> {
        let mut table = ExtTable::locate(self.rom)?;
        info!("found dmaext table at {:#x}", table.offset);

        let size = image_size(self.rom.len(), table.max_live_end())?;
        let mut data = vec![0u8; size];
        let mut stats = RebuildStats::default();

        for index in 0..table.entries.len() {
            let entry = table.entries[index];
            if !entry.is_live() {
                stats.skipped += 1;
                continue;
            }

            let virt = entry.virt_start as usize;
            let phys = entry.phys_start() as usize;
            if entry.is_compressed() {
                let length = table.compressed_len(index, self.rom.len());
                let body = slice(self.rom, phys, phys + length)
                    .map_err(|err| err.at_entry(entry.offset))?;
                let (codec, produced) = self
                    .decode_entry(
                        body,
                        self.options.codec,
                        !entry.has_header(),
                        entry.virt_len(),
                        &mut data[virt..],
                    )
                    .map_err(|err| err.at_entry(entry.offset))?;
                debug!(
                    "entry {:#x}: {codec} {phys:#x}+{length:#x} -> {virt:#x} ({produced} bytes)",
                    entry.offset
                );
                stats.record_decode(codec, length, produced);
            } else {
                let length = entry.virt_len();
                let body = slice(self.rom, phys, phys + length)
                    .map_err(|err| err.at_entry(entry.offset))?;
                data[virt..virt + length].copy_from_slice(body);
                stats.record_copy(length);
            }
            table.entries[index].mark_raw();
        }

        table.write_to(self.rom, &mut data);
        Ok(RomImage {
            data,
            table_offset: table.offset,
            entries: table.entries.len(),
            stats,
        })
    }

    /// Decode one compressed file into `dst`
    fn decode_entry(
        &self,
        body: &[u8],
        codec: Option<Codec>,
        headerless: bool,
        virt_len: usize,
        dst: &mut [u8],
    ) -> Result<(Codec, usize)> {
        if headerless {
            let codec = codec.ok_or_else(|| {
                Z64Error::IncompatibleOptions("headerless files require a codec".to_string())
            })?;
            let source = HeaderPrefixed::new(synthetic_header(codec, virt_len as u32), body);
            let produced = codec::decode(codec, &source, dst)?;
            return Ok((codec, produced));
        }

        let codec = codec::select(body, codec)?;
        let produced = codec::decode(codec, body, dst)?;
        Ok((codec, produced))
    }
}

fn slice(rom: &[u8], start: usize, end: usize) -> Result<&[u8]> {
    if start > end || end > rom.len() {
        return Err(Z64Error::Truncated {
            offset: start,
            length: end.saturating_sub(start),
            available: rom.len(),
        });
    }
    Ok(&rom[start..end])
}

/// Rebuild `rom` with `options`, repairing the checksum with `fixer`
pub fn decompress_rom(
    rom: &[u8],
    options: &RomOptions,
    fixer: &mut dyn ChecksumFixer,
) -> Result<RomImage> {
    Rebuilder::new(rom, options.clone())?.rebuild(fixer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write_be_u32;
    use checksum::NoChecksum;

    #[test]
    fn test_image_size_doubles() {
        assert_eq!(image_size(0x1000, 0x800).unwrap(), 0x1000);
        assert_eq!(image_size(0x1000, 0x1000).unwrap(), 0x1000);
        assert_eq!(image_size(0x1000, 0x1001).unwrap(), 0x2000);
        assert_eq!(image_size(0x1000, 0x3800).unwrap(), 0x4000);
        assert_eq!(image_size(0, 3).unwrap(), 4);
        assert_eq!(image_size(0x3000, 0x5000).unwrap(), 0x6000);
    }

    #[test]
    fn test_dmaext_requires_codec() {
        let options = RomOptions::new().with_layout(TableLayout::DmaExt);
        assert!(matches!(
            options.validate(),
            Err(Z64Error::IncompatibleOptions(_))
        ));
        assert!(options.with_codec(Codec::Yaz0).validate().is_ok());
    }

    #[test]
    fn test_individual_rejects_dmaext() {
        let options = DecompressOptions {
            rom: RomOptions::new()
                .with_layout(TableLayout::DmaExt)
                .with_codec(Codec::Yaz0),
            individual: true,
        };
        assert!(options.validate().is_err());
        assert!(DecompressOptions {
            individual: true,
            ..Default::default()
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn test_rebuild_rejects_bad_options_before_scanning() {
        let rom = vec![0u8; 16];
        let options = RomOptions::new().with_layout(TableLayout::DmaExt);
        assert!(matches!(
            decompress_rom(&rom, &options, &mut NoChecksum),
            Err(Z64Error::IncompatibleOptions(_))
        ));
    }

    #[test]
    fn test_raw_copy_and_rewrite() {
        let mut rom = vec![0u8; 0x2000];
        let t = 0x1100;
        write_be_u32(&mut rom, t + 4, 0x1060);
        write_be_u32(&mut rom, t + 16, 0x1060);
        write_be_u32(&mut rom, t + 20, 0x1800);
        write_be_u32(&mut rom, t + 24, 0x1060);
        write_be_u32(&mut rom, t + 32, t as u32);
        write_be_u32(&mut rom, t + 36, (t + 0x40) as u32);
        write_be_u32(&mut rom, t + 40, t as u32);
        // raw file relocated from 0x1C00 to 0x3000
        write_be_u32(&mut rom, t + 48, 0x3000);
        write_be_u32(&mut rom, t + 52, 0x3010);
        write_be_u32(&mut rom, t + 56, 0x1C00);
        rom[0x1C00..0x1C10].copy_from_slice(b"0123456789abcdef");

        let image = decompress_rom(&rom, &RomOptions::new(), &mut NoChecksum).unwrap();
        assert_eq!(image.data.len(), 0x4000);
        assert_eq!(image.table_offset, t);
        assert_eq!(image.entries, 4);
        assert_eq!(&image.data[0x3000..0x3010], b"0123456789abcdef");
        assert_eq!(crate::be_u32(&image.data, t + 56), 0x3000);
        assert_eq!(crate::be_u32(&image.data, t + 60), 0);
        assert_eq!(image.stats.copied, 4);
    }
}
