//! File table discovery
//!
//! Neither layout is referenced from anywhere in the ROM, so both are found
//! by scanning for the entries every table starts with: the boot file at
//! virtual 0 and the table's own entry right after it.

use crate::{be_u32, write_be_u32, Result, Z64Error, DMA_DELETED, DMA_ENTRY_SIZE};
use log::{debug, trace};

/// Index of the entry that describes the table itself
const SELF_INDEX: usize = 2;

/// Virtual end of the boot file on retail cartridges
const RETAIL_BOOT_END: u32 = 0x1060;

/// Virtual end of the boot file on iQue Player images
const IQUE_BOOT_END: u32 = 0x1050;

/// Hardware revision implied by the matched signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revision {
    /// Retail cartridge layout; files carry their codec header
    Retail,
    /// iQue Player layout; physical offsets point past the codec header
    IQue,
}

impl Revision {
    fn boot_end(self) -> u32 {
        match self {
            Revision::Retail => RETAIL_BOOT_END,
            Revision::IQue => IQUE_BOOT_END,
        }
    }

    /// Whether physical offsets skip the per-file header
    pub fn is_headerless(self) -> bool {
        self == Revision::IQue
    }
}

fn standard_signature(boot_end: u32) -> [u8; 20] {
    let mut signature = [0u8; 20];
    write_be_u32(&mut signature, 4, boot_end);
    write_be_u32(&mut signature, 16, boot_end);
    signature
}

/// One entry of a standard table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaEntry {
    /// Offset of the entry inside the ROM
    pub offset: usize,
    /// Start of the file in the decompressed image
    pub virt_start: u32,
    /// End of the file in the decompressed image
    pub virt_end: u32,
    /// Start of the file in the ROM
    pub phys_start: u32,
    /// End of the compressed file in the ROM, 0 when stored raw
    pub phys_end: u32,
}

impl DmaEntry {
    /// Read the entry at `offset`
    pub fn read(rom: &[u8], offset: usize) -> Self {
        Self {
            offset,
            virt_start: be_u32(rom, offset),
            virt_end: be_u32(rom, offset + 4),
            phys_start: be_u32(rom, offset + 8),
            phys_end: be_u32(rom, offset + 12),
        }
    }

    /// Whether the entry describes a file that must be placed in the image
    pub fn is_live(&self) -> bool {
        let deleted = [self.virt_start, self.virt_end, self.phys_start, self.phys_end]
            .contains(&DMA_DELETED);
        !deleted
            && self.virt_end > self.virt_start
            && !(self.phys_end != 0 && self.phys_end == self.phys_start)
    }

    /// Whether the file is stored compressed
    pub fn is_compressed(&self) -> bool {
        self.phys_end != 0
    }

    /// Decompressed size of the file
    pub fn virt_len(&self) -> usize {
        (self.virt_end - self.virt_start) as usize
    }

    /// Mark the file as stored raw at its virtual address
    pub fn mark_raw(&mut self) {
        self.phys_start = self.virt_start;
        self.phys_end = 0;
    }

    fn write(&self, dst: &mut [u8], offset: usize) {
        write_be_u32(dst, offset, self.virt_start);
        write_be_u32(dst, offset + 4, self.virt_end);
        write_be_u32(dst, offset + 8, self.phys_start);
        write_be_u32(dst, offset + 12, self.phys_end);
    }
}

/// A standard table located in a ROM
#[derive(Debug, Clone)]
pub struct StandardTable {
    /// Offset of the first entry
    pub offset: usize,
    /// Hardware revision of the matched signature
    pub revision: Revision,
    /// All entries, live or not
    pub entries: Vec<DmaEntry>,
}

impl StandardTable {
    /// Scan `rom` for the table
    ///
    /// Candidates are checked every 16 bytes. A candidate must start with the
    /// boot and table entries and its third entry must point back at the
    /// candidate offset. The last candidate in the ROM wins.
    pub fn locate(rom: &[u8]) -> Result<Self> {
        let mut found = None;
        let end = rom.len().saturating_sub(32);

        for offset in (0..end).step_by(DMA_ENTRY_SIZE) {
            for revision in [Revision::Retail, Revision::IQue] {
                if let Some(count) = Self::match_at(rom, offset, revision) {
                    trace!("table candidate at {offset:#x} ({revision:?}, {count} entries)");
                    found = Some((offset, revision, count));
                }
            }
        }

        let (offset, revision, count) =
            found.ok_or(Z64Error::StructureNotFound("standard"))?;
        let entries = (0..count)
            .map(|i| DmaEntry::read(rom, offset + i * DMA_ENTRY_SIZE))
            .collect();
        debug!("standard table at {offset:#x}: {count} entries, {revision:?}");

        Ok(Self {
            offset,
            revision,
            entries,
        })
    }

    fn match_at(rom: &[u8], offset: usize, revision: Revision) -> Option<usize> {
        let self_entry = offset + SELF_INDEX * DMA_ENTRY_SIZE;
        if self_entry + 8 > rom.len() {
            return None;
        }
        if rom[offset..offset + 20] != standard_signature(revision.boot_end()) {
            return None;
        }
        if be_u32(rom, self_entry) as usize != offset {
            return None;
        }

        let table_end = be_u32(rom, self_entry + 4) as usize;
        let count = table_end.checked_sub(offset)? / DMA_ENTRY_SIZE;
        if count <= SELF_INDEX || offset + count * DMA_ENTRY_SIZE > rom.len() {
            return None;
        }
        Some(count)
    }

    /// Size of the table in bytes
    pub fn byte_len(&self) -> usize {
        self.entries.len() * DMA_ENTRY_SIZE
    }

    /// Largest virtual end among live entries
    pub fn max_live_end(&self) -> u32 {
        self.entries
            .iter()
            .filter(|entry| entry.is_live())
            .map(|entry| entry.virt_end)
            .max()
            .unwrap_or(0)
    }

    /// Copy the table, with its current entry values, to its offset in `dst`
    pub fn write_to(&self, dst: &mut [u8]) {
        for (i, entry) in self.entries.iter().enumerate() {
            entry.write(dst, self.offset + i * DMA_ENTRY_SIZE);
        }
    }
}

/// Flag bits of a dmaext physical-start word
pub mod flags {
    /// The file is compressed
    pub const COMPRESSED: u32 = 0x8000_0000;
    /// The entry has no virtual-end word; the next entry's start is its end
    pub const OVERLAP: u32 = 0x0000_0001;
    /// The compressed file keeps its codec header
    pub const HEADER: u32 = 0x0000_0002;
    /// Bits holding the physical offset
    pub const OFFSET_MASK: u32 = 0x7FFF_FFFC;
}

const EXT_SIGNATURE: [u8; 16] = [
    0x00, 0x00, 0x00, 0x00, // boot virtual start
    0x00, 0x00, 0x00, 0x00, // boot physical start, raw
    0x00, 0x00, 0x10, 0x60, // boot virtual end
    0x00, 0x00, 0x10, 0x60, // next virtual start
];

/// One entry of a dmaext table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtEntry {
    /// Offset of the entry inside the ROM
    pub offset: usize,
    /// Start of the file in the decompressed image
    pub virt_start: u32,
    /// Physical offset and flag bits
    pub phys_word: u32,
    /// End of the file in the decompressed image
    pub virt_end: u32,
}

impl ExtEntry {
    /// Physical offset of the file in the ROM
    pub fn phys_start(&self) -> u32 {
        self.phys_word & flags::OFFSET_MASK
    }

    /// Whether the file is stored compressed
    pub fn is_compressed(&self) -> bool {
        self.phys_word & flags::COMPRESSED != 0
    }

    /// Whether the entry omits its virtual-end word
    pub fn is_overlap(&self) -> bool {
        self.phys_word & flags::OVERLAP != 0
    }

    /// Whether the compressed file keeps its codec header
    pub fn has_header(&self) -> bool {
        self.phys_word & flags::HEADER != 0
    }

    /// Whether the entry describes a file that must be placed in the image
    pub fn is_live(&self) -> bool {
        self.phys_word != DMA_DELETED
            && self.virt_start != DMA_DELETED
            && self.virt_end != DMA_DELETED
            && self.virt_end > self.virt_start
    }

    /// Decompressed size of the file
    pub fn virt_len(&self) -> usize {
        (self.virt_end - self.virt_start) as usize
    }

    /// Clear the compressed bit, keeping the other flags
    pub fn mark_raw(&mut self) {
        self.phys_word &= !flags::COMPRESSED;
    }
}

/// A dmaext table located in a ROM
#[derive(Debug, Clone)]
pub struct ExtTable {
    /// Offset of the first entry
    pub offset: usize,
    /// Entries up to, not including, the terminator
    pub entries: Vec<ExtEntry>,
    /// Size of the table in bytes, terminator included
    pub byte_len: usize,
}

impl ExtTable {
    /// Scan `rom` for the first dmaext signature and walk the table
    pub fn locate(rom: &[u8]) -> Result<Self> {
        let offset = rom
            .windows(EXT_SIGNATURE.len())
            .step_by(4)
            .position(|window| window == EXT_SIGNATURE)
            .map(|index| index * 4)
            .ok_or(Z64Error::StructureNotFound("dmaext"))?;

        let table = Self::walk(rom, offset)?;
        debug!(
            "dmaext table at {offset:#x}: {} entries",
            table.entries.len()
        );
        Ok(table)
    }

    fn walk(rom: &[u8], offset: usize) -> Result<Self> {
        let word = |at: usize| -> Result<u32> {
            if at + 4 > rom.len() {
                return Err(Z64Error::OutOfBounds(format!(
                    "dmaext table at {offset:#x} runs past end of rom"
                )));
            }
            Ok(be_u32(rom, at))
        };

        let mut entries: Vec<ExtEntry> = Vec::new();
        let mut at = offset;
        loop {
            let virt_start = word(at)?;
            if virt_start == 0 && at != offset {
                break;
            }
            let phys_word = word(at + 4)?;
            let (virt_end, stride) = if phys_word & flags::OVERLAP != 0 {
                (0, 8)
            } else {
                (word(at + 8)?, 12)
            };
            entries.push(ExtEntry {
                offset: at,
                virt_start,
                phys_word,
                virt_end,
            });
            at += stride;
        }

        // overlapping entries end where the next one starts
        for i in 0..entries.len() {
            if entries[i].is_overlap() {
                let end = entries.get(i + 1).map_or(0, |next| next.virt_start);
                entries[i].virt_end = end;
            }
        }

        Ok(Self {
            offset,
            entries,
            byte_len: at + 4 - offset,
        })
    }

    /// Largest virtual end among live entries
    pub fn max_live_end(&self) -> u32 {
        self.entries
            .iter()
            .filter(|entry| entry.is_live())
            .map(|entry| entry.virt_end)
            .max()
            .unwrap_or(0)
    }

    /// Compressed length of entry `index`: up to the next higher physical
    /// start in the table, or to the end of the ROM
    pub fn compressed_len(&self, index: usize, rom_len: usize) -> usize {
        let start = self.entries[index].phys_start() as usize;
        let end = self
            .entries
            .iter()
            .map(|entry| entry.phys_start() as usize)
            .filter(|&phys| phys > start)
            .min()
            .unwrap_or(rom_len)
            .min(rom_len);
        end.saturating_sub(start)
    }

    /// Copy the table bytes from `rom` to `dst`, with updated flag words
    pub fn write_to(&self, rom: &[u8], dst: &mut [u8]) {
        let range = self.offset..self.offset + self.byte_len;
        dst[range.clone()].copy_from_slice(&rom[range]);
        for entry in &self.entries {
            write_be_u32(dst, entry.offset + 4, entry.phys_word);
        }
    }
}
