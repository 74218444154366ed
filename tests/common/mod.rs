//! Fixture builders shared by the integration tests
//!
//! The encoders here mostly emit literal runs; they exist to give the decoders
//! well-formed input, not to compress well. The UCL encoder also emits short
//! back-references so its match path gets exercised.

#![allow(dead_code)]

use flate2::write::{DeflateEncoder, ZlibEncoder};
use flate2::Compression;
use std::io::Write;
use z64decompress::write_be_u32;

/// Sample payload with enough repetition for DEFLATE to emit matches
pub fn sample(len: usize, seed: u8) -> Vec<u8> {
    let text = b"The Great Deku Tree, Dodongo's Cavern, Jabu-Jabu's Belly. ";
    (0..len)
        .map(|i| text[(i + seed as usize) % text.len()] ^ (i / 97) as u8)
        .collect()
}

/// Yaz0 stream without its 16-byte header
pub fn yaz0_body(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for group in data.chunks(8) {
        out.push(0xFF);
        out.extend_from_slice(group);
    }
    out
}

/// Complete Yaz0 file
pub fn yaz0_file(data: &[u8]) -> Vec<u8> {
    let mut out = b"Yaz0".to_vec();
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&yaz0_body(data));
    out
}

/// Complete UCL file: literals plus short back-references found in the last
/// 64 bytes, then the end marker
pub fn ucl_file(data: &[u8]) -> Vec<u8> {
    let mut bits = UclBits::default();
    let mut last = 1;
    let mut pos = 0;
    while pos < data.len() {
        let found = (1..=pos.min(64))
            .map(|distance| {
                let len = (0..4.min(data.len() - pos))
                    .take_while(|&i| data[pos + i] == data[pos + i - distance])
                    .count();
                (distance, len)
            })
            .filter(|&(_, len)| len >= 2)
            .max_by_key(|&(_, len)| len);

        match found {
            Some((distance, len)) => {
                bits.bit(false);
                if distance == last {
                    bits.gamma(2);
                } else {
                    let value = (distance - 1) as u32;
                    bits.gamma((value >> 8) + 3);
                    bits.out.push(value as u8);
                    last = distance;
                }
                // two-bit length code copies code + 1 bytes
                let code = len - 1;
                bits.bit(code & 2 != 0);
                bits.bit(code & 1 != 0);
                pos += len;
            }
            None => {
                bits.bit(true);
                bits.out.push(data[pos]);
                pos += 1;
            }
        }
    }
    bits.bit(false);
    bits.gamma(0x0100_0002);
    bits.out.push(0xFF);

    let mut out = b"UCL0".to_vec();
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(&bits.out);
    out
}

#[derive(Default)]
struct UclBits {
    out: Vec<u8>,
    flag: usize,
    used: u32,
}

impl UclBits {
    fn bit(&mut self, bit: bool) {
        if self.out.is_empty() || self.used == 8 {
            self.flag = self.out.len();
            self.out.push(0);
            self.used = 0;
        }
        if bit {
            self.out[self.flag] |= 0x80 >> self.used;
        }
        self.used += 1;
    }

    fn gamma(&mut self, value: u32) {
        let top = 31 - value.leading_zeros();
        for i in (0..top).rev() {
            self.bit((value >> i) & 1 != 0);
            self.bit(i == 0);
        }
    }
}

/// Complete LZ4H file holding a single literal run
pub fn lz4h_file(data: &[u8]) -> Vec<u8> {
    let mut out = b"LZ4H\0".to_vec();
    out.extend_from_slice(&(data.len() as u32).to_be_bytes()[1..]);
    if data.len() < 15 {
        out.push((data.len() as u8) << 4);
    } else {
        out.push(0xF0);
        let mut rest = data.len() - 15;
        while rest >= 255 {
            out.push(255);
            rest -= 255;
        }
        out.push(rest as u8);
    }
    out.extend_from_slice(data);
    out
}

/// zlib-wrapped DEFLATE stream
pub fn zlib_stream(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Raw DEFLATE stream
pub fn deflate_stream(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Complete ZLIB file
pub fn zlib_file(data: &[u8]) -> Vec<u8> {
    let mut out = b"ZLIB".to_vec();
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(&zlib_stream(data));
    out
}

/// Builds a ROM with a standard file table
///
/// The first three entries (boot, the file before the table, the table
/// itself) are written by `new`; further entries are appended in order.
pub struct StandardRom {
    pub rom: Vec<u8>,
    pub table: usize,
    boot_end: u32,
    count: usize,
}

impl StandardRom {
    pub const TABLE: usize = 0x1100;

    pub fn new(len: usize, boot_end: u32, count: usize) -> Self {
        let table = Self::TABLE;
        let mut rom = StandardRom {
            rom: vec![0u8; len],
            table,
            boot_end,
            count: 0,
        };
        let table_end = (table + count * 16) as u32;
        rom.entry([0, boot_end, 0, 0]);
        rom.entry([boot_end, table as u32, boot_end, 0]);
        rom.entry([table as u32, table_end, table as u32, 0]);
        rom
    }

    pub fn boot_end(&self) -> u32 {
        self.boot_end
    }

    /// Append an entry, returning its offset in the ROM
    pub fn entry(&mut self, fields: [u32; 4]) -> usize {
        let offset = self.table + self.count * 16;
        for (i, field) in fields.iter().enumerate() {
            write_be_u32(&mut self.rom, offset + i * 4, *field);
        }
        self.count += 1;
        offset
    }

    /// Place `file` at `phys` and append a compressed entry for it
    pub fn compressed(&mut self, virt: u32, virt_len: usize, phys: usize, file: &[u8]) -> usize {
        self.rom[phys..phys + file.len()].copy_from_slice(file);
        self.entry([
            virt,
            virt + virt_len as u32,
            phys as u32,
            (phys + file.len()) as u32,
        ])
    }

    /// Place `data` at `phys` and append a raw entry for it
    pub fn raw(&mut self, virt: u32, phys: usize, data: &[u8]) -> usize {
        self.rom[phys..phys + data.len()].copy_from_slice(data);
        self.entry([virt, virt + data.len() as u32, phys as u32, 0])
    }
}
