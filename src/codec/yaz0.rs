//! Yaz0 decoder
//!
//! A 16-byte header (`Yaz0`, big-endian decompressed size, 8 reserved bytes)
//! is followed by groups of eight operations. Each group starts with a
//! control byte read MSB first: a set bit copies one literal byte, a clear
//! bit reads a two or three byte back-reference.

use super::copy_match;
use crate::source::{ByteSource, SourceWindow};
use crate::{be_u32, Result, Z64Error, YAZ0_HEADER_SIZE};

/// Bytes kept in reserve at the end of the window; one full group of eight
/// three-byte references plus its control byte
pub const SAFETY_MARGIN: usize = 25;

/// Decode a complete Yaz0 file into `dst`, returning the declared size
pub fn decode<S: ByteSource + ?Sized>(source: &S, dst: &mut [u8]) -> Result<usize> {
    let mut header = [0u8; YAZ0_HEADER_SIZE];
    source.read_at(0, &mut header)?;

    let size = be_u32(&header, 4) as usize;
    if size > dst.len() {
        return Err(Z64Error::OutOfBounds(format!(
            "yaz0: declared size {size} exceeds destination of {} bytes",
            dst.len()
        )));
    }

    let mut window = SourceWindow::new(
        source,
        YAZ0_HEADER_SIZE,
        source.len() - YAZ0_HEADER_SIZE,
        SAFETY_MARGIN,
    )?;

    let mut out = 0;
    let mut code = 0u8;
    let mut bits = 0;

    while out < size {
        if bits == 0 {
            window.refill_if_needed()?;
            code = window.next_byte();
            bits = 8;
        }

        if code & 0x80 != 0 {
            dst[out] = window.next_byte();
            out += 1;
        } else {
            let b1 = window.next_byte() as usize;
            let b2 = window.next_byte() as usize;
            let distance = ((b1 & 0x0F) << 8 | b2) + 1;
            let length = match b1 >> 4 {
                0 => window.next_byte() as usize + 0x12,
                n => n + 2,
            };
            out = copy_match(dst, out, distance, length, "yaz0")?;
        }

        code <<= 1;
        bits -= 1;
    }

    Ok(size)
}
