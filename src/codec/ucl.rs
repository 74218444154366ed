//! UCL (NRV2B) decoder
//!
//! After an 8-byte header the stream is a mix of raw literal bytes and an
//! interleaved bit stream carried eight bits at a time. Offsets are coded as
//! an Elias-gamma style prefix plus a trailing byte, with a short code that
//! reuses the previous offset. A specific offset value terminates the stream.

use super::copy_match;
use crate::source::{ByteSource, SourceWindow};
use crate::{Result, Z64Error, SHORT_HEADER_SIZE};

/// Bytes kept in reserve at the end of the window
pub const SAFETY_MARGIN: usize = 32;

/// Offsets above this distance get one extra byte of match length
const LONG_OFFSET: u32 = 0x0d00;

/// Offset value that marks the end of the stream
const END_OF_STREAM: u32 = u32::MAX;

/// Bit reader over the window; `bb` carries eight pending bits above a
/// sentinel so that an empty buffer is recognized without a counter
struct Bits<'w, 's, S: ByteSource + ?Sized> {
    window: &'w mut SourceWindow<'s, S>,
    bb: u32,
}

impl<S: ByteSource + ?Sized> Bits<'_, '_, S> {
    fn bit(&mut self) -> Result<u32> {
        if self.bb & 0x7f != 0 {
            self.bb = self.bb.wrapping_mul(2);
        } else {
            self.window.refill_if_needed()?;
            self.bb = self.window.next_byte() as u32 * 2 + 1;
            if self.window.is_overrun() {
                return Err(Z64Error::OutOfBounds(
                    "ucl: bit stream runs past end of input".to_string(),
                ));
            }
        }
        Ok((self.bb >> 8) & 1)
    }

    fn byte(&mut self) -> u8 {
        self.window.next_byte()
    }
}

/// Decode a complete UCL file into `dst`, returning the number of bytes written
pub fn decode<S: ByteSource + ?Sized>(source: &S, dst: &mut [u8]) -> Result<usize> {
    let length = source.len().checked_sub(SHORT_HEADER_SIZE).ok_or(Z64Error::Truncated {
        offset: 0,
        length: SHORT_HEADER_SIZE,
        available: source.len(),
    })?;
    let mut window = SourceWindow::new(source, SHORT_HEADER_SIZE, length, SAFETY_MARGIN)?;
    let mut bits = Bits {
        window: &mut window,
        bb: 0,
    };

    let mut out = 0;
    let mut last_offset: u32 = 1;

    loop {
        while bits.bit()? == 1 {
            let slot = dst.get_mut(out).ok_or_else(|| {
                Z64Error::OutOfBounds(format!("ucl: literal at {out} overruns output"))
            })?;
            *slot = bits.byte();
            out += 1;
        }

        let mut offset: u32 = 1;
        loop {
            offset = offset.wrapping_mul(2).wrapping_add(bits.bit()?);
            if bits.bit()? == 1 {
                break;
            }
        }

        if offset == 2 {
            offset = last_offset;
        } else {
            offset = offset
                .wrapping_sub(3)
                .wrapping_mul(256)
                .wrapping_add(bits.byte() as u32);
            if offset == END_OF_STREAM {
                break;
            }
            offset = offset.wrapping_add(1);
            last_offset = offset;
        }

        let mut length = bits.bit()?;
        length = length * 2 + bits.bit()?;
        if length == 0 {
            length = 1;
            loop {
                length = length.wrapping_mul(2).wrapping_add(bits.bit()?);
                if bits.bit()? == 1 {
                    break;
                }
            }
            length = length.wrapping_add(2);
        }
        if offset > LONG_OFFSET {
            length = length.wrapping_add(1);
        }
        length = length.wrapping_add(1);

        out = copy_match(dst, out, offset as usize, length as usize, "ucl")?;
    }

    Ok(out)
}
