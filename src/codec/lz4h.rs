//! LZ4H decoder
//!
//! An 8-byte header (`LZ4H`, one unused byte, 24-bit big-endian decompressed
//! size) followed by a raw LZ4 block. Files are laid out for in-place
//! decompression: the compressed bytes are staged at the tail of the output
//! buffer, leaving a small margin so the write cursor never overtakes the
//! read cursor.

use crate::source::ByteSource;
use crate::{Result, Z64Error, SHORT_HEADER_SIZE};
use log::debug;

const MIN_MATCH: usize = 4;

/// Extra room the in-place layout reserves past the decompressed data
pub fn inplace_margin(compressed_size: usize) -> usize {
    (compressed_size >> 8) + 32
}

/// Decompressed size from the 24-bit field of an LZ4H header
pub fn header_size(header: &[u8; 8]) -> usize {
    (header[5] as usize) << 16 | (header[6] as usize) << 8 | header[7] as usize
}

/// Decode a complete LZ4H file into `dst`, returning the declared size
///
/// The compressed file is staged inside `dst` when it is large enough; the
/// bytes past the decompressed data that staging overwrites are restored
/// afterwards. Otherwise a scratch buffer is used.
pub fn decode<S: ByteSource + ?Sized>(source: &S, dst: &mut [u8]) -> Result<usize> {
    let compressed = source.len();
    let mut header = [0u8; SHORT_HEADER_SIZE];
    source.read_at(0, &mut header)?;

    let size = header_size(&header);
    if size > dst.len() {
        return Err(Z64Error::OutOfBounds(format!(
            "lz4h: declared size {size} exceeds destination of {} bytes",
            dst.len()
        )));
    }

    // the payload ends at `work`; the file starts `compressed` bytes before
    let work = size + inplace_margin(compressed) - SHORT_HEADER_SIZE;
    let stage = work.checked_sub(compressed).ok_or_else(|| {
        Z64Error::OutOfBounds(format!(
            "lz4h: {compressed} compressed bytes do not fit the in-place margin for {size}"
        ))
    })?;

    let produced = if dst.len() >= work {
        let saved = dst[size..work].to_vec();
        let result = stage_and_decode(source, &mut dst[..work], stage);
        dst[size..work].copy_from_slice(&saved);
        result?
    } else {
        let mut scratch = vec![0u8; work];
        let produced = stage_and_decode(source, &mut scratch, stage)?;
        dst[..size].copy_from_slice(&scratch[..size]);
        produced
    };

    if produced != size {
        debug!("lz4h: block produced {produced} bytes, header declares {size}");
    }
    Ok(size)
}

fn stage_and_decode<S: ByteSource + ?Sized>(
    source: &S,
    buf: &mut [u8],
    stage: usize,
) -> Result<usize> {
    source.read_at(0, &mut buf[stage..])?;
    decode_block(buf, stage + SHORT_HEADER_SIZE)
}

fn out_of_bounds(what: &str, at: usize) -> Z64Error {
    Z64Error::OutOfBounds(format!("lz4h: {what} at {at}"))
}

fn read_length(buf: &[u8], ip: &mut usize) -> Result<usize> {
    let mut length = 0;
    loop {
        let byte = *buf.get(*ip).ok_or_else(|| out_of_bounds("length byte", *ip))?;
        *ip += 1;
        length += byte as usize;
        if byte != 255 {
            return Ok(length);
        }
    }
}

/// Run the LZ4 sequence loop over `buf[input..]`, writing from `buf[0]`
///
/// The input runs to the end of `buf`. The block ends when the input is
/// exhausted right after a literal run.
fn decode_block(buf: &mut [u8], input: usize) -> Result<usize> {
    let end = buf.len();
    let mut ip = input;
    let mut op = 0;

    while ip < end {
        let token = buf[ip];
        ip += 1;

        let mut literals = (token >> 4) as usize;
        if literals == 15 {
            literals += read_length(buf, &mut ip)?;
        }
        if ip + literals > end {
            return Err(out_of_bounds("literal run", ip));
        }
        buf.copy_within(ip..ip + literals, op);
        op += literals;
        ip += literals;

        if ip == end {
            break;
        }

        if ip + 2 > end {
            return Err(out_of_bounds("match offset", ip));
        }
        let offset = u16::from_le_bytes([buf[ip], buf[ip + 1]]) as usize;
        ip += 2;

        let mut length = (token & 0x0F) as usize;
        if length == 15 {
            length += read_length(buf, &mut ip)?;
        }
        length += MIN_MATCH;

        if offset > op {
            return Err(out_of_bounds("match offset before start of output", op));
        }
        if op + length > end {
            return Err(out_of_bounds("match overruns buffer", op));
        }
        for i in 0..length {
            buf[op + i] = buf[op - offset + i];
        }
        op += length;
    }

    Ok(op)
}
