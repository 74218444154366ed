//! DEFLATE decoding for `ZLIB` files
//!
//! [`Inflater`] is a resumable RFC 1951 decoder that also skips an RFC 1950
//! zlib header when one is present. [`decode`] drives it over a compressed
//! file in window-sized chunks.

mod huffman;
mod state;

pub use huffman::build_table;
pub use state::{InflateStatus, Inflater, Stage, MAX_OUTPUT};

use crate::source::{ByteSource, WINDOW_SIZE};
use crate::{Result, Z64Error, SHORT_HEADER_SIZE};
use log::trace;

/// Decode a complete `ZLIB` file (8-byte header, then the stream) into `dst`
///
/// Returns the total decompressed size, which may exceed `dst.len()`.
pub fn decode<S: ByteSource + ?Sized>(source: &S, dst: &mut [u8]) -> Result<usize> {
    let mut header = [0u8; SHORT_HEADER_SIZE];
    source.read_at(0, &mut header)?;

    let mut inflater = Inflater::new();
    let mut chunk = [0u8; WINDOW_SIZE];
    let mut offset = SHORT_HEADER_SIZE;

    loop {
        let size = (source.len() - offset).min(WINDOW_SIZE);
        source.read_at(offset, &mut chunk[..size])?;
        offset += size;

        match inflater.inflate(&chunk[..size], dst)? {
            InflateStatus::Done(total) => {
                trace!("inflate: {total} bytes from {offset} compressed");
                return Ok(total);
            }
            InflateStatus::NeedInput if size == 0 => {
                return Err(Z64Error::MalformedStream(
                    "compressed stream ended before the final block".to_string(),
                ));
            }
            InflateStatus::NeedInput => {}
        }
    }
}
