//! Codec registry and single-file decoding
//!
//! Every compressed file starts with a 4-byte magic followed by its
//! big-endian decompressed size. The registry maps that magic to one of the
//! decoders in this module, or honors an explicit caller override.

pub mod inflate;
pub mod lz4h;
pub mod ucl;
pub mod yaz0;

use crate::source::ByteSource;
use crate::{be_u32, Codec, DecodeStats, Result, Z64Error};
use log::debug;

/// Decoder entry point: decompress a whole file (header included) into `dst`
pub type DecodeFn = fn(&dyn ByteSource, &mut [u8]) -> Result<usize>;

fn decode_yaz0(source: &dyn ByteSource, dst: &mut [u8]) -> Result<usize> {
    yaz0::decode(source, dst)
}

fn decode_ucl(source: &dyn ByteSource, dst: &mut [u8]) -> Result<usize> {
    ucl::decode(source, dst)
}

fn decode_lz4h(source: &dyn ByteSource, dst: &mut [u8]) -> Result<usize> {
    lz4h::decode(source, dst)
}

fn decode_zlib(source: &dyn ByteSource, dst: &mut [u8]) -> Result<usize> {
    inflate::decode(source, dst)
}

/// Static description of a registered codec
#[derive(Debug)]
pub struct CodecDescriptor {
    /// Short name (`yaz`, `ucl`, ...)
    pub name: &'static str,
    /// Leading four bytes of a file compressed with this codec
    pub magic: [u8; 4],
    /// Codec identity, `None` for recognized-but-undecodable formats
    pub codec: Option<Codec>,
    /// Decoder, `None` for recognized-but-undecodable formats
    pub decode: Option<DecodeFn>,
}

/// Every codec known to the registry
pub static CODECS: [CodecDescriptor; 5] = [
    CodecDescriptor {
        name: "yaz",
        magic: *b"Yaz0",
        codec: Some(Codec::Yaz0),
        decode: Some(decode_yaz0),
    },
    CodecDescriptor {
        name: "ucl",
        magic: *b"UCL0",
        codec: Some(Codec::Ucl),
        decode: Some(decode_ucl),
    },
    CodecDescriptor {
        name: "lz4h",
        magic: *b"LZ4H",
        codec: Some(Codec::Lz4h),
        decode: Some(decode_lz4h),
    },
    CodecDescriptor {
        name: "aplib",
        magic: *b"APL0",
        codec: None,
        decode: None,
    },
    CodecDescriptor {
        name: "zlib",
        magic: *b"ZLIB",
        codec: Some(Codec::Zlib),
        decode: Some(decode_zlib),
    },
];

impl CodecDescriptor {
    /// Descriptor registered for `codec`
    pub fn for_codec(codec: Codec) -> &'static CodecDescriptor {
        match codec {
            Codec::Yaz0 => &CODECS[0],
            Codec::Ucl => &CODECS[1],
            Codec::Lz4h => &CODECS[2],
            Codec::Zlib => &CODECS[4],
        }
    }
}

impl Codec {
    /// Registry entry for this codec
    pub fn descriptor(&self) -> &'static CodecDescriptor {
        CodecDescriptor::for_codec(*self)
    }
}

/// Find the descriptor whose magic matches the first four bytes of `header`
pub fn sniff(header: &[u8]) -> Result<&'static CodecDescriptor> {
    let mut magic = [0u8; 4];
    let n = header.len().min(4);
    magic[..n].copy_from_slice(&header[..n]);

    CODECS
        .iter()
        .find(|descriptor| n == 4 && descriptor.magic == magic)
        .ok_or(Z64Error::UnknownCodec { magic })
}

/// Pick the codec for `source`: the override if given, otherwise its header
pub fn select<S: ByteSource + ?Sized>(source: &S, codec: Option<Codec>) -> Result<Codec> {
    if let Some(codec) = codec {
        return Ok(codec);
    }

    let mut magic = [0u8; 4];
    source.read_at(0, &mut magic)?;
    let descriptor = sniff(&magic)?;
    let codec = descriptor.codec.ok_or(Z64Error::UnsupportedCodec {
        name: descriptor.name,
    })?;
    debug!("detected codec '{}'", descriptor.name);
    Ok(codec)
}

/// Decode one compressed file with `codec`, returning the decompressed size
///
/// For the inflater the returned size may exceed `dst.len()`; bytes past the
/// end of `dst` are counted but dropped.
pub fn decode<S: ByteSource + ?Sized>(codec: Codec, source: &S, dst: &mut [u8]) -> Result<usize> {
    let descriptor = codec.descriptor();
    let decoder = descriptor.decode.ok_or(Z64Error::UnsupportedCodec {
        name: descriptor.name,
    })?;
    let source: &dyn ByteSource = &source;
    decoder(source, dst)
}

/// Decompressed size recorded in the file header
pub fn declared_size<S: ByteSource + ?Sized>(codec: Codec, source: &S) -> Result<usize> {
    let mut header = [0u8; 8];
    source.read_at(0, &mut header)?;
    Ok(match codec {
        Codec::Lz4h => lz4h::header_size(&header),
        _ => be_u32(&header, 4) as usize,
    })
}

/// Build the header `codec` expects in front of a raw stream
pub fn synthetic_header(codec: Codec, decompressed_size: u32) -> Vec<u8> {
    let mut header = vec![0u8; codec.header_len()];
    header[..4].copy_from_slice(&codec.descriptor().magic);
    let size = match codec {
        Codec::Lz4h => decompressed_size & 0x00FF_FFFF,
        _ => decompressed_size,
    };
    header[4..8].copy_from_slice(&size.to_be_bytes());
    header
}

/// Decompress a single standalone file, sizing the output from its header
pub fn decompress_file<S: ByteSource + ?Sized>(
    source: &S,
    codec: Option<Codec>,
) -> Result<(Vec<u8>, DecodeStats)> {
    let codec = select(source, codec)?;
    let size = declared_size(codec, source)?;
    let mut output = vec![0u8; size];

    let produced = decode(codec, source, &mut output)?;
    if produced < output.len() {
        output.truncate(produced);
    }
    debug!(
        "decoded {} bytes of {} into {} bytes",
        source.len(),
        codec,
        output.len()
    );

    let stats = DecodeStats {
        codec: Some(codec),
        input_bytes: source.len(),
        output_bytes: produced,
    };
    Ok((output, stats))
}

/// Copy a back-reference of `length` bytes from `distance` bytes behind `out`
///
/// Bytes are copied front to back so that overlapping references repeat the
/// pattern; the bulk is moved four bytes per step. Returns the new cursor.
pub(crate) fn copy_match(
    dst: &mut [u8],
    out: usize,
    distance: usize,
    length: usize,
    codec: &str,
) -> Result<usize> {
    if distance == 0 || distance > out {
        return Err(Z64Error::OutOfBounds(format!(
            "{codec}: back-reference {distance} before start of output at {out}"
        )));
    }
    if out + length > dst.len() {
        return Err(Z64Error::OutOfBounds(format!(
            "{codec}: match of {length} bytes at {out} overruns output of {} bytes",
            dst.len()
        )));
    }

    let mut to = out;
    let mut from = out - distance;
    for _ in 0..(length & 3) {
        dst[to] = dst[from];
        to += 1;
        from += 1;
    }
    for _ in 0..(length >> 2) {
        dst[to] = dst[from];
        dst[to + 1] = dst[from + 1];
        dst[to + 2] = dst[from + 2];
        dst[to + 3] = dst[from + 3];
        to += 4;
        from += 4;
    }
    Ok(to)
}
