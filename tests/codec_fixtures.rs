//! Single-file decoding through the public API

mod common;

use common::*;
use z64decompress::codec::inflate::{InflateStatus, Inflater};
use z64decompress::codec::{self, declared_size, sniff, synthetic_header};
use z64decompress::{decompress_file_bytes, Codec, HeaderPrefixed, Z64Error};

#[test]
fn test_yaz0_hex_fixture() {
    // "ABCD" then a 6-byte back-reference at distance 4
    let data = hex::decode("59617a300000000a0000000000000000f0414243444003").unwrap();
    assert_eq!(decompress_file_bytes(&data, None).unwrap(), b"ABCDABCDAB");
}

#[test]
fn test_yaz0_extended_length_reference() {
    // one literal, then a reference with the extra length byte: 0x12 + 0x10
    let data = hex::decode("59617a30000000230000000000000000805a000010").unwrap();
    let output = decompress_file_bytes(&data, None).unwrap();
    assert_eq!(output, vec![b'Z'; 0x23]);
}

#[test]
fn test_every_codec_decodes_its_fixture() {
    let text = sample(0x2345, 3);
    let files = [
        (Codec::Yaz0, yaz0_file(&text)),
        (Codec::Ucl, ucl_file(&text)),
        (Codec::Lz4h, lz4h_file(&text)),
        (Codec::Zlib, zlib_file(&text)),
    ];

    for (codec, file) in files {
        assert_eq!(sniff(&file).unwrap().codec, Some(codec));
        assert_eq!(declared_size(codec, &file[..]).unwrap(), text.len());

        let (output, stats) = codec::decompress_file(&file[..], None).unwrap();
        assert_eq!(output, text, "{codec}");
        assert_eq!(stats.codec, Some(codec));
        assert_eq!(stats.input_bytes, file.len());
        assert_eq!(decompress_file_bytes(&file, None).unwrap(), output);
    }
}

#[test]
fn test_forced_codec_ignores_magic() {
    let text = sample(0x80, 4);
    let mut file = zlib_file(&text);
    file[..4].copy_from_slice(b"????");

    assert!(matches!(
        decompress_file_bytes(&file, None),
        Err(Z64Error::UnknownCodec { .. })
    ));
    assert_eq!(decompress_file_bytes(&file, Some(Codec::Zlib)).unwrap(), text);
}

#[test]
fn test_placeholder_codec_is_unsupported() {
    let file = b"APL0\0\0\0\x04abcd";
    assert!(matches!(
        decompress_file_bytes(file, None),
        Err(Z64Error::UnsupportedCodec { name: "aplib" })
    ));
}

#[test]
fn test_empty_and_short_inputs() {
    assert!(decompress_file_bytes(&[], None).is_err());
    assert!(decompress_file_bytes(b"Yaz", None).is_err());
    assert!(decompress_file_bytes(b"ZLIB\0\0", Some(Codec::Zlib)).is_err());
}

#[test]
fn test_zero_size_file() {
    let file = yaz0_file(&[]);
    assert!(decompress_file_bytes(&file, None).unwrap().is_empty());
}

#[test]
fn test_header_prefixed_source() {
    let text = sample(0x333, 5);
    for codec in Codec::ALL {
        let file = match codec {
            Codec::Yaz0 => yaz0_file(&text),
            Codec::Ucl => ucl_file(&text),
            Codec::Lz4h => lz4h_file(&text),
            Codec::Zlib => zlib_file(&text),
        };
        let body = &file[codec.header_len()..];
        let source = HeaderPrefixed::new(synthetic_header(codec, text.len() as u32), body);

        let mut out = vec![0u8; text.len()];
        codec::decode(codec, &source, &mut out).unwrap();
        assert_eq!(out, text, "{codec}");
    }
}

#[test]
fn test_zlib_output_larger_than_header() {
    let text = sample(0x500, 6);
    let mut file = zlib_file(&text);
    file[4..8].copy_from_slice(&0x100u32.to_be_bytes());

    let output = decompress_file_bytes(&file, None).unwrap();
    assert_eq!(output, &text[..0x100]);
}

#[test]
fn test_inflater_byte_at_a_time() {
    let text = sample(0x3000, 7);
    let stream = deflate_stream(&text);

    let mut out = vec![0u8; text.len()];
    let mut inflater = Inflater::new();
    let mut status = InflateStatus::NeedInput;
    for byte in &stream {
        assert_eq!(status, InflateStatus::NeedInput);
        status = inflater.inflate(std::slice::from_ref(byte), &mut out).unwrap();
    }
    assert_eq!(status, InflateStatus::Done(text.len()));
    assert!(inflater.is_finished());
    assert_eq!(out, text);
}

#[test]
fn test_inflater_rejects_garbage() {
    // block type 3 is reserved; two bytes so the zlib header check resolves
    let mut out = [0u8; 16];
    assert!(matches!(
        Inflater::new().inflate(&[0x07, 0x00], &mut out),
        Err(Z64Error::MalformedStream(_))
    ));
}
