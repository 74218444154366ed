//! Resumable DEFLATE state machine
//!
//! The inflater consumes input in arbitrary chunks. When a chunk runs out
//! in the middle of a block, every partially decoded value is parked in
//! [`Stage`] and the bit accumulator, and decoding picks up at the same
//! point on the next call.

use super::huffman::{
    build_table, fixed_distance_table, fixed_literal_table, CODELEN_TABLE_SIZE,
    DISTANCE_TABLE_SIZE, LITERAL_TABLE_SIZE,
};
use crate::{Result, Z64Error};

/// Largest total output the inflater will count before giving up
pub const MAX_OUTPUT: usize = i32::MAX as usize;

/// Order in which code length code lengths are transmitted
const CODELEN_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Where decoding resumes on the next call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    /// Nothing seen yet; the first bytes may be a zlib header
    #[default]
    Initial,
    /// One byte seen, waiting for the second to check for a zlib header
    PartialZlibHeader(u8),
    /// Reading the 3-bit block header
    Header,
    /// Stored block: reading LEN
    StoredLen,
    /// Stored block: reading NLEN
    StoredInvLen {
        /// LEN from the previous field
        len: u16,
    },
    /// Stored block: copying raw bytes
    StoredData {
        /// Bytes left in the block
        remaining: usize,
    },
    /// Dynamic block: reading HLIT
    LiteralCount,
    /// Dynamic block: reading HDIST
    DistanceCount,
    /// Dynamic block: reading HCLEN
    CodelenCount,
    /// Dynamic block: reading the code length code lengths
    CodeLengths,
    /// Dynamic block: decoding literal and distance code lengths
    Lengths,
    /// Reading the repeat count of code 16
    Lengths16,
    /// Reading the repeat count of code 17
    Lengths17,
    /// Reading the repeat count of code 18
    Lengths18,
    /// Decoding a literal/length symbol
    Symbol,
    /// Reading extra length bits
    Length(u16),
    /// Decoding a distance symbol
    Distance {
        /// Match length already decoded
        length: usize,
    },
    /// Reading extra distance bits
    DistanceExtra {
        /// Match length already decoded
        length: usize,
        /// Distance symbol
        symbol: u16,
    },
    /// The final block has ended
    Finished,
}

/// Outcome of one [`Inflater::inflate`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflateStatus {
    /// The chunk was consumed and the stream continues
    NeedInput,
    /// The final block ended; total decompressed size, which may exceed the
    /// output buffer
    Done(usize),
}

/// Why block decoding stopped early
enum Halt {
    NeedInput,
    Error(Z64Error),
}

impl From<Z64Error> for Halt {
    fn from(err: Z64Error) -> Self {
        Halt::Error(err)
    }
}

fn malformed(msg: &str) -> Halt {
    Halt::Error(Z64Error::MalformedStream(msg.to_string()))
}

type Step<T> = std::result::Result<T, Halt>;

struct Input<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Input<'_> {
    fn next(&mut self) -> Step<u8> {
        let byte = *self.data.get(self.pos).ok_or(Halt::NeedInput)?;
        self.pos += 1;
        Ok(byte)
    }
}

/// LSB-first bit accumulator
#[derive(Debug, Default)]
struct Bits {
    accum: u64,
    count: u32,
}

impl Bits {
    fn push(&mut self, byte: u8) {
        self.accum |= (byte as u64) << self.count;
        self.count += 8;
    }

    fn take(&mut self, input: &mut Input<'_>, n: u32) -> Step<u32> {
        while self.count < n {
            self.push(input.next()?);
        }
        let value = (self.accum & ((1u64 << n) - 1)) as u32;
        self.accum >>= n;
        self.count -= n;
        Ok(value)
    }

    fn align(&mut self) {
        self.accum = 0;
        self.count = 0;
    }

    fn decode(&mut self, input: &mut Input<'_>, table: &[i16]) -> Step<u16> {
        let mut used = 0;
        let mut index = 0usize;
        let symbol = loop {
            if self.count <= used {
                self.push(input.next()?);
            }
            index += ((self.accum >> used) & 1) as usize;
            used += 1;
            let entry = *table
                .get(index)
                .ok_or_else(|| malformed("huffman code outside table"))?;
            if entry >= 0 {
                break entry as u16;
            }
            index = !entry as usize;
        };
        self.accum >>= used;
        self.count -= used;
        Ok(symbol)
    }
}

/// Resumable DEFLATE decoder with optional zlib header detection
pub struct Inflater {
    stage: Stage,
    bits: Bits,
    out_ofs: usize,
    final_block: bool,

    counter: usize,
    last_value: u8,
    repeat_count: usize,
    literal_count: usize,
    distance_count: usize,
    codelen_count: usize,

    literal_table: [i16; LITERAL_TABLE_SIZE],
    distance_table: [i16; DISTANCE_TABLE_SIZE],
    codelen_table: [i16; CODELEN_TABLE_SIZE],
    literal_len: [u8; 288],
    distance_len: [u8; 32],
    codelen_len: [u8; 19],
}

impl Default for Inflater {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Inflater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inflater")
            .field("stage", &self.stage)
            .field("out_ofs", &self.out_ofs)
            .field("final_block", &self.final_block)
            .finish()
    }
}

impl Inflater {
    /// Create an inflater at the start of a stream
    pub fn new() -> Self {
        Self {
            stage: Stage::Initial,
            bits: Bits::default(),
            out_ofs: 0,
            final_block: false,
            counter: 0,
            last_value: 0,
            repeat_count: 0,
            literal_count: 0,
            distance_count: 0,
            codelen_count: 0,
            literal_table: [0; LITERAL_TABLE_SIZE],
            distance_table: [0; DISTANCE_TABLE_SIZE],
            codelen_table: [0; CODELEN_TABLE_SIZE],
            literal_len: [0; 288],
            distance_len: [0; 32],
            codelen_len: [0; 19],
        }
    }

    /// Current parse stage
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Bytes produced so far, including any past the end of the output
    pub fn total_out(&self) -> usize {
        self.out_ofs
    }

    /// Whether the final block has been decoded
    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Finished
    }

    /// Feed the next chunk of compressed input
    ///
    /// `output` must be the same buffer on every call; decoded bytes land at
    /// their absolute offset in the stream. Bytes past its end are counted
    /// but discarded. The whole chunk is always consumed.
    pub fn inflate(&mut self, input: &[u8], output: &mut [u8]) -> Result<InflateStatus> {
        let mut input = Input {
            data: input,
            pos: 0,
        };

        match self.stage {
            Stage::Initial | Stage::PartialZlibHeader(_) => {
                if input.data.is_empty() {
                    return Ok(InflateStatus::NeedInput);
                }
                let (header, partial) = match self.stage {
                    Stage::PartialZlibHeader(first) => {
                        ((first as u16) << 8 | input.data[0] as u16, Some(first))
                    }
                    _ if input.data.len() == 1 => {
                        self.stage = Stage::PartialZlibHeader(input.data[0]);
                        return Ok(InflateStatus::NeedInput);
                    }
                    _ => (u16::from_be_bytes([input.data[0], input.data[1]]), None),
                };

                if header & 0x8F00 == 0x0800 && header % 31 == 0 {
                    if header & 0x0020 != 0 {
                        return Err(Z64Error::MalformedStream(
                            "preset dictionaries are not supported".to_string(),
                        ));
                    }
                    input.pos = if partial.is_some() { 1 } else { 2 };
                } else if let Some(first) = partial {
                    self.bits.push(first);
                }
                self.stage = Stage::Header;
            }
            Stage::Finished => return Ok(InflateStatus::Done(self.out_ofs)),
            _ => {}
        }

        loop {
            match self.run_block(&mut input, output) {
                Ok(()) => {}
                Err(Halt::NeedInput) => return Ok(InflateStatus::NeedInput),
                Err(Halt::Error(err)) => return Err(err),
            }
            if self.out_ofs > MAX_OUTPUT {
                return Err(Z64Error::MalformedStream(
                    "output size overflow".to_string(),
                ));
            }
            if self.final_block {
                self.stage = Stage::Finished;
                return Ok(InflateStatus::Done(self.out_ofs));
            }
        }
    }

    fn put(&mut self, output: &mut [u8], byte: u8) {
        if let Some(slot) = output.get_mut(self.out_ofs) {
            *slot = byte;
        }
        self.out_ofs += 1;
    }

    fn copy_match(&mut self, output: &mut [u8], distance: usize, length: usize) -> Step<()> {
        if distance > self.out_ofs {
            return Err(malformed("distance reaches before start of output"));
        }

        let size = output.len();
        let mut length = length;
        let mut overflow = 0;
        if self.out_ofs + length > size {
            overflow = if self.out_ofs > size {
                length
            } else {
                self.out_ofs + length - size
            };
            length -= overflow;
        }
        for _ in 0..length {
            output[self.out_ofs] = output[self.out_ofs - distance];
            self.out_ofs += 1;
        }
        self.out_ofs += overflow;
        Ok(())
    }

    fn store_length(&mut self) {
        if self.counter < self.literal_count {
            self.literal_len[self.counter] = self.last_value;
        } else {
            self.distance_len[self.counter - self.literal_count] = self.last_value;
        }
        self.counter += 1;
        self.repeat_count -= 1;
    }

    /// Decode until the current block ends, resuming at `self.stage`
    fn run_block(&mut self, input: &mut Input<'_>, output: &mut [u8]) -> Step<()> {
        loop {
            match self.stage {
                Stage::Header => {
                    let header = self.bits.take(input, 3)?;
                    self.final_block = header & 1 != 0;
                    match header >> 1 {
                        0 => {
                            self.bits.align();
                            self.stage = Stage::StoredLen;
                        }
                        1 => {
                            fixed_literal_table(&mut self.literal_table);
                            fixed_distance_table(&mut self.distance_table);
                            self.stage = Stage::Symbol;
                        }
                        2 => self.stage = Stage::LiteralCount,
                        _ => return Err(malformed("invalid block type")),
                    }
                }

                Stage::StoredLen => {
                    let len = self.bits.take(input, 16)? as u16;
                    self.stage = Stage::StoredInvLen { len };
                }
                Stage::StoredInvLen { len } => {
                    let inv = self.bits.take(input, 16)? as u16;
                    if inv != !len {
                        return Err(malformed("stored block length check failed"));
                    }
                    self.stage = Stage::StoredData {
                        remaining: len as usize,
                    };
                }
                Stage::StoredData { mut remaining } => {
                    while remaining > 0 {
                        let byte = match input.next() {
                            Ok(byte) => byte,
                            Err(halt) => {
                                self.stage = Stage::StoredData { remaining };
                                return Err(halt);
                            }
                        };
                        self.put(output, byte);
                        remaining -= 1;
                    }
                    self.stage = Stage::Header;
                    return Ok(());
                }

                Stage::LiteralCount => {
                    self.literal_count = self.bits.take(input, 5)? as usize + 257;
                    self.stage = Stage::DistanceCount;
                }
                Stage::DistanceCount => {
                    self.distance_count = self.bits.take(input, 5)? as usize + 1;
                    self.stage = Stage::CodelenCount;
                }
                Stage::CodelenCount => {
                    self.codelen_count = self.bits.take(input, 4)? as usize + 4;
                    self.counter = 0;
                    self.stage = Stage::CodeLengths;
                }
                Stage::CodeLengths => {
                    while self.counter < self.codelen_count {
                        let length = self.bits.take(input, 3)?;
                        self.codelen_len[CODELEN_ORDER[self.counter]] = length as u8;
                        self.counter += 1;
                    }
                    for &symbol in &CODELEN_ORDER[self.codelen_count..] {
                        self.codelen_len[symbol] = 0;
                    }
                    build_table(&self.codelen_len, false, &mut self.codelen_table)?;

                    self.last_value = 0;
                    self.counter = 0;
                    self.repeat_count = 0;
                    self.stage = Stage::Lengths;
                }
                Stage::Lengths => {
                    if self.counter >= self.literal_count + self.distance_count {
                        build_table(
                            &self.literal_len[..self.literal_count],
                            false,
                            &mut self.literal_table,
                        )?;
                        build_table(
                            &self.distance_len[..self.distance_count],
                            true,
                            &mut self.distance_table,
                        )?;
                        self.stage = Stage::Symbol;
                        continue;
                    }

                    if self.repeat_count == 0 {
                        match self.bits.decode(input, &self.codelen_table)? {
                            symbol @ 0..=15 => {
                                self.last_value = symbol as u8;
                                self.repeat_count = 1;
                            }
                            16 => {
                                self.stage = Stage::Lengths16;
                                continue;
                            }
                            17 => {
                                self.last_value = 0;
                                self.stage = Stage::Lengths17;
                                continue;
                            }
                            _ => {
                                self.last_value = 0;
                                self.stage = Stage::Lengths18;
                                continue;
                            }
                        }
                    }
                    self.store_length();
                }
                Stage::Lengths16 => {
                    self.repeat_count = self.bits.take(input, 2)? as usize + 3;
                    self.stage = Stage::Lengths;
                }
                Stage::Lengths17 => {
                    self.repeat_count = self.bits.take(input, 3)? as usize + 3;
                    self.stage = Stage::Lengths;
                }
                Stage::Lengths18 => {
                    self.repeat_count = self.bits.take(input, 7)? as usize + 11;
                    self.stage = Stage::Lengths;
                }

                Stage::Symbol => {
                    if self.out_ofs > MAX_OUTPUT {
                        return Err(malformed("output size overflow"));
                    }
                    let symbol = self.bits.decode(input, &self.literal_table)?;
                    match symbol {
                        0..=255 => self.put(output, symbol as u8),
                        256 => {
                            self.stage = Stage::Header;
                            return Ok(());
                        }
                        257..=264 => {
                            self.stage = Stage::Distance {
                                length: (symbol - 257) as usize + 3,
                            }
                        }
                        265..=284 => self.stage = Stage::Length(symbol),
                        285 => self.stage = Stage::Distance { length: 258 },
                        _ => return Err(malformed("invalid literal/length symbol")),
                    }
                }
                Stage::Length(symbol) => {
                    let extra_bits = (symbol as u32 - 261) / 4;
                    let extra = self.bits.take(input, extra_bits)? as usize;
                    let base = (4 + ((symbol as usize - 265) & 3)) << extra_bits;
                    self.stage = Stage::Distance {
                        length: extra + 3 + base,
                    };
                }
                Stage::Distance { length } => {
                    let symbol = self.bits.decode(input, &self.distance_table)?;
                    match symbol {
                        0..=3 => {
                            self.copy_match(output, symbol as usize + 1, length)?;
                            self.stage = Stage::Symbol;
                        }
                        4..=29 => self.stage = Stage::DistanceExtra { length, symbol },
                        _ => return Err(malformed("invalid distance symbol")),
                    }
                }
                Stage::DistanceExtra { length, symbol } => {
                    let extra_bits = (symbol as u32 - 2) / 2;
                    let extra = self.bits.take(input, extra_bits)? as usize;
                    let distance = extra + 1 + ((2 + (symbol as usize & 1)) << extra_bits);
                    self.copy_match(output, distance, length)?;
                    self.stage = Stage::Symbol;
                }

                Stage::Initial | Stage::PartialZlibHeader(_) | Stage::Finished => {
                    return Err(malformed("inflater resumed in an invalid stage"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_block_by_hand() {
        // final stored block, LEN 3, NLEN !3
        let data = [0x01, 0x03, 0x00, 0xFC, 0xFF, b'a', b'b', b'c'];
        let mut out = [0u8; 3];
        let mut inflater = Inflater::new();
        assert_eq!(
            inflater.inflate(&data, &mut out).unwrap(),
            InflateStatus::Done(3)
        );
        assert_eq!(&out, b"abc");
        assert!(inflater.is_finished());
    }

    #[test]
    fn test_stored_length_mismatch() {
        let data = [0x01, 0x05, 0x00, 0x00, 0x00];
        let mut out = [0u8; 8];
        let mut inflater = Inflater::new();
        assert!(matches!(
            inflater.inflate(&data, &mut out),
            Err(Z64Error::MalformedStream(_))
        ));
    }

    #[test]
    fn test_invalid_block_type() {
        let mut out = [0u8; 8];
        let mut inflater = Inflater::new();
        assert!(inflater.inflate(&[0x07, 0x00], &mut out).is_err());
    }

    #[test]
    fn test_preset_dictionary_rejected() {
        let mut out = [0u8; 8];
        let mut inflater = Inflater::new();
        assert!(inflater.inflate(&[0x78, 0xBB, 0, 0], &mut out).is_err());
    }

    #[test]
    fn test_fixed_block_with_back_reference() {
        // fixed block: literal 'a', then length 3 distance 1, then end of block
        //   header 1,01 ; 'a' = 0x91 as 8-bit code 10010001 ;
        //   length 257 = 7-bit 0000001 ; distance 0 = 00000 ; EOB = 0000000
        let mut writer = BitWriter::default();
        writer.bits(1, 1);
        writer.bits(1, 2);
        writer.code(0b1001_0001, 8);
        writer.code(0b000_0001, 7);
        writer.code(0, 5);
        writer.code(0, 7);
        let data = writer.finish();

        let mut out = [0u8; 4];
        let mut inflater = Inflater::new();
        assert_eq!(
            inflater.inflate(&data, &mut out).unwrap(),
            InflateStatus::Done(4)
        );
        assert_eq!(&out, b"aaaa");
    }

    #[test]
    fn test_distance_before_start_rejected() {
        let mut writer = BitWriter::default();
        writer.bits(1, 1);
        writer.bits(1, 2);
        writer.code(0b000_0001, 7);
        writer.code(0, 5);
        writer.code(0, 7);
        let data = writer.finish();

        let mut out = [0u8; 4];
        let mut inflater = Inflater::new();
        assert!(matches!(
            inflater.inflate(&data, &mut out),
            Err(Z64Error::MalformedStream(_))
        ));
    }

    #[test]
    fn test_single_byte_chunks_with_zlib_header() {
        let data = [0x78, 0x01, 0x01, 0x02, 0x00, 0xFD, 0xFF, b'h', b'i'];
        let mut out = [0u8; 2];
        let mut inflater = Inflater::new();
        let mut status = InflateStatus::NeedInput;
        for byte in data {
            status = inflater.inflate(&[byte], &mut out).unwrap();
        }
        assert_eq!(status, InflateStatus::Done(2));
        assert_eq!(&out, b"hi");
    }

    #[test]
    fn test_overflow_is_counted_not_written() {
        let data = [0x01, 0x04, 0x00, 0xFB, 0xFF, 1, 2, 3, 4];
        let mut out = [0u8; 2];
        let mut inflater = Inflater::new();
        assert_eq!(
            inflater.inflate(&data, &mut out).unwrap(),
            InflateStatus::Done(4)
        );
        assert_eq!(out, [1, 2]);
    }

    /// LSB-first bit packer; Huffman codes are emitted MSB first
    #[derive(Default)]
    struct BitWriter {
        out: Vec<u8>,
        accum: u32,
        count: u32,
    }

    impl BitWriter {
        fn bits(&mut self, value: u32, n: u32) {
            for i in 0..n {
                self.accum |= ((value >> i) & 1) << self.count;
                self.count += 1;
                if self.count == 8 {
                    self.out.push(self.accum as u8);
                    self.accum = 0;
                    self.count = 0;
                }
            }
        }

        fn code(&mut self, code: u32, n: u32) {
            for i in (0..n).rev() {
                self.bits((code >> i) & 1, 1);
            }
        }

        fn finish(mut self) -> Vec<u8> {
            if self.count > 0 {
                self.out.push(self.accum as u8);
            }
            self.out
        }
    }
}
