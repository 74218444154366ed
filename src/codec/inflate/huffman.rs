//! Huffman decoding tables for the inflater
//!
//! A table is a flattened binary tree. Entries 0 and 1 correspond to a
//! one-bit code of 0 or 1. A non-negative entry is the decoded symbol; a
//! negative entry is the one's complement of the index of the pair of
//! children (code with 0 appended, code with 1 appended). An alphabet of N
//! symbols needs at most 2N-2 entries.

use crate::{Result, Z64Error};

/// Longest code length DEFLATE allows
pub const MAX_CODE_LENGTH: usize = 15;

/// Table length for the 288-symbol literal/length alphabet
pub const LITERAL_TABLE_SIZE: usize = 288 * 2 - 2;

/// Table length for the 32-symbol distance alphabet
pub const DISTANCE_TABLE_SIZE: usize = 32 * 2 - 2;

/// Table length for the 19-symbol code length alphabet
pub const CODELEN_TABLE_SIZE: usize = 19 * 2 - 2;

fn malformed(msg: &str) -> Z64Error {
    Z64Error::MalformedStream(msg.to_string())
}

/// Build a decoding table from per-symbol code lengths (0 = unused)
///
/// A length set with no used symbols is accepted only when
/// `allow_no_symbols` is set; a single used symbol decodes from either
/// one-bit code. Over-subscribed and incomplete length sets are rejected.
pub fn build_table(lengths: &[u8], allow_no_symbols: bool, table: &mut [i16]) -> Result<()> {
    let mut count = [0u32; MAX_CODE_LENGTH + 1];
    for &length in lengths {
        let length = length as usize;
        if length > MAX_CODE_LENGTH {
            return Err(malformed("code length exceeds 15 bits"));
        }
        if length > 0 {
            count[length] += 1;
        }
    }

    let total: u32 = count[1..].iter().sum();
    if total == 0 {
        return if allow_no_symbols {
            Ok(())
        } else {
            Err(malformed("huffman table has no symbols"))
        };
    }
    if total == 1 {
        if let Some(symbol) = lengths.iter().rposition(|&length| length != 0) {
            table[0] = symbol as i16;
            table[1] = symbol as i16;
        }
        return Ok(());
    }

    let mut first_code = [0u32; MAX_CODE_LENGTH + 1];
    for i in 1..=MAX_CODE_LENGTH {
        first_code[i] = (first_code[i - 1] + count[i - 1]) << 1;
        if first_code[i] + count[i] > 1 << i {
            return Err(malformed("over-subscribed code lengths"));
        }
    }
    if first_code[MAX_CODE_LENGTH] + count[MAX_CODE_LENGTH] != 1 << MAX_CODE_LENGTH {
        return Err(malformed("incomplete code lengths"));
    }

    let mut index = 0usize;
    for i in 1..=MAX_CODE_LENGTH {
        let code_limit = 1u32 << i;
        let next_code = first_code[i] + count[i];
        let mut next_index = index + (code_limit - first_code[i]) as usize;

        for (symbol, _) in lengths
            .iter()
            .enumerate()
            .filter(|&(_, &length)| length as usize == i)
        {
            *table
                .get_mut(index)
                .ok_or_else(|| malformed("huffman table overflow"))? = symbol as i16;
            index += 1;
        }

        for _ in next_code..code_limit {
            *table
                .get_mut(index)
                .ok_or_else(|| malformed("huffman table overflow"))? = !(next_index as i16);
            index += 1;
            next_index += 2;
        }
    }

    Ok(())
}

/// Fill the fixed literal/length table (block type 1)
///
/// Codes: 256-279 use 7 bits, 0-143 and 280-287 use 8 bits, 144-255 use 9.
pub fn fixed_literal_table(table: &mut [i16; LITERAL_TABLE_SIZE]) {
    let mut next_free: i16 = 2;
    let mut nonterminal = |slot: &mut i16| {
        *slot = !next_free;
        next_free += 2;
    };

    for i in 0..0x7E {
        nonterminal(&mut table[i]);
    }
    for i in 0x7E..0x96 {
        table[i] = i as i16 + (256 - 0x7E);
    }
    for i in 0x96..0xFE {
        nonterminal(&mut table[i]);
    }
    for i in 0xFE..0x18E {
        table[i] = i as i16 - 0xFE;
    }
    for i in 0x18E..0x196 {
        table[i] = i as i16 + (280 - 0x18E);
    }
    for i in 0x196..0x1CE {
        nonterminal(&mut table[i]);
    }
    for i in 0x1CE..LITERAL_TABLE_SIZE {
        table[i] = i as i16 + (144 - 0x1CE);
    }
}

/// Fill the fixed distance table: every code is five bits
pub fn fixed_distance_table(table: &mut [i16; DISTANCE_TABLE_SIZE]) {
    for i in 0..0x1E {
        table[i] = !(i as i16 * 2 + 2);
    }
    for i in 0x1E..DISTANCE_TABLE_SIZE {
        table[i] = i as i16 - 0x1E;
    }
}
