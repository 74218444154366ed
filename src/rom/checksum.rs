//! N64 header checksum repair
//!
//! The boot code verifies two words at `0x10`/`0x14` against a checksum of
//! the first megabyte after the boot code, so any change to that region
//! (such as decompressing it) has to be followed by recomputing them.

use crate::crc32::crc32;
use crate::{be_u32, write_be_u32, Result};
use log::{debug, warn};

const HEADER_SIZE: usize = 0x40;
const BOOT_CODE_END: usize = 0x1000;
const CHECKSUM_START: usize = 0x1000;
const CHECKSUM_LENGTH: usize = 0x0010_0000;
const CRC1_OFFSET: usize = 0x10;
const CRC2_OFFSET: usize = 0x14;

/// Repairs an embedded checksum after the image has been rebuilt
pub trait ChecksumFixer {
    /// Recompute and store the checksum of `image` in place
    fn fix(&mut self, image: &mut [u8]) -> Result<()>;
}

/// Leaves the image untouched
#[derive(Debug, Default, Clone, Copy)]
pub struct NoChecksum;

impl ChecksumFixer for NoChecksum {
    fn fix(&mut self, _image: &mut [u8]) -> Result<()> {
        Ok(())
    }
}

/// Boot chip variant, which selects the checksum seed and mixing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cic {
    /// CIC-NUS-6101
    Cic6101,
    /// CIC-NUS-6102
    Cic6102,
    /// CIC-NUS-6103
    Cic6103,
    /// CIC-NUS-6105
    Cic6105,
    /// CIC-NUS-6106
    Cic6106,
}

impl Cic {
    /// Identify the chip from the CRC-32 of the boot code
    pub fn detect(image: &[u8]) -> Option<Cic> {
        let boot = image.get(HEADER_SIZE..BOOT_CODE_END)?;
        match crc32(boot) {
            0x6170_A4A1 => Some(Cic::Cic6101),
            0x90BB_6CB5 => Some(Cic::Cic6102),
            0x0B05_0EE0 => Some(Cic::Cic6103),
            0x98BC_2C86 => Some(Cic::Cic6105),
            0xACC8_580A => Some(Cic::Cic6106),
            _ => None,
        }
    }

    fn seed(self) -> u32 {
        match self {
            Cic::Cic6101 | Cic::Cic6102 => 0xF8CA_4DDC,
            Cic::Cic6103 => 0xA388_6759,
            Cic::Cic6105 => 0xDF26_F436,
            Cic::Cic6106 => 0x1FEA_617A,
        }
    }
}

/// Compute the two checksum words for `image`
///
/// Returns `None` when the image is shorter than the checksummed region.
pub fn compute(image: &[u8], cic: Cic) -> Option<(u32, u32)> {
    if image.len() < CHECKSUM_START + CHECKSUM_LENGTH {
        return None;
    }

    let seed = cic.seed();
    let (mut t1, mut t2, mut t3, mut t4, mut t5, mut t6) = (seed, seed, seed, seed, seed, seed);

    for i in (CHECKSUM_START..CHECKSUM_START + CHECKSUM_LENGTH).step_by(4) {
        let d = be_u32(image, i);
        if t6.wrapping_add(d) < t6 {
            t4 = t4.wrapping_add(1);
        }
        t6 = t6.wrapping_add(d);
        t3 ^= d;
        let r = d.rotate_left(d & 0x1F);
        t5 = t5.wrapping_add(r);
        if t2 > d {
            t2 ^= r;
        } else {
            t2 ^= t6 ^ d;
        }

        if cic == Cic::Cic6105 {
            let boot = be_u32(image, HEADER_SIZE + 0x0710 + (i & 0xFF));
            t1 = t1.wrapping_add(boot ^ d);
        } else {
            t1 = t1.wrapping_add(t5 ^ d);
        }
    }

    Some(match cic {
        Cic::Cic6103 => ((t6 ^ t4).wrapping_add(t3), (t5 ^ t2).wrapping_add(t1)),
        Cic::Cic6106 => (
            t6.wrapping_mul(t4).wrapping_add(t3),
            t5.wrapping_mul(t2).wrapping_add(t1),
        ),
        _ => (t6 ^ t4 ^ t3, t5 ^ t2 ^ t1),
    })
}

/// Standard N64 header checksum
///
/// The chip is detected from the boot code unless one is forced. Images
/// with an unrecognized boot code, or too small to checksum, are left as is.
#[derive(Debug, Default, Clone, Copy)]
pub struct N64Checksum {
    cic: Option<Cic>,
}

impl N64Checksum {
    /// Detect the chip from each image's boot code
    pub fn new() -> Self {
        Self::default()
    }

    /// Always use `cic`
    pub fn with_cic(cic: Cic) -> Self {
        Self { cic: Some(cic) }
    }
}

impl ChecksumFixer for N64Checksum {
    fn fix(&mut self, image: &mut [u8]) -> Result<()> {
        let Some(cic) = self.cic.or_else(|| Cic::detect(image)) else {
            warn!("unknown boot code, checksum left unchanged");
            return Ok(());
        };
        let Some((crc1, crc2)) = compute(image, cic) else {
            warn!(
                "image of {} bytes is too small to checksum, left unchanged",
                image.len()
            );
            return Ok(());
        };

        write_be_u32(image, CRC1_OFFSET, crc1);
        write_be_u32(image, CRC2_OFFSET, crc2);
        debug!("{cic:?} checksum {crc1:08X} {crc2:08X}");
        Ok(())
    }
}
