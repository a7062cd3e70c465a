//! Block-wise transfer options (RFC 7959).
use thiserror::Error;

use crate::pdu::{decode_var_bytes, encode_var_bytes, Pdu};

/// Bytes a Block option plus payload marker may need in addition to the payload.
const BLOCK_OVERHEAD: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("block starts at offset {offset} beyond {length} bytes of data")]
    OutOfRange { offset: usize, length: usize },

    #[error("not enough space for even the smallest block")]
    NoSpace,
}

/// Decoded value of a Block1 or Block2 option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Block {
    pub num: u32,
    pub more: bool,
    pub szx: u8,
}

impl Block {
    pub fn new(num: u32, more: bool, szx: u8) -> Block {
        Block { num, more, szx }
    }

    /// Reads the option `number` from `pdu`, if present.
    pub fn from_pdu(pdu: &Pdu, number: u16) -> Option<Block> {
        pdu.option(number).map(Block::decode)
    }

    pub fn decode(value: &[u8]) -> Block {
        let value = decode_var_bytes(value);
        Block {
            num: value >> 4,
            more: value & 0x08 != 0,
            szx: (value & 0x07) as u8,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_var_bytes((self.num << 4) | ((self.more as u32) << 3) | (self.szx as u32 & 0x07))
    }

    /// Block size in bytes.
    pub fn size(&self) -> usize {
        szx_to_bytes(self.szx)
    }

    /// Offset of the first byte of this block.
    pub fn offset(&self) -> usize {
        (self.num as usize) << (self.szx as usize + 4)
    }
}

pub fn szx_to_bytes(szx: u8) -> usize {
    1 << (szx as usize + 4)
}

/// Writes `block` as option `number` into `pdu` for a body of `data_length` bytes.
///
/// Sets the M bit. If the block does not fit into the space left in `pdu`, the
/// block size is reduced to the largest one that does and `num` is scaled to
/// keep the same offset.
pub fn write_block_opt(
    block: &mut Block,
    number: u16,
    pdu: &mut Pdu,
    data_length: usize,
) -> Result<(), BlockError> {
    let start = block.offset();
    if data_length <= start {
        log::debug!("illegal block requested");
        return Err(BlockError::OutOfRange {
            offset: start,
            length: data_length,
        });
    }

    let avail = pdu
        .max_size()
        .saturating_sub(pdu.length())
        .saturating_sub(BLOCK_OVERHEAD);
    let want = block.size();

    if want <= avail {
        block.more = want < data_length - start;
    } else if data_length - start <= avail {
        // the final block fits
        block.more = false;
    } else {
        if avail < 16 {
            log::debug!("not enough space, even the smallest block does not fit");
            return Err(BlockError::NoSpace);
        }
        let szx = (usize::BITS - avail.leading_zeros()) as u8 - 5;
        block.more = true;
        block.num <<= block.szx - szx;
        block.szx = szx;
    }

    if !pdu.add_option(number, block.encode()) {
        return Err(BlockError::NoSpace);
    }
    Ok(())
}
