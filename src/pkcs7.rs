//! PKCS#7 padding.
//!
//! Padding is never omitted: data that already fills its last block gets a whole extra block of
//! padding, so the last byte always says how much to strip.

use crate::error::{Error, Result};

fn check_block_size(block_size: usize) -> Result<u8> {
    u8::try_from(block_size)
        .ok()
        .filter(|&n| n > 0)
        .ok_or(Error::InvalidBlockSize { block_size })
}

/// Pad `data` to a multiple of `block_size` (1 to 255).
pub fn pad(data: &[u8], block_size: usize) -> Result<Vec<u8>> {
    check_block_size(block_size)?;

    let pad_len = block_size - data.len() % block_size;
    let mut padded = Vec::with_capacity(data.len() + pad_len);
    padded.extend_from_slice(data);
    #[allow(clippy::cast_possible_truncation)]
    padded.resize(data.len() + pad_len, pad_len as u8);
    Ok(padded)
}

/// The length of the padding at the end of `data`.
pub fn pad_len(data: &[u8], block_size: usize) -> Result<usize> {
    let max = check_block_size(block_size)?;

    if data.len() % block_size != 0 {
        return Err(Error::BlockMisaligned {
            len: data.len(),
            block_size,
        });
    }

    let &last = data.last().ok_or(Error::InvalidPadding)?;
    if last == 0 || last > max {
        return Err(Error::InvalidPadding);
    }

    let pad_len = last as usize;
    if data[data.len() - pad_len..].iter().any(|&b| b != last) {
        return Err(Error::InvalidPadding);
    }

    Ok(pad_len)
}

/// Strip the padding from `data`.
pub fn unpad(data: &[u8], block_size: usize) -> Result<&[u8]> {
    let pad_len = pad_len(data, block_size)?;
    Ok(&data[..data.len() - pad_len])
}
