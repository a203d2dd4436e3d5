//! Telling ECB from CBC by counting repeated ciphertext blocks.

use std::collections::HashMap;

use tracing::debug;

use crate::{
    bytes_ext::check_block_size,
    error::Result,
    oracle::{Mode, Oracle},
};

/// The highest number of times any single `block_size` chunk occurs in `ciphertext`.
pub fn max_repeat_count(ciphertext: &[u8], block_size: usize) -> Result<usize> {
    check_block_size(block_size)?;

    let mut freq = HashMap::new();
    for block in ciphertext.chunks_exact(block_size) {
        *freq.entry(block).or_insert(0) += 1;
    }
    Ok(freq.into_values().max().unwrap_or(0))
}

/// Determine if a ciphertext is likely encrypted with ECB. This is done by checking if there are
/// any duplicate blocks in the ciphertext.
///
/// A `false` means either not ECB, a ciphertext too short, or a plaintext without duplicate
/// blocks.
pub fn has_repeated_blocks(ciphertext: &[u8], block_size: usize) -> Result<bool> {
    Ok(max_repeat_count(ciphertext, block_size)? > 1)
}

/// Classify a ciphertext produced from `submitted_len` bytes of repeating attacker plaintext.
///
/// Under ECB, every whole block of the submission encrypts identically. Up to two of those blocks
/// can be lost to the random bytes the oracle wraps around the submission, so ECB is reported
/// when the most repeated block occurs at least `submitted_len / block_size - 2` times (and never
/// fewer than twice, since a lone block repeats nothing).
///
/// The submission needs at least three whole identical blocks for the answer to mean anything.
pub fn detect_mode(ciphertext: &[u8], submitted_len: usize, block_size: usize) -> Result<Mode> {
    let repeats = max_repeat_count(ciphertext, block_size)?;
    let threshold = (submitted_len / block_size).saturating_sub(2).max(2);

    if repeats >= threshold {
        Ok(Mode::Ecb)
    } else {
        Ok(Mode::Cbc)
    }
}

/// Submit `blocks` identical blocks of `filler` to `oracle` and classify the result.
pub fn detect_oracle_mode<O: Oracle<Vec<u8>> + ?Sized>(
    oracle: &O,
    block_size: usize,
    blocks: usize,
    filler: u8,
) -> Result<Mode> {
    check_block_size(block_size)?;
    let submitted = vec![filler; block_size * blocks];
    let ciphertext = oracle.encrypt(&submitted)?;
    let mode = detect_mode(&ciphertext, submitted.len(), block_size)?;
    debug!(?mode, "classified oracle output");
    Ok(mode)
}
