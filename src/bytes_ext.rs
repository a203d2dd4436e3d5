use crate::error::{Error, Result};

/// Block sizes that can index blocks at all.
pub(crate) fn check_block_size(block_size: usize) -> Result<()> {
    if block_size == 0 {
        return Err(Error::InvalidBlockSize { block_size });
    }
    Ok(())
}

pub(crate) trait BytesExt {
    /// Xor self with another slice of bytes of equal length
    fn xor<B: AsRef<[u8]>>(&self, other: B) -> Vec<u8>;

    /// The `idx`th `block_size` chunk, if the data is long enough to hold all of it
    fn block(&self, block_size: usize, idx: usize) -> Option<&[u8]>;

    /// Number of whole `block_size` chunks
    fn block_count(&self, block_size: usize) -> usize;
}

fn assert_same_length<B: AsRef<[u8]>>(a: B, b: B) {
    assert_eq!(
        a.as_ref().len(),
        b.as_ref().len(),
        "Length mismatch: {} != {}",
        a.as_ref().len(),
        b.as_ref().len()
    );
}

impl BytesExt for [u8] {
    fn xor<B: AsRef<[u8]>>(&self, other: B) -> Vec<u8> {
        assert_same_length(self, other.as_ref());

        self.iter()
            .zip(other.as_ref().iter())
            .map(|(a, b)| a ^ b)
            .collect()
    }

    fn block(&self, block_size: usize, idx: usize) -> Option<&[u8]> {
        let start = idx.checked_mul(block_size)?;
        self.get(start..start.checked_add(block_size)?)
    }

    fn block_count(&self, block_size: usize) -> usize {
        self.len() / block_size
    }
}
