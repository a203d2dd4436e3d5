//! ECB and CBC built on a [`BlockCipher`](crate::cipher::BlockCipher).
//!
//! Encryption always pads with PKCS#7. Decryption never unpads: the caller decides what a bad
//! padding means.

use crate::error::{Error, Result};

fn check_aligned(ciphertext: &[u8], block_size: usize) -> Result<()> {
    if ciphertext.len() % block_size == 0 {
        Ok(())
    } else {
        Err(Error::MisalignedInput {
            len: ciphertext.len(),
            block_size,
        })
    }
}

pub mod ecb {
    use crate::{cipher::BlockCipher, error::Result, pkcs7};

    pub fn encrypt<C: BlockCipher + ?Sized>(cipher: &C, plaintext: &[u8]) -> Result<Vec<u8>> {
        let block_size = cipher.block_size();
        let padded_plaintext = pkcs7::pad(plaintext, block_size)?;
        let mut ciphertext = Vec::with_capacity(padded_plaintext.len());

        for block in padded_plaintext.chunks_exact(block_size) {
            ciphertext.extend_from_slice(&cipher.encrypt_block(block)?);
        }

        Ok(ciphertext)
    }

    pub fn decrypt<C: BlockCipher + ?Sized>(cipher: &C, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let block_size = cipher.block_size();
        super::check_aligned(ciphertext, block_size)?;
        let mut plaintext = Vec::with_capacity(ciphertext.len());

        for block in ciphertext.chunks_exact(block_size) {
            plaintext.extend_from_slice(&cipher.decrypt_block(block)?);
        }

        Ok(plaintext)
    }
}

pub mod cbc {
    use crate::{
        bytes_ext::BytesExt,
        cipher::BlockCipher,
        error::{Error, Result},
        pkcs7,
    };

    fn check_iv(iv: &[u8], block_size: usize) -> Result<()> {
        if iv.len() == block_size {
            Ok(())
        } else {
            Err(Error::InvalidIvLength {
                len: iv.len(),
                block_size,
            })
        }
    }

    pub fn encrypt<C: BlockCipher + ?Sized>(
        cipher: &C,
        plaintext: &[u8],
        iv: &[u8],
    ) -> Result<Vec<u8>> {
        let block_size = cipher.block_size();
        check_iv(iv, block_size)?;
        let padded_plaintext = pkcs7::pad(plaintext, block_size)?;
        let mut ciphertext = Vec::with_capacity(padded_plaintext.len());

        let mut last_ciphertext_block = iv.to_vec();

        for block in padded_plaintext.chunks_exact(block_size) {
            last_ciphertext_block = cipher.encrypt_block(&block.xor(&last_ciphertext_block))?;
            ciphertext.extend_from_slice(&last_ciphertext_block);
        }

        Ok(ciphertext)
    }

    pub fn decrypt<C: BlockCipher + ?Sized>(
        cipher: &C,
        ciphertext: &[u8],
        iv: &[u8],
    ) -> Result<Vec<u8>> {
        let block_size = cipher.block_size();
        check_iv(iv, block_size)?;
        if ciphertext.is_empty() {
            return Err(Error::MisalignedInput { len: 0, block_size });
        }
        super::check_aligned(ciphertext, block_size)?;
        let mut plaintext = Vec::with_capacity(ciphertext.len());

        let mut previous = iv;
        for block in ciphertext.chunks_exact(block_size) {
            plaintext.extend_from_slice(&cipher.decrypt_block(block)?.xor(previous));
            previous = block;
        }

        Ok(plaintext)
    }
}
