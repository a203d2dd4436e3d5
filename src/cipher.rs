use std::cell::RefCell;

use openssl::symm::{self, Crypter, Mode};
use rand::Rng;

use crate::error::{Error, Result};

/// A raw single-block cipher. Modes, padding and chaining are built on top of this.
pub trait BlockCipher {
    fn block_size(&self) -> usize;

    /// Encipher exactly one block.
    fn encrypt_block(&self, block: &[u8]) -> Result<Vec<u8>>;

    /// Decipher exactly one block.
    fn decrypt_block(&self, block: &[u8]) -> Result<Vec<u8>>;
}

/// AES with a 128, 192 or 256 bit key.
///
/// OpenSSL is only asked for the bare block transform: we drive it in ECB mode with its padding
/// turned off and feed it one block at a time, so every mode and padding rule lives in this crate.
pub struct Aes {
    cipher: symm::Cipher,
    encrypter: RefCell<Crypter>,
    decrypter: RefCell<Crypter>,
}

impl Aes {
    pub const BLOCK_SIZE: usize = 16;

    pub fn new(key: &[u8]) -> Result<Self> {
        let cipher = match key.len() {
            16 => symm::Cipher::aes_128_ecb(),
            24 => symm::Cipher::aes_192_ecb(),
            32 => symm::Cipher::aes_256_ecb(),
            len => return Err(Error::InvalidKeySize { len }),
        };

        let mut encrypter = Crypter::new(cipher, Mode::Encrypt, key, None)?;
        encrypter.pad(false);
        let mut decrypter = Crypter::new(cipher, Mode::Decrypt, key, None)?;
        decrypter.pad(false);

        Ok(Aes {
            cipher,
            encrypter: RefCell::new(encrypter),
            decrypter: RefCell::new(decrypter),
        })
    }

    /// A fresh AES-128 cipher under a random key.
    pub fn new_random<R: Rng + ?Sized>(rng: &mut R) -> Result<Self> {
        Aes::new(&gen_random_bytes(rng, 16))
    }

    fn apply(&self, crypter: &RefCell<Crypter>, block: &[u8]) -> Result<Vec<u8>> {
        let block_size = self.block_size();
        if block.len() != block_size {
            return Err(Error::MisalignedInput {
                len: block.len(),
                block_size,
            });
        }

        // without padding an ECB crypter never holds data back, so it can be reused across calls
        let mut out = vec![0; block_size * 2];
        let count = crypter.borrow_mut().update(block, &mut out)?;
        out.truncate(count);
        Ok(out)
    }
}

impl BlockCipher for Aes {
    fn block_size(&self) -> usize {
        self.cipher.block_size()
    }

    fn encrypt_block(&self, block: &[u8]) -> Result<Vec<u8>> {
        self.apply(&self.encrypter, block)
    }

    fn decrypt_block(&self, block: &[u8]) -> Result<Vec<u8>> {
        self.apply(&self.decrypter, block)
    }
}

pub fn gen_random_bytes<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Vec<u8> {
    let mut bytes = vec![0; len];
    rng.fill_bytes(&mut bytes);
    bytes
}
