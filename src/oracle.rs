use std::cell::RefCell;

use rand::{Rng, RngCore};
use tracing::debug;

use crate::{
    cipher::{gen_random_bytes, Aes},
    error::{Error, Result},
    mode::{cbc, ecb},
};

/// Attacker input that can be grown one byte at a time.
pub trait Plaintext {
    fn new_zero_length() -> Self;
    fn increase(&mut self);
}

impl Plaintext for Vec<u8> {
    fn new_zero_length() -> Self {
        Vec::new()
    }

    fn increase(&mut self) {
        self.push(b'A');
    }
}

impl Plaintext for String {
    fn new_zero_length() -> Self {
        String::new()
    }

    fn increase(&mut self) {
        self.push('A');
    }
}

/// The only capability an attack gets: submit input, observe ciphertext. Whatever key, IV,
/// prefix or secret the oracle holds stays private to it.
pub trait Oracle<T: Plaintext> {
    /// Encrypt a plaintext using the oracle's encryption method and return the ciphertext.
    fn encrypt(&self, plaintext: &T) -> Result<Vec<u8>>;

    /// Discover the block size of the oracle's encryption method. This is not something an
    /// oracle tells us: grow the input until the ciphertext gets longer, the jump is one block.
    fn discover_block_size(&self, limit: usize) -> Result<usize> {
        let mut plaintext = T::new_zero_length();
        let initial_size = self.encrypt(&plaintext)?.len();

        for _ in 0..limit {
            plaintext.increase();
            let size = self.encrypt(&plaintext)?.len();
            if size != initial_size {
                debug!(block_size = size - initial_size, "discovered block size");
                return Ok(size - initial_size);
            }
        }

        Err(Error::BlockSizeUndetected { limit })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Ecb,
    Cbc,
}

/// Encrypts under ECB or CBC, chosen by coin flip on every call, with a fresh key (and IV),
/// and 5 to 10 random bytes on each side of the submitted plaintext.
pub struct ModeOracle<R> {
    rng: RefCell<R>,
}

impl<R: RngCore> ModeOracle<R> {
    pub fn new(rng: R) -> Self {
        ModeOracle {
            rng: RefCell::new(rng),
        }
    }

    /// Encrypt and also report which mode was used. The mode is ground truth for checking a
    /// detector; an attacker only ever sees [`Oracle::encrypt`].
    pub fn encrypt_with_mode(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Mode)> {
        let mut rng = self.rng.borrow_mut();
        let rng = &mut *rng;

        let aes = Aes::new_random(rng)?;
        let prefix_len = rng.gen_range(5..=10);
        let suffix_len = rng.gen_range(5..=10);
        let affixed = [
            gen_random_bytes(rng, prefix_len),
            plaintext.to_vec(),
            gen_random_bytes(rng, suffix_len),
        ]
        .concat();

        if rng.gen_bool(0.5) {
            Ok((ecb::encrypt(&aes, &affixed)?, Mode::Ecb))
        } else {
            let iv = gen_random_bytes(rng, Aes::BLOCK_SIZE);
            Ok((cbc::encrypt(&aes, &affixed, &iv)?, Mode::Cbc))
        }
    }
}

impl<R: RngCore> Oracle<Vec<u8>> for ModeOracle<R> {
    fn encrypt(&self, plaintext: &Vec<u8>) -> Result<Vec<u8>> {
        self.encrypt_with_mode(plaintext).map(|(ciphertext, _)| ciphertext)
    }
}

/// `AES-ECB(prefix || attacker bytes || secret, key)` with key, prefix and secret fixed for
/// the life of the oracle.
pub struct EcbOracle {
    aes: Aes,
    prefix: Vec<u8>,
    secret: Vec<u8>,
}

impl EcbOracle {
    /// An oracle with no prefix, appending `secret` to every input.
    pub fn new(key: &[u8], secret: Vec<u8>) -> Result<Self> {
        EcbOracle::new_with_prefix(key, Vec::new(), secret)
    }

    pub fn new_with_prefix(key: &[u8], prefix: Vec<u8>, secret: Vec<u8>) -> Result<Self> {
        Ok(EcbOracle {
            aes: Aes::new(key)?,
            prefix,
            secret,
        })
    }

    /// An oracle under a random key that also prepends `prefix_len` random bytes. The prefix is
    /// drawn once and reused for every call.
    pub fn new_prefixed<R: Rng + ?Sized>(
        rng: &mut R,
        prefix_len: usize,
        secret: Vec<u8>,
    ) -> Result<Self> {
        Ok(EcbOracle {
            aes: Aes::new_random(rng)?,
            prefix: gen_random_bytes(rng, prefix_len),
            secret,
        })
    }
}

impl Oracle<Vec<u8>> for EcbOracle {
    fn encrypt(&self, plaintext: &Vec<u8>) -> Result<Vec<u8>> {
        let affixed = [
            self.prefix.as_slice(),
            plaintext.as_slice(),
            self.secret.as_slice(),
        ]
        .concat();
        ecb::encrypt(&self.aes, &affixed)
    }
}
