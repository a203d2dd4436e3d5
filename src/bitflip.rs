//! CBC bit-flipping.
//!
//! In CBC, `P[i] = D(C[i]) ^ C[i - 1]`. Xoring a delta into ciphertext block `k` xors the same
//! delta into plaintext block `k + 1`, at the price of turning plaintext block `k` into noise. So
//! a sanitizer that strips `;` and `=` from the input never sees the bytes we end up injecting.

use rand::Rng;
use tracing::{debug, instrument};

use crate::{
    byte_at_a_time::Alignment,
    bytes_ext::{check_block_size, BytesExt},
    cipher::{gen_random_bytes, Aes},
    config::AttackConfig,
    error::{Error, Interrupted, Result},
    mode::cbc,
    oracle::Oracle,
    pkcs7,
};

/// Remove the bytes that would let input start a new field.
pub fn sanitize(input: &[u8]) -> Vec<u8> {
    input
        .iter()
        .copied()
        .filter(|b| !matches!(b, b';' | b'='))
        .collect()
}

/// Wraps user data in a fixed cookie and encrypts it with AES-CBC under a fixed key and IV.
pub struct CommentOracle {
    aes: Aes,
    iv: Vec<u8>,
}

impl CommentOracle {
    pub const PREFIX: &'static [u8] = b"comment1=cooking%20MCs;userdata=";
    pub const SUFFIX: &'static [u8] = b";comment2=%20like%20a%20pound%20of%20bacon";

    pub fn new(key: &[u8], iv: Vec<u8>) -> Result<Self> {
        let aes = Aes::new(key)?;
        if iv.len() != Aes::BLOCK_SIZE {
            return Err(Error::InvalidIvLength {
                len: iv.len(),
                block_size: Aes::BLOCK_SIZE,
            });
        }
        Ok(CommentOracle { aes, iv })
    }

    pub fn new_random<R: Rng + ?Sized>(rng: &mut R) -> Result<Self> {
        let key = gen_random_bytes(rng, 16);
        CommentOracle::new(&key, gen_random_bytes(rng, Aes::BLOCK_SIZE))
    }

    /// Decrypt a cookie and strip its padding.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let plaintext = cbc::decrypt(&self.aes, ciphertext, &self.iv)?;
        Ok(pkcs7::unpad(&plaintext, Aes::BLOCK_SIZE)?.to_vec())
    }

    /// Does the cookie carry an `admin=true` field?
    pub fn is_admin(&self, ciphertext: &[u8]) -> Result<bool> {
        let plaintext = self.decrypt(ciphertext)?;
        Ok(plaintext
            .split(|&b| b == b';')
            .any(|field| field == b"admin=true"))
    }
}

impl Oracle<Vec<u8>> for CommentOracle {
    fn encrypt(&self, plaintext: &Vec<u8>) -> Result<Vec<u8>> {
        let cookie = [Self::PREFIX, sanitize(plaintext).as_slice(), Self::SUFFIX].concat();
        cbc::encrypt(&self.aes, &cookie, &self.iv)
    }
}

fn first_differing_block(a: &[u8], b: &[u8], block_size: usize) -> Option<usize> {
    a.chunks(block_size)
        .zip(b.chunks(block_size))
        .position(|(x, y)| x != y)
}

/// Find where attacker input lands in a CBC oracle's stream.
///
/// Changing the first input byte changes every ciphertext block from the one holding it onwards,
/// which gives the block. Then we push a changed byte further in behind a growing run of filler
/// until the first changed block moves, which gives the pad.
pub fn locate_input<O: Oracle<Vec<u8>> + ?Sized>(
    oracle: &O,
    block_size: usize,
    filler: u8,
) -> Result<Alignment> {
    check_block_size(block_size)?;
    let (x, y) = (filler.wrapping_add(1), filler.wrapping_add(2));

    let start = first_differing_block(
        &oracle.encrypt(&vec![x])?,
        &oracle.encrypt(&vec![y])?,
        block_size,
    )
    .ok_or(Error::AlignmentFailed { attempts: 1 })?;

    for pad in 1..=block_size {
        let mut first = vec![filler; pad];
        let mut second = first.clone();
        first.push(x);
        second.push(y);

        let changed = first_differing_block(
            &oracle.encrypt(&first)?,
            &oracle.encrypt(&second)?,
            block_size,
        );

        if changed.is_some_and(|block| block > start) {
            // a pad of a whole block means the input was already aligned
            let alignment = if pad == block_size {
                Alignment { pad: 0, offset: start }
            } else {
                Alignment { pad, offset: start + 1 }
            };
            debug!(?alignment, "located attacker input");
            return Ok(alignment);
        }
    }

    Err(Error::AlignmentFailed { attempts: 1 })
}

/// Get `payload` into the plaintext of a CBC cookie without ever submitting it.
///
/// We submit the pad, then two whole blocks of filler. The first filler block is the one we let
/// turn into noise; flipping its ciphertext rewrites the second into `payload` (followed by the
/// rest of the filler if `payload` is shorter than a block).
#[instrument(skip_all)]
pub fn forge<O: Oracle<Vec<u8>> + ?Sized>(
    oracle: &O,
    payload: &[u8],
    config: &AttackConfig,
) -> std::result::Result<Vec<u8>, Interrupted> {
    let interrupted = |source| Interrupted::new(Vec::new(), source);

    let block_size = oracle
        .discover_block_size(config.max_block_size)
        .map_err(interrupted)?;
    if payload.len() > block_size {
        return Err(interrupted(Error::PayloadTooLarge {
            len: payload.len(),
            block_size,
        }));
    }
    let alignment = locate_input(oracle, block_size, config.filler).map_err(interrupted)?;

    let filler_block = vec![config.filler; block_size];
    let input = [
        vec![config.filler; alignment.pad],
        filler_block.clone(),
        filler_block.clone(),
    ]
    .concat();
    let mut ciphertext = oracle.encrypt(&input).map_err(interrupted)?;

    let mut wanted = filler_block.clone();
    wanted[..payload.len()].copy_from_slice(payload);
    let delta = filler_block.xor(&wanted);

    let flipped = alignment.offset;
    let Some(block) = ciphertext.block(block_size, flipped).map(<[u8]>::to_vec) else {
        return Err(Interrupted::new(
            ciphertext,
            Error::MisalignedInput {
                len: input.len(),
                block_size,
            },
        ));
    };
    let start = flipped * block_size;
    ciphertext[start..start + block_size].copy_from_slice(&block.xor(&delta));

    debug!(flipped, "flipped ciphertext block");
    Ok(ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    const PAYLOAD: &[u8] = b";admin=true;";

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize(b";admin=true;"), b"admintrue");
        assert_eq!(sanitize(b"plain data"), b"plain data");
    }

    #[test]
    fn test_cannot_inject_directly() {
        let mut rng = StdRng::seed_from_u64(20);
        let oracle = CommentOracle::new_random(&mut rng).unwrap();

        let ciphertext = oracle.encrypt(&PAYLOAD.to_vec()).unwrap();
        assert!(!oracle.is_admin(&ciphertext).unwrap());

        let plaintext = oracle.decrypt(&ciphertext).unwrap();
        assert_eq!(
            plaintext,
            [CommentOracle::PREFIX, &b"admintrue"[..], CommentOracle::SUFFIX].concat()
        );
    }

    #[test]
    fn test_locate_input() {
        let mut rng = StdRng::seed_from_u64(21);
        let oracle = CommentOracle::new_random(&mut rng).unwrap();

        // the prefix is exactly two blocks
        let alignment = locate_input(&oracle, 16, b'A').unwrap();
        assert_eq!(alignment, Alignment { pad: 0, offset: 2 });
    }

    #[test]
    fn test_locate_input_zero_block_size() {
        let mut rng = StdRng::seed_from_u64(24);
        let oracle = CommentOracle::new_random(&mut rng).unwrap();

        assert!(matches!(
            locate_input(&oracle, 0, b'A'),
            Err(Error::InvalidBlockSize { block_size: 0 })
        ));
    }

    #[test]
    fn test_forge_admin() {
        let mut rng = StdRng::seed_from_u64(22);

        for _ in 0..10 {
            let oracle = CommentOracle::new_random(&mut rng).unwrap();

            let forged = forge(&oracle, PAYLOAD, &AttackConfig::default()).unwrap();
            assert!(oracle.is_admin(&forged).unwrap());

            let plaintext = oracle.decrypt(&forged).unwrap();
            // the prefix and suffix survive, the sacrificed block does not
            assert!(plaintext.starts_with(CommentOracle::PREFIX));
            assert!(plaintext.ends_with(CommentOracle::SUFFIX));
            assert_eq!(plaintext[48..64], *b";admin=true;AAAA");
        }
    }

    #[test]
    fn test_payload_too_large() {
        let mut rng = StdRng::seed_from_u64(23);
        let oracle = CommentOracle::new_random(&mut rng).unwrap();

        let err = forge(&oracle, &[b'x'; 17], &AttackConfig::default()).unwrap_err();
        assert!(matches!(
            err.source,
            Error::PayloadTooLarge { len: 17, block_size: 16 }
        ));
        assert!(err.partial.is_empty());
    }

    #[test]
    fn test_bad_iv() {
        assert!(matches!(
            CommentOracle::new(b"YELLOW SUBMARINE", vec![0; 4]),
            Err(Error::InvalidIvLength { len: 4, .. })
        ));
    }
}
