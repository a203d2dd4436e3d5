//! Byte-at-a-time ECB decryption.
//!
//! Against an oracle computing `ECB(prefix || attacker bytes || secret, key)` with everything but
//! the attacker bytes fixed, the secret can be read one byte at a time. We line the unknown byte
//! up as the last byte of a block whose other bytes we know, then try all 256 values for it until
//! the ciphertext block matches.

use tracing::{debug, instrument, trace, warn};

use crate::{
    bytes_ext::{check_block_size, BytesExt},
    config::AttackConfig,
    detect::has_repeated_blocks,
    error::{Error, Interrupted, Result},
    oracle::Oracle,
};

/// Where attacker input starts taking whole blocks of its own.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    /// Bytes to send first so the oracle's prefix ends on a block boundary.
    pub pad: usize,
    /// Index of the first ciphertext block that holds only attacker bytes once `pad` is sent.
    pub offset: usize,
}

impl Alignment {
    /// Blocks made up entirely of prefix bytes. When a pad is needed the block before `offset`
    /// is shared between the prefix and the pad.
    pub fn prefix_blocks(&self) -> usize {
        if self.pad == 0 {
            self.offset
        } else {
            self.offset.saturating_sub(1)
        }
    }
}

/// The first index `i` where both ciphertexts repeat block `i` as block `i + 1`, and the repeated
/// blocks differ between the two. The two ciphertexts come from probes using different filler
/// bytes, so a repeat caused by the oracle's own bytes shows up in both with the same content and
/// is skipped.
fn filler_pair(first: &[u8], second: &[u8], block_size: usize) -> Option<usize> {
    let blocks = first.block_count(block_size).min(second.block_count(block_size));

    (0..blocks.saturating_sub(1)).find(|&i| {
        let a = first.block(block_size, i);
        let b = second.block(block_size, i);
        a == first.block(block_size, i + 1) && b == second.block(block_size, i + 1) && a != b
    })
}

/// Find how far past an unknown, fixed prefix the attacker bytes land.
///
/// Three blocks of filler always leave two whole filler blocks in the ciphertext, and the first
/// of them sits just after the block the prefix ends in. Once that index is known, the pad is
/// the only length of leading bytes for which two filler blocks still line up exactly there.
///
/// Each round sends fresh probes; after `config.alignment_attempts` rounds without a consistent
/// answer this fails with `AlignmentFailed`.
#[instrument(skip(oracle, config))]
pub fn align_prefix<O: Oracle<Vec<u8>> + ?Sized>(
    oracle: &O,
    block_size: usize,
    config: &AttackConfig,
) -> Result<Alignment> {
    check_block_size(block_size)?;
    let fill = config.filler;
    let other = fill.wrapping_add(1);

    for attempt in 1..=config.alignment_attempts {
        let first = oracle.encrypt(&vec![fill; 3 * block_size])?;
        let second = oracle.encrypt(&vec![other; 3 * block_size])?;

        let Some(offset) = filler_pair(&first, &second, block_size) else {
            warn!(attempt, "no repeated filler blocks");
            continue;
        };

        for pad in 0..block_size {
            let first = oracle.encrypt(&[vec![other; pad], vec![fill; 2 * block_size]].concat())?;
            let second = oracle.encrypt(&[vec![fill; pad], vec![other; 2 * block_size]].concat())?;

            if filler_pair(&first, &second, block_size) == Some(offset) {
                debug!(pad, offset, attempt, "aligned past prefix");
                return Ok(Alignment { pad, offset });
            }
        }

        warn!(attempt, offset, "no pad lines up with the filler blocks");
    }

    Err(Error::AlignmentFailed {
        attempts: config.alignment_attempts,
    })
}

/// Reads the secret an ECB oracle appends to attacker input.
pub struct SecretExtractor<'a, O: ?Sized> {
    oracle: &'a O,
    block_size: usize,
    alignment: Alignment,
    config: AttackConfig,
}

impl<'a, O: Oracle<Vec<u8>> + ?Sized> SecretExtractor<'a, O> {
    /// An extractor for an oracle without a prefix.
    pub fn new(oracle: &'a O, block_size: usize, config: AttackConfig) -> Result<Self> {
        check_block_size(block_size)?;
        Ok(SecretExtractor {
            oracle,
            block_size,
            alignment: Alignment::default(),
            config,
        })
    }

    #[must_use]
    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    /// Learn everything needed from the oracle itself: block size, that it is ECB at all, and
    /// the alignment past any prefix.
    pub fn discover(oracle: &'a O, config: AttackConfig) -> Result<Self> {
        let block_size = oracle.discover_block_size(config.max_block_size)?;

        let ciphertext = oracle.encrypt(&vec![config.filler; 3 * block_size])?;
        if !has_repeated_blocks(&ciphertext, block_size)? {
            return Err(Error::NotEcb);
        }

        let alignment = align_prefix(oracle, block_size, &config)?;
        Ok(SecretExtractor::new(oracle, block_size, config)?.with_alignment(alignment))
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    /// Recover the secret byte following `recovered`.
    pub fn next_byte(&self, recovered: &[u8]) -> Result<u8> {
        let block_size = self.block_size;
        let filler = self.config.filler;

        // the amount of fill bytes we need to add. this cycles from block_size - 1 to 0, so the
        // next unknown byte always ends up last in the block at `target`
        let fill_size = block_size - 1 - recovered.len() % block_size;
        let target = self.alignment.offset + recovered.len() / block_size;

        let mut probe = vec![filler; self.alignment.pad + fill_size];
        let reference = self.oracle.encrypt(&probe)?;
        let Some(reference_block) = reference.block(block_size, target) else {
            return Err(Error::ExtractionExhausted {
                position: recovered.len(),
            });
        };

        // same layout, but the block at `target` now ends in our guess instead of the secret
        probe.extend_from_slice(recovered);
        probe.push(0);
        let last = probe.len() - 1;

        for candidate in 0..=u8::MAX {
            probe[last] = candidate;
            let ciphertext = self.oracle.encrypt(&probe)?;
            if ciphertext.block(block_size, target) == Some(reference_block) {
                return Ok(candidate);
            }
        }

        Err(Error::ExtractionExhausted {
            position: recovered.len(),
        })
    }

    /// Recover the whole secret.
    ///
    /// Past the end of the secret the first padding byte (`0x01`) still matches, and the byte
    /// after it cannot: the real padding has grown to `0x02 0x02`. That exhaustion is where the
    /// secret ends. Any other failure hands back what was recovered so far.
    ///
    /// At most `config.max_secret_len` bytes of secret are returned. A secret of exactly that
    /// length is recovered whole; a longer one fails with `SecretLimitReached`, carrying its
    /// first `max_secret_len` bytes.
    #[instrument(skip_all, fields(block_size = self.block_size))]
    pub fn extract(&self) -> std::result::Result<Vec<u8>, Interrupted> {
        let limit = self.config.max_secret_len;
        let mut recovered = Vec::new();

        loop {
            // one byte past the limit is only read to see whether it is the padding
            let past_limit = recovered.len().saturating_sub(limit);
            if past_limit > 1 || (past_limit == 1 && recovered.last() != Some(&1)) {
                recovered.truncate(limit);
                warn!(limit, "secret limit reached");
                return Err(Interrupted::new(
                    recovered,
                    Error::SecretLimitReached { limit },
                ));
            }

            match self.next_byte(&recovered) {
                Ok(byte) => {
                    trace!(position = recovered.len(), byte, "recovered byte");
                    recovered.push(byte);
                }
                Err(Error::ExtractionExhausted { position }) if recovered.last() == Some(&1) => {
                    recovered.pop();
                    debug!(len = position - 1, "reached padding, secret recovered");
                    return Ok(recovered);
                }
                Err(err) => {
                    warn!(position = recovered.len(), %err, "extraction stopped");
                    recovered.truncate(limit);
                    return Err(Interrupted::new(recovered, err));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bitflip::CommentOracle, oracle::EcbOracle};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const KEY: &[u8] = b"YELLOW SUBMARINE";

    fn random_secret(rng: &mut StdRng, len: usize) -> Vec<u8> {
        (0..len).map(|_| rng.gen()).collect()
    }

    #[test]
    fn test_extracts_secret_of_any_length() {
        let mut rng = StdRng::seed_from_u64(12);

        for len in 0..=150 {
            let secret = random_secret(&mut rng, len);
            let oracle = EcbOracle::new(KEY, secret.clone()).unwrap();

            let extractor = SecretExtractor::new(&oracle, 16, AttackConfig::default()).unwrap();
            assert_eq!(extractor.extract().unwrap(), secret, "secret length {len}");
        }
    }

    #[test]
    fn test_secret_ending_in_padding_like_bytes() {
        let secrets: [&[u8]; 4] = [b"ends in one\x01", b"\x01", b"\x02\x02", b"\x01\x01\x01"];
        for secret in secrets {
            let oracle = EcbOracle::new(KEY, secret.to_vec()).unwrap();

            let extractor = SecretExtractor::new(&oracle, 16, AttackConfig::default()).unwrap();
            assert_eq!(extractor.extract().unwrap(), secret);
        }
    }

    #[test]
    fn test_alignment_for_every_prefix_length() {
        let mut rng = StdRng::seed_from_u64(13);

        for prefix_len in 0..48 {
            let oracle = EcbOracle::new_prefixed(&mut rng, prefix_len, b"top secret".to_vec())
                .unwrap();

            let alignment = align_prefix(&oracle, 16, &AttackConfig::default()).unwrap();
            assert_eq!(alignment.pad, (16 - prefix_len % 16) % 16, "prefix {prefix_len}");
            assert_eq!(alignment.offset, prefix_len.div_ceil(16), "prefix {prefix_len}");
            assert_eq!(alignment.prefix_blocks(), prefix_len / 16, "prefix {prefix_len}");
        }
    }

    #[test]
    fn test_alignment_ignores_filler_bytes_around_input() {
        // prefix ends in filler bytes, secret starts with them
        let oracle = EcbOracle::new_with_prefix(
            KEY,
            b"xyzAAAAA".to_vec(),
            b"AAAAAAAAAAAAAAAAAAAAsecret".to_vec(),
        )
        .unwrap();

        let alignment = align_prefix(&oracle, 16, &AttackConfig::default()).unwrap();
        assert_eq!(alignment, Alignment { pad: 8, offset: 1 });

        let extractor = SecretExtractor::new(&oracle, 16, AttackConfig::default())
            .unwrap()
            .with_alignment(alignment);
        assert_eq!(extractor.extract().unwrap(), b"AAAAAAAAAAAAAAAAAAAAsecret");
    }

    #[test]
    fn test_extracts_behind_random_prefix() {
        let mut rng = StdRng::seed_from_u64(15);

        for _ in 0..12 {
            let prefix_len = rng.gen_range(0..48);
            let secret = random_secret(&mut rng, 40);
            let oracle = EcbOracle::new_prefixed(&mut rng, prefix_len, secret.clone()).unwrap();

            let extractor = SecretExtractor::discover(&oracle, AttackConfig::default()).unwrap();
            assert_eq!(extractor.block_size(), 16);
            assert_eq!(extractor.extract().unwrap(), secret, "prefix {prefix_len}");
        }
    }

    #[test]
    fn test_limit_keeps_partial_secret() {
        let secret = b"a secret longer than the limit".to_vec();
        let oracle = EcbOracle::new(KEY, secret.clone()).unwrap();
        let config = AttackConfig::default().with_max_secret_len(8);

        let extractor = SecretExtractor::new(&oracle, 16, config).unwrap();
        let err = extractor.extract().unwrap_err();
        assert!(matches!(err.source, Error::SecretLimitReached { limit: 8 }));
        assert_eq!(err.partial, secret[..8]);
    }

    #[test]
    fn test_limit_around_secret_length() {
        let config = AttackConfig::default().with_max_secret_len(8);
        let extract = |secret: &[u8]| {
            let oracle = EcbOracle::new(KEY, secret.to_vec()).unwrap();
            SecretExtractor::new(&oracle, 16, config.clone()).unwrap().extract()
        };

        // exactly at the limit is still a full recovery
        assert_eq!(extract(b"12345678").unwrap(), b"12345678");

        // one byte over: the padding byte read past the limit is not part of the result
        let over: [&[u8]; 2] = [b"123456789", b"12345678\x01"];
        for secret in over {
            let err = extract(secret).unwrap_err();
            assert!(matches!(err.source, Error::SecretLimitReached { limit: 8 }));
            assert_eq!(err.partial, b"12345678");
        }
    }

    #[test]
    fn test_zero_block_size() {
        let oracle = EcbOracle::new(KEY, b"top secret".to_vec()).unwrap();

        assert!(matches!(
            SecretExtractor::new(&oracle, 0, AttackConfig::default()),
            Err(Error::InvalidBlockSize { block_size: 0 })
        ));
        assert!(matches!(
            align_prefix(&oracle, 0, &AttackConfig::default()),
            Err(Error::InvalidBlockSize { block_size: 0 })
        ));
    }

    #[test]
    fn test_prefix_blocks_without_offset() {
        assert_eq!(Alignment { pad: 1, offset: 0 }.prefix_blocks(), 0);
        assert_eq!(Alignment { pad: 0, offset: 2 }.prefix_blocks(), 2);
        assert_eq!(Alignment { pad: 5, offset: 2 }.prefix_blocks(), 1);
    }

    #[test]
    fn test_cbc_oracle_is_rejected() {
        let mut rng = StdRng::seed_from_u64(16);
        let oracle = CommentOracle::new_random(&mut rng).unwrap();

        assert!(matches!(
            SecretExtractor::discover(&oracle, AttackConfig::default()),
            Err(Error::NotEcb)
        ));
    }

    #[test]
    fn test_alignment_gives_up() {
        let mut rng = StdRng::seed_from_u64(17);
        let oracle = CommentOracle::new_random(&mut rng).unwrap();
        let config = AttackConfig::default().with_alignment_attempts(3);

        assert!(matches!(
            align_prefix(&oracle, 16, &config),
            Err(Error::AlignmentFailed { attempts: 3 })
        ));
    }
}
