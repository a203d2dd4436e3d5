use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The key length is not one the cipher accepts.
    #[error("invalid key size: {len} bytes")]
    InvalidKeySize { len: usize },

    /// PKCS#7 can only describe padding lengths from 1 to 255.
    #[error("invalid block size: {block_size}")]
    InvalidBlockSize { block_size: usize },

    #[error("IV is {len} bytes, expected {block_size}")]
    InvalidIvLength { len: usize, block_size: usize },

    /// The trailing bytes do not form valid PKCS#7 padding.
    #[error("invalid padding")]
    InvalidPadding,

    /// Padded data handed to the codec is not a whole number of blocks.
    #[error("padded data of {len} bytes is not aligned to {block_size} byte blocks")]
    BlockMisaligned { len: usize, block_size: usize },

    /// Ciphertext handed to a mode is not a whole (nonzero, for CBC) number of blocks.
    #[error("ciphertext of {len} bytes is not aligned to {block_size} byte blocks")]
    MisalignedInput { len: usize, block_size: usize },

    #[error("could not align past the oracle prefix after {attempts} attempts")]
    AlignmentFailed { attempts: usize },

    /// No candidate byte matched the reference block at `position`.
    #[error("no candidate byte matched at secret position {position}")]
    ExtractionExhausted { position: usize },

    #[error("secret is longer than the {limit} byte extraction limit")]
    SecretLimitReached { limit: usize },

    #[error("ciphertext length never changed within {limit} input bytes")]
    BlockSizeUndetected { limit: usize },

    #[error("oracle does not behave like ECB")]
    NotEcb,

    #[error("payload of {len} bytes does not fit in a {block_size} byte block")]
    PayloadTooLarge { len: usize, block_size: usize },

    #[error("malformed record: {0}")]
    InvalidRecord(String),

    #[error(transparent)]
    Cipher(#[from] openssl::error::ErrorStack),
}

/// An attack step failed. `partial` holds whatever the attack had already recovered or forged
/// when `source` was raised.
#[derive(Debug, Error)]
#[error("attack interrupted after {} bytes: {source}", .partial.len())]
pub struct Interrupted {
    pub partial: Vec<u8>,
    #[source]
    pub source: Error,
}

impl Interrupted {
    pub(crate) fn new(partial: Vec<u8>, source: Error) -> Self {
        Interrupted { partial, source }
    }
}
