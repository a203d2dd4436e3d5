/// Bounds and knobs shared by the attack drivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackConfig {
    /// Stop growing the probe after this many bytes when discovering the block size.
    pub max_block_size: usize,
    /// Longest secret extraction will return. A longer secret fails with `SecretLimitReached`
    /// after reading one byte past this bound. Guards against oracles that keep matching
    /// forever.
    pub max_secret_len: usize,
    /// Fresh probe rounds to try before reporting `AlignmentFailed`.
    pub alignment_attempts: usize,
    /// The known byte used for filler and padding in submitted inputs.
    pub filler: u8,
}

impl Default for AttackConfig {
    fn default() -> Self {
        AttackConfig {
            max_block_size: 256,
            max_secret_len: 4096,
            alignment_attempts: 16,
            filler: b'A',
        }
    }
}

impl AttackConfig {
    #[must_use]
    pub fn with_max_block_size(mut self, max_block_size: usize) -> Self {
        self.max_block_size = max_block_size;
        self
    }

    #[must_use]
    pub fn with_max_secret_len(mut self, max_secret_len: usize) -> Self {
        self.max_secret_len = max_secret_len;
        self
    }

    #[must_use]
    pub fn with_alignment_attempts(mut self, attempts: usize) -> Self {
        self.alignment_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_filler(mut self, filler: u8) -> Self {
        self.filler = filler;
        self
    }
}
