//! BIP39 recovery phrases for store wallets

use bip39::{Language, Mnemonic};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecoveryError {
    #[error("invalid mnemonic phrase")]
    InvalidMnemonic,
}

/// Recovery phrase used to derive a wallet's keys
pub struct RecoveryPhrase {
    pub mnemonic: Mnemonic,
}

impl RecoveryPhrase {
    /// Generate a new 12-word phrase
    pub fn generate() -> Result<Self, RecoveryError> {
        use rand::rngs::OsRng;
        use rand::RngCore;

        // 16 bytes of entropy (128 bits) gives 12 words
        let mut entropy = [0u8; 16];
        OsRng.fill_bytes(&mut entropy);

        let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
            .map_err(|_| RecoveryError::InvalidMnemonic)?;

        Ok(Self { mnemonic })
    }

    /// Parse a user-supplied phrase, tolerating surrounding and repeated whitespace
    pub fn from_phrase(phrase: &str) -> Result<Self, RecoveryError> {
        let normalized = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
        let mnemonic = Mnemonic::parse_in(Language::English, normalized.as_str())
            .map_err(|_| RecoveryError::InvalidMnemonic)?;

        Ok(Self { mnemonic })
    }

    pub fn to_phrase(&self) -> String {
        self.mnemonic.to_string()
    }

    pub fn word_count(&self) -> usize {
        self.mnemonic.word_count()
    }
}
