//! The validator's ed25519 signing key.

use std::fmt;

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use eddy_core::error::LedgerError;
use zeroize::Zeroizing;

/// Ed25519 key that signs weight submissions.
///
/// Loaded from a hex-encoded 32-byte seed. Intermediate copies of the seed
/// are zeroized; the dalek key zeroizes itself on drop.
pub struct ValidatorKey {
    signing_key: SigningKey,
}

impl ValidatorKey {
    /// Parse a 64-character hex seed, with or without a `0x` prefix.
    pub fn from_hex_seed(hex_seed: &str) -> Result<Self, LedgerError> {
        let trimmed = hex_seed.trim();
        let body = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let decoded = Zeroizing::new(
            hex::decode(body).map_err(|e| LedgerError::SigningKey(format!("seed is not hex: {e}")))?,
        );
        let seed: Zeroizing<[u8; 32]> = Zeroizing::new(
            decoded
                .as_slice()
                .try_into()
                .map_err(|_| LedgerError::SigningKey(format!("seed must be 32 bytes, got {}", decoded.len())))?,
        );
        Ok(Self::from_seed(&seed))
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Raw public key bytes, as carried in the signed envelope.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key().to_bytes()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl fmt::Debug for ValidatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorKey")
            .field("public_key", &self.public_key_hex())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier};

    const SEED_HEX: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

    #[test]
    fn loads_hex_seed_with_and_without_prefix() {
        let a = ValidatorKey::from_hex_seed(SEED_HEX).unwrap();
        let b = ValidatorKey::from_hex_seed(&format!("0x{SEED_HEX}")).unwrap();
        assert_eq!(a.public_key_bytes(), b.public_key_bytes());
        // RFC 8032 test vector 1.
        assert_eq!(
            a.public_key_hex(),
            "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a"
        );
    }

    #[test]
    fn rejects_bad_seeds() {
        assert!(matches!(ValidatorKey::from_hex_seed("zz"), Err(LedgerError::SigningKey(_))));
        assert!(matches!(ValidatorKey::from_hex_seed("abcd"), Err(LedgerError::SigningKey(_))));
        assert!(matches!(ValidatorKey::from_hex_seed(""), Err(LedgerError::SigningKey(_))));
    }

    #[test]
    fn signature_verifies() {
        let key = ValidatorKey::from_seed(&[7u8; 32]);
        let sig = Signature::from_bytes(&key.sign(b"weights"));
        assert!(key.verifying_key().verify(b"weights", &sig).is_ok());
        assert!(key.verifying_key().verify(b"other", &sig).is_err());
    }

    #[test]
    fn debug_redacts_secret() {
        let key = ValidatorKey::from_seed(&[1u8; 32]);
        let debug = format!("{key:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(&hex::encode([1u8; 32])));
    }
}
