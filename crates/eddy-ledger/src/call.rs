//! The weight-setting call and its signed envelope.
//!
//! Wire format: `hex(bincode(SignedCall))`. The signature covers
//! `DOMAIN_TAG || bincode(SetWeightsCall)`, and the transaction hash is
//! `blake3(bincode(SignedCall))`.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use eddy_core::error::LedgerError;
use eddy_core::types::Uid;

use crate::keys::ValidatorKey;

/// Domain separator prepended to the encoded call before signing.
pub const DOMAIN_TAG: &[u8] = b"eddy/set-weights/v1";

#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct SetWeightsCall {
    pub netuid: u16,
    pub uids: Vec<Uid>,
    pub weights: Vec<u16>,
    pub version_key: u64,
}

impl SetWeightsCall {
    pub fn new(netuid: u16, uids: &[Uid], weights: &[u16], version_key: u64) -> Result<Self, LedgerError> {
        if uids.len() != weights.len() {
            return Err(LedgerError::LengthMismatch {
                uids: uids.len(),
                weights: weights.len(),
            });
        }
        Ok(Self {
            netuid,
            uids: uids.to_vec(),
            weights: weights.to_vec(),
            version_key,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, LedgerError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| LedgerError::Encoding(e.to_string()))
    }

    /// Bytes the validator signs.
    pub fn signing_payload(&self) -> Result<Vec<u8>, LedgerError> {
        let mut payload = DOMAIN_TAG.to_vec();
        payload.extend(self.encode()?);
        Ok(payload)
    }

    pub fn sign(self, key: &ValidatorKey) -> Result<SignedCall, LedgerError> {
        let signature = key.sign(&self.signing_payload()?);
        Ok(SignedCall {
            call: self,
            signer: key.public_key_bytes(),
            signature,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct SignedCall {
    pub call: SetWeightsCall,
    pub signer: [u8; 32],
    pub signature: [u8; 64],
}

impl SignedCall {
    pub fn to_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| LedgerError::Encoding(e.to_string()))
    }

    pub fn to_hex(&self) -> Result<String, LedgerError> {
        Ok(hex::encode(self.to_bytes()?))
    }

    pub fn from_hex(encoded: &str) -> Result<Self, LedgerError> {
        let bytes = hex::decode(encoded).map_err(|e| LedgerError::Encoding(format!("invalid hex: {e}")))?;
        let (signed, read): (Self, usize) = bincode::decode_from_slice(&bytes, bincode::config::standard())
            .map_err(|e| LedgerError::Encoding(e.to_string()))?;
        if read != bytes.len() {
            return Err(LedgerError::Encoding(format!("{} trailing bytes", bytes.len() - read)));
        }
        Ok(signed)
    }

    /// Hex blake3 hash of the encoded envelope.
    pub fn tx_hash(&self) -> Result<String, LedgerError> {
        Ok(blake3::hash(&self.to_bytes()?).to_hex().to_string())
    }

    /// Check the signature against the embedded signer.
    pub fn verify(&self) -> Result<(), LedgerError> {
        let key = VerifyingKey::from_bytes(&self.signer)
            .map_err(|e| LedgerError::Invalid(format!("bad signer key: {e}")))?;
        let signature = Signature::from_bytes(&self.signature);
        key.verify(&self.call.signing_payload()?, &signature)
            .map_err(|_| LedgerError::Invalid("bad signature".to_string()))
    }
}
