//! Authenticated payload encryption for data crossing the history boundary
//!
//! An encrypted payload carries `nonce (12 bytes) || ciphertext || tag (16
//! bytes)` as data and the metadata `encoding = binary/encrypted` plus
//! `encryption-key-id`. The plaintext is the JSON form of the original
//! payload, so metadata survives the round trip.

use crate::CodecError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata key naming the payload encoding
pub const METADATA_ENCODING: &str = "encoding";
/// Metadata key naming the encryption key
pub const METADATA_KEY_ID: &str = "encryption-key-id";
/// Encoding marker of encrypted payloads
pub const ENCODING_ENCRYPTED: &str = "binary/encrypted";
/// Encoding marker of plain JSON payloads
pub const ENCODING_JSON: &str = "json/plain";

/// Default key ID
pub const DEFAULT_KEY_ID: &str = "test";
/// Default 256-bit key
pub const DEFAULT_KEY: &[u8; 32] = b"sa-rocks!sa-rocks!sa-rocks!yeah!";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Opaque blob with metadata
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Encoding and key metadata
    pub metadata: BTreeMap<String, Vec<u8>>,
    /// Payload bytes
    pub data: Vec<u8>,
}

impl Payload {
    /// Encode a value as a plain JSON payload
    pub fn json<T: Serialize>(value: &T) -> Result<Self, CodecError> {
        let mut metadata = BTreeMap::new();
        metadata.insert(METADATA_ENCODING.to_string(), ENCODING_JSON.as_bytes().to_vec());
        Ok(Self {
            metadata,
            data: serde_json::to_vec(value)?,
        })
    }

    /// Decode the JSON body of a plain payload
    pub fn to_value<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        Ok(serde_json::from_slice(&self.data)?)
    }

    /// Metadata value as text
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(|v| std::str::from_utf8(v).ok())
    }

    /// Check if the payload carries the encrypted marker
    pub fn is_encrypted(&self) -> bool {
        self.metadata_str(METADATA_ENCODING) == Some(ENCODING_ENCRYPTED)
    }
}

/// Transformation applied to payloads entering and leaving the substrate
pub trait PayloadCodec: Send + Sync + 'static {
    /// Encode a batch; blobs are independent of each other
    fn encode(&self, payloads: &[Payload]) -> Result<Vec<Payload>, CodecError>;
    /// Decode a batch; blobs are independent of each other
    fn decode(&self, payloads: &[Payload]) -> Result<Vec<Payload>, CodecError>;
}

/// What to do when the authentication tag does not verify
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuthFailurePolicy {
    /// Reject the payload
    #[default]
    Reject,
    /// Return the stored payload unchanged (legacy unencrypted data)
    PassThrough,
}

/// AES-256-GCM payload codec
pub struct EncryptionCodec {
    key_id: Box<str>,
    cipher: Aes256Gcm,
    on_auth_failure: AuthFailurePolicy,
}

impl EncryptionCodec {
    /// Create a codec for a 32-byte key
    pub fn new(key_id: &str, key: &[u8]) -> Result<Self, CodecError> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| {
            CodecError::InvalidKey(format!("expected 32 bytes, got {}", key.len()).into())
        })?;
        Ok(Self {
            key_id: key_id.into(),
            cipher,
            on_auth_failure: AuthFailurePolicy::Reject,
        })
    }

    /// Set the authentication failure policy
    pub fn with_auth_failure_policy(mut self, policy: AuthFailurePolicy) -> Self {
        self.on_auth_failure = policy;
        self
    }

    /// Configured key ID
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        // aes-gcm appends the tag to the ciphertext
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CodecError::Malformed("encryption failed".into()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&sealed);
        Ok(blob)
    }

    fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CodecError> {
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(CodecError::Malformed(
                format!("encrypted blob is {} bytes, need at least {}", blob.len(), NONCE_LEN + TAG_LEN).into(),
            ));
        }
        let (nonce, sealed) = blob.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CodecError::Authentication)
    }

    fn encode_one(&self, payload: &Payload) -> Result<Payload, CodecError> {
        let plaintext = serde_json::to_vec(payload)?;
        let mut metadata = BTreeMap::new();
        metadata.insert(METADATA_ENCODING.to_string(), ENCODING_ENCRYPTED.as_bytes().to_vec());
        metadata.insert(METADATA_KEY_ID.to_string(), self.key_id.as_bytes().to_vec());
        Ok(Payload {
            metadata,
            data: self.encrypt(&plaintext)?,
        })
    }

    fn decode_one(&self, payload: &Payload) -> Result<Payload, CodecError> {
        if !payload.is_encrypted() {
            return Ok(payload.clone());
        }

        let key_id = payload.metadata_str(METADATA_KEY_ID).unwrap_or_default();
        if key_id != self.key_id.as_ref() {
            return Err(CodecError::UnrecognizedKeyId {
                found: key_id.into(),
                expected: self.key_id.clone(),
            });
        }

        match self.decrypt(&payload.data) {
            Ok(plaintext) => Ok(serde_json::from_slice(&plaintext)?),
            Err(CodecError::Authentication) if self.on_auth_failure == AuthFailurePolicy::PassThrough => {
                tracing::warn!(key_id, "Decryption failed, returning stored payload unchanged");
                Ok(payload.clone())
            }
            Err(e) => {
                tracing::error!(key_id, error = %e, "Rejecting payload");
                Err(e)
            }
        }
    }
}

impl PayloadCodec for EncryptionCodec {
    fn encode(&self, payloads: &[Payload]) -> Result<Vec<Payload>, CodecError> {
        payloads.iter().map(|p| self.encode_one(p)).collect()
    }

    fn decode(&self, payloads: &[Payload]) -> Result<Vec<Payload>, CodecError> {
        payloads.iter().map(|p| self.decode_one(p)).collect()
    }
}

impl std::fmt::Debug for EncryptionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionCodec")
            .field("key_id", &self.key_id)
            .field("on_auth_failure", &self.on_auth_failure)
            .finish_non_exhaustive()
    }
}
