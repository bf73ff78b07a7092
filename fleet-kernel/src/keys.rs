//! SSH key material for passwordless access.
//!
//! Generation is pure local computation: no I/O, no shared state, safe to run
//! from many provisioning tasks at once.

use russh_keys::key::KeyPair;
use russh_keys::PublicKeyBase64;
use std::fmt;

/// A freshly generated key pair.
#[derive(Clone)]
pub struct KeyMaterial {
    /// PEM encoded private key, stored on the host row as `pkey`.
    pub private_key: String,
    /// `authorized_keys` line: `<algo> <base64> <comment>`.
    pub public_key: String,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("key generation failed: {0}")]
pub struct KeyError(pub String);

pub trait KeyMaterialGenerator: Send + Sync {
    fn generate(&self) -> Result<KeyMaterial, KeyError>;
}

/// Ed25519 keys, private half encoded as PKCS#8 PEM.
#[derive(Debug, Clone)]
pub struct Ed25519Generator {
    comment: String,
}

impl Ed25519Generator {
    pub fn new(comment: impl Into<String>) -> Self {
        Self { comment: comment.into() }
    }
}

impl Default for Ed25519Generator {
    fn default() -> Self {
        Self::new("fleet-kernel")
    }
}

impl KeyMaterialGenerator for Ed25519Generator {
    fn generate(&self) -> Result<KeyMaterial, KeyError> {
        let signing_key = ed25519_dalek::SigningKey::generate(&mut rand_core::OsRng);
        let pair = KeyPair::Ed25519(signing_key);

        let mut pem = Vec::new();
        russh_keys::encode_pkcs8_pem(&pair, &mut pem).map_err(|e| KeyError(e.to_string()))?;
        let private_key = String::from_utf8(pem).map_err(|e| KeyError(e.to_string()))?;

        let public_key = if self.comment.is_empty() {
            format!("{} {}", pair.name(), pair.public_key_base64())
        } else {
            format!("{} {} {}", pair.name(), pair.public_key_base64(), self.comment)
        };

        Ok(KeyMaterial { private_key, public_key })
    }
}
