//! Value encryption.
//!
//! ## Key Components
//!
//! - [`Cipher`]: string-to-string encryption used by the facade.
//! - [`RsaChunkCipher`]: RSA PKCS#1 v1.5 over fixed-size chunks.
//! - [`seal`] / [`open`]: wrap a JSON value into the `{"rjson": ...}`
//!   envelope stored by the backend, and unwrap it again.
//!
//! ## Ciphertext Format
//!
//! ```text
//!   plaintext bytes ──► [chunk 0][chunk 1]...[chunk n]     (modulus bytes - 11 each)
//!                          │        │           │
//!                       encrypt  encrypt     encrypt
//!                          ▼        ▼           ▼
//!                       base64 | base64 | ... | base64
//! ```
//!
//! A key generated with [`RsaChunkCipher::generate`] or loaded from PEM
//! (SPKI public, PKCS#8 private) can encrypt; decryption needs the private
//! half.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use serde_json::{json, Value};

use crate::error::{CipherError, StorageError};

/// Field name of the encrypted value envelope.
pub const ENVELOPE_FIELD: &str = "rjson";

const CHUNK_SEPARATOR: &str = "|";

// PKCS#1 v1.5 padding overhead in bytes.
const PKCS1_OVERHEAD: usize = 11;

/// Reversible string encryption.
pub trait Cipher: Send + Sync {
    fn encrypt_string(&self, plaintext: &str) -> Result<String, CipherError>;

    fn decrypt_string(&self, ciphertext: &str) -> Result<String, CipherError>;
}

/// RSA cipher that splits long plaintexts into modulus-sized chunks.
#[derive(Clone)]
pub struct RsaChunkCipher {
    public: RsaPublicKey,
    private: Option<RsaPrivateKey>,
}

impl RsaChunkCipher {
    /// Cipher that can both encrypt and decrypt.
    pub fn new(private: RsaPrivateKey) -> Self {
        Self {
            public: RsaPublicKey::from(&private),
            private: Some(private),
        }
    }

    /// Encrypt-only cipher.
    pub fn public_only(public: RsaPublicKey) -> Self {
        Self {
            public,
            private: None,
        }
    }

    /// Generates a fresh key pair of `bits` modulus length.
    pub fn generate(bits: usize) -> Result<Self, CipherError> {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|err| CipherError::InvalidKey(err.to_string()))?;
        Ok(Self::new(private))
    }

    /// Loads an SPKI public key and, optionally, a PKCS#8 private key.
    pub fn from_pem(public_pem: &str, private_pem: Option<&str>) -> Result<Self, CipherError> {
        let public = RsaPublicKey::from_public_key_pem(public_pem)
            .map_err(|err| CipherError::InvalidKey(err.to_string()))?;
        let private = private_pem
            .map(RsaPrivateKey::from_pkcs8_pem)
            .transpose()
            .map_err(|err| CipherError::InvalidKey(err.to_string()))?;

        if let Some(private) = &private {
            if RsaPublicKey::from(private) != public {
                return Err(CipherError::InvalidKey(
                    "private key does not match public key".into(),
                ));
            }
        }
        Ok(Self { public, private })
    }

    pub fn public_key_pem(&self) -> Result<String, CipherError> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|err| CipherError::InvalidKey(err.to_string()))
    }

    pub fn private_key_pem(&self) -> Result<String, CipherError> {
        let private = self.private.as_ref().ok_or(CipherError::MissingPrivateKey)?;
        let pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|err| CipherError::InvalidKey(err.to_string()))?;
        Ok(pem.as_str().to_owned())
    }

    pub fn can_decrypt(&self) -> bool {
        self.private.is_some()
    }

    /// Modulus length in bits.
    pub fn key_bits(&self) -> usize {
        self.public.size() * 8
    }

    /// Largest plaintext slice encrypted as one RSA block.
    pub fn chunk_size(&self) -> usize {
        self.public.size().saturating_sub(PKCS1_OVERHEAD).max(1)
    }
}

impl Cipher for RsaChunkCipher {
    fn encrypt_string(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut rng = rand::thread_rng();
        let chunks = plaintext
            .as_bytes()
            .chunks(self.chunk_size())
            .map(|chunk| {
                self.public
                    .encrypt(&mut rng, Pkcs1v15Encrypt, chunk)
                    .map(|block| STANDARD.encode(block))
                    .map_err(|err| CipherError::Encrypt(err.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(chunks.join(CHUNK_SEPARATOR))
    }

    fn decrypt_string(&self, ciphertext: &str) -> Result<String, CipherError> {
        let private = self.private.as_ref().ok_or(CipherError::MissingPrivateKey)?;
        if ciphertext.is_empty() {
            return Ok(String::new());
        }

        let mut plaintext = Vec::with_capacity(ciphertext.len());
        for chunk in ciphertext.split(CHUNK_SEPARATOR) {
            let block = STANDARD
                .decode(chunk)
                .map_err(|err| CipherError::Decrypt(err.to_string()))?;
            let bytes = private
                .decrypt(Pkcs1v15Encrypt, &block)
                .map_err(|err| CipherError::Decrypt(err.to_string()))?;
            plaintext.extend_from_slice(&bytes);
        }
        String::from_utf8(plaintext).map_err(|err| CipherError::Decrypt(err.to_string()))
    }
}

impl fmt::Debug for RsaChunkCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaChunkCipher")
            .field("key_bits", &self.key_bits())
            .field("can_decrypt", &self.can_decrypt())
            .finish()
    }
}

/// Wraps `value` into `{"rjson": "<ciphertext>"}`.
pub fn seal(cipher: &dyn Cipher, value: &Value) -> Result<Value, CipherError> {
    let ciphertext = cipher.encrypt_string(&value.to_string())?;
    Ok(json!({ ENVELOPE_FIELD: ciphertext }))
}

/// Returns `true` for a single-field object holding a ciphertext string.
pub fn is_sealed(value: &Value) -> bool {
    match value.as_object() {
        Some(map) => map.len() == 1 && map.get(ENVELOPE_FIELD).is_some_and(Value::is_string),
        None => false,
    }
}

/// Unwraps a sealed envelope. Other values are returned unchanged.
pub fn open(cipher: &dyn Cipher, value: Value) -> Result<Value, StorageError> {
    if !is_sealed(&value) {
        return Ok(value);
    }
    let ciphertext = value[ENVELOPE_FIELD].as_str().unwrap_or_default();
    let plaintext = cipher.decrypt_string(ciphertext)?;
    Ok(serde_json::from_str(&plaintext)?)
}
