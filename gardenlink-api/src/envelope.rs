use std::fmt;
use std::sync::Arc;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Initialization vector length in bytes
pub const IV_LEN: usize = 16;

type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes192CbcDec = cbc::Decryptor<Aes192>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes192CbcEnc = cbc::Encryptor<Aes192>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;

#[derive(Debug, thiserror::Error)]
pub enum DecryptError {
    #[error("Field `{0}` is not a hex string")]
    InvalidHex(&'static str),

    #[error("IV must be {IV_LEN} bytes, got {0}")]
    InvalidIvLength(usize),

    #[error("Secret must be 16, 24 or 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Ciphertext could not be decrypted with the configured secret")]
    Cipher,

    #[error("Decrypted payload is not valid UTF-8")]
    Utf8,

    #[error("Decrypted payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Wire wrapper for AES-CBC encrypted push and REST payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Hex encoded 16 byte IV
    pub iv: String,
    /// Hex encoded ciphertext
    pub content: String,
}

impl EncryptedEnvelope {
    /// Returns the envelope when `value` has the `{iv, content}` shape.
    pub fn detect(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let iv = object.get("iv")?.as_str()?;
        let content = object.get("content")?.as_str()?;

        Some(Self {
            iv: iv.to_owned(),
            content: content.to_owned(),
        })
    }
}

/// Symmetric key shared with the backend. The UTF-8 bytes of the secret are
/// used as the AES key as-is, so its length picks AES-128/192/256.
#[derive(Clone)]
pub struct SharedSecret(Arc<str>);

impl SharedSecret {
    pub fn new<S: Into<String>>(secret: S) -> Result<Self, DecryptError> {
        let secret: String = secret.into();
        match secret.len() {
            16 | 24 | 32 => Ok(Self(Arc::from(secret))),
            other => Err(DecryptError::InvalidKeyLength(other)),
        }
    }

    fn key(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret(<{} bytes>)", self.0.len())
    }
}

/// Decrypts an envelope into a JSON document.
///
/// An empty plaintext is "no data" and yields an empty object.
pub fn decrypt(envelope: &EncryptedEnvelope, secret: &SharedSecret) -> Result<Value, DecryptError> {
    let iv = decode_hex("iv", &envelope.iv)?;
    if iv.len() != IV_LEN {
        return Err(DecryptError::InvalidIvLength(iv.len()));
    }
    let content = decode_hex("content", &envelope.content)?;

    let key = secret.key();
    let plain = match key.len() {
        16 => open::<Aes128CbcDec>(key, &iv, &content)?,
        24 => open::<Aes192CbcDec>(key, &iv, &content)?,
        32 => open::<Aes256CbcDec>(key, &iv, &content)?,
        other => return Err(DecryptError::InvalidKeyLength(other)),
    };

    let text = String::from_utf8(plain).map_err(|_| DecryptError::Utf8)?;
    if text.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    Ok(serde_json::from_str(&text)?)
}

/// Encrypts `plaintext` with an explicit IV.
pub fn encrypt(
    plaintext: &str,
    secret: &SharedSecret,
    iv: [u8; IV_LEN],
) -> Result<EncryptedEnvelope, DecryptError> {
    let key = secret.key();
    let content = match key.len() {
        16 => close::<Aes128CbcEnc>(key, &iv, plaintext.as_bytes())?,
        24 => close::<Aes192CbcEnc>(key, &iv, plaintext.as_bytes())?,
        32 => close::<Aes256CbcEnc>(key, &iv, plaintext.as_bytes())?,
        other => return Err(DecryptError::InvalidKeyLength(other)),
    };

    Ok(EncryptedEnvelope {
        iv: hex::encode(iv),
        content: hex::encode(content),
    })
}

/// Serializes `value` and encrypts it under a fresh random IV.
pub fn seal<T: Serialize>(value: &T, secret: &SharedSecret) -> Result<EncryptedEnvelope, DecryptError> {
    let plaintext = serde_json::to_string(value)?;
    encrypt(&plaintext, secret, rand::random())
}

fn decode_hex(field: &'static str, value: &str) -> Result<Vec<u8>, DecryptError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DecryptError::InvalidHex(field));
    }

    hex::decode(value).map_err(|_| DecryptError::InvalidHex(field))
}

fn open<D>(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, DecryptError>
where
    D: KeyIvInit + BlockDecryptMut,
{
    D::new_from_slices(key, iv)
        .map_err(|_| DecryptError::InvalidKeyLength(key.len()))?
        .decrypt_padded_vec_mut::<Pkcs7>(data)
        .map_err(|_| DecryptError::Cipher)
}

fn close<E>(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, DecryptError>
where
    E: KeyIvInit + BlockEncryptMut,
{
    Ok(E::new_from_slices(key, iv)
        .map_err(|_| DecryptError::InvalidKeyLength(key.len()))?
        .encrypt_padded_vec_mut::<Pkcs7>(data))
}
