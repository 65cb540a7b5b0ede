//! Access-code key derivation and AES-256-GCM sealing.
//!
//! Key derivation: SHA-256(KEY_PREFIX || access_code) -> 256-bit AES key
//! Encryption: AES-256-GCM with random 12-byte nonce
//! Wire format: base64(nonce (12 bytes) || ciphertext (includes GCM tag))

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

use super::CodecError;

/// Fixed prefix mixed into every key derivation (domain separation)
const KEY_PREFIX: &str = "vanish-access-code-key-v1:";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Derive the AES-256-GCM key for an access code.
///
/// Anyone who knows the code can derive this key, which is the intended
/// security model: the code is the only secret, and the server only ever sees
/// it as a lookup index. Recomputed on every call, never cached.
pub fn derive_key(access_code: &str) -> Key<Aes256Gcm> {
    let mut hasher = Sha256::new();
    hasher.update(KEY_PREFIX.as_bytes());
    hasher.update(access_code.as_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    Key::<Aes256Gcm>::from(digest)
}

/// Encrypt `plaintext` under the key derived from `access_code`.
///
/// Returns the base64 text of `nonce || ciphertext`.
pub fn seal(access_code: &str, plaintext: &[u8]) -> Result<String, CodecError> {
    let key = derive_key(access_code);
    let cipher = Aes256Gcm::new(&key);
    let nonce_bytes: [u8; NONCE_LEN] = rand::rng().random();
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CodecError::Encrypt)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(sealed))
}

/// Reverse [`seal`]. Any tampering, truncation, or wrong code fails closed.
pub fn open(access_code: &str, encrypted_data: &str) -> Result<Vec<u8>, CodecError> {
    let sealed = STANDARD
        .decode(encrypted_data.trim())
        .map_err(|_| CodecError::Malformed)?;
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(CodecError::Malformed);
    }
    let key = derive_key(access_code);
    let cipher = Aes256Gcm::new(&key);
    let nonce = Nonce::from_slice(&sealed[..NONCE_LEN]);
    cipher
        .decrypt(nonce, &sealed[NONCE_LEN..])
        .map_err(|_| CodecError::WrongKey)
}
