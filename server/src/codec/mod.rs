//! Client-side content codec.
//!
//! A document body is serialized to canonical JSON, sealed under a key derived
//! from the access code, and shipped as opaque base64 text. The server stores
//! that text verbatim and never holds the key. `created_at` is not part of the
//! sealed payload; it travels beside it as plain metadata.

pub mod crypto;
pub mod document;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use document::{Document, DocumentBody};

use crate::error::ExchangeError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Encryption failed")]
    Encrypt,
    /// Not base64, or shorter than nonce + tag
    #[error("Ciphertext is malformed or truncated")]
    Malformed,
    /// Authentication failed: wrong access code or tampered ciphertext
    #[error("Ciphertext does not match the access code")]
    WrongKey,
    /// Decrypted bytes do not match the document schema
    #[error("Decrypted payload has an unexpected shape")]
    InvalidPayload,
}

impl From<CodecError> for ExchangeError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Encrypt => ExchangeError::Internal(err.to_string()),
            CodecError::Malformed | CodecError::WrongKey | CodecError::InvalidPayload => {
                ExchangeError::Decryption
            }
        }
    }
}

/// Output of [`encrypt`]: the opaque ciphertext plus unencrypted metadata.
#[derive(Debug, Clone)]
pub struct SealedDocument {
    pub encrypted_data: String,
    pub created_at: DateTime<Utc>,
}

/// Seal a document under `access_code`.
///
/// Every call draws a fresh nonce, so sealing the same document twice yields
/// two different ciphertexts. Size limits are the caller's job
/// (see [`Document::validate`]); nothing is truncated here.
pub fn encrypt(document: Document, access_code: &str) -> Result<SealedDocument, CodecError> {
    let Document { body, created_at } = document;
    let plaintext = serde_json::to_vec(&body).map_err(|_| CodecError::Encrypt)?;
    let encrypted_data = crypto::seal(access_code, &plaintext)?;
    Ok(SealedDocument {
        encrypted_data,
        created_at,
    })
}

/// Open ciphertext produced by [`encrypt`]. Fails closed: either the full body
/// comes back or an error does.
pub fn decrypt(encrypted_data: &str, access_code: &str) -> Result<DocumentBody, CodecError> {
    let plaintext = crypto::open(access_code, encrypted_data)?;
    serde_json::from_slice(&plaintext).map_err(|_| CodecError::InvalidPayload)
}
