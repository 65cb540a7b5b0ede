use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ExchangeError;

/// Maximum number of images attached to one document
pub const MAX_IMAGES: usize = 10;

/// Maximum length of one image data URI (3 MiB of binary after base64)
pub const MAX_IMAGE_DATA_URI_LEN: usize = 4 * 1024 * 1024;

/// Maximum visible characters of rich text (markup tags not counted)
pub const MAX_TEXT_CHARS: usize = 10_000;

/// Maximum serialized body size; sealed and base64-encoded it stays under the
/// server's default 10 MiB payload ceiling.
pub const MAX_PAYLOAD_BYTES: usize = 7 * 1024 * 1024;

/// Encrypted part of a document. Decrypted payloads must match this shape
/// exactly; unknown or missing fields are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentBody {
    /// Rich-text markup
    pub text: String,
    /// Images as data URIs, in display order
    pub images: Vec<String>,
}

/// Client-side working document. Never persisted in plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub body: DocumentBody,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(text: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            body: DocumentBody {
                text: text.into(),
                images,
            },
            created_at: Utc::now(),
        }
    }

    /// Check every size ceiling before the document is encrypted.
    pub fn validate(&self) -> Result<(), ExchangeError> {
        let body = &self.body;
        if body.images.len() > MAX_IMAGES {
            return Err(ExchangeError::SizeLimitExceeded(format!(
                "At most {} images can be attached",
                MAX_IMAGES
            )));
        }
        if let Some(pos) = body
            .images
            .iter()
            .position(|img| img.len() > MAX_IMAGE_DATA_URI_LEN)
        {
            return Err(ExchangeError::SizeLimitExceeded(format!(
                "Image {} exceeds the 3 MB limit",
                pos + 1
            )));
        }
        let chars = visible_char_count(&body.text);
        if chars > MAX_TEXT_CHARS {
            return Err(ExchangeError::SizeLimitExceeded(format!(
                "Text has {} characters, the limit is {}",
                chars, MAX_TEXT_CHARS
            )));
        }
        let payload_len = serde_json::to_vec(body)
            .map_err(|e| ExchangeError::Internal(format!("Serialize document: {}", e)))?
            .len();
        if payload_len > MAX_PAYLOAD_BYTES {
            return Err(ExchangeError::SizeLimitExceeded(format!(
                "Document is {} bytes, the limit is {} bytes",
                payload_len, MAX_PAYLOAD_BYTES
            )));
        }
        Ok(())
    }
}

/// Count characters of rich-text markup that sit outside `<...>` tags.
pub fn visible_char_count(markup: &str) -> usize {
    let mut in_tag = false;
    let mut count = 0;
    for c in markup.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => count += 1,
            _ => {}
        }
    }
    count
}
