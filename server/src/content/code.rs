use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ExchangeError;

/// Symbols an access code is drawn from
pub const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Every access code is exactly this many symbols
pub const CODE_LEN: usize = 4;

/// Short human-typeable code: both the storage lookup key and the only input
/// to key derivation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessCode(String);

impl AccessCode {
    /// Draw a fresh random code. Uniqueness against live records is the
    /// store's job, see `ContentStore::reserve_code`.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let code = (0..CODE_LEN)
            .map(|_| {
                let idx = rng.random_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect();
        AccessCode(code)
    }

    /// Validate the shape of a user-supplied code.
    pub fn parse(raw: &str) -> Result<Self, ExchangeError> {
        let raw = raw.trim();
        if raw.len() != CODE_LEN || !raw.bytes().all(|b| CHARSET.contains(&b)) {
            return Err(ExchangeError::Validation(format!(
                "Access code must be {} letters or digits",
                CODE_LEN
            )));
        }
        Ok(AccessCode(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AccessCode {
    type Error = ExchangeError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        AccessCode::parse(&raw)
    }
}

impl From<AccessCode> for String {
    fn from(code: AccessCode) -> Self {
        code.0
    }
}
