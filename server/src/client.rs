//! Client side of the exchange.
//!
//! Encryption and decryption happen here, never on the server. A create
//! reserves a code, seals the document under it and submits the ciphertext,
//! re-allocating if another writer won the code first. Fetch and update
//! re-derive the key from the code on every call.

use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};

use crate::codec::{self, Document, DocumentBody, SealedDocument};
use crate::content::code::AccessCode;
use crate::content::routes::{
    AccessCodeResponse, ContentResponse, CreateContentRequest, UpdateContentRequest,
    UpdateContentResponse,
};
use crate::error::{ErrorBody, ExchangeError};

/// Create rounds (allocate, seal, submit) before giving up on collisions
const DEFAULT_CREATE_ATTEMPTS: u32 = 3;

/// A decrypted document together with its server-side timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub access_code: AccessCode,
    pub body: DocumentBody,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl FetchedDocument {
    /// Whole hours until the content vanishes, rounded up, never negative.
    pub fn remaining_hours(&self, now: DateTime<Utc>) -> i64 {
        let remaining_ms = (self.expires_at - now).num_milliseconds();
        if remaining_ms <= 0 {
            return 0;
        }
        (remaining_ms + 3_599_999) / 3_600_000
    }

    /// Turn the fetch result back into an editable document.
    pub fn into_document(self) -> Document {
        Document {
            body: self.body,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExchangeClient {
    http: reqwest::Client,
    base_url: String,
    create_attempts: u32,
}

impl ExchangeClient {
    /// `base_url` is the server root, e.g. `http://localhost:3000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http_client(base_url, reqwest::Client::new())
    }

    pub fn with_http_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            create_attempts: DEFAULT_CREATE_ATTEMPTS,
        }
    }

    pub fn create_attempts(mut self, attempts: u32) -> Self {
        self.create_attempts = attempts.max(1);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/content{}", self.base_url, path)
    }

    /// Ask the server for a fresh, reserved access code.
    pub async fn allocate(&self) -> Result<AccessCode, ExchangeError> {
        let resp = self.http.post(self.url("/accessCode")).send().await?;
        let body: AccessCodeResponse = read_json(resp).await?;
        AccessCode::parse(&body.access_code)
            .map_err(|_| ExchangeError::Transport("Server returned a malformed access code".to_string()))
    }

    /// Store a new document and return the code that unlocks it.
    ///
    /// Size limits are checked before any request is sent.
    pub async fn create(&self, document: Document) -> Result<AccessCode, ExchangeError> {
        document.validate()?;

        for attempt in 1..=self.create_attempts {
            let code = self.allocate().await?;
            let sealed = codec::encrypt(document.clone(), code.as_str())?;
            match self.submit(&code, sealed).await {
                Ok(()) => return Ok(code),
                Err(ExchangeError::DuplicateCode) => {
                    tracing::debug!("Allocated code was taken (attempt {}), retrying", attempt);
                }
                Err(e) => return Err(e),
            }
        }
        Err(ExchangeError::AllocationExhausted)
    }

    async fn submit(&self, code: &AccessCode, sealed: SealedDocument) -> Result<(), ExchangeError> {
        let request = CreateContentRequest {
            access_code: Some(code.to_string()),
            encrypted_data: Some(sealed.encrypted_data),
            created_at: Some(sealed.created_at.timestamp_millis()),
        };
        let resp = self.http.post(self.url("")).json(&request).send().await?;
        let _: AccessCodeResponse = read_json(resp).await?;
        Ok(())
    }

    /// Fetch and decrypt the document behind `code`.
    ///
    /// A code of the wrong shape cannot name any record, so it is reported
    /// as `NotFoundOrExpired` without a request. A ciphertext that does not
    /// open under the code yields `Decryption`, never partial content.
    pub async fn fetch(&self, code: &str) -> Result<FetchedDocument, ExchangeError> {
        let code = AccessCode::parse(code).map_err(|_| ExchangeError::NotFoundOrExpired)?;
        let resp = self
            .http
            .get(self.url(&format!("/{}", code)))
            .send()
            .await?;
        let stored: ContentResponse = read_json(resp).await?;

        let body = codec::decrypt(&stored.encrypted_data, code.as_str())?;
        Ok(FetchedDocument {
            access_code: code,
            body,
            created_at: from_millis(stored.created_at)?,
            expires_at: from_millis(stored.expires_at)?,
        })
    }

    /// Re-encrypt the full document and replace the stored ciphertext.
    /// The code and the creation time stay the same.
    pub async fn update(&self, code: &AccessCode, document: Document) -> Result<(), ExchangeError> {
        document.validate()?;
        let sealed = codec::encrypt(document, code.as_str())?;
        let request = UpdateContentRequest {
            encrypted_data: Some(sealed.encrypted_data),
            created_at: Some(sealed.created_at.timestamp_millis()),
        };
        let resp = self
            .http
            .put(self.url(&format!("/{}", code)))
            .json(&request)
            .send()
            .await?;
        let _: UpdateContentResponse = read_json(resp).await?;
        Ok(())
    }
}

/// Decode a success body, or turn an error response back into an
/// `ExchangeError`.
async fn read_json<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, ExchangeError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json::<T>().await?);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ExchangeError::Transport(
            "Too many requests, slow down".to_string(),
        ));
    }
    let message = match resp.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("Unexpected response")
            .to_string(),
    };
    Err(ExchangeError::from_response(status, message))
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, ExchangeError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| ExchangeError::Transport(format!("Invalid timestamp {} from server", ms)))
}
