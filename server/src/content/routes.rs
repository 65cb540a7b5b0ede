//! REST endpoints for the content exchange.
//!
//! POST /api/content/accessCode — Reserve a fresh access code
//! POST /api/content — Store ciphertext under a code
//! GET /api/content/{access_code} — Fetch ciphertext and timestamps
//! PUT /api/content/{access_code} — Replace ciphertext in place
//!
//! The server only ever sees the access code as a lookup index and the
//! ciphertext as an opaque string.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::code::AccessCode;
use crate::content::store::Allocation;
use crate::error::ExchangeError;
use crate::state::AppState;

// --- Request/Response types ---

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCodeResponse {
    pub access_code: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContentRequest {
    #[serde(default)]
    pub access_code: Option<String>,
    /// Opaque ciphertext produced by the client codec
    #[serde(default)]
    pub encrypted_data: Option<String>,
    /// Unix milliseconds; defaults to the server clock
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentResponse {
    pub encrypted_data: String,
    /// Unix milliseconds
    pub created_at: i64,
    /// Unix milliseconds
    pub expires_at: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContentRequest {
    #[serde(default)]
    pub encrypted_data: Option<String>,
    /// Accepted for compatibility and ignored; creation time never changes
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateContentResponse {
    pub success: bool,
}

/// Pull the ciphertext out of a request body and enforce the payload ceiling.
fn require_payload(
    encrypted_data: Option<String>,
    max_payload_bytes: usize,
) -> Result<String, ExchangeError> {
    let data = encrypted_data
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ExchangeError::Validation("Missing encryptedData".to_string()))?;
    if data.len() > max_payload_bytes {
        return Err(ExchangeError::SizeLimitExceeded(format!(
            "Payload of {} bytes exceeds the {} byte limit",
            data.len(),
            max_payload_bytes
        )));
    }
    Ok(data)
}

// --- Handlers ---

/// POST /api/content/accessCode
///
/// Reserve a random code that no live record holds. The reservation expires
/// on its own if no content ever arrives.
pub async fn allocate_code(
    State(state): State<AppState>,
) -> Result<Json<AccessCodeResponse>, ExchangeError> {
    let store = state.store.clone();
    let allocation = tokio::task::spawn_blocking(move || store.reserve_code(Utc::now())).await??;

    match allocation {
        Allocation::Allocated(code) => {
            tracing::info!("Access code allocated");
            Ok(Json(AccessCodeResponse {
                access_code: code.into(),
            }))
        }
        Allocation::Exhausted => Err(ExchangeError::AllocationExhausted),
    }
}

/// POST /api/content
///
/// Store ciphertext under a code, filling its reservation if there is one.
/// Returns 409 if the code already holds live content.
pub async fn create_content(
    State(state): State<AppState>,
    Json(req): Json<CreateContentRequest>,
) -> Result<Json<AccessCodeResponse>, ExchangeError> {
    let raw_code = req
        .access_code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ExchangeError::Validation("Missing accessCode".to_string()))?;
    let code = AccessCode::parse(&raw_code)?;
    let encrypted_data = require_payload(req.encrypted_data, state.max_payload_bytes)?;
    let created_at = match req.created_at {
        Some(ms) => DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| ExchangeError::Validation("Invalid createdAt".to_string()))?,
        None => Utc::now(),
    };

    let store = state.store.clone();
    let code_for_store = code.clone();
    tokio::task::spawn_blocking(move || {
        store.create(&code_for_store, &encrypted_data, created_at, Utc::now())
    })
    .await??;

    tracing::info!("Content created");
    Ok(Json(AccessCodeResponse {
        access_code: code.into(),
    }))
}

/// GET /api/content/{access_code}
///
/// Malformed, unknown, reserved-but-empty and expired codes all get the same
/// 404 so the response reveals nothing beyond what the code itself implies.
pub async fn get_content(
    State(state): State<AppState>,
    Path(raw_code): Path<String>,
) -> Result<Json<ContentResponse>, ExchangeError> {
    let code = AccessCode::parse(&raw_code).map_err(|_| ExchangeError::NotFoundOrExpired)?;

    let store = state.store.clone();
    let record = tokio::task::spawn_blocking(move || store.get(&code, Utc::now()))
        .await??
        .ok_or(ExchangeError::NotFoundOrExpired)?;

    tracing::debug!("Serving content for {}", record.access_code);
    Ok(Json(ContentResponse {
        encrypted_data: record.encrypted_data,
        created_at: record.created_at.timestamp_millis(),
        expires_at: record.expires_at.timestamp_millis(),
    }))
}

/// PUT /api/content/{access_code}
///
/// Replace the ciphertext of live content. The creation time is kept, so
/// under the default policy the expiry point does not move.
pub async fn update_content(
    State(state): State<AppState>,
    Path(raw_code): Path<String>,
    Json(req): Json<UpdateContentRequest>,
) -> Result<Json<UpdateContentResponse>, ExchangeError> {
    let encrypted_data = require_payload(req.encrypted_data, state.max_payload_bytes)?;
    let code = AccessCode::parse(&raw_code).map_err(|_| ExchangeError::NotFoundOrExpired)?;

    let store = state.store.clone();
    tokio::task::spawn_blocking(move || store.update(&code, &encrypted_data, Utc::now()))
        .await??;

    tracing::info!("Content updated");
    Ok(Json(UpdateContentResponse { success: true }))
}

/// GET/PUT /api/content/accessCode
///
/// The allocation path shadows `{access_code}` for these methods. It is not a
/// code, so it gets the same 404 as any other non-existent one.
pub async fn not_a_code() -> ExchangeError {
    ExchangeError::NotFoundOrExpired
}
