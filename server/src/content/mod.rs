//! Ephemeral ciphertext exchange for the server side.
//!
//! Each access code maps to at most one live record. Records live for a fixed
//! window (24 hours by default) counted from creation, after which reads treat
//! them as absent and the retention task deletes them.
//!
//! Storage layout: one row per code in the SQLite `contents` table; see
//! `db::migrations`.

pub mod code;
pub mod retention;
pub mod routes;
pub mod store;
