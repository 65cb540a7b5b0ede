//! Vanish ephemeral content exchange.
//! This crate exposes the server modules for integration testing and the
//! client-side codec and exchange client for callers.
//! The server binary entry point is in main.rs.

pub mod client;
pub mod codec;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;
