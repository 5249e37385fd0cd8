//! Remote API integration for mnemo
//!
//! This crate provides the two `DeckRemote` implementations:
//! - `client` - `HttpRemote`, the reqwest client for the deck API
//! - `fake` - `FakeRemote`, an in-memory stand-in with scriptable
//!   failures, used for offline mode and by the engine's tests
//! - `models` - wire request/response types

pub mod client;
pub mod fake;
pub mod models;

pub use client::{HttpRemote, RemoteConfig};
pub use fake::{FakeRemote, ScriptedFailure};
pub use models::{ConflictResponse, DeckResponse};
