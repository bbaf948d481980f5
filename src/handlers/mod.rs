//! HTTP handlers for the registry protocol.
//!
//! Each handler takes the shared [`crate::AppState`] plus already-extracted
//! path parameters; routing and extraction live in [`crate::server`].

pub mod admin;
pub mod providers;
pub mod proxy;
