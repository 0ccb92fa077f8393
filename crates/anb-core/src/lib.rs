//! Core domain + application logic for the Available Now bot.
//!
//! This crate is intentionally framework-agnostic. The Telegram transport lives
//! behind a port (trait) implemented in the adapter crate; everything here can
//! be driven and tested with a fake messenger.

pub mod config;
pub mod dialogue;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod listings;
pub mod logging;
pub mod messaging;
pub mod profile;
pub mod render;
pub mod security;
pub mod service;
pub mod snapshot;
pub mod store;

pub use errors::{Error, Result};

#[cfg(test)]
pub(crate) mod test_support;
