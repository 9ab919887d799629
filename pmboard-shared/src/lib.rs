//! # PMBoard Shared Library
//!
//! Domain types, persistence and authentication used by the PMBoard API.
//!
//! ## Module Organization
//!
//! - `models`: database models and their operations
//! - `auth`: JWT, passwords, ephemeral tokens and the project authorization guard
//! - `db`: connection pool and migrations
//! - `mail`: outgoing email for ephemeral tokens
//! - `error`: domain error type shared by the models

pub mod auth;
pub mod db;
pub mod error;
pub mod mail;
pub mod models;

/// Current version of the PMBoard shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
