//! # Authentication Module
//!
//! Resolution of survey platform tokens for local users.
//!
//! ## Overview
//!
//! The sync core never holds a token longer than one call chain. Whenever it
//! needs to talk to the platform on behalf of a user it asks a
//! [`CredentialResolver`] for that user's token. [`TokenStore`] is the
//! resolver backed by the host's `SecureStore`.

pub mod error;
pub mod token_store;
pub mod types;

pub use error::{AuthError, Result};
pub use token_store::{CredentialResolver, TokenStore};
pub use types::UserId;
