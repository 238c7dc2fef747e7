//! External identity service integration.

pub mod client;

pub use client::{IdentityClient, TokenKind, TokenResponse, VerifyOutcome};
