//! Token generation, validation and lifecycle management.
//!
//! - [`jwt`] - symmetric JWT encoding and decoding
//! - [`service`] - issue, refresh and revoke on top of [`TokenStorage`](crate::storage::TokenStorage)

pub mod jwt;
pub mod service;

pub use jwt::{
    AccessTokenClaims, JwtError, JwtService, REFRESH_TOKEN_SUBJECT, RefreshTokenClaims,
    SigningAlgorithm,
};
pub use service::{IssuedTokens, TokenService};
