//! Storage traits for authentication data.
//!
//! - [`TokenStorage`] - persisted refresh credentials
//! - [`UserStorage`] - read access to the user directory
//!
//! # Implementations
//!
//! - [`memory`] - in-process storage for tests and single-node development
//! - `keystone-auth-postgres` - PostgreSQL storage backend

pub mod memory;
pub mod token;
pub mod user;

pub use memory::{MemoryTokenStorage, MemoryUserStorage};
pub use token::TokenStorage;
pub use user::UserStorage;
