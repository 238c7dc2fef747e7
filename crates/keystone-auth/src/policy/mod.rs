//! Coarse-grained authorization.
//!
//! [`Authority`] ranks users; [`Permission`] units evaluate a
//! [`Principal`](crate::middleware::Principal) and a [`PermissionSet`]
//! requires all of its units to grant.

pub mod authority;
pub mod permission;

pub use authority::Authority;
pub use permission::{Permission, PermissionSet};
