//! Permission units and sets.
//!
//! A unit answers `has_permission` and knows which error to raise when it
//! denies. Units see the deferred authentication error stored on the
//! principal and re-raise it before making their own decision, so a caller
//! with an expired token gets `TokenExpired` rather than a generic denial.

use super::Authority;
use crate::AuthResult;
use crate::error::AuthError;
use crate::middleware::Principal;

/// A single permission unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Always grants, even to anonymous callers.
    AllowAll,
    /// Grants to any successfully authenticated principal.
    IsAuthenticated,
    /// Grants only to principals with exactly this authority.
    Is(Authority),
    /// Grants to principals with this authority or a stronger one.
    IsHigherOrEqual(Authority),
}

impl Permission {
    /// Evaluates the unit against `principal`.
    ///
    /// # Errors
    ///
    /// Every unit except `AllowAll` returns the principal's stored
    /// authentication error, if any, instead of a plain `false`.
    pub fn has_permission(&self, principal: &Principal) -> AuthResult<bool> {
        if matches!(self, Self::AllowAll) {
            return Ok(true);
        }
        if let Some(err) = &principal.auth_error {
            return Err(err.clone());
        }

        Ok(match self {
            Self::AllowAll => true,
            Self::IsAuthenticated => principal.is_authenticated(),
            Self::Is(required) => principal.authority == Some(*required),
            Self::IsHigherOrEqual(required) => principal
                .authority
                .is_some_and(|authority| authority.higher_or_equal(*required)),
        })
    }

    /// The error raised when this unit denies.
    #[must_use]
    pub fn denial(&self) -> AuthError {
        match self {
            Self::AllowAll | Self::IsAuthenticated => AuthError::AuthenticationMissing,
            Self::Is(required) => {
                AuthError::authorization_denied(format!("{required} authority required"))
            }
            Self::IsHigherOrEqual(required) => AuthError::authorization_denied(format!(
                "{required} or higher authority required"
            )),
        }
    }

    /// Evaluates the unit and converts a denial into its error.
    ///
    /// # Errors
    ///
    /// Returns the stored authentication error or [`denial`](Self::denial).
    pub fn check(&self, principal: &Principal) -> AuthResult<()> {
        if self.has_permission(principal)? {
            Ok(())
        } else {
            Err(self.denial())
        }
    }
}

/// A set of permission units that must all grant.
///
/// Evaluation stops at the first unit that denies or errors. The empty set
/// grants; endpoints that need authentication must say so explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    units: Vec<Permission>,
}

impl PermissionSet {
    /// Creates a set from units.
    #[must_use]
    pub fn new(units: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            units: units.into_iter().collect(),
        }
    }

    /// A set that grants to everyone.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::new([Permission::AllowAll])
    }

    /// A set that grants to any authenticated principal.
    #[must_use]
    pub fn authenticated() -> Self {
        Self::new([Permission::IsAuthenticated])
    }

    /// Adds a unit.
    #[must_use]
    pub fn and(mut self, unit: Permission) -> Self {
        self.units.push(unit);
        self
    }

    /// Returns the units in evaluation order.
    #[must_use]
    pub fn units(&self) -> &[Permission] {
        &self.units
    }

    /// Requires every unit to grant.
    ///
    /// # Errors
    ///
    /// Returns the first unit's stored authentication error or denial.
    pub fn check(&self, principal: &Principal) -> AuthResult<()> {
        self.units.iter().try_for_each(|unit| unit.check(principal))
    }
}

impl From<Permission> for PermissionSet {
    fn from(unit: Permission) -> Self {
        Self::new([unit])
    }
}
