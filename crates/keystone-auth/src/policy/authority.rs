//! Ranked user authorities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A ranked role. A lower rank means more privilege.
///
/// Serialized in upper case (`"ADMIN"`), the form used in token claims and
/// the `users.authority` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Authority {
    /// Rank 0.
    Master,
    /// Rank 1.
    Admin,
    /// Rank 2.
    User,
    /// Rank 3.
    Guest,
}

impl Authority {
    /// All authorities, strongest first.
    pub const ALL: [Authority; 4] = [Self::Master, Self::Admin, Self::User, Self::Guest];

    /// Numeric rank; lower is stronger.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Master => 0,
            Self::Admin => 1,
            Self::User => 2,
            Self::Guest => 3,
        }
    }

    /// Returns `true` if `self` is at least as privileged as `other`.
    #[must_use]
    pub fn higher_or_equal(self, other: Authority) -> bool {
        self.rank() <= other.rank()
    }

    /// Upper-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Master => "MASTER",
            Self::Admin => "ADMIN",
            Self::User => "USER",
            Self::Guest => "GUEST",
        }
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown authority name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown authority: {0}")]
pub struct UnknownAuthority(pub String);

impl FromStr for Authority {
    type Err = UnknownAuthority;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownAuthority(s.to_string()))
    }
}
