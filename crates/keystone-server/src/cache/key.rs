//! Cache key derivation.
//!
//! A key is built from a namespace (a [`CacheTag`] value or a free-form
//! prefix), the handler's fully-qualified path and its declared parameter
//! names. Runtime argument values never enter the key: handlers whose output
//! depends on an argument must put a value-derived discriminator into their
//! prefix (for example `me:42`).

use std::fmt;

/// Namespaces for cached handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CacheTag {
    #[default]
    Default,
    UserList,
    CurrentUser,
}

impl CacheTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "cache",
            Self::UserList => "get_user_list",
            Self::CurrentUser => "current_user",
        }
    }
}

impl fmt::Display for CacheTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The namespace a cached call is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheScope {
    Tag(CacheTag),
    Prefix(String),
}

impl CacheScope {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Tag(tag) => tag.as_str(),
            Self::Prefix(prefix) => prefix,
        }
    }
}

impl Default for CacheScope {
    fn default() -> Self {
        Self::Tag(CacheTag::Default)
    }
}

impl From<CacheTag> for CacheScope {
    fn from(tag: CacheTag) -> Self {
        Self::Tag(tag)
    }
}

impl From<&str> for CacheScope {
    fn from(prefix: &str) -> Self {
        Self::Prefix(prefix.to_string())
    }
}

impl From<String> for CacheScope {
    fn from(prefix: String) -> Self {
        Self::Prefix(prefix)
    }
}

/// Static identity of a cached handler.
///
/// Build it with [`handler_signature!`](crate::handler_signature) so the path
/// is taken from the calling module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerSignature {
    pub path: &'static str,
    pub params: &'static [&'static str],
}

impl HandlerSignature {
    pub const fn new(path: &'static str, params: &'static [&'static str]) -> Self {
        Self { path, params }
    }
}

/// `handler_signature!(get_me, [principal])` expands to a signature whose
/// path is `<module_path>.get_me`.
#[macro_export]
macro_rules! handler_signature {
    ($name:ident) => {
        $crate::cache::HandlerSignature::new(
            concat!(module_path!(), ".", stringify!($name)),
            &[],
        )
    };
    ($name:ident, [$($param:ident),* $(,)?]) => {
        $crate::cache::HandlerSignature::new(
            concat!(module_path!(), ".", stringify!($name)),
            &[$(stringify!($param)),*],
        )
    };
}

/// Derives storage keys for cached handlers.
pub trait KeyMaker: Send + Sync {
    fn make(&self, signature: &HandlerSignature, scope: &CacheScope) -> String;
}

/// `<namespace>::<path>[.<param,param,...>]`
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureKeyMaker;

impl KeyMaker for SignatureKeyMaker {
    fn make(&self, signature: &HandlerSignature, scope: &CacheScope) -> String {
        let mut key = format!("{}::{}", scope.as_str(), signature.path);
        if !signature.params.is_empty() {
            key.push('.');
            key.push_str(&signature.params.join(","));
        }
        key
    }
}

/// The prefix every key under `namespace` starts with.
pub fn namespace_prefix(namespace: &str) -> String {
    format!("{namespace}::")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_users() -> HandlerSignature {
        crate::handler_signature!(list_users, [page, size])
    }

    #[test]
    fn test_signature_macro() {
        let sig = list_users();
        assert_eq!(sig.path, "keystone_server::cache::key::tests.list_users");
        assert_eq!(sig.params, &["page", "size"]);

        let bare = crate::handler_signature!(health);
        assert!(bare.params.is_empty());
    }

    #[test]
    fn test_key_format() {
        let maker = SignatureKeyMaker;
        let key = maker.make(&list_users(), &CacheTag::UserList.into());
        assert_eq!(
            key,
            "get_user_list::keystone_server::cache::key::tests.list_users.page,size"
        );

        let bare = crate::handler_signature!(health);
        let key = maker.make(&bare, &CacheScope::prefix("health"));
        assert_eq!(key, "health::keystone_server::cache::key::tests.health");
    }

    #[test]
    fn test_key_ignores_argument_values() {
        // Same signature and scope give the same key whatever the call site passes.
        let maker = SignatureKeyMaker;
        let a = maker.make(&list_users(), &CacheScope::default());
        let b = maker.make(&list_users(), &CacheScope::default());
        assert_eq!(a, b);
        assert!(a.starts_with(&namespace_prefix(CacheTag::Default.as_str())));
    }
}
