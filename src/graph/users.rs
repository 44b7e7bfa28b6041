//! Directory user lookups and the per-run display-name cache

use crate::error::{Exp365Error, Result};
use crate::graph::GraphClient;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Display name substituted for users that can no longer be resolved
pub const FORMER_MEMBER: &str = "Former Member";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
}

/// Source of display names for user identifiers
#[allow(async_fn_in_trait)]
pub trait IdentityLookup {
    /// `Ok(None)` means the directory does not know the identifier
    async fn lookup_display_name(&self, id: &str) -> Result<Option<String>>;
}

impl<T: IdentityLookup + ?Sized> IdentityLookup for &T {
    async fn lookup_display_name(&self, id: &str) -> Result<Option<String>> {
        (**self).lookup_display_name(id).await
    }
}

impl IdentityLookup for GraphClient {
    async fn lookup_display_name(&self, id: &str) -> Result<Option<String>> {
        let endpoint = format!("users/{}?$select=id,displayName", id);
        match self.get::<User>(&endpoint).await {
            Ok(user) => Ok(Some(user.display_name.unwrap_or(user.id))),
            Err(Exp365Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStatus {
    Resolved,
    NotFound,
    /// Lookup failed for another reason; treated like `NotFound`
    Error,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    display_name: String,
    status: ResolutionStatus,
}

/// Memoizing identifier -> display name resolver
///
/// Each identifier is queried at most once per run. Unknown identifiers and
/// failed lookups both resolve to [`FORMER_MEMBER`] and stay cached.
pub struct UserResolver<L> {
    lookup: L,
    cache: HashMap<String, CacheEntry>,
    lookups: usize,
}

impl<L: IdentityLookup> UserResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            cache: HashMap::new(),
            lookups: 0,
        }
    }

    pub async fn resolve(&mut self, id: &str) -> String {
        if let Some(entry) = self.cache.get(id) {
            return entry.display_name.clone();
        }

        self.lookups += 1;
        let entry = match self.lookup.lookup_display_name(id).await {
            Ok(Some(display_name)) => CacheEntry {
                display_name,
                status: ResolutionStatus::Resolved,
            },
            Ok(None) => {
                tracing::debug!(user_id = id, "User not found, using sentinel");
                CacheEntry {
                    display_name: FORMER_MEMBER.to_string(),
                    status: ResolutionStatus::NotFound,
                }
            }
            Err(e) => {
                tracing::warn!(user_id = id, "User lookup failed: {}", e);
                CacheEntry {
                    display_name: FORMER_MEMBER.to_string(),
                    status: ResolutionStatus::Error,
                }
            }
        };

        let display_name = entry.display_name.clone();
        self.cache.insert(id.to_string(), entry);
        display_name
    }

    /// Resolve several identifiers, keeping their order
    pub async fn resolve_many<I, S>(&mut self, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names = Vec::new();
        for id in ids {
            names.push(self.resolve(id.as_ref()).await);
        }
        names
    }

    pub fn status(&self, id: &str) -> Option<ResolutionStatus> {
        self.cache.get(id).map(|entry| entry.status)
    }

    /// Number of upstream queries issued so far
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FakeDirectory {
        calls: Cell<usize>,
    }

    impl IdentityLookup for FakeDirectory {
        async fn lookup_display_name(&self, id: &str) -> Result<Option<String>> {
            self.calls.set(self.calls.get() + 1);
            match id {
                "alice" => Ok(Some("Alice Smith".to_string())),
                "broken" => Err(Exp365Error::GraphApiError("HTTP 503".into())),
                _ => Ok(None),
            }
        }
    }

    fn directory() -> FakeDirectory {
        FakeDirectory {
            calls: Cell::new(0),
        }
    }

    #[tokio::test]
    async fn test_resolves_once_per_identifier() {
        let dir = directory();
        let mut resolver = UserResolver::new(&dir);

        assert_eq!(resolver.resolve("alice").await, "Alice Smith");
        assert_eq!(resolver.resolve("alice").await, "Alice Smith");
        assert_eq!(dir.calls.get(), 1);
        assert_eq!(resolver.lookups(), 1);
        assert_eq!(resolver.status("alice"), Some(ResolutionStatus::Resolved));
    }

    #[tokio::test]
    async fn test_not_found_is_cached_sentinel() {
        let dir = directory();
        let mut resolver = UserResolver::new(&dir);

        assert_eq!(resolver.resolve("deleted-user").await, FORMER_MEMBER);
        assert_eq!(resolver.resolve("deleted-user").await, FORMER_MEMBER);
        assert_eq!(dir.calls.get(), 1);
        assert_eq!(
            resolver.status("deleted-user"),
            Some(ResolutionStatus::NotFound)
        );
    }

    #[tokio::test]
    async fn test_lookup_error_falls_back_to_sentinel() {
        let dir = directory();
        let mut resolver = UserResolver::new(&dir);

        assert_eq!(resolver.resolve("broken").await, FORMER_MEMBER);
        assert_eq!(resolver.resolve("broken").await, FORMER_MEMBER);
        assert_eq!(dir.calls.get(), 1);
        assert_eq!(resolver.status("broken"), Some(ResolutionStatus::Error));
    }

    #[tokio::test]
    async fn test_resolve_many_keeps_order() {
        let dir = directory();
        let mut resolver = UserResolver::new(&dir);

        let names = resolver.resolve_many(["ghost", "alice", "alice"]).await;
        assert_eq!(names, vec![FORMER_MEMBER, "Alice Smith", "Alice Smith"]);
        assert_eq!(resolver.len(), 2);
        assert_eq!(dir.calls.get(), 2);
    }
}
