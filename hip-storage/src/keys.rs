//! Tenant-scoped keys for the cache and the admission counters.
//!
//! Both key types wrap a private inner struct, so a key can only be built
//! through `new()`, which demands a [`ProviderId`]. A key that reads another
//! tenant's entry cannot be constructed.

use hip_core::ProviderId;

// ============================================================================
// CACHE KEYS
// ============================================================================

/// Entity family a cache entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    /// Joined profile/preference view.
    Preferences,
    /// Denormalized provider profile.
    ProviderDetails,
}

impl CacheNamespace {
    fn prefix(&self) -> &'static str {
        match self {
            CacheNamespace::Preferences => "hip:pref:",
            CacheNamespace::ProviderDetails => "hip:details:",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheNamespace::Preferences => "preferences",
            CacheNamespace::ProviderDetails => "details",
        }
    }
}

/// A cache key scoped to one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    inner: CacheKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKeyInner {
    namespace: CacheNamespace,
    tenant: ProviderId,
}

impl CacheKey {
    pub fn new(namespace: CacheNamespace, tenant: &ProviderId) -> Self {
        Self {
            inner: CacheKeyInner {
                namespace,
                tenant: tenant.clone(),
            },
        }
    }

    pub fn preferences(tenant: &ProviderId) -> Self {
        Self::new(CacheNamespace::Preferences, tenant)
    }

    pub fn provider_details(tenant: &ProviderId) -> Self {
        Self::new(CacheNamespace::ProviderDetails, tenant)
    }

    pub fn namespace(&self) -> CacheNamespace {
        self.inner.namespace
    }

    pub fn tenant(&self) -> &ProviderId {
        &self.inner.tenant
    }

    /// Wire form, e.g. `hip:pref:HCID123`.
    pub fn encode(&self) -> String {
        format!("{}{}", self.inner.namespace.prefix(), self.inner.tenant)
    }
}

// ============================================================================
// COUNTER KEYS
// ============================================================================

/// Which admission stage a counter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKind {
    FixedWindow,
    Burst,
}

impl CounterKind {
    fn prefix(&self) -> &'static str {
        match self {
            CounterKind::FixedWindow => "hip:rate_limit:",
            CounterKind::Burst => "hip:burst:",
        }
    }
}

/// A counter key scoped to one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    inner: CounterKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CounterKeyInner {
    kind: CounterKind,
    tenant: ProviderId,
}

impl CounterKey {
    pub fn new(kind: CounterKind, tenant: &ProviderId) -> Self {
        Self {
            inner: CounterKeyInner {
                kind,
                tenant: tenant.clone(),
            },
        }
    }

    pub fn kind(&self) -> CounterKind {
        self.inner.kind
    }

    pub fn tenant(&self) -> &ProviderId {
        &self.inner.tenant
    }

    pub fn encode(&self) -> String {
        format!("{}{}", self.inner.kind.prefix(), self.inner.tenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(id: &str) -> ProviderId {
        ProviderId::new(id).expect("valid provider id")
    }

    #[test]
    fn test_cache_key_wire_format() {
        let t = tenant("HCID123");
        assert_eq!(CacheKey::preferences(&t).encode(), "hip:pref:HCID123");
        assert_eq!(CacheKey::provider_details(&t).encode(), "hip:details:HCID123");
    }

    #[test]
    fn test_keys_differ_across_tenants() {
        let a = CacheKey::preferences(&tenant("HCID1"));
        let b = CacheKey::preferences(&tenant("HCID2"));
        assert_ne!(a, b);
        assert_ne!(a.encode(), b.encode());
    }

    #[test]
    fn test_counter_key_wire_format() {
        let t = tenant("HCID123");
        assert_eq!(
            CounterKey::new(CounterKind::FixedWindow, &t).encode(),
            "hip:rate_limit:HCID123"
        );
        assert_eq!(CounterKey::new(CounterKind::Burst, &t).encode(), "hip:burst:HCID123");
    }
}
