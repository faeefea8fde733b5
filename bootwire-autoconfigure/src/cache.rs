//! Auto-configuration for a cache manager, bound from the `cache.*` namespace.
//!
//! The store is chosen with the `cache.type` property, or by [STORE_SELECTION_ORDER] when unset;
//! the in-memory `simple` store is always available as the last resort. Setting `cache.type` to
//! `none` disables caching entirely.

use crate::library;
use bootwire::autoconfigure::conditions::{
    on_missing_service, on_property_not, Condition, Libraries,
};
use bootwire::autoconfigure::{AutoConfiguration, AutoConfigurationError, ConfigureContext};
use bootwire::environment::binding::{lenient_opt, Duration};
use serde::Deserialize;
use std::fmt::{self, Display, Formatter};
use tracing::debug;

/// Configuration namespace for cache properties.
pub const PROPERTIES_PREFIX: &str = "cache";

/// Candidate cache stores in selection order, tried before falling back to [CacheStore::Simple].
pub const STORE_SELECTION_ORDER: &[CacheStore] = &[CacheStore::Redis, CacheStore::Moka];

/// Cache store kinds selectable with `cache.type`.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheStore {
    /// Disables cache auto-configuration.
    None,
    /// In-memory map without eviction, always available.
    Simple,
    Redis,
    Moka,
}

impl CacheStore {
    /// The library backing this store, if any.
    pub fn library(self) -> Option<&'static str> {
        match self {
            CacheStore::Redis => Some(library::REDIS),
            CacheStore::Moka => Some(library::MOKA),
            CacheStore::None | CacheStore::Simple => None,
        }
    }
}

impl Display for CacheStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheStore::None => "none",
            CacheStore::Simple => "simple",
            CacheStore::Redis => "redis",
            CacheStore::Moka => "moka",
        };
        f.write_str(name)
    }
}

/// Cache properties; unset `ttl`/`max-entries` mean unbounded.
#[derive(Clone, Debug, Deserialize, Default, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct CacheProperties {
    #[serde(rename = "type", deserialize_with = "lenient_opt")]
    pub store: Option<CacheStore>,
    pub ttl: Option<Duration>,
    pub max_entries: Option<u64>,
    pub redis: RedisCacheProperties,
}

/// Redis-specific cache properties.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct RedisCacheProperties {
    pub key_prefix: String,
    pub use_key_prefix: bool,
}

impl Default for RedisCacheProperties {
    fn default() -> Self {
        Self {
            key_prefix: "cache:".to_string(),
            use_key_prefix: true,
        }
    }
}

/// A configured cache manager handle. Registered as service `cache-manager`.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheManager {
    pub store: CacheStore,
    pub ttl: Option<Duration>,
    pub max_entries: Option<u64>,
    /// Key prefix applied by the redis store; `None` for other stores or when disabled.
    pub key_prefix: Option<String>,
}

#[derive(Default)]
pub struct CacheAutoConfiguration;

impl AutoConfiguration for CacheAutoConfiguration {
    fn name(&self) -> &str {
        "cache"
    }

    fn conditions(&self) -> Vec<Condition> {
        vec![
            on_property_not("cache.type", "none"),
            on_missing_service::<CacheManager>(),
        ]
    }

    fn configure(&self, context: &mut ConfigureContext) -> Result<(), AutoConfigurationError> {
        let properties: CacheProperties =
            context.environment().bind_or_default(PROPERTIES_PREFIX)?;

        let store = match select_store(&properties, context.libraries())? {
            Some(store) => store,
            // 'none' can also arrive through the bound form
            None => return Ok(()),
        };

        let key_prefix = (store == CacheStore::Redis && properties.redis.use_key_prefix)
            .then(|| properties.redis.key_prefix.clone());

        let mut manager = CacheManager {
            store,
            ttl: properties.ttl,
            max_entries: properties.max_entries,
            key_prefix,
        };

        let applied = context.apply_customizers(&mut manager);
        debug!("Configured {store} cache manager with {applied} customizers applied.");

        context.register_service("cache-manager", manager)?;
        Ok(())
    }
}

fn select_store(
    properties: &CacheProperties,
    libraries: &Libraries,
) -> Result<Option<CacheStore>, AutoConfigurationError> {
    match properties.store {
        Some(CacheStore::None) => Ok(None),
        Some(store) => match store.library() {
            Some(library) if !libraries.contains(library) => {
                Err(AutoConfigurationError::NoCandidate {
                    role: "cache store",
                    candidates: vec![library],
                })
            }
            _ => Ok(Some(store)),
        },
        None => Ok(Some(
            STORE_SELECTION_ORDER
                .iter()
                .copied()
                .find(|store| {
                    store
                        .library()
                        .is_some_and(|library| libraries.contains(library))
                })
                .unwrap_or(CacheStore::Simple),
        )),
    }
}

bootwire::submit_auto_configuration!(CacheAutoConfiguration);
