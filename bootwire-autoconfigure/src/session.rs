//! Auto-configuration for server-side session storage, bound from the `session.*` namespace.
//!
//! Unlike caching there is no in-memory fallback: when no backing library is provided and no
//! store is pinned, the configuration silently skips registration instead of failing, since
//! sessions are an opt-in concern.

use crate::library;
use bootwire::autoconfigure::conditions::{on_missing_service, Condition, Libraries};
use bootwire::autoconfigure::{AutoConfiguration, AutoConfigurationError, ConfigureContext};
use bootwire::environment::binding::{lenient_opt, Duration};
use serde::Deserialize;
use std::fmt::{self, Display, Formatter};
use tracing::debug;

/// Configuration namespace for session properties.
pub const PROPERTIES_PREFIX: &str = "session";

/// Candidate session stores in selection order.
pub const STORE_SELECTION_ORDER: &[SessionStore] = &[SessionStore::Redis, SessionStore::Jdbc];

/// Session store kinds selectable with `session.store`.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStore {
    /// Disables session auto-configuration.
    None,
    Redis,
    Jdbc,
}

impl SessionStore {
    /// The library backing this store, if any.
    pub fn library(self) -> Option<&'static str> {
        match self {
            SessionStore::Redis => Some(library::REDIS),
            SessionStore::Jdbc => Some(library::SQLX),
            SessionStore::None => None,
        }
    }
}

impl Display for SessionStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStore::None => "none",
            SessionStore::Redis => "redis",
            SessionStore::Jdbc => "jdbc",
        };
        f.write_str(name)
    }
}

/// Session properties with servlet-style cookie defaults.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct SessionProperties {
    #[serde(deserialize_with = "lenient_opt")]
    pub store: Option<SessionStore>,
    pub timeout: Duration,
    pub redis: RedisSessionProperties,
    pub cookie: CookieProperties,
}

impl Default for SessionProperties {
    fn default() -> Self {
        Self {
            store: None,
            timeout: Duration::from_secs(30 * 60),
            redis: RedisSessionProperties::default(),
            cookie: CookieProperties::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct RedisSessionProperties {
    /// Namespace prefix for session keys.
    pub namespace: String,
}

impl Default for RedisSessionProperties {
    fn default() -> Self {
        Self {
            namespace: "bootwire:session".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct CookieProperties {
    pub name: String,
    pub http_only: bool,
    pub secure: bool,
    /// Unset means a session cookie which expires with the browser.
    pub max_age: Option<Duration>,
}

impl Default for CookieProperties {
    fn default() -> Self {
        Self {
            name: "SESSION".to_string(),
            http_only: true,
            secure: false,
            max_age: None,
        }
    }
}

/// A configured session repository handle. Registered as service `session-repository`.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionRepository {
    pub store: SessionStore,
    pub timeout: Duration,
    /// Key namespace for the redis store; `None` for other stores.
    pub namespace: Option<String>,
    pub cookie: CookieProperties,
}

#[derive(Default)]
pub struct SessionAutoConfiguration;

impl AutoConfiguration for SessionAutoConfiguration {
    fn name(&self) -> &str {
        "session"
    }

    fn conditions(&self) -> Vec<Condition> {
        vec![on_missing_service::<SessionRepository>()]
    }

    fn configure(&self, context: &mut ConfigureContext) -> Result<(), AutoConfigurationError> {
        let properties: SessionProperties =
            context.environment().bind_or_default(PROPERTIES_PREFIX)?;

        let store = match select_store(&properties, context.libraries())? {
            Some(store) => store,
            None => {
                debug!("No session store available; skipping session repository registration.");
                return Ok(());
            }
        };

        let namespace =
            (store == SessionStore::Redis).then(|| properties.redis.namespace.clone());

        let mut repository = SessionRepository {
            store,
            timeout: properties.timeout,
            namespace,
            cookie: properties.cookie.clone(),
        };

        let applied = context.apply_customizers(&mut repository);
        debug!("Configured {store} session repository with {applied} customizers applied.");

        context.register_service("session-repository", repository)?;
        Ok(())
    }
}

fn select_store(
    properties: &SessionProperties,
    libraries: &Libraries,
) -> Result<Option<SessionStore>, AutoConfigurationError> {
    match properties.store {
        Some(SessionStore::None) => Ok(None),
        Some(store) => match store.library() {
            Some(library) if !libraries.contains(library) => {
                Err(AutoConfigurationError::NoCandidate {
                    role: "session store",
                    candidates: vec![library],
                })
            }
            _ => Ok(Some(store)),
        },
        None => Ok(STORE_SELECTION_ORDER.iter().copied().find(|store| {
            store
                .library()
                .is_some_and(|library| libraries.contains(library))
        })),
    }
}

bootwire::submit_auto_configuration!(SessionAutoConfiguration);
