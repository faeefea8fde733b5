//! Externalized configuration support. The [Environment] is the single source of configuration
//! values for the whole startup process: condition evaluation reads individual properties from it,
//! while auto-configurations bind whole properties holders from dotted key prefixes.
//!
//! By default, the environment is built from an optional `bootwire.json` file overlaid with
//! `BOOTWIRE_`-prefixed environment variables. Property keys use dotted namespaces with kebab-case
//! leaves, e.g. `pulsar.consumer.receiver-queue-size`. In variable names, a single underscore
//! separates key segments and a double underscore spells the dash, so that variable becomes
//! `BOOTWIRE_PULSAR_CONSUMER_RECEIVER__QUEUE__SIZE`.

pub mod binding;

use config::{Config, ConfigError, File};
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Name of the default config file.
pub const CONFIG_FILE: &str = "bootwire.json";

const CONFIG_ENV_PREFIX: &str = "BOOTWIRE";

/// Errors related to reading and binding externalized configuration.
#[derive(Error, Debug)]
pub enum EnvironmentError {
    #[error("Error reading configuration sources: {0}")]
    Source(#[source] ConfigError),
    #[error("Error binding properties under '{prefix}': {source}")]
    Binding {
        prefix: String,
        #[source]
        source: ConfigError,
    },
    #[error("Invalid value for property '{key}': {reason}")]
    InvalidProperty { key: String, reason: String },
}

/// A read-only view of property sources, safe to use in registration conditions.
#[cfg_attr(test, automock)]
pub trait PropertyResolver {
    /// Returns the raw value for given dotted key, if present.
    fn property(&self, key: &str) -> Option<String>;
}

/// Typed configuration environment built once at startup and read-only afterwards.
#[derive(Clone, Debug)]
pub struct Environment {
    config: Config,
}

impl Environment {
    /// Creates an environment from the default sources: an optional [CONFIG_FILE] overlaid with
    /// `BOOTWIRE_`-prefixed environment variables, mapped to property keys as described in the
    /// [module docs](self).
    pub fn from_sources() -> Result<Self, EnvironmentError> {
        let mut builder = Config::builder().add_source(File::with_name(CONFIG_FILE).required(false));
        for (variable, value) in std::env::vars() {
            if let Some(key) = environment_key(&variable) {
                builder = builder
                    .set_override(key, value)
                    .map_err(EnvironmentError::Source)?;
            }
        }

        builder
            .build()
            .map(|config| Self { config })
            .map_err(EnvironmentError::Source)
    }

    /// Creates an environment from explicit key/value pairs.
    pub fn from_map<I, K, V>(properties: I) -> Result<Self, EnvironmentError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut builder = Config::builder();
        for (key, value) in properties {
            builder = builder
                .set_override(key.into(), value.into())
                .map_err(EnvironmentError::Source)?;
        }

        builder
            .build()
            .map(|config| Self { config })
            .map_err(EnvironmentError::Source)
    }

    /// Creates an environment with no properties at all.
    pub fn empty() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Binds the configuration subtree under `prefix` into a typed properties holder.
    pub fn bind<T: DeserializeOwned>(&self, prefix: &str) -> Result<T, EnvironmentError> {
        self.config
            .get::<T>(prefix)
            .map_err(|source| EnvironmentError::Binding {
                prefix: prefix.to_string(),
                source,
            })
    }

    /// Binds like [bind](Self::bind) does, but yields default values when the whole prefix is
    /// absent from the sources.
    pub fn bind_or_default<T: DeserializeOwned + Default>(
        &self,
        prefix: &str,
    ) -> Result<T, EnvironmentError> {
        match self.config.get::<T>(prefix) {
            Ok(properties) => Ok(properties),
            Err(ConfigError::NotFound(_)) => Ok(T::default()),
            Err(source) => Err(EnvironmentError::Binding {
                prefix: prefix.to_string(),
                source,
            }),
        }
    }
}

impl PropertyResolver for Environment {
    fn property(&self, key: &str) -> Option<String> {
        self.config.get_string(key).ok()
    }
}

/// Maps a `BOOTWIRE_`-prefixed variable name to a dotted property key: single underscores become
/// dots, double underscores become dashes.
fn environment_key(variable: &str) -> Option<String> {
    variable
        .strip_prefix(CONFIG_ENV_PREFIX)
        .and_then(|key| key.strip_prefix('_'))
        .filter(|key| !key.is_empty())
        .map(|key| key.to_lowercase().replace("__", "-").replace('_', "."))
}

#[cfg(test)]
mod tests {
    use crate::environment::binding::Duration;
    use crate::environment::{Environment, EnvironmentError, PropertyResolver};
    use serde::Deserialize;

    #[derive(Deserialize, Debug, PartialEq)]
    #[serde(rename_all = "kebab-case", default)]
    struct TestProperties {
        receiver_queue_size: u32,
        subscription_name: Option<String>,
        ack_timeout: Option<Duration>,
    }

    impl Default for TestProperties {
        fn default() -> Self {
            Self {
                receiver_queue_size: 1000,
                subscription_name: None,
                ack_timeout: None,
            }
        }
    }

    #[test]
    fn should_bind_properties_from_kebab_case_keys() {
        let environment = Environment::from_map([
            ("consumer.receiver-queue-size", "1"),
            ("consumer.subscription-name", "my-subscription"),
            ("consumer.ack-timeout", "2s"),
        ])
        .unwrap();

        let properties: TestProperties = environment.bind("consumer").unwrap();

        assert_eq!(1, properties.receiver_queue_size);
        assert_eq!(
            Some("my-subscription".to_string()),
            properties.subscription_name
        );
        assert_eq!(Some(Duration::from_secs(2)), properties.ack_timeout);
    }

    #[test]
    fn should_bind_defaults_for_missing_prefix() {
        let environment = Environment::empty();

        let properties: TestProperties = environment.bind_or_default("consumer").unwrap();

        assert_eq!(TestProperties::default(), properties);
    }

    #[test]
    fn should_report_offending_prefix_on_binding_error() {
        let environment =
            Environment::from_map([("consumer.receiver-queue-size", "lots")]).unwrap();

        let error = environment
            .bind::<TestProperties>("consumer")
            .unwrap_err();

        assert!(matches!(
            error,
            EnvironmentError::Binding { ref prefix, .. } if prefix == "consumer"
        ));
    }

    #[test]
    fn should_map_environment_variables_to_property_keys() {
        assert_eq!(
            Some("pulsar.consumer.receiver-queue-size".to_string()),
            super::environment_key("BOOTWIRE_PULSAR_CONSUMER_RECEIVER__QUEUE__SIZE")
        );
        assert_eq!(
            Some("mail.host".to_string()),
            super::environment_key("BOOTWIRE_MAIL_HOST")
        );
        assert_eq!(None, super::environment_key("BOOTWIRE_"));
        assert_eq!(None, super::environment_key("PATH"));
    }

    #[test]
    fn should_resolve_single_properties() {
        let environment = Environment::from_map([("cache.type", "redis")]).unwrap();

        assert_eq!(Some("redis".to_string()), environment.property("cache.type"));
        assert_eq!(None, environment.property("cache.ttl"));
    }
}
