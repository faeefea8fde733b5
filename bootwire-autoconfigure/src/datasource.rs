//! Auto-configuration for a pooled SQL datasource, bound from the `datasource.*` namespace.
//!
//! Several connection pool libraries can fill the role; the choice follows
//! [POOL_SELECTION_ORDER] unless pinned with the `datasource.pool.provider` property.

use crate::library;
use bootwire::autoconfigure::conditions::{
    on_any_library, on_missing_service, Condition, Libraries,
};
use bootwire::autoconfigure::{
    AutoConfiguration, AutoConfigurationError, ConfigureContext,
};
use bootwire::diagnostics::{FailureAnalysis, FailureAnalyzer};
use bootwire::environment::binding::{lenient_opt, Duration};
use serde::Deserialize;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;
use tracing::debug;

/// Configuration namespace for datasource properties.
pub const PROPERTIES_PREFIX: &str = "datasource";

/// Candidate pool providers in selection order - the first one whose library is provided wins.
pub const POOL_SELECTION_ORDER: &[PoolProvider] = &[
    PoolProvider::Deadpool,
    PoolProvider::R2d2,
    PoolProvider::Mobc,
];

/// Connection pool libraries known to this configuration.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PoolProvider {
    Deadpool,
    R2d2,
    Mobc,
}

impl PoolProvider {
    /// The library providing this pool implementation.
    pub fn library(self) -> &'static str {
        match self {
            PoolProvider::Deadpool => library::DEADPOOL,
            PoolProvider::R2d2 => library::R2D2,
            PoolProvider::Mobc => library::MOBC,
        }
    }
}

impl Display for PoolProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.library())
    }
}

/// Datasource properties; defaults follow the wrapped pool libraries.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DataSourceProperties {
    /// Connection URL, e.g. `postgres://localhost/app`. Required for construction.
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub pool: PoolProperties,
}

/// Pool tuning properties.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct PoolProperties {
    /// Pins the pool provider instead of following [POOL_SELECTION_ORDER].
    #[serde(deserialize_with = "lenient_opt")]
    pub provider: Option<PoolProvider>,
    pub max_size: u32,
    pub min_idle: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub register_metrics: bool,
}

impl Default for PoolProperties {
    fn default() -> Self {
        Self {
            provider: None,
            max_size: 10,
            min_idle: 0,
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
            register_metrics: false,
        }
    }
}

/// A configured connection pool handle. Registered as service `data-source`.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionPool {
    pub provider: PoolProvider,
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub max_size: u32,
    pub min_idle: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub register_metrics: bool,
}

/// Construction failures specific to datasources.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum DataSourceError {
    #[error("failed to determine a suitable connection URL: the 'datasource.url' property is not set")]
    MissingUrl,
    #[error("connection URL '{0}' is malformed: expected '<scheme>://<authority>'")]
    MalformedUrl(String),
}

#[derive(Default)]
pub struct DataSourceAutoConfiguration;

impl AutoConfiguration for DataSourceAutoConfiguration {
    fn name(&self) -> &str {
        "datasource"
    }

    fn conditions(&self) -> Vec<Condition> {
        vec![
            on_any_library(&[library::DEADPOOL, library::R2D2, library::MOBC]),
            on_missing_service::<ConnectionPool>(),
        ]
    }

    fn configure(&self, context: &mut ConfigureContext) -> Result<(), AutoConfigurationError> {
        let properties: DataSourceProperties =
            context.environment().bind_or_default(PROPERTIES_PREFIX)?;

        let provider = select_provider(&properties, context.libraries())?;
        let url = properties
            .url
            .clone()
            .ok_or_else(|| AutoConfigurationError::construction(self.name(), DataSourceError::MissingUrl))?;
        if !url.contains("://") {
            return Err(AutoConfigurationError::construction(
                self.name(),
                DataSourceError::MalformedUrl(url),
            ));
        }

        let mut pool = ConnectionPool {
            provider,
            url,
            username: properties.username,
            password: properties.password,
            max_size: properties.pool.max_size,
            min_idle: properties.pool.min_idle,
            connection_timeout: properties.pool.connection_timeout,
            idle_timeout: properties.pool.idle_timeout,
            max_lifetime: properties.pool.max_lifetime,
            register_metrics: properties.pool.register_metrics,
        };

        let applied = context.apply_customizers(&mut pool);
        debug!("Configured {provider} connection pool with {applied} customizers applied.");

        context.register_service("data-source", pool)?;
        Ok(())
    }
}

fn select_provider(
    properties: &DataSourceProperties,
    libraries: &Libraries,
) -> Result<PoolProvider, AutoConfigurationError> {
    if let Some(provider) = properties.pool.provider {
        return if libraries.contains(provider.library()) {
            Ok(provider)
        } else {
            Err(AutoConfigurationError::NoCandidate {
                role: "connection pool",
                candidates: vec![provider.library()],
            })
        };
    }

    POOL_SELECTION_ORDER
        .iter()
        .copied()
        .find(|provider| libraries.contains(provider.library()))
        .ok_or(AutoConfigurationError::NoCandidate {
            role: "connection pool",
            candidates: POOL_SELECTION_ORDER
                .iter()
                .map(|provider| provider.library())
                .collect(),
        })
}

/// Translates datasource construction failures into actionable diagnostics.
#[derive(Default)]
pub struct DataSourceFailureAnalyzer;

impl FailureAnalyzer for DataSourceFailureAnalyzer {
    fn analyze(&self, error: &AutoConfigurationError) -> Option<FailureAnalysis> {
        let AutoConfigurationError::Construction {
            configuration,
            source,
        } = error
        else {
            return None;
        };
        if configuration != "datasource" {
            return None;
        }

        source
            .downcast_ref::<DataSourceError>()
            .map(|error| match error {
                DataSourceError::MissingUrl => FailureAnalysis {
                    description: "Failed to configure a connection pool: no connection URL was set."
                        .to_string(),
                    action: "Set the 'datasource.url' property, e.g. 'postgres://localhost/app', \
                             or remove all pool libraries if no datasource is needed."
                        .to_string(),
                },
                DataSourceError::MalformedUrl(url) => FailureAnalysis {
                    description: format!(
                        "Failed to configure a connection pool: the connection URL '{url}' is malformed."
                    ),
                    action: "Fix the 'datasource.url' property to the form '<scheme>://<authority>'."
                        .to_string(),
                },
            })
    }
}

bootwire::submit_auto_configuration!(DataSourceAutoConfiguration);
bootwire::submit_failure_analyzer!(DataSourceFailureAnalyzer);
