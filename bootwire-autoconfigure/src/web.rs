//! Auto-configuration for an embedded web server, bound from the `server.*` namespace.

use crate::library;
use bootwire::autoconfigure::conditions::{on_any_library, on_missing_service, Condition, Libraries};
use bootwire::autoconfigure::{AutoConfiguration, AutoConfigurationError, ConfigureContext};
use bootwire::environment::binding::{lenient, lenient_opt, DataSize};
use serde::Deserialize;
use std::fmt::{self, Display, Formatter};
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;
use tracing::debug;

/// Configuration namespace for web server properties.
pub const PROPERTIES_PREFIX: &str = "server";

/// Candidate server providers in selection order.
pub const SERVER_SELECTION_ORDER: &[ServerProvider] =
    &[ServerProvider::Axum, ServerProvider::Actix];

/// Server implementations selectable with `server.provider`.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServerProvider {
    Axum,
    Actix,
}

impl ServerProvider {
    pub fn library(self) -> &'static str {
        match self {
            ServerProvider::Axum => library::AXUM,
            ServerProvider::Actix => library::ACTIX,
        }
    }
}

impl Display for ServerProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerProvider::Axum => "axum",
            ServerProvider::Actix => "actix",
        };
        f.write_str(name)
    }
}

/// Shutdown behavior on termination.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownMode {
    /// Stop accepting connections and let in-flight requests finish.
    #[default]
    Graceful,
    Immediate,
}

/// Web server properties; the default address binds all interfaces.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct ServerProperties {
    #[serde(deserialize_with = "lenient_opt")]
    pub provider: Option<ServerProvider>,
    pub port: u16,
    pub address: String,
    pub max_request_size: DataSize,
    pub compression: CompressionProperties,
    #[serde(deserialize_with = "lenient")]
    pub shutdown: ShutdownMode,
}

impl Default for ServerProperties {
    fn default() -> Self {
        Self {
            provider: None,
            port: 8080,
            address: "0.0.0.0".to_string(),
            max_request_size: DataSize::from_megabytes(10),
            compression: CompressionProperties::default(),
            shutdown: ShutdownMode::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct CompressionProperties {
    pub enabled: bool,
    /// Responses smaller than this are sent uncompressed.
    pub min_response_size: DataSize,
}

impl Default for CompressionProperties {
    fn default() -> Self {
        Self {
            enabled: false,
            min_response_size: DataSize::from_kilobytes(2),
        }
    }
}

/// A configured web server handle. Registered as service `web-server`.
#[derive(Clone, Debug, PartialEq)]
pub struct WebServer {
    pub provider: ServerProvider,
    pub listen_address: SocketAddr,
    pub max_request_size: DataSize,
    pub compression: CompressionProperties,
    pub shutdown: ShutdownMode,
}

/// Construction failures specific to web servers.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum WebServerError {
    #[error("'{0}' is not a valid listen address")]
    MalformedAddress(String),
}

#[derive(Default)]
pub struct WebServerAutoConfiguration;

impl AutoConfiguration for WebServerAutoConfiguration {
    fn name(&self) -> &str {
        "web"
    }

    fn conditions(&self) -> Vec<Condition> {
        vec![
            on_any_library(&[library::AXUM, library::ACTIX]),
            on_missing_service::<WebServer>(),
        ]
    }

    fn configure(&self, context: &mut ConfigureContext) -> Result<(), AutoConfigurationError> {
        let properties: ServerProperties =
            context.environment().bind_or_default(PROPERTIES_PREFIX)?;

        let provider = select_provider(&properties, context.libraries())?;
        let address: IpAddr = properties.address.parse().map_err(|_| {
            AutoConfigurationError::construction(
                self.name(),
                WebServerError::MalformedAddress(properties.address.clone()),
            )
        })?;

        let mut server = WebServer {
            provider,
            listen_address: SocketAddr::new(address, properties.port),
            max_request_size: properties.max_request_size,
            compression: properties.compression.clone(),
            shutdown: properties.shutdown,
        };

        let applied = context.apply_customizers(&mut server);
        debug!(
            "Configured {provider} web server on {} with {applied} customizers applied.",
            server.listen_address
        );

        context.register_service("web-server", server)?;
        Ok(())
    }
}

fn select_provider(
    properties: &ServerProperties,
    libraries: &Libraries,
) -> Result<ServerProvider, AutoConfigurationError> {
    if let Some(provider) = properties.provider {
        return if libraries.contains(provider.library()) {
            Ok(provider)
        } else {
            Err(AutoConfigurationError::NoCandidate {
                role: "web server",
                candidates: vec![provider.library()],
            })
        };
    }

    SERVER_SELECTION_ORDER
        .iter()
        .copied()
        .find(|provider| libraries.contains(provider.library()))
        .ok_or(AutoConfigurationError::NoCandidate {
            role: "web server",
            candidates: SERVER_SELECTION_ORDER
                .iter()
                .map(|provider| provider.library())
                .collect(),
        })
}

bootwire::submit_auto_configuration!(WebServerAutoConfiguration);
