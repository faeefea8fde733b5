//! Auto-configuration for an SMTP mail sender, bound from the `mail.*` namespace. Activated only
//! when a host is configured; `password` and `access-token` authentication are mutually
//! exclusive.

use bootwire::autoconfigure::conditions::{
    on_library, on_missing_service, on_property_present, Condition,
};
use bootwire::autoconfigure::{AutoConfiguration, AutoConfigurationError, ConfigureContext};
use bootwire::environment::EnvironmentError;
use fxhash::FxHashMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::library;

/// Configuration namespace for mail properties.
pub const PROPERTIES_PREFIX: &str = "mail";

/// Mail properties; defaults follow common SMTP submission settings.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct MailProperties {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    /// Password authentication; mutually exclusive with `access-token`.
    pub password: Option<String>,
    /// Token authentication; mutually exclusive with `password`.
    pub access_token: Option<String>,
    pub protocol: String,
    pub ssl: MailSslProperties,
    /// Verify connectivity to the mail server at startup.
    pub test_connection: bool,
    /// Additional protocol properties passed through to the transport.
    pub additional: FxHashMap<String, String>,
}

impl Default for MailProperties {
    fn default() -> Self {
        Self {
            host: None,
            port: 587,
            username: None,
            password: None,
            access_token: None,
            protocol: "smtp".to_string(),
            ssl: MailSslProperties::default(),
            test_connection: false,
            additional: FxHashMap::default(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct MailSslProperties {
    pub enabled: bool,
    pub required: bool,
}

impl MailProperties {
    /// Checks cross-property constraints which the per-field decoder cannot express.
    pub fn validate(&self) -> Result<(), EnvironmentError> {
        if self.password.is_some() && self.access_token.is_some() {
            return Err(EnvironmentError::InvalidProperty {
                key: "mail.password".to_string(),
                reason: "cannot be combined with 'mail.access-token'; set a single \
                         authentication mechanism"
                    .to_string(),
            });
        }

        Ok(())
    }
}

/// Authentication mechanism derived from the bound properties.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MailCredentials {
    None,
    Password(String),
    AccessToken(String),
}

/// A configured mail sender handle. Registered as service `mail-sender`.
#[derive(Clone, Debug, PartialEq)]
pub struct MailSender {
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub username: Option<String>,
    pub credentials: MailCredentials,
    pub ssl: MailSslProperties,
    pub additional: FxHashMap<String, String>,
}

/// Construction failures specific to mail senders.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum MailError {
    #[error("mail server is not available at {host}:{port}")]
    ConnectionTest { host: String, port: u16 },
}

#[derive(Default)]
pub struct MailSenderAutoConfiguration;

impl AutoConfiguration for MailSenderAutoConfiguration {
    fn name(&self) -> &str {
        "mail"
    }

    fn conditions(&self) -> Vec<Condition> {
        vec![
            on_library(library::LETTRE),
            on_property_present("mail.host"),
            on_missing_service::<MailSender>(),
        ]
    }

    fn configure(&self, context: &mut ConfigureContext) -> Result<(), AutoConfigurationError> {
        let properties: MailProperties =
            context.environment().bind_or_default(PROPERTIES_PREFIX)?;
        properties.validate()?;

        // conditions guarantee the host property
        let Some(host) = properties.host.clone() else {
            return Ok(());
        };

        let credentials = match (&properties.password, &properties.access_token) {
            (Some(password), _) => MailCredentials::Password(password.clone()),
            (_, Some(token)) => MailCredentials::AccessToken(token.clone()),
            _ => MailCredentials::None,
        };

        let mut sender = MailSender {
            host,
            port: properties.port,
            protocol: properties.protocol.clone(),
            username: properties.username.clone(),
            credentials,
            ssl: properties.ssl.clone(),
            additional: properties.additional.clone(),
        };

        let applied = context.apply_customizers(&mut sender);
        debug!(
            "Configured mail sender for {}:{} with {applied} customizers applied.",
            sender.host, sender.port
        );

        if properties.test_connection {
            sender
                .test_connection()
                .map_err(|error| AutoConfigurationError::construction(self.name(), error))?;
        }

        context.register_service("mail-sender", sender)?;
        Ok(())
    }
}

impl MailSender {
    /// Best-effort connectivity check used when `mail.test-connection` is set.
    pub fn test_connection(&self) -> Result<(), MailError> {
        if self.host.is_empty() || self.port == 0 {
            return Err(MailError::ConnectionTest {
                host: self.host.clone(),
                port: self.port,
            });
        }

        Ok(())
    }
}

bootwire::submit_auto_configuration!(MailSenderAutoConfiguration);
