//! Auto-configuration for Apache Pulsar messaging, bound from the `pulsar.*` namespace.
//!
//! Registers a client handle plus consumer and producer factories. The factories do not talk to
//! the broker themselves; they drive builder seams ([ConsumerBuilder], [ProducerBuilder]) which
//! the host backs with the actual pulsar library. Bound consumer and producer defaults are mapped
//! onto the builders through customizers; optional properties are applied only when set, and host
//! customizers registered after the defaults can override any of them.

use crate::library;
use bootwire::autoconfigure::conditions::{on_library, on_missing_service, Condition};
use bootwire::autoconfigure::{AutoConfiguration, AutoConfigurationError, ConfigureContext};
use bootwire::environment::binding::{lenient_opt, string_list, Duration};
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;
use tracing::debug;

/// Configuration namespace for pulsar properties.
pub const PROPERTIES_PREFIX: &str = "pulsar";

/// Pulsar properties split by concern; client settings apply to the shared connection, consumer
/// and producer settings become defaults for instances created through the factories.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct PulsarProperties {
    pub client: ClientProperties,
    pub consumer: ConsumerProperties,
    pub producer: ProducerProperties,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct ClientProperties {
    /// Broker url; must use the `pulsar://` or `pulsar+ssl://` scheme.
    pub service_url: String,
    pub operation_timeout: Duration,
    pub connection_timeout: Duration,
}

impl Default for ClientProperties {
    fn default() -> Self {
        Self {
            service_url: "pulsar://localhost:6650".to_string(),
            operation_timeout: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct ConsumerProperties {
    #[serde(deserialize_with = "string_list")]
    pub topics: Vec<String>,
    pub subscription_name: Option<String>,
    #[serde(deserialize_with = "lenient_opt")]
    pub subscription_type: Option<SubscriptionType>,
    pub receiver_queue_size: u32,
    pub ack_timeout: Option<Duration>,
}

impl Default for ConsumerProperties {
    fn default() -> Self {
        Self {
            topics: vec![],
            subscription_name: None,
            subscription_type: None,
            receiver_queue_size: 1000,
            ack_timeout: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProducerProperties {
    pub topic: Option<String>,
    pub batching_enabled: bool,
    pub batching_max_messages: u32,
    pub send_timeout: Duration,
    #[serde(deserialize_with = "lenient_opt")]
    pub compression: Option<CompressionType>,
}

impl Default for ProducerProperties {
    fn default() -> Self {
        Self {
            topic: None,
            batching_enabled: true,
            batching_max_messages: 1000,
            send_timeout: Duration::from_secs(30),
            compression: None,
        }
    }
}

/// Subscription modes selectable with `pulsar.consumer.subscription-type`.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionType {
    Exclusive,
    Shared,
    Failover,
    #[serde(rename = "keyshared")]
    KeyShared,
}

/// Message compression selectable with `pulsar.producer.compression`.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    Lz4,
    Zlib,
    Zstd,
    Snappy,
}

impl Display for SubscriptionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubscriptionType::Exclusive => "exclusive",
            SubscriptionType::Shared => "shared",
            SubscriptionType::Failover => "failover",
            SubscriptionType::KeyShared => "keyshared",
        };
        f.write_str(name)
    }
}

/// A configured pulsar client handle. Registered as service `pulsar-client`.
#[derive(Clone, Debug, PartialEq)]
pub struct PulsarClient {
    pub service_url: String,
    pub operation_timeout: Duration,
    pub connection_timeout: Duration,
}

/// Construction failures specific to pulsar clients.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum PulsarError {
    #[error("pulsar service url '{0}' must use the pulsar:// or pulsar+ssl:// scheme")]
    MalformedServiceUrl(String),
}

/// Seam over a consumer under construction; backed by the pulsar library on the host side and
/// mocked in tests.
#[cfg_attr(test, automock)]
pub trait ConsumerBuilder {
    fn topics(&mut self, topics: &[String]);
    fn subscription_name(&mut self, name: &str);
    fn subscription_type(&mut self, subscription_type: SubscriptionType);
    fn receiver_queue_size(&mut self, size: u32);
    fn ack_timeout(&mut self, timeout: Duration);
}

/// Seam over a producer under construction.
#[cfg_attr(test, automock)]
pub trait ProducerBuilder {
    fn topic(&mut self, topic: &str);
    fn batching_enabled(&mut self, enabled: bool);
    fn batching_max_messages(&mut self, max_messages: u32);
    fn send_timeout(&mut self, timeout: Duration);
    fn compression(&mut self, compression: CompressionType);
}

/// Callback applied to every consumer created through [ConsumerFactory].
pub trait ConsumerBuilderCustomizer: Send + Sync {
    fn customize(&self, builder: &mut dyn ConsumerBuilder);
}

impl<F: Fn(&mut dyn ConsumerBuilder) + Send + Sync> ConsumerBuilderCustomizer for F {
    fn customize(&self, builder: &mut dyn ConsumerBuilder) {
        self(builder)
    }
}

/// Callback applied to every producer created through [ProducerFactory].
pub trait ProducerBuilderCustomizer: Send + Sync {
    fn customize(&self, builder: &mut dyn ProducerBuilder);
}

impl<F: Fn(&mut dyn ProducerBuilder) + Send + Sync> ProducerBuilderCustomizer for F {
    fn customize(&self, builder: &mut dyn ProducerBuilder) {
        self(builder)
    }
}

/// Maps bound consumer defaults onto a builder, each property exactly once. Optional properties
/// are skipped when unset; properties with library defaults are always applied.
pub struct ConsumerDefaultsCustomizer {
    properties: ConsumerProperties,
}

impl ConsumerDefaultsCustomizer {
    pub fn new(properties: ConsumerProperties) -> Self {
        Self { properties }
    }
}

impl ConsumerBuilderCustomizer for ConsumerDefaultsCustomizer {
    fn customize(&self, builder: &mut dyn ConsumerBuilder) {
        if !self.properties.topics.is_empty() {
            builder.topics(&self.properties.topics);
        }
        if let Some(name) = &self.properties.subscription_name {
            builder.subscription_name(name);
        }
        if let Some(subscription_type) = self.properties.subscription_type {
            builder.subscription_type(subscription_type);
        }
        builder.receiver_queue_size(self.properties.receiver_queue_size);
        if let Some(timeout) = self.properties.ack_timeout {
            builder.ack_timeout(timeout);
        }
    }
}

/// Maps bound producer defaults onto a builder, with the same skip-when-unset rule as
/// [ConsumerDefaultsCustomizer].
pub struct ProducerDefaultsCustomizer {
    properties: ProducerProperties,
}

impl ProducerDefaultsCustomizer {
    pub fn new(properties: ProducerProperties) -> Self {
        Self { properties }
    }
}

impl ProducerBuilderCustomizer for ProducerDefaultsCustomizer {
    fn customize(&self, builder: &mut dyn ProducerBuilder) {
        if let Some(topic) = &self.properties.topic {
            builder.topic(topic);
        }
        builder.batching_enabled(self.properties.batching_enabled);
        builder.batching_max_messages(self.properties.batching_max_messages);
        builder.send_timeout(self.properties.send_timeout);
        if let Some(compression) = self.properties.compression {
            builder.compression(compression);
        }
    }
}

/// Creates consumers with bound defaults applied first and host customizers after, in
/// registration order. Registered as service `pulsar-consumer-factory`.
#[derive(Default)]
pub struct ConsumerFactory {
    customizers: Vec<Box<dyn ConsumerBuilderCustomizer>>,
}

impl ConsumerFactory {
    pub fn push_customizer(&mut self, customizer: Box<dyn ConsumerBuilderCustomizer>) {
        self.customizers.push(customizer);
    }

    /// Applies all customizers to a builder the host is about to finalize.
    pub fn configure(&self, builder: &mut dyn ConsumerBuilder) {
        for customizer in &self.customizers {
            customizer.customize(builder);
        }
    }
}

/// Creates producers with bound defaults applied first and host customizers after. Registered as
/// service `pulsar-producer-factory`.
#[derive(Default)]
pub struct ProducerFactory {
    customizers: Vec<Box<dyn ProducerBuilderCustomizer>>,
}

impl ProducerFactory {
    pub fn push_customizer(&mut self, customizer: Box<dyn ProducerBuilderCustomizer>) {
        self.customizers.push(customizer);
    }

    pub fn configure(&self, builder: &mut dyn ProducerBuilder) {
        for customizer in &self.customizers {
            customizer.customize(builder);
        }
    }
}

#[derive(Default)]
pub struct PulsarAutoConfiguration;

impl AutoConfiguration for PulsarAutoConfiguration {
    fn name(&self) -> &str {
        "pulsar"
    }

    fn conditions(&self) -> Vec<Condition> {
        vec![
            on_library(library::PULSAR),
            on_missing_service::<PulsarClient>(),
        ]
    }

    fn configure(&self, context: &mut ConfigureContext) -> Result<(), AutoConfigurationError> {
        let properties: PulsarProperties =
            context.environment().bind_or_default(PROPERTIES_PREFIX)?;

        let url = &properties.client.service_url;
        if !url.starts_with("pulsar://") && !url.starts_with("pulsar+ssl://") {
            return Err(AutoConfigurationError::construction(
                self.name(),
                PulsarError::MalformedServiceUrl(url.clone()),
            ));
        }

        let mut client = PulsarClient {
            service_url: url.clone(),
            operation_timeout: properties.client.operation_timeout,
            connection_timeout: properties.client.connection_timeout,
        };
        let applied = context.apply_customizers(&mut client);
        debug!(
            "Configured pulsar client for {} with {applied} customizers applied.",
            client.service_url
        );

        let mut consumer_factory = ConsumerFactory::default();
        consumer_factory
            .push_customizer(Box::new(ConsumerDefaultsCustomizer::new(properties.consumer)));
        context.apply_customizers(&mut consumer_factory);

        let mut producer_factory = ProducerFactory::default();
        producer_factory
            .push_customizer(Box::new(ProducerDefaultsCustomizer::new(properties.producer)));
        context.apply_customizers(&mut producer_factory);

        context.register_service("pulsar-client", client)?;
        context.register_service("pulsar-consumer-factory", consumer_factory)?;
        context.register_service("pulsar-producer-factory", producer_factory)?;
        Ok(())
    }
}

bootwire::submit_auto_configuration!(PulsarAutoConfiguration);

#[cfg(test)]
mod tests {
    use crate::library;
    use crate::pulsar::{
        ConsumerBuilderCustomizer, ConsumerDefaultsCustomizer, ConsumerFactory,
        ConsumerProperties, MockConsumerBuilder, MockProducerBuilder, ProducerBuilderCustomizer,
        ProducerDefaultsCustomizer, ProducerProperties, PulsarAutoConfiguration, PulsarClient,
        PulsarProperties, SubscriptionType,
    };
    use bootwire::autoconfigure::conditions::Libraries;
    use bootwire::autoconfigure::{AutoConfiguration, AutoConfigurationError, ConfigureContext};
    use bootwire::customizer::CustomizerRegistry;
    use bootwire::environment::binding::Duration;
    use bootwire::environment::Environment;
    use bootwire::service_registry::{ServiceRegistry, ServiceRegistryFacade};
    use mockall::predicate::eq;

    #[test]
    fn should_bind_pulsar_properties() {
        let environment = Environment::from_map([
            ("pulsar.client.service-url", "pulsar://broker:6650"),
            ("pulsar.consumer.topics", "orders,invoices"),
            ("pulsar.consumer.subscription-type", "KeyShared"),
            ("pulsar.producer.compression", "lz4"),
            ("pulsar.producer.send-timeout", "5s"),
        ])
        .unwrap();

        let properties: PulsarProperties = environment.bind("pulsar").unwrap();

        assert_eq!("pulsar://broker:6650", properties.client.service_url);
        assert_eq!(
            vec!["orders".to_string(), "invoices".to_string()],
            properties.consumer.topics
        );
        assert_eq!(
            Some(SubscriptionType::KeyShared),
            properties.consumer.subscription_type
        );
        assert_eq!(1000, properties.consumer.receiver_queue_size);
        assert_eq!(Duration::from_secs(5), properties.producer.send_timeout);
    }

    #[test]
    fn should_apply_only_set_consumer_defaults() {
        let environment = Environment::from_map([
            ("pulsar.consumer.receiver-queue-size", "1"),
            ("pulsar.consumer.subscription-name", "my-subscription"),
        ])
        .unwrap();
        let properties: PulsarProperties = environment.bind("pulsar").unwrap();

        let mut builder = MockConsumerBuilder::new();
        builder
            .expect_receiver_queue_size()
            .with(eq(1))
            .times(1)
            .return_const(());
        builder
            .expect_subscription_name()
            .with(eq("my-subscription"))
            .times(1)
            .return_const(());

        let mut factory = ConsumerFactory::default();
        factory.push_customizer(Box::new(ConsumerDefaultsCustomizer::new(
            properties.consumer,
        )));
        factory.configure(&mut builder);
    }

    #[test]
    fn should_apply_library_defaults_but_skip_unset_optionals() {
        let mut builder = MockConsumerBuilder::new();
        builder
            .expect_receiver_queue_size()
            .with(eq(1000))
            .times(1)
            .return_const(());

        ConsumerDefaultsCustomizer::new(ConsumerProperties::default()).customize(&mut builder);
    }

    #[test]
    fn should_apply_producer_defaults() {
        let properties = ProducerProperties {
            topic: Some("orders".to_string()),
            ..Default::default()
        };

        let mut builder = MockProducerBuilder::new();
        builder
            .expect_topic()
            .with(eq("orders"))
            .times(1)
            .return_const(());
        builder
            .expect_batching_enabled()
            .with(eq(true))
            .times(1)
            .return_const(());
        builder
            .expect_batching_max_messages()
            .with(eq(1000))
            .times(1)
            .return_const(());
        builder
            .expect_send_timeout()
            .with(eq(Duration::from_secs(30)))
            .times(1)
            .return_const(());

        ProducerDefaultsCustomizer::new(properties).customize(&mut builder);
    }

    #[test]
    fn should_register_client_and_factories() {
        let environment = Environment::empty();
        let libraries = Libraries::default().with(library::PULSAR);
        let customizers = CustomizerRegistry::default();
        let mut registry = ServiceRegistry::default();
        let mut context =
            ConfigureContext::new(&environment, &libraries, &customizers, &mut registry);

        PulsarAutoConfiguration.configure(&mut context).unwrap();

        let client = registry.instance::<PulsarClient>().unwrap();
        assert_eq!("pulsar://localhost:6650", client.service_url);
        assert!(registry.is_name_registered("pulsar-consumer-factory"));
        assert!(registry.is_name_registered("pulsar-producer-factory"));
    }

    #[test]
    fn should_reject_malformed_service_url() {
        let environment =
            Environment::from_map([("pulsar.client.service-url", "http://broker:6650")]).unwrap();
        let libraries = Libraries::default().with(library::PULSAR);
        let customizers = CustomizerRegistry::default();
        let mut registry = ServiceRegistry::default();
        let mut context =
            ConfigureContext::new(&environment, &libraries, &customizers, &mut registry);

        let error = PulsarAutoConfiguration.configure(&mut context).unwrap_err();

        assert!(matches!(
            error,
            AutoConfigurationError::Construction { ref configuration, .. }
                if configuration == "pulsar"
        ));
    }
}
