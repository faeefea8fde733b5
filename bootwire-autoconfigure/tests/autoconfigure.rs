use bootwire::application::{Application, StartupError};
use bootwire::autoconfigure::AutoConfigurationError;
use bootwire::environment::binding::Duration;
use bootwire::environment::{Environment, EnvironmentError};
use bootwire_autoconfigure::cache::{CacheManager, CacheStore};
use bootwire_autoconfigure::datasource::{ConnectionPool, PoolProvider};
use bootwire_autoconfigure::pulsar::{ConsumerBuilder, ConsumerFactory, SubscriptionType};
use bootwire_autoconfigure::session::SessionRepository;
use bootwire_autoconfigure::web::WebServer;
use bootwire_autoconfigure::{library, provided_libraries};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn application(properties: &[(&str, &str)]) -> Application {
    let mut pairs = vec![("application.install-tracing-logger", "false")];
    pairs.extend_from_slice(properties);
    Application::with_environment(Environment::from_map(pairs).unwrap())
}

#[test]
fn should_configure_all_families_for_provided_libraries() {
    let services = application(&[("datasource.url", "postgres://localhost/app")])
        .with_libraries(provided_libraries())
        .run()
        .unwrap();

    let pool = services.instance::<ConnectionPool>().unwrap();
    assert_eq!(PoolProvider::Deadpool, pool.provider);

    let cache = services.instance::<CacheManager>().unwrap();
    assert_eq!(CacheStore::Redis, cache.store);

    let session = services.instance::<SessionRepository>().unwrap();
    assert_eq!(Duration::from_secs(30 * 60), session.timeout);

    assert!(services.contains::<WebServer>());
    assert!(services.instance_by_name::<ConsumerFactory>("pulsar-consumer-factory").is_ok());

    // mail stays inactive without a configured host
    assert_eq!(1, services.report().skipped().count());
}

#[test]
fn should_keep_user_supplied_pool() {
    let user_pool = ConnectionPool {
        provider: PoolProvider::Mobc,
        url: "postgres://localhost/custom".to_string(),
        username: None,
        password: None,
        max_size: 5,
        min_idle: 1,
        connection_timeout: Duration::from_secs(1),
        idle_timeout: Duration::from_secs(60),
        max_lifetime: Duration::from_secs(600),
        register_metrics: false,
    };

    let services = application(&[])
        .with_library(library::DEADPOOL)
        .register_service("user-pool", user_pool)
        .unwrap()
        .run()
        .unwrap();

    // the auto-configuration backs off, leaving exactly the user instance
    assert_eq!(1, services.instances::<ConnectionPool>().len());
    let pool = services.instance::<ConnectionPool>().unwrap();
    assert_eq!(PoolProvider::Mobc, pool.provider);
}

#[test]
fn should_register_nothing_without_libraries() {
    let services = application(&[("cache.type", "none")]).run().unwrap();

    assert!(services.registry().is_empty());
    // sessions match their conditions but back off silently without a store library
    assert_eq!(1, services.report().matched().count());
}

#[test]
fn should_invoke_customizers_exactly_once() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = invocations.clone();

    let services = application(&[("server.port", "9000")])
        .with_library(library::AXUM)
        .register_customizer(move |server: &mut WebServer| {
            counter.fetch_add(1, Ordering::Relaxed);
            server.compression.enabled = true;
        })
        .run()
        .unwrap();

    assert_eq!(1, invocations.load(Ordering::Relaxed));
    let server = services.instance::<WebServer>().unwrap();
    assert_eq!(9000, server.listen_address.port());
    assert!(server.compression.enabled);
}

#[test]
fn should_fail_startup_for_conflicting_mail_credentials() {
    let error = application(&[
        ("mail.host", "smtp.example.com"),
        ("mail.password", "secret"),
        ("mail.access-token", "token"),
    ])
    .with_library(library::LETTRE)
    .run()
    .unwrap_err();

    assert!(matches!(
        error,
        StartupError::AutoConfiguration(AutoConfigurationError::Environment(
            EnvironmentError::InvalidProperty { ref key, ref reason }
        )) if key == "mail.password" && reason.contains("mail.access-token")
    ));
}

#[derive(Default)]
struct RecordingConsumerBuilder {
    topics: Vec<String>,
    subscription_name: Option<String>,
    subscription_type: Option<SubscriptionType>,
    receiver_queue_sizes: Vec<u32>,
    ack_timeout: Option<Duration>,
}

impl ConsumerBuilder for RecordingConsumerBuilder {
    fn topics(&mut self, topics: &[String]) {
        self.topics = topics.to_vec();
    }

    fn subscription_name(&mut self, name: &str) {
        self.subscription_name = Some(name.to_string());
    }

    fn subscription_type(&mut self, subscription_type: SubscriptionType) {
        self.subscription_type = Some(subscription_type);
    }

    fn receiver_queue_size(&mut self, size: u32) {
        self.receiver_queue_sizes.push(size);
    }

    fn ack_timeout(&mut self, timeout: Duration) {
        self.ack_timeout = Some(timeout);
    }
}

#[test]
fn should_apply_bound_consumer_defaults_through_factory() {
    let services = application(&[
        ("pulsar.consumer.receiver-queue-size", "1"),
        ("pulsar.consumer.subscription-name", "my-subscription"),
    ])
    .with_library(library::PULSAR)
    .run()
    .unwrap();

    let factory = services
        .instance_by_name::<ConsumerFactory>("pulsar-consumer-factory")
        .unwrap();

    let mut builder = RecordingConsumerBuilder::default();
    factory.configure(&mut builder);

    assert_eq!(vec![1], builder.receiver_queue_sizes);
    assert_eq!(Some("my-subscription".to_string()), builder.subscription_name);
    assert_eq!(None, builder.subscription_type);
    assert_eq!(None, builder.ack_timeout);
    assert!(builder.topics.is_empty());
}
