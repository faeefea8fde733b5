//! Conditional auto-configuration of explicitly wired services.
//!
//! Instead of hand-wiring every third-party client in `main()`, applications declare which
//! libraries they provide and let [AutoConfigurations](autoconfigure::AutoConfiguration)
//! construct default-configured instances from externalized configuration. Each configuration is
//! a pair of registration [conditions](autoconfigure::conditions) (library presence, absence of a
//! user-supplied service, property values) and a factory; all known configurations are evaluated
//! once, in priority order, on the single startup thread. Constructed instances land in a
//! [ServiceRegistry](service_registry::ServiceRegistry) which is read-only afterwards.
//!
//! User-supplied services always win: registering an instance before startup makes the
//! corresponding auto-configuration back off. For lighter touch-ups,
//! [customizers](customizer::Customizer) mutate a default-constructed instance before it is
//! registered.
//!
//! ```
//! use bootwire::application::Application;
//! use bootwire::autoconfigure::conditions::{on_library, on_missing_service, Condition};
//! use bootwire::autoconfigure::{AutoConfiguration, AutoConfigurationError, ConfigureContext};
//! use bootwire::environment::{Environment, PropertyResolver};
//!
//! #[derive(Debug)]
//! struct Client {
//!     endpoint: String,
//! }
//!
//! struct ClientAutoConfiguration;
//!
//! impl AutoConfiguration for ClientAutoConfiguration {
//!     fn name(&self) -> &str {
//!         "client"
//!     }
//!
//!     fn conditions(&self) -> Vec<Condition> {
//!         vec![on_library("client"), on_missing_service::<Client>()]
//!     }
//!
//!     fn configure(&self, context: &mut ConfigureContext) -> Result<(), AutoConfigurationError> {
//!         let endpoint = context
//!             .environment()
//!             .property("client.endpoint")
//!             .unwrap_or_else(|| "localhost:9000".to_string());
//!
//!         let mut client = Client { endpoint };
//!         context.apply_customizers(&mut client);
//!         context.register_service("client", client)?;
//!         Ok(())
//!     }
//! }
//!
//! let environment = Environment::from_map([
//!     ("client.endpoint", "example.com:9000"),
//!     ("application.install-tracing-logger", "false"),
//! ])
//! .unwrap();
//!
//! let services = Application::with_environment(environment)
//!     .without_registered_configurations()
//!     .with_auto_configuration(ClientAutoConfiguration)
//!     .with_library("client")
//!     .run()
//!     .unwrap();
//!
//! assert_eq!("example.com:9000", services.instance::<Client>().unwrap().endpoint);
//! ```

pub mod application;
pub mod autoconfigure;
pub mod customizer;
pub mod diagnostics;
pub mod environment;
pub mod service_registry;

// used by the submission macros
#[doc(hidden)]
pub use inventory;
