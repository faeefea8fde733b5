//! Application bootstrap. [Application] is the explicit composition root: it loads the
//! [Environment](crate::environment::Environment), collects user-supplied services and
//! customizers, runs all known auto-configurations, and hands back the constructed [Services].

use crate::autoconfigure::conditions::Libraries;
use crate::autoconfigure::{AutoConfiguration, AutoConfigurationError, AutoConfigurer};
use crate::customizer::{Customizer, CustomizerRegistry};
use crate::diagnostics::{report_failure, ConditionEvaluationReport};
use crate::environment::{Environment, EnvironmentError};
use crate::service_registry::{ServiceInstancePtr, ServiceRegistry, ServiceRegistryError};
use serde::Deserialize;
use std::any::Any;
use thiserror::Error;
use tracing::info;

const APPLICATION_CONFIG_PREFIX: &str = "application";

/// Errors fatal to application startup.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Error initializing environment: {0}")]
    Environment(#[from] EnvironmentError),
    #[error(transparent)]
    AutoConfiguration(#[from] AutoConfigurationError),
}

/// Framework configuration, bound from the environment under the `application` prefix.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct ApplicationConfig {
    /// Should a default tracing logger be installed in the scope of the application.
    pub install_tracing_logger: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            install_tracing_logger: true,
        }
    }
}

impl From<OptionalApplicationConfig> for ApplicationConfig {
    fn from(value: OptionalApplicationConfig) -> Self {
        let default = Self::default();
        Self {
            install_tracing_logger: value
                .install_tracing_logger
                .unwrap_or(default.install_tracing_logger),
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
struct OptionalApplicationConfig {
    install_tracing_logger: Option<bool>,
}

/// Main entrypoint for the startup process. Collects the startup state and runs the
/// [AutoConfigurer](crate::autoconfigure::AutoConfigurer) once.
pub struct Application {
    environment: Environment,
    libraries: Libraries,
    customizers: CustomizerRegistry,
    registry: ServiceRegistry,
    configurer: AutoConfigurer,
}

impl Application {
    /// Creates an application with the environment initialized from the default sources and all
    /// statically registered auto-configurations.
    pub fn new() -> Result<Self, StartupError> {
        Ok(Self::with_environment(Environment::from_sources()?))
    }

    /// Creates an application with given environment and all statically registered
    /// auto-configurations.
    pub fn with_environment(environment: Environment) -> Self {
        Self {
            environment,
            libraries: Libraries::default(),
            customizers: CustomizerRegistry::default(),
            registry: ServiceRegistry::default(),
            configurer: AutoConfigurer::from_registered(),
        }
    }

    /// Replaces the library catalogue.
    pub fn with_libraries(mut self, libraries: Libraries) -> Self {
        self.libraries = libraries;
        self
    }

    /// Declares a single library as provided.
    pub fn with_library(mut self, library: impl Into<String>) -> Self {
        self.libraries.insert(library);
        self
    }

    /// Registers a user-supplied service instance before auto-configuration runs, overriding any
    /// auto-configured default of the same type.
    pub fn register_service<T: Any + Send + Sync>(
        mut self,
        name: impl Into<String>,
        instance: T,
    ) -> Result<Self, StartupError> {
        self.registry
            .register(name, instance)
            .map_err(AutoConfigurationError::Registry)?;
        Ok(self)
    }

    /// Registers a customizer applied to auto-configured instances of type `T`.
    pub fn register_customizer<T: Any>(
        mut self,
        customizer: impl Customizer<T> + 'static,
    ) -> Self {
        self.customizers.register(customizer);
        self
    }

    /// Adds a programmatic auto-configuration on top of the statically registered ones.
    pub fn with_auto_configuration(
        mut self,
        configuration: impl AutoConfiguration + 'static,
    ) -> Self {
        self.configurer = self.configurer.with(configuration);
        self
    }

    /// Drops all statically registered auto-configurations, keeping only those added with
    /// [with_auto_configuration](Self::with_auto_configuration).
    pub fn without_registered_configurations(mut self) -> Self {
        self.configurer = AutoConfigurer::empty();
        self
    }

    /// Runs the startup process once. On failure, consults failure analyzers and logs the
    /// resulting diagnosis before returning the error.
    pub fn run(mut self) -> Result<Services, StartupError> {
        let config: ApplicationConfig = self
            .environment
            .bind_or_default::<OptionalApplicationConfig>(APPLICATION_CONFIG_PREFIX)?
            .into();

        if config.install_tracing_logger {
            install_tracing_logger();
        }

        info!("Starting application...");

        let report = self
            .configurer
            .run(
                &self.environment,
                &self.libraries,
                &self.customizers,
                &mut self.registry,
            )
            .map_err(|error| {
                report_failure(&error);
                error
            })?;

        report.log();
        info!(
            "Auto-configuration complete: {} services registered.",
            self.registry.len()
        );

        Ok(Services {
            registry: self.registry,
            report,
        })
    }
}

/// The constructed services, read-only after startup.
#[derive(Debug)]
pub struct Services {
    registry: ServiceRegistry,
    report: ConditionEvaluationReport,
}

impl Services {
    /// Returns the single registered instance of given type.
    pub fn instance<T: Any + Send + Sync>(
        &self,
    ) -> Result<ServiceInstancePtr<T>, ServiceRegistryError> {
        self.registry.instance()
    }

    /// Returns all registered instances of given type.
    pub fn instances<T: Any + Send + Sync>(&self) -> Vec<ServiceInstancePtr<T>> {
        self.registry.instances()
    }

    /// Returns the instance registered under given name.
    pub fn instance_by_name<T: Any + Send + Sync>(
        &self,
        name: &str,
    ) -> Result<ServiceInstancePtr<T>, ServiceRegistryError> {
        self.registry.instance_by_name(name)
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.registry.contains::<T>()
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// The condition evaluation report produced during startup.
    pub fn report(&self) -> &ConditionEvaluationReport {
        &self.report
    }
}

fn install_tracing_logger() {
    use tracing_subscriber::EnvFilter;

    // a logger may have been installed by the host already
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use crate::application::{Application, ApplicationConfig, OptionalApplicationConfig};
    use crate::autoconfigure::conditions::{on_library, Condition};
    use crate::autoconfigure::{AutoConfiguration, AutoConfigurationError, ConfigureContext};
    use crate::environment::Environment;

    #[derive(Debug, PartialEq)]
    struct TestService(u32);

    struct TestConfiguration;

    impl AutoConfiguration for TestConfiguration {
        fn name(&self) -> &str {
            "test"
        }

        fn conditions(&self) -> Vec<Condition> {
            vec![on_library("test-library")]
        }

        fn configure(
            &self,
            context: &mut ConfigureContext,
        ) -> Result<(), AutoConfigurationError> {
            let mut service = TestService(1);
            context.apply_customizers(&mut service);
            context.register_service("test-service", service)?;
            Ok(())
        }
    }

    fn application() -> Application {
        Application::with_environment(
            Environment::from_map([("application.install-tracing-logger", "false")]).unwrap(),
        )
        .without_registered_configurations()
    }

    #[test]
    fn should_bind_application_config() {
        let environment =
            Environment::from_map([("application.install-tracing-logger", "false")]).unwrap();
        let config: ApplicationConfig = environment
            .bind_or_default::<OptionalApplicationConfig>("application")
            .unwrap()
            .into();

        assert!(!config.install_tracing_logger);
        assert!(ApplicationConfig::default().install_tracing_logger);
    }

    #[test]
    fn should_run_configured_application() {
        let services = application()
            .with_auto_configuration(TestConfiguration)
            .with_library("test-library")
            .register_customizer(|service: &mut TestService| service.0 = 2)
            .run()
            .unwrap();

        assert_eq!(TestService(2), *services.instance::<TestService>().unwrap());
        assert!(services.contains::<TestService>());
        assert_eq!(1, services.report().matched().count());
    }

    #[test]
    fn should_keep_user_service_registered_before_startup() {
        let services = application()
            .with_auto_configuration(TestConfiguration)
            .with_library("test-library")
            .register_service("user-service", TestService(42))
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(
            TestService(42),
            *services.instance_by_name::<TestService>("user-service").unwrap()
        );
        // the auto-configured instance is still registered - its conditions don't
        // exclude existing ones
        assert_eq!(2, services.instances::<TestService>().len());
    }

    #[test]
    fn should_skip_configurations_without_libraries() {
        let services = application()
            .with_auto_configuration(TestConfiguration)
            .run()
            .unwrap();

        assert!(!services.contains::<TestService>());
        assert_eq!(1, services.report().skipped().count());
    }
}
