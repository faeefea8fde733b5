//! Auto-configuration: conditionally-activated units which construct and register
//! default-configured service instances. Each [AutoConfiguration] pairs a list of
//! [Conditions](conditions::Condition) with a factory; the [AutoConfigurer] evaluates all known
//! configurations in priority order during startup, on a single thread.
//!
//! Configurations can be registered statically with [submit_auto_configuration!] or added
//! programmatically with [AutoConfigurer::with].

pub mod conditions;

use crate::autoconfigure::conditions::{Condition, ConditionContext, Libraries};
use crate::customizer::CustomizerRegistry;
use crate::diagnostics::{ConditionEvaluation, ConditionEvaluationReport};
use crate::environment::{Environment, EnvironmentError};
use crate::service_registry::{ServiceInstancePtr, ServiceRegistry, ServiceRegistryError};
use itertools::Itertools;
use std::any::Any;
use std::error::Error;
use thiserror::Error;
use tracing::{debug, info};

/// Errors related to running auto-configurations. All are fatal to startup; nothing is retried.
#[derive(Error, Debug)]
pub enum AutoConfigurationError {
    #[error("Error constructing services in '{configuration}': {source}")]
    Construction {
        configuration: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    #[error("No {role} implementation could be auto-configured; considered candidates: {candidates:?}")]
    NoCandidate {
        role: &'static str,
        candidates: Vec<&'static str>,
    },
    #[error(transparent)]
    Registry(#[from] ServiceRegistryError),
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
}

impl AutoConfigurationError {
    /// Wraps a library-specific construction failure with the name of the failing configuration.
    pub fn construction(
        configuration: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self::Construction {
            configuration: configuration.into(),
            source: Box::new(source),
        }
    }
}

/// Context passed to [AutoConfiguration::configure], giving factories access to bound properties,
/// the library catalogue, registered customizers, and the service registry they populate.
pub struct ConfigureContext<'a> {
    environment: &'a Environment,
    libraries: &'a Libraries,
    customizers: &'a CustomizerRegistry,
    registry: &'a mut ServiceRegistry,
}

impl<'a> ConfigureContext<'a> {
    pub fn new(
        environment: &'a Environment,
        libraries: &'a Libraries,
        customizers: &'a CustomizerRegistry,
        registry: &'a mut ServiceRegistry,
    ) -> Self {
        Self {
            environment,
            libraries,
            customizers,
            registry,
        }
    }

    pub fn environment(&self) -> &Environment {
        self.environment
    }

    pub fn libraries(&self) -> &Libraries {
        self.libraries
    }

    pub fn registry(&self) -> &ServiceRegistry {
        self.registry
    }

    /// Applies all registered customizers to given target, in registration order, returning the
    /// number applied. Factories should call this after default construction and before
    /// registering the service.
    pub fn apply_customizers<T: Any>(&self, target: &mut T) -> usize {
        self.customizers.apply(target)
    }

    /// Registers a constructed service instance under given name.
    pub fn register_service<T: Any + Send + Sync>(
        &mut self,
        name: impl Into<String>,
        instance: T,
    ) -> Result<ServiceInstancePtr<T>, AutoConfigurationError> {
        let name = name.into();
        debug!("Registering service '{name}'.");
        Ok(self.registry.register(name, instance)?)
    }
}

/// A conditionally-activated unit registering default service instances.
pub trait AutoConfiguration: Send + Sync {
    /// Stable identifier used in reports and diagnostics.
    fn name(&self) -> &str;

    /// Establishes evaluation order between configurations. Higher priorities are evaluated
    /// first; ties are broken by name. Default 0.
    fn priority(&self) -> i8 {
        0
    }

    /// All conditions must match against the current startup state for
    /// [configure](Self::configure) to run. Evaluation short-circuits on the first non-match.
    fn conditions(&self) -> Vec<Condition> {
        vec![]
    }

    /// Constructs and registers default service instances.
    fn configure(&self, context: &mut ConfigureContext) -> Result<(), AutoConfigurationError>;
}

/// Registration entry for statically-known auto-configurations; see
/// [submit_auto_configuration!].
pub struct AutoConfigurationRegistrar {
    pub provider: fn() -> Box<dyn AutoConfiguration>,
}

inventory::collect!(AutoConfigurationRegistrar);

/// Statically registers an [AutoConfiguration] for discovery by
/// [AutoConfigurer::from_registered]. The configuration type must implement [Default].
#[macro_export]
macro_rules! submit_auto_configuration {
    ($configuration:ty) => {
        $crate::inventory::submit! {
            $crate::autoconfigure::AutoConfigurationRegistrar {
                provider: || ::std::boxed::Box::new(<$configuration>::default()),
            }
        }
    };
}

/// Evaluates auto-configurations against the startup state, registering services for those whose
/// conditions match.
pub struct AutoConfigurer {
    configurations: Vec<Box<dyn AutoConfiguration>>,
}

impl AutoConfigurer {
    /// Creates a configurer with no configurations.
    pub fn empty() -> Self {
        Self {
            configurations: vec![],
        }
    }

    /// Creates a configurer with all configurations registered via [submit_auto_configuration!].
    pub fn from_registered() -> Self {
        let configurations = inventory::iter::<AutoConfigurationRegistrar>
            .into_iter()
            .map(|registrar| (registrar.provider)())
            .collect_vec();

        Self { configurations }
    }

    /// Adds a configuration, builder-style.
    pub fn with(mut self, configuration: impl AutoConfiguration + 'static) -> Self {
        self.configurations.push(Box::new(configuration));
        self
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    /// Runs a single evaluation pass: configurations are visited in priority order, their
    /// conditions evaluated against the live registry state, and the factories of matching ones
    /// invoked. The first factory error aborts the pass.
    pub fn run(
        &self,
        environment: &Environment,
        libraries: &Libraries,
        customizers: &CustomizerRegistry,
        registry: &mut ServiceRegistry,
    ) -> Result<ConditionEvaluationReport, AutoConfigurationError> {
        info!(
            "Evaluating {} auto-configurations...",
            self.configurations.len()
        );

        let mut report = ConditionEvaluationReport::default();

        for configuration in self
            .configurations
            .iter()
            .sorted_by_key(|configuration| {
                (
                    -(configuration.priority() as i16),
                    configuration.name().to_string(),
                )
            })
        {
            let name = configuration.name();

            let mut outcomes = vec![];
            let mut matched = true;
            {
                let context = ConditionContext::new(&*registry, libraries, environment);
                for condition in configuration.conditions() {
                    let outcome = condition.evaluate(&context);
                    matched = outcome.matched;
                    outcomes.push(outcome);
                    if !matched {
                        break;
                    }
                }
            }

            report.push(ConditionEvaluation {
                configuration: name.to_string(),
                matched,
                outcomes,
            });

            if !matched {
                debug!("Skipping auto-configuration '{name}': conditions did not match.");
                continue;
            }

            debug!("Applying auto-configuration '{name}'.");

            let mut context = ConfigureContext::new(environment, libraries, customizers, registry);
            configuration.configure(&mut context)?;
        }

        Ok(report)
    }
}
