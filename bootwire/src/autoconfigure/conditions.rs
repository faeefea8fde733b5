//! Conditional activation predicates. Every [AutoConfiguration](super::AutoConfiguration)
//! declares a list of conditions, all of which must match against the current startup state for
//! its factory to run. Each evaluation produces an outcome with a human-readable message, which
//! feeds the [ConditionEvaluationReport](crate::diagnostics::ConditionEvaluationReport).

use crate::environment::PropertyResolver;
use crate::service_registry::ServiceRegistryFacade;
use fxhash::FxHashSet;
use std::any::{type_name, Any, TypeId};
use std::fmt::{self, Debug, Formatter};

/// Explicit catalogue of third-party integrations provided by the host application. This replaces
/// runtime classpath inspection: the host (or a catalogue crate mapping cargo features) declares
/// which libraries are linked in, and conditions check for their presence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Libraries {
    provided: FxHashSet<String>,
}

impl Libraries {
    /// Adds a library, builder-style.
    pub fn with(mut self, library: impl Into<String>) -> Self {
        self.insert(library);
        self
    }

    pub fn insert(&mut self, library: impl Into<String>) {
        self.provided.insert(library.into());
    }

    pub fn contains(&self, library: &str) -> bool {
        self.provided.contains(library)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.provided.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for Libraries {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            provided: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// State information for use by condition implementations.
pub struct ConditionContext<'a> {
    registry: &'a dyn ServiceRegistryFacade,
    libraries: &'a Libraries,
    properties: &'a dyn PropertyResolver,
}

impl<'a> ConditionContext<'a> {
    pub fn new(
        registry: &'a dyn ServiceRegistryFacade,
        libraries: &'a Libraries,
        properties: &'a dyn PropertyResolver,
    ) -> Self {
        Self {
            registry,
            libraries,
            properties,
        }
    }

    /// Returns the registry for which the conditional evaluation is taking place.
    pub fn registry(&self) -> &dyn ServiceRegistryFacade {
        self.registry
    }

    pub fn libraries(&self) -> &Libraries {
        self.libraries
    }

    pub fn properties(&self) -> &dyn PropertyResolver {
        self.properties
    }
}

/// Result of evaluating a single [Condition].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConditionOutcome {
    pub matched: bool,
    pub message: String,
}

impl ConditionOutcome {
    pub fn matched(message: impl Into<String>) -> Self {
        Self {
            matched: true,
            message: message.into(),
        }
    }

    pub fn no_match(message: impl Into<String>) -> Self {
        Self {
            matched: false,
            message: message.into(),
        }
    }
}

/// A single registration predicate with a description for diagnostics.
pub struct Condition {
    description: String,
    predicate: Box<dyn Fn(&ConditionContext) -> ConditionOutcome + Send + Sync>,
}

impl Condition {
    pub fn new(
        description: impl Into<String>,
        predicate: impl Fn(&ConditionContext) -> ConditionOutcome + Send + Sync + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            predicate: Box::new(predicate),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn evaluate(&self, context: &ConditionContext) -> ConditionOutcome {
        (self.predicate)(context)
    }
}

impl Debug for Condition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("description", &self.description)
            .finish()
    }
}

/// Matches if given library is provided.
pub fn on_library(library: &str) -> Condition {
    let library = library.to_string();
    Condition::new(format!("library '{library}' provided"), move |context| {
        if context.libraries().contains(&library) {
            ConditionOutcome::matched(format!("library '{library}' is provided"))
        } else {
            ConditionOutcome::no_match(format!("library '{library}' is not provided"))
        }
    })
}

/// Matches if any of given libraries is provided.
pub fn on_any_library(libraries: &[&str]) -> Condition {
    let libraries: Vec<String> = libraries.iter().map(|library| library.to_string()).collect();
    Condition::new(
        format!("any of libraries {libraries:?} provided"),
        move |context| {
            match libraries
                .iter()
                .find(|library| context.libraries().contains(library))
            {
                Some(library) => {
                    ConditionOutcome::matched(format!("library '{library}' is provided"))
                }
                None => {
                    ConditionOutcome::no_match(format!("none of {libraries:?} are provided"))
                }
            }
        },
    )
}

/// Matches if given library is not provided.
pub fn on_missing_library(library: &str) -> Condition {
    let library = library.to_string();
    Condition::new(format!("library '{library}' missing"), move |context| {
        if context.libraries().contains(&library) {
            ConditionOutcome::no_match(format!("library '{library}' is provided"))
        } else {
            ConditionOutcome::matched(format!("library '{library}' is not provided"))
        }
    })
}

/// Matches if an instance of given type is already registered.
pub fn on_service<T: Any>() -> Condition {
    Condition::new(
        format!("service {} registered", type_name::<T>()),
        |context| {
            if context.registry().is_registered(TypeId::of::<T>()) {
                ConditionOutcome::matched(format!("service {} is registered", type_name::<T>()))
            } else {
                ConditionOutcome::no_match(format!("service {} is not registered", type_name::<T>()))
            }
        },
    )
}

/// Matches if no instance of given type is registered yet.
pub fn on_missing_service<T: Any>() -> Condition {
    Condition::new(
        format!("service {} missing", type_name::<T>()),
        |context| {
            if context.registry().is_registered(TypeId::of::<T>()) {
                ConditionOutcome::no_match(format!("service {} is registered", type_name::<T>()))
            } else {
                ConditionOutcome::matched(format!("service {} is not registered", type_name::<T>()))
            }
        },
    )
}

/// Matches if no service is registered under given name.
pub fn on_missing_service_name(name: &str) -> Condition {
    let name = name.to_string();
    Condition::new(format!("service name '{name}' missing"), move |context| {
        if context.registry().is_name_registered(&name) {
            ConditionOutcome::no_match(format!("service name '{name}' is registered"))
        } else {
            ConditionOutcome::matched(format!("service name '{name}' is not registered"))
        }
    })
}

/// Matches if given property has the expected value, comparing case-insensitively.
pub fn on_property(key: &str, expected: &str) -> Condition {
    property_condition(key, expected, false)
}

/// Like [on_property], but also matches when the property is absent.
pub fn on_property_or_missing(key: &str, expected: &str) -> Condition {
    property_condition(key, expected, true)
}

/// Matches if given property is set to any value.
pub fn on_property_present(key: &str) -> Condition {
    let key = key.to_string();
    Condition::new(format!("property '{key}' present"), move |context| {
        if context.properties().property(&key).is_some() {
            ConditionOutcome::matched(format!("property '{key}' is set"))
        } else {
            ConditionOutcome::no_match(format!("property '{key}' is not set"))
        }
    })
}

/// Matches unless given property is set to the rejected value (case-insensitively); an absent
/// property matches.
pub fn on_property_not(key: &str, rejected: &str) -> Condition {
    let key = key.to_string();
    let rejected = rejected.to_string();
    Condition::new(
        format!("property '{key}' not equal to '{rejected}'"),
        move |context| match context.properties().property(&key) {
            Some(value) if value.eq_ignore_ascii_case(&rejected) => {
                ConditionOutcome::no_match(format!("property '{key}' is set to '{value}'"))
            }
            Some(value) => {
                ConditionOutcome::matched(format!("property '{key}' is set to '{value}'"))
            }
            None => ConditionOutcome::matched(format!("property '{key}' is not set")),
        },
    )
}

fn property_condition(key: &str, expected: &str, match_if_missing: bool) -> Condition {
    let key = key.to_string();
    let expected = expected.to_string();
    Condition::new(
        format!("property '{key}' equal to '{expected}'"),
        move |context| match context.properties().property(&key) {
            Some(value) if value.eq_ignore_ascii_case(&expected) => {
                ConditionOutcome::matched(format!("property '{key}' is set to '{value}'"))
            }
            Some(value) => ConditionOutcome::no_match(format!(
                "property '{key}' is set to '{value}', expected '{expected}'"
            )),
            None if match_if_missing => {
                ConditionOutcome::matched(format!("property '{key}' is not set"))
            }
            None => ConditionOutcome::no_match(format!("property '{key}' is not set")),
        },
    )
}

#[cfg(test)]
mod tests {
    use crate::autoconfigure::conditions::{
        on_any_library, on_library, on_missing_service, on_missing_service_name, on_property,
        on_property_not, on_property_or_missing, on_property_present, on_service,
        ConditionContext, Libraries,
    };
    use crate::environment::MockPropertyResolver;
    use crate::service_registry::MockServiceRegistryFacade;
    use mockall::predicate::*;
    use mockall::Sequence;
    use std::any::TypeId;

    struct TestService;

    #[test]
    fn should_check_for_service_existence() {
        let mut seq = Sequence::new();

        let mut registry = MockServiceRegistryFacade::new();
        registry
            .expect_is_registered()
            .with(eq(TypeId::of::<TestService>()))
            .times(2)
            .in_sequence(&mut seq)
            .return_const(true);
        registry
            .expect_is_registered()
            .with(eq(TypeId::of::<TestService>()))
            .times(2)
            .in_sequence(&mut seq)
            .return_const(false);

        let libraries = Libraries::default();
        let properties = MockPropertyResolver::new();
        let context = ConditionContext::new(&registry, &libraries, &properties);

        assert!(on_service::<TestService>().evaluate(&context).matched);
        assert!(!on_missing_service::<TestService>().evaluate(&context).matched);
        assert!(!on_service::<TestService>().evaluate(&context).matched);
        assert!(on_missing_service::<TestService>().evaluate(&context).matched);
    }

    #[test]
    fn should_check_for_service_name_existence() {
        let mut registry = MockServiceRegistryFacade::new();
        registry
            .expect_is_name_registered()
            .with(eq("data-source"))
            .times(1)
            .return_const(true);
        registry
            .expect_is_name_registered()
            .with(eq("cache-manager"))
            .times(1)
            .return_const(false);

        let libraries = Libraries::default();
        let properties = MockPropertyResolver::new();
        let context = ConditionContext::new(&registry, &libraries, &properties);

        assert!(!on_missing_service_name("data-source").evaluate(&context).matched);
        assert!(on_missing_service_name("cache-manager").evaluate(&context).matched);
    }

    #[test]
    fn should_check_for_library_presence() {
        let registry = MockServiceRegistryFacade::new();
        let properties = MockPropertyResolver::new();
        let libraries = Libraries::default().with("deadpool").with("redis");
        let context = ConditionContext::new(&registry, &libraries, &properties);

        assert!(on_library("deadpool").evaluate(&context).matched);
        assert!(!on_library("mobc").evaluate(&context).matched);
        assert!(on_any_library(&["mobc", "redis"]).evaluate(&context).matched);
        assert!(!on_any_library(&["mobc", "lettre"]).evaluate(&context).matched);
    }

    #[test]
    fn should_check_property_values_case_insensitively() {
        let registry = MockServiceRegistryFacade::new();
        let libraries = Libraries::default();
        let mut properties = MockPropertyResolver::new();
        properties
            .expect_property()
            .with(eq("cache.type"))
            .returning(|_| Some("REDIS".to_string()));
        properties
            .expect_property()
            .with(eq("cache.ttl"))
            .returning(|_| None);

        let context = ConditionContext::new(&registry, &libraries, &properties);

        assert!(on_property("cache.type", "redis").evaluate(&context).matched);
        assert!(!on_property("cache.type", "moka").evaluate(&context).matched);
        assert!(!on_property("cache.ttl", "60s").evaluate(&context).matched);
        assert!(on_property_or_missing("cache.ttl", "60s").evaluate(&context).matched);
        assert!(on_property_present("cache.type").evaluate(&context).matched);
        assert!(!on_property_present("cache.ttl").evaluate(&context).matched);
        assert!(!on_property_not("cache.type", "redis").evaluate(&context).matched);
        assert!(on_property_not("cache.type", "none").evaluate(&context).matched);
        assert!(on_property_not("cache.ttl", "none").evaluate(&context).matched);
    }
}
