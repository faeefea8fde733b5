//! Registry of constructed service instances. The registry is populated on the single startup
//! thread, either explicitly by the host application or by
//! [AutoConfigurations](crate::autoconfigure::AutoConfiguration), and is read-only afterwards.

use derivative::Derivative;
use fxhash::FxHashMap;
#[cfg(test)]
use mockall::automock;
use std::any::{type_name, Any, TypeId};
use std::sync::Arc;
use thiserror::Error;

/// Pointer type for shared service instances.
pub type ServiceInstancePtr<T> = Arc<T>;

/// Type-erased service instance pointer.
pub type ServiceInstanceAnyPtr = Arc<dyn Any + Send + Sync>;

/// Errors related to registering and retrieving services.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ServiceRegistryError {
    #[error("Attempted to register a duplicate service name: {0}")]
    DuplicateServiceName(String),
    #[error("No service instance registered for type {type_name}")]
    NoInstance { type_name: &'static str },
    #[error("Cannot find service named: {0}")]
    NoNamedInstance(String),
    #[error("Multiple service instances registered for type {type_name}: {names:?}")]
    AmbiguousInstance {
        type_name: &'static str,
        names: Vec<String>,
    },
    #[error("Service '{name}' cannot be downcast to {type_name}")]
    IncompatibleInstance {
        name: String,
        type_name: &'static str,
    },
}

/// A read-only facade of a [ServiceRegistry] safe to use in registration conditions.
#[cfg_attr(test, automock)]
pub trait ServiceRegistryFacade {
    /// Checks if an instance of given type is present in this registry.
    fn is_registered(&self, target: TypeId) -> bool;

    /// Checks if there's an instance registered under given name.
    fn is_name_registered(&self, name: &str) -> bool;
}

#[derive(Derivative, Clone)]
#[derivative(Debug)]
struct ServiceEntry {
    name: String,
    type_name: &'static str,
    #[derivative(Debug = "ignore")]
    instance: ServiceInstanceAnyPtr,
}

/// Registry mapping service types and names to constructed instances. Each instance is registered
/// under a unique name; multiple instances of the same type may coexist, in which case requesting
/// a single instance reports an ambiguity.
#[derive(Clone, Debug, Default)]
pub struct ServiceRegistry {
    entries: Vec<ServiceEntry>,
    by_type: FxHashMap<TypeId, Vec<usize>>,
    by_name: FxHashMap<String, usize>,
}

impl ServiceRegistry {
    /// Registers an instance under given name, returning a shared pointer to it. Duplicate names
    /// are rejected.
    pub fn register<T: Any + Send + Sync>(
        &mut self,
        name: impl Into<String>,
        instance: T,
    ) -> Result<ServiceInstancePtr<T>, ServiceRegistryError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(ServiceRegistryError::DuplicateServiceName(name));
        }

        let instance = Arc::new(instance);
        let index = self.entries.len();
        self.entries.push(ServiceEntry {
            name: name.clone(),
            type_name: type_name::<T>(),
            instance: instance.clone() as ServiceInstanceAnyPtr,
        });
        self.by_type.entry(TypeId::of::<T>()).or_default().push(index);
        self.by_name.insert(name, index);

        Ok(instance)
    }

    /// Returns the single registered instance of given type.
    pub fn instance<T: Any + Send + Sync>(
        &self,
    ) -> Result<ServiceInstancePtr<T>, ServiceRegistryError> {
        let indices =
            self.by_type
                .get(&TypeId::of::<T>())
                .ok_or(ServiceRegistryError::NoInstance {
                    type_name: type_name::<T>(),
                })?;

        match indices.as_slice() {
            [index] => self.downcast_entry(*index),
            indices => Err(ServiceRegistryError::AmbiguousInstance {
                type_name: type_name::<T>(),
                names: indices
                    .iter()
                    .map(|index| self.entries[*index].name.clone())
                    .collect(),
            }),
        }
    }

    /// Returns all registered instances of given type, in registration order.
    pub fn instances<T: Any + Send + Sync>(&self) -> Vec<ServiceInstancePtr<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|index| self.downcast_entry(*index).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the instance registered under given name.
    pub fn instance_by_name<T: Any + Send + Sync>(
        &self,
        name: &str,
    ) -> Result<ServiceInstancePtr<T>, ServiceRegistryError> {
        let index = self
            .by_name
            .get(name)
            .ok_or_else(|| ServiceRegistryError::NoNamedInstance(name.to_string()))?;
        self.downcast_entry(*index)
    }

    /// Checks if an instance of given type is registered.
    pub fn contains<T: Any>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }

    /// Names of all registered services, in registration order.
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn downcast_entry<T: Any + Send + Sync>(
        &self,
        index: usize,
    ) -> Result<ServiceInstancePtr<T>, ServiceRegistryError> {
        let entry = &self.entries[index];
        entry.instance.clone().downcast::<T>().map_err(|_| {
            ServiceRegistryError::IncompatibleInstance {
                name: entry.name.clone(),
                type_name: type_name::<T>(),
            }
        })
    }
}

impl ServiceRegistryFacade for ServiceRegistry {
    #[inline]
    fn is_registered(&self, target: TypeId) -> bool {
        self.by_type.contains_key(&target)
    }

    #[inline]
    fn is_name_registered(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}
