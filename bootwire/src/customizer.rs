//! Post-construction customization callbacks. Customizers allow the host application to mutate a
//! default-constructed service before it is registered, without replacing the whole
//! auto-configuration. They are applied in registration order, exactly once per constructed
//! instance.

use fxhash::FxHashMap;
use std::any::{Any, TypeId};

/// Callback mutating a default-constructed target before registration. A blanket implementation
/// exists for closures, which is the typical way of providing customizers:
///
/// ```
/// use bootwire::customizer::CustomizerRegistry;
///
/// struct Pool {
///     max_size: u32,
/// }
///
/// let mut customizers = CustomizerRegistry::default();
/// customizers.register(|pool: &mut Pool| pool.max_size = 20);
///
/// let mut pool = Pool { max_size: 10 };
/// assert_eq!(1, customizers.apply(&mut pool));
/// assert_eq!(20, pool.max_size);
/// ```
pub trait Customizer<T: ?Sized>: Send + Sync {
    fn customize(&self, target: &mut T);
}

impl<T: ?Sized, F: Fn(&mut T) + Send + Sync> Customizer<T> for F {
    fn customize(&self, target: &mut T) {
        self(target)
    }
}

type ApplyFn = Box<dyn Fn(&mut dyn Any) + Send + Sync>;

/// Ordered lists of customizers, keyed by target type.
#[derive(Default)]
pub struct CustomizerRegistry {
    customizers: FxHashMap<TypeId, Vec<ApplyFn>>,
}

impl CustomizerRegistry {
    /// Registers a customizer for targets of type `T`.
    pub fn register<T: Any>(&mut self, customizer: impl Customizer<T> + 'static) {
        self.customizers
            .entry(TypeId::of::<T>())
            .or_default()
            .push(Box::new(move |target: &mut dyn Any| {
                if let Some(target) = target.downcast_mut::<T>() {
                    customizer.customize(target);
                }
            }));
    }

    /// Applies all customizers registered for `T` to given target, in registration order.
    /// Returns the number of customizers applied.
    pub fn apply<T: Any>(&self, target: &mut T) -> usize {
        self.customizers
            .get(&TypeId::of::<T>())
            .map(|customizers| {
                for customizer in customizers {
                    (customizer)(target);
                }

                customizers.len()
            })
            .unwrap_or(0)
    }

    /// Number of customizers registered for `T`.
    pub fn count<T: Any>(&self) -> usize {
        self.customizers
            .get(&TypeId::of::<T>())
            .map(Vec::len)
            .unwrap_or(0)
    }
}
