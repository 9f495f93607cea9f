//! Handler instance registry.
//!
//! Routes name the component type their handler is a method of. At invocation time the
//! dispatcher asks an [`InstanceProvider`] for the live instance of that type; how the
//! instance was built (and whether it is shared) is the provider's business.
//! [`Components`] is the simple map-backed provider used by the binary and the tests.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Supplies handler owners by type
pub trait InstanceProvider: Send + Sync {
    fn instance(&self, type_id: TypeId) -> Option<Arc<dyn Any + Send + Sync>>;
}

/// Type-keyed instance map
#[derive(Default)]
pub struct Components {
    instances: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    names: Vec<&'static str>,
}

impl Components {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `component` as the instance for its type, replacing any earlier one.
    pub fn register<C: Any + Send + Sync>(&mut self, component: C) -> &mut Self {
        self.register_shared(Arc::new(component))
    }

    /// Register an already shared instance.
    pub fn register_shared<C: Any + Send + Sync>(&mut self, component: Arc<C>) -> &mut Self {
        let previous = self.instances.insert(TypeId::of::<C>(), component);
        if previous.is_none() {
            self.names.push(type_name::<C>());
        }
        info!(
            component = type_name::<C>(),
            replaced = previous.is_some(),
            "Component registered"
        );
        self
    }

    /// Typed access to a registered instance
    #[must_use]
    pub fn get<C: Any + Send + Sync>(&self) -> Option<Arc<C>> {
        let any = Arc::clone(self.instances.get(&TypeId::of::<C>())?);
        any.downcast::<C>().ok()
    }

    /// Type names in registration order
    #[must_use]
    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl InstanceProvider for Components {
    fn instance(&self, type_id: TypeId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.instances.get(&type_id).map(Arc::clone)
    }
}
