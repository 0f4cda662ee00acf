//! Dependency scope: per-request resolution of module implementations and
//! request-scoped values.
//!
//! A [`ServiceRegistry`] is configured once at startup with singleton
//! instances and scoped factories. Each request gets its own [`Scope`],
//! which creates scoped instances lazily, caches them for the rest of the
//! request and releases everything when it is dropped.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;
use uuid::Uuid;

type Erased = Box<dyn Any + Send + Sync>;
type ScopedFactory = Box<dyn Fn(&Scope) -> Erased + Send + Sync>;

enum Registration {
    Singleton(Erased),
    Scoped(ScopedFactory),
}

/// Registrations keyed by the type they resolve to.
///
/// Types may be unsized, so module contracts resolve as trait objects:
/// `registry.singleton::<dyn Calculator>(Arc::new(Impl))`.
#[derive(Default)]
pub struct ServiceRegistry {
    registrations: HashMap<TypeId, Registration>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one instance shared by every scope.
    pub fn singleton<T>(&mut self, instance: Arc<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.registrations
            .insert(TypeId::of::<T>(), Registration::Singleton(Box::new(instance)));
        self
    }

    /// Register a factory run at most once per scope.
    ///
    /// The factory receives the scope so it can resolve its own dependencies,
    /// including the current [`RequestContext`](crate::RequestContext).
    pub fn scoped<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Scope) -> Arc<T> + Send + Sync + 'static,
    {
        let factory: ScopedFactory = Box::new(move |scope| Box::new(factory(scope)));
        self.registrations
            .insert(TypeId::of::<T>(), Registration::Scoped(factory));
        self
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.registrations.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

/// Resolution context owned by exactly one request.
pub struct Scope {
    id: Uuid,
    registry: Arc<ServiceRegistry>,
    instances: Mutex<HashMap<TypeId, Erased>>,
}

impl Scope {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self {
            id: Uuid::new_v4(),
            registry,
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Identifier of the request this scope belongs to.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Publish a request-scoped value, shadowing any registration for `T`.
    pub fn provide<T>(&self, value: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.instances.lock().insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn resolve<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = TypeId::of::<T>();
        if let Some(found) = self.lookup::<T>(&key) {
            return Some(found);
        }

        match self.registry.registrations.get(&key)? {
            Registration::Singleton(instance) => instance.downcast_ref::<Arc<T>>().cloned(),
            Registration::Scoped(factory) => {
                // The lock is not held while the factory runs; it may resolve
                // further dependencies from this scope.
                let created = factory(self);
                let instance = created.downcast_ref::<Arc<T>>()?.clone();
                self.instances.lock().entry(key).or_insert(created);
                Some(instance)
            }
        }
    }

    fn lookup<T>(&self, key: &TypeId) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.instances
            .lock()
            .get(key)
            .and_then(|erased| erased.downcast_ref::<Arc<T>>())
            .cloned()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        trace!(scope = %self.id, "scope released");
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("instances", &self.instances.lock().len())
            .finish()
    }
}
