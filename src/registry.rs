// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Named lookup of callbacks and services used while attaching a consumer's
//! event pipeline.

use crate::events::{AggregateListener, Callback, EventLogger};
use std::{collections::HashMap, sync::Arc};

/// Name → shared entry map exposing only `has`/`get`.
pub struct Registry<T: ?Sized> {
    entries: HashMap<String, Arc<T>>,
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Registry {
            entries: HashMap::default(),
        }
    }
}

impl<T: ?Sized> Registry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Registry::default()
    }

    /// Registers `entry` under `name`, replacing any previous entry.
    ///
    /// # Parameters
    /// * `name` - The name specs refer to
    /// * `entry` - The shared callback or service
    ///
    /// # Returns
    /// Self for method chaining
    pub fn register(mut self, name: &str, entry: Arc<T>) -> Self {
        self.entries.insert(name.to_owned(), entry);
        self
    }

    /// Reports whether anything is registered under `name`.
    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns the entry registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name).cloned()
    }
}

/// A service that can be referenced by name from a consumer spec.
#[derive(Clone)]
pub enum Service {
    Logger(Arc<dyn EventLogger>),
    Listener(Arc<dyn AggregateListener>),
}

/// Callbacks referenced by `callback`, `flush_callback` and `error_callback`.
pub type CallbackRegistry = Registry<Callback>;

/// Loggers and listeners referenced by `logger` and `listeners`.
pub type ServiceRegistry = Registry<Service>;

impl ServiceRegistry {
    /// Returns `name` only when it is registered as a logger.
    pub fn logger(&self, name: &str) -> Option<Arc<dyn EventLogger>> {
        match self.get(name).as_deref() {
            Some(Service::Logger(logger)) => Some(logger.clone()),
            _ => None,
        }
    }

    /// Returns `name` only when it is registered as a listener.
    pub fn listener(&self, name: &str) -> Option<Arc<dyn AggregateListener>> {
        match self.get(name).as_deref() {
            Some(Service::Listener(listener)) => Some(listener.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{callback, TracingLogger};

    #[test]
    fn callbacks_are_looked_up_by_name() {
        let registry = CallbackRegistry::new().register("noop", callback(|_| Ok(())));

        assert!(registry.has("noop"));
        assert!(registry.get("noop").is_some());
        assert!(!registry.has("other"));
        assert!(registry.get("other").is_none());
    }

    #[test]
    fn services_are_typed_on_lookup() {
        let registry = ServiceRegistry::new().register(
            "log",
            Arc::new(Service::Logger(Arc::new(TracingLogger))),
        );

        assert!(registry.logger("log").is_some());
        assert!(registry.listener("log").is_none());
    }
}
