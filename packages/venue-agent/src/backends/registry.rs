//! Name-keyed collection of the backends a run drives.

use indexmap::IndexMap;

use crate::traits::backend::Backend;

/// Backends keyed by [`Backend::name`], in registration order.
///
/// Registering a second backend under a name already present replaces the
/// first one.
#[derive(Default)]
pub struct BackendRegistry {
    backends: IndexMap<String, Box<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend, replacing any with the same name.
    pub fn register(&mut self, backend: Box<dyn Backend>) {
        let name = backend.name().to_string();
        if self.backends.insert(name.clone(), backend).is_some() {
            tracing::warn!(backend = %name, "replaced backend registered under the same name");
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, backend: impl Backend + 'static) -> Self {
        self.register(Box::new(backend));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Backend> {
        self.backends.get(name).map(|b| b.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Hand every backend over to the runner.
    pub fn into_backends(self) -> Vec<Box<dyn Backend>> {
        self.backends.into_values().collect()
    }
}
