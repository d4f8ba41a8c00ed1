//! Constructor lookup for backends, fixed once the registry is built.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::Backend;
use crate::config::DbConfig;
use crate::error::{Error, Result};

/// Creates backend instances, one per connection.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Name the factory is registered under (e.g. `mysql`).
    fn name(&self) -> &'static str;

    async fn create(&self, config: &DbConfig) -> Result<Box<dyn Backend>>;
}

/// Immutable mapping from backend name to factory.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: BTreeMap<&'static str, Arc<dyn BackendFactory>>,
}

impl BackendRegistry {
    /// Build a registry, rejecting two factories with the same name.
    pub fn new(factories: Vec<Arc<dyn BackendFactory>>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for factory in factories {
            let name = factory.name();
            if map.insert(name, factory).is_some() {
                return Err(Error::Config(format!("duplicate backend '{name}'")));
            }
        }
        Ok(Self { factories: map })
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn BackendFactory>> {
        self.factories.get(name).cloned().ok_or_else(|| {
            Error::Config(format!(
                "unsupported backend '{name}', available: {}",
                self.names().join(", ")
            ))
        })
    }

    /// Create a backend for the kind selected in `config`.
    pub async fn create(&self, config: &DbConfig) -> Result<Box<dyn Backend>> {
        self.get(&config.kind)?.create(config).await
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("factories", &self.names())
            .finish()
    }
}
