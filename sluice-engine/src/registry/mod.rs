//! Operator registry
//!
//! Name -> implementation table resolved at runtime, so pipeline configs
//! can reference operators the engine never statically imported. Entries
//! are either direct factory handles or deferred module locations loaded
//! on first resolve and cached per entry.
//!
//! Lifecycle: populated once at process start (registration plus an
//! optional search-root walk), then read-mostly. Resolution after warm-up
//! takes a read lock on the table and a per-entry lock for the one-time
//! load, so concurrent readers never serialize on a global lock.

pub mod loader;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, info};

use crate::operator::OperatorFactory;
use crate::registry::loader::{LoaderError, OperatorLoader, OperatorLocation};

/// Errors from registration and resolution
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("operator '{0}' is already registered with a different implementation")]
    DuplicateRegistration(String),

    #[error("no operator registered under '{0}'")]
    OperatorNotFound(String),

    #[error("failed to load operator '{name}': {source}")]
    Load {
        name: String,
        #[source]
        source: LoaderError,
    },
}

/// What a name is registered to
#[derive(Clone)]
pub enum RegistryEntry {
    /// A ready-made factory
    Handle(Arc<dyn OperatorFactory>),
    /// A module location to load on first resolve
    Deferred(OperatorLocation),
}

impl RegistryEntry {
    /// Whether two entries denote the same implementation
    ///
    /// Handles compare by pointer identity, locations by value.
    fn same_as(&self, other: &RegistryEntry) -> bool {
        match (self, other) {
            (RegistryEntry::Handle(a), RegistryEntry::Handle(b)) => Arc::ptr_eq(a, b),
            (RegistryEntry::Deferred(a), RegistryEntry::Deferred(b)) => a == b,
            _ => false,
        }
    }
}

struct Slot {
    entry: RegistryEntry,
    /// One-time load result for deferred entries
    cached: RwLock<Option<Arc<dyn OperatorFactory>>>,
}

/// Process-wide operator name table
pub struct Registry {
    slots: RwLock<HashMap<String, Arc<Slot>>>,
    loader: Arc<dyn OperatorLoader>,
}

impl Registry {
    pub fn new(loader: Arc<dyn OperatorLoader>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            loader,
        }
    }

    /// Registers `entry` under `name`
    ///
    /// Re-registering an identical entry is a no-op. A different entry
    /// fails with `DuplicateRegistration` unless `force` is set.
    pub fn register(
        &self,
        name: impl Into<String>,
        entry: RegistryEntry,
        force: bool,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        let mut slots = self.slots.write().unwrap();

        if let Some(existing) = slots.get(&name) {
            if existing.entry.same_as(&entry) {
                debug!("Operator '{}' re-registered identically, ignoring", name);
                return Ok(());
            }
            if !force {
                return Err(RegistryError::DuplicateRegistration(name));
            }
        }

        debug!("Registered operator '{}'", name);
        slots.insert(
            name,
            Arc::new(Slot {
                entry,
                cached: RwLock::new(None),
            }),
        );
        Ok(())
    }

    /// Registers a direct factory handle
    pub fn register_factory(
        &self,
        name: impl Into<String>,
        factory: Arc<dyn OperatorFactory>,
        force: bool,
    ) -> Result<(), RegistryError> {
        self.register(name, RegistryEntry::Handle(factory), force)
    }

    /// Walks `roots` once and registers a deferred location for every
    /// module the loader discovers, keyed by the final path segment
    pub fn populate(&self, roots: &[std::path::PathBuf]) -> Result<usize, RegistryError> {
        let discovered = self.loader.discover(roots);
        let count = discovered.len();

        for location in discovered {
            let name = location.leaf_name().to_string();
            self.register(name, RegistryEntry::Deferred(location), false)?;
        }

        info!("Registry warm-up discovered {} operator module(s)", count);
        Ok(count)
    }

    /// Resolves `name` to a runnable factory
    ///
    /// Deferred locations are loaded once and cached; later resolves hit
    /// the cache under a read lock.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn OperatorFactory>, RegistryError> {
        let slot = {
            let slots = self.slots.read().unwrap();
            slots
                .get(name)
                .cloned()
                .ok_or_else(|| RegistryError::OperatorNotFound(name.to_string()))?
        };

        match &slot.entry {
            RegistryEntry::Handle(factory) => Ok(factory.clone()),
            RegistryEntry::Deferred(location) => {
                if let Some(factory) = slot.cached.read().unwrap().as_ref() {
                    return Ok(factory.clone());
                }

                let loaded =
                    self.loader
                        .load(name, location)
                        .map_err(|source| RegistryError::Load {
                            name: name.to_string(),
                            source,
                        })?;

                let mut cached = slot.cached.write().unwrap();
                // A concurrent resolve may have won the race; keep its result.
                if let Some(factory) = cached.as_ref() {
                    return Ok(factory.clone());
                }
                debug!("Loaded operator '{}' from {}", name, location.module);
                *cached = Some(loaded.clone());
                Ok(loaded)
            }
        }
    }

    /// Registered names, mainly for diagnostics
    pub fn names(&self) -> Vec<String> {
        let slots = self.slots.read().unwrap();
        let mut names: Vec<String> = slots.keys().cloned().collect();
        names.sort();
        names
    }
}
