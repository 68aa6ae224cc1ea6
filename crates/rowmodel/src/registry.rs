//! The registry: the context every factory is created in.
//!
//! A [`Registry`] owns the shared [`RowStore`], the object attribute type
//! table and every registered [`Factory`]. Factories hold a weak reference
//! back and look up remote models by name when an association is used.

use crate::codec::ObjectAttrType;
use crate::factory::Factory;
use crate::options::ModelOptions;
use crate::sanitize::Sanitizer;
use rowmodel_core::{Error, Result, RowStore};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, ThreadId};

/// Model and type registry bound to one store.
pub struct Registry {
    store: Arc<dyn RowStore>,
    factories: RwLock<HashMap<String, Arc<Factory>>>,
    types: RwLock<HashMap<String, Arc<dyn ObjectAttrType>>>,
    sanitizer: Arc<Sanitizer>,
    /// Thread owning the open transaction and its nesting depth; only
    /// the outermost call touches the store.
    tx: Mutex<TxState>,
    tx_done: Condvar,
}

#[derive(Debug, Default)]
struct TxState {
    owner: Option<ThreadId>,
    depth: usize,
}

/// Leaves one level of `Registry::transaction`, even on unwind.
struct TxLevel<'a> {
    registry: &'a Registry,
}

impl Drop for TxLevel<'_> {
    fn drop(&mut self) {
        let mut state = self.registry.tx_state();
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            state.owner = None;
            self.registry.tx_done.notify_all();
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut models: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        models.sort();
        f.debug_struct("Registry")
            .field("models", &models)
            .field("sanitizer", &self.sanitizer)
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Create a registry over `store` with the default markdown safelist.
    pub fn new(store: Arc<dyn RowStore>) -> Arc<Self> {
        Self::with_sanitizer(store, Sanitizer::default())
    }

    /// Create a registry whose markdown columns keep only `tags`.
    pub fn with_markdown_safelist<I, S>(store: Arc<dyn RowStore>, tags: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_sanitizer(store, Sanitizer::new(tags))
    }

    fn with_sanitizer(store: Arc<dyn RowStore>, sanitizer: Sanitizer) -> Arc<Self> {
        Arc::new(Self {
            store,
            factories: RwLock::new(HashMap::new()),
            types: RwLock::new(HashMap::new()),
            sanitizer: Arc::new(sanitizer),
            tx: Mutex::new(TxState::default()),
            tx_done: Condvar::new(),
        })
    }

    pub fn store(&self) -> &Arc<dyn RowStore> {
        &self.store
    }

    pub fn sanitizer(&self) -> &Arc<Sanitizer> {
        &self.sanitizer
    }

    /// Make an object attribute type available to model definitions.
    /// A later registration under the same id replaces the earlier one.
    pub fn register_object_type(&self, ty: Arc<dyn ObjectAttrType>) {
        let id = ty.id().to_string();
        tracing::debug!(type_id = %id, "Registering object attribute type");
        self.types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, ty);
    }

    pub fn object_type(&self, id: &str) -> Option<Arc<dyn ObjectAttrType>> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Build and register the factory for a model.
    ///
    /// Reads the table schema once. Fails with a `Config` error for bad
    /// options or a model registered twice, and with a `Schema` error when
    /// the table does not exist.
    pub fn register(self: &Arc<Self>, options: ModelOptions) -> Result<Arc<Factory>> {
        if self.contains(&options.name) {
            return Err(Error::config(options.name, "model is already registered"));
        }
        let factory = Arc::new(Factory::construct(self, options)?);

        let mut factories = self
            .factories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if factories.contains_key(factory.name()) {
            return Err(Error::config(factory.name(), "model is already registered"));
        }
        factories.insert(factory.name().to_string(), Arc::clone(&factory));
        tracing::debug!(
            model = factory.name(),
            table = factory.table(),
            columns = factory.columns().len(),
            "Registered model"
        );
        Ok(factory)
    }

    /// Is a model of this name registered?
    pub fn contains(&self, model: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(model)
    }

    /// Look up a registered model.
    pub fn factory(&self, model: &str) -> Result<Arc<Factory>> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model)
            .cloned()
            .ok_or_else(|| Error::config(model, "model is not registered"))
    }

    /// Names of all registered models, sorted.
    pub fn models(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn tx_state(&self) -> MutexGuard<'_, TxState> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `action` in a store transaction.
    ///
    /// Calls nested inside an open transaction on the same thread run
    /// directly as part of it; the outermost call commits, or rolls back on
    /// any error. Other threads wait until the open transaction ends.
    pub fn transaction<T>(&self, action: impl FnOnce() -> Result<T>) -> Result<T> {
        let me = thread::current().id();
        let outermost = {
            let mut state = self.tx_state();
            if state.owner == Some(me) {
                state.depth += 1;
                false
            } else {
                while state.owner.is_some() {
                    state = self
                        .tx_done
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                state.owner = Some(me);
                state.depth = 1;
                true
            }
        };
        let _level = TxLevel { registry: self };
        if outermost {
            rowmodel_core::transaction(self.store.as_ref(), action)
        } else {
            action()
        }
    }

    /// Is a transaction opened through this registry in progress?
    pub fn in_transaction(&self) -> bool {
        self.tx_state().owner.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowmodel_memory::MemoryStore;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_nested_transaction_joins_outer() {
        let registry = Registry::new(Arc::new(MemoryStore::new()));
        let depth = registry
            .transaction(|| {
                registry.transaction(|| Ok(registry.tx_state().depth))
            })
            .unwrap();
        assert_eq!(depth, 2);
        assert!(!registry.in_transaction());
    }

    #[test]
    fn test_other_threads_wait_for_the_open_transaction() {
        let registry = Registry::new(Arc::new(MemoryStore::new()));
        let (started, start) = mpsc::channel();
        let other = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                start.recv().ok();
                registry.transaction(|| Ok(registry.tx_state().depth))
            })
        };

        registry
            .transaction(|| {
                started.send(()).ok();
                thread::sleep(Duration::from_millis(50));
                assert!(!other.is_finished());
                Ok(())
            })
            .unwrap();

        assert_eq!(other.join().unwrap().unwrap(), 1);
        assert!(!registry.in_transaction());
    }
}
