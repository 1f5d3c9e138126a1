//! Creating views by name.

use crate::completion::Completion;
use crate::error::Error;
use crate::view::{BaseView, View};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Produces views by name.
///
/// Implementations may complete synchronously or later, from any thread.
pub trait ViewLoader: Send + Sync {
    fn load(&self, name: &str, done: Completion<Box<dyn View>>);
}

pub type Constructor = Arc<dyn Fn() -> Box<dyn View> + Send + Sync>;

/// A view loader backed by registered constructors.
///
/// `"View"` is registered as [`BaseView`] from the start.
#[derive(Clone)]
pub struct Registry {
    constructors: HashMap<String, Constructor>,
}

impl core::fmt::Debug for Registry {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let mut names: Vec<_> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("Registry").field("views", &names).finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

impl Registry {
    pub fn new() -> Registry {
        let mut registry = Registry {
            constructors: HashMap::new(),
        };
        registry.register("View", || Box::new(BaseView));
        registry
    }

    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: 'static + Fn() -> Box<dyn View> + Send + Sync,
    {
        self.constructors.insert(name.to_string(), Arc::new(constructor));
    }

    pub fn with<F>(mut self, name: &str, constructor: F) -> Self
    where
        F: 'static + Fn() -> Box<dyn View> + Send + Sync,
    {
        self.register(name, constructor);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }
}

impl ViewLoader for Registry {
    fn load(&self, name: &str, done: Completion<Box<dyn View>>) {
        match self.constructors.get(name) {
            Some(constructor) => {
                trace!(view = name, "constructing view");
                done.ok(constructor())
            }
            None => done.fail(Error::NotFound(format!("view {}", name))),
        }
    }
}
