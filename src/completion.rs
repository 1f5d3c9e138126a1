use crate::error::{Error, Result};
use core::fmt;

/// A single-shot callback for an asynchronous result.
///
/// Collaborators may complete synchronously (before `load` returns) or later, from any thread.
/// Callers must not assume either.
pub struct Completion<T>(Box<dyn FnOnce(Result<T>) + Send>);

impl<T> Completion<T> {
    pub fn new<F: 'static + FnOnce(Result<T>) + Send>(f: F) -> Self {
        Completion(Box::new(f))
    }

    pub fn complete(self, result: Result<T>) {
        (self.0)(result)
    }

    pub fn ok(self, value: T) {
        self.complete(Ok(value))
    }

    pub fn fail(self, error: Error) {
        self.complete(Err(error))
    }

    /// Returns a completion that transforms the result before passing it on.
    pub fn map<U, F>(self, f: F) -> Completion<U>
    where
        T: 'static,
        U: 'static,
        F: 'static + FnOnce(U) -> Result<T> + Send,
    {
        Completion::new(move |result: Result<U>| self.complete(result.and_then(f)))
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Completion<{}>", core::any::type_name::<T>())
    }
}
