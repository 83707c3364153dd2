use std::{fmt, sync::Arc};

use parking_lot::{const_mutex, Mutex};

/// Code run at the end of every cleanup, e.g. by a switch implementation that keeps state
/// of its own.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

static GLOBAL: CallbackRegistry = CallbackRegistry::new();

/// Registers `callback` with the process-wide registry used by [`Cleanup`](crate::Cleanup)
/// unless another one is configured. Returns `false` if it was already registered.
pub fn register_cleanup_callback(callback: Callback) -> bool {
    GLOBAL.register(callback)
}

/// An ordered set of callbacks. Identity is the `Arc`'s allocation, so registering a clone
/// of a registered callback does nothing.
pub struct CallbackRegistry {
    callbacks: Mutex<Vec<Callback>>,
}

impl CallbackRegistry {
    pub const fn new() -> Self {
        Self { callbacks: const_mutex(Vec::new()) }
    }

    /// The process-wide registry.
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    pub fn register(&self, callback: Callback) -> bool {
        let mut callbacks = self.callbacks.lock();
        if callbacks.iter().any(|registered| Arc::ptr_eq(registered, &callback)) {
            return false;
        }

        callbacks.push(callback);
        true
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every callback in registration order and returns how many ran. The registry
    /// is not locked while they run, so a callback may register others; those run next
    /// time.
    pub fn run_all(&self) -> usize {
        let callbacks = self.callbacks.lock().clone();
        for callback in &callbacks {
            callback();
        }
        callbacks.len()
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry").field("callbacks", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn registration_is_deduplicated_by_identity() {
        let registry = CallbackRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first: Callback = {
            let order = order.clone();
            Arc::new(move || order.lock().push("first"))
        };
        let second: Callback = {
            let order = order.clone();
            Arc::new(move || order.lock().push("second"))
        };

        assert!(registry.register(first.clone()));
        assert!(registry.register(second));
        assert!(!registry.register(first));
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.run_all(), 2);
        assert_eq!(*order.lock(), ["first", "second"]);
    }

    #[test]
    fn callbacks_may_register_more() {
        let registry = Arc::new(CallbackRegistry::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let late: Callback = {
            let runs = runs.clone();
            Arc::new(move || {
                runs.fetch_add(1, Ordering::SeqCst);
            })
        };
        let registering: Callback = {
            let registry = registry.clone();
            Arc::new(move || {
                registry.register(late.clone());
            })
        };
        registry.register(registering);

        assert_eq!(registry.run_all(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(registry.run_all(), 2);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
