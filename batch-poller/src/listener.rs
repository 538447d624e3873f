//! Listener trait and a closure-backed implementation
//!
//! A listener observes one key. The scheduler asks it whether a fetched model
//! is still pending and, once it is not, hands the model to `on_resolved`.

use std::fmt;
use std::sync::Arc;

/// Observer for a single tracked key.
pub trait Listener<K, M>: Send + Sync {
    /// Key this listener is registered under
    fn key(&self) -> K;

    /// Whether the fetched model still describes a pending item
    fn is_pending(&self, model: &M) -> bool;

    /// Called once, when the item leaves the pending state
    fn on_resolved(&self, model: M);
}

/// Shared handle under which listeners are stored and compared by identity.
pub type SharedListener<K, M> = Arc<dyn Listener<K, M>>;

/// Whether two handles point at the same listener allocation.
pub(crate) fn same_listener<K, M>(a: &SharedListener<K, M>, b: &SharedListener<K, M>) -> bool {
    // Compare data pointers only; vtable pointers are not guaranteed unique.
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Listener built from a pair of closures.
pub struct FnListener<K, P, R> {
    key: K,
    is_pending: P,
    on_resolved: R,
}

impl<K, P, R> FnListener<K, P, R> {
    /// Create a listener for `key` from a pending predicate and a resolution callback
    pub fn new(key: K, is_pending: P, on_resolved: R) -> Self {
        Self {
            key,
            is_pending,
            on_resolved,
        }
    }
}

impl<K, M, P, R> Listener<K, M> for FnListener<K, P, R>
where
    K: Clone + Send + Sync,
    P: Fn(&M) -> bool + Send + Sync,
    R: Fn(M) + Send + Sync,
{
    fn key(&self) -> K {
        self.key.clone()
    }

    fn is_pending(&self, model: &M) -> bool {
        (self.is_pending)(model)
    }

    fn on_resolved(&self, model: M) {
        (self.on_resolved)(model)
    }
}

impl<K: fmt::Debug, P, R> fmt::Debug for FnListener<K, P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnListener").field("key", &self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_fn_listener_dispatch() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener = FnListener::new(
            7u32,
            |model: &String| model == "pending",
            move |model: String| sink.lock().unwrap().push(model),
        );

        assert_eq!(Listener::<u32, String>::key(&listener), 7);
        assert!(listener.is_pending(&"pending".to_string()));
        assert!(!listener.is_pending(&"steady".to_string()));

        listener.on_resolved("steady".to_string());
        assert_eq!(*seen.lock().unwrap(), vec!["steady".to_string()]);
    }

    #[test]
    fn test_same_listener_identity() {
        let a: SharedListener<u32, u8> = Arc::new(FnListener::new(1u32, |_: &u8| true, |_: u8| {}));
        let b: SharedListener<u32, u8> = Arc::new(FnListener::new(1u32, |_: &u8| true, |_: u8| {}));
        let a2 = Arc::clone(&a);

        assert!(same_listener(&a, &a2));
        assert!(!same_listener(&a, &b));
    }
}
