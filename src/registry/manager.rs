//! Callback registry for scope-level change notification.

use crate::aggregate::Scope;
use crate::types::Counts;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use super::types::{Callback, Subscription, SubscriptionId};

/// Internal registration state.
struct Registration {
    scope: Scope,
    callback: Arc<Mutex<Callback>>,
}

/// Shared state behind every handle.
pub(crate) struct RegistryInner {
    registrations: RwLock<HashMap<SubscriptionId, Registration>>,
    next_id: AtomicU64,
}

impl RegistryInner {
    pub(crate) fn contains(&self, id: SubscriptionId) -> bool {
        self.registrations.read().contains_key(&id)
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        // Dropped after the lock is released: a callback may own handles.
        let removed = self.registrations.write().remove(&id);
        if removed.is_some() {
            debug!(subscription = id.0, "callback unregistered");
        }
        removed.is_some()
    }
}

/// Registry of scope callbacks.
///
/// Locks are never held while a callback runs, so callbacks may query the
/// tracker or drop their own handle.
#[derive(Clone)]
pub struct CallbackRegistry {
    inner: Arc<RegistryInner>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                registrations: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register interest in `scope`. Keep the handle alive for as long as
    /// the callback should fire.
    pub fn register<F>(&self, scope: Scope, callback: F) -> Subscription
    where
        F: FnMut(&Scope, Counts) + Send + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let boxed: Callback = Box::new(callback);

        debug!(subscription = id.0, %scope, "callback registered");
        self.inner.registrations.write().insert(
            id,
            Registration {
                scope,
                callback: Arc::new(Mutex::new(boxed)),
            },
        );

        Subscription::new(id, Arc::downgrade(&self.inner))
    }

    /// Unregister by id. Unknown or already removed ids are a no-op.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        self.inner.remove(id)
    }

    /// Number of live registrations.
    pub fn active_count(&self) -> usize {
        self.inner.registrations.read().len()
    }

    /// Drop every registration (session teardown).
    pub fn clear(&self) {
        let drained: Vec<Registration> = {
            let mut regs = self.inner.registrations.write();
            regs.drain().map(|(_, reg)| reg).collect()
        };
        debug!(count = drained.len(), "cleared callback registry");
    }

    /// Scopes of every registration accepted by `filter`.
    pub fn scopes_where<F>(&self, mut filter: F) -> Vec<(SubscriptionId, Scope)>
    where
        F: FnMut(&Scope) -> bool,
    {
        let regs = self.inner.registrations.read();
        let mut out: Vec<_> = regs
            .iter()
            .filter(|(_, reg)| filter(&reg.scope))
            .map(|(id, reg)| (*id, reg.scope.clone()))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    /// Invoke callbacks with precomputed counts.
    ///
    /// Registrations removed since the counts were computed are skipped. A
    /// callback that is already running (a nested `dispatch`) is skipped too.
    pub fn dispatch(&self, deliveries: Vec<(SubscriptionId, Counts)>) -> usize {
        let mut invoked = 0;

        for (id, counts) in deliveries {
            let target = {
                let regs = self.inner.registrations.read();
                regs.get(&id)
                    .map(|reg| (reg.scope.clone(), Arc::clone(&reg.callback)))
            };
            let Some((scope, callback)) = target else {
                continue;
            };

            let Some(mut callback) = callback.try_lock() else {
                trace!(subscription = id.0, "callback busy, skipping nested delivery");
                continue;
            };
            (*callback)(&scope, counts);
            invoked += 1;
        }

        invoked
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl FnMut(&Scope, Counts) + Send + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let clone = Arc::clone(&hits);
        (hits, move |_: &Scope, _: Counts| {
            clone.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_register_unregister() {
        let registry = CallbackRegistry::new();
        let (_, cb) = counter();

        let handle = registry.register(Scope::Everything, cb);
        assert_eq!(registry.active_count(), 1);
        assert!(handle.is_active());

        handle.unregister();
        assert_eq!(registry.active_count(), 0);
        assert!(!handle.is_active());

        // Idempotent.
        handle.unregister();
        assert!(!registry.unregister(handle.id()));
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn test_drop_unregisters() {
        let registry = CallbackRegistry::new();
        let (_, cb) = counter();
        {
            let _handle = registry.register(Scope::tag("foo"), cb);
            assert_eq!(registry.active_count(), 1);
        }
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn test_handle_outlives_registry() {
        let registry = CallbackRegistry::new();
        let (_, cb) = counter();
        let handle = registry.register(Scope::Everything, cb);
        drop(registry);
        assert!(!handle.is_active());
        handle.unregister();
    }

    #[test]
    fn test_dispatch_skips_removed() {
        let registry = CallbackRegistry::new();
        let (hits_a, cb_a) = counter();
        let (hits_b, cb_b) = counter();
        let a = registry.register(Scope::Everything, cb_a);
        let b = registry.register(Scope::Everything, cb_b);

        let deliveries = vec![(a.id(), Counts::default()), (b.id(), Counts::default())];
        b.unregister();

        assert_eq!(registry.dispatch(deliveries), 1);
        assert_eq!(hits_a.load(Ordering::SeqCst), 1);
        assert_eq!(hits_b.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_scopes_where() {
        let registry = CallbackRegistry::new();
        let (_, cb_a) = counter();
        let (_, cb_b) = counter();
        let _a = registry.register(Scope::tag("foo"), cb_a);
        let _b = registry.register(Scope::category(5), cb_b);

        let tags = registry.scopes_where(|s| matches!(s, Scope::Tag { .. }));
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].1, Scope::tag("foo"));
    }

    #[test]
    fn test_clear() {
        let registry = CallbackRegistry::new();
        let (_, cb_a) = counter();
        let (_, cb_b) = counter();
        let a = registry.register(Scope::Everything, cb_a);
        let _b = registry.register(Scope::Everything, cb_b);
        registry.clear();
        assert_eq!(registry.active_count(), 0);
        assert!(!a.is_active());
    }
}
