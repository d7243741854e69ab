//! Subscription handle and callback types.

use super::manager::RegistryInner;
use crate::aggregate::Scope;
use crate::types::Counts;
use std::sync::Weak;

/// Callback invoked with the scope it was registered for and that scope's
/// fresh counts.
pub type Callback = Box<dyn FnMut(&Scope, Counts) + Send>;

/// Unique identifier for a registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to a registration. Dropping it unregisters.
///
/// `unregister` may be called any number of times from any teardown path.
#[must_use = "dropping the handle unregisters the callback immediately"]
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<RegistryInner>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, registry: Weak<RegistryInner>) -> Self {
        Self { id, registry }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Whether the registration is still live.
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|inner| inner.contains(self.id))
    }

    /// Remove the registration. Idempotent.
    pub fn unregister(&self) {
        if let Some(inner) = self.registry.upgrade() {
            inner.remove(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unregister();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
