//! Change notifications.
//!
//! Every logical mutation of a model or collection produces exactly one
//! [`Patch`] describing what happened: the lifecycle tag, the identity of
//! the affected model, and the old/new values of whatever changed. Patches
//! are delivered to listeners registered on the model itself and on the
//! collection that owns it, strictly after the mutation has been applied
//! and all internal locks have been released, so a listener always observes
//! consistent state and may call back into the store.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::JsonMap;
use crate::model::ModelId;

/// Lifecycle tag of a [`Patch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PatchType {
    /// The model entered a collection.
    Create,
    /// One or more fields changed value.
    Update,
    /// The model left its collection.
    Remove,
}

/// Description of one applied mutation.
///
/// For updates, `old_value` and `new_value` carry only the fields that
/// changed. For creates and removes they carry the full serialized model
/// on the side that exists.
#[derive(Clone, Debug)]
pub struct Patch {
    /// What kind of mutation happened.
    pub patch_type: PatchType,
    /// Wire tag of the affected model.
    pub model_type: String,
    /// Id of the affected model at the time of the mutation.
    pub model_id: ModelId,
    /// Field values before the mutation, absent for creates.
    pub old_value: Option<JsonMap>,
    /// Field values after the mutation, absent for removes.
    pub new_value: Option<JsonMap>,
}

/// Callback invoked with each applied [`Patch`].
pub type PatchListener = Arc<dyn Fn(&Patch) + Send + Sync>;

/// Handle returned by subscribe calls, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Ordered set of patch listeners keyed by subscription handle.
///
/// Insertion order is delivery order. The set never invokes listeners
/// itself; owners snapshot the current listeners, release their locks and
/// then dispatch.
#[derive(Default)]
pub(crate) struct SubscriberSet {
    next: u64,
    listeners: BTreeMap<u64, PatchListener>,
}

impl fmt::Debug for SubscriberSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberSet")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl SubscriberSet {
    pub(crate) fn insert(&mut self, listener: PatchListener) -> SubscriptionId {
        let id = self.next;
        self.next += 1;
        self.listeners.insert(id, listener);
        SubscriptionId(id)
    }

    /// Removes a listener; `true` when the handle was still registered.
    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        self.listeners.remove(&id.0).is_some()
    }

    /// Clones the currently registered listeners, in registration order.
    pub(crate) fn snapshot(&self) -> Vec<PatchListener> {
        self.listeners.values().cloned().collect()
    }
}

/// A patch paired with the listeners it still has to reach.
///
/// Mutation paths build these while holding locks and dispatch them after
/// every lock is released.
pub(crate) struct PendingPatch {
    pub(crate) patch: Patch,
    pub(crate) listeners: Vec<PatchListener>,
}

impl PendingPatch {
    pub(crate) fn dispatch(self) {
        for listener in &self.listeners {
            listener(&self.patch);
        }
    }
}

/// Dispatches a batch of pending patches in order.
pub(crate) fn dispatch_all(pendings: Vec<PendingPatch>) {
    for pending in pendings {
        pending.dispatch();
    }
}
