//! Device/queue exclusivity: refuses to let two Fill/Completion pairs bind the same
//! `(ifindex, queue_id)` concurrently, since that would mean two dataplane agents racing over one
//! free-frame stack and one pair of kernel rings.

use alloc::collections::BTreeSet;
use alloc::sync::Arc;

use spin::RwLock;

/// Identifies one kernel RX/TX queue of one interface, within one network namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct IfCtx {
    pub(crate) ifindex: u32,
    pub(crate) queue_id: u32,
    pub(crate) netnscookie: u64,
}

pub(crate) trait ControlSet: Send + Sync {
    fn insert(&self, ctx: IfCtx) -> bool;
    fn remove(&self, ctx: &IfCtx);
}

#[derive(Default)]
struct SpinLockedControlSet {
    inner: RwLock<BTreeSet<IfCtx>>,
}

impl ControlSet for SpinLockedControlSet {
    fn insert(&self, ctx: IfCtx) -> bool {
        self.inner.write().insert(ctx)
    }

    fn remove(&self, ctx: &IfCtx) {
        self.inner.write().remove(ctx);
    }
}

/// Shared handle to the set of queues currently bound by sockets over one UMEM.
#[derive(Clone)]
pub(crate) struct DeviceControl {
    inner: Arc<dyn ControlSet>,
}

impl Default for DeviceControl {
    fn default() -> Self {
        DeviceControl {
            inner: Arc::new(SpinLockedControlSet::default()),
        }
    }
}

impl DeviceControl {
    pub(crate) fn insert(&self, ctx: IfCtx) -> bool {
        self.inner.insert(ctx)
    }

    pub(crate) fn remove(&self, ctx: &IfCtx) {
        self.inner.remove(ctx)
    }

    /// Rolls the insertion in `insert` back unless disarmed with `core::mem::forget`.
    pub(crate) fn guard(&self, ctx: IfCtx) -> DeviceGuard {
        DeviceGuard { ctx, set: self.clone() }
    }
}

pub(crate) struct DeviceGuard {
    ctx: IfCtx,
    set: DeviceControl,
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        self.set.remove(&self.ctx);
    }
}
