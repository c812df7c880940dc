//! SINT routes: the host side of one synthetic interrupt source.
//!
//! A route ties a (virtual processor, SINT) pair to a GSI. Signaling its set
//! notifier raises the SINT in the guest; when the route was created with an
//! acknowledgment callback, the callback runs once the guest has completed
//! the interrupt.
//!
//! Routes are reference counted explicitly: [`SintRoute::add_ref`] and
//! [`SintRoute::unref`] pair up, and the host resources are released by the
//! `unref` that drops the count to zero.

mod acquire;
mod manager;

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};

use axerrno::AxResult;
use spin::Mutex;

use crate::notify::{EventNotifier, Gsi};
use crate::vcpu::{SintNumber, VcpuId, VpIndex};

use self::acquire::Acquisitions;

pub use manager::SintRouteManager;

/// Callback run when the guest acknowledges a SINT.
///
/// Data the callback needs is captured by the closure. It runs on the context
/// that processes host notifications, possibly concurrently with the vCPU, and
/// must not block.
pub type SintAckCallback = Arc<dyn Fn() + Send + Sync>;

struct SintRouteInner {
    sint: SintNumber,
    vp_index: VpIndex,
    vcpu: VcpuId,
    gsi: Gsi,
    set_notifier: Arc<dyn EventNotifier>,
    ack_notifier: Option<Arc<dyn EventNotifier>>,
    refcount: AtomicU32,
    resources: Mutex<Acquisitions>,
}

impl SintRouteInner {
    fn teardown(&self) {
        debug!(
            "Releasing SINT route vp {} sint {} (GSI {})",
            self.vp_index, self.sint, self.gsi
        );
        self.resources.lock().unwind();
    }
}

// Dropping every handle without `unref` is a caller bug. Release builds log it
// and let `Acquisitions` free what is left.
impl Drop for SintRouteInner {
    fn drop(&mut self) {
        let leaked = !self.resources.get_mut().is_empty();
        if leaked {
            warn!(
                "SINT route vp {} sint {} dropped with {} references left",
                self.vp_index,
                self.sint,
                self.refcount.load(Ordering::Relaxed)
            );
        }
        debug_assert!(!leaked, "SINT route dropped without being released");
    }
}

/// A handle to a SINT route.
///
/// Every handle stands for one reference. Handles are obtained from
/// [`SintRouteManager::create_sint_route`] and [`SintRoute::add_ref`] and
/// given back with [`SintRoute::unref`].
pub struct SintRoute {
    inner: Arc<SintRouteInner>,
}

impl SintRoute {
    /// Takes another reference to the route.
    ///
    /// # Panics
    ///
    /// Panics if the route has already been released.
    pub fn add_ref(&self) -> SintRoute {
        let prev = self
            .inner
            .refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| match n {
                0 => None,
                n => n.checked_add(1),
            });
        match prev {
            Ok(_) => {}
            Err(0) => panic!("reference taken on a released SINT route"),
            Err(_) => panic!("SINT route reference count overflow"),
        }
        Self {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Gives back one reference to `route`; `None` is ignored.
    ///
    /// The host resources of the route are released, in reverse order of
    /// their acquisition, when the last reference is given back.
    ///
    /// # Panics
    ///
    /// Panics if the route has no references left: the caller is using a
    /// route it already released.
    pub fn unref(route: Option<&SintRoute>) {
        let Some(route) = route else {
            return;
        };
        let prev = route
            .inner
            .refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match prev {
            Ok(1) => route.inner.teardown(),
            Ok(_) => {}
            Err(_) => panic!("SINT route released more often than referenced"),
        }
    }

    /// Raises the SINT in the guest.
    ///
    /// Does not block. The result of signaling the set notifier is returned
    /// as is.
    ///
    /// # Panics
    ///
    /// Panics if the route has already been released.
    pub fn signal(&self) -> AxResult {
        assert!(self.refcount() != 0, "signal on a released SINT route");
        trace!(
            "Signal vp {} sint {} (GSI {})",
            self.inner.vp_index, self.inner.sint, self.inner.gsi
        );
        self.inner.set_notifier.signal()
    }

    /// The synthetic interrupt source of this route.
    pub fn sint(&self) -> SintNumber {
        self.inner.sint
    }

    /// The VP index the route targets.
    pub fn vp_index(&self) -> VpIndex {
        self.inner.vp_index
    }

    /// The vCPU the route targets. The vCPU is not kept alive by the route.
    pub fn vcpu(&self) -> VcpuId {
        self.inner.vcpu
    }

    /// The GSI the route is bound to.
    pub fn gsi(&self) -> Gsi {
        self.inner.gsi
    }

    /// Whether the route delivers acknowledgments.
    pub fn has_ack(&self) -> bool {
        self.inner.ack_notifier.is_some()
    }

    /// Current number of references.
    pub fn refcount(&self) -> u32 {
        self.inner.refcount.load(Ordering::Acquire)
    }
}

impl core::fmt::Debug for SintRoute {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SintRoute")
            .field("vp_index", &self.inner.vp_index)
            .field("sint", &self.inner.sint)
            .field("gsi", &self.inner.gsi)
            .field("ack", &self.has_ack())
            .field("refcount", &self.refcount())
            .finish()
    }
}
