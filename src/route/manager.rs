//! Construction of SINT routes.

use alloc::sync::Arc;
use core::sync::atomic::AtomicU32;

use spin::Mutex;

use crate::error::SintRouteError;
use crate::notify::{EventNotifier, InterruptRoutingTable, NotifierFactory, NotifierHandler};
use crate::vcpu::{SintNumber, VcpuDirectory, VcpuId, VpIndex};

use super::acquire::{Acquired, Acquisitions};
use super::{SintAckCallback, SintRoute, SintRouteInner};

/// Creates SINT routes for one VM.
///
/// The manager holds the host services routes are built from; there is one per
/// VM and it is passed to whoever needs to create routes.
pub struct SintRouteManager {
    vcpus: Arc<dyn VcpuDirectory>,
    notifiers: Arc<dyn NotifierFactory>,
    routing: Arc<dyn InterruptRoutingTable>,
}

impl SintRouteManager {
    /// Creates a route manager.
    ///
    /// # Arguments
    ///
    /// * `vcpus` - Resolves VP indices to vCPUs.
    /// * `notifiers` - Allocates the set and ack notifiers.
    /// * `routing` - Allocates GSIs and binds notifiers to them.
    pub fn new(
        vcpus: Arc<dyn VcpuDirectory>,
        notifiers: Arc<dyn NotifierFactory>,
        routing: Arc<dyn InterruptRoutingTable>,
    ) -> Self {
        Self {
            vcpus,
            notifiers,
            routing,
        }
    }

    /// Resolves a VP index to its vCPU.
    pub fn find_vcpu(&self, vp_index: VpIndex) -> Option<VcpuId> {
        self.vcpus.find_vcpu(vp_index)
    }

    /// Creates a route raising `sint` on virtual processor `vp_index`.
    ///
    /// If `ack_callback` is given it runs each time the guest completes the
    /// SINT. The returned handle holds the only reference.
    ///
    /// # Errors
    ///
    /// On failure nothing acquired by this call is left allocated.
    ///
    /// * [`SintRouteError::VcpuNotFound`] - `vp_index` is unknown.
    /// * [`SintRouteError::ResourceExhausted`] - a notifier could not be created.
    /// * [`SintRouteError::RoutingFull`] - no GSI is left.
    /// * [`SintRouteError::RoutingConflict`] - the SINT is already routed.
    /// * [`SintRouteError::BindError`] - the notifiers could not be bound.
    pub fn create_sint_route(
        &self,
        vp_index: VpIndex,
        sint: SintNumber,
        ack_callback: Option<SintAckCallback>,
    ) -> Result<SintRoute, SintRouteError> {
        self.try_create(vp_index, sint, ack_callback)
            .inspect(|route| {
                debug!(
                    "SINT route vp {} sint {} -> GSI {} (ack: {})",
                    vp_index,
                    sint,
                    route.gsi(),
                    route.has_ack()
                )
            })
            .inspect_err(|err| {
                warn!("Failed to create SINT route vp {} sint {}: {}", vp_index, sint, err)
            })
    }

    fn try_create(
        &self,
        vp_index: VpIndex,
        sint: SintNumber,
        ack_callback: Option<SintAckCallback>,
    ) -> Result<SintRoute, SintRouteError> {
        let vcpu = self
            .vcpus
            .find_vcpu(vp_index)
            .ok_or(SintRouteError::VcpuNotFound)?;

        // Everything pushed here is released again if a later step fails.
        let mut acquired = Acquisitions::new(Arc::clone(&self.routing));

        let set_notifier = self
            .notifiers
            .create_notifier()
            .map_err(SintRouteError::ResourceExhausted)?;
        acquired.push(Acquired::SetNotifier(Arc::clone(&set_notifier)));

        let ack_notifier = match ack_callback {
            Some(callback) => {
                let ack = self
                    .notifiers
                    .create_notifier()
                    .map_err(SintRouteError::ResourceExhausted)?;
                ack.set_handler(Some(sint_ack_handler(callback)));
                acquired.push(Acquired::AckNotifier(Arc::clone(&ack)));
                Some(ack)
            }
            None => None,
        };

        let gsi = self
            .routing
            .add_sint_route(vp_index, sint)
            .map_err(SintRouteError::from_alloc)?;
        acquired.push(Acquired::Gsi(gsi));

        self.routing
            .add_irqfd(&set_notifier, ack_notifier.as_ref(), gsi)
            .map_err(SintRouteError::BindError)?;
        acquired.push(Acquired::Irqfd {
            set: Arc::clone(&set_notifier),
            gsi,
        });

        Ok(SintRoute {
            inner: Arc::new(SintRouteInner {
                sint,
                vp_index,
                vcpu,
                gsi,
                set_notifier,
                ack_notifier,
                refcount: AtomicU32::new(1),
                resources: Mutex::new(acquired),
            }),
        })
    }
}

/// Builds the handler installed on an ack notifier.
///
/// Each wakeup consumes at most one pending acknowledgment; a wakeup with
/// nothing pending does not reach the callback.
fn sint_ack_handler(callback: SintAckCallback) -> NotifierHandler {
    Arc::new(move |notifier: &dyn EventNotifier| {
        if notifier.test_and_clear() {
            callback();
        } else {
            trace!("Spurious SINT ack wakeup");
        }
    })
}
