//! Interrupt routing for SINT routes.
//!
//! The routing table owns the global system interrupt (GSI) numbers a SINT
//! route is bound to. A notifier bound to a GSI is the injection path: when it
//! is signaled the SINT behind the GSI is raised on the target vCPU.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::sync::Arc;

use axerrno::{ax_err, AxResult};
use spin::{Mutex, RwLock};

use crate::config::SoftRoutingConfig;
use crate::vcpu::{SintNumber, VpIndex};

use super::notifier::EventNotifier;

/// Global system interrupt number.
pub type Gsi = u32;

/// Host interrupt routing used by SINT routes.
pub trait InterruptRoutingTable: Send + Sync {
    /// Allocates a GSI that raises `sint` on virtual processor `vp_index`.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the pair is already routed and the table does not
    /// allow duplicates; any other error means no GSI is left.
    fn add_sint_route(&self, vp_index: VpIndex, sint: SintNumber) -> AxResult<Gsi>;

    /// Binds `set` (and `ack`, which the host signals once the guest has
    /// completed the interrupt) to `gsi`.
    fn add_irqfd(
        &self,
        set: &Arc<dyn EventNotifier>,
        ack: Option<&Arc<dyn EventNotifier>>,
        gsi: Gsi,
    ) -> AxResult;

    /// Unbinds `set` from `gsi`.
    fn remove_irqfd(&self, set: &Arc<dyn EventNotifier>, gsi: Gsi);

    /// Frees `gsi`.
    fn release_gsi(&self, gsi: Gsi);
}

struct SintRouteEntry {
    vp_index: VpIndex,
    sint: SintNumber,
    set: Option<Arc<dyn EventNotifier>>,
    ack: Option<Arc<dyn EventNotifier>>,
}

/// An in-memory routing table.
///
/// Signals on bound notifiers are turned into pending SINTs by
/// [`deliver`](Self::deliver) and collected per virtual processor, ready to be
/// injected before the next VM entry.
pub struct SoftRoutingTable {
    config: SoftRoutingConfig,
    routes: RwLock<BTreeMap<Gsi, SintRouteEntry>>,
    pending: Mutex<BTreeMap<VpIndex, VecDeque<SintNumber>>>,
}

impl SoftRoutingTable {
    /// Creates an empty table.
    pub fn new(config: SoftRoutingConfig) -> Self {
        Self {
            config,
            routes: RwLock::new(BTreeMap::new()),
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    /// The table configuration.
    pub fn config(&self) -> &SoftRoutingConfig {
        &self.config
    }

    /// Number of allocated GSIs.
    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    /// Checks if no GSI is allocated.
    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    /// Checks if `gsi` has a notifier bound to it.
    pub fn is_bound(&self, gsi: Gsi) -> bool {
        self.routes
            .read()
            .get(&gsi)
            .is_some_and(|entry| entry.set.is_some())
    }

    /// Looks up the GSI routing `sint` on `vp_index`.
    pub fn gsi_of(&self, vp_index: VpIndex, sint: SintNumber) -> Option<Gsi> {
        self.routes
            .read()
            .iter()
            .find(|(_, entry)| entry.vp_index == vp_index && entry.sint == sint)
            .map(|(gsi, _)| *gsi)
    }

    /// Moves signaled GSIs to the pending queues of their vCPUs.
    ///
    /// Returns the number of SINTs made pending.
    pub fn deliver(&self) -> usize {
        let routes = self.routes.read();
        let mut pending = self.pending.lock();
        let mut delivered = 0;

        for (gsi, entry) in routes.iter() {
            let Some(set) = &entry.set else {
                continue;
            };
            if set.test_and_clear() {
                trace!(
                    "GSI {} -> vp {} sint {}",
                    gsi, entry.vp_index, entry.sint
                );
                pending
                    .entry(entry.vp_index)
                    .or_default()
                    .push_back(entry.sint);
                delivered += 1;
            }
        }
        delivered
    }

    /// Pops the oldest pending SINT of a virtual processor.
    pub fn pop_pending(&self, vp_index: VpIndex) -> Option<SintNumber> {
        self.pending.lock().get_mut(&vp_index)?.pop_front()
    }

    /// Gets the number of pending SINTs of a virtual processor.
    pub fn pending_count(&self, vp_index: VpIndex) -> usize {
        self.pending
            .lock()
            .get(&vp_index)
            .map_or(0, VecDeque::len)
    }

    /// Reports that the guest completed `sint` on `vp_index`.
    ///
    /// Signals the acknowledgment notifier of the route, if it has one.
    pub fn complete(&self, vp_index: VpIndex, sint: SintNumber) -> AxResult {
        let routes = self.routes.read();
        let Some(entry) = routes
            .values()
            .find(|entry| entry.vp_index == vp_index && entry.sint == sint && entry.set.is_some())
        else {
            return ax_err!(NotFound, "sint is not routed");
        };

        match &entry.ack {
            Some(ack) => ack.signal(),
            None => Ok(()),
        }
    }
}

impl Default for SoftRoutingTable {
    fn default() -> Self {
        Self::new(SoftRoutingConfig::default())
    }
}

impl InterruptRoutingTable for SoftRoutingTable {
    fn add_sint_route(&self, vp_index: VpIndex, sint: SintNumber) -> AxResult<Gsi> {
        let mut routes = self.routes.write();

        if self.config.unique_routes
            && routes
                .values()
                .any(|entry| entry.vp_index == vp_index && entry.sint == sint)
        {
            return ax_err!(AlreadyExists, "sint already routed");
        }

        let base = self.config.gsi_base;
        let Some(gsi) = (base..base.saturating_add(self.config.gsi_count))
            .find(|gsi| !routes.contains_key(gsi))
        else {
            return ax_err!(NoMemory, "no free GSI");
        };

        routes.insert(
            gsi,
            SintRouteEntry {
                vp_index,
                sint,
                set: None,
                ack: None,
            },
        );
        debug!("GSI {} allocated for vp {} sint {}", gsi, vp_index, sint);
        Ok(gsi)
    }

    fn add_irqfd(
        &self,
        set: &Arc<dyn EventNotifier>,
        ack: Option<&Arc<dyn EventNotifier>>,
        gsi: Gsi,
    ) -> AxResult {
        let mut routes = self.routes.write();
        let Some(entry) = routes.get_mut(&gsi) else {
            return ax_err!(NotFound, "GSI not allocated");
        };
        if entry.set.is_some() {
            return ax_err!(ResourceBusy, "GSI already bound");
        }

        entry.set = Some(Arc::clone(set));
        entry.ack = ack.cloned();
        Ok(())
    }

    fn remove_irqfd(&self, set: &Arc<dyn EventNotifier>, gsi: Gsi) {
        let mut routes = self.routes.write();
        match routes.get_mut(&gsi) {
            Some(entry)
                if entry
                    .set
                    .as_ref()
                    .is_some_and(|bound| core::ptr::addr_eq(Arc::as_ptr(bound), Arc::as_ptr(set))) =>
            {
                entry.set = None;
                entry.ack = None;
            }
            _ => warn!("GSI {} is not bound to this notifier", gsi),
        }
    }

    fn release_gsi(&self, gsi: Gsi) {
        match self.routes.write().remove(&gsi) {
            Some(entry) if entry.set.is_some() => {
                warn!("GSI {} released while still bound", gsi);
            }
            Some(_) => debug!("GSI {} released", gsi),
            None => warn!("GSI {} released twice", gsi),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::notifier::AtomicNotifier;

    fn notifier() -> Arc<dyn EventNotifier> {
        Arc::new(AtomicNotifier::new())
    }

    #[test]
    fn test_gsi_allocation() {
        let table = SoftRoutingTable::new(SoftRoutingConfig::new(40, 2));
        assert!(table.is_empty());

        let a = table.add_sint_route(0, 1).unwrap();
        let b = table.add_sint_route(0, 2).unwrap();
        assert_eq!((a, b), (40, 41));
        assert_eq!(table.len(), 2);
        assert!(table.add_sint_route(1, 1).is_err());

        // Freed GSIs are reused.
        table.release_gsi(a);
        assert_eq!(table.add_sint_route(1, 1).unwrap(), 40);
        assert_eq!(table.gsi_of(1, 1), Some(40));
    }

    #[test]
    fn test_duplicate_route() {
        let table = SoftRoutingTable::default();
        table.add_sint_route(2, 3).unwrap();
        assert_eq!(
            table.add_sint_route(2, 3).unwrap_err(),
            axerrno::AxError::AlreadyExists
        );

        let shared = SoftRoutingTable::new(SoftRoutingConfig::default().allow_shared_sints());
        let a = shared.add_sint_route(2, 3).unwrap();
        let b = shared.add_sint_route(2, 3).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_bind_and_deliver() {
        let table = SoftRoutingTable::default();
        let set = notifier();
        let gsi = table.add_sint_route(1, 5).unwrap();

        // Binding an unknown GSI fails.
        assert!(table.add_irqfd(&set, None, gsi + 1).is_err());

        table.add_irqfd(&set, None, gsi).unwrap();
        assert!(table.is_bound(gsi));
        assert!(table.add_irqfd(&notifier(), None, gsi).is_err());

        assert_eq!(table.deliver(), 0);
        set.signal().unwrap();
        assert_eq!(table.deliver(), 1);
        assert_eq!(table.pending_count(1), 1);
        assert_eq!(table.pop_pending(1), Some(5));
        assert_eq!(table.pop_pending(1), None);

        table.remove_irqfd(&set, gsi);
        assert!(!table.is_bound(gsi));
        set.signal().unwrap();
        assert_eq!(table.deliver(), 0);
    }

    #[test]
    fn test_remove_irqfd_wrong_notifier() {
        let table = SoftRoutingTable::default();
        let set = notifier();
        let gsi = table.add_sint_route(0, 0).unwrap();
        table.add_irqfd(&set, None, gsi).unwrap();

        table.remove_irqfd(&notifier(), gsi);
        assert!(table.is_bound(gsi));
    }

    #[test]
    fn test_complete_signals_ack() {
        let table = SoftRoutingTable::default();
        let set = notifier();
        let ack = Arc::new(AtomicNotifier::new());
        let ack_dyn: Arc<dyn EventNotifier> = ack.clone();

        assert!(table.complete(0, 4).is_err());

        let gsi = table.add_sint_route(0, 4).unwrap();
        table.add_irqfd(&set, Some(&ack_dyn), gsi).unwrap();
        table.complete(0, 4).unwrap();
        assert!(ack.is_pending());
    }
}
