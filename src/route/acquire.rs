//! Host resources held by a SINT route, in acquisition order.

use alloc::sync::Arc;

use arrayvec::ArrayVec;

use crate::notify::{EventNotifier, Gsi, InterruptRoutingTable};

/// One step of route construction that has to be undone on release.
pub(super) enum Acquired {
    SetNotifier(Arc<dyn EventNotifier>),
    /// An ack notifier with the ack handler installed.
    AckNotifier(Arc<dyn EventNotifier>),
    Gsi(Gsi),
    Irqfd {
        set: Arc<dyn EventNotifier>,
        gsi: Gsi,
    },
}

/// Stack of committed acquisitions.
///
/// Dropping the stack, or calling [`unwind`](Self::unwind), undoes every entry
/// in reverse order. A route holds the stack of its successful construction
/// and unwinds it when its last reference goes away.
pub(super) struct Acquisitions {
    routing: Arc<dyn InterruptRoutingTable>,
    stack: ArrayVec<Acquired, 4>,
}

impl Acquisitions {
    pub(super) fn new(routing: Arc<dyn InterruptRoutingTable>) -> Self {
        Self {
            routing,
            stack: ArrayVec::new(),
        }
    }

    pub(super) fn push(&mut self, acquired: Acquired) {
        self.stack.push(acquired);
    }

    pub(super) fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Releases everything, most recent first.
    pub(super) fn unwind(&mut self) {
        while let Some(acquired) = self.stack.pop() {
            self.undo(acquired);
        }
    }

    fn undo(&self, acquired: Acquired) {
        match acquired {
            Acquired::Irqfd { set, gsi } => self.routing.remove_irqfd(&set, gsi),
            Acquired::Gsi(gsi) => self.routing.release_gsi(gsi),
            Acquired::AckNotifier(ack) => {
                ack.set_handler(None);
                ack.cleanup();
            }
            Acquired::SetNotifier(set) => set.cleanup(),
        }
    }
}

impl Drop for Acquisitions {
    fn drop(&mut self) {
        self.unwind();
    }
}
