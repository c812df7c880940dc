//! Host event notifiers.
//!
//! An event notifier is the host object a SINT route is built from: it can be
//! signaled, tested and cleared, and may carry a handler run by whichever
//! context polls it. On a hosted monitor this is an eventfd; [`AtomicNotifier`]
//! is the in-memory variant used when the monitor owns interrupt delivery.

use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use axerrno::{ax_err, ax_err_type, AxResult};
use spin::Mutex;

/// Handler run when a notifier is found signaled.
///
/// The handler receives the notifier it was installed on.
pub type NotifierHandler = Arc<dyn Fn(&dyn EventNotifier) + Send + Sync>;

/// A host-signalable, host-clearable event object.
pub trait EventNotifier: Send + Sync {
    /// Raises the notifier.
    fn signal(&self) -> AxResult;

    /// Atomically consumes a pending signal.
    ///
    /// Returns `true` if the notifier was signaled.
    fn test_and_clear(&self) -> bool;

    /// Installs `handler`, or removes the current one when `None`.
    fn set_handler(&self, handler: Option<NotifierHandler>);

    /// Releases the host object. The notifier must not be used afterwards.
    fn cleanup(&self);
}

/// Allocates event notifiers.
pub trait NotifierFactory: Send + Sync {
    /// Creates a fresh, unsignaled notifier.
    fn create_notifier(&self) -> AxResult<Arc<dyn EventNotifier>>;
}

/// An event notifier backed by an atomic flag.
///
/// Signals are level-like: several signals before a poll are seen once.
pub struct AtomicNotifier {
    pending: AtomicBool,
    released: AtomicBool,
    handler: Mutex<Option<NotifierHandler>>,
    live: Option<Arc<AtomicUsize>>,
}

impl AtomicNotifier {
    /// Creates a standalone notifier.
    pub fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            released: AtomicBool::new(false),
            handler: Mutex::new(None),
            live: None,
        }
    }

    /// Peeks at the pending flag without consuming it.
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Returns `true` once [`cleanup`](EventNotifier::cleanup) has run.
    #[inline]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Runs the installed handler if the notifier is signaled.
    ///
    /// This is what the event loop does when the notifier becomes readable.
    /// The pending flag is left for the handler to consume. Returns `true`
    /// if a handler ran.
    pub fn poll(&self) -> bool {
        if !self.is_pending() {
            return false;
        }
        // Clone out of the lock so the handler may reinstall itself.
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => {
                handler(self as &dyn EventNotifier);
                true
            }
            None => false,
        }
    }
}

impl Default for AtomicNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl EventNotifier for AtomicNotifier {
    fn signal(&self) -> AxResult {
        if self.is_released() {
            return ax_err!(BadState, "notifier already released");
        }
        self.pending.store(true, Ordering::Release);
        Ok(())
    }

    fn test_and_clear(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    fn set_handler(&self, handler: Option<NotifierHandler>) {
        *self.handler.lock() = handler;
    }

    fn cleanup(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.handler.lock().take();
        self.pending.store(false, Ordering::Release);
        if let Some(live) = &self.live {
            live.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

/// Hands out [`AtomicNotifier`]s, counts the live ones and polls them.
///
/// [`poll`](Self::poll) is the event loop pass: it is meant to be called from
/// the context that processes host notifications.
pub struct SoftNotifierFactory {
    live: Arc<AtomicUsize>,
    limit: Option<usize>,
    notifiers: Mutex<Vec<Weak<AtomicNotifier>>>,
}

impl SoftNotifierFactory {
    /// Creates a factory without an allocation limit.
    pub fn new() -> Self {
        Self {
            live: Arc::new(AtomicUsize::new(0)),
            limit: None,
            notifiers: Mutex::new(Vec::new()),
        }
    }

    /// Creates a factory that fails once `limit` notifiers are live.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            live: Arc::new(AtomicUsize::new(0)),
            limit: Some(limit),
            notifiers: Mutex::new(Vec::new()),
        }
    }

    /// Number of notifiers created and not yet cleaned up.
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Creates a notifier with its concrete type.
    pub fn create(&self) -> AxResult<Arc<AtomicNotifier>> {
        let limit = self.limit.unwrap_or(usize::MAX);
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .map_err(|_| ax_err_type!(NoMemory, "event notifier limit reached"))?;

        let notifier = Arc::new(AtomicNotifier {
            live: Some(Arc::clone(&self.live)),
            ..AtomicNotifier::new()
        });
        let mut notifiers = self.notifiers.lock();
        notifiers.retain(Self::is_tracked);
        notifiers.push(Arc::downgrade(&notifier));
        Ok(notifier)
    }

    fn is_tracked(notifier: &Weak<AtomicNotifier>) -> bool {
        notifier.upgrade().is_some_and(|n| !n.is_released())
    }

    /// Runs the handlers of all signaled notifiers.
    ///
    /// Released notifiers are forgotten. Returns the number of handlers run.
    pub fn poll(&self) -> usize {
        let ready: Vec<Arc<AtomicNotifier>> = {
            let mut notifiers = self.notifiers.lock();
            notifiers.retain(Self::is_tracked);
            notifiers.iter().filter_map(Weak::upgrade).collect()
        };
        // Handlers run unlocked: they may create or release notifiers.
        ready.iter().filter(|n| n.poll()).count()
    }
}

impl Default for SoftNotifierFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifierFactory for SoftNotifierFactory {
    fn create_notifier(&self) -> AxResult<Arc<dyn EventNotifier>> {
        let notifier: Arc<dyn EventNotifier> = self.create()?;
        Ok(notifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_and_clear() {
        let notifier = AtomicNotifier::new();
        assert!(!notifier.test_and_clear());

        notifier.signal().unwrap();
        notifier.signal().unwrap();
        assert!(notifier.is_pending());
        assert!(notifier.test_and_clear());
        assert!(!notifier.test_and_clear());
    }

    #[test]
    fn test_poll_runs_handler() {
        let notifier = AtomicNotifier::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let handler: NotifierHandler = Arc::new(move |n: &dyn EventNotifier| {
            if n.test_and_clear() {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            }
        });
        notifier.set_handler(Some(handler));

        // Nothing pending, the handler is not woken.
        assert!(!notifier.poll());

        notifier.signal().unwrap();
        assert!(notifier.poll());
        assert!(!notifier.poll());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        notifier.set_handler(None);
        notifier.signal().unwrap();
        assert!(!notifier.poll());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_signal_after_cleanup_fails() {
        let notifier = AtomicNotifier::new();
        notifier.cleanup();
        assert!(notifier.is_released());
        assert!(notifier.signal().is_err());
    }

    #[test]
    fn test_factory_counts_and_limit() {
        let factory = SoftNotifierFactory::with_limit(2);
        let a = factory.create_notifier().unwrap();
        let b = factory.create_notifier().unwrap();
        assert_eq!(factory.live_count(), 2);
        assert!(factory.create_notifier().is_err());

        a.cleanup();
        // A second cleanup must not be counted twice.
        a.cleanup();
        assert_eq!(factory.live_count(), 1);

        let c = factory.create_notifier().unwrap();
        b.cleanup();
        c.cleanup();
        assert_eq!(factory.live_count(), 0);
    }

    #[test]
    fn test_create_forgets_released_notifiers() {
        let factory = SoftNotifierFactory::new();
        for _ in 0..32 {
            let notifier = factory.create().unwrap();
            notifier.cleanup();
        }
        let dropped = factory.create().unwrap();
        drop(dropped);
        let kept = factory.create().unwrap();

        // Only the notifier still in use is tracked, without any poll pass.
        assert_eq!(factory.notifiers.lock().len(), 1);
        kept.signal().unwrap();
        assert_eq!(factory.poll(), 0);
        assert!(kept.is_pending());
    }
}
