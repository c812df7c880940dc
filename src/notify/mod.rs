//! Host notification plumbing for SINT routes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  signal()   ┌─────────────────┐  deliver()  ┌──────────┐
//! │ set notifier │ ──────────▶ │ routing table   │ ──────────▶ │ vCPU     │
//! └──────────────┘             │ (GSI -> vp/sint)│             │ pending  │
//!                              └────────┬────────┘             └────┬─────┘
//!                                       │ complete()                │ EOM
//!                              ┌────────▼────────┐                  │
//!                              │ ack notifier    │ ◀────────────────┘
//!                              │ (handler runs   │
//!                              │  on event loop) │
//!                              └─────────────────┘
//! ```
//!
//! [`EventNotifier`] and [`InterruptRoutingTable`] are the host interfaces a
//! SINT route is built on. [`AtomicNotifier`], [`SoftNotifierFactory`] and
//! [`SoftRoutingTable`] implement them in memory for monitors that deliver
//! interrupts themselves.

mod notifier;
mod routing;

pub use notifier::{
    AtomicNotifier, EventNotifier, NotifierFactory, NotifierHandler, SoftNotifierFactory,
};
pub use routing::{Gsi, InterruptRoutingTable, SoftRoutingTable};
