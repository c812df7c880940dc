#![no_std]

//! # AxVM Synthetic Interrupt Controller
//!
//! This crate provides the Hyper-V synthetic interrupt controller (SynIC) plumbing for
//! ArceOS virtual machines: SINT routes that inject synthetic interrupts into the guest,
//! and the decoding of SynIC-related guest exits.
//! It is designed for `no_std` environments and uses the `alloc` crate for dynamic memory allocation.
//!
//! ## Architecture
//!
//! ### SINT Routes
//! - [`SintRouteManager`]: Builds routes from the host services of a VM
//! - [`SintRoute`]: Reference-counted handle to one (vCPU, SINT) route
//! - [`SintRouteError`]: Why a route could not be built
//!
//! ### Host Services
//! - [`VcpuDirectory`]: Resolves VP indices to vCPUs
//! - [`EventNotifier`] / [`NotifierFactory`]: Signalable host events
//! - [`InterruptRoutingTable`]: GSI allocation and notifier binding
//! - [`AtomicNotifier`], [`SoftNotifierFactory`], [`SoftRoutingTable`]: In-memory implementations
//!
//! ### Exit Handling
//! - [`SynicVcpu`]: Per-vCPU SynIC registers
//! - [`dispatch_synic_exit`]: Applies a [`HvExit`] to a [`SynicVcpu`]
//!
//! ## Examples
//!
//! ### Routing a SINT
//!
//! ```rust,ignore
//! use axsynic::{SintRoute, SintRouteManager, SoftNotifierFactory, SoftRoutingTable};
//!
//! let notifiers = Arc::new(SoftNotifierFactory::new());
//! let routing = Arc::new(SoftRoutingTable::default());
//! let manager = SintRouteManager::new(vcpus, notifiers.clone(), routing.clone());
//!
//! // Route SINT 2 of VP 3, with a callback for guest completions.
//! let route = manager.create_sint_route(3, 2, Some(Arc::new(|| resend_next())))?;
//!
//! // Device side: raise the interrupt.
//! route.signal()?;
//!
//! // Event loop: run acknowledgment handlers.
//! notifiers.poll();
//!
//! // Done with the route.
//! SintRoute::unref(Some(&route));
//! ```
//!
//! ### Handling Exits in the vCPU Loop
//!
//! ```rust,ignore
//! let mut synic = SynicVcpu::new(vp_index, true);
//! loop {
//!     // Inject SINTs made pending by signaled routes.
//!     routing.deliver();
//!     while let Some(sint) = routing.pop_pending(vp_index) {
//!         vcpu.inject_sint(sint);
//!     }
//!
//!     let mut exit = vcpu.run()?;
//!     if dispatch_synic_exit(&mut synic, &mut exit) == ExitOutcome::Unhandled {
//!         // Escalate...
//!     }
//! }
//! ```

extern crate alloc;
#[macro_use]
extern crate log;

mod config;
mod error;
mod exit;
pub mod hv;
mod notify;
mod route;
mod vcpu;

pub use config::SoftRoutingConfig;
pub use error::SintRouteError;
pub use exit::{dispatch_synic_exit, ExitOutcome, HvExit};
pub use notify::{
    AtomicNotifier, EventNotifier, Gsi, InterruptRoutingTable, NotifierFactory, NotifierHandler,
    SoftNotifierFactory, SoftRoutingTable,
};
pub use route::{SintAckCallback, SintRoute, SintRouteManager};
pub use vcpu::{LinearVcpuDirectory, SintNumber, SynicRegs, SynicVcpu, VcpuDirectory, VcpuId, VpIndex};
