//! Per-vCPU SynIC state and the vCPU lookup used by route construction.

use axaddrspace::GuestPhysAddr;
use memory_addr::align_down_4k;

use crate::hv::HV_SYNIC_ENABLE;

/// Hyper-V virtual processor index as seen by the guest.
pub type VpIndex = u32;

/// Synthetic interrupt source number within one virtual processor's SynIC.
pub type SintNumber = u32;

/// Identifier of a vCPU inside the monitor.
pub type VcpuId = usize;

/// Resolves guest virtual processor indices to vCPUs.
///
/// The lookup is borrowed: a route remembers the returned [`VcpuId`] but never
/// keeps the vCPU alive.
pub trait VcpuDirectory: Send + Sync {
    /// Returns the vCPU with the given VP index, or `None` if there is none.
    fn find_vcpu(&self, vp_index: VpIndex) -> Option<VcpuId>;
}

/// A directory where the VP index of a vCPU equals its id.
///
/// This is how a VM without a guest-programmed VP index numbers its vCPUs.
#[derive(Debug, Clone, Copy)]
pub struct LinearVcpuDirectory {
    vcpu_count: usize,
}

impl LinearVcpuDirectory {
    /// Creates a directory for `vcpu_count` vCPUs numbered from zero.
    pub const fn new(vcpu_count: usize) -> Self {
        Self { vcpu_count }
    }
}

impl VcpuDirectory for LinearVcpuDirectory {
    fn find_vcpu(&self, vp_index: VpIndex) -> Option<VcpuId> {
        let id = vp_index as VcpuId;
        (id < self.vcpu_count).then_some(id)
    }
}

/// The SynIC registers tracked for one vCPU.
///
/// Values are stored exactly as the guest wrote them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SynicRegs {
    /// `SCONTROL`.
    pub control: u64,
    /// `SIMP`: message page address and enable bit.
    pub msg_page_gpa: u64,
    /// `SIEFP`: event flags page address and enable bit.
    pub evt_page_gpa: u64,
}

impl SynicRegs {
    /// Returns `true` if the guest enabled the SynIC in `SCONTROL`.
    #[inline]
    pub const fn is_enabled(&self) -> bool {
        self.control & HV_SYNIC_ENABLE != 0
    }

    /// The guest page holding the SINT message slots, if enabled.
    pub fn message_page(&self) -> Option<GuestPhysAddr> {
        Self::page_of(self.msg_page_gpa)
    }

    /// The guest page holding the SINT event flags, if enabled.
    pub fn event_flags_page(&self) -> Option<GuestPhysAddr> {
        Self::page_of(self.evt_page_gpa)
    }

    fn page_of(reg: u64) -> Option<GuestPhysAddr> {
        if reg & HV_SYNIC_ENABLE == 0 {
            return None;
        }
        Some(GuestPhysAddr::from(align_down_4k(reg as usize)))
    }
}

/// The SynIC side of one vCPU.
///
/// Owned by the context that runs the vCPU; exits are applied to it one at a
/// time by [`dispatch_synic_exit`](crate::dispatch_synic_exit). No locking is
/// done here.
#[derive(Debug)]
pub struct SynicVcpu {
    vp_index: VpIndex,
    synic_enabled: bool,
    regs: SynicRegs,
}

impl SynicVcpu {
    /// Creates the SynIC state of a vCPU.
    ///
    /// When `synic_enabled` is `false` the guest was not offered a SynIC and
    /// SynIC register exits are left to the caller.
    pub fn new(vp_index: VpIndex, synic_enabled: bool) -> Self {
        Self {
            vp_index,
            synic_enabled,
            regs: SynicRegs::default(),
        }
    }

    /// The VP index of this vCPU.
    pub const fn vp_index(&self) -> VpIndex {
        self.vp_index
    }

    /// Whether a SynIC is exposed to the guest on this vCPU.
    pub const fn synic_enabled(&self) -> bool {
        self.synic_enabled
    }

    /// The current SynIC register values.
    pub const fn regs(&self) -> &SynicRegs {
        &self.regs
    }

    pub(crate) fn regs_mut(&mut self) -> &mut SynicRegs {
        &mut self.regs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_directory() {
        let dir = LinearVcpuDirectory::new(4);
        assert_eq!(dir.find_vcpu(0), Some(0));
        assert_eq!(dir.find_vcpu(3), Some(3));
        assert_eq!(dir.find_vcpu(4), None);
    }

    #[test]
    fn test_page_decoding() {
        let mut regs = SynicRegs::default();
        assert!(!regs.is_enabled());
        assert!(regs.message_page().is_none());

        regs.msg_page_gpa = 0x1234_5000 | HV_SYNIC_ENABLE;
        regs.evt_page_gpa = 0x1234_6000;
        assert_eq!(regs.message_page(), Some(GuestPhysAddr::from(0x1234_5000)));
        assert!(regs.event_flags_page().is_none());

        regs.control = 1;
        assert!(regs.is_enabled());
    }
}
