//! Decoding of SynIC-related guest exits.

use crate::hv::{
    hypercall_code, HV_POST_MESSAGE, HV_SIGNAL_EVENT, HV_STATUS_INVALID_HYPERCALL_CODE,
    HV_X64_MSR_SCONTROL, HV_X64_MSR_SIEFP, HV_X64_MSR_SIMP,
};
use crate::vcpu::SynicVcpu;

/// A Hyper-V related exit reported by the host for one vCPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HvExit {
    /// The guest wrote a SynIC register.
    Synic {
        /// The MSR address written.
        msr: u32,
        /// The value written.
        value: u64,
    },
    /// The guest issued a hypercall the host left to userspace.
    Hcall {
        /// Hypercall input value; the low 16 bits are the call code.
        input: u64,
        /// Hypercall status returned to the guest. Filled in by the dispatcher.
        result: u64,
        /// Input and output parameter addresses.
        params: [u64; 2],
    },
    /// Any other Hyper-V exit type, identified by its raw code.
    Other(u32),
}

/// Whether an exit was consumed by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The exit was handled; the vCPU can be resumed.
    Handled,
    /// The exit is not understood here and must be escalated by the caller.
    Unhandled,
}

/// Applies a Hyper-V exit to the SynIC state of `vcpu`.
///
/// Register writes are stored verbatim. Hypercalls are answered with
/// `HV_STATUS_INVALID_HYPERCALL_CODE` whatever their code: message posting and
/// event signaling are not provided yet.
pub fn dispatch_synic_exit(vcpu: &mut SynicVcpu, exit: &mut HvExit) -> ExitOutcome {
    match exit {
        HvExit::Synic { msr, value } => {
            if !vcpu.synic_enabled() {
                warn!(
                    "vp {}: SynIC write to msr {:#x} without SynIC",
                    vcpu.vp_index(),
                    msr
                );
                return ExitOutcome::Unhandled;
            }
            let vp_index = vcpu.vp_index();
            let regs = vcpu.regs_mut();
            let reg = match *msr {
                HV_X64_MSR_SCONTROL => &mut regs.control,
                HV_X64_MSR_SIMP => &mut regs.msg_page_gpa,
                HV_X64_MSR_SIEFP => &mut regs.evt_page_gpa,
                _ => {
                    warn!("vp {vp_index}: unhandled SynIC msr {msr:#x} <- {value:#x}");
                    return ExitOutcome::Unhandled;
                }
            };
            *reg = *value;
            trace!("vp {vp_index}: SynIC msr {msr:#x} <- {value:#x}");
            ExitOutcome::Handled
        }
        HvExit::Hcall { input, result, .. } => {
            let code = hypercall_code(*input);
            match code {
                HV_POST_MESSAGE | HV_SIGNAL_EVENT => {
                    trace!("vp {}: hypercall {:#x} not supported", vcpu.vp_index(), code);
                }
                _ => {
                    debug!("vp {}: unknown hypercall {:#x}", vcpu.vp_index(), code);
                }
            }
            *result = HV_STATUS_INVALID_HYPERCALL_CODE;
            ExitOutcome::Handled
        }
        HvExit::Other(kind) => {
            warn!("vp {}: unhandled Hyper-V exit type {}", vcpu.vp_index(), kind);
            ExitOutcome::Unhandled
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcpu::SynicRegs;

    fn hcall(input: u64) -> HvExit {
        HvExit::Hcall {
            input,
            result: 0,
            params: [0; 2],
        }
    }

    fn result_of(exit: &HvExit) -> u64 {
        match exit {
            HvExit::Hcall { result, .. } => *result,
            _ => panic!("not a hypercall exit"),
        }
    }

    #[test]
    fn test_control_write() {
        let mut vcpu = SynicVcpu::new(0, true);
        let mut exit = HvExit::Synic {
            msr: HV_X64_MSR_SCONTROL,
            value: 0xdead_beef_0000_0001,
        };

        assert_eq!(dispatch_synic_exit(&mut vcpu, &mut exit), ExitOutcome::Handled);
        assert_eq!(vcpu.regs().control, 0xdead_beef_0000_0001);
        assert_eq!(vcpu.regs().msg_page_gpa, 0);
        assert_eq!(vcpu.regs().evt_page_gpa, 0);
    }

    #[test]
    fn test_page_writes_are_independent() {
        let mut vcpu = SynicVcpu::new(1, true);

        let mut simp = HvExit::Synic {
            msr: HV_X64_MSR_SIMP,
            value: 0x8000_1001,
        };
        let mut siefp = HvExit::Synic {
            msr: HV_X64_MSR_SIEFP,
            value: 0x8000_2001,
        };
        assert_eq!(dispatch_synic_exit(&mut vcpu, &mut simp), ExitOutcome::Handled);
        assert_eq!(dispatch_synic_exit(&mut vcpu, &mut siefp), ExitOutcome::Handled);

        // Last write wins, reserved bits are kept.
        let mut simp2 = HvExit::Synic {
            msr: HV_X64_MSR_SIMP,
            value: 0xffff_ffff_ffff_ffff,
        };
        assert_eq!(dispatch_synic_exit(&mut vcpu, &mut simp2), ExitOutcome::Handled);

        assert_eq!(
            *vcpu.regs(),
            SynicRegs {
                control: 0,
                msg_page_gpa: 0xffff_ffff_ffff_ffff,
                evt_page_gpa: 0x8000_2001,
            }
        );
    }

    #[test]
    fn test_unknown_msr_is_unhandled() {
        let mut vcpu = SynicVcpu::new(0, true);
        let mut exit = HvExit::Synic {
            msr: crate::hv::HV_X64_MSR_SVERSION,
            value: 7,
        };

        assert_eq!(dispatch_synic_exit(&mut vcpu, &mut exit), ExitOutcome::Unhandled);
        assert_eq!(*vcpu.regs(), SynicRegs::default());
    }

    #[test]
    fn test_synic_disabled() {
        let mut vcpu = SynicVcpu::new(0, false);
        let mut exit = HvExit::Synic {
            msr: HV_X64_MSR_SCONTROL,
            value: 1,
        };

        assert_eq!(dispatch_synic_exit(&mut vcpu, &mut exit), ExitOutcome::Unhandled);
        assert_eq!(vcpu.regs().control, 0);

        // Hypercalls do not depend on the SynIC being exposed.
        let mut call = hcall(HV_POST_MESSAGE as u64);
        assert_eq!(dispatch_synic_exit(&mut vcpu, &mut call), ExitOutcome::Handled);
    }

    #[test]
    fn test_hypercalls_are_rejected() {
        let mut vcpu = SynicVcpu::new(0, true);

        for input in [
            0x0001,
            HV_POST_MESSAGE as u64,
            HV_SIGNAL_EVENT as u64,
            0x0123_0000_0000_005c,
            0xffff,
        ] {
            let mut exit = hcall(input);
            assert_eq!(dispatch_synic_exit(&mut vcpu, &mut exit), ExitOutcome::Handled);
            assert_eq!(result_of(&exit), HV_STATUS_INVALID_HYPERCALL_CODE);
        }
        assert_eq!(*vcpu.regs(), SynicRegs::default());
    }

    #[test]
    fn test_other_exit_is_unhandled() {
        let mut vcpu = SynicVcpu::new(0, true);
        let mut exit = HvExit::Other(3);
        assert_eq!(dispatch_synic_exit(&mut vcpu, &mut exit), ExitOutcome::Unhandled);
        assert_eq!(exit, HvExit::Other(3));
    }
}
