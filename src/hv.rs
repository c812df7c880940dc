//! Guest-visible Hyper-V definitions used by the SynIC.
//!
//! Values follow the Hyper-V Top Level Functional Specification and must not
//! be changed: guests program them directly.

/// SynIC control register (`SCONTROL`).
pub const HV_X64_MSR_SCONTROL: u32 = 0x4000_0080;
/// SynIC version register (`SVERSION`), read-only and never routed here.
pub const HV_X64_MSR_SVERSION: u32 = 0x4000_0081;
/// SynIC event flags page register (`SIEFP`).
pub const HV_X64_MSR_SIEFP: u32 = 0x4000_0082;
/// SynIC message page register (`SIMP`).
pub const HV_X64_MSR_SIMP: u32 = 0x4000_0083;

/// Enable bit shared by `SCONTROL`, `SIMP` and `SIEFP`.
pub const HV_SYNIC_ENABLE: u64 = 1 << 0;

/// `HvPostMessage` hypercall code.
pub const HV_POST_MESSAGE: u16 = 0x005c;
/// `HvSignalEvent` hypercall code.
pub const HV_SIGNAL_EVENT: u16 = 0x005d;

/// Hypercall status: the call code is not recognized.
pub const HV_STATUS_INVALID_HYPERCALL_CODE: u64 = 2;

/// Extracts the call code from a hypercall input value.
#[inline]
pub const fn hypercall_code(input: u64) -> u16 {
    (input & 0xffff) as u16
}
