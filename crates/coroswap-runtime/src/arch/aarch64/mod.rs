//! aarch64 save-point / resume implementation (AAPCS64)
//!
//! Linux and macOS (Apple Silicon). x18 is never touched, it is the platform
//! register on Darwin.

use std::arch::naked_asm;

use super::{Continuation, EntryFn};
use coroswap_core::constants::STACK_ALIGN;

/// Saved control state of a suspended context
///
/// Field offsets are used by the assembly below; do not reorder.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ResumePoint {
    pub sp: u64,            // 0x00
    pub pc: u64,            // 0x08
    pub x19_x28: [u64; 10], // 0x10..0x60
    pub fp: u64,            // 0x60 (x29)
    pub lr: u64,            // 0x68 (x30)
    pub d8_d15: [u64; 8],   // 0x70..0xb0
}

impl ResumePoint {
    /// Whether this point has been captured or initialized
    #[inline]
    pub fn is_set(&self) -> bool {
        self.pc != 0
    }
}

/// Prepare `point` so that resuming it calls `entry(arg)` on a fresh frame
///
/// The trampoline finds `entry` in x19 and `arg` in x20.
#[inline]
pub fn init_entry(point: &mut ResumePoint, stack_top: usize, entry: EntryFn, arg: usize) {
    let aligned_sp = stack_top & !(STACK_ALIGN - 1);

    let mut regs = [0u64; 10];
    regs[0] = entry as *const () as usize as u64;
    regs[1] = arg as u64;

    *point = ResumePoint {
        sp: aligned_sp as u64,
        pc: coroutine_trampoline as *const () as usize as u64,
        x19_x28: regs,
        fp: 0,
        lr: 0,
        d8_d15: [0; 8],
    };
}

/// First instruction of every coroutine
#[unsafe(naked)]
unsafe extern "C" fn coroutine_trampoline() -> ! {
    naked_asm!(
        "mov x0, x20",
        "blr x19",
        "brk #0",
    );
}

/// Record the caller's control state in `point`, then run `then(arg)`
///
/// `then` must never return. Resuming `point` makes this function return
/// to its caller.
///
/// # Safety
///
/// `point` must be valid for writes. The caller's frame must be preserved
/// (or restored byte-for-byte) until `point` is resumed.
#[unsafe(naked)]
pub unsafe extern "C" fn save_and_continue(
    _point: *mut ResumePoint,
    _then: Continuation,
    _arg: *mut u8,
) {
    naked_asm!(
        // x0 = point, x1 = then, x2 = arg
        "mov x9, sp",
        "str x9, [x0, #0x00]",
        "adr x9, 2f",
        "str x9, [x0, #0x08]",
        "stp x19, x20, [x0, #0x10]",
        "stp x21, x22, [x0, #0x20]",
        "stp x23, x24, [x0, #0x30]",
        "stp x25, x26, [x0, #0x40]",
        "stp x27, x28, [x0, #0x50]",
        "stp x29, x30, [x0, #0x60]",
        "stp d8, d9, [x0, #0x70]",
        "stp d10, d11, [x0, #0x80]",
        "stp d12, d13, [x0, #0x90]",
        "stp d14, d15, [x0, #0xa0]",
        // then(arg); sp is still 16-byte aligned
        "mov x0, x2",
        "blr x1",
        "brk #0",
        // Resume point: x30 holds our caller's return address again
        "2:",
        "ret",
    );
}

/// Copy `len` bytes from `src` to `dst`, then resume `point`
///
/// # Safety
///
/// `dst..dst+len` must not overlap the caller's frame. `point` must hold a
/// captured or initialized state whose stack is the region being written.
#[unsafe(naked)]
pub unsafe extern "C" fn restore_and_resume(
    _dst: *mut u8,
    _src: *const u8,
    _len: usize,
    _point: *const ResumePoint,
) -> ! {
    naked_asm!(
        // x0 = dst, x1 = src, x2 = len, x3 = point
        "cbz x2, 3f",
        "4:",
        "ldrb w9, [x1], #1",
        "strb w9, [x0], #1",
        "subs x2, x2, #1",
        "b.ne 4b",
        "3:",
        "ldr x9, [x3, #0x00]",
        "mov sp, x9",
        "ldr x10, [x3, #0x08]",
        "ldp x19, x20, [x3, #0x10]",
        "ldp x21, x22, [x3, #0x20]",
        "ldp x23, x24, [x3, #0x30]",
        "ldp x25, x26, [x3, #0x40]",
        "ldp x27, x28, [x3, #0x50]",
        "ldp x29, x30, [x3, #0x60]",
        "ldp d8, d9, [x3, #0x70]",
        "ldp d10, d11, [x3, #0x80]",
        "ldp d12, d13, [x3, #0x90]",
        "ldp d14, d15, [x3, #0xa0]",
        "br x10",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn never(_arg: usize) -> ! {
        std::process::abort()
    }

    #[test]
    fn test_resume_point_layout() {
        assert_eq!(std::mem::size_of::<ResumePoint>(), 0xb0);
        assert_eq!(std::mem::offset_of!(ResumePoint, fp), 0x60);
        assert_eq!(std::mem::offset_of!(ResumePoint, d8_d15), 0x70);
    }

    #[test]
    fn test_init_entry_aligns_stack() {
        let mut point = ResumePoint::default();
        init_entry(&mut point, 0xffff_1239, never, 7);

        assert!(point.is_set());
        assert_eq!(point.sp, 0xffff_1230);
        assert_eq!(point.x19_x28[1], 7);
    }
}
