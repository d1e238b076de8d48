//! x86_64 save-point / resume implementation (System V AMD64)
//!
//! Naked functions, stable since Rust 1.88.

use std::arch::naked_asm;

use super::{Continuation, EntryFn};
use coroswap_core::constants::STACK_ALIGN;

/// Saved control state of a suspended context
///
/// Field offsets are used by the assembly below; do not reorder.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ResumePoint {
    pub rsp: u64, // 0x00
    pub rip: u64, // 0x08
    pub rbx: u64, // 0x10
    pub rbp: u64, // 0x18
    pub r12: u64, // 0x20
    pub r13: u64, // 0x28
    pub r14: u64, // 0x30
    pub r15: u64, // 0x38
}

impl ResumePoint {
    /// Whether this point has been captured or initialized
    #[inline]
    pub fn is_set(&self) -> bool {
        self.rip != 0
    }
}

/// Prepare `point` so that resuming it calls `entry(arg)` on a fresh frame
///
/// The stack pointer is `stack_top` rounded down to 16 bytes; the trampoline
/// pushes its return address below it, so nothing at or above `stack_top` is
/// ever written.
#[inline]
pub fn init_entry(point: &mut ResumePoint, stack_top: usize, entry: EntryFn, arg: usize) {
    let aligned_sp = stack_top & !(STACK_ALIGN - 1);

    *point = ResumePoint {
        rsp: aligned_sp as u64,
        rip: coroutine_trampoline as *const () as usize as u64,
        rbx: 0,
        rbp: 0,
        r12: entry as *const () as usize as u64,
        r13: arg as u64,
        r14: 0,
        r15: 0,
    };
}

/// First instruction of every coroutine
///
/// rsp is 16-byte aligned on entry, so the `call` leaves the callee with the
/// usual `rsp % 16 == 8`.
#[unsafe(naked)]
unsafe extern "C" fn coroutine_trampoline() -> ! {
    naked_asm!(
        "mov rdi, r13",
        "call r12",
        "ud2",
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
        // rsp points at our return address; resuming pops it with `ret`
        "mov [rdi + 0x00], rsp",
        "lea rax, [rip + 2f]",
        "mov [rdi + 0x08], rax",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], rbp",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], r13",
        "mov [rdi + 0x30], r14",
        "mov [rdi + 0x38], r15",
        // then(arg), with rsp realigned to 16 before the call
        "mov rdi, rdx",
        "sub rsp, 8",
        "call rsi",
        "ud2",
        // Resume point
        "2:",
        "ret",
    );
}

/// Copy `len` bytes from `src` to `dst`, then resume `point`
///
/// # Safety
///
/// `dst..dst+len` must not overlap the caller's frame or this call's return
/// address slot. `point` must hold a captured or initialized state whose
/// stack is the region being written.
#[unsafe(naked)]
pub unsafe extern "C" fn restore_and_resume(
    _dst: *mut u8,
    _src: *const u8,
    _len: usize,
    _point: *const ResumePoint,
) -> ! {
    naked_asm!(
        // rdi = dst, rsi = src, rdx = len, rcx = point
        "mov rax, rcx",
        "mov rcx, rdx",
        "rep movsb",
        "mov rsp, [rax + 0x00]",
        "mov rbx, [rax + 0x10]",
        "mov rbp, [rax + 0x18]",
        "mov r12, [rax + 0x20]",
        "mov r13, [rax + 0x28]",
        "mov r14, [rax + 0x30]",
        "mov r15, [rax + 0x38]",
        "jmp qword ptr [rax + 0x08]",
    );
}
