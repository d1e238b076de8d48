//! Architecture-specific save-point / resume primitives
//!
//! This is the only place that touches processor control state. Each
//! architecture module provides the same four items:
//!
//! - `ResumePoint` - callee-saved registers, stack pointer and resume address
//! - `init_entry` - prepare a point that starts a fresh coroutine through a
//!   trampoline calling `entry(arg)` with the stack pointer at `stack_top`
//! - `save_and_continue(point, then, arg)` - record the caller's control
//!   state in `point`, then call `then(arg)` deeper on the same stack. This
//!   is the "just captured" path. When `point` is later resumed, the call to
//!   `save_and_continue` returns normally: the "resumed" path.
//! - `restore_and_resume(dst, src, len, point)` - copy `len` bytes from the
//!   heap image `src` onto the physical stack at `dst`, then jump to `point`.
//!   Copying inside the routine keeps every value it needs in registers, so
//!   nothing is read from the stack region while it is being overwritten.
//!
//! Only callee-saved state is recorded: both primitives are reached through
//! ordinary calls, so the compiler already treats caller-saved registers as
//! clobbered.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub mod x86_64;
    } else if #[cfg(target_arch = "aarch64")] {
        pub mod aarch64;
    }
}

/// Continuation run on the "just captured" path of `save_and_continue`
pub type Continuation = extern "C" fn(arg: *mut u8) -> !;

/// Entry function invoked by the fresh-coroutine trampoline
pub type EntryFn = extern "C" fn(arg: usize) -> !;

#[cfg(test)]
mod tests {
    use crate::current_arch::{restore_and_resume, save_and_continue, ResumePoint};
    use std::ptr::NonNull;

    struct Probe {
        point: ResumePoint,
        bounces: u32,
    }

    extern "C" fn bounce(arg: *mut u8) -> ! {
        let probe = arg as *mut Probe;
        unsafe {
            (*probe).bounces += 1;
            let point = std::ptr::addr_of!((*probe).point);
            let nowhere = NonNull::<u8>::dangling().as_ptr();
            restore_and_resume(nowhere, nowhere, 0, point)
        }
    }

    #[test]
    fn test_save_then_resume_returns_to_caller() {
        let mut probe = Probe { point: ResumePoint::default(), bounces: 0 };
        let raw = std::ptr::addr_of_mut!(probe);

        // `bounce` runs deeper on this stack and jumps straight back, so the
        // frame of this test is untouched and needs no image.
        for _ in 0..3 {
            unsafe { save_and_continue(std::ptr::addr_of_mut!((*raw).point), bounce, raw as *mut u8) };
        }

        assert_eq!(unsafe { (*raw).bounces }, 3);
        assert!(unsafe { (*raw).point.is_set() });
    }
}
