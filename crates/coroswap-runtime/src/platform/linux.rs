//! Linux thread stack bounds via `pthread_getattr_np`

use super::StackBounds;

/// Stack bounds of the calling thread
///
/// For the main thread glibc reports the current rlimit-sized mapping.
pub fn current_thread_stack() -> Option<StackBounds> {
    unsafe {
        let mut attr: libc::pthread_attr_t = std::mem::zeroed();
        if libc::pthread_getattr_np(libc::pthread_self(), &mut attr) != 0 {
            return None;
        }

        let mut addr: *mut libc::c_void = std::ptr::null_mut();
        let mut size: libc::size_t = 0;
        let ret = libc::pthread_attr_getstack(&attr, &mut addr, &mut size);
        libc::pthread_attr_destroy(&mut attr);

        if ret != 0 || addr.is_null() {
            return None;
        }

        let low = addr as usize;
        Some(StackBounds { low, high: low + size })
    }
}
