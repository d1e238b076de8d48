//! Stack geometry and heap-backed stack images
//!
//! - `StackDirection` - which way the physical stack grows, detected once
//! - `StackSpan` - the live region a context occupies on the physical stack
//! - `StackImage` - grow-only heap copy of that region

use std::alloc::Layout;
use std::hint::black_box;

use coroswap_core::kerror;

/// Direction in which the physical stack grows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackDirection {
    /// Deeper frames live at lower addresses (every supported target)
    Down,
    /// Deeper frames live at higher addresses
    Up,
}

impl StackDirection {
    /// Detect the growth direction by comparing a local in this frame with a
    /// local in a callee frame.
    pub fn detect() -> Self {
        let outer = 0u8;
        Self::compare_with_callee(black_box(&outer) as *const u8 as usize)
    }

    #[inline(never)]
    fn compare_with_callee(outer: usize) -> Self {
        let inner = 0u8;
        let inner = black_box(&inner) as *const u8 as usize;
        if inner < outer {
            StackDirection::Down
        } else {
            StackDirection::Up
        }
    }
}

/// Address of a fresh local in the caller's frame
///
/// Always inlined so the local belongs to the frame asking.
#[inline(always)]
pub fn here() -> usize {
    let marker = 0u8;
    black_box(&marker) as *const u8 as usize
}

/// Bounds of the live region of a context, `[low, high)`
///
/// A fresh span is empty and pinned at the stack base: both bounds equal the
/// base, and Store widens the growing end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StackSpan {
    pub low: usize,
    pub high: usize,
}

impl StackSpan {
    /// Empty span anchored at `base`
    #[inline]
    pub const fn at(base: usize) -> Self {
        Self { low: base, high: base }
    }

    /// Number of live bytes
    #[inline]
    pub const fn len(&self) -> usize {
        self.high - self.low
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.high == self.low
    }

    /// Widen the growing end so the span reaches `addr`
    ///
    /// The span only ever grows: a shallower `addr` leaves it unchanged.
    #[inline]
    pub fn widen(&mut self, direction: StackDirection, addr: usize) {
        match direction {
            StackDirection::Down => self.low = self.low.min(addr),
            StackDirection::Up => self.high = self.high.max(addr),
        }
    }

    /// Whether `[addr, addr + len]` touches `[low, high]`
    #[inline]
    pub const fn overlaps(&self, addr: usize, len: usize) -> bool {
        addr <= self.high && addr + len >= self.low
    }
}

/// Outcome of making room in an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    /// Existing capacity was enough
    Fits,
    /// A new buffer was allocated; `released` is true when a previous,
    /// smaller buffer was freed in the process
    Grew { released: bool },
}

/// Heap copy of a context's stack region
///
/// Capacity only grows, to exactly the size of the largest capture so far.
/// `len` is the logical size of the last capture and never exceeds capacity.
#[derive(Debug, Default)]
pub struct StackImage {
    buf: Box<[u8]>,
    len: usize,
}

impl StackImage {
    /// Empty image, no heap buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Image with `capacity` bytes reserved up front
    pub fn with_capacity(capacity: usize) -> Self {
        let mut image = Self::new();
        image.reserve(capacity);
        image
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes captured by the last Store
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Whether a heap buffer is held
    #[inline]
    pub fn is_allocated(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Start of the captured bytes
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.buf.as_ptr()
    }

    #[cfg(test)]
    fn bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Ensure capacity for `size` bytes
    ///
    /// A buffer that is too small is dropped and replaced by one of exactly
    /// `size` bytes. Allocation failure is fatal.
    pub fn reserve(&mut self, size: usize) -> Growth {
        if self.buf.len() >= size {
            return Growth::Fits;
        }

        let mut fresh: Vec<u8> = Vec::new();
        if fresh.try_reserve_exact(size).is_err() {
            kerror!("stack image allocation of {} bytes failed", size);
            let layout = Layout::array::<u8>(size).unwrap_or(Layout::new::<u8>());
            std::alloc::handle_alloc_error(layout);
        }
        fresh.resize(size, 0);

        let released = self.is_allocated();
        self.buf = fresh.into_boxed_slice();
        self.len = 0;
        Growth::Grew { released }
    }

    /// Copy the bytes of `span` into the image
    ///
    /// # Safety
    ///
    /// `span.low..span.high` must be readable memory.
    pub unsafe fn capture(&mut self, span: StackSpan) -> Growth {
        let size = span.len();
        let growth = self.reserve(size);
        std::ptr::copy_nonoverlapping(span.low as *const u8, self.buf.as_mut_ptr(), size);
        self.len = size;
        growth
    }

    /// Drop the heap buffer, returning whether one was held
    pub fn release(&mut self) -> bool {
        let held = self.is_allocated();
        self.buf = Box::default();
        self.len = 0;
        held
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_of(bytes: &[u8]) -> StackSpan {
        let low = bytes.as_ptr() as usize;
        StackSpan { low, high: low + bytes.len() }
    }

    #[test]
    fn test_direction_detect() {
        let direction = StackDirection::detect();
        #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
        assert_eq!(direction, StackDirection::Down);
        assert_eq!(direction, StackDirection::detect());
    }

    #[test]
    fn test_span_widen_only_grows() {
        let mut span = StackSpan::at(0x8000);
        assert!(span.is_empty());

        span.widen(StackDirection::Down, 0x7000);
        assert_eq!(span, StackSpan { low: 0x7000, high: 0x8000 });

        // Shallower store keeps the deeper bound
        span.widen(StackDirection::Down, 0x7800);
        assert_eq!(span.len(), 0x1000);

        let mut up = StackSpan::at(0x1000);
        up.widen(StackDirection::Up, 0x1400);
        assert_eq!(up, StackSpan { low: 0x1000, high: 0x1400 });
    }

    #[test]
    fn test_span_overlaps() {
        let span = StackSpan { low: 0x1000, high: 0x2000 };
        assert!(span.overlaps(0x1800, 16));
        assert!(span.overlaps(0x0ff0, 16));
        assert!(span.overlaps(0x2000, 16));
        assert!(!span.overlaps(0x0f00, 16));
        assert!(!span.overlaps(0x2001, 16));
    }

    #[test]
    fn test_capture_copies_exactly() {
        let source: Vec<u8> = (0..200u8).collect();
        let mut image = StackImage::new();
        assert!(!image.is_allocated());

        let growth = unsafe { image.capture(span_of(&source)) };
        assert_eq!(growth, Growth::Grew { released: false });
        assert_eq!(image.bytes(), &source[..]);
        assert_eq!(image.capacity(), 200);
    }

    #[test]
    fn test_capacity_is_grow_only() {
        let big = vec![0xaau8; 512];
        let small = vec![0x55u8; 64];
        let mut image = StackImage::new();

        let mut capacities = Vec::new();
        for bytes in [&small, &big, &small, &big] {
            unsafe { image.capture(span_of(bytes)) };
            capacities.push(image.capacity());
            assert!(image.len() <= image.capacity());
        }

        assert_eq!(capacities, vec![64, 512, 512, 512]);
        assert_eq!(image.bytes(), &big[..]);
    }

    #[test]
    fn test_regrow_releases_previous_buffer() {
        let mut image = StackImage::with_capacity(32);
        assert_eq!(image.capacity(), 32);
        assert_eq!(image.reserve(16), Growth::Fits);
        assert_eq!(image.reserve(64), Growth::Grew { released: true });
        assert!(image.release());
        assert!(!image.release());
    }
}
