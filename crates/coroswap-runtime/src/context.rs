//! Execution contexts and the table that owns them
//!
//! Every context other than idle lives in a `ContextTable` slot and is
//! referred to by `CoroutineId` everywhere else. Slots are recycled LIFO;
//! each free bumps the slot generation so stale handles stop resolving.

use coroswap_core::id::CoroutineId;

use crate::current_arch::ResumePoint;
use crate::engine::Engine;
use crate::stack::{StackImage, StackSpan};

/// Coroutine body, taken out of its context the first time it runs
pub type Body = Box<dyn FnOnce(&Engine)>;

/// One suspended or runnable coroutine (or the idle context)
pub struct Context {
    /// Heap copy of this context's stack region
    pub(crate) image: StackImage,
    /// Live region on the physical stack
    pub(crate) span: StackSpan,
    /// Where execution continues when this context is restored
    pub(crate) resume: ResumePoint,
    /// Not-yet-started body
    pub(crate) body: Option<Body>,
    pub(crate) is_blocked: bool,
}

impl Context {
    /// Context anchored at `stack_base` with an empty span
    pub fn new(stack_base: usize, image: StackImage, body: Option<Body>) -> Self {
        Self {
            image,
            span: StackSpan::at(stack_base),
            resume: ResumePoint::default(),
            body,
            is_blocked: false,
        }
    }

    /// Whether the body has not been entered yet
    #[inline]
    pub fn is_fresh(&self) -> bool {
        self.body.is_some()
    }

    #[inline]
    pub fn span(&self) -> StackSpan {
        self.span
    }

    #[inline]
    pub fn image(&self) -> &StackImage {
        &self.image
    }
}

struct Entry {
    generation: u32,
    context: Option<Box<Context>>,
}

/// Slot table owning every coroutine context
///
/// Contexts are boxed so a `ResumePoint` keeps its address while the table
/// grows; the context switch code writes to it through a raw pointer.
#[derive(Default)]
pub struct ContextTable {
    entries: Vec<Entry>,
    /// LIFO stack of free slot indices
    free: Vec<u32>,
}

impl ContextTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `context`, reusing the most recently freed slot if any
    pub fn insert(&mut self, context: Context) -> CoroutineId {
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.context = Some(Box::new(context));
            return CoroutineId::new(index, entry.generation);
        }

        let index = self.entries.len() as u32;
        self.entries.push(Entry {
            generation: 0,
            context: Some(Box::new(context)),
        });
        CoroutineId::new(index, 0)
    }

    fn entry(&self, id: CoroutineId) -> Option<&Entry> {
        self.entries
            .get(id.as_usize())
            .filter(|e| e.generation == id.generation())
    }

    pub fn get(&self, id: CoroutineId) -> Option<&Context> {
        self.entry(id).and_then(|e| e.context.as_deref())
    }

    pub fn get_mut(&mut self, id: CoroutineId) -> Option<&mut Context> {
        self.entries
            .get_mut(id.as_usize())
            .filter(|e| e.generation == id.generation())
            .and_then(|e| e.context.as_deref_mut())
    }

    /// Take a context out of the table, freeing its slot
    pub fn remove(&mut self, id: CoroutineId) -> Option<Box<Context>> {
        let entry = self
            .entries
            .get_mut(id.as_usize())
            .filter(|e| e.generation == id.generation())?;
        let context = entry.context.take()?;

        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.index());
        Some(context)
    }

    /// Handles of every context held, in slot order
    pub fn ids(&self) -> Vec<CoroutineId> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.context.is_some())
            .map(|(i, e)| CoroutineId::new(i as u32, e.generation))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl ContextTable {
        fn len(&self) -> usize {
            self.entries.iter().filter(|e| e.context.is_some()).count()
        }
    }

    fn bare() -> Context {
        Context::new(0x1000, StackImage::new(), None)
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut table = ContextTable::new();
        let a = table.insert(bare());
        let b = table.insert(bare());

        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
        assert!(table.get(a).is_some());
        assert_eq!(table.get(b).map(|c| c.span()), Some(StackSpan::at(0x1000)));
        assert_eq!(table.ids(), vec![a, b]);
    }

    #[test]
    fn test_stale_handle_does_not_resolve() {
        let mut table = ContextTable::new();
        let old = table.insert(bare());
        assert!(table.remove(old).is_some());
        assert!(table.remove(old).is_none());

        // LIFO reuse of the slot with a bumped generation
        let new = table.insert(bare());
        assert_eq!(new.index(), old.index());
        assert_ne!(new, old);
        assert!(table.get(old).is_none());
        assert!(table.get_mut(old).is_none());
        assert!(table.get_mut(new).is_some());
    }

    #[test]
    fn test_none_handle_misses() {
        let mut table = ContextTable::new();
        table.insert(bare());
        assert!(table.get(CoroutineId::NONE).is_none());
        assert!(table.remove(CoroutineId::NONE).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_fresh_until_body_taken() {
        let mut table = ContextTable::new();
        let body: Body = Box::new(|_engine| {});
        let id = table.insert(Context::new(0x2000, StackImage::new(), Some(body)));

        assert!(table.get(id).is_some_and(Context::is_fresh));
        let taken = table.get_mut(id).and_then(|c| c.body.take());
        assert!(taken.is_some());
        assert!(table.get(id).is_some_and(|c| !c.is_fresh()));
    }
}
