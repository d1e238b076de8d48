//! Coroutine engine
//!
//! All coroutines share the physical stack of the thread that calls
//! [`Engine::start`]. The address of a local in `start` is the stack base;
//! every coroutine begins its frames there. Switching away from a coroutine
//! copies its live region `[low, base)` into the context's heap image
//! (Store); switching to one copies its image back into place and jumps to
//! its resume point (Restore). Only one context's bytes are on the stack at
//! a time.
//!
//! The idle context is `start`'s own frame. It is captured once per run and
//! every return to idle lands on that capture point, where the idle step
//! decides what runs next or lets `start` return.
//!
//! ```rust,ignore
//! let engine = Engine::new();
//! engine.start(|engine| {
//!     let worker = engine.spawn(|engine| {
//!         engine.block(CoroutineId::NONE).ok();
//!         kinfo!("woken");
//!     })?;
//!     engine.yield_now();
//!     engine.unblock(worker)
//! })?;
//! ```

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::hint::black_box;
use std::panic::{self, AssertUnwindSafe};

use coroswap_core::error::{EngineError, EngineResult};
use coroswap_core::id::CoroutineId;
use coroswap_core::kprint::{self, LogLevel};
use coroswap_core::state::CoroutineState;
use coroswap_core::{kdebug, kerror, kinfo, kwarn};
#[cfg(feature = "trace-switches")]
use coroswap_core::ktrace;

use crate::config::defaults::RESTORE_PROBE_BYTES;
use crate::config::EngineConfig;
use crate::context::{Body, Context, ContextTable};
use crate::current_arch::{self, ResumePoint};
use crate::platform;
use crate::run_queue::RunQueue;
use crate::stack::{self, Growth, StackDirection, StackImage, StackSpan};
use crate::stats::{bump, EngineStats, StatCounters};

/// A context as seen by the switch path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Idle,
    Coroutine(CoroutineId),
}

impl Slot {
    fn coroutine(self) -> Option<CoroutineId> {
        match self {
            Slot::Idle => None,
            Slot::Coroutine(id) => Some(id),
        }
    }
}

/// Every context the engine owns
struct Registry {
    table: ContextTable,
    idle: Box<Context>,
    alive: RunQueue,
    blocked: RunQueue,
}

impl Registry {
    fn context_mut(&mut self, slot: Slot) -> Option<&mut Context> {
        match slot {
            Slot::Idle => Some(&mut *self.idle),
            Slot::Coroutine(id) => self.table.get_mut(id),
        }
    }

    /// Detach `id` from the lists and the table
    fn take(&mut self, id: CoroutineId) -> Option<Box<Context>> {
        self.alive.remove(id);
        self.blocked.remove(id);
        self.table.remove(id)
    }
}

type IdleHook = Box<dyn FnMut(&Engine)>;
type PanicPayload = Box<dyn Any + Send + 'static>;

/// Single-threaded stack-copying coroutine engine
///
/// Not `Send` or `Sync`: the engine is tied to the stack of the thread that
/// runs it.
pub struct Engine {
    config: EngineConfig,
    direction: StackDirection,
    registry: RefCell<Registry>,
    /// `None` while stopped
    current: Cell<Option<Slot>>,
    /// Zero while stopped
    stack_base: Cell<usize>,
    idle_hook: RefCell<Option<IdleHook>>,
    in_idle_hook: Cell<bool>,
    /// First panic raised by a coroutine body in the current run
    panic: RefCell<Option<PanicPayload>>,
    stats: StatCounters,
}

/// Arguments for the capture path of a switch, on the switching frame
struct SwitchRequest<'a> {
    engine: &'a Engine,
    from: Slot,
    to: Slot,
}

/// Everything the final copy and jump need, read before the copy starts
struct RestoreTarget {
    span: StackSpan,
    src: *const u8,
    len: usize,
    point: *const ResumePoint,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Engine with compile-time defaults
    pub fn new() -> Self {
        Self::build(EngineConfig::new())
    }

    /// Engine with compile-time defaults and environment overrides
    pub fn from_env() -> EngineResult<Self> {
        Self::with_config(EngineConfig::from_env())
    }

    pub fn with_config(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: EngineConfig) -> Self {
        if config.debug_logging && !kprint::level_enabled(LogLevel::Debug) {
            kprint::set_log_level(LogLevel::Debug);
        }

        Self {
            direction: StackDirection::detect(),
            registry: RefCell::new(Registry {
                table: ContextTable::new(),
                idle: Box::new(Context::new(0, StackImage::new(), None)),
                alive: RunQueue::new(),
                blocked: RunQueue::new(),
            }),
            current: Cell::new(None),
            stack_base: Cell::new(0),
            idle_hook: RefCell::new(None),
            in_idle_hook: Cell::new(false),
            panic: RefCell::new(None),
            stats: StatCounters::default(),
            config,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Run `main` and everything it spawns on this thread's stack
    ///
    /// Returns once nothing is runnable and the idle hook (if any) made
    /// nothing runnable either. Coroutines still blocked at that point stay
    /// parked until the next `start` discards them or the engine is dropped.
    /// A panic in a coroutine body stops scheduling and is resumed here.
    #[inline(never)]
    pub fn start<F>(&self, main: F) -> EngineResult<()>
    where
        F: FnOnce(&Engine) + 'static,
    {
        if self.current.get().is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        self.discard_leftovers();

        let base = stack::here();
        if self.config.check_thread_stack {
            if let Some(bounds) = platform::current_thread_stack() {
                if !bounds.contains(base) {
                    return Err(EngineError::ForeignStack {
                        base,
                        low: bounds.low,
                        high: bounds.high,
                    });
                }
            }
        }

        {
            let _running = RunGuard { engine: self };
            self.stack_base.set(base);
            self.registry.borrow_mut().idle.span = StackSpan::at(base);
            self.current.set(Some(Slot::Idle));
            kinfo!("engine started, stack base {:#x}", base);

            let main = self.insert(Box::new(main));
            self.switch(Slot::Idle, Slot::Coroutine(main));

            // Every return to idle lands here
            self.idle_step();
        }

        let payload = self.panic.borrow_mut().take();
        if let Some(payload) = payload {
            panic::resume_unwind(payload);
        }
        Ok(())
    }

    /// Decide what runs after control came back to idle
    ///
    /// Only returns when `start` should return.
    fn idle_step(&self) {
        if self.panic.borrow().is_some() {
            kwarn!("coroutine panicked, stopping engine");
            return;
        }

        let starved = {
            let registry = self.registry.borrow();
            registry.alive.is_empty() && !registry.blocked.is_empty()
        };
        if starved {
            self.run_idle_hook();
        }

        let head = self.registry.borrow().alive.front();
        if let Some(head) = head {
            self.restore(Slot::Coroutine(head));
        }
    }

    fn run_idle_hook(&self) {
        let hook = self.idle_hook.borrow_mut().take();
        let Some(hook) = hook else {
            return;
        };

        kdebug!("nothing runnable, running idle hook");
        self.in_idle_hook.set(true);
        let mut guard = IdleHookGuard {
            engine: self,
            hook: Some(hook),
        };
        if let Some(hook) = guard.hook.as_mut() {
            hook(self);
        }
    }

    /// Callback run in the idle context when nothing is runnable but
    /// something is blocked
    ///
    /// Meant to wait for whatever the blocked coroutines wait on and unblock
    /// them. `yield_now`, `sched` and `block` are ignored while it runs.
    pub fn set_idle_hook<F>(&self, hook: F)
    where
        F: FnMut(&Engine) + 'static,
    {
        *self.idle_hook.borrow_mut() = Some(Box::new(hook));
    }

    /// Tear down and return the final counters
    pub fn shutdown(mut self) -> EngineStats {
        self.teardown();
        self.stats()
    }

    /// Release the idle image, then everything alive, then everything blocked
    fn teardown(&mut self) {
        let registry = self.registry.get_mut();
        if registry.idle.image.release() {
            bump(&self.stats.buffers_released, 1);
        }

        let alive = registry.alive.drain();
        let blocked = registry.blocked.drain();
        for id in alive.into_iter().chain(blocked).chain(registry.table.ids()) {
            if let Some(mut context) = registry.table.remove(id) {
                if context.image.release() {
                    bump(&self.stats.buffers_released, 1);
                }
                bump(&self.stats.discarded, 1);
            }
        }
    }

    /// Drop contexts left over from a previous run; their images belong to
    /// that run's stack base
    fn discard_leftovers(&self) {
        let ids = self.registry.borrow().table.ids();
        if !ids.is_empty() {
            kdebug!("discarding {} coroutines from the previous run", ids.len());
        }
        for id in ids {
            self.release(id);
            bump(&self.stats.discarded, 1);
        }
        self.panic.borrow_mut().take();
    }

    // ========================================================================
    // Coroutines
    // ========================================================================

    /// Create a coroutine at the tail of the alive list
    ///
    /// It first runs when scheduled, on a fresh frame at the stack base.
    pub fn spawn<F>(&self, body: F) -> EngineResult<CoroutineId>
    where
        F: FnOnce(&Engine) + 'static,
    {
        if self.current.get().is_none() {
            return Err(EngineError::NotRunning);
        }
        Ok(self.insert(Box::new(body)))
    }

    fn insert(&self, body: Body) -> CoroutineId {
        let image = if self.config.prealloc_image > 0 {
            bump(&self.stats.buffers_allocated, 1);
            StackImage::with_capacity(self.config.prealloc_image)
        } else {
            StackImage::new()
        };

        let mut registry = self.registry.borrow_mut();
        let id = registry
            .table
            .insert(Context::new(self.stack_base.get(), image, Some(body)));
        registry.alive.push_back(id);
        drop(registry);

        bump(&self.stats.spawned, 1);
        kdebug!("spawned coroutine {}", id);
        id
    }

    /// Park a coroutine (`NONE` = the running one) until `unblock`
    ///
    /// Blocking the running coroutine switches to the alive head, or to idle
    /// when nothing else is runnable, and returns once it is resumed.
    pub fn block(&self, id: CoroutineId) -> EngineResult<()> {
        if self.current.get().is_none() {
            return Err(EngineError::NotRunning);
        }
        if self.in_idle_hook.get() {
            return Ok(());
        }

        let running = self.running();
        let target = match (id.to_option(), running) {
            (Some(id), _) => id,
            (None, Some(running)) => running,
            (None, None) => return Err(EngineError::InvalidState("no coroutine is running")),
        };

        {
            let mut registry = self.registry.borrow_mut();
            let context = registry
                .table
                .get_mut(target)
                .ok_or(EngineError::CoroutineNotFound(target))?;
            if context.is_blocked {
                return Ok(());
            }
            context.is_blocked = true;
            registry.alive.remove(target);
            registry.blocked.push_back(target);
        }
        kdebug!("coroutine {} blocked", target);

        if running == Some(target) {
            let next = self.registry.borrow().alive.front();
            let to = next.map_or(Slot::Idle, Slot::Coroutine);
            self.switch(Slot::Coroutine(target), to);
        }
        Ok(())
    }

    /// Move a blocked coroutine to the tail of the alive list
    ///
    /// Does not switch. Unblocking a coroutine that is not blocked is a no-op.
    pub fn unblock(&self, id: CoroutineId) -> EngineResult<()> {
        if self.current.get().is_none() {
            return Err(EngineError::NotRunning);
        }

        let mut registry = self.registry.borrow_mut();
        let context = registry
            .table
            .get_mut(id)
            .ok_or(EngineError::CoroutineNotFound(id))?;
        if !context.is_blocked {
            return Ok(());
        }
        context.is_blocked = false;
        registry.blocked.remove(id);
        registry.alive.push_back(id);
        drop(registry);

        kdebug!("coroutine {} unblocked", id);
        Ok(())
    }

    /// Release a coroutine that will never run again
    pub fn discard(&self, id: CoroutineId) -> EngineResult<()> {
        if self.running() == Some(id) {
            return Err(EngineError::InvalidState("cannot discard the running coroutine"));
        }
        if !self.release(id) {
            return Err(EngineError::CoroutineNotFound(id));
        }
        bump(&self.stats.discarded, 1);
        kdebug!("coroutine {} discarded", id);
        Ok(())
    }

    /// Free a context and its image; false if `id` is unknown
    fn release(&self, id: CoroutineId) -> bool {
        let context = self.registry.borrow_mut().take(id);
        match context {
            Some(mut context) => {
                if context.image.release() {
                    bump(&self.stats.buffers_released, 1);
                }
                // Dropped outside the borrow: a pending body may own values
                // whose destructors call back into the engine
                drop(context);
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Let the next runnable coroutine run
    ///
    /// No-op when nothing but the caller is runnable, outside a coroutine, or
    /// inside the idle hook.
    pub fn yield_now(&self) {
        let Some(current) = self.switchable() else {
            return;
        };

        let next = self
            .registry
            .borrow_mut()
            .alive
            .next_after(current, self.config.policy);
        if let Some(next) = next {
            self.switch(Slot::Coroutine(current), Slot::Coroutine(next));
        }
    }

    /// Switch to `target`, or yield if `target` is `NONE`
    ///
    /// Switching to the running coroutine, a blocked one or an unknown
    /// handle is a no-op. Returns when the caller is resumed.
    pub fn sched(&self, target: CoroutineId) {
        if target.is_none() {
            return self.yield_now();
        }
        let Some(current) = self.switchable() else {
            return;
        };
        if current == target {
            return;
        }

        let runnable = self
            .registry
            .borrow()
            .table
            .get(target)
            .is_some_and(|context| !context.is_blocked);
        if runnable {
            self.switch(Slot::Coroutine(current), Slot::Coroutine(target));
        }
    }

    /// Running coroutine, if a switch away from it is allowed right now
    fn switchable(&self) -> Option<CoroutineId> {
        if self.in_idle_hook.get() {
            return None;
        }
        self.running()
    }

    fn running(&self) -> Option<CoroutineId> {
        self.current.get().and_then(Slot::coroutine)
    }

    // ========================================================================
    // Switch path
    // ========================================================================

    /// Capture `from`, Store it and Restore `to`
    ///
    /// Returns when `from` is restored later.
    #[inline(never)]
    fn switch(&self, from: Slot, to: Slot) {
        let point = match self.registry.borrow_mut().context_mut(from) {
            Some(context) => &mut context.resume as *mut ResumePoint,
            None => return,
        };
        let request = SwitchRequest { engine: self, from, to };

        // SAFETY: `point` is inside a boxed context that stays in place
        // until it is removed, which never happens to a suspended `from`
        // before it is restored. The request outlives the capture path,
        // which never returns here.
        unsafe {
            current_arch::save_and_continue(
                point,
                switch_continuation,
                &request as *const SwitchRequest<'_> as *mut u8,
            );
        }
        black_box(&request);
    }

    /// Copy the live region of `slot` into its image
    #[inline(never)]
    fn store(&self, slot: Slot) {
        let here = stack::here();
        let mut registry = self.registry.borrow_mut();
        let Some(context) = registry.context_mut(slot) else {
            return;
        };

        context.span.widen(self.direction, here);
        let size = context.span.len();
        if size > self.config.max_image_size {
            kerror!(
                "stack image of {} bytes exceeds max_image_size {} ({:?})",
                size,
                self.config.max_image_size,
                slot
            );
            std::process::abort();
        }

        // SAFETY: the span lies between a local of this frame and the stack
        // base, all of it live stack memory.
        let growth = unsafe { context.image.capture(context.span) };
        drop(registry);

        if let Growth::Grew { released } = growth {
            bump(&self.stats.buffers_allocated, 1);
            if released {
                bump(&self.stats.buffers_released, 1);
            }
        }
        self.stats.record_store(size);

        #[cfg(feature = "trace-switches")]
        ktrace!("store {:?}: {} bytes", slot, size);
    }

    /// Copy `slot`'s image back into place and resume it
    fn restore(&self, slot: Slot) -> ! {
        let target = self.prepare_restore(slot);
        // SAFETY: the target was read out of a live context; its image and
        // resume point are heap allocations that outlive the jump.
        unsafe { deepen(&target, None) }
    }

    fn prepare_restore(&self, slot: Slot) -> RestoreTarget {
        let base = self.stack_base.get();
        let mut registry = self.registry.borrow_mut();
        let Some(context) = registry.context_mut(slot) else {
            kerror!("restore of unknown context {:?}", slot);
            std::process::abort();
        };

        if !context.resume.is_set() {
            current_arch::init_entry(
                &mut context.resume,
                base,
                coroutine_entry,
                self as *const Engine as usize,
            );
        }
        let target = RestoreTarget {
            span: context.span,
            src: context.image.as_ptr(),
            len: context.image.len(),
            point: &context.resume,
        };
        drop(registry);

        self.current.set(Some(slot));
        kprint::set_coroutine_tag(slot.coroutine().map(CoroutineId::index));
        self.stats.record_restore(target.len);

        #[cfg(feature = "trace-switches")]
        ktrace!("restore {:?}: {} bytes", slot, target.len);

        target
    }

    /// Run the body of the coroutine that was just entered
    #[inline(never)]
    fn run_body(&self) {
        let Some(id) = self.running() else {
            return;
        };
        let body = self
            .registry
            .borrow_mut()
            .table
            .get_mut(id)
            .and_then(|context| context.body.take());
        let Some(body) = body else {
            return;
        };

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| body(self))) {
            kerror!("coroutine {} panicked", id);
            let mut slot = self.panic.borrow_mut();
            if slot.is_none() {
                *slot = Some(payload);
            }
        }
    }

    /// Free the finished running coroutine and return to idle
    fn retire(&self) -> ! {
        if let Some(id) = self.running() {
            self.release(id);
            bump(&self.stats.finished, 1);
            kdebug!("coroutine {} finished", id);
        }
        self.restore(Slot::Idle)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Running coroutine, or `NONE` in idle or while stopped
    pub fn current(&self) -> CoroutineId {
        self.running().into()
    }

    pub fn is_running(&self) -> bool {
        self.current.get().is_some()
    }

    /// `None` for unknown (finished, discarded or stale) handles
    pub fn state(&self, id: CoroutineId) -> Option<CoroutineState> {
        let registry = self.registry.borrow();
        let context = registry.table.get(id)?;
        let state = if self.running() == Some(id) {
            CoroutineState::Running
        } else if context.is_blocked {
            CoroutineState::Blocked
        } else if context.is_fresh() {
            CoroutineState::Created
        } else {
            CoroutineState::Ready
        };
        Some(state)
    }

    /// Alive list, head first (includes the running coroutine)
    pub fn alive(&self) -> Vec<CoroutineId> {
        self.registry.borrow().alive.iter().collect()
    }

    /// Blocked list, oldest first
    pub fn blocked(&self) -> Vec<CoroutineId> {
        self.registry.borrow().blocked.iter().collect()
    }

    /// Heap image capacity of a coroutine
    pub fn image_capacity(&self, id: CoroutineId) -> Option<usize> {
        self.registry
            .borrow()
            .table
            .get(id)
            .map(|context| context.image().capacity())
    }

    /// Stack base of the current run, zero while stopped
    pub fn stack_base(&self) -> usize {
        self.stack_base.get()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> EngineStats {
        self.stats.snapshot()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Marks the engine stopped when `start` leaves, normally or by unwinding
struct RunGuard<'a> {
    engine: &'a Engine,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let engine = self.engine;
        engine.current.set(None);
        engine.stack_base.set(0);
        engine.in_idle_hook.set(false);
        kprint::set_coroutine_tag(None);
        kinfo!("engine stopped");
    }
}

/// Holds the idle hook while it runs and puts it back afterwards, unless
/// the hook installed a replacement
struct IdleHookGuard<'a> {
    engine: &'a Engine,
    hook: Option<IdleHook>,
}

impl Drop for IdleHookGuard<'_> {
    fn drop(&mut self) {
        self.engine.in_idle_hook.set(false);
        let mut slot = self.engine.idle_hook.borrow_mut();
        if slot.is_none() {
            *slot = self.hook.take();
        }
    }
}

/// Capture path of `Engine::switch`, running below the captured frame
extern "C" fn switch_continuation(arg: *mut u8) -> ! {
    // SAFETY: `arg` is the request on the frame of `switch`, which stays
    // live until this function leaves it by jumping elsewhere.
    let request = unsafe { &*(arg as *const SwitchRequest<'_>) };
    request.engine.store(request.from);
    request.engine.restore(request.to)
}

/// First Rust frame of every coroutine
extern "C" fn coroutine_entry(arg: usize) -> ! {
    // SAFETY: `arg` is the engine address set by `prepare_restore`; the
    // engine is borrowed by `start` for as long as coroutines run.
    let engine = unsafe { &*(arg as *const Engine) };
    engine.run_body();
    engine.retire()
}

/// Grow the stack until a probe frame sits below the target's span, then
/// copy the image into place and jump
///
/// Each level passes its probe down so the frame cannot be reused by a tail
/// call.
#[inline(never)]
unsafe fn deepen(target: &RestoreTarget, above: Option<&[u8; RESTORE_PROBE_BYTES]>) -> ! {
    black_box(above);
    let probe = [0u8; RESTORE_PROBE_BYTES];
    let addr = black_box(&probe).as_ptr() as usize;

    if target.span.overlaps(addr, RESTORE_PROBE_BYTES) {
        deepen(target, Some(&probe))
    } else {
        current_arch::restore_and_resume(
            target.span.low as *mut u8,
            target.src,
            target.len,
            target.point,
        )
    }
}
