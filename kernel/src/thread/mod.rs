// SPDX-License-Identifier: MPL-2.0

//! Kernel threads.
//!
//! A [`Thread`] is the control block of one schedulable context: identity,
//! priorities, affinity, the saved task context, its kernel and signal
//! stacks, the intrusive node through which the scheduler and the sync
//! primitives queue it, and the mutable lifecycle state behind the
//! per-thread lock.
//!
//! Threads are owned by the global registry in [`thread_table`]; every
//! other reference (joiner links, parent/children, queue payloads) is a
//! [`Weak`] handle, which keeps the otherwise cyclic thread graph acyclic.

use core::{
    cell::UnsafeCell,
    sync::atomic::{AtomicBool, Ordering},
};

use silene_frame::{
    config::{KERNEL_STACK_SIZE, SIGNAL_STACK_SIZE},
    task::{KernelStack, TaskContext},
    time,
};

use crate::{fs::FdTable, prelude::*, sched};

pub mod signal;
pub mod thread_table;

pub use signal::SigSet;
pub use thread_table::{snapshot, ThreadSnapshot};

pub type Tid = u32;

/// Whether a thread runs kernel code only or backs a user context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadKind {
    Kernel,
    User,
}

/// The lifecycle state of a thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Ready,
    Sleeping,
    Waiting,
    Joining,
    Zombie,
}

impl ThreadState {
    pub fn as_str(self) -> &'static str {
        match self {
            ThreadState::Running => "RUNNING",
            ThreadState::Ready => "READY",
            ThreadState::Sleeping => "SLEEPING",
            ThreadState::Waiting => "WAITING",
            ThreadState::Joining => "JOINING",
            ThreadState::Zombie => "ZOMBIE",
        }
    }
}

/// What kind of resource a `Waiting` thread is blocked on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    Semaphore,
    Mutex,
}

/// Why a thread exited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitCause {
    /// The entry function returned.
    Returned,
    /// The thread was terminated by a kill signal.
    Killed,
}

/// The value and cause a thread exited with, as reported through `join`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExitStatus {
    pub value: usize,
    pub cause: ExitCause,
}

/// A bounded thread name.
#[derive(Clone, Copy)]
pub struct ThreadName {
    bytes: [u8; silene_frame::config::MAX_THREAD_NAME_LEN],
    len: usize,
}

impl ThreadName {
    pub fn new(name: &str) -> Self {
        let mut bytes = [0u8; silene_frame::config::MAX_THREAD_NAME_LEN];
        let mut len = name.len().min(bytes.len());
        // Do not cut a multi-byte character in half.
        while len > 0 && !name.is_char_boundary(len) {
            len -= 1;
        }
        bytes[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self { bytes, len }
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.bytes[..self.len]).unwrap_or("")
    }
}

impl Debug for ThreadName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

type EntryFn = Box<dyn FnOnce() -> usize + Send + 'static>;

/// A resource a thread currently holds; released when the thread is
/// cleaned, in reverse registration order.
pub(crate) struct HeldResource {
    release: Box<dyn FnOnce() + Send>,
}

/// The control block of a kernel thread.
pub struct Thread {
    tid: Tid,
    name: ThreadName,
    kind: ThreadKind,
    static_priority: Priority,
    kstack: KernelStack,
    signal_stack: KernelStack,
    ctx: UnsafeCell<TaskContext>,
    entry: SpinLock<Option<EntryFn>>,
    // The node through which this thread sits in exactly one of: a ready
    // list, a sleep list, a waiter list, or the zombie list.
    sched_node: Arc<PrioNode<Weak<Thread>>>,
    fd_table: Arc<FdTable>,
    inner: SpinLock<ThreadInner>,
    request_schedule: AtomicBool,
    preemption_disabled: AtomicBool,
    // False while the thread's context is live on a CPU; dispatchers must
    // not restore a context that is not fully saved yet.
    ctx_saved: AtomicBool,
    pending_signals: signal::PendingSignals,
}

// SAFETY: the `UnsafeCell<TaskContext>` is only touched by the scheduler
// while it has exclusive ownership of the thread (elected but not yet
// running, or current on this CPU).
unsafe impl Sync for Thread {}

pub(crate) struct ThreadInner {
    pub(crate) state: ThreadState,
    pub(crate) effective_priority: Priority,
    pub(crate) affinity: CpuSet,
    pub(crate) sched_cpu: u32,
    pub(crate) wake_deadline_ns: u64,
    pub(crate) block_kind: Option<BlockKind>,
    pub(crate) joiner: Option<Weak<Thread>>,
    pub(crate) joined: Option<Weak<Thread>>,
    pub(crate) parent: Option<Weak<Thread>>,
    pub(crate) children: Vec<Weak<Thread>>,
    pub(crate) exit: Option<ExitStatus>,
    pub(crate) resources: Vec<HeldResource>,
    pub(crate) start_ns: u64,
    pub(crate) end_ns: u64,
}

impl Thread {
    /// Returns the current thread, or `None` in an idle (bootstrap)
    /// context.
    pub fn current() -> Option<Arc<Thread>> {
        sched::current_thread()
    }

    pub fn tid(&self) -> Tid {
        self.tid
    }

    pub fn name(&self) -> &ThreadName {
        &self.name
    }

    pub fn kind(&self) -> ThreadKind {
        self.kind
    }

    pub fn static_priority(&self) -> Priority {
        self.static_priority
    }

    pub fn effective_priority(&self) -> Priority {
        self.inner.lock().effective_priority
    }

    pub fn state(&self) -> ThreadState {
        self.inner.lock().state
    }

    pub fn affinity(&self) -> CpuSet {
        self.inner.lock().affinity.clone()
    }

    pub fn sched_cpu(&self) -> u32 {
        self.inner.lock().sched_cpu
    }

    pub fn fd_table(&self) -> &Arc<FdTable> {
        &self.fd_table
    }

    /// Registers a resource to be released when the thread is cleaned.
    pub fn push_resource(&self, release: impl FnOnce() + Send + 'static) {
        self.inner.lock().resources.push(HeldResource {
            release: Box::new(release),
        });
    }

    pub(crate) fn lock(&self) -> SpinLockGuard<'_, ThreadInner> {
        self.inner.lock()
    }

    pub(crate) fn sched_node(&self) -> &Arc<PrioNode<Weak<Thread>>> {
        &self.sched_node
    }

    pub(crate) fn ctx_ptr(&self) -> *mut TaskContext {
        self.ctx.get()
    }

    pub(crate) fn set_request_schedule(&self) {
        self.request_schedule.store(true, Ordering::Relaxed);
    }

    pub(crate) fn clear_request_schedule(&self) {
        self.request_schedule.store(false, Ordering::Relaxed);
    }

    pub(crate) fn take_request_schedule(&self) -> bool {
        self.request_schedule.swap(false, Ordering::Relaxed)
    }

    pub(crate) fn is_ctx_saved(&self) -> bool {
        self.ctx_saved.load(Ordering::Acquire)
    }

    pub(crate) fn set_ctx_saved(&self, saved: bool) {
        self.ctx_saved.store(saved, Ordering::Release);
    }

    pub fn preemption_disabled(&self) -> bool {
        self.preemption_disabled.load(Ordering::Relaxed)
    }

    pub(crate) fn set_preemption_disabled(&self, disabled: bool) {
        self.preemption_disabled.store(disabled, Ordering::Relaxed);
    }

    pub(crate) fn post_signal(&self, signals: SigSet) {
        self.pending_signals.post(signals);
    }

    pub(crate) fn take_signal(&self, signals: SigSet) -> bool {
        self.pending_signals.take(signals)
    }

    pub(crate) fn signal_stack_top(&self) -> usize {
        self.signal_stack.top()
    }
}

impl Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("tid", &self.tid)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Options to create or spawn a new thread.
pub struct ThreadOptions {
    entry: Option<EntryFn>,
    name: ThreadName,
    kind: ThreadKind,
    priority: Priority,
    affinity: CpuSet,
    fd_table: Option<Arc<FdTable>>,
}

impl ThreadOptions {
    pub fn new<F>(entry: F) -> Self
    where
        F: FnOnce() -> usize + Send + 'static,
    {
        Self {
            entry: Some(Box::new(entry)),
            name: ThreadName::new("unnamed"),
            kind: ThreadKind::Kernel,
            priority: Priority::lowest(),
            affinity: CpuSet::new_empty(),
            fd_table: None,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = ThreadName::new(name);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Restricts the thread to the given CPUs. An empty set (the default)
    /// means no restriction.
    pub fn affinity(mut self, affinity: CpuSet) -> Self {
        self.affinity = affinity;
        self
    }

    pub fn kind(mut self, kind: ThreadKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn fd_table(mut self, fd_table: Arc<FdTable>) -> Self {
        self.fd_table = Some(fd_table);
        self
    }

    /// Builds the thread without making it ready.
    pub fn build(self) -> Result<Arc<Thread>> {
        if self.priority.is_none() {
            return_errno_with_message!(Errno::IncorrectValue, "invalid thread priority");
        }
        let kstack = KernelStack::with_size(KERNEL_STACK_SIZE)?;
        let signal_stack = KernelStack::with_size(SIGNAL_STACK_SIZE)?;
        let mut ctx = TaskContext::new();
        ctx.set_entry(kernel_thread_entry, kstack.top());

        let parent = Thread::current();
        let fd_table = self
            .fd_table
            .or_else(|| parent.as_ref().map(|p| p.fd_table.clone()))
            .unwrap_or_else(|| Arc::new(FdTable::new()));

        let tid = thread_table::allocate_tid();
        let entry = self.entry;
        let thread = Arc::new_cyclic(|weak| Thread {
            tid,
            name: self.name,
            kind: self.kind,
            static_priority: self.priority,
            kstack,
            signal_stack,
            ctx: UnsafeCell::new(ctx),
            entry: SpinLock::new(entry),
            sched_node: PrioNode::new(weak.clone()),
            fd_table,
            inner: SpinLock::new(ThreadInner {
                state: ThreadState::Ready,
                effective_priority: self.priority,
                affinity: self.affinity,
                sched_cpu: 0,
                wake_deadline_ns: 0,
                block_kind: None,
                joiner: None,
                joined: None,
                parent: parent.as_ref().map(Arc::downgrade),
                children: Vec::new(),
                exit: None,
                resources: Vec::new(),
                start_ns: 0,
                end_ns: 0,
            }),
            request_schedule: AtomicBool::new(false),
            preemption_disabled: AtomicBool::new(false),
            ctx_saved: AtomicBool::new(true),
            pending_signals: signal::PendingSignals::new(),
        });

        if let Some(parent) = parent {
            parent.inner.lock().children.push(Arc::downgrade(&thread));
        }
        thread_table::add(thread.clone());
        Ok(thread)
    }

    /// Builds the thread and releases it to the scheduler.
    pub fn spawn(self) -> Result<Arc<Thread>> {
        let thread = self.build()?;
        sched::release_thread(&thread);
        Ok(thread)
    }
}

/// The entry wrapper every kernel thread starts in.
pub(crate) extern "C" fn kernel_thread_entry() -> ! {
    // The switching side left interrupts masked and a predecessor whose
    // context is now fully saved.
    sched::finish_switch();
    silene_frame::trap::enable_local();

    let thread = Thread::current().expect("entered a thread context with no current thread");
    thread.inner.lock().start_ns = time::uptime_ns();
    let entry = thread
        .entry
        .lock()
        .take()
        .expect("a thread entry ran twice");
    let value = entry();
    exit_current(value, ExitCause::Returned)
}

/// The entry the kill signal redirects a thread to, running on its signal
/// stack.
pub(crate) extern "C" fn kill_signal_entry() -> ! {
    sched::finish_switch();
    silene_frame::trap::enable_local();
    exit_current(0, ExitCause::Killed)
}

/// The exit point. Marks the current thread a zombie, hands its children to
/// its parent, wakes its joiner if any, and schedules away for good.
pub(crate) fn exit_current(value: usize, cause: ExitCause) -> ! {
    let thread = Thread::current().expect("exit with no current thread");

    let (joiner, children, parent) = {
        let mut inner = thread.inner.lock();
        debug_assert_ne!(inner.state, ThreadState::Zombie);
        inner.state = ThreadState::Zombie;
        inner.end_ns = time::uptime_ns();
        inner.exit = Some(ExitStatus { value, cause });
        (
            inner.joiner.take(),
            core::mem::take(&mut inner.children),
            inner.parent.clone(),
        )
    };

    // Orphaned children move to this thread's parent.
    for child in children {
        let Some(child) = child.upgrade() else { continue };
        child.inner.lock().parent = parent.clone();
        if let Some(parent) = parent.as_ref().and_then(Weak::upgrade) {
            parent.inner.lock().children.push(Arc::downgrade(&child));
        }
    }

    sched::push_zombie(&thread);

    if let Some(joiner) = joiner.and_then(|weak| weak.upgrade()) {
        sched::release_thread(&joiner);
    }

    drop(thread);
    sched::schedule();
    unreachable!("a zombie thread was scheduled again");
}

/// Puts the current thread to sleep for at least `duration_ns`
/// nanoseconds.
///
/// Not allowed from an idle context.
pub fn sleep(duration_ns: u64) -> Result<()> {
    let thread = Thread::current()
        .ok_or(Error::with_message(Errno::UnauthorizedAction, "idle cannot sleep"))?;
    let deadline = time::uptime_ns() + duration_ns;
    {
        let mut inner = thread.inner.lock();
        inner.state = ThreadState::Sleeping;
        inner.wake_deadline_ns = deadline;
    }
    sched::push_sleeper(&thread, deadline);
    sched::schedule();
    Ok(())
}

/// Waits for `target` to exit, reaps it, and returns its exit status.
///
/// Joining yourself, joining from an idle context, or joining a thread that
/// already has a joiner is unauthorized. Each thread can be joined exactly
/// once; the join cleans the target for good.
pub fn join(target: &Arc<Thread>) -> Result<ExitStatus> {
    let current = Thread::current().ok_or(Error::with_message(
        Errno::UnauthorizedAction,
        "idle cannot join",
    ))?;
    if Arc::ptr_eq(&current, target) {
        return_errno_with_message!(Errno::UnauthorizedAction, "a thread cannot join itself");
    }

    // Block first, then publish the joiner link: if the target exits the
    // moment the link is visible, its wake finds us already joinable.
    {
        let mut inner = current.inner.lock();
        inner.state = ThreadState::Joining;
        inner.joined = Some(Arc::downgrade(target));
    }

    {
        let mut inner = target.inner.lock();
        if inner.state == ThreadState::Zombie {
            let status = inner.exit.expect("zombie without exit status");
            drop(inner);
            let mut cur = current.inner.lock();
            cur.state = ThreadState::Running;
            cur.joined = None;
            drop(cur);
            reap(target);
            return Ok(status);
        }
        if inner.joiner.is_some() {
            let mut cur = current.inner.lock();
            cur.state = ThreadState::Running;
            cur.joined = None;
            drop(cur);
            return_errno_with_message!(Errno::UnauthorizedAction, "thread already has a joiner");
        }
        inner.joiner = Some(Arc::downgrade(&current));
    }

    sched::schedule();

    // Woken: the target has exited.
    current.inner.lock().joined = None;
    let status = {
        let inner = target.inner.lock();
        debug_assert_eq!(inner.state, ThreadState::Zombie);
        inner.exit.expect("joined thread did not record an exit status")
    };
    reap(target);
    Ok(status)
}

fn reap(target: &Arc<Thread>) {
    sched::remove_zombie(target);
    clean_thread(target);
}

/// Frees everything a reaped thread owns: its held resources are released
/// in reverse registration order and its registry entry dropped. The
/// stacks, the contexts and the control block itself are freed when the
/// last handle goes away. A thread never cleans itself.
pub(crate) fn clean_thread(thread: &Arc<Thread>) {
    debug_assert_eq!(thread.state(), ThreadState::Zombie);
    if let Some(current) = Thread::current() {
        assert!(
            !Arc::ptr_eq(&current, thread),
            "a thread must never clean itself"
        );
    }
    let resources = core::mem::take(&mut thread.inner.lock().resources);
    for resource in resources.into_iter().rev() {
        (resource.release)();
    }
    thread_table::remove(thread.tid());
}

/// Terminates `target`.
///
/// Terminating yourself runs the exit point directly. Otherwise the target
/// gets a kill signal: it runs its exit handler the next time it is
/// elected, and a target blocked on a primitive still unblocks through the
/// primitive's normal release path first.
pub fn terminate(target: &Arc<Thread>) -> Result<()> {
    if let Some(current) = Thread::current() {
        if Arc::ptr_eq(&current, target) {
            drop(current);
            exit_current(0, ExitCause::Killed);
        }
    }

    if target.inner.lock().state == ThreadState::Zombie {
        return Ok(());
    }
    target.post_signal(SigSet::KILL);
    sched::kick(target);
    Ok(())
}
