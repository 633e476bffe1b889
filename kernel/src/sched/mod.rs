// SPDX-License-Identifier: MPL-2.0

//! The thread scheduler.
//!
//! Strict priority preemptive scheduling with per-CPU ready queues; the
//! lowest priority number wins, equal priorities round-robin. Between
//! CPUs, a released thread goes to the CPU with the lowest `cpu_load`
//! within its affinity mask, where `cpu_load` counts how often a CPU has
//! been electing its idle context lately.
//!
//! Each CPU makes scheduling decisions independently; cross-CPU influence
//! travels as reschedule IPIs. Within a CPU the periodic tick sets the
//! current thread's `request_schedule` flag, and the actual switch happens
//! at the next scheduling point: an explicit [`schedule`], a blocking
//! operation, or the interrupt-return path on bare metal.

mod processor;
mod run_queue;
mod sleep_queue;
mod zombie;

use core::sync::atomic::{AtomicBool, Ordering};

use silene_frame::{
    cpu::{num_cpus, this_cpu},
    smp::{self, IpiRequest},
    time,
    trap::disable_local,
};

use self::{processor::Processor, run_queue::RunQueue, sleep_queue::SleepQueue, zombie::ZombieList};
use crate::{
    prelude::*,
    thread::{kill_signal_entry, SigSet, Thread, ThreadState},
};

pub(crate) use processor::finish_switch;

struct PerCpu {
    run_queue: RunQueue,
    sleep: SleepQueue,
    processor: Processor,
}

static PER_CPU: spin::Once<Vec<PerCpu>> = spin::Once::new();
static STARTED: AtomicBool = AtomicBool::new(false);

lazy_static! {
    static ref ZOMBIES: ZombieList = ZombieList::new();
}

pub(crate) fn init() {
    PER_CPU.call_once(|| {
        (0..num_cpus())
            .map(|_| PerCpu {
                run_queue: RunQueue::new(),
                sleep: SleepQueue::new(),
                processor: Processor::new(),
            })
            .collect()
    });
    smp::register_ipi_handler(handle_ipi);
    time::register_tick_callback(on_tick);
}

fn per_cpu(cpu: u32) -> &'static PerCpu {
    &PER_CPU.get().expect("scheduler is not initialized")[cpu as usize]
}

pub(crate) fn processor(cpu: u32) -> &'static Processor {
    &per_cpu(cpu).processor
}

/// Returns the thread currently running on this CPU, or `None` in an idle
/// (bootstrap) context.
pub fn current_thread() -> Option<Arc<Thread>> {
    let per_cpu = PER_CPU.get()?;
    per_cpu[this_cpu() as usize].processor.current()
}

/// The CPU load metric: the recent idle-election count of `cpu`, in
/// `[0, LOAD_WINDOW]`. Lower values mean a busier CPU. Advisory only.
pub fn cpu_load(cpu: u32) -> u32 {
    per_cpu(cpu).processor.load()
}

/// Disables preemption of the current thread until
/// [`enable_preemption`] is called. No-op in an idle context.
pub fn disable_preemption() {
    if let Some(current) = current_thread() {
        current.set_preemption_disabled(true);
    }
}

/// Re-enables preemption of the current thread.
pub fn enable_preemption() {
    if let Some(current) = current_thread() {
        current.set_preemption_disabled(false);
    }
}

/// The voluntary scheduling point: elects and switches to the next thread,
/// treating the current thread as willing to rotate within its priority.
pub fn schedule() {
    STARTED.store(true, Ordering::Relaxed);
    let _irq_guard = disable_local();
    schedule_no_int(true);
}

/// The scheduling routine. Must run with local interrupts masked.
///
/// `force` makes an equal-priority ready thread displace the current one
/// even without a pending `request_schedule`.
pub(crate) fn schedule_no_int(force: bool) {
    let cpu = this_cpu();
    wake_sleepers(cpu);

    let pcpu = per_cpu(cpu);
    let current = pcpu.processor.current();

    if let Some(cur) = &current {
        let state = cur.state();
        if state == ThreadState::Running {
            if cur.preemption_disabled() {
                return;
            }
            let effective = cur.effective_priority();
            let highest = pcpu.run_queue.highest();
            let should_switch = if highest.is_none() {
                false
            } else if highest.is_higher_than(effective) {
                true
            } else if highest == effective {
                force || cur.take_request_schedule()
            } else {
                false
            };
            if !should_switch {
                cur.clear_request_schedule();
                pcpu.processor.note_busy();
                return;
            }
            // Displaced: back into the ready queue at the head of its
            // level, so already-waiting equals run first.
            {
                let mut inner = cur.lock();
                inner.state = ThreadState::Ready;
                inner.sched_cpu = cpu;
            }
            pcpu.run_queue.enqueue(cur.sched_node().clone(), effective);
        } else {
            debug_assert!(
                !cur.preemption_disabled(),
                "a non-running thread must not have preemption disabled"
            );
        }
    }

    elect(cpu, current);
}

/// Elects the next thread on `cpu` and switches to it (or to idle).
fn elect(cpu: u32, current: Option<Arc<Thread>>) {
    let pcpu = per_cpu(cpu);
    loop {
        let Some(node) = pcpu.run_queue.dequeue() else {
            pcpu.processor.note_idle();
            let Some(cur) = current.as_ref() else {
                // Idle stays idle.
                return;
            };
            if cur.state() == ThreadState::Running {
                return;
            }
            pcpu.processor.switch_to_idle();
            return;
        };
        // A node may outlive its thread's reaping.
        let Some(next) = node.payload().upgrade() else {
            continue;
        };
        if let Some(cur) = &current {
            if Arc::ptr_eq(cur, &next) {
                // Elected ourselves back; no switch needed.
                cur.lock().state = ThreadState::Running;
                cur.clear_request_schedule();
                pcpu.processor.note_busy();
                return;
            }
        }
        // The thread may still be mid-switch on another CPU; its context
        // must be fully saved before it can be restored here.
        while !next.is_ctx_saved() {
            core::hint::spin_loop();
        }
        {
            let mut inner = next.lock();
            inner.state = ThreadState::Running;
            inner.sched_cpu = cpu;
        }
        next.clear_request_schedule();
        deliver_signals(&next);
        pcpu.processor.note_busy();
        pcpu.processor.switch_to(next);
        return;
    }
}

/// Step 1 of every scheduling pass: wake the sleepers whose deadline has
/// passed. The deadline-keyed list makes the scan stop at the first future
/// deadline.
fn wake_sleepers(cpu: u32) {
    let now = time::uptime_ns();
    while let Some(thread) = per_cpu(cpu).sleep.pop_expired(now) {
        release_thread(&thread);
    }
}

fn deliver_signals(thread: &Arc<Thread>) {
    if thread.take_signal(SigSet::KILL) {
        // Redirect the thread to its exit handler, on its signal stack.
        // SAFETY: the thread is elected but not yet running; this CPU has
        // exclusive ownership of its saved context.
        unsafe {
            (*thread.ctx_ptr()).set_entry(kill_signal_entry, thread.signal_stack_top());
        }
    }
}

/// Makes `thread` ready and places it on the minimum-`cpu_load` CPU its
/// affinity admits. If that improves the CPU's highest ready priority, a
/// reschedule is demanded there.
pub(crate) fn release_thread(thread: &Arc<Thread>) {
    let (cpu, priority) = {
        let mut inner = thread.lock();
        match inner.state {
            // Zombies are never re-queued, and a double release is a no-op.
            ThreadState::Zombie | ThreadState::Ready | ThreadState::Running => return,
            _ => {}
        }
        inner.state = ThreadState::Ready;
        inner.block_kind = None;
        let cpu = pick_cpu(&inner.affinity);
        inner.sched_cpu = cpu;
        (cpu, inner.effective_priority)
    };

    let improved = per_cpu(cpu)
        .run_queue
        .enqueue(thread.sched_node().clone(), priority);
    if improved && STARTED.load(Ordering::Relaxed) {
        demand_reschedule(cpu);
    }
}

/// Picks the CPU with the minimum `cpu_load` out of `affinity` (an empty
/// set admits every CPU). Ties fall to the lower CPU id.
///
/// # Panics
///
/// Panics if the mask admits no CPU at all.
fn pick_cpu(affinity: &CpuSet) -> u32 {
    let mut best: Option<(u32, u32)> = None;
    for cpu in 0..num_cpus() {
        if !affinity.is_empty() && !affinity.contains(cpu) {
            continue;
        }
        let load = per_cpu(cpu).processor.load();
        let better = match best {
            None => true,
            Some((_, best_load)) => load < best_load,
        };
        if better {
            best = Some((cpu, load));
        }
    }
    let Some((cpu, _)) = best else {
        panic!("thread affinity admits no CPU");
    };
    cpu
}

fn demand_reschedule(cpu: u32) {
    if cpu == this_cpu() {
        // Mid-release we may be deep in kernel code; flag the current
        // thread and raise the scheduler interrupt to get a pass as soon
        // as the CPU is able.
        if let Some(current) = per_cpu(cpu).processor.current() {
            current.set_request_schedule();
        }
    }
    smp::send_ipi(cpu, IpiRequest::Reschedule);
}

fn handle_ipi(request: IpiRequest) {
    match request {
        IpiRequest::Reschedule => {
            if let Some(current) = current_thread() {
                current.set_request_schedule();
            }
        }
    }
}

fn on_tick() {
    // The quantum expired; equal-priority rotation happens at the next
    // scheduling point. The sleep-list scan runs inside the scheduler.
    if let Some(current) = current_thread() {
        current.set_request_schedule();
    }
}

/// Raises `thread`'s effective priority (or restores it); the inheritance
/// interlock of the mutex. A ready thread is moved between priority lists
/// on the spot; any other state is re-placed correctly by the next
/// release.
pub(crate) fn update_priority(thread: &Arc<Thread>, new: Priority) {
    debug_assert!(!new.is_none());
    let (cpu, old) = {
        let mut inner = thread.lock();
        let old = inner.effective_priority;
        if old == new {
            return;
        }
        inner.effective_priority = new;
        if inner.state != ThreadState::Ready {
            return;
        }
        (inner.sched_cpu, old)
    };
    per_cpu(cpu).run_queue.requeue(thread.sched_node(), old, new);
    if new.is_higher_than(old) && STARTED.load(Ordering::Relaxed) {
        demand_reschedule(cpu);
    }
}

/// Pushes the (just sleeping) `thread` into this CPU's sleep list.
pub(crate) fn push_sleeper(thread: &Arc<Thread>, deadline_ns: u64) {
    per_cpu(this_cpu()).sleep.push(thread, deadline_ns);
}

pub(crate) fn push_zombie(thread: &Arc<Thread>) {
    ZOMBIES.push(thread);
}

pub(crate) fn remove_zombie(thread: &Arc<Thread>) {
    ZOMBIES.remove(thread);
}

/// Demands a reschedule wherever `thread` is queued to run; used after
/// posting it a signal.
pub(crate) fn kick(thread: &Arc<Thread>) {
    let inner = thread.lock();
    if inner.state == ThreadState::Ready {
        let cpu = inner.sched_cpu;
        drop(inner);
        if STARTED.load(Ordering::Relaxed) {
            demand_reschedule(cpu);
        }
    }
}

/// Lazily harvests zombies that nobody joins. Driven from the idle loop.
pub fn reap_zombies() -> usize {
    let unjoined = ZOMBIES.take_unjoined();
    let count = unjoined.len();
    for thread in unjoined {
        crate::thread::clean_thread(&thread);
    }
    count
}
