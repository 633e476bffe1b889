// SPDX-License-Identifier: MPL-2.0

//! End-to-end semaphore and mutex scenarios over the real scheduler.

use std::{
    cell::Cell,
    sync::{Arc, Mutex as StdMutex},
};

use silene_frame::{config::PRIORITY_LEVELS, task::Priority, time};
use silene_kernel::{
    error::Errno,
    sched,
    sync::{Mutex, Semaphore, SyncFlags},
    thread::{ThreadOptions, ThreadState},
};

static SERIAL: StdMutex<()> = StdMutex::new(());

fn serial() -> std::sync::MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn drive_until(cond: impl Fn() -> bool) {
    for _ in 0..1_000_000 {
        if cond() {
            return;
        }
        time::advance_ns(1_000_000);
        sched::schedule();
    }
    panic!("the scenario did not converge");
}

// A deliberately unsynchronized counter: every green thread of one test
// runs on the same OS thread, so the mutex under test is the only thing
// keeping increments exclusive.
struct RacyCounter(Cell<u64>);
unsafe impl Sync for RacyCounter {}

impl RacyCounter {
    fn bump(&self) {
        self.0.set(self.0.get() + 1);
    }
    fn get(&self) -> u64 {
        self.0.get()
    }
}

#[test]
fn mutex_counting_is_exclusive() {
    let _guard = serial();
    silene_kernel::init(1);

    const THREADS: usize = 100;
    const OUTER: usize = 100;
    const INNER: usize = 100;

    let counter = Arc::new(RacyCounter(Cell::new(0)));
    let mutex = Arc::new(Mutex::new(SyncFlags::empty()).unwrap());
    let failures = Arc::new(RacyCounter(Cell::new(0)));

    let mut workers = Vec::new();
    for i in 0..THREADS {
        let counter = counter.clone();
        let mutex = mutex.clone();
        let failures = failures.clone();
        workers.push(
            ThreadOptions::new(move || {
                for round in 0..OUTER {
                    if mutex.lock().is_err() {
                        failures.bump();
                    }
                    for _ in 0..INNER {
                        counter.bump();
                    }
                    // Yield inside the region now and then: contenders
                    // must block rather than slip in.
                    if round % 10 == i % 10 {
                        sched::schedule();
                    }
                    if mutex.unlock().is_err() {
                        failures.bump();
                    }
                    sched::schedule();
                }
                0
            })
            .name(&format!("count-{}", i))
            .priority(Priority::new(20))
            .spawn()
            .unwrap(),
        );
    }

    drive_until(|| workers.iter().all(|w| w.state() == ThreadState::Zombie));
    assert_eq!(counter.get(), (THREADS * OUTER * INNER) as u64);
    assert_eq!(failures.get(), 0);
    sched::reap_zombies();
}

#[test]
fn priority_semaphore_releases_highest_first() {
    let _guard = serial();
    silene_kernel::init(1);

    let sem = Arc::new(Semaphore::new(0, SyncFlags::QUEUE_PRIORITY).unwrap());
    let order = Arc::new(StdMutex::new(Vec::new()));

    let mut workers = Vec::new();
    for level in 0..PRIORITY_LEVELS {
        let sem = sem.clone();
        let order = order.clone();
        workers.push(
            ThreadOptions::new(move || {
                sem.wait().unwrap();
                order.lock().unwrap().push(level);
                // Chain to the next-highest blocked waiter.
                sem.post().unwrap();
                0
            })
            .name(&format!("rank-{}", level))
            .priority(Priority::new(level))
            .spawn()
            .unwrap(),
        );
    }

    // Let every worker run into the wait, then post exactly once.
    drive_until(|| workers.iter().all(|w| w.state() == ThreadState::Waiting));
    sem.post().unwrap();
    drive_until(|| workers.iter().all(|w| w.state() == ThreadState::Zombie));

    let order = order.lock().unwrap();
    let expected: Vec<u16> = (0..PRIORITY_LEVELS).collect();
    assert_eq!(*order, expected, "waiters must release in priority order");
    // The final chained post had nobody left to wake.
    assert_eq!(sem.level(), 1);
    sched::reap_zombies();
}

#[test]
fn fifo_semaphore_releases_in_arrival_order() {
    let _guard = serial();
    silene_kernel::init(1);

    let sem = Arc::new(Semaphore::new(0, SyncFlags::QUEUE_FIFO).unwrap());
    let order = Arc::new(StdMutex::new(Vec::new()));

    // Same priority, so arrival order is spawn order.
    let mut workers = Vec::new();
    for id in [7u32, 3, 9] {
        let sem = sem.clone();
        let order = order.clone();
        workers.push(
            ThreadOptions::new(move || {
                sem.wait().unwrap();
                order.lock().unwrap().push(id);
                sem.post().unwrap();
                0
            })
            .name(&format!("fifo-{}", id))
            .priority(Priority::new(20))
            .spawn()
            .unwrap(),
        );
    }

    drive_until(|| workers.iter().all(|w| w.state() == ThreadState::Waiting));
    sem.post().unwrap();
    drive_until(|| workers.iter().all(|w| w.state() == ThreadState::Zombie));
    assert_eq!(*order.lock().unwrap(), [7, 3, 9]);
    sched::reap_zombies();
}

#[test]
fn priority_inheritance_tracks_the_highest_waiter() {
    let _guard = serial();
    silene_kernel::init(1);

    let mutex = Arc::new(Mutex::new(SyncFlags::PRIORITY_INHERITANCE).unwrap());
    let gate = Arc::new(Semaphore::new(0, SyncFlags::empty()).unwrap());
    let order = Arc::new(StdMutex::new(Vec::new()));
    let eff_after_unlock = Arc::new(StdMutex::new(None));

    let owner = {
        let mutex = mutex.clone();
        let gate = gate.clone();
        let sink = eff_after_unlock.clone();
        ThreadOptions::new(move || {
            mutex.lock().unwrap();
            // Hold the mutex across a block so contenders can pile up.
            gate.wait().unwrap();
            mutex.unlock().unwrap();
            let me = sched::current_thread().unwrap();
            *sink.lock().unwrap() = Some(me.effective_priority().get());
            0
        })
        .name("owner")
        .priority(Priority::new(10))
        .spawn()
        .unwrap()
    };
    drive_until(|| owner.state() == ThreadState::Waiting);
    assert_eq!(owner.effective_priority().get(), 10);

    let contender = |priority: u16, tag: &'static str| {
        let mutex = mutex.clone();
        let order = order.clone();
        ThreadOptions::new(move || {
            mutex.lock().unwrap();
            order.lock().unwrap().push(tag);
            mutex.unlock().unwrap();
            0
        })
        .name(tag)
        .priority(Priority::new(priority))
        .spawn()
        .unwrap()
    };

    // B at 12: lower than the owner, no boost.
    let b = contender(12, "b");
    drive_until(|| b.state() == ThreadState::Waiting);
    assert_eq!(owner.effective_priority().get(), 10);

    // C at 7: the owner inherits 7.
    let c = contender(7, "c");
    drive_until(|| c.state() == ThreadState::Waiting);
    assert_eq!(owner.effective_priority().get(), 7);

    // D at 9: weaker than the inherited 7, owner stays at 7.
    let d = contender(9, "d");
    drive_until(|| d.state() == ThreadState::Waiting);
    assert_eq!(owner.effective_priority().get(), 7);

    // Release the owner: it rolls back to 10 and hands the mutex to the
    // highest waiter; the remaining contenders follow in priority order.
    gate.post().unwrap();
    drive_until(|| {
        [&owner, &b, &c, &d]
            .iter()
            .all(|t| t.state() == ThreadState::Zombie)
    });
    assert_eq!(eff_after_unlock.lock().unwrap().take().unwrap(), 10);
    assert_eq!(*order.lock().unwrap(), ["c", "d", "b"]);
    sched::reap_zombies();
}

#[test]
fn destroying_a_semaphore_unblocks_every_waiter_once() {
    let _guard = serial();
    silene_kernel::init(1);

    let sem = Arc::new(Semaphore::new(0, SyncFlags::empty()).unwrap());
    let outcomes = Arc::new(StdMutex::new(Vec::new()));

    let mut workers = Vec::new();
    for id in 0..5u32 {
        let sem = sem.clone();
        let outcomes = outcomes.clone();
        workers.push(
            ThreadOptions::new(move || {
                let outcome = sem.wait();
                outcomes.lock().unwrap().push((id, outcome));
                0
            })
            .name(&format!("doomed-{}", id))
            .priority(Priority::new(20))
            .spawn()
            .unwrap(),
        );
    }

    drive_until(|| workers.iter().all(|w| w.state() == ThreadState::Waiting));
    sem.destroy().unwrap();
    drive_until(|| workers.iter().all(|w| w.state() == ThreadState::Zombie));

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 5);
    for (_, outcome) in outcomes.iter() {
        assert_eq!(outcome.unwrap_err().error(), Errno::Destroyed);
    }
    sched::reap_zombies();
}

#[test]
fn recursive_mutex_counts_depth() {
    let _guard = serial();
    silene_kernel::init(1);

    let mutex = Arc::new(Mutex::new(SyncFlags::RECURSIVE).unwrap());
    let results = Arc::new(StdMutex::new(None));
    let sink = results.clone();
    let m = mutex.clone();
    let worker = ThreadOptions::new(move || {
        m.lock().unwrap();
        let depth2 = m.try_lock().unwrap();
        let depth3 = m.try_lock().unwrap();
        m.unlock().unwrap();
        m.unlock().unwrap();
        m.unlock().unwrap();
        let too_many = m.unlock().unwrap_err().error();
        *sink.lock().unwrap() = Some((depth2, depth3, too_many));
        0
    })
    .name("recursive")
    .priority(Priority::new(20))
    .spawn()
    .unwrap();

    drive_until(|| worker.state() == ThreadState::Zombie);
    let (depth2, depth3, too_many) = results.lock().unwrap().take().unwrap();
    assert_eq!(depth2, 2);
    assert_eq!(depth3, 3);
    assert_eq!(too_many, Errno::UnauthorizedAction);
    sched::reap_zombies();
}
