// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::cell::RefCell;
use std::rc::Rc;

use tasklet::{Channel, Error, IdlePolicy, RunOutcome, Scheduler, TaskState};

type Log = Rc<RefCell<Vec<String>>>;

fn push(log: &Log, entry: impl Into<String>) {
    log.borrow_mut().push(entry.into());
}

#[test_log::test]
fn round_robin() {
    let scheduler = Scheduler::new();
    let log = Log::default();

    for name in ["a", "b", "c"] {
        let log = log.clone();
        scheduler.spawn(move |t| async move {
            for i in 0..3 {
                push(&log, format!("{name}{i}"));
                t.schedule().await?;
            }
            Ok::<_, Error>(())
        });
    }

    assert_eq!(scheduler.run().unwrap(), RunOutcome::Completed);
    assert_eq!(
        *log.borrow(),
        ["a0", "b0", "c0", "a1", "b1", "c1", "a2", "b2", "c2"]
    );
}

#[test_log::test]
fn atomic_tasks_are_not_auto_scheduled() {
    let scheduler = Scheduler::new();
    let log = Log::default();

    let log2 = log.clone();
    scheduler
        .build_task()
        .atomic(true)
        .autoschedule(true)
        .spawn(move |t| async move {
            for i in 0..3 {
                push(&log2, format!("a{i}"));
                t.checkpoint().await?;
            }
            assert!(t.set_atomic(false)?);
            t.checkpoint().await?;
            push(&log2, "a-done");
            Ok::<_, Error>(())
        });

    let log2 = log.clone();
    scheduler.spawn(move |_| async move {
        push(&log2, "b");
        Ok(())
    });

    scheduler.run().unwrap();
    assert_eq!(*log.borrow(), ["a0", "a1", "a2", "b", "a-done"]);
}

#[test_log::test]
fn atomic_tasks_can_schedule_explicitly() {
    let scheduler = Scheduler::new();
    let log = Log::default();

    let log2 = log.clone();
    scheduler
        .build_task()
        .atomic(true)
        .spawn(move |t| async move {
            push(&log2, "a0");
            t.schedule().await?;
            push(&log2, "a1");
            Ok::<_, Error>(())
        });

    let log2 = log.clone();
    scheduler.spawn(move |_| async move {
        push(&log2, "b");
        Ok(())
    });

    scheduler.run().unwrap();
    assert_eq!(*log.borrow(), ["a0", "b", "a1"]);
}

#[test_log::test]
fn watchdog_interrupt_is_deferred_while_atomic() {
    let scheduler = Scheduler::new();
    let log = Log::default();

    let log2 = log.clone();
    let a = scheduler
        .build_task()
        .atomic(true)
        .spawn(move |t| async move {
            for i in 0..5 {
                push(&log2, format!("a{i}"));
                t.checkpoint().await?;
            }
            t.set_atomic(false)?;
            t.checkpoint().await?;
            push(&log2, "a-done");
            Ok::<_, Error>(())
        });

    let log2 = log.clone();
    scheduler.spawn(move |_| async move {
        push(&log2, "b");
        Ok(())
    });

    // the watchdog expires at the second checkpoint but the task only yields once it left its
    // atomic section
    assert_eq!(scheduler.run_watchdog(2).unwrap(), RunOutcome::Interrupted(a));
    assert_eq!(*log.borrow(), ["a0", "a1", "a2", "a3", "a4"]);

    let info = scheduler.task(a).unwrap();
    assert_eq!(info.state, TaskState::Runnable);
    assert!(!info.flags.pending_interrupt());

    assert_eq!(scheduler.run().unwrap(), RunOutcome::Completed);
    assert_eq!(
        *log.borrow(),
        ["a0", "a1", "a2", "a3", "a4", "b", "a-done"]
    );
}

#[test_log::test]
fn interrupt_is_honoured_at_explicit_schedule() {
    let scheduler = Scheduler::new();
    let log = Log::default();

    let log2 = log.clone();
    let a = scheduler.spawn(move |t| async move {
        push(&log2, "a0");
        t.schedule().await?;
        push(&log2, "a1");
        Ok::<_, Error>(())
    });

    scheduler.interrupt(a).unwrap();
    assert!(scheduler.task(a).unwrap().flags.pending_interrupt());

    assert_eq!(scheduler.run().unwrap(), RunOutcome::Interrupted(a));
    assert_eq!(*log.borrow(), ["a0"]);
    assert_eq!(scheduler.run().unwrap(), RunOutcome::Completed);
    assert_eq!(*log.borrow(), ["a0", "a1"]);
}

#[test_log::test]
fn nesting_suppresses_auto_schedule() {
    let scheduler = Scheduler::new();
    let log = Log::default();

    let log2 = log.clone();
    scheduler
        .build_task()
        .autoschedule(true)
        .spawn(move |t| async move {
            {
                let _nested = t.enter_nested();
                push(&log2, "a0");
                t.checkpoint().await?;
                push(&log2, "a1");

                assert!(!t.set_ignore_nesting(true)?);
                t.checkpoint().await?;
                push(&log2, "a2");
                t.set_ignore_nesting(false)?;
            }
            t.checkpoint().await?;
            push(&log2, "a3");
            Ok::<_, Error>(())
        });

    let log2 = log.clone();
    scheduler.spawn(move |t| async move {
        for i in 0..2 {
            push(&log2, format!("b{i}"));
            t.schedule().await?;
        }
        Ok::<_, Error>(())
    });

    scheduler.run().unwrap();
    assert_eq!(*log.borrow(), ["a0", "a1", "b0", "a2", "b1", "a3"]);
}

#[test_log::test]
fn switch_to_runs_target_next() {
    let scheduler = Scheduler::new();
    let log = Log::default();
    let target = Rc::new(RefCell::new(None));

    let (log2, target2) = (log.clone(), target.clone());
    scheduler.spawn(move |t| async move {
        push(&log2, "a0");
        let target = target2.borrow_mut().take().unwrap();
        t.switch_to(t.id()).await?;
        t.switch_to(target).await?;
        push(&log2, "a1");
        Ok::<_, Error>(())
    });

    for name in ["b", "c"] {
        let log = log.clone();
        let id = scheduler.spawn(move |_| async move {
            push(&log, name);
            Ok(())
        });
        *target.borrow_mut() = Some(id);
    }

    scheduler.run().unwrap();
    assert_eq!(*log.borrow(), ["a0", "c", "b", "a1"]);
}

#[test_log::test]
fn switch_to_blocked_task_fails() {
    let scheduler = Scheduler::builder()
        .idle_policy(IdlePolicy::Return)
        .build();
    let chan = Channel::<u32>::new();
    let result = Rc::new(RefCell::new(None));

    let rx = chan.clone();
    let blocked = scheduler.spawn(move |t| async move {
        rx.receive(&t).await?;
        Ok::<_, Error>(())
    });

    let result2 = result.clone();
    scheduler.spawn(move |t| async move {
        *result2.borrow_mut() = Some(t.switch_to(blocked).await);
        Ok(())
    });

    assert_eq!(
        scheduler.run().unwrap(),
        RunOutcome::Idle { blocked: 1 }
    );
    assert!(matches!(
        result.borrow_mut().take(),
        Some(Err(Error::NotRunnable(id))) if id == blocked
    ));
    scheduler.shutdown().unwrap();
}

#[test_log::test]
fn flags_can_be_set_by_the_host() {
    let scheduler = Scheduler::new();
    let id = scheduler.spawn(|_| async { Ok(()) });

    assert!(!scheduler.set_atomic(id, true).unwrap());
    assert!(!scheduler.set_autoschedule(id, true).unwrap());
    assert!(!scheduler.set_block_trap(id, true).unwrap());
    assert!(!scheduler.set_ignore_nesting(id, true).unwrap());

    let flags = scheduler.task(id).unwrap().flags;
    assert!(flags.atomic() && flags.autoschedule() && flags.block_trap() && flags.ignore_nesting());

    scheduler.run().unwrap();
    assert!(matches!(
        scheduler.set_atomic(id, false),
        Err(Error::NoSuchTask(_))
    ));
}

#[test_log::test]
fn tasks_can_spawn_tasks() {
    let scheduler = Scheduler::new();
    let log = Log::default();

    let log2 = log.clone();
    scheduler.spawn(move |t| async move {
        let log3 = log2.clone();
        t.build_task().name("child").spawn(move |_| async move {
            push(&log3, "child");
            Ok(())
        });
        push(&log2, "parent0");
        t.schedule().await?;
        push(&log2, "parent1");
        Ok::<_, Error>(())
    });

    scheduler.run().unwrap();
    assert_eq!(*log.borrow(), ["parent0", "child", "parent1"]);
}

#[test_log::test]
fn shutdown_tears_down_everything() {
    let scheduler = Scheduler::builder()
        .idle_policy(IdlePolicy::Return)
        .deadlock_detection(false)
        .build();
    let chan = Channel::<u32>::new();
    let log = Log::default();

    for name in ["a", "b"] {
        let (rx, log) = (chan.clone(), log.clone());
        scheduler.spawn(move |t| async move {
            match rx.receive(&t).await {
                Err(err) if err.is_exit() => {
                    push(&log, format!("{name} unwound"));
                    Err(err)
                }
                other => other.map(drop),
            }
        });
    }
    let unstarted = scheduler.spawn(|_| async { Err(Error::SchedulerBusy) });
    scheduler.kill(unstarted).unwrap();

    assert_eq!(scheduler.run().unwrap(), RunOutcome::Idle { blocked: 2 });
    assert_eq!(chan.balance(), -2);

    scheduler.shutdown().unwrap();
    assert_eq!(scheduler.task_count(), 0);
    assert_eq!(chan.balance(), 0);
    // shutdown kills tasks in no particular order
    let mut log = log.take();
    log.sort();
    assert_eq!(log, ["a unwound", "b unwound"]);
    assert!(scheduler.take_failures().is_empty());
}
