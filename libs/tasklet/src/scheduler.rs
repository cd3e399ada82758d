// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The scheduler and its run loop.
//!
//! All scheduling state lives in [`Core`], which is shared between the [`Scheduler`] owned by the
//! host and the [`Tasklet`] handles given to every task. The run queue is a circular list whose
//! head is the task that runs next (or, while a task is being resumed, the running task). Tasks
//! never switch to each other directly, instead they rearrange the run queue, request a switch and
//! suspend. The run loop then resumes whatever ended up at the head.
//!
//! Values that may run arbitrary code when dropped (task bodies, channel payloads, bombs) are
//! never dropped while the core is borrowed. Operations that release such values hand them back
//! as [`Garbage`] so the caller can drop them after releasing the borrow.
//!
//! [`Tasklet`]: crate::Tasklet

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::any::Any;
use core::cell::RefCell;
use core::fmt;
use core::mem;
use core::task::Poll;

use static_assertions::assert_not_impl_any;

use crate::bomb::Bomb;
use crate::channel::WaitQueue;
use crate::config::{Config, IdlePolicy, SchedulerBuilder};
use crate::error::{Error, TaskFailure};
use crate::flags::{Blocked, ChannelFlags, Preference, TaskFlags};
use crate::list::List;
use crate::task::{Arena, Id, TaskBuilder, TaskControlBlock, TaskInfo};
use crate::tasklet::Tasklet;

/// Released values that must be dropped once the core is no longer borrowed.
pub(crate) type Garbage = Vec<Box<dyn Any>>;

/// Why [`Scheduler::run`] returned control to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// All tasks have terminated.
    Completed,
    /// The run queue is empty while `blocked` tasks wait on channels, see [`IdlePolicy::Return`].
    Idle { blocked: usize },
    /// The given task honoured an interrupt. It is still runnable, calling `run` again resumes
    /// scheduling where it left off.
    Interrupted(Id),
}

pub(crate) struct Core {
    pub(crate) tasks: Arena,
    pub(crate) run_queue: List,
    /// The task being resumed, if any.
    pub(crate) current: Option<Id>,
    pub(crate) config: Config,
    failures: Vec<TaskFailure>,
    /// Set by the running task when it arranged the run queue for its own suspension.
    switch_requested: bool,
    /// Counts resumptions, identifies the resumption a switch was requested in.
    pub(crate) epoch: u64,
    /// A task that honoured an interrupt, reported to the host once the switch completed.
    interrupted: Option<Id>,
    /// Remaining checkpoint budget of [`Scheduler::run_watchdog`].
    watchdog: Option<u64>,
}

// === impl Core ===

impl Core {
    fn new(config: Config) -> Self {
        Self {
            tasks: Arena::new(),
            run_queue: List::new(),
            current: None,
            config,
            failures: Vec::new(),
            switch_requested: false,
            epoch: 0,
            interrupted: None,
            watchdog: None,
        }
    }

    pub(crate) fn insert(&mut self, tcb: TaskControlBlock) {
        let id = tcb.id;
        self.tasks.insert(id, tcb);
        self.run_queue.push_back(&mut self.tasks, id);
    }

    pub(crate) fn task(&self, id: Id) -> Result<&TaskControlBlock, Error> {
        self.tasks.get(&id).ok_or(Error::NoSuchTask(id))
    }

    fn task_mut(&mut self, id: Id) -> Result<&mut TaskControlBlock, Error> {
        self.tasks.get_mut(&id).ok_or(Error::NoSuchTask(id))
    }

    pub(crate) fn ensure_current(&self, id: Id) -> Result<(), Error> {
        if self.current == Some(id) {
            Ok(())
        } else {
            Err(Error::NotCurrent(id))
        }
    }

    pub(crate) fn update_flags(
        &mut self,
        id: Id,
        f: impl FnOnce(&mut TaskFlags) -> bool,
    ) -> Result<bool, Error> {
        Ok(f(&mut self.task_mut(id)?.flags))
    }

    fn rotate(&mut self) {
        self.run_queue.rotate(&self.tasks);
    }

    /// Marks the current task as switching out. The run queue must already be arranged so that
    /// the task that should run next is at its head.
    fn request_switch(&mut self) {
        self.switch_requested = true;
        if let Some(tcb) = self.current.and_then(|id| self.tasks.get_mut(&id)) {
            tcb.ticks = 0;
        }
    }

    /// Counts one checkpoint against the watchdog budget, returns `true` once it ran out.
    fn tick_watchdog(&mut self) -> bool {
        let Some(budget) = self.watchdog.as_mut() else {
            return false;
        };

        *budget = budget.saturating_sub(1);
        if *budget == 0 {
            self.watchdog = None;
            true
        } else {
            false
        }
    }

    /// The explicit switch: the current task moves to the tail of the run queue.
    pub(crate) fn schedule(&mut self, id: Id) -> Result<(), Error> {
        self.ensure_current(id)?;
        let tcb = self.task_mut(id)?;
        if tcb.flags.is_zombie() {
            return Err(Error::Bomb(Bomb::Exit));
        }

        // explicit switches are always allowed, interrupts are only honoured outside of atomic sections
        if !tcb.flags.atomic() && tcb.flags.set_pending_interrupt(false) {
            tracing::debug!(task.tid = id.as_u64(), "interrupt honoured");
            self.interrupted = Some(id);
        }

        self.rotate();
        self.request_switch();
        tracing::trace!(task.tid = id.as_u64(), next = ?self.run_queue.head(), "schedule");
        Ok(())
    }

    /// The automatic switch, returns `true` if the current task should suspend.
    pub(crate) fn checkpoint(&mut self, id: Id) -> Result<bool, Error> {
        self.ensure_current(id)?;
        let interval = self.config.auto_schedule_interval;
        let watchdog_expired = self.tick_watchdog();

        let tcb = self.tasks.get_mut(&id).ok_or(Error::NoSuchTask(id))?;
        if tcb.flags.is_zombie() {
            return Err(Error::Bomb(Bomb::Exit));
        }

        tcb.ticks = tcb.ticks.saturating_add(1);
        if watchdog_expired {
            tracing::debug!(task.tid = id.as_u64(), "watchdog expired");
            tcb.flags.set_pending_interrupt(true);
        }

        let nesting = tcb.nesting_level;
        let interrupt = tcb.flags.pending_interrupt() && tcb.flags.is_switchable(true, nesting);
        if interrupt {
            tcb.flags.set_pending_interrupt(false);
        }
        let switch =
            interrupt || (tcb.flags.is_switchable(false, nesting) && tcb.ticks >= interval);

        if interrupt {
            tracing::debug!(task.tid = id.as_u64(), "interrupt honoured");
            self.interrupted = Some(id);
        }
        if switch {
            self.rotate();
            self.request_switch();
            tracing::trace!(task.tid = id.as_u64(), next = ?self.run_queue.head(), "auto-schedule");
        }

        Ok(switch)
    }

    /// Moves `target` directly behind the current task and switches to it.
    ///
    /// Returns `false` if `target` is the current task, in which case nothing happens.
    pub(crate) fn switch_to(&mut self, id: Id, target: Id) -> Result<bool, Error> {
        self.ensure_current(id)?;
        if self.task(id)?.flags.is_zombie() {
            return Err(Error::Bomb(Bomb::Exit));
        }
        if id == target {
            return Ok(false);
        }
        if self.task(target)?.flags.is_blocked() {
            return Err(Error::NotRunnable(target));
        }

        self.run_queue.remove(&mut self.tasks, target);
        self.run_queue.insert_after(&mut self.tasks, id, target);
        self.rotate();
        self.request_switch();
        tracing::trace!(task.tid = id.as_u64(), target = target.as_u64(), "switch");
        Ok(true)
    }

    /// Checks whether the current task may block on a channel.
    pub(crate) fn check_can_block(&self, id: Id) -> Result<(), Error> {
        let flags = self.task(id)?.flags;
        if flags.is_zombie() {
            return Err(Error::Bomb(Bomb::Exit));
        }
        if flags.block_trap() {
            tracing::debug!(task.tid = id.as_u64(), "block trapped");
            return Err(Error::BlockTrapped);
        }
        // with `IdlePolicy::Return` the host is left to wake the task
        if self.config.deadlock_detection
            && self.config.idle_policy == IdlePolicy::Fail
            && self.run_queue.len() <= 1
        {
            tracing::warn!(
                task.tid = id.as_u64(),
                "deadlock detected, the last runnable tasklet cannot be blocked"
            );
            return Err(Error::DeadlockDetected);
        }
        Ok(())
    }

    /// Moves the current task from the run queue to the tail of a channel's wait queue.
    pub(crate) fn block_current(
        &mut self,
        queue: &mut List,
        id: Id,
        blocked: Blocked,
        wait_queue: Rc<dyn WaitQueue>,
    ) {
        self.run_queue.remove(&mut self.tasks, id);
        queue.push_back(&mut self.tasks, id);

        let tcb = self.tasks.get_mut(&id).expect("blocking task must be live");
        tcb.flags.set_blocked(blocked);
        tcb.blocked_on = Some(wait_queue);

        self.request_switch();
        tracing::debug!(task.tid = id.as_u64(), ?blocked, "blocked");
    }

    /// Clears the blocked state of a task that has just been popped off a wait queue.
    ///
    /// The caller must drop the returned wait queue reference after releasing all borrows.
    pub(crate) fn wake(&mut self, id: Id) -> Option<Rc<dyn WaitQueue>> {
        let tcb = self.tasks.get_mut(&id).expect("woken task must be live");
        tcb.flags.set_blocked(Blocked::No);
        tracing::debug!(task.tid = id.as_u64(), "woken");
        tcb.blocked_on.take()
    }

    /// Links the woken `peer` back into the run queue according to the channel's policy.
    ///
    /// `peer_side` is the preference that favours the peer. Returns `true` if the current task
    /// has to suspend because control passes on immediately.
    pub(crate) fn wake_after_rendezvous(
        &mut self,
        id: Id,
        peer: Id,
        peer_side: Preference,
        flags: ChannelFlags,
    ) -> bool {
        if flags.schedule_all() {
            self.run_queue.push_back(&mut self.tasks, peer);
            self.rotate();
            self.request_switch();
            true
        } else if flags.preference() == peer_side {
            self.run_queue.insert_after(&mut self.tasks, id, peer);
            self.rotate();
            self.request_switch();
            true
        } else {
            self.run_queue.push_back(&mut self.tasks, peer);
            false
        }
    }

    /// Unlinks a blocked task from its wait queue and makes it runnable again.
    fn unblock(&mut self, id: Id, garbage: &mut Garbage) {
        let Some(tcb) = self.tasks.get_mut(&id) else {
            return;
        };
        let Some(wait_queue) = tcb.blocked_on.take() else {
            return;
        };
        tcb.flags.set_blocked(Blocked::No);

        if let Some(slot) = wait_queue.remove_waiter(&mut self.tasks, id) {
            garbage.push(slot);
        }
        self.run_queue.push_back(&mut self.tasks, id);
        garbage.push(Box::new(wait_queue));
        tracing::debug!(task.tid = id.as_u64(), "forcibly woken");
    }

    /// Undoes the switch the current task requested during resumption `epoch`.
    ///
    /// Called when the future that was about to suspend the task is dropped instead. The task is
    /// linked back at the head of the run queue and keeps running, a wait on a channel is
    /// abandoned. A rendezvous that already happened stays done. Does nothing once the task was
    /// switched out.
    pub(crate) fn cancel_switch(&mut self, id: Id, epoch: u64) -> Garbage {
        let mut garbage = Garbage::new();
        if self.epoch != epoch || self.current != Some(id) || !self.switch_requested {
            return garbage;
        }
        let Some(tcb) = self.tasks.get_mut(&id) else {
            return garbage;
        };

        if let Some(wait_queue) = tcb.blocked_on.take() {
            tcb.flags.set_blocked(Blocked::No);
            if let Some(slot) = wait_queue.remove_waiter(&mut self.tasks, id) {
                garbage.push(slot);
            }
            garbage.push(Box::new(wait_queue));
        } else {
            self.run_queue.remove(&mut self.tasks, id);
        }
        self.run_queue.push_front(&mut self.tasks, id);
        self.switch_requested = false;

        // the interrupt was not honoured after all
        if self.interrupted == Some(id) {
            self.interrupted = None;
            if let Some(tcb) = self.tasks.get_mut(&id) {
                tcb.flags.set_pending_interrupt(true);
            }
        }

        tracing::debug!(task.tid = id.as_u64(), "switch cancelled");
        garbage
    }

    pub(crate) fn kill(&mut self, id: Id) -> Result<Garbage, Error> {
        let mut garbage = Garbage::new();

        let tcb = self.task_mut(id)?;
        if tcb.flags.is_zombie() {
            return Ok(garbage);
        }

        if !tcb.started() {
            // no code of the task ever ran, dropping it is its complete teardown
            self.run_queue.remove(&mut self.tasks, id);
            let tcb = self.tasks.remove(&id).expect("task was looked up above");
            tracing::debug!(task.tid = id.as_u64(), "killed before it started");
            garbage.push(Box::new(tcb));
            return Ok(garbage);
        }

        tcb.flags.set_zombie();
        if let Some(prev) = tcb.bomb.replace(Bomb::Exit) {
            garbage.push(Box::new(prev));
        }
        tracing::debug!(task.tid = id.as_u64(), "killed");

        self.unblock(id, &mut garbage);
        Ok(garbage)
    }

    pub(crate) fn throw(&mut self, id: Id, bomb: Bomb) -> Result<Garbage, Error> {
        let mut garbage = Garbage::new();

        let tcb = self.task_mut(id)?;
        if tcb.flags.is_zombie() {
            garbage.push(Box::new(bomb));
            return Ok(garbage);
        }

        tracing::debug!(task.tid = id.as_u64(), %bomb, "exception armed");
        if let Some(prev) = tcb.bomb.replace(bomb) {
            garbage.push(Box::new(prev));
        }

        self.unblock(id, &mut garbage);
        Ok(garbage)
    }

    fn interrupt(&mut self, id: Id) -> Result<(), Error> {
        let tcb = self.task_mut(id)?;
        if !tcb.flags.is_zombie() {
            tcb.flags.set_pending_interrupt(true);
            tracing::debug!(task.tid = id.as_u64(), "interrupt requested");
        }
        Ok(())
    }

    /// Takes the deferred exception of a task. Zombies always get [`Bomb::Exit`].
    pub(crate) fn take_bomb(&mut self, id: Id) -> Result<Option<Bomb>, Error> {
        let tcb = self.task_mut(id)?;
        if tcb.flags.is_zombie() {
            tcb.bomb = None;
            return Ok(Some(Bomb::Exit));
        }
        Ok(tcb.bomb.take())
    }

    /// Releases a task whose body has completed.
    fn retire(&mut self, id: Id, result: Result<(), Error>) -> Garbage {
        let mut garbage = Garbage::new();

        let tcb = self.tasks.get_mut(&id).expect("retired task must be live");
        if let Some(wait_queue) = tcb.blocked_on.take() {
            // the body leaked a channel operation that had blocked it
            tracing::warn!(task.tid = id.as_u64(), "tasklet completed while blocked");
            if let Some(slot) = wait_queue.remove_waiter(&mut self.tasks, id) {
                garbage.push(slot);
            }
            garbage.push(Box::new(wait_queue));
        } else {
            self.run_queue.remove(&mut self.tasks, id);
        }
        let tcb = self.tasks.remove(&id).expect("retired task must be live");

        match result {
            Ok(()) => tracing::trace!(task.tid = id.as_u64(), "completed"),
            Err(err) if err.is_exit() => tracing::debug!(task.tid = id.as_u64(), "torn down"),
            Err(error) => {
                let during_teardown = tcb.flags.is_zombie();
                tracing::error!(
                    task.tid = id.as_u64(),
                    task.name = ?tcb.name,
                    during_teardown,
                    %error,
                    "tasklet failed"
                );
                self.failures.push(TaskFailure {
                    id,
                    name: tcb.name.clone(),
                    error,
                    during_teardown,
                });
            }
        }

        garbage.push(Box::new(tcb));
        garbage
    }

    /// Unlinks every blocked task from its channel.
    fn detach_waiters(&mut self) -> Garbage {
        let blocked: Vec<Id> = self
            .tasks
            .values()
            .filter(|tcb| tcb.flags.is_blocked())
            .map(|tcb| tcb.id)
            .collect();

        let mut garbage = Garbage::new();
        for id in blocked {
            self.unblock(id, &mut garbage);
        }
        garbage
    }
}

/// A cooperative scheduler for tasklets.
///
/// The scheduler runs on the thread that owns it and is neither [`Send`] nor [`Sync`]. Tasks are
/// only ever switched at their suspension points: explicit [`Tasklet::schedule`] calls, channel
/// operations that block, and auto-schedule [`Tasklet::checkpoint`]s.
///
/// Dropping the scheduler drops all remaining tasks without running their teardown, use
/// [`Scheduler::shutdown`] to unwind them first.
///
/// [`Tasklet::schedule`]: crate::Tasklet::schedule
/// [`Tasklet::checkpoint`]: crate::Tasklet::checkpoint
pub struct Scheduler {
    core: Rc<RefCell<Core>>,
}

assert_not_impl_any!(Scheduler: Send, Sync);

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            core: Rc::new(RefCell::new(Core::new(config))),
        }
    }

    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub fn config(&self) -> Config {
        self.core.borrow().config.clone()
    }

    /// Spawn a new tasklet, see [`TaskBuilder::spawn`].
    #[track_caller]
    pub fn spawn<F, Fut>(&self, f: F) -> Id
    where
        F: FnOnce(Tasklet) -> Fut + 'static,
        Fut: Future<Output = Result<(), Error>> + 'static,
    {
        self.build_task().spawn(f)
    }

    pub fn build_task(&self) -> TaskBuilder<'_> {
        TaskBuilder::new(&self.core)
    }

    /// Runs tasks until all of them terminated, an interrupt was honoured, or no runnable task
    /// is left.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchedulerBusy`] when called from within a running task and
    /// [`Error::NoRunnableTasks`] when only blocked tasks remain and the idle policy is
    /// [`IdlePolicy::Fail`].
    pub fn run(&self) -> Result<RunOutcome, Error> {
        if self.core.borrow().current.is_some() {
            return Err(Error::SchedulerBusy);
        }

        loop {
            if let Some(outcome) = self.step()? {
                return Ok(outcome);
            }
        }
    }

    /// Like [`Scheduler::run`], but interrupts the running task once `ticks` checkpoints have
    /// passed.
    ///
    /// The interrupt is delivered like [`Scheduler::interrupt`], it is deferred while the task
    /// is atomic and never dropped.
    ///
    /// # Errors
    ///
    /// See [`Scheduler::run`].
    pub fn run_watchdog(&self, ticks: u64) -> Result<RunOutcome, Error> {
        {
            let mut core = self.core.borrow_mut();
            if core.current.is_some() {
                return Err(Error::SchedulerBusy);
            }
            core.watchdog = Some(ticks);
        }

        let outcome = self.run();
        self.core.borrow_mut().watchdog = None;
        outcome
    }

    /// Resumes the head of the run queue once.
    fn step(&self) -> Result<Option<RunOutcome>, Error> {
        let (id, mut exec, span) = {
            let mut core = self.core.borrow_mut();

            if let Some(id) = core.interrupted.take() {
                return Ok(Some(RunOutcome::Interrupted(id)));
            }

            let Some(id) = core.run_queue.head() else {
                if core.tasks.is_empty() {
                    return Ok(Some(RunOutcome::Completed));
                }

                let blocked = core.tasks.len();
                return match core.config.idle_policy {
                    IdlePolicy::Fail => {
                        tracing::warn!(blocked, "no runnable tasklets left");
                        Err(Error::NoRunnableTasks { blocked })
                    }
                    IdlePolicy::Return => {
                        tracing::debug!(blocked, "idle");
                        Ok(Some(RunOutcome::Idle { blocked }))
                    }
                };
            };

            core.current = Some(id);
            core.switch_requested = false;
            core.epoch = core.epoch.wrapping_add(1);
            let tcb = core.tasks.get_mut(&id).expect("run queue head must be live");
            let exec = tcb
                .exec
                .take()
                .expect("runnable tasklet must own its execution context");
            (id, exec, tcb.span.clone())
        };

        let poll = span.in_scope(|| exec.resume());

        let mut core = self.core.borrow_mut();
        core.current = None;
        match poll {
            Poll::Pending => {
                let switch_requested = mem::take(&mut core.switch_requested);
                let tcb = core
                    .tasks
                    .get_mut(&id)
                    .expect("suspended tasklet must be live");
                tcb.exec = Some(exec);

                if !switch_requested {
                    // suspended on a foreign future, treat it like a yield
                    tcb.ticks = 0;
                    core.rotate();
                }
            }
            Poll::Ready(result) => {
                let garbage = core.retire(id, result);
                drop(core);
                drop(garbage);
                drop(exec);
            }
        }

        Ok(None)
    }

    /// Kills a task.
    ///
    /// A task that has not started yet is released right away. Otherwise the task becomes a zombie:
    /// it is unblocked if needed and [`Bomb::Exit`] goes off at its next suspension point, so it
    /// can unwind. Killing a zombie does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchTask`] if the task does not exist (anymore).
    pub fn kill(&self, id: Id) -> Result<(), Error> {
        let garbage = self.core.borrow_mut().kill(id)?;
        drop(garbage);
        Ok(())
    }

    /// Raises `bomb` in a task at its next resumption, waking it if it is blocked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchTask`] if the task does not exist (anymore).
    pub fn throw(&self, id: Id, bomb: Bomb) -> Result<(), Error> {
        let garbage = self.core.borrow_mut().throw(id, bomb)?;
        drop(garbage);
        Ok(())
    }

    /// Asks a task to hand control back to the host.
    ///
    /// The interrupt is honoured at the task's next checkpoint or explicit switch that happens
    /// outside of an atomic section, after which `run` returns [`RunOutcome::Interrupted`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchTask`] if the task does not exist (anymore).
    pub fn interrupt(&self, id: Id) -> Result<(), Error> {
        self.core.borrow_mut().interrupt(id)
    }

    /// Sets the `atomic` flag of a task, returning the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchTask`] if the task does not exist (anymore).
    pub fn set_atomic(&self, id: Id, atomic: bool) -> Result<bool, Error> {
        self.core
            .borrow_mut()
            .update_flags(id, |flags| flags.set_atomic(atomic))
    }

    /// Sets the `autoschedule` flag of a task, returning the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchTask`] if the task does not exist (anymore).
    pub fn set_autoschedule(&self, id: Id, autoschedule: bool) -> Result<bool, Error> {
        self.core
            .borrow_mut()
            .update_flags(id, |flags| flags.set_autoschedule(autoschedule))
    }

    /// Sets the `ignore_nesting` flag of a task, returning the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchTask`] if the task does not exist (anymore).
    pub fn set_ignore_nesting(&self, id: Id, ignore_nesting: bool) -> Result<bool, Error> {
        self.core
            .borrow_mut()
            .update_flags(id, |flags| flags.set_ignore_nesting(ignore_nesting))
    }

    /// Sets the `block_trap` flag of a task, returning the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchTask`] if the task does not exist (anymore).
    pub fn set_block_trap(&self, id: Id, block_trap: bool) -> Result<bool, Error> {
        self.core
            .borrow_mut()
            .update_flags(id, |flags| flags.set_block_trap(block_trap))
    }

    pub fn task(&self, id: Id) -> Option<TaskInfo> {
        let core = self.core.borrow();
        core.tasks.get(&id).map(|tcb| tcb.info(core.current))
    }

    /// The task that is currently being resumed.
    pub fn current(&self) -> Option<Id> {
        self.core.borrow().current
    }

    /// The number of runnable tasks.
    pub fn run_count(&self) -> usize {
        self.core.borrow().run_queue.len()
    }

    /// The number of live tasks, blocked ones included.
    pub fn task_count(&self) -> usize {
        self.core.borrow().tasks.len()
    }

    pub(crate) fn with_tasks<R>(&self, f: impl FnOnce(&Arena) -> R) -> R {
        f(&self.core.borrow().tasks)
    }

    /// Takes the failures of all tasks that terminated with an error since the last call.
    pub fn take_failures(&self) -> Vec<TaskFailure> {
        mem::take(&mut self.core.borrow_mut().failures)
    }

    /// Kills all tasks and runs them until their teardown has completed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchedulerBusy`] when called from within a running task.
    pub fn shutdown(&self) -> Result<(), Error> {
        loop {
            let ids: Vec<Id> = self.core.borrow().tasks.keys().copied().collect();
            tracing::debug!(tasks = ids.len(), "shutting down");
            for id in ids {
                let garbage = self.core.borrow_mut().kill(id);
                drop(garbage);
            }

            // teardown may spawn new tasks, keep going until nothing is left
            match self.run() {
                Ok(RunOutcome::Completed) => return Ok(()),
                Ok(_) | Err(Error::NoRunnableTasks { .. }) => {}
                Err(err) => return Err(err),
            }
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.core.borrow();
        f.debug_struct("Scheduler")
            .field("tasks", &core.tasks.len())
            .field("runnable", &core.run_queue.len())
            .field("current", &core.current)
            .field("config", &core.config)
            .finish_non_exhaustive()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let Ok(mut core) = self.core.try_borrow_mut() else {
            return;
        };

        // task bodies hold handles to the core, take them out to break the cycle
        let garbage = core.detach_waiters();
        core.run_queue = List::new();
        core.current = None;
        let tasks = mem::take(&mut core.tasks);
        drop(core);

        drop(garbage);
        drop(tasks);
    }
}
