// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use alloc::rc::Rc;
use core::cell::RefCell;
use core::fmt;
use core::pin::Pin;
use core::task::{Context, Poll, ready};

use static_assertions::assert_not_impl_any;

use crate::bomb::Bomb;
use crate::context::{Suspend, suspend};
use crate::error::Error;
use crate::scheduler::Core;
use crate::task::{Id, TaskBuilder, TaskInfo};

/// The handle a task uses to talk to its scheduler.
///
/// Every task body receives the handle of its own task. Operations that suspend (or might
/// suspend) the task, like [`Tasklet::schedule`] or the channel operations, may only be used by
/// the task the handle belongs to while it is running, everything else fails with
/// [`Error::NotCurrent`].
///
/// All suspending operations deliver a pending [`Bomb`] when the task is resumed. This is how
/// [`Tasklet::kill`] and [`Tasklet::throw`] take effect, the operation returns [`Error::Bomb`]
/// and the body is expected to propagate it with `?`.
#[derive(Clone)]
pub struct Tasklet {
    pub(crate) core: Rc<RefCell<Core>>,
    pub(crate) id: Id,
}

assert_not_impl_any!(Tasklet: Send, Sync);

impl Tasklet {
    pub(crate) fn new(core: Rc<RefCell<Core>>, id: Id) -> Self {
        Self { core, id }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    /// A snapshot of this task's state, `None` once the task terminated.
    pub fn info(&self) -> Option<TaskInfo> {
        let core = self.core.borrow();
        core.tasks.get(&self.id).map(|tcb| tcb.info(core.current))
    }

    /// Spawn a new tasklet on the same scheduler, see [`TaskBuilder::spawn`].
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

    /// Yields to the next runnable task.
    ///
    /// This switch is always performed, even if the task is atomic. A pending interrupt is honoured
    /// here unless the task is atomic.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotCurrent`] if this task is not running, [`Error::Bomb`] if a bomb went off
    /// while the task was suspended.
    pub async fn schedule(&self) -> Result<(), Error> {
        self.core.borrow_mut().schedule(self.id)?;
        self.switch().await;
        self.deliver_bomb()
    }

    /// An auto-schedule checkpoint.
    ///
    /// Switches to the next runnable task if this task is switchable and has passed the configured
    /// number of checkpoints, or if it has a pending interrupt and is not atomic. Otherwise returns
    /// right away.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotCurrent`] if this task is not running, [`Error::Bomb`] if a bomb went off
    /// while the task was suspended.
    pub async fn checkpoint(&self) -> Result<(), Error> {
        if self.core.borrow_mut().checkpoint(self.id)? {
            self.switch().await;
            self.deliver_bomb()
        } else {
            Ok(())
        }
    }

    /// Switches to `target` right away. This task stays runnable and will run again after
    /// `target` and all other runnable tasks had their turn.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchTask`] or [`Error::NotRunnable`] if `target` cannot be switched to.
    pub async fn switch_to(&self, target: Id) -> Result<(), Error> {
        if self.core.borrow_mut().switch_to(self.id, target)? {
            self.switch().await;
            self.deliver_bomb()
        } else {
            Ok(())
        }
    }

    /// Kills a task, see [`Scheduler::kill`](crate::Scheduler::kill).
    ///
    /// A task killing itself gets [`Bomb::Exit`] right away.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchTask`] if the task does not exist (anymore), or the bomb when the
    /// task killed itself.
    pub fn kill(&self, id: Id) -> Result<(), Error> {
        let garbage = self.core.borrow_mut().kill(id)?;
        drop(garbage);

        if id == self.id {
            self.deliver_bomb()
        } else {
            Ok(())
        }
    }

    /// Raises `bomb` in another task, see [`Scheduler::throw`](crate::Scheduler::throw).
    ///
    /// A task throwing at itself gets the bomb back right away.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchTask`] if the task does not exist (anymore), or the bomb when the
    /// task threw at itself.
    pub fn throw(&self, id: Id, bomb: Bomb) -> Result<(), Error> {
        let garbage = self.core.borrow_mut().throw(id, bomb)?;
        drop(garbage);

        if id == self.id {
            self.deliver_bomb()
        } else {
            Ok(())
        }
    }

    /// Sets the `atomic` flag of this task, returning the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchTask`] if the task terminated.
    pub fn set_atomic(&self, atomic: bool) -> Result<bool, Error> {
        self.core
            .borrow_mut()
            .update_flags(self.id, |flags| flags.set_atomic(atomic))
    }

    /// Sets the `autoschedule` flag of this task, returning the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchTask`] if the task terminated.
    pub fn set_autoschedule(&self, autoschedule: bool) -> Result<bool, Error> {
        self.core
            .borrow_mut()
            .update_flags(self.id, |flags| flags.set_autoschedule(autoschedule))
    }

    /// Sets the `ignore_nesting` flag of this task, returning the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchTask`] if the task terminated.
    pub fn set_ignore_nesting(&self, ignore_nesting: bool) -> Result<bool, Error> {
        self.core
            .borrow_mut()
            .update_flags(self.id, |flags| flags.set_ignore_nesting(ignore_nesting))
    }

    /// Sets the `block_trap` flag of this task, returning the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchTask`] if the task terminated.
    pub fn set_block_trap(&self, block_trap: bool) -> Result<bool, Error> {
        self.core
            .borrow_mut()
            .update_flags(self.id, |flags| flags.set_block_trap(block_trap))
    }

    /// Enters a nested section in which automatic switches are suppressed (unless the task has
    /// `ignore_nesting` set). The section ends when the returned guard is dropped.
    pub fn enter_nested(&self) -> NestingGuard {
        if let Some(tcb) = self.core.borrow_mut().tasks.get_mut(&self.id) {
            tcb.nesting_level += 1;
        }

        NestingGuard {
            core: self.core.clone(),
            id: self.id,
        }
    }

    pub fn nesting_level(&self) -> usize {
        self.core
            .borrow()
            .tasks
            .get(&self.id)
            .map_or(0, |tcb| tcb.nesting_level)
    }

    /// Suspends the task for the switch it just requested.
    pub(crate) fn switch(&self) -> Switch<'_> {
        Switch {
            tasklet: self,
            epoch: self.core.borrow().epoch,
            suspend: suspend(),
            done: false,
        }
    }

    /// Delivers a pending bomb, if any.
    pub(crate) fn deliver_bomb(&self) -> Result<(), Error> {
        let bomb = self.core.borrow_mut().take_bomb(self.id)?;
        match bomb {
            Some(bomb) => Err(Error::Bomb(bomb)),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Tasklet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tasklet")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Completes once the task is resumed after a switch it requested.
///
/// If the future is dropped before the task was switched out, the switch is undone and the task
/// keeps running, see `Core::cancel_switch`.
#[must_use = "futures do nothing unless `.await`ed"]
pub(crate) struct Switch<'a> {
    tasklet: &'a Tasklet,
    epoch: u64,
    suspend: Suspend,
    done: bool,
}

impl Future for Switch<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        ready!(Pin::new(&mut self.suspend).poll(cx));
        self.done = true;
        Poll::Ready(())
    }
}

impl Drop for Switch<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        // the scheduler may be releasing the task
        let Ok(mut core) = self.tasklet.core.try_borrow_mut() else {
            return;
        };
        let garbage = core.cancel_switch(self.tasklet.id, self.epoch);
        drop(core);
        drop(garbage);
    }
}

/// Leaves a nested section when dropped, see [`Tasklet::enter_nested`].
#[must_use = "the nested section ends when the guard is dropped"]
pub struct NestingGuard {
    core: Rc<RefCell<Core>>,
    id: Id,
}

impl fmt::Debug for NestingGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestingGuard")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Drop for NestingGuard {
    fn drop(&mut self) {
        // the guard may be dropped while the scheduler releases the task
        let Ok(mut core) = self.core.try_borrow_mut() else {
            return;
        };
        if let Some(tcb) = core.tasks.get_mut(&self.id) {
            tcb.nesting_level = tcb.nesting_level.saturating_sub(1);
        }
    }
}
