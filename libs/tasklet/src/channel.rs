// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Rendezvous channels.
//!
//! A channel has no buffer. A sender that finds no waiting receiver blocks until one arrives and
//! vice versa, the value is handed over directly. All tasks waiting on a channel wait in the same
//! direction, the channel's `balance` counts them: positive for waiting senders, negative for
//! waiting receivers.
//!
//! After a rendezvous the woken peer becomes runnable again. Which of the two tasks continues
//! is governed by the channel's [`Preference`]:
//!
//! - with `schedule_all` set, the peer is queued at the tail of the run queue and the caller
//!   switches to the next runnable task.
//! - if the preference favours the peer's side, the peer is linked directly after the caller and
//!   runs right away.
//! - otherwise the peer is queued at the tail and the caller continues.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::any::Any;
use core::cell::RefCell;
use core::fmt;

use hashbrown::HashMap;
use static_assertions::assert_not_impl_any;

use crate::bomb::Bomb;
use crate::error::Error;
use crate::flags::{Blocked, ChannelFlags, Preference};
use crate::list::List;
use crate::scheduler::Scheduler;
use crate::task::{Arena, Id};
use crate::tasklet::Tasklet;

/// A queue tasks can block on.
///
/// Blocked tasks keep a type-erased reference to their queue so the scheduler can unlink them
/// when they are killed or an exception is thrown at them.
pub(crate) trait WaitQueue {
    /// Unlinks a blocked task, returning whatever the queue held on its behalf.
    fn remove_waiter(&self, tasks: &mut Arena, id: Id) -> Option<Box<dyn Any>>;
}

/// A rendezvous channel for handing values of type `T` from one tasklet to another.
///
/// Channels are cheap to clone, all clones refer to the same channel.
pub struct Channel<T> {
    inner: Rc<Inner<T>>,
}

assert_not_impl_any!(Channel<u32>: Send, Sync);

struct Inner<T> {
    state: RefCell<State<T>>,
}

struct State<T> {
    queue: List,
    balance: isize,
    flags: ChannelFlags,
    /// Values deposited by blocked senders, and values handed to woken receivers that have not
    /// yet picked them up.
    slots: HashMap<Id, Result<T, Bomb>>,
}

/// The result of the non-blocking half of a channel operation.
enum Rendezvous<T> {
    /// A peer was found, `true` if the caller has to suspend.
    Done { switch: bool, item: T },
    /// The caller was queued and has to suspend.
    Blocked,
}

impl<T: 'static> WaitQueue for Inner<T> {
    fn remove_waiter(&self, tasks: &mut Arena, id: Id) -> Option<Box<dyn Any>> {
        let mut state = self.state.borrow_mut();
        state.queue.remove(tasks, id);
        state.balance -= state.balance.signum();

        let slot = state.slots.remove(&id)?;
        Some(Box::new(slot))
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Channel<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                state: RefCell::new(State {
                    queue: List::new(),
                    balance: 0,
                    flags: ChannelFlags::new(),
                    slots: HashMap::new(),
                }),
            }),
        }
    }

    /// Sends `value`, blocking until a receiver takes it.
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelClosed`] if the channel is closing and no receiver is waiting.
    /// - [`Error::BlockTrapped`] if the task would block but has `block_trap` set.
    /// - [`Error::DeadlockDetected`] if the task would block but it is the last runnable task.
    /// - [`Error::Bomb`] if a bomb went off while the task was suspended.
    ///
    /// # Panics
    ///
    /// Panics if the channel is used by tasks of more than one scheduler.
    pub async fn send(&self, tasklet: &Tasklet, value: T) -> Result<(), Error> {
        self.send_item(tasklet, Ok(value)).await
    }

    /// Like [`Channel::send`], but the receiver gets `bomb` raised instead of a value.
    ///
    /// # Errors
    ///
    /// See [`Channel::send`].
    pub async fn send_exception(&self, tasklet: &Tasklet, bomb: Bomb) -> Result<(), Error> {
        self.send_item(tasklet, Err(bomb)).await
    }

    /// Sends every item of `items` in order, returns the number of items sent.
    ///
    /// # Errors
    ///
    /// See [`Channel::send`]. Items after the failing one are not sent.
    pub async fn send_sequence<I>(&self, tasklet: &Tasklet, items: I) -> Result<usize, Error>
    where
        I: IntoIterator<Item = T>,
    {
        let mut sent = 0;
        for item in items {
            self.send(tasklet, item).await?;
            sent += 1;
        }
        Ok(sent)
    }

    async fn send_item(&self, tasklet: &Tasklet, item: Result<T, Bomb>) -> Result<(), Error> {
        let (rendezvous, stale) = {
            let mut core = tasklet.core.borrow_mut();
            let core = &mut *core;
            core.ensure_current(tasklet.id)?;
            let mut state = self.inner.state.borrow_mut();

            if state.balance < 0 {
                let peer = state
                    .queue
                    .pop_front(&mut core.tasks)
                    .expect("negative balance implies a waiting receiver");
                state.balance += 1;
                state.slots.insert(peer, item);

                let stale = core.wake(peer);
                let switch =
                    core.wake_after_rendezvous(tasklet.id, peer, Preference::Receiver, state.flags);
                (Rendezvous::Done { switch, item: () }, stale)
            } else {
                if state.flags.is_closing() {
                    return Err(Error::ChannelClosed);
                }
                core.check_can_block(tasklet.id)?;

                state.slots.insert(tasklet.id, item);
                core.block_current(
                    &mut state.queue,
                    tasklet.id,
                    Blocked::Sending,
                    self.inner.clone(),
                );
                state.balance += 1;
                (Rendezvous::Blocked, None)
            }
        };
        drop(stale);

        match rendezvous {
            Rendezvous::Done { switch: false, .. } => Ok(()),
            Rendezvous::Done { switch: true, .. } | Rendezvous::Blocked => {
                tasklet.switch().await;
                tasklet.deliver_bomb()
            }
        }
    }

    /// Receives a value, blocking until a sender provides one.
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelClosed`] if the channel is closing and no sender is waiting.
    /// - [`Error::BlockTrapped`] if the task would block but has `block_trap` set.
    /// - [`Error::DeadlockDetected`] if the task would block but it is the last runnable task.
    /// - [`Error::Bomb`] if the sender used [`Channel::send_exception`], or a bomb went off while
    ///   the task was suspended.
    ///
    /// # Panics
    ///
    /// Panics if the channel is used by tasks of more than one scheduler.
    pub async fn receive(&self, tasklet: &Tasklet) -> Result<T, Error> {
        let (rendezvous, stale) = {
            let mut core = tasklet.core.borrow_mut();
            let core = &mut *core;
            core.ensure_current(tasklet.id)?;
            let mut state = self.inner.state.borrow_mut();

            if state.balance > 0 {
                let peer = state
                    .queue
                    .pop_front(&mut core.tasks)
                    .expect("positive balance implies a waiting sender");
                state.balance -= 1;
                let item = state
                    .slots
                    .remove(&peer)
                    .expect("blocked sender must have deposited its value");

                let stale = core.wake(peer);
                let switch =
                    core.wake_after_rendezvous(tasklet.id, peer, Preference::Sender, state.flags);
                (Rendezvous::Done { switch, item }, stale)
            } else {
                if state.flags.is_closing() {
                    return Err(Error::ChannelClosed);
                }
                core.check_can_block(tasklet.id)?;

                core.block_current(
                    &mut state.queue,
                    tasklet.id,
                    Blocked::Receiving,
                    self.inner.clone(),
                );
                state.balance -= 1;
                (Rendezvous::Blocked, None)
            }
        };
        drop(stale);

        match rendezvous {
            Rendezvous::Done {
                switch: false,
                item,
            } => item.map_err(Error::Bomb),
            Rendezvous::Done { switch: true, item } => {
                tasklet.switch().await;
                tasklet.deliver_bomb()?;
                item.map_err(Error::Bomb)
            }
            Rendezvous::Blocked => {
                let _pickup = Pickup {
                    inner: &self.inner,
                    id: tasklet.id,
                };
                tasklet.switch().await;
                let slot = self.inner.state.borrow_mut().slots.remove(&tasklet.id);
                tasklet.deliver_bomb()?;
                match slot {
                    Some(item) => item.map_err(Error::Bomb),
                    // kill and throw arm a bomb, a cancelled wait never resumes
                    None => unreachable!(
                        "a blocked receiver is only resumed by a rendezvous, which leaves a value"
                    ),
                }
            }
        }
    }

    /// Marks the channel as closing. Waiting tasks are not disturbed, but once they are served
    /// no task can block on the channel anymore.
    pub fn close(&self) {
        self.inner.state.borrow_mut().flags.set_closing(true);
    }

    /// Reopens a closing channel.
    pub fn open(&self) {
        self.inner.state.borrow_mut().flags.set_closing(false);
    }

    /// The number of waiting senders (positive) or receivers (negative).
    pub fn balance(&self) -> isize {
        self.inner.state.borrow().balance
    }

    /// The number of waiting tasks.
    pub fn len(&self) -> usize {
        self.inner.state.borrow().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.borrow().queue.is_empty()
    }

    pub fn is_closing(&self) -> bool {
        self.inner.state.borrow().flags.is_closing()
    }

    /// Whether the channel is closing and no task is waiting on it anymore.
    pub fn is_closed(&self) -> bool {
        let state = self.inner.state.borrow();
        state.flags.is_closing() && state.balance == 0
    }

    pub fn flags(&self) -> ChannelFlags {
        self.inner.state.borrow().flags
    }

    pub fn preference(&self) -> Preference {
        self.inner.state.borrow().flags.preference()
    }

    /// Sets the channel's preference, returning the previous value.
    pub fn set_preference(&self, preference: Preference) -> Preference {
        self.inner
            .state
            .borrow_mut()
            .flags
            .set_preference(preference)
    }

    pub fn schedule_all(&self) -> bool {
        self.inner.state.borrow().flags.schedule_all()
    }

    /// Sets the channel's `schedule_all` flag, returning the previous value.
    pub fn set_schedule_all(&self, schedule_all: bool) -> bool {
        self.inner
            .state
            .borrow_mut()
            .flags
            .set_schedule_all(schedule_all)
    }

    /// The waiting tasks in the order they will be served.
    ///
    /// `scheduler` must be the scheduler the waiting tasks belong to.
    pub fn waiters(&self, scheduler: &Scheduler) -> Vec<Id> {
        scheduler.with_tasks(|tasks| self.inner.state.borrow().queue.iter(tasks).collect())
    }
}

/// Drops the value handed to a woken receiver whose `receive` was dropped before it could pick
/// the value up.
struct Pickup<'a, T> {
    inner: &'a Inner<T>,
    id: Id,
}

impl<T> Drop for Pickup<'_, T> {
    fn drop(&mut self) {
        let slot = self
            .inner
            .state
            .try_borrow_mut()
            .ok()
            .and_then(|mut state| state.slots.remove(&self.id));
        drop(slot);
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Channel")
            .field("balance", &state.balance)
            .field("flags", &state.flags)
            .finish_non_exhaustive()
    }
}
