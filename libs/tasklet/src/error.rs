// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use alloc::string::String;
use core::fmt;

use crate::bomb::Bomb;
use crate::task::Id;

#[derive(Debug)]
pub enum Error {
    /// The channel is closing and there is no peer to rendezvous with.
    ChannelClosed,
    /// The current task has `block_trap` set and attempted to block on a channel.
    BlockTrapped,
    /// The current task attempted to block but it is the only runnable task.
    DeadlockDetected,
    /// The run queue is empty while blocked tasks remain.
    NoRunnableTasks { blocked: usize },
    /// A deferred exception went off.
    Bomb(Bomb),
    NoSuchTask(Id),
    NotRunnable(Id),
    /// A tasklet operation was attempted through the handle of a task that is not running.
    NotCurrent(Id),
    /// The scheduler is already running.
    SchedulerBusy,
}

impl Error {
    /// Returns `true` if this is the [`Bomb::Exit`] a killed task unwinds with.
    pub fn is_exit(&self) -> bool {
        matches!(self, Error::Bomb(Bomb::Exit))
    }
}

impl From<Bomb> for Error {
    fn from(bomb: Bomb) -> Self {
        Self::Bomb(bomb)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ChannelClosed => f.write_str("channel is closed"),
            Error::BlockTrapped => f.write_str("tasklet with block trap attempted to block"),
            Error::DeadlockDetected => {
                f.write_str("the last runnable tasklet cannot be blocked")
            }
            Error::NoRunnableTasks { blocked } => {
                write!(f, "no runnable tasklets left, {blocked} remain blocked")
            }
            Error::Bomb(bomb) => fmt::Display::fmt(bomb, f),
            Error::NoSuchTask(id) => write!(f, "no tasklet with id {id}"),
            Error::NotRunnable(id) => write!(f, "tasklet {id} is not runnable"),
            Error::NotCurrent(id) => write!(f, "tasklet {id} is not the current tasklet"),
            Error::SchedulerBusy => f.write_str("scheduler is already running"),
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Error::Bomb(bomb) => Some(bomb),
            _ => None,
        }
    }
}

/// A task that terminated with an error.
///
/// Task failures are never re-raised into other tasks, the scheduler collects them instead
/// (see [`Scheduler::take_failures`]).
///
/// [`Scheduler::take_failures`]: crate::Scheduler::take_failures
#[derive(Debug)]
pub struct TaskFailure {
    pub id: Id,
    pub name: Option<String>,
    pub error: Error,
    /// Whether the error was raised while the task was unwinding after being killed.
    pub during_teardown: bool,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tasklet {}", self.id)?;
        if let Some(name) = &self.name {
            write!(f, " ({name})")?;
        }
        if self.during_teardown {
            f.write_str(" failed during teardown: ")?;
        } else {
            f.write_str(" failed: ")?;
        }
        fmt::Display::fmt(&self.error, f)
    }
}

impl core::error::Error for TaskFailure {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        Some(&self.error)
    }
}
