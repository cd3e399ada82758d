// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use alloc::boxed::Box;
use core::fmt;

/// A deferred exception.
///
/// Bombs are armed on a task by [`Scheduler::kill`], [`Scheduler::throw`] or by receiving a value
/// sent with [`Channel::send_exception`]. They go off at the task's next suspension point, where
/// the pending operation returns [`Error::Bomb`] instead of its regular result.
///
/// [`Scheduler::kill`]: crate::Scheduler::kill
/// [`Scheduler::throw`]: crate::Scheduler::throw
/// [`Channel::send_exception`]: crate::Channel::send_exception
/// [`Error::Bomb`]: crate::Error::Bomb
#[derive(Debug)]
pub enum Bomb {
    /// The task was killed and must unwind.
    Exit,
    /// An arbitrary error raised into the task.
    Exception(Box<dyn core::error::Error + 'static>),
}

impl Bomb {
    pub fn exception<E>(error: E) -> Self
    where
        E: Into<Box<dyn core::error::Error + 'static>>,
    {
        Self::Exception(error.into())
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, Bomb::Exit)
    }
}

impl fmt::Display for Bomb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bomb::Exit => f.write_str("tasklet was killed"),
            Bomb::Exception(err) => write!(f, "exception raised into tasklet: {err}"),
        }
    }
}

impl core::error::Error for Bomb {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Bomb::Exit => None,
            Bomb::Exception(err) => Some(&**err),
        }
    }
}
