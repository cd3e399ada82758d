// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Execution contexts of tasklets.
//!
//! A tasklet's context is a stackless coroutine: its body is an `async` block that is polled
//! exactly once per resumption. The body suspends itself by awaiting [`Suspend`], which returns
//! `Poll::Pending` a single time, after having told the scheduler where the task goes next.
//!
//! Wakers play no role here, which task runs next is decided by the run queue alone. Bodies are
//! polled with a no-op waker and a body that returns `Pending` on its own (by awaiting some
//! foreign future) is simply treated like a task that yielded.

use alloc::boxed::Box;
use core::fmt;
use core::pin::Pin;
use core::task::{Context, Poll};

use crate::error::Error;

type Body = Pin<Box<dyn Future<Output = Result<(), Error>>>>;

pub(crate) struct ExecContext {
    body: Body,
    started: bool,
}

impl ExecContext {
    pub(crate) fn new<F>(body: F) -> Self
    where
        F: Future<Output = Result<(), Error>> + 'static,
    {
        Self {
            body: Box::pin(body),
            started: false,
        }
    }

    /// Whether the context has been resumed at least once.
    pub(crate) fn started(&self) -> bool {
        self.started
    }

    /// Runs the body until its next suspension point, or to completion.
    pub(crate) fn resume(&mut self) -> Poll<Result<(), Error>> {
        self.started = true;
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        self.body.as_mut().poll(&mut cx)
    }
}

impl fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecContext")
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

/// Hands control back to the scheduler.
///
/// Completes on the poll after the one that suspended, i.e. the next time the scheduler resumes
/// the task.
pub(crate) fn suspend() -> Suspend {
    Suspend { suspended: false }
}

#[must_use = "futures do nothing unless `.await`ed"]
pub(crate) struct Suspend {
    suspended: bool,
}

impl Future for Suspend {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.suspended {
            return Poll::Ready(());
        }

        self.suspended = true;
        Poll::Pending
    }
}
