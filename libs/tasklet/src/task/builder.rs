// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use alloc::borrow::ToOwned;
use alloc::rc::Rc;
use core::cell::RefCell;
use core::panic::Location;

use crate::context::ExecContext;
use crate::error::Error;
use crate::flags::TaskFlags;
use crate::scheduler::Core;
use crate::task::TaskControlBlock;
use crate::task::id::Id;
use crate::tasklet::Tasklet;

pub struct TaskBuilder<'a> {
    core: &'a Rc<RefCell<Core>>,
    location: Option<Location<'a>>,
    name: Option<&'a str>,
    kind: &'a str,
    flags: TaskFlags,
}

impl<'a> TaskBuilder<'a> {
    pub(crate) fn new(core: &'a Rc<RefCell<Core>>) -> Self {
        Self {
            core,
            location: None,
            name: None,
            kind: "tasklet",
            flags: TaskFlags::new(),
        }
    }

    /// Override the name of tasks spawned by this builder.
    ///
    /// By default, tasks are unnamed.
    pub fn name(mut self, name: &'a str) -> Self {
        self.name = Some(name);
        self
    }

    /// Override the kind string of tasks spawned by this builder, this will only show up
    /// in debug messages and spans.
    ///
    /// By default, tasks are of kind `"tasklet"`.
    pub fn kind(mut self, kind: &'a str) -> Self {
        self.kind = kind;
        self
    }

    /// Override the source code location that will be associated with tasks spawned by this builder.
    ///
    /// By default, tasks will inherit the source code location of where they have been first spawned.
    pub fn location(mut self, location: Location<'a>) -> Self {
        self.location = Some(location);
        self
    }

    /// Spawn tasks that start out atomic.
    pub fn atomic(mut self, atomic: bool) -> Self {
        self.flags.set_atomic(atomic);
        self
    }

    /// Spawn tasks that take part in auto-scheduling at checkpoints.
    pub fn autoschedule(mut self, autoschedule: bool) -> Self {
        self.flags.set_autoschedule(autoschedule);
        self
    }

    pub fn ignore_nesting(mut self, ignore_nesting: bool) -> Self {
        self.flags.set_ignore_nesting(ignore_nesting);
        self
    }

    pub fn block_trap(mut self, block_trap: bool) -> Self {
        self.flags.set_block_trap(block_trap);
        self
    }

    /// Spawn a new tasklet running the body returned by `f`.
    ///
    /// The task is linked at the tail of the run queue. `f` is not called before the task is
    /// resumed for the first time, so a task that is killed before it ever ran executes no code
    /// at all.
    #[track_caller]
    pub fn spawn<F, Fut>(&self, f: F) -> Id
    where
        F: FnOnce(Tasklet) -> Fut + 'static,
        Fut: Future<Output = Result<(), Error>> + 'static,
    {
        let id = Id::next();

        let loc = self.location.as_ref().unwrap_or(Location::caller());
        let span = tracing::trace_span!(
            "tasklet",
            task.tid = id.as_u64(),
            task.name = ?self.name,
            task.kind = self.kind,
            loc.file = loc.file(),
            loc.line = loc.line(),
            loc.col = loc.column(),
        );

        let tasklet = Tasklet::new(self.core.clone(), id);
        let exec = ExecContext::new(async move {
            // a bomb thrown before the task ever ran goes off before any of its code
            tasklet.deliver_bomb()?;
            f(tasklet).await
        });

        let tcb = TaskControlBlock::new(
            id,
            self.name.map(ToOwned::to_owned),
            self.flags,
            exec,
            span,
        );
        self.core.borrow_mut().insert(tcb);

        tracing::trace!(task.tid = id.as_u64(), task.name = ?self.name, "spawned");
        id
    }
}
