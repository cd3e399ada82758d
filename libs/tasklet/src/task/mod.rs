// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

mod builder;
mod id;

use alloc::rc::Rc;
use alloc::string::String;

pub use builder::TaskBuilder;
use hashbrown::HashMap;
pub use id::Id;

use crate::bomb::Bomb;
use crate::channel::WaitQueue;
use crate::context::ExecContext;
use crate::flags::TaskFlags;
use crate::list::{Linked, Links};

/// All live tasks of a scheduler.
pub(crate) type Arena = HashMap<Id, TaskControlBlock>;

pub(crate) struct TaskControlBlock {
    pub(crate) id: Id,
    pub(crate) links: Links,
    pub(crate) flags: TaskFlags,
    pub(crate) nesting_level: usize,
    /// Deferred exception, delivered at the next suspension point.
    pub(crate) bomb: Option<Bomb>,
    /// `None` while the task is being resumed.
    pub(crate) exec: Option<ExecContext>,
    /// The wait queue this task is linked into while blocked.
    pub(crate) blocked_on: Option<Rc<dyn WaitQueue>>,
    pub(crate) name: Option<String>,
    pub(crate) span: tracing::Span,
    /// Checkpoints passed since the task was last switched in.
    pub(crate) ticks: u32,
}

impl TaskControlBlock {
    pub(crate) fn new(
        id: Id,
        name: Option<String>,
        flags: TaskFlags,
        exec: ExecContext,
        span: tracing::Span,
    ) -> Self {
        Self {
            id,
            links: Links::default(),
            flags,
            nesting_level: 0,
            bomb: None,
            exec: Some(exec),
            blocked_on: None,
            name,
            span,
            ticks: 0,
        }
    }

    pub(crate) fn started(&self) -> bool {
        self.exec.as_ref().is_none_or(ExecContext::started)
    }

    pub(crate) fn info(&self, current: Option<Id>) -> TaskInfo {
        let state = if self.flags.is_zombie() {
            TaskState::Zombie
        } else if current == Some(self.id) {
            TaskState::Running
        } else if self.flags.is_blocked() {
            TaskState::Blocked
        } else {
            TaskState::Runnable
        };

        TaskInfo {
            id: self.id,
            name: self.name.clone(),
            state,
            flags: self.flags,
            nesting_level: self.nesting_level,
            started: self.started(),
        }
    }
}

impl Linked for Arena {
    fn links(&self, id: Id) -> &Links {
        &self.get(&id).expect("linked task must be live").links
    }

    fn links_mut(&mut self, id: Id) -> &mut Links {
        &mut self.get_mut(&id).expect("linked task must be live").links
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Linked into the run queue, waiting for its turn.
    Runnable,
    /// Currently being resumed by the scheduler.
    Running,
    /// Waiting on a channel.
    Blocked,
    /// Killed, will unwind the next time it runs.
    Zombie,
}

/// A snapshot of a task's scheduling state.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: Id,
    pub name: Option<String>,
    pub state: TaskState,
    pub flags: TaskFlags,
    pub nesting_level: usize,
    /// Whether any code of the task has run yet.
    pub started: bool,
}
