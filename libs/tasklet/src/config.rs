// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::scheduler::Scheduler;

/// What [`Scheduler::run`] does when the run queue is empty but blocked tasks remain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum IdlePolicy {
    /// Fail with [`Error::NoRunnableTasks`](crate::Error::NoRunnableTasks).
    #[default]
    Fail,
    /// Return [`RunOutcome::Idle`](crate::RunOutcome::Idle) to the host, which may unblock
    /// tasks and call `run` again.
    Return,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// The number of checkpoints a task passes before an auto-schedule switch happens.
    pub auto_schedule_interval: u32,
    pub idle_policy: IdlePolicy,
    /// Refuse to block the last runnable task on a channel. Only applies with
    /// [`IdlePolicy::Fail`], with [`IdlePolicy::Return`] the host may still wake the task.
    pub deadlock_detection: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auto_schedule_interval: 1,
            idle_policy: IdlePolicy::Fail,
            deadlock_detection: true,
        }
    }
}

/// Builds a [`Scheduler`] with custom configuration.
#[derive(Debug, Default)]
pub struct SchedulerBuilder {
    config: Config,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the number of checkpoints between automatic switches.
    ///
    /// Values below 1 are treated as 1. By default, every checkpoint of an auto-scheduled task
    /// switches.
    pub fn auto_schedule_interval(mut self, ticks: u32) -> Self {
        self.config.auto_schedule_interval = ticks.max(1);
        self
    }

    /// Override what happens when only blocked tasks remain.
    ///
    /// By default, [`IdlePolicy::Fail`] is used.
    pub fn idle_policy(mut self, policy: IdlePolicy) -> Self {
        self.config.idle_policy = policy;
        self
    }

    /// Enable or disable deadlock detection when blocking on channels.
    ///
    /// Enabled by default. Has no effect with [`IdlePolicy::Return`].
    pub fn deadlock_detection(mut self, enabled: bool) -> Self {
        self.config.deadlock_detection = enabled;
        self
    }

    pub fn build(self) -> Scheduler {
        Scheduler::with_config(self.config)
    }
}
