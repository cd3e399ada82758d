// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Cooperative tasklets that communicate over rendezvous channels.
//!
//! A [`Scheduler`] runs many lightweight tasks ("tasklets") on a single thread. Tasklets are
//! never preempted, they give up control only at well-defined points: explicit
//! [`Tasklet::schedule`] calls, [`Channel`] operations that have to wait for a peer and, for
//! tasks that opted into auto-scheduling, at [`Tasklet::checkpoint`]s.
//!
//! ```
//! use tasklet::{Channel, Error, Scheduler};
//!
//! let scheduler = Scheduler::new();
//! let chan = Channel::new();
//!
//! let rx = chan.clone();
//! scheduler.spawn(move |t| async move {
//!     assert_eq!(rx.receive(&t).await?, 42);
//!     Ok::<_, Error>(())
//! });
//! scheduler.spawn(move |t| async move { chan.send(&t, 42).await });
//!
//! scheduler.run().unwrap();
//! ```
//!
//! Killing a task or throwing an exception at it arms a [`Bomb`], which goes off the next time the
//! task is resumed: the operation it was suspended in returns [`Error::Bomb`] and the task
//! unwinds by propagating it.

#![cfg_attr(not(test), no_std)]
extern crate alloc;

mod bomb;
mod channel;
mod config;
mod context;
mod error;
mod flags;
mod list;
mod scheduler;
mod task;
mod tasklet;

pub use bomb::Bomb;
pub use channel::Channel;
pub use config::{Config, IdlePolicy, SchedulerBuilder};
pub use error::{Error, TaskFailure};
pub use flags::{Blocked, ChannelFlags, Preference, TaskFlags};
pub use scheduler::{RunOutcome, Scheduler};
pub use task::{Id, TaskBuilder, TaskInfo, TaskState};
pub use tasklet::{NestingGuard, Tasklet};
