// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Scheduling policy bits for tasks and channels.
//!
//! # Policy for atomic/autoschedule and switching
//!
//! A task switch can always be done explicitly by calling [`Tasklet::schedule`]. `atomic` and
//! `autoschedule` only govern the *automatic* switches (auto-schedule checkpoints and the
//! watchdog):
//!
//! ```text
//! atomic  autoschedule
//!
//!   1         any       Neither a checkpoint nor the watchdog will switch this task.
//!   0         0         The task can be interrupted on request (watchdog, `interrupt`),
//!                       or killed.
//!   0         1         Like above, plus auto-scheduling at checkpoints is enabled.
//! ```
//!
//! All flags are zero by default.
//!
//! [`Tasklet::schedule`]: crate::Tasklet::schedule

use mycelium_bitfield::{bitfield, enum_from_bits};

bitfield! {
    /// A snapshot of a task's scheduling flags.
    #[derive(Eq, PartialEq)]
    pub struct TaskFlags<u16> {
        /// Whether (and in which direction) the task is waiting in a channel.
        ///
        /// Maintained by the channel logic only. Non-[`Blocked::No`] iff the task is linked into
        /// a channel's wait queue.
        pub const BLOCKED: Blocked;
        /// If set, no automatic switch will ever move this task off the CPU.
        pub const ATOMIC: bool;
        /// Allows automatic switches even if the nesting level is not zero.
        pub const IGNORE_NESTING: bool;
        /// The task likes to be auto-scheduled at checkpoints.
        pub const AUTOSCHEDULE: bool;
        /// Debugging aid. Whenever the task would block on a channel, the operation fails with
        /// [`Error::BlockTrapped`](crate::Error::BlockTrapped) instead.
        pub const BLOCK_TRAP: bool;
        /// The task has been killed and is waiting for its teardown to run.
        pub const IS_ZOMBIE: bool;
        /// An interrupt was issued while the task could not be switched, it is handled at the
        /// next opportunity.
        pub const PENDING_INTERRUPT: bool;
    }
}

enum_from_bits! {
    /// Which side of a channel a task is waiting on.
    #[derive(Debug, Eq, PartialEq)]
    pub enum Blocked<u8> {
        /// Not linked into any channel.
        No = 0b00,
        /// Waiting with a value to hand over.
        Sending = 0b01,
        /// Waiting for a value.
        Receiving = 0b10,
    }
}

bitfield! {
    /// A snapshot of a channel's flags.
    #[derive(Eq, PartialEq)]
    pub struct ChannelFlags<u8> {
        /// When set, the channel refuses to be extended. The channel is *closed* once this is
        /// set and no task is waiting on it.
        pub const CLOSING: bool;
        /// Which of the two tasks of a rendezvous continues running.
        pub const PREFERENCE: Preference;
        /// Ignore the preference and always switch to the next runnable task after a rendezvous.
        pub const SCHEDULE_ALL: bool;
    }
}

enum_from_bits! {
    /// Which side of a rendezvous is run first.
    #[derive(Debug, Eq, PartialEq)]
    pub enum Preference<u8> {
        /// The caller continues, the woken peer is queued at the end of the run queue.
        Neither = 0b00,
        /// The receiver is run first.
        Receiver = 0b01,
        /// The sender is run first.
        Sender = 0b10,
    }
}

// === impl TaskFlags ===

impl TaskFlags {
    pub fn blocked(&self) -> Blocked {
        self.get(Self::BLOCKED)
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked() != Blocked::No
    }

    pub fn atomic(&self) -> bool {
        self.get(Self::ATOMIC)
    }

    pub fn ignore_nesting(&self) -> bool {
        self.get(Self::IGNORE_NESTING)
    }

    pub fn autoschedule(&self) -> bool {
        self.get(Self::AUTOSCHEDULE)
    }

    pub fn block_trap(&self) -> bool {
        self.get(Self::BLOCK_TRAP)
    }

    pub fn is_zombie(&self) -> bool {
        self.get(Self::IS_ZOMBIE)
    }

    pub fn pending_interrupt(&self) -> bool {
        self.get(Self::PENDING_INTERRUPT)
    }

    pub(crate) fn set_blocked(&mut self, blocked: Blocked) {
        self.set(Self::BLOCKED, blocked);
    }

    /// Sets the `atomic` flag, returning the previous value.
    pub fn set_atomic(&mut self, atomic: bool) -> bool {
        let prev = self.atomic();
        self.set(Self::ATOMIC, atomic);
        prev
    }

    /// Sets the `ignore_nesting` flag, returning the previous value.
    pub fn set_ignore_nesting(&mut self, ignore_nesting: bool) -> bool {
        let prev = self.ignore_nesting();
        self.set(Self::IGNORE_NESTING, ignore_nesting);
        prev
    }

    /// Sets the `autoschedule` flag, returning the previous value.
    pub fn set_autoschedule(&mut self, autoschedule: bool) -> bool {
        let prev = self.autoschedule();
        self.set(Self::AUTOSCHEDULE, autoschedule);
        prev
    }

    /// Sets the `block_trap` flag, returning the previous value.
    pub fn set_block_trap(&mut self, block_trap: bool) -> bool {
        let prev = self.block_trap();
        self.set(Self::BLOCK_TRAP, block_trap);
        prev
    }

    pub(crate) fn set_zombie(&mut self) {
        self.set(Self::IS_ZOMBIE, true);
    }

    pub(crate) fn set_pending_interrupt(&mut self, pending: bool) -> bool {
        let prev = self.pending_interrupt();
        self.set(Self::PENDING_INTERRUPT, pending);
        prev
    }

    /// Returns `true` if the scheduler may switch this task out.
    ///
    /// `explicit` is set for switches that were requested on behalf of the task (watchdog and
    /// interrupts), these ignore the `autoschedule` preference but still respect everything else.
    pub fn is_switchable(&self, explicit: bool, nesting_level: usize) -> bool {
        !self.atomic()
            && (self.autoschedule() || explicit)
            && (nesting_level == 0 || self.ignore_nesting())
            && !self.is_blocked()
            && !self.is_zombie()
    }
}

// === impl Blocked ===

impl Blocked {
    /// The direction as a signed number: `+1` for senders, `-1` for receivers, `0` otherwise.
    pub fn direction(self) -> i8 {
        match self {
            Blocked::No => 0,
            Blocked::Sending => 1,
            Blocked::Receiving => -1,
        }
    }
}

// === impl ChannelFlags ===

impl ChannelFlags {
    pub fn is_closing(&self) -> bool {
        self.get(Self::CLOSING)
    }

    pub fn preference(&self) -> Preference {
        self.get(Self::PREFERENCE)
    }

    pub fn schedule_all(&self) -> bool {
        self.get(Self::SCHEDULE_ALL)
    }

    pub(crate) fn set_closing(&mut self, closing: bool) {
        self.set(Self::CLOSING, closing);
    }

    pub(crate) fn set_preference(&mut self, preference: Preference) -> Preference {
        let prev = self.preference();
        self.set(Self::PREFERENCE, preference);
        prev
    }

    pub(crate) fn set_schedule_all(&mut self, schedule_all: bool) -> bool {
        let prev = self.schedule_all();
        self.set(Self::SCHEDULE_ALL, schedule_all);
        prev
    }
}

// === impl Preference ===

impl Preference {
    /// Converts from the numeric form: `-1` prefers the receiver, `1` the sender, `0` neither.
    pub fn from_i8(value: i8) -> Self {
        match value.signum() {
            -1 => Preference::Receiver,
            1 => Preference::Sender,
            _ => Preference::Neither,
        }
    }

    pub fn as_i8(self) -> i8 {
        match self {
            Preference::Neither => 0,
            Preference::Receiver => -1,
            Preference::Sender => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_zero() {
        let flags = TaskFlags::new();
        assert_eq!(flags.blocked(), Blocked::No);
        assert!(!flags.atomic());
        assert!(!flags.ignore_nesting());
        assert!(!flags.autoschedule());
        assert!(!flags.block_trap());
        assert!(!flags.is_zombie());
        assert!(!flags.pending_interrupt());

        let flags = ChannelFlags::new();
        assert!(!flags.is_closing());
        assert_eq!(flags.preference(), Preference::Neither);
        assert!(!flags.schedule_all());
    }

    #[test]
    fn setters_return_previous_value() {
        let mut flags = TaskFlags::new();
        assert!(!flags.set_atomic(true));
        assert!(flags.set_atomic(false));
        assert!(!flags.set_autoschedule(true));
        assert!(flags.set_autoschedule(true));
        assert!(!flags.set_block_trap(true));
        assert!(!flags.set_ignore_nesting(true));

        // the other fields must not be disturbed
        assert!(!flags.atomic());
        assert!(flags.autoschedule());
        assert!(flags.block_trap());
        assert!(flags.ignore_nesting());
        assert_eq!(flags.blocked(), Blocked::No);
    }

    #[test]
    fn blocked_round_trips() {
        let mut flags = TaskFlags::new();
        flags.set_atomic(true);
        for blocked in [Blocked::Sending, Blocked::Receiving, Blocked::No] {
            flags.set_blocked(blocked);
            assert_eq!(flags.blocked(), blocked);
            assert!(flags.atomic());
        }
        assert_eq!(Blocked::Sending.direction(), 1);
        assert_eq!(Blocked::Receiving.direction(), -1);
    }

    #[test]
    fn switchable_truth_table() {
        for atomic in [false, true] {
            for autoschedule in [false, true] {
                let mut flags = TaskFlags::new();
                flags.set_atomic(atomic);
                flags.set_autoschedule(autoschedule);

                // atomic tasks are never switched automatically
                assert_eq!(flags.is_switchable(true, 0), !atomic);
                assert_eq!(flags.is_switchable(false, 0), !atomic && autoschedule);
            }
        }
    }

    #[test]
    fn nesting_suppresses_switches() {
        let mut flags = TaskFlags::new();
        flags.set_autoschedule(true);
        assert!(!flags.is_switchable(false, 1));
        assert!(!flags.is_switchable(true, 3));

        flags.set_ignore_nesting(true);
        assert!(flags.is_switchable(false, 1));
    }

    #[test]
    fn blocked_and_zombie_tasks_are_not_switchable() {
        let mut flags = TaskFlags::new();
        flags.set_autoschedule(true);
        flags.set_blocked(Blocked::Receiving);
        assert!(!flags.is_switchable(true, 0));

        let mut flags = TaskFlags::new();
        flags.set_zombie();
        assert!(!flags.is_switchable(true, 0));
    }

    #[test]
    fn channel_flags() {
        let mut flags = ChannelFlags::new();
        assert_eq!(flags.set_preference(Preference::Receiver), Preference::Neither);
        flags.set_closing(true);
        assert!(!flags.set_schedule_all(true));

        assert_eq!(flags.preference(), Preference::Receiver);
        assert!(flags.is_closing());
        assert!(flags.schedule_all());
    }

    #[test]
    fn preference_numeric_form() {
        assert_eq!(Preference::from_i8(-1), Preference::Receiver);
        assert_eq!(Preference::from_i8(5), Preference::Sender);
        assert_eq!(Preference::from_i8(0), Preference::Neither);
        assert_eq!(Preference::Receiver.as_i8(), -1);
    }
}
