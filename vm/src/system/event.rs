//! Deferred completions of blocking syscalls.
//!
//! A blocking syscall suspends its context and queues an [`Event`] naming
//! what to finish once one of its triggers fires. The emulator scans the
//! queue periodically; a fired event is removed before its completion runs,
//! so completions may queue new events without disturbing the scan.

use std::time::{Duration, Instant};

use crate::kernel::ContextId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// `read` on an empty pipe: copy up to `size` bytes to `address`.
    Read { fd: i32, address: u32, size: u32 },
    /// `nanosleep`: just wake up.
    Resume,
    /// `waitpid`/`wait4`: reap a zombie, storing its status at
    /// `status_address` when non-null.
    Wait { pid: i32, status_address: u32 },
    /// `poll` on one pipe descriptor described by the `pollfd` at `pollfd`.
    Poll { fd: i32, pollfd: u32 },
    /// `rt_sigsuspend`: deliver signals and restore the blocked mask.
    SigSuspend,
}

/// Conditions any of which fires an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Triggers {
    /// Pipe read descriptor with data waiting (or no writer left).
    pub data_fd: Option<i32>,
    pub deadline: Option<Instant>,
    /// A matching zombie exists: -1 for any, otherwise a pid.
    pub wait_pid: Option<i32>,
    /// The waiting context has a deliverable signal.
    pub signal: bool,
}

impl Triggers {
    pub fn data(fd: i32) -> Self {
        Self {
            data_fd: Some(fd),
            ..Default::default()
        }
    }

    pub fn timeout(duration: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + duration),
            ..Default::default()
        }
    }

    pub fn wait(pid: i32) -> Self {
        Self {
            wait_pid: Some(pid),
            signal: true,
            ..Default::default()
        }
    }

    pub fn signal() -> Self {
        Self {
            signal: true,
            ..Default::default()
        }
    }

    pub fn or_timeout(self, duration: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + duration),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub context: ContextId,
    pub kind: EventKind,
    pub triggers: Triggers,
}

impl Event {
    pub fn new(context: ContextId, kind: EventKind, triggers: Triggers) -> Self {
        Self {
            context,
            kind,
            triggers,
        }
    }
}

/// Pending events in arrival order.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<Event>,
}

impl EventQueue {
    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Event> {
        self.events.get(index)
    }

    pub fn remove(&mut self, index: usize) -> Event {
        self.events.remove(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Drop every event without running it.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}
