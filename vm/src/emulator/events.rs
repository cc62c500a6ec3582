//! Event queue scan: wake contexts whose blocking syscall can complete.

use std::time::Instant;

use mipsemu_common::memory::MemoryProcessor;
use tracing::debug;

use super::Emulator;
use crate::{
    error::Result,
    kernel::ContextId,
    system::event::{Event, EventKind},
};

const POLLIN: u16 = 1;

impl Emulator {
    /// Whether any trigger of `event` holds.
    fn event_fired(&self, event: &Event) -> bool {
        let triggers = &event.triggers;
        let pipes = &self.system.pipes;

        triggers
            .data_fd
            .is_some_and(|fd| pipes.available(fd) > 0 || pipes.writer_closed(fd))
            || triggers.deadline.is_some_and(|deadline| deadline <= Instant::now())
            || triggers.wait_pid.is_some_and(|pid| match pid {
                -1 => self.kernel.zombie_count() > 0,
                pid => self.kernel.is_zombie(pid as u32),
            })
            || (triggers.signal
                && self
                    .kernel
                    .get(event.context)
                    .is_some_and(|context| context.signals.deliverable().is_some()))
    }

    /// Scan the queue in order, completing every event that fired. Events of
    /// contexts that finished meanwhile are dropped.
    pub fn process_events(&mut self) -> Result<()> {
        let mut i = 0;
        while let Some(&event) = self.system.events.get(i) {
            let finished = self
                .kernel
                .get(event.context)
                .map_or(true, |context| context.is_finished());
            if finished {
                self.system.events.remove(i);
                continue;
            }
            if !self.event_fired(&event) {
                i += 1;
                continue;
            }

            self.system.events.remove(i);
            if let EventKind::Poll { .. } = event.kind {
                let (siblings, before) = self.take_poll_siblings(event.context, i);
                i -= before;
                self.complete_poll(event, &siblings)?;
            } else {
                self.complete(event)?;
            }
        }
        Ok(())
    }

    /// Remove the other `poll` events of `ctx`, returning them with how many
    /// sat before `index`.
    fn take_poll_siblings(&mut self, ctx: ContextId, index: usize) -> (Vec<Event>, usize) {
        let mut siblings = Vec::new();
        let mut before = 0;
        let mut j = 0;
        while let Some(&event) = self.system.events.get(j) {
            if event.context == ctx && matches!(event.kind, EventKind::Poll { .. }) {
                siblings.push(self.system.events.remove(j));
                if j < index {
                    before += 1;
                }
                // `index` shifts along with the removals before it
                continue;
            }
            j += 1;
        }
        (siblings, before)
    }

    fn complete(&mut self, event: Event) -> Result<()> {
        let ctx = event.context;
        self.kernel.resume(ctx)?;

        match event.kind {
            EventKind::Read { fd, address, size } => {
                let data = self
                    .system
                    .pipes
                    .read_buffer(fd)
                    .map(|buffer| buffer.read(size as usize))
                    .unwrap_or_default();
                let context = self.kernel.context_mut(ctx)?;
                context.memory.write_bytes(address, &data)?;
                context.syscall_return(Ok(data.len() as u32));
            }
            EventKind::Resume => self.kernel.context_mut(ctx)?.syscall_return(Ok(0)),
            EventKind::Wait { pid, status_address } => {
                let zombie = self.kernel.kill_zombie(pid);
                let context = self.kernel.context_mut(ctx)?;
                match zombie {
                    Some(zombie) => {
                        if status_address != 0 {
                            context
                                .memory
                                .write_word(status_address, (zombie.exit_code & 0xff) << 8)?;
                        }
                        context.syscall_return(Ok(zombie.pid));
                    }
                    None => context.syscall_return(Err(libc::EINTR)),
                }
            }
            EventKind::SigSuspend => {
                self.process_signals()?;
                let context = self.kernel.context_mut(ctx)?;
                context.signals.blocked = context.signals.backup;
                context.syscall_return(Err(libc::EINTR));
            }
            EventKind::Poll { .. } => return self.complete_poll(event, &[]),
        }
        debug!("ctx{ctx}: {:?} completed", event.kind);
        Ok(())
    }

    /// Complete one `poll` call: every descriptor with data is reported
    /// ready and the call returns their count, 0 on timeout.
    fn complete_poll(&mut self, event: Event, siblings: &[Event]) -> Result<()> {
        let ctx = event.context;
        if !self.kernel.context(ctx)?.is_running() {
            self.kernel.resume(ctx)?;
        }

        let mut ready = 0;
        for event in std::iter::once(&event).chain(siblings) {
            if let EventKind::Poll { fd, pollfd } = event.kind {
                if self.system.pipes.available(fd) > 0 {
                    self.kernel.context_mut(ctx)?.memory.write_half(pollfd.wrapping_add(6), POLLIN)?;
                    ready += 1;
                }
            }
        }
        self.kernel.context_mut(ctx)?.syscall_return(Ok(ready));
        debug!("ctx{ctx}: poll completed with {ready} ready descriptors");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{emulator::Emulator, system::event::Triggers};
    use mipsemu_common::mips::Register;
    use mipsemu_config::KernelConfig;

    fn setup() -> (Emulator, ContextId) {
        let mut emulator = Emulator::new(&KernelConfig::default());
        let ctx = emulator.kernel.create().unwrap();
        (emulator, ctx)
    }

    fn block(emulator: &mut Emulator, ctx: ContextId, kind: EventKind, triggers: Triggers) {
        emulator.system.events.push(Event::new(ctx, kind, triggers));
        emulator.kernel.suspend(ctx).unwrap();
    }

    fn result(emulator: &Emulator, ctx: ContextId) -> (u32, u32) {
        let context = emulator.kernel.context(ctx).unwrap();
        (context.gpr(Register::V0), context.gpr(Register::A3))
    }

    #[test]
    fn test_read_waits_for_data() {
        let (mut emulator, ctx) = setup();
        let [read_fd, write_fd] = emulator.system.pipes.create().unwrap();
        let kind = EventKind::Read {
            fd: read_fd,
            address: 0x1000_0000,
            size: 16,
        };
        block(&mut emulator, ctx, kind, Triggers::data(read_fd));

        emulator.process_events().unwrap();
        assert_eq!(emulator.system.events.len(), 1);
        assert!(!emulator.kernel.context(ctx).unwrap().is_running());

        emulator.system.pipes.write_buffer(write_fd).unwrap().write(b"abc");
        emulator.process_events().unwrap();
        assert!(emulator.system.events.is_empty());
        assert!(emulator.kernel.context(ctx).unwrap().is_running());
        assert_eq!(result(&emulator, ctx), (3, 0));

        let memory = &mut emulator.kernel.context_mut(ctx).unwrap().memory;
        assert_eq!(memory.read_bytes(0x1000_0000, 3).unwrap(), b"abc");
    }

    #[test]
    fn test_read_leaves_surplus_in_pipe() {
        let (mut emulator, ctx) = setup();
        let [read_fd, write_fd] = emulator.system.pipes.create().unwrap();
        let kind = EventKind::Read {
            fd: read_fd,
            address: 0x1000_0000,
            size: 4,
        };
        block(&mut emulator, ctx, kind, Triggers::data(read_fd));

        emulator.system.pipes.write_buffer(write_fd).unwrap().write(b"abcdef");
        emulator.process_events().unwrap();
        assert_eq!(result(&emulator, ctx), (4, 0));

        let memory = &mut emulator.kernel.context_mut(ctx).unwrap().memory;
        assert_eq!(memory.read_bytes(0x1000_0000, 4).unwrap(), b"abcd");
        assert_eq!(memory.read_word(0x1000_0004), Ok(0));
        let buffer = emulator.system.pipes.read_buffer(read_fd).unwrap();
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.read(16), b"ef");
    }

    #[test]
    fn test_timer() {
        let (mut emulator, ctx) = setup();
        block(&mut emulator, ctx, EventKind::Resume, Triggers::timeout(Duration::ZERO));
        emulator.process_events().unwrap();
        assert!(emulator.kernel.context(ctx).unwrap().is_running());
        assert_eq!(result(&emulator, ctx), (0, 0));
    }

    #[test]
    fn test_wait_reaps_zombie() {
        let (mut emulator, parent) = setup();
        let child = emulator.kernel.clone_context(parent, 0, false).unwrap();
        let child_pid = emulator.kernel.pid(child).unwrap();
        let kind = EventKind::Wait {
            pid: -1,
            status_address: 0x1000_0000,
        };
        block(&mut emulator, parent, kind, Triggers::wait(-1));

        emulator.process_events().unwrap();
        assert_eq!(emulator.system.events.len(), 1);

        emulator.kernel.context_mut(child).unwrap().exit_code = 7;
        emulator.kernel.finish(child).unwrap();
        emulator.process_events().unwrap();

        assert_eq!(result(&emulator, parent), (child_pid, 0));
        assert_eq!(emulator.kernel.zombie_count(), 0);
        let memory = &mut emulator.kernel.context_mut(parent).unwrap().memory;
        assert_eq!(memory.read_word(0x1000_0000), Ok(7 << 8));
    }

    #[test]
    fn test_poll_completes_siblings_once() {
        let (mut emulator, ctx) = setup();
        let [first, _] = emulator.system.pipes.create().unwrap();
        let [second, second_writer] = emulator.system.pipes.create().unwrap();

        emulator.system.events.push(Event::new(
            ctx,
            EventKind::Poll {
                fd: first,
                pollfd: 0x1000_0000,
            },
            Triggers::data(first),
        ));
        emulator.system.events.push(Event::new(
            ctx,
            EventKind::Poll {
                fd: second,
                pollfd: 0x1000_0008,
            },
            Triggers::data(second),
        ));
        emulator.kernel.suspend(ctx).unwrap();

        emulator.system.pipes.write_buffer(second_writer).unwrap().write(b"x");
        emulator.process_events().unwrap();

        assert!(emulator.system.events.is_empty());
        assert_eq!(result(&emulator, ctx), (1, 0));
        let memory = &mut emulator.kernel.context_mut(ctx).unwrap().memory;
        assert_eq!(memory.read_half(0x1000_0006), Ok(0));
        assert_eq!(memory.read_half(0x1000_000e), Ok(POLLIN));
    }

    #[test]
    fn test_sigsuspend_restores_mask() {
        let (mut emulator, ctx) = setup();
        emulator.system.signal_table.get_mut(10).unwrap().handler = 0x0040_0000;

        let context = emulator.kernel.context_mut(ctx).unwrap();
        // Handler returns right away
        context.memory.write_word(0x0040_0000, 0x03e0_0008).unwrap();
        context.signals.backup.add(3);
        context.signals.pending.add(10);
        block(&mut emulator, ctx, EventKind::SigSuspend, Triggers::signal());

        emulator.process_events().unwrap();
        let context = emulator.kernel.context(ctx).unwrap();
        assert!(context.signals.pending.is_empty());
        assert!(context.signals.blocked.contains(3));
        assert_eq!(result(&emulator, ctx), (libc::EINTR as u32, 1));
    }

    #[test]
    fn test_events_of_finished_contexts_are_dropped() {
        let (mut emulator, ctx) = setup();
        block(&mut emulator, ctx, EventKind::Resume, Triggers::signal());
        emulator.kernel.finish(ctx).unwrap();
        emulator.process_events().unwrap();
        assert!(emulator.system.events.is_empty());
    }
}
