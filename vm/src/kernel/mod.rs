//! Context kernel.
//!
//! Contexts live in a fixed-capacity slot array and are addressed by their
//! slot index. Alive contexts are additionally linked in a ring ordered by
//! slot index, which drives round-robin scheduling. A context is finished
//! when it exits (taking its children with it) and killed, freeing its
//! slot, only once it and all of its children are finished.

mod context;
mod process;

use std::{collections::VecDeque, rc::Rc};

use mipsemu_config::KernelConfig;
use tracing::{debug, trace};

pub use context::{Context, ContextStatus};
pub use process::Process;

use crate::{
    cpu::RegisterFile,
    error::{Result, VMErrorKind},
    memory::Memory,
};

pub type ContextId = usize;

const FIRST_PID: u32 = 1000;

/// Exit record of a finished context, kept until reaped by a wait call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zombie {
    pub pid: u32,
    pub exit_code: u32,
}

#[derive(Debug)]
pub struct Kernel {
    slots: Vec<Option<Context>>,
    first: Option<ContextId>,
    alive_count: usize,
    active_count: usize,
    next_pid: u32,
    zombies: VecDeque<Zombie>,
    max_backtrace: usize,

    /// Traversal state of `ring_first`/`ring_next`.
    ring_origin: Option<ContextId>,
    ring_current: Option<ContextId>,
}

impl Kernel {
    pub fn new(config: &KernelConfig) -> Self {
        Self {
            slots: (0..config.max_contexts).map(|_| None).collect(),
            first: None,
            alive_count: 0,
            active_count: 0,
            next_pid: FIRST_PID,
            zombies: VecDeque::with_capacity(config.max_contexts),
            max_backtrace: config.max_backtrace,
            ring_origin: None,
            ring_current: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Contexts holding a slot, finished or not.
    pub fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Contexts not yet finished.
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn is_valid(&self, id: ContextId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: ContextId) -> Option<&Context> {
        self.slots.get(id)?.as_ref()
    }

    pub fn get_mut(&mut self, id: ContextId) -> Option<&mut Context> {
        self.slots.get_mut(id)?.as_mut()
    }

    pub fn context(&self, id: ContextId) -> Result<&Context> {
        Ok(self.get(id).ok_or(VMErrorKind::InvalidContext(id))?)
    }

    pub fn context_mut(&mut self, id: ContextId) -> Result<&mut Context> {
        Ok(self.get_mut(id).ok_or(VMErrorKind::InvalidContext(id))?)
    }

    /// Alive contexts in ascending id order.
    pub fn contexts(&self) -> impl Iterator<Item = &Context> {
        self.slots.iter().flatten()
    }

    /// Create a context with empty registers, memory and process image.
    pub fn create(&mut self) -> Result<ContextId> {
        self.insert(RegisterFile::default(), Memory::new(), Rc::default())
    }

    fn insert(&mut self, registers: RegisterFile, memory: Memory, process: Rc<Process>) -> Result<ContextId> {
        let capacity = self.slots.len();
        let id = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(VMErrorKind::ContextTableFull(capacity))?;

        let pid = self.next_pid;
        self.next_pid += 1;
        let mut context = Context::new(id, pid, registers, memory, process, self.max_backtrace);

        // Link between the closest alive slots on either side
        if self.alive_count > 0 {
            let prev = (1..capacity)
                .map(|distance| (id + capacity - distance) % capacity)
                .find(|&slot| self.slots[slot].is_some());
            let next = (1..capacity)
                .map(|distance| (id + distance) % capacity)
                .find(|&slot| self.slots[slot].is_some());
            if let (Some(prev), Some(next)) = (prev, next) {
                context.prev = prev;
                context.next = next;
                if let Some(ctx) = self.slots[prev].as_mut() {
                    ctx.next = id;
                }
                if let Some(ctx) = self.slots[next].as_mut() {
                    ctx.prev = id;
                }
            }
        }

        self.slots[id] = Some(context);
        self.alive_count += 1;
        self.active_count += 1;
        self.first = Some(self.first.map_or(id, |first| first.min(id)));

        trace!("ctx{id} created with pid {pid}");
        Ok(id)
    }

    /// Create a child of `parent` running with a copy of its registers.
    /// Memory is shared with the parent when `share_memory` is set and
    /// privately copied otherwise. `finish_signal` is raised in the parent
    /// when the child finishes (0 for none).
    pub fn clone_context(&mut self, parent: ContextId, finish_signal: u32, share_memory: bool) -> Result<ContextId> {
        let source = self.context(parent)?;
        let registers = source.registers;
        let memory = if share_memory {
            Memory::create(Some(&source.memory))
        } else {
            source.memory.fork()
        };
        let process = Rc::clone(&source.process);

        let id = self.insert(registers, memory, process)?;

        let mut child = self.slots[id].take().ok_or(VMErrorKind::InvalidContext(id))?;
        let source = self.context_mut(parent)?;
        child.parent = Some(parent);
        child.finish_signal = finish_signal;
        child.inherit_backtrace(source);
        source.child_count += 1;

        debug!("ctx{id} (pid {}) cloned from ctx{parent}", child.pid);
        self.slots[id] = Some(child);
        Ok(id)
    }

    /// Lowest alive context id.
    pub fn first(&self) -> Option<ContextId> {
        self.first
    }

    /// Next alive context after `id` in ascending order, `None` once the
    /// ring wraps around.
    pub fn next(&self, id: ContextId) -> Option<ContextId> {
        let next = self.get(id)?.next;
        (next > id).then_some(next)
    }

    /// Alive context ids in ascending order.
    pub fn ids(&self) -> Vec<ContextId> {
        std::iter::successors(self.first, |&id| self.next(id)).collect()
    }

    /// Round-robin successor of `id`; the first context when `id` is not alive.
    pub fn next_in_ring(&self, id: ContextId) -> Option<ContextId> {
        let first = self.first?;
        Some(self.get(id).map_or(first, |ctx| ctx.next))
    }

    /// Round-robin predecessor of `id`; the first context when `id` is not alive.
    pub fn prev_in_ring(&self, id: ContextId) -> Option<ContextId> {
        let first = self.first?;
        Some(self.get(id).map_or(first, |ctx| ctx.prev))
    }

    /// Start visiting every alive context other than `id`, beginning right
    /// after it.
    pub fn ring_first(&mut self, id: ContextId) -> Option<ContextId> {
        self.ring_origin = Some(id);
        self.ring_current = self.next_in_ring(id).filter(|&next| next != id);
        self.ring_current
    }

    /// Continue a traversal started by [`Kernel::ring_first`]; `None` when
    /// back at the origin.
    pub fn ring_next(&mut self) -> Option<ContextId> {
        let current = self.ring_current?;
        self.ring_current = self
            .next_in_ring(current)
            .filter(|&next| Some(next) != self.ring_origin && next != current);
        self.ring_current
    }

    pub fn pid(&self, id: ContextId) -> Result<u32> {
        Ok(self.context(id)?.pid)
    }

    /// Pid of the parent, 1 for top-level contexts.
    pub fn parent_pid(&self, id: ContextId) -> Result<u32> {
        let parent = self.context(id)?.parent;
        Ok(parent.and_then(|parent| self.get(parent)).map_or(1, |ctx| ctx.pid))
    }

    /// Alive, unfinished context with `pid`.
    pub fn pid_context(&self, pid: u32) -> Option<ContextId> {
        self.contexts()
            .find(|ctx| !ctx.is_finished() && ctx.pid == pid)
            .map(|ctx| ctx.id)
    }

    pub fn children(&self, id: ContextId) -> impl Iterator<Item = ContextId> + '_ {
        self.contexts()
            .filter(move |ctx| ctx.parent == Some(id))
            .map(|ctx| ctx.id)
    }

    /// Stop the context for good: it becomes a zombie, all of its children
    /// are finished too and the parent receives the finish signal.
    pub fn finish(&mut self, id: ContextId) -> Result<()> {
        let capacity = self.slots.len();
        let context = self.context_mut(id)?;
        if context.is_finished() {
            return Err(VMErrorKind::AlreadyFinished(id).into());
        }
        context.status.set(ContextStatus::FINISHED, true);
        context.update_running();
        let zombie = Zombie {
            pid: context.pid,
            exit_code: context.exit_code,
        };
        let (parent, finish_signal) = (context.parent, context.finish_signal);

        if self.zombies.len() == capacity {
            return Err(VMErrorKind::ZombieTableFull(capacity).into());
        }
        self.zombies.push_back(zombie);
        self.active_count -= 1;
        debug!("ctx{id} (pid {}) finished with code {}", zombie.pid, zombie.exit_code);

        let children: Vec<_> = self
            .children(id)
            .filter(|&child| self.get(child).is_some_and(|ctx| !ctx.is_finished()))
            .collect();
        for child in children {
            self.finish(child)?;
        }

        if finish_signal != 0 {
            if let Some(parent) = parent.and_then(|parent| self.get_mut(parent)) {
                parent.signals.pending.add(finish_signal);
            }
        }
        Ok(())
    }

    /// Free a finished context and, before it, all of its children.
    pub fn kill(&mut self, id: ContextId) -> Result<()> {
        if !self.context(id)?.is_finished() {
            return Err(VMErrorKind::NotFinished(id).into());
        }
        let children: Vec<_> = self.children(id).collect();
        for child in children {
            self.kill(child)?;
        }

        let context = self.context(id)?;
        let (prev, next, parent) = (context.prev, context.next, context.parent);

        if self.alive_count == 1 {
            self.first = None;
        } else {
            if self.first == Some(id) {
                self.first = Some(next);
            }
            if let Some(ctx) = self.slots[prev].as_mut() {
                ctx.next = next;
            }
            if let Some(ctx) = self.slots[next].as_mut() {
                ctx.prev = prev;
            }
        }
        if let Some(parent) = parent.and_then(|parent| self.get_mut(parent)) {
            parent.child_count -= 1;
        }

        self.slots[id] = None;
        self.alive_count -= 1;
        trace!("ctx{id} killed");
        Ok(())
    }

    pub fn suspend(&mut self, id: ContextId) -> Result<()> {
        let context = self.context_mut(id)?;
        if context.is(ContextStatus::SUSPENDED) {
            return Err(VMErrorKind::AlreadySuspended(id).into());
        }
        context.status.set(ContextStatus::SUSPENDED, true);
        context.update_running();
        trace!("ctx{id} suspended");
        Ok(())
    }

    pub fn resume(&mut self, id: ContextId) -> Result<()> {
        let context = self.context_mut(id)?;
        if !context.is(ContextStatus::SUSPENDED) {
            return Err(VMErrorKind::NotSuspended(id).into());
        }
        context.status.set(ContextStatus::SUSPENDED, false);
        context.update_running();
        trace!("ctx{id} resumed");
        Ok(())
    }

    /// Let `id` run alone: every other context is locked.
    pub fn enter_exclusive(&mut self, id: ContextId) -> Result<()> {
        self.context_mut(id)?.status.set(ContextStatus::EXCLUSIVE, true);
        for context in self.slots.iter_mut().flatten() {
            if context.id != id {
                context.status.set(ContextStatus::LOCKED, true);
                context.update_running();
            }
        }
        trace!("ctx{id} entered exclusive mode");
        Ok(())
    }

    pub fn leave_exclusive(&mut self, id: ContextId) -> Result<()> {
        self.context_mut(id)?.status.set(ContextStatus::EXCLUSIVE, false);
        for context in self.slots.iter_mut().flatten() {
            context.status.set(ContextStatus::LOCKED, false);
            context.update_running();
        }
        trace!("ctx{id} left exclusive mode");
        Ok(())
    }

    /// Redirect fetch after the delay slot to `npc`. Returns whether this
    /// starts a speculative episode: when `npc` differs from the fetch
    /// address the context would use anyway, registers are saved and memory
    /// switches to its overlay. Already speculative contexts just follow the
    /// new target.
    pub fn set_branch_target(&mut self, id: ContextId, npc: u32) -> Result<bool> {
        let context = self.context_mut(id)?;
        if context.registers.npc == npc {
            return Ok(false);
        }
        if context.is_speculative() {
            context.registers.npc = npc;
            return Ok(false);
        }

        context.status.set(ContextStatus::SPECULATIVE, true);
        context.memory.start_speculative();
        context.recovery = context.registers;
        context.registers.npc = npc;
        trace!("ctx{id} speculating from 0x{npc:08x}");
        Ok(true)
    }

    /// Roll back a speculative episode.
    pub fn recover(&mut self, id: ContextId) -> Result<()> {
        let context = self.context_mut(id)?;
        if !context.is_speculative() {
            return Err(VMErrorKind::NotSpeculative(id).into());
        }
        context.status.set(ContextStatus::SPECULATIVE, false);
        context.memory.recover();
        context.registers = context.recovery;
        trace!("ctx{id} recovered at pc 0x{:08x}", context.registers.pc);
        Ok(())
    }

    pub fn zombies(&self) -> impl Iterator<Item = &Zombie> {
        self.zombies.iter()
    }

    pub fn zombie_count(&self) -> usize {
        self.zombies.len()
    }

    pub fn is_zombie(&self, pid: u32) -> bool {
        self.zombies.iter().any(|zombie| zombie.pid == pid)
    }

    /// Reap the zombie with `pid`, or the oldest one when `pid` is -1.
    pub fn kill_zombie(&mut self, pid: i32) -> Option<Zombie> {
        let position = self
            .zombies
            .iter()
            .position(|zombie| pid == -1 || zombie.pid as i32 == pid)?;
        self.zombies.remove(position)
    }

    /// Finish whatever still runs and free every context, parents after
    /// their children.
    pub fn shutdown(&mut self) -> Result<()> {
        for id in self.ids() {
            if self.get(id).is_some_and(|ctx| !ctx.is_finished()) {
                self.finish(id)?;
            }
        }
        for id in self.ids() {
            if self.get(id).is_some_and(|ctx| ctx.parent.is_none()) {
                self.kill(id)?;
            }
        }
        // Contexts whose parent slot was already gone
        for id in self.ids() {
            if self.is_valid(id) {
                self.kill(id)?;
            }
        }
        Ok(())
    }
}
