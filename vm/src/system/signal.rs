//! Guest signal bookkeeping.
//!
//! Handlers are registered process-wide in a [`SignalTable`]; each context
//! tracks its own pending and blocked sets in a [`SignalState`]. Delivery
//! itself runs the guest handler to completion and lives with the emulator.

use std::fmt::{self, Display};

use mipsemu_common::{constants::MAX_SIGNAL, error::MemoryError, memory::MemoryProcessor};

pub const SIGCHLD: u32 = 18;
const SIGWINCH: u32 = 20;
const SIGURG: u32 = 21;

/// Handler values with a special meaning.
pub const SIG_DFL: u32 = 0;
pub const SIG_IGN: u32 = 1;

/// Signals whose default action is to be discarded.
pub fn ignored_by_default(sig: u32) -> bool {
    matches!(sig, SIGCHLD | SIGWINCH | SIGURG)
}

const SIGNAL_NAMES: [&str; 32] = [
    "", "SIGHUP", "SIGINT", "SIGQUIT", "SIGILL", "SIGTRAP", "SIGABRT", "SIGEMT", "SIGFPE",
    "SIGKILL", "SIGBUS", "SIGSEGV", "SIGSYS", "SIGPIPE", "SIGALRM", "SIGTERM", "SIGUSR1",
    "SIGUSR2", "SIGCHLD", "SIGPWR", "SIGWINCH", "SIGURG", "SIGIO", "SIGSTOP", "SIGTSTP",
    "SIGCONT", "SIGTTIN", "SIGTTOU", "SIGVTALRM", "SIGPROF", "SIGXCPU", "SIGXFSZ",
];

/// Guest signal name, `SIG<n>` outside the classic range.
pub fn signal_name(sig: u32) -> String {
    match SIGNAL_NAMES.get(sig as usize) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("SIG{sig}"),
    }
}

/// 64-bit guest signal mask, two words in guest memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SigSet([u32; 2]);

impl SigSet {
    pub const SIZE: u32 = 8;

    fn position(sig: u32) -> Option<(usize, u32)> {
        if !(1..=MAX_SIGNAL).contains(&sig) {
            return None;
        }
        let bit = sig - 1;
        Some(((bit / 32) as usize, 1 << (bit % 32)))
    }

    /// Signals outside `1..=64` are ignored.
    pub fn add(&mut self, sig: u32) {
        if let Some((word, mask)) = Self::position(sig) {
            self.0[word] |= mask;
        }
    }

    pub fn remove(&mut self, sig: u32) {
        if let Some((word, mask)) = Self::position(sig) {
            self.0[word] &= !mask;
        }
    }

    pub fn contains(&self, sig: u32) -> bool {
        Self::position(sig).is_some_and(|(word, mask)| self.0[word] & mask != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0, 0]
    }

    pub fn union(&self, other: &Self) -> Self {
        Self([self.0[0] | other.0[0], self.0[1] | other.0[1]])
    }

    pub fn difference(&self, other: &Self) -> Self {
        Self([self.0[0] & !other.0[0], self.0[1] & !other.0[1]])
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (1..=MAX_SIGNAL).filter(|&sig| self.contains(sig))
    }

    pub fn read(memory: &mut impl MemoryProcessor, address: u32) -> Result<Self, MemoryError> {
        Ok(Self([memory.read_word(address)?, memory.read_word(address + 4)?]))
    }

    pub fn write(&self, memory: &mut impl MemoryProcessor, address: u32) -> Result<(), MemoryError> {
        memory.write_word(address, self.0[0])?;
        memory.write_word(address + 4, self.0[1])
    }
}

impl Display for SigSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.iter().map(signal_name).collect();
        write!(f, "{{{}}}", names.join(","))
    }
}

/// Guest `struct sigaction`: flags at 0, handler at 4, mask at 8 and the
/// restorer at 136.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SigAction {
    pub flags: u32,
    pub handler: u32,
    pub mask: SigSet,
    pub restorer: u32,
}

impl SigAction {
    pub fn read(memory: &mut impl MemoryProcessor, address: u32) -> Result<Self, MemoryError> {
        Ok(Self {
            flags: memory.read_word(address)?,
            handler: memory.read_word(address + 4)?,
            mask: SigSet::read(memory, address + 8)?,
            restorer: memory.read_word(address + 136)?,
        })
    }

    pub fn write(&self, memory: &mut impl MemoryProcessor, address: u32) -> Result<(), MemoryError> {
        memory.write_word(address, self.flags)?;
        memory.write_word(address + 4, self.handler)?;
        self.mask.write(memory, address + 8)?;
        memory.write_word(address + 136, self.restorer)
    }
}

/// Per-context signal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalState {
    pub pending: SigSet,
    pub blocked: SigSet,
    /// Blocked set to restore once `rt_sigsuspend` returns.
    pub backup: SigSet,
}

impl SignalState {
    /// Pending and not blocked.
    pub fn must_process(&self, sig: u32) -> bool {
        self.pending.contains(sig) && !self.blocked.contains(sig)
    }

    /// Lowest deliverable signal.
    pub fn deliverable(&self) -> Option<u32> {
        self.pending.difference(&self.blocked).iter().next()
    }
}

/// Registered handlers, indexed by signal number.
#[derive(Debug, Clone)]
pub struct SignalTable {
    actions: [SigAction; MAX_SIGNAL as usize],
}

impl Default for SignalTable {
    fn default() -> Self {
        Self {
            actions: [SigAction::default(); MAX_SIGNAL as usize],
        }
    }
}

impl SignalTable {
    pub fn get(&self, sig: u32) -> Option<&SigAction> {
        self.actions.get((sig as usize).checked_sub(1)?)
    }

    pub fn get_mut(&mut self, sig: u32) -> Option<&mut SigAction> {
        self.actions.get_mut((sig as usize).checked_sub(1)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;

    #[test]
    fn test_sigset() {
        let mut set = SigSet::default();
        set.add(1);
        set.add(33);
        set.add(64);
        set.add(0);
        set.add(65);

        assert!(set.contains(1) && set.contains(33) && set.contains(64));
        assert!(!set.contains(0) && !set.contains(65));
        assert_eq!(set.iter().collect::<Vec<_>>(), [1, 33, 64]);

        set.remove(33);
        assert!(!set.contains(33));
        assert_eq!(set.to_string(), "{SIGHUP,SIG64}");
    }

    #[test]
    fn test_sigset_layout() {
        let mut memory = Memory::new();
        let mut set = SigSet::default();
        set.add(SIGCHLD);
        set.add(40);
        set.write(&mut memory, 0x1000).unwrap();

        assert_eq!(memory.read_word(0x1000), Ok(1 << 17));
        assert_eq!(memory.read_word(0x1004), Ok(1 << 7));
        assert_eq!(SigSet::read(&mut memory, 0x1000), Ok(set));
    }

    #[test]
    fn test_sigaction_layout() {
        let mut memory = Memory::new();
        memory.write_word(0x2000, 0x8).unwrap();
        memory.write_word(0x2004, 0x0040_1000).unwrap();
        memory.write_word(0x2008, 0x2).unwrap();
        memory.write_word(0x2000 + 136, 0x0040_2000).unwrap();

        let action = SigAction::read(&mut memory, 0x2000).unwrap();
        assert_eq!(action.flags, 0x8);
        assert_eq!(action.handler, 0x0040_1000);
        assert!(action.mask.contains(2));
        assert_eq!(action.restorer, 0x0040_2000);
    }

    #[test]
    fn test_deliverable() {
        let mut state = SignalState::default();
        state.pending.add(10);
        state.pending.add(12);
        state.blocked.add(10);

        assert!(!state.must_process(10));
        assert!(state.must_process(12));
        assert_eq!(state.deliverable(), Some(12));

        let mut table = SignalTable::default();
        table.get_mut(12).unwrap().handler = 0x400;
        assert_eq!(table.get(12).map(|action| action.handler), Some(0x400));
        assert!(table.get(0).is_none());
        assert!(table.get(65).is_none());
    }
}
