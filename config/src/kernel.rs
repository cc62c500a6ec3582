use super::Config;

/// Limits of the context kernel.
#[derive(Debug, Clone, PartialEq, Eq, serde_wrapper::Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Capacity of the context table and of the zombie list.
    pub max_contexts: usize,
    /// Emulated cycles between two scans of the event queue.
    pub event_interval: u64,
    /// Return addresses kept per context for backtraces.
    pub max_backtrace: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_contexts: 64,
            event_interval: 1000,
            max_backtrace: 100,
        }
    }
}

impl Config for KernelConfig {
    const PREFIX: &'static str = "KERNEL";
}
