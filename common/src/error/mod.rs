mod memory;

pub use memory::MemoryError;
