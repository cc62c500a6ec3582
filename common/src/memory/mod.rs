mod alignment;
mod traits;

pub use alignment::Alignable;
pub use traits::{MemAccessSize, MemoryProcessor};
