mod builder;
mod error;
mod loader;
mod parser;
mod symbols;

pub use builder::ElfBuilder;
pub use error::ParserError as ElfError;
pub use loader::ElfFile;
pub use parser::LoadableSection;
pub use symbols::{Symbol, SymbolTable};
