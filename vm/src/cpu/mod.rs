mod registerfile;

pub use registerfile::RegisterFile;
