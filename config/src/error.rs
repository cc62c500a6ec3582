use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    DotEnv(#[from] dotenvy::Error),

    #[error("cannot read {0}: {1}")]
    Io(PathBuf, std::io::Error),

    // Context file is readable but describes no runnable context
    #[error("{0}")]
    ContextFile(String),
}
