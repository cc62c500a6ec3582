use std::{io, path::Path};

use serde::de::DeserializeOwned;

mod error;

pub mod context;
pub mod kernel;

pub use context::{ContextEntry, ContextFile};
pub use error::Error;
pub use kernel::KernelConfig;

const CONFIG_ENV_PREFIX: &str = "MIPSEMU";
const CONFIG_ENV_FILE: &str = ".config.env";

pub trait Config: DeserializeOwned {
    const PREFIX: &'static str;

    fn from_env() -> Result<Self, Error> {
        let prefix = format!("{}_{}", CONFIG_ENV_PREFIX, Self::PREFIX);
        load_env_file(Path::new(CONFIG_ENV_FILE))?;

        Ok(config::Config::builder()
            .add_source(config::Environment::with_prefix(&prefix).separator("_"))
            .build()?
            .try_deserialize()?)
    }
}

/// Loads `path` into the process environment if it exists.
fn load_env_file(path: &Path) -> Result<(), Error> {
    match dotenvy::from_path(path) {
        Err(dotenvy::Error::Io(err)) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => Ok(other?),
    }
}
