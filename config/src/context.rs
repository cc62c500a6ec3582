//! Multi-context configuration file.
//!
//! ```ini
//! [Context 0]
//! exe = server
//! args = -p 8080
//! cwd = /tmp/run
//! stdout = server.log
//!
//! [Context 1]
//! exe = client
//! ```
//!
//! Sections are read in order starting at `Context 0` and stop at the first
//! missing number.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use config::{FileFormat, Value};
use serde::Deserialize;

use super::Error;

/// Upper bound on `argv`, program name included.
pub const MAX_ARGC: usize = 50;

/// One guest program and its host environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextEntry {
    pub exe: PathBuf,
    /// Arguments after the program name.
    pub args: Vec<String>,
    /// Guest working directory; the host one when unset.
    pub cwd: Option<PathBuf>,
    pub stdin: Option<PathBuf>,
    pub stdout: Option<PathBuf>,
}

impl ContextEntry {
    pub fn new(exe: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            exe: exe.into(),
            args,
            ..Default::default()
        }
    }

    /// `argv` as seen by the guest.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.exe.display().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

#[derive(Deserialize)]
struct RawSection {
    exe: Option<String>,
    args: Option<String>,
    cwd: Option<String>,
    stdin: Option<String>,
    stdout: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextFile {
    pub entries: Vec<ContextEntry>,
}

impl ContextFile {
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|err| Error::Io(path.into(), err))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        let sections: HashMap<String, Value> = config::Config::builder()
            .add_source(config::File::from_str(text, FileFormat::Ini))
            .build()?
            .try_deserialize()?;
        let sections: HashMap<String, Value> = sections
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();

        let mut entries = Vec::new();
        while let Some(value) = sections.get(&format!("context {}", entries.len())) {
            let raw: RawSection = value.clone().try_deserialize()?;
            entries.push(Self::entry(entries.len(), raw)?);
        }

        if entries.is_empty() {
            return Err(Error::ContextFile("no [Context 0] section".into()));
        }
        Ok(Self { entries })
    }

    fn entry(index: usize, raw: RawSection) -> Result<ContextEntry, Error> {
        let exe = raw
            .exe
            .filter(|exe| !exe.is_empty())
            .ok_or_else(|| Error::ContextFile(format!("[Context {index}]: missing exe")))?;
        let args: Vec<String> = raw
            .args
            .unwrap_or_default()
            .split(' ')
            .filter(|arg| !arg.is_empty())
            .map(String::from)
            .collect();
        if args.len() + 1 > MAX_ARGC {
            return Err(Error::ContextFile(format!(
                "[Context {index}]: more than {MAX_ARGC} arguments"
            )));
        }

        let cwd = raw.cwd.filter(|cwd| !cwd.is_empty()).map(PathBuf::from);
        let resolve = |path: String| match &cwd {
            Some(cwd) if Path::new(&path).is_relative() => cwd.join(path),
            _ => PathBuf::from(path),
        };

        Ok(ContextEntry {
            exe: resolve(exe),
            args,
            stdin: raw.stdin.filter(|p| !p.is_empty()).map(resolve),
            stdout: raw.stdout.filter(|p| !p.is_empty()).map(resolve),
            cwd,
        })
    }
}
