// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{Emkfile, RawEmkfile};
use crate::errors::Result;

/// Read and deserialize an Emkfile without validating it.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawEmkfile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let raw: RawEmkfile = toml::from_str(&contents)?;
    Ok(raw)
}

/// Load an Emkfile and compile its definitions and namespace trees.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Emkfile> {
    let raw = load_from_path(&path)?;
    Emkfile::try_from(raw)
}

/// Same as [`load_and_validate`] for in-memory text.
pub fn load_from_str(contents: &str) -> Result<Emkfile> {
    let raw: RawEmkfile = toml::from_str(contents)?;
    Emkfile::try_from(raw)
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("Emkfile.toml")
}
