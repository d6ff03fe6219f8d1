// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - [`model`] is the TOML-backed data model plus the programmatic builder.
//! - [`loader`] reads `Emkfile.toml` from disk.
//! - [`validate`] checks settings and compiles definitions and trees.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{
    ConfigSection, DefValue, Emkfile, EmkfileBuilder, RawEmkfile, RawLeaf, RecipeTable,
};
pub use validate::{from_raw, validate_config};

pub use crate::tree::{RawNode, RawTree};
