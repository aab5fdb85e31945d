// src/workspace/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::workspace::model::{RawWorkspaceFile, Workspace};

/// Load a workspace file from a given path and return the raw form.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (reference resolution, hierarchy cycles, etc.). Use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWorkspaceFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let workspace: RawWorkspaceFile = toml::from_str(&contents)?;

    Ok(workspace)
}

/// Load a workspace file from path and run validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - duplicate resource names across sections,
///   - unknown benchmark children / dashboard panels / with references,
///   - cycles in the benchmark hierarchy.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Workspace> {
    let raw = load_from_path(&path)?;
    let workspace = Workspace::try_from(raw)?;
    Ok(workspace)
}

/// Helper to resolve a default workspace path.
pub fn default_workspace_path() -> PathBuf {
    PathBuf::from("Checktree.toml")
}
