// src/fs/mod.rs

use std::fmt::Debug;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use globset::GlobBuilder;

pub mod mock;

/// What the engine needs to know about a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub modified: SystemTime,
    pub is_dir: bool,
}

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;

    /// Metadata following symlinks; `None` when the path does not exist.
    fn metadata(&self, path: &Path) -> Option<FileMeta>;

    /// True when the path itself is a symbolic link.
    fn is_symlink(&self, path: &Path) -> bool;

    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Copy file contents from `from` to `to`, replacing `to`.
    fn copy(&self, from: &Path, to: &Path) -> Result<()>;

    /// Return a list of entries in a directory.
    /// Returns full paths.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("reading file {:?}", path))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
        }
        let mut file = fs::File::create(path).with_context(|| format!("creating file {:?}", path))?;
        file.write_all(contents).with_context(|| format!("writing to file {:?}", path))?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        fs::canonicalize(path).with_context(|| format!("canonicalizing {:?}", path))
    }

    fn metadata(&self, path: &Path) -> Option<FileMeta> {
        let meta = fs::metadata(path).ok()?;
        Some(FileMeta {
            modified: meta.modified().ok()?,
            is_dir: meta.is_dir(),
        })
    }

    fn is_symlink(&self, path: &Path) -> bool {
        fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("creating dir {:?}", path))
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        fs::copy(from, to).with_context(|| format!("copying {:?} to {:?}", from, to))?;
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).with_context(|| format!("reading dir {:?}", path))? {
            let entry = entry?;
            entries.push(entry.path());
        }
        Ok(entries)
    }
}

/// Whether `s` contains glob syntax.
pub fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '[', '{'])
}

/// Path relative to `cwd`, with `/` separators.
pub fn relative_to(cwd: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(cwd).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Expand `pattern` relative to `cwd`, returning matching paths (files and
/// directories) relative to `cwd`, sorted.
///
/// Patterns without glob syntax are a plain existence check.
pub fn glob_files(fs: &dyn FileSystem, cwd: &Path, pattern: &str) -> Result<Vec<String>> {
    if !has_glob_meta(pattern) {
        let path = cwd.join(pattern);
        return Ok(if fs.exists(&path) {
            vec![relative_to(cwd, &path)]
        } else {
            Vec::new()
        });
    }

    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .with_context(|| format!("invalid glob {pattern:?}"))?
        .compile_matcher();

    // Walk from the longest literal directory prefix.
    let segments: Vec<&str> = pattern.split('/').collect();
    let literal: Vec<&str> = segments
        .iter()
        .take_while(|s| !has_glob_meta(s))
        .copied()
        .collect();
    let max_depth = if pattern.contains("**") {
        usize::MAX
    } else {
        segments.len()
    };

    let root = if literal.is_empty() {
        cwd.to_path_buf()
    } else {
        cwd.join(literal.join("/"))
    };
    if !fs.is_dir(&root) {
        return Ok(Vec::new());
    }

    let mut hits = Vec::new();
    let mut pending = vec![root];
    while let Some(dir) = pending.pop() {
        for entry in fs.read_dir(&dir)? {
            let rel = relative_to(cwd, &entry);
            if matcher.is_match(&rel) {
                hits.push(rel.clone());
            }
            let depth = rel.split('/').count();
            if depth < max_depth && fs.is_dir(&entry) {
                pending.push(entry);
            }
        }
    }

    hits.sort();
    hits.dedup();
    Ok(hits)
}
