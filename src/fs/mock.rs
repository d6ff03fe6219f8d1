// src/fs/mock.rs

use super::{FileMeta, FileSystem};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File { content: Vec<u8>, modified: SystemTime },
    Dir(Vec<String>), // List of child names
}

/// In-memory filesystem with a logical clock: every write is one second
/// newer than the previous one, so mtime comparisons are deterministic.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
    clock: Arc<AtomicU64>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        // Ensure root exists
        files.insert(PathBuf::from("."), MockEntry::Dir(Vec::new()));

        Self {
            files: Arc::new(Mutex::new(files)),
            clock: Arc::new(AtomicU64::new(1)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, MockEntry>> {
        match self.files.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn tick(&self) -> SystemTime {
        let secs = self.clock.fetch_add(1, Ordering::SeqCst);
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let modified = self.tick();
        let mut files = self.lock();
        files.insert(
            path.clone(),
            MockEntry::File {
                content: content.into(),
                modified,
            },
        );
        link_into_parent(&mut files, &path);
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut files = self.lock();
        ensure_dir_entry(&mut files, path.as_ref());
    }

    /// Bump a file's modification time without changing its contents.
    pub fn touch(&self, path: impl AsRef<Path>) {
        let modified = self.tick();
        let mut files = self.lock();
        if let Some(MockEntry::File { modified: m, .. }) = files.get_mut(path.as_ref()) {
            *m = modified;
        }
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut files = self.lock();
        files.remove(path);
        if let Some(MockEntry::Dir(children)) = path.parent().and_then(|p| files.get_mut(p)) {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                children.retain(|c| c != name);
            }
        }
    }

    pub fn read(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.lock().get(path.as_ref()) {
            Some(MockEntry::File { content, .. }) => Some(content.clone()),
            _ => None,
        }
    }
}

fn parent_of(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn link_into_parent(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
    let parent = parent_of(path);
    if parent == path {
        return;
    }
    ensure_dir_entry(files, parent);
    if let Some(MockEntry::Dir(children)) = files.get_mut(parent) {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if !children.iter().any(|c| c == name) {
                children.push(name.to_string());
            }
        }
    }
}

fn ensure_dir_entry(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
    if files.contains_key(path) {
        return;
    }
    files.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));
    link_into_parent(files, path);
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        match self.lock().get(path) {
            Some(MockEntry::File { content, .. }) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir(_)) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(MockEntry::File { .. }))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(MockEntry::Dir(_)))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        // In mock, we just return the path as is, assuming absolute paths are used in tests
        Ok(path.to_path_buf())
    }

    fn metadata(&self, path: &Path) -> Option<FileMeta> {
        match self.lock().get(path)? {
            MockEntry::File { modified, .. } => Some(FileMeta {
                modified: *modified,
                is_dir: false,
            }),
            MockEntry::Dir(_) => Some(FileMeta {
                modified: SystemTime::UNIX_EPOCH,
                is_dir: true,
            }),
        }
    }

    fn is_symlink(&self, _path: &Path) -> bool {
        false
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.add_dir(path);
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let content = self
            .read(from)
            .ok_or_else(|| anyhow!("File not found: {:?}", from))?;
        self.add_file(to, content);
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        match self.lock().get(path) {
            Some(MockEntry::Dir(children)) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_advance_the_clock() {
        let fs = MockFileSystem::new();
        fs.add_file("./a", b"1");
        fs.add_file("./b", b"2");
        let a = fs.metadata(Path::new("./a")).unwrap().modified;
        let b = fs.metadata(Path::new("./b")).unwrap().modified;
        assert!(b > a);

        fs.touch("./a");
        let a2 = fs.metadata(Path::new("./a")).unwrap().modified;
        assert!(a2 > b);
    }

    #[test]
    fn parents_are_created_implicitly() {
        let fs = MockFileSystem::new();
        fs.add_file("./x/y/z.txt", b"z");
        assert!(fs.is_dir(Path::new("./x/y")));
        assert_eq!(
            fs.read_dir(Path::new("./x")).unwrap(),
            vec![PathBuf::from("./x/y")]
        );
    }

    #[test]
    fn copy_duplicates_content() {
        let fs = MockFileSystem::new();
        fs.add_file("./src.txt", b"hi");
        fs.copy(Path::new("./src.txt"), Path::new("./out/dst.txt"))
            .unwrap();
        assert_eq!(fs.read("./out/dst.txt"), Some(b"hi".to_vec()));
    }
}
