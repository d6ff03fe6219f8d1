#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

// each test target uses a different subset of these
#[allow(unused_imports)]
pub use emk_test_utils::builders;
#[allow(unused_imports)]
pub use emk_test_utils::fake_runner::FakeRunner;
#[allow(unused_imports)]
pub use emk_test_utils::{init_tracing, with_timeout};

/// Write `contents` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

pub fn read_file(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap()
}

/// Move the mtime of `root/rel` forward, past anything built so far.
///
/// Explicit timestamps keep the test independent of filesystem mtime
/// resolution.
pub fn touch(root: &Path, rel: &str) {
    let file = fs::OpenOptions::new()
        .write(true)
        .open(root.join(rel))
        .unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();
}

/// Move the mtime of `root/rel` an hour into the past, so anything built
/// from it is strictly newer.
pub fn backdate(root: &Path, rel: &str) {
    let file = fs::OpenOptions::new()
        .write(true)
        .open(root.join(rel))
        .unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(3600))
        .unwrap();
}
