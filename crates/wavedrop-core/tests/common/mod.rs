//! Shared helpers for integration tests.

use std::path::{Path, PathBuf};

use rand::RngCore;
use tempfile::TempDir;

/// Create a temporary directory for test files.
pub fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test file with the given content.
pub fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Generate random bytes of the given size.
pub fn random_bytes(size: usize) -> Vec<u8> {
    let mut bytes = vec![0_u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}
