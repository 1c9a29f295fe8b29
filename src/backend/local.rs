//! Local filesystem backend

use super::Backend;
use crate::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use walkdir::WalkDir;

/// Filesystem backend. Paths are used as given (relative paths resolve
/// against the working directory).
///
/// Writes land in a hidden sibling file that is renamed into place, so a
/// reader sees either no file or the complete file.
#[derive(Debug, Default)]
pub struct LocalBackend {
    tmp_counter: AtomicU64,
}

impl LocalBackend {
    /// Create a local backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn map_err(op: &str, path: &str, e: &std::io::Error) -> Error {
        if e.kind() == ErrorKind::NotFound {
            Error::NotFound(path.to_string())
        } else {
            Error::Backend(format!("{op} {path}: {e}"))
        }
    }

    fn tmp_path(&self, path: &Path) -> std::path::PathBuf {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{name}.{}.{n}.tmp", std::process::id()))
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl Backend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn exists(&self, path: &str) -> Result<bool> {
        match fs::metadata(path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::map_err("stat", path, &e)),
        }
    }

    fn list(&self, path: &str, recursive: bool) -> Result<Vec<String>> {
        let mut entries = Vec::new();
        if recursive {
            for entry in WalkDir::new(path).min_depth(1) {
                let entry = entry.map_err(|e| {
                    let io = e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                    Self::map_err("list", path, &io)
                })?;
                entries.push(display(entry.path()));
            }
        } else {
            for entry in fs::read_dir(path).map_err(|e| Self::map_err("list", path, &e))? {
                let entry = entry.map_err(|e| Self::map_err("list", path, &e))?;
                entries.push(display(&entry.path()));
            }
        }
        entries.sort();
        Ok(entries)
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        fs::create_dir_all(path).map_err(|e| Self::map_err("mkdir", path, &e))
    }

    fn delete(&self, path: &str) -> Result<()> {
        let meta = fs::metadata(path).map_err(|e| Self::map_err("delete", path, &e))?;
        if meta.is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        }
        .map_err(|e| Self::map_err("delete", path, &e))
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| Self::map_err("read", path, &e))
    }

    fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let target = Path::new(path);
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Self::map_err("write", path, &e))?;
        }
        let tmp = self.tmp_path(target);
        fs::write(&tmp, bytes).map_err(|e| Self::map_err("write", path, &e))?;
        fs::rename(&tmp, target).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            Self::map_err("write", path, &e)
        })
    }

    fn is_directory(&self, path: &str) -> Result<bool> {
        match fs::metadata(path) {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::map_err("stat", path, &e)),
        }
    }
}
