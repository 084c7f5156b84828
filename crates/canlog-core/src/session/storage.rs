//! Block storage
//!
//! The logger writes to whatever implements [`BlockStorage`]: a FAT volume
//! on an SD card, a directory on the host, or an in-memory fake in tests.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

/// An open log file
pub trait LogFile: Send {
    /// Write bytes, returning how many were accepted.
    ///
    /// Accepting fewer bytes than offered is a short write; callers treat it
    /// as a failure.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Push everything written so far to the medium
    fn flush(&mut self) -> io::Result<()>;

    /// Flush and release the file
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// A flat namespace of files
pub trait BlockStorage: Send + Sync {
    /// Whether the medium is mounted and writable
    fn is_ready(&self) -> bool;

    /// Names of the files currently present
    fn entries(&self) -> io::Result<Vec<String>>;

    /// Whether a file with this name exists
    fn exists(&self, name: &str) -> bool;

    /// Create a new file, failing if it already exists
    fn create(&self, name: &str) -> io::Result<Box<dyn LogFile>>;
}

/// Storage backed by a host directory
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    root: PathBuf,
}

impl DirectoryStorage {
    /// Storage rooted at an existing directory
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Like [`DirectoryStorage::new`], creating the directory if needed
    pub fn create_dir_all<P: Into<PathBuf>>(root: P) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Directory receiving the log files
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of a file in this storage
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl BlockStorage for DirectoryStorage {
    fn is_ready(&self) -> bool {
        self.root.is_dir()
    }

    fn entries(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    fn exists(&self, name: &str) -> bool {
        self.path_of(name).exists()
    }

    fn create(&self, name: &str) -> io::Result<Box<dyn LogFile>> {
        let path = self.path_of(name);
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        debug!(path = %path.display(), "created log file");
        Ok(Box::new(HostFile { file }))
    }
}

struct HostFile {
    file: File,
}

impl LogFile for HostFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_data()
    }

    fn close(mut self: Box<Self>) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()
    }
}
