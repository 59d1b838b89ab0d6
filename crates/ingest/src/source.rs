//! Where log lines come from
//!
//! A [`LogSource`] lists its files in [`FileId`] order and opens any of them
//! positioned at a byte offset. Line splitting happens in the pipeline, so
//! sources only hand out raw bytes.

use bazaar_durability::FileId;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Ordered, seekable collection of log files
pub trait LogSource {
    /// Every file, sorted by [`FileId`] ordering
    fn files(&self) -> io::Result<Vec<FileId>>;

    /// Reader over `file` starting `offset` bytes in
    fn open(&self, file: &FileId, offset: u64) -> io::Result<Box<dyn BufRead + Send>>;
}

// ============================================================================
// Directory
// ============================================================================

/// Regular files directly inside one directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    /// Source over the files in `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory being read
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl LogSource for DirectorySource {
    fn files(&self) -> io::Result<Vec<FileId>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => files.push(FileId::new(name)),
                Err(raw) => warn!(name = ?raw, "skipping log file with non UTF-8 name"),
            }
        }
        files.sort();
        Ok(files)
    }

    fn open(&self, file: &FileId, offset: u64) -> io::Result<Box<dyn BufRead + Send>> {
        let mut handle = File::open(self.dir.join(file.as_str()))?;
        if offset > 0 {
            handle.seek(SeekFrom::Start(offset))?;
        }
        Ok(Box::new(BufReader::new(handle)))
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Files held in memory, keyed by id
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: BTreeMap<FileId, Vec<u8>>,
}

impl MemorySource {
    /// Empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file
    pub fn with_file(mut self, file: impl Into<FileId>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(file, contents);
        self
    }

    /// Add or replace a file in place
    pub fn insert(&mut self, file: impl Into<FileId>, contents: impl Into<Vec<u8>>) {
        self.files.insert(file.into(), contents.into());
    }
}

impl LogSource for MemorySource {
    fn files(&self) -> io::Result<Vec<FileId>> {
        Ok(self.files.keys().cloned().collect())
    }

    fn open(&self, file: &FileId, offset: u64) -> io::Result<Box<dyn BufRead + Send>> {
        let contents = self.files.get(file).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no log file '{}'", file))
        })?;
        let mut cursor = Cursor::new(contents.clone());
        cursor.set_position(offset);
        Ok(Box::new(cursor))
    }
}
