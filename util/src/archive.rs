//! Struct archiving functionality
//!
//! Archives are CSV files inside the session's archive directory, written one serde record at a
//! time. Records must be flat structs (no nested sequences) so the CSV header can be derived.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use std::path::{Path, PathBuf};
use std::fs::File;
use csv::WriterBuilder;
pub use csv::Writer;
use serde::Serialize;
use thiserror::Error;

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An object used to write CSV archive files.
pub struct Archiver {
    path: PathBuf,
    writer: Writer<File>,
    num_records: usize,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Cannot create archive file {0:?}: {1}")]
    CreateError(PathBuf, std::io::Error),

    #[error("Cannot write record {1} to archive {0:?}: {2}")]
    WriteError(PathBuf, usize, csv::Error),

    #[error("Cannot flush archive {0:?}: {1}")]
    FlushError(PathBuf, std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Create a new archiver from a paricular path relative to the session's
    /// archive root. Any existing file is truncated.
    pub fn from_path<P: AsRef<Path>>(
        session: &Session, path: P
    ) -> Result<Self, ArchiveError> {
        Self::create(session.arch_root.join(path))
    }

    /// Create a new archiver writing to an absolute path.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        let path = path.as_ref().to_path_buf();

        let file = File::create(&path)
            .map_err(|e| ArchiveError::CreateError(path.clone(), e))?;

        let writer = WriterBuilder::new()
            .has_headers(true)
            .from_writer(file);

        Ok(Self {
            path,
            writer,
            num_records: 0,
        })
    }

    /// Serialise a record into the archive.
    pub fn serialise<T: Serialize>(&mut self, record: T) -> Result<(), ArchiveError> {
        self.writer
            .serialize(record)
            .map_err(|e| ArchiveError::WriteError(self.path.clone(), self.num_records, e))?;
        self.num_records += 1;

        Ok(())
    }

    /// Serialise every record from the iterator, then flush.
    pub fn serialise_all<T, I>(&mut self, records: I) -> Result<(), ArchiveError>
    where
        T: Serialize,
        I: IntoIterator<Item = T>,
    {
        for record in records {
            self.serialise(record)?;
        }

        self.flush()
    }

    /// Flush buffered records to disk.
    pub fn flush(&mut self) -> Result<(), ArchiveError> {
        self.writer
            .flush()
            .map_err(|e| ArchiveError::FlushError(self.path.clone(), e))
    }

    /// Number of records written so far.
    pub fn num_records(&self) -> usize {
        self.num_records
    }

    /// Path of the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Record {
        step: usize,
        value: f64,
    }

    #[test]
    fn test_archive_roundtrip() {
        let path = std::env::temp_dir().join("util_archive_test.csv");

        let mut archiver = Archiver::create(&path).unwrap();
        archiver
            .serialise_all((0..3).map(|i| Record { step: i, value: i as f64 * 0.5 }))
            .unwrap();

        assert_eq!(archiver.num_records(), 3);
        assert_eq!(archiver.path(), path.as_path());

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();

        assert_eq!(lines, vec!["step,value", "0,0.0", "1,0.5", "2,1.0"]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_archive_bad_path() {
        let path = std::env::temp_dir()
            .join("util_archive_missing_dir")
            .join("nested")
            .join("out.csv");

        match Archiver::create(&path) {
            Err(ArchiveError::CreateError(p, _)) => assert_eq!(p, path),
            _ => panic!("Expected a create error"),
        }
    }
}
