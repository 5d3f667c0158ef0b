//! Struct archiving functionality
//!
//! Archives are flat CSV files, one row per record. The header row is written as soon as the
//! file is opened, so an archive which never receives a record still carries its schema. To add
//! archiving functionality to a module implement the `Archived` trait.

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
#[derive(Default)]
pub struct Archiver {
    writer: Option<Writer<File>>,

    path: Option<PathBuf>,

    num_records: usize
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur while archiving.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Cannot create the archive file: {0}")]
    CreateError(std::io::Error),

    #[error("Cannot write the record into the archive: {0}")]
    WriteError(csv::Error),

    #[error("Cannot flush the archive: {0}")]
    FlushError(std::io::Error),

    #[error("The archiver has not been initialised with a file")]
    NotInitialised
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A trait which enables a struct to be archived as a csv.
///
/// To implement this trait, the struct shall have an `Archiver` member which shall be setup in
/// the struct's `init` or `new` functions.
pub trait Archived {
    /// Write the archives for this struct
    fn write(&mut self) -> Result<(), ArchiveError>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Create a new archiver from a paricular path relative to the session's
    /// archive root.
    pub fn from_path<P: AsRef<Path>>(
        session: &Session, path: P, header: &[&str]
    ) -> Result<Self, ArchiveError> {
        Self::from_file_path(session.arch_root.join(path), header)
    }

    /// Create a new archiver writing into the file at the given path.
    ///
    /// Any existing file is truncated and `header` is written immediately. Records shall
    /// serialise to the same fields in the same order.
    pub fn from_file_path<P: AsRef<Path>>(
        path: P, header: &[&str]
    ) -> Result<Self, ArchiveError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(ArchiveError::CreateError)?;
        }

        let file = File::create(path.as_ref()).map_err(ArchiveError::CreateError)?;

        let mut w = WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        w.write_record(header).map_err(ArchiveError::WriteError)?;
        w.flush().map_err(ArchiveError::FlushError)?;

        Ok(Self {
            writer: Some(w),
            path: Some(path.as_ref().to_path_buf()),
            num_records: 0
        })
    }

    /// Serialise a record into the archive.
    pub fn serialise<T: Serialize>(
        &mut self, record: T
    ) -> Result<(), ArchiveError> {
        match self.writer {
            Some(ref mut w) => {
                w.serialize(record).map_err(ArchiveError::WriteError)?;
                w.flush().map_err(ArchiveError::FlushError)?;
            },
            None => return Err(ArchiveError::NotInitialised)
        }

        self.num_records += 1;

        Ok(())
    }

    /// Number of records written so far.
    pub fn num_records(&self) -> usize {
        self.num_records
    }

    /// The path of the archive file, if initialised.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        index: usize,
        steer: f64
    }

    const HEADER: [&str; 2] = ["index", "steer"];

    #[test]
    fn test_header_written_on_open() {
        let path = std::env::temp_dir()
            .join("lc_util_archive_test")
            .join("empty.csv");
        let arch = Archiver::from_file_path(&path, &HEADER).unwrap();

        assert_eq!(arch.num_records(), 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "index,steer\n");
    }

    #[test]
    fn test_archiver_writes_header_once() {
        let path = std::env::temp_dir()
            .join("lc_util_archive_test")
            .join("rows.csv");
        let mut arch = Archiver::from_file_path(&path, &HEADER).unwrap();

        arch.serialise(Row { index: 0, steer: 0.5 }).unwrap();
        arch.serialise(Row { index: 1, steer: -0.25 }).unwrap();

        assert_eq!(arch.num_records(), 2);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["index,steer", "0,0.5", "1,-0.25"]);
    }

    #[test]
    fn test_uninitialised_archiver() {
        let mut arch = Archiver::default();
        match arch.serialise(Row { index: 0, steer: 0.0 }) {
            Err(ArchiveError::NotInitialised) => (),
            other => panic!("Expected NotInitialised, got {:?}", other.err())
        }
    }
}
