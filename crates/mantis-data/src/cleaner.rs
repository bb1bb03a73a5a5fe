//! Firmware-banner stripping for raw MANTIS exports.
//!
//! The MANTIS app prepends a fixed block of non-tabular lines before the CSV
//! header. [`CsvCleaner`] copies everything after that block into a scratch
//! file owned by a [`CleanedCsv`] guard; dropping the guard deletes the file,
//! so the scratch copy never outlives the ingestion call that created it.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use mantis_core::error::{IngestError, Result};
use mantis_core::models::MANTIS_PREAMBLE_LINES;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

// ── CsvCleaner ────────────────────────────────────────────────────────────────

/// Writes banner-free copies of MANTIS exports into a scratch directory.
#[derive(Debug, Clone)]
pub struct CsvCleaner {
    scratch_dir: PathBuf,
    skip_lines: usize,
}

impl CsvCleaner {
    /// Cleaner that skips the standard MANTIS banner.
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            skip_lines: MANTIS_PREAMBLE_LINES,
        }
    }

    /// Override the number of leading lines to drop.
    pub fn with_skip_lines(mut self, skip_lines: usize) -> Self {
        self.skip_lines = skip_lines;
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn skip_lines(&self) -> usize {
        self.skip_lines
    }

    /// Copy `source` minus its first `skip_lines` lines into a scratch file.
    ///
    /// Lines are copied byte-for-byte, terminators included. A source with
    /// fewer lines than the banner yields an empty file. Read failures on
    /// `source` surface as [`IngestError::Io`]; scratch failures as
    /// [`IngestError::Scratch`]. On any error the partial scratch file is
    /// removed before returning.
    pub fn clean<R: Read>(&self, source: R) -> Result<CleanedCsv> {
        std::fs::create_dir_all(&self.scratch_dir).map_err(|e| IngestError::Scratch {
            path: self.scratch_dir.clone(),
            source: e,
        })?;

        let mut file = tempfile::Builder::new()
            .prefix("mantis-")
            .suffix(".csv")
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| IngestError::Scratch {
                path: self.scratch_dir.clone(),
                source: e,
            })?;
        let path = file.path().to_path_buf();
        let scratch_err = |e: std::io::Error| IngestError::Scratch {
            path: path.clone(),
            source: e,
        };

        let mut reader = BufReader::new(source);
        let mut line = Vec::new();
        let mut index = 0usize;
        let mut kept = 0usize;
        {
            let mut writer = BufWriter::new(file.as_file_mut());
            loop {
                line.clear();
                if reader.read_until(b'\n', &mut line)? == 0 {
                    break;
                }
                if index >= self.skip_lines {
                    writer.write_all(&line).map_err(scratch_err)?;
                    kept += 1;
                }
                index += 1;
            }
            writer.flush().map_err(scratch_err)?;
        }

        let skipped = index.min(self.skip_lines);
        debug!(
            "Cleaned MANTIS export into {}: {} banner lines skipped, {} kept",
            path.display(),
            skipped,
            kept
        );

        Ok(CleanedCsv {
            file,
            lines_skipped: skipped,
            lines_kept: kept,
        })
    }
}

// ── CleanedCsv ────────────────────────────────────────────────────────────────

/// A banner-free scratch copy of one upload. Deleted on drop.
#[derive(Debug)]
pub struct CleanedCsv {
    file: NamedTempFile,
    lines_skipped: usize,
    lines_kept: usize,
}

impl CleanedCsv {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn lines_skipped(&self) -> usize {
        self.lines_skipped
    }

    pub fn lines_kept(&self) -> usize {
        self.lines_kept
    }

    /// Open an independent read handle positioned at the start of the file.
    pub fn open(&self) -> Result<File> {
        self.file.reopen().map_err(|e| IngestError::Scratch {
            path: self.path().to_path_buf(),
            source: e,
        })
    }

    /// Delete the scratch file now, reporting any failure.
    ///
    /// Dropping the guard deletes the file as well but swallows errors;
    /// this variant logs them so stale files can be tracked down.
    pub fn close(self) -> Result<()> {
        let path = self.path().to_path_buf();
        self.file.close().map_err(|e| {
            warn!("Failed to remove scratch file {}: {}", path.display(), e);
            IngestError::Scratch { path, source: e }
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
