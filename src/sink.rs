//! Append-only persistence of lookup results.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::check::Outcome;

/// Default results log, relative to the working directory.
pub const DEFAULT_RESULTS_PATH: &str = "random_results.txt";

/// Default available-names list, relative to the working directory.
pub const DEFAULT_AVAILABLE_PATH: &str = "available_ids.txt";

/// A failed open or write on one of the output files.
#[derive(Debug, thiserror::Error)]
#[error("{}: {source}", .path.display())]
pub struct SinkError {
    /// The file that could not be opened or written.
    pub path: PathBuf,
    /// Underlying I/O error.
    #[source]
    pub source: io::Error,
}

#[derive(Debug)]
struct AppendLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl AppendLog {
    fn open(path: &Path) -> Result<Self, SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| SinkError {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Write `lines` as one `write_all` under the lock, so concurrent callers
    /// never interleave within a line.
    fn append(&self, lines: &str) -> Result<(), SinkError> {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(lines.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|source| SinkError {
                path: self.path.clone(),
                source,
            })
    }
}

/// The two output streams of a run: every result, and the available names.
///
/// Both files are opened in append mode, so repeated runs accumulate. `&ResultSink`
/// can be shared between threads; each record is written as a whole line.
#[derive(Debug)]
pub struct ResultSink {
    results: AppendLog,
    available: AppendLog,
    echo: bool,
}

impl ResultSink {
    /// Open (creating if needed) the results log and the available list.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] naming the file that could not be opened.
    pub fn open(
        results_path: impl AsRef<Path>,
        available_path: impl AsRef<Path>,
    ) -> Result<Self, SinkError> {
        Ok(Self {
            results: AppendLog::open(results_path.as_ref())?,
            available: AppendLog::open(available_path.as_ref())?,
            echo: false,
        })
    }

    /// Also print every recorded line to stdout.
    #[must_use]
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Path of the results log.
    #[must_use]
    pub fn results_path(&self) -> &Path {
        &self.results.path
    }

    /// Path of the available-names list.
    #[must_use]
    pub fn available_path(&self) -> &Path {
        &self.available.path
    }

    /// Append one result line to the results log.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] if the write fails.
    pub fn record(&self, outcome: &Outcome) -> Result<(), SinkError> {
        let line = format!("{outcome}\n");
        self.results.append(&line)?;
        if self.echo {
            print!("{line}");
        }
        Ok(())
    }

    /// Append every available outcome's name to the available list, in the order given.
    ///
    /// Non-available outcomes are ignored. Returns how many names were written.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] if the write fails.
    pub fn flush_available<'a, I>(&self, outcomes: I) -> Result<usize, SinkError>
    where
        I: IntoIterator<Item = &'a Outcome>,
    {
        let mut buf = String::new();
        let mut written = 0;
        for outcome in outcomes {
            if let Outcome::Available(candidate) = outcome {
                buf.push_str(candidate.as_str());
                buf.push('\n');
                written += 1;
            }
        }
        if written > 0 {
            self.available.append(&buf)?;
        }
        Ok(written)
    }
}
