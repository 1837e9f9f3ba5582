//! Stage input and output.
//!
//! NDJSON artifacts hold one JSON record per line, one line per example.
//! Binary artifacts are a single bincode-encoded vector with one entry per
//! example. Every artifact is written through an [`AtomicFile`]: a reader never
//! observes a half-written stage output.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StageError;

pub type StageResult<T> = std::result::Result<T, StageError>;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StageError + '_ {
    move |source| StageError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// A file written to `<target>.partial` and renamed over `target` on commit.
///
/// The partial output is removed whenever the file is dropped without a
/// successful rename, including when the commit itself fails.
pub struct AtomicFile {
    target: PathBuf,
    partial: PathBuf,
    writer: Option<BufWriter<File>>,
    committed: bool,
}

impl AtomicFile {
    pub fn create(target: &Path) -> StageResult<Self> {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let mut partial = target.as_os_str().to_owned();
        partial.push(".partial");
        let partial = PathBuf::from(partial);
        let file = File::create(&partial).map_err(io_error(&partial))?;
        Ok(Self {
            target: target.to_path_buf(),
            partial,
            writer: Some(BufWriter::new(file)),
            committed: false,
        })
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> StageResult<()> {
        match self.writer.as_mut() {
            Some(w) => w.write_all(bytes).map_err(io_error(&self.partial)),
            None => Ok(()),
        }
    }

    /// Flush and sync the partial file to disk.
    fn sync(&mut self) -> StageResult<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush().map_err(io_error(&self.partial))?;
            writer.get_ref().sync_all().map_err(io_error(&self.partial))?;
        }
        Ok(())
    }

    /// Move the synced partial file into place.
    fn rename(mut self) -> StageResult<()> {
        self.writer = None;
        std::fs::rename(&self.partial, &self.target).map_err(io_error(&self.target))?;
        self.committed = true;
        Ok(())
    }

    /// Flush, sync and move the file into place.
    pub fn commit(mut self) -> StageResult<()> {
        self.sync()?;
        self.rename()
    }

    /// Commit outputs that belong together: every file is synced before any is
    /// moved into place, so a failed write commits none of them.
    pub fn commit_all(mut files: Vec<AtomicFile>) -> StageResult<()> {
        for file in &mut files {
            file.sync()?;
        }
        for file in files {
            file.rename()?;
        }
        Ok(())
    }
}

impl Drop for AtomicFile {
    fn drop(&mut self) {
        if !self.committed {
            self.writer = None;
            let _ = std::fs::remove_file(&self.partial);
        }
    }
}

/// Read one record per non-empty line.
pub fn read_ndjson<T: DeserializeOwned>(path: &Path) -> StageResult<Vec<T>> {
    let file = File::open(path).map_err(io_error(path))?;
    let mut records = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_error(path))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| StageError::Parse {
            path: path.display().to_string(),
            line: i + 1,
            message: e.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Stage one record per line in an uncommitted [`AtomicFile`].
pub fn ndjson_file<T: Serialize>(path: &Path, records: &[T]) -> StageResult<AtomicFile> {
    let mut out = AtomicFile::create(path)?;
    let mut line = Vec::new();
    for record in records {
        line.clear();
        serde_json::to_writer(&mut line, record).map_err(|e| StageError::Serialization {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        line.push(b'\n');
        out.write_all(&line)?;
    }
    Ok(out)
}

/// Write one record per line, atomically.
pub fn write_ndjson<T: Serialize>(path: &Path, records: &[T]) -> StageResult<()> {
    ndjson_file(path, records)?.commit()
}

pub fn read_bincode<T: DeserializeOwned>(path: &Path) -> StageResult<T> {
    let file = File::open(path).map_err(io_error(path))?;
    bincode::deserialize_from(BufReader::new(file)).map_err(|e| StageError::Serialization {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Stage `value`, bincode-encoded, in an uncommitted [`AtomicFile`].
pub fn bincode_file<T: Serialize>(path: &Path, value: &T) -> StageResult<AtomicFile> {
    let bytes = bincode::serialize(value).map_err(|e| StageError::Serialization {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let mut out = AtomicFile::create(path)?;
    out.write_all(&bytes)?;
    Ok(out)
}

/// Encode `value` with bincode, atomically.
pub fn write_bincode<T: Serialize>(path: &Path, value: &T) -> StageResult<()> {
    bincode_file(path, value)?.commit()
}
