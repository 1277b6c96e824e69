//! Archive directory management and record file I/O.

use std::fs;
use std::path::{Path, PathBuf};

use chronicle_shared::constants::{APP_NAME, RECORD_FILE_EXT};
use chronicle_shared::EventRecord;
use directories::ProjectDirs;
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::records;

const IN_PROGRESS_SUFFIX: &str = "_in_progress";

/// Where an import reads its records from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSource {
    /// Archive name the run belongs to (without any checkpoint suffix).
    pub name: String,
    pub path: PathBuf,
    /// True when the records come from an in-progress checkpoint.
    pub resumed: bool,
}

/// Handle to one archive directory.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    /// Open (or create) an archive directory at an explicit path.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        debug!(path = %dir.display(), "record store ready");
        Ok(Self { dir })
    }

    /// Open the default archive directory.
    ///
    /// - Linux:   `~/.local/share/chronicle/archives`
    /// - macOS:   `~/Library/Application Support/com.chronicle.chronicle/archives`
    /// - Windows: `{FOLDERID_RoamingAppData}\chronicle\chronicle\data\archives`
    pub fn default_location() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", APP_NAME, APP_NAME).ok_or(StoreError::NoDataDir)?;
        let dir = project_dirs.data_dir().join("archives");
        info!(path = %dir.display(), "opening archive directory");
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of `<name>.csv` inside the store, after validating `name`.
    pub(crate) fn file_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{name}.{RECORD_FILE_EXT}")))
    }

    pub fn in_progress_name(name: &str) -> String {
        format!("{name}{IN_PROGRESS_SUFFIX}")
    }

    /// Write a record sequence as `<name>.csv`, replacing any previous file.
    ///
    /// The sequence must already be in chronological order.
    pub fn write(&self, records: &[EventRecord], name: &str) -> Result<PathBuf> {
        let path = self.file_path(name)?;
        write_records(&path, records)?;
        info!(file = %path.display(), rows = records.len(), "wrote records");
        Ok(path)
    }

    /// Read `<name>.csv` back in file order.
    pub fn read(&self, name: &str) -> Result<Vec<EventRecord>> {
        let path = self.file_path(name)?;
        read_records(&path)
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.file_path(name)?.exists())
    }

    /// Pick the file an import of `name` should read: the in-progress
    /// checkpoint if one exists, otherwise the export itself.
    pub fn resolve_import_source(&self, name: &str) -> Result<ImportSource> {
        let checkpoint = self.file_path(&Self::in_progress_name(name))?;
        if checkpoint.exists() {
            info!(file = %checkpoint.display(), "resuming from in-progress checkpoint");
            return Ok(ImportSource {
                name: name.to_string(),
                path: checkpoint,
                resumed: true,
            });
        }

        let export = self.file_path(name)?;
        if !export.exists() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(ImportSource {
            name: name.to_string(),
            path: export,
            resumed: false,
        })
    }

    pub fn read_source(&self, source: &ImportSource) -> Result<Vec<EventRecord>> {
        read_records(&source.path)
    }

    /// Snapshot the unsent records of `name` to its in-progress checkpoint.
    pub fn write_in_progress(&self, name: &str, remaining: &[EventRecord]) -> Result<PathBuf> {
        let path = self.file_path(&Self::in_progress_name(name))?;
        write_records(&path, remaining)?;
        info!(file = %path.display(), remaining = remaining.len(), "wrote in-progress checkpoint");
        Ok(path)
    }

    /// Remove the in-progress checkpoint of `name`. Returns whether one existed.
    pub fn clear_in_progress(&self, name: &str) -> Result<bool> {
        let path = self.file_path(&Self::in_progress_name(name))?;
        remove_if_exists(&path)
    }
}

/// Archive names are restricted to `[A-Za-z0-9_-]`, which rules out
/// separators and `..` before any path is built.
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

pub(crate) fn write_records(path: &Path, records: &[EventRecord]) -> Result<()> {
    let file = path.display().to_string();
    write_atomically(path, |writer| {
        for (row, record) in records.iter().enumerate() {
            let fields = records::to_row(record).map_err(|source| StoreError::Row {
                file: file.clone(),
                row,
                source,
            })?;
            writer.write_record(&fields)?;
        }
        Ok(())
    })
}

pub(crate) fn read_records(path: &Path) -> Result<Vec<EventRecord>> {
    if !path.exists() {
        return Err(StoreError::NotFound(path.display().to_string()));
    }
    let file = path.display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut out = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let fields = result?;
        let record = records::from_row(&fields).map_err(|source| StoreError::Row {
            file: file.clone(),
            row,
            source,
        })?;
        out.push(record);
    }
    debug!(file = %file, rows = out.len(), "read records");
    Ok(out)
}

/// Write through a sibling temp file and rename it into place, so a reader
/// never observes a half-written archive.
pub(crate) fn write_atomically<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut csv::Writer<fs::File>) -> Result<()>,
{
    let tmp = path.with_extension("tmp");
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(&tmp)?;
    let filled = fill(&mut writer).and_then(|()| writer.flush().map_err(StoreError::from));
    drop(writer);
    if let Err(e) = filled {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

pub(crate) fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
