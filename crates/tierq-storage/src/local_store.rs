//! Local tier storage layout.
//!
//! Every local table is a directory of parquet files directly under the storage root:
//!
//! ```text
//! <root>/
//!   web_page/part-00000.parquet
//!   item/item-000000000000.parquet
//!   .incoming/<name>/          staging area for in-progress promotions
//! ```
//!
//! Hidden directories are never reported as tables. A table directory only becomes
//! visible once a promotion commits it with a rename from `.incoming/`.

use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::path::{Path, PathBuf};
use tierq_core::{CoreError, CoreResult};

const INCOMING_DIR: &str = ".incoming";
const PARQUET_EXTENSION: &str = "parquet";

/// Directory-per-table parquet store rooted at a single path.
#[derive(Debug, Clone)]
pub struct LocalTableStore {
    root: PathBuf,
}

impl LocalTableStore {
    /// Opens the store, creating the root directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> CoreResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        tracing::debug!(root = %root.display(), "Opened local table store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Live directory of `name`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if `name` is not a safe single path component.
    pub fn table_path(&self, name: &str) -> CoreResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    fn incoming_path(&self, name: &str) -> CoreResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(INCOMING_DIR).join(name))
    }

    /// Names of table directories holding at least one parquet file, sorted.
    pub async fn list_tables(&self) -> CoreResult<Vec<String>> {
        let mut tables = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }

            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    tracing::warn!(entry = ?raw, "Skipping non UTF-8 directory name");
                    continue;
                }
            };
            if name.starts_with('.') {
                continue;
            }

            if has_parquet_files(&entry.path()).await? {
                tables.push(name);
            } else {
                tracing::debug!(table = %name, "Skipping local directory without parquet files");
            }
        }

        tables.sort();
        Ok(tables)
    }

    /// Whether the live directory of `name` holds parquet data.
    pub async fn has_data(&self, name: &str) -> CoreResult<bool> {
        has_parquet_files(&self.table_path(name)?).await
    }

    /// Recreates an empty staging directory for `name` and returns its path.
    pub async fn prepare_incoming(&self, name: &str) -> CoreResult<PathBuf> {
        let incoming = self.incoming_path(name)?;
        remove_dir_if_exists(&incoming).await?;
        tokio::fs::create_dir_all(&incoming).await?;
        Ok(incoming)
    }

    /// Replaces the live directory of `name` with its staging directory.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidState` if nothing parquet-shaped was staged.
    pub async fn commit_incoming(&self, name: &str) -> CoreResult<PathBuf> {
        let incoming = self.incoming_path(name)?;
        let live = self.table_path(name)?;

        if !has_parquet_files(&incoming).await? {
            return Err(CoreError::invalid_state(format!(
                "no staged parquet files for table `{}`",
                name
            )));
        }

        remove_dir_if_exists(&live).await?;
        tokio::fs::rename(&incoming, &live).await?;

        tracing::debug!(table = %name, path = %live.display(), "Committed staged table data");
        Ok(live)
    }

    /// Removes the live directory of `name`, if any.
    pub async fn remove_table(&self, name: &str) -> CoreResult<()> {
        remove_dir_if_exists(&self.table_path(name)?).await?;
        Ok(())
    }

    /// Removes the staging directory of `name`, if any.
    pub async fn discard_incoming(&self, name: &str) -> CoreResult<()> {
        remove_dir_if_exists(&self.incoming_path(name)?).await?;
        Ok(())
    }

    /// Reads every parquet file of `name` into record batches.
    pub async fn read_table(&self, name: &str) -> CoreResult<Vec<RecordBatch>> {
        let dir = self.table_path(name)?;
        let files = parquet_files(&dir).await?;
        if files.is_empty() {
            return Err(CoreError::invalid_state(format!(
                "table `{}` has no local data",
                name
            )));
        }

        tokio::task::spawn_blocking(move || read_parquet_files(&files))
            .await
            .map_err(|e| CoreError::internal(format!("parquet reader task failed: {}", e)))?
    }

    /// Total bytes of regular files under the root, staging area included.
    pub async fn disk_usage(&self) -> CoreResult<u64> {
        let mut total = 0u64;
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    total += entry.metadata().await?.len();
                }
            }
        }

        Ok(total)
    }
}

/// Table names map directly to directories, so only plain single components are allowed.
fn validate_name(name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::Validation("table name is empty".to_string()));
    }
    if name.starts_with('.') || name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(CoreError::Validation(format!(
            "table name `{}` is not a valid directory name",
            name
        )));
    }
    Ok(())
}

async fn parquet_files(dir: &Path) -> CoreResult<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_parquet = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(PARQUET_EXTENSION));
        if is_parquet && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

async fn has_parquet_files(dir: &Path) -> CoreResult<bool> {
    Ok(!parquet_files(dir).await?.is_empty())
}

async fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        result => result,
    }
}

fn read_parquet_files(files: &[PathBuf]) -> CoreResult<Vec<RecordBatch>> {
    let mut batches = Vec::new();

    for path in files {
        let file = std::fs::File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .and_then(|builder| builder.build())
            .map_err(|e| CoreError::external("parquet", format!("{}: {}", path.display(), e)))?;

        for batch in reader {
            batches.push(batch.map_err(|e| CoreError::external("parquet", e))?);
        }
    }

    Ok(batches)
}
