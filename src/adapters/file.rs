//! File-backed settings store
//!
//! Rows are kept in a single JSON or YAML document, chosen by file extension.
//! The file is opened per call and replaced atomically on every write, so
//! several processes can share it as long as only one of them writes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::domain::ports::{Clock, Row, SettingsStore};
use crate::error::Result;

use super::SystemClock;

/// On-disk document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Yaml,
}

impl FileFormat {
    /// `.yaml` / `.yml` select YAML, anything else JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                FileFormat::Yaml
            }
            _ => FileFormat::Json,
        }
    }

    fn decode(self, text: &str) -> Result<Vec<Row>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(match self {
            FileFormat::Json => serde_json::from_str(text)?,
            FileFormat::Yaml => serde_yaml::from_str(text)?,
        })
    }

    fn encode(self, rows: &[Row]) -> Result<String> {
        Ok(match self {
            FileFormat::Json => serde_json::to_string_pretty(rows)?,
            FileFormat::Yaml => serde_yaml::to_string(rows)?,
        })
    }
}

/// Settings store persisted to a local file.
pub struct FileStore {
    path: PathBuf,
    format: FileFormat,
    read_only: bool,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            format: FileFormat::from_path(&path),
            path,
            read_only: false,
            clock: Arc::new(SystemClock),
            write_lock: Mutex::new(()),
        }
    }

    /// Writes are accepted and ignored.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// All rows in the file. A missing file holds no rows.
    pub async fn load(&self) -> Result<Vec<Row>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => self.format.decode(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, rows: &[Row]) -> Result<()> {
        let text = self.format.encode(rows)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Upsert into `rows`, stamping changed rows with `now`.
    /// Returns true when the row was inserted; unchanged values are left as is.
    fn merge(rows: &mut Vec<Row>, row: Row, now: DateTime<Utc>) -> bool {
        match rows.iter_mut().find(|existing| existing.same_key(&row)) {
            Some(existing) => {
                if existing.value != row.value {
                    existing.value = row.value;
                    existing.updated_at = now;
                }
                false
            }
            None => {
                rows.push(Row {
                    updated_at: now,
                    ..row
                });
                true
            }
        }
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("read_only", &self.read_only)
            .finish()
    }
}

#[async_trait]
impl SettingsStore for FileStore {
    async fn read_changed(
        &self,
        categories: &[String],
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Row>> {
        let mut rows: Vec<Row> = self
            .load()
            .await?
            .into_iter()
            .filter(|row| categories.contains(&row.category))
            .filter(|row| since.map_or(true, |since| row.updated_at > since))
            .collect();
        rows.sort_by_key(|row| row.updated_at);
        Ok(rows)
    }

    async fn write_row(&self, row: Row) -> Result<bool> {
        Ok(self.write_rows(vec![row]).await? == 1)
    }

    #[instrument(skip(self, rows), fields(path = %self.path.display(), count = rows.len()))]
    async fn write_rows(&self, rows: Vec<Row>) -> Result<usize> {
        if self.read_only {
            debug!("Ignoring write to read-only settings file");
            return Ok(0);
        }

        let _guard = self.write_lock.lock().await;
        let mut stored = self.load().await?;
        let now = self.clock.now();
        let mut inserted = 0;
        for row in rows {
            if Self::merge(&mut stored, row, now) {
                inserted += 1;
            }
        }

        self.persist(&stored).await?;
        Ok(inserted)
    }
}
