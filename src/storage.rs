// SPDX-License-Identifier: GPL-3.0-only

//! Storage and catalog for saved media
//!
//! The pipeline talks to storage only through [`MediaStore`]. [`FileStore`] is
//! the on-disk implementation: media files live in one directory next to a
//! JSON catalog that also holds placeholder entries reserved ahead of capture.

use crate::constants::{CATALOG_FILE_NAME, TEMP_FILE_SUFFIX};
use crate::errors::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type StorageResult<T> = Result<T, StorageError>;

/// Persisted identifier of a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(Uuid);

impl MediaId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MediaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "media:{}", self.0)
    }
}

/// Kind of media an identifier refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// File extension for this kind
    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::Video => "mp4",
        }
    }
}

/// Geographic coordinate attached to a capture
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Everything the store needs to complete a reserved entry
#[derive(Debug, Clone, Copy)]
pub struct MediaWrite<'a> {
    pub id: MediaId,
    pub data: &'a [u8],
    pub title: &'a str,
    pub location: Option<GeoLocation>,
    pub orientation: u32,
    pub width: u32,
    pub height: u32,
}

/// Storage/catalog collaborator used by the pipeline
///
/// Every method is called from worker threads, never from a UI thread.
pub trait MediaStore: Send + Sync {
    /// Reserve a catalog entry before the final bytes exist
    fn allocate_placeholder(
        &self,
        kind: MediaKind,
        title: &str,
        timestamp_ms: i64,
        width: u32,
        height: u32,
    ) -> StorageResult<MediaId>;

    /// Drop a reserved entry that was never completed
    fn delete_placeholder(&self, id: MediaId) -> StorageResult<()>;

    /// Durably write `write.data` and mark the entry complete
    fn write_and_catalog(&self, write: &MediaWrite<'_>) -> StorageResult<()>;

    /// Best-effort metadata pass after the bytes are stored
    fn rewrite_metadata(&self, id: MediaId, tags: &[(String, String)]) -> StorageResult<()>;
}

/// One record in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: MediaId,
    pub kind: MediaKind,
    pub title: String,
    pub timestamp_ms: i64,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub orientation: u32,
    #[serde(default)]
    pub location: Option<GeoLocation>,
    pub file_name: String,
    #[serde(default)]
    pub size_bytes: u64,
    /// True while the entry is a placeholder without data
    pub pending: bool,
    #[serde(default)]
    pub tags: Vec<(String, String)>,
}

/// Directory-backed media store with a JSON catalog
pub struct FileStore {
    root: PathBuf,
    catalog: Mutex<Vec<CatalogEntry>>,
}

impl FileStore {
    /// Open (or create) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        let catalog_path = root.join(CATALOG_FILE_NAME);
        let entries = if catalog_path.exists() {
            let contents = std::fs::read_to_string(&catalog_path)?;
            serde_json::from_str(&contents)?
        } else {
            Vec::new()
        };

        info!(root = %root.display(), entries = entries.len(), "Opened media store");

        Ok(Self {
            root,
            catalog: Mutex::new(entries),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshot of every catalog entry, placeholders included
    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.lock().clone()
    }

    /// Absolute path of an entry's media file
    pub fn path_of(&self, id: MediaId) -> Option<PathBuf> {
        self.lock()
            .iter()
            .find(|e| e.id == id)
            .map(|e| self.root.join(&e.file_name))
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CatalogEntry>> {
        self.catalog.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the catalog through a temp file so readers never see a torn index
    fn persist(&self, entries: &[CatalogEntry]) -> StorageResult<()> {
        let path = self.root.join(CATALOG_FILE_NAME);
        let tmp = path.with_extension(TEMP_FILE_SUFFIX);
        replace_file(&tmp, &path, &serde_json::to_vec_pretty(entries)?)?;
        Ok(())
    }

    /// Pick a file name that no entry or existing file already uses
    fn unique_file_name(&self, entries: &[CatalogEntry], title: &str, kind: MediaKind) -> String {
        let ext = kind.extension();
        let taken = |name: &str| {
            entries.iter().any(|e| e.file_name == name) || self.root.join(name).exists()
        };

        let mut name = format!("{}.{}", title, ext);
        let mut suffix = 1;
        while taken(&name) {
            name = format!("{}_{}.{}", title, suffix, ext);
            suffix += 1;
        }
        name
    }
}

/// Write `data` to `tmp`, flush it to disk and rename it over `path`
///
/// The temp file is removed if any step fails.
fn replace_file(tmp: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
    let result = std::fs::File::create(tmp)
        .and_then(|mut file| {
            file.write_all(data)?;
            file.sync_all()
        })
        .and_then(|()| std::fs::rename(tmp, path));
    if result.is_err() {
        let _ = std::fs::remove_file(tmp);
    }
    result
}

impl MediaStore for FileStore {
    fn allocate_placeholder(
        &self,
        kind: MediaKind,
        title: &str,
        timestamp_ms: i64,
        width: u32,
        height: u32,
    ) -> StorageResult<MediaId> {
        let mut entries = self.lock();
        let file_name = self.unique_file_name(&entries, title, kind);
        let id = MediaId::new();

        entries.push(CatalogEntry {
            id,
            kind,
            title: title.to_string(),
            timestamp_ms,
            width,
            height,
            orientation: 0,
            location: None,
            file_name,
            size_bytes: 0,
            pending: true,
            tags: Vec::new(),
        });

        if let Err(err) = self.persist(&entries) {
            entries.pop();
            return Err(err);
        }

        debug!(%id, title, "Allocated placeholder");
        Ok(id)
    }

    fn delete_placeholder(&self, id: MediaId) -> StorageResult<()> {
        let mut entries = self.lock();
        let index = entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| StorageError::UnknownId(id.to_string()))?;

        if !entries[index].pending {
            return Err(StorageError::NotPending(id.to_string()));
        }

        let removed = entries.remove(index);
        let leftover = self.root.join(&removed.file_name);
        if leftover.exists()
            && let Err(err) = std::fs::remove_file(&leftover)
        {
            warn!(path = %leftover.display(), %err, "Failed to remove placeholder file");
        }

        self.persist(&entries)?;
        debug!(%id, "Deleted placeholder");
        Ok(())
    }

    fn write_and_catalog(&self, write: &MediaWrite<'_>) -> StorageResult<()> {
        // Resolve the destination without holding the catalog lock during I/O
        let file_name = {
            let entries = self.lock();
            let entry = entries
                .iter()
                .find(|e| e.id == write.id)
                .ok_or_else(|| StorageError::UnknownId(write.id.to_string()))?;
            if !entry.pending {
                return Err(StorageError::NotPending(write.id.to_string()));
            }
            entry.file_name.clone()
        };

        let final_path = self.root.join(&file_name);
        let tmp_path = self
            .root
            .join(format!("{}.{}", file_name, TEMP_FILE_SUFFIX));

        replace_file(&tmp_path, &final_path, write.data)?;

        let mut entries = self.lock();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == write.id)
            .ok_or_else(|| StorageError::UnknownId(write.id.to_string()))?;
        entry.title = write.title.to_string();
        entry.location = write.location;
        entry.orientation = write.orientation;
        entry.width = write.width;
        entry.height = write.height;
        entry.size_bytes = write.data.len() as u64;
        entry.pending = false;
        self.persist(&entries)?;

        info!(id = %write.id, path = %final_path.display(), "Media saved");
        Ok(())
    }

    fn rewrite_metadata(&self, id: MediaId, tags: &[(String, String)]) -> StorageResult<()> {
        let mut entries = self.lock();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StorageError::UnknownId(id.to_string()))?;
        entry.tags = tags.to_vec();
        self.persist(&entries)
    }
}
