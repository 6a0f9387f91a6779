use serde::Serialize;
use std::path::PathBuf;

/// Where a collected file's bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// Found on one of the named storage locations
    Local,
    /// Downloaded over HTTP into a temp file
    Remote,
}

/// Terminal result of one collection attempt. There is no retry state: a
/// file is found, downloaded, skipped as oversized, or failed — once.
#[derive(Debug, Clone, Serialize)]
pub struct CollectedFile {
    /// The path or URL exactly as it appeared in the extracted data
    pub source: String,
    pub kind: FileKind,
    /// Storage location name that matched, for local files
    pub disk: Option<String>,
    /// Path relative to the storage location root
    pub relative_path: Option<String>,
    /// Fully resolved local path (original location for local files)
    pub resolved_path: Option<PathBuf>,
    /// Downloaded copy, owned by the collection result
    pub temp_path: Option<PathBuf>,
    pub size_bytes: u64,
    pub mime_type: Option<String>,
    /// Last-modified time, for local files
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
    /// Category / table the reference was found in
    pub category: Option<String>,
    pub table: Option<String>,
    pub exists: bool,
    /// Declared size exceeded the download ceiling; body never fetched
    pub oversized: bool,
    pub error: Option<String>,
}

impl CollectedFile {
    pub(crate) fn new(source: &str, kind: FileKind) -> Self {
        Self {
            source: source.to_string(),
            kind,
            disk: None,
            relative_path: None,
            resolved_path: None,
            temp_path: None,
            size_bytes: 0,
            mime_type: None,
            last_modified: None,
            category: None,
            table: None,
            exists: false,
            oversized: false,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exists && self.error.is_none() && !self.oversized
    }
}

/// One line of a manifest's per-file listing.
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub path: String,
    pub kind: FileKind,
    pub size_bytes: u64,
    pub relative_path: Option<String>,
    pub error: Option<String>,
}

/// Aggregate view over a completed collection run.
#[derive(Debug, Clone, Serialize)]
pub struct FileManifest {
    pub file_count: usize,
    pub total_size: u64,
    pub local_count: usize,
    pub remote_count: usize,
    pub failed_count: usize,
    pub files: Vec<FileSummary>,
}

/// A completed collection run that owns its downloaded temp files.
///
/// Temp files are deleted when this value drops, so abandoning a collection
/// on an error path cannot leak downloads. Callers that pack the files into
/// an archive first can call [`cleanup`](Self::cleanup) explicitly at the
/// moment of their choosing; the drop is then a no-op.
#[derive(Debug)]
pub struct CollectedFiles {
    files: Vec<CollectedFile>,
    cleaned: bool,
}

impl CollectedFiles {
    pub(crate) fn new(files: Vec<CollectedFile>) -> Self {
        Self {
            files,
            cleaned: false,
        }
    }

    pub fn files(&self) -> &[CollectedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CollectedFile> {
        self.files.iter()
    }

    /// Delete every downloaded temp file now. Idempotent.
    pub fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        for file in &self.files {
            if let Some(path) = &file.temp_path {
                if let Err(err) = std::fs::remove_file(path) {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        log::warn!("failed to remove temp file {}: {}", path.display(), err);
                    }
                }
            }
        }
        self.cleaned = true;
    }
}

impl Drop for CollectedFiles {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl<'a> IntoIterator for &'a CollectedFiles {
    type Item = &'a CollectedFile;
    type IntoIter = std::slice::Iter<'a, CollectedFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}
