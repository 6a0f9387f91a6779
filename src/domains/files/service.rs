use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::BackupConfig;
use crate::domains::export::types::{ExtractionResult, RowMap};
use crate::domains::files::types::{
    CollectedFile, CollectedFiles, FileKind, FileManifest, FileSummary,
};
use crate::errors::{DomainError, ServiceError, ServiceResult};

/// Invoked once per successfully collected file with (source, size_bytes).
pub type FileProgressFn = Arc<dyn Fn(&str, u64) + Send + Sync>;

/// Extensions that mark a string as a file reference. Anything else is
/// treated as plain text, however path-like it looks.
static RECOGNIZED_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // images
        "jpg", "jpeg", "png", "gif", "webp", "svg", "bmp", "ico",
        // video
        "mp4", "mov", "avi", "webm", "mkv",
        // audio
        "mp3", "wav", "ogg", "m4a", "flac",
        // documents
        "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "csv", "md",
        // archives
        "zip", "tar", "gz", "rar", "7z",
        // structured data
        "json", "xml", "yaml", "yml",
    ]
    .into_iter()
    .collect()
});

/// Header-level metadata from a HEAD probe.
#[derive(Debug, Clone, Default)]
pub struct RemoteMetadata {
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
}

/// HTTP access for remote file collection, behind a trait so collection
/// logic tests without a network.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Fetch headers only (HEAD), short timeout.
    async fn probe(&self, url: &str) -> ServiceResult<RemoteMetadata>;

    /// Download the full body to `dest`, returning bytes written.
    async fn download(&self, url: &str, dest: &Path) -> ServiceResult<u64>;
}

/// reqwest-backed fetcher with separate probe and download timeouts.
pub struct HttpRemoteFetcher {
    client: reqwest::Client,
    probe_timeout: Duration,
    download_timeout: Duration,
}

impl HttpRemoteFetcher {
    pub fn new(config: &BackupConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            probe_timeout: config.remote_probe_timeout,
            download_timeout: config.remote_download_timeout,
        }
    }
}

#[async_trait]
impl RemoteFetcher for HttpRemoteFetcher {
    async fn probe(&self, url: &str) -> ServiceResult<RemoteMetadata> {
        let response = self
            .client
            .head(url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalService(format!("HEAD {}: {}", url, e)))?
            .error_for_status()
            .map_err(|e| ServiceError::ExternalService(format!("HEAD {}: {}", url, e)))?;

        let content_length = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

        Ok(RemoteMetadata {
            content_length,
            content_type,
        })
    }

    async fn download(&self, url: &str, dest: &Path) -> ServiceResult<u64> {
        let mut response = self
            .client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalService(format!("GET {}: {}", url, e)))?
            .error_for_status()
            .map_err(|e| ServiceError::ExternalService(format!("GET {}: {}", url, e)))?;

        let mut out = std::fs::File::create(dest).map_err(DomainError::from)?;
        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ServiceError::ExternalService(format!("GET {}: {}", url, e)))?
        {
            out.write_all(&chunk).map_err(DomainError::from)?;
            written += chunk.len() as u64;
        }
        Ok(written)
    }
}

/// Finds file references embedded in extracted data and materializes each
/// as a byte-accessible local copy with metadata.
///
/// Failure semantics follow the extractor's: per-file problems are recorded
/// on the result, never thrown. Only structural failures (temp storage
/// unavailable) propagate.
pub struct FileCollectorService {
    fetcher: Arc<dyn RemoteFetcher>,
    /// Ordered storage locations probed for local files; first match wins
    disks: Vec<(String, PathBuf)>,
    temp_dir: PathBuf,
    max_remote_file_size_bytes: u64,
    storage_prefixes: Vec<String>,
}

struct Candidate {
    source: String,
    category: String,
    table: String,
}

impl FileCollectorService {
    pub fn new(
        fetcher: Arc<dyn RemoteFetcher>,
        disks: Vec<(String, PathBuf)>,
        config: &BackupConfig,
    ) -> Self {
        Self {
            fetcher,
            disks,
            temp_dir: config.temp_storage_path.clone(),
            max_remote_file_size_bytes: config.max_remote_file_size_bytes,
            storage_prefixes: config.storage_prefixes.clone(),
        }
    }

    /// Walk an extraction payload, dedupe every embedded file reference,
    /// and collect each one. A path referenced by fifty records is fetched
    /// once, attributed to the first record that mentioned it.
    pub async fn collect_files(
        &self,
        data: &ExtractionResult,
        progress: Option<&FileProgressFn>,
    ) -> ServiceResult<CollectedFiles> {
        std::fs::create_dir_all(&self.temp_dir).map_err(DomainError::from)?;

        let candidates = self.gather_candidates(data);
        log::info!("collecting {} unique file references", candidates.len());

        let mut files = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let mut file = self.collect_file(&candidate.source).await;
            file.category = Some(candidate.category);
            file.table = Some(candidate.table);
            if file.is_success() {
                if let Some(progress) = progress {
                    progress(&file.source, file.size_bytes);
                }
            }
            files.push(file);
        }

        Ok(CollectedFiles::new(files))
    }

    fn gather_candidates(&self, data: &ExtractionResult) -> Vec<Candidate> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for (category_key, payload) in data {
            for (table, rows) in &payload.data {
                for row in rows {
                    self.gather_from_row(row, category_key, table, &mut seen, &mut candidates);
                }
            }
        }
        candidates
    }

    fn gather_from_row(
        &self,
        row: &RowMap,
        category: &str,
        table: &str,
        seen: &mut HashSet<String>,
        out: &mut Vec<Candidate>,
    ) {
        for value in row.values() {
            self.gather_from_value(value, category, table, seen, out);
        }
    }

    fn gather_from_value(
        &self,
        value: &serde_json::Value,
        category: &str,
        table: &str,
        seen: &mut HashSet<String>,
        out: &mut Vec<Candidate>,
    ) {
        match value {
            serde_json::Value::String(s) => {
                if self.looks_like_file_path(s) && seen.insert(s.clone()) {
                    out.push(Candidate {
                        source: s.clone(),
                        category: category.to_string(),
                        table: table.to_string(),
                    });
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    self.gather_from_value(item, category, table, seen, out);
                }
            }
            serde_json::Value::Object(map) => {
                for item in map.values() {
                    self.gather_from_value(item, category, table, seen, out);
                }
            }
            _ => {}
        }
    }

    /// A string is a file reference only when it both looks like a location
    /// (absolute URL, leading slash, or known storage prefix) and ends in a
    /// recognized binary/document extension.
    pub fn looks_like_file_path(&self, value: &str) -> bool {
        if value.len() < 5 || value.contains(char::is_whitespace) {
            return false;
        }

        if is_url(value) {
            return url_extension(value)
                .map(|ext| RECOGNIZED_EXTENSIONS.contains(ext.as_str()))
                .unwrap_or(false);
        }

        let path_like = value.starts_with('/')
            || self
                .storage_prefixes
                .iter()
                .any(|prefix| value.starts_with(prefix.as_str()));
        if !path_like {
            return false;
        }

        path_extension(value)
            .map(|ext| RECOGNIZED_EXTENSIONS.contains(ext.as_str()))
            .unwrap_or(false)
    }

    /// Collect one reference, dispatching on whether it parses as a URL.
    pub async fn collect_file(&self, source: &str) -> CollectedFile {
        if is_url(source) {
            self.collect_remote_file(source).await
        } else {
            self.collect_local_file(source)
        }
    }

    /// Probe the ordered storage locations for the path; first hit wins.
    /// A miss across all locations is a per-file status, not a failure.
    fn collect_local_file(&self, path: &str) -> CollectedFile {
        let mut file = CollectedFile::new(path, FileKind::Local);
        let relative = path.trim_start_matches('/');

        for (disk, root) in &self.disks {
            let resolved = root.join(relative);
            let Ok(metadata) = std::fs::metadata(&resolved) else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }

            file.exists = true;
            file.disk = Some(disk.clone());
            file.relative_path = Some(relative.to_string());
            file.size_bytes = metadata.len();
            file.last_modified = metadata
                .modified()
                .ok()
                .map(chrono::DateTime::<chrono::Utc>::from);
            file.mime_type = Some(detect_mime(&resolved));
            file.resolved_path = Some(resolved);
            return file;
        }

        file.error = Some(format!("not found on any storage location: {}", relative));
        file
    }

    /// HEAD first to learn declared size and type, skip anything over the
    /// ceiling without downloading, then GET the body into a temp file.
    /// Network failures become fields on the result, never errors.
    async fn collect_remote_file(&self, url: &str) -> CollectedFile {
        let mut file = CollectedFile::new(url, FileKind::Remote);

        let metadata = match self.fetcher.probe(url).await {
            Ok(metadata) => metadata,
            Err(err) => {
                log::warn!("remote probe failed for {}: {}", url, err);
                file.error = Some(err.to_string());
                return file;
            }
        };
        file.mime_type = metadata.content_type.clone();

        if let Some(declared) = metadata.content_length {
            if declared > self.max_remote_file_size_bytes {
                log::warn!(
                    "skipping oversized remote file {} ({} bytes, limit {})",
                    url,
                    declared,
                    self.max_remote_file_size_bytes
                );
                file.exists = true;
                file.oversized = true;
                file.size_bytes = declared;
                file.error = Some("exceeds maximum remote file size".to_string());
                return file;
            }
        }

        let extension = url_extension(url)
            .or_else(|| {
                metadata
                    .content_type
                    .as_deref()
                    .and_then(extension_for_mime)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "bin".to_string());
        let temp_path = self
            .temp_dir
            .join(format!("remote-{}.{}", Uuid::new_v4(), extension));

        match self.fetcher.download(url, &temp_path).await {
            Ok(size) => {
                file.exists = true;
                file.size_bytes = size;
                file.relative_path = temp_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned());
                file.temp_path = Some(temp_path);
            }
            Err(err) => {
                log::warn!("remote download failed for {}: {}", url, err);
                // Probe succeeded, so the resource exists even though we
                // could not fetch it
                file.exists = true;
                file.error = Some(err.to_string());
                let _ = std::fs::remove_file(&temp_path);
            }
        }
        file
    }

    /// Delete downloaded temp files now instead of waiting for the drop.
    pub fn cleanup_temp_files(&self, files: &mut CollectedFiles) {
        files.cleanup();
    }

    /// Pure aggregation over a completed collection run.
    pub fn create_manifest(&self, files: &CollectedFiles) -> FileManifest {
        let mut manifest = FileManifest {
            file_count: files.len(),
            total_size: 0,
            local_count: 0,
            remote_count: 0,
            failed_count: 0,
            files: Vec::with_capacity(files.len()),
        };

        for file in files {
            match file.kind {
                FileKind::Local => manifest.local_count += 1,
                FileKind::Remote => manifest.remote_count += 1,
            }
            if file.is_success() {
                manifest.total_size += file.size_bytes;
            } else {
                manifest.failed_count += 1;
            }
            manifest.files.push(FileSummary {
                path: file.source.clone(),
                kind: file.kind,
                size_bytes: file.size_bytes,
                relative_path: file.relative_path.clone(),
                error: file.error.clone(),
            });
        }

        manifest
    }
}

fn is_url(value: &str) -> bool {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    match rest {
        Some(rest) => !rest.is_empty() && !rest.starts_with('/'),
        None => false,
    }
}

/// Lowercased extension of a URL's path component, ignoring query/fragment.
fn url_extension(url: &str) -> Option<String> {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    path_extension(&url[..end])
}

fn path_extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Content-based sniffing first, extension fallback for text formats infer
/// cannot identify from magic bytes.
fn detect_mime(path: &Path) -> String {
    if let Ok(Some(kind)) = infer::get_from_path(path) {
        return kind.mime_type().to_string();
    }
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(mime_for_extension)
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string())
}

fn mime_for_extension(ext: &str) -> Option<String> {
    let mime = match ext.to_ascii_lowercase().as_str() {
        "svg" => "image/svg+xml",
        "json" => mime::APPLICATION_JSON.as_ref(),
        "csv" => "text/csv",
        "txt" | "md" => mime::TEXT_PLAIN.as_ref(),
        "xml" => mime::TEXT_XML.as_ref(),
        "yaml" | "yml" => "application/yaml",
        _ => return None,
    };
    Some(mime.to_string())
}

/// MIME to temp-file extension for URLs whose path carries no extension.
fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    let ext = match mime_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "audio/mpeg" => "mp3",
        "application/pdf" => "pdf",
        "application/json" => "json",
        "application/zip" => "zip",
        "text/csv" => "csv",
        "text/plain" => "txt",
        _ => return None,
    };
    Some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::export::types::CategoryPayload;
    use indexmap::IndexMap;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockFetcher {
        meta: HashMap<String, RemoteMetadata>,
        failing_probes: HashSet<String>,
        failing_downloads: HashSet<String>,
        downloads: AtomicUsize,
        body: Vec<u8>,
    }

    impl MockFetcher {
        fn new() -> Self {
            Self {
                meta: HashMap::new(),
                failing_probes: HashSet::new(),
                failing_downloads: HashSet::new(),
                downloads: AtomicUsize::new(0),
                body: b"remote file body".to_vec(),
            }
        }

        fn with_file(mut self, url: &str, length: u64, content_type: &str) -> Self {
            self.meta.insert(
                url.to_string(),
                RemoteMetadata {
                    content_length: Some(length),
                    content_type: Some(content_type.to_string()),
                },
            );
            self
        }
    }

    #[async_trait]
    impl RemoteFetcher for MockFetcher {
        async fn probe(&self, url: &str) -> ServiceResult<RemoteMetadata> {
            if self.failing_probes.contains(url) {
                return Err(ServiceError::ExternalService("connection refused".into()));
            }
            Ok(self.meta.get(url).cloned().unwrap_or_default())
        }

        async fn download(&self, url: &str, dest: &Path) -> ServiceResult<u64> {
            if self.failing_downloads.contains(url) {
                return Err(ServiceError::ExternalService("timed out".into()));
            }
            self.downloads.fetch_add(1, Ordering::SeqCst);
            std::fs::write(dest, &self.body).map_err(DomainError::from)?;
            Ok(self.body.len() as u64)
        }
    }

    struct Fixture {
        service: FileCollectorService,
        fetcher: Arc<MockFetcher>,
        _temp: tempfile::TempDir,
        public_root: tempfile::TempDir,
        local_root: tempfile::TempDir,
    }

    fn fixture(fetcher: MockFetcher) -> Fixture {
        let temp = tempfile::tempdir().unwrap();
        let public_root = tempfile::tempdir().unwrap();
        let local_root = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(fetcher);

        let mut config = BackupConfig::default();
        config.temp_storage_path = temp.path().to_path_buf();

        let service = FileCollectorService::new(
            fetcher.clone(),
            vec![
                ("public".to_string(), public_root.path().to_path_buf()),
                ("local".to_string(), local_root.path().to_path_buf()),
            ],
            &config,
        );
        Fixture {
            service,
            fetcher,
            _temp: temp,
            public_root,
            local_root,
        }
    }

    fn payload_with_rows(rows: Vec<RowMap>) -> ExtractionResult {
        let mut data = IndexMap::new();
        data.insert("social_posts".to_string(), rows);
        let mut result = ExtractionResult::new();
        result.insert(
            "social_posts".to_string(),
            CategoryPayload {
                label: "Social Posts".to_string(),
                table_count: 1,
                record_count: data["social_posts"].len(),
                data,
            },
        );
        result
    }

    fn row(fields: &[(&str, serde_json::Value)]) -> RowMap {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn path_heuristic_requires_location_and_extension() {
        let fx = fixture(MockFetcher::new());
        let s = &fx.service;

        assert!(s.looks_like_file_path("https://cdn.example.com/a/b.png"));
        assert!(s.looks_like_file_path("https://cdn.example.com/a.png?v=12#top"));
        assert!(s.looks_like_file_path("/storage/uploads/video.mp4"));
        assert!(s.looks_like_file_path("storage/doc.pdf"));
        assert!(s.looks_like_file_path("uploads/archive.tar"));

        // URL without a recognized extension
        assert!(!s.looks_like_file_path("https://example.com/about"));
        // recognized extension without a location marker
        assert!(!s.looks_like_file_path("report.pdf"));
        // path without an extension
        assert!(!s.looks_like_file_path("/etc/passwd"));
        // arbitrary text
        assert!(!s.looks_like_file_path("the file storage/a.png is gone"));
        assert!(!s.looks_like_file_path("hello world"));
    }

    #[tokio::test]
    async fn duplicate_references_are_fetched_once() {
        let url = "https://cdn.example.com/banner.png";
        let fx = fixture(MockFetcher::new().with_file(url, 4096, "image/png"));

        let mut rows = Vec::new();
        for i in 0..50 {
            rows.push(row(&[
                ("id", json!(format!("{i}"))),
                ("image", json!(url)),
                // nested occurrences count as the same reference
                ("meta", json!({ "variants": [url, url] })),
            ]));
        }

        let progress_hits: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let hits = progress_hits.clone();
        let progress: FileProgressFn = Arc::new(move |path: &str, _size| {
            hits.lock().unwrap().push(path.to_string());
        });

        let collected = fx
            .service
            .collect_files(&payload_with_rows(rows), Some(&progress))
            .await
            .unwrap();

        assert_eq!(collected.len(), 1);
        assert_eq!(fx.fetcher.downloads.load(Ordering::SeqCst), 1);
        assert_eq!(progress_hits.lock().unwrap().len(), 1);

        let file = &collected.files()[0];
        assert_eq!(file.kind, FileKind::Remote);
        assert_eq!(file.category.as_deref(), Some("social_posts"));
        assert!(file.temp_path.as_ref().unwrap().exists());
    }

    #[tokio::test]
    async fn oversized_remote_file_is_flagged_and_never_downloaded() {
        let url = "https://cdn.example.com/huge.mp4";
        let limit = BackupConfig::default().max_remote_file_size_bytes;
        let fx = fixture(MockFetcher::new().with_file(url, limit + 1, "video/mp4"));

        let file = fx.service.collect_file(url).await;
        assert!(file.oversized);
        assert!(file.exists);
        assert!(file.temp_path.is_none());
        assert_eq!(file.size_bytes, limit + 1);
        assert_eq!(fx.fetcher.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn probe_failure_is_recorded_not_raised() {
        let good = "https://cdn.example.com/ok.png";
        let bad = "https://down.example.com/gone.png";
        let mut fetcher = MockFetcher::new().with_file(good, 10, "image/png");
        fetcher.failing_probes.insert(bad.to_string());
        let fx = fixture(fetcher);

        let rows = vec![row(&[("a", json!(good)), ("b", json!(bad))])];
        let collected = fx
            .service
            .collect_files(&payload_with_rows(rows), None)
            .await
            .unwrap();

        assert_eq!(collected.len(), 2);
        let bad_file = collected.iter().find(|f| f.source == bad).unwrap();
        assert!(!bad_file.exists);
        assert!(bad_file.error.is_some());
        let good_file = collected.iter().find(|f| f.source == good).unwrap();
        assert!(good_file.is_success());
    }

    #[tokio::test]
    async fn download_failure_keeps_exists_but_records_error() {
        let url = "https://cdn.example.com/flaky.png";
        let mut fetcher = MockFetcher::new().with_file(url, 10, "image/png");
        fetcher.failing_downloads.insert(url.to_string());
        let fx = fixture(fetcher);

        let file = fx.service.collect_file(url).await;
        assert!(file.exists);
        assert!(file.error.is_some());
        assert!(file.temp_path.is_none());
    }

    #[tokio::test]
    async fn local_lookup_probes_disks_in_order() {
        let fx = fixture(MockFetcher::new());
        std::fs::create_dir_all(fx.public_root.path().join("storage")).unwrap();
        std::fs::write(fx.public_root.path().join("storage/logo.png"), b"png").unwrap();
        std::fs::create_dir_all(fx.local_root.path().join("uploads")).unwrap();
        std::fs::write(fx.local_root.path().join("uploads/doc.pdf"), b"pdf").unwrap();

        let on_public = fx.service.collect_file("/storage/logo.png").await;
        assert!(on_public.exists);
        assert_eq!(on_public.disk.as_deref(), Some("public"));
        assert_eq!(on_public.relative_path.as_deref(), Some("storage/logo.png"));
        assert_eq!(on_public.size_bytes, 3);

        let on_local = fx.service.collect_file("uploads/doc.pdf").await;
        assert!(on_local.exists);
        assert_eq!(on_local.disk.as_deref(), Some("local"));
    }

    #[tokio::test]
    async fn local_miss_is_a_status_not_a_failure() {
        let fx = fixture(MockFetcher::new());
        let file = fx.service.collect_file("/storage/missing.png").await;
        assert!(!file.exists);
        assert!(file.error.is_some());
    }

    #[tokio::test]
    async fn manifest_aggregates_counts_and_sizes() {
        let good = "https://cdn.example.com/a.png";
        let bad = "https://down.example.com/b.png";
        let mut fetcher = MockFetcher::new().with_file(good, 16, "image/png");
        fetcher.failing_probes.insert(bad.to_string());
        let fx = fixture(fetcher);
        std::fs::create_dir_all(fx.public_root.path().join("storage")).unwrap();
        std::fs::write(fx.public_root.path().join("storage/c.png"), b"1234").unwrap();

        let rows = vec![row(&[
            ("a", json!(good)),
            ("b", json!(bad)),
            ("c", json!("/storage/c.png")),
        ])];
        let collected = fx
            .service
            .collect_files(&payload_with_rows(rows), None)
            .await
            .unwrap();
        let manifest = fx.service.create_manifest(&collected);

        assert_eq!(manifest.file_count, 3);
        assert_eq!(manifest.remote_count, 2);
        assert_eq!(manifest.local_count, 1);
        assert_eq!(manifest.failed_count, 1);
        assert_eq!(manifest.total_size, 16 + 4);
        assert_eq!(manifest.files.len(), 3);
    }

    #[test]
    fn mime_fallback_extension_mapping() {
        assert_eq!(extension_for_mime("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for_mime("application/pdf"), Some("pdf"));
        assert_eq!(extension_for_mime("application/x-proprietary"), None);
        assert_eq!(url_extension("https://x.com/a/b.PNG?v=1"), Some("png".into()));
        assert_eq!(url_extension("https://x.com/about"), None);
    }
}
