use chrono::{SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;
use zip::{write::FileOptions, ZipArchive, ZipWriter};

use crate::config::BackupConfig;
use crate::domains::export::types::ExtractionResult;
use crate::domains::files::CollectedFiles;
use crate::domains::packaging::checksum::{hash_file, hash_string};
use crate::errors::{DomainError, ServiceError, ServiceResult};

/// Archive format tag; restore tooling refuses anything else.
pub const BACKUP_FORMAT: &str = "cmis-backup";
const BACKUP_VERSION: &str = "1.0.0";
const MANIFEST_NAME: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySummary {
    pub label: String,
    pub table_count: usize,
    pub record_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStats {
    pub total: usize,
    pub added: usize,
    pub skipped: usize,
    pub total_size: u64,
}

/// Per-file entry in the manifest's file listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedFile {
    pub original_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<String>,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestSummary {
    pub categories: IndexMap<String, CategorySummary>,
    pub total_records: usize,
    pub total_tables: usize,
    pub files: FileStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationRef {
    pub id: Uuid,
}

/// Everything a restore needs to know about a package, embedded in the
/// archive as `manifest.json`. Organization details beyond the id are
/// intentionally absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub format: String,
    pub created_at: String,
    pub organization: OrganizationRef,
    pub summary: ManifestSummary,
    pub files: Vec<ArchivedFile>,
    pub checksums: IndexMap<String, String>,
    pub metadata: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageInfo {
    pub path: PathBuf,
    pub filename: String,
    pub size: u64,
    pub checksum: String,
    pub manifest: Manifest,
    pub file_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChecksumMismatch {
    pub file: String,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Serialize)]
pub struct ExtractOutcome {
    pub success: bool,
    pub manifest: Manifest,
    pub extracted_to: Option<PathBuf>,
    pub verification_errors: Vec<ChecksumMismatch>,
}

/// Builds and reads backup archives: category data as JSON, collected
/// files, and a manifest with per-entry SHA-256 checksums.
pub struct BackupPackagerService {
    temp_path: PathBuf,
}

impl BackupPackagerService {
    pub fn new(config: &BackupConfig) -> Self {
        Self {
            temp_path: config.temp_storage_path.clone(),
        }
    }

    /// Create a complete backup package for one organization.
    ///
    /// Failed or oversized collected files are listed in the manifest as
    /// skipped rather than silently dropped, so a restore can tell what
    /// is missing and why.
    pub fn create_package(
        &self,
        org_id: Uuid,
        data: &ExtractionResult,
        files: &CollectedFiles,
        metadata: IndexMap<String, Value>,
    ) -> ServiceResult<PackageInfo> {
        std::fs::create_dir_all(&self.temp_path).map_err(DomainError::from)?;

        let filename = format!("backup_{}_{}.zip", org_id, Uuid::new_v4());
        let path = self.temp_path.join(&filename);

        let out = std::fs::File::create(&path).map_err(DomainError::from)?;
        let mut zip = ZipWriter::new(out);
        let options =
            FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        let mut checksums: IndexMap<String, String> = IndexMap::new();

        for (category_key, payload) in data {
            let json = serde_json::to_string_pretty(&payload.data)
                .map_err(DomainError::from)?;
            let entry = format!("data/{}.json", category_key);
            zip.start_file(entry.as_str(), options)
                .map_err(|e| ServiceError::Packaging(e.to_string()))?;
            zip.write_all(json.as_bytes()).map_err(DomainError::from)?;
            checksums.insert(entry, hash_string(&json));
        }

        let archived = self.add_files(&mut zip, files, options, &mut checksums)?;

        let manifest = build_manifest(org_id, data, archived, metadata, checksums);
        let manifest_json =
            serde_json::to_string_pretty(&manifest).map_err(DomainError::from)?;
        zip.start_file(MANIFEST_NAME, options)
            .map_err(|e| ServiceError::Packaging(e.to_string()))?;
        zip.write_all(manifest_json.as_bytes())
            .map_err(DomainError::from)?;
        zip.finish()
            .map_err(|e| ServiceError::Packaging(e.to_string()))?;

        let size = std::fs::metadata(&path).map_err(DomainError::from)?.len();
        let checksum = hash_file(&path)?;
        let file_count = manifest.checksums.len();

        log::info!(
            "created backup package {} ({} bytes, {} entries)",
            filename,
            size,
            file_count
        );

        Ok(PackageInfo {
            path,
            filename,
            size,
            checksum,
            manifest,
            file_count,
        })
    }

    fn add_files(
        &self,
        zip: &mut ZipWriter<std::fs::File>,
        files: &CollectedFiles,
        options: FileOptions,
        checksums: &mut IndexMap<String, String>,
    ) -> ServiceResult<Vec<ArchivedFile>> {
        let mut archived = Vec::with_capacity(files.len());

        for file in files {
            if !file.is_success() {
                archived.push(ArchivedFile {
                    original_path: file.source.clone(),
                    archive_path: None,
                    size: file.size_bytes,
                    mime_type: file.mime_type.clone(),
                    status: "skipped".to_string(),
                    error: file
                        .error
                        .clone()
                        .or_else(|| Some("source file unavailable".to_string())),
                });
                continue;
            }

            let source = file.temp_path.as_ref().or(file.resolved_path.as_ref());
            let Some(source) = source.filter(|p| p.exists()) else {
                archived.push(ArchivedFile {
                    original_path: file.source.clone(),
                    archive_path: None,
                    size: file.size_bytes,
                    mime_type: file.mime_type.clone(),
                    status: "skipped".to_string(),
                    error: Some("source file not found".to_string()),
                });
                continue;
            };

            let relative = file
                .relative_path
                .clone()
                .or_else(|| {
                    source
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                })
                .unwrap_or_else(|| file.source.clone());
            let entry = format!("files/{}", relative);

            zip.start_file(entry.as_str(), options)
                .map_err(|e| ServiceError::Packaging(e.to_string()))?;
            let mut input = std::fs::File::open(source).map_err(DomainError::from)?;
            std::io::copy(&mut input, zip).map_err(DomainError::from)?;
            checksums.insert(entry.clone(), hash_file(source)?);

            archived.push(ArchivedFile {
                original_path: file.source.clone(),
                archive_path: Some(entry),
                size: file.size_bytes,
                mime_type: file.mime_type.clone(),
                status: "added".to_string(),
                error: None,
            });
        }

        Ok(archived)
    }

    /// Read a package's manifest without extracting anything.
    pub fn get_package_info(&self, package_path: &Path) -> ServiceResult<PackageInfo> {
        let file = std::fs::File::open(package_path).map_err(DomainError::from)?;
        let mut archive =
            ZipArchive::new(file).map_err(|e| ServiceError::Packaging(e.to_string()))?;
        let entry_count = archive.len();
        let manifest = read_manifest(&mut archive)?;

        Ok(PackageInfo {
            path: package_path.to_path_buf(),
            filename: package_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: std::fs::metadata(package_path)
                .map_err(DomainError::from)?
                .len(),
            checksum: hash_file(package_path)?,
            manifest,
            file_count: entry_count,
        })
    }

    /// Validate a package and optionally extract it, verifying every
    /// manifest checksum against the extracted bytes.
    pub fn extract_package(
        &self,
        package_path: &Path,
        extract_to: Option<&Path>,
    ) -> ServiceResult<ExtractOutcome> {
        let file = std::fs::File::open(package_path).map_err(DomainError::from)?;
        let mut archive =
            ZipArchive::new(file).map_err(|e| ServiceError::Packaging(e.to_string()))?;
        let manifest = read_manifest(&mut archive)?;

        if manifest.format != BACKUP_FORMAT {
            return Err(ServiceError::Packaging(format!(
                "invalid backup format: expected '{}', got '{}'",
                BACKUP_FORMAT, manifest.format
            )));
        }

        let mut verification_errors = Vec::new();
        if let Some(dest) = extract_to {
            std::fs::create_dir_all(dest).map_err(DomainError::from)?;
            archive
                .extract(dest)
                .map_err(|e| ServiceError::Packaging(e.to_string()))?;

            for (entry, expected) in &manifest.checksums {
                let extracted = dest.join(entry);
                if !extracted.exists() {
                    continue;
                }
                let actual = hash_file(&extracted)?;
                if &actual != expected {
                    verification_errors.push(ChecksumMismatch {
                        file: entry.clone(),
                        expected: expected.clone(),
                        actual,
                    });
                }
            }
        }

        Ok(ExtractOutcome {
            success: verification_errors.is_empty(),
            manifest,
            extracted_to: extract_to.map(Path::to_path_buf),
            verification_errors,
        })
    }

    /// Delete packages in temp storage older than the given age. Returns
    /// how many were removed.
    pub fn cleanup_temp_packages(&self, older_than: Duration) -> ServiceResult<usize> {
        let entries = match std::fs::read_dir(&self.temp_path) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(DomainError::from(err).into()),
        };

        let mut cleaned = 0;
        for entry in entries {
            let entry = entry.map_err(DomainError::from)?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("zip") {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .map_err(DomainError::from)?;
            let age = modified.elapsed().unwrap_or_default();
            if age >= older_than {
                std::fs::remove_file(&path).map_err(DomainError::from)?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            log::info!("cleaned {} expired backup packages", cleaned);
        }
        Ok(cleaned)
    }
}

fn read_manifest(archive: &mut ZipArchive<std::fs::File>) -> ServiceResult<Manifest> {
    let entry = archive.by_name(MANIFEST_NAME).map_err(|_| {
        ServiceError::Packaging(format!("invalid backup package: {} not found", MANIFEST_NAME))
    })?;
    serde_json::from_reader(entry)
        .map_err(|e| ServiceError::Packaging(format!("invalid {}: {}", MANIFEST_NAME, e)))
}

fn build_manifest(
    org_id: Uuid,
    data: &ExtractionResult,
    files: Vec<ArchivedFile>,
    mut metadata: IndexMap<String, Value>,
    checksums: IndexMap<String, String>,
) -> Manifest {
    let mut categories = IndexMap::new();
    let mut total_records = 0;
    let mut total_tables = 0;
    for (key, payload) in data {
        total_records += payload.record_count;
        total_tables += payload.table_count;
        categories.insert(
            key.clone(),
            CategorySummary {
                label: payload.label.clone(),
                table_count: payload.table_count,
                record_count: payload.record_count,
            },
        );
    }

    let added: Vec<&ArchivedFile> = files.iter().filter(|f| f.status == "added").collect();
    let file_stats = FileStats {
        total: files.len(),
        added: added.len(),
        skipped: files.len() - added.len(),
        total_size: added.iter().map(|f| f.size).sum(),
    };

    metadata.insert("generator".into(), Value::String("CMIS Backup System".into()));
    metadata.insert(
        "generator_version".into(),
        Value::String(BACKUP_VERSION.into()),
    );

    Manifest {
        version: BACKUP_VERSION.to_string(),
        format: BACKUP_FORMAT.to_string(),
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        organization: OrganizationRef { id: org_id },
        summary: ManifestSummary {
            categories,
            total_records,
            total_tables,
            files: file_stats,
        },
        files,
        checksums,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::export::types::{CategoryPayload, RowMap};
    use crate::domains::files::{CollectedFile, FileKind};
    use serde_json::json;
    use std::io::Read;

    fn sample_data() -> ExtractionResult {
        let mut row = RowMap::new();
        row.insert("id".into(), json!("c1"));
        row.insert("name".into(), json!("حملة الصيف"));

        let mut tables = IndexMap::new();
        tables.insert("campaigns".to_string(), vec![row]);

        let mut result = ExtractionResult::new();
        result.insert(
            "campaigns".to_string(),
            CategoryPayload {
                label: "Campaigns".to_string(),
                data: tables,
                table_count: 1,
                record_count: 1,
            },
        );
        result
    }

    fn collected_files(dir: &Path) -> CollectedFiles {
        let asset = dir.join("logo.png");
        std::fs::write(&asset, b"png bytes").unwrap();

        let mut ok = CollectedFile::new("storage/logo.png", FileKind::Local);
        ok.exists = true;
        ok.size_bytes = 9;
        ok.relative_path = Some("storage/logo.png".to_string());
        ok.resolved_path = Some(asset);
        ok.mime_type = Some("image/png".to_string());

        let mut failed = CollectedFile::new("https://down.example.com/x.png", FileKind::Remote);
        failed.error = Some("connection refused".to_string());

        CollectedFiles::new(vec![ok, failed])
    }

    struct Fixture {
        service: BackupPackagerService,
        temp: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let temp = tempfile::tempdir().unwrap();
        let mut config = BackupConfig::default();
        config.temp_storage_path = temp.path().to_path_buf();
        Fixture {
            service: BackupPackagerService::new(&config),
            temp,
        }
    }

    #[test]
    fn package_contains_data_files_and_manifest() {
        let fx = fixture();
        let org = Uuid::new_v4();
        let files = collected_files(fx.temp.path());

        let info = fx
            .service
            .create_package(org, &sample_data(), &files, IndexMap::new())
            .unwrap();

        assert!(info.path.exists());
        assert!(info.filename.starts_with(&format!("backup_{}", org)));
        assert_eq!(info.checksum, hash_file(&info.path).unwrap());

        let mut archive =
            ZipArchive::new(std::fs::File::open(&info.path).unwrap()).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.contains(&"data/campaigns.json".to_string()));
        assert!(names.contains(&"files/storage/logo.png".to_string()));
        assert!(names.contains(&MANIFEST_NAME.to_string()));

        // category JSON keeps unicode readable
        let mut json = String::new();
        archive
            .by_name("data/campaigns.json")
            .unwrap()
            .read_to_string(&mut json)
            .unwrap();
        assert!(json.contains("حملة الصيف"));
    }

    #[test]
    fn manifest_reports_skipped_files_with_reasons() {
        let fx = fixture();
        let files = collected_files(fx.temp.path());
        let info = fx
            .service
            .create_package(Uuid::new_v4(), &sample_data(), &files, IndexMap::new())
            .unwrap();

        let manifest = &info.manifest;
        assert_eq!(manifest.format, BACKUP_FORMAT);
        assert_eq!(manifest.summary.total_records, 1);
        assert_eq!(manifest.summary.files.added, 1);
        assert_eq!(manifest.summary.files.skipped, 1);

        let skipped = manifest
            .files
            .iter()
            .find(|f| f.status == "skipped")
            .unwrap();
        assert_eq!(skipped.original_path, "https://down.example.com/x.png");
        assert!(skipped.error.is_some());

        // checksums cover the data file and the added asset
        assert!(manifest.checksums.contains_key("data/campaigns.json"));
        assert!(manifest.checksums.contains_key("files/storage/logo.png"));
    }

    #[test]
    fn extract_round_trip_verifies_checksums() {
        let fx = fixture();
        let files = collected_files(fx.temp.path());
        let info = fx
            .service
            .create_package(Uuid::new_v4(), &sample_data(), &files, IndexMap::new())
            .unwrap();

        let dest = fx.temp.path().join("extracted");
        let outcome = fx
            .service
            .extract_package(&info.path, Some(&dest))
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.verification_errors.is_empty());
        assert!(dest.join("data/campaigns.json").exists());
        assert!(dest.join("files/storage/logo.png").exists());
    }

    #[test]
    fn tampered_entry_fails_checksum_verification() {
        let fx = fixture();
        let files = collected_files(fx.temp.path());
        let info = fx
            .service
            .create_package(Uuid::new_v4(), &sample_data(), &files, IndexMap::new())
            .unwrap();

        // rebuild the archive with the same manifest but altered data
        let mut manifest = info.manifest.clone();
        let tampered = fx.temp.path().join("tampered.zip");
        let mut zip = ZipWriter::new(std::fs::File::create(&tampered).unwrap());
        let options = FileOptions::default();
        zip.start_file("data/campaigns.json", options).unwrap();
        zip.write_all(b"{}").unwrap();
        manifest.checksums.retain(|k, _| k == "data/campaigns.json");
        zip.start_file(MANIFEST_NAME, options).unwrap();
        zip.write_all(serde_json::to_string(&manifest).unwrap().as_bytes())
            .unwrap();
        zip.finish().unwrap();

        let dest = fx.temp.path().join("tampered-extract");
        let outcome = fx
            .service
            .extract_package(&tampered, Some(&dest))
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.verification_errors.len(), 1);
        assert_eq!(outcome.verification_errors[0].file, "data/campaigns.json");
    }

    #[test]
    fn archive_without_manifest_is_rejected() {
        let fx = fixture();
        let path = fx.temp.path().join("bogus.zip");
        let mut zip = ZipWriter::new(std::fs::File::create(&path).unwrap());
        zip.start_file("readme.txt", FileOptions::default()).unwrap();
        zip.write_all(b"not a backup").unwrap();
        zip.finish().unwrap();

        let err = fx.service.extract_package(&path, None).unwrap_err();
        assert!(matches!(err, ServiceError::Packaging(_)));
    }

    #[test]
    fn package_info_reads_manifest_without_extracting() {
        let fx = fixture();
        let files = collected_files(fx.temp.path());
        let created = fx
            .service
            .create_package(Uuid::new_v4(), &sample_data(), &files, IndexMap::new())
            .unwrap();

        let info = fx.service.get_package_info(&created.path).unwrap();
        assert_eq!(info.manifest.format, BACKUP_FORMAT);
        assert_eq!(info.size, created.size);
        assert!(info.file_count >= 3);
    }

    #[test]
    fn cleanup_removes_only_expired_packages() {
        let fx = fixture();
        let package = fx.temp.path().join("backup_old.zip");
        std::fs::write(&package, b"zip").unwrap();
        let keeper = fx.temp.path().join("notes.txt");
        std::fs::write(&keeper, b"txt").unwrap();

        // nothing is older than an hour yet
        assert_eq!(
            fx.service
                .cleanup_temp_packages(Duration::from_secs(3600))
                .unwrap(),
            0
        );
        // zero age threshold expires every package, but not other files
        assert_eq!(
            fx.service
                .cleanup_temp_packages(Duration::from_secs(0))
                .unwrap(),
            1
        );
        assert!(!package.exists());
        assert!(keeper.exists());
    }

    #[test]
    fn cleanup_of_missing_temp_dir_is_a_noop() {
        let mut config = BackupConfig::default();
        config.temp_storage_path = PathBuf::from("/nonexistent/cmis-backups");
        let service = BackupPackagerService::new(&config);
        assert_eq!(
            service.cleanup_temp_packages(Duration::from_secs(0)).unwrap(),
            0
        );
    }
}
