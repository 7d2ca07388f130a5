//! Document uploads stored on local disk under the tenant's directory.

use serde::Serialize;
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "csv", "xlsx", "docx", "txt"];

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Unknown document type '{0}'")]
    UnknownSlot(String),

    #[error("{resource} does not accept {slot} documents")]
    SlotNotAllowed { resource: String, slot: String },

    #[error("Multipart field 'file' is required")]
    MissingFile,

    #[error("File type '{0}' is not allowed")]
    ExtensionNotAllowed(String),

    #[error("File name is missing or invalid")]
    InvalidFileName,

    #[error("File is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("No {0} document has been uploaded")]
    NoFile(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Each document kind owns exactly one path column on the resources that accept it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentSlot {
    BillOfLading,
    Manifest,
    CertificateOfRecycling,
    CertificateOfDestruction,
    BackgroundCheck,
    Insurance,
    Certification,
    ComplianceFile,
    Attachment,
}

impl DocumentSlot {
    pub const ALL: [DocumentSlot; 9] = [
        DocumentSlot::BillOfLading,
        DocumentSlot::Manifest,
        DocumentSlot::CertificateOfRecycling,
        DocumentSlot::CertificateOfDestruction,
        DocumentSlot::BackgroundCheck,
        DocumentSlot::Insurance,
        DocumentSlot::Certification,
        DocumentSlot::ComplianceFile,
        DocumentSlot::Attachment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentSlot::BillOfLading => "bill-of-lading",
            DocumentSlot::Manifest => "manifest",
            DocumentSlot::CertificateOfRecycling => "certificate-of-recycling",
            DocumentSlot::CertificateOfDestruction => "certificate-of-destruction",
            DocumentSlot::BackgroundCheck => "background-check",
            DocumentSlot::Insurance => "insurance",
            DocumentSlot::Certification => "certification",
            DocumentSlot::ComplianceFile => "compliance-file",
            DocumentSlot::Attachment => "attachment",
        }
    }

    /// Column holding the stored relative path
    pub fn column(&self) -> &'static str {
        match self {
            DocumentSlot::BillOfLading => "bill_of_lading_path",
            DocumentSlot::Manifest => "manifest_path",
            DocumentSlot::CertificateOfRecycling => "certificate_of_recycling_path",
            DocumentSlot::CertificateOfDestruction => "certificate_of_destruction_path",
            DocumentSlot::BackgroundCheck => "background_check_path",
            DocumentSlot::Insurance => "insurance_path",
            DocumentSlot::Certification => "certification_path",
            DocumentSlot::ComplianceFile => "file_path",
            DocumentSlot::Attachment => "attachment_path",
        }
    }
}

impl fmt::Display for DocumentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentSlot {
    type Err = UploadError;

    /// Accepts `bill-of-lading`, `bill_of_lading` and `BillOfLading`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        DocumentSlot::ALL
            .into_iter()
            .find(|slot| slot.as_str().replace('-', "") == compact)
            .ok_or_else(|| UploadError::UnknownSlot(s.to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    /// Path relative to the upload root, always `/`-separated
    pub path: String,
    pub file_name: String,
    pub size: usize,
}

/// Where a file lands: `{client_id}/{resource}/{record_id}/{slot}-{uuid}-{name}`
#[derive(Debug, Clone)]
pub struct UploadTarget<'a> {
    pub client_id: &'a str,
    pub resource: &'a str,
    pub record_id: Uuid,
    pub slot: DocumentSlot,
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
    max_bytes: usize,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self { root: root.into(), max_bytes }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Check name, extension and size before anything touches disk
    pub fn validate(&self, file_name: &str, size: usize) -> Result<String, UploadError> {
        let name = sanitize_file_name(file_name).ok_or(UploadError::InvalidFileName)?;
        let extension = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(UploadError::ExtensionNotAllowed(extension));
        }
        if size == 0 {
            return Err(UploadError::MissingFile);
        }
        if size > self.max_bytes {
            return Err(UploadError::TooLarge { size, limit: self.max_bytes });
        }
        Ok(name)
    }

    pub async fn save(&self, target: &UploadTarget<'_>, file_name: &str, bytes: &[u8]) -> Result<StoredFile, UploadError> {
        let name = self.validate(file_name, bytes.len())?;
        if !is_safe_segment(target.client_id) || !is_safe_segment(target.resource) {
            return Err(UploadError::InvalidFileName);
        }

        let relative = format!(
            "{}/{}/{}/{}-{}-{}",
            target.client_id,
            target.resource,
            target.record_id,
            target.slot.as_str(),
            Uuid::new_v4().simple(),
            name
        );
        let full = self.resolve(&relative)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;

        tracing::info!(
            client_id = %target.client_id,
            resource = %target.resource,
            record_id = %target.record_id,
            slot = %target.slot,
            size = bytes.len(),
            "Stored uploaded document"
        );

        Ok(StoredFile { path: relative, file_name: name, size: bytes.len() })
    }

    pub async fn read(&self, relative: &str) -> Result<Vec<u8>, UploadError> {
        let full = self.resolve(relative)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(UploadError::NoFile(relative.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns false when the file was already gone
    pub async fn remove(&self, relative: &str) -> Result<bool, UploadError> {
        let full = self.resolve(relative)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %relative, "Stored document already missing");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a file the record no longer points at. Failures leave an
    /// orphan on disk and are logged, never returned.
    pub async fn discard(&self, relative: &str) -> bool {
        match self.remove(relative).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(path = %relative, error = %e, "Could not remove superseded document");
                false
            }
        }
    }

    /// Join a stored relative path onto the root, refusing anything that
    /// could escape it
    fn resolve(&self, relative: &str) -> Result<PathBuf, UploadError> {
        let path = Path::new(relative);
        if relative.is_empty() || !path.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(UploadError::InvalidFileName);
        }
        Ok(self.root.join(path))
    }
}

/// Keep the final path segment and replace anything outside `[A-Za-z0-9._-]`
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() || cleaned.len() > 200 {
        None
    } else {
        Some(cleaned)
    }
}

/// Client-facing name of a stored file: the last segment without the
/// `{slot}-{uuid}-` prefix added by [`UploadStore::save`]
pub fn original_name(slot: DocumentSlot, relative: &str) -> String {
    let last = relative.rsplit('/').next().unwrap_or(relative);
    last.strip_prefix(slot.as_str())
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|rest| rest.split_once('-'))
        .map(|(_, name)| name)
        .filter(|name| !name.is_empty())
        .unwrap_or(last)
        .to_string()
}

fn is_safe_segment(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
}

pub fn content_type(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "csv" => "text/csv",
        "txt" => "text/plain",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_parse_in_any_casing() {
        assert_eq!("bill-of-lading".parse::<DocumentSlot>().unwrap(), DocumentSlot::BillOfLading);
        assert_eq!("Bill_Of_Lading".parse::<DocumentSlot>().unwrap(), DocumentSlot::BillOfLading);
        assert_eq!("CertificateOfDestruction".parse::<DocumentSlot>().unwrap(), DocumentSlot::CertificateOfDestruction);
        assert!(matches!("invoice".parse::<DocumentSlot>(), Err(UploadError::UnknownSlot(_))));
    }

    #[test]
    fn every_slot_round_trips_through_its_name() {
        for slot in DocumentSlot::ALL {
            assert_eq!(slot.as_str().parse::<DocumentSlot>().unwrap(), slot);
        }
    }

    #[test]
    fn original_name_strips_storage_prefix() {
        let path = "ACME/assets/0e7c/certificate-of-destruction-3f2a9c0b1d4e4f6a8b7c6d5e4f3a2b1c-cod-2024.pdf";
        assert_eq!(original_name(DocumentSlot::CertificateOfDestruction, path), "cod-2024.pdf");
        assert_eq!(original_name(DocumentSlot::Manifest, "legacy.pdf"), "legacy.pdf");
    }

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_file_name("C:\\docs\\My BOL (1).pdf").as_deref(), Some("My_BOL__1_.pdf"));
        assert_eq!(sanitize_file_name("..."), None);
        assert_eq!(sanitize_file_name(""), None);
    }

    #[test]
    fn validate_checks_extension_and_size() {
        let store = UploadStore::new("/tmp/unused", 10);
        assert_eq!(store.validate("scan.PDF", 5).unwrap(), "scan.PDF");
        assert!(matches!(store.validate("run.exe", 5), Err(UploadError::ExtensionNotAllowed(_))));
        assert!(matches!(store.validate("scan.pdf", 11), Err(UploadError::TooLarge { .. })));
        assert!(matches!(store.validate("scan.pdf", 0), Err(UploadError::MissingFile)));
    }

    #[tokio::test]
    async fn save_read_remove_under_tenant_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path(), 1024);
        let target = UploadTarget {
            client_id: "ACME",
            resource: "shipments",
            record_id: Uuid::nil(),
            slot: DocumentSlot::Manifest,
        };

        let stored = store.save(&target, "manifest.csv", b"a,b\n1,2\n").await.unwrap();
        assert!(stored.path.starts_with("ACME/shipments/00000000-0000-0000-0000-000000000000/manifest-"));
        assert!(stored.path.ends_with("-manifest.csv"));
        assert!(dir.path().join(&stored.path).exists());

        assert_eq!(store.read(&stored.path).await.unwrap(), b"a,b\n1,2\n");
        assert!(store.remove(&stored.path).await.unwrap());
        assert!(!store.remove(&stored.path).await.unwrap());
        assert!(matches!(store.read(&stored.path).await, Err(UploadError::NoFile(_))));
    }

    #[tokio::test]
    async fn discard_swallows_storage_failures() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path(), 1024);
        std::fs::create_dir_all(dir.path().join("ACME/assets/locked")).unwrap();

        // A directory cannot be unlinked as a file
        assert!(!store.discard("ACME/assets/locked").await);
        assert!(dir.path().join("ACME/assets/locked").exists());
        assert!(!store.discard("../outside.pdf").await);
        assert!(!store.discard("ACME/assets/missing.pdf").await);

        std::fs::write(dir.path().join("ACME/assets/old.pdf"), b"%PDF").unwrap();
        assert!(store.discard("ACME/assets/old.pdf").await);
    }

    #[tokio::test]
    async fn refuses_paths_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path(), 1024);
        assert!(matches!(store.read("../secret.txt").await, Err(UploadError::InvalidFileName)));
        assert!(matches!(store.read("/etc/passwd").await, Err(UploadError::InvalidFileName)));
    }
}
