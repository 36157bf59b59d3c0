use std::path::Path;

use serde::{Deserialize, Serialize};

use super::enums::{ScanLabel, ScanStatus};

/// A CT image selected for classification.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanImage {
    pub file_name: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for ScanImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanImage")
            .field("file_name", &self.file_name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl ScanImage {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "scan.png".to_string());
        Ok(Self { file_name, bytes })
    }

    /// MIME type for the multipart upload, guessed from the file name.
    pub fn mime_type(&self) -> String {
        mime_guess::from_path(&self.file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }

    /// Reference used to identify the scan in ledger entries and logs.
    pub fn scan_ref(&self) -> &str {
        &self.file_name
    }
}

/// A selected image and what has happened to it in this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanClassificationRecord {
    pub image: ScanImage,
    pub label: Option<ScanLabel>,
    pub status: ScanStatus,
}

impl ScanClassificationRecord {
    pub fn new(image: ScanImage) -> Self {
        Self {
            image,
            label: None,
            status: ScanStatus::Unset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_type_from_extension() {
        assert_eq!(ScanImage::new("brain.png", vec![]).mime_type(), "image/png");
        assert_eq!(ScanImage::new("brain.jpg", vec![]).mime_type(), "image/jpeg");
        assert_eq!(
            ScanImage::new("brain", vec![]).mime_type(),
            "application/octet-stream"
        );
    }

    #[test]
    fn from_path_reads_bytes_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ct_042.png");
        std::fs::write(&path, b"fake png").unwrap();

        let image = ScanImage::from_path(&path).unwrap();
        assert_eq!(image.file_name, "ct_042.png");
        assert_eq!(image.bytes, b"fake png");
    }

    #[test]
    fn debug_hides_image_bytes() {
        let image = ScanImage::new("ct.png", vec![0u8; 4096]);
        let debug = format!("{image:?}");
        assert!(debug.contains("4096"));
        assert!(!debug.contains("0, 0"));
    }

    #[test]
    fn new_record_is_unset() {
        let record = ScanClassificationRecord::new(ScanImage::new("ct.png", vec![1]));
        assert_eq!(record.status, ScanStatus::Unset);
        assert!(record.label.is_none());
    }
}
