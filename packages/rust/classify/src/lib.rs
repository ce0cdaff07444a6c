//! Document container and macro classification.
//!
//! This crate provides:
//! - [`DocumentClassifier`]: the capability the harvest pipeline consumes
//! - [`ContainerFormat`] / [`detect_container`]: offset-0 signature matching
//! - [`SignatureClassifier`]: default classifier (signatures + VBA project markers)

mod markers;
mod signature;

use serde::Serialize;

pub use markers::{MacroMarker, OLE_VBA_STREAM, OOXML_VBA_PART};
pub use signature::SignatureClassifier;

// ---------------------------------------------------------------------------
// Container formats
// ---------------------------------------------------------------------------

/// Recognized document containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerFormat {
    /// Legacy OLE2 compound file (`.doc`, `.xls`, `.ppt`, …).
    CompoundFile,
    /// ZIP-based Office Open XML (`.docm`, `.xlsm`, `.pptm`, …).
    OfficeOpenXml,
}

impl ContainerFormat {
    /// Magic bytes expected at offset 0.
    pub const fn signature(self) -> &'static [u8] {
        match self {
            Self::CompoundFile => &[0xD0, 0xCF, 0x11, 0xE0],
            Self::OfficeOpenXml => &[0x50, 0x4B, 0x03, 0x04],
        }
    }

    pub const ALL: [ContainerFormat; 2] = [Self::CompoundFile, Self::OfficeOpenXml];
}

/// Match `bytes` against every known container signature at offset 0.
pub fn detect_container(bytes: &[u8]) -> Option<ContainerFormat> {
    ContainerFormat::ALL
        .into_iter()
        .find(|format| bytes.starts_with(format.signature()))
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Result of container classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub is_container: bool,
    pub format: Option<ContainerFormat>,
}

impl Classification {
    pub fn from_format(format: Option<ContainerFormat>) -> Self {
        Self {
            is_container: format.is_some(),
            format,
        }
    }
}

/// Inspects raw payload bytes.
///
/// Both methods must be pure functions of the bytes: the pipeline calls
/// them from many workers at once.
pub trait DocumentClassifier: Send + Sync {
    /// Is this a recognized document container?
    fn classify(&self, bytes: &[u8]) -> Classification;

    /// Does the payload carry an embedded macro?
    fn has_macro(&self, bytes: &[u8]) -> bool;

    /// Human-readable classifier name for tracing.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_file_signature() {
        let bytes = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
        assert_eq!(detect_container(&bytes), Some(ContainerFormat::CompoundFile));
    }

    #[test]
    fn zip_signature() {
        let bytes = b"PK\x03\x04\x14\x00\x06\x00";
        assert_eq!(detect_container(bytes), Some(ContainerFormat::OfficeOpenXml));
    }

    #[test]
    fn other_prefixes_are_not_containers() {
        for bytes in [
            b"%PDF-1.7".as_slice(),
            b"<html><body>".as_slice(),
            b"PK\x05\x06".as_slice(),
            b"\xD0\xCF\x11".as_slice(),
            b"".as_slice(),
        ] {
            assert_eq!(detect_container(bytes), None, "{bytes:?}");
        }
    }

    #[test]
    fn signature_must_be_at_offset_zero() {
        let mut bytes = b"junk".to_vec();
        bytes.extend_from_slice(ContainerFormat::CompoundFile.signature());
        assert_eq!(detect_container(&bytes), None);
    }

    #[test]
    fn classification_from_format() {
        let c = Classification::from_format(Some(ContainerFormat::OfficeOpenXml));
        assert!(c.is_container);
        let c = Classification::from_format(None);
        assert!(!c.is_container);
        assert!(c.format.is_none());
    }

    #[test]
    fn format_serializes_snake_case() {
        let json = serde_json::to_string(&ContainerFormat::CompoundFile).unwrap();
        assert_eq!(json, "\"compound_file\"");
    }
}
