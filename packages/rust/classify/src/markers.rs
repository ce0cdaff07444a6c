//! Byte markers that betray an embedded VBA project.
//!
//! This is a presence check, not a VBA parser: it looks for the structural
//! names Office writes whenever a document carries a macro project.

use crate::ContainerFormat;

/// Stream name of the VBA project inside an OLE compound file.
/// Directory entries store names as UTF-16LE.
pub const OLE_VBA_STREAM: &str = "_VBA_PROJECT";

/// Part name of the VBA project inside an OOXML package.
/// ZIP local headers store names verbatim.
pub const OOXML_VBA_PART: &str = "vbaProject.bin";

/// A pre-encoded needle searched for in a given container format.
#[derive(Debug, Clone)]
pub struct MacroMarker {
    pub format: ContainerFormat,
    pub needle: Vec<u8>,
}

impl MacroMarker {
    /// Markers for every supported container.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self {
                format: ContainerFormat::CompoundFile,
                needle: utf16le(OLE_VBA_STREAM),
            },
            Self {
                format: ContainerFormat::OfficeOpenXml,
                needle: OOXML_VBA_PART.as_bytes().to_vec(),
            },
        ]
    }

    pub fn found_in(&self, bytes: &[u8]) -> bool {
        contains(bytes, &self.needle)
    }
}

pub(crate) fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16le_encoding() {
        assert_eq!(utf16le("VB"), vec![b'V', 0, b'B', 0]);
    }

    #[test]
    fn contains_edge_cases() {
        assert!(contains(b"abcdef", b"cde"));
        assert!(!contains(b"abc", b"abcd"));
        assert!(!contains(b"abc", b""));
    }

    #[test]
    fn default_markers_cover_both_formats() {
        let markers = MacroMarker::defaults();
        assert!(markers.iter().any(|m| m.format == ContainerFormat::CompoundFile));
        assert!(markers.iter().any(|m| m.format == ContainerFormat::OfficeOpenXml));
    }
}
