//! Default classifier: offset-0 signatures plus VBA project markers.

use tracing::trace;

use crate::markers::MacroMarker;
use crate::{Classification, DocumentClassifier, detect_container};

/// Classifies payloads without parsing them.
pub struct SignatureClassifier {
    markers: Vec<MacroMarker>,
}

impl SignatureClassifier {
    pub fn new() -> Self {
        Self {
            markers: MacroMarker::defaults(),
        }
    }
}

impl Default for SignatureClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentClassifier for SignatureClassifier {
    fn classify(&self, bytes: &[u8]) -> Classification {
        Classification::from_format(detect_container(bytes))
    }

    fn has_macro(&self, bytes: &[u8]) -> bool {
        let Some(format) = detect_container(bytes) else {
            return false;
        };

        let found = self
            .markers
            .iter()
            .filter(|m| m.format == format)
            .any(|m| m.found_in(bytes));

        trace!(?format, found, len = bytes.len(), "macro marker scan");
        found
    }

    fn name(&self) -> &str {
        "signature"
    }
}
