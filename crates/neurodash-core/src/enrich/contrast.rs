//! Rule-based contrast detection.

/// Procedure substrings that indicate a contrast study.
pub const PROCEDURE_CONTRAST_MARKERS: [&str; 3] = ["+c", "contrast", "post gad"];

/// Narrative substrings that indicate contrast was given.
pub const NARRATIVE_CONTRAST_MARKERS: [&str; 4] = ["post gad", "mr+c", "+ gd", "post gadolinium"];

/// Whether a study used contrast, by case-insensitive substring match on the
/// procedure name and narrative.
pub fn uses_contrast(procedure: &str, narrative: &str) -> bool {
    let procedure = procedure.to_lowercase();
    let narrative = narrative.to_lowercase();
    PROCEDURE_CONTRAST_MARKERS
        .iter()
        .any(|m| procedure.contains(m))
        || NARRATIVE_CONTRAST_MARKERS
            .iter()
            .any(|m| narrative.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_procedure_markers() {
        assert!(uses_contrast("MRI Head +C", ""));
        assert!(uses_contrast("CT Angiogram with Contrast", ""));
        assert!(uses_contrast("MR Spine POST GAD", ""));
        assert!(!uses_contrast("MRI Head", ""));
    }

    #[test]
    fn test_narrative_markers() {
        assert!(uses_contrast("MRI Head", "Sequences: T1 post gadolinium."));
        assert!(uses_contrast("MRI Head", "MR+C brain"));
        assert!(uses_contrast("MRI Head", "T1 + Gd images"));
        assert!(!uses_contrast("MRI Head", "No gadolinium given."));
    }
}
