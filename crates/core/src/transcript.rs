//! Progress transcript lines and their presentation class.

use serde::Serialize;

use crate::types::Timestamp;

/// How a transcript line should be shown. Never affects job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineClass {
    Success,
    Error,
    Neutral,
}

/// One line of visible job output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptLine {
    pub text: String,
    pub class: LineClass,
    pub received_at: Timestamp,
}

impl TranscriptLine {
    /// A line classified from its own text.
    pub fn classified(text: impl Into<String>) -> Self {
        let text = text.into();
        let class = classify(&text);
        Self::with_class(text, class)
    }

    pub fn with_class(text: impl Into<String>, class: LineClass) -> Self {
        Self {
            text: text.into(),
            class,
            received_at: chrono::Utc::now(),
        }
    }
}

/// Classify a line by the literal markers the batch script prints.
///
/// Success markers win over failure markers on the same line.
pub fn classify(line: &str) -> LineClass {
    if line.contains('✓') || line.contains("Success") {
        LineClass::Success
    } else if line.contains('✗') || line.contains("Error") || line.contains("Failed") {
        LineClass::Error
    } else {
        LineClass::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_markers() {
        assert_eq!(classify("✓ Saved structured_output.json"), LineClass::Success);
        assert_eq!(classify("Success: 12 folders"), LineClass::Success);
    }

    #[test]
    fn error_markers() {
        assert_eq!(classify("✗ abc123"), LineClass::Error);
        assert_eq!(classify("Error: rate limited"), LineClass::Error);
        assert_eq!(classify("Failed to parse response"), LineClass::Error);
    }

    #[test]
    fn success_wins_when_both_present() {
        assert_eq!(classify("✓ done, Error count 0"), LineClass::Success);
    }

    #[test]
    fn markers_are_case_sensitive() {
        assert_eq!(classify("no errors here"), LineClass::Neutral);
        assert_eq!(classify("Processing folder 3/10"), LineClass::Neutral);
    }

    #[test]
    fn classified_line_keeps_text() {
        let line = TranscriptLine::classified("✗ boom");
        assert_eq!(line.text, "✗ boom");
        assert_eq!(line.class, LineClass::Error);
    }
}
