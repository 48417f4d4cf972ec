/// Bad or missing user input, caught before any network call.
///
/// Each variant names one violated invariant of a job configuration.
/// The assembler reports the first one it hits.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("API key is required")]
    MissingCredential,

    #[error("A template file or inline template JSON is required")]
    MissingTemplate,

    #[error("Unknown template file: {0}")]
    UnknownTemplate(String),

    #[error("Invalid JSON in inline template: {0}")]
    MalformedTemplate(String),

    #[error("{field} {reason}")]
    InvalidNumber {
        field: &'static str,
        reason: String,
    },

    #[error("A parent directory is required")]
    MissingSourcePath,

    #[error("Select an asset to upload")]
    MissingAsset,
}
