//! Job configuration assembly from raw form input.
//!
//! [`assemble`] is pure: it never touches the network, so a bad form is
//! rejected before any job can start.

use crate::error::ValidationError;
use crate::job::{Credential, InitiationPath, JobConfig, JobSource, TemplateSource, UploadedAsset};

/// Template selected when the form has not been touched.
pub const DEFAULT_TEMPLATE_FILE: &str = "example_template.json";

/// Parent directory scanned when the form has not been touched.
pub const DEFAULT_PARENT_DIR: &str = "./example_material";

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// The template half of the form: pick a file or paste JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateChoice {
    File(String),
    Inline(String),
}

/// Raw, unvalidated form input.
///
/// Numbers are signed and unchecked because they come straight from
/// text fields.
#[derive(Debug, Clone)]
pub struct JobForm {
    pub credential: String,
    pub parent_dir: String,
    pub model_id: String,
    pub view_count: i64,
    pub max_tokens: i64,
    pub rate_limit_delay_seconds: f64,
    pub use_ranking_heuristic: bool,
    pub overwrite_existing: bool,
    pub template: TemplateChoice,
    pub asset: Option<UploadedAsset>,
}

impl Default for JobForm {
    fn default() -> Self {
        Self {
            credential: String::new(),
            parent_dir: DEFAULT_PARENT_DIR.to_string(),
            model_id: DEFAULT_MODEL.to_string(),
            view_count: 6,
            max_tokens: 4096,
            rate_limit_delay_seconds: 1.0,
            use_ranking_heuristic: true,
            overwrite_existing: false,
            template: TemplateChoice::File(DEFAULT_TEMPLATE_FILE.to_string()),
            asset: None,
        }
    }
}

/// Build a [`JobConfig`] for `path`, or report the first violated rule.
///
/// `known_templates` is the latest template listing from the backend; a
/// named template must appear in it.
pub fn assemble(
    form: &JobForm,
    path: InitiationPath,
    known_templates: &[String],
) -> Result<JobConfig, ValidationError> {
    check_selection(form)?;

    let template = template_source(&form.template, known_templates)?;

    let view_count = positive(form.view_count, "num_views")?;
    let max_tokens = positive(form.max_tokens, "max_tokens")?;
    let delay = form.rate_limit_delay_seconds;
    if !delay.is_finite() || delay < 0.0 {
        return Err(ValidationError::InvalidNumber {
            field: "rate_limit_delay",
            reason: format!("must be a non-negative number, got {delay}"),
        });
    }

    let source = match path {
        InitiationPath::Existing => {
            let source_path = form.parent_dir.trim();
            if source_path.is_empty() {
                return Err(ValidationError::MissingSourcePath);
            }
            JobSource::Existing {
                source_path: source_path.to_string(),
            }
        }
        InitiationPath::Upload => match &form.asset {
            Some(asset) if !asset.bytes.is_empty() => JobSource::Upload {
                asset: asset.clone(),
            },
            _ => return Err(ValidationError::MissingAsset),
        },
    };

    Ok(JobConfig {
        credential: Credential::new(form.credential.trim()),
        model_id: form.model_id.clone(),
        view_count,
        max_tokens,
        rate_limit_delay_seconds: delay,
        use_ranking_heuristic: form.use_ranking_heuristic,
        overwrite_existing: form.overwrite_existing,
        template,
        source,
    })
}

/// Run the checks that come before the template lookup: credential,
/// then template selection.
///
/// Passing them is the precondition for fetching the template listing
/// that [`assemble`] needs.
pub fn check_selection(form: &JobForm) -> Result<(), ValidationError> {
    if form.credential.trim().is_empty() {
        return Err(ValidationError::MissingCredential);
    }
    let selected = match &form.template {
        TemplateChoice::File(name) => !name.is_empty(),
        TemplateChoice::Inline(text) => !text.trim().is_empty(),
    };
    if !selected {
        return Err(ValidationError::MissingTemplate);
    }
    Ok(())
}

/// Whether [`assemble`] needs the backend's template listing for `form`.
pub fn needs_template_listing(form: &JobForm) -> bool {
    matches!(form.template, TemplateChoice::File(_))
}

fn template_source(
    choice: &TemplateChoice,
    known_templates: &[String],
) -> Result<TemplateSource, ValidationError> {
    match choice {
        TemplateChoice::File(name) => {
            if name.is_empty() {
                return Err(ValidationError::MissingTemplate);
            }
            if !known_templates.iter().any(|known| known == name) {
                return Err(ValidationError::UnknownTemplate(name.clone()));
            }
            Ok(TemplateSource::Named(name.clone()))
        }
        TemplateChoice::Inline(text) => {
            if text.trim().is_empty() {
                return Err(ValidationError::MissingTemplate);
            }
            let value: serde_json::Value = serde_json::from_str(text)
                .map_err(|e| ValidationError::MalformedTemplate(e.to_string()))?;
            if !value.is_object() {
                return Err(ValidationError::MalformedTemplate(
                    "template must be a JSON object".to_string(),
                ));
            }
            Ok(TemplateSource::Inline(value))
        }
    }
}

fn positive(value: i64, field: &'static str) -> Result<u32, ValidationError> {
    match u32::try_from(value) {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ValidationError::InvalidNumber {
            field,
            reason: format!("must be a positive integer, got {value}"),
        }),
    }
}
