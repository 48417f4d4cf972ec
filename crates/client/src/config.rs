//! Runner configuration loaded from environment variables.
//!
//! `.env` is read by `main` via `dotenvy` before these are loaded.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use capgen_core::assemble::{JobForm, TemplateChoice};
use capgen_core::job::InitiationPath;

/// A variable was set to something that does not parse.
#[derive(Debug, thiserror::Error)]
#[error("{var} has an invalid value: {value:?}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
}

/// Backend connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL (default: `http://127.0.0.1:5000`).
    pub api_url: String,
    /// Timeout for each REST request (default: 30 s). The progress
    /// stream is never subject to it.
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// | Env Var                       | Default                 |
    /// |-------------------------------|-------------------------|
    /// | `CAPGEN_API_URL`              | `http://127.0.0.1:5000` |
    /// | `CAPGEN_REQUEST_TIMEOUT_SECS` | `30`                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = lookup("CAPGEN_API_URL").unwrap_or_else(|| "http://127.0.0.1:5000".into());
        let timeout_secs: u64 = parse_or(&lookup, "CAPGEN_REQUEST_TIMEOUT_SECS", 30)?;

        Ok(Self {
            api_url,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// The job to run, as raw form input plus the initiation path.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub form: JobForm,
    /// Set when `CAPGEN_UPLOAD_FILE` selects the upload path.
    pub upload_file: Option<PathBuf>,
}

impl JobSettings {
    /// | Env Var                   | Default                     |
    /// |---------------------------|-----------------------------|
    /// | `CAPGEN_API_KEY`          | -- (required by validation) |
    /// | `CAPGEN_PARENT_DIR`       | `./example_material`        |
    /// | `CAPGEN_MODEL`            | `claude-3-5-sonnet-20241022`|
    /// | `CAPGEN_NUM_VIEWS`        | `6`                         |
    /// | `CAPGEN_MAX_TOKENS`       | `4096`                      |
    /// | `CAPGEN_RATE_LIMIT_DELAY` | `1.0`                       |
    /// | `CAPGEN_USE_DIFFURANK`    | `true`                      |
    /// | `CAPGEN_OVERWRITE`        | `false`                     |
    /// | `CAPGEN_TEMPLATE_FILE`    | `example_template.json`     |
    /// | `CAPGEN_TEMPLATE_JSON`    | unset; overrides the file   |
    /// | `CAPGEN_UPLOAD_FILE`      | unset                       |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = JobForm::default();

        let template = match lookup("CAPGEN_TEMPLATE_JSON") {
            Some(text) => TemplateChoice::Inline(text),
            None => match lookup("CAPGEN_TEMPLATE_FILE") {
                Some(name) => TemplateChoice::File(name),
                None => defaults.template.clone(),
            },
        };

        let form = JobForm {
            credential: lookup("CAPGEN_API_KEY").unwrap_or_default(),
            parent_dir: lookup("CAPGEN_PARENT_DIR").unwrap_or(defaults.parent_dir),
            model_id: lookup("CAPGEN_MODEL").unwrap_or(defaults.model_id),
            view_count: parse_or(&lookup, "CAPGEN_NUM_VIEWS", defaults.view_count)?,
            max_tokens: parse_or(&lookup, "CAPGEN_MAX_TOKENS", defaults.max_tokens)?,
            rate_limit_delay_seconds: parse_or(
                &lookup,
                "CAPGEN_RATE_LIMIT_DELAY",
                defaults.rate_limit_delay_seconds,
            )?,
            use_ranking_heuristic: parse_or(
                &lookup,
                "CAPGEN_USE_DIFFURANK",
                defaults.use_ranking_heuristic,
            )?,
            overwrite_existing: parse_or(&lookup, "CAPGEN_OVERWRITE", defaults.overwrite_existing)?,
            template,
            asset: None,
        };

        Ok(Self {
            form,
            upload_file: lookup("CAPGEN_UPLOAD_FILE").map(PathBuf::from),
        })
    }

    pub fn path(&self) -> InitiationPath {
        if self.upload_file.is_some() {
            InitiationPath::Upload
        } else {
            InitiationPath::Existing
        }
    }
}

/// MIME type sent for an upload file, chosen by extension. `None` leaves
/// the asset as `application/octet-stream`.
pub fn content_type_for(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "obj" => Some("model/obj"),
        "glb" => Some("model/gltf-binary"),
        "gltf" => Some("model/gltf+json"),
        "stl" => Some("model/stl"),
        "zip" => Some("application/zip"),
        _ => None,
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError { var, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| vars.get(var).cloned()
    }

    #[test]
    fn client_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_url, "http://127.0.0.1:5000");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn invalid_timeout_names_the_variable() {
        let err = ClientConfig::from_lookup(lookup(&[("CAPGEN_REQUEST_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert_eq!(err.var, "CAPGEN_REQUEST_TIMEOUT_SECS");
        assert_eq!(err.value, "soon");
    }

    #[test]
    fn job_defaults_select_existing_path() {
        let settings = JobSettings::from_lookup(lookup(&[("CAPGEN_API_KEY", "sk-test")])).unwrap();
        assert_eq!(settings.path(), InitiationPath::Existing);
        assert_eq!(settings.form.credential, "sk-test");
        assert_eq!(settings.form.view_count, 6);
        assert!(settings.form.use_ranking_heuristic);
        assert_eq!(
            settings.form.template,
            TemplateChoice::File("example_template.json".to_string())
        );
    }

    #[test]
    fn inline_template_overrides_file() {
        let settings = JobSettings::from_lookup(lookup(&[
            ("CAPGEN_TEMPLATE_FILE", "bedroom_template.json"),
            ("CAPGEN_TEMPLATE_JSON", r#"{"a":1}"#),
        ]))
        .unwrap();
        assert_eq!(
            settings.form.template,
            TemplateChoice::Inline(r#"{"a":1}"#.to_string())
        );
    }

    #[test]
    fn upload_file_selects_upload_path() {
        let settings = JobSettings::from_lookup(lookup(&[
            ("CAPGEN_UPLOAD_FILE", "/tmp/chair.glb"),
            ("CAPGEN_OVERWRITE", "true"),
            ("CAPGEN_NUM_VIEWS", "8"),
        ]))
        .unwrap();
        assert_eq!(settings.path(), InitiationPath::Upload);
        assert!(settings.form.overwrite_existing);
        assert_eq!(settings.form.view_count, 8);
    }

    #[test]
    fn upload_content_type_follows_extension() {
        assert_eq!(content_type_for(Path::new("/tmp/apple.obj")), Some("model/obj"));
        assert_eq!(
            content_type_for(Path::new("chair.GLB")),
            Some("model/gltf-binary")
        );
        assert_eq!(content_type_for(Path::new("notes.txt")), None);
        assert_eq!(content_type_for(Path::new("no_extension")), None);
    }

    #[test]
    fn unparseable_flag_is_an_error() {
        let err = JobSettings::from_lookup(lookup(&[("CAPGEN_USE_DIFFURANK", "yes")])).unwrap_err();
        assert_eq!(err.var, "CAPGEN_USE_DIFFURANK");
    }
}
