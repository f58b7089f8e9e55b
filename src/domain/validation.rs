//! Upload intake rules: size bounds, the video type allow-list, file name
//! sanitization and the generation overrides a client may send.

use crate::domain::jobs::{GenerationOptions, PublicFigureThreshold};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

pub const MAX_PROMPT_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no file was provided")]
    MissingFile,
    #[error("file is empty")]
    EmptyFile,
    #[error("file is {size} bytes, the maximum is {max} bytes")]
    TooLarge { size: u64, max: u64 },
    #[error("content type '{0}' is not an accepted video format")]
    UnsupportedType(String),
    #[error("file name '{0}' is not usable")]
    InvalidFileName(String),
    #[error("file name '{file_name}' does not match declared type '{declared}'")]
    ExtensionMismatch { file_name: String, declared: String },
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub max_bytes: u64,
    pub allowed_types: Vec<String>,
}

impl UploadLimits {
    pub fn allows(&self, content_type: &str) -> bool {
        let essence = essence(content_type);
        self.allowed_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&essence))
    }

    /// A size is acceptable up to and including `max_bytes`.
    pub fn check_size(&self, size: u64) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }
        if size > self.max_bytes {
            return Err(ValidationError::TooLarge {
                size,
                max: self.max_bytes,
            });
        }
        Ok(())
    }
}

/// What the client told us about the file.
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub file_name: String,
    pub declared_type: Option<String>,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpload {
    pub file_name: String,
    pub content_type: String,
    pub extension: String,
}

pub fn validate_upload(
    meta: &UploadMetadata,
    limits: &UploadLimits,
) -> Result<ValidatedUpload, ValidationError> {
    let file_name = sanitize_file_name(&meta.file_name)
        .ok_or_else(|| ValidationError::InvalidFileName(meta.file_name.clone()))?;

    let extension = Path::new(&file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| ValidationError::InvalidFileName(meta.file_name.clone()))?;

    let content_type = resolve_content_type(&file_name, meta.declared_type.as_deref())?;
    if !limits.allows(&content_type) {
        return Err(ValidationError::UnsupportedType(content_type));
    }

    limits.check_size(meta.size_bytes)?;

    Ok(ValidatedUpload {
        file_name,
        content_type,
        extension,
    })
}

/// Declared type wins when it agrees with the extension; a missing or generic
/// declared type falls back to the extension.
fn resolve_content_type(file_name: &str, declared: Option<&str>) -> Result<String, ValidationError> {
    let guesses = mime_guess::from_path(file_name);
    match declared.map(essence) {
        Some(declared) if !declared.is_empty() && declared != "application/octet-stream" => {
            if guesses.iter().any(|m| m.essence_str() == declared) {
                Ok(declared)
            } else if guesses.first().is_none() {
                Err(ValidationError::InvalidFileName(file_name.to_string()))
            } else {
                Err(ValidationError::ExtensionMismatch {
                    file_name: file_name.to_string(),
                    declared,
                })
            }
        }
        _ => guesses
            .first()
            .map(|m| m.essence_str().to_string())
            .ok_or_else(|| ValidationError::InvalidFileName(file_name.to_string())),
    }
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Keeps only the last path component and replaces anything outside
/// `[A-Za-z0-9._-]`. Returns `None` when nothing usable is left.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars = UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]").unwrap());

    let last = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    let cleaned = unsafe_chars.replace_all(last, "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_' || c == '.') {
        return None;
    }
    Some(cleaned.chars().take(255).collect())
}

/// Overrides sent alongside the upload.
#[derive(Debug, Clone, Default)]
pub struct OptionOverrides {
    pub model: Option<String>,
    pub prompt_text: Option<String>,
    pub ratio: Option<String>,
    pub seed: Option<String>,
    pub reference_image_uri: Option<String>,
    pub public_figure_threshold: Option<String>,
}

pub fn resolve_options(
    defaults: &GenerationOptions,
    allowed_models: &[String],
    overrides: OptionOverrides,
) -> Result<GenerationOptions, ValidationError> {
    let mut options = defaults.clone();

    if let Some(model) = non_empty(overrides.model) {
        if !allowed_models.iter().any(|m| m == &model) {
            return Err(ValidationError::InvalidField {
                field: "model",
                reason: format!("'{}' is not an available model", model),
            });
        }
        options.model = model;
    }

    if let Some(prompt) = non_empty(overrides.prompt_text) {
        if prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(ValidationError::InvalidField {
                field: "prompt",
                reason: format!("longer than {} characters", MAX_PROMPT_CHARS),
            });
        }
        options.prompt_text = prompt;
    }

    if let Some(ratio) = non_empty(overrides.ratio) {
        validate_ratio(&ratio)?;
        options.ratio = ratio;
    }

    if let Some(seed) = non_empty(overrides.seed) {
        let seed = seed.parse::<u32>().map_err(|_| ValidationError::InvalidField {
            field: "seed",
            reason: format!("'{}' is not an unsigned 32-bit integer", seed),
        })?;
        options.seed = Some(seed);
    }

    if let Some(uri) = non_empty(overrides.reference_image_uri) {
        let parsed = reqwest::Url::parse(&uri).map_err(|e| ValidationError::InvalidField {
            field: "reference_image_uri",
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidField {
                field: "reference_image_uri",
                reason: "only http(s) URIs are accepted".to_string(),
            });
        }
        options.reference_image_uri = Some(uri);
    }

    if let Some(threshold) = non_empty(overrides.public_figure_threshold) {
        options.public_figure_threshold = threshold
            .parse::<PublicFigureThreshold>()
            .map_err(|reason| ValidationError::InvalidField {
                field: "public_figure_threshold",
                reason,
            })?;
    }

    Ok(options)
}

pub fn validate_ratio(ratio: &str) -> Result<(), ValidationError> {
    static RATIO: OnceLock<Regex> = OnceLock::new();
    let pattern = RATIO.get_or_init(|| Regex::new(r"^[1-9][0-9]{1,4}:[1-9][0-9]{1,4}$").unwrap());
    if pattern.is_match(ratio) {
        Ok(())
    } else {
        Err(ValidationError::InvalidField {
            field: "ratio",
            reason: format!("'{}' is not of the form W:H", ratio),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
