//! Upload acceptance: file names, extensions, and form shapes.

use axum::body::Bytes;
use axum::extract::Multipart;
use axum::http::StatusCode;
use quire_common::constants::fields;
use quire_common::{FieldError, QuireError};

/// Answers longer than this are rejected before touching the session
const MAX_ANSWER_LEN: usize = 32;

/// True if `filename` has an extension in `allowed` (case-insensitive)
pub fn has_allowed_extension<S: AsRef<str>>(filename: &str, allowed: &[S]) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => allowed
            .iter()
            .any(|candidate| candidate.as_ref().eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// Reduce a client-supplied name to a safe single path component.
///
/// Separators become underscores, anything outside `[A-Za-z0-9._-]` is
/// dropped and leading/trailing dots and underscores are trimmed, so
/// `../../etc/passwd` becomes `etc_passwd`. Returns `None` when nothing
/// usable is left.
pub fn secure_filename(filename: &str) -> Option<String> {
    let spaced = filename.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// One uploaded file
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Bytes,
}

/// Fields of a merge submission
#[derive(Debug, Default)]
pub struct MergeForm {
    pub pdf_files: Vec<UploadedFile>,
    pub captcha_answer: Option<String>,
}

/// Fields of a split submission
#[derive(Debug, Default)]
pub struct SplitForm {
    pub pdf_file: Option<UploadedFile>,
    pub captcha_answer: Option<String>,
}

impl MergeForm {
    /// Check field shape. File count and types are checked after the CAPTCHA.
    pub fn validate(&self) -> Result<&str, Vec<FieldError>> {
        let mut errors = Vec::new();
        let answer = check_answer(self.captcha_answer.as_deref(), &mut errors);
        for file in &self.pdf_files {
            check_filename(fields::PDF_FILES, file, &mut errors);
        }
        match answer {
            Some(answer) if errors.is_empty() => Ok(answer),
            _ => Err(errors),
        }
    }
}

impl SplitForm {
    pub fn validate(&self) -> Result<&str, Vec<FieldError>> {
        let mut errors = Vec::new();
        let answer = check_answer(self.captcha_answer.as_deref(), &mut errors);
        if let Some(file) = &self.pdf_file {
            check_filename(fields::PDF_FILE, file, &mut errors);
        }
        match answer {
            Some(answer) if errors.is_empty() => Ok(answer),
            _ => Err(errors),
        }
    }
}

fn check_answer<'a>(answer: Option<&'a str>, errors: &mut Vec<FieldError>) -> Option<&'a str> {
    match answer.map(str::trim) {
        None | Some("") => {
            errors.push(FieldError::new(fields::CAPTCHA_ANSWER, "This field is required."));
            None
        }
        Some(answer) if answer.len() > MAX_ANSWER_LEN => {
            errors.push(FieldError::new(fields::CAPTCHA_ANSWER, "Answer is too long."));
            None
        }
        Some(answer) => Some(answer),
    }
}

fn check_filename(field: &str, file: &UploadedFile, errors: &mut Vec<FieldError>) {
    if secure_filename(&file.filename).is_none() {
        errors.push(FieldError::new(
            field,
            format!("Invalid file name: {:?}", file.filename),
        ));
    }
}

/// Text and file parts of a multipart body, by field name
#[derive(Debug, Default)]
pub struct RawForm {
    pub files: Vec<(String, UploadedFile)>,
    pub text: Vec<(String, String)>,
}

impl RawForm {
    /// Drain a multipart body.
    ///
    /// Empty file inputs (browsers send a nameless, empty part when nothing
    /// was chosen) are dropped.
    pub async fn read(mut multipart: Multipart, body_limit: usize) -> Result<Self, QuireError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, body_limit))?
        {
            let name = field.name().unwrap_or_default().to_string();
            let filename = field.file_name().map(str::to_string);

            match filename {
                Some(filename) => {
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| multipart_error(e, body_limit))?;
                    if filename.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    form.files.push((name, UploadedFile { filename, bytes }));
                }
                None => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| multipart_error(e, body_limit))?;
                    form.text.push((name, value));
                }
            }
        }

        Ok(form)
    }

    fn text_field(&self, name: &str) -> Option<String> {
        self.text
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.clone())
    }

    pub fn into_merge_form(self) -> MergeForm {
        let captcha_answer = self.text_field(fields::CAPTCHA_ANSWER);
        MergeForm {
            pdf_files: self
                .files
                .into_iter()
                .filter(|(field, _)| field == fields::PDF_FILES)
                .map(|(_, file)| file)
                .collect(),
            captcha_answer,
        }
    }

    pub fn into_split_form(self) -> SplitForm {
        let captcha_answer = self.text_field(fields::CAPTCHA_ANSWER);
        SplitForm {
            pdf_file: self
                .files
                .into_iter()
                .find(|(field, _)| field == fields::PDF_FILE)
                .map(|(_, file)| file),
            captcha_answer,
        }
    }
}

fn multipart_error(error: axum::extract::multipart::MultipartError, body_limit: usize) -> QuireError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        QuireError::PayloadTooLarge(body_limit)
    } else {
        QuireError::Validation(vec![FieldError::new("form", error.body_text())])
    }
}
