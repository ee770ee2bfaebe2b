//! Merge, split, and download endpoints.

use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use quire_common::{Purpose, QuireError, SplitOutcome};
use rand::Rng;
use std::path::{Path as FsPath, PathBuf};

use super::error::ApiError;
use crate::pdf;
use crate::session::SessionContext;
use crate::state::AppState;
use crate::upload::{RawForm, has_allowed_extension, secure_filename};

/// Merge uploaded PDFs (multipart `pdf_files` + `captcha_answer`)
pub async fn merge_pdfs(
    State(state): State<AppState>,
    session: SessionContext,
    multipart: Multipart,
) -> Response {
    let result = merge(&state, &session, multipart).await;
    session.attach(result)
}

/// Split one uploaded PDF (multipart `pdf_file` + `captcha_answer`)
pub async fn split_pdf(
    State(state): State<AppState>,
    session: SessionContext,
    multipart: Multipart,
) -> Response {
    let result = split(&state, &session, multipart).await;
    session.attach(result)
}

/// Serve a generated file from the upload directory
pub async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    // Anything secure_filename would change is not a name we generated
    if secure_filename(&filename).as_deref() != Some(filename.as_str()) {
        return Err(QuireError::NotFound(filename).into());
    }

    let path = state.config.upload.dir.join(&filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(attachment(&filename, bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(QuireError::NotFound(filename).into())
        }
        Err(e) => Err(QuireError::Internal(format!("reading {}: {}", path.display(), e)).into()),
    }
}

async fn merge(
    state: &AppState,
    session: &SessionContext,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let upload = &state.config.upload;
    let form = RawForm::read(multipart, upload.max_content_length)
        .await?
        .into_merge_form();
    let answer = form.validate().map_err(QuireError::Validation)?;

    require_challenge(state, session, Purpose::Merge, answer).await?;

    if form.pdf_files.len() < 2 {
        return Err(QuireError::InsufficientInput("Upload at least two PDF files.".into()).into());
    }
    if let Some(bad) = form
        .pdf_files
        .iter()
        .find(|file| !has_allowed_extension(&file.filename, &upload.allowed_extensions))
    {
        return Err(QuireError::UnsupportedFileType(bad.filename.clone()).into());
    }

    let inputs: Vec<Bytes> = form.pdf_files.iter().map(|file| file.bytes.clone()).collect();
    let merged = tokio::task::spawn_blocking(move || pdf::merge(&inputs))
        .await
        .map_err(|e| QuireError::Internal(e.to_string()))?
        .map_err(|e| {
            tracing::error!(error = %e, "Error merging PDFs");
            QuireError::UpstreamOperationFailure(Purpose::Merge)
        })?;

    let filename = format!("merged-{}.pdf", artifact_token());
    let path = write_artifact(&upload.dir, &filename, &merged).await?;

    tracing::info!(
        inputs = form.pdf_files.len(),
        bytes = merged.len(),
        path = ?path,
        "Merged PDFs"
    );

    Ok(attachment(&filename, merged))
}

async fn split(
    state: &AppState,
    session: &SessionContext,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let upload = &state.config.upload;
    let form = RawForm::read(multipart, upload.max_content_length)
        .await?
        .into_split_form();
    let answer = form.validate().map_err(QuireError::Validation)?;

    require_challenge(state, session, Purpose::Split, answer).await?;

    let Some(file) = &form.pdf_file else {
        return Err(QuireError::InsufficientInput("Upload a PDF file to split.".into()).into());
    };
    if !has_allowed_extension(&file.filename, &upload.allowed_extensions) {
        return Err(QuireError::UnsupportedFileType(file.filename.clone()).into());
    }

    let safe_name = secure_filename(&file.filename).unwrap_or_else(|| "document.pdf".into());
    let stem = FsPath::new(&safe_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("document")
        .to_string();

    let bytes = file.bytes.clone();
    let pages = tokio::task::spawn_blocking(move || pdf::split(&bytes))
        .await
        .map_err(|e| QuireError::Internal(e.to_string()))?
        .map_err(|e| {
            tracing::error!(error = %e, "Error splitting PDF");
            QuireError::UpstreamOperationFailure(Purpose::Split)
        })?;

    let token = artifact_token();
    let mut files = Vec::with_capacity(pages.len());
    for (i, page) in pages.iter().enumerate() {
        let filename = format!("{}-{}_page_{}.pdf", stem, token, i + 1);
        write_artifact(&upload.dir, &filename, page).await?;
        files.push(filename);
    }

    tracing::info!(source = %safe_name, pages = files.len(), "Split PDF");

    Ok(Json(SplitOutcome { files }).into_response())
}

/// Verify the session's challenge; on failure issue a new one to retry with
async fn require_challenge(
    state: &AppState,
    session: &SessionContext,
    purpose: Purpose,
    answer: &str,
) -> Result<(), ApiError> {
    let passed = state
        .verify_challenge(&session.id, purpose, answer)
        .await
        .map_err(ApiError::session)?;
    if passed {
        return Ok(());
    }

    tracing::warn!(
        session_id = %session.id,
        purpose = %purpose,
        new_session = session.is_new(),
        "CAPTCHA verification failed"
    );
    let fresh = state.issue_challenge(&session.id, purpose).await?;
    Err(ApiError::from(QuireError::ChallengeMismatch(purpose)).with_challenge(fresh))
}

/// Short random tag keeping concurrent outputs from overwriting each other
fn artifact_token() -> String {
    let mut bytes = [0u8; 6];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

async fn write_artifact(dir: &FsPath, filename: &str, contents: &[u8]) -> Result<PathBuf, ApiError> {
    let path = dir.join(filename);
    let io_error = |e: std::io::Error| QuireError::Internal(format!("writing {}: {}", path.display(), e));

    tokio::fs::create_dir_all(dir).await.map_err(io_error)?;
    tokio::fs::write(&path, contents).await.map_err(io_error)?;
    Ok(path)
}

fn attachment(filename: &str, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}
