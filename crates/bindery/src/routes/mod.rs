//! HTTP route handlers for Bindery.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod challenge;
mod documents;
mod error;
mod health;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.upload.max_content_length;

    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))

        // Page view + CAPTCHA
        .route("/", get(challenge::home))
        .route("/challenge/{purpose}", get(challenge::get_challenge))

        // PDF actions
        .route("/merge", post(documents::merge_pdfs))
        .route("/join", post(documents::merge_pdfs))
        .route("/split", post(documents::split_pdf))
        .route("/download/{filename}", get(documents::download_file))

        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())

        // Add shared state
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captcha::{CaptchaRenderer, RenderError};
    use crate::config::AppConfig;
    use crate::pdf::tests::sample_pdf;
    use crate::session::MemorySessionStore;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use axum::response::Response;
    use serde_json::Value;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};
    use tower::ServiceExt;

    const BOUNDARY: &str = "quire-test-boundary";

    /// Puts the code itself in `image_data` so tests can answer the challenge
    struct EchoRenderer;

    impl CaptchaRenderer for EchoRenderer {
        fn render(&self, code: &str) -> Result<String, RenderError> {
            Ok(code.to_string())
        }
    }

    fn app(upload_dir: &Path, max_len: usize) -> Router {
        let config = AppConfig {
            secret_key: "test-secret".to_string(),
            upload: crate::config::UploadConfig {
                dir: upload_dir.to_path_buf(),
                max_content_length: max_len,
                ..Default::default()
            },
            ..Default::default()
        };
        let state = AppState::with_parts(
            config,
            Arc::new(MemorySessionStore::new()),
            Arc::new(EchoRenderer),
        );
        create_router(state)
    }

    fn multipart(text: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in text {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        for (name, filename, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn post(uri: &str, cookie: Option<&str>, body: Vec<u8>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Load the page; returns (cookie, merge code, split code)
    async fn page_view(app: &Router) -> (String, String, String) {
        let response = app.clone().oneshot(get("/", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();
        let body = json(response).await;
        let merge = body["merge"]["image_data"].as_str().unwrap().to_string();
        let split = body["split"]["image_data"].as_str().unwrap().to_string();
        (cookie, merge, split)
    }

    fn file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path(), 1 << 20)
            .oneshot(get("/health", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_merge_with_correct_code() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 1 << 20);
        let (cookie, merge_code, _) = page_view(&app).await;

        let a = sample_pdf(&[100]);
        let b = sample_pdf(&[200, 201]);
        let body = multipart(
            &[("captcha_answer", merge_code.as_str())],
            &[("pdf_files", "a.pdf", &a[..]), ("pdf_files", "b.PDF", &b[..])],
        );
        let response = app.clone().oneshot(post("/merge", Some(&cookie), body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(crate::pdf::page_count(&bytes), Some(3));
        assert_eq!(file_count(dir.path()), 1);
    }

    fn two_file_merge(answer: &str, pdf: &[u8]) -> Vec<u8> {
        multipart(
            &[("captcha_answer", answer)],
            &[("pdf_files", "a.pdf", pdf), ("pdf_files", "b.pdf", pdf)],
        )
    }

    /// Submit a wrong answer; returns the code from the re-issued challenge
    async fn fail_merge(app: &Router, cookie: &str, answer: &str, pdf: &[u8]) -> String {
        let response = app
            .clone()
            .oneshot(post("/merge", Some(cookie), two_file_merge(answer, pdf)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = json(response).await;
        assert_eq!(body["challenge"]["purpose"], "merge");
        body["challenge"]["image_data"].as_str().unwrap().to_string()
    }

    fn wrong_answer(code: &str) -> &'static str {
        if code == "WRONG" { "WRONGER" } else { "WRONG" }
    }

    #[tokio::test]
    async fn test_reissued_code_unlocks_merge() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 1 << 20);
        let (cookie, merge_code, _) = page_view(&app).await;
        let pdf = sample_pdf(&[100]);

        let fresh = fail_merge(&app, &cookie, wrong_answer(&merge_code), &pdf).await;
        assert_eq!(file_count(dir.path()), 0);

        let response = app
            .clone()
            .oneshot(post("/merge", Some(&cookie), two_file_merge(&fresh, &pdf)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(file_count(dir.path()), 1);
    }

    #[tokio::test]
    async fn test_old_code_rejected_after_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 1 << 20);
        let (cookie, merge_code, _) = page_view(&app).await;
        let pdf = sample_pdf(&[100]);

        let fresh = fail_merge(&app, &cookie, wrong_answer(&merge_code), &pdf).await;
        if fresh.eq_ignore_ascii_case(&merge_code) {
            return;
        }

        // The first code no longer works; it burns the re-issued one too
        let newest = fail_merge(&app, &cookie, &merge_code, &pdf).await;
        assert_eq!(file_count(dir.path()), 0);

        let response = app
            .clone()
            .oneshot(post("/merge", Some(&cookie), two_file_merge(&newest, &pdf)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(file_count(dir.path()), 1);
    }

    #[tokio::test]
    async fn test_code_cannot_be_replayed() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 1 << 20);
        let (cookie, merge_code, _) = page_view(&app).await;

        let a = sample_pdf(&[100]);
        let request = || {
            post(
                "/merge",
                Some(&cookie),
                multipart(
                    &[("captcha_answer", merge_code.as_str())],
                    &[("pdf_files", "a.pdf", &a[..]), ("pdf_files", "b.pdf", &a[..])],
                ),
            )
        };

        assert_eq!(app.clone().oneshot(request()).await.unwrap().status(), StatusCode::OK);
        assert_eq!(
            app.clone().oneshot(request()).await.unwrap().status(),
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn test_merge_code_does_not_unlock_split() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 1 << 20);
        let (cookie, merge_code, split_code) = page_view(&app).await;
        if merge_code == split_code {
            return;
        }

        let pdf = sample_pdf(&[100, 200]);
        let body = multipart(&[("captcha_answer", merge_code.as_str())], &[("pdf_file", "doc.pdf", &pdf[..])]);
        let response = app.clone().oneshot(post("/split", Some(&cookie), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_submission_without_session_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 1 << 20);

        let a = sample_pdf(&[100]);
        let body = multipart(
            &[("captcha_answer", "ABCDE")],
            &[("pdf_files", "a.pdf", &a[..]), ("pdf_files", "b.pdf", &a[..])],
        );
        let response = app.oneshot(post("/merge", None, body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().contains_key(header::SET_COOKIE));
        assert_eq!(file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_merge_needs_two_files() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 1 << 20);
        let (cookie, merge_code, _) = page_view(&app).await;

        let a = sample_pdf(&[100]);
        let body = multipart(&[("captcha_answer", merge_code.as_str())], &[("pdf_files", "a.pdf", &a[..])]);
        let response = app.oneshot(post("/merge", Some(&cookie), body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json(response).await["error"],
            "Insufficient input: Upload at least two PDF files."
        );
    }

    #[tokio::test]
    async fn test_merge_rejects_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 1 << 20);
        let (cookie, merge_code, _) = page_view(&app).await;

        let a = sample_pdf(&[100]);
        let body = multipart(
            &[("captcha_answer", merge_code.as_str())],
            &[("pdf_files", "a.pdf", &a[..]), ("pdf_files", "payload.exe", &b"MZ"[..])],
        );
        let response = app.oneshot(post("/merge", Some(&cookie), body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_answer_is_a_field_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 1 << 20);
        let (cookie, _, _) = page_view(&app).await;

        let a = sample_pdf(&[100]);
        let body = multipart(&[], &[("pdf_files", "a.pdf", &a[..]), ("pdf_files", "b.pdf", &a[..])]);
        let response = app.oneshot(post("/merge", Some(&cookie), body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json(response).await;
        assert_eq!(body["fields"][0]["field"], "captcha_answer");
    }

    #[tokio::test]
    async fn test_invalid_pdf_is_a_generic_failure() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 1 << 20);
        let (cookie, _, split_code) = page_view(&app).await;

        let body = multipart(
            &[("captcha_answer", split_code.as_str())],
            &[("pdf_file", "fake.pdf", &b"Not a PDF"[..])],
        );
        let response = app.oneshot(post("/split", Some(&cookie), body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json(response).await["error"], "Failed to split PDFs");
        assert_eq!(file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_split_then_download() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 1 << 20);
        let (cookie, _, split_code) = page_view(&app).await;

        let pdf = sample_pdf(&[100, 200, 300]);
        let body = multipart(
            &[("captcha_answer", split_code.to_lowercase().as_str())],
            &[("pdf_file", "../Quarterly Report.pdf", &pdf[..])],
        );
        let response = app.clone().oneshot(post("/split", Some(&cookie), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        let files: Vec<String> = body["files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f.as_str().unwrap().to_string())
            .collect();
        assert_eq!(files.len(), 3);
        assert!(files[0].starts_with("Quarterly_Report-"));
        assert!(files[2].ends_with("_page_3.pdf"));
        assert_eq!(file_count(dir.path()), 3);

        let response = app
            .clone()
            .oneshot(get(&format!("/download/{}", files[1]), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(crate::pdf::page_count(&bytes), Some(1));
    }

    #[tokio::test]
    async fn test_split_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 1 << 20);
        let (cookie, _, split_code) = page_view(&app).await;

        let body = multipart(&[("captcha_answer", split_code.as_str())], &[]);
        let response = app.oneshot(post("/split", Some(&cookie), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_download_rejects_traversal_and_unknown_files() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 1 << 20);

        for uri in ["/download/..%2F..%2Fetc%2Fpasswd", "/download/missing.pdf"] {
            let response = app.clone().oneshot(get(uri, None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_oversized_upload() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 4096);
        let (cookie, merge_code, _) = page_view(&app).await;

        let big = vec![b'%'; 64 * 1024];
        let body = multipart(
            &[("captcha_answer", merge_code.as_str())],
            &[("pdf_files", "big.pdf", &big[..]), ("pdf_files", "big2.pdf", &big[..])],
        );
        let response = app.oneshot(post("/merge", Some(&cookie), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_page_view_sweeps_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("old.pdf");
        let fresh = dir.path().join("new.pdf");
        std::fs::File::create(&stale)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(7200))
            .unwrap();
        std::fs::File::create(&fresh).unwrap();

        let app = app(dir.path(), 1 << 20);
        page_view(&app).await;

        assert!(!stale.exists());
        assert!(fresh.exists());
    }

    #[tokio::test]
    async fn test_page_view_without_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir.path().join("not-yet-created"), 1 << 20);
        let (_, merge, split) = page_view(&app).await;
        assert_eq!(merge.len(), 5);
        assert_eq!(split.len(), 5);
    }

    #[tokio::test]
    async fn test_single_challenge_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 1 << 20);

        let response = app.clone().oneshot(get("/challenge/split", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["purpose"], "split");

        let response = app.oneshot(get("/challenge/rotate", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
