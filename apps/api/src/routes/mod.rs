pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    http::Uri,
    routing::{get, post},
    Router,
};

use crate::errors::AppError;
use crate::screening::handlers;
use crate::state::AppState;

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {uri}"))
}

pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Screening API
        .route("/api/v1/screenings", post(handlers::handle_screen))
        .route(
            "/api/v1/screenings/stream",
            post(handlers::handle_screen_stream),
        )
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::llm_client::{CompletionService, LlmError};
    use crate::screening::extractor::DocumentExtractor;
    use crate::screening::orchestrator::{ScreeningOptions, Screener};

    const BOUNDARY: &str = "screener-test-boundary";
    const BODY_LIMIT: usize = 64 * 1024;

    /// Scores resumes that mention Python highly and everything else low.
    struct KeywordModel;

    #[async_trait]
    impl CompletionService for KeywordModel {
        async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
            let resume = prompt
                .split("Candidate Resume Text:")
                .nth(1)
                .unwrap_or_default();
            if resume.contains("Python") {
                Ok("Score: 88\nReason: Strong Python backend background.".to_string())
            } else if resume.contains("nonsense") {
                Ok("I cannot score this.".to_string())
            } else {
                Ok("Score: 15\nReason: Unrelated experience.".to_string())
            }
        }
    }

    fn app() -> Router {
        let screener = Screener::new(
            Arc::new(DocumentExtractor),
            Arc::new(KeywordModel),
            ScreeningOptions {
                max_concurrency: 2,
                max_retries: 0,
                retry_base_delay: Duration::from_millis(1),
            },
        );
        build_router(AppState { screener }, BODY_LIMIT)
    }

    /// Builds a multipart body from `(field, filename, content)` parts.
    fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> String {
        let mut body = String::new();
        for (field, filename, content) in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match filename {
                Some(filename) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: text/plain\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{field}\"\r\n\r\n"
                )),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body
    }

    fn multipart_request(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "screener");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let response = app()
            .oneshot(Request::get("/api/v1/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_screening_ranks_and_reports_failures() {
        let body = multipart_body(&[
            (
                "job_description",
                None,
                "Looking for a Python backend engineer with 3+ years experience",
            ),
            ("resumes", Some("designer.txt"), "Graphic designer, Figma, branding"),
            ("resumes", Some("backend.txt"), "Senior backend engineer, Python, Django"),
            ("resumes", Some("garbled.txt"), "nonsense"),
        ]);

        let response = app()
            .oneshot(multipart_request("/api/v1/screenings", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let report = json_body(response).await;
        assert_eq!(report["total"], 3);
        let results = report["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["name"], "backend.txt");
        assert_eq!(results[0]["rank"], 1);
        assert_eq!(results[0]["tier"], "high");
        assert_eq!(results[1]["name"], "designer.txt");
        assert_eq!(results[1]["tier"], "low");

        let failures = report["failures"].as_array().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0]["name"], "garbled.txt");
        assert_eq!(failures[0]["kind"], "parse");
        assert_eq!(report["cancelled"], false);
    }

    #[tokio::test]
    async fn test_blank_job_description_is_rejected() {
        let body = multipart_body(&[
            ("job_description", None, "   "),
            ("resumes", Some("backend.txt"), "Python"),
        ]);
        let response = app()
            .oneshot(multipart_request("/api/v1/screenings", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_missing_resumes_is_rejected() {
        let body = multipart_body(&[("job_description", None, "Python backend engineer")]);
        let response = app()
            .oneshot(multipart_request("/api/v1/screenings", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stream_emits_progress_then_report() {
        let body = multipart_body(&[
            ("job_description", None, "Python backend engineer"),
            ("resumes", Some("backend.txt"), "Python services"),
            ("resumes", Some("garbled.txt"), "nonsense"),
        ]);

        let response = app()
            .oneshot(multipart_request("/api/v1/screenings/stream", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/event-stream"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();

        let started = text.find("event: started").expect("no started event");
        let failure = text.find("event: failure").expect("no failure event");
        let report = text.find("event: report").expect("no report event");
        assert!(started < failure && failure < report, "{text}");
        assert_eq!(text.matches("event: progress").count(), 2);
        assert!(text.contains("\"fraction\":1.0"));
    }

    #[tokio::test]
    async fn test_stream_validates_before_opening() {
        let body = multipart_body(&[("resumes", Some("backend.txt"), "Python")]);
        let response = app()
            .oneshot(multipart_request("/api/v1/screenings/stream", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected() {
        let big = "x".repeat(BODY_LIMIT * 2);
        let body = multipart_body(&[
            ("job_description", None, "Python backend engineer"),
            ("resumes", Some("huge.txt"), &big),
        ]);
        let response = app()
            .oneshot(multipart_request("/api/v1/screenings", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
