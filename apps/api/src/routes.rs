use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Query, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use ds_core::{
    AnalysisKind, CacheNamespace, DocumentPatch, DocumentRecord, MediaType, UploadResponse,
    UploadableFile,
};
use ds_error::DsError;
use ds_service::{AnalysisOutcome, FilePart, UploadRequest};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::CorsCfg;
use crate::error::{handle_panic, ApiError};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/upload", post(upload))
        .route("/analyze", post(analyze))
        .route("/documents/:id", get(get_document).patch(patch_document))
        .route("/users/:user_id/recent", get(recent_documents))
        .route("/session", post(create_session))
        .route("/session/:user_id", get(get_session).delete(delete_session))
        .route("/health", get(health))
        .with_state(state)
}

pub fn with_layers(router: Router, cors: CorsLayer, max_upload_bytes: usize) -> Router {
    router
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// 未配置来源时：非生产环境放开，生产环境不允许跨域
pub fn cors_layer(cfg: &CorsCfg, production: bool) -> CorsLayer {
    if cfg.allowed_origins.is_empty() {
        if production {
            warn!("cors.allowed_origins is empty; cross-origin requests are rejected");
            return CorsLayer::new();
        }
        warn!("cors.allowed_origins is empty; allowing any origin outside production");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = cfg
        .allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid cors origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, DsError> {
    serde_json::from_slice(body)
        .map_err(|e| DsError::validation(format!("Invalid JSON body: {}", e)))
}

fn parse_document_id(raw: &str) -> Result<Uuid, DsError> {
    Uuid::parse_str(raw).map_err(|_| DsError::NotFound {
        resource: format!("document {}", raw),
    })
}

// ===============
// Upload
// ===============

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadJson {
    title: Option<String>,
    text: Option<String>,
    user_id: Option<String>,
}

fn multipart_error(e: impl std::fmt::Display) -> DsError {
    DsError::validation(format!("Invalid multipart body: {}", e))
}

async fn read_multipart(mut multipart: Multipart) -> Result<UploadRequest, DsError> {
    let mut file = None;
    let mut title = None;
    let mut text = None;
    let mut user_id = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload.bin").to_string();
                let declared = field.content_type().map(str::to_string);
                let content = field.bytes().await.map_err(multipart_error)?;
                let media_type = MediaType::detect(declared.as_deref(), &file_name);
                let upload = UploadableFile::new(file_name, media_type, content.to_vec());
                file = Some(FilePart::new(upload, declared));
            }
            "title" => title = Some(field.text().await.map_err(multipart_error)?),
            "text" => text = Some(field.text().await.map_err(multipart_error)?),
            "userId" => user_id = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }
    UploadRequest::from_parts(file, title, text, user_id)
}

async fn upload(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<UploadResponse>, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let upload = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(multipart_error)?;
        read_multipart(multipart).await?
    } else {
        let body = Bytes::from_request(request, &state)
            .await
            .map_err(|e| DsError::validation(e.body_text()))?;
        let parsed: UploadJson = if body.is_empty() {
            UploadJson::default()
        } else {
            parse_json(&body)?
        };
        UploadRequest::from_parts(None, parsed.title, parsed.text, parsed.user_id)?
    };

    let resp = state.upload.handle(upload).await?;
    info!(mode = state.upload.name(), document_id = ?resp.document_id, "upload handled");
    Ok(Json(resp))
}

// ===============
// Analysis
// ===============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeReq {
    text: String,
    kind: AnalysisKind,
    title: Option<String>,
    user_id: Option<String>,
}

async fn analyze(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<AnalysisOutcome>, ApiError> {
    let req: AnalyzeReq = parse_json(&body)?;
    let outcome = state
        .analysis
        .analyze(req.kind, req.title.as_deref(), &req.text)
        .await?;
    info!(kind = req.kind.as_str(), user_id = ?req.user_id, cached = outcome.cached, "analysis served");
    Ok(Json(outcome))
}

// ===============
// Documents
// ===============

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewerQuery {
    user_id: Option<String>,
}

async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(viewer): Query<ViewerQuery>,
) -> Result<Json<DocumentRecord>, ApiError> {
    let id = parse_document_id(&id)?;
    let record = state.documents.get(id, viewer.user_id.as_deref()).await?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
struct PatchDocumentReq {
    title: Option<String>,
    summary: Option<String>,
    version: u64,
}

async fn patch_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<DocumentRecord>, ApiError> {
    let id = parse_document_id(&id)?;
    let req: PatchDocumentReq = parse_json(&body)?;
    let patch = DocumentPatch {
        title: req.title,
        summary: req.summary,
    };
    let record = state.documents.patch(id, patch, req.version).await?;
    Ok(Json(record))
}

async fn recent_documents(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<Value> {
    let documents = state.cache.recently_viewed(&user_id).await;
    Json(json!({ "documents": documents }))
}

// ===============
// Session
// ===============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionReq {
    user_id: String,
    data: Value,
}

async fn create_session(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: SessionReq = parse_json(&body)?;
    if req.user_id.trim().is_empty() {
        return Err(DsError::validation("userId is required").into());
    }
    state.cache.cache_user_session(&req.user_id, &req.data).await;
    Ok(Json(json!({ "status": "ok" })))
}

async fn get_session(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let key = CacheNamespace::UserSession.key(&user_id);
    match state.cache.fetch_from_cache::<Value>(&key).await {
        Some(data) => Ok(Json(data)),
        None => Err(DsError::NotFound {
            resource: format!("session {}", user_id),
        }
        .into()),
    }
}

async fn delete_session(State(state): State<AppState>, Path(user_id): Path<String>) -> StatusCode {
    state
        .cache
        .invalidate(&CacheNamespace::UserSession.key(&user_id))
        .await;
    StatusCode::NO_CONTENT
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "mode": state.upload.name(),
        "analysis": state.analysis.mode(),
        "cache": state.cache.backend(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request as HttpRequest;
    use ds_cache::CacheGateway;
    use ds_extract::TextExtractor;
    use ds_llm::Summarizer;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct StubSummarizer;

    #[async_trait]
    impl Summarizer for StubSummarizer {
        async fn analyze(
            &self,
            kind: AnalysisKind,
            _title: Option<&str>,
            text: &str,
        ) -> ds_error::Result<String> {
            Ok(format!("{} of {} chars", kind.as_str(), text.chars().count()))
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn fallback_app() -> (Router, AppState) {
        let state = AppState::fallback(CacheGateway::in_memory());
        (routes(state.clone()), state)
    }

    fn full_app() -> (Router, AppState) {
        let state = AppState::full(
            Arc::new(StubSummarizer),
            Arc::new(TextExtractor::default()),
            CacheGateway::in_memory(),
        );
        (routes(state.clone()), state)
    }

    fn json_req(method: Method, uri: &str, body: Value) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, req: HttpRequest<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_fallback_upload_echoes_short_text() {
        let (app, _) = fallback_app();
        let (status, body) = send(
            &app,
            json_req(Method::POST, "/upload", json!({"title": "T", "text": "hello world"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"summary": "hello world", "originalText": "hello world", "title": "T"})
        );
    }

    #[tokio::test]
    async fn test_fallback_upload_truncates_long_text() {
        let (app, _) = fallback_app();
        let text = "a".repeat(250);
        let (status, body) = send(
            &app,
            json_req(Method::POST, "/upload", json!({"title": "T", "text": text, "userId": "u1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"], format!("{}...", "a".repeat(200)));
        assert_eq!(body["originalText"], text);
        assert_eq!(body["userId"], "u1");
    }

    #[tokio::test]
    async fn test_upload_validation_errors() {
        let (app, _) = fallback_app();

        let (status, body) =
            send(&app, json_req(Method::POST, "/upload", json!({"title": "T"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Title and text are required"}));

        let (status, body) = send(&app, json_req(Method::POST, "/upload", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "No file or text provided"}));

        let req = HttpRequest::builder()
            .method(Method::POST)
            .uri("/upload")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No file or text provided");

        let req = HttpRequest::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON body"));
    }

    fn multipart_req(parts: &[(&str, Option<(&str, &str)>, &str)]) -> HttpRequest<Body> {
        let mut body = String::new();
        for (name, file, value) in parts {
            body.push_str("--BOUNDARY\r\n");
            match file {
                Some((file_name, content_type)) => {
                    body.push_str(&format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        name, file_name
                    ));
                    if !content_type.is_empty() {
                        body.push_str(&format!("Content-Type: {}\r\n", content_type));
                    }
                    body.push_str("\r\n");
                }
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                    name
                )),
            }
            body.push_str(value);
            body.push_str("\r\n");
        }
        body.push_str("--BOUNDARY--\r\n");
        HttpRequest::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=BOUNDARY")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_fallback_multipart_file_placeholder() {
        let (app, _) = fallback_app();
        let req = multipart_req(&[
            ("title", None, "Q3"),
            ("file", Some(("report.pdf", "application/pdf")), "%PDF-1.4"),
        ]);
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["summary"].as_str().unwrap().contains("report.pdf"));
        assert_eq!(body["originalText"], "");
        assert_eq!(body["title"], "Q3");

        // 未声明类型的文件即便扩展名可识别也被拒绝
        let req = multipart_req(&[("file", Some(("notes.pdf", "")), "xx")]);
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "File must declare a media type");
    }

    #[tokio::test]
    async fn test_fallback_multipart_keeps_declared_type() {
        let (app, _) = fallback_app();
        let req = multipart_req(&[("file", Some(("scan.png", "image/png")), "png!")]);
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["summary"]
            .as_str()
            .unwrap()
            .contains("scan.png (image/png, 4 bytes)"));
    }

    #[tokio::test]
    async fn test_full_upload_persists_and_tracks_recent() {
        let (app, _) = full_app();
        let (status, body) = send(
            &app,
            json_req(
                Method::POST,
                "/upload",
                json!({"title": "Q3", "text": "revenue grew", "userId": "u1"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"], "summary of 12 chars");
        let doc_id = body["documentId"].as_str().unwrap().to_string();

        let (status, doc) = send(&app, get_req(&format!("/documents/{}", doc_id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doc["title"], "Q3");
        assert_eq!(doc["version"], 1);

        let (_, recent) = send(&app, get_req("/users/u1/recent")).await;
        assert_eq!(recent, json!({"documents": [doc_id]}));
    }

    #[tokio::test]
    async fn test_full_upload_rejects_unsupported_file() {
        let (app, _) = full_app();
        let req = multipart_req(&[("file", Some(("notes.txt", "text/plain")), "hello")]);
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body["error"], "Unsupported file format: text/plain");
    }

    #[tokio::test]
    async fn test_document_lookup_and_versioned_patch() {
        let (app, state) = fallback_app();
        let record = state
            .documents
            .create(ds_service::NewDocument {
                user_id: None,
                title: "Q3".into(),
                summary: "s".into(),
                media_type: None,
                text_length: 1,
            })
            .await
            .unwrap();
        let uri = format!("/documents/{}", record.id);

        let (status, body) =
            send(&app, json_req(Method::PATCH, &uri, json!({"title": "Q3 final", "version": 1}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], 2);

        let (status, _) =
            send(&app, json_req(Method::PATCH, &uri, json!({"summary": "x", "version": 1}))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(&app, get_req(&format!("{}?userId=u7", uri))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            state.cache.recently_viewed("u7").await,
            vec![record.id.to_string()]
        );

        let (status, body) = send(&app, get_req(&format!("/documents/{}", Uuid::new_v4()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().starts_with("Resource not found"));
        let (status, _) = send(&app, get_req("/documents/not-a-uuid")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_analyze_cached_in_full_mode() {
        let (app, _) = full_app();
        let req = || json_req(Method::POST, "/analyze", json!({"text": "abc", "kind": "sentiment"}));
        let (status, first) = send(&app, req()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first, json!({"kind": "sentiment", "result": "sentiment of 3 chars", "cached": false}));
        let (_, second) = send(&app, req()).await;
        assert_eq!(second["cached"], true);

        let (status, _) =
            send(&app, json_req(Method::POST, "/analyze", json!({"text": "abc", "kind": "poem"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_analyze_in_fallback_mode() {
        let (app, _) = fallback_app();
        let (status, body) = send(
            &app,
            json_req(Method::POST, "/analyze", json!({"text": "hello", "kind": "summary"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], "hello");

        let (status, body) = send(
            &app,
            json_req(Method::POST, "/analyze", json!({"text": "hello", "kind": "bullet_points"})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            body["error"],
            "The service is temporarily unavailable, retry later"
        );
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (app, _) = fallback_app();
        let (status, _) = send(
            &app,
            json_req(Method::POST, "/session", json!({"userId": "u1", "data": {"theme": "dark"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, get_req("/session/u1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"theme": "dark"}));

        let delete = || {
            HttpRequest::builder()
                .method(Method::DELETE)
                .uri("/session/u1")
                .body(Body::empty())
                .unwrap()
        };
        assert_eq!(send(&app, delete()).await.0, StatusCode::NO_CONTENT);
        assert_eq!(send(&app, delete()).await.0, StatusCode::NO_CONTENT);
        assert_eq!(send(&app, get_req("/session/u1")).await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_reports_mode() {
        let (app, _) = fallback_app();
        let (status, body) = send(&app, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "fallback");
        assert_eq!(body["cache"], "memory");
    }

    #[tokio::test]
    async fn test_panics_render_error_envelope() {
        async fn boom() -> &'static str {
            panic!("boom")
        }
        let router: Router = Router::new().route("/boom", get(boom));
        let app = with_layers(router, CorsLayer::new(), 1024);
        let (status, body) = send(&app, get_req("/boom")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }

    async fn allow_origin(cors: CorsLayer, origin: &str) -> Option<String> {
        let (app, _) = fallback_app();
        let app = with_layers(app, cors, 1024);
        let req = HttpRequest::builder()
            .uri("/health")
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_cors_policy() {
        let empty = CorsCfg::default();
        assert_eq!(
            allow_origin(cors_layer(&empty, false), "https://any.example").await.as_deref(),
            Some("*")
        );
        assert_eq!(allow_origin(cors_layer(&empty, true), "https://any.example").await, None);

        let listed = CorsCfg {
            allowed_origins: vec!["https://app.example.com".into()],
        };
        assert_eq!(
            allow_origin(cors_layer(&listed, true), "https://app.example.com")
                .await
                .as_deref(),
            Some("https://app.example.com")
        );
        assert_eq!(allow_origin(cors_layer(&listed, true), "https://evil.example").await, None);
    }
}
