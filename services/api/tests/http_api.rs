//! End-to-end checks of the HTTP surface over the real file-based stores, with
//! the language model and the embedder replaced by deterministic stand-ins.

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use studypod_api::{
    adapters::{
        DataLayout, DocumentExtractor, FsArtifactStore, FsNotebookStore, JsonlChatStore,
        SqliteVectorIndex,
    },
    config::Config,
    web::{self, AppState, Services},
};
use studypod_core::domain::{ChatMessage, LlmResponse};
use studypod_core::ports::{EmbeddingService, LlmService, PortResult, TextStream};
use tower::ServiceExt;

const ANSWER: &str = "Mitochondria produce ATP [1].";
const BOUNDARY: &str = "studypod-test-boundary";

struct ScriptedLlm;

#[async_trait]
impl LlmService for ScriptedLlm {
    async fn complete(&self, model: &str, _messages: &[ChatMessage]) -> PortResult<LlmResponse> {
        Ok(LlmResponse {
            text: ANSWER.to_string(),
            model: model.to_string(),
            usage: None,
            fallback_used: false,
        })
    }

    async fn complete_stream(&self, _model: &str, _messages: &[ChatMessage]) -> PortResult<TextStream> {
        let fragments = vec![Ok("Mitochondria ".to_string()), Ok("produce ATP [1].".to_string())];
        Ok(Box::pin(futures::stream::iter(fragments)))
    }
}

/// Letter frequencies plus a constant component, so no vector is ever zero.
struct LetterEmbedder;

#[async_trait]
impl EmbeddingService for LetterEmbedder {
    async fn embed(&self, text: &str) -> PortResult<Vec<f32>> {
        let mut vector = vec![0.0f32; 27];
        vector[26] = 1.0;
        for c in text.to_ascii_lowercase().chars().filter(char::is_ascii_lowercase) {
            vector[(c as u8 - b'a') as usize] += 1.0;
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        27
    }
}

fn app(dir: &tempfile::TempDir) -> Router {
    let data_dir = dir.path().to_string_lossy().into_owned();
    let config = Config::from_lookup(|key| match key {
        "GROQ_API_KEY" => Some("test-key".to_string()),
        "DATA_DIR" => Some(data_dir.clone()),
        _ => None,
    })
    .unwrap();

    let layout = DataLayout::new(dir.path());
    let services = Services {
        llm: Arc::new(ScriptedLlm),
        embedder: Arc::new(LetterEmbedder),
        extractor: Arc::new(DocumentExtractor::new().unwrap()),
        tts: None,
        index: Arc::new(SqliteVectorIndex::new(layout.clone())),
        notebooks: Arc::new(FsNotebookStore::new(layout.clone())),
        chats: Arc::new(JsonlChatStore::new(layout.clone())),
        artifacts: Arc::new(FsArtifactStore::new(layout)),
    };
    web::router(Arc::new(AppState::new(Arc::new(config), services)))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-username", "Alice");
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn multipart_body(file_name: &str, content: &str, title: Option<&str>) -> String {
    let mut body = String::new();
    if let Some(title) = title {
        body.push_str(&format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\n{t}\r\n",
            b = BOUNDARY,
            t = title
        ));
    }
    body.push_str(&format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
         Content-Type: text/plain\r\n\r\n{c}\r\n--{b}--\r\n",
        b = BOUNDARY,
        f = file_name,
        c = content
    ));
    body
}

async fn post_multipart(app: &Router, uri: &str, body: String) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-username", "alice")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn upload(app: &Router, notebook_id: &str, file_name: &str, content: &str) -> (StatusCode, Value) {
    let uri = format!("/notebooks/{}/sources", notebook_id);
    post_multipart(app, &uri, multipart_body(file_name, content, None)).await
}

async fn create_notebook(app: &Router, title: &str) -> String {
    let (status, body) = call(app, "POST", "/notebooks", Some(json!({ "title": title }))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn requests_without_a_username_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    let request = Request::builder().uri("/notebooks").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn usernames_with_illegal_characters_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    let request = Request::builder()
        .uri("/notebooks")
        .header("x-username", "john.doe")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn first_upload_creates_a_notebook() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);

    let body = multipart_body("cell_biology.txt", "Mitochondria are the powerhouse of the cell.", None);
    let (status, created) = post_multipart(&app, "/notebooks/upload", body).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["notebook"]["title"], "cell biology");
    assert_eq!(created["source"]["source_id"], "cell_biology.txt");

    let id = created["notebook"]["id"].as_str().unwrap();
    let (status, details) = call(&app, "GET", &format!("/notebooks/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["indexed_chunks"], 1);
    assert_eq!(details["sources"].as_array().unwrap().len(), 1);

    let body = multipart_body("notes.txt", "Ribosomes build proteins.", Some("Genetics"));
    let (status, titled) = post_multipart(&app, "/notebooks/upload", body).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(titled["notebook"]["title"], "Genetics");

    let body = multipart_body("slides.csv", "a,b", None);
    let (status, _) = post_multipart(&app, "/notebooks/upload", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, list) = call(&app, "GET", "/notebooks", None).await;
    assert_eq!(list.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn notebook_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);

    let id = create_notebook(&app, "Cell Biology").await;
    let (status, _) = call(&app, "POST", "/notebooks", Some(json!({ "title": "cell biology" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, list) = call(&app, "GET", "/notebooks", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["owner"], "alice");

    let (status, details) = call(&app, "GET", &format!("/notebooks/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["indexed_chunks"], 0);

    let (status, _) = call(&app, "DELETE", &format!("/notebooks/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = call(&app, "GET", &format!("/notebooks/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn upload_then_chat_with_citations() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    let id = create_notebook(&app, "Biology").await;

    let (status, report) = upload(
        &app,
        &id,
        "cells.txt",
        "Mitochondria are the powerhouse of the cell. They produce ATP through respiration.",
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(report["source_id"], "cells.txt");
    assert_eq!(report["chunks"], 1);

    let (status, answer) = call(
        &app,
        "POST",
        &format!("/notebooks/{}/chat", id),
        Some(json!({ "question": "What do mitochondria produce?", "strategy": "nonsense" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(answer["answer"], ANSWER);
    assert_eq!(answer["strategy"], "naive");
    assert_eq!(answer["citations"][0]["source_name"], "cells.txt");
    assert_eq!(answer["citations"][0]["referenced"], true);

    let (status, history) = call(&app, "GET", &format!("/notebooks/{}/chat", id), None).await;
    assert_eq!(status, StatusCode::OK);
    let turns = history.as_array().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0]["role"], "user");
    assert_eq!(turns[1]["model"], "llama-3.1-70b-versatile");

    let (status, cleared) = call(&app, "DELETE", &format!("/notebooks/{}/chat", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["removed"], 2);
}

#[tokio::test]
async fn unsupported_uploads_and_blank_questions_are_bad_requests() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    let id = create_notebook(&app, "Misc").await;

    let (status, _) = upload(&app, &id, "data.csv", "a,b").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        "POST",
        &format!("/notebooks/{}/chat", id),
        Some(json!({ "question": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sources_can_be_removed() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    let id = create_notebook(&app, "Removal").await;
    upload(&app, &id, "notes.txt", "Photosynthesis happens in chloroplasts.").await;

    let (status, body) = call(&app, "DELETE", &format!("/notebooks/{}/sources/notes.txt", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed_chunks"], 1);

    let (status, _) = call(&app, "DELETE", &format!("/notebooks/{}/sources/notes.txt", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn artifacts_are_generated_listed_and_downloaded() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir);
    let id = create_notebook(&app, "Study").await;

    let (status, _) = call(&app, "POST", &format!("/notebooks/{}/artifacts/report", id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    upload(&app, &id, "cells.txt", "Mitochondria are the powerhouse of the cell.").await;

    let (status, report) = call(&app, "POST", &format!("/notebooks/{}/artifacts/report", id), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let filename = report["files"][0]["filename"].as_str().unwrap().to_string();
    assert!(filename.starts_with("report_") && filename.ends_with(".md"));

    let (status, _) = call(
        &app,
        "POST",
        &format!("/notebooks/{}/artifacts/quiz", id),
        Some(json!({ "num_questions": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "POST", &format!("/notebooks/{}/artifacts/podcast", id), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, listed) = call(&app, "GET", &format!("/notebooks/{}/artifacts?kind=report", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let request = Request::builder()
        .uri(format!("/notebooks/{}/artifacts/report/{}", id, filename))
        .header("x-username", "alice")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/markdown"));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.as_ref(), ANSWER.as_bytes());

    let uri = format!("/notebooks/{}/artifacts/report/{}", id, filename);
    let (status, _) = call(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
