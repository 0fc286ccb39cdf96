//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::{
    error::ApiError,
    web::{middleware::CurrentUser, state::AppState},
};
use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use studypod_core::{
    domain::{
        ArtifactKind, ChatTurn, Citation, Notebook, NotebookScope, RetrievalStrategy, TurnTiming,
    },
    ports::PortError,
    GeneratedArtifact, IngestReport,
};
use tracing::info;
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        create_notebook_handler,
        list_notebooks_handler,
        get_notebook_handler,
        delete_notebook_handler,
        upload_new_notebook_handler,
        upload_source_handler,
        add_url_source_handler,
        delete_source_handler,
        chat_history_handler,
        clear_chat_handler,
        chat_handler,
        generate_report_handler,
        generate_quiz_handler,
        generate_podcast_handler,
        list_artifacts_handler,
        get_artifact_handler,
        delete_artifact_handler,
    ),
    components(
        schemas(CreateNotebookRequest, AddUrlRequest, ChatRequest, ChatResponse, QuizRequest)
    ),
    tags(
        (name = "StudyPod API", description = "Notebooks, document ingestion, grounded chat and study artifacts.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateNotebookRequest {
    pub title: String,
}

#[derive(Deserialize, ToSchema)]
pub struct AddUrlRequest {
    pub url: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ChatRequest {
    pub question: String,
    /// `naive`, `hyde`, `reranking` or `multi_query`; anything else means `naive`.
    #[serde(default)]
    pub strategy: Option<String>,
}

/// A grounded answer together with the passages it was built from.
#[derive(Serialize, ToSchema)]
pub struct ChatResponse {
    pub answer: String,
    #[schema(value_type = Vec<Object>)]
    pub citations: Vec<Citation>,
    #[schema(value_type = String)]
    pub strategy: RetrievalStrategy,
    pub chunks_considered: usize,
    pub model: String,
    pub fallback_used: bool,
    #[schema(value_type = Object)]
    pub timing: TurnTiming,
}

fn default_num_questions() -> usize {
    5
}

#[derive(Deserialize, ToSchema)]
pub struct QuizRequest {
    #[serde(default = "default_num_questions")]
    pub num_questions: usize,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ArtifactQuery {
    /// Restricts the listing to `report`, `quiz` or `podcast`.
    pub kind: Option<String>,
}

/// The notebook a first upload created, with the ingested source.
#[derive(Serialize)]
struct FirstUploadResponse {
    notebook: Notebook,
    source: IngestReport,
}

/// The parts of a multipart upload the handlers use.
struct Upload {
    title: Option<String>,
    file_name: String,
    data: Bytes,
}

/// Reads the first part carrying a file name, plus an optional `title` text part.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut title = None;
    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read multipart data: {}", e)))?
    {
        match field.file_name().map(str::to_string) {
            Some(file_name) if file.is_none() => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read file bytes: {}", e)))?;
                file = Some((file_name, data));
            }
            Some(_) => {}
            None if field.name() == Some("title") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read title: {}", e)))?;
                title = Some(text);
            }
            None => {}
        }
    }
    let (file_name, data) =
        file.ok_or_else(|| ApiError::BadRequest("multipart form must include a file".to_string()))?;
    Ok(Upload {
        title,
        file_name,
        data,
    })
}

/// A notebook plus the number of chunks currently in its index.
#[derive(Serialize)]
struct NotebookDetails {
    #[serde(flatten)]
    notebook: Notebook,
    indexed_chunks: usize,
}

fn parse_kind(raw: &str) -> Result<ArtifactKind, ApiError> {
    raw.parse::<ArtifactKind>().map_err(ApiError::BadRequest)
}

fn content_type_for(filename: &str) -> &'static str {
    if filename.to_ascii_lowercase().ends_with(".mp3") {
        "audio/mpeg"
    } else {
        "text/markdown; charset=utf-8"
    }
}

//=========================================================================================
// Notebook Handlers
//=========================================================================================

/// Create a notebook.
#[utoipa::path(
    post,
    path = "/notebooks",
    request_body = CreateNotebookRequest,
    responses(
        (status = 201, description = "Notebook created", body = Object),
        (status = 400, description = "Title has no usable characters"),
        (status = 409, description = "A notebook with this title already exists")
    ),
    params(("x-username" = String, Header, description = "The user making the request."))
)]
pub async fn create_notebook_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Json(payload): Json<CreateNotebookRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let notebook = app_state
        .notebooks
        .create_notebook(&username, &payload.title)
        .await?;
    Ok((StatusCode::CREATED, Json(notebook)))
}

/// List the caller's notebooks, newest first.
#[utoipa::path(
    get,
    path = "/notebooks",
    responses((status = 200, description = "The caller's notebooks", body = [Object])),
    params(("x-username" = String, Header, description = "The user making the request."))
)]
pub async fn list_notebooks_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
) -> Result<Json<Vec<Notebook>>, ApiError> {
    Ok(Json(app_state.notebooks.list_notebooks(&username).await?))
}

/// Fetch one notebook with its sources.
#[utoipa::path(
    get,
    path = "/notebooks/{id}",
    responses(
        (status = 200, description = "The notebook", body = Object),
        (status = 404, description = "No such notebook")
    ),
    params(
        ("id" = Uuid, Path, description = "Notebook id"),
        ("x-username" = String, Header, description = "The user making the request.")
    )
)]
pub async fn get_notebook_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let notebook = app_state.notebook(&username, id).await?;
    let indexed_chunks = app_state.index.count(&notebook.scope()).await?;
    Ok(Json(NotebookDetails {
        notebook,
        indexed_chunks,
    }))
}

/// Delete a notebook with its sources, index, chat and artifacts.
#[utoipa::path(
    delete,
    path = "/notebooks/{id}",
    responses(
        (status = 204, description = "Notebook deleted"),
        (status = 404, description = "No such notebook")
    ),
    params(
        ("id" = Uuid, Path, description = "Notebook id"),
        ("x-username" = String, Header, description = "The user making the request.")
    )
)]
pub async fn delete_notebook_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let scope = app_state.notebook(&username, id).await?.scope();
    app_state.index.drop_notebook(&scope).await?;
    app_state.notebooks.delete_notebook(&scope).await?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Source Handlers
//=========================================================================================

/// Start a notebook from its first document.
///
/// Accepts a multipart/form-data request with the file and an optional `title`
/// field; without a title the notebook is named after the file.
#[utoipa::path(
    post,
    path = "/notebooks/upload",
    request_body(content_type = "multipart/form-data", description = "The first document and an optional title."),
    responses(
        (status = 201, description = "Notebook created and source ingested", body = Object),
        (status = 400, description = "Unsupported file type, empty upload or file too large"),
        (status = 409, description = "A notebook with this title already exists"),
        (status = 422, description = "No text could be extracted")
    ),
    params(("x-username" = String, Header, description = "The user making the request."))
)]
pub async fn upload_new_notebook_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let upload = read_upload(multipart).await?;
    let (notebook, source) = app_state
        .pipeline
        .ingest_first_upload(&username, upload.title.as_deref(), &upload.file_name, &upload.data)
        .await?;
    info!(notebook_id = %notebook.id, source_id = %source.source_id, "Notebook created from first upload");
    Ok((StatusCode::CREATED, Json(FirstUploadResponse { notebook, source })))
}

/// Upload a PDF, PPTX or TXT file and index it.
///
/// Accepts a multipart/form-data request; the first part carrying a file name is used.
#[utoipa::path(
    post,
    path = "/notebooks/{id}/sources",
    request_body(content_type = "multipart/form-data", description = "The document to upload."),
    responses(
        (status = 201, description = "Source ingested", body = Object),
        (status = 400, description = "Unsupported file type, empty upload or file too large"),
        (status = 404, description = "No such notebook"),
        (status = 422, description = "No text could be extracted")
    ),
    params(
        ("id" = Uuid, Path, description = "Notebook id"),
        ("x-username" = String, Header, description = "The user making the request.")
    )
)]
pub async fn upload_source_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<IngestReport>), ApiError> {
    let scope = NotebookScope::new(username, id);
    let upload = read_upload(multipart).await?;
    let report = app_state
        .pipeline
        .ingest_file(&scope, &upload.file_name, &upload.data)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// Fetch a web page and index its text.
#[utoipa::path(
    post,
    path = "/notebooks/{id}/sources/url",
    request_body = AddUrlRequest,
    responses(
        (status = 201, description = "Page ingested", body = Object),
        (status = 400, description = "Not an http(s) URL"),
        (status = 422, description = "The page could not be fetched or had no text")
    ),
    params(
        ("id" = Uuid, Path, description = "Notebook id"),
        ("x-username" = String, Header, description = "The user making the request.")
    )
)]
pub async fn add_url_source_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddUrlRequest>,
) -> Result<(StatusCode, Json<IngestReport>), ApiError> {
    let scope = NotebookScope::new(username, id);
    let report = app_state.pipeline.ingest_url(&scope, &payload.url).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// Remove a source and its chunks.
#[utoipa::path(
    delete,
    path = "/notebooks/{id}/sources/{source_id}",
    responses(
        (status = 200, description = "Source removed", body = Object),
        (status = 404, description = "No such notebook or source")
    ),
    params(
        ("id" = Uuid, Path, description = "Notebook id"),
        ("source_id" = String, Path, description = "File name or URL of the source (percent-encoded)"),
        ("x-username" = String, Header, description = "The user making the request.")
    )
)]
pub async fn delete_source_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Path((id, source_id)): Path<(Uuid, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let scope = NotebookScope::new(username, id);
    let removed = app_state.pipeline.remove_source(&scope, &source_id).await?;
    Ok(Json(json!({ "source_id": source_id, "removed_chunks": removed })))
}

//=========================================================================================
// Chat Handlers
//=========================================================================================

/// The notebook's chat history, oldest first.
#[utoipa::path(
    get,
    path = "/notebooks/{id}/chat",
    responses((status = 200, description = "Chat turns", body = [Object])),
    params(
        ("id" = Uuid, Path, description = "Notebook id"),
        ("x-username" = String, Header, description = "The user making the request.")
    )
)]
pub async fn chat_history_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ChatTurn>>, ApiError> {
    let scope = app_state.notebook(&username, id).await?.scope();
    Ok(Json(app_state.chats.history(&scope).await?))
}

/// Clear the notebook's chat history.
#[utoipa::path(
    delete,
    path = "/notebooks/{id}/chat",
    responses((status = 200, description = "Number of turns removed", body = Object)),
    params(
        ("id" = Uuid, Path, description = "Notebook id"),
        ("x-username" = String, Header, description = "The user making the request.")
    )
)]
pub async fn clear_chat_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let scope = app_state.notebook(&username, id).await?.scope();
    let removed = app_state.chats.clear(&scope).await?;
    Ok(Json(json!({ "removed": removed })))
}

/// Ask a question and receive the complete grounded answer.
#[utoipa::path(
    post,
    path = "/notebooks/{id}/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "The answer", body = ChatResponse),
        (status = 400, description = "Blank question"),
        (status = 404, description = "No such notebook"),
        (status = 503, description = "No language model could answer")
    ),
    params(
        ("id" = Uuid, Path, description = "Notebook id"),
        ("x-username" = String, Header, description = "The user making the request.")
    )
)]
pub async fn chat_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let started = Instant::now();
    let scope = app_state.notebook(&username, id).await?.scope();
    let strategy = payload
        .strategy
        .as_deref()
        .map(RetrievalStrategy::parse_lenient)
        .unwrap_or_default();

    let history = app_state
        .chats
        .recent(&scope, app_state.config.rag.history_window)
        .await?;
    let answer = app_state
        .engine
        .answer(&scope, &payload.question, strategy, &history)
        .await?;
    let timing = TurnTiming {
        retrieval_ms: answer.retrieval_ms,
        generation_ms: answer.generation_ms,
        total_ms: started.elapsed().as_secs_f64() * 1000.0,
    };

    app_state.chats.append(&scope, ChatTurn::user(payload.question)).await?;
    let turn = ChatTurn {
        strategy: Some(answer.strategy),
        model: Some(answer.model.clone()),
        timing: Some(timing),
        ..ChatTurn::assistant(answer.answer.clone(), answer.citations.clone())
    };
    app_state.chats.append(&scope, turn).await?;
    app_state.notebooks.touch(&scope).await?;

    info!(scope = %scope, strategy = %strategy, total_ms = timing.total_ms, "Chat answered");
    Ok(Json(ChatResponse {
        answer: answer.answer,
        citations: answer.citations,
        strategy: answer.strategy,
        chunks_considered: answer.chunks_considered,
        model: answer.model,
        fallback_used: answer.fallback_used,
        timing,
    }))
}

//=========================================================================================
// Artifact Handlers
//=========================================================================================

/// Generate a Markdown study report from the notebook's sources.
#[utoipa::path(
    post,
    path = "/notebooks/{id}/artifacts/report",
    responses(
        (status = 201, description = "Report generated", body = Object),
        (status = 400, description = "The notebook has no sources")
    ),
    params(
        ("id" = Uuid, Path, description = "Notebook id"),
        ("x-username" = String, Header, description = "The user making the request.")
    )
)]
pub async fn generate_report_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<GeneratedArtifact>), ApiError> {
    let scope = app_state.notebook(&username, id).await?.scope();
    let artifact = app_state.generator.generate_report(&scope).await?;
    Ok((StatusCode::CREATED, Json(artifact)))
}

/// Generate a multiple-choice quiz.
#[utoipa::path(
    post,
    path = "/notebooks/{id}/artifacts/quiz",
    request_body = QuizRequest,
    responses(
        (status = 201, description = "Quiz generated", body = Object),
        (status = 400, description = "Bad question count or no sources")
    ),
    params(
        ("id" = Uuid, Path, description = "Notebook id"),
        ("x-username" = String, Header, description = "The user making the request.")
    )
)]
pub async fn generate_quiz_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<QuizRequest>,
) -> Result<(StatusCode, Json<GeneratedArtifact>), ApiError> {
    let scope = app_state.notebook(&username, id).await?.scope();
    let artifact = app_state
        .generator
        .generate_quiz(&scope, payload.num_questions)
        .await?;
    Ok((StatusCode::CREATED, Json(artifact)))
}

/// Generate a two-host podcast script and its audio.
#[utoipa::path(
    post,
    path = "/notebooks/{id}/artifacts/podcast",
    responses(
        (status = 201, description = "Podcast generated", body = Object),
        (status = 400, description = "The notebook has no sources"),
        (status = 503, description = "Speech synthesis unavailable")
    ),
    params(
        ("id" = Uuid, Path, description = "Notebook id"),
        ("x-username" = String, Header, description = "The user making the request.")
    )
)]
pub async fn generate_podcast_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<GeneratedArtifact>), ApiError> {
    let scope = app_state.notebook(&username, id).await?.scope();
    let artifact = app_state.generator.generate_podcast(&scope).await?;
    Ok((StatusCode::CREATED, Json(artifact)))
}

/// List generated artifacts, newest first.
#[utoipa::path(
    get,
    path = "/notebooks/{id}/artifacts",
    responses((status = 200, description = "Artifacts", body = [Object])),
    params(
        ("id" = Uuid, Path, description = "Notebook id"),
        ArtifactQuery,
        ("x-username" = String, Header, description = "The user making the request.")
    )
)]
pub async fn list_artifacts_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Query(query): Query<ArtifactQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = app_state.notebook(&username, id).await?.scope();
    let kind = query.kind.as_deref().map(parse_kind).transpose()?;
    Ok(Json(app_state.artifacts.list(&scope, kind).await?))
}

/// Download an artifact file.
#[utoipa::path(
    get,
    path = "/notebooks/{id}/artifacts/{kind}/{filename}",
    responses(
        (status = 200, description = "The file (Markdown or MP3)"),
        (status = 404, description = "No such artifact")
    ),
    params(
        ("id" = Uuid, Path, description = "Notebook id"),
        ("kind" = String, Path, description = "report, quiz or podcast"),
        ("filename" = String, Path, description = "Artifact file name"),
        ("x-username" = String, Header, description = "The user making the request.")
    )
)]
pub async fn get_artifact_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Path((id, kind, filename)): Path<(Uuid, String, String)>,
) -> Result<Response, ApiError> {
    let scope = app_state.notebook(&username, id).await?.scope();
    let kind = parse_kind(&kind)?;
    let bytes = app_state.artifacts.get_bytes(&scope, kind, &filename).await?;
    Ok(([(header::CONTENT_TYPE, content_type_for(&filename))], bytes).into_response())
}

/// Delete an artifact file.
#[utoipa::path(
    delete,
    path = "/notebooks/{id}/artifacts/{kind}/{filename}",
    responses(
        (status = 204, description = "Artifact deleted"),
        (status = 404, description = "No such artifact")
    ),
    params(
        ("id" = Uuid, Path, description = "Notebook id"),
        ("kind" = String, Path, description = "report, quiz or podcast"),
        ("filename" = String, Path, description = "Artifact file name"),
        ("x-username" = String, Header, description = "The user making the request.")
    )
)]
pub async fn delete_artifact_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Path((id, kind, filename)): Path<(Uuid, String, String)>,
) -> Result<StatusCode, ApiError> {
    let scope = app_state.notebook(&username, id).await?.scope();
    let kind = parse_kind(&kind)?;
    if app_state.artifacts.delete(&scope, kind, &filename).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(PortError::NotFound(format!("artifact {}/{}", kind.dir_name(), filename)).into())
    }
}
