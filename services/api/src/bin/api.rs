//! services/api/src/bin/api.rs

use async_openai::{config::OpenAIConfig, types::SpeechModel, Client};
use axum::{
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method},
    Router,
};
use std::sync::Arc;
use studypod_api::{
    adapters::{
        llm::build_client, tts::parse_voice, DataLayout, DocumentExtractor, FastEmbedAdapter, FsArtifactStore,
        FsNotebookStore, JsonlChatStore, OpenAiChatAdapter, OpenAiTtsAdapter, SqliteVectorIndex,
    },
    config::Config,
    error::ApiError,
    web::{self, middleware::USERNAME_HEADER, ApiDoc, AppState, Services},
};
use studypod_core::ports::TextToSpeechService;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!(
        data_dir = %config.data_dir.display(),
        model = %config.rag.primary_model,
        fallback = %config.rag.fallback_model,
        "Configuration loaded. Starting server..."
    );

    // --- 2. Prepare the Data Directory ---
    tokio::fs::create_dir_all(&config.data_dir).await?;
    let layout = DataLayout::new(config.data_dir.clone());

    // --- 3. Initialize Service Adapters ---
    let llm_client = build_client(&config.groq_api_key, &config.llm_base_url);
    let llm = Arc::new(OpenAiChatAdapter::new(llm_client));

    let tts: Option<Arc<dyn TextToSpeechService>> = match &config.openai_api_key {
        Some(key) => {
            let voice = parse_voice(&config.tts_voice).ok_or_else(|| {
                ApiError::Internal(format!(
                    "Invalid TTS voice specified in config: '{}'",
                    config.tts_voice
                ))
            })?;
            let tts_client = Client::with_config(
                OpenAIConfig::new()
                    .with_api_key(key.clone())
                    .with_api_base(config.tts_base_url.clone()),
            );
            Some(Arc::new(OpenAiTtsAdapter::new(tts_client, SpeechModel::Tts1, voice)))
        }
        None => {
            warn!("OPENAI_API_KEY not set, podcast audio is disabled");
            None
        }
    };

    info!("Loading embedding model...");
    let embedder = Arc::new(FastEmbedAdapter::load(config.embedding_cache_dir.clone()).await?);
    info!("Embedding model ready.");

    let services = Services {
        llm,
        embedder,
        extractor: Arc::new(DocumentExtractor::new()?),
        tts,
        index: Arc::new(SqliteVectorIndex::new(layout.clone())),
        notebooks: Arc::new(FsNotebookStore::new(layout.clone())),
        chats: Arc::new(JsonlChatStore::new(layout.clone())),
        artifacts: Arc::new(FsArtifactStore::new(layout)),
    };

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(config.clone(), services));

    // --- 5. Create the Web Router ---
    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(USERNAME_HEADER)]);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(web::router(app_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
