use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use dentflow::config::AppConfig;
use dentflow::handlers;
use dentflow::services::ai::openai::OpenAiProvider;
use dentflow::services::ai::LlmProvider;
use dentflow::state::AppState;
use dentflow::store::{ConversationLog, SnapshotStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let store = SnapshotStore::open(&config.data_dir)?;
    let conversations = ConversationLog::open(&config.data_dir)?;

    let llm: Option<Box<dyn LlmProvider>> = if config.llm_configured() {
        tracing::info!(
            model = %config.llm_model,
            base_url = %config.llm_base_url,
            "using OpenAI-compatible LLM provider"
        );
        Some(Box::new(OpenAiProvider::new(
            config.llm_api_key.clone(),
            config.llm_base_url.clone(),
            config.llm_model.clone(),
        )))
    } else {
        tracing::warn!(
            "LLM_API_KEY, LLM_BASE_URL and LLM_MODEL are not all set; replies fall back to canned responses"
        );
        None
    };

    let state = Arc::new(AppState {
        store: Mutex::new(store),
        conversations: Mutex::new(conversations),
        llm,
        config: config.clone(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/chat", post(handlers::chat::chat))
        .route(
            "/appointments",
            get(handlers::appointments::list_appointments)
                .post(handlers::appointments::create_appointment),
        )
        .route(
            "/appointments/suggestions",
            get(handlers::appointments::appointment_suggestions),
        )
        .route(
            "/appointment/:id/confirm",
            post(handlers::appointments::confirm_appointment),
        )
        .route(
            "/appointment/:id/cancel",
            post(handlers::appointments::cancel_appointment),
        )
        .route(
            "/appointment/:id/reschedule",
            post(handlers::appointments::reschedule_appointment),
        )
        .route("/patients", get(handlers::patients::list_patients))
        .route("/register-patient", post(handlers::patients::register_patient))
        .route("/find-patient", post(handlers::patients::find_patient))
        .route("/availability", get(handlers::availability::get_availability))
        .route(
            "/conversation/:id",
            get(handlers::conversations::get_conversation),
        )
        .route(
            "/conversations",
            get(handlers::conversations::list_conversations),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
