use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream;
use ragserve_core::{
    GenerationEvent, GenerationOrchestrator, OllamaEmbedder, OllamaGenerator, QdrantStore,
    RetrievalService,
};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

pub struct AppState {
    pub retrieval: RetrievalService<OllamaEmbedder, QdrantStore>,
    pub orchestrator: GenerationOrchestrator<OllamaGenerator>,
    pub model: String,
    pub top_k: usize,
}

#[derive(Deserialize)]
struct AskParams {
    q: String,
    #[serde(default = "default_tenant")]
    tenant: String,
}

fn default_tenant() -> String {
    "demo".to_string()
}

pub async fn serve(bind: &str, state: AppState) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/ask", get(ask))
        .with_state(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = bind, "ragserve listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Streams the grounded answer as plain text. Failures before the stream
/// opens become a 500 with a plain error body; failures mid-stream surface
/// as a final in-band error line because the status line is already gone.
async fn ask(State(state): State<Arc<AppState>>, Query(params): Query<AskParams>) -> Response {
    let accepted = Instant::now();

    let context = match state
        .retrieval
        .retrieve(&params.q, &params.tenant, state.top_k)
        .await
    {
        Ok(context) => context,
        Err(error) => {
            error!(%error, tenant = %params.tenant, "retrieval failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Server error: {error}"),
            )
                .into_response();
        }
    };

    let events = state
        .orchestrator
        .generate(&context.context_text(), &params.q, &state.model)
        .await;

    info!(
        tenant = %params.tenant,
        hit_count = context.hits.len(),
        embed_ms = context.timings.embed.as_millis() as u64,
        search_ms = context.timings.search.as_millis() as u64,
        setup_ms = accepted.elapsed().as_millis() as u64,
        "streaming answer"
    );

    // the receiver closes right after the terminal event, ending the body;
    // dropping it (client disconnect) cancels the backend read
    let body = Body::from_stream(stream::unfold(events, |mut events| async move {
        let event = events.recv().await?;
        let text = match event {
            GenerationEvent::Fragment(text) => text,
            GenerationEvent::Done => String::new(),
            GenerationEvent::Error(message) => format!("\n[error] {message}"),
        };
        Some((Ok::<_, Infallible>(text), events))
    }));

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}
