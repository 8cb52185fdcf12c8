//! Axum JSON API for the PPDA reporting service, plus a small HTML landing page.

pub mod auth;
pub mod error;
mod labels;
pub mod policy;
mod resources;

use std::sync::Arc;

use askama::Template;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ppda_core::{
    AnnualReportQuery, IndicatorQuery, IndicatorSource, OrganizationQuery, PlanQuery,
};
use ppda_storage::{AttachmentStore, Store};
use ppda_sync::{IngestError, IngestionPipeline};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use auth::{AuthConfig, Caller};
pub use error::AppError;
pub use labels::Presented;
pub use policy::{Access, Resource};
pub use resources::{summarize_by_period, Page, PageParams, PeriodSummary};

use policy::{authorize, permits};

pub const CRATE_NAME: &str = "ppda-web";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub attachments: AttachmentStore,
    pub ingestion: Arc<IngestionPipeline>,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        attachments: AttachmentStore,
        ingestion: Arc<IngestionPipeline>,
    ) -> Self {
        Self {
            store,
            attachments,
            ingestion,
            auth: AuthConfig::default(),
        }
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }
}

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl WebConfig {
    pub fn from_env() -> Self {
        let port: u16 = std::env::var("PPDA_WEB_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8000);
        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| parse_origins(&v))
            .unwrap_or_default();
        Self {
            port,
            cors_allowed_origins,
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(ToString::to_string)
        .collect()
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/frontend", get(frontend_handler))
        .route("/api/ingest/{source}", post(ingest_handler))
        .merge(resources::routes())
        .with_state(Arc::new(state))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Full router with CORS and request tracing.
pub fn router(state: AppState, config: &WebConfig) -> Router {
    app(state)
        .layer(cors_layer(&config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(state: AppState, config: &WebConfig) -> anyhow::Result<()> {
    if state.auth.is_open() {
        warn!("PPDA_API_SECRET not set, every request is served as an administrator");
    }
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, backend = state.store.backend(), "http server listening");
    axum::serve(listener, router(state, config))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let sources: Vec<_> = state
        .ingestion
        .sources()
        .into_iter()
        .map(|s| s.as_str())
        .collect();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.store.backend(),
        "sources": sources,
    }))
}

async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    source: Result<Path<String>, PathRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    authorize(&caller, Resource::Ingestion, Access::Write)?;
    let Path(slug) = source?;
    let source = IndicatorSource::from_slug(&slug).ok_or(AppError::NotFound)?;

    match state.ingestion.trigger(source).await {
        Ok(summary) => Ok(Json(json!({
            "mensaje": format!("Datos de {source} integrados correctamente."),
            "indicadores": summary.persisted,
            "run_id": summary.run_id,
        }))),
        Err(err) => Err(ingest_error(source, err)),
    }
}

fn ingest_error(source: IndicatorSource, err: IngestError) -> AppError {
    let (status, message) = match &err {
        IngestError::NoData(_) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        IngestError::Validation(inner) => {
            (StatusCode::BAD_REQUEST, format!("Error de validación: {inner}"))
        }
        IngestError::UnknownSource(_) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        IngestError::Persistence(inner) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error al integrar datos de {source}: {inner}"),
        ),
    };
    warn!(%source, %status, error = %err, "ingestion trigger failed");
    AppError::Ingestion { status, message }
}

struct OrganizationRow {
    code: &'static str,
    name: &'static str,
}

struct SourceRow {
    name: &'static str,
    indicators: usize,
}

/// Landing page. Each section is only filled in when the caller may read
/// the resource behind it.
#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    organizations: Option<Vec<OrganizationRow>>,
    total_plans: Option<usize>,
    total_indicators: Option<usize>,
    sources: Option<Vec<SourceRow>>,
    periods: Option<Vec<PeriodSummary>>,
    resources: Vec<&'static str>,
}

async fn frontend_handler(State(state): State<Arc<AppState>>, caller: Caller) -> Response {
    match load_index(&state, &caller).await {
        Ok(tpl) => render_html(tpl),
        Err(err) => server_error(err),
    }
}

async fn load_index(state: &AppState, caller: &Caller) -> anyhow::Result<IndexTemplate> {
    let store = state.store.as_ref();
    let can_read = |resource| permits(caller, resource, Access::Read);

    let organizations = if can_read(Resource::Organizations) {
        let rows = store
            .organizations()
            .list(&OrganizationQuery::default())
            .await?
            .into_iter()
            .map(|o| OrganizationRow {
                code: o.code.as_str(),
                name: o.code.display_name(),
            })
            .collect();
        Some(rows)
    } else {
        None
    };

    let total_plans = if can_read(Resource::Plans) {
        Some(store.plans().list(&PlanQuery::default()).await?.len())
    } else {
        None
    };

    let (total_indicators, sources) = if can_read(Resource::Indicators) {
        let indicators = store.indicators().list(&IndicatorQuery::default()).await?;
        let sources = IndicatorSource::ALL
            .iter()
            .map(|source| SourceRow {
                name: source.as_str(),
                indicators: indicators
                    .iter()
                    .filter(|i| i.source == Some(*source))
                    .count(),
            })
            .collect();
        (Some(indicators.len()), Some(sources))
    } else {
        (None, None)
    };

    let periods = if can_read(Resource::AnnualReports) {
        let reports = store
            .annual_reports()
            .list(&AnnualReportQuery::default())
            .await?;
        Some(summarize_by_period(&reports))
    } else {
        None
    };

    Ok(IndexTemplate {
        organizations,
        total_plans,
        total_indicators,
        sources,
        periods,
        resources: Resource::ALL
            .iter()
            .filter(|r| **r != Resource::Ingestion && can_read(**r))
            .map(|r| r.path())
            .collect(),
    })
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Error del servidor: {err}")),
    )
        .into_response()
}
