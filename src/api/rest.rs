use crate::config::ApiConfig;
use crate::db::models::{AlertRecord, ScanRecord};
use crate::db::repositories::alerts::AlertsRepository;
use crate::db::repositories::scans::ScansRepository;
use crate::error::Error;
use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::info;
use serde::Serialize;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: Arc<PgPool>,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
    pub status: u16,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(_) => ApiError {
                message: err.to_string(),
                status: StatusCode::NOT_FOUND.as_u16(),
            },
            Error::Config(_) | Error::Parse(_) => ApiError {
                message: err.to_string(),
                status: StatusCode::BAD_REQUEST.as_u16(),
            },
            _ => ApiError {
                message: err.to_string(),
                status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            },
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(err) = err.downcast_ref::<Error>() {
            return (*err).clone().into();
        }

        ApiError {
            message: err.to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        }
    }
}

/// Implement IntoResponse for ApiError
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(self);
        (status, body).into_response()
    }
}

/// Read-only HTTP surface over the tables the pipeline writes. Shares the
/// database pool with the ingestion loop but is otherwise independent of it.
pub struct RestApi {
    config: ApiConfig,
    db_pool: Arc<PgPool>,
}

impl RestApi {
    pub fn new(config: &ApiConfig, db_pool: Arc<PgPool>) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            db_pool,
        })
    }

    pub async fn run(&self) -> Result<()> {
        let state = AppState {
            db_pool: Arc::clone(&self.db_pool),
        };

        // Allow the dashboard front-end from any origin
        use std::time::Duration;
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(false)
            .max_age(Duration::from_secs(3600));

        let app = Router::new()
            .route("/health", get(health))
            .route("/api/scans", get(recent_scans))
            .route("/api/alerts", get(recent_alerts))
            .with_state(state)
            .layer(cors);

        // Build the server address
        let addr = self.config.address.clone() + ":" + &self.config.port.to_string();
        let addr: SocketAddr = addr.parse()?;

        info!("API server listening on {}", addr);

        let listener = TcpListener::bind(addr).await?;

        axum::Server::from_tcp(listener.into_std()?)?
            .serve(app.into_make_service())
            .await?;

        Ok(())
    }
}

async fn health(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let database_ok = sqlx::query("SELECT 1")
        .execute(&*state.db_pool)
        .await
        .is_ok();

    Ok(Json(serde_json::json!({
        "status": if database_ok { "healthy" } else { "degraded" },
        "database": database_ok,
    })))
}

async fn recent_scans(State(state): State<AppState>) -> ApiResult<Json<Vec<ScanRecord>>> {
    let repo = ScansRepository::new(Arc::clone(&state.db_pool));
    let scans = repo.recent(50).await?;

    Ok(Json(scans))
}

async fn recent_alerts(State(state): State<AppState>) -> ApiResult<Json<Vec<AlertRecord>>> {
    let repo = AlertsRepository::new(Arc::clone(&state.db_pool));
    let alerts = repo.recent(50).await?;

    Ok(Json(alerts))
}
