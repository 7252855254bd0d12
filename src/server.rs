use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;

use crate::combiner::combine;
use crate::config::ServerConfig;
use crate::error::{AppError, AppResult};
use crate::query::list_sorted;
use crate::reconcile::Reconciler;
use crate::store::Store;
use crate::types::{CombinedRecord, ResetRequest, SortKey, Source, UpdateBody};

/// Shared handler state. Only the database location is shared; every request
/// opens and drops its own [`Store`].
#[derive(Debug, Clone)]
pub struct AppState {
    db_path: Arc<PathBuf>,
}

impl AppState {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: Arc::new(db_path.into()),
        }
    }

    /// Runs `f` on a blocking thread against a freshly opened store.
    async fn with_store<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Store) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = Arc::clone(&self.db_path);
        tokio::task::spawn_blocking(move || {
            let store = Store::open(&path)?;
            f(&store)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Storage task failed: {e}")))?
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
    #[serde(default)]
    pub filter_by: SortKey,
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/pharmeasy", get(pharmeasy_rows))
        .route("/apollo", get(apollo_rows))
        .route(
            "/create_and_update",
            get(combined_view).post(create_and_update),
        )
        .route("/api/reset-entry", post(reset_entry))
}

/// Builds the application router. Every API route is served both at the root
/// and under `/api`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(welcome))
        .merge(api_routes())
        .nest("/api", api_routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(config: ServerConfig) -> std::io::Result<()> {
    let app = router(AppState::new(&config.database_path));
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;

    log::info!(
        "Serving pharmacy comparison API on {} (database: {})",
        config.bind_address,
        config.database_path.display()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for shutdown signal: {e}");
            }
            log::info!("Shutting down");
        })
        .await
}

async fn welcome() -> Json<Value> {
    Json(json!({ "message": "Welcome to the Pharmacy Comparison API" }))
}

async fn source_rows(state: &AppState, source: Source) -> AppResult<Json<Vec<Value>>> {
    let rows = state
        .with_store(move |store| Ok(store.source_records(source)?))
        .await?;
    Ok(Json(rows.iter().map(|r| r.to_row_json(source)).collect()))
}

async fn pharmeasy_rows(State(state): State<AppState>) -> AppResult<Json<Vec<Value>>> {
    source_rows(&state, Source::Pharmeasy).await
}

async fn apollo_rows(State(state): State<AppState>) -> AppResult<Json<Vec<Value>>> {
    source_rows(&state, Source::Apollo).await
}

async fn combined_view(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> AppResult<Json<Vec<CombinedRecord>>> {
    let records = state
        .with_store(|store| {
            combine(store)?;
            Ok(store.combined_records()?)
        })
        .await?;
    Ok(Json(list_sorted(records, params.filter_by)))
}

/// Applies one or many overrides, then returns the sorted combined view.
async fn create_and_update(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
    body: Bytes,
) -> AppResult<Json<Vec<CombinedRecord>>> {
    let requests = if body.iter().all(u8::is_ascii_whitespace) {
        Vec::new()
    } else {
        serde_json::from_slice::<UpdateBody>(&body)
            .map_err(|e| AppError::Internal(e.to_string()))?
            .into_requests()
    };

    let records = state
        .with_store(move |store| {
            combine(store)?;
            let outcomes = Reconciler::new(store).apply_all(&requests)?;
            log::debug!("Applied {} override request(s): {:?}", outcomes.len(), outcomes);
            Ok(store.combined_records()?)
        })
        .await?;
    Ok(Json(list_sorted(records, params.filter_by)))
}

async fn reset_entry(State(state): State<AppState>, body: Bytes) -> AppResult<Json<Value>> {
    let request: ResetRequest =
        serde_json::from_slice(&body).map_err(|e| AppError::Internal(e.to_string()))?;

    let (Some(name), Some(brand)) = (
        request.name.filter(|s| !s.is_empty()),
        request.brand.filter(|s| !s.is_empty()),
    ) else {
        return Err(AppError::BadRequest("Missing name or brand".to_string()));
    };

    state
        .with_store(move |store| {
            store.ensure_combined_table()?;
            Reconciler::new(store).reset(&name, &brand)?;
            Ok(())
        })
        .await?;
    Ok(Json(json!({ "status": "success" })))
}
