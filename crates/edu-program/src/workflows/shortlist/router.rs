use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::domain::{ShortlistBatchId, ShortlistRequest};
use super::service::{ShortlistError, ShortlistService};
use super::store::{ShortlistStore, StoreError};

/// Request body for the shortlisted-count endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortlistedCountRequest {
    pub block_names: Vec<String>,
    pub year: i32,
}

/// Router builder exposing the shortlisting endpoints.
pub fn shortlist_router<S>(service: Arc<ShortlistService<S>>) -> Router
where
    S: ShortlistStore + 'static,
{
    Router::new()
        .route("/api/v1/shortlist/states", get(states_handler::<S>))
        .route(
            "/api/v1/shortlist/states/:state_name/districts",
            get(districts_handler::<S>),
        )
        .route(
            "/api/v1/shortlist/districts/:district_name/blocks",
            get(blocks_handler::<S>),
        )
        .route("/api/v1/shortlist/criteria", get(criteria_handler::<S>))
        .route(
            "/api/v1/shortlist/batches",
            get(list_batches_handler::<S>).post(create_handler::<S>),
        )
        .route(
            "/api/v1/shortlist/batches/:batch_id",
            axum::routing::delete(discard_handler::<S>),
        )
        .route(
            "/api/v1/shortlist/batches/:batch_id/freeze",
            post(freeze_handler::<S>),
        )
        .route(
            "/api/v1/shortlist/shortlisted-count",
            post(count_handler::<S>),
        )
        .with_state(service)
}

pub(crate) async fn states_handler<S>(State(service): State<Arc<ShortlistService<S>>>) -> Response
where
    S: ShortlistStore + 'static,
{
    respond(
        StatusCode::OK,
        run_blocking(service, |service| service.all_states()).await,
    )
}

pub(crate) async fn districts_handler<S>(
    State(service): State<Arc<ShortlistService<S>>>,
    Path(state_name): Path<String>,
) -> Response
where
    S: ShortlistStore + 'static,
{
    respond(
        StatusCode::OK,
        run_blocking(service, move |service| service.districts_by_state(&state_name)).await,
    )
}

pub(crate) async fn blocks_handler<S>(
    State(service): State<Arc<ShortlistService<S>>>,
    Path(district_name): Path<String>,
) -> Response
where
    S: ShortlistStore + 'static,
{
    respond(
        StatusCode::OK,
        run_blocking(service, move |service| service.blocks_by_district(&district_name)).await,
    )
}

pub(crate) async fn criteria_handler<S>(State(service): State<Arc<ShortlistService<S>>>) -> Response
where
    S: ShortlistStore + 'static,
{
    respond(
        StatusCode::OK,
        run_blocking(service, |service| service.criteria()).await,
    )
}

pub(crate) async fn list_batches_handler<S>(
    State(service): State<Arc<ShortlistService<S>>>,
) -> Response
where
    S: ShortlistStore + 'static,
{
    respond(
        StatusCode::OK,
        run_blocking(service, |service| service.list_batches()).await,
    )
}

pub(crate) async fn create_handler<S>(
    State(service): State<Arc<ShortlistService<S>>>,
    axum::Json(request): axum::Json<ShortlistRequest>,
) -> Response
where
    S: ShortlistStore + 'static,
{
    respond(
        StatusCode::CREATED,
        run_blocking(service, move |service| service.create_shortlist_batch(request)).await,
    )
}

pub(crate) async fn freeze_handler<S>(
    State(service): State<Arc<ShortlistService<S>>>,
    Path(batch_id): Path<i64>,
) -> Response
where
    S: ShortlistStore + 'static,
{
    respond(
        StatusCode::OK,
        run_blocking(service, move |service| {
            service.freeze_batch(ShortlistBatchId(batch_id))
        })
        .await,
    )
}

pub(crate) async fn discard_handler<S>(
    State(service): State<Arc<ShortlistService<S>>>,
    Path(batch_id): Path<i64>,
) -> Response
where
    S: ShortlistStore + 'static,
{
    match run_blocking(service, move |service| {
        service.discard_batch(ShortlistBatchId(batch_id))
    })
    .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn count_handler<S>(
    State(service): State<Arc<ShortlistService<S>>>,
    axum::Json(request): axum::Json<ShortlistedCountRequest>,
) -> Response
where
    S: ShortlistStore + 'static,
{
    let counted = run_blocking(service, move |service| {
        service.shortlisted_count_for_blocks_and_year(&request.block_names, request.year)
    })
    .await;
    match counted {
        Ok(count) => (StatusCode::OK, axum::Json(json!({ "count": count }))).into_response(),
        Err(response) => response,
    }
}

/// Runs a service call on the blocking pool; store calls wait on SQLite locks.
async fn run_blocking<S, T, F>(
    service: Arc<ShortlistService<S>>,
    work: F,
) -> Result<T, Response>
where
    S: ShortlistStore + 'static,
    T: Send + 'static,
    F: FnOnce(&ShortlistService<S>) -> Result<T, ShortlistError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || work(&service)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(error_response(err)),
        Err(join_error) => {
            error!(error = %join_error, "shortlist task failed");
            let payload = json!({ "error": "shortlist request failed" });
            Err((StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response())
        }
    }
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, Response>) -> Response {
    match result {
        Ok(body) => (status, axum::Json(body)).into_response(),
        Err(response) => response,
    }
}

fn error_response(err: ShortlistError) -> Response {
    match err {
        ShortlistError::BlocksAlreadyShortlisted { ref conflicts } => {
            let payload = json!({
                "error": err.to_string(),
                "conflicts": conflicts,
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        ShortlistError::UnknownCriterion(_) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        ShortlistError::BatchNotFound(_) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        ShortlistError::BatchFrozen(_) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        ShortlistError::Store(StoreError::TimedOut(_)) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::SERVICE_UNAVAILABLE, axum::Json(payload)).into_response()
        }
        ShortlistError::Store(ref store) => {
            error!(error = %store, "shortlist store failure");
            let payload = json!({ "error": err.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}
