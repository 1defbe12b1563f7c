//! API Handlers
//!
//! HTTP request handlers exposing the cache facade.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::Value;

use crate::error::{CacheError, Result};
use crate::facade::FlexCache;
use crate::keys::DEFAULT_NAMESPACE;
use crate::models::{
    DeleteResponse, GetResponse, HealthResponse, InvalidateResponse, NamespaceQuery, SetRequest,
    SetResponse, StatsResponse,
};

/// Application state shared across all handlers.
///
/// `FlexCache` is cheap to clone and internally synchronized.
#[derive(Clone)]
pub struct AppState {
    pub cache: FlexCache,
}

impl AppState {
    pub fn new(cache: FlexCache) -> Self {
        Self { cache }
    }
}

/// Handler for PUT /set
///
/// Stores any JSON value under a facade key.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let namespace = req.namespace.as_deref();
    state
        .cache
        .set(&req.key, &req.value, req.ttl, req.limit, namespace)
        .await?;

    Ok(Json(SetResponse::new(
        req.key.clone(),
        namespace.unwrap_or(DEFAULT_NAMESPACE),
    )))
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<NamespaceQuery>,
) -> Result<Json<GetResponse>> {
    let namespace = query.namespace.as_deref();
    let value: Value = state
        .cache
        .get(&key, namespace)
        .await?
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;

    Ok(Json(GetResponse::new(
        key,
        namespace.unwrap_or(DEFAULT_NAMESPACE),
        value,
    )))
}

/// Handler for DELETE /del/:key
///
/// Succeeds whether or not the key was cached.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<NamespaceQuery>,
) -> Result<Json<DeleteResponse>> {
    state
        .cache
        .invalidate(&key, query.namespace.as_deref())
        .await?;

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for DELETE /namespace/:namespace
pub async fn invalidate_namespace_handler(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<Json<InvalidateResponse>> {
    state.cache.invalidate_namespace(&namespace).await?;

    Ok(Json(InvalidateResponse::new(namespace)))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(state.cache.kind(), state.cache.stats()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
