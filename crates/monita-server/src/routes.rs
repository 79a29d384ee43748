//! HTTP routes

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use monita_core::responses::{
    ChartResponse, ColumnsResponse, DatasetsResponse, FilterResponse, KpisResponse, PreviewResponse,
};
use monita_core::{ResourceRef, SearchQuery};
use monita_data::{FilterQuery, ResourceService};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;

/// Shared handler state
pub type AppState = Arc<ResourceService>;

pub fn router(service: ResourceService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/datasets/search", get(search))
        .route("/resources/:resource_id", get(resource))
        .route("/resources/:resource_id/preview", get(preview))
        .route("/resources/:resource_id/columns", get(columns))
        .route("/resources/:resource_id/filter", get(filter))
        .route("/resources/:resource_id/kpis", get(kpis))
        .route("/resources/:resource_id/chart", get(chart))
        .with_state(Arc::new(service))
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Health {
    pub status: String,
    pub ckan: String,
    pub version: String,
}

pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
        ckan: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn search(
    State(service): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<DatasetsResponse>> {
    Ok(Json(service.search(&query).await?))
}

pub async fn resource(
    State(service): State<AppState>,
    Path(resource_id): Path<String>,
) -> ApiResult<Json<ResourceRef>> {
    Ok(Json(service.resource(&resource_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct PreviewParams {
    #[serde(default = "default_preview_rows")]
    pub rows: usize,
}

fn default_preview_rows() -> usize {
    10
}

pub async fn preview(
    State(service): State<AppState>,
    Path(resource_id): Path<String>,
    Query(params): Query<PreviewParams>,
) -> ApiResult<Json<PreviewResponse>> {
    Ok(Json(service.preview(&resource_id, params.rows).await?))
}

pub async fn columns(
    State(service): State<AppState>,
    Path(resource_id): Path<String>,
) -> ApiResult<Json<ColumnsResponse>> {
    Ok(Json(service.columns(&resource_id).await?))
}

pub async fn filter(
    State(service): State<AppState>,
    Path(resource_id): Path<String>,
    Query(query): Query<FilterQuery>,
) -> ApiResult<Json<FilterResponse>> {
    Ok(Json(service.filter(&resource_id, &query).await?))
}

pub async fn kpis(
    State(service): State<AppState>,
    Path(resource_id): Path<String>,
) -> ApiResult<Json<KpisResponse>> {
    Ok(Json(service.kpis(&resource_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ChartParams {
    pub column: String,
    #[serde(default = "default_chart_type")]
    pub chart_type: String,
    #[serde(default = "default_bins")]
    pub bins: usize,
}

fn default_chart_type() -> String {
    "histogram".to_string()
}

fn default_bins() -> usize {
    10
}

pub async fn chart(
    State(service): State<AppState>,
    Path(resource_id): Path<String>,
    Query(params): Query<ChartParams>,
) -> ApiResult<Json<ChartResponse>> {
    let response = service
        .chart(&resource_id, &params.column, &params.chart_type, params.bins)
        .await?;
    Ok(Json(response))
}
