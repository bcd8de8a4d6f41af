//! HTTP request handlers for the script-tile endpoints.

use axum::{
    extract::{Extension, Path, Query},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument};

use tile_common::{ScriptTileError, ScriptTileResult, TileCoord};

use crate::rendering::{self, RenderedImage};
use crate::request::CustomScriptRequest;
use crate::state::{AppState, MAX_RENDER_DIMENSION};

#[derive(Debug, Deserialize)]
pub struct RenderParams {
    width: Option<u32>,
    height: Option<u32>,
}

#[instrument(skip(state, body))]
pub async fn bounds_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Response {
    state.metrics.record_bounds_request();
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    match rendering::execute_bounds(state, request).await {
        Ok(bounds) => Json(bounds).into_response(),
        Err(e) => {
            error!(error = %e, "bounds resolution failed");
            error_response(&e)
        }
    }
}

#[instrument(skip(state, body))]
pub async fn render_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<RenderParams>,
    body: Bytes,
) -> Response {
    state.metrics.record_render_request();
    let result = async {
        let request = parse_request(&body)?;
        let width = dimension("width", params.width)?;
        let height = dimension("height", params.height)?;
        info!(width, height, inputs = request.inputs.len(), "render request");
        rendering::execute_render(state, request, width, height).await
    }
    .await;

    image_response(result)
}

#[instrument(skip(state, body))]
pub async fn tile_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((z, x, y)): Path<(u32, u32, u32)>,
    body: Bytes,
) -> Response {
    state.metrics.record_tile_request();
    let result = async {
        let request = parse_request(&body)?;
        rendering::execute_tile(state, request, TileCoord::new(z, x, y)).await
    }
    .await;

    image_response(result)
}

pub async fn examples_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    Json(state.catalog.entries()).into_response()
}

pub async fn health_handler() -> Response {
    (StatusCode::OK, "OK").into_response()
}

/// Prometheus exposition endpoint.
pub async fn metrics_handler(Extension(handle): Extension<PrometheusHandle>) -> Response {
    (StatusCode::OK, handle.render()).into_response()
}

/// JSON metrics snapshot for dashboards.
pub async fn api_metrics_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    Json(state.metrics.snapshot().await).into_response()
}

fn parse_request(body: &Bytes) -> ScriptTileResult<CustomScriptRequest> {
    Ok(serde_json::from_slice(body)?)
}

fn dimension(param: &str, value: Option<u32>) -> ScriptTileResult<u32> {
    let value = value.unwrap_or(tile_common::TILE_SIZE);
    if value == 0 || value > MAX_RENDER_DIMENSION {
        return Err(ScriptTileError::InvalidParameter {
            param: param.to_string(),
            message: format!("must be between 1 and {}", MAX_RENDER_DIMENSION),
        });
    }
    Ok(value)
}

/// Error bodies are the plain error text so UIs can surface them verbatim.
fn error_response(err: &ScriptTileError) -> Response {
    let status = StatusCode::from_u16(err.http_status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, err.to_string()).into_response()
}

fn image_response(result: ScriptTileResult<RenderedImage>) -> Response {
    match result {
        Ok(image) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "image/png")
            .header("x-pixel-faults", image.fault_count.to_string())
            .body(Bytes::from(image.png).into())
            .unwrap(),
        Err(e) => {
            error!(error = %e, "render failed");
            error_response(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_defaults_and_caps() {
        assert_eq!(dimension("width", None).unwrap(), 256);
        assert_eq!(dimension("width", Some(512)).unwrap(), 512);
        assert!(dimension("width", Some(0)).is_err());
        assert!(dimension("height", Some(MAX_RENDER_DIMENSION + 1)).is_err());
    }

    #[test]
    fn test_error_body_is_verbatim_message() {
        let err = ScriptTileError::UndeclaredInputReference("dsm".to_string());
        let response = error_response(&err);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
