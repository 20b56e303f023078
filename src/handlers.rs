use crate::app::AppState;
use crate::auth::require_bearer;
use crate::endpoint::{self, Operation};
use crate::error::{AppError, AppResult, ProxyError};
use crate::relay;
use crate::transform::{self, Plan};
use crate::upstream::{self, OutboundBody, OutboundRequest};
use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::{ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_REQUEST_HEADERS, VARY};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tracing::{Instrument, field};

/// Creation timestamp reported for every listed model.
const MODEL_CREATED_AT: i64 = 1_686_935_002;

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

pub async fn list_models(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    require_bearer(&headers, state.auth.as_ref()).await?;

    let data: Vec<Value> = state
        .gateway
        .models
        .deployments()
        .map(|deployment| {
            json!({
                "id": deployment,
                "object": "model",
                "created": MODEL_CREATED_AT,
                "owned_by": "openai"
            })
        })
        .collect();

    Ok(Json(json!({ "object": "list", "data": data })).into_response())
}

/// Entry point for every proxied path.
pub async fn proxy(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    if method == Method::OPTIONS {
        return preflight(&headers);
    }
    if let Err(err) = require_bearer(&headers, state.auth.as_ref()).await {
        return err.into_response();
    }

    let operation = endpoint::classify(uri.path());
    let span = tracing::info_span!(
        "completions",
        path = %uri.path(),
        operation = operation.map_or("unknown", Operation::name),
        deployment = field::Empty,
        resource = field::Empty,
        api_version = field::Empty,
    );

    let result = match operation {
        Some(op) => forward(&state, op, method, headers, body)
            .instrument(span)
            .await,
        None => Err(ProxyError::NotFound.into()),
    };
    let response = result.unwrap_or_else(IntoResponse::into_response);

    metrics::counter!(
        "aoai_gateway_requests_total",
        "operation" => operation.map_or("unknown", Operation::name),
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);
    response
}

/// A wildcard `access-control-allow-headers` never grants `Authorization`, so
/// the requested header list is echoed back.
fn preflight(headers: &HeaderMap) -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    if let Some(requested) = headers.get(ACCESS_CONTROL_REQUEST_HEADERS) {
        let out = response.headers_mut();
        out.insert(ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
        out.insert(
            VARY,
            HeaderValue::from_static("access-control-request-headers"),
        );
    }
    response
}

async fn forward(
    state: &AppState,
    op: Operation,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> AppResult<Response> {
    if method != Method::POST {
        return Err(ProxyError::BadRequest(format!("method {method} not allowed")).into());
    }
    let Some(backend_path) = op.backend_path() else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let (plan, outbound_body) = if op.requires_json() {
        let bytes = axum::body::to_bytes(body, usize::MAX).await.map_err(|err| {
            AppError::new(StatusCode::BAD_REQUEST, "body_read_failed", err.to_string())
        })?;
        let (plan, bytes) = transform::transform(op, &state.gateway.models, bytes)?;
        (plan, OutboundBody::Buffered(bytes))
    } else {
        (transform::plan_passthrough(op)?, OutboundBody::Streaming(body))
    };
    let Plan {
        deployment,
        api_version,
    } = plan;

    let resolved = state.gateway.resolve(&deployment)?;
    let span = tracing::Span::current();
    span.record("deployment", deployment.as_str());
    span.record("resource", resolved.resource);
    span.record("api_version", api_version);

    let request = OutboundRequest {
        url: upstream::build_url(
            &state.runtime.upstream_base,
            resolved.resource,
            &deployment,
            backend_path,
            api_version,
        ),
        headers: upstream::outbound_headers(&headers, resolved.resource, resolved.credential)?,
        body: outbound_body,
    };

    let upstream_resp = upstream::call_upstream_raw(&state.http, request)
        .instrument(tracing::info_span!("request_to_openai"))
        .await?;

    let status = upstream_resp.status();
    tracing::debug!(status = status.as_u16(), "upstream responded");
    metrics::counter!(
        "aoai_gateway_upstream_responses_total",
        "status" => status.as_u16().to_string()
    )
    .increment(1);

    Ok(relay::relay_response(upstream_resp))
}
