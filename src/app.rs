use crate::auth::{Authorizer, StaticTokens};
use crate::config::{ConfigError, GatewayConfig};
use crate::error::{AppError, AppResult};
use crate::upstream::{DEFAULT_UPSTREAM_BASE, UpstreamBase};
use axum::Router;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderValue, StatusCode};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::{Arc, Once, OnceLock};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeConfig>,
    pub gateway: Arc<GatewayConfig>,
    pub auth: Arc<dyn Authorizer>,
    pub http: reqwest::Client,
    pub metrics: PrometheusHandle,
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static METRICS_ERROR: OnceLock<AppError> = OnceLock::new();
static METRICS_INIT: Once = Once::new();

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub listen: String,
    pub metrics_path: String,
    pub upstream_base: UpstreamBase,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let listen = env_or("AOAI_GATEWAY_LISTEN", "0.0.0.0:8000");
        let metrics_path = env_or("AOAI_GATEWAY_METRICS_PATH", "/metrics");
        let upstream_base =
            UpstreamBase::new(env_or("AOAI_GATEWAY_UPSTREAM_BASE", DEFAULT_UPSTREAM_BASE));
        Self {
            listen,
            metrics_path,
            upstream_base,
        }
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn config_error(err: ConfigError) -> AppError {
    AppError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "config_invalid",
        err.to_string(),
    )
    .with_type("server_error")
}

pub async fn load_state() -> AppResult<AppState> {
    let gateway = GatewayConfig::from_env().map_err(config_error)?;
    let tokens = StaticTokens::from_env().map_err(config_error)?;
    if tokens.is_empty() {
        tracing::warn!("no bearer tokens configured; every request will be rejected");
    }
    load_state_with(RuntimeConfig::from_env(), gateway, Arc::new(tokens)).await
}

pub async fn load_state_with(
    runtime: RuntimeConfig,
    gateway: GatewayConfig,
    auth: Arc<dyn Authorizer>,
) -> AppResult<AppState> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("aoai-gateway/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|err| {
            AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "http_client_init_failed",
                err.to_string(),
            )
        })?;

    let metrics = init_metrics()?;

    tracing::info!(
        models = gateway.models.len(),
        upstream_base = ?runtime.upstream_base,
        "gateway configuration loaded"
    );

    Ok(AppState {
        runtime: Arc::new(runtime),
        gateway: Arc::new(gateway),
        auth,
        http,
        metrics,
    })
}

fn init_metrics() -> AppResult<PrometheusHandle> {
    METRICS_INIT.call_once(|| {
        match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(err) => {
                let _ = METRICS_ERROR.set(AppError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "metrics_init_failed",
                    err.to_string(),
                ));
            }
        }
    });

    if let Some(err) = METRICS_ERROR.get() {
        return Err(err.clone());
    }
    METRICS_HANDLE.get().cloned().ok_or_else(|| {
        AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "metrics_init_failed",
            "metrics recorder not available",
        )
    })
}

pub fn build_app(state: AppState) -> Router {
    let metrics_path = state.runtime.metrics_path.clone();
    Router::new()
        .route(
            "/v1/models",
            get(crate::handlers::list_models).fallback(crate::handlers::proxy),
        )
        .route(
            &metrics_path,
            get(crate::handlers::metrics).fallback(crate::handlers::proxy),
        )
        .fallback(crate::handlers::proxy)
        .with_state(state)
        .layer(SetResponseHeaderLayer::if_not_present(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("*"),
        ))
        .layer(SetRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
            MakeRequestUuid,
        ))
        .layer(PropagateRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
        ))
        .layer(TraceLayer::new_for_http())
}
