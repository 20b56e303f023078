use crate::config::Credential;
use crate::error::ProxyError;
use axum::http::header::{AUTHORIZATION, HOST};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use bytes::Bytes;

pub const CREDENTIAL_HEADER: &str = "api-key";
pub const DEFAULT_UPSTREAM_BASE: &str = "https://{resource}.openai.azure.com";
const RESOURCE_PLACEHOLDER: &str = "{resource}";

/// Connection-scoped and framing headers. hyper and reqwest set these per hop.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

pub(crate) fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| name.eq_ignore_ascii_case(h))
}

fn is_caller_credential(name: &str) -> bool {
    name.eq_ignore_ascii_case(AUTHORIZATION.as_str())
        || name.eq_ignore_ascii_case(HOST.as_str())
        || name.eq_ignore_ascii_case(CREDENTIAL_HEADER)
}

/// Backend origin template; `{resource}` is replaced by the resolved resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamBase(String);

impl UpstreamBase {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into().trim_end_matches('/').to_string())
    }

    pub fn origin_for(&self, resource: &str) -> String {
        self.0.replace(RESOURCE_PLACEHOLDER, resource)
    }
}

impl Default for UpstreamBase {
    fn default() -> Self {
        Self::new(DEFAULT_UPSTREAM_BASE)
    }
}

pub fn build_url(
    base: &UpstreamBase,
    resource: &str,
    deployment: &str,
    backend_path: &str,
    api_version: &str,
) -> String {
    format!(
        "{}/openai/deployments/{}/{}?api-version={}",
        base.origin_for(resource),
        deployment,
        backend_path,
        api_version
    )
}

/// Copies inbound headers minus caller credentials, `Host` and hop-by-hop
/// headers, then sets the resolved backend credential.
pub fn outbound_headers(
    inbound: &HeaderMap,
    resource: &str,
    credential: &Credential,
) -> Result<HeaderMap, ProxyError> {
    let mut out = HeaderMap::with_capacity(inbound.len() + 1);
    for (name, value) in inbound.iter() {
        if is_caller_credential(name.as_str()) || is_hop_by_hop(name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    let mut value = HeaderValue::from_str(credential.expose()).map_err(|_| {
        ProxyError::InvalidCredential {
            resource: resource.to_string(),
        }
    })?;
    value.set_sensitive(true);
    out.insert(HeaderName::from_static(CREDENTIAL_HEADER), value);
    Ok(out)
}

pub enum OutboundBody {
    Buffered(Bytes),
    Streaming(axum::body::Body),
}

impl From<OutboundBody> for reqwest::Body {
    fn from(body: OutboundBody) -> Self {
        match body {
            OutboundBody::Buffered(bytes) => reqwest::Body::from(bytes),
            OutboundBody::Streaming(body) => reqwest::Body::wrap_stream(body.into_data_stream()),
        }
    }
}

pub struct OutboundRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: OutboundBody,
}

/// Always POSTs. Any status the backend answers with is returned as-is; only
/// transport failures before response headers arrive are errors.
pub async fn call_upstream_raw(
    client: &reqwest::Client,
    request: OutboundRequest,
) -> Result<reqwest::Response, ProxyError> {
    client
        .post(request.url)
        .headers(request.headers)
        .body(reqwest::Body::from(request.body))
        .send()
        .await
        .map_err(|err| ProxyError::Upstream(err.without_url().to_string()))
}
