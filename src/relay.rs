//! Streams a backend response back to the caller.
//!
//! The body is never collected: each upstream frame is handed on in slices of
//! at most [`RELAY_CHUNK_SIZE`] bytes, in arrival order. A transport error from
//! the backend ends the stream with an error so the caller connection is
//! aborted rather than cleanly closed. Dropping the returned body (caller went
//! away) drops the upstream response and with it the backend connection.

use crate::upstream::{CREDENTIAL_HEADER, is_hop_by_hop};
use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::io;

pub const RELAY_CHUNK_SIZE: usize = 4096;

struct ChunkState<S> {
    upstream: S,
    pending: Bytes,
    finished: bool,
}

/// Re-slices a byte stream into chunks no larger than `chunk_size`.
pub fn fixed_chunks<S, E>(
    upstream: S,
    chunk_size: usize,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let chunk_size = chunk_size.max(1);
    let state = ChunkState {
        upstream: Box::pin(upstream),
        pending: Bytes::new(),
        finished: false,
    };
    futures_util::stream::unfold(state, move |mut state| async move {
        loop {
            if !state.pending.is_empty() {
                let take = state.pending.len().min(chunk_size);
                let chunk = state.pending.split_to(take);
                return Some((Ok(chunk), state));
            }
            if state.finished {
                return None;
            }
            match state.upstream.next().await {
                Some(Ok(bytes)) => state.pending = bytes,
                Some(Err(err)) => {
                    state.finished = true;
                    tracing::warn!(error = %err, "upstream stream failed mid-response");
                    return Some((Err(io::Error::other(err.to_string())), state));
                }
                None => return None,
            }
        }
    })
}

/// Upstream headers minus hop-by-hop framing and any backend credential echo.
pub fn relayed_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream.iter() {
        if is_hop_by_hop(name.as_str()) || name.as_str().eq_ignore_ascii_case(CREDENTIAL_HEADER) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Builds the caller-facing response: backend status, backend headers, and a
/// lazily pulled body.
pub fn relay_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let headers = relayed_headers(upstream.headers());
    let body = Body::from_stream(fixed_chunks(upstream.bytes_stream(), RELAY_CHUNK_SIZE));

    let mut builder = Response::builder().status(status);
    if let Some(h) = builder.headers_mut() {
        h.extend(headers);
    }
    builder.body(body).unwrap_or_else(|_| {
        (StatusCode::INTERNAL_SERVER_ERROR, "response_build_failed").into_response()
    })
}
