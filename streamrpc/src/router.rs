//! HTTP adapter: serves a [`Registry`] as an axum [`Router`].
//!
//! Every method is reachable at `POST /{service}/{method}`. Both request and
//! response bodies are sequences of envelopes; the response always ends with
//! an END_STREAM envelope carrying the call's status, so protocol failures are
//! reported in-band with HTTP 200.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use futures::{Stream, StreamExt};
use streamrpc_core::{EnvelopeDecoder, Frame, Status, end_stream_envelope, wrap_envelope};

use crate::codec::Encoding;
use crate::context::{Metadata, parse_timeout};
use crate::registry::Registry;
use crate::request::InboundCall;
use crate::response::{ResponseFrame, ResponseStream};

impl<S> Registry<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Serve the registered methods over HTTP.
    pub fn into_router(self) -> Router {
        Router::new()
            .route("/{*method}", post(handle_call::<S>))
            .with_state(Arc::new(self))
    }
}

async fn handle_call<S>(State(registry): State<Arc<Registry<S>>>, request: Request) -> Response
where
    S: Clone + Send + Sync + 'static,
{
    let method = request.uri().path().trim_start_matches('/').to_string();
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let Some(encoding) = Encoding::from_content_type(content_type) else {
        tracing::debug!(%method, content_type, "unsupported content type");
        let status =
            Status::invalid_argument(format!("unsupported content type {content_type:?}"));
        return end_stream_response(Encoding::Json, &status);
    };

    let timeout = parse_timeout(&request);
    let metadata = Metadata::from_headers(request.headers());
    let messages = request_messages(
        request.into_body(),
        registry.limits().get_receive_max_bytes(),
    );

    let call = InboundCall::streaming(method, messages)
        .encoding(encoding)
        .metadata(metadata)
        .timeout(timeout);

    match registry.dispatch(call) {
        Ok(handle) => stream_response(encoding, handle.into_responses()),
        Err(status) => end_stream_response(encoding, &status),
    }
}

/// Split a request body into message payloads.
///
/// A peer END_STREAM envelope ends the stream; an error status in it, a
/// framing error or a body read error is yielded as the last item.
fn request_messages(
    body: Body,
    max_message_size: Option<usize>,
) -> impl Stream<Item = Result<Bytes, Status>> + Send + 'static {
    async_stream::stream! {
        let mut body = body.into_data_stream();
        let mut decoder = EnvelopeDecoder::new().max_message_size(max_message_size);
        loop {
            match decoder.decode() {
                Ok(Some(Frame::Message(payload))) => {
                    yield Ok(payload);
                    continue;
                }
                Ok(Some(Frame::EndStream(status))) => {
                    if !status.is_ok() {
                        yield Err(status);
                    }
                    return;
                }
                Ok(None) => {}
                Err(e) => {
                    yield Err(Status::from(e));
                    return;
                }
            }

            match body.next().await {
                Some(Ok(chunk)) => decoder.extend(&chunk),
                Some(Err(e)) => {
                    yield Err(Status::cancelled(format!("request body failed: {e}")));
                    return;
                }
                None => {
                    if let Err(e) = decoder.finish() {
                        yield Err(Status::from(e));
                    }
                    return;
                }
            }
        }
    }
}

fn stream_response(encoding: Encoding, responses: ResponseStream) -> Response {
    let body = responses.map(|frame| {
        let envelope = match frame {
            ResponseFrame::Message(payload) => wrap_envelope(&payload),
            ResponseFrame::End(status) => end_stream_envelope(&status),
        };
        Ok::<_, Infallible>(Bytes::from(envelope))
    });
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoding.content_type())],
        Body::from_stream(body),
    )
        .into_response()
}

fn end_stream_response(encoding: Encoding, status: &Status) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoding.content_type())],
        Body::from(end_stream_envelope(status)),
    )
        .into_response()
}
