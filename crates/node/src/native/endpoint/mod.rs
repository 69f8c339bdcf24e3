//! chordkv-node service: JSON-RPC for peers and clients, plus a status page.
#![warn(missing_docs)]
mod http_error;

use std::net::TcpListener;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::routing::post;
use axum::Router;
use chordkv_core::inspect::SwarmInspect;
use chordkv_core::message::Message;
use jsonrpc_core::MetaIoHandler;
use jsonrpc_core::Params;
use tower_http::cors::CorsLayer;

use self::http_error::HttpError;
use crate::client::INSPECT_METHOD;
use crate::error::Error;
use crate::processor::Processor;

/// JSON-RPC state
#[derive(Clone)]
pub struct JsonRpcState {
    processor: Arc<Processor>,
    io_handler: MetaIoHandler<Arc<Processor>>,
}

/// Status state
#[derive(Clone)]
pub struct StatusState {
    processor: Arc<Processor>,
}

/// One JSON-RPC method per [Message] variant, plus `inspect`.
pub fn build_handler() -> MetaIoHandler<Arc<Processor>> {
    let mut handler = MetaIoHandler::default();
    for method in Message::METHODS {
        handler.add_method_with_meta(method, move |params: Params, processor: Arc<Processor>| {
            dispatch(method, params, processor)
        });
    }
    handler.add_method_with_meta(
        INSPECT_METHOD,
        |_params: Params, processor: Arc<Processor>| inspect(processor),
    );
    handler
}

async fn dispatch(
    method: &'static str,
    params: Params,
    processor: Arc<Processor>,
) -> jsonrpc_core::Result<serde_json::Value> {
    let msg = Message::from_method(method, params.into())
        .map_err(|e| jsonrpc_core::Error::invalid_params(e.to_string()))?;
    let report = processor.handle_message(msg).await?;
    serde_json::to_value(report).map_err(|e| Error::SerdeJsonError(e).into())
}

async fn inspect(processor: Arc<Processor>) -> jsonrpc_core::Result<serde_json::Value> {
    let info = processor.inspect().await?;
    serde_json::to_value(info).map_err(|e| Error::SerdeJsonError(e).into())
}

/// Routes of the endpoint.
pub fn router(processor: Arc<Processor>) -> Router {
    let jsonrpc_state = Arc::new(JsonRpcState {
        processor: processor.clone(),
        io_handler: build_handler(),
    });
    let status_state = Arc::new(StatusState { processor });

    Router::new()
        .route("/", post(jsonrpc_io_handler).with_state(jsonrpc_state))
        .route("/status", get(status_handler).with_state(status_state))
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(node_info_header))
}

/// Run a web server on `bind_addr`.
pub async fn run_api(bind_addr: &str, processor: Arc<Processor>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr)?;
    serve(listener, processor).await
}

/// Run a web server on a bound listener.
pub async fn serve(listener: TcpListener, processor: Arc<Processor>) -> anyhow::Result<()> {
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;
    tracing::info!("JSON-RPC endpoint: http://{addr}");
    axum::Server::from_tcp(listener)?
        .serve(router(processor).into_make_service())
        .await?;
    Ok(())
}

async fn jsonrpc_io_handler(
    State(state): State<Arc<JsonRpcState>>,
    body: String,
) -> Result<JsonResponse, HttpError> {
    let r = state
        .io_handler
        .handle_request(&body, state.processor.clone())
        .await
        .ok_or(HttpError::BadRequest)?;
    Ok(JsonResponse(r))
}

async fn node_info_header<B>(
    req: http::Request<B>,
    next: axum::middleware::Next<B>,
) -> axum::response::Response {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();

    if let Ok(version) = http::HeaderValue::from_str(crate::util::build_version().as_str()) {
        headers.insert("X-NODE-VERSION", version);
    }
    res
}

async fn status_handler(
    State(state): State<Arc<StatusState>>,
) -> Result<axum::Json<SwarmInspect>, HttpError> {
    let info = state.processor.inspect().await?;
    Ok(axum::Json(info))
}

/// JSON response struct
#[derive(Debug, Clone)]
pub struct JsonResponse(String);

impl IntoResponse for JsonResponse {
    fn into_response(self) -> axum::response::Response {
        ([("content-type", "application/json")], self.0).into_response()
    }
}
