//! HTTP plumbing shared by the backend and chat clients
//!
//! Responses are read as text and parsed with serde_json rather than
//! through the browser's JSON path, so the error-field convention can be
//! checked before a payload is decoded into its real shape.

pub mod backend;
pub mod chat;

pub use backend::BackendClient;
pub use chat::CompletionsClient;

use serde::de::DeserializeOwned;
use thiserror::Error;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestInit, Response};

#[derive(Error, Clone, Debug, PartialEq)]
pub enum ClientError {
    #[error("network request failed: {0}")]
    Network(String),
    #[error("server returned {status}: {message}")]
    Http { status: u16, message: String },
    /// 200 response carrying the backend's `error` field
    #[error("analysis failed: {0}")]
    Upstream(String),
    #[error("unexpected response shape: {0}")]
    Decode(String),
    #[error("chat endpoint is not configured")]
    NotConfigured,
    #[error("no browser window available")]
    NoWindow,
}

fn describe(err: JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{:?}", err))
}

/// Backend error payloads are `{"error": "..."}`, sometimes with a 200
/// status.
pub(crate) fn error_message(value: &serde_json::Value) -> Option<String> {
    value
        .get("error")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Reject payloads carrying an `error` field, then decode.
pub(crate) fn decode_checked<T: DeserializeOwned>(
    value: serde_json::Value,
) -> Result<T, ClientError> {
    if let Some(message) = error_message(&value) {
        return Err(ClientError::Upstream(message));
    }
    serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
}

pub(crate) fn json_request(
    method: &str,
    url: &str,
    body: Option<&serde_json::Value>,
) -> Result<Request, ClientError> {
    let opts = RequestInit::new();
    opts.set_method(method);
    let encoded;
    if let Some(body) = body {
        encoded = serde_json::to_string(body)
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        opts.set_body(&JsValue::from_str(&encoded));
    }
    let request = Request::new_with_str_and_init(url, &opts)
        .map_err(|e| ClientError::Network(describe(e)))?;
    if body.is_some() {
        request
            .headers()
            .set("Content-Type", "application/json")
            .map_err(|e| ClientError::Network(describe(e)))?;
    }
    Ok(request)
}

async fn run_fetch(request: Request) -> Result<Response, ClientError> {
    let window = web_sys::window().ok_or(ClientError::NoWindow)?;
    let response = JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(|e| ClientError::Network(describe(e)))?;
    response
        .dyn_into::<Response>()
        .map_err(|_| ClientError::Decode("fetch did not yield a Response".to_string()))
}

async fn response_text(response: &Response) -> Result<String, ClientError> {
    let text = JsFuture::from(
        response
            .text()
            .map_err(|e| ClientError::Network(describe(e)))?,
    )
    .await
    .map_err(|e| ClientError::Network(describe(e)))?;
    text.as_string()
        .ok_or_else(|| ClientError::Decode("response body was not text".to_string()))
}

async fn check_status(response: &Response) -> Result<(), ClientError> {
    if response.ok() {
        return Ok(());
    }
    let status = response.status();
    // error bodies are JSON when the backend produced them itself
    let message = match response_text(response).await {
        Ok(text) => serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .as_ref()
            .and_then(error_message)
            .unwrap_or_else(|| "request failed".to_string()),
        Err(_) => "request failed".to_string(),
    };
    Err(ClientError::Http { status, message })
}

/// Run a request and parse the JSON body.
pub(crate) async fn fetch_value(request: Request) -> Result<serde_json::Value, ClientError> {
    let response = run_fetch(request).await?;
    check_status(&response).await?;
    let text = response_text(&response).await?;
    serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
}

/// Run a request and return the raw text body (score markup).
pub(crate) async fn fetch_text(request: Request) -> Result<String, ClientError> {
    let response = run_fetch(request).await?;
    check_status(&response).await?;
    response_text(&response).await
}

/// Run a request and return the body bytes (report download).
pub(crate) async fn fetch_bytes(request: Request) -> Result<Vec<u8>, ClientError> {
    let response = run_fetch(request).await?;
    check_status(&response).await?;
    let buffer = JsFuture::from(
        response
            .array_buffer()
            .map_err(|e| ClientError::Network(describe(e)))?,
    )
    .await
    .map_err(|e| ClientError::Network(describe(e)))?;
    Ok(js_sys::Uint8Array::new(&buffer).to_vec())
}
