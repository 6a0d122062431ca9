//! HTTP plumbing shared by every backend.
//!
//! Status codes and transport failures are sorted into [`ProviderError`]
//! here, once, so each vendor module only deals with its own JSON shapes.

use std::time::Duration;

use ragline_core::ProviderError;
use serde_json::Value;
use tracing::warn;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the shared HTTP client. Per-call deadlines are enforced by the dispatcher.
pub(crate) fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Sort a non-success status into the backend taxonomy.
///
/// Returns `None` for 2xx.
pub fn classify_status(
    backend: &str,
    status: u16,
    retry_after_secs: Option<u64>,
    body: &str,
) -> Option<ProviderError> {
    match status {
        200..=299 => None,
        401 | 403 => Some(ProviderError::AuthenticationFailed(format!(
            "{backend} rejected the credentials (status {status})"
        ))),
        429 => Some(ProviderError::RateLimited { retry_after_secs }),
        408 | 504 => Some(ProviderError::Timeout(format!(
            "{backend} timed out upstream (status {status})"
        ))),
        _ => Some(ProviderError::ApiError {
            status_code: status,
            message: error_message(body),
        }),
    }
}

/// Pull a readable message out of a vendor error body.
fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    value
        .pointer("/error/message")
        .or_else(|| value.get("error"))
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

/// `Retry-After` as whole seconds. HTTP-date values are ignored.
pub fn parse_retry_after(header: Option<&str>) -> Option<u64> {
    header.and_then(|v| v.trim().parse::<u64>().ok())
}

pub(crate) fn transport_error(backend: &str, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(format!("{backend} request timed out: {err}"))
    } else {
        ProviderError::Network(format!("{backend}: {err}"))
    }
}

/// Send a prepared request and return the parsed JSON body of a 2xx reply.
pub(crate) async fn send_json(
    backend: &str,
    request: reqwest::RequestBuilder,
) -> Result<Value, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(backend, e))?;

    let status = response.status().as_u16();
    let retry_after = parse_retry_after(
        response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok()),
    );

    if !(200..300).contains(&status) {
        let body = response.text().await.unwrap_or_default();
        warn!(backend, status, "Backend returned error status");
        // Error classification never returns None for a non-2xx status.
        return Err(
            classify_status(backend, status, retry_after, &body).unwrap_or(ProviderError::ApiError {
                status_code: status,
                message: body,
            }),
        );
    }

    response.json::<Value>().await.map_err(|e| {
        if e.is_timeout() {
            transport_error(backend, e)
        } else {
            ProviderError::InvalidResponse(format!("{backend} returned unparseable JSON: {e}"))
        }
    })
}
