use std::time::Duration;

use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::AiError;
use crate::util::truncate_to_char_boundary;

/// Default per-request timeout when the caller does not set one.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Longest provider error body kept in an `AiError::Api` message.
const MAX_ERROR_BODY_BYTES: usize = 500;

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, AiError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AiError::Config(format!("failed to build HTTP client: {e}")))
}

/// POST a JSON body and decode a JSON response, mapping non-2xx statuses
/// to `AiError::Api` with a bounded error body.
pub(crate) async fn post_json<Req, Resp>(
    http: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
    body: &Req,
) -> Result<Resp, AiError>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    let response = http.post(url).headers(headers).json(body).send().await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(AiError::Api {
            status: status.as_u16(),
            message: truncate_to_char_boundary(&error_text, MAX_ERROR_BODY_BYTES).to_string(),
        });
    }

    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
