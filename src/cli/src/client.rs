//! HTTP client for communicating with the Atlas API server.

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Header carrying the caller's identity.
pub const PRINCIPAL_HEADER: &str = "X-Principal-Id";

/// Success envelope returned by `/api/v1` routes.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
}

/// Failure envelope returned by every route on a non-2xx status.
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// HTTP client for the Atlas API.
pub struct ApiClient {
    client: Client,
    base_url: String,
    principal: Option<String>,
}

impl ApiClient {
    /// Create a new API client pointing at the given base URL.
    pub fn new(base_url: &str, principal: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            principal,
        })
    }

    /// Return the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn with_principal(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let principal = self.principal.as_deref().context(
            "No principal configured. Pass --principal, set ATLAS_PRINCIPAL, or run `atlas config set principal <id>`",
        )?;
        Ok(request.header(PRINCIPAL_HEADER, principal))
    }

    /// Perform an authenticated GET request and unwrap the `data` field.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .with_principal(self.client.get(&url))?
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let resp = check_status(resp).await?;

        let api_resp: ApiResponse<T> = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))?;

        if !api_resp.success {
            anyhow::bail!("API reported failure without an error body");
        }
        api_resp
            .data
            .ok_or_else(|| anyhow::anyhow!("API returned success but no data"))
    }

    /// Perform an unauthenticated GET request and return the raw JSON (for the health endpoint).
    pub async fn get_raw(&self, path: &str) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        // A degraded server answers 503 with a health body worth showing.
        if resp.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return resp
                .json()
                .await
                .with_context(|| format!("Failed to parse response from {}", url));
        }

        check_status(resp)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}

async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    Err(anyhow::anyhow!(describe_error(status.as_u16(), &body)))
}

/// Render a failed response, preferring the server's error envelope.
pub fn describe_error(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => format!(
            "API error ({} {}): {}",
            status, envelope.error.code, envelope.error.message
        ),
        Err(_) if body.is_empty() => format!("API error ({})", status),
        Err(_) => format!("API error ({}): {}", status, body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_error_uses_envelope() {
        let body = r#"{"success":false,"error":{"code":"RECORD_NOT_FOUND","numeric_code":2002,"message":"Experiment not found","details":null,"timestamp":"2026-01-01T00:00:00Z"}}"#;
        assert_eq!(
            describe_error(404, body),
            "API error (404 RECORD_NOT_FOUND): Experiment not found"
        );
    }

    #[test]
    fn test_describe_error_falls_back_to_body() {
        assert_eq!(describe_error(502, "bad gateway"), "API error (502): bad gateway");
        assert_eq!(describe_error(500, ""), "API error (500)");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = ApiClient::new("http://localhost:8080/", None).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
    }
}
