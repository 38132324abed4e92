use anyhow::{anyhow, Result};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

/// PostgREST client for the fraud tables. The service runs with a single
/// service-role key; there is no per-user auth on this surface.
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            service_key: config.supabase_service_key.clone(),
        }
    }

    fn get_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(key) = HeaderValue::from_str(&self.service_key) {
            headers.insert("apikey", key);
        }
        if let Ok(bearer) = HeaderValue::from_str(&format!("Bearer {}", self.service_key)) {
            headers.insert(AUTHORIZATION, bearer);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        headers
    }

    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        self.request_with_headers(method, path, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        additional_headers: Option<HeaderMap>,
    ) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let mut headers = self.get_headers();
        if let Some(add_headers) = additional_headers {
            for (name, value) in add_headers.iter() {
                headers.insert(name.clone(), value.clone());
            }
        }

        let mut req = self.client.request(method, &url).headers(headers);
        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("Database API error ({}): {}", status, error_text);
            return Err(map_error(status, error_text));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            // PATCH/DELETE without Prefer: return=representation
            debug!("Empty response body, returning default value for type");
            return Ok(T::default());
        }

        let data = match serde_json::from_slice::<T>(&bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                let body_text = String::from_utf8_lossy(&bytes);
                error!("Failed to parse response: {} - Raw body: {}", e, body_text);
                return Err(anyhow!("Failed to parse response: {}", e));
            }
        };

        Ok(data)
    }

    /// Insert with `Prefer: return=representation`, returning the created
    /// row(s).
    pub async fn insert_returning(&self, path: &str, row: Value) -> Result<Vec<Value>> {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        self.request_with_headers(Method::POST, path, Some(row), Some(headers))
            .await
    }

    /// Exact row count for a filtered path without transferring rows. Uses
    /// `Prefer: count=exact` with a zero-width `Range` and parses the total
    /// from the `Content-Range` header (`0-0/N` or `*/N`).
    pub async fn count(&self, path: &str) -> Result<i64> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Counting rows at {}", url);

        let mut headers = self.get_headers();
        headers.insert("Prefer", HeaderValue::from_static("count=exact"));
        headers.insert("Range-Unit", HeaderValue::from_static("items"));
        headers.insert("Range", HeaderValue::from_static("0-0"));

        let response = self.client.get(&url).headers(headers).send().await?;

        let status = response.status();
        // 416 means the range is past the end, which PostgREST returns for
        // an empty result set under an exact count.
        if !status.is_success() && status != StatusCode::RANGE_NOT_SATISFIABLE {
            let error_text = response.text().await?;
            error!("Database count error ({}): {}", status, error_text);
            return Err(map_error(status, error_text));
        }

        let content_range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| anyhow!("count response missing Content-Range header"))?;

        parse_content_range(content_range)
    }
}

fn map_error(status: StatusCode, error_text: String) -> anyhow::Error {
    match status.as_u16() {
        401 | 403 => anyhow!("Authentication error: {}", error_text),
        404 => anyhow!("Resource not found: {}", error_text),
        409 => anyhow!("Conflict: {}", error_text),
        _ => anyhow!("API error ({}): {}", status, error_text),
    }
}

fn parse_content_range(content_range: &str) -> Result<i64> {
    let total = content_range
        .rsplit('/')
        .next()
        .ok_or_else(|| anyhow!("malformed Content-Range: {}", content_range))?;
    if total == "*" {
        return Ok(0);
    }
    total
        .trim()
        .parse::<i64>()
        .map_err(|_| anyhow!("malformed Content-Range: {}", content_range))
}

/// True when a PostgREST error text describes a UNIQUE-constraint violation
/// (Postgres error 23505). Used to turn a duplicate-email insert race into a
/// conflict instead of a server error.
pub fn is_unique_violation(error: &anyhow::Error) -> bool {
    let text = error.to_string();
    text.contains("23505") || text.contains("duplicate key value")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_with_window() {
        assert_eq!(parse_content_range("0-0/42").unwrap(), 42);
    }

    #[test]
    fn content_range_empty_set() {
        assert_eq!(parse_content_range("*/0").unwrap(), 0);
    }

    #[test]
    fn content_range_unknown_total() {
        assert_eq!(parse_content_range("0-9/*").unwrap(), 0);
    }

    #[test]
    fn unique_violation_detected() {
        let err = anyhow!(
            r#"Conflict: {{"code":"23505","message":"duplicate key value violates unique constraint \"submissions_email_key\""}}"#
        );
        assert!(is_unique_violation(&err));
        assert!(!is_unique_violation(&anyhow!("API error (500): boom")));
    }
}
