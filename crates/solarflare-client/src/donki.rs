use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use solarflare_core::error::AppError;
use solarflare_core::models::DateRange;
use solarflare_core::time::format_ymd;
use solarflare_core::traits::FlareSource;
use url::Url;

pub const DEFAULT_DONKI_FLR_URL: &str = "https://api.nasa.gov/DONKI/FLR";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the NASA DONKI solar flare (`FLR`) endpoint.
///
/// Any failure (timeout, refused connection, non-2xx status, body that is
/// not JSON) is logged and turned into an empty array, so a bad cycle just
/// means no new data until the next trigger.
#[derive(Clone)]
pub struct DonkiClient {
    client: Client,
    base_url: Url,
    api_key: String,
    timeout: Duration,
}

impl DonkiClient {
    pub fn new(api_key: &str) -> Result<Self, AppError> {
        Self::with_base_url(api_key, DEFAULT_DONKI_FLR_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self, AppError> {
        Self::build(api_key, base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self, AppError> {
        Self::build(&self.api_key, self.base_url.as_str(), timeout)
    }

    fn build(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid DONKI URL '{base_url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::ConfigError(format!(
                "DONKI URL scheme '{}' is not allowed (only http/https)",
                parsed.scheme()
            )));
        }

        let client = Client::builder()
            .user_agent("solarflare-collector/0.1")
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: parsed,
            api_key: api_key.to_string(),
            timeout,
        })
    }

    /// Fetch the raw response body, surfacing every failure as an error.
    pub async fn try_fetch(&self, range: &DateRange) -> Result<Value, AppError> {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("api_key", &self.api_key)
            .append_pair("startDate", &format_ymd(range.start()))
            .append_pair("endDate", &format_ymd(range.end()));

        let response = self
            .client
            .get(url)
            .send()
            .await
            // the request URL carries the API key
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(self.timeout)
                } else if e.is_connect() {
                    AppError::NetworkError(format!("Connection failed: {}", e.without_url()))
                } else {
                    AppError::HttpError(e.without_url().to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP {} from DONKI",
                status.as_u16()
            )));
        }

        let text = response.text().await.map_err(|e| {
            AppError::HttpError(format!("Failed to read response body: {}", e.without_url()))
        })?;

        // DONKI answers an empty window with an empty body
        if text.trim().is_empty() {
            return Ok(Value::Array(Vec::new()));
        }

        Ok(serde_json::from_str(&text)?)
    }
}

impl FlareSource for DonkiClient {
    async fn fetch(&self, range: &DateRange) -> Value {
        match self.try_fetch(range).await {
            Ok(body) => body,
            Err(e) => {
                if e.is_transport() {
                    tracing::warn!(%range, error = %e, "DONKI fetch failed, treating as no data");
                } else {
                    tracing::error!(%range, error = %e, "Unexpected DONKI client error");
                }
                Value::Array(Vec::new())
            }
        }
    }
}
