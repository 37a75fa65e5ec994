//! One HTTP call to the vendor cost API: build the request, send it, and
//! classify the response into a typed outcome.
//!
//! Everything above this module retries and paginates; this module never
//! does either. It makes exactly one request per call and returns.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::TransportError;
use crate::model::{ForecastPage, Granularity, Page, Query};
use crate::redact::redact_url;

const DEFAULT_USER_AGENT: &str = "vantage-cost-sync/0.1.0";

/// Thin wrapper around the vendor's two cost endpoints.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    base_url: String,
    token: String,
}

impl Transport {
    /// Build a transport against `base_url` (no trailing slash) authenticating
    /// with `token`. `request_timeout` is the per-request deadline (spec
    /// default: 60s).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client fails to build, or if
    /// `token` is empty.
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let token = token.into();
        if token.is_empty() {
            return Err(TransportError::AuthRejected {
                message: "bearer token must not be empty".to_string(),
            });
        }

        let client = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token,
        })
    }

    /// Fetch one page of cost data for `query`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] classified per the vendor's response
    /// status (see spec.md §4.1).
    #[instrument(skip(self, cancel, query), fields(scope_kind = query.scope.prefix()))]
    pub async fn fetch_costs(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<Page, TransportError> {
        let url = format!("{}/costs", self.base_url);
        let request = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .query(&[(query.scope.query_param(), query.scope.token())])
            .query(&[
                ("start_at", &query.start.to_rfc3339()),
                ("end_at", &query.end.to_rfc3339()),
                ("granularity", &query.granularity.to_string()),
            ])
            .query(
                &query
                    .sorted_group_bys()
                    .iter()
                    .map(|g| ("group_bys[]".to_string(), g.to_string()))
                    .collect::<Vec<_>>(),
            )
            .query(
                &query
                    .sorted_metrics()
                    .iter()
                    .map(|m| ("metrics[]".to_string(), m.to_string()))
                    .collect::<Vec<_>>(),
            )
            .query(&[("page_size", query.page_size.to_string())]);

        let request = if query.cursor.is_empty() {
            request
        } else {
            request.query(&[("cursor", &query.cursor)])
        };

        debug!(url = %redact_url(&url, &self.token), "fetching cost page");

        let response = self.send(request, cancel).await?;
        self.decode::<Page>(response).await
    }

    /// Fetch a forecast page for `[start, end]` at `granularity`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] classified per the vendor's response
    /// status (see spec.md §4.1).
    #[instrument(skip(self, cancel, report_token))]
    pub async fn fetch_forecast(
        &self,
        report_token: &str,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
        granularity: Granularity,
        cancel: &CancellationToken,
    ) -> Result<ForecastPage, TransportError> {
        let url = format!("{}/cost_reports/{report_token}/forecast", self.base_url);
        let request = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .query(&[
                ("start_at", start.to_rfc3339()),
                ("end_at", end.to_rfc3339()),
                ("granularity", granularity.to_string()),
            ]);

        debug!(url = %redact_url(&url, &self.token), "fetching forecast page");

        let response = self.send(request, cancel).await?;
        self.decode::<ForecastPage>(response).await
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, TransportError> {
        let send_fut = request.send();
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TransportError::Cancelled),
            result = send_fut => {
                let response = result.map_err(classify_send_error)?;
                self.classify_status(response).await
            }
        }
    }

    async fn classify_status(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = rate_limit_seconds(&response).unwrap_or(1);
            return Err(TransportError::RateLimited { retry_after_secs });
        }

        if matches!(
            status,
            StatusCode::INTERNAL_SERVER_ERROR
                | StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT
        ) {
            return Err(TransportError::Transient {
                status: status.as_u16(),
            });
        }

        let message = response.text().await.unwrap_or_default();
        let message = redact_url(&message, &self.token);

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(TransportError::AuthRejected { message })
            }
            StatusCode::NOT_FOUND => Err(TransportError::NotFound { message }),
            _ => Err(TransportError::Rejected {
                status: status.as_u16(),
                message,
            }),
        }
    }

    async fn decode<T>(&self, response: reqwest::Response) -> Result<T, TransportError>
    where
        T: serde::de::DeserializeOwned,
    {
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        serde_json::from_str(&body)
            .map_err(|e| TransportError::DecodeFailed(format!("{e} (body: {})", truncate(&body))))
    }
}

fn classify_send_error(err: reqwest::Error) -> TransportError {
    TransportError::Network(err.to_string())
}

/// `X-RateLimit-Reset` (seconds) with `Retry-After` as fallback.
fn rate_limit_seconds(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("X-RateLimit-Reset")
        .or_else(|| response.headers().get("Retry-After"))
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

fn truncate(body: &str) -> String {
    if body.len() > 200 {
        format!("{}...", &body[..200])
    } else {
        body.to_string()
    }
}
