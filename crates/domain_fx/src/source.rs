//! External rate source
//!
//! The rate source is an external collaborator reached over HTTP with a
//! single call:
//!
//! ```text
//! GET {base_url}/rates?from=EUR&to=USD
//! 200 {"rate": 1.0842, "date": "2024-07-04"}
//! ```
//!
//! # Error Handling
//!
//! Responses are mapped to `FxError` variants:
//! - Timeouts -> `FxError::Timeout`
//! - Connection failures -> `FxError::Unavailable`
//! - Non-2xx -> `FxError::Upstream`
//! - Undecodable bodies, non-positive rates -> `FxError::InvalidResponse`

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use core_kernel::{Currency, DomainPort};

use crate::error::FxError;
use crate::rate::FetchedRate;

/// Port for the external rate provider
#[async_trait]
pub trait RateSource: DomainPort {
    /// Fetches the current `base -> quote` rate
    async fn fetch_rate(&self, base: Currency, quote: Currency) -> Result<FetchedRate, FxError>;
}

/// Configuration for the HTTP rate source
#[derive(Debug, Clone)]
pub struct HttpRateSourceConfig {
    /// Base URL of the rate API (e.g., "https://rates.example.com/api")
    pub base_url: String,

    /// Request timeout
    pub timeout: Duration,
}

impl Default for HttpRateSourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RateResponse {
    rate: Decimal,
    date: String,
}

/// HTTP implementation of [`RateSource`]
#[derive(Debug, Clone)]
pub struct HttpRateSource {
    config: HttpRateSourceConfig,
    http: reqwest::Client,
}

impl HttpRateSource {
    /// Creates a new rate source client
    ///
    /// # Errors
    ///
    /// Returns `FxError::Unavailable` if the HTTP client cannot be built
    pub fn new(config: HttpRateSourceConfig) -> Result<Self, FxError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| FxError::Unavailable(format!("cannot build HTTP client: {err}")))?;
        Ok(Self { config, http })
    }

    /// Returns the base URL of the rate API
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/rates", self.config.base_url.trim_end_matches('/'))
    }

    fn map_transport_error(&self, err: reqwest::Error, base: Currency, quote: Currency) -> FxError {
        if err.is_timeout() {
            FxError::Timeout {
                base,
                quote,
                duration_ms: self.config.timeout.as_millis() as u64,
            }
        } else if err.is_decode() {
            FxError::InvalidResponse(err.to_string())
        } else {
            FxError::Unavailable(err.to_string())
        }
    }
}

impl DomainPort for HttpRateSource {}

#[async_trait]
impl RateSource for HttpRateSource {
    #[instrument(skip(self), fields(base = %base, quote = %quote))]
    async fn fetch_rate(&self, base: Currency, quote: Currency) -> Result<FetchedRate, FxError> {
        let res = self
            .http
            .get(self.endpoint())
            .query(&[("from", base.code()), ("to", quote.code())])
            .send()
            .await
            .map_err(|err| self.map_transport_error(err, base, quote))?;

        let status = res.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "rate source returned an error status");
            return Err(FxError::Upstream {
                base,
                quote,
                status: status.as_u16(),
            });
        }

        let body = res
            .json::<RateResponse>()
            .await
            .map_err(|err| self.map_transport_error(err, base, quote))?;

        let fetched = parse_response(body)?;
        debug!(rate = %fetched.rate, date = %fetched.date, "fetched rate");
        Ok(fetched)
    }
}

fn parse_response(body: RateResponse) -> Result<FetchedRate, FxError> {
    if body.rate <= Decimal::ZERO {
        return Err(FxError::InvalidResponse(format!(
            "non-positive rate {}",
            body.rate
        )));
    }
    // Accept both plain dates and RFC 3339 timestamps
    let day = body.date.get(..10).unwrap_or(&body.date);
    let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|err| FxError::InvalidResponse(format!("bad date '{}': {err}", body.date)))?;
    Ok(FetchedRate {
        rate: body.rate,
        date,
    })
}
