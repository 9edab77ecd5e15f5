use crate::auth::CredentialProvider;
use crate::error::ApiError;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Builds the HTTP client used for both the API and the token endpoint.
pub fn build_client(user_agent: &str, timeout_secs: u64) -> Result<reqwest::Client, ApiError> {
    Ok(reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Grouping keys accepted by the search-analytics query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Date,
    Query,
    Page,
    Country,
    Device,
}

/// Body of a search-analytics range query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub start_date: String,
    pub end_date: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<Dimension>,
    pub row_limit: u32,
    pub start_row: u64,
}

/// One row as it arrives on the wire, before validation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiRow {
    #[serde(default)]
    pub keys: Vec<String>,
    pub clicks: f64,
    pub impressions: f64,
    pub ctr: f64,
    pub position: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub rows: Option<Vec<ApiRow>>,
}

/// A validated row: whole-number counts and in-range ratios.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub keys: Vec<String>,
    pub clicks: u64,
    pub impressions: u64,
    pub ctr: f64,
    pub position: f64,
}

fn whole_count(value: f64, field: &str) -> Result<u64, ApiError> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
        Ok(value as u64)
    } else {
        Err(ApiError::Malformed(format!(
            "`{field}` must be a non-negative whole number, got {value}"
        )))
    }
}

impl ApiRow {
    /// Checks the row against the requested dimensions.
    pub fn validate(self, dimensions: &[Dimension]) -> Result<ResultRow, ApiError> {
        if self.keys.len() != dimensions.len() {
            return Err(ApiError::Malformed(format!(
                "expected {} dimension keys, got {}",
                dimensions.len(),
                self.keys.len()
            )));
        }
        let clicks = whole_count(self.clicks, "clicks")?;
        let impressions = whole_count(self.impressions, "impressions")?;
        if !(0.0..=1.0).contains(&self.ctr) {
            return Err(ApiError::Malformed(format!(
                "`ctr` must be within [0, 1], got {}",
                self.ctr
            )));
        }
        if !self.position.is_finite() || self.position < 0.0 {
            return Err(ApiError::Malformed(format!(
                "`position` must be a non-negative number, got {}",
                self.position
            )));
        }
        Ok(ResultRow {
            keys: self.keys,
            clicks,
            impressions,
            ctr: self.ctr,
            position: self.position,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteEntry {
    pub site_url: String,
    #[serde(default)]
    pub permission_level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SiteList {
    #[serde(default)]
    site_entry: Vec<SiteEntry>,
}

/// The operations the reports need from the search-analytics service.
#[allow(async_fn_in_trait)]
pub trait SearchAnalytics {
    /// Obtains credentials up front so setup failures surface before any fetch.
    async fn authorize(&mut self) -> Result<(), ApiError> {
        Ok(())
    }

    async fn list_sites(&mut self) -> Result<Vec<SiteEntry>, ApiError>;

    async fn query(&mut self, site: &str, request: &QueryRequest)
    -> Result<QueryResponse, ApiError>;
}

/// HTTP client for the Search Console webmasters v3 API.
pub struct SearchConsole<P> {
    client: reqwest::Client,
    base_url: Url,
    credentials: P,
    limiter: Option<DefaultDirectRateLimiter>,
    reauthorized: bool,
}

impl<P: CredentialProvider> SearchConsole<P> {
    pub fn new(client: reqwest::Client, base_url: Url, credentials: P) -> Self {
        SearchConsole {
            client,
            base_url,
            credentials,
            limiter: None,
            reauthorized: false,
        }
    }

    /// Paces calls to at most `per_minute` requests per minute.
    pub fn with_rate_limit(mut self, per_minute: Option<u32>) -> Self {
        self.limiter = per_minute
            .and_then(NonZeroU32::new)
            .map(|rate| RateLimiter::direct(Quota::per_minute(rate)));
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Malformed(format!("invalid API base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends a request, re-authorizing once per run on a 401.
    async fn send(
        &mut self,
        build: impl Fn(&reqwest::Client, &str) -> reqwest::RequestBuilder,
        site: &str,
    ) -> Result<reqwest::Response, ApiError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        let token = self.credentials.access_token().await?;
        let response = build(&self.client, &token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response, site).await;
        }
        if self.reauthorized {
            return Err(ApiError::Unauthorized);
        }
        self.reauthorized = true;
        let token = self.credentials.reauthorize().await?;
        let response = build(&self.client, &token).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        check_status(response, site).await
    }
}

async fn check_status(response: reqwest::Response, site: &str) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
        StatusCode::FORBIDDEN => ApiError::PermissionDenied {
            site: site.to_string(),
        },
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => ApiError::NoData { status, message },
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited(message),
        _ => ApiError::Status { status, message },
    })
}

impl<P: CredentialProvider> SearchAnalytics for SearchConsole<P> {
    async fn authorize(&mut self) -> Result<(), ApiError> {
        self.credentials.access_token().await?;
        Ok(())
    }

    async fn list_sites(&mut self) -> Result<Vec<SiteEntry>, ApiError> {
        let url = self.endpoint(&["sites"])?;
        let response = self
            .send(|client, token| client.get(url.clone()).bearer_auth(token), "")
            .await?;
        let list: SiteList = response
            .json()
            .await
            .map_err(|e| ApiError::Malformed(e.to_string()))?;
        Ok(list.site_entry)
    }

    async fn query(
        &mut self,
        site: &str,
        request: &QueryRequest,
    ) -> Result<QueryResponse, ApiError> {
        let url = self.endpoint(&["sites", site, "searchAnalytics", "query"])?;
        debug!(site, start_row = request.start_row, "POST {}", url);
        let response = self
            .send(
                |client, token| client.post(url.clone()).bearer_auth(token).json(request),
                site,
            )
            .await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Malformed(e.to_string()))
    }
}
