//! Thin typed client for the watchlist, service-control and metrics endpoints.

use std::fs;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::types::{
    MetricsEntry, MetricsPage, MetricsQuery, MetricsResponse, ServiceAction, WatchlistItem,
    WatchlistResponse,
};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("bad url: {0}")]
    Url(String),
    #[error("tls setup: {0}")]
    Tls(String),
}

/// Build the shared HTTP client, optionally trusting an extra CA bundle.
pub fn build_http_client(tls_ca: Option<&str>) -> Result<Client, ApiError> {
    let mut builder = Client::builder();
    if let Some(path) = tls_ca {
        let pem = fs::read(path).map_err(|e| ApiError::Tls(format!("{path}: {e}")))?;
        let cert = reqwest::Certificate::from_pem(&pem)?;
        builder = builder.add_root_certificate(cert);
    }
    Ok(builder.build()?)
}

/// Base URL with a trailing slash, so relative joins stay under its path.
pub fn normalize_base(url: &str) -> Result<Url, ApiError> {
    let mut base = Url::parse(url).map_err(|e| ApiError::Url(format!("{url}: {e}")))?;
    if base.cannot_be_a_base() {
        return Err(ApiError::Url(format!("{url}: not a base url")));
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
}

impl ApiClient {
    pub fn new(http: Client, base: Url) -> Self {
        Self { http, base }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// `base` + segments, each percent-encoded as a single path segment.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::Url(self.base.to_string()))?;
            path.pop_if_empty();
            for s in segments {
                path.push(s);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
        Ok(self.http.request(method, self.endpoint(segments)?))
    }

    // Non-2xx becomes ApiError::Status carrying the body for diagnostics
    async fn send(req: RequestBuilder) -> Result<Response, ApiError> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ApiError::Status { status, body })
    }

    pub async fn fetch_watchlist(&self) -> Result<Vec<WatchlistItem>, ApiError> {
        let resp = Self::send(self.request(Method::GET, &["watchlist"])?).await?;
        let body: WatchlistResponse = resp.json().await?;
        let items = body.items.unwrap_or_default();
        debug!(count = items.len(), "watchlist fetched");
        Ok(items)
    }

    pub async fn add_to_watchlist(&self, name: &str) -> Result<(), ApiError> {
        let req = self
            .request(Method::POST, &["watchlist"])?
            .json(&json!({ "serviceName": name }));
        Self::send(req).await?;
        info!(service = name, "added to watchlist");
        Ok(())
    }

    pub async fn remove_from_watchlist(&self, name: &str) -> Result<(), ApiError> {
        Self::send(self.request(Method::DELETE, &["watchlist", name])?).await?;
        info!(service = name, "removed from watchlist");
        Ok(())
    }

    pub async fn set_auto_restart(&self, name: &str, auto_restart: bool) -> Result<(), ApiError> {
        let req = self
            .request(Method::PUT, &["watchlist", name])?
            .json(&json!({ "autoRestart": auto_restart }));
        Self::send(req).await?;
        Ok(())
    }

    /// Start/stop/restart. Failures are logged and reported as `false`.
    pub async fn control(&self, name: &str, action: ServiceAction) -> bool {
        let req = match self.request(Method::POST, &["services", name, action.as_str()]) {
            Ok(r) => r,
            Err(e) => {
                warn!(service = name, action = action.as_str(), "{e}");
                return false;
            }
        };
        match Self::send(req).await {
            Ok(_) => {
                info!(service = name, action = action.as_str(), "service control ok");
                true
            }
            Err(e) => {
                warn!(service = name, action = action.as_str(), "service control failed: {e}");
                false
            }
        }
    }

    pub async fn fetch_metrics(&self, query: &MetricsQuery) -> Result<MetricsPage, ApiError> {
        let req = self
            .request(Method::GET, &["metrics"])?
            .query(&query.normalized());
        let resp = Self::send(req).await?;
        let body: MetricsResponse = resp.json().await?;
        Ok(body.into())
    }

    /// Number of `service_failed` events within `since`. 0 when unavailable.
    pub async fn service_failed_count(&self, since: &str) -> u64 {
        self.count_events(MetricsQuery::default().event("service_failed").since(since))
            .await
    }

    pub async fn service_restart_count(&self, service: &str, since: &str) -> u64 {
        let q = MetricsQuery::default()
            .event("restart_success")
            .service(service)
            .since(since);
        self.count_events(q).await
    }

    pub async fn service_logs(&self, query: &MetricsQuery) -> Vec<MetricsEntry> {
        match self.fetch_metrics(query).await {
            Ok(page) => page.items,
            Err(e) => {
                warn!("metrics query failed: {e}");
                Vec::new()
            }
        }
    }

    async fn count_events(&self, query: MetricsQuery) -> u64 {
        match self.fetch_metrics(&query).await {
            Ok(page) => page.count,
            Err(e) => {
                warn!("metrics query failed: {e}");
                0
            }
        }
    }
}
