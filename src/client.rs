use std::time::Duration;

use rand::Rng;
use reqwest::header;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ApiErrorBody, MigrateError};
use crate::types::{Change, ConnectionDescriptor, NewZone, PatchZone, RRSet, Zone};

/// Typed HTTP client for one PowerDNS server's management API. One
/// instance per server (source, target); shares its `reqwest::Client`
/// connection pool across every concurrent zone pipeline that uses it.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    server_id: String,
    retry: crate::types::RetryPolicy,
    label: String,
}

impl ApiClient {
    pub fn new(desc: &ConnectionDescriptor) -> Result<Self, MigrateError> {
        let mut headers = header::HeaderMap::new();
        let mut auth_header = header::HeaderValue::from_str(&desc.api_key)
            .map_err(|e| MigrateError::Config(format!("invalid API key: {e}")))?;
        auth_header.set_sensitive(true);
        headers.insert("X-API-Key", auth_header);
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .user_agent(concat!("pdns-zone-migrate/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .danger_accept_invalid_certs(desc.insecure)
            .timeout(desc.timeout)
            .build()
            .map_err(|source| MigrateError::Transport {
                server: desc.base_url.clone(),
                source,
            })?;

        Ok(ApiClient {
            http,
            base_url: desc.base_url.clone(),
            server_id: desc.server_id.clone(),
            retry: desc.retry,
            label: desc.base_url.clone(),
        })
    }

    fn zones_url(&self) -> String {
        format!(
            "{}/api/v1/servers/{}/zones",
            self.base_url, self.server_id
        )
    }

    fn zone_url(&self, zone: &str) -> String {
        format!("{}/{zone}", self.zones_url())
    }

    /// List zone summaries known to this server.
    pub async fn list_zones(&self, cancel: &CancellationToken) -> Result<Vec<Zone>, MigrateError> {
        let url = self.zones_url();
        let resp = self
            .execute_with_retry(cancel, || self.http.get(&url))
            .await?;
        self.decode_json(resp, "GET", &url).await
    }

    /// Fetch the full zone, including rrsets.
    pub async fn get_zone(
        &self,
        zone: &str,
        cancel: &CancellationToken,
    ) -> Result<Zone, MigrateError> {
        let url = self.zone_url(zone);
        let resp = self
            .execute_with_retry(cancel, || self.http.get(&url))
            .await?;
        self.decode_json(resp, "GET", &url).await
    }

    /// Probe whether a zone exists; 404 maps to `Ok(false)` rather than an
    /// error, since absence is signal, not failure, on this path.
    pub async fn zone_exists(
        &self,
        zone: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, MigrateError> {
        let url = self.zone_url(zone);
        let resp = self
            .execute_with_retry(cancel, || self.http.get(&url))
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if resp.status().is_success() {
            return Ok(true);
        }
        Err(self.error_from_response(resp, "GET", &url).await)
    }

    /// Create a new zone.
    pub async fn create_zone(
        &self,
        zone: &NewZone,
        cancel: &CancellationToken,
    ) -> Result<(), MigrateError> {
        let url = self.zones_url();
        let resp = self
            .execute_with_retry(cancel, || {
                self.http
                    .post(&url)
                    .header(header::CONTENT_TYPE, "application/json")
                    .json(zone)
            })
            .await?;
        match resp.status() {
            reqwest::StatusCode::CREATED => Ok(()),
            status => Err(self.status_error(resp, status, "POST", &url).await),
        }
    }

    /// Delete a zone and everything in it.
    pub async fn delete_zone(
        &self,
        zone: &str,
        cancel: &CancellationToken,
    ) -> Result<(), MigrateError> {
        let url = self.zone_url(zone);
        let resp = self
            .execute_with_retry(cancel, || self.http.delete(&url))
            .await?;
        match resp.status() {
            reqwest::StatusCode::NO_CONTENT => Ok(()),
            status => Err(self.status_error(resp, status, "DELETE", &url).await),
        }
    }

    /// Apply a set of RRSet mutations to a zone in one PATCH.
    pub async fn patch_rrsets(
        &self,
        zone: &str,
        changes: Vec<Change>,
        cancel: &CancellationToken,
    ) -> Result<(), MigrateError> {
        let url = self.zone_url(zone);
        let body = PatchZone { rrsets: changes.clone() };
        let resp = self
            .execute_with_retry(cancel, || {
                self.http
                    .patch(&url)
                    .header(header::CONTENT_TYPE, "application/json")
                    .json(&body)
            })
            .await?;
        match resp.status() {
            reqwest::StatusCode::NO_CONTENT => Ok(()),
            status @ (reqwest::StatusCode::CONFLICT | reqwest::StatusCode::UNPROCESSABLE_ENTITY) => {
                Err(self.conflict_error(resp, status, &changes).await)
            }
            status => Err(self.status_error(resp, status, "PATCH", &url).await),
        }
    }

    /// Builds a `Conflict` error for a 409/422 response to a PATCH: the
    /// server applies the whole rrset list as one transaction, so the
    /// "offending RRSet" is reported as the first change in the batch —
    /// the best identification available without per-rrset error detail
    /// from the API.
    async fn conflict_error(
        &self,
        resp: reqwest::Response,
        status: reqwest::StatusCode,
        changes: &[Change],
    ) -> MigrateError {
        let body_text = resp.text().await.unwrap_or_default();
        let body = serde_json::from_str::<ApiErrorBody>(&body_text)
            .map(|e| e.to_string())
            .unwrap_or(body_text);
        let rrset = changes
            .first()
            .map(|c| RRSet {
                name: c.name.clone(),
                rrset_type: c.rrset_type.clone(),
                ttl: c.ttl.unwrap_or(0),
                records: c.records.clone().unwrap_or_default(),
                comments: c.comments.clone().unwrap_or_default(),
            })
            .unwrap_or_else(|| RRSet {
                name: String::new(),
                rrset_type: String::new(),
                ttl: 0,
                records: Vec::new(),
                comments: Vec::new(),
            });
        MigrateError::Conflict {
            status: status.as_u16(),
            rrset: Box::new(rrset),
            body,
        }
    }

    async fn decode_json<T: serde::de::DeserializeOwned>(
        &self,
        resp: reqwest::Response,
        method: &str,
        url: &str,
    ) -> Result<T, MigrateError> {
        if !resp.status().is_success() {
            return Err(self.error_from_response(resp, method, url).await);
        }
        resp.json::<T>().await.map_err(|source| MigrateError::Transport {
            server: self.label.clone(),
            source,
        })
    }

    async fn status_error(
        &self,
        resp: reqwest::Response,
        status: reqwest::StatusCode,
        method: &str,
        url: &str,
    ) -> MigrateError {
        let _ = status;
        self.error_from_response(resp, method, url).await
    }

    async fn error_from_response(
        &self,
        resp: reqwest::Response,
        method: &str,
        url: &str,
    ) -> MigrateError {
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();
        let body = serde_json::from_str::<ApiErrorBody>(&body_text)
            .map(|e| e.to_string())
            .unwrap_or(body_text);
        if status == reqwest::StatusCode::NOT_FOUND {
            return MigrateError::NotFound { path: url.to_string() };
        }
        MigrateError::Http {
            status: status.as_u16(),
            method: method.to_string(),
            path: url.to_string(),
            body,
        }
    }

    /// Runs `build` (which must construct a fresh `RequestBuilder` each
    /// time, since a sent request cannot be resent) up to `retries + 1`
    /// times, retrying on transport errors and on the 429/5xx status set.
    /// Every attempt and every inter-attempt sleep observes `cancel`.
    async fn execute_with_retry<F>(
        &self,
        cancel: &CancellationToken,
        build: F,
    ) -> Result<reqwest::Response, MigrateError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 1u32;
        loop {
            if cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }

            let req = build();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(MigrateError::Cancelled),
                res = req.send() => res.map_err(|source| MigrateError::Transport {
                    server: self.label.clone(),
                    source,
                }),
            };

            let retriable = match &result {
                Ok(resp) => MigrateError::is_retriable_status(resp.status()),
                Err(MigrateError::Transport { .. }) => true,
                Err(_) => false,
            };

            if !retriable || attempt > self.retry.retries {
                if retriable {
                    if let Ok(resp) = &result {
                        warn!(status = %resp.status(), "giving up after exhausting retries");
                    }
                }
                return result;
            }

            attempt += 1;
            let base_delay = self.retry.backoff_before(attempt);
            let jitter = if self.retry.jitter.is_zero() {
                Duration::ZERO
            } else {
                Duration::from_nanos(
                    rand::thread_rng().gen_range(0..=self.retry.jitter.as_nanos() as u64),
                )
            };
            let delay = base_delay + jitter;
            debug!(attempt, ?delay, server = %self.label, "retrying request");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(MigrateError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
