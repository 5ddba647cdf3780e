//! HTTP vendor cluster store
//!
//! Talks to the vendor device API with a bearer token obtained elsewhere.
//! Every request carries its own timeout: discovery pages get the long
//! discovery timeout, targeted cluster reads and writes the short one.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::trait_::{DeviceCloud, VendorError};
use crate::models::DeviceCluster;

const BODY_SNIPPET_LIMIT: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpDeviceCloudConfig {
    pub api_base: Url,
    pub token: String,
    pub discovery_timeout: Duration,
    pub cluster_timeout: Duration,
    pub page_size: u32,
    pub max_pages: u32,
}

pub struct HttpDeviceCloud {
    client: Client,
    config: HttpDeviceCloudConfig,
}

#[derive(Debug, Deserialize)]
struct ClusterPage {
    #[serde(default)]
    objs: Vec<Value>,
    #[serde(default)]
    meta: Option<PageMeta>,
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    #[serde(rename = "totalPages", default)]
    total_pages: Option<u32>,
}

impl HttpDeviceCloud {
    pub fn new(config: HttpDeviceCloudConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("device-bridge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, VendorError> {
        let mut url = self.config.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| VendorError::MalformedResponse {
                details: format!("vendor base URL {} cannot carry a path", self.config.api_base),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder, timeout: Duration) -> RequestBuilder {
        request
            .bearer_auth(&self.config.token)
            .header("Accept", "application/json")
            .timeout(timeout)
    }

    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<Response, VendorError> {
        let started = Instant::now();
        let result = request
            .send()
            .await
            .map_err(|err| transport_error(err, timeout));
        histogram!("vendor_request_duration_ms", "operation" => operation)
            .record(started.elapsed().as_millis() as f64);
        result
    }

    async fn fetch_page(&self, page: u32) -> Result<ClusterPage, VendorError> {
        let mut url = self.endpoint(&["device", "*"])?;
        url.query_pairs_mut()
            .append_pair("details", "true")
            .append_pair("discover", "true")
            .append_pair("page", &page.to_string())
            .append_pair("perPage", &self.config.page_size.to_string());

        let timeout = self.config.discovery_timeout;
        let response = self
            .send("discover", self.authorized(self.client.get(url), timeout), timeout)
            .await?;
        let response = check_status(response, None).await?;
        response
            .json::<ClusterPage>()
            .await
            .map_err(|err| decode_error(err, timeout))
    }
}

#[async_trait]
impl DeviceCloud for HttpDeviceCloud {
    #[instrument(skip_all)]
    async fn discover_all_clusters(&self) -> Result<Vec<DeviceCluster>, VendorError> {
        let page_size = self.config.page_size.max(1) as usize;
        let mut clusters = Vec::new();
        let mut skipped = 0usize;

        for page in 1..=self.config.max_pages.max(1) {
            let body = self.fetch_page(page).await?;
            let received = body.objs.len();
            let total_pages = body.meta.and_then(|meta| meta.total_pages);

            for obj in body.objs {
                match serde_json::from_value::<DeviceCluster>(obj) {
                    Ok(cluster) => clusters.push(cluster),
                    Err(err) => {
                        skipped += 1;
                        debug!(error = %err, "Skipping discovery object that is not a cluster");
                    }
                }
            }

            debug!(page, received, ?total_pages, "Fetched discovery page");

            let last_page = match total_pages {
                Some(total) => page >= total,
                None => received < page_size,
            };
            if last_page || received == 0 {
                break;
            }
            if page == self.config.max_pages {
                warn!(
                    max_pages = self.config.max_pages,
                    "Discovery stopped at page limit; topology may be incomplete"
                );
            }
        }

        info!(
            cluster_count = clusters.len(),
            skipped, "Vendor discovery complete"
        );
        Ok(clusters)
    }

    #[instrument(skip(self))]
    async fn get_cluster(
        &self,
        cluster_id: &str,
        record_type: &str,
    ) -> Result<DeviceCluster, VendorError> {
        let url = self.endpoint(&["device", record_type, cluster_id])?;
        let timeout = self.config.cluster_timeout;
        let response = self
            .send("get_cluster", self.authorized(self.client.get(url), timeout), timeout)
            .await?;
        let response = check_status(response, Some(cluster_id)).await?;
        let page = response
            .json::<ClusterPage>()
            .await
            .map_err(|err| decode_error(err, timeout))?;

        let first = page
            .objs
            .into_iter()
            .next()
            .ok_or_else(|| VendorError::ClusterNotFound {
                cluster_id: cluster_id.to_string(),
            })?;
        serde_json::from_value(first).map_err(|err| VendorError::MalformedResponse {
            details: format!("cluster {cluster_id}: {err}"),
        })
    }

    #[instrument(skip_all, fields(cluster_id = %cluster.id, device_count = cluster.devices().len()))]
    async fn put_cluster(&self, cluster: &DeviceCluster) -> Result<(), VendorError> {
        let url = self.endpoint(&["device", &cluster.record_type, &cluster.id])?;
        let timeout = self.config.cluster_timeout;
        let request = self.authorized(self.client.put(url), timeout).json(cluster);
        let response = self.send("put_cluster", request, timeout).await?;
        check_status(response, Some(&cluster.id)).await?;
        debug!("Cluster written to vendor");
        Ok(())
    }
}

async fn check_status(response: Response, cluster_id: Option<&str>) -> Result<Response, VendorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match (status, cluster_id) {
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => {
            return Err(VendorError::Unauthorized {
                status: status.as_u16(),
            });
        }
        (StatusCode::NOT_FOUND, Some(cluster_id)) => {
            return Err(VendorError::ClusterNotFound {
                cluster_id: cluster_id.to_string(),
            });
        }
        _ => {}
    }

    let retry_after = response
        .headers()
        .get("Retry-After")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    Err(VendorError::Http {
        status: status.as_u16(),
        body: snippet(&body),
        retry_after,
    })
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> VendorError {
    if err.is_timeout() {
        VendorError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else if err.is_connect() {
        VendorError::Network {
            details: err.to_string(),
            not_applied: true,
        }
    } else {
        VendorError::Network {
            details: err.to_string(),
            not_applied: false,
        }
    }
}

fn decode_error(err: reqwest::Error, timeout: Duration) -> VendorError {
    if err.is_timeout() {
        VendorError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        VendorError::MalformedResponse {
            details: err.to_string(),
        }
    }
}

fn snippet(body: &str) -> String {
    match body.char_indices().nth(BODY_SNIPPET_LIMIT) {
        Some((index, _)) => format!("{}…", &body[..index]),
        None => body.to_string(),
    }
}
