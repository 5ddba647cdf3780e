//! Odoo ERP inspection point source
//!
//! Read-only JSON-RPC client. Authenticates once per process and reads the
//! products of the configured inspection-point category.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};
use url::Url;

use super::trait_::{ErpError, InspectionPointSource};
use crate::models::InspectionPoint;

const PRODUCT_MODEL: &str = "product.product";
const PRODUCT_FIELDS: [&str; 5] = ["id", "name", "default_code", "barcode", "active"];

#[derive(Debug, Clone)]
pub struct OdooConfig {
    pub url: Url,
    pub database: String,
    pub username: String,
    pub password: String,
    pub category_id: i64,
    pub timeout: Duration,
}

pub struct OdooClient {
    client: Client,
    config: OdooConfig,
    uid: OnceCell<i64>,
    request_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcFault>,
}

#[derive(Debug, Deserialize)]
struct RpcFault {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<RpcFaultData>,
}

#[derive(Debug, Deserialize)]
struct RpcFaultData {
    #[serde(default)]
    message: Option<String>,
}

/// Product row; Odoo sends `false` for empty optional fields.
#[derive(Debug, Deserialize)]
struct ProductRecord {
    id: i64,
    #[serde(default)]
    name: Value,
    #[serde(default)]
    default_code: Value,
    #[serde(default)]
    barcode: Value,
    #[serde(default)]
    active: Option<bool>,
}

impl OdooClient {
    pub fn new(config: OdooConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            uid: OnceCell::new(),
            request_id: AtomicU64::new(1),
        })
    }

    fn endpoint(&self) -> Result<Url, ErpError> {
        self.config
            .url
            .join("jsonrpc")
            .map_err(|err| ErpError::Transport {
                details: format!("invalid ERP URL: {err}"),
            })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        service: &str,
        method: &str,
        args: Value,
    ) -> Result<T, ErpError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": {"service": service, "method": method, "args": args},
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
        });

        let response = self
            .client
            .post(self.endpoint()?)
            .json(&body)
            .send()
            .await
            .map_err(|err| ErpError::Transport {
                details: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ErpError::Http {
                status: response.status().as_u16(),
            });
        }

        let envelope: RpcResponse =
            response
                .json()
                .await
                .map_err(|err| ErpError::MalformedResponse {
                    details: err.to_string(),
                })?;

        if let Some(fault) = envelope.error {
            let message = fault
                .data
                .and_then(|data| data.message)
                .filter(|message| !message.is_empty())
                .unwrap_or(fault.message);
            return Err(ErpError::Fault {
                code: fault.code,
                message,
            });
        }

        serde_json::from_value(envelope.result.unwrap_or(Value::Null)).map_err(|err| {
            ErpError::MalformedResponse {
                details: format!("{service}.{method}: {err}"),
            }
        })
    }

    async fn uid(&self) -> Result<i64, ErpError> {
        self.uid
            .get_or_try_init(|| async {
                let uid: Value = self
                    .call(
                        "common",
                        "authenticate",
                        json!([
                            self.config.database,
                            self.config.username,
                            self.config.password,
                            {}
                        ]),
                    )
                    .await?;
                let uid = uid.as_i64().ok_or_else(|| ErpError::AuthenticationFailed {
                    username: self.config.username.clone(),
                })?;
                info!(uid, database = %self.config.database, "Authenticated with ERP");
                Ok(uid)
            })
            .await
            .copied()
    }
}

#[async_trait]
impl InspectionPointSource for OdooClient {
    #[instrument(skip_all, fields(category_id = self.config.category_id))]
    async fn inspection_points(&self) -> Result<Vec<InspectionPoint>, ErpError> {
        let uid = self.uid().await?;
        let records: Vec<ProductRecord> = self
            .call(
                "object",
                "execute_kw",
                json!([
                    self.config.database,
                    uid,
                    self.config.password,
                    PRODUCT_MODEL,
                    "search_read",
                    [[["categ_id", "=", self.config.category_id]]],
                    {"fields": PRODUCT_FIELDS},
                ]),
            )
            .await?;

        let total = records.len();
        let points: Vec<InspectionPoint> = records
            .into_iter()
            .filter_map(|record| {
                let reference = odoo_string(&record.default_code)?;
                Some(InspectionPoint {
                    id: record.id,
                    name: odoo_string(&record.name).unwrap_or_default(),
                    reference,
                    device_identifier: odoo_string(&record.barcode),
                    active: record.active.unwrap_or(true),
                })
            })
            .collect();

        debug!(
            total,
            without_reference = total - points.len(),
            "Loaded ERP inspection points"
        );
        Ok(points)
    }
}

/// Odoo encodes missing values as `false`.
fn odoo_string(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn false_placeholders_are_absent() {
        assert_eq!(odoo_string(&json!(false)), None);
        assert_eq!(odoo_string(&json!("  ")), None);
        assert_eq!(odoo_string(&json!(" ERP1 ")), Some("ERP1".to_string()));
    }
}
