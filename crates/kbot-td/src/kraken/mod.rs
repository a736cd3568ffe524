//! Kraken spot REST gateway.
//!
//! Places market orders through `POST /0/private/AddOrder`. Every request
//! carries a fresh millisecond nonce and a `cl_ord_id` that is also logged,
//! so each attempt can be found in the venue's order history.
//!
//! Kraken always answers with HTTP 200 and a body of the form
//! `{"error": [...], "result": {...}}`; a non-empty `error` array is a
//! rejection.

pub mod auth;
pub mod config;

use async_trait::async_trait;
use kbot_core::time_util::now_ms;
use kbot_core::types::{OrderAck, Side};
use serde::Deserialize;
use tracing::info;

use crate::OrderGateway;
use crate::error::OrderError;

pub use config::{KrakenTdConfig, rest_pair_name};

const ADD_ORDER_PATH: &str = "/0/private/AddOrder";

pub struct KrakenGateway {
    http: reqwest::Client,
    config: KrakenTdConfig,
}

impl KrakenGateway {
    pub fn new(config: KrakenTdConfig) -> Result<Self, OrderError> {
        if config.api_key.is_empty() || config.api_secret.is_empty() {
            return Err(OrderError::Auth("KRAKEN_API_KEY and KRAKEN_API_SECRET must be set".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| OrderError::Transport(format!("building HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Form fields for a market order, nonce first.
    fn order_form(&self, nonce: &str, side: Side, volume: &str, cl_ord_id: &str) -> String {
        auth::encode_form(&[
            ("nonce", nonce),
            ("ordertype", "market"),
            ("type", side.as_str()),
            ("volume", volume),
            ("pair", &self.config.pair),
            ("cl_ord_id", cl_ord_id),
        ])
    }
}

#[async_trait]
impl OrderGateway for KrakenGateway {
    async fn place_order(&self, side: Side, size: f64) -> Result<OrderAck, OrderError> {
        let nonce = now_ms().to_string();
        let cl_ord_id = uuid::Uuid::new_v4().to_string();
        let body = self.order_form(&nonce, side, &size.to_string(), &cl_ord_id);
        let signature = auth::sign_request(&self.config.api_secret, ADD_ORDER_PATH, &nonce, &body)?;

        info!("[kraken-td] AddOrder {side} {size} {} cl_ord_id={cl_ord_id}", self.config.pair);

        let resp = self
            .http
            .post(format!("{}{ADD_ORDER_PATH}", self.config.rest_url))
            .header("API-Key", &self.config.api_key)
            .header("API-Sign", signature)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OrderError::Timeout(self.config.request_timeout.as_millis() as u64)
                } else {
                    OrderError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        let raw: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| OrderError::Transport(format!("HTTP {status}: unreadable body: {e}")))?;

        parse_add_order_response(raw)
    }
}

#[derive(Deserialize)]
struct AddOrderResult {
    #[serde(default)]
    txid: Vec<String>,
    descr: Option<AddOrderDescr>,
}

#[derive(Deserialize)]
struct AddOrderDescr {
    order: Option<String>,
}

/// Map a Kraken `AddOrder` response body to an ack or a rejection.
pub fn parse_add_order_response(raw: serde_json::Value) -> Result<OrderAck, OrderError> {
    let errors: Vec<String> = raw
        .get("error")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().map(|e| e.as_str().map_or_else(|| e.to_string(), str::to_owned)).collect())
        .unwrap_or_default();
    if !errors.is_empty() {
        if errors.iter().any(|e| e.starts_with("EAPI:Invalid key") || e.starts_with("EAPI:Invalid signature")) {
            return Err(OrderError::Auth(errors.join(", ")));
        }
        return Err(OrderError::Rejected(errors));
    }

    let result = raw
        .get("result")
        .cloned()
        .ok_or_else(|| OrderError::Transport(format!("response without result: {raw}")))?;
    let result: AddOrderResult = serde_json::from_value(result)
        .map_err(|e| OrderError::Transport(format!("unexpected AddOrder result: {e}: {raw}")))?;

    Ok(OrderAck { txids: result.txid, description: result.descr.and_then(|d| d.order), raw })
}
