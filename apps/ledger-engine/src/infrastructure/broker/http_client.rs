//! HTTP broker client.
//!
//! Reports raw transport and API failures; classification and deadlines
//! belong to the broker gateway. No retries here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::application::ports::{
    BrokerClient, BrokerClientError, BrokerHolding, BrokerMargin, BrokerOrder, BrokerPosition,
    ModifyOrderParams, PlaceOrderParams, TriggerOrderParams,
};
use crate::config::BrokerConfig;
use crate::domain::shared::{BrokerOrderId, TriggerId};

use super::api_types::{
    Envelope, ErrorBody, MarginsData, OrderIdData, PositionsData, TriggerIdData, trigger_form,
};

/// API version header value.
const API_VERSION: &str = "3";

/// REST client for one authenticated broker session.
#[derive(Debug, Clone)]
pub struct HttpBrokerClient {
    client: Client,
    base_url: String,
    authorization: String,
}

impl HttpBrokerClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns `BrokerClientError::Other` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: &str,
        access_token: &str,
        timeout: Duration,
    ) -> Result<Self, BrokerClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BrokerClientError::Other(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            authorization: format!("token {api_key}:{access_token}"),
        })
    }

    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `BrokerClientError::Other` if credentials are missing or the
    /// HTTP client cannot be built.
    pub fn from_config(config: &BrokerConfig) -> Result<Self, BrokerClientError> {
        if !config.has_credentials() {
            return Err(BrokerClientError::Other(
                "broker api_key and access_token are required".to_string(),
            ));
        }
        Self::new(
            config.base_url.clone(),
            &config.api_key,
            &config.access_token,
            config.request_timeout(),
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header("X-Kite-Version", API_VERSION)
            .header("Authorization", &self.authorization)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BrokerClientError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let envelope: Envelope<T> =
            serde_json::from_str(&body).map_err(|e| BrokerClientError::Decode(e.to_string()))?;
        if !envelope.is_success() {
            return Err(BrokerClientError::Rejected(
                envelope
                    .message
                    .unwrap_or_else(|| "broker reported an error".to_string()),
            ));
        }
        envelope
            .data
            .ok_or_else(|| BrokerClientError::Decode("response has no data".to_string()))
    }
}

fn transport_error(err: reqwest::Error) -> BrokerClientError {
    if err.is_timeout() {
        BrokerClientError::Timeout
    } else if err.is_connect() {
        BrokerClientError::Connect(err.to_string())
    } else if err.is_decode() || err.is_body() {
        BrokerClientError::Decode(err.to_string())
    } else {
        BrokerClientError::Other(err.to_string())
    }
}

/// Non-2xx response. The broker message is kept verbatim; an unparseable
/// body is passed through as the message.
fn api_error(status: StatusCode, body: &str) -> BrokerClientError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed.message.unwrap_or_else(|| {
        if body.is_empty() {
            status.canonical_reason().unwrap_or("unknown error").to_string()
        } else {
            body.to_string()
        }
    });
    BrokerClientError::Api {
        status: status.as_u16(),
        error_type: parsed.error_type,
        message,
    }
}

#[async_trait]
impl BrokerClient for HttpBrokerClient {
    async fn place_order(
        &self,
        params: &PlaceOrderParams,
    ) -> Result<BrokerOrderId, BrokerClientError> {
        tracing::info!(
            symbol = %params.tradingsymbol,
            exchange = %params.exchange,
            side = %params.transaction_type,
            quantity = %params.quantity,
            tag = ?params.tag,
            "Placing order"
        );
        let data: OrderIdData = self
            .send(self.request(Method::POST, "/orders/regular").form(params))
            .await?;
        Ok(BrokerOrderId::new(data.order_id))
    }

    async fn modify_order(
        &self,
        order_id: &BrokerOrderId,
        params: &ModifyOrderParams,
    ) -> Result<BrokerOrderId, BrokerClientError> {
        let path = format!("/orders/regular/{order_id}");
        let data: OrderIdData = self
            .send(self.request(Method::PUT, &path).form(params))
            .await?;
        Ok(BrokerOrderId::new(data.order_id))
    }

    async fn cancel_order(
        &self,
        order_id: &BrokerOrderId,
    ) -> Result<BrokerOrderId, BrokerClientError> {
        tracing::info!(broker_order_id = %order_id, "Cancelling order");
        let path = format!("/orders/regular/{order_id}");
        let data: OrderIdData = self.send(self.request(Method::DELETE, &path)).await?;
        Ok(BrokerOrderId::new(data.order_id))
    }

    async fn place_trigger_order(
        &self,
        params: &TriggerOrderParams,
    ) -> Result<TriggerId, BrokerClientError> {
        let form = trigger_form(params);
        let data: TriggerIdData = self
            .send(self.request(Method::POST, "/gtt/triggers").form(&form))
            .await?;
        Ok(TriggerId::new(data.trigger_id.to_string()))
    }

    async fn cancel_trigger_order(
        &self,
        trigger_id: &TriggerId,
    ) -> Result<TriggerId, BrokerClientError> {
        let path = format!("/gtt/triggers/{trigger_id}");
        let data: TriggerIdData = self.send(self.request(Method::DELETE, &path)).await?;
        Ok(TriggerId::new(data.trigger_id.to_string()))
    }

    async fn orders(&self) -> Result<Vec<BrokerOrder>, BrokerClientError> {
        self.send(self.request(Method::GET, "/orders")).await
    }

    async fn positions(&self) -> Result<Vec<BrokerPosition>, BrokerClientError> {
        let data: PositionsData = self
            .send(self.request(Method::GET, "/portfolio/positions"))
            .await?;
        Ok(data.net)
    }

    async fn holdings(&self) -> Result<Vec<BrokerHolding>, BrokerClientError> {
        self.send(self.request(Method::GET, "/portfolio/holdings"))
            .await
    }

    async fn margins(&self) -> Result<Vec<BrokerMargin>, BrokerClientError> {
        let data: MarginsData = self.send(self.request(Method::GET, "/user/margins")).await?;
        Ok(data.into_margins())
    }
}
