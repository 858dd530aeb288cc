//! HTTP order placement through an external signing gateway.
//!
//! The gateway owns credentials and signing. This placer only POSTs the leg
//! as JSON to `{base_url}/order` and reads back `{"code": <int>, "message": ..}`.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::execution::{ExecutionError, LegOrder, OrderPlacer, PlaceOrderResponse};

/// Bodies longer than this are cut when carried in an error.
const MAX_ERROR_BODY: usize = 512;

/// Placer that forwards legs to a signing gateway over HTTP.
#[derive(Debug, Clone)]
pub struct GatewayOrderPlacer {
    http: Client,
    base_url: String,
}

impl GatewayOrderPlacer {
    /// Builds a placer with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, ExecutionError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ExecutionError::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn order_url(&self) -> String {
        format!("{}/order", self.base_url)
    }
}

#[async_trait]
impl OrderPlacer for GatewayOrderPlacer {
    async fn place_order(&self, order: LegOrder) -> Result<PlaceOrderResponse, ExecutionError> {
        let url = self.order_url();
        tracing::debug!(url = %url, market = %order.market, side = %order.side, "POST leg");

        let response = self
            .http
            .post(&url)
            .header("Accept", "application/json")
            .json(&order)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(ExecutionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        serde_json::from_str::<PlaceOrderResponse>(&text)
            .map_err(|e| ExecutionError::InvalidResponse(format!("{e}: {text}")))
    }

    fn name(&self) -> &str {
        "gateway"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::execution::Side;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn order() -> LegOrder {
        LegOrder::new("tok-down", Side::Sell, dec!(50), dec!(0.51))
    }

    fn placer(server: &MockServer) -> GatewayOrderPlacer {
        GatewayOrderPlacer::new(format!("{}/", server.uri()), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_accepted_leg() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/order"))
            .and(body_partial_json(serde_json::json!({
                "market": "tok-down",
                "side": "SELL"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"code": 0})))
            .expect(1)
            .mount(&server)
            .await;

        let response = placer(&server).place_order(order()).await.unwrap();
        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn test_non_zero_code_is_ok_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/order"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"code": 4, "message": "not enough balance"}),
            ))
            .mount(&server)
            .await;

        let response = placer(&server).place_order(order()).await.unwrap();
        assert_eq!(response.code, 4);
        assert_eq!(response.message.as_deref(), Some("not enough balance"));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/order"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = placer(&server).place_order(order()).await.unwrap_err();
        match err {
            ExecutionError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unparseable_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/order"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let err = placer(&server).place_order(order()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidResponse(_)));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let placer = GatewayOrderPlacer::new("http://gw:8787/", Duration::from_secs(1)).unwrap();
        assert_eq!(placer.base_url(), "http://gw:8787");
        assert_eq!(placer.order_url(), "http://gw:8787/order");
    }
}
