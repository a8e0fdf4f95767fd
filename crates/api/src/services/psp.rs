//! HTTP client for the external payment service provider.
//!
//! Implements the domain `PspClient` trait against the provider's REST
//! charge endpoint. Error mapping drives the retry policy: transport
//! failures and provider 5xx responses are retryable, a decline is not.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use domain::services::psp::{ChargeReceipt, ChargeRequest, PspClient, PspError};

use crate::config::PspConfig;

/// Wire request for the provider's charge endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChargeBody<'a> {
    rider_id: &'a str,
    amount: String,
    currency: &'a str,
    payment_method: &'a str,
}

/// Wire response from the provider.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChargeResponse {
    reference: String,
    status: String,
}

/// Reqwest-backed PSP client.
pub struct HttpPspClient {
    client: Client,
    base_url: String,
}

impl HttpPspClient {
    /// Create a client from configuration.
    pub fn new(config: &PspConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl PspClient for HttpPspClient {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeReceipt, PspError> {
        let body = ChargeBody {
            rider_id: &request.rider_id,
            amount: request.amount.to_string(),
            currency: &request.currency,
            payment_method: request.payment_method.as_str(),
        };

        let response = self
            .client
            .post(format!("{}/charges", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    PspError::Transport(e.to_string())
                } else {
                    PspError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(PspError::Unavailable(format!("provider returned {}", status)));
        }
        if status == StatusCode::PAYMENT_REQUIRED || status.is_client_error() {
            let reason = response.text().await.unwrap_or_default();
            return Err(PspError::Declined(reason));
        }

        let parsed: ChargeResponse = response
            .json()
            .await
            .map_err(|e| PspError::Unavailable(format!("invalid provider response: {}", e)))?;

        if parsed.status != "CAPTURED" {
            return Err(PspError::Declined(format!(
                "unexpected charge status {}",
                parsed.status
            )));
        }

        debug!(reference = %parsed.reference, "PSP charge captured");
        Ok(ChargeReceipt {
            reference: parsed.reference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::payment::PaymentMethod;
    use rust_decimal::Decimal;

    #[test]
    fn test_charge_body_serialization() {
        let request = ChargeRequest {
            rider_id: "usr_101".to_string(),
            amount: Decimal::new(2093, 2),
            currency: "USD".to_string(),
            payment_method: PaymentMethod::Card,
        };
        let body = ChargeBody {
            rider_id: &request.rider_id,
            amount: request.amount.to_string(),
            currency: &request.currency,
            payment_method: request.payment_method.as_str(),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"riderId\":\"usr_101\""));
        assert!(json.contains("\"amount\":\"20.93\""));
        assert!(json.contains("\"paymentMethod\":\"CARD\""));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = PspConfig {
            url: "https://psp.example.com/".to_string(),
            timeout_ms: 3000,
        };
        let client = HttpPspClient::new(&config).unwrap();
        assert_eq!(client.base_url, "https://psp.example.com");
    }

    #[test]
    fn test_charge_response_parsing() {
        let parsed: ChargeResponse =
            serde_json::from_str(r#"{"reference":"ch_123","status":"CAPTURED"}"#).unwrap();
        assert_eq!(parsed.reference, "ch_123");
        assert_eq!(parsed.status, "CAPTURED");
    }
}
