// Payment gateway client. The reconciliation loop only needs one question
// answered per payment: what is its effective status right now. Refunds do
// not change the gateway-side status, so the refunded amount is compared
// against the captured amount to derive the "refunded" state.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::app_config::PaymentProviderConfig;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Payment gateway request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Payment gateway returned {status}: {body}")]
    Gateway { status: u16, body: String },
}

/// Effective state of a payment as seen by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderPaymentStatus {
    Pending,
    Succeeded,
    Canceled,
    Refunded,
    NotFound,
    Unknown,
}

#[derive(Deserialize)]
struct GatewayAmount {
    value: String,
}

#[derive(Deserialize)]
struct GatewayPayment {
    status: String,
    amount: Option<GatewayAmount>,
    refunded_amount: Option<GatewayAmount>,
}

fn parse_minor_units(value: &str) -> Option<i64> {
    let mut parts = value.splitn(2, '.');
    let whole: i64 = parts.next()?.parse().ok()?;
    let frac = parts.next().unwrap_or("0");
    let cents: i64 = format!("{:0<2}", frac).get(..2)?.parse().ok()?;
    Some(whole * 100 + cents)
}

/// Map a raw gateway payment object to its effective status. A payment the
/// gateway reports as succeeded counts as refunded once the refunded amount
/// covers the captured amount.
fn classify_payment(payment: &GatewayPayment) -> ProviderPaymentStatus {
    match payment.status.as_str() {
        "pending" | "waiting_for_capture" => ProviderPaymentStatus::Pending,
        "canceled" => ProviderPaymentStatus::Canceled,
        "succeeded" => {
            let paid = payment
                .amount
                .as_ref()
                .and_then(|a| parse_minor_units(&a.value));
            let refunded = payment
                .refunded_amount
                .as_ref()
                .and_then(|a| parse_minor_units(&a.value));
            match (paid, refunded) {
                (Some(paid), Some(refunded)) if refunded >= paid && paid > 0 => {
                    ProviderPaymentStatus::Refunded
                }
                _ => ProviderPaymentStatus::Succeeded,
            }
        }
        other => {
            warn!(status = other, "Unrecognized gateway payment status");
            ProviderPaymentStatus::Unknown
        }
    }
}

/// Lookup interface the refund loop depends on.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn payment_status(
        &self,
        provider_payment_id: &str,
    ) -> Result<ProviderPaymentStatus, PaymentError>;
}

pub struct GatewayClient {
    http: Client,
    api_url: String,
    auth_header: String,
}

impl GatewayClient {
    pub fn new(config: &PaymentProviderConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_default();
        let credentials = format!("{}:{}", config.shop_id, config.secret_key);
        Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            auth_header: format!("Basic {}", BASE64.encode(credentials)),
        }
    }
}

#[async_trait]
impl PaymentProvider for GatewayClient {
    async fn payment_status(
        &self,
        provider_payment_id: &str,
    ) -> Result<ProviderPaymentStatus, PaymentError> {
        let response = self
            .http
            .get(format!("{}/payments/{}", self.api_url, provider_payment_id))
            .header("Authorization", &self.auth_header)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(ProviderPaymentStatus::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Gateway {
                status: status.as_u16(),
                body,
            });
        }

        let payment: GatewayPayment = response.json().await?;
        Ok(classify_payment(&payment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(status: &str, amount: Option<&str>, refunded: Option<&str>) -> GatewayPayment {
        GatewayPayment {
            status: status.to_string(),
            amount: amount.map(|v| GatewayAmount {
                value: v.to_string(),
            }),
            refunded_amount: refunded.map(|v| GatewayAmount {
                value: v.to_string(),
            }),
        }
    }

    #[test]
    fn test_parse_minor_units() {
        assert_eq!(parse_minor_units("199.00"), Some(19900));
        assert_eq!(parse_minor_units("199.5"), Some(19950));
        assert_eq!(parse_minor_units("199"), Some(19900));
        assert_eq!(parse_minor_units("abc"), None);
    }

    #[test]
    fn test_succeeded_without_refund() {
        let p = payment("succeeded", Some("199.00"), Some("0.00"));
        assert_eq!(classify_payment(&p), ProviderPaymentStatus::Succeeded);
    }

    #[test]
    fn test_full_refund_detected() {
        let p = payment("succeeded", Some("199.00"), Some("199.00"));
        assert_eq!(classify_payment(&p), ProviderPaymentStatus::Refunded);
    }

    #[test]
    fn test_partial_refund_is_not_refunded() {
        let p = payment("succeeded", Some("199.00"), Some("100.00"));
        assert_eq!(classify_payment(&p), ProviderPaymentStatus::Succeeded);
    }

    #[test]
    fn test_pending_and_canceled() {
        assert_eq!(
            classify_payment(&payment("pending", None, None)),
            ProviderPaymentStatus::Pending
        );
        assert_eq!(
            classify_payment(&payment("waiting_for_capture", None, None)),
            ProviderPaymentStatus::Pending
        );
        assert_eq!(
            classify_payment(&payment("canceled", None, None)),
            ProviderPaymentStatus::Canceled
        );
    }

    #[test]
    fn test_unknown_status() {
        assert_eq!(
            classify_payment(&payment("weird", None, None)),
            ProviderPaymentStatus::Unknown
        );
    }
}
