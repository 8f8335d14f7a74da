// src/api/stripe_client.rs
//
// Minimal client for the Stripe REST API (https://api.stripe.com)
// Auth: `Authorization: Bearer <secret key>`, form-encoded bodies.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::payments::{PaymentError, PaymentProcessor, Payout, TopUpSession};
use crate::webhook::TOP_UP_PURPOSE;

pub const STRIPE_API_BASE: &str = "https://api.stripe.com";

#[derive(Debug, Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    currency: String,
    success_url: String,
    cancel_url: String,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
    id: String,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct TransferList {
    #[serde(default)]
    data: Vec<TransferResponse>,
}

impl StripeClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        currency: impl Into<String>,
        success_url: impl Into<String>,
        cancel_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PaymentError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            currency: currency.into(),
            success_url: success_url.into(),
            cancel_url: cancel_url.into(),
        })
    }

    async fn read<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, PaymentError> {
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(PaymentError::Api {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str::<T>(&body)
            .map_err(|e| PaymentError::InvalidResponse(format!("{e}; body={body}")))
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn create_top_up_session(
        &self,
        amount: i64,
        user_id: Uuid,
    ) -> Result<TopUpSession, PaymentError> {
        let user = user_id.to_string();
        let amount = amount.to_string();
        let form = [
            ("mode", "payment"),
            ("success_url", self.success_url.as_str()),
            ("cancel_url", self.cancel_url.as_str()),
            ("client_reference_id", user.as_str()),
            ("line_items[0][quantity]", "1"),
            ("line_items[0][price_data][currency]", self.currency.as_str()),
            ("line_items[0][price_data][unit_amount]", amount.as_str()),
            ("line_items[0][price_data][product_data][name]", "Wallet top-up"),
            ("metadata[user_id]", user.as_str()),
            ("metadata[purpose]", TOP_UP_PURPOSE),
        ];

        let resp = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .bearer_auth(&self.api_key)
            .form(&form)
            .send()
            .await?;

        let session: CheckoutSessionResponse = Self::read(resp).await?;
        let url = session.url.ok_or_else(|| {
            PaymentError::InvalidResponse(format!("checkout session {} has no url", session.id))
        })?;
        Ok(TopUpSession {
            id: session.id,
            url,
        })
    }

    async fn create_payout(
        &self,
        destination: &str,
        amount: i64,
        idempotency_key: &str,
    ) -> Result<Payout, PaymentError> {
        let amount_str = amount.to_string();
        let form = [
            ("amount", amount_str.as_str()),
            ("currency", self.currency.as_str()),
            ("destination", destination),
            ("transfer_group", idempotency_key),
        ];

        let resp = self
            .http
            .post(format!("{}/v1/transfers", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", idempotency_key)
            .form(&form)
            .send()
            .await?;

        let transfer: TransferResponse = Self::read(resp).await?;
        Ok(Payout {
            id: transfer.id,
            amount: transfer.amount,
        })
    }

    async fn find_payout(&self, idempotency_key: &str) -> Result<Option<Payout>, PaymentError> {
        let resp = self
            .http
            .get(format!("{}/v1/transfers", self.base_url))
            .bearer_auth(&self.api_key)
            .query(&[("transfer_group", idempotency_key), ("limit", "1")])
            .send()
            .await?;

        let list: TransferList = Self::read(resp).await?;
        Ok(list.data.into_iter().next().map(|t| Payout {
            id: t.id,
            amount: t.amount,
        }))
    }
}
