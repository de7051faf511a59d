// src/services/intasend.rs
//
// IntaSend client: send-money initiation and tracking-id status lookup, plus
// webhook signature verification. The signature header carries an HS256 JWT
// signed with the webhook secret; we only care that the token verifies, not
// about its claims.

use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::models::ProviderPayoutStatus;
use crate::store::{PaymentProvider, PayoutAck, PayoutDestination};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct IntaSendService {
    client: Client,
    config: Arc<Config>,
}

// ─── IntaSend Send-Money ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct SendMoneyRequest {
    currency: String,
    provider: String,
    transactions: Vec<SendMoneyEntry>,
    requires_approval: String,
}

#[derive(Debug, Serialize)]
struct SendMoneyEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    account: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    bank_code: Option<String>,
    amount: Decimal,
    narrative: String,
}

#[derive(Debug, Deserialize)]
struct SendMoneyResponse {
    tracking_id: Option<String>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

// ─── IntaSend Status ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct StatusRequest {
    tracking_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

impl IntaSendService {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Verify the `X-IntaSend-Signature` header: an HS256 JWT signed with the
    /// configured webhook secret. Claims are provider metadata we ignore.
    pub fn verify_webhook_signature(&self, signature: &str) -> AppResult<()> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        decode::<serde_json::Value>(
            signature,
            &DecodingKey::from_secret(self.config.intasend_webhook_secret.as_bytes()),
            &validation,
        )
        .map_err(|_| AppError::InvalidSignature)?;
        Ok(())
    }
}

#[async_trait]
impl PaymentProvider for IntaSendService {
    async fn initiate_payout(
        &self,
        destination: &PayoutDestination,
        amount: Decimal,
        currency: &str,
        memo: &str,
    ) -> AppResult<PayoutAck> {
        let url = format!("{}/v1/send-money/initiate/", self.config.intasend_base_url);

        let (provider, entry) = match destination {
            PayoutDestination::MobileMoney { phone_number } => (
                "MPESA-B2C",
                SendMoneyEntry {
                    name: None,
                    account: phone_number.clone(),
                    bank_code: None,
                    amount,
                    narrative: memo.to_string(),
                },
            ),
            PayoutDestination::Bank {
                account,
                bank_code,
                name,
            } => (
                "PESALINK",
                SendMoneyEntry {
                    name: Some(name.clone()),
                    account: account.clone(),
                    bank_code: Some(bank_code.clone()),
                    amount,
                    narrative: memo.to_string(),
                },
            ),
        };

        let payload = SendMoneyRequest {
            currency: currency.to_string(),
            provider: provider.to_string(),
            transactions: vec![entry],
            requires_approval: "NO".to_string(),
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.intasend_secret_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Provider(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "Send-money request failed ({status}): {body}"
            )));
        }

        let result: SendMoneyResponse = resp
            .json()
            .await
            .map_err(|e| AppError::Provider(e.to_string()))?;

        if let Some(errors) = result.errors {
            return Err(AppError::Provider(format!("Send-money rejected: {errors}")));
        }

        let tracking_id = result
            .tracking_id
            .ok_or_else(|| AppError::Provider("No tracking_id in response".to_string()))?;

        debug!(tracking_id, provider, "Initiated payout");
        Ok(PayoutAck { tracking_id })
    }

    async fn check_status(&self, tracking_id: &str) -> AppResult<ProviderPayoutStatus> {
        let url = format!("{}/v1/send-money/status/", self.config.intasend_base_url);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.intasend_secret_key)
            .json(&StatusRequest {
                tracking_id: tracking_id.to_string(),
            })
            .send()
            .await
            .map_err(|e| AppError::Provider(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AppError::Provider(format!(
                "Status lookup failed: {}",
                resp.status()
            )));
        }

        let result: StatusResponse = resp
            .json()
            .await
            .map_err(|e| AppError::Provider(e.to_string()))?;

        Ok(ProviderPayoutStatus::from_provider(&result.status))
    }
}
