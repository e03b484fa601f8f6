use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::{
    config::Config,
    constants::{PROVIDER_CONNECT_TIMEOUT_SECS, PROVIDER_REQUEST_TIMEOUT_SECS},
    error::{AppError, Result},
    integrations::BankProvider,
};

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderInstitution {
    pub name: Option<String>,
    pub bank_code: Option<String>,
}

/// Account record as the bank aggregation provider ships it. Fields are
/// optional here; the normalizer decides which ones are required.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderBankAccount {
    #[serde(alias = "_id")]
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    pub balance: Option<Decimal>,
    pub currency: Option<String>,
    #[serde(alias = "accountNumber")]
    pub account_number: Option<String>,
    pub institution: Option<ProviderInstitution>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderBankTransaction {
    #[serde(alias = "_id")]
    pub id: Option<String>,
    pub amount: Option<Decimal>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub narration: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub balance: Option<Decimal>,
    pub currency: Option<String>,
    pub reference: Option<String>,
}

#[derive(Deserialize)]
struct AccountEnvelope {
    account: ProviderBankAccount,
}

#[derive(Deserialize)]
struct TransactionsEnvelope {
    data: Vec<ProviderBankTransaction>,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionQuery {
    pub limit: u32,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Clone)]
pub struct BankClient {
    api_url: String,
    secret_key: String,
    http: reqwest::Client,
}

impl BankClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(PROVIDER_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(PROVIDER_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Internal(format!("Bank HTTP client init failed: {}", e)))?;

        Ok(Self {
            api_url: config.bank_api_url.trim_end_matches('/').to_string(),
            secret_key: config.bank_secret_key.trim().to_string(),
            http,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}{}", self.api_url, path))
            .map_err(|e| AppError::Internal(format!("Invalid bank API URL: {}", e)))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self
            .http
            .get(url)
            .header("mono-sec-key", &self.secret_key)
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("Bank API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream { status, body });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AppError::ProviderData(format!("Bank API payload decode failed: {}", e)))
    }
}

#[async_trait]
impl BankProvider for BankClient {
    async fn account(&self, account_id: &str) -> Result<ProviderBankAccount> {
        if account_id.trim().is_empty() {
            return Err(AppError::BadRequest("Account ID is required".to_string()));
        }
        let url = self.endpoint(&format!("/accounts/{}", account_id.trim()))?;
        let envelope: AccountEnvelope = self.get_json(url).await?;
        Ok(envelope.account)
    }

    async fn transactions(
        &self,
        account_id: &str,
        query: &TransactionQuery,
    ) -> Result<Vec<ProviderBankTransaction>> {
        if account_id.trim().is_empty() {
            return Err(AppError::BadRequest("Account ID is required".to_string()));
        }

        let mut url = self.endpoint(&format!("/accounts/{}/transactions", account_id.trim()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("limit", &query.limit.to_string());
            if let Some(start) = query.start {
                pairs.append_pair("start", &start.format("%Y-%m-%d").to_string());
            }
            if let Some(end) = query.end {
                pairs.append_pair("end", &end.format("%Y-%m-%d").to_string());
            }
        }

        let envelope: TransactionsEnvelope = self.get_json(url).await?;
        Ok(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_payload_deserializes_with_provider_aliases() {
        let raw = r#"{
            "account": {
                "_id": "acc_123",
                "name": "Main Checking",
                "type": "checking",
                "balance": 125000.5,
                "currency": "NGN",
                "accountNumber": "0123456789",
                "institution": { "name": "First Bank", "bank_code": "011" }
            }
        }"#;
        let envelope: AccountEnvelope = serde_json::from_str(raw).unwrap();
        let account = envelope.account;
        assert_eq!(account.id.as_deref(), Some("acc_123"));
        assert_eq!(account.account_type.as_deref(), Some("checking"));
        assert_eq!(
            account.institution.unwrap().name.as_deref(),
            Some("First Bank")
        );
    }

    #[test]
    fn transaction_payload_tolerates_missing_optional_fields() {
        let raw = r#"{
            "data": [
                {
                    "_id": "tx_1",
                    "amount": 1500,
                    "type": "debit",
                    "narration": "ATM withdrawal fee",
                    "date": "2024-05-01T09:30:00.000Z"
                }
            ]
        }"#;
        let envelope: TransactionsEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.data.len(), 1);
        let tx = &envelope.data[0];
        assert_eq!(tx.id.as_deref(), Some("tx_1"));
        assert_eq!(tx.kind.as_deref(), Some("debit"));
        assert!(tx.reference.is_none());
    }
}
