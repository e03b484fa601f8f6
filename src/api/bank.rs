use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use super::AppState;
use crate::{
    constants::DEFAULT_TRANSACTION_LIMIT,
    error::{AppError, Result},
    integrations::TransactionQuery,
    models::{ApiResponse, BankAccount, BankTransaction},
    services::normalize,
};

#[derive(Debug, Deserialize)]
pub struct TransactionsQueryParams {
    pub limit: Option<u32>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

fn require_account_id(account_id: &str) -> Result<&str> {
    let trimmed = account_id.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("Account ID is required".to_string()));
    }
    Ok(trimmed)
}

/// GET /api/v1/bank/accounts/{account_id}
pub async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<ApiResponse<BankAccount>>> {
    let account_id = require_account_id(&account_id)?;
    let record = state.bank.account(account_id).await?;
    let account = normalize::bank_account(record, Utc::now())?;
    Ok(Json(ApiResponse::success(account)))
}

/// GET /api/v1/bank/accounts/{account_id}/transactions
pub async fn get_account_transactions(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Query(params): Query<TransactionsQueryParams>,
) -> Result<Json<ApiResponse<Vec<BankTransaction>>>> {
    let account_id = require_account_id(&account_id)?;
    let query = TransactionQuery {
        limit: params.limit.unwrap_or(DEFAULT_TRANSACTION_LIMIT),
        start: params.start,
        end: params.end,
    };

    let records = state.bank.transactions(account_id, &query).await?;
    let transactions = records
        .into_iter()
        .map(|record| normalize::bank_transaction(account_id, record))
        .collect::<Result<Vec<_>>>()?;
    Ok(Json(ApiResponse::success(transactions)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_account_ids_are_rejected() {
        assert!(require_account_id("  ").is_err());
        assert_eq!(require_account_id(" acc_1 ").unwrap(), "acc_1");
    }
}
