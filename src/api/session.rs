use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::AppState;
use crate::{
    constants::{DEFAULT_CHAIN_ID, TRANSACTION_WINDOW_DAYS},
    error::Result,
    models::{ApiResponse, BankAccount, BankTransaction, ChatMessage, IdentityProfile, Portfolio,
        Session, TokenBalance},
    services::ReadModel,
};

#[derive(Debug, Deserialize)]
pub struct ConnectSessionRequest {
    pub wallet_address: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectSessionResponse {
    pub session: Session,
    pub accounts: Vec<BankAccount>,
    pub messages: Vec<ChatMessage>,
}

/// POST /api/v1/session/connect
pub async fn connect(
    State(state): State<AppState>,
    Json(req): Json<ConnectSessionRequest>,
) -> Result<Json<ApiResponse<ConnectSessionResponse>>> {
    let context = state.sessions.connect(&req.wallet_address).await?;
    let snapshot = context.facade.snapshot().await;

    Ok(Json(ApiResponse::success(ConnectSessionResponse {
        session: context.session.clone(),
        accounts: snapshot.accounts,
        messages: context.bridge.history().await,
    })))
}

/// GET /api/v1/session/{wallet}/snapshot
pub async fn snapshot(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Result<Json<ApiResponse<ReadModel>>> {
    let context = state.sessions.get(&wallet).await?;
    Ok(Json(ApiResponse::success(context.facade.snapshot().await)))
}

#[derive(Debug, Deserialize)]
pub struct RefreshTransactionsRequest {
    pub account_id: String,
}

/// POST /api/v1/session/{wallet}/refresh/transactions
pub async fn refresh_transactions(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
    Json(req): Json<RefreshTransactionsRequest>,
) -> Result<Json<ApiResponse<Vec<BankTransaction>>>> {
    let context = state.sessions.get(&wallet).await?;
    context.facade.refresh_transactions(&req.account_id).await?;

    let snapshot = context.facade.snapshot().await;
    let transactions = snapshot
        .transactions
        .into_iter()
        .filter(|tx| tx.account_id == req.account_id)
        .collect();
    Ok(Json(ApiResponse::success(transactions)))
}

#[derive(Debug, Deserialize, Default)]
pub struct RefreshBalancesRequest {
    pub chain_id: Option<u64>,
}

/// POST /api/v1/session/{wallet}/refresh/balances
pub async fn refresh_balances(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
    Json(req): Json<RefreshBalancesRequest>,
) -> Result<Json<ApiResponse<Vec<TokenBalance>>>> {
    let context = state.sessions.get(&wallet).await?;
    let chain_id = req.chain_id.unwrap_or(DEFAULT_CHAIN_ID);
    context
        .facade
        .refresh_balances(context.facade.wallet_address(), chain_id)
        .await?;
    Ok(Json(ApiResponse::success(
        context.facade.snapshot().await.balances,
    )))
}

/// POST /api/v1/session/{wallet}/refresh/portfolio
pub async fn refresh_portfolio(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
    Json(req): Json<RefreshBalancesRequest>,
) -> Result<Json<ApiResponse<Portfolio>>> {
    let context = state.sessions.get(&wallet).await?;
    let chain_id = req.chain_id.unwrap_or(DEFAULT_CHAIN_ID);
    let portfolio = context
        .facade
        .refresh_portfolio(context.facade.wallet_address(), chain_id)
        .await?;
    Ok(Json(ApiResponse::success(portfolio)))
}

/// POST /api/v1/session/{wallet}/refresh/identity
pub async fn refresh_identity(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Result<Json<ApiResponse<Option<IdentityProfile>>>> {
    let context = state.sessions.get(&wallet).await?;
    let profile = context
        .facade
        .refresh_identity(context.facade.wallet_address())
        .await?;
    Ok(Json(ApiResponse::success(profile)))
}

#[derive(Debug, Deserialize)]
pub struct LinkBankRequest {
    pub account_id: String,
}

/// POST /api/v1/session/{wallet}/bank/link
pub async fn link_bank(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
    Json(req): Json<LinkBankRequest>,
) -> Result<Json<ApiResponse<BankAccount>>> {
    let context = state.sessions.get(&wallet).await?;
    let account = context.facade.connect_bank(&req.account_id).await?;
    Ok(Json(ApiResponse::success(account)))
}

/// DELETE /api/v1/session/{wallet}/bank/{account_id}
pub async fn unlink_bank(
    State(state): State<AppState>,
    Path((wallet, account_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Vec<BankAccount>>>> {
    let context = state.sessions.get(&wallet).await?;
    context.facade.disconnect_bank(&account_id).await?;
    Ok(Json(ApiResponse::success(
        context.facade.snapshot().await.accounts,
    )))
}

#[derive(Debug, Deserialize)]
pub struct SpendingSummaryQuery {
    pub account_id: String,
    pub days: Option<i64>,
}

/// GET /api/v1/session/{wallet}/spending-summary
pub async fn spending_summary(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
    Query(query): Query<SpendingSummaryQuery>,
) -> Result<Json<ApiResponse<BTreeMap<String, Decimal>>>> {
    let context = state.sessions.get(&wallet).await?;
    let days = query.days.unwrap_or(TRANSACTION_WINDOW_DAYS);
    let summary = context
        .facade
        .spending_summary(&query.account_id, days)
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}

#[derive(Debug, Deserialize)]
pub struct ChatSendRequest {
    pub message: String,
}

/// POST /api/v1/session/{wallet}/chat
pub async fn chat_send(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
    Json(req): Json<ChatSendRequest>,
) -> Result<Json<ApiResponse<ChatMessage>>> {
    let context = state.sessions.get(&wallet).await?;
    let reply = context.bridge.send(&req.message).await?;
    Ok(Json(ApiResponse::success(reply)))
}

/// GET /api/v1/session/{wallet}/chat/history
pub async fn chat_history(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Result<Json<ApiResponse<Vec<ChatMessage>>>> {
    let context = state.sessions.get(&wallet).await?;
    Ok(Json(ApiResponse::success(context.bridge.history().await)))
}
