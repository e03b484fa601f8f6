use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::{
    constants::{supported_tokens, DEFAULT_CHAIN_ID},
    error::{AppError, Result},
    models::{ApiResponse, IdentityProfile},
};

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub chain_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct TokenBalanceQuery {
    pub token_address: Option<String>,
    pub chain_id: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct NativeBalanceResponse {
    pub address: String,
    pub chain_id: u64,
    pub balance: String,
    pub balance_formatted: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Serialize)]
pub struct TokenBalanceResponse {
    pub address: String,
    pub token_address: String,
    pub chain_id: u64,
    pub balance: String,
    pub balance_formatted: String,
    pub decimals: u8,
}

fn native_symbol(chain_id: u64) -> String {
    supported_tokens(chain_id)
        .first()
        .map(|token| token.symbol.to_string())
        .unwrap_or_else(|| "ETH".to_string())
}

/// GET /api/v1/onchain/balance/{address}
pub async fn get_native_balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<ApiResponse<NativeBalanceResponse>>> {
    let chain_id = query.chain_id.unwrap_or(DEFAULT_CHAIN_ID);
    let fetched = state.chain.native_balance(&address, chain_id).await?;

    Ok(Json(ApiResponse::success(NativeBalanceResponse {
        address: address.to_ascii_lowercase(),
        chain_id,
        balance: fetched.balance,
        balance_formatted: fetched.balance_formatted,
        symbol: native_symbol(chain_id),
        decimals: fetched.decimals,
    })))
}

/// GET /api/v1/onchain/token-balance/{address}
pub async fn get_token_balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<TokenBalanceQuery>,
) -> Result<Json<ApiResponse<TokenBalanceResponse>>> {
    let token_address = query
        .token_address
        .as_deref()
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .ok_or_else(|| AppError::BadRequest("tokenAddress is required".to_string()))?;
    let chain_id = query.chain_id.unwrap_or(DEFAULT_CHAIN_ID);

    let fetched = state
        .chain
        .token_balance(&address, token_address, chain_id)
        .await?;

    Ok(Json(ApiResponse::success(TokenBalanceResponse {
        address: address.to_ascii_lowercase(),
        token_address: token_address.to_ascii_lowercase(),
        chain_id,
        balance: fetched.balance,
        balance_formatted: fetched.balance_formatted,
        decimals: fetched.decimals,
    })))
}

/// GET /api/v1/onchain/identity/{address}
///
/// A wallet without an identity profile answers success with a null profile.
pub async fn get_identity(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<ApiResponse<Option<IdentityProfile>>>> {
    let profile = state.chain.identity(&address).await?;
    Ok(Json(ApiResponse::success(profile)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_symbol_falls_back_for_unknown_chains() {
        assert_eq!(native_symbol(1), "ETH");
        assert_eq!(native_symbol(42161), "ETH");
        assert_eq!(native_symbol(999), "ETH");
    }
}
