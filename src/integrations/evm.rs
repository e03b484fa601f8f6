use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError};
use ethers::types::Address;
use std::str::FromStr;
use std::sync::Arc;

use crate::{
    config::Config,
    error::{AppError, Result},
    integrations::{ChainProvider, ProviderBalance},
    models::IdentityProfile,
    utils::{ensure_evm_address, format_base_units},
};

const NATIVE_DECIMALS: u8 = 18;

/// Reads balances and identity records straight from the configured JSON-RPC
/// endpoints. Identity (ENS-style) lookups always run against mainnet.
#[derive(Clone)]
pub struct EvmClient {
    config: Config,
}

impl EvmClient {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn provider_for(&self, chain_id: u64) -> Result<Provider<Http>> {
        let url = self.config.rpc_url_for(chain_id).ok_or_else(|| {
            AppError::BadRequest(format!("Unsupported or unconfigured chain id: {}", chain_id))
        })?;
        Provider::<Http>::try_from(url)
            .map_err(|e| AppError::Internal(format!("Invalid EVM RPC URL: {}", e)))
    }
}

fn parse_address(address: &str) -> Result<Address> {
    ensure_evm_address(address)?;
    Address::from_str(address).map_err(|_| AppError::BadRequest("Invalid address format".to_string()))
}

// A resolver that does not know the address is a plain "no profile", not a
// failure.
fn is_missing_name(err: &ProviderError) -> bool {
    matches!(err, ProviderError::EnsError(_) | ProviderError::EnsNotOwned(_))
}

async fn resolve_text_record(
    provider: &Provider<Http>,
    name: &str,
    field: &str,
) -> Option<String> {
    match provider.resolve_field(name, field).await {
        Ok(value) if !value.trim().is_empty() => Some(value),
        Ok(_) => None,
        Err(err) => {
            tracing::debug!("identity text record {} unavailable for {}: {}", field, name, err);
            None
        }
    }
}

#[async_trait]
impl ChainProvider for EvmClient {
    async fn native_balance(&self, address: &str, chain_id: u64) -> Result<ProviderBalance> {
        let addr = parse_address(address)?;
        let provider = self.provider_for(chain_id)?;

        let wei = provider
            .get_balance(addr, None)
            .await
            .map_err(|e| AppError::BlockchainRpc(e.to_string()))?;

        Ok(ProviderBalance {
            balance: wei.to_string(),
            balance_formatted: format_base_units(wei, NATIVE_DECIMALS),
            decimals: NATIVE_DECIMALS,
        })
    }

    async fn token_balance(
        &self,
        address: &str,
        token_address: &str,
        chain_id: u64,
    ) -> Result<ProviderBalance> {
        let addr = parse_address(address)?;
        let token_addr = parse_address(token_address)?;
        let provider = Arc::new(self.provider_for(chain_id)?);

        let erc20 = Erc20::new(token_addr, provider.clone());
        let raw = erc20
            .balance_of(addr)
            .call()
            .await
            .map_err(|e| AppError::BlockchainRpc(e.to_string()))?;
        let decimals = erc20.decimals().call().await.unwrap_or(NATIVE_DECIMALS);

        Ok(ProviderBalance {
            balance: raw.to_string(),
            balance_formatted: format_base_units(raw, decimals),
            decimals,
        })
    }

    async fn identity(&self, address: &str) -> Result<Option<IdentityProfile>> {
        let addr = parse_address(address)?;
        let provider = self.provider_for(1)?;

        let name = match provider.lookup_address(addr).await {
            Ok(name) => name,
            Err(err) if is_missing_name(&err) => return Ok(None),
            Err(err) => return Err(AppError::BlockchainRpc(err.to_string())),
        };

        // Text records are best-effort; a missing record never fails the lookup.
        let avatar = resolve_text_record(&provider, &name, "avatar").await;
        let description = resolve_text_record(&provider, &name, "description").await;
        let twitter = resolve_text_record(&provider, &name, "com.twitter").await;
        let github = resolve_text_record(&provider, &name, "com.github").await;
        let website = resolve_text_record(&provider, &name, "url").await;

        Ok(Some(IdentityProfile {
            name,
            address: address.to_ascii_lowercase(),
            avatar,
            description,
            twitter,
            github,
            website,
        }))
    }
}

ethers::contract::abigen!(
    Erc20,
    r#"[
        function balanceOf(address) view returns (uint256)
        function decimals() view returns (uint8)
    ]"#
);
