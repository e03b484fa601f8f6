// Provider gateway clients. Each client holds its server-side credentials and
// maps provider responses/errors into the shared error taxonomy. The traits
// are the seams the facade and the assistant bridge depend on, so provider
// shape assumptions stay inside this module.

pub mod bank;
pub mod evm;
pub mod gemini;

pub use bank::{BankClient, ProviderBankAccount, ProviderBankTransaction, TransactionQuery};
pub use evm::EvmClient;
pub use gemini::GeminiClient;

use async_trait::async_trait;

use crate::{error::Result, models::IdentityProfile};

/// Raw balance as returned by a chain gateway, before normalization into a
/// [`crate::models::TokenBalance`].
#[derive(Debug, Clone)]
pub struct ProviderBalance {
    /// Base-unit integer, as a decimal string.
    pub balance: String,
    pub balance_formatted: String,
    pub decimals: u8,
}

#[async_trait]
pub trait BankProvider: Send + Sync {
    async fn account(&self, account_id: &str) -> Result<ProviderBankAccount>;

    async fn transactions(
        &self,
        account_id: &str,
        query: &TransactionQuery,
    ) -> Result<Vec<ProviderBankTransaction>>;
}

#[async_trait]
pub trait ChainProvider: Send + Sync {
    async fn native_balance(&self, address: &str, chain_id: u64) -> Result<ProviderBalance>;

    async fn token_balance(
        &self,
        address: &str,
        token_address: &str,
        chain_id: u64,
    ) -> Result<ProviderBalance>;

    /// Absence of a profile is a valid state, not an error.
    async fn identity(&self, address: &str) -> Result<Option<IdentityProfile>>;
}

#[async_trait]
pub trait AssistantProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}
