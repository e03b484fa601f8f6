use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

use crate::{
    constants::{supported_tokens, TRANSACTION_REFRESH_LIMIT, TRANSACTION_WINDOW_DAYS},
    db::SessionStore,
    error::Result,
    integrations::{BankProvider, ChainProvider, TransactionQuery},
    models::{BankAccount, BankTransaction, FlowKind, IdentityProfile, Portfolio, TokenBalance},
    services::normalize,
    utils::ensure_evm_address,
};

/// The read model assembled from the provider gateways. Snapshots of it are
/// what the HTTP surface and the assistant context builder consume.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReadModel {
    pub accounts: Vec<BankAccount>,
    pub transactions: Vec<BankTransaction>,
    pub balances: Vec<TokenBalance>,
    pub portfolio: Option<Portfolio>,
    pub identity: Option<IdentityProfile>,
    pub last_error: Option<String>,
}

impl ReadModel {
    // The replacement is a single assignment under the write lock; readers
    // never observe a half-replaced set.
    fn replace_account_transactions(&mut self, account_id: &str, incoming: Vec<BankTransaction>) {
        self.transactions.retain(|tx| tx.account_id != account_id);
        self.transactions.extend(incoming);
    }

    fn upsert_account(&mut self, account: BankAccount) {
        match self.accounts.iter_mut().find(|a| a.id == account.id) {
            Some(existing) => *existing = account,
            None => self.accounts.push(account),
        }
    }

    fn purge_account(&mut self, account_id: &str) {
        self.accounts.retain(|a| a.id != account_id);
        self.transactions.retain(|tx| tx.account_id != account_id);
    }
}

/// Monotonic ticket counter. A refresh commits its result only while it still
/// holds the newest ticket, so a late completion of a superseded refresh is
/// discarded instead of overwriting newer data.
#[derive(Default)]
pub(crate) struct RefreshSequence {
    issued: AtomicU64,
}

impl RefreshSequence {
    pub(crate) fn begin(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn is_current(&self, ticket: u64) -> bool {
        self.issued.load(Ordering::SeqCst) == ticket
    }
}

/// Same discipline, keyed per bank account: refreshes of different accounts
/// are independent and must not supersede each other.
#[derive(Default)]
pub(crate) struct KeyedSequence {
    issued: Mutex<HashMap<String, u64>>,
}

impl KeyedSequence {
    pub(crate) fn begin(&self, key: &str) -> u64 {
        let mut issued = self.issued.lock().expect("sequence lock poisoned");
        let ticket = issued.entry(key.to_string()).or_insert(0);
        *ticket += 1;
        *ticket
    }

    pub(crate) fn is_current(&self, key: &str, ticket: u64) -> bool {
        let issued = self.issued.lock().expect("sequence lock poisoned");
        issued.get(key).copied() == Some(ticket)
    }
}

#[derive(Default)]
struct Sequencers {
    transactions: KeyedSequence,
    balances: RefreshSequence,
    portfolio: RefreshSequence,
    identity: RefreshSequence,
}

/// Per-wallet aggregation facade. All four read-model slices refresh
/// independently; a failed refresh records an error string and leaves the
/// prior data in place.
pub struct FinanceFacade {
    wallet_address: String,
    bank: Arc<dyn BankProvider>,
    chain: Arc<dyn ChainProvider>,
    store: Arc<dyn SessionStore>,
    state: RwLock<ReadModel>,
    seq: Sequencers,
}

impl FinanceFacade {
    pub fn new(
        wallet_address: String,
        bank: Arc<dyn BankProvider>,
        chain: Arc<dyn ChainProvider>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            wallet_address,
            bank,
            chain,
            store,
            state: RwLock::new(ReadModel::default()),
            seq: Sequencers::default(),
        }
    }

    pub fn wallet_address(&self) -> &str {
        &self.wallet_address
    }

    pub async fn snapshot(&self) -> ReadModel {
        self.state.read().await.clone()
    }

    async fn record_error(&self, message: String) {
        self.state.write().await.last_error = Some(message);
    }

    /// Loads the persisted linked-account list into the read model and pulls
    /// each account's recent transactions best-effort.
    pub async fn restore(&self) -> Result<()> {
        let accounts = self.store.load_linked_accounts(&self.wallet_address).await?;
        {
            let mut state = self.state.write().await;
            state.accounts = accounts.clone();
        }
        for account in &accounts {
            if let Err(err) = self.refresh_transactions(&account.id).await {
                tracing::warn!(
                    "initial transaction refresh failed for {}: {}",
                    account.id,
                    err
                );
            }
        }
        Ok(())
    }

    /// Fetches the last 30 days (up to 100 records) and replaces the
    /// account's transaction subset. Other accounts are untouched; failure
    /// leaves the prior data in place.
    pub async fn refresh_transactions(&self, account_id: &str) -> Result<()> {
        let ticket = self.seq.transactions.begin(account_id);

        let end = Utc::now().date_naive();
        let start = end - Duration::days(TRANSACTION_WINDOW_DAYS);
        let query = TransactionQuery {
            limit: TRANSACTION_REFRESH_LIMIT,
            start: Some(start),
            end: Some(end),
        };

        let records = match self.bank.transactions(account_id, &query).await {
            Ok(records) => records,
            Err(err) => {
                self.record_error("Failed to refresh transactions".to_string())
                    .await;
                return Err(err);
            }
        };

        let mut incoming = Vec::with_capacity(records.len());
        for record in records {
            match normalize::bank_transaction(account_id, record) {
                Ok(tx) => incoming.push(tx),
                Err(err) => {
                    self.record_error("Failed to refresh transactions".to_string())
                        .await;
                    return Err(err);
                }
            }
        }

        let mut state = self.state.write().await;
        if !self.seq.transactions.is_current(account_id, ticket) {
            tracing::debug!(
                "discarding superseded transaction refresh for {}",
                account_id
            );
            return Ok(());
        }
        state.replace_account_transactions(account_id, incoming);
        state.last_error = None;
        Ok(())
    }

    /// Fetches every allow-listed token on the chain. A failure for one token
    /// is logged and skipped; partial results are expected.
    pub async fn refresh_balances(&self, address: &str, chain_id: u64) -> Result<usize> {
        ensure_evm_address(address)?;
        let ticket = self.seq.balances.begin();

        let mut balances = Vec::new();
        for token in supported_tokens(chain_id) {
            let fetched = match token.address {
                None => self.chain.native_balance(address, chain_id).await,
                Some(contract) => self.chain.token_balance(address, contract, chain_id).await,
            };
            match fetched {
                Ok(raw) => balances.push(normalize::token_balance(token, raw)),
                Err(err) => {
                    tracing::warn!("balance fetch failed for {}: {}", token.symbol, err);
                }
            }
        }

        let count = balances.len();
        let mut state = self.state.write().await;
        if self.seq.balances.is_current(ticket) {
            state.balances = balances;
            state.last_error = None;
        } else {
            tracing::debug!("discarding superseded balance refresh for {}", address);
        }
        Ok(count)
    }

    /// Derives portfolio totals from the current balance set. The derivation
    /// itself is pure; when no balances are loaded yet, a balance refresh
    /// runs first.
    pub async fn refresh_portfolio(&self, address: &str, chain_id: u64) -> Result<Portfolio> {
        ensure_evm_address(address)?;
        let ticket = self.seq.portfolio.begin();

        let mut balances = self.state.read().await.balances.clone();
        if balances.is_empty() {
            self.refresh_balances(address, chain_id).await?;
            balances = self.state.read().await.balances.clone();
        }

        let portfolio = normalize::derive_portfolio(balances);
        let mut state = self.state.write().await;
        if self.seq.portfolio.is_current(ticket) {
            state.portfolio = Some(portfolio.clone());
        }
        Ok(portfolio)
    }

    /// Absence of a profile is success-with-None. Lookup failures are logged
    /// but do not disturb the read model's error slot; identity is not
    /// critical to the rest of the view.
    pub async fn refresh_identity(&self, address: &str) -> Result<Option<IdentityProfile>> {
        ensure_evm_address(address)?;
        let ticket = self.seq.identity.begin();

        let profile = match self.chain.identity(address).await {
            Ok(profile) => profile,
            Err(err) => {
                tracing::warn!("identity lookup failed for {}: {}", address, err);
                return Err(err);
            }
        };

        let mut state = self.state.write().await;
        if self.seq.identity.is_current(ticket) {
            state.identity = profile.clone();
        }
        Ok(profile)
    }

    /// Completes a bank link: fetches the account record, adds it to the
    /// linked list, persists the list into the session blob, then pulls the
    /// account's transactions best-effort.
    pub async fn connect_bank(&self, account_id: &str) -> Result<BankAccount> {
        let record = match self.bank.account(account_id).await {
            Ok(record) => record,
            Err(err) => {
                self.record_error("Failed to connect bank account".to_string())
                    .await;
                return Err(err);
            }
        };
        let account = normalize::bank_account(record, Utc::now())?;

        let accounts = {
            let mut state = self.state.write().await;
            state.upsert_account(account.clone());
            state.accounts.clone()
        };
        self.store
            .save_linked_accounts(&self.wallet_address, &accounts)
            .await?;

        if let Err(err) = self.refresh_transactions(&account.id).await {
            tracing::warn!(
                "initial transaction refresh failed for {}: {}",
                account.id,
                err
            );
        }
        Ok(account)
    }

    /// Removes the account and all of its in-memory transactions, then
    /// persists the shrunken list. The local removal stands even when
    /// persistence fails.
    pub async fn disconnect_bank(&self, account_id: &str) -> Result<()> {
        let accounts = {
            let mut state = self.state.write().await;
            state.purge_account(account_id);
            state.accounts.clone()
        };

        if let Err(err) = self
            .store
            .save_linked_accounts(&self.wallet_address, &accounts)
            .await
        {
            self.record_error("Failed to disconnect bank account".to_string())
                .await;
            return Err(err);
        }
        Ok(())
    }

    /// Per-category expense totals over the given window, fetched fresh from
    /// the bank gateway.
    pub async fn spending_summary(
        &self,
        account_id: &str,
        days: i64,
    ) -> Result<BTreeMap<String, Decimal>> {
        let end = Utc::now().date_naive();
        let start = end - Duration::days(days);
        let query = TransactionQuery {
            limit: TRANSACTION_REFRESH_LIMIT,
            start: Some(start),
            end: Some(end),
        };

        let records = self.bank.transactions(account_id, &query).await?;
        let mut summary = BTreeMap::new();
        for record in records {
            let tx = normalize::bank_transaction(account_id, record)?;
            if tx.kind == FlowKind::Expense {
                *summary.entry(tx.category).or_insert(Decimal::ZERO) += tx.amount;
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{MemoryStore, MockBank, MockChain};

    const WALLET: &str = "0xd8da6bf26964af9d7eed9e03e53415d37aa96045";

    fn facade_with(bank: MockBank, chain: MockChain, store: Arc<MemoryStore>) -> FinanceFacade {
        FinanceFacade::new(
            WALLET.to_string(),
            Arc::new(bank),
            Arc::new(chain),
            store,
        )
    }

    #[test]
    fn sequence_discards_everything_but_the_newest_ticket() {
        let seq = RefreshSequence::default();
        let first = seq.begin();
        let second = seq.begin();
        assert!(!seq.is_current(first));
        assert!(seq.is_current(second));
    }

    #[test]
    fn keyed_sequence_tracks_accounts_independently() {
        let seq = KeyedSequence::default();
        let a1 = seq.begin("acc_a");
        let b1 = seq.begin("acc_b");
        assert!(seq.is_current("acc_a", a1));
        assert!(seq.is_current("acc_b", b1));
        let a2 = seq.begin("acc_a");
        assert!(!seq.is_current("acc_a", a1));
        assert!(seq.is_current("acc_a", a2));
        assert!(seq.is_current("acc_b", b1));
    }

    #[tokio::test]
    async fn transaction_refresh_is_idempotent_and_scoped_to_one_account() {
        let bank = MockBank::default();
        bank.seed_transactions("acc_a", &["Netflix subscription", "ATM withdrawal"]);
        bank.seed_transactions("acc_b", &["salary payment"]);
        let facade = facade_with(bank, MockChain::default(), Arc::new(MemoryStore::default()));

        facade.refresh_transactions("acc_a").await.unwrap();
        facade.refresh_transactions("acc_b").await.unwrap();
        let first = facade.snapshot().await;

        facade.refresh_transactions("acc_a").await.unwrap();
        let second = facade.snapshot().await;

        assert_eq!(first.transactions.len(), 3);
        assert_eq!(second.transactions.len(), 3);
        let ids = |model: &ReadModel, account: &str| {
            model
                .transactions
                .iter()
                .filter(|tx| tx.account_id == account)
                .map(|tx| tx.id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first, "acc_a"), ids(&second, "acc_a"));
        assert_eq!(ids(&first, "acc_b"), ids(&second, "acc_b"));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_prior_transactions_and_records_an_error() {
        let bank = MockBank::default();
        bank.seed_transactions("acc_a", &["grocery run"]);
        let facade = facade_with(
            bank.clone(),
            MockChain::default(),
            Arc::new(MemoryStore::default()),
        );

        facade.refresh_transactions("acc_a").await.unwrap();
        bank.fail_transactions(true);

        let result = facade.refresh_transactions("acc_a").await;
        assert!(result.is_err());

        let state = facade.snapshot().await;
        assert_eq!(state.transactions.len(), 1);
        assert_eq!(state.transactions[0].category, "Groceries");
        assert!(state.last_error.is_some());
    }

    #[tokio::test]
    async fn one_failing_token_does_not_abort_the_balance_refresh() {
        // Mainnet carries three tokens; fail the second (USDC).
        let chain = MockChain::default();
        chain.fail_token("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
        let facade = facade_with(
            MockBank::default(),
            chain,
            Arc::new(MemoryStore::default()),
        );

        let count = facade.refresh_balances(WALLET, 1).await.unwrap();
        assert_eq!(count, 2);

        let state = facade.snapshot().await;
        let symbols: Vec<_> = state.balances.iter().map(|b| b.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["ETH", "USDT"]);
    }

    #[tokio::test]
    async fn balance_refresh_rejects_malformed_addresses_up_front() {
        let facade = facade_with(
            MockBank::default(),
            MockChain::default(),
            Arc::new(MemoryStore::default()),
        );
        assert!(facade.refresh_balances("0xd8da6bf2", 1).await.is_err());
    }

    #[tokio::test]
    async fn portfolio_over_unknown_chain_totals_zero() {
        let facade = facade_with(
            MockBank::default(),
            MockChain::default(),
            Arc::new(MemoryStore::default()),
        );
        let portfolio = facade.refresh_portfolio(WALLET, 137).await.unwrap();
        assert_eq!(portfolio.total_value, 0.0);
        assert!(portfolio.tokens.is_empty());
        assert!(facade.snapshot().await.portfolio.is_some());
    }

    #[tokio::test]
    async fn identity_refresh_handles_absence_and_presence() {
        let chain = MockChain::default();
        let facade = facade_with(
            MockBank::default(),
            chain.clone(),
            Arc::new(MemoryStore::default()),
        );

        // No profile is a valid state, not an error.
        assert!(facade.refresh_identity(WALLET).await.unwrap().is_none());
        assert!(facade.snapshot().await.identity.is_none());

        chain.set_identity(IdentityProfile {
            name: "vitalik.eth".to_string(),
            address: WALLET.to_string(),
            avatar: None,
            description: Some("Ethereum co-founder".to_string()),
            twitter: None,
            github: None,
            website: None,
        });
        let profile = facade.refresh_identity(WALLET).await.unwrap().unwrap();
        assert_eq!(profile.name, "vitalik.eth");
        assert_eq!(
            facade.snapshot().await.identity.unwrap().name,
            "vitalik.eth"
        );
    }

    #[tokio::test]
    async fn disconnect_purges_transactions_and_the_persisted_list() {
        let bank = MockBank::default();
        bank.seed_account("acc_a", "Main Checking");
        bank.seed_transactions("acc_a", &["grocery run", "fuel stop"]);
        let store = Arc::new(MemoryStore::default());
        store.open_session(WALLET).await.unwrap();
        let facade = facade_with(bank, MockChain::default(), store.clone());

        facade.connect_bank("acc_a").await.unwrap();
        let connected = facade.snapshot().await;
        assert_eq!(connected.accounts.len(), 1);
        assert_eq!(connected.transactions.len(), 2);
        assert_eq!(store.load_linked_accounts(WALLET).await.unwrap().len(), 1);

        facade.disconnect_bank("acc_a").await.unwrap();
        let state = facade.snapshot().await;
        assert!(state.accounts.is_empty());
        assert!(state.transactions.is_empty());
        assert!(store.load_linked_accounts(WALLET).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn spending_summary_sums_expenses_by_category() {
        let bank = MockBank::default();
        bank.seed_transactions("acc_a", &["grocery run", "supermarket haul"]);
        bank.seed_income("acc_a", &["salary payment"]);
        let facade = facade_with(
            bank,
            MockChain::default(),
            Arc::new(MemoryStore::default()),
        );

        let summary = facade.spending_summary("acc_a", 30).await.unwrap();
        assert!(summary.contains_key("Groceries"));
        // Income (credit) rows never count towards spending.
        assert!(!summary.contains_key("Income"));
    }
}
