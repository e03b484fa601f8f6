use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    db::SessionStore,
    error::{AppError, Result},
    integrations::{AssistantProvider, BankProvider, ChainProvider},
    models::Session,
    services::{assistant::AssistantBridge, facade::FinanceFacade},
    utils::ensure_evm_address,
};

/// Everything bound to one connected wallet: the persisted session row, its
/// aggregation facade and its chat bridge.
pub struct SessionContext {
    pub session: Session,
    pub facade: Arc<FinanceFacade>,
    pub bridge: Arc<AssistantBridge>,
}

/// Owns the provider clients and hands out per-wallet session contexts.
/// Constructed once by the composition root; nothing here is a global.
pub struct SessionRegistry {
    bank: Arc<dyn BankProvider>,
    chain: Arc<dyn ChainProvider>,
    ai: Arc<dyn AssistantProvider>,
    store: Arc<dyn SessionStore>,
    sessions: RwLock<HashMap<String, Arc<SessionContext>>>,
}

impl SessionRegistry {
    pub fn new(
        bank: Arc<dyn BankProvider>,
        chain: Arc<dyn ChainProvider>,
        ai: Arc<dyn AssistantProvider>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            bank,
            chain,
            ai,
            store,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Connects a wallet: opens (or lazily creates) its session, restores the
    /// linked-account list and greets new sessions. Reconnecting an already
    /// connected wallet reuses the live context.
    pub async fn connect(&self, wallet_address: &str) -> Result<Arc<SessionContext>> {
        ensure_evm_address(wallet_address)?;
        let wallet = wallet_address.to_ascii_lowercase();

        if let Some(existing) = self.sessions.read().await.get(&wallet) {
            return Ok(existing.clone());
        }

        let (session, newly_created) = self.store.open_session(&wallet).await?;

        let facade = Arc::new(FinanceFacade::new(
            wallet.clone(),
            self.bank.clone(),
            self.chain.clone(),
            self.store.clone(),
        ));
        if let Err(err) = facade.restore().await {
            tracing::warn!("session restore failed for {}: {}", wallet, err);
        }

        let bridge = Arc::new(AssistantBridge::new(
            session.id,
            wallet.clone(),
            self.ai.clone(),
            self.store.clone(),
            facade.clone(),
        ));
        bridge.initialize(newly_created).await?;

        let context = Arc::new(SessionContext {
            session,
            facade,
            bridge,
        });

        let mut sessions = self.sessions.write().await;
        // Two concurrent connects for the same wallet: first one in wins.
        let entry = sessions.entry(wallet).or_insert_with(|| context.clone());
        Ok(entry.clone())
    }

    pub async fn get(&self, wallet_address: &str) -> Result<Arc<SessionContext>> {
        self.sessions
            .read()
            .await
            .get(&wallet_address.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| AppError::NotFound("Wallet session is not connected".to_string()))
    }
}
