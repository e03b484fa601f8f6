// In-memory doubles for the provider and store seams, shared by the service
// tests. Nothing here is compiled into release builds.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::{
    db::SessionStore,
    error::{AppError, Result},
    integrations::{
        AssistantProvider, BankProvider, ChainProvider, ProviderBalance, ProviderBankAccount,
        ProviderBankTransaction, TransactionQuery,
    },
    models::{BankAccount, ChatMessage, IdentityProfile, Session},
};

// ==================== BANK ====================
#[derive(Default, Clone)]
pub(crate) struct MockBank {
    accounts: Arc<Mutex<HashMap<String, ProviderBankAccount>>>,
    transactions: Arc<Mutex<HashMap<String, Vec<ProviderBankTransaction>>>>,
    fail_transactions: Arc<AtomicBool>,
}

impl MockBank {
    pub fn seed_account(&self, id: &str, name: &str) {
        let record = ProviderBankAccount {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            account_type: Some("checking".to_string()),
            balance: Some(Decimal::new(125_000, 2)),
            currency: Some("NGN".to_string()),
            account_number: Some("0123456789".to_string()),
            institution: Some(crate::integrations::bank::ProviderInstitution {
                name: Some("First Bank".to_string()),
                bank_code: Some("011".to_string()),
            }),
        };
        self.accounts.lock().unwrap().insert(id.to_string(), record);
    }

    fn seed_rows(&self, account_id: &str, descriptions: &[&str], kind: &str) {
        let mut map = self.transactions.lock().unwrap();
        let rows = map.entry(account_id.to_string()).or_default();
        for description in descriptions {
            let index = rows.len();
            rows.push(ProviderBankTransaction {
                id: Some(format!("tx_{}_{}", account_id, index)),
                amount: Some(Decimal::new(1_500, 2)),
                kind: Some(kind.to_string()),
                narration: Some(description.to_string()),
                date: Some(Utc::now()),
                balance: None,
                currency: Some("NGN".to_string()),
                reference: None,
            });
        }
    }

    pub fn seed_transactions(&self, account_id: &str, descriptions: &[&str]) {
        self.seed_rows(account_id, descriptions, "debit");
    }

    pub fn seed_income(&self, account_id: &str, descriptions: &[&str]) {
        self.seed_rows(account_id, descriptions, "credit");
    }

    pub fn fail_transactions(&self, fail: bool) {
        self.fail_transactions.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BankProvider for MockBank {
    async fn account(&self, account_id: &str) -> Result<ProviderBankAccount> {
        self.accounts
            .lock()
            .unwrap()
            .get(account_id)
            .cloned()
            .ok_or_else(|| AppError::Upstream {
                status: 404,
                body: "{\"message\":\"unknown account\"}".to_string(),
            })
    }

    async fn transactions(
        &self,
        account_id: &str,
        _query: &TransactionQuery,
    ) -> Result<Vec<ProviderBankTransaction>> {
        if self.fail_transactions.load(Ordering::SeqCst) {
            return Err(AppError::Transport("simulated bank outage".to_string()));
        }
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .get(account_id)
            .cloned()
            .unwrap_or_default())
    }
}

// ==================== CHAIN ====================
#[derive(Default, Clone)]
pub(crate) struct MockChain {
    failing_tokens: Arc<Mutex<HashSet<String>>>,
    identity: Arc<Mutex<Option<IdentityProfile>>>,
}

impl MockChain {
    pub fn fail_token(&self, token_address: &str) {
        self.failing_tokens
            .lock()
            .unwrap()
            .insert(token_address.to_string());
    }

    pub fn set_identity(&self, profile: IdentityProfile) {
        *self.identity.lock().unwrap() = Some(profile);
    }
}

#[async_trait]
impl ChainProvider for MockChain {
    async fn native_balance(&self, _address: &str, _chain_id: u64) -> Result<ProviderBalance> {
        Ok(ProviderBalance {
            balance: "1500000000000000000".to_string(),
            balance_formatted: "1.500000".to_string(),
            decimals: 18,
        })
    }

    async fn token_balance(
        &self,
        _address: &str,
        token_address: &str,
        _chain_id: u64,
    ) -> Result<ProviderBalance> {
        if self.failing_tokens.lock().unwrap().contains(token_address) {
            return Err(AppError::Transport("simulated RPC outage".to_string()));
        }
        Ok(ProviderBalance {
            balance: "1500000".to_string(),
            balance_formatted: "1.500000".to_string(),
            decimals: 6,
        })
    }

    async fn identity(&self, _address: &str) -> Result<Option<IdentityProfile>> {
        Ok(self.identity.lock().unwrap().clone())
    }
}

// ==================== ASSISTANT ====================
pub(crate) struct MockAssistant {
    reply: Option<String>,
}

impl MockAssistant {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { reply: None }
    }
}

#[async_trait]
impl AssistantProvider for MockAssistant {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        match &self.reply {
            Some(text) => Ok(text.clone()),
            None => Err(AppError::Transport("simulated AI outage".to_string())),
        }
    }
}

// ==================== STORE ====================
#[derive(Default)]
pub(crate) struct MemoryStore {
    sessions: Mutex<HashMap<String, Session>>,
    accounts: Mutex<HashMap<String, Vec<BankAccount>>>,
    messages: Mutex<HashMap<Uuid, Vec<ChatMessage>>>,
}

impl MemoryStore {
    pub fn message_count(&self, session_id: Uuid) -> usize {
        self.messages
            .lock()
            .unwrap()
            .get(&session_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn open_session(&self, wallet_address: &str) -> Result<(Session, bool)> {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(existing) = sessions.get(wallet_address) {
            return Ok((existing.clone(), false));
        }
        let session = Session {
            id: Uuid::new_v4(),
            wallet_address: wallet_address.to_string(),
            session_data: serde_json::json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        sessions.insert(wallet_address.to_string(), session.clone());
        Ok((session, true))
    }

    async fn save_linked_accounts(
        &self,
        wallet_address: &str,
        accounts: &[BankAccount],
    ) -> Result<()> {
        self.accounts
            .lock()
            .unwrap()
            .insert(wallet_address.to_string(), accounts.to_vec());
        Ok(())
    }

    async fn load_linked_accounts(&self, wallet_address: &str) -> Result<Vec<BankAccount>> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .get(wallet_address)
            .cloned()
            .unwrap_or_default())
    }

    async fn store_message(&self, session_id: Uuid, message: &ChatMessage) -> Result<()> {
        self.messages
            .lock()
            .unwrap()
            .entry(session_id)
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn chat_history(&self, session_id: Uuid, limit: i64) -> Result<Vec<ChatMessage>> {
        let mut history = self
            .messages
            .lock()
            .unwrap()
            .get(&session_id)
            .cloned()
            .unwrap_or_default();
        history.truncate(limit.max(0) as usize);
        Ok(history)
    }
}
