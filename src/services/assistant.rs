use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    constants::{CHAT_CONTEXT_MESSAGES, CHAT_CONTEXT_TRANSACTIONS, CHAT_HISTORY_LIMIT},
    db::SessionStore,
    error::{AppError, Result},
    integrations::AssistantProvider,
    models::{ActionTier, ChatMessage, MessageRole, SuggestedAction},
    services::facade::{FinanceFacade, ReadModel},
};

/// Shown instead of a reply whenever the AI provider fails; the chat turn
/// never fails visibly to the end user.
pub const FALLBACK_REPLY: &str =
    "I'm having trouble processing your request right now. Could you try asking again? 🤔";

const WELCOME_MESSAGE: &str = "Hey there! 👋 I'm OnchainBudget GPT, your AI financial assistant. \
I can help you track spending across your crypto wallets and traditional bank accounts. \
What would you like to know about your finances?";

fn action(id: &str, label: &str, tier: ActionTier) -> SuggestedAction {
    SuggestedAction {
        id: id.to_string(),
        label: label.to_string(),
        tier,
    }
}

/// Suggested actions come from the user's own words, not from the reply.
pub fn suggest_actions(user_message: &str) -> Vec<SuggestedAction> {
    let message = user_message.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|word| message.contains(word));
    let mut actions = Vec::new();

    if mentions(&["wallet", "crypto", "balance"]) {
        actions.push(action("connect-wallet", "Connect Wallet", ActionTier::Primary));
    }
    if mentions(&["spending", "budget", "bank"]) {
        actions.push(action("connect-bank", "Connect Bank", ActionTier::Secondary));
    }
    if mentions(&["portfolio", "investment", "holdings"]) {
        actions.push(action("view-portfolio", "View Portfolio", ActionTier::Secondary));
    }
    if mentions(&["chart", "graph", "breakdown", "analysis"]) {
        actions.push(action("generate-chart", "Generate Chart", ActionTier::Outline));
    }
    actions
}

/// Context payload sent with every AI request: wallet/identity summary, bank
/// summary, the most recent transactions and the tail of the conversation.
fn build_prompt(
    wallet_address: &str,
    snapshot: &ReadModel,
    history: &[ChatMessage],
    user_message: &str,
) -> String {
    let mut sections = Vec::new();

    let wallet_info = serde_json::json!({
        "address": wallet_address,
        "identity": snapshot.identity,
    });
    sections.push(format!(
        "Wallet Info: {}",
        serde_json::to_string_pretty(&wallet_info).unwrap_or_default()
    ));

    if !snapshot.balances.is_empty() {
        let onchain = serde_json::json!({
            "tokens": snapshot.balances.iter().map(|token| serde_json::json!({
                "symbol": token.symbol,
                "balance": token.balance_formatted,
                "value": token.value.unwrap_or(0.0),
                "is_native": token.is_native,
            })).collect::<Vec<_>>(),
            "portfolio": snapshot.portfolio.as_ref().map(|p| serde_json::json!({
                "total_value": p.total_value,
                "total_change_24h": p.total_change_24h,
                "token_count": p.tokens.len(),
            })),
        });
        sections.push(format!(
            "Onchain Info: {}",
            serde_json::to_string_pretty(&onchain).unwrap_or_default()
        ));
    }

    if !snapshot.accounts.is_empty() {
        let total_balance: rust_decimal::Decimal =
            snapshot.accounts.iter().map(|a| a.balance).sum();
        let bank = serde_json::json!({
            "accounts": snapshot.accounts.iter().map(|a| serde_json::json!({
                "id": a.id,
                "name": a.name,
                "institution": a.institution,
                "balance": a.balance,
                "currency": a.currency,
                "type": a.account_type,
            })).collect::<Vec<_>>(),
            "total_balance": total_balance,
            "connected_banks": snapshot.accounts.len(),
        });
        sections.push(format!(
            "Bank Info: {}",
            serde_json::to_string_pretty(&bank).unwrap_or_default()
        ));
    }

    if !snapshot.transactions.is_empty() {
        let recent: Vec<_> = snapshot
            .transactions
            .iter()
            .rev()
            .take(CHAT_CONTEXT_TRANSACTIONS)
            .map(|tx| {
                serde_json::json!({
                    "description": tx.description,
                    "category": tx.category,
                    "amount": tx.amount,
                    "type": tx.kind,
                    "date": tx.date,
                })
            })
            .collect();
        sections.push(format!(
            "Recent Transactions: {}",
            serde_json::to_string_pretty(&recent).unwrap_or_default()
        ));
    }

    if !history.is_empty() {
        let tail: Vec<String> = history
            .iter()
            .rev()
            .take(CHAT_CONTEXT_MESSAGES)
            .rev()
            .map(|msg| format!("{}: {}", msg.role.as_str(), msg.content))
            .collect();
        sections.push(format!("Previous conversation:\n{}", tail.join("\n")));
    }

    format!(
        "Context:\n{}\n\nUser Question: {}",
        sections.join("\n\n"),
        user_message
    )
}

// Resets the turn machine to idle however the turn ends.
struct TurnGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// One chat conversation bound to a session: turn state machine, in-memory
/// message list (the source of truth for rendering) and fire-and-forget
/// persistence into the session's history.
pub struct AssistantBridge {
    session_id: Uuid,
    wallet_address: String,
    ai: Arc<dyn AssistantProvider>,
    store: Arc<dyn SessionStore>,
    facade: Arc<FinanceFacade>,
    messages: RwLock<Vec<ChatMessage>>,
    busy: AtomicBool,
}

impl AssistantBridge {
    pub fn new(
        session_id: Uuid,
        wallet_address: String,
        ai: Arc<dyn AssistantProvider>,
        store: Arc<dyn SessionStore>,
        facade: Arc<FinanceFacade>,
    ) -> Self {
        Self {
            session_id,
            wallet_address,
            ai,
            store,
            facade,
            messages: RwLock::new(Vec::new()),
            busy: AtomicBool::new(false),
        }
    }

    /// New sessions get the fixed welcome message; existing ones reload their
    /// persisted history.
    pub async fn initialize(&self, newly_created: bool) -> Result<()> {
        if newly_created {
            let welcome = ChatMessage::new(
                MessageRole::Assistant,
                WELCOME_MESSAGE,
                vec![
                    action("connect-bank", "Connect Bank Account", ActionTier::Primary),
                    action("view-portfolio", "View Portfolio", ActionTier::Secondary),
                ],
            );
            self.messages.write().await.push(welcome.clone());
            self.store.store_message(self.session_id, &welcome).await?;
        } else {
            let history = self
                .store
                .chat_history(self.session_id, CHAT_HISTORY_LIMIT)
                .await?;
            *self.messages.write().await = history;
        }
        Ok(())
    }

    pub async fn history(&self) -> Vec<ChatMessage> {
        self.messages.read().await.clone()
    }

    // Local state first; the write to the datastore runs on its own and is
    // never rolled back into the UI state.
    fn persist_detached(&self, message: ChatMessage) {
        let store = self.store.clone();
        let session_id = self.session_id;
        tokio::spawn(async move {
            if let Err(err) = store.store_message(session_id, &message).await {
                tracing::warn!("failed to persist chat message {}: {}", message.id, err);
            }
        });
    }

    /// One chat turn: `idle -> awaiting_reply -> idle`. A send while a turn
    /// is in flight is rejected. The AI provider failing in any way
    /// downgrades to the fixed fallback reply; the turn itself never fails
    /// once accepted.
    pub async fn send(&self, content: &str) -> Result<ChatMessage> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::BadRequest("Message content is empty".to_string()));
        }

        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AppError::AssistantBusy);
        }
        let _turn = TurnGuard { flag: &self.busy };

        // Context sees the conversation as it stood before this turn.
        let prior = self.messages.read().await.clone();

        let user_message = ChatMessage::new(MessageRole::User, content, Vec::new());
        self.messages.write().await.push(user_message.clone());
        self.persist_detached(user_message);

        let snapshot = self.facade.snapshot().await;
        let prompt = build_prompt(&self.wallet_address, &snapshot, &prior, content);

        let reply = match self.ai.generate(&prompt).await {
            Ok(text) => ChatMessage::new(MessageRole::Assistant, text, suggest_actions(content)),
            Err(err) => {
                tracing::warn!("assistant provider failed: {}", err);
                ChatMessage::new(MessageRole::Assistant, FALLBACK_REPLY, Vec::new())
            }
        };

        self.messages.write().await.push(reply.clone());
        self.persist_detached(reply.clone());
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{MemoryStore, MockAssistant, MockBank, MockChain};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    const WALLET: &str = "0xd8da6bf26964af9d7eed9e03e53415d37aa96045";

    fn bridge_with(
        ai: Arc<dyn AssistantProvider>,
        store: Arc<MemoryStore>,
    ) -> (Arc<AssistantBridge>, Uuid) {
        let facade = Arc::new(FinanceFacade::new(
            WALLET.to_string(),
            Arc::new(MockBank::default()),
            Arc::new(MockChain::default()),
            store.clone(),
        ));
        let session_id = Uuid::new_v4();
        let bridge = Arc::new(AssistantBridge::new(
            session_id,
            WALLET.to_string(),
            ai,
            store,
            facade,
        ));
        (bridge, session_id)
    }

    struct BlockingAssistant {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl AssistantProvider for BlockingAssistant {
        async fn generate(&self, _prompt: &str) -> crate::error::Result<String> {
            self.release.notified().await;
            Ok("done thinking".to_string())
        }
    }

    #[test]
    fn actions_follow_the_user_keywords() {
        let actions = suggest_actions("What's my wallet balance?");
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].id, "connect-wallet");
        assert_eq!(actions[0].tier, ActionTier::Primary);

        let actions = suggest_actions("Show my spending breakdown as a chart");
        let ids: Vec<_> = actions.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["connect-bank", "generate-chart"]);

        assert!(suggest_actions("Tell me a joke").is_empty());
    }

    #[test]
    fn portfolio_keywords_suggest_the_portfolio_view() {
        let actions = suggest_actions("how are my holdings doing?");
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].id, "view-portfolio");
    }

    #[tokio::test]
    async fn provider_failure_appends_exactly_one_fallback_and_returns_to_idle() {
        let store = Arc::new(MemoryStore::default());
        let (bridge, _) = bridge_with(Arc::new(MockAssistant::failing()), store);

        let reply = bridge.send("How much did I spend?").await.unwrap();
        assert_eq!(reply.content, FALLBACK_REPLY);
        assert!(reply.actions.is_empty());

        let history = bridge.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[1].role, MessageRole::Assistant);
        assert_eq!(history[1].content, FALLBACK_REPLY);

        // Back to idle: the next turn is accepted.
        assert!(bridge.send("and now?").await.is_ok());
    }

    #[tokio::test]
    async fn a_send_during_an_inflight_turn_is_rejected() {
        let release = Arc::new(Notify::new());
        let store = Arc::new(MemoryStore::default());
        let (bridge, _) = bridge_with(
            Arc::new(BlockingAssistant {
                release: release.clone(),
            }),
            store,
        );

        let first = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.send("slow question").await })
        };
        while !bridge.busy.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }

        let second = bridge.send("impatient question").await;
        assert!(matches!(second, Err(AppError::AssistantBusy)));

        release.notify_one();
        let reply = first.await.unwrap().unwrap();
        assert_eq!(reply.content, "done thinking");

        // Turn finished; the guard slot is free again.
        assert!(bridge.send("third question").await.is_ok());
    }

    #[tokio::test]
    async fn welcome_message_is_appended_once_per_new_session() {
        let store = Arc::new(MemoryStore::default());
        let (bridge, session_id) = bridge_with(
            Arc::new(MockAssistant::replying("hello")),
            store.clone(),
        );

        bridge.initialize(true).await.unwrap();
        let history = bridge.history().await;
        assert_eq!(history.len(), 1);
        assert!(history[0].content.starts_with("Hey there!"));
        assert_eq!(history[0].actions[0].id, "connect-bank");
        assert_eq!(store.message_count(session_id), 1);

        // Reconnecting reloads the persisted history instead of re-greeting.
        let (reloaded, _) = bridge_with(Arc::new(MockAssistant::replying("hello")), store.clone());
        let reloaded = AssistantBridge::new(
            session_id,
            WALLET.to_string(),
            reloaded.ai.clone(),
            store.clone(),
            reloaded.facade.clone(),
        );
        reloaded.initialize(false).await.unwrap();
        assert_eq!(reloaded.history().await.len(), 1);
        assert_eq!(store.message_count(session_id), 1);
    }

    #[tokio::test]
    async fn prompt_carries_context_and_trims_history_to_the_last_five() {
        let snapshot = ReadModel::default();
        let mut history = Vec::new();
        for index in 0..7 {
            history.push(ChatMessage::new(
                MessageRole::User,
                format!("message number {}", index),
                Vec::new(),
            ));
        }

        let prompt = build_prompt(WALLET, &snapshot, &history, "what changed?");
        assert!(prompt.contains("User Question: what changed?"));
        assert!(prompt.contains(WALLET));
        assert!(prompt.contains("message number 6"));
        assert!(prompt.contains("message number 2"));
        assert!(!prompt.contains("message number 1"));
        assert!(!prompt.contains("message number 0"));
    }
}
