use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::{
    config::Config,
    error::{AppError, Result},
    models::{BankAccount, ChatMessage, MessageRole, Session, SessionBlob, SuggestedAction},
};

/// Narrow persistence seam consumed by the facade and the assistant bridge.
/// The production implementation is [`Database`]; tests substitute an
/// in-memory store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the wallet's active session, creating one lazily on first
    /// connect. The flag is true when the session was just created.
    async fn open_session(&self, wallet_address: &str) -> Result<(Session, bool)>;

    async fn save_linked_accounts(
        &self,
        wallet_address: &str,
        accounts: &[BankAccount],
    ) -> Result<()>;

    async fn load_linked_accounts(&self, wallet_address: &str) -> Result<Vec<BankAccount>>;

    async fn store_message(&self, session_id: Uuid, message: &ChatMessage) -> Result<()>;

    async fn chat_history(&self, session_id: Uuid, limit: i64) -> Result<Vec<ChatMessage>>;
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ==================== SESSION QUERIES ====================
impl Database {
    async fn get_session(&self, wallet_address: &str) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT * FROM user_sessions WHERE wallet_address = $1",
        )
        .bind(wallet_address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    // ON CONFLICT DO NOTHING keeps a concurrent first-connect race from
    // erroring; the loser falls back to the winner's row.
    async fn create_session(&self, wallet_address: &str) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO user_sessions (wallet_address, session_data)
            VALUES ($1, '{}'::jsonb)
            ON CONFLICT (wallet_address) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(wallet_address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }
}

// ==================== CHAT MESSAGE ROW ====================
#[derive(sqlx::FromRow)]
struct ChatMessageRow {
    id: Uuid,
    role: String,
    content: String,
    metadata: serde_json::Value,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl ChatMessageRow {
    fn into_message(self) -> Result<ChatMessage> {
        let role = MessageRole::parse(&self.role)
            .ok_or_else(|| AppError::Internal(format!("Unknown message role: {}", self.role)))?;
        let actions = self
            .metadata
            .get("actions")
            .cloned()
            .map(serde_json::from_value::<Vec<SuggestedAction>>)
            .transpose()
            .map_err(|e| AppError::Internal(format!("Corrupt message metadata: {}", e)))?
            .unwrap_or_default();

        Ok(ChatMessage {
            id: self.id,
            role,
            content: self.content,
            actions,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl SessionStore for Database {
    async fn open_session(&self, wallet_address: &str) -> Result<(Session, bool)> {
        if let Some(session) = self.get_session(wallet_address).await? {
            return Ok((session, false));
        }
        match self.create_session(wallet_address).await? {
            Some(session) => Ok((session, true)),
            None => {
                let session = self.get_session(wallet_address).await?.ok_or_else(|| {
                    AppError::Internal("Session vanished during creation".to_string())
                })?;
                Ok((session, false))
            }
        }
    }

    async fn save_linked_accounts(
        &self,
        wallet_address: &str,
        accounts: &[BankAccount],
    ) -> Result<()> {
        let session = self
            .get_session(wallet_address)
            .await?
            .ok_or_else(|| AppError::NotFound("No session for wallet".to_string()))?;

        let mut blob = SessionBlob::from_value(&session.session_data);
        blob.bank_accounts = accounts.to_vec();

        sqlx::query(
            r#"
            UPDATE user_sessions
            SET session_data = $1, updated_at = NOW()
            WHERE wallet_address = $2
            "#,
        )
        .bind(blob.to_value())
        .bind(wallet_address)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_linked_accounts(&self, wallet_address: &str) -> Result<Vec<BankAccount>> {
        let Some(session) = self.get_session(wallet_address).await? else {
            return Ok(Vec::new());
        };
        Ok(SessionBlob::from_value(&session.session_data).bank_accounts)
    }

    async fn store_message(&self, session_id: Uuid, message: &ChatMessage) -> Result<()> {
        let metadata = if message.actions.is_empty() {
            serde_json::json!({})
        } else {
            serde_json::json!({ "actions": message.actions })
        };

        sqlx::query(
            r#"
            INSERT INTO chat_messages (id, session_id, role, content, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(message.id)
        .bind(session_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(metadata)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn chat_history(&self, session_id: Uuid, limit: i64) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query_as::<_, ChatMessageRow>(
            r#"
            SELECT id, role, content, metadata, created_at
            FROM chat_messages
            WHERE session_id = $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChatMessageRow::into_message).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    #[tokio::test]
    async fn database_new_returns_error_on_invalid_url() {
        let mut config = test_config();
        config.database_url = "not-a-url".to_string();
        let result = Database::new(&config).await;
        assert!(result.is_err());
    }

    #[test]
    fn chat_message_row_recovers_actions_from_metadata() {
        let row = ChatMessageRow {
            id: Uuid::new_v4(),
            role: "assistant".to_string(),
            content: "hi".to_string(),
            metadata: serde_json::json!({
                "actions": [{ "id": "connect-bank", "label": "Connect Bank", "type": "primary" }]
            }),
            created_at: chrono::Utc::now(),
        };
        let message = row.into_message().unwrap();
        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(message.actions.len(), 1);
        assert_eq!(message.actions[0].id, "connect-bank");
    }

    #[test]
    fn chat_message_row_rejects_unknown_roles() {
        let row = ChatMessageRow {
            id: Uuid::new_v4(),
            role: "system".to_string(),
            content: "hi".to_string(),
            metadata: serde_json::json!({}),
            created_at: chrono::Utc::now(),
        };
        assert!(row.into_message().is_err());
    }
}
