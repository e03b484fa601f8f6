// src/models/mod.rs
pub mod entities;

// Re-export commonly used types so other modules can use `crate::models::X`
pub use entities::{
    ActionTier,
    ApiResponse,
    BankAccount,
    BankTransaction,
    ChatMessage,
    FlowKind,
    IdentityProfile,
    MessageRole,
    Portfolio,
    Session,
    SessionBlob,
    SuggestedAction,
    TokenBalance,
};
